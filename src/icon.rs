//! Themed fallback icons for windows that publish no `_NET_WM_ICON`.

use anyhow::{Context, Result};
use freedesktop_icons::lookup;
use image::RgbaImage;
use resvg::usvg;
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};
use tiny_skia::{Pixmap, Transform};
use tracing::debug;

use crate::render::image_from_pixmap;

pub const THEME_ICON_SIZE: u32 = 128;

/// Themed icons resolved from window classes. Misses are cached too, so a
/// class without an icon is looked up once.
#[derive(Default)]
pub struct IconCache {
    icons: HashMap<String, Option<Arc<RgbaImage>>>,
}

impl IconCache {
    pub fn icon_for(&mut self, class: &str) -> Option<Arc<RgbaImage>> {
        if let Some(icon) = self.icons.get(class) {
            return icon.clone();
        }
        let icon = match load_icon(class) {
            Ok(icon) => Some(Arc::new(icon)),
            Err(err) => {
                debug!(class, "no themed icon: {err:#}");
                None
            }
        };
        self.icons.insert(class.to_string(), icon.clone());
        icon
    }

    #[cfg(test)]
    pub fn insert(&mut self, class: &str, icon: RgbaImage) {
        self.icons.insert(class.to_string(), Some(Arc::new(icon)));
    }
}

fn name_candidates(class: &str) -> Vec<String> {
    let mut candidates = vec![class.to_string(), class.to_lowercase()];
    if let Some(trimmed) = class.strip_suffix(".exe") {
        candidates.push(trimmed.to_lowercase());
    }
    if let Some(last) = class.rsplit('.').next() {
        candidates.push(last.to_lowercase());
    }
    candidates.dedup();
    candidates
}

fn load_icon(class: &str) -> Result<RgbaImage> {
    let mut candidates = name_candidates(class);
    if let Some(icon_name) = desktop_icon_name(class) {
        candidates.push(icon_name);
    }

    let path = candidates
        .into_iter()
        .find_map(|name| lookup(&name).with_size(THEME_ICON_SIZE as u16).find())
        .context("no icon found")?;

    if path.extension().and_then(|ext| ext.to_str()) == Some("svg") {
        let pixmap = render_svg(&path, THEME_ICON_SIZE)?;
        return Ok(image_from_pixmap(&pixmap));
    }

    let image = image::open(&path).with_context(|| format!("open icon {}", path.display()))?;
    Ok(image.to_rgba8())
}

fn render_svg(path: &Path, size: u32) -> Result<Pixmap> {
    let data = fs::read(path).with_context(|| format!("read svg {}", path.display()))?;
    let options = usvg::Options::default();
    let tree = usvg::Tree::from_data(&data, &options)
        .with_context(|| format!("parse svg {}", path.display()))?;
    let mut pixmap = Pixmap::new(size, size).context("create svg pixmap")?;
    let tree_size = tree.size();
    let scale = (size as f32 / tree_size.width()).min(size as f32 / tree_size.height());
    let dx = (size as f32 - tree_size.width() * scale) * 0.5;
    let dy = (size as f32 - tree_size.height() * scale) * 0.5;
    let transform = Transform::from_scale(scale, scale).post_translate(dx, dy);
    resvg::render(&tree, transform, &mut pixmap.as_mut());
    Ok(pixmap)
}

fn application_dirs() -> Vec<PathBuf> {
    let mut paths = vec![
        PathBuf::from("/usr/share/applications"),
        PathBuf::from("/usr/local/share/applications"),
    ];
    if let Some(data) = dirs::data_dir() {
        paths.push(data.join("applications"));
    }
    if let Ok(xdg_dirs) = std::env::var("XDG_DATA_DIRS") {
        paths.extend(
            xdg_dirs
                .split(':')
                .filter(|dir| !dir.is_empty())
                .map(|dir| PathBuf::from(dir).join("applications")),
        );
    }
    paths
}

fn desktop_icon_name(class: &str) -> Option<String> {
    let candidates = name_candidates(class);
    for base in application_dirs() {
        for name in &candidates {
            let file = base.join(format!("{name}.desktop"));
            if let Some(icon) = read_desktop_icon(&file) {
                return Some(icon);
            }
        }
    }
    None
}

/// `Icon=` from the `[Desktop Entry]` group, if the file exists and has one.
fn read_desktop_icon(path: &Path) -> Option<String> {
    let content = fs::read_to_string(path).ok()?;
    let mut in_entry = false;
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line.starts_with('[') && line.ends_with(']') {
            in_entry = line == "[Desktop Entry]";
            continue;
        }
        if !in_entry {
            continue;
        }
        if let Some(value) = line.strip_prefix("Icon=") {
            let value = value.trim();
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}
