use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{debug, info, warn};

use crate::error::ConfigError;
use crate::types::{Point, Size};

pub const CONFIG_DIR_NAME: &str = "eve-o-preview-linux";
pub const CONFIG_FILE_NAME: &str = "config.json";

pub const DRAG_THRESHOLD: i32 = 6;
pub const GRID_MARGIN: i32 = 12;
pub const ACTIVE_BORDER_WIDTH: f32 = 4.0;
pub const INACTIVE_BORDER_WIDTH: f32 = 2.0;
pub const INACTIVE_BORDER_RGBA: (u8, u8, u8, u8) = (60, 60, 60, 128);
pub const LABEL_FONT_SIZE: f32 = 11.0;
pub const LABEL_PADDING_X: f32 = 10.0;
pub const LABEL_PADDING_Y: f32 = 6.0;
pub const LABEL_MARGIN: f32 = 6.0;
pub const LABEL_CORNER_RADIUS: f32 = 3.0;
pub const LABEL_BACKGROUND_OPACITY: f32 = 0.7;

pub const SUPPORTED_FPS: [u32; 3] = [10, 15, 25];
pub const WIDTH_RANGE: (u32, u32) = (100, 800);
pub const HEIGHT_RANGE: (u32, u32) = (80, 600);
pub const OPACITY_RANGE: (f64, f64) = (0.2, 1.0);
pub const ZOOM_RANGE: (f64, f64) = (1.1, 2.0);
pub const DEFAULT_BORDER_COLOR: &str = "#00FF00";

pub const fn label_background_alpha() -> u8 {
    let clamped = if LABEL_BACKGROUND_OPACITY < 0.0 {
        0.0
    } else if LABEL_BACKGROUND_OPACITY > 1.0 {
        1.0
    } else {
        LABEL_BACKGROUND_OPACITY
    };
    (clamped * 255.0 + 0.5) as u8
}

/// Process-wide preview settings, stored as JSON.
///
/// Missing keys fall back to [`Settings::default`]; keys this version does
/// not know about are kept in `extra` and written back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub thumbnail_width: u32,
    pub thumbnail_height: u32,
    pub opacity: f64,
    pub always_on_top: bool,
    pub hide_active_client: bool,
    pub zoom_on_hover: bool,
    pub zoom_factor: f64,
    pub show_overlay: bool,
    pub refresh_fps: u32,
    pub active_border_color: String,
    /// Saved thumbnail positions keyed by window title.
    pub thumbnail_positions: BTreeMap<String, [i32; 2]>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            thumbnail_width: 320,
            thumbnail_height: 200,
            opacity: 0.95,
            always_on_top: true,
            hide_active_client: false,
            zoom_on_hover: true,
            zoom_factor: 1.25,
            show_overlay: true,
            refresh_fps: 10,
            active_border_color: DEFAULT_BORDER_COLOR.to_string(),
            thumbnail_positions: BTreeMap::new(),
            extra: serde_json::Map::new(),
        }
    }
}

/// Non-fatal problem found while validating settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationWarning {
    pub field: &'static str,
    pub message: String,
}

impl Settings {
    pub fn thumbnail_size(&self) -> Size {
        Size::new(self.thumbnail_width, self.thumbnail_height)
    }

    pub fn refresh_period(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.refresh_fps.max(1)))
    }

    pub fn saved_position(&self, title: &str) -> Option<Point> {
        self.thumbnail_positions
            .get(title)
            .map(|[x, y]| Point::new(*x, *y))
    }

    pub fn active_border_rgb(&self) -> (u8, u8, u8) {
        parse_hex_color(&self.active_border_color).unwrap_or((0, 255, 0))
    }

    /// True when every field that affects live surfaces matches.
    pub fn same_display(&self, other: &Settings) -> bool {
        self.thumbnail_width == other.thumbnail_width
            && self.thumbnail_height == other.thumbnail_height
            && self.opacity == other.opacity
            && self.always_on_top == other.always_on_top
            && self.hide_active_client == other.hide_active_client
            && self.zoom_on_hover == other.zoom_on_hover
            && self.zoom_factor == other.zoom_factor
            && self.show_overlay == other.show_overlay
            && self.refresh_fps == other.refresh_fps
            && self.active_border_color == other.active_border_color
    }

    /// Clamp values into the ranges the settings workflow allows.
    pub fn validate(&mut self) -> Vec<ValidationWarning> {
        self.validate_against(&Settings::default())
    }

    /// Like [`Settings::validate`], but an unusable border colour falls back
    /// to the one in `previous`.
    pub fn validate_against(&mut self, previous: &Settings) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();

        let width = self.thumbnail_width.clamp(WIDTH_RANGE.0, WIDTH_RANGE.1);
        if width != self.thumbnail_width {
            warnings.push(ValidationWarning {
                field: "thumbnail_width",
                message: format!("{} outside {:?}, using {width}", self.thumbnail_width, WIDTH_RANGE),
            });
            self.thumbnail_width = width;
        }

        let height = self.thumbnail_height.clamp(HEIGHT_RANGE.0, HEIGHT_RANGE.1);
        if height != self.thumbnail_height {
            warnings.push(ValidationWarning {
                field: "thumbnail_height",
                message: format!(
                    "{} outside {:?}, using {height}",
                    self.thumbnail_height, HEIGHT_RANGE
                ),
            });
            self.thumbnail_height = height;
        }

        let opacity = if self.opacity.is_finite() {
            self.opacity.clamp(OPACITY_RANGE.0, OPACITY_RANGE.1)
        } else {
            Settings::default().opacity
        };
        if opacity != self.opacity {
            warnings.push(ValidationWarning {
                field: "opacity",
                message: format!("{} outside {:?}, using {opacity}", self.opacity, OPACITY_RANGE),
            });
            self.opacity = opacity;
        }

        let zoom = if self.zoom_factor.is_finite() {
            self.zoom_factor.clamp(ZOOM_RANGE.0, ZOOM_RANGE.1)
        } else {
            Settings::default().zoom_factor
        };
        if zoom != self.zoom_factor {
            warnings.push(ValidationWarning {
                field: "zoom_factor",
                message: format!("{} outside {:?}, using {zoom}", self.zoom_factor, ZOOM_RANGE),
            });
            self.zoom_factor = zoom;
        }

        if !SUPPORTED_FPS.contains(&self.refresh_fps) {
            warnings.push(ValidationWarning {
                field: "refresh_fps",
                message: format!(
                    "{} is not one of {:?}, using {}",
                    self.refresh_fps, SUPPORTED_FPS, SUPPORTED_FPS[0]
                ),
            });
            self.refresh_fps = SUPPORTED_FPS[0];
        }

        if parse_hex_color(&self.active_border_color).is_some() {
            self.active_border_color = self.active_border_color.to_uppercase();
        } else {
            let fallback = if parse_hex_color(&previous.active_border_color).is_some() {
                previous.active_border_color.to_uppercase()
            } else {
                DEFAULT_BORDER_COLOR.to_string()
            };
            warnings.push(ValidationWarning {
                field: "active_border_color",
                message: format!(
                    "{:?} is not #RRGGBB, using {fallback}",
                    self.active_border_color
                ),
            });
            self.active_border_color = fallback;
        }

        warnings
    }
}

/// Parse a `#RRGGBB` colour.
pub fn parse_hex_color(value: &str) -> Option<(u8, u8, u8)> {
    let hex = value.strip_prefix('#')?;
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some((r, g, b))
}

pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
        .ok_or(ConfigError::NoDirFound)
}

const FIELDS: [&str; 11] = [
    "thumbnail_width",
    "thumbnail_height",
    "opacity",
    "always_on_top",
    "hide_active_client",
    "zoom_on_hover",
    "zoom_factor",
    "show_overlay",
    "refresh_fps",
    "active_border_color",
    "thumbnail_positions",
];

fn field_name(key: &str) -> &'static str {
    FIELDS
        .iter()
        .find(|field| **field == key)
        .copied()
        .unwrap_or("config")
}

fn accepts(merged: &Map<String, Value>, key: &str, value: &Value) -> bool {
    let mut candidate = merged.clone();
    candidate.insert(key.to_string(), value.clone());
    serde_json::from_value::<Settings>(Value::Object(candidate)).is_ok()
}

/// Parse a settings document key by key over the defaults. A key whose value
/// has the wrong type is skipped with a warning instead of discarding the
/// whole document; so is a single malformed saved position.
pub fn parse_settings(content: &str) -> Result<(Settings, Vec<ValidationWarning>), ConfigError> {
    let Value::Object(document) =
        serde_json::from_str::<Value>(content).map_err(ConfigError::ParseFailed)?
    else {
        return Err(ConfigError::NotAnObject);
    };

    let mut warnings = Vec::new();
    let mut merged = Map::new();
    for (key, mut value) in document {
        if key == "thumbnail_positions" {
            if let Value::Object(positions) = &mut value {
                positions.retain(|title, position| {
                    let usable = serde_json::from_value::<[i32; 2]>(position.clone()).is_ok();
                    if !usable {
                        warnings.push(ValidationWarning {
                            field: "thumbnail_positions",
                            message: format!("position for {title:?} is not [x, y], dropped"),
                        });
                    }
                    usable
                });
            }
        }
        if accepts(&merged, &key, &value) {
            merged.insert(key, value);
        } else {
            warnings.push(ValidationWarning {
                field: field_name(&key),
                message: format!("{key} has an unusable value {value}, using the default"),
            });
        }
    }

    let settings =
        serde_json::from_value(Value::Object(merged)).map_err(ConfigError::ParseFailed)?;
    Ok((settings, warnings))
}

pub fn read_settings(path: &Path) -> Result<Settings, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::ReadFailed)?;
    let (settings, warnings) = parse_settings(&content)?;
    log_warnings(&warnings);
    Ok(settings)
}

pub fn write_settings(path: &Path, settings: &Settings) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(ConfigError::SaveFailed)?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(ConfigError::SerializeFailed)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).map_err(ConfigError::SaveFailed)?;
    fs::rename(&tmp, path).map_err(ConfigError::SaveFailed)
}

fn log_warnings(warnings: &[ValidationWarning]) {
    for warning in warnings {
        warn!(field = warning.field, "config: {}", warning.message);
    }
}

/// Owner of the live [`Settings`].
///
/// Everything reads through [`ConfigStore::settings`]. The only mutators are
/// [`ConfigStore::apply_settings`] (the settings workflow) and
/// [`ConfigStore::record_position`] (thumbnail destruction); both persist
/// immediately.
pub struct ConfigStore {
    path: Option<PathBuf>,
    settings: Settings,
    /// Set when the file on disk could not be parsed at all. It is left
    /// untouched until settings are applied.
    keep_file: bool,
}

impl ConfigStore {
    /// Load from `path`, merging defaults. Read or parse failures are logged
    /// and leave the defaults in place.
    pub fn load(path: Option<PathBuf>) -> Self {
        let path = match path {
            Some(path) => Some(path),
            None => match default_config_path() {
                Ok(path) => Some(path),
                Err(err) => {
                    warn!("{err}; settings will not be persisted");
                    None
                }
            },
        };

        let mut keep_file = false;
        let mut settings = match path.as_deref() {
            Some(path) if path.exists() => match read_settings(path) {
                Ok(settings) => {
                    info!(path = %path.display(), "loaded config");
                    settings
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        "{err}, using defaults; the file is kept until settings change"
                    );
                    keep_file = true;
                    Settings::default()
                }
            },
            Some(path) => {
                debug!(path = %path.display(), "no config file, using defaults");
                Settings::default()
            }
            None => Settings::default(),
        };
        log_warnings(&settings.validate());

        Self {
            path,
            settings,
            keep_file,
        }
    }

    #[cfg(test)]
    pub fn in_memory(settings: Settings) -> Self {
        Self {
            path: None,
            settings,
            keep_file: false,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// True while an unparseable file on disk is being left alone.
    pub fn file_kept(&self) -> bool {
        self.keep_file
    }

    /// Replace the display settings and persist. Positions recorded in
    /// memory win over positions carried by `new`.
    pub fn apply_settings(&mut self, mut new: Settings) -> Vec<ValidationWarning> {
        let warnings = new.validate_against(&self.settings);
        log_warnings(&warnings);
        let live_positions = std::mem::take(&mut self.settings.thumbnail_positions);
        new.thumbnail_positions.extend(live_positions);
        self.settings = new;
        self.keep_file = false;
        self.persist();
        warnings
    }

    /// Remember where the thumbnail for `title` was last shown and persist.
    pub fn record_position(&mut self, title: &str, position: Point) {
        if title.is_empty() {
            return;
        }
        self.settings
            .thumbnail_positions
            .insert(title.to_string(), [position.x, position.y]);
        self.persist();
    }

    fn persist(&self) {
        let Some(path) = self.path.as_deref() else {
            return;
        };
        if self.keep_file {
            debug!(path = %path.display(), "config file unreadable, not overwriting");
            return;
        }
        match write_settings(path, &self.settings) {
            Ok(()) => debug!(path = %path.display(), "saved config"),
            Err(err) => warn!(path = %path.display(), "{err}"),
        }
    }
}
