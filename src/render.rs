//! Frame scaling and thumbnail composition.

use image::{RgbaImage, imageops::FilterType};
use resvg::usvg;
use std::sync::Arc;
use tiny_skia::{
    Color, FillRule, FilterQuality, IntSize, Paint, PathBuilder, Pixmap, PixmapPaint, Stroke,
    Transform,
};

use crate::config::{
    ACTIVE_BORDER_WIDTH, INACTIVE_BORDER_RGBA, INACTIVE_BORDER_WIDTH, LABEL_CORNER_RADIUS,
    LABEL_FONT_SIZE, LABEL_MARGIN, LABEL_PADDING_X, LABEL_PADDING_Y, label_background_alpha,
};
use crate::types::Size;

/// Straight RGBA image to a premultiplied pixmap.
pub fn pixmap_from_image(image: RgbaImage) -> Option<Pixmap> {
    let size = IntSize::from_wh(image.width(), image.height())?;
    let mut data = image.into_raw();
    for pixel in data.chunks_exact_mut(4) {
        let alpha = u16::from(pixel[3]);
        if alpha < 255 {
            for channel in &mut pixel[..3] {
                *channel = ((u16::from(*channel) * alpha + 127) / 255) as u8;
            }
        }
    }
    Pixmap::from_vec(data, size)
}

pub fn image_from_pixmap(pixmap: &Pixmap) -> RgbaImage {
    let width = pixmap.width();
    let pixels = pixmap.pixels();
    RgbaImage::from_fn(width, pixmap.height(), |x, y| {
        let color = pixels[(y * width + x) as usize].demultiply();
        image::Rgba([color.red(), color.green(), color.blue(), color.alpha()])
    })
}

/// Bilinear resize to exactly `size`.
pub fn scale_bilinear(image: &RgbaImage, size: Size) -> Option<Pixmap> {
    if size.width == 0 || size.height == 0 {
        return None;
    }
    let scaled = image::imageops::resize(image, size.width, size.height, FilterType::Triangle);
    pixmap_from_image(scaled)
}

pub fn rounded_rect_path(x: f32, y: f32, width: f32, height: f32, radius: f32) -> Option<tiny_skia::Path> {
    let r = radius.min(width / 2.0).min(height / 2.0).max(0.0);
    let mut pb = PathBuilder::new();
    pb.move_to(x + r, y);
    pb.line_to(x + width - r, y);
    pb.quad_to(x + width, y, x + width, y + r);
    pb.line_to(x + width, y + height - r);
    pb.quad_to(x + width, y + height, x + width - r, y + height);
    pb.line_to(x + r, y + height);
    pb.quad_to(x, y + height, x, y + height - r);
    pb.line_to(x, y + r);
    pb.quad_to(x, y, x + r, y);
    pb.close();
    pb.finish()
}

pub struct Decoration<'a> {
    pub active: bool,
    pub active_rgb: (u8, u8, u8),
    pub label: Option<&'a Pixmap>,
}

impl Decoration<'_> {
    pub fn border(&self) -> (f32, Color) {
        if self.active {
            let (r, g, b) = self.active_rgb;
            (ACTIVE_BORDER_WIDTH, Color::from_rgba8(r, g, b, 255))
        } else {
            let (r, g, b, a) = INACTIVE_BORDER_RGBA;
            (INACTIVE_BORDER_WIDTH, Color::from_rgba8(r, g, b, a))
        }
    }
}

/// Draw `frame` stretched to `size`, then the border and the name label.
pub fn compose(frame: Option<&Pixmap>, size: Size, decoration: &Decoration) -> Option<Pixmap> {
    let mut canvas = Pixmap::new(size.width, size.height)?;
    canvas.fill(Color::from_rgba8(0, 0, 0, 255));

    if let Some(frame) = frame {
        let scale_x = size.width as f32 / frame.width() as f32;
        let scale_y = size.height as f32 / frame.height() as f32;
        let paint = PixmapPaint {
            quality: FilterQuality::Bilinear,
            ..PixmapPaint::default()
        };
        canvas.draw_pixmap(
            0,
            0,
            frame.as_ref(),
            &paint,
            Transform::from_scale(scale_x, scale_y),
            None,
        );
    }

    let (border_width, border_color) = decoration.border();
    let inset = border_width / 2.0;
    if let Some(path) = rounded_rect_path(
        inset,
        inset,
        size.width as f32 - border_width,
        size.height as f32 - border_width,
        border_width,
    ) {
        let mut paint = Paint::default();
        paint.set_color(border_color);
        let stroke = Stroke {
            width: border_width,
            ..Stroke::default()
        };
        canvas.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
    }

    if let Some(label) = decoration.label {
        let x = ((size.width as i32 - label.width() as i32) / 2).max(0);
        canvas.draw_pixmap(
            x,
            LABEL_MARGIN as i32,
            label.as_ref(),
            &PixmapPaint::default(),
            Transform::identity(),
            None,
        );
    }

    Some(canvas)
}

fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Renders the character-name pill. System fonts are loaded once.
pub struct LabelRenderer {
    fontdb: Arc<usvg::fontdb::Database>,
}

impl LabelRenderer {
    pub fn with_system_fonts() -> Self {
        let mut fontdb = usvg::fontdb::Database::new();
        fontdb.load_system_fonts();
        tracing::debug!(faces = fontdb.len(), "loaded system fonts");
        Self {
            fontdb: Arc::new(fontdb),
        }
    }

    #[cfg(test)]
    pub fn without_fonts() -> Self {
        Self {
            fontdb: Arc::new(usvg::fontdb::Database::new()),
        }
    }

    pub fn render(&self, text: &str) -> Option<Pixmap> {
        if text.trim().is_empty() {
            return None;
        }
        let svg = format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="2000" height="{h}"><text x="0" y="{baseline}" font-family="sans-serif" font-weight="bold" font-size="{size}" fill="white">{text}</text></svg>"#,
            h = LABEL_FONT_SIZE * 3.0,
            baseline = LABEL_FONT_SIZE * 2.0,
            size = LABEL_FONT_SIZE,
            text = escape_xml(text),
        );
        let options = usvg::Options {
            fontdb: self.fontdb.clone(),
            ..usvg::Options::default()
        };
        let tree = usvg::Tree::from_str(&svg, &options).ok()?;
        if tree.root().children().is_empty() {
            return None;
        }
        let bbox = tree.root().abs_bounding_box();
        if bbox.width() <= 0.0 || bbox.height() <= 0.0 {
            return None;
        }

        let width = (bbox.width() + LABEL_PADDING_X * 2.0).ceil();
        let height = (bbox.height() + LABEL_PADDING_Y * 2.0).ceil();
        let mut pixmap = Pixmap::new(width as u32, height as u32)?;
        let background = rounded_rect_path(0.0, 0.0, width, height, LABEL_CORNER_RADIUS)?;
        let mut paint = Paint::default();
        paint.set_color(Color::from_rgba8(0, 0, 0, label_background_alpha()));
        pixmap.fill_path(&background, &paint, FillRule::Winding, Transform::identity(), None);

        let transform =
            Transform::from_translate(LABEL_PADDING_X - bbox.x(), LABEL_PADDING_Y - bbox.y());
        resvg::render(&tree, transform, &mut pixmap.as_mut());
        Some(pixmap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, rgba: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(width, height, image::Rgba(rgba))
    }

    #[test]
    fn scale_produces_requested_size() {
        let pixmap = scale_bilinear(&solid(64, 48, [200, 10, 10, 255]), Size::new(32, 20)).unwrap();
        assert_eq!((pixmap.width(), pixmap.height()), (32, 20));
        let center = pixmap.pixel(16, 10).unwrap();
        assert_eq!(center.red(), 200);
        assert_eq!(center.alpha(), 255);
    }

    #[test]
    fn scale_to_zero_is_none() {
        assert!(scale_bilinear(&solid(4, 4, [0, 0, 0, 255]), Size::new(0, 10)).is_none());
    }

    #[test]
    fn pixmap_conversion_premultiplies() {
        let pixmap = pixmap_from_image(solid(1, 1, [200, 100, 0, 128])).unwrap();
        let pixel = pixmap.pixel(0, 0).unwrap();
        assert_eq!(pixel.alpha(), 128);
        assert_eq!(pixel.red(), 100);
        let back = image_from_pixmap(&pixmap);
        assert_eq!(back.get_pixel(0, 0).0[3], 128);
    }

    #[test]
    fn active_border_uses_configured_color() {
        let decoration = Decoration {
            active: true,
            active_rgb: (255, 0, 255),
            label: None,
        };
        let canvas = compose(None, Size::new(40, 30), &decoration).unwrap();
        let edge = canvas.pixel(20, 1).unwrap();
        assert_eq!((edge.red(), edge.green(), edge.blue()), (255, 0, 255));
        let inside = canvas.pixel(20, 15).unwrap();
        assert_eq!((inside.red(), inside.green(), inside.blue()), (0, 0, 0));
    }

    #[test]
    fn inactive_border_is_thinner_and_grey() {
        let decoration = Decoration {
            active: false,
            active_rgb: (255, 0, 255),
            label: None,
        };
        assert_eq!(decoration.border().0, INACTIVE_BORDER_WIDTH);
        let canvas = compose(None, Size::new(40, 30), &decoration).unwrap();
        let edge = canvas.pixel(20, 0).unwrap();
        assert!(edge.red() > 0 && edge.red() == edge.green() && edge.green() == edge.blue());
        let past_border = canvas.pixel(20, 3).unwrap();
        assert_eq!(past_border.red(), 0);
    }

    #[test]
    fn frame_is_stretched_to_canvas() {
        let frame = pixmap_from_image(solid(10, 10, [0, 0, 255, 255])).unwrap();
        let decoration = Decoration {
            active: false,
            active_rgb: (0, 255, 0),
            label: None,
        };
        let canvas = compose(Some(&frame), Size::new(50, 40), &decoration).unwrap();
        let pixel = canvas.pixel(25, 20).unwrap();
        assert_eq!(pixel.blue(), 255);
    }

    #[test]
    fn label_is_drawn_at_top_centre() {
        let mut label = Pixmap::new(20, 10).unwrap();
        label.fill(Color::WHITE);
        let decoration = Decoration {
            active: false,
            active_rgb: (0, 255, 0),
            label: Some(&label),
        };
        let canvas = compose(None, Size::new(100, 60), &decoration).unwrap();
        let top = LABEL_MARGIN as u32;

        assert_eq!(canvas.pixel(40, top).unwrap().red(), 255);
        assert_eq!(canvas.pixel(59, top + 9).unwrap().red(), 255);
        assert_eq!(canvas.pixel(39, top + 5).unwrap().red(), 0);
        assert_eq!(canvas.pixel(60, top + 5).unwrap().red(), 0);
        assert_eq!(canvas.pixel(50, top + 10).unwrap().red(), 0);
    }

    #[test]
    fn label_without_fonts_is_none() {
        assert!(LabelRenderer::without_fonts().render("Jane Doe").is_none());
        assert!(LabelRenderer::without_fonts().render("  ").is_none());
    }

    #[test]
    fn xml_is_escaped() {
        assert_eq!(escape_xml("A&B <c>"), "A&amp;B &lt;c&gt;");
    }
}
