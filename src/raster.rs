//! Rasterization – paints a [`SurfaceLayout`] into an RGBA pixel buffer.
//!
//! [`SkiaRasterizer`] draws with tiny-skia: backgrounds, rounded borders,
//! images and glyph outlines read through ttf-parser. Without real font
//! bytes each word is drawn as a solid placeholder bar.

use std::future::Future;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64_STD, Engine as _};
use image::RgbaImage;
use tiny_skia::{
    FillRule, FilterQuality, IntSize, Paint, PathBuilder, Pixmap, PixmapPaint, Rect as SkiaRect,
    Stroke, Transform,
};

use crate::error::RasterError;
use crate::fonts::FontManager;
use crate::layout_config::{ImageContent, LayoutBox, SurfaceLayout, TextContent};
use crate::style::Color;

/// Capture settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterOptions {
    /// Device pixels per logical pixel.
    pub scale: f32,
    /// Solid fill painted under the surface.
    pub background_color: Color,
    /// Allow `<img>` sources that are not data URIs to be loaded.
    pub use_cors: bool,
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self {
            scale: 2.0,
            background_color: Color::WHITE,
            use_cors: true,
        }
    }
}

/// Everything a rasterizer needs, detached from the live document so no
/// lock is held while painting.
#[derive(Clone)]
pub struct CaptureTarget {
    pub layout: SurfaceLayout,
    pub fonts: Arc<FontManager>,
}

/// An RGBA pixel buffer (straight alpha).
#[derive(Debug, Clone, PartialEq)]
pub struct RasterImage {
    pixels: RgbaImage,
}

impl RasterImage {
    pub fn new(pixels: RgbaImage) -> Self {
        Self { pixels }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }
}

/// Turns a captured surface into pixels.
pub trait Rasterizer {
    fn rasterize(
        &self,
        target: CaptureTarget,
        options: RasterOptions,
    ) -> impl Future<Output = Result<RasterImage, RasterError>>;
}

/// tiny-skia backed rasterizer.
#[derive(Debug, Clone, Copy, Default)]
pub struct SkiaRasterizer;

impl Rasterizer for SkiaRasterizer {
    async fn rasterize(
        &self,
        target: CaptureTarget,
        options: RasterOptions,
    ) -> Result<RasterImage, RasterError> {
        paint_surface(&target.layout, &target.fonts, &options)
    }
}

/// Paint a surface synchronously. The canvas covers the surface as it
/// appears in the document, including its own transform.
pub fn paint_surface(
    layout: &SurfaceLayout,
    fonts: &FontManager,
    options: &RasterOptions,
) -> Result<RasterImage, RasterError> {
    let (painted_w, painted_h) = layout.painted_size();
    let scale = options.scale;
    if !(painted_w > 0.0 && painted_h > 0.0 && scale > 0.0) {
        return Err(RasterError::EmptySurface {
            width: painted_w,
            height: painted_h,
        });
    }
    let width = (painted_w * scale).round().max(1.0) as u32;
    let height = (painted_h * scale).round().max(1.0) as u32;
    let mut pixmap = Pixmap::new(width, height).ok_or(RasterError::Canvas { width, height })?;

    let [r, g, b, a] = options.background_color.to_rgba8();
    pixmap.fill(tiny_skia::Color::from_rgba8(r, g, b, a));

    let mut painter = Painter {
        pixmap: &mut pixmap,
        fonts,
        use_cors: options.use_cors,
        transform: Transform::from_scale(
            scale * layout.transform_scale,
            scale * layout.transform_scale,
        ),
    };
    painter.paint_box(&layout.root);

    let mut data = Vec::with_capacity((width * height * 4) as usize);
    for px in pixmap.pixels() {
        let c = px.demultiply();
        data.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
    }
    RgbaImage::from_raw(width, height, data)
        .map(RasterImage::new)
        .ok_or_else(|| RasterError::Other("pixel buffer size mismatch".to_string()))
}

struct Painter<'a> {
    pixmap: &'a mut Pixmap,
    fonts: &'a FontManager,
    use_cors: bool,
    transform: Transform,
}

impl Painter<'_> {
    fn paint_box(&mut self, lb: &LayoutBox) {
        if let Some(bg) = lb.background_color {
            if let Some(path) = rounded_rect_path(lb.x, lb.y, lb.width, lb.height, lb.border_radius) {
                let paint = solid_paint(bg);
                self.pixmap
                    .fill_path(&path, &paint, FillRule::Winding, self.transform, None);
            }
        }

        if let Some(border) = &lb.border {
            let half = border.width / 2.0;
            let path = rounded_rect_path(
                lb.x + half,
                lb.y + half,
                lb.width - border.width,
                lb.height - border.width,
                (lb.border_radius - half).max(0.0),
            );
            if let Some(path) = path {
                let paint = solid_paint(border.color);
                let stroke = Stroke {
                    width: border.width,
                    ..Default::default()
                };
                self.pixmap
                    .stroke_path(&path, &paint, &stroke, self.transform, None);
            }
        }

        if let Some(text) = &lb.text {
            self.paint_text(lb, text);
        }
        if let Some(img) = &lb.image {
            self.paint_image(lb, img);
        }

        for child in &lb.children {
            self.paint_box(child);
        }
    }

    fn paint_text(&mut self, lb: &LayoutBox, text: &TextContent) {
        let fonts = self.fonts;
        let paint = solid_paint(text.color);
        let ascender = fonts.ascender_px(text.font_size, text.bold, &text.font_family);
        let face = fonts.face(&text.font_family, text.bold);

        for line in &text.lines {
            let x = lb.x + line.x_offset;
            let top = lb.y + line.y_offset;
            // Centre the em box within the line box.
            let baseline = top + (text.line_height - text.font_size) / 2.0 + ascender;

            match &face {
                Some(face) => {
                    let scale = text.font_size / face.units_per_em() as f32;
                    let mut pen_x = x;
                    for ch in line.text.chars() {
                        let Some(gid) = face.glyph_index(ch) else {
                            pen_x += text.font_size * 0.5;
                            continue;
                        };
                        if let Some(path) = glyph_path(face, gid, pen_x, baseline, scale) {
                            self.pixmap
                                .fill_path(&path, &paint, FillRule::Winding, self.transform, None);
                        }
                        pen_x += face.glyph_hor_advance(gid).unwrap_or(0) as f32 * scale;
                    }
                }
                None => self.paint_placeholder_line(&line.text, x, top, text, &paint),
            }
        }
    }

    /// One bar per word, spanning the x-height band of the line.
    fn paint_placeholder_line(
        &mut self,
        line: &str,
        x: f32,
        top: f32,
        text: &TextContent,
        paint: &Paint<'_>,
    ) {
        let space = self
            .fonts
            .measure_text_width(" ", text.font_size, text.bold, &text.font_family);
        let bar_height = text.font_size * 0.5;
        let bar_top = top + (text.line_height - bar_height) / 2.0;
        let mut pen_x = x;
        for word in line.split(' ') {
            let w = self
                .fonts
                .measure_text_width(word, text.font_size, text.bold, &text.font_family);
            if let Some(rect) = SkiaRect::from_xywh(pen_x, bar_top, w, bar_height) {
                self.pixmap.fill_rect(rect, paint, self.transform, None);
            }
            pen_x += w + space;
        }
    }

    fn paint_image(&mut self, lb: &LayoutBox, img: &ImageContent) {
        let bytes = match load_image_bytes(&img.src, self.use_cors) {
            Ok(b) => b,
            Err(e) => {
                log::warn!("Skipping image – {e}");
                return;
            }
        };
        let decoded = match ::image::load_from_memory(&bytes) {
            Ok(i) => i.to_rgba8(),
            Err(e) => {
                log::warn!("Skipping image – decode error: {e}");
                return;
            }
        };
        let Some(source) = rgba_to_pixmap(&decoded) else {
            return;
        };

        let sx = img.width / source.width() as f32;
        let sy = img.height / source.height() as f32;
        if !(sx.is_finite() && sy.is_finite()) {
            return;
        }
        let paint = PixmapPaint {
            quality: FilterQuality::Bicubic,
            ..Default::default()
        };
        let transform = self
            .transform
            .pre_concat(Transform::from_row(sx, 0.0, 0.0, sy, lb.x, lb.y));
        self.pixmap
            .draw_pixmap(0, 0, source.as_ref(), &paint, transform, None);
    }
}

fn solid_paint(color: [f32; 4]) -> Paint<'static> {
    let [r, g, b, a] = Color {
        r: color[0],
        g: color[1],
        b: color[2],
        a: color[3],
    }
    .to_rgba8();
    let mut paint = Paint::default();
    paint.set_color_rgba8(r, g, b, a);
    paint.anti_alias = true;
    paint
}

/// Rectangle path with circular corners of radius `r` (clamped).
fn rounded_rect_path(x: f32, y: f32, w: f32, h: f32, r: f32) -> Option<tiny_skia::Path> {
    if w <= 0.0 || h <= 0.0 {
        return None;
    }
    let r = r.min(w / 2.0).min(h / 2.0).max(0.0);
    if r == 0.0 {
        return SkiaRect::from_xywh(x, y, w, h).map(PathBuilder::from_rect);
    }
    // Cubic approximation of a quarter circle.
    let k = r * 0.552_284_8;
    let mut pb = PathBuilder::new();
    pb.move_to(x + r, y);
    pb.line_to(x + w - r, y);
    pb.cubic_to(x + w - r + k, y, x + w, y + r - k, x + w, y + r);
    pb.line_to(x + w, y + h - r);
    pb.cubic_to(x + w, y + h - r + k, x + w - r + k, y + h, x + w - r, y + h);
    pb.line_to(x + r, y + h);
    pb.cubic_to(x + r - k, y + h, x, y + h - r + k, x, y + h - r);
    pb.line_to(x, y + r);
    pb.cubic_to(x, y + r - k, x + r - k, y, x + r, y);
    pb.close();
    pb.finish()
}

fn glyph_path(
    face: &ttf_parser::Face,
    glyph: ttf_parser::GlyphId,
    x: f32,
    baseline_y: f32,
    scale: f32,
) -> Option<tiny_skia::Path> {
    use ttf_parser::OutlineBuilder;

    struct PathConverter {
        builder: PathBuilder,
        scale: f32,
        x: f32,
        y: f32,
    }

    impl OutlineBuilder for PathConverter {
        fn move_to(&mut self, px: f32, py: f32) {
            self.builder
                .move_to(self.x + px * self.scale, self.y - py * self.scale);
        }

        fn line_to(&mut self, px: f32, py: f32) {
            self.builder
                .line_to(self.x + px * self.scale, self.y - py * self.scale);
        }

        fn quad_to(&mut self, x1: f32, y1: f32, px: f32, py: f32) {
            self.builder.quad_to(
                self.x + x1 * self.scale,
                self.y - y1 * self.scale,
                self.x + px * self.scale,
                self.y - py * self.scale,
            );
        }

        fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, px: f32, py: f32) {
            self.builder.cubic_to(
                self.x + x1 * self.scale,
                self.y - y1 * self.scale,
                self.x + x2 * self.scale,
                self.y - y2 * self.scale,
                self.x + px * self.scale,
                self.y - py * self.scale,
            );
        }

        fn close(&mut self) {
            self.builder.close();
        }
    }

    let mut converter = PathConverter {
        builder: PathBuilder::new(),
        scale,
        x,
        y: baseline_y,
    };
    face.outline_glyph(glyph, &mut converter)?;
    converter.builder.finish()
}

/// tiny-skia wants premultiplied RGBA.
fn rgba_to_pixmap(img: &RgbaImage) -> Option<Pixmap> {
    let (w, h) = img.dimensions();
    let size = IntSize::from_wh(w, h)?;
    let mut data = Vec::with_capacity((w * h * 4) as usize);
    for px in img.pixels() {
        let [r, g, b, a] = px.0;
        let premul = |c: u8| ((c as u16 * a as u16 + 127) / 255) as u8;
        data.extend_from_slice(&[premul(r), premul(g), premul(b), a]);
    }
    Pixmap::from_vec(data, size)
}

fn load_image_bytes(src: &str, use_cors: bool) -> Result<Vec<u8>, String> {
    if src.starts_with("data:") {
        return parse_data_uri(src);
    }
    if !use_cors {
        return Err(format!("cross-origin source not permitted: {src:?}"));
    }
    let path = src.strip_prefix("file://").unwrap_or(src);
    std::fs::read(path).map_err(|e| format!("failed to read '{path}': {e}"))
}

/// Decode a `data:<mime>;base64,<payload>` URI into raw bytes.
pub fn parse_data_uri(src: &str) -> Result<Vec<u8>, String> {
    let rest = src.strip_prefix("data:").ok_or_else(|| {
        let preview: String = src.chars().take(80).collect();
        format!("Image src is not a data URI: {preview:?}")
    })?;
    let comma_pos = rest.find(',').ok_or_else(|| {
        "Invalid data URI: missing `,` separator between header and data".to_string()
    })?;
    let header = &rest[..comma_pos];
    if !header.contains(";base64") {
        return Err("Only base64-encoded data URIs are supported".to_string());
    }
    BASE64_STD
        .decode(rest[comma_pos + 1..].trim())
        .map_err(|e| format!("Base64 decode error: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout_config::TextLine;

    fn surface(width: f32, height: f32) -> SurfaceLayout {
        let mut root = LayoutBox::new(0.0, 0.0, width, height);
        let mut card = LayoutBox::new(10.0, 10.0, 40.0, 20.0);
        card.background_color = Some([1.0, 0.0, 0.0, 1.0]);
        root.children.push(card);
        SurfaceLayout {
            width,
            height,
            origin: [0.0, 0.0],
            transform_scale: 1.0,
            root,
        }
    }

    fn png_data_uri(w: u32, h: u32) -> String {
        let img = RgbaImage::from_pixel(w, h, ::image::Rgba([0, 0, 255, 255]));
        let mut bytes = Vec::new();
        img.write_to(
            &mut std::io::Cursor::new(&mut bytes),
            ::image::ImageFormat::Png,
        )
        .unwrap();
        format!("data:image/png;base64,{}", BASE64_STD.encode(bytes))
    }

    #[test]
    fn oversampled_dimensions() {
        let img = paint_surface(&surface(100.0, 50.0), &FontManager::default(), &RasterOptions::default())
            .unwrap();
        assert_eq!((img.width(), img.height()), (200, 100));
    }

    #[test]
    fn background_and_boxes_are_painted() {
        let img = paint_surface(&surface(100.0, 50.0), &FontManager::default(), &RasterOptions::default())
            .unwrap();
        assert_eq!(img.pixels().get_pixel(1, 1).0, [255, 255, 255, 255]);
        // Card spans 20..100 × 20..60 at 2×.
        assert_eq!(img.pixels().get_pixel(50, 40).0, [255, 0, 0, 255]);
    }

    #[test]
    fn transform_shrinks_capture() {
        let mut layout = surface(100.0, 50.0);
        layout.transform_scale = 0.5;
        let img = paint_surface(&layout, &FontManager::default(), &RasterOptions::default()).unwrap();
        assert_eq!((img.width(), img.height()), (100, 50));
    }

    #[test]
    fn empty_surface_is_an_error() {
        let err = paint_surface(&surface(0.0, 10.0), &FontManager::default(), &RasterOptions::default())
            .unwrap_err();
        assert!(matches!(err, RasterError::EmptySurface { .. }));
    }

    #[test]
    fn placeholder_text_is_drawn() {
        let mut layout = surface(100.0, 30.0);
        layout.root.children.clear();
        let mut t = LayoutBox::new(0.0, 0.0, 100.0, 30.0);
        t.text = Some(TextContent {
            lines: vec![TextLine {
                text: "Paid".into(),
                x_offset: 0.0,
                y_offset: 0.0,
                width: 32.0,
            }],
            font_family: "Helvetica".into(),
            font_size: 16.0,
            bold: false,
            color: [0.0, 0.0, 0.0, 1.0],
            line_height: 22.4,
        });
        layout.root.children.push(t);
        let img = paint_surface(&layout, &FontManager::default(), &RasterOptions::default()).unwrap();
        // Middle of the bar (x 0..32, y ~7..15 logical).
        assert_eq!(img.pixels().get_pixel(30, 22).0, [0, 0, 0, 255]);
    }

    #[test]
    fn data_uri_image_is_painted() {
        let mut layout = surface(20.0, 20.0);
        layout.root.children.clear();
        let mut b = LayoutBox::new(0.0, 0.0, 20.0, 20.0);
        b.image = Some(ImageContent {
            src: png_data_uri(4, 4),
            width: 20.0,
            height: 20.0,
        });
        layout.root.children.push(b);
        let img = paint_surface(&layout, &FontManager::default(), &RasterOptions::default()).unwrap();
        assert_eq!(img.pixels().get_pixel(20, 20).0, [0, 0, 255, 255]);
    }

    #[test]
    fn external_image_needs_cors() {
        assert!(load_image_bytes("/definitely/missing.png", false)
            .unwrap_err()
            .contains("cross-origin"));
        assert!(load_image_bytes("/definitely/missing.png", true)
            .unwrap_err()
            .contains("failed to read"));
    }

    #[test]
    fn data_uri_parsing() {
        assert_eq!(parse_data_uri("data:text/plain;base64,aGk=").unwrap(), b"hi");
        assert!(parse_data_uri("logo.png").is_err());
        assert!(parse_data_uri("data:text/plain,hi").is_err());
    }

    #[tokio::test]
    async fn skia_rasterizer_is_deterministic() {
        let target = CaptureTarget {
            layout: surface(64.0, 32.0),
            fonts: Arc::new(FontManager::default()),
        };
        let a = SkiaRasterizer
            .rasterize(target.clone(), RasterOptions::default())
            .await
            .unwrap();
        let b = SkiaRasterizer
            .rasterize(target, RasterOptions::default())
            .await
            .unwrap();
        assert_eq!(a, b);
    }
}
