//! Surface layout – the frozen representation between layout computation
//! and rasterization. Encodes exactly what gets painted for one surface,
//! in logical pixels relative to the surface's top-left corner.

use serde::{Deserialize, Serialize};

use crate::fonts::FontManager;
use crate::layout::{BoxContent, PositionedBox};
use crate::style::{self, Color};

/// A laid-out surface ready for rasterization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceLayout {
    /// Border-box width of the root element.
    pub width: f32,
    /// Border-box height of the root element.
    pub height: f32,
    /// Where the root sits in the document (off-screen for capture clones).
    #[serde(default)]
    pub origin: [f32; 2],
    /// Paint-time uniform scale of the root; 1.0 means untransformed.
    #[serde(default = "SurfaceLayout::unit_scale")]
    pub transform_scale: f32,
    pub root: LayoutBox,
}

/// A positioned rectangle with optional content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutBox {
    /// Position relative to the surface top-left.
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,

    pub background_color: Option<[f32; 4]>,
    pub border: Option<BorderStyle>,
    #[serde(default)]
    pub border_radius: f32,

    /// Content (mutually exclusive in practice)
    pub text: Option<TextContent>,
    pub image: Option<ImageContent>,

    pub children: Vec<LayoutBox>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BorderStyle {
    pub width: f32,
    pub color: [f32; 4],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextContent {
    /// Pre-wrapped lines of text.
    pub lines: Vec<TextLine>,
    pub font_family: String,
    pub font_size: f32,
    pub bold: bool,
    pub color: [f32; 4],
    pub line_height: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextLine {
    pub text: String,
    /// X offset within the layout box (for alignment)
    pub x_offset: f32,
    /// Y offset from the top of the layout box
    pub y_offset: f32,
    pub width: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageContent {
    pub src: String,
    pub width: f32,
    pub height: f32,
}

impl SurfaceLayout {
    fn unit_scale() -> f32 {
        1.0
    }

    /// Freeze a positioned box tree. Coordinates are rebased so the root's
    /// border box starts at (0, 0).
    pub fn from_positioned(root: &PositionedBox, fonts: &FontManager) -> Self {
        Self {
            width: root.width,
            height: root.height,
            origin: [root.x, root.y],
            transform_scale: root.style.transform_scale,
            root: build_layout_box(root, root.x, root.y, fonts),
        }
    }

    /// Size of the surface as it appears on screen, after its transform.
    pub fn painted_size(&self) -> (f32, f32) {
        (
            self.width * self.transform_scale,
            self.height * self.transform_scale,
        )
    }

    /// Total number of boxes in the tree.
    pub fn box_count(&self) -> usize {
        fn count(b: &LayoutBox) -> usize {
            1 + b.children.iter().map(count).sum::<usize>()
        }
        count(&self.root)
    }

    /// Serialise to JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Deserialise from JSON.
    pub fn from_json(json: &str) -> Result<Self, String> {
        serde_json::from_str(json).map_err(|e| e.to_string())
    }
}

impl LayoutBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            background_color: None,
            border: None,
            border_radius: 0.0,
            text: None,
            image: None,
            children: Vec::new(),
        }
    }
}

fn rgba(c: Color) -> [f32; 4] {
    [c.r, c.g, c.b, c.a]
}

/// Recursively build a LayoutBox tree whose coordinates are relative to
/// `(origin_x, origin_y)`.
fn build_layout_box(
    pbox: &PositionedBox,
    origin_x: f32,
    origin_y: f32,
    fonts: &FontManager,
) -> LayoutBox {
    let s = &pbox.style;
    let mut lb = LayoutBox::new(pbox.x - origin_x, pbox.y - origin_y, pbox.width, pbox.height);

    if !s.background_color.is_transparent() {
        lb.background_color = Some(rgba(s.background_color));
    }
    if s.border_width > 0.0 {
        lb.border = Some(BorderStyle {
            width: s.border_width,
            color: rgba(s.border_color),
        });
    }
    lb.border_radius = s.border_radius.min(pbox.width / 2.0).min(pbox.height / 2.0);

    match &pbox.content {
        BoxContent::Text { lines, .. } => {
            let bold = s.font_weight == style::FontWeight::Bold;
            let line_height = fonts.line_height_px(s.font_size, s.line_height);
            let inner_width = pbox.width - s.padding_left - s.padding_right;
            let text_lines = lines
                .iter()
                .enumerate()
                .map(|(i, line)| {
                    let width = fonts.measure_text_width(line, s.font_size, bold, &s.font_family);
                    let slack = (inner_width - width).max(0.0);
                    let align = match s.text_align {
                        style::TextAlign::Left => 0.0,
                        style::TextAlign::Center => slack / 2.0,
                        style::TextAlign::Right => slack,
                    };
                    TextLine {
                        text: line.clone(),
                        x_offset: s.padding_left + align,
                        y_offset: s.padding_top + i as f32 * line_height,
                        width,
                    }
                })
                .collect();

            lb.text = Some(TextContent {
                lines: text_lines,
                font_family: s.font_family.clone(),
                font_size: s.font_size,
                bold,
                color: rgba(s.color),
                line_height,
            });
        }
        BoxContent::Image { src } => {
            lb.image = Some(ImageContent {
                src: src.clone(),
                width: pbox.width,
                height: pbox.height,
            });
        }
        BoxContent::None => {}
    }

    lb.children = pbox
        .children
        .iter()
        .map(|child| build_layout_box(child, origin_x, origin_y, fonts))
        .collect();
    lb
}
