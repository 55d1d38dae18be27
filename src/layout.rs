//! Layout engine – uses Taffy to compute flexbox layout from a styled
//! element tree, then converts the result into a tree of positioned boxes.

use std::collections::HashMap;
use taffy::prelude::*;
use taffy::TaffyError;

use crate::dom::Tag;
use crate::fonts::{wrap_text, FontManager};
use crate::style::{self, ComputedStyle, FontWeight, StyledNode, TextTransform};

// ---------------------------------------------------------------------------
// Positioned box tree
// ---------------------------------------------------------------------------

/// A positioned box in document coordinates.
#[derive(Debug, Clone)]
pub struct PositionedBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub style: ComputedStyle,
    pub content: BoxContent,
    pub children: Vec<PositionedBox>,
}

#[derive(Debug, Clone)]
pub enum BoxContent {
    None,
    Text { text: String, lines: Vec<String> },
    Image { src: String },
}

// ---------------------------------------------------------------------------
// Build Taffy tree from styled nodes
// ---------------------------------------------------------------------------

struct LayoutBuilder<'a> {
    taffy: TaffyTree<()>,
    fonts: &'a FontManager,
    node_styles: HashMap<NodeId, ComputedStyle>,
    node_content: HashMap<NodeId, BoxContent>,
    available_width: f32,
}

impl<'a> LayoutBuilder<'a> {
    fn new(fonts: &'a FontManager, available_width: f32) -> Self {
        Self {
            taffy: TaffyTree::new(),
            fonts,
            node_styles: HashMap::new(),
            node_content: HashMap::new(),
            available_width,
        }
    }

    /// Collect all text content from an inline subtree (spans, text nodes).
    fn collect_inline_text(node: &StyledNode) -> String {
        match node {
            StyledNode::Text { text, .. } => text.clone(),
            StyledNode::Element { children, .. } => children
                .iter()
                .map(Self::collect_inline_text)
                .collect::<Vec<_>>()
                .join(""),
        }
    }

    /// True when every child is a text node or a display:inline element.
    fn all_inline(children: &[StyledNode]) -> bool {
        children.iter().all(|c| match c {
            StyledNode::Text { .. } => true,
            StyledNode::Element {
                style,
                children: gc,
                ..
            } => style.display == style::Display::Inline && Self::all_inline(gc),
        })
    }

    /// Width of `node` laid out without any wrapping, margins included.
    fn natural_width(&self, node: &StyledNode) -> f32 {
        let (tag, style, children, attrs) = match node {
            StyledNode::Text { text, style } => return self.single_line_width(text, style),
            StyledNode::Element {
                tag,
                style,
                children,
                attrs,
            } => (tag, style, children, attrs),
        };
        let outer = style.margin_left + style.margin_right;
        if let style::Dimension::Px(w) = style.width {
            return w + outer;
        }
        let chrome = style.padding_left + style.padding_right + 2.0 * style.border_width;

        let content = if tag.is_text_block() && !children.is_empty() && Self::all_inline(children) {
            let combined: String = children.iter().map(Self::collect_inline_text).collect();
            self.single_line_width(&combined, style)
        } else if *tag == Tag::Img {
            let src = attrs.get("src").map(|s| s.as_str()).unwrap_or("");
            match resolve_img_auto_dimensions(src, style, 0.0).map(|s| s.width) {
                Some(style::Dimension::Px(w)) => w,
                _ => 0.0,
            }
        } else if style.display == style::Display::Flex
            && style.flex_direction == style::FlexDirection::Row
        {
            let gaps = style.gap * children.len().saturating_sub(1) as f32;
            children.iter().map(|c| self.natural_width(c)).sum::<f32>() + gaps
        } else {
            children
                .iter()
                .map(|c| self.natural_width(c))
                .fold(0.0f32, f32::max)
        };
        content + chrome + outer
    }

    fn single_line_width(&self, text: &str, style: &ComputedStyle) -> f32 {
        let bold = style.font_weight == FontWeight::Bold;
        self.fonts.measure_text_width(
            &display_text(text, style),
            style.font_size,
            bold,
            &style.font_family,
        )
    }

    fn build_node(
        &mut self,
        styled: &StyledNode,
        parent_width: f32,
        parent_is_row: bool,
    ) -> Result<NodeId, TaffyError> {
        match styled {
            StyledNode::Text { text, style } => {
                self.build_text_node(text, style, parent_width, parent_is_row)
            }
            StyledNode::Element {
                tag,
                style,
                children,
                attrs,
            } => self.build_element_node(tag, style, children, attrs, parent_width, parent_is_row),
        }
    }

    /// Like `build_text_node` but also applies paragraph-level margin/padding
    /// from the enclosing block style so that headings keep their spacing.
    fn build_text_node_with_para_style(
        &mut self,
        text: &str,
        block_style: &ComputedStyle,
        parent_width: f32,
        parent_is_row: bool,
    ) -> Result<NodeId, TaffyError> {
        let inner = parent_width - block_style.padding_left - block_style.padding_right;
        let node = self.build_text_node(text, block_style, inner, parent_is_row)?;
        let current = self.taffy.style(node)?.clone();
        let text_height = match current.size.height {
            Dimension::Length(h) => h,
            _ => 0.0,
        };
        let text_width = match current.size.width {
            Dimension::Length(w) => w,
            _ => 0.0,
        };
        let updated = Style {
            // The size above is the content box; Taffy sizes the border box.
            size: Size {
                width: Dimension::Length(
                    text_width + block_style.padding_left + block_style.padding_right,
                ),
                height: Dimension::Length(
                    text_height + block_style.padding_top + block_style.padding_bottom,
                ),
            },
            margin: margin_rect(block_style),
            padding: padding_rect(block_style),
            ..current
        };
        self.taffy.set_style(node, updated)?;
        Ok(node)
    }

    fn build_text_node(
        &mut self,
        text: &str,
        style: &ComputedStyle,
        parent_width: f32,
        parent_is_row: bool,
    ) -> Result<NodeId, TaffyError> {
        let bold = style.font_weight == FontWeight::Bold;
        let family = &style.font_family;
        let font_size = style.font_size;
        let line_height_px = self.fonts.line_height_px(font_size, style.line_height);

        let text = display_text(text, style);

        let max_w = if parent_width > 0.0 {
            parent_width
        } else {
            self.available_width
        };
        let lines = wrap_text(&text, font_size, bold, family, max_w, self.fonts);

        let text_width = lines
            .iter()
            .map(|l| self.fonts.measure_text_width(l, font_size, bold, family))
            .fold(0.0f32, f32::max);
        let text_height = lines.len() as f32 * line_height_px;

        // In block flow, text-align positions the run inside its container;
        // left-aligned runs follow the container's align-items.
        let align_self = match (parent_is_row, style.text_align) {
            (false, style::TextAlign::Center) => Some(AlignSelf::Center),
            (false, style::TextAlign::Right) => Some(AlignSelf::End),
            _ => None,
        };

        let taffy_style = Style {
            size: Size {
                width: Dimension::Length(text_width),
                height: Dimension::Length(text_height),
            },
            flex_shrink: 0.0,
            align_self,
            ..Default::default()
        };

        let node = self.taffy.new_leaf(taffy_style)?;
        self.node_styles.insert(node, style.clone());
        self.node_content
            .insert(node, BoxContent::Text { text, lines });
        Ok(node)
    }

    fn build_element_node(
        &mut self,
        tag: &Tag,
        style: &ComputedStyle,
        children: &[StyledNode],
        attrs: &HashMap<String, String>,
        parent_width: f32,
        parent_is_row: bool,
    ) -> Result<NodeId, TaffyError> {
        // Paragraph-like elements whose children are all inline get their
        // text merged into a single wrapped text node so spans flow.
        if tag.is_text_block() && !children.is_empty() && Self::all_inline(children) {
            let combined: String = children.iter().map(Self::collect_inline_text).collect();
            if !combined.trim().is_empty() {
                return self.build_text_node_with_para_style(
                    &combined,
                    style,
                    parent_width,
                    parent_is_row,
                );
            }
        }

        let my_width = match style.width {
            style::Dimension::Px(w) => w,
            style::Dimension::Percent(p) => parent_width * p / 100.0,
            style::Dimension::Auto => parent_width - style.margin_left - style.margin_right,
        };
        let inner_width =
            my_width - style.padding_left - style.padding_right - 2.0 * style.border_width;

        // Flex rows hand each child a wrap width from its single-line width.
        let is_row = style.display == style::Display::Flex
            && style.flex_direction == style::FlexDirection::Row;
        let child_widths = if is_row {
            let gap_total = style.gap * children.len().saturating_sub(1) as f32;
            let naturals: Vec<f32> = children.iter().map(|c| self.natural_width(c)).collect();
            allocate_row_widths(&naturals, inner_width - gap_total)
        } else {
            vec![inner_width; children.len()]
        };

        let mut child_nodes = Vec::with_capacity(children.len());
        for (child, width) in children.iter().zip(child_widths) {
            child_nodes.push(self.build_node(child, width, is_row)?);
        }

        // `<img>` without explicit dimensions takes its intrinsic size from
        // the decoded data URI, otherwise Taffy would size it 0×0.
        let style_override = if *tag == Tag::Img
            && (matches!(style.width, style::Dimension::Auto)
                || matches!(style.height, style::Dimension::Auto))
        {
            let src = attrs.get("src").map(|s| s.as_str()).unwrap_or("");
            resolve_img_auto_dimensions(src, style, parent_width)
        } else {
            None
        };

        let effective_style = style_override.as_ref().unwrap_or(style);
        let taffy_style = self.computed_to_taffy(effective_style);
        let node = self.taffy.new_with_children(taffy_style, &child_nodes)?;
        self.node_styles.insert(node, effective_style.clone());

        if *tag == Tag::Img {
            let src = attrs.get("src").cloned().unwrap_or_default();
            self.node_content.insert(node, BoxContent::Image { src });
        }

        Ok(node)
    }

    fn computed_to_taffy(&self, s: &ComputedStyle) -> Style {
        let mut ts = Style::default();

        match s.display {
            style::Display::Flex => {
                ts.display = taffy::Display::Flex;
                ts.flex_direction = match s.flex_direction {
                    style::FlexDirection::Row => taffy::FlexDirection::Row,
                    style::FlexDirection::Column => taffy::FlexDirection::Column,
                };
                ts.flex_wrap = match s.flex_wrap {
                    style::FlexWrap::NoWrap => taffy::FlexWrap::NoWrap,
                    style::FlexWrap::Wrap => taffy::FlexWrap::Wrap,
                };
                ts.justify_content = Some(match s.justify_content {
                    style::JustifyContent::Start => taffy::JustifyContent::Start,
                    style::JustifyContent::End => taffy::JustifyContent::End,
                    style::JustifyContent::Center => taffy::JustifyContent::Center,
                    style::JustifyContent::SpaceBetween => taffy::JustifyContent::SpaceBetween,
                });
                ts.align_items = Some(match s.align_items {
                    style::AlignItems::Start => taffy::AlignItems::Start,
                    style::AlignItems::End => taffy::AlignItems::End,
                    style::AlignItems::Center => taffy::AlignItems::Center,
                    style::AlignItems::Stretch => taffy::AlignItems::Stretch,
                });
            }
            style::Display::Block | style::Display::InlineBlock => {
                // Block-level elements stack vertically.
                ts.display = taffy::Display::Flex;
                ts.flex_direction = taffy::FlexDirection::Column;
            }
            style::Display::Inline => {
                ts.display = taffy::Display::Flex;
                ts.flex_direction = taffy::FlexDirection::Row;
                ts.flex_wrap = taffy::FlexWrap::Wrap;
            }
            style::Display::None => {
                ts.display = taffy::Display::None;
            }
        }

        ts.size = Size {
            width: dim_to_taffy(s.width),
            height: dim_to_taffy(s.height),
        };
        // Allow flex items to compress below their natural content size.
        ts.min_size = Size {
            width: if s.flex_shrink > 0.0 || s.flex_grow > 0.0 {
                Dimension::Length(0.0)
            } else {
                dim_to_taffy(s.min_width)
            },
            height: Dimension::Auto,
        };
        ts.max_size = Size {
            width: dim_to_taffy(s.max_width),
            height: Dimension::Auto,
        };

        ts.flex_grow = s.flex_grow;
        ts.flex_shrink = s.flex_shrink;
        ts.margin = margin_rect(s);
        ts.padding = padding_rect(s);
        ts.border = Rect {
            top: LengthPercentage::Length(s.border_width),
            right: LengthPercentage::Length(s.border_width),
            bottom: LengthPercentage::Length(s.border_width),
            left: LengthPercentage::Length(s.border_width),
        };
        ts.gap = Size {
            width: LengthPercentage::Length(s.gap),
            height: LengthPercentage::Length(s.gap),
        };

        ts
    }

    /// Extract positioned boxes after layout computation.
    fn extract(&self, node: NodeId, offset_x: f32, offset_y: f32) -> Result<PositionedBox, TaffyError> {
        let layout = self.taffy.layout(node)?;
        let style = self.node_styles.get(&node).cloned().unwrap_or_default();
        let content = self
            .node_content
            .get(&node)
            .cloned()
            .unwrap_or(BoxContent::None);

        let x = offset_x + layout.location.x;
        let y = offset_y + layout.location.y;

        let children = self
            .taffy
            .children(node)?
            .iter()
            .map(|&child| self.extract(child, x, y))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(PositionedBox {
            x,
            y,
            width: layout.size.width,
            height: layout.size.height,
            style,
            content,
            children,
        })
    }
}

fn dim_to_taffy(d: style::Dimension) -> Dimension {
    match d {
        style::Dimension::Auto => Dimension::Auto,
        style::Dimension::Px(v) => Dimension::Length(v),
        style::Dimension::Percent(v) => Dimension::Percent(v / 100.0),
    }
}

fn margin_rect(s: &ComputedStyle) -> Rect<LengthPercentageAuto> {
    Rect {
        top: LengthPercentageAuto::Length(s.margin_top),
        right: LengthPercentageAuto::Length(s.margin_right),
        bottom: LengthPercentageAuto::Length(s.margin_bottom),
        left: LengthPercentageAuto::Length(s.margin_left),
    }
}

fn padding_rect(s: &ComputedStyle) -> Rect<LengthPercentage> {
    Rect {
        top: LengthPercentage::Length(s.padding_top),
        right: LengthPercentage::Length(s.padding_right),
        bottom: LengthPercentage::Length(s.padding_bottom),
        left: LengthPercentage::Length(s.padding_left),
    }
}

// ---------------------------------------------------------------------------
// Image intrinsic-size helper
// ---------------------------------------------------------------------------

/// Decode a base64 data-URI image and return a cloned [`ComputedStyle`] with
/// any `Auto` width/height replaced by values derived from the intrinsic
/// dimensions. `None` when the src cannot be decoded or nothing needs fixing.
/// Text as painted: whitespace collapsed, `text-transform` applied.
fn display_text(text: &str, style: &ComputedStyle) -> String {
    let normalised = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match style.text_transform {
        TextTransform::Uppercase => normalised.to_uppercase(),
        TextTransform::None => normalised,
    }
}

/// Tolerance added to a child's wrap width so measuring its own line again
/// never wraps the last word.
const WRAP_SLACK: f32 = 0.5;

/// Split a flex row's `available` width between children with the given
/// single-line widths. When everything fits, every child may use the whole
/// free space. Otherwise children narrower than an even share keep their
/// width and the rest share what is left.
fn allocate_row_widths(naturals: &[f32], available: f32) -> Vec<f32> {
    let total: f32 = naturals.iter().sum();
    if total <= available {
        let free = available - total;
        return naturals.iter().map(|n| n + free + WRAP_SLACK).collect();
    }

    let mut widths = vec![0.0f32; naturals.len()];
    let mut open: Vec<usize> = (0..naturals.len()).collect();
    let mut remaining = available;
    loop {
        if open.is_empty() {
            break;
        }
        let share = remaining / open.len() as f32;
        let (fits, overflow): (Vec<usize>, Vec<usize>) =
            open.iter().partition(|&&i| naturals[i] <= share);
        if fits.is_empty() {
            break;
        }
        for i in fits {
            widths[i] = naturals[i] + WRAP_SLACK;
            remaining -= naturals[i];
        }
        open = overflow;
    }
    if !open.is_empty() {
        let share = (remaining / open.len() as f32).max(1.0);
        for i in open {
            widths[i] = share;
        }
    }
    widths
}

fn resolve_img_auto_dimensions(
    src: &str,
    style: &ComputedStyle,
    parent_width: f32,
) -> Option<ComputedStyle> {
    let bytes = crate::raster::parse_data_uri(src).ok()?;
    let img = ::image::load_from_memory(&bytes).ok()?;
    let (px_w, px_h) = (img.width() as f32, img.height() as f32);
    if px_w == 0.0 || px_h == 0.0 {
        return None;
    }
    let aspect = px_w / px_h;

    let known_w = match style.width {
        style::Dimension::Px(v) => Some(v),
        style::Dimension::Percent(p) => Some(parent_width * p / 100.0),
        style::Dimension::Auto => None,
    };
    let known_h = match style.height {
        style::Dimension::Px(v) => Some(v),
        _ => None,
    };

    let mut s = style.clone();
    match (known_w, known_h) {
        (Some(w), None) => s.height = style::Dimension::Px((w / aspect).max(1.0)),
        (None, Some(h)) => s.width = style::Dimension::Px((h * aspect).max(1.0)),
        (None, None) => {
            s.width = style::Dimension::Px(px_w);
            s.height = style::Dimension::Px(px_h);
        }
        (Some(_), Some(_)) => return None,
    }
    Some(s)
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Lay out one root element inside a viewport of `viewport_width` and return
/// its positioned box tree.
///
/// An absolutely positioned root is placed at its `left`/`top` offsets and
/// is not constrained by the viewport width.
pub fn compute_layout(
    root: &StyledNode,
    viewport_width: f32,
    fonts: &FontManager,
) -> Result<PositionedBox, TaffyError> {
    let (absolute, left, top) = match root {
        StyledNode::Element { style, .. } => (
            style.position == style::Position::Absolute,
            style.left.unwrap_or(0.0),
            style.top.unwrap_or(0.0),
        ),
        StyledNode::Text { .. } => (false, 0.0, 0.0),
    };
    let container_width = match root {
        StyledNode::Element { style, .. } if absolute => match style.width {
            style::Dimension::Px(w) => w.max(viewport_width),
            _ => viewport_width,
        },
        _ => viewport_width,
    };

    let mut builder = LayoutBuilder::new(fonts, container_width);
    let root_id = builder.build_node(root, container_width, false)?;

    let viewport_style = Style {
        display: taffy::Display::Flex,
        flex_direction: taffy::FlexDirection::Column,
        align_items: Some(if absolute {
            taffy::AlignItems::Start
        } else {
            taffy::AlignItems::Stretch
        }),
        size: Size {
            width: Dimension::Length(container_width),
            height: Dimension::Auto,
        },
        ..Default::default()
    };
    let viewport = builder.taffy.new_with_children(viewport_style, &[root_id])?;

    builder.taffy.compute_layout(
        viewport,
        Size {
            width: AvailableSpace::Definite(container_width),
            height: AvailableSpace::MaxContent,
        },
    )?;

    let (offset_x, offset_y) = if absolute { (left, top) } else { (0.0, 0.0) };
    builder.extract(root_id, offset_x, offset_y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse_element;
    use crate::style::style_element;

    fn layout(html: &str, width: f32) -> PositionedBox {
        let root = parse_element(html).unwrap();
        compute_layout(&style_element(&root), width, &FontManager::default()).unwrap()
    }

    #[test]
    fn layout_simple_paragraph() {
        let root = layout("<div><p>Hello world</p></div>", 400.0);
        assert_eq!(root.width, 400.0);
        assert!(root.height > 0.0, "Box should have height");
        assert!(matches!(root.children[0].content, BoxContent::Text { .. }));
    }

    #[test]
    fn explicit_width_wins_over_viewport() {
        let root = layout(r#"<div style="width: 420px"><p>x</p></div>"#, 900.0);
        assert_eq!(root.width, 420.0);
    }

    #[test]
    fn flex_row_spreads_children() {
        let root = layout(
            r#"<div class="flex justify-between" style="width: 300px"><div>A</div><div>B</div></div>"#,
            300.0,
        );
        let a = &root.children[0];
        let b = &root.children[1];
        assert!(a.x < b.x);
        assert!((b.x + b.width - 300.0).abs() < 0.5);
    }

    #[test]
    fn absolute_root_is_offset() {
        let root = layout(
            r#"<div style="position: absolute; left: -5000px; top: 10px; width: 420px"><p>x</p></div>"#,
            200.0,
        );
        assert_eq!(root.x, -5000.0);
        assert_eq!(root.y, 10.0);
        assert_eq!(root.width, 420.0);
    }

    #[test]
    fn longer_text_grows_height() {
        let short = layout(r#"<div style="width: 200px"><p>Short</p></div>"#, 200.0);
        let long = layout(
            r#"<div style="width: 200px"><p>A considerably longer sentence that has to wrap across several lines</p></div>"#,
            200.0,
        );
        assert!(long.height > short.height);
    }

    #[test]
    fn uppercase_transform_applies_to_lines() {
        let root = layout(r#"<div><p class="uppercase">paid</p></div>"#, 200.0);
        match &root.children[0].content {
            BoxContent::Text { lines, .. } => assert_eq!(lines, &vec!["PAID".to_string()]),
            other => panic!("unexpected content {other:?}"),
        }
    }

    fn text_lines(b: &PositionedBox) -> &[String] {
        match &b.content {
            BoxContent::Text { lines, .. } => lines,
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[test]
    fn row_value_that_fits_stays_on_one_line() {
        let root = layout(
            r#"<div style="width: 420px"><div class="flex justify-between gap-4 px-6">
                <p class="text-sm">Date &amp; Time</p>
                <p class="text-sm font-bold text-right">17 Oct 2025, 03:42 PM</p>
            </div></div>"#,
            420.0,
        );
        let row = &root.children[0];
        assert_eq!(text_lines(&row.children[1]), ["17 Oct 2025, 03:42 PM"]);
        assert_eq!(text_lines(&row.children[0]), ["Date & Time"]);
    }

    #[test]
    fn overflowing_row_child_takes_the_leftover_width() {
        let root = layout(
            r#"<div class="flex gap-4" style="width: 300px">
                <p>Ref</p>
                <p>a long value made of many words that cannot fit on a single line here</p>
            </div>"#,
            300.0,
        );
        let label = &root.children[0];
        let value = &root.children[1];
        assert_eq!(text_lines(label), ["Ref"]);
        assert!(text_lines(value).len() > 1);
        // Wider than an even split of the row.
        assert!(value.width > 150.0, "value width {}", value.width);
    }

    #[test]
    fn row_allocation_splits_only_on_overflow() {
        assert_eq!(allocate_row_widths(&[40.0, 60.0], 200.0), vec![140.5, 160.5]);

        let widths = allocate_row_widths(&[50.0, 400.0], 300.0);
        assert_eq!(widths, vec![50.5, 250.0]);

        let widths = allocate_row_widths(&[300.0, 300.0], 200.0);
        assert_eq!(widths, vec![100.0, 100.0]);
    }
}
