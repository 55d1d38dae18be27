//! Style resolver – maps CSS inline styles and Tailwind-like utility classes
//! to a flat [`ComputedStyle`] struct consumed by the layout engine.

use std::collections::HashMap;

use crate::dom::{DomNode, ElementNode, Tag};

/// Fully resolved style for a single element.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputedStyle {
    // Display / layout
    pub display: Display,
    pub flex_direction: FlexDirection,
    pub flex_wrap: FlexWrap,
    pub flex_grow: f32,
    pub flex_shrink: f32,
    pub justify_content: JustifyContent,
    pub align_items: AlignItems,
    pub gap: f32,

    // Positioning
    pub position: Position,
    pub left: Option<f32>,
    pub top: Option<f32>,
    /// Uniform scale applied at paint time; 1.0 means `transform: none`.
    pub transform_scale: f32,

    // Sizing
    pub width: Dimension,
    pub height: Dimension,
    pub min_width: Dimension,
    pub max_width: Dimension,

    // Spacing (px)
    pub margin_top: f32,
    pub margin_right: f32,
    pub margin_bottom: f32,
    pub margin_left: f32,
    pub padding_top: f32,
    pub padding_right: f32,
    pub padding_bottom: f32,
    pub padding_left: f32,

    // Border
    pub border_width: f32,
    pub border_color: Color,
    pub border_radius: f32,

    // Typography
    pub font_size: f32,
    pub font_weight: FontWeight,
    pub font_family: String,
    pub color: Color,
    pub text_align: TextAlign,
    pub line_height: f32,
    pub text_transform: TextTransform,

    // Background
    pub background_color: Color,
}

impl Default for ComputedStyle {
    fn default() -> Self {
        Self {
            display: Display::Block,
            flex_direction: FlexDirection::Row,
            flex_wrap: FlexWrap::NoWrap,
            flex_grow: 0.0,
            flex_shrink: 1.0,
            justify_content: JustifyContent::Start,
            align_items: AlignItems::Stretch,
            gap: 0.0,
            position: Position::Static,
            left: None,
            top: None,
            transform_scale: 1.0,
            width: Dimension::Auto,
            height: Dimension::Auto,
            min_width: Dimension::Auto,
            max_width: Dimension::Auto,
            margin_top: 0.0,
            margin_right: 0.0,
            margin_bottom: 0.0,
            margin_left: 0.0,
            padding_top: 0.0,
            padding_right: 0.0,
            padding_bottom: 0.0,
            padding_left: 0.0,
            border_width: 0.0,
            border_color: Color::BLACK,
            border_radius: 0.0,
            font_size: 16.0,
            font_weight: FontWeight::Normal,
            font_family: "Helvetica".to_string(),
            color: Color::BLACK,
            text_align: TextAlign::Left,
            line_height: 1.4,
            text_transform: TextTransform::None,
            background_color: Color::TRANSPARENT,
        }
    }
}

// ---------------------------------------------------------------------------
// Supporting enums
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Display {
    Block,
    Flex,
    Inline,
    InlineBlock,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlexDirection {
    Row,
    Column,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlexWrap {
    NoWrap,
    Wrap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JustifyContent {
    Start,
    End,
    Center,
    SpaceBetween,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignItems {
    Start,
    End,
    Center,
    Stretch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Static,
    Absolute,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontWeight {
    Normal,
    Bold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAlign {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextTransform {
    None,
    Uppercase,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Dimension {
    Auto,
    Px(f32),
    Percent(f32),
}

/// RGBA colour (0.0 – 1.0).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const BLACK: Self = Self::rgb(0.0, 0.0, 0.0);
    pub const WHITE: Self = Self::rgb(1.0, 1.0, 1.0);
    pub const TRANSPARENT: Self = Self {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 0.0,
    };

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub fn is_transparent(&self) -> bool {
        self.a < 0.001
    }

    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim().trim_start_matches('#');
        if !hex.is_ascii() {
            return None;
        }
        let channel = |s: &str| u8::from_str_radix(s, 16).ok().map(|v| v as f32 / 255.0);
        match hex.len() {
            6 => Some(Self::rgb(
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
            )),
            3 => Some(Self::rgb(
                channel(&hex[0..1].repeat(2))?,
                channel(&hex[1..2].repeat(2))?,
                channel(&hex[2..3].repeat(2))?,
            )),
            _ => None,
        }
    }

    /// Parse a hex colour or one of the keywords `white`, `black`,
    /// `transparent`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "white" => Some(Self::WHITE),
            "black" => Some(Self::BLACK),
            "transparent" => Some(Self::TRANSPARENT),
            other => Self::from_hex(other),
        }
    }

    pub fn to_rgba8(self) -> [u8; 4] {
        let q = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        [q(self.r), q(self.g), q(self.b), q(self.a)]
    }
}

// ---------------------------------------------------------------------------
// Style resolution
// ---------------------------------------------------------------------------

/// Resolve the style for an element, inheriting text properties from its parent.
pub fn resolve_style(element: &ElementNode, parent: Option<&ComputedStyle>) -> ComputedStyle {
    let mut style = base_style_for_tag(&element.tag);

    if let Some(p) = parent {
        style.font_size = p.font_size;
        style.font_weight = p.font_weight;
        style.font_family = p.font_family.clone();
        style.color = p.color;
        style.text_align = p.text_align;
        style.line_height = p.line_height;
        style.text_transform = p.text_transform;
        // Headings keep their own size and weight.
        apply_heading_defaults(&element.tag, &mut style);
    }

    for class in element.classes() {
        apply_tailwind_class(&mut style, class);
    }

    if let Some(inline) = element.inline_style() {
        apply_inline_style(&mut style, inline);
    }

    style
}

fn apply_heading_defaults(tag: &Tag, s: &mut ComputedStyle) {
    match tag {
        Tag::H1 => {
            s.font_size = 28.0;
            s.font_weight = FontWeight::Bold;
        }
        Tag::H2 => {
            s.font_size = 22.0;
            s.font_weight = FontWeight::Bold;
        }
        Tag::H3 => {
            s.font_size = 18.0;
            s.font_weight = FontWeight::Bold;
        }
        _ => {}
    }
}

/// Default styles based on tag semantics.
fn base_style_for_tag(tag: &Tag) -> ComputedStyle {
    let mut s = ComputedStyle::default();
    apply_heading_defaults(tag, &mut s);
    match tag {
        Tag::H1 => {
            s.margin_top = 12.0;
            s.margin_bottom = 8.0;
        }
        Tag::H2 => {
            s.margin_top = 10.0;
            s.margin_bottom = 6.0;
        }
        Tag::H3 => {
            s.margin_top = 8.0;
            s.margin_bottom = 4.0;
        }
        Tag::P => {
            s.margin_bottom = 8.0;
        }
        Tag::Hr => {
            s.height = Dimension::Px(1.0);
            s.margin_top = 8.0;
            s.margin_bottom = 8.0;
            s.background_color = Color::rgb(0.831, 0.843, 0.871);
        }
        Tag::Span => {
            s.display = Display::Inline;
        }
        Tag::Img => {
            s.display = Display::InlineBlock;
        }
        Tag::Div | Tag::Body | Tag::Html | Tag::Head => {}
        Tag::Unknown(_) => {
            // Unrecognised elements are not displayed.
            s.display = Display::None;
        }
    }
    s
}

/// Apply a single Tailwind utility class.
fn apply_tailwind_class(s: &mut ComputedStyle, class: &str) {
    match class {
        // Display
        "flex" => s.display = Display::Flex,
        "block" => s.display = Display::Block,
        "inline" => s.display = Display::Inline,
        "inline-block" => s.display = Display::InlineBlock,
        "hidden" => s.display = Display::None,

        "flex-row" => s.flex_direction = FlexDirection::Row,
        "flex-col" => s.flex_direction = FlexDirection::Column,
        "flex-wrap" => s.flex_wrap = FlexWrap::Wrap,
        "flex-nowrap" => s.flex_wrap = FlexWrap::NoWrap,
        "flex-grow" | "grow" => s.flex_grow = 1.0,
        "shrink-0" => s.flex_shrink = 0.0,
        "flex-1" => {
            s.flex_grow = 1.0;
            s.flex_shrink = 1.0;
        }

        "justify-start" => s.justify_content = JustifyContent::Start,
        "justify-end" => s.justify_content = JustifyContent::End,
        "justify-center" => s.justify_content = JustifyContent::Center,
        "justify-between" => s.justify_content = JustifyContent::SpaceBetween,

        "items-start" => s.align_items = AlignItems::Start,
        "items-end" => s.align_items = AlignItems::End,
        "items-center" => s.align_items = AlignItems::Center,
        "items-stretch" => s.align_items = AlignItems::Stretch,

        // Positioning
        "absolute" => s.position = Position::Absolute,
        "static" => s.position = Position::Static,

        // Typography
        "font-bold" | "font-semibold" => s.font_weight = FontWeight::Bold,
        "font-normal" => s.font_weight = FontWeight::Normal,
        "uppercase" => s.text_transform = TextTransform::Uppercase,
        "normal-case" => s.text_transform = TextTransform::None,
        "text-left" => s.text_align = TextAlign::Left,
        "text-center" => s.text_align = TextAlign::Center,
        "text-right" => s.text_align = TextAlign::Right,
        "text-xs" => s.font_size = 12.0,
        "text-sm" => s.font_size = 14.0,
        "text-base" => s.font_size = 16.0,
        "text-lg" => s.font_size = 18.0,
        "text-xl" => s.font_size = 20.0,
        "text-2xl" => s.font_size = 24.0,
        "text-3xl" => s.font_size = 30.0,
        "leading-tight" => s.line_height = 1.25,
        "leading-normal" => s.line_height = 1.5,

        // Width
        "w-full" => s.width = Dimension::Percent(100.0),
        "w-auto" => s.width = Dimension::Auto,
        "w-1/2" => s.width = Dimension::Percent(50.0),
        "w-1/3" => s.width = Dimension::Percent(33.333),
        "w-2/3" => s.width = Dimension::Percent(66.666),

        // Border
        "border" => s.border_width = 1.0,
        "border-2" => s.border_width = 2.0,
        "rounded" => s.border_radius = 4.0,
        "rounded-md" => s.border_radius = 6.0,
        "rounded-lg" => s.border_radius = 8.0,
        "rounded-xl" => s.border_radius = 12.0,
        "rounded-full" => s.border_radius = 9999.0,

        _ => {
            try_parse_spacing_class(s, class);
            try_parse_color_class(s, class);
            try_parse_gap_class(s, class);
            try_parse_width_class(s, class);
            try_parse_height_class(s, class);
        }
    }
}

fn try_parse_spacing_class(s: &mut ComputedStyle, class: &str) {
    // p-{n}, px-{n}, m-{n}, mb-{n}, ... (1 unit = 4px)
    let Some((prefix, value_str)) = class.rsplit_once('-') else {
        return;
    };
    let value: f32 = match value_str.parse::<f32>() {
        Ok(v) => v * 4.0,
        Err(_) => return,
    };

    match prefix {
        "p" => {
            s.padding_top = value;
            s.padding_right = value;
            s.padding_bottom = value;
            s.padding_left = value;
        }
        "px" => {
            s.padding_left = value;
            s.padding_right = value;
        }
        "py" => {
            s.padding_top = value;
            s.padding_bottom = value;
        }
        "pt" => s.padding_top = value,
        "pr" => s.padding_right = value,
        "pb" => s.padding_bottom = value,
        "pl" => s.padding_left = value,
        "m" => {
            s.margin_top = value;
            s.margin_right = value;
            s.margin_bottom = value;
            s.margin_left = value;
        }
        "mx" => {
            s.margin_left = value;
            s.margin_right = value;
        }
        "my" => {
            s.margin_top = value;
            s.margin_bottom = value;
        }
        "mt" => s.margin_top = value,
        "mr" => s.margin_right = value,
        "mb" => s.margin_bottom = value,
        "ml" => s.margin_left = value,
        _ => {}
    }
}

/// Tailwind colour subset used by the confirmation template.
const PALETTE: &[(&str, Color)] = &[
    ("white", Color::WHITE),
    ("black", Color::BLACK),
    ("gray-50", Color::rgb(0.976, 0.980, 0.984)),
    ("gray-100", Color::rgb(0.953, 0.957, 0.961)),
    ("gray-200", Color::rgb(0.898, 0.906, 0.922)),
    ("gray-300", Color::rgb(0.831, 0.843, 0.871)),
    ("gray-400", Color::rgb(0.612, 0.639, 0.686)),
    ("gray-500", Color::rgb(0.420, 0.447, 0.502)),
    ("gray-600", Color::rgb(0.294, 0.333, 0.388)),
    ("gray-700", Color::rgb(0.216, 0.255, 0.318)),
    ("gray-800", Color::rgb(0.122, 0.161, 0.216)),
    ("gray-900", Color::rgb(0.067, 0.094, 0.153)),
    ("green-50", Color::rgb(0.941, 0.992, 0.957)),
    ("green-100", Color::rgb(0.863, 0.988, 0.906)),
    ("green-600", Color::rgb(0.086, 0.639, 0.290)),
    ("green-700", Color::rgb(0.082, 0.502, 0.239)),
    ("emerald-600", Color::rgb(0.020, 0.588, 0.412)),
    ("emerald-700", Color::rgb(0.016, 0.471, 0.341)),
    ("red-500", Color::rgb(0.937, 0.267, 0.267)),
];

fn try_parse_color_class(s: &mut ComputedStyle, class: &str) {
    let (target, name) = if let Some(name) = class.strip_prefix("text-") {
        (0, name)
    } else if let Some(name) = class.strip_prefix("bg-") {
        (1, name)
    } else if let Some(name) = class.strip_prefix("border-") {
        (2, name)
    } else {
        return;
    };
    if let Some((_, color)) = PALETTE.iter().find(|(n, _)| *n == name) {
        match target {
            0 => s.color = *color,
            1 => s.background_color = *color,
            _ => s.border_color = *color,
        }
    }
}

fn try_parse_gap_class(s: &mut ComputedStyle, class: &str) {
    if let Some(rest) = class.strip_prefix("gap-") {
        if let Ok(v) = rest.parse::<f32>() {
            s.gap = v * 4.0;
        }
    }
}

fn try_parse_width_class(s: &mut ComputedStyle, class: &str) {
    if let Some(rest) = class.strip_prefix("w-") {
        if let Ok(v) = rest.parse::<f32>() {
            s.width = Dimension::Px(v * 4.0);
        }
    }
}

fn try_parse_height_class(s: &mut ComputedStyle, class: &str) {
    if let Some(rest) = class.strip_prefix("h-") {
        if let Ok(v) = rest.parse::<f32>() {
            s.height = Dimension::Px(v * 4.0);
        }
    }
}

// ---------------------------------------------------------------------------
// Inline style parsing (limited subset)
// ---------------------------------------------------------------------------

fn apply_inline_style(s: &mut ComputedStyle, style_str: &str) {
    for decl in style_str.split(';') {
        let Some((prop, val)) = decl.split_once(':') else {
            continue;
        };
        apply_css_property(s, prop.trim(), val.trim());
    }
}

fn apply_css_property(s: &mut ComputedStyle, prop: &str, val: &str) {
    match prop {
        "display" => {
            s.display = match val {
                "flex" => Display::Flex,
                "block" => Display::Block,
                "inline" => Display::Inline,
                "inline-block" => Display::InlineBlock,
                "none" => Display::None,
                _ => s.display,
            }
        }
        "flex-direction" => {
            s.flex_direction = match val {
                "row" => FlexDirection::Row,
                "column" => FlexDirection::Column,
                _ => s.flex_direction,
            }
        }
        "position" => {
            s.position = match val {
                "absolute" | "fixed" => Position::Absolute,
                _ => Position::Static,
            }
        }
        "left" => s.left = parse_px(val),
        "top" => s.top = parse_px(val),
        "transform" => s.transform_scale = parse_transform_scale(val).unwrap_or(1.0),
        "font-size" => {
            if let Some(px) = parse_px(val) {
                s.font_size = px;
            }
        }
        "font-weight" => {
            s.font_weight = match val {
                "bold" | "600" | "700" | "800" | "900" => FontWeight::Bold,
                _ => FontWeight::Normal,
            }
        }
        "text-transform" => {
            s.text_transform = match val {
                "uppercase" => TextTransform::Uppercase,
                _ => TextTransform::None,
            }
        }
        "color" => {
            if let Some(c) = Color::parse(val) {
                s.color = c;
            }
        }
        "background-color" | "background" => {
            if let Some(c) = Color::parse(val) {
                s.background_color = c;
            }
        }
        "text-align" => {
            s.text_align = match val {
                "center" => TextAlign::Center,
                "right" => TextAlign::Right,
                _ => TextAlign::Left,
            }
        }
        "width" => s.width = parse_dimension(val),
        "height" => s.height = parse_dimension(val),
        "max-width" => s.max_width = parse_dimension(val),
        "min-width" => s.min_width = parse_dimension(val),
        "margin" => apply_shorthand_spacing(
            val,
            &mut s.margin_top,
            &mut s.margin_right,
            &mut s.margin_bottom,
            &mut s.margin_left,
        ),
        "margin-top" => set_px(&mut s.margin_top, val),
        "margin-right" => set_px(&mut s.margin_right, val),
        "margin-bottom" => set_px(&mut s.margin_bottom, val),
        "margin-left" => set_px(&mut s.margin_left, val),
        "padding" => apply_shorthand_spacing(
            val,
            &mut s.padding_top,
            &mut s.padding_right,
            &mut s.padding_bottom,
            &mut s.padding_left,
        ),
        "padding-top" => set_px(&mut s.padding_top, val),
        "padding-right" => set_px(&mut s.padding_right, val),
        "padding-bottom" => set_px(&mut s.padding_bottom, val),
        "padding-left" => set_px(&mut s.padding_left, val),
        "border-width" => set_px(&mut s.border_width, val),
        "border" => {
            // `border: 1px solid #ccc`
            for part in val.split_whitespace() {
                if let Some(px) = parse_px(part) {
                    s.border_width = px;
                } else if let Some(c) = Color::parse(part) {
                    s.border_color = c;
                }
            }
        }
        "border-color" => {
            if let Some(c) = Color::parse(val) {
                s.border_color = c;
            }
        }
        "border-radius" => set_px(&mut s.border_radius, val),
        "line-height" => {
            if let Ok(v) = val.parse::<f32>() {
                s.line_height = v;
            } else if let Some(px) = parse_px(val) {
                s.line_height = px / s.font_size;
            }
        }
        "gap" => set_px(&mut s.gap, val),
        _ => {}
    }
}

fn set_px(target: &mut f32, val: &str) {
    if let Some(px) = parse_px(val) {
        *target = px;
    }
}

fn parse_px(s: &str) -> Option<f32> {
    let s = s.trim().trim_end_matches("px");
    s.parse().ok()
}

/// `none` → 1.0, `scale(0.5)` / `scale(0.5, 0.5)` → 0.5.
fn parse_transform_scale(val: &str) -> Option<f32> {
    let val = val.trim();
    if val == "none" {
        return Some(1.0);
    }
    let inner = val.strip_prefix("scale(")?.strip_suffix(')')?;
    let first = inner.split(',').next()?.trim();
    let scale: f32 = first.parse().ok()?;
    (scale.is_finite() && scale > 0.0).then_some(scale)
}

fn parse_dimension(s: &str) -> Dimension {
    let s = s.trim();
    if s == "auto" {
        Dimension::Auto
    } else if let Some(pct) = s.strip_suffix('%') {
        pct.parse::<f32>()
            .map(Dimension::Percent)
            .unwrap_or(Dimension::Auto)
    } else {
        parse_px(s).map(Dimension::Px).unwrap_or(Dimension::Auto)
    }
}

fn apply_shorthand_spacing(
    val: &str,
    top: &mut f32,
    right: &mut f32,
    bottom: &mut f32,
    left: &mut f32,
) {
    let parts: Vec<f32> = val.split_whitespace().filter_map(parse_px).collect();
    match parts.len() {
        1 => {
            *top = parts[0];
            *right = parts[0];
            *bottom = parts[0];
            *left = parts[0];
        }
        2 => {
            *top = parts[0];
            *bottom = parts[0];
            *right = parts[1];
            *left = parts[1];
        }
        4 => {
            *top = parts[0];
            *right = parts[1];
            *bottom = parts[2];
            *left = parts[3];
        }
        _ => {}
    }
}

// ---------------------------------------------------------------------------
// Styled DOM tree
// ---------------------------------------------------------------------------

/// A DOM node annotated with its computed style.
#[derive(Debug, Clone)]
pub enum StyledNode {
    Element {
        tag: Tag,
        style: ComputedStyle,
        children: Vec<StyledNode>,
        /// Original attributes (for images src, etc.)
        attrs: HashMap<String, String>,
    },
    Text {
        text: String,
        style: ComputedStyle,
    },
}

/// Style a single root element and its subtree.
pub fn style_element(element: &ElementNode) -> StyledNode {
    let style = resolve_style(element, None);
    let children = build_styled_tree(&element.children, Some(&style));
    StyledNode::Element {
        tag: element.tag.clone(),
        style,
        children,
        attrs: element.attributes.clone(),
    }
}

/// Build a styled tree from a DOM tree, resolving styles top-down.
pub fn build_styled_tree(
    nodes: &[DomNode],
    parent_style: Option<&ComputedStyle>,
) -> Vec<StyledNode> {
    let mut result = Vec::new();
    for node in nodes {
        match node {
            DomNode::Element(e) => {
                let style = resolve_style(e, parent_style);
                let children = build_styled_tree(&e.children, Some(&style));
                result.push(StyledNode::Element {
                    tag: e.tag.clone(),
                    style,
                    children,
                    attrs: e.attributes.clone(),
                });
            }
            DomNode::Text(text) => {
                if !text.trim().is_empty() {
                    result.push(StyledNode::Text {
                        text: text.clone(),
                        style: text_run_style(parent_style),
                    });
                }
            }
        }
    }
    result
}

/// Text nodes render inline: only the inherited typography survives.
fn text_run_style(parent: Option<&ComputedStyle>) -> ComputedStyle {
    let defaults = ComputedStyle::default();
    let Some(p) = parent else {
        return defaults;
    };
    ComputedStyle {
        font_size: p.font_size,
        font_weight: p.font_weight,
        font_family: p.font_family.clone(),
        color: p.color,
        text_align: p.text_align,
        line_height: p.line_height,
        text_transform: p.text_transform,
        ..defaults
    }
}
