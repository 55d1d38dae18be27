//! Preview renderer – realizes a [`FieldSet`] as the confirmation element
//! tree at a fixed source width.

use crate::dom::{parse_element, ElementNode, Tag};
use crate::fields::FieldSet;
use crate::templates::render_confirmation;

/// Pure `FieldSet -> ElementNode` renderer. Identical inputs give identical
/// trees, which lay out and rasterize identically.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreviewRenderer {
    source_width: f32,
}

impl PreviewRenderer {
    pub fn new(source_width: f32) -> Self {
        Self { source_width }
    }

    pub fn source_width(&self) -> f32 {
        self.source_width
    }

    /// Build the surface element for `fields`.
    pub fn render(&self, fields: &FieldSet) -> ElementNode {
        let html = render_confirmation(fields, self.source_width);
        parse_element(&html).unwrap_or_else(|| {
            log::error!("Confirmation template produced no element");
            let mut empty = ElementNode::new(Tag::Div);
            empty.push_style(&[("width", format!("{}px", self.source_width))]);
            empty
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::FieldName;

    #[test]
    fn same_fields_same_tree() {
        let r = PreviewRenderer::new(420.0);
        let fields = FieldSet::default();
        assert_eq!(r.render(&fields), r.render(&fields));
    }

    #[test]
    fn edit_changes_only_that_text() {
        let r = PreviewRenderer::new(420.0);
        let mut fields = FieldSet::default();
        let before = r.render(&fields).text_content();
        fields.set(FieldName::Purpose, "Rent");
        let after = r.render(&fields).text_content();
        assert_ne!(before, after);
        assert_eq!(before.replace("Bill Payment", "Rent"), after);
    }

    #[test]
    fn markup_in_values_stays_text() {
        let r = PreviewRenderer::new(420.0);
        let mut fields = FieldSet::default();
        fields.set(FieldName::Comments, "<hr><img src=x>");
        let surface = r.render(&fields);
        assert!(surface.text_content().contains("<hr><img src=x>"));
    }

    #[test]
    fn root_carries_source_width() {
        let surface = PreviewRenderer::new(420.0).render(&FieldSet::default());
        assert_eq!(surface.id(), Some("confirmation"));
        assert!(surface.inline_style().unwrap_or("").contains("width: 420px"));
    }
}
