//! Render tree – the document that live surfaces and capture clones are
//! attached to.
//!
//! Attached nodes are laid out on demand through the `style` → `layout`
//! stages. The document is shared behind `Arc<Mutex<_>>`; callers take the
//! lock only for synchronous sections.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::dom::ElementNode;
use crate::error::DocumentError;
use crate::fonts::FontManager;
use crate::layout::compute_layout;
use crate::layout_config::SurfaceLayout;
use crate::style::style_element;

/// Stable identifier of an attached node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeHandle(u64);

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Why a node is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    /// The interactive preview.
    Surface,
    /// A transient duplicate owned by one export.
    Capture,
}

#[derive(Debug)]
struct Attached {
    element: ElementNode,
    role: NodeRole,
}

/// The active document.
pub struct Document {
    nodes: BTreeMap<NodeHandle, Attached>,
    next_id: u64,
    viewport_width: f32,
    fonts: Arc<FontManager>,
}

/// Shared handle used across the session, sizing and export tasks.
pub type SharedDocument = Arc<Mutex<Document>>;

/// Lock the shared document. A poisoned lock still holds a consistent tree
/// since every mutation is a single map operation.
pub fn lock(doc: &SharedDocument) -> MutexGuard<'_, Document> {
    doc.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Document {
    pub fn new(viewport_width: f32, fonts: Arc<FontManager>) -> Self {
        Self {
            nodes: BTreeMap::new(),
            next_id: 1,
            viewport_width,
            fonts,
        }
    }

    pub fn into_shared(self) -> SharedDocument {
        Arc::new(Mutex::new(self))
    }

    pub fn fonts(&self) -> Arc<FontManager> {
        Arc::clone(&self.fonts)
    }

    pub fn viewport_width(&self) -> f32 {
        self.viewport_width
    }

    pub fn set_viewport_width(&mut self, width: f32) {
        self.viewport_width = width;
    }

    /// Attach a node and return its handle.
    pub fn attach(&mut self, element: ElementNode, role: NodeRole) -> NodeHandle {
        let handle = NodeHandle(self.next_id);
        self.next_id += 1;
        log::debug!("Attached {role:?} node {handle}");
        self.nodes.insert(handle, Attached { element, role });
        handle
    }

    /// Swap the content of an attached node, keeping its handle.
    pub fn replace(&mut self, handle: NodeHandle, element: ElementNode) -> Result<(), DocumentError> {
        let node = self
            .nodes
            .get_mut(&handle)
            .ok_or(DocumentError::NotAttached(handle.0))?;
        node.element = element;
        Ok(())
    }

    /// Remove a node. Returns the element if it was attached.
    pub fn detach(&mut self, handle: NodeHandle) -> Option<ElementNode> {
        let removed = self.nodes.remove(&handle)?;
        log::debug!("Detached {:?} node {handle}", removed.role);
        Some(removed.element)
    }

    pub fn contains(&self, handle: NodeHandle) -> bool {
        self.nodes.contains_key(&handle)
    }

    pub fn element(&self, handle: NodeHandle) -> Option<&ElementNode> {
        self.nodes.get(&handle).map(|n| &n.element)
    }

    /// Number of capture clones currently attached.
    pub fn clone_count(&self) -> usize {
        self.nodes
            .values()
            .filter(|n| n.role == NodeRole::Capture)
            .count()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Lay out one attached node within the viewport.
    pub fn layout(&self, handle: NodeHandle) -> Result<SurfaceLayout, DocumentError> {
        let node = self
            .nodes
            .get(&handle)
            .ok_or(DocumentError::NotAttached(handle.0))?;
        let styled = style_element(&node.element);
        let positioned = compute_layout(&styled, self.viewport_width, &self.fonts)?;
        Ok(SurfaceLayout::from_positioned(&positioned, &self.fonts))
    }

    /// Untransformed border-box height of an attached node, `None` when the
    /// node is not mounted.
    pub fn measure_height(&self, handle: NodeHandle) -> Option<f32> {
        match self.layout(handle) {
            Ok(layout) => Some(layout.height),
            Err(DocumentError::NotAttached(_)) => None,
            Err(e) => {
                log::warn!("Measuring {handle} failed: {e}");
                None
            }
        }
    }
}
