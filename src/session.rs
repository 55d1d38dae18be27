//! Session – wires the field store, preview renderer, document, sizing
//! controller and export pipeline together.
//!
//! Methods that trigger a measurement spawn a deferred task and must run
//! inside a tokio runtime.

use std::sync::Arc;

use crate::config::ExportConfig;
use crate::document::{self, Document, NodeHandle, NodeRole, SharedDocument};
use crate::download::DownloadSink;
use crate::error::DocumentError;
use crate::export::{ExportOutcome, ExportPipeline};
use crate::fields::{FieldSet, FieldStore};
use crate::fonts::FontManager;
use crate::layout_config::SurfaceLayout;
use crate::notify::Notifier;
use crate::preview::PreviewRenderer;
use crate::raster::Rasterizer;
use crate::sizing::{LayoutSizingController, SizingState};

pub struct Session<R, S, N> {
    store: FieldStore,
    renderer: PreviewRenderer,
    doc: SharedDocument,
    surface: Option<NodeHandle>,
    sizing: LayoutSizingController,
    pipeline: ExportPipeline<R, S, N>,
}

impl<R: Rasterizer, S: DownloadSink, N: Notifier> Session<R, S, N> {
    pub fn new(
        config: ExportConfig,
        fields: FieldSet,
        fonts: FontManager,
        rasterizer: R,
        sink: S,
        notifier: N,
    ) -> Self {
        let doc = Document::new(config.display_width, Arc::new(fonts)).into_shared();
        let sizing = LayoutSizingController::new(
            Arc::clone(&doc),
            SizingState::new(config.source_width, config.display_width),
            config.measure_delay(),
        );
        Self {
            store: FieldStore::new(fields),
            renderer: PreviewRenderer::new(config.source_width),
            surface: None,
            sizing,
            pipeline: ExportPipeline::new(Arc::clone(&doc), rasterizer, sink, notifier, config),
            doc,
        }
    }

    pub fn fields(&self) -> &FieldSet {
        self.store.get()
    }

    pub fn revision(&self) -> u64 {
        self.store.revision()
    }

    pub fn surface(&self) -> Option<NodeHandle> {
        self.surface
    }

    pub fn document(&self) -> SharedDocument {
        Arc::clone(&self.doc)
    }

    pub fn sizing(&self) -> &LayoutSizingController {
        &self.sizing
    }

    pub fn sizing_mut(&mut self) -> &mut LayoutSizingController {
        &mut self.sizing
    }

    pub fn pipeline(&self) -> &ExportPipeline<R, S, N> {
        &self.pipeline
    }

    /// Render the live surface into the document and schedule a measurement.
    pub fn mount(&mut self) {
        self.render_surface();
        self.sizing.schedule(self.surface);
    }

    /// Apply a form edit. Unknown keys change nothing.
    pub fn set_field(&mut self, key: &str, value: &str) -> bool {
        if !self.store.set(key, value) {
            log::debug!("Ignoring edit to unknown field '{key}'");
            return false;
        }
        if self.surface.is_some() {
            self.render_surface();
            self.sizing.schedule(self.surface);
        }
        true
    }

    pub fn resize(&mut self, viewport_width: f32) {
        self.sizing.on_resize(viewport_width, self.surface);
    }

    /// Remove the live surface from the document.
    pub fn unmount(&mut self) {
        if let Some(handle) = self.surface.take() {
            document::lock(&self.doc).detach(handle);
        }
    }

    /// Cancel pending work and unmount.
    pub fn teardown(&mut self) {
        self.sizing.teardown();
        self.unmount();
    }

    pub async fn export(&self) -> ExportOutcome {
        self.pipeline.export(self.surface).await
    }

    /// Frozen layout of the live surface, as displayed.
    pub fn surface_layout(&self) -> Option<Result<SurfaceLayout, DocumentError>> {
        self.surface
            .map(|handle| document::lock(&self.doc).layout(handle))
    }

    fn render_surface(&mut self) {
        let mut element = self.renderer.render(self.store.get());
        element.push_style(&self.sizing.state().display_style());

        let mut doc = document::lock(&self.doc);
        match self.surface {
            Some(handle) if doc.contains(handle) => {
                if let Err(e) = doc.replace(handle, element) {
                    log::warn!("Could not re-render surface: {e}");
                }
            }
            _ => self.surface = Some(doc.attach(element, NodeRole::Surface)),
        }
    }
}
