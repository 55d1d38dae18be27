//! Layout sizing controller – keeps the preview at a fixed display width
//! while the surface itself renders at the source width.
//!
//! Measurements run after a short deferral so they observe the surface
//! once it has been re-laid out; a newer trigger aborts the pending one.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::document::{self, NodeHandle, SharedDocument};

/// Height of the display container.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DisplayHeight {
    /// Nothing measured yet.
    Auto,
    Px(f32),
}

/// Snapshot of the sizing figures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizingState {
    pub source_width: f32,
    pub display_width: f32,
    /// Last measured surface height at source width; 0 before the first
    /// successful measurement.
    pub measured_height: f32,
}

impl SizingState {
    pub fn new(source_width: f32, display_width: f32) -> Self {
        Self {
            source_width,
            display_width,
            measured_height: 0.0,
        }
    }

    pub fn scale(&self) -> f32 {
        self.display_width / self.source_width
    }

    pub fn display_height(&self) -> DisplayHeight {
        if self.measured_height > 0.0 {
            DisplayHeight::Px(self.measured_height * self.scale())
        } else {
            DisplayHeight::Auto
        }
    }

    /// Declarations that make the live surface render at display size.
    pub fn display_style(&self) -> [(&'static str, String); 2] {
        [
            ("transform", format!("scale({})", self.scale())),
            ("transform-origin", "top left".to_string()),
        ]
    }
}

pub struct LayoutSizingController {
    doc: SharedDocument,
    state: Arc<Mutex<SizingState>>,
    measure_delay: Duration,
    pending: Option<JoinHandle<()>>,
}

impl LayoutSizingController {
    pub fn new(doc: SharedDocument, state: SizingState, measure_delay: Duration) -> Self {
        Self {
            doc,
            state: Arc::new(Mutex::new(state)),
            measure_delay,
            pending: None,
        }
    }

    pub fn state(&self) -> SizingState {
        *self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn scale(&self) -> f32 {
        self.state().scale()
    }

    pub fn display_height(&self) -> DisplayHeight {
        self.state().display_height()
    }

    /// Measure immediately. Skipped (last height kept) when the surface is
    /// not mounted.
    pub fn measure_now(&self, surface: Option<NodeHandle>) -> DisplayHeight {
        measure_into(&self.doc, &self.state, surface);
        self.display_height()
    }

    /// Defer a measurement of `surface`, superseding any pending one.
    /// Must be called from within a tokio runtime.
    pub fn schedule(&mut self, surface: Option<NodeHandle>) {
        self.cancel_pending();
        let doc = Arc::clone(&self.doc);
        let state = Arc::clone(&self.state);
        let delay = self.measure_delay;
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            measure_into(&doc, &state, surface);
        }));
    }

    /// Viewport width changed: relayout happens in the document, the
    /// height is re-measured after the usual deferral.
    pub fn on_resize(&mut self, viewport_width: f32, surface: Option<NodeHandle>) {
        document::lock(&self.doc).set_viewport_width(viewport_width);
        self.schedule(surface);
    }

    pub fn has_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Wait for the pending measurement, if any.
    pub async fn settled(&mut self) {
        if let Some(handle) = self.pending.take() {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    log::warn!("Deferred measurement failed: {e}");
                }
            }
        }
    }

    /// Cancel any pending measurement.
    pub fn teardown(&mut self) {
        self.cancel_pending();
    }

    fn cancel_pending(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}

impl Drop for LayoutSizingController {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}

fn measure_into(doc: &SharedDocument, state: &Mutex<SizingState>, surface: Option<NodeHandle>) {
    let Some(handle) = surface else {
        log::debug!("No surface mounted; keeping last height");
        return;
    };
    let measured = document::lock(doc).measure_height(handle);
    match measured {
        Some(h) => {
            let mut s = state.lock().unwrap_or_else(|p| p.into_inner());
            s.measured_height = h;
            log::debug!("Measured surface {handle}: {h}px, scale {}", s.scale());
        }
        None => log::debug!("Surface {handle} not mounted; keeping last height"),
    }
}
