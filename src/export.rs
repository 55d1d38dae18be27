//! Export pipeline – clone the live surface off-screen, rasterize it,
//! resample to the canonical output width and deliver a PNG.
//!
//! The pipeline never propagates errors: every call resolves to an
//! [`ExportOutcome`], failures are reported through the [`Notifier`], and
//! the capture clone is detached on every path once attached.

use std::cell::Cell;
use std::io::Cursor;

use image::imageops::{self, FilterType};
use image::{ImageFormat, RgbaImage};

use crate::config::ExportConfig;
use crate::document::{self, NodeHandle, NodeRole, SharedDocument};
use crate::download::{DownloadSink, ExportedFile};
use crate::error::{ExportError, RasterError};
use crate::notify::{Notifier, EXPORT_FAILED_MESSAGE};
use crate::raster::{CaptureTarget, RasterImage, Rasterizer};

/// Export lifecycle. Anything other than `Idle` counts as busy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportState {
    Idle,
    Capturing,
    CleaningUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another export is in flight.
    Busy,
    /// No live surface is mounted.
    NoSurface,
}

#[derive(Debug)]
pub enum ExportOutcome {
    Saved(ExportedFile),
    Skipped(SkipReason),
    Failed(ExportError),
}

impl ExportOutcome {
    pub fn file(&self) -> Option<&ExportedFile> {
        match self {
            ExportOutcome::Saved(f) => Some(f),
            _ => None,
        }
    }
}

/// Style overrides that isolate a capture clone: out of view, untransformed
/// and at the canonical width. Content, fonts and colours are untouched.
pub fn capture_overrides(source_width: f32) -> [(&'static str, String); 5] {
    [
        ("position", "absolute".to_string()),
        ("left", "-10000px".to_string()),
        ("top", "0px".to_string()),
        ("transform", "none".to_string()),
        ("width", format!("{source_width}px")),
    ]
}

/// Output height for a raster of `width`×`height` resampled to
/// `target_width`, preserving aspect ratio.
pub fn output_height(target_width: u32, width: u32, height: u32) -> u32 {
    let h = target_width as f64 * height as f64 / width as f64;
    (h.round() as u32).max(1)
}

pub fn output_filename(prefix: &str, width: u32, height: u32) -> String {
    format!("{prefix}-{width}x{height}.png")
}

/// Resample the whole raster onto a `target_width` canvas. No crop, no
/// margin.
pub fn resample(raster: &RasterImage, target_width: u32) -> Result<RgbaImage, RasterError> {
    let (w, h) = (raster.width(), raster.height());
    if w == 0 || h == 0 || target_width == 0 {
        return Err(RasterError::EmptySurface {
            width: w as f32,
            height: h as f32,
        });
    }
    let target_height = output_height(target_width, w, h);
    Ok(imageops::resize(
        raster.pixels(),
        target_width,
        target_height,
        FilterType::CatmullRom,
    ))
}

pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, image::ImageError> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

pub struct ExportPipeline<R, S, N> {
    doc: SharedDocument,
    rasterizer: R,
    sink: S,
    notifier: N,
    config: ExportConfig,
    state: Cell<ExportState>,
}

impl<R: Rasterizer, S: DownloadSink, N: Notifier> ExportPipeline<R, S, N> {
    pub fn new(doc: SharedDocument, rasterizer: R, sink: S, notifier: N, config: ExportConfig) -> Self {
        Self {
            doc,
            rasterizer,
            sink,
            notifier,
            config,
            state: Cell::new(ExportState::Idle),
        }
    }

    pub fn state(&self) -> ExportState {
        self.state.get()
    }

    pub fn is_busy(&self) -> bool {
        self.state.get() != ExportState::Idle
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Export the surface behind `surface`.
    pub async fn export(&self, surface: Option<NodeHandle>) -> ExportOutcome {
        if self.is_busy() {
            log::debug!("Export already in progress; ignoring request");
            return ExportOutcome::Skipped(SkipReason::Busy);
        }
        let Some(surface) = surface else {
            log::debug!("No surface to export");
            return ExportOutcome::Skipped(SkipReason::NoSurface);
        };

        let clone = {
            let mut doc = document::lock(&self.doc);
            let Some(element) = doc.element(surface) else {
                log::debug!("Surface {surface} is not mounted");
                return ExportOutcome::Skipped(SkipReason::NoSurface);
            };
            let mut element = element.clone();
            element.push_style(&capture_overrides(self.config.source_width));
            self.state.set(ExportState::Capturing);
            doc.attach(element, NodeRole::Capture)
        };
        let guard = CloneGuard {
            doc: &self.doc,
            clone,
            state: &self.state,
        };
        log::debug!("Capturing surface {surface} via clone {clone}");

        let outcome = match self.capture(clone).await {
            Ok(file) => {
                log::info!("Exported {}", file.filename);
                ExportOutcome::Saved(file)
            }
            Err(e) => {
                log::error!("Export failed: {e}");
                self.notifier.notify(EXPORT_FAILED_MESSAGE);
                ExportOutcome::Failed(e)
            }
        };
        drop(guard);
        outcome
    }

    async fn capture(&self, clone: NodeHandle) -> Result<ExportedFile, ExportError> {
        let settle = self.config.settle_delay();
        if !settle.is_zero() {
            tokio::time::sleep(settle).await;
        }

        let target = {
            let doc = document::lock(&self.doc);
            CaptureTarget {
                layout: doc.layout(clone)?,
                fonts: doc.fonts(),
            }
        };
        let raster = self
            .rasterizer
            .rasterize(target, self.config.raster_options())
            .await?;
        log::debug!("Rasterized {}x{}", raster.width(), raster.height());

        let output = resample(&raster, self.config.target_width)?;
        let (width, height) = output.dimensions();
        let bytes = encode_png(&output)?;

        let filename = output_filename(&self.config.filename_prefix, width, height);
        let location = self.sink.deliver(&filename, &bytes)?;
        Ok(ExportedFile {
            filename,
            width,
            height,
            location,
        })
    }
}

/// Detaches the capture clone and returns the pipeline to idle on drop.
struct CloneGuard<'a> {
    doc: &'a SharedDocument,
    clone: NodeHandle,
    state: &'a Cell<ExportState>,
}

impl Drop for CloneGuard<'_> {
    fn drop(&mut self) {
        self.state.set(ExportState::CleaningUp);
        if document::lock(self.doc).detach(self.clone).is_none() {
            log::warn!("Capture clone {} was already detached", self.clone);
        }
        self.state.set(ExportState::Idle);
    }
}
