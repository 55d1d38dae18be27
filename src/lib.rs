//! # receipt-forge – transfer confirmation preview and PNG export
//!
//! A confirmation surface is built from a flat set of fields and kept live
//! in a render tree; on request it is cloned off-screen, rasterized and
//! delivered as a fixed-width PNG. The stages are:
//!
//! 1. **Fields** – the closed set of named values ([`fields`])
//! 2. **Preview** – fields → confirmation markup → element tree
//!    ([`templates`], [`preview`], [`dom`])
//! 3. **Layout** – styles ([`style`]), flexbox layout with Taffy ([`layout`])
//!    frozen into a [`layout_config::SurfaceLayout`]
//! 4. **Sizing** – display scale and deferred height measurement ([`sizing`])
//! 5. **Export** – off-screen clone, rasterize ([`raster`]), resample, encode
//!    and deliver ([`export`], [`download`])
//!
//! [`session::Session`] wires the stages together.

pub mod config;
pub mod document;
pub mod dom;
pub mod download;
pub mod error;
pub mod export;
pub mod fields;
pub mod fonts;
pub mod layout;
pub mod layout_config;
pub mod notify;
pub mod preview;
pub mod raster;
pub mod session;
pub mod sizing;
pub mod style;
pub mod templates;

// Re-exports for convenience
pub use config::ExportConfig;
pub use export::{ExportOutcome, ExportPipeline, ExportState, SkipReason};
pub use fields::{FieldName, FieldSet, FieldStore};
pub use session::Session;
