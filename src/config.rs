//! Export configuration, loaded from JSON.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::raster::RasterOptions;
use crate::style::Color;

/// Geometry, timing and output settings for the preview and export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExportConfig {
    /// Logical width the surface is laid out at.
    pub source_width: f32,
    /// On-screen width of the preview container.
    pub display_width: f32,
    /// Width of the exported PNG in pixels.
    pub target_width: u32,
    /// Rasterization oversampling factor.
    pub oversample: f32,
    pub background_color: String,
    pub use_cors: bool,
    pub settle_delay_ms: u64,
    pub measure_delay_ms: u64,
    pub filename_prefix: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            source_width: 420.0,
            display_width: 360.0,
            target_width: 840,
            oversample: 2.0,
            background_color: "#ffffff".to_string(),
            use_cors: true,
            settle_delay_ms: 300,
            measure_delay_ms: 100,
            filename_prefix: "hbl-confirmation".to_string(),
        }
    }
}

impl ExportConfig {
    /// Parse and validate. Missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = |field: &'static str, v: f32| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(ConfigError::Invalid {
                    field,
                    reason: format!("must be a positive number, got {v}"),
                })
            }
        };
        positive("source_width", self.source_width)?;
        positive("display_width", self.display_width)?;
        positive("oversample", self.oversample)?;
        if self.target_width == 0 {
            return Err(ConfigError::Invalid {
                field: "target_width",
                reason: "must be greater than zero".to_string(),
            });
        }
        if Color::parse(&self.background_color).is_none() {
            return Err(ConfigError::Invalid {
                field: "background_color",
                reason: format!("unrecognised colour {:?}", self.background_color),
            });
        }
        if self.filename_prefix.is_empty() || self.filename_prefix.contains(['/', '\\']) {
            return Err(ConfigError::Invalid {
                field: "filename_prefix",
                reason: format!("not usable as a file name: {:?}", self.filename_prefix),
            });
        }
        Ok(())
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn measure_delay(&self) -> Duration {
        Duration::from_millis(self.measure_delay_ms)
    }

    pub fn raster_options(&self) -> RasterOptions {
        RasterOptions {
            scale: self.oversample,
            background_color: Color::parse(&self.background_color).unwrap_or(Color::WHITE),
            use_cors: self.use_cors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = ExportConfig::default();
        assert_eq!(c.target_width, 840);
        assert_eq!(c.settle_delay(), Duration::from_millis(300));
        assert_eq!(c.raster_options(), RasterOptions::default());
        assert!(c.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let c = ExportConfig::from_json(r#"{"target_width": 1080, "settle_delay_ms": 0}"#).unwrap();
        assert_eq!(c.target_width, 1080);
        assert_eq!(c.settle_delay_ms, 0);
        assert_eq!(c.source_width, 420.0);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = ExportConfig::from_json(r#"{"targetWidth": 10}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn invalid_values_are_rejected() {
        for json in [
            r#"{"target_width": 0}"#,
            r#"{"oversample": 0}"#,
            r#"{"source_width": -1}"#,
            r#"{"background_color": "plaid"}"#,
            r#"{"filename_prefix": "../x"}"#,
        ] {
            assert!(
                matches!(ExportConfig::from_json(json), Err(ConfigError::Invalid { .. })),
                "{json} should be invalid"
            );
        }
    }
}
