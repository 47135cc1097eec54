//! Configuration for the whole navigation core.
//!
//! Every field has a default, so an empty document is a valid configuration and a config file
//! only needs to name what it changes:
//!
//! ```
//! use wayfinder::WayfinderConfig;
//!
//! let config = WayfinderConfig::from_toml_str(
//!     r#"
//!     [transform]
//!     scale = 1.0
//!     swap_xy = true
//!
//!     [retry.start]
//!     max_attempts = 5
//!     interval_ms = 500
//!     "#,
//! )
//! .expect("valid config");
//!
//! assert!(config.transform.swap_xy);
//! assert_eq!(config.retry.start.max_attempts, 5);
//! assert_eq!(config.markers.size, 0.3);
//! ```

use crate::aligner::AlignerConfig;
use crate::camera::FreeRoamConfig;
use crate::error::ConfigError;
use crate::markers::MarkerConfig;
use crate::model::ModelConfig;
use crate::navigation::NavigationConfig;
use crate::retry::RetryPolicy;
use crate::transform::TransformConfig;
use crate::xr::SessionFeatures;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Retry schedules for the collaborators the [`Navigator`](crate::Navigator) waits on.
///
/// Deferred marker placement (and with it the preview) retries under
/// [`MarkerConfig::placement_retry`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Waiting for the surface and the model before an AR session is requested.
    #[serde(default = "default_start")]
    pub start: RetryPolicy,
    /// Waiting for the room list before a destination can be preselected.
    #[serde(default = "default_preselect")]
    pub preselect: RetryPolicy,
}

fn default_start() -> RetryPolicy {
    RetryPolicy::new(15, 300)
}

fn default_preselect() -> RetryPolicy {
    RetryPolicy::new(20, 100)
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            start: default_start(),
            preselect: default_preselect(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WayfinderConfig {
    #[serde(default)]
    pub transform: TransformConfig,
    #[serde(default)]
    pub aligner: AlignerConfig,
    #[serde(default)]
    pub markers: MarkerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub free_roam: FreeRoamConfig,
    #[serde(default)]
    pub session: SessionFeatures,
    #[serde(default)]
    pub navigation: NavigationConfig,
}

impl WayfinderConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses, and validates the TOML file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        log::debug!("loaded config from {}", path.display());
        Ok(config)
    }

    /// Rejects values that would make positioning meaningless or retries unbounded.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
            if value.is_finite() && value > 0. {
                Ok(())
            } else {
                Err(ConfigError::Invalid {
                    field,
                    reason: format!("must be a positive number, got {value}"),
                })
            }
        }
        fn attempts(field: &'static str, policy: &RetryPolicy) -> Result<(), ConfigError> {
            if policy.max_attempts == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must allow at least one attempt".to_owned(),
                });
            }
            Ok(())
        }

        positive("transform.scale", self.transform.scale)?;
        positive("aligner.world_scale", self.aligner.world_scale)?;
        positive("aligner.model_scale", self.aligner.model_scale)?;
        if self.aligner.max_samples == 0 {
            return Err(ConfigError::Invalid {
                field: "aligner.max_samples",
                reason: "must sample at least one vertex".to_owned(),
            });
        }
        positive("markers.size", self.markers.size)?;
        positive("free_roam.move_speed", self.free_roam.move_speed)?;
        positive("free_roam.max_step", self.free_roam.max_step)?;
        attempts("retry.start", &self.retry.start)?;
        attempts("retry.preselect", &self.retry.preselect)?;
        attempts("markers.placement_retry", &self.markers.placement_retry)?;
        if self.model.load_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "model.load_attempts",
                reason: "must allow at least one attempt".to_owned(),
            });
        }
        Ok(())
    }
}
