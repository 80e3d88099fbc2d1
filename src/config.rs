//! Engine configuration.
//!
//! Tolerances, radii, window sizes and thresholds are passed into each
//! component's constructor rather than read from module-level state, so every
//! component can be exercised with varied parameters.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Separation below which two independently sourced site records are the
/// same physical location (~1e-6 degrees of latitude).
pub const DUPLICATE_TOLERANCE_METERS: f64 = 0.1;

/// Radius around a new or moved site within which launches are considered
/// for reassignment.
pub const REASSIGNMENT_RADIUS_METERS: f64 = 500.0;

/// Centered window for the smoothed climb rate.
pub const CLIMB_WINDOW_SECONDS: f64 = 15.0;

/// Rates at or below this are strong sink (m/s).
pub const STRONG_SINK_THRESHOLD: f64 = -1.5;

/// Rates at or above this are climb (m/s).
pub const CLIMB_THRESHOLD: f64 = 0.0;

/// Maximum number of remote directory entries requested per query.
pub const REMOTE_QUERY_LIMIT: usize = 100;

/// Configuration for the merged site view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SiteIndexConfig {
    /// Duplicate tolerance in meters. Default: 0.1
    pub duplicate_tolerance_meters: f64,
    /// Remote directory result limit. Default: 100
    pub remote_limit: usize,
    /// Remote leg timeout in milliseconds; `None` waits for the directory's
    /// own transport timeout. Default: None
    pub remote_timeout_ms: Option<u64>,
}

impl Default for SiteIndexConfig {
    fn default() -> Self {
        Self {
            duplicate_tolerance_meters: DUPLICATE_TOLERANCE_METERS,
            remote_limit: REMOTE_QUERY_LIMIT,
            remote_timeout_ms: None,
        }
    }
}

/// Configuration for nearest-site-wins reassignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReassignmentConfig {
    /// Search radius around the candidate site. Default: 500.0 meters
    pub radius_meters: f64,
    /// Competing sites closer than this to the candidate are treated as the
    /// candidate itself. Default: 0.1 meters
    pub duplicate_tolerance_meters: f64,
}

impl Default for ReassignmentConfig {
    fn default() -> Self {
        Self {
            radius_meters: REASSIGNMENT_RADIUS_METERS,
            duplicate_tolerance_meters: DUPLICATE_TOLERANCE_METERS,
        }
    }
}

/// Which altitude channel of a track point feeds the climb series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AltitudeSource {
    #[default]
    Gps,
    /// Barometric altitude, falling back to GPS for points without it
    Pressure,
}

/// Configuration for climb-rate analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClimbConfig {
    /// Centered window width. Default: 15.0 seconds
    pub window_seconds: f64,
    /// Default: -1.5 m/s
    pub strong_sink_threshold: f64,
    /// Default: 0.0 m/s
    pub climb_threshold: f64,
    pub altitude_source: AltitudeSource,
}

impl Default for ClimbConfig {
    fn default() -> Self {
        Self {
            window_seconds: CLIMB_WINDOW_SECONDS,
            strong_sink_threshold: STRONG_SINK_THRESHOLD,
            climb_threshold: CLIMB_THRESHOLD,
            altitude_source: AltitudeSource::Gps,
        }
    }
}

/// All component configuration in one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CoreConfig {
    pub site_index: SiteIndexConfig,
    pub reassignment: ReassignmentConfig,
    pub climb: ClimbConfig,
}

impl CoreConfig {
    /// Parse and validate a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: CoreConfig = serde_json::from_str(json).map_err(|e| CoreError::Config {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check every component's configuration.
    pub fn validate(&self) -> Result<()> {
        self.site_index.validate()?;
        self.reassignment.validate()?;
        self.climb.validate()
    }
}

fn non_negative(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(CoreError::Config {
            message: format!("{name} must be a finite non-negative number, got {value}"),
        })
    }
}

impl SiteIndexConfig {
    pub fn validate(&self) -> Result<()> {
        non_negative(
            "siteIndex.duplicateToleranceMeters",
            self.duplicate_tolerance_meters,
        )
    }
}

impl ReassignmentConfig {
    pub fn validate(&self) -> Result<()> {
        non_negative("reassignment.radiusMeters", self.radius_meters)?;
        non_negative(
            "reassignment.duplicateToleranceMeters",
            self.duplicate_tolerance_meters,
        )
    }
}

impl ClimbConfig {
    pub fn validate(&self) -> Result<()> {
        non_negative("climb.windowSeconds", self.window_seconds)?;
        if !self.strong_sink_threshold.is_finite()
            || !self.climb_threshold.is_finite()
            || self.strong_sink_threshold >= self.climb_threshold
        {
            return Err(CoreError::Config {
                message: format!(
                    "climb thresholds must satisfy strongSink < climb, got {} and {}",
                    self.strong_sink_threshold, self.climb_threshold
                ),
            });
        }
        Ok(())
    }
}
