//! # Paraglide Core
//!
//! Launch-site resolution and track climb-rate analysis for a paragliding /
//! hang-gliding flight logbook.
//!
//! This library provides:
//! - Haversine distance and bounding-box primitives
//! - A merged view of local and remote launch sites with duplicate flagging
//! - "Nearest-site-wins" reassignment of launches to a new or moved site
//! - Create / merge / edit of sites against injected stores
//! - Instantaneous and windowed climb-rate series for a GPS track
//! - Nearest-marker hit testing in geographic or screen space
//!
//! Storage, the remote site directory and the track source are injected by
//! the host application through the traits in [`store`].
//!
//! ## Features
//!
//! - **`parallel`** - Enable parallel batch climb analysis with rayon
//!
//! ## Quick Start
//!
//! ```rust
//! use paraglide_core::{geo_utils, GeoPoint};
//!
//! let launch = GeoPoint::new(45.8326, 6.8652);
//! let landing = GeoPoint::new(45.9237, 6.8694);
//! let meters = geo_utils::distance_meters(&launch, &landing);
//! assert!(meters > 10_000.0 && meters < 10_200.0);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// Unified error handling
pub mod error;
pub use error::{CoreError, MergeStep, OptionExt, Result, StoreError, StoreResultExt};

// Engine configuration (tolerances, radius, window, thresholds)
pub mod config;
pub use config::{AltitudeSource, ClimbConfig, CoreConfig, ReassignmentConfig, SiteIndexConfig};

// Geographic utilities (distance, bounds, projection)
pub mod geo_utils;

// Collaborator contracts supplied by the host application
pub mod store;
pub use store::{
    FlightStore, LocalSiteStore, ReassignSelector, RemoteSiteDirectory, TrackPointSource,
};

// Merged local/remote site view
pub mod site_index;
pub use site_index::{RemoteCandidate, SiteHit, SiteIndex, SiteQueryResult};

// Nearest-site-wins launch reassignment
pub mod reassignment;
pub use reassignment::{ReassignmentPlan, ReassignmentResolver};

// Site create / merge / edit
pub mod merge;
pub use merge::{
    CreateSiteRequest, EditOrigin, MergeOutcome, MergeTarget, SiteChanges, SiteMergeEngine,
};

// Climb-rate series and classification
pub mod climb;
pub use climb::{ClimbAnalysis, ClimbClass, ClimbSegment, ClimbStats, TrackClimbAnalyzer};
#[cfg(feature = "parallel")]
pub use climb::analyze_tracks_parallel;

pub use hit_test::{GeoMarker, HitResult, ScreenMarker, ScreenPoint};

// ============================================================================
// Identifiers
// ============================================================================

/// Identifier of a stored site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SiteId(pub i64);

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a logged flight (one launch per flight).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlightId(pub i64);

impl fmt::Display for FlightId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Core Types
// ============================================================================

/// A geographic coordinate in degrees.
///
/// # Example
/// ```
/// use paraglide_core::GeoPoint;
/// let point = GeoPoint::new(46.6863, 7.8632); // Interlaken
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    /// Create a new point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Check if the point has finite, in-range coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Reject NaN or out-of-range coordinates before they reach GeoMath.
    pub fn validate(&self) -> Result<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(CoreError::invalid_input(format!(
                "coordinates out of range: ({}, {})",
                self.latitude, self.longitude
            )))
        }
    }
}

/// Rectangular region in degrees.
///
/// A box with `west > east` crosses the antimeridian.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl Bounds {
    pub fn new(north: f64, south: f64, east: f64, west: f64) -> Self {
        Self {
            north,
            south,
            east,
            west,
        }
    }

    /// Check that all edges are finite and in range, with `south <= north`.
    pub fn validate(&self) -> Result<()> {
        let finite = [self.north, self.south, self.east, self.west]
            .iter()
            .all(|v| v.is_finite());
        let lat_ok = (-90.0..=90.0).contains(&self.north)
            && (-90.0..=90.0).contains(&self.south)
            && self.south <= self.north;
        let lng_ok = (-180.0..=180.0).contains(&self.east) && (-180.0..=180.0).contains(&self.west);

        if finite && lat_ok && lng_ok {
            Ok(())
        } else {
            Err(CoreError::invalid_input(format!(
                "invalid bounds: N {} S {} E {} W {}",
                self.north, self.south, self.east, self.west
            )))
        }
    }

    pub fn crosses_antimeridian(&self) -> bool {
        self.west > self.east
    }

    /// Inclusive containment test.
    pub fn contains(&self, point: &GeoPoint) -> bool {
        if point.latitude < self.south || point.latitude > self.north {
            return false;
        }
        if self.crosses_antimeridian() {
            point.longitude >= self.west || point.longitude <= self.east
        } else {
            point.longitude >= self.west && point.longitude <= self.east
        }
    }

    /// Smallest box containing a circle of `radius_meters` around `center`.
    pub fn around(center: &GeoPoint, radius_meters: f64) -> Self {
        let lat_delta = geo_utils::meters_to_degrees(radius_meters, 0.0);
        let north = (center.latitude + lat_delta).min(90.0);
        let south = (center.latitude - lat_delta).max(-90.0);

        let lng_delta = geo_utils::meters_to_degrees(radius_meters, center.latitude);
        // Circles touching a pole or wider than the globe span every longitude
        if north >= 90.0 || south <= -90.0 || !lng_delta.is_finite() || lng_delta >= 180.0 {
            return Self::new(north, south, 180.0, -180.0);
        }

        let mut west = center.longitude - lng_delta;
        let mut east = center.longitude + lng_delta;
        if west < -180.0 {
            west += 360.0;
        }
        if east > 180.0 {
            east -= 360.0;
        }
        Self::new(north, south, east, west)
    }
}

/// A stored launch site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Site {
    /// Present once the site has been inserted
    pub id: Option<SiteId>,
    pub name: String,
    pub location: GeoPoint,
    /// Altitude in meters
    pub altitude: Option<f64>,
    pub country: Option<String>,
    /// Set once a user edited name or coordinates; protects against
    /// overwrite by automatically sourced data
    pub is_custom_name: bool,
}

impl Site {
    /// Create an unsaved site.
    pub fn new(name: impl Into<String>, location: GeoPoint) -> Self {
        Self {
            id: None,
            name: name.into(),
            location,
            altitude: None,
            country: None,
            is_custom_name: false,
        }
    }

    /// Unsaved local copy of a remote directory entry, with its name trimmed.
    pub fn from_remote(remote: &RemoteSite) -> Self {
        Self {
            id: None,
            name: remote.name.trim().to_string(),
            location: remote.location,
            altitude: remote.altitude,
            country: remote.country.clone(),
            is_custom_name: false,
        }
    }
}

/// A candidate site from the remote directory. Never carries a local id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSite {
    pub name: String,
    pub location: GeoPoint,
    /// Altitude in meters
    pub altitude: Option<f64>,
    pub country: Option<String>,
}

impl RemoteSite {
    pub fn new(name: impl Into<String>, location: GeoPoint) -> Self {
        Self {
            name: name.into(),
            location,
            altitude: None,
            country: None,
        }
    }
}

/// Takeoff record of a flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Launch {
    pub flight_id: FlightId,
    /// Missing when the track had no fix at takeoff
    pub location: Option<GeoPoint>,
    /// Altitude in meters
    pub altitude: Option<f64>,
    pub site_id: Option<SiteId>,
    pub timestamp: DateTime<Utc>,
}

/// One decoded GPS fix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackPoint {
    pub timestamp: DateTime<Utc>,
    pub location: GeoPoint,
    /// GPS altitude in meters
    pub gps_altitude: i32,
    /// Barometric altitude in meters, when the recorder logs it
    pub pressure_altitude: Option<i32>,
}

impl TrackPoint {
    pub fn new(timestamp: DateTime<Utc>, location: GeoPoint, gps_altitude: i32) -> Self {
        Self {
            timestamp,
            location,
            gps_altitude,
            pressure_altitude: None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
