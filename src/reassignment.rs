//! Nearest-site-wins launch reassignment.
//!
//! When a site is created at (or moved to) a candidate point P, a launch
//! within the search radius of P moves to it only if it is strictly closer to
//! P than to every competing site. Ties keep the existing assignment, so two
//! nearby sites never trigger a mass reassignment.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::config::ReassignmentConfig;
use crate::error::Result;
use crate::geo_utils;
use crate::{FlightId, GeoPoint, Launch, RemoteSite, Site, SiteId};

/// Outcome of resolving a candidate point, handed to the confirmation prompt
/// and then back to [`crate::SiteMergeEngine::create`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReassignmentPlan {
    pub candidate: GeoPoint,
    pub radius_meters: f64,
    /// Launches that move to the candidate, in input order
    pub eligible: Vec<Launch>,
    /// Launches within the radius that stay because a competing site is at
    /// least as close
    pub contested: Vec<Launch>,
}

impl ReassignmentPlan {
    /// Plan that moves nothing.
    pub fn empty(candidate: GeoPoint, radius_meters: f64) -> Self {
        Self {
            candidate,
            radius_meters,
            eligible: Vec::new(),
            contested: Vec::new(),
        }
    }

    pub fn flight_ids(&self) -> Vec<FlightId> {
        self.eligible.iter().map(|l| l.flight_id).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.eligible.is_empty()
    }
}

/// Collect competitor locations from a region's sites.
///
/// `exclude` drops a local site, e.g. the one being relocated.
pub fn competitor_locations(
    local: &[Site],
    remote: &[RemoteSite],
    exclude: Option<SiteId>,
) -> Vec<GeoPoint> {
    local
        .iter()
        .filter(|s| exclude.is_none() || s.id != exclude)
        .map(|s| s.location)
        .chain(remote.iter().map(|r| r.location))
        .collect()
}

/// Decides which launches move to a candidate site.
#[derive(Debug, Clone, Default)]
pub struct ReassignmentResolver {
    config: ReassignmentConfig,
}

impl ReassignmentResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects non-finite or out-of-range settings.
    pub fn with_config(config: ReassignmentConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ReassignmentConfig {
        &self.config
    }

    /// Launches within the configured radius of `center`, in input order.
    ///
    /// Launches without valid coordinates are skipped.
    pub fn find_within_radius<'a>(
        &self,
        launches: &'a [Launch],
        center: &GeoPoint,
    ) -> Vec<&'a Launch> {
        let radius = self.config.radius_meters;
        launches
            .iter()
            .filter(|launch| match launch.location {
                Some(loc) if loc.is_valid() => geo_utils::distance_meters(&loc, center) <= radius,
                _ => false,
            })
            .collect()
    }

    /// Whether `launch` is strictly closer to `candidate` than to every
    /// competitor. Competitors must already exclude duplicates of the
    /// candidate.
    fn is_strictly_nearest(
        launch: &GeoPoint,
        candidate: &GeoPoint,
        competitors: &[GeoPoint],
    ) -> bool {
        let to_candidate = geo_utils::distance_meters(launch, candidate);
        competitors
            .iter()
            .all(|site| to_candidate < geo_utils::distance_meters(launch, site))
    }

    /// Split the launches near `candidate` into eligible and contested.
    ///
    /// Competitors within the duplicate tolerance of `candidate` are the
    /// candidate itself and are ignored, as are competitors with invalid
    /// coordinates.
    pub fn resolve(
        &self,
        candidate: &GeoPoint,
        launches: &[Launch],
        competitors: &[GeoPoint],
    ) -> Result<ReassignmentPlan> {
        candidate.validate()?;

        let tolerance = self.config.duplicate_tolerance_meters;
        let competitors: Vec<GeoPoint> = competitors
            .iter()
            .filter(|c| c.is_valid() && !geo_utils::is_within(c, candidate, tolerance))
            .copied()
            .collect();

        let invalid = launches
            .iter()
            .filter(|l| l.location.is_some_and(|p| !p.is_valid()))
            .count();
        if invalid > 0 {
            warn!(
                "[Reassignment] Skipping {} launches with invalid coordinates",
                invalid
            );
        }

        let mut plan = ReassignmentPlan::empty(*candidate, self.config.radius_meters);
        for launch in self.find_within_radius(launches, candidate) {
            // find_within_radius only returns launches with valid coordinates
            let Some(location) = launch.location else {
                continue;
            };
            if Self::is_strictly_nearest(&location, candidate, &competitors) {
                plan.eligible.push(launch.clone());
            } else {
                plan.contested.push(launch.clone());
            }
        }

        debug!(
            "[Reassignment] {} eligible, {} contested within {:.0}m of ({:.6}, {:.6}), {} rivals",
            plan.eligible.len(),
            plan.contested.len(),
            plan.radius_meters,
            candidate.latitude,
            candidate.longitude,
            competitors.len()
        );

        Ok(plan)
    }

    /// Eligible launches only.
    pub fn eligible(
        &self,
        candidate: &GeoPoint,
        launches: &[Launch],
        competitors: &[GeoPoint],
    ) -> Result<Vec<Launch>> {
        Ok(self.resolve(candidate, launches, competitors)?.eligible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn launch(id: i64, lat: f64, lng: f64) -> Launch {
        Launch {
            flight_id: FlightId(id),
            location: Some(GeoPoint::new(lat, lng)),
            altitude: None,
            site_id: Some(SiteId(1)),
            timestamp: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_tie_favors_existing_site() {
        let resolver = ReassignmentResolver::new();
        let existing = GeoPoint::new(0.0, 0.0);
        let candidate = GeoPoint::new(0.0, 0.01);
        let launches = vec![launch(1, 0.0, 0.005), launch(2, 0.0, 0.009)];

        let plan = resolver.resolve(&candidate, &launches, &[existing]).unwrap();
        assert_eq!(plan.flight_ids(), vec![FlightId(2)]);

        // The equidistant launch is ~556m out; widen the radius so the tie
        // itself decides
        let wide = ReassignmentResolver::with_config(ReassignmentConfig {
            radius_meters: 1_000.0,
            ..ReassignmentConfig::default()
        })
        .unwrap();
        let plan = wide.resolve(&candidate, &launches, &[existing]).unwrap();
        assert_eq!(plan.flight_ids(), vec![FlightId(2)]);
        assert_eq!(plan.contested.len(), 1);
        assert_eq!(plan.contested[0].flight_id, FlightId(1));
    }

    #[test]
    fn test_no_competitors_all_within_radius_eligible() {
        let resolver = ReassignmentResolver::new();
        let candidate = GeoPoint::new(46.0, 7.0);
        let launches = vec![
            launch(1, 46.001, 7.0), // ~111m
            launch(2, 46.01, 7.0),  // ~1.1km, outside radius
            launch(3, 46.0, 7.001), // ~77m
        ];
        let eligible = resolver.eligible(&candidate, &launches, &[]).unwrap();
        let ids: Vec<_> = eligible.iter().map(|l| l.flight_id).collect();
        assert_eq!(ids, vec![FlightId(1), FlightId(3)]);
    }

    #[test]
    fn test_missing_or_invalid_coordinates_never_eligible() {
        let resolver = ReassignmentResolver::new();
        let candidate = GeoPoint::new(46.0, 7.0);
        let mut missing = launch(1, 46.0, 7.0);
        missing.location = None;
        let nan = launch(2, f64::NAN, 7.0);
        let plan = resolver.resolve(&candidate, &[missing, nan], &[]).unwrap();
        assert!(plan.is_empty());
        assert!(plan.contested.is_empty());
    }

    #[test]
    fn test_duplicate_of_candidate_is_not_a_competitor() {
        let resolver = ReassignmentResolver::new();
        let candidate = GeoPoint::new(46.0, 7.0);
        let same_place = GeoPoint::new(46.0 + 1e-8, 7.0);
        let launches = vec![launch(1, 46.0, 7.0)];
        let plan = resolver.resolve(&candidate, &launches, &[same_place]).unwrap();
        assert_eq!(plan.eligible.len(), 1);
    }

    #[test]
    fn test_nan_radius_rejected() {
        let result = ReassignmentResolver::with_config(ReassignmentConfig {
            radius_meters: f64::NAN,
            ..ReassignmentConfig::default()
        });
        assert!(result.unwrap_err().is_validation());
    }

    #[test]
    fn test_custom_radius() {
        let resolver = ReassignmentResolver::with_config(ReassignmentConfig {
            radius_meters: 50.0,
            ..ReassignmentConfig::default()
        })
        .unwrap();
        let candidate = GeoPoint::new(46.0, 7.0);
        let launches = vec![launch(1, 46.001, 7.0)];
        assert!(resolver.find_within_radius(&launches, &candidate).is_empty());
    }

    #[test]
    fn test_invalid_candidate_rejected() {
        let resolver = ReassignmentResolver::new();
        assert!(resolver
            .resolve(&GeoPoint::new(95.0, 0.0), &[], &[])
            .unwrap_err()
            .is_validation());
    }

    #[test]
    fn test_competitor_locations_excludes_moved_site() {
        let mut a = Site::new("a", GeoPoint::new(1.0, 1.0));
        a.id = Some(SiteId(1));
        let mut b = Site::new("b", GeoPoint::new(2.0, 2.0));
        b.id = Some(SiteId(2));
        let remote = vec![RemoteSite::new("r", GeoPoint::new(3.0, 3.0))];
        let locs = competitor_locations(&[a, b], &remote, Some(SiteId(1)));
        assert_eq!(locs, vec![GeoPoint::new(2.0, 2.0), GeoPoint::new(3.0, 3.0)]);
    }
}
