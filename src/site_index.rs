//! Merged view of local and remote sites for a map region.
//!
//! The local store and the remote directory are queried together and both
//! legs are awaited. The remote directory is best-effort: a failure or
//! timeout on that leg yields an empty remote list instead of failing the
//! query. Remote entries that coincide with a local site are flagged as
//! duplicates rather than removed, so tapping one can re-surface the
//! canonical local site.

use std::time::Duration;

use log::{debug, warn};
use rstar::{RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};

use crate::config::SiteIndexConfig;
use crate::error::{CoreError, MergeStep, Result, StoreResultExt};
use crate::geo_utils;
use crate::hit_test::{self, GeoMarker};
use crate::store::{LocalSiteStore, RemoteSiteDirectory};
use crate::{Bounds, GeoPoint, RemoteSite, Site, SiteId};

/// Result of looking up the site under a point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SiteHit<'a> {
    Local(&'a Site),
    Remote(&'a RemoteSite),
    NotFound,
}

/// A remote entry with its duplicate flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCandidate {
    pub site: RemoteSite,
    /// Local site at the same location, if any
    pub duplicate_of: Option<SiteId>,
}

impl RemoteCandidate {
    pub fn is_duplicate(&self) -> bool {
        self.duplicate_of.is_some()
    }
}

/// True iff any local site lies within `tolerance_meters` of `remote`.
pub fn is_duplicate(remote: &RemoteSite, locals: &[Site], tolerance_meters: f64) -> bool {
    duplicate_of(remote, locals, tolerance_meters).is_some()
}

/// First local site within `tolerance_meters` of `remote`.
///
/// Comparison is pairwise only; remotes are never merged with each other.
pub fn duplicate_of<'a>(
    remote: &RemoteSite,
    locals: &'a [Site],
    tolerance_meters: f64,
) -> Option<&'a Site> {
    if !remote.location.is_valid() {
        return None;
    }
    locals.iter().find(|local| {
        local.location.is_valid()
            && geo_utils::is_within(&local.location, &remote.location, tolerance_meters)
    })
}

/// Local site position for R-tree lookups.
#[derive(Debug, Clone)]
struct LocalEntry {
    index: usize,
    position: [f64; 2],
}

impl RTreeObject for LocalEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.position)
    }
}

/// Sites visible in a queried region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteQueryResult {
    pub bounds: Bounds,
    pub local: Vec<Site>,
    pub remote: Vec<RemoteSite>,
    /// The remote leg failed or timed out; `remote` is empty
    pub remote_failed: bool,
    pub duplicate_tolerance_meters: f64,
}

impl SiteQueryResult {
    /// Local site that `remote` duplicates, if any.
    pub fn duplicate_of(&self, remote: &RemoteSite) -> Option<&Site> {
        duplicate_of(remote, &self.local, self.duplicate_tolerance_meters)
    }

    pub fn is_duplicate(&self, remote: &RemoteSite) -> bool {
        self.duplicate_of(remote).is_some()
    }

    /// Every remote entry with its duplicate flag, in directory order.
    pub fn remote_candidates(&self) -> Vec<RemoteCandidate> {
        let entries: Vec<LocalEntry> = self
            .local
            .iter()
            .enumerate()
            .filter(|(_, s)| s.location.is_valid())
            .map(|(index, s)| LocalEntry {
                index,
                position: [s.location.longitude, s.location.latitude],
            })
            .collect();
        let tree = RTree::bulk_load(entries);

        self.remote
            .iter()
            .map(|remote| RemoteCandidate {
                site: remote.clone(),
                duplicate_of: self
                    .duplicate_index(&tree, &remote.location)
                    .and_then(|i| self.local[i].id),
            })
            .collect()
    }

    /// Remote entries that are not duplicates of a local site.
    pub fn new_site_candidates(&self) -> Vec<&RemoteSite> {
        let candidates = self.remote_candidates();
        self.remote
            .iter()
            .zip(candidates.iter())
            .filter(|(_, c)| !c.is_duplicate())
            .map(|(r, _)| r)
            .collect()
    }

    /// Site under `point` within `radius_meters`.
    ///
    /// Local sites take precedence; a duplicate remote resolves to its local
    /// site.
    pub fn site_at(&self, point: &GeoPoint, radius_meters: f64) -> SiteHit<'_> {
        let local_markers: Vec<GeoMarker<usize>> = self
            .local
            .iter()
            .enumerate()
            .map(|(i, s)| GeoMarker {
                key: i,
                location: s.location,
                radius_meters,
            })
            .collect();
        if let Some(hit) = hit_test::nearest_geo(point, &local_markers) {
            return SiteHit::Local(&self.local[*hit.key]);
        }

        let remote_markers: Vec<GeoMarker<usize>> = self
            .remote
            .iter()
            .enumerate()
            .map(|(i, s)| GeoMarker {
                key: i,
                location: s.location,
                radius_meters,
            })
            .collect();
        match hit_test::nearest_geo(point, &remote_markers) {
            Some(hit) => {
                let remote = &self.remote[*hit.key];
                match self.duplicate_of(remote) {
                    Some(local) => SiteHit::Local(local),
                    None => SiteHit::Remote(remote),
                }
            }
            None => SiteHit::NotFound,
        }
    }

    /// JSON document for the presentation layer, with duplicate flags.
    pub fn to_json(&self) -> Result<String> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct View<'a> {
            bounds: &'a Bounds,
            local: &'a [Site],
            remote: Vec<RemoteCandidate>,
            remote_failed: bool,
        }

        serde_json::to_string(&View {
            bounds: &self.bounds,
            local: &self.local,
            remote: self.remote_candidates(),
            remote_failed: self.remote_failed,
        })
        .map_err(|e| CoreError::InconsistentState {
            message: format!("failed to serialize site view: {e}"),
            site_ids: Vec::new(),
        })
    }

    fn duplicate_index(&self, tree: &RTree<LocalEntry>, point: &GeoPoint) -> Option<usize> {
        if !point.is_valid() {
            return None;
        }
        let tolerance = self.duplicate_tolerance_meters;
        let search = Bounds::around(point, tolerance * 1.01 + 1e-6);

        let wraps = search.crosses_antimeridian() || search.east - search.west >= 360.0;
        let nearby: Vec<usize> = if wraps {
            (0..self.local.len()).collect()
        } else {
            tree.locate_in_envelope(&AABB::from_corners(
                [search.west, search.south],
                [search.east, search.north],
            ))
            .map(|e| e.index)
            .collect()
        };

        // Lowest index matches the linear scan in `duplicate_of`
        nearby
            .into_iter()
            .filter(|&i| {
                let local = &self.local[i].location;
                local.is_valid() && geo_utils::is_within(local, point, tolerance)
            })
            .min()
    }
}

/// Queries the local store and the remote directory for a region.
pub struct SiteIndex<L, R> {
    local: L,
    remote: R,
    config: SiteIndexConfig,
}

impl<L: LocalSiteStore, R: RemoteSiteDirectory> SiteIndex<L, R> {
    pub fn new(local: L, remote: R) -> Self {
        Self {
            local,
            remote,
            config: SiteIndexConfig::default(),
        }
    }

    /// Rejects a negative or non-finite duplicate tolerance.
    pub fn with_config(local: L, remote: R, config: SiteIndexConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            local,
            remote,
            config,
        })
    }

    pub fn config(&self) -> &SiteIndexConfig {
        &self.config
    }

    pub fn local_store(&self) -> &L {
        &self.local
    }

    /// Query both sources for `bounds`.
    ///
    /// Only a local store failure fails the query.
    pub async fn query(&self, bounds: &Bounds) -> Result<SiteQueryResult> {
        bounds.validate()?;

        let (local, remote) = futures::join!(
            self.local.query_in_bounds(bounds),
            self.query_remote(bounds)
        );
        let local = local.at_step(MergeStep::QueryLocal, &[])?;

        let local = retain_valid(local, "local", |s| &s.location);
        let (remote, remote_failed) = match remote {
            Some(sites) => (retain_valid(sites, "remote", |s| &s.location), false),
            None => (Vec::new(), true),
        };

        debug!(
            "[SiteIndex] {} local, {} remote sites in N {:.4} S {:.4} E {:.4} W {:.4}",
            local.len(),
            remote.len(),
            bounds.north,
            bounds.south,
            bounds.east,
            bounds.west
        );

        Ok(SiteQueryResult {
            bounds: *bounds,
            local,
            remote,
            remote_failed,
            duplicate_tolerance_meters: self.config.duplicate_tolerance_meters,
        })
    }

    /// Whether `remote` duplicates any of `locals` at the configured tolerance.
    pub fn is_duplicate(&self, remote: &RemoteSite, locals: &[Site]) -> bool {
        is_duplicate(remote, locals, self.config.duplicate_tolerance_meters)
    }

    async fn query_remote(&self, bounds: &Bounds) -> Option<Vec<RemoteSite>> {
        let leg = self.remote.query_in_bounds(bounds, self.config.remote_limit);

        let result = match self.config.remote_timeout_ms {
            Some(ms) => match tokio::time::timeout(Duration::from_millis(ms), leg).await {
                Ok(result) => result,
                Err(_) => {
                    warn!("[SiteIndex] Remote directory timed out after {}ms", ms);
                    return None;
                }
            },
            None => leg.await,
        };

        match result {
            Ok(sites) => Some(sites),
            Err(e) => {
                warn!("[SiteIndex] Remote directory query failed: {}", e);
                None
            }
        }
    }
}

fn retain_valid<T>(items: Vec<T>, source: &str, location: impl Fn(&T) -> &GeoPoint) -> Vec<T> {
    let before = items.len();
    let kept: Vec<T> = items.into_iter().filter(|item| location(item).is_valid()).collect();
    if kept.len() < before {
        warn!(
            "[SiteIndex] Dropped {} {} sites with invalid coordinates",
            before - kept.len(),
            source
        );
    }
    kept
}
