//! In-memory collaborators shared by the integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use paraglide_core::store::StoreResult;
use paraglide_core::{
    Bounds, FlightId, FlightStore, GeoPoint, Launch, LocalSiteStore, ReassignSelector, RemoteSite,
    RemoteSiteDirectory, Site, SiteId, StoreError, TrackPoint, TrackPointSource,
};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap()
}

// ============================================================================
// Site store
// ============================================================================

#[derive(Default)]
pub struct MemorySiteStore {
    sites: Mutex<BTreeMap<SiteId, Site>>,
    next_id: AtomicI64,
    pub fail_queries: AtomicBool,
    pub fail_inserts: AtomicBool,
    pub fail_deletes: AtomicBool,
}

impl MemorySiteStore {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            ..Self::default()
        }
    }

    /// Store a site directly and return it with its id.
    pub fn seed(&self, name: &str, lat: f64, lng: f64) -> Site {
        let id = SiteId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let mut site = Site::new(name, GeoPoint::new(lat, lng));
        site.id = Some(id);
        self.sites.lock().unwrap().insert(id, site.clone());
        site
    }

    pub fn snapshot(&self, id: SiteId) -> Option<Site> {
        self.sites.lock().unwrap().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.sites.lock().unwrap().len()
    }
}

impl LocalSiteStore for MemorySiteStore {
    async fn query_in_bounds(&self, bounds: &Bounds) -> StoreResult<Vec<Site>> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(StoreError::new("site database unavailable"));
        }
        let sites = self.sites.lock().unwrap();
        Ok(sites
            .values()
            .filter(|s| bounds.contains(&s.location))
            .cloned()
            .collect())
    }

    async fn get(&self, id: SiteId) -> StoreResult<Option<Site>> {
        Ok(self.snapshot(id))
    }

    async fn insert(&self, site: &Site) -> StoreResult<SiteId> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::new("insert rejected"));
        }
        let id = SiteId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let mut stored = site.clone();
        stored.id = Some(id);
        self.sites.lock().unwrap().insert(id, stored);
        Ok(id)
    }

    async fn update(&self, site: &Site) -> StoreResult<()> {
        let id = site.id.ok_or_else(|| StoreError::new("update without id"))?;
        let mut sites = self.sites.lock().unwrap();
        match sites.get_mut(&id) {
            Some(stored) => {
                *stored = site.clone();
                Ok(())
            }
            None => Err(StoreError::new(format!("no site {id}"))),
        }
    }

    async fn delete(&self, id: SiteId) -> StoreResult<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StoreError::new("delete rejected"));
        }
        self.sites.lock().unwrap().remove(&id);
        Ok(())
    }
}

// ============================================================================
// Flight store
// ============================================================================

#[derive(Default)]
pub struct MemoryFlightStore {
    launches: Mutex<Vec<Launch>>,
    pub fail_reassign: AtomicBool,
    /// Leave the first selected launch behind, as a store with a stale
    /// write would
    pub drop_one_on_reassign: AtomicBool,
}

impl MemoryFlightStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, id: i64, lat: f64, lng: f64, site_id: Option<SiteId>) {
        self.launches.lock().unwrap().push(Launch {
            flight_id: FlightId(id),
            location: Some(GeoPoint::new(lat, lng)),
            altitude: None,
            site_id,
            timestamp: t0(),
        });
    }

    pub fn site_of(&self, id: i64) -> Option<SiteId> {
        self.launches
            .lock()
            .unwrap()
            .iter()
            .find(|l| l.flight_id == FlightId(id))
            .and_then(|l| l.site_id)
    }

    pub fn all(&self) -> Vec<Launch> {
        self.launches.lock().unwrap().clone()
    }
}

impl FlightStore for MemoryFlightStore {
    async fn launches_referencing_site(&self, site_id: SiteId) -> StoreResult<Vec<Launch>> {
        let launches = self.launches.lock().unwrap();
        Ok(launches
            .iter()
            .filter(|l| l.site_id == Some(site_id))
            .cloned()
            .collect())
    }

    async fn launches_in_bounds(&self, bounds: &Bounds) -> StoreResult<Vec<Launch>> {
        let launches = self.launches.lock().unwrap();
        Ok(launches
            .iter()
            .filter(|l| l.location.is_some_and(|p| bounds.contains(&p)))
            .cloned()
            .collect())
    }

    async fn reassign_launches(
        &self,
        selector: &ReassignSelector,
        to: SiteId,
    ) -> StoreResult<usize> {
        if self.fail_reassign.load(Ordering::SeqCst) {
            return Err(StoreError::new("flight database locked"));
        }
        let mut skip = self.drop_one_on_reassign.load(Ordering::SeqCst);
        let mut moved = 0;
        for launch in self.launches.lock().unwrap().iter_mut() {
            let selected = match selector {
                ReassignSelector::FromSite(from) => launch.site_id == Some(*from),
                ReassignSelector::Launches(ids) => ids.contains(&launch.flight_id),
            };
            if !selected {
                continue;
            }
            if skip {
                skip = false;
                continue;
            }
            launch.site_id = Some(to);
            moved += 1;
        }
        Ok(moved)
    }

    async fn count_for_site(&self, site_id: SiteId) -> StoreResult<usize> {
        let launches = self.launches.lock().unwrap();
        Ok(launches.iter().filter(|l| l.site_id == Some(site_id)).count())
    }
}

// ============================================================================
// Remote directory
// ============================================================================

pub struct StaticDirectory {
    sites: Vec<RemoteSite>,
    fail: bool,
    delay: Option<Duration>,
}

impl StaticDirectory {
    pub fn new(sites: Vec<RemoteSite>) -> Self {
        Self {
            sites,
            fail: false,
            delay: None,
        }
    }

    pub fn failing() -> Self {
        Self {
            sites: Vec::new(),
            fail: true,
            delay: None,
        }
    }

    pub fn slow(sites: Vec<RemoteSite>, delay: Duration) -> Self {
        Self {
            sites,
            fail: false,
            delay: Some(delay),
        }
    }
}

impl RemoteSiteDirectory for StaticDirectory {
    async fn query_in_bounds(&self, bounds: &Bounds, limit: usize) -> StoreResult<Vec<RemoteSite>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(StoreError::new("directory returned HTTP 503"));
        }
        Ok(self
            .sites
            .iter()
            .filter(|s| bounds.contains(&s.location))
            .take(limit)
            .cloned()
            .collect())
    }
}

// ============================================================================
// Track source
// ============================================================================

#[derive(Default)]
pub struct MemoryTracks {
    tracks: HashMap<FlightId, Vec<TrackPoint>>,
}

impl MemoryTracks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_track(mut self, id: i64, points: Vec<TrackPoint>) -> Self {
        self.tracks.insert(FlightId(id), points);
        self
    }
}

impl TrackPointSource for MemoryTracks {
    async fn load_points(&self, flight_id: FlightId) -> StoreResult<Vec<TrackPoint>> {
        self.tracks
            .get(&flight_id)
            .cloned()
            .ok_or_else(|| StoreError::new(format!("no track for flight {flight_id}")))
    }
}

/// Track points at whole-second offsets from `t0`.
pub fn track(samples: &[(i64, i32)]) -> Vec<TrackPoint> {
    samples
        .iter()
        .map(|&(secs, alt)| {
            TrackPoint::new(
                t0() + chrono::Duration::seconds(secs),
                GeoPoint::new(46.0, 7.0),
                alt,
            )
        })
        .collect()
}
