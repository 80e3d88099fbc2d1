//! Collaborator contracts supplied by the host application.
//!
//! The core never constructs these. Persistence, network transport and track
//! decoding live behind them; each call reports failure as a [`StoreError`]
//! and the core wraps it with the step and ids of the operation in flight.

#![allow(async_fn_in_trait)]

use std::sync::Arc;

use crate::error::StoreError;
use crate::{Bounds, FlightId, Launch, RemoteSite, Site, SiteId, TrackPoint};

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Locally persisted sites.
pub trait LocalSiteStore {
    async fn query_in_bounds(&self, bounds: &Bounds) -> StoreResult<Vec<Site>>;

    async fn get(&self, id: SiteId) -> StoreResult<Option<Site>>;

    /// Insert a site without an id and return the id it was stored under.
    async fn insert(&self, site: &Site) -> StoreResult<SiteId>;

    /// Overwrite the stored site with the same id.
    async fn update(&self, site: &Site) -> StoreResult<()>;

    async fn delete(&self, id: SiteId) -> StoreResult<()>;
}

/// External site directory. May fail independently of the local store.
pub trait RemoteSiteDirectory {
    async fn query_in_bounds(&self, bounds: &Bounds, limit: usize) -> StoreResult<Vec<RemoteSite>>;
}

/// Which launches a reassignment moves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReassignSelector {
    /// Every launch currently referencing the site
    FromSite(SiteId),
    /// Exactly these flights' launches
    Launches(Vec<FlightId>),
}

/// Flight launch records.
pub trait FlightStore {
    async fn launches_referencing_site(&self, site_id: SiteId) -> StoreResult<Vec<Launch>>;

    async fn launches_in_bounds(&self, bounds: &Bounds) -> StoreResult<Vec<Launch>>;

    /// Point the selected launches at `to` and return how many moved.
    async fn reassign_launches(
        &self,
        selector: &ReassignSelector,
        to: SiteId,
    ) -> StoreResult<usize>;

    async fn count_for_site(&self, site_id: SiteId) -> StoreResult<usize>;
}

/// Decoded track points of a flight, ordered by time.
pub trait TrackPointSource {
    async fn load_points(&self, flight_id: FlightId) -> StoreResult<Vec<TrackPoint>>;
}

// Shared handles, so one store can back both a SiteIndex and a SiteMergeEngine

impl<T: LocalSiteStore> LocalSiteStore for Arc<T> {
    async fn query_in_bounds(&self, bounds: &Bounds) -> StoreResult<Vec<Site>> {
        (**self).query_in_bounds(bounds).await
    }

    async fn get(&self, id: SiteId) -> StoreResult<Option<Site>> {
        (**self).get(id).await
    }

    async fn insert(&self, site: &Site) -> StoreResult<SiteId> {
        (**self).insert(site).await
    }

    async fn update(&self, site: &Site) -> StoreResult<()> {
        (**self).update(site).await
    }

    async fn delete(&self, id: SiteId) -> StoreResult<()> {
        (**self).delete(id).await
    }
}

impl<T: RemoteSiteDirectory> RemoteSiteDirectory for Arc<T> {
    async fn query_in_bounds(&self, bounds: &Bounds, limit: usize) -> StoreResult<Vec<RemoteSite>> {
        (**self).query_in_bounds(bounds, limit).await
    }
}

impl<T: FlightStore> FlightStore for Arc<T> {
    async fn launches_referencing_site(&self, site_id: SiteId) -> StoreResult<Vec<Launch>> {
        (**self).launches_referencing_site(site_id).await
    }

    async fn launches_in_bounds(&self, bounds: &Bounds) -> StoreResult<Vec<Launch>> {
        (**self).launches_in_bounds(bounds).await
    }

    async fn reassign_launches(
        &self,
        selector: &ReassignSelector,
        to: SiteId,
    ) -> StoreResult<usize> {
        (**self).reassign_launches(selector, to).await
    }

    async fn count_for_site(&self, site_id: SiteId) -> StoreResult<usize> {
        (**self).count_for_site(site_id).await
    }
}

impl<T: TrackPointSource> TrackPointSource for Arc<T> {
    async fn load_points(&self, flight_id: FlightId) -> StoreResult<Vec<TrackPoint>> {
        (**self).load_points(flight_id).await
    }
}
