//! Site create / merge / edit against the injected stores.
//!
//! Every operation validates its input before the first store call, so an
//! `InvalidInput` never leaves a partial mutation. Stores are heterogeneous
//! and the core provides no rollback across them: when a later step fails
//! after an earlier one succeeded, the error names the failing step and the
//! site and launch ids involved so the caller can retry or compensate.
//! Callers serialize operations that touch overlapping site ids.

use std::collections::BTreeSet;

use log::{debug, error, info};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, MergeStep, OptionExt, Result, StoreResultExt};
use crate::reassignment::{competitor_locations, ReassignmentPlan, ReassignmentResolver};
use crate::store::{FlightStore, LocalSiteStore, ReassignSelector};
use crate::{Bounds, FlightId, GeoPoint, Launch, RemoteSite, Site, SiteId};

/// Fields of a site to create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSiteRequest {
    pub name: String,
    pub location: GeoPoint,
    pub altitude: Option<f64>,
    pub country: Option<String>,
    pub is_custom_name: bool,
}

impl CreateSiteRequest {
    /// Site entered by the user; its name is protected from overwrite.
    pub fn new(name: impl Into<String>, location: GeoPoint) -> Self {
        Self {
            name: name.into(),
            location,
            altitude: None,
            country: None,
            is_custom_name: true,
        }
    }

    fn into_site(self) -> Site {
        Site {
            id: None,
            name: self.name.trim().to_string(),
            location: self.location,
            altitude: self.altitude,
            country: self.country,
            is_custom_name: self.is_custom_name,
        }
    }
}

/// Where a merged site's launches go.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeTarget {
    Local(SiteId),
    /// Adopted as a new local site first
    Remote(RemoteSite),
}

/// Result of a completed merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeOutcome {
    pub source_id: SiteId,
    pub target_id: SiteId,
    /// Flights that referenced the source before the merge
    pub moved_flights: Vec<FlightId>,
    /// Target was created from a remote directory entry
    pub adopted_target: bool,
}

/// Who initiated an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOrigin {
    /// Direct user edit; marks the site as custom
    User,
    /// Refresh from an automatic source; skipped for custom sites
    Automatic,
}

/// Fields to change; `None` leaves the stored value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SiteChanges {
    pub name: Option<String>,
    pub location: Option<GeoPoint>,
    pub altitude: Option<f64>,
    pub country: Option<String>,
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(CoreError::invalid_input("site name must not be empty"));
    }
    Ok(())
}

fn validate_changes(changes: &SiteChanges) -> Result<()> {
    if let Some(name) = &changes.name {
        validate_name(name)?;
    }
    if let Some(location) = &changes.location {
        location.validate()?;
    }
    if let Some(altitude) = changes.altitude {
        if !altitude.is_finite() {
            return Err(CoreError::invalid_input(format!(
                "altitude must be finite, got {altitude}"
            )));
        }
    }
    Ok(())
}

/// Performs site mutations against the local site store and flight store.
pub struct SiteMergeEngine<S, F> {
    sites: S,
    flights: F,
    resolver: ReassignmentResolver,
}

impl<S: LocalSiteStore, F: FlightStore> SiteMergeEngine<S, F> {
    pub fn new(sites: S, flights: F) -> Self {
        Self::with_resolver(sites, flights, ReassignmentResolver::default())
    }

    pub fn with_resolver(sites: S, flights: F, resolver: ReassignmentResolver) -> Self {
        Self {
            sites,
            flights,
            resolver,
        }
    }

    pub fn sites(&self) -> &S {
        &self.sites
    }

    pub fn flights(&self) -> &F {
        &self.flights
    }

    pub fn resolver(&self) -> &ReassignmentResolver {
        &self.resolver
    }

    // ========================================================================
    // Planning
    // ========================================================================

    /// Resolve which launches would move to a new site at `location`.
    ///
    /// Launches are loaded within the search radius; competing local sites
    /// within twice the radius, since only those can be nearer to a launch
    /// inside it. Remote entries visible to the caller compete too.
    pub async fn plan_create(
        &self,
        location: &GeoPoint,
        remote_competitors: &[RemoteSite],
    ) -> Result<ReassignmentPlan> {
        self.plan(location, remote_competitors, None).await
    }

    /// Resolve which launches would move to `site_id` at `location`.
    pub async fn plan_relocate(
        &self,
        site_id: SiteId,
        location: &GeoPoint,
        remote_competitors: &[RemoteSite],
    ) -> Result<ReassignmentPlan> {
        let mut plan = self.plan(location, remote_competitors, Some(site_id)).await?;
        // Launches already on the site gain nothing from reassignment
        plan.eligible.retain(|l| l.site_id != Some(site_id));
        Ok(plan)
    }

    async fn plan(
        &self,
        location: &GeoPoint,
        remote_competitors: &[RemoteSite],
        exclude: Option<SiteId>,
    ) -> Result<ReassignmentPlan> {
        location.validate()?;
        let radius = self.resolver.config().radius_meters;

        let launches = self
            .flights
            .launches_in_bounds(&Bounds::around(location, radius))
            .await
            .at_step(MergeStep::LoadLaunches, &[])?;
        let nearby = self
            .sites
            .query_in_bounds(&Bounds::around(location, radius * 2.0))
            .await
            .at_step(MergeStep::QueryLocal, &[])?;

        let competitors = competitor_locations(&nearby, remote_competitors, exclude);
        self.resolver.resolve(location, &launches, &competitors)
    }

    // ========================================================================
    // Create
    // ========================================================================

    /// Insert a site and move the plan's eligible launches to it.
    ///
    /// If the insert succeeds but the reassignment fails, the site stays
    /// stored and the error carries its id with `MergeStep::Reassign`.
    pub async fn create(
        &self,
        request: CreateSiteRequest,
        plan: &ReassignmentPlan,
    ) -> Result<Site> {
        validate_name(&request.name)?;
        request.location.validate()?;
        if plan.candidate != request.location {
            return Err(CoreError::invalid_input(
                "reassignment plan was resolved for a different location",
            ));
        }

        let mut site = request.into_site();
        let id = self.sites.insert(&site).await.at_step(MergeStep::Insert, &[])?;
        site.id = Some(id);

        let flight_ids = plan.flight_ids();
        self.reassign_planned(id, &flight_ids).await?;

        info!(
            "[SiteMerge] Created site {} '{}' with {} reassigned flights",
            id,
            site.name,
            flight_ids.len()
        );
        Ok(site)
    }

    /// Copy a remote directory entry into a new local site.
    pub async fn adopt(&self, remote: &RemoteSite) -> Result<Site> {
        validate_name(&remote.name)?;
        remote.location.validate()?;

        let mut site = Site::from_remote(remote);
        let id = self.sites.insert(&site).await.at_step(MergeStep::Insert, &[])?;
        site.id = Some(id);

        info!("[SiteMerge] Adopted remote site '{}' as {}", site.name, id);
        Ok(site)
    }

    async fn reassign_planned(&self, to: SiteId, flight_ids: &[FlightId]) -> Result<()> {
        if flight_ids.is_empty() {
            return Ok(());
        }
        self.flights
            .reassign_launches(&ReassignSelector::Launches(flight_ids.to_vec()), to)
            .await
            .map_err(|e| CoreError::StoreFailure {
                step: MergeStep::Reassign,
                site_ids: vec![to],
                launch_ids: flight_ids.to_vec(),
                source: e,
            })?;
        Ok(())
    }

    // ========================================================================
    // Merge
    // ========================================================================

    /// Move every launch of `source` to `target`, then delete `source`.
    ///
    /// The source is deleted only after the flight store reports no launch
    /// still referencing it.
    pub async fn merge(&self, source: &Site, target: MergeTarget) -> Result<MergeOutcome> {
        let source_id = source.id.ok_or_invalid("merge source has not been stored")?;
        match &target {
            MergeTarget::Local(target_id) if *target_id == source_id => {
                return Err(CoreError::invalid_input(format!(
                    "cannot merge site {source_id} into itself"
                )));
            }
            MergeTarget::Remote(remote) => {
                validate_name(&remote.name)?;
                remote.location.validate()?;
            }
            MergeTarget::Local(_) => {}
        }

        self.sites
            .get(source_id)
            .await
            .at_step(MergeStep::LoadSite, &[source_id])?
            .ok_or_invalid(&format!("merge source {source_id} does not exist"))?;
        if let MergeTarget::Local(target_id) = &target {
            self.sites
                .get(*target_id)
                .await
                .at_step(MergeStep::LoadSite, &[*target_id])?
                .ok_or_invalid(&format!("merge target {target_id} does not exist"))?;
        }

        let launches = self
            .flights
            .launches_referencing_site(source_id)
            .await
            .at_step(MergeStep::LoadLaunches, &[source_id])?;
        let moved_flights: Vec<FlightId> = launches.iter().map(|l| l.flight_id).collect();

        let (target_id, adopted_target) = match target {
            MergeTarget::Local(id) => (id, false),
            MergeTarget::Remote(remote) => {
                let site = Site::from_remote(&remote);
                let id = self
                    .sites
                    .insert(&site)
                    .await
                    .at_step(MergeStep::Insert, &[source_id])?;
                debug!("[SiteMerge] Adopted merge target '{}' as {}", site.name, id);
                (id, true)
            }
        };
        let involved = [source_id, target_id];

        let moved = self
            .flights
            .reassign_launches(&ReassignSelector::FromSite(source_id), target_id)
            .await
            .map_err(|e| CoreError::StoreFailure {
                step: MergeStep::Reassign,
                site_ids: involved.to_vec(),
                launch_ids: moved_flights.clone(),
                source: e,
            })?;

        let remaining = self
            .flights
            .count_for_site(source_id)
            .await
            .at_step(MergeStep::Verify, &involved)?;
        if remaining > 0 {
            error!(
                "[SiteMerge] {} launches still on site {} after moving {} to {}; not deleting",
                remaining, source_id, moved, target_id
            );
            return Err(CoreError::InconsistentState {
                message: format!(
                    "{remaining} launches still reference site {source_id} after reassignment"
                ),
                site_ids: involved.to_vec(),
            });
        }

        self.sites
            .delete(source_id)
            .await
            .map_err(|e| CoreError::StoreFailure {
                step: MergeStep::Delete,
                site_ids: involved.to_vec(),
                launch_ids: moved_flights.clone(),
                source: e,
            })?;

        info!(
            "[SiteMerge] Merged site {} into {} ({} flights moved{})",
            source_id,
            target_id,
            moved,
            if adopted_target { ", target adopted" } else { "" }
        );

        Ok(MergeOutcome {
            source_id,
            target_id,
            moved_flights,
            adopted_target,
        })
    }

    // ========================================================================
    // Edit / delete
    // ========================================================================

    /// Apply `changes` to a stored site.
    ///
    /// User edits mark the site as custom. Automatic edits leave the flag
    /// alone and are skipped entirely for sites a user already customised.
    pub async fn edit(
        &self,
        site_id: SiteId,
        changes: SiteChanges,
        origin: EditOrigin,
    ) -> Result<Site> {
        validate_changes(&changes)?;

        let mut site = self
            .sites
            .get(site_id)
            .await
            .at_step(MergeStep::LoadSite, &[site_id])?
            .ok_or_invalid(&format!("site {site_id} does not exist"))?;

        if origin == EditOrigin::Automatic && site.is_custom_name {
            debug!("[SiteMerge] Skipping automatic edit of custom site {}", site_id);
            return Ok(site);
        }

        if let Some(name) = changes.name {
            site.name = name.trim().to_string();
        }
        if let Some(location) = changes.location {
            site.location = location;
        }
        if let Some(altitude) = changes.altitude {
            site.altitude = Some(altitude);
        }
        if let Some(country) = changes.country {
            site.country = Some(country);
        }
        if origin == EditOrigin::User {
            site.is_custom_name = true;
        }

        self.sites.update(&site).await.at_step(MergeStep::Update, &[site_id])?;
        info!("[SiteMerge] Edited site {} ({:?})", site_id, origin);
        Ok(site)
    }

    /// Move a site to `plan.candidate` and attach the plan's launches.
    pub async fn relocate(
        &self,
        site_id: SiteId,
        plan: &ReassignmentPlan,
        origin: EditOrigin,
    ) -> Result<Site> {
        let changes = SiteChanges {
            location: Some(plan.candidate),
            ..SiteChanges::default()
        };
        let site = self.edit(site_id, changes, origin).await?;
        if site.location != plan.candidate {
            // Automatic relocation of a custom site was skipped
            return Ok(site);
        }
        self.reassign_planned(site_id, &plan.flight_ids()).await?;
        Ok(site)
    }

    /// Delete a site that no flight references.
    pub async fn delete_if_unused(&self, site_id: SiteId) -> Result<()> {
        let count = self
            .flights
            .count_for_site(site_id)
            .await
            .at_step(MergeStep::Verify, &[site_id])?;
        if count > 0 {
            return Err(CoreError::invalid_input(format!(
                "site {site_id} is used by {count} flights; merge it instead"
            )));
        }
        self.sites.delete(site_id).await.at_step(MergeStep::Delete, &[site_id])?;
        info!("[SiteMerge] Deleted unused site {}", site_id);
        Ok(())
    }

    /// Check that every site referenced by `launches` exists.
    ///
    /// A dangling reference is never patched here; it is logged and returned
    /// as `InconsistentState`.
    pub async fn verify_references(&self, launches: &[Launch]) -> Result<()> {
        let referenced: BTreeSet<SiteId> = launches.iter().filter_map(|l| l.site_id).collect();
        let mut missing = Vec::new();
        for id in referenced {
            if self.sites.get(id).await.at_step(MergeStep::LoadSite, &[id])?.is_none() {
                missing.push(id);
            }
        }
        if missing.is_empty() {
            return Ok(());
        }
        error!("[SiteMerge] Launches reference missing sites {:?}", missing);
        Err(CoreError::InconsistentState {
            message: "launches reference sites that no longer exist".to_string(),
            site_ids: missing,
        })
    }
}
