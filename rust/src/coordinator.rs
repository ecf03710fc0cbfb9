//! Recalculation coordinator and the in-process schedule store.
//!
//! Each project has a single writer at a time. Mutations are applied to the
//! active batch's working copy under the project's writer lock, followed by a
//! full recompute. A successful recompute publishes a new snapshot by swapping
//! an `Arc`; readers clone that `Arc` and never wait for a recompute.
//!
//! When the relationships form a cycle the mutation stays applied, the project
//! becomes `Invalid` and readers keep seeing the last valid snapshot until a
//! later mutation repairs the network.

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::error::{CycleError, EntityKind, ScheduleError, ValidationIssue};
use crate::import::{
    self, parse_json, parse_xer, validate_activity, validate_relationship, PayloadHeader, SchedulePayload,
};
use crate::models::{
    Activity, ActivityId, ActivityLinks, ActivityStatus, BatchId, ImportBatch, NewRelationship, ProgressUpdate,
    ProjectId, Relationship, RelationshipId, ScheduleData,
};
use crate::snapshot::{recompute, ComputedActivity, PublishedSnapshot};
use crate::wbs::{validate_wbs, WbsRollup};
use crate::{log_changes, log_checks};

/// Per-project recalculation state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecalcState {
    /// Nothing computed yet.
    Idle,
    Computing,
    /// The published snapshot reflects the current data.
    Valid,
    /// The current data has a cycle; the published snapshot is stale.
    Invalid,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectStatus {
    pub state: RecalcState,
    /// Cycle that made the project invalid, cleared by the next valid recompute.
    pub last_error: Option<CycleError>,
    pub active_batch_id: Option<BatchId>,
    /// Revision of the latest published snapshot, 0 before the first.
    pub revision: u64,
}

impl Default for ProjectStatus {
    fn default() -> Self {
        Self {
            state: RecalcState::Idle,
            last_error: None,
            active_batch_id: None,
            revision: 0,
        }
    }
}

/// Result of an accepted import.
///
/// The batch is stored and active even when its relationships contain a cycle;
/// `recompute` carries that outcome.
#[derive(Clone, Debug)]
pub struct ImportOutcome {
    pub batch: ImportBatch,
    pub recompute: Result<Arc<PublishedSnapshot>, CycleError>,
}

#[derive(Debug)]
struct BatchRecord {
    batch: ImportBatch,
    /// Contents as imported, before any later edits.
    data: Arc<ScheduleData>,
}

#[derive(Debug)]
struct ActiveBatch {
    batch_id: BatchId,
    data: ScheduleData,
}

#[derive(Debug, Default)]
struct Working {
    active: Option<ActiveBatch>,
    revision: u64,
}

#[derive(Debug, Default)]
struct ProjectHandle {
    /// Held for the whole of a mutation, recompute included.
    writer: Mutex<Working>,
    snapshot: RwLock<Option<Arc<PublishedSnapshot>>>,
    status: RwLock<ProjectStatus>,
    history: RwLock<Vec<BatchRecord>>,
    links: RwLock<FxHashMap<ActivityId, ActivityLinks>>,
}

impl ProjectHandle {
    /// Recompute `data` and publish the result, updating the status either way.
    fn publish(
        &self,
        project_id: &str,
        batch_id: BatchId,
        data: &ScheduleData,
        revision: &mut u64,
        config: &EngineConfig,
    ) -> Result<Arc<PublishedSnapshot>, CycleError> {
        let verbosity = config.verbosity;
        {
            let mut status = self.status.write();
            status.state = RecalcState::Computing;
            status.active_batch_id = Some(batch_id);
        }

        match recompute(data, config) {
            Ok(schedule) => {
                *revision += 1;
                let snapshot = Arc::new(PublishedSnapshot {
                    project_id: project_id.to_string(),
                    batch_id,
                    revision: *revision,
                    published_at: Utc::now(),
                    schedule: Arc::new(schedule),
                });
                *self.snapshot.write() = Some(Arc::clone(&snapshot));
                {
                    let mut status = self.status.write();
                    status.state = RecalcState::Valid;
                    status.last_error = None;
                    status.revision = *revision;
                }
                log_changes!(
                    verbosity,
                    "project {}: published revision {} of batch {} ({} activities, {} critical, finish {}h)",
                    project_id,
                    snapshot.revision,
                    batch_id,
                    snapshot.schedule.activities.len(),
                    snapshot.schedule.critical_activity_ids.len(),
                    snapshot.schedule.project_finish_hours
                );
                Ok(snapshot)
            }
            Err(cycle) => {
                {
                    let mut status = self.status.write();
                    status.state = RecalcState::Invalid;
                    status.last_error = Some(cycle.clone());
                }
                log_changes!(verbosity, "project {} is invalid: {}", project_id, cycle);
                Err(cycle)
            }
        }
    }
}

fn apply_progress(activity: &mut Activity, update: &ProgressUpdate) {
    if let Some(status) = update.status {
        activity.status = status;
        if status == ActivityStatus::NotStarted {
            activity.actual_start = None;
            activity.actual_finish = None;
        }
    }
    if let Some(percent) = update.percent_complete {
        activity.percent_complete = percent;
    }
    if update.actual_start.is_some() {
        activity.actual_start = update.actual_start;
    }
    if update.actual_finish.is_some() {
        activity.actual_finish = update.actual_finish;
    }
    match update.remaining_duration_hours {
        Some(hours) => activity.remaining_duration_hours = hours,
        None if update.status == Some(ActivityStatus::Completed) => activity.remaining_duration_hours = 0.0,
        None => {}
    }
}

fn reject(issues: Vec<ValidationIssue>) -> Result<(), ScheduleError> {
    if issues.is_empty() {
        Ok(())
    } else {
        Err(ScheduleError::Validation(issues))
    }
}

/// All projects known to the engine, with their batches and snapshots.
#[derive(Debug, Default)]
pub struct ScheduleStore {
    config: EngineConfig,
    projects: RwLock<FxHashMap<ProjectId, Arc<ProjectHandle>>>,
    next_batch_id: AtomicU64,
}

impl ScheduleStore {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            projects: RwLock::new(FxHashMap::default()),
            next_batch_id: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Ids of all projects, sorted.
    pub fn project_ids(&self) -> Vec<ProjectId> {
        let mut ids: Vec<ProjectId> = self.projects.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    fn handle(&self, project_id: &str) -> Result<Arc<ProjectHandle>, ScheduleError> {
        self.projects
            .read()
            .get(project_id)
            .cloned()
            .ok_or_else(|| ScheduleError::not_found(EntityKind::Project, project_id))
    }

    /// Fails when `handle` was removed from the store after it was looked up.
    ///
    /// Callers hold the handle's writer lock, which `delete_project` also takes.
    fn ensure_registered(&self, project_id: &str, handle: &Arc<ProjectHandle>) -> Result<(), ScheduleError> {
        let registered = self
            .projects
            .read()
            .get(project_id)
            .is_some_and(|current| Arc::ptr_eq(current, handle));
        if registered {
            Ok(())
        } else {
            Err(ScheduleError::not_found(EntityKind::Project, project_id))
        }
    }

    fn handle_or_create(&self, project_id: &str) -> Arc<ProjectHandle> {
        if let Some(handle) = self.projects.read().get(project_id) {
            return Arc::clone(handle);
        }
        let mut projects = self.projects.write();
        Arc::clone(projects.entry(project_id.to_string()).or_default())
    }

    // ----- imports -----

    /// Import a JSON payload as the project's new active batch.
    pub fn import_json(&self, project_id: &str, raw: &str) -> Result<ImportOutcome, ScheduleError> {
        let payload = parse_json(raw, &self.config).inspect_err(|err| {
            log_checks!(self.config.verbosity, "project {}: import rejected: {}", project_id, err);
        })?;
        self.import_payload(project_id, payload)
    }

    /// Import a tab-delimited interchange file as the project's new active batch.
    pub fn import_xer(&self, project_id: &str, file_name: &str, raw: &str) -> Result<ImportOutcome, ScheduleError> {
        let payload = parse_xer(raw, file_name, &self.config).inspect_err(|err| {
            log_checks!(self.config.verbosity, "project {}: import rejected: {}", project_id, err);
        })?;
        self.import_payload(project_id, payload)
    }

    /// Validate and store a decoded payload, then recompute.
    ///
    /// Validation runs before any project is created or locked; a rejected
    /// payload leaves no trace.
    pub fn import_payload(&self, project_id: &str, payload: SchedulePayload) -> Result<ImportOutcome, ScheduleError> {
        let verbosity = self.config.verbosity;
        let (header, data) = import::prepare(payload, &self.config).inspect_err(|err| {
            log_checks!(verbosity, "project {}: import rejected: {}", project_id, err);
            for issue in err.issues() {
                log_checks!(verbosity, "  {}", issue);
            }
        })?;

        // A project deleted between lookup and lock is recreated
        loop {
            let handle = self.handle_or_create(project_id);
            let mut working = handle.writer.lock();
            if self.ensure_registered(project_id, &handle).is_ok() {
                return Ok(self.store_batch(project_id, &handle, &mut working, header, data));
            }
        }
    }

    /// Record a validated batch as the active one and recompute it.
    fn store_batch(
        &self,
        project_id: &str,
        handle: &ProjectHandle,
        working: &mut Working,
        header: PayloadHeader,
        data: ScheduleData,
    ) -> ImportOutcome {
        let batch = ImportBatch {
            id: self.next_batch_id.fetch_add(1, Ordering::SeqCst) + 1,
            project_id: project_id.to_string(),
            file_name: header.file_name,
            imported_at: Utc::now(),
            source_project_name: header.source_project_name,
            project_start: header.project_start,
            activities_count: data.activities.len(),
            relationships_count: data.relationships.len(),
            wbs_count: data.wbs.len(),
        };
        log_changes!(
            self.config.verbosity,
            "project {}: imported batch {} from {} ({} activities, {} relationships, {} WBS nodes)",
            project_id,
            batch.id,
            batch.file_name,
            batch.activities_count,
            batch.relationships_count,
            batch.wbs_count
        );

        handle.history.write().push(BatchRecord {
            batch: batch.clone(),
            data: Arc::new(data.clone()),
        });
        {
            let ids: FxHashSet<&str> = data.activities.iter().map(|a| a.id.as_str()).collect();
            handle.links.write().retain(|id, _| ids.contains(id.as_str()));
        }

        let active = working.active.insert(ActiveBatch {
            batch_id: batch.id,
            data,
        });
        let recompute = handle.publish(
            project_id,
            active.batch_id,
            &active.data,
            &mut working.revision,
            &self.config,
        );
        ImportOutcome { batch, recompute }
    }

    // ----- edits -----

    /// Apply `edit` to the active batch and recompute.
    ///
    /// `edit` must leave the data untouched when it returns an error.
    fn mutate<F>(&self, project_id: &str, edit: F) -> Result<Arc<PublishedSnapshot>, ScheduleError>
    where
        F: FnOnce(&mut ScheduleData) -> Result<(), ScheduleError>,
    {
        let handle = self.handle(project_id)?;
        let mut guard = handle.writer.lock();
        self.ensure_registered(project_id, &handle)?;
        let working = &mut *guard;
        let active = working
            .active
            .as_mut()
            .ok_or_else(|| ScheduleError::not_found(EntityKind::Batch, project_id))?;

        edit(&mut active.data).inspect_err(|err| {
            log_checks!(self.config.verbosity, "project {}: edit rejected: {}", project_id, err);
        })?;

        Ok(handle.publish(
            project_id,
            active.batch_id,
            &active.data,
            &mut working.revision,
            &self.config,
        )?)
    }

    /// Record progress on one activity.
    pub fn update_progress(
        &self,
        project_id: &str,
        activity_id: &str,
        update: &ProgressUpdate,
    ) -> Result<Arc<PublishedSnapshot>, ScheduleError> {
        log_changes!(self.config.verbosity, "project {}: progress on {}", project_id, activity_id);
        self.mutate(project_id, |data| {
            let activity = data
                .activity_mut(activity_id)
                .ok_or_else(|| ScheduleError::not_found(EntityKind::Activity, activity_id))?;
            let mut updated = activity.clone();
            apply_progress(&mut updated, update);
            reject(validate_activity(&updated, &self.config))?;
            *activity = updated;
            Ok(())
        })
    }

    /// Add a relationship. Closing a cycle leaves it in place and fails the recompute.
    pub fn add_relationship(
        &self,
        project_id: &str,
        relationship: &NewRelationship,
    ) -> Result<Arc<PublishedSnapshot>, ScheduleError> {
        self.mutate(project_id, |data| {
            let id = match &relationship.id {
                Some(id) => id.clone(),
                None => next_relationship_id(data),
            };
            let candidate = Relationship {
                id,
                predecessor_activity_id: relationship.predecessor_activity_id.clone(),
                successor_activity_id: relationship.successor_activity_id.clone(),
                relationship_type: relationship.relationship_type,
                lag_hours: relationship.lag_hours,
            };

            let activity_ids: FxHashSet<&str> = data.activities.iter().map(|a| a.id.as_str()).collect();
            let mut issues = validate_relationship(&candidate, &activity_ids, &self.config);
            if data.relationships.iter().any(|r| r.id == candidate.id) {
                issues.push(ValidationIssue::DuplicateRelationship {
                    id: candidate.id.clone(),
                });
            }
            reject(issues)?;

            log_changes!(
                self.config.verbosity,
                "project {}: add relationship {} {} -> {} ({}, lag {}h)",
                project_id,
                candidate.id,
                candidate.predecessor_activity_id,
                candidate.successor_activity_id,
                candidate.relationship_type,
                candidate.lag_hours
            );
            data.relationships.push(candidate);
            Ok(())
        })
    }

    pub fn remove_relationship(
        &self,
        project_id: &str,
        relationship_id: &str,
    ) -> Result<Arc<PublishedSnapshot>, ScheduleError> {
        self.mutate(project_id, |data| {
            let pos = data
                .relationships
                .iter()
                .position(|r| r.id == relationship_id)
                .ok_or_else(|| ScheduleError::not_found(EntityKind::Relationship, relationship_id))?;
            data.relationships.remove(pos);
            log_changes!(
                self.config.verbosity,
                "project {}: removed relationship {}",
                project_id,
                relationship_id
            );
            Ok(())
        })
    }

    /// Re-parent a WBS node. Moves that would create a parent cycle are rejected.
    pub fn move_wbs_node(
        &self,
        project_id: &str,
        wbs_id: &str,
        new_parent_id: Option<&str>,
    ) -> Result<Arc<PublishedSnapshot>, ScheduleError> {
        self.mutate(project_id, |data| {
            let pos = data
                .wbs
                .iter()
                .position(|node| node.id == wbs_id)
                .ok_or_else(|| ScheduleError::not_found(EntityKind::WbsNode, wbs_id))?;

            let mut candidate = data.wbs.clone();
            candidate[pos].parent_id = new_parent_id.map(str::to_string);
            reject(validate_wbs(&candidate))?;

            log_changes!(
                self.config.verbosity,
                "project {}: moved WBS node {} under {}",
                project_id,
                wbs_id,
                new_parent_id.unwrap_or("<root>")
            );
            data.wbs = candidate;
            Ok(())
        })
    }

    // ----- links -----

    fn edit_links<F>(&self, project_id: &str, activity_id: &str, edit: F) -> Result<ActivityLinks, ScheduleError>
    where
        F: FnOnce(&mut ActivityLinks),
    {
        let handle = self.handle(project_id)?;
        let working = handle.writer.lock();
        self.ensure_registered(project_id, &handle)?;
        let known = working
            .active
            .as_ref()
            .is_some_and(|active| active.data.activity(activity_id).is_some());
        if !known {
            return Err(ScheduleError::not_found(EntityKind::Activity, activity_id));
        }

        let mut links = handle.links.write();
        let entry = links.entry(activity_id.to_string()).or_default();
        edit(entry);
        let result = entry.clone();
        if result.is_empty() {
            links.remove(activity_id);
        }
        Ok(result)
    }

    /// Associate an activity with a task owned by the task service.
    pub fn link_task(&self, project_id: &str, activity_id: &str, task_id: &str) -> Result<ActivityLinks, ScheduleError> {
        log_changes!(self.config.verbosity, "project {}: link {} to task {}", project_id, activity_id, task_id);
        self.edit_links(project_id, activity_id, |links| {
            links.linked_task_id = Some(task_id.to_string());
        })
    }

    pub fn link_milestone(
        &self,
        project_id: &str,
        activity_id: &str,
        milestone_id: &str,
    ) -> Result<ActivityLinks, ScheduleError> {
        log_changes!(
            self.config.verbosity,
            "project {}: link {} to milestone {}",
            project_id,
            activity_id,
            milestone_id
        );
        self.edit_links(project_id, activity_id, |links| {
            links.linked_milestone_id = Some(milestone_id.to_string());
        })
    }

    /// Drop both associations of an activity.
    pub fn unlink(&self, project_id: &str, activity_id: &str) -> Result<ActivityLinks, ScheduleError> {
        self.edit_links(project_id, activity_id, |links| {
            *links = ActivityLinks::default();
        })
    }

    /// Remove a project with its history, links and snapshots.
    pub fn delete_project(&self, project_id: &str) -> Result<(), ScheduleError> {
        let handle = self.handle(project_id)?;
        // Wait for an in-flight mutation so it never lands in a removed project
        let _writer = handle.writer.lock();
        let mut projects = self.projects.write();
        match projects.get(project_id) {
            Some(current) if Arc::ptr_eq(current, &handle) => {
                projects.remove(project_id);
                log_changes!(self.config.verbosity, "project {}: deleted", project_id);
                Ok(())
            }
            _ => Err(ScheduleError::not_found(EntityKind::Project, project_id)),
        }
    }

    // ----- queries -----

    /// The latest valid snapshot.
    pub fn snapshot(&self, project_id: &str) -> Result<Arc<PublishedSnapshot>, ScheduleError> {
        self.handle(project_id)?
            .snapshot
            .read()
            .clone()
            .ok_or_else(|| ScheduleError::not_found(EntityKind::Snapshot, project_id))
    }

    pub fn activity(&self, project_id: &str, activity_id: &str) -> Result<ComputedActivity, ScheduleError> {
        self.snapshot(project_id)?
            .schedule
            .activity(activity_id)
            .cloned()
            .ok_or_else(|| ScheduleError::not_found(EntityKind::Activity, activity_id))
    }

    pub fn wbs_rollup(&self, project_id: &str, wbs_id: &str) -> Result<WbsRollup, ScheduleError> {
        self.snapshot(project_id)?
            .schedule
            .wbs_rollup(wbs_id)
            .cloned()
            .ok_or_else(|| ScheduleError::not_found(EntityKind::WbsNode, wbs_id))
    }

    /// Every WBS rollup in display order.
    pub fn wbs_rollups(&self, project_id: &str) -> Result<Vec<WbsRollup>, ScheduleError> {
        Ok(self.snapshot(project_id)?.schedule.wbs.clone())
    }

    /// Activities along the critical chain, in order.
    pub fn critical_path(&self, project_id: &str) -> Result<Vec<ComputedActivity>, ScheduleError> {
        let snapshot = self.snapshot(project_id)?;
        Ok(snapshot
            .schedule
            .critical_path
            .iter()
            .filter_map(|id| snapshot.schedule.activity(id).cloned())
            .collect())
    }

    pub fn status(&self, project_id: &str) -> Result<ProjectStatus, ScheduleError> {
        Ok(self.handle(project_id)?.status.read().clone())
    }

    /// All accepted batches, oldest first.
    pub fn batch_history(&self, project_id: &str) -> Result<Vec<ImportBatch>, ScheduleError> {
        let handle = self.handle(project_id)?;
        let history = handle.history.read();
        Ok(history.iter().map(|record| record.batch.clone()).collect())
    }

    pub fn active_batch(&self, project_id: &str) -> Result<ImportBatch, ScheduleError> {
        let handle = self.handle(project_id)?;
        let history = handle.history.read();
        history
            .last()
            .map(|record| record.batch.clone())
            .ok_or_else(|| ScheduleError::not_found(EntityKind::Batch, project_id))
    }

    /// Contents of a batch as it was imported.
    pub fn batch_data(&self, project_id: &str, batch_id: BatchId) -> Result<Arc<ScheduleData>, ScheduleError> {
        let handle = self.handle(project_id)?;
        let history = handle.history.read();
        history
            .iter()
            .find(|record| record.batch.id == batch_id)
            .map(|record| Arc::clone(&record.data))
            .ok_or_else(|| ScheduleError::not_found(EntityKind::Batch, batch_id.to_string()))
    }

    /// Links of one activity; empty when it has none.
    pub fn links(&self, project_id: &str, activity_id: &str) -> Result<ActivityLinks, ScheduleError> {
        let handle = self.handle(project_id)?;
        let links = handle.links.read();
        Ok(links.get(activity_id).cloned().unwrap_or_default())
    }

    /// Every linked activity of a project, by activity id.
    pub fn all_links(&self, project_id: &str) -> Result<Vec<(ActivityId, ActivityLinks)>, ScheduleError> {
        let handle = self.handle(project_id)?;
        let mut links: Vec<(ActivityId, ActivityLinks)> = handle
            .links
            .read()
            .iter()
            .map(|(id, links)| (id.clone(), links.clone()))
            .collect();
        links.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(links)
    }
}

fn next_relationship_id(data: &ScheduleData) -> RelationshipId {
    let taken: FxHashSet<&str> = data.relationships.iter().map(|r| r.id.as_str()).collect();
    (data.relationships.len() + 1..)
        .map(|n| format!("REL-{n}"))
        .find(|id| !taken.contains(id.as_str()))
        .unwrap_or_default()
}
