//! Python bindings: a JSON-in, JSON-out wrapper around `ScheduleStore`.

use pyo3::exceptions::{PyKeyError, PyValueError};
use pyo3::prelude::*;
use serde::Serialize;
use serde_json::json;

use crate::config::EngineConfig;
use crate::coordinator::{ImportOutcome, ScheduleStore};
use crate::error::ScheduleError;
use crate::models::{NewRelationship, ProgressUpdate};
use crate::snapshot::PublishedSnapshot;

fn to_py_err(err: ScheduleError) -> PyErr {
    match &err {
        ScheduleError::NotFound { .. } => PyKeyError::new_err(err.to_string()),
        ScheduleError::Validation(issues) => {
            let details: Vec<String> = issues.iter().map(ToString::to_string).collect();
            PyValueError::new_err(format!("{err}: {}", details.join("; ")))
        }
        _ => PyValueError::new_err(err.to_string()),
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> PyResult<String> {
    serde_json::to_string(value).map_err(|e| PyValueError::new_err(e.to_string()))
}

fn from_json<'de, T: serde::Deserialize<'de>>(raw: &'de str) -> PyResult<T> {
    serde_json::from_str(raw).map_err(|e| PyValueError::new_err(e.to_string()))
}

fn snapshot_value(snapshot: &PublishedSnapshot) -> serde_json::Value {
    json!({
        "projectId": snapshot.project_id,
        "batchId": snapshot.batch_id,
        "revision": snapshot.revision,
        "publishedAt": snapshot.published_at,
        "schedule": &*snapshot.schedule,
    })
}

fn outcome_value(outcome: &ImportOutcome) -> serde_json::Value {
    match &outcome.recompute {
        Ok(snapshot) => json!({ "batch": outcome.batch, "snapshot": snapshot_value(snapshot), "cycle": null }),
        Err(cycle) => json!({ "batch": outcome.batch, "snapshot": null, "cycle": cycle }),
    }
}

/// Schedule engine holding every project in memory.
///
/// Mutations return the published snapshot as JSON. A cycle raises
/// ValueError; the project then reports state INVALID and keeps serving its
/// last valid snapshot.
#[pyclass]
pub struct ScheduleEngine {
    store: ScheduleStore,
}

#[pymethods]
impl ScheduleEngine {
    #[new]
    #[pyo3(signature = (config=None))]
    fn new(config: Option<EngineConfig>) -> Self {
        Self {
            store: ScheduleStore::new(config.unwrap_or_default()),
        }
    }

    fn import_json(&self, project_id: &str, raw: &str) -> PyResult<String> {
        let outcome = self.store.import_json(project_id, raw).map_err(to_py_err)?;
        to_json(&outcome_value(&outcome))
    }

    fn import_xer(&self, project_id: &str, file_name: &str, raw: &str) -> PyResult<String> {
        let outcome = self.store.import_xer(project_id, file_name, raw).map_err(to_py_err)?;
        to_json(&outcome_value(&outcome))
    }

    fn update_progress(&self, project_id: &str, activity_id: &str, update_json: &str) -> PyResult<String> {
        let update: ProgressUpdate = from_json(update_json)?;
        let snapshot = self
            .store
            .update_progress(project_id, activity_id, &update)
            .map_err(to_py_err)?;
        to_json(&snapshot_value(&snapshot))
    }

    fn add_relationship(&self, project_id: &str, relationship_json: &str) -> PyResult<String> {
        let relationship: NewRelationship = from_json(relationship_json)?;
        let snapshot = self
            .store
            .add_relationship(project_id, &relationship)
            .map_err(to_py_err)?;
        to_json(&snapshot_value(&snapshot))
    }

    fn remove_relationship(&self, project_id: &str, relationship_id: &str) -> PyResult<String> {
        let snapshot = self
            .store
            .remove_relationship(project_id, relationship_id)
            .map_err(to_py_err)?;
        to_json(&snapshot_value(&snapshot))
    }

    #[pyo3(signature = (project_id, wbs_id, new_parent_id=None))]
    fn move_wbs_node(&self, project_id: &str, wbs_id: &str, new_parent_id: Option<&str>) -> PyResult<String> {
        let snapshot = self
            .store
            .move_wbs_node(project_id, wbs_id, new_parent_id)
            .map_err(to_py_err)?;
        to_json(&snapshot_value(&snapshot))
    }

    fn link_task(&self, project_id: &str, activity_id: &str, task_id: &str) -> PyResult<String> {
        let links = self.store.link_task(project_id, activity_id, task_id).map_err(to_py_err)?;
        to_json(&links)
    }

    fn link_milestone(&self, project_id: &str, activity_id: &str, milestone_id: &str) -> PyResult<String> {
        let links = self
            .store
            .link_milestone(project_id, activity_id, milestone_id)
            .map_err(to_py_err)?;
        to_json(&links)
    }

    fn unlink(&self, project_id: &str, activity_id: &str) -> PyResult<String> {
        let links = self.store.unlink(project_id, activity_id).map_err(to_py_err)?;
        to_json(&links)
    }

    fn delete_project(&self, project_id: &str) -> PyResult<()> {
        self.store.delete_project(project_id).map_err(to_py_err)
    }

    fn project_ids(&self) -> Vec<String> {
        self.store.project_ids()
    }

    fn snapshot(&self, project_id: &str) -> PyResult<String> {
        let snapshot = self.store.snapshot(project_id).map_err(to_py_err)?;
        to_json(&snapshot_value(&snapshot))
    }

    fn activity(&self, project_id: &str, activity_id: &str) -> PyResult<String> {
        to_json(&self.store.activity(project_id, activity_id).map_err(to_py_err)?)
    }

    #[pyo3(signature = (project_id, wbs_id=None))]
    fn wbs_rollup(&self, project_id: &str, wbs_id: Option<&str>) -> PyResult<String> {
        match wbs_id {
            Some(wbs_id) => to_json(&self.store.wbs_rollup(project_id, wbs_id).map_err(to_py_err)?),
            None => to_json(&self.store.wbs_rollups(project_id).map_err(to_py_err)?),
        }
    }

    fn critical_path(&self, project_id: &str) -> PyResult<String> {
        to_json(&self.store.critical_path(project_id).map_err(to_py_err)?)
    }

    fn status(&self, project_id: &str) -> PyResult<String> {
        to_json(&self.store.status(project_id).map_err(to_py_err)?)
    }

    fn batch_history(&self, project_id: &str) -> PyResult<String> {
        to_json(&self.store.batch_history(project_id).map_err(to_py_err)?)
    }

    fn active_batch(&self, project_id: &str) -> PyResult<String> {
        to_json(&self.store.active_batch(project_id).map_err(to_py_err)?)
    }

    fn batch_data(&self, project_id: &str, batch_id: u64) -> PyResult<String> {
        let data = self.store.batch_data(project_id, batch_id).map_err(to_py_err)?;
        to_json(&*data)
    }

    #[pyo3(signature = (project_id, activity_id=None))]
    fn links(&self, project_id: &str, activity_id: Option<&str>) -> PyResult<String> {
        match activity_id {
            Some(activity_id) => to_json(&self.store.links(project_id, activity_id).map_err(to_py_err)?),
            None => to_json(&self.store.all_links(project_id).map_err(to_py_err)?),
        }
    }

    fn __repr__(&self) -> String {
        format!("ScheduleEngine(projects={})", self.store.project_ids().len())
    }
}

/// The schedule_engine Python module.
#[pymodule]
fn schedule_engine(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<EngineConfig>()?;
    m.add_class::<ScheduleEngine>()?;
    Ok(())
}
