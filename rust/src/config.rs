//! Configuration types for the schedule engine.

#[cfg(feature = "python")]
use pyo3::prelude::*;

use crate::calendar::WorkCalendar;

/// Engine-wide settings: numeric tolerances, the working calendar, and the
/// bounds applied to import payloads.
#[cfg_attr(feature = "python", pyclass)]
#[derive(Clone, Debug, PartialEq)]
pub struct EngineConfig {
    /// Allowed difference between the two total float formulations. It does
    /// not affect criticality, which is total float at or below zero.
    #[cfg_attr(feature = "python", pyo3(get, set))]
    pub float_epsilon_hours: f64,
    /// Working hours per calendar day (display and date conversion only).
    #[cfg_attr(feature = "python", pyo3(get, set))]
    pub hours_per_day: f64,
    /// Hour of day at which work starts.
    #[cfg_attr(feature = "python", pyo3(get, set))]
    pub day_start_hour: u32,
    /// Largest accepted raw payload, in bytes.
    #[cfg_attr(feature = "python", pyo3(get, set))]
    pub max_payload_bytes: usize,
    #[cfg_attr(feature = "python", pyo3(get, set))]
    pub max_activities: usize,
    #[cfg_attr(feature = "python", pyo3(get, set))]
    pub max_relationships: usize,
    #[cfg_attr(feature = "python", pyo3(get, set))]
    pub max_wbs_nodes: usize,
    /// Largest accepted duration or lag magnitude, in hours.
    #[cfg_attr(feature = "python", pyo3(get, set))]
    pub max_duration_hours: f64,
    /// Verbosity level: 0=silent, 1=changes, 2=checks, 3=debug.
    #[cfg_attr(feature = "python", pyo3(get, set))]
    pub verbosity: u8,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            float_epsilon_hours: 0.0,
            hours_per_day: 8.0,
            day_start_hour: 8,
            max_payload_bytes: 64 * 1024 * 1024,
            max_activities: 20_000,
            max_relationships: 80_000,
            max_wbs_nodes: 10_000,
            max_duration_hours: 1_000_000.0,
            verbosity: 0,
        }
    }
}

impl EngineConfig {
    /// Working calendar derived from this configuration.
    pub fn calendar(&self) -> WorkCalendar {
        WorkCalendar::new(self.hours_per_day, self.day_start_hour)
    }
}

#[cfg(feature = "python")]
#[pymethods]
impl EngineConfig {
    #[new]
    #[pyo3(signature = (
        float_epsilon_hours=None,
        hours_per_day=None,
        day_start_hour=None,
        max_payload_bytes=None,
        max_activities=None,
        max_relationships=None,
        max_wbs_nodes=None,
        max_duration_hours=None,
        verbosity=None
    ))]
    #[allow(clippy::too_many_arguments)]
    fn py_new(
        float_epsilon_hours: Option<f64>,
        hours_per_day: Option<f64>,
        day_start_hour: Option<u32>,
        max_payload_bytes: Option<usize>,
        max_activities: Option<usize>,
        max_relationships: Option<usize>,
        max_wbs_nodes: Option<usize>,
        max_duration_hours: Option<f64>,
        verbosity: Option<u8>,
    ) -> Self {
        let defaults = Self::default();
        Self {
            float_epsilon_hours: float_epsilon_hours.unwrap_or(defaults.float_epsilon_hours),
            hours_per_day: hours_per_day.unwrap_or(defaults.hours_per_day),
            day_start_hour: day_start_hour.unwrap_or(defaults.day_start_hour),
            max_payload_bytes: max_payload_bytes.unwrap_or(defaults.max_payload_bytes),
            max_activities: max_activities.unwrap_or(defaults.max_activities),
            max_relationships: max_relationships.unwrap_or(defaults.max_relationships),
            max_wbs_nodes: max_wbs_nodes.unwrap_or(defaults.max_wbs_nodes),
            max_duration_hours: max_duration_hours.unwrap_or(defaults.max_duration_hours),
            verbosity: verbosity.unwrap_or(defaults.verbosity),
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "EngineConfig(float_epsilon_hours={}, hours_per_day={}, max_activities={})",
            self.float_epsilon_hours, self.hours_per_day, self.max_activities
        )
    }
}
