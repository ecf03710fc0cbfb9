//! Schedule import: decoding, bounds and validation.

pub mod payload;
pub mod validate;
pub mod xer;

pub use payload::{check_limits, parse_json, PayloadHeader, SchedulePayload};
pub use validate::{validate_activity, validate_relationship, validate_schedule};
pub use xer::parse_xer;

use crate::config::EngineConfig;
use crate::error::ScheduleError;
use crate::models::ScheduleData;

/// Check bounds and validate a decoded payload, yielding the batch contents.
///
/// Nothing is returned unless the whole payload is clean.
pub fn prepare(payload: SchedulePayload, config: &EngineConfig) -> Result<(PayloadHeader, ScheduleData), ScheduleError> {
    check_limits(&payload, config)?;
    let (header, data) = payload.into_schedule_data();
    let issues = validate_schedule(&data, config);
    if !issues.is_empty() {
        return Err(ScheduleError::Validation(issues));
    }
    Ok((header, data))
}
