//! JSON interchange payload.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::ScheduleError;
use crate::models::{Activity, Relationship, ScheduleData, WbsNode};

/// Header describing where a payload came from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadHeader {
    pub file_name: String,
    #[serde(default)]
    pub source_project_name: String,
    /// Origin of the working-hour axis for this batch.
    pub project_start: NaiveDateTime,
}

/// One project's schedule as delivered by an external system.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulePayload {
    pub header: PayloadHeader,
    #[serde(default)]
    pub activities: Vec<Activity>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    #[serde(default)]
    pub wbs: Vec<WbsNode>,
}

impl SchedulePayload {
    pub fn into_schedule_data(self) -> (PayloadHeader, ScheduleData) {
        let data = ScheduleData {
            project_start: self.header.project_start,
            activities: self.activities,
            relationships: self.relationships,
            wbs: self.wbs,
        };
        (self.header, data)
    }
}

/// Reject payloads larger than the configured bounds.
pub fn check_limits(payload: &SchedulePayload, config: &EngineConfig) -> Result<(), ScheduleError> {
    let checks = [
        ("activity", config.max_activities, payload.activities.len()),
        ("relationship", config.max_relationships, payload.relationships.len()),
        ("WBS node", config.max_wbs_nodes, payload.wbs.len()),
    ];
    for (what, limit, actual) in checks {
        if actual > limit {
            return Err(ScheduleError::PayloadTooLarge { what, limit, actual });
        }
    }
    Ok(())
}

/// Parse a JSON payload, enforcing size bounds before and after decoding.
pub fn parse_json(raw: &str, config: &EngineConfig) -> Result<SchedulePayload, ScheduleError> {
    if raw.len() > config.max_payload_bytes {
        return Err(ScheduleError::PayloadTooLarge {
            what: "byte",
            limit: config.max_payload_bytes,
            actual: raw.len(),
        });
    }
    let payload: SchedulePayload = serde_json::from_str(raw)?;
    check_limits(&payload, config)?;
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActivityStatus, RelationshipType};

    const SAMPLE: &str = r#"{
        "header": {
            "fileName": "tower.json",
            "sourceProjectName": "Tower A",
            "projectStart": "2025-01-06T08:00:00"
        },
        "activities": [
            {
                "id": "A", "externalActivityId": "A1000", "name": "Excavate",
                "status": "IN_PROGRESS", "percentComplete": 25,
                "plannedStart": "2025-01-06T08:00:00", "plannedFinish": "2025-01-10T16:00:00",
                "actualStart": "2025-01-06T08:00:00",
                "plannedDurationHours": 40, "remainingDurationHours": 30,
                "wbsId": "W1"
            },
            {
                "id": "B", "externalActivityId": "A1010", "name": "Pour footings",
                "status": "NOT_STARTED", "percentComplete": 0,
                "plannedStart": "2025-01-13T08:00:00", "plannedFinish": "2025-01-15T16:00:00",
                "plannedDurationHours": 24, "remainingDurationHours": 24
            }
        ],
        "relationships": [
            { "id": "R1", "predecessorActivityId": "A", "successorActivityId": "B", "type": "FS", "lagHours": -4 }
        ],
        "wbs": [ { "id": "W1", "code": "1.1", "name": "Civil" } ]
    }"#;

    #[test]
    fn test_parse_sample_payload() {
        let payload = parse_json(SAMPLE, &EngineConfig::default()).unwrap();

        assert_eq!(payload.header.file_name, "tower.json");
        assert_eq!(payload.activities.len(), 2);
        assert_eq!(payload.activities[0].status, ActivityStatus::InProgress);
        assert_eq!(payload.activities[0].wbs_id.as_deref(), Some("W1"));
        assert_eq!(payload.activities[1].actual_start, None);
        assert_eq!(payload.relationships[0].relationship_type, RelationshipType::FinishToStart);
        assert_eq!(payload.relationships[0].lag_hours, -4.0);
        assert_eq!(payload.wbs[0].parent_id, None);
    }

    #[test]
    fn test_limits_reject_large_payloads() {
        let config = EngineConfig {
            max_activities: 1,
            ..EngineConfig::default()
        };
        let err = parse_json(SAMPLE, &config).unwrap_err();
        assert_eq!(
            err,
            ScheduleError::PayloadTooLarge {
                what: "activity",
                limit: 1,
                actual: 2
            }
        );

        let tiny = EngineConfig {
            max_payload_bytes: 16,
            ..EngineConfig::default()
        };
        assert!(matches!(
            parse_json(SAMPLE, &tiny),
            Err(ScheduleError::PayloadTooLarge { what: "byte", .. })
        ));
    }

    #[test]
    fn test_malformed_json_is_a_parse_error() {
        let err = parse_json("{\"header\": 3}", &EngineConfig::default()).unwrap_err();
        assert!(matches!(err, ScheduleError::Parse(_)));
    }
}
