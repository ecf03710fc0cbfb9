//! Reader for the tab-delimited project interchange format.
//!
//! A file is a sequence of tables. Each table opens with `%T <name>`, names
//! its columns with `%F <field>...` and lists rows with `%R <value>...`.
//! `%E` ends the file. Only the `PROJECT`, `PROJWBS`, `TASK` and `TASKPRED`
//! tables are read; everything else is skipped.

use chrono::{NaiveDate, NaiveDateTime};
use rustc_hash::FxHashMap;

use crate::config::EngineConfig;
use crate::error::ScheduleError;
use crate::models::{Activity, ActivityStatus, Relationship, RelationshipType, WbsNode};

use super::payload::{PayloadHeader, SchedulePayload};

const PROJECT: &str = "PROJECT";
const PROJWBS: &str = "PROJWBS";
const TASK: &str = "TASK";
const TASKPRED: &str = "TASKPRED";

#[derive(Debug, Default)]
struct Table {
    fields: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    fn column(&self, field: &str) -> Option<usize> {
        self.fields.iter().position(|f| f == field)
    }

    fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().enumerate().map(move |(pos, values)| Row {
            table: self,
            ordinal: pos + 1,
            values,
        })
    }
}

struct Row<'t> {
    table: &'t Table,
    ordinal: usize,
    values: &'t [String],
}

impl<'t> Row<'t> {
    /// Value of `field`, or `None` when the column is absent or blank.
    fn get(&self, field: &str) -> Option<&'t str> {
        let col = self.table.column(field)?;
        self.values
            .get(col)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    fn fail(&self, table: &str, message: impl std::fmt::Display) -> ScheduleError {
        ScheduleError::Parse(format!("{table} row {}: {message}", self.ordinal))
    }

    fn require(&self, table: &str, field: &str) -> Result<&'t str, ScheduleError> {
        self.get(field)
            .ok_or_else(|| self.fail(table, format_args!("missing {field}")))
    }

    fn number(&self, table: &str, field: &str) -> Result<Option<f64>, ScheduleError> {
        self.get(field)
            .map(|v| {
                v.parse::<f64>()
                    .map_err(|_| self.fail(table, format_args!("{field} is not a number: {v}")))
            })
            .transpose()
    }

    fn datetime(&self, table: &str, field: &str) -> Result<Option<NaiveDateTime>, ScheduleError> {
        self.get(field)
            .map(|v| {
                parse_datetime(v)
                    .ok_or_else(|| self.fail(table, format_args!("{field} is not a date: {v}")))
            })
            .transpose()
    }

    /// Whether the row belongs to `proj_id`. Rows without the column match.
    fn in_project(&self, proj_id: &str) -> bool {
        self.get("proj_id").map_or(true, |id| id == proj_id)
    }
}

fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    for format in ["%Y-%m-%d %H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn row_limit(table: &str, config: &EngineConfig) -> Option<(&'static str, usize)> {
    match table {
        TASK => Some(("activity", config.max_activities)),
        TASKPRED => Some(("relationship", config.max_relationships)),
        PROJWBS => Some(("WBS node", config.max_wbs_nodes)),
        _ => None,
    }
}

/// Split the file into the tables this reader understands.
fn read_tables(raw: &str, config: &EngineConfig) -> Result<FxHashMap<String, Table>, ScheduleError> {
    let mut tables: FxHashMap<String, Table> = FxHashMap::default();
    let mut current: Option<String> = None;

    for (line_no, line) in raw.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        let mut parts = line.split('\t');
        let tag = parts.next().unwrap_or_default();
        match tag {
            "%T" => {
                let name = parts.next().unwrap_or_default().trim().to_string();
                let wanted = matches!(name.as_str(), PROJECT | PROJWBS | TASK | TASKPRED);
                if wanted && tables.contains_key(&name) {
                    return Err(ScheduleError::Parse(format!(
                        "line {}: table {name} appears twice",
                        line_no + 1
                    )));
                }
                if wanted {
                    tables.insert(name.clone(), Table::default());
                    current = Some(name);
                } else {
                    current = None;
                }
            }
            "%F" => {
                if let Some(table) = current.as_ref().and_then(|name| tables.get_mut(name)) {
                    table.fields = parts.map(|f| f.trim().to_string()).collect();
                }
            }
            "%R" => {
                let Some(name) = current.as_ref() else {
                    continue;
                };
                let Some(table) = tables.get_mut(name) else {
                    continue;
                };
                if table.fields.is_empty() {
                    return Err(ScheduleError::Parse(format!(
                        "line {}: {name} row before its field list",
                        line_no + 1
                    )));
                }
                table.rows.push(parts.map(str::to_string).collect());
                if let Some((what, limit)) = row_limit(name, config) {
                    if table.rows.len() > limit {
                        return Err(ScheduleError::PayloadTooLarge {
                            what,
                            limit,
                            actual: table.rows.len(),
                        });
                    }
                }
            }
            "%E" => break,
            _ => {}
        }
    }
    Ok(tables)
}

/// Parse an interchange file into a schedule payload for its first project.
pub fn parse_xer(raw: &str, file_name: &str, config: &EngineConfig) -> Result<SchedulePayload, ScheduleError> {
    if raw.len() > config.max_payload_bytes {
        return Err(ScheduleError::PayloadTooLarge {
            what: "byte",
            limit: config.max_payload_bytes,
            actual: raw.len(),
        });
    }
    let tables = read_tables(raw, config)?;

    let project = tables
        .get(PROJECT)
        .and_then(|t| t.rows().next())
        .ok_or_else(|| ScheduleError::Parse("no PROJECT table".to_string()))?;
    let proj_id = project.require(PROJECT, "proj_id")?;
    let project_name = project.get("proj_short_name").unwrap_or(proj_id).to_string();
    let plan_start = project.datetime(PROJECT, "plan_start_date")?;

    // The project node itself is not part of the breakdown
    let mut root_wbs: Option<&str> = None;
    let mut wbs = Vec::new();
    if let Some(table) = tables.get(PROJWBS) {
        for row in table.rows().filter(|r| r.in_project(proj_id)) {
            let id = row.require(PROJWBS, "wbs_id")?;
            if row.get("proj_node_flag") == Some("Y") {
                root_wbs = Some(id);
                continue;
            }
            let sort_order = match row.get("seq_num") {
                Some(v) => v
                    .parse::<i64>()
                    .map_err(|_| row.fail(PROJWBS, format_args!("seq_num is not an integer: {v}")))?,
                None => 0,
            };
            wbs.push(WbsNode {
                id: id.to_string(),
                code: row.get("wbs_short_name").unwrap_or(id).to_string(),
                name: row.get("wbs_name").unwrap_or_default().to_string(),
                parent_id: row.get("parent_wbs_id").map(str::to_string),
                sort_order,
            });
        }
    }
    let under_root = |id: Option<&str>| id.filter(|&id| Some(id) != root_wbs).map(str::to_string);
    for node in &mut wbs {
        node.parent_id = under_root(node.parent_id.as_deref());
    }

    let mut activities = Vec::new();
    if let Some(table) = tables.get(TASK) {
        for row in table.rows().filter(|r| r.in_project(proj_id)) {
            let id = row.require(TASK, "task_id")?;
            let status: ActivityStatus = row
                .require(TASK, "status_code")?
                .parse()
                .map_err(|e| row.fail(TASK, e))?;
            let planned_start = row
                .datetime(TASK, "target_start_date")?
                .ok_or_else(|| row.fail(TASK, "missing target_start_date"))?;
            let planned_finish = row.datetime(TASK, "target_end_date")?.unwrap_or(planned_start);
            let planned_duration = row.number(TASK, "target_drtn_hr_cnt")?.unwrap_or(0.0);
            let remaining = match row.number(TASK, "remain_drtn_hr_cnt")? {
                Some(hours) => hours,
                None if status == ActivityStatus::Completed => 0.0,
                None => planned_duration,
            };
            activities.push(Activity {
                id: id.to_string(),
                external_activity_id: row.get("task_code").unwrap_or(id).to_string(),
                name: row.get("task_name").unwrap_or_default().to_string(),
                status,
                percent_complete: row.number(TASK, "phys_complete_pct")?.unwrap_or(0.0),
                planned_start,
                planned_finish,
                actual_start: row.datetime(TASK, "act_start_date")?,
                actual_finish: row.datetime(TASK, "act_end_date")?,
                planned_duration_hours: planned_duration,
                remaining_duration_hours: remaining,
                total_float_hours: row.number(TASK, "total_float_hr_cnt")?,
                wbs_id: under_root(row.get("wbs_id")),
            });
        }
    }

    let mut relationships = Vec::new();
    if let Some(table) = tables.get(TASKPRED) {
        for row in table.rows().filter(|r| r.in_project(proj_id)) {
            let relationship_type: RelationshipType = row
                .require(TASKPRED, "pred_type")?
                .parse()
                .map_err(|e| row.fail(TASKPRED, e))?;
            relationships.push(Relationship {
                id: row.require(TASKPRED, "task_pred_id")?.to_string(),
                predecessor_activity_id: row.require(TASKPRED, "pred_task_id")?.to_string(),
                successor_activity_id: row.require(TASKPRED, "task_id")?.to_string(),
                relationship_type,
                lag_hours: row.number(TASKPRED, "lag_hr_cnt")?.unwrap_or(0.0),
            });
        }
    }

    let project_start = plan_start
        .or_else(|| activities.iter().map(|a| a.planned_start).min())
        .ok_or_else(|| ScheduleError::Parse("PROJECT has no plan_start_date and no tasks".to_string()))?;

    Ok(SchedulePayload {
        header: PayloadHeader {
            file_name: file_name.to_string(),
            source_project_name: project_name,
            project_start,
        },
        activities,
        relationships,
        wbs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> String {
        [
            "ERMHDR\t19.12\t2025-01-02\tProject\tadmin",
            "%T\tCURRTYPE",
            "%F\tcurr_id\tcurr_short_name",
            "%R\t1\tUSD",
            "%T\tPROJECT",
            "%F\tproj_id\tproj_short_name\tplan_start_date",
            "%R\t100\tTOWER-A\t2025-01-06 08:00",
            "%R\t200\tOTHER\t2025-03-03 08:00",
            "%T\tPROJWBS",
            "%F\twbs_id\tproj_id\tparent_wbs_id\twbs_short_name\twbs_name\tseq_num\tproj_node_flag",
            "%R\t1\t100\t\tTOWER-A\tTower A\t0\tY",
            "%R\t2\t100\t1\tCIV\tCivil\t10\tN",
            "%R\t3\t100\t2\tFDN\tFoundations\t20\tN",
            "%R\t9\t200\t\tOTHER\tOther\t0\tY",
            "%T\tTASK",
            "%F\ttask_id\tproj_id\twbs_id\ttask_code\ttask_name\tstatus_code\tphys_complete_pct\ttarget_start_date\ttarget_end_date\tact_start_date\tact_end_date\ttarget_drtn_hr_cnt\tremain_drtn_hr_cnt\ttotal_float_hr_cnt",
            "%R\t1001\t100\t2\tA1000\tMobilize\tTK_Complete\t100\t2025-01-06 08:00\t2025-01-07 16:00\t2025-01-06 08:00\t2025-01-07 16:00\t16\t0\t0",
            "%R\t1002\t100\t3\tA1010\tExcavate\tTK_Active\t40\t2025-01-08 08:00\t2025-01-14 16:00\t2025-01-08 08:00\t\t40\t24\t0",
            "%R\t1003\t100\t1\tA1020\tClose out\tTK_NotStart\t0\t2025-01-15 08:00\t2025-01-15 16:00\t\t\t8\t\t",
            "%R\t9001\t200\t9\tZ1\tElsewhere\tTK_NotStart\t0\t2025-03-03 08:00\t2025-03-03 16:00\t\t\t8\t8\t",
            "%T\tTASKPRED",
            "%F\ttask_pred_id\ttask_id\tpred_task_id\tproj_id\tpred_type\tlag_hr_cnt",
            "%R\t5001\t1002\t1001\t100\tPR_FS\t0",
            "%R\t5002\t1003\t1002\t100\tPR_SS\t-8",
            "%R\t5003\t9001\t9001\t200\tPR_FS\t0",
            "%E",
        ]
        .join("\r\n")
    }

    #[test]
    fn test_reads_first_project() {
        let payload = parse_xer(&sample(), "tower.xer", &EngineConfig::default()).unwrap();

        assert_eq!(payload.header.file_name, "tower.xer");
        assert_eq!(payload.header.source_project_name, "TOWER-A");
        assert_eq!(
            payload.header.project_start,
            NaiveDate::from_ymd_opt(2025, 1, 6).unwrap().and_hms_opt(8, 0, 0).unwrap()
        );

        let ids: Vec<&str> = payload.activities.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["1001", "1002", "1003"]);
        assert_eq!(payload.relationships.len(), 2);
        assert_eq!(payload.wbs.len(), 2);
    }

    #[test]
    fn test_project_node_is_dropped_from_hierarchy() {
        let payload = parse_xer(&sample(), "tower.xer", &EngineConfig::default()).unwrap();

        assert_eq!(payload.wbs[0].id, "2");
        assert_eq!(payload.wbs[0].parent_id, None);
        assert_eq!(payload.wbs[0].code, "CIV");
        assert_eq!(payload.wbs[0].sort_order, 10);
        assert_eq!(payload.wbs[1].parent_id.as_deref(), Some("2"));
        // Activities filed directly under the project node have no WBS
        assert_eq!(payload.activities[2].wbs_id, None);
    }

    #[test]
    fn test_task_fields() {
        let payload = parse_xer(&sample(), "tower.xer", &EngineConfig::default()).unwrap();
        let excavate = &payload.activities[1];

        assert_eq!(excavate.external_activity_id, "A1010");
        assert_eq!(excavate.status, ActivityStatus::InProgress);
        assert_eq!(excavate.percent_complete, 40.0);
        assert!(excavate.actual_start.is_some());
        assert_eq!(excavate.actual_finish, None);
        assert_eq!(excavate.remaining_duration_hours, 24.0);
        assert_eq!(excavate.total_float_hours, Some(0.0));

        // Blank remaining duration falls back to the planned duration
        let close_out = &payload.activities[2];
        assert_eq!(close_out.remaining_duration_hours, 8.0);
        assert_eq!(close_out.total_float_hours, None);

        let ss = &payload.relationships[1];
        assert_eq!(ss.predecessor_activity_id, "1002");
        assert_eq!(ss.successor_activity_id, "1003");
        assert_eq!(ss.relationship_type, RelationshipType::StartToStart);
        assert_eq!(ss.lag_hours, -8.0);
    }

    #[test]
    fn test_row_limit_stops_reading() {
        let config = EngineConfig {
            max_activities: 2,
            ..EngineConfig::default()
        };
        let err = parse_xer(&sample(), "tower.xer", &config).unwrap_err();
        assert_eq!(
            err,
            ScheduleError::PayloadTooLarge {
                what: "activity",
                limit: 2,
                actual: 3
            }
        );
    }

    #[test]
    fn test_bad_values_report_row() {
        let raw = sample().replace("TK_Active", "TK_Sleeping");
        let err = parse_xer(&raw, "tower.xer", &EngineConfig::default()).unwrap_err();
        match err {
            ScheduleError::Parse(message) => {
                assert!(message.starts_with("TASK row 2:"), "{message}");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_missing_project_table() {
        let err = parse_xer("%T\tTASK\n%F\ttask_id\n%E\n", "x.xer", &EngineConfig::default()).unwrap_err();
        assert_eq!(err, ScheduleError::Parse("no PROJECT table".to_string()));
    }

    #[test]
    fn test_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2025, 2, 3).unwrap().and_hms_opt(0, 0, 0).unwrap();
        assert_eq!(parse_datetime("2025-02-03"), Some(expected));
        assert_eq!(parse_datetime("2025-02-03 00:00"), Some(expected));
        assert_eq!(parse_datetime("2025-02-03 00:00:00"), Some(expected));
        assert_eq!(parse_datetime("03/02/2025"), None);
    }
}
