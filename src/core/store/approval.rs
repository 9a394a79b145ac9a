use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use std::collections::HashMap;

use super::{Anomaly, Applied, normalize_enum, str_value};
use crate::core::router::events::ApprovalEvent;

const ENTITY: &str = "approval";

/// Authorization level, ordered from least to most senior.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalLevel {
    Auto,
    Supervisor,
    Manager,
    Executive,
}

impl ApprovalLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            ApprovalLevel::Auto => "AUTO",
            ApprovalLevel::Supervisor => "SUPERVISOR",
            ApprovalLevel::Manager => "MANAGER",
            ApprovalLevel::Executive => "EXECUTIVE",
        }
    }

    pub fn from_label(value: &str) -> Option<Self> {
        match normalize_enum(value).as_str() {
            "AUTO" => Some(ApprovalLevel::Auto),
            "SUPERVISOR" => Some(ApprovalLevel::Supervisor),
            "MANAGER" => Some(ApprovalLevel::Manager),
            "EXECUTIVE" => Some(ApprovalLevel::Executive),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    Timeout,
    Escalated,
    AutoApproved,
}

impl ApprovalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "PENDING",
            ApprovalStatus::Approved => "APPROVED",
            ApprovalStatus::Rejected => "REJECTED",
            ApprovalStatus::Timeout => "TIMEOUT",
            ApprovalStatus::Escalated => "ESCALATED",
            ApprovalStatus::AutoApproved => "AUTO_APPROVED",
        }
    }

    pub fn from_status(value: &str) -> Option<Self> {
        match normalize_enum(value).as_str() {
            "PENDING" => Some(ApprovalStatus::Pending),
            "APPROVED" => Some(ApprovalStatus::Approved),
            "REJECTED" => Some(ApprovalStatus::Rejected),
            "TIMEOUT" => Some(ApprovalStatus::Timeout),
            "ESCALATED" => Some(ApprovalStatus::Escalated),
            "AUTO_APPROVED" => Some(ApprovalStatus::AutoApproved),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self != ApprovalStatus::Pending
    }
}

/// Only PENDING has outgoing edges. Repeating the current status is
/// always allowed.
pub fn can_transition(from: ApprovalStatus, to: ApprovalStatus) -> bool {
    from == to || from == ApprovalStatus::Pending
}

#[derive(Debug, Clone, PartialEq)]
pub struct Approval {
    pub id: String,
    pub disruption_id: Option<String>,
    pub required_level: ApprovalLevel,
    pub status: ApprovalStatus,
    pub risk_score: Option<f64>,
    pub deadline: Option<DateTime<Utc>>,
    pub attributes: Map<String, Value>,
    seq: u64,
}

/// The producer emits naive ISO timestamps in UTC; RFC 3339 is accepted too.
pub(crate) fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

struct Patch<'a> {
    status: Option<ApprovalStatus>,
    level: Option<ApprovalLevel>,
    risk_score: Option<f64>,
    deadline: Option<DateTime<Utc>>,
    fields: &'a Map<String, Value>,
}

fn parse_patch<'a>(
    fields: &'a Map<String, Value>,
    status: Option<&str>,
) -> Result<Patch<'a>, Anomaly> {
    let status = match status {
        None => None,
        Some(raw) => Some(ApprovalStatus::from_status(raw).ok_or_else(|| {
            Anomaly::InvalidValue {
                entity: ENTITY,
                field: "status",
                value: raw.to_string(),
            }
        })?),
    };
    let raw_level = str_value(fields, "required_level")
        .or_else(|| str_value(fields, "approval_level"))
        .or_else(|| str_value(fields, "level"));
    let level = match raw_level {
        None => None,
        Some(raw) => Some(ApprovalLevel::from_label(raw).ok_or_else(|| {
            Anomaly::InvalidValue {
                entity: ENTITY,
                field: "required_level",
                value: raw.to_string(),
            }
        })?),
    };
    Ok(Patch {
        status,
        level,
        risk_score: fields.get("risk_score").and_then(|v| v.as_f64()),
        deadline: str_value(fields, "timeout_at").and_then(parse_timestamp),
        fields,
    })
}

#[derive(Debug, Clone, Default)]
pub struct ApprovalStore {
    records: HashMap<String, Approval>,
    next_seq: u64,
}

impl ApprovalStore {
    /// `approval_required`: insert unless already known.
    pub fn on_required(&mut self, event: &ApprovalEvent) -> Result<Applied, Anomaly> {
        let id = event.id().ok_or(Anomaly::MissingId { entity: ENTITY })?;
        if self.records.contains_key(id) {
            return Ok(Applied::Unchanged);
        }
        let empty = Map::new();
        let data = event.data.as_ref().unwrap_or(&empty);
        let patch = parse_patch(data, event.status())?;
        self.insert(id, patch);
        Ok(Applied::Inserted)
    }

    /// `approval_decision`: merge into a known record. A record that has
    /// already reached a terminal status never changes again.
    pub fn on_decision(&mut self, event: &ApprovalEvent) -> Result<Applied, Anomaly> {
        let id = event.id().ok_or(Anomaly::MissingId { entity: ENTITY })?;
        let Some(current) = self.records.get(id) else {
            return Err(Anomaly::UnknownId {
                entity: ENTITY,
                id: id.to_string(),
            });
        };
        let empty = Map::new();
        let data = event.data.as_ref().unwrap_or(&empty);
        let patch = parse_patch(data, event.status())?;
        let target = patch.status.unwrap_or(current.status);

        if current.status.is_terminal() {
            if target == current.status {
                return Ok(Applied::Unchanged);
            }
            return Err(Anomaly::TerminalRegression {
                entity: ENTITY,
                id: id.to_string(),
                current: current.status.as_str().to_string(),
                attempted: target.as_str().to_string(),
            });
        }

        let transitioned = target != current.status;
        self.merge(id, patch);
        Ok(if transitioned {
            Applied::Transitioned
        } else {
            Applied::Merged
        })
    }

    /// Snapshot upsert. Known terminal records keep their status.
    pub fn hydrate(&mut self, record: &Map<String, Value>) -> Result<Applied, Anomaly> {
        let id = str_value(record, "id").ok_or(Anomaly::MissingId { entity: ENTITY })?;
        let mut patch = parse_patch(record, str_value(record, "status"))?;
        match self.records.get(id) {
            None => {
                self.insert(id, patch);
                Ok(Applied::Inserted)
            }
            Some(existing) => {
                if let Some(status) = patch.status
                    && !can_transition(existing.status, status)
                {
                    patch.status = None;
                }
                self.merge(id, patch);
                Ok(Applied::Merged)
            }
        }
    }

    fn insert(&mut self, id: &str, patch: Patch<'_>) {
        let status = patch.status.unwrap_or(ApprovalStatus::Pending);
        let mut attributes = patch.fields.clone();
        attributes.remove("id");
        attributes.insert(
            "status".to_string(),
            Value::String(status.as_str().to_string()),
        );
        let record = Approval {
            id: id.to_string(),
            disruption_id: str_value(patch.fields, "disruption_id").map(str::to_string),
            required_level: patch.level.unwrap_or(ApprovalLevel::Supervisor),
            status,
            risk_score: patch.risk_score,
            deadline: patch.deadline,
            attributes,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.records.insert(id.to_string(), record);
    }

    fn merge(&mut self, id: &str, patch: Patch<'_>) {
        let Some(record) = self.records.get_mut(id) else {
            return;
        };
        if let Some(status) = patch.status {
            record.status = status;
        }
        if let Some(level) = patch.level {
            record.required_level = level;
        }
        if let Some(score) = patch.risk_score {
            record.risk_score = Some(score);
        }
        if let Some(deadline) = patch.deadline {
            record.deadline = Some(deadline);
        }
        if let Some(disruption_id) = str_value(patch.fields, "disruption_id") {
            record.disruption_id = Some(disruption_id.to_string());
        }
        for (key, value) in patch.fields {
            if key != "id" && key != "status" {
                record.attributes.insert(key.clone(), value.clone());
            }
        }
        // The raw map mirrors the typed status, never a rejected one.
        record.attributes.insert(
            "status".to_string(),
            Value::String(record.status.as_str().to_string()),
        );
    }

    pub fn get(&self, id: &str) -> Option<&Approval> {
        self.records.get(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The pending queue: PENDING records only, earliest deadline first,
    /// records without a deadline last in arrival order.
    pub fn pending(&self) -> Vec<&Approval> {
        let mut out: Vec<&Approval> = self
            .records
            .values()
            .filter(|a| a.status == ApprovalStatus::Pending)
            .collect();
        out.sort_by(|a, b| match (a.deadline, b.deadline) {
            (Some(x), Some(y)) => x.cmp(&y).then(a.seq.cmp(&b.seq)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.seq.cmp(&b.seq),
        });
        out
    }

    /// Pending items at or above `level`.
    pub fn pending_at_level(&self, level: ApprovalLevel) -> Vec<&Approval> {
        self.pending()
            .into_iter()
            .filter(|a| a.required_level >= level)
            .collect()
    }
}
