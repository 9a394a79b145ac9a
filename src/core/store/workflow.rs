use serde_json::{Map, Value};
use std::collections::HashMap;

use super::{Anomaly, Applied, normalize_enum, str_value};
use crate::core::router::events::DisruptionEvent;

const ENTITY: &str = "disruption";

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisruptionStatus {
    Detected,
    Analyzing,
    PendingApproval,
    Approved,
    Executing,
    Completed,
    Failed,
    RolledBack,
}

impl DisruptionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DisruptionStatus::Detected => "DETECTED",
            DisruptionStatus::Analyzing => "ANALYZING",
            DisruptionStatus::PendingApproval => "PENDING_APPROVAL",
            DisruptionStatus::Approved => "APPROVED",
            DisruptionStatus::Executing => "EXECUTING",
            DisruptionStatus::Completed => "COMPLETED",
            DisruptionStatus::Failed => "FAILED",
            DisruptionStatus::RolledBack => "ROLLED_BACK",
        }
    }

    pub fn from_status(value: &str) -> Option<Self> {
        match normalize_enum(value).as_str() {
            "DETECTED" => Some(DisruptionStatus::Detected),
            "ANALYZING" => Some(DisruptionStatus::Analyzing),
            "PENDING_APPROVAL" => Some(DisruptionStatus::PendingApproval),
            "APPROVED" => Some(DisruptionStatus::Approved),
            "EXECUTING" => Some(DisruptionStatus::Executing),
            "COMPLETED" => Some(DisruptionStatus::Completed),
            "FAILED" => Some(DisruptionStatus::Failed),
            "ROLLED_BACK" => Some(DisruptionStatus::RolledBack),
            _ => None,
        }
    }

    /// Resolved cases drop out of the pending projection.
    pub fn is_resolved(self) -> bool {
        matches!(
            self,
            DisruptionStatus::Completed | DisruptionStatus::Failed | DisruptionStatus::RolledBack
        )
    }
}

/// Ordered most severe first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Critical => "CRITICAL",
            Severity::High => "HIGH",
            Severity::Medium => "MEDIUM",
            Severity::Low => "LOW",
        }
    }

    pub fn from_label(value: &str) -> Option<Self> {
        match normalize_enum(value).as_str() {
            "CRITICAL" => Some(Severity::Critical),
            "HIGH" => Some(Severity::High),
            "MEDIUM" => Some(Severity::Medium),
            "LOW" => Some(Severity::Low),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Disruption {
    pub id: String,
    pub status: DisruptionStatus,
    pub severity: Option<Severity>,
    /// Every field the producer sent, latest value per key.
    pub attributes: Map<String, Value>,
    seq: u64,
}

impl Disruption {
    pub fn revenue_at_risk(&self) -> Option<f64> {
        self.attributes.get("revenue_at_risk").and_then(|v| v.as_f64())
    }

    pub fn total_awbs_affected(&self) -> Option<u64> {
        self.attributes
            .get("total_awbs_affected")
            .and_then(|v| v.as_u64())
    }

    pub fn flight_number(&self) -> Option<&str> {
        str_value(&self.attributes, "flight_number")
    }
}

/// Typed view of a partial update, built before anything is mutated.
struct Patch<'a> {
    status: Option<DisruptionStatus>,
    severity: Option<Severity>,
    fields: &'a Map<String, Value>,
}

fn parse_patch<'a>(fields: &'a Map<String, Value>) -> Result<Patch<'a>, Anomaly> {
    let status = match fields.get("status") {
        None | Some(Value::Null) => None,
        Some(raw) => {
            let text = raw.as_str().unwrap_or_default();
            Some(
                DisruptionStatus::from_status(text).ok_or_else(|| Anomaly::InvalidValue {
                    entity: ENTITY,
                    field: "status",
                    value: raw.to_string(),
                })?,
            )
        }
    };
    // Severity labels outside the known set are kept as raw attributes only.
    let severity = str_value(fields, "severity").and_then(Severity::from_label);
    Ok(Patch {
        status,
        severity,
        fields,
    })
}

#[derive(Debug, Clone, Default)]
pub struct WorkflowStore {
    records: HashMap<String, Disruption>,
    next_seq: u64,
}

impl WorkflowStore {
    /// `disruption_created`: insert unless the id is already known.
    pub fn on_created(&mut self, event: &DisruptionEvent) -> Result<Applied, Anomaly> {
        let empty = Map::new();
        let data = event.data.as_ref().unwrap_or(&empty);
        let id = event.id().ok_or(Anomaly::MissingId { entity: ENTITY })?;
        if self.records.contains_key(id) {
            return Ok(Applied::Unchanged);
        }
        let patch = parse_patch(data)?;
        self.insert(id, patch);
        Ok(Applied::Inserted)
    }

    /// `disruption_updated` / `disruption_status_changed`: merge into a
    /// known record. Unknown ids are never synthesized.
    pub fn on_updated(&mut self, event: &DisruptionEvent) -> Result<Applied, Anomaly> {
        let empty = Map::new();
        let data = event.data.as_ref().unwrap_or(&empty);
        let id = event.id().ok_or(Anomaly::MissingId { entity: ENTITY })?;
        if !self.records.contains_key(id) {
            return Err(Anomaly::UnknownId {
                entity: ENTITY,
                id: id.to_string(),
            });
        }
        let patch = parse_patch(data)?;
        self.merge(id, patch);
        Ok(Applied::Merged)
    }

    /// Snapshot records upsert: new ids are inserted, known ids merged.
    pub fn hydrate(&mut self, record: &Map<String, Value>) -> Result<Applied, Anomaly> {
        let id = str_value(record, "id").ok_or(Anomaly::MissingId { entity: ENTITY })?;
        let patch = parse_patch(record)?;
        if self.records.contains_key(id) {
            self.merge(id, patch);
            Ok(Applied::Merged)
        } else {
            self.insert(id, patch);
            Ok(Applied::Inserted)
        }
    }

    fn insert(&mut self, id: &str, patch: Patch<'_>) {
        let mut attributes = patch.fields.clone();
        attributes.remove("id");
        let record = Disruption {
            id: id.to_string(),
            status: patch.status.unwrap_or(DisruptionStatus::Detected),
            severity: patch.severity,
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
        if let Some(severity) = patch.severity {
            record.severity = Some(severity);
        }
        for (key, value) in patch.fields {
            if key != "id" {
                record.attributes.insert(key.clone(), value.clone());
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&Disruption> {
        self.records.get(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Unresolved disruptions, most severe first, then newest first.
    pub fn pending(&self) -> Vec<&Disruption> {
        let mut out: Vec<&Disruption> = self
            .records
            .values()
            .filter(|d| !d.status.is_resolved())
            .collect();
        out.sort_by(|a, b| {
            let rank = |d: &Disruption| d.severity.unwrap_or(Severity::Low);
            rank(a).cmp(&rank(b)).then(b.seq.cmp(&a.seq))
        });
        out
    }

    /// All records in arrival order.
    pub fn all(&self) -> Vec<&Disruption> {
        let mut out: Vec<&Disruption> = self.records.values().collect();
        out.sort_by_key(|d| d.seq);
        out
    }

    /// Sum of `revenue_at_risk` over unresolved cases.
    pub fn exposure(&self) -> f64 {
        self.pending()
            .iter()
            .filter_map(|d| d.revenue_at_risk())
            .sum()
    }
}
