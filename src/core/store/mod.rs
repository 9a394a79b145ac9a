//! Entity state stores driven by the message router.
//!
//! Each store is a reducer over its own records: it validates an incoming
//! event completely and only then mutates, so a rejected event leaves the
//! store exactly as it was.

pub mod agent_activity;
pub mod approval;
pub mod diagnostics;
pub mod workflow;

use serde_json::{Map, Value};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::core::config::DiagnosticCapacities;
use crate::core::router::events::ServerStatusEvent;

pub use agent_activity::{AgentActivity, AgentActivityStore, AgentState};
pub use approval::{Approval, ApprovalLevel, ApprovalStatus, ApprovalStore};
pub use diagnostics::{BoundedLog, DiagnosticsStore};
pub use workflow::{Disruption, DisruptionStatus, Severity, WorkflowStore};

/// What a successfully applied event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Inserted,
    Merged,
    Transitioned,
    Appended,
    /// Idempotent repeat of something already reflected in the store.
    Unchanged,
    /// Control traffic with no store effect.
    Acknowledged,
}

/// An event that was understood but could not be applied.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Anomaly {
    #[error("{entity} event carries no id")]
    MissingId { entity: &'static str },
    #[error("{entity} {id} is not known to this session")]
    UnknownId { entity: &'static str, id: String },
    #[error("{entity} {id} is already {current}; refusing transition to {attempted}")]
    TerminalRegression {
        entity: &'static str,
        id: String,
        current: String,
        attempted: String,
    },
    #[error("unrecognised {field} value {value:?} for {entity}")]
    InvalidValue {
        entity: &'static str,
        field: &'static str,
        value: String,
    },
    #[error("agent {0:?} does not map to a pipeline stage")]
    Unattributable(String),
}

/// Counters kept by the router for everything it sees.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct RouterStats {
    pub applied: u64,
    pub acknowledged: u64,
    pub unattributable: u64,
    pub anomalies: u64,
    pub decode_failures: u64,
    pub unknown_types: u64,
}

/// Everything the console knows, as reconstructed from the event stream.
#[derive(Debug, Clone)]
pub struct ConsoleState {
    pub workflows: WorkflowStore,
    pub approvals: ApprovalStore,
    pub agents: AgentActivityStore,
    pub diagnostics: DiagnosticsStore,
    pub server_status: Option<ServerStatusEvent>,
    pub stats: RouterStats,
}

impl ConsoleState {
    pub fn new(capacities: &DiagnosticCapacities) -> Self {
        Self {
            workflows: WorkflowStore::default(),
            approvals: ApprovalStore::default(),
            agents: AgentActivityStore::default(),
            diagnostics: DiagnosticsStore::new(capacities),
            server_status: None,
            stats: RouterStats::default(),
        }
    }

    /// Seed disruptions from a REST snapshot. Records already present are
    /// merged, never replaced. Returns how many records were accepted.
    pub fn hydrate_disruptions(&mut self, records: Vec<Map<String, Value>>) -> usize {
        records
            .into_iter()
            .filter(|record| self.workflows.hydrate(record).is_ok())
            .count()
    }

    /// Seed approvals from a REST snapshot; terminal records are never
    /// regressed by stale snapshot data.
    pub fn hydrate_approvals(&mut self, records: Vec<Map<String, Value>>) -> usize {
        records
            .into_iter()
            .filter(|record| self.approvals.hydrate(record).is_ok())
            .count()
    }
}

impl Default for ConsoleState {
    fn default() -> Self {
        Self::new(&DiagnosticCapacities::default())
    }
}

pub type SharedState = Arc<RwLock<ConsoleState>>;

pub fn shared(state: ConsoleState) -> SharedState {
    Arc::new(RwLock::new(state))
}

/// Reducers validate before they mutate, so a poisoned lock still guards a
/// consistent state and is safe to keep using.
pub fn read_state(state: &SharedState) -> RwLockReadGuard<'_, ConsoleState> {
    state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub fn write_state(state: &SharedState) -> RwLockWriteGuard<'_, ConsoleState> {
    state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub(crate) fn str_value<'a>(data: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    data.get(key).and_then(|v| v.as_str())
}

/// Producer enums arrive upper snake case; accept any casing and `-`/space
/// separators.
pub(crate) fn normalize_enum(value: &str) -> String {
    value
        .trim()
        .chars()
        .map(|c| match c {
            '-' | ' ' => '_',
            other => other.to_ascii_uppercase(),
        })
        .collect()
}
