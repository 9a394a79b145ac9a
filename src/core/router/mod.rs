//! Inbound message routing.
//!
//! [`apply`] is the reducer: one decoded event against the console state,
//! dispatched to exactly one store. [`MessageRouter`] wraps it with decoding,
//! locking, per-event panic isolation, counters and logging.

pub mod events;
pub mod stage;

#[cfg(test)]
mod tests;

use std::panic::{AssertUnwindSafe, catch_unwind};
use tracing::{debug, error, warn};

use crate::core::store::{Anomaly, Applied, ConsoleState, SharedState, write_state};
use events::{EventBody, InboundEvent};
use stage::CanonicalStage;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Rejection {
    #[error(transparent)]
    Anomaly(#[from] Anomaly),
    #[error("no handler for event type {0:?}")]
    UnknownType(String),
}

fn resolve_stage(agent_name: Option<&str>) -> Result<CanonicalStage, Anomaly> {
    let raw = agent_name.unwrap_or_default();
    CanonicalStage::from_agent_name(raw).ok_or_else(|| Anomaly::Unattributable(raw.to_string()))
}

/// Apply one event to `state`. Rejected events leave `state` untouched.
pub fn apply(state: &mut ConsoleState, event: &InboundEvent) -> Result<Applied, Rejection> {
    let at = event.timestamp.as_deref();
    let applied = match &event.body {
        EventBody::Connected(_) | EventBody::Pong | EventBody::SubscriptionResult(_) => {
            Applied::Acknowledged
        }
        EventBody::ServerStatus(status) => {
            state.server_status = Some(status.clone());
            Applied::Acknowledged
        }
        EventBody::DisruptionCreated(ev) => state.workflows.on_created(ev)?,
        EventBody::DisruptionUpdated(ev) | EventBody::DisruptionStatusChanged(ev) => {
            state.workflows.on_updated(ev)?
        }
        EventBody::ApprovalRequired(ev) => state.approvals.on_required(ev)?,
        EventBody::ApprovalDecision(ev) => state.approvals.on_decision(ev)?,
        EventBody::WorkflowStatus(ev) => {
            let stage = resolve_stage(ev.agent_name.as_deref())?;
            let workflow_id = ev.workflow_id.as_deref();
            match ev.outcome() {
                Some(success) => state.agents.finish(stage, success, workflow_id, at),
                None => state.agents.begin(stage, workflow_id, ev.step_label(), at),
            }
        }
        EventBody::AgentThinking(ev) => {
            let stage = resolve_stage(ev.agent_name.as_deref())?;
            state.diagnostics.record_thinking(stage, ev, at);
            Applied::Appended
        }
        EventBody::LlmRequest(ev) => {
            state.diagnostics.record_llm_call(ev, at);
            Applied::Appended
        }
        EventBody::ToolInvocation(ev) => {
            state.diagnostics.record_tool(ev, at);
            Applied::Appended
        }
        EventBody::ExecutionLog(ev) => {
            state.diagnostics.record_log(ev, at);
            Applied::Appended
        }
        EventBody::Unknown { kind } => return Err(Rejection::UnknownType(kind.clone())),
    };
    Ok(applied)
}

/// Single-writer front of the console state.
#[derive(Clone)]
pub struct MessageRouter {
    state: SharedState,
}

impl MessageRouter {
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    /// Decode and route one text frame. Returns the decoded event for
    /// listener fan-out, or `None` if the frame could not be decoded.
    pub fn handle_frame(&self, text: &str) -> Option<InboundEvent> {
        match InboundEvent::decode(text) {
            Ok(event) => {
                self.route(&event);
                Some(event)
            }
            Err(e) => {
                warn!("Dropping undecodable frame: {}", e);
                write_state(&self.state).stats.decode_failures += 1;
                None
            }
        }
    }

    /// Route an already decoded event. Failures are logged and counted,
    /// never propagated.
    pub fn route(&self, event: &InboundEvent) -> Option<Applied> {
        if let EventBody::SubscriptionResult(result) = &event.body
            && !result.success
        {
            warn!(
                "Server refused {} of topic {}",
                result.action.as_deref().unwrap_or("subscription"),
                result.topic.as_deref().unwrap_or("?")
            );
        }

        let mut state = write_state(&self.state);
        let outcome = catch_unwind(AssertUnwindSafe(|| apply(&mut state, event)));
        let kind = event.body.kind();
        match outcome {
            Ok(Ok(applied)) => {
                if applied == Applied::Acknowledged {
                    state.stats.acknowledged += 1;
                } else {
                    state.stats.applied += 1;
                }
                debug!("Routed {} ({:?})", kind, applied);
                Some(applied)
            }
            Ok(Err(Rejection::Anomaly(Anomaly::Unattributable(name)))) => {
                state.stats.unattributable += 1;
                debug!("Ignoring {} from unattributable agent {:?}", kind, name);
                None
            }
            Ok(Err(Rejection::Anomaly(anomaly))) => {
                state.stats.anomalies += 1;
                warn!("Dropped {}: {}", kind, anomaly);
                None
            }
            Ok(Err(Rejection::UnknownType(_))) => {
                state.stats.unknown_types += 1;
                warn!("Dropped event of unhandled type {:?}", kind);
                None
            }
            Err(_) => {
                state.stats.anomalies += 1;
                error!("Handler for {} panicked; event dropped", kind);
                None
            }
        }
    }
}
