//! Inbound wire events.
//!
//! Every frame is a JSON object carrying a `type` discriminator next to the
//! per-type fields. Decoding happens in two steps: the envelope is read
//! first, then the remaining fields are deserialized into the payload shape
//! registered for that `type`. Types nobody registered land in
//! [`EventBody::Unknown`].

use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("frame is not a JSON object: {0}")]
    Json(#[source] serde_json::Error),
    #[error("frame has no \"type\" field")]
    MissingType,
    #[error("malformed \"{kind}\" payload: {source}")]
    Payload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    topic: Option<String>,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    pub timestamp: Option<String>,
    pub topic: Option<String>,
    pub body: EventBody,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventBody {
    Connected(ConnectedEvent),
    Pong,
    SubscriptionResult(SubscriptionResultEvent),
    ServerStatus(ServerStatusEvent),
    DisruptionCreated(DisruptionEvent),
    DisruptionUpdated(DisruptionEvent),
    DisruptionStatusChanged(DisruptionEvent),
    ApprovalRequired(ApprovalEvent),
    ApprovalDecision(ApprovalEvent),
    WorkflowStatus(WorkflowStatusEvent),
    AgentThinking(ThinkingEvent),
    LlmRequest(LlmCallEvent),
    ToolInvocation(ToolInvocationEvent),
    ExecutionLog(ExecutionLogEvent),
    Unknown { kind: String },
}

impl EventBody {
    /// The wire `type` this body was decoded from (aliases report their
    /// canonical name).
    pub fn kind(&self) -> &str {
        match self {
            EventBody::Connected(_) => "connected",
            EventBody::Pong => "pong",
            EventBody::SubscriptionResult(_) => "subscription_result",
            EventBody::ServerStatus(_) => "status",
            EventBody::DisruptionCreated(_) => "disruption_created",
            EventBody::DisruptionUpdated(_) => "disruption_updated",
            EventBody::DisruptionStatusChanged(_) => "disruption_status_changed",
            EventBody::ApprovalRequired(_) => "approval_required",
            EventBody::ApprovalDecision(_) => "approval_decision",
            EventBody::WorkflowStatus(_) => "workflow_status",
            EventBody::AgentThinking(_) => "agent_thinking",
            EventBody::LlmRequest(_) => "llm_request",
            EventBody::ToolInvocation(_) => "tool_invocation",
            EventBody::ExecutionLog(_) => "execution_log",
            EventBody::Unknown { kind } => kind,
        }
    }
}

impl InboundEvent {
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let envelope: Envelope = serde_json::from_str(text).map_err(DecodeError::Json)?;
        let kind = envelope.kind.ok_or(DecodeError::MissingType)?;
        let rest = Value::Object(envelope.rest);

        fn payload<T: serde::de::DeserializeOwned>(
            kind: &str,
            rest: Value,
        ) -> Result<T, DecodeError> {
            serde_json::from_value(rest).map_err(|source| DecodeError::Payload {
                kind: kind.to_string(),
                source,
            })
        }

        let mut body = match kind.as_str() {
            "connected" => EventBody::Connected(payload(&kind, rest)?),
            "pong" => EventBody::Pong,
            "subscription_result" => EventBody::SubscriptionResult(payload(&kind, rest)?),
            "status" => EventBody::ServerStatus(payload(&kind, rest)?),
            "disruption_created" => EventBody::DisruptionCreated(payload(&kind, rest)?),
            "disruption_updated" => EventBody::DisruptionUpdated(payload(&kind, rest)?),
            "disruption_status_changed" => {
                EventBody::DisruptionStatusChanged(payload(&kind, rest)?)
            }
            "approval_required" => EventBody::ApprovalRequired(payload(&kind, rest)?),
            "approval_decision" => EventBody::ApprovalDecision(payload(&kind, rest)?),
            "workflow_status" => EventBody::WorkflowStatus(payload(&kind, rest)?),
            "agent_thinking" => EventBody::AgentThinking(payload(&kind, rest)?),
            "llm_request" | "llm_call" => EventBody::LlmRequest(payload(&kind, rest)?),
            "tool_invocation" => EventBody::ToolInvocation(payload(&kind, rest)?),
            "execution_log" => EventBody::ExecutionLog(payload(&kind, rest)?),
            _ => EventBody::Unknown { kind },
        };

        // The envelope claims `topic`; a subscription result reports it there.
        if let EventBody::SubscriptionResult(result) = &mut body
            && result.topic.is_none()
        {
            result.topic = envelope.topic.clone();
        }

        Ok(Self {
            timestamp: envelope.timestamp,
            topic: envelope.topic,
            body,
        })
    }
}

fn str_field<'a>(data: Option<&'a Map<String, Value>>, key: &str) -> Option<&'a str> {
    data.and_then(|d| d.get(key)).and_then(|v| v.as_str())
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ConnectedEvent {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub available_topics: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SubscriptionResultEvent {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub success: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, serde::Serialize)]
pub struct ServerStatusEvent {
    #[serde(default)]
    pub connected_clients: u64,
    #[serde(default)]
    pub subscriptions: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DisruptionEvent {
    #[serde(default)]
    pub disruption_id: Option<String>,
    #[serde(default)]
    pub data: Option<Map<String, Value>>,
}

impl DisruptionEvent {
    /// `data.id` wins over the top-level `disruption_id`.
    pub fn id(&self) -> Option<&str> {
        str_field(self.data.as_ref(), "id").or(self.disruption_id.as_deref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ApprovalEvent {
    #[serde(default)]
    pub approval_id: Option<String>,
    #[serde(default)]
    pub decision: Option<String>,
    #[serde(default)]
    pub data: Option<Map<String, Value>>,
}

impl ApprovalEvent {
    pub fn id(&self) -> Option<&str> {
        str_field(self.data.as_ref(), "id").or(self.approval_id.as_deref())
    }

    /// Status carried by the event: `data.status`, else the top-level
    /// `decision`.
    pub fn status(&self) -> Option<&str> {
        str_field(self.data.as_ref(), "status").or(self.decision.as_deref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct WorkflowStatusEvent {
    #[serde(default)]
    pub workflow_id: Option<String>,
    #[serde(default)]
    pub agent_name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub data: Option<Map<String, Value>>,
}

impl WorkflowStatusEvent {
    /// Human-readable label for the step a stage is on.
    pub fn step_label(&self) -> Option<&str> {
        str_field(self.data.as_ref(), "step")
            .or_else(|| str_field(self.data.as_ref(), "current_step"))
            .or(self.status.as_deref())
    }

    /// True when the reported status ends a stage run, either way.
    pub fn is_terminal_report(&self) -> bool {
        self.outcome().is_some()
    }

    /// `Some(true)` for completion, `Some(false)` for failure.
    pub fn outcome(&self) -> Option<bool> {
        let status = self.status.as_deref()?.to_ascii_lowercase();
        if status.contains("completed") {
            Some(true)
        } else if status.contains("failed") {
            Some(false)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ThinkingEvent {
    #[serde(default)]
    pub workflow_id: Option<String>,
    #[serde(default)]
    pub agent_name: Option<String>,
    #[serde(default, alias = "thinking_content")]
    pub thinking: Option<String>,
    #[serde(default)]
    pub step: Option<String>,
    #[serde(default)]
    pub confidence_score: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LlmCallEvent {
    #[serde(default)]
    pub workflow_id: Option<String>,
    #[serde(default)]
    pub agent_name: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub tokens_used: Option<u64>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ToolInvocationEvent {
    #[serde(default)]
    pub workflow_id: Option<String>,
    #[serde(default)]
    pub agent_name: Option<String>,
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub input_params: Option<Value>,
    #[serde(default)]
    pub output_result: Option<Value>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ExecutionLogEvent {
    #[serde(default)]
    pub workflow_id: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub details: Option<Value>,
}
