use std::collections::BTreeSet;

use super::control::ControlFrame;

/// Topic names understood by the event server.
pub mod topics {
    pub const DISRUPTIONS: &str = "disruptions";
    pub const APPROVALS: &str = "approvals";
    pub const WORKFLOWS: &str = "workflows";
    pub const AGENT_THINKING: &str = "agent_thinking";
    pub const TOOL_INVOCATIONS: &str = "tool_invocations";
    pub const EXECUTION_LOGS: &str = "execution_logs";

    pub const ALL: [&str; 6] = [
        DISRUPTIONS,
        APPROVALS,
        WORKFLOWS,
        AGENT_THINKING,
        TOOL_INVOCATIONS,
        EXECUTION_LOGS,
    ];

    /// Subscribed on every connect.
    pub const DEFAULT: [&str; 4] = [DISRUPTIONS, APPROVALS, WORKFLOWS, AGENT_THINKING];

    pub fn is_known(topic: &str) -> bool {
        ALL.contains(&topic)
    }
}

/// Topics the client wants. Survives socket replacement; the server does not.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionRegistry {
    topics: BTreeSet<String>,
}

impl SubscriptionRegistry {
    pub fn with_topics<I, S>(topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            topics: topics.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns `false` if the topic was already registered.
    pub fn add(&mut self, topic: &str) -> bool {
        self.topics.insert(topic.to_string())
    }

    pub fn remove(&mut self, topic: &str) -> bool {
        self.topics.remove(topic)
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.topics.contains(topic)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.topics.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// One subscribe frame per registered topic, in stable order.
    pub fn subscribe_frames(&self) -> Vec<ControlFrame> {
        self.topics
            .iter()
            .map(|topic| ControlFrame::Subscribe {
                topic: topic.clone(),
            })
            .collect()
    }
}
