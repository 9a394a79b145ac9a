//! Capped diagnostic traces: agent reasoning, LLM calls, tool invocations
//! and execution logs. Each trace keeps its newest entries only.

use serde_json::Value;
use std::collections::VecDeque;

use crate::core::config::DiagnosticCapacities;
use crate::core::router::events::{
    ExecutionLogEvent, LlmCallEvent, ThinkingEvent, ToolInvocationEvent,
};
use crate::core::router::stage::CanonicalStage;

/// Ring buffer that evicts its oldest entry once `capacity` is reached.
#[derive(Debug, Clone)]
pub struct BoundedLog<T> {
    entries: VecDeque<T>,
    capacity: usize,
    evicted: u64,
}

impl<T> BoundedLog<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            evicted: 0,
        }
    }

    pub fn push(&mut self, entry: T) {
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
            self.evicted += 1;
        }
        self.entries.push_back(entry);
    }

    /// Oldest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&T> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries dropped to stay within capacity since creation.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThinkingEntry {
    pub stage: CanonicalStage,
    pub workflow_id: Option<String>,
    pub step: Option<String>,
    pub text: String,
    pub confidence: Option<f64>,
    pub at: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LlmEntry {
    pub stage: Option<CanonicalStage>,
    pub workflow_id: Option<String>,
    pub model: Option<String>,
    pub prompt: Option<String>,
    pub response: Option<String>,
    pub tokens_used: Option<u64>,
    pub duration_ms: Option<u64>,
    pub at: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolEntry {
    pub stage: Option<CanonicalStage>,
    pub workflow_id: Option<String>,
    pub tool_name: String,
    pub status: Option<String>,
    pub input: Option<Value>,
    pub output: Option<Value>,
    pub duration_ms: Option<u64>,
    pub at: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub level: String,
    pub source: Option<String>,
    pub message: String,
    pub workflow_id: Option<String>,
    pub details: Option<Value>,
    pub at: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DiagnosticsStore {
    pub thinking: BoundedLog<ThinkingEntry>,
    pub llm_calls: BoundedLog<LlmEntry>,
    pub tools: BoundedLog<ToolEntry>,
    pub logs: BoundedLog<LogEntry>,
    thinking_by_stage: [u64; 6],
}

impl DiagnosticsStore {
    pub fn new(capacities: &DiagnosticCapacities) -> Self {
        Self {
            thinking: BoundedLog::with_capacity(capacities.thinking),
            llm_calls: BoundedLog::with_capacity(capacities.llm),
            tools: BoundedLog::with_capacity(capacities.tools),
            logs: BoundedLog::with_capacity(capacities.logs),
            thinking_by_stage: [0; 6],
        }
    }

    pub fn record_thinking(
        &mut self,
        stage: CanonicalStage,
        event: &ThinkingEvent,
        at: Option<&str>,
    ) {
        self.thinking_by_stage[stage.index()] += 1;
        self.thinking.push(ThinkingEntry {
            stage,
            workflow_id: event.workflow_id.clone(),
            step: event.step.clone(),
            text: event.thinking.clone().unwrap_or_default(),
            confidence: event.confidence_score,
            at: at.map(str::to_string),
        });
    }

    pub fn record_llm_call(&mut self, event: &LlmCallEvent, at: Option<&str>) {
        self.llm_calls.push(LlmEntry {
            stage: event
                .agent_name
                .as_deref()
                .and_then(CanonicalStage::from_agent_name),
            workflow_id: event.workflow_id.clone(),
            model: event.model.clone(),
            prompt: event.prompt.clone(),
            response: event.response.clone(),
            tokens_used: event.tokens_used,
            duration_ms: event.duration_ms,
            at: at.map(str::to_string),
        });
    }

    pub fn record_tool(&mut self, event: &ToolInvocationEvent, at: Option<&str>) {
        self.tools.push(ToolEntry {
            stage: event
                .agent_name
                .as_deref()
                .and_then(CanonicalStage::from_agent_name),
            workflow_id: event.workflow_id.clone(),
            tool_name: event
                .tool_name
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
            status: event.status.clone(),
            input: event.input_params.clone(),
            output: event.output_result.clone(),
            duration_ms: event.duration_ms,
            at: at.map(str::to_string),
        });
    }

    pub fn record_log(&mut self, event: &ExecutionLogEvent, at: Option<&str>) {
        self.logs.push(LogEntry {
            level: event
                .level
                .as_deref()
                .map(str::to_ascii_uppercase)
                .unwrap_or_else(|| "INFO".to_string()),
            source: event.source.clone(),
            message: event.message.clone().unwrap_or_default(),
            workflow_id: event.workflow_id.clone(),
            details: event.details.clone(),
            at: at.map(str::to_string),
        });
    }

    /// Thinking entries seen for `stage` over the session, evicted ones included.
    pub fn thinking_count(&self, stage: CanonicalStage) -> u64 {
        self.thinking_by_stage[stage.index()]
    }

    pub fn tokens_used(&self) -> u64 {
        self.llm_calls
            .iter()
            .filter_map(|e| e.tokens_used)
            .fold(0u64, |acc, n| acc.saturating_add(n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn oldest_entries_are_evicted_first() {
        let mut log = BoundedLog::with_capacity(500);
        for i in 0..600u32 {
            log.push(i);
        }
        assert_eq!(log.len(), 500);
        assert_eq!(log.evicted(), 100);
        let kept: Vec<u32> = log.iter().copied().collect();
        let expected: Vec<u32> = (100..600).collect();
        assert_eq!(kept, expected);
        assert_eq!(log.latest(), Some(&599));
    }

    #[test]
    fn zero_capacity_is_clamped_to_one() {
        let mut log = BoundedLog::with_capacity(0);
        log.push("a");
        log.push("b");
        assert_eq!(log.capacity(), 1);
        assert_eq!(log.iter().collect::<Vec<_>>(), vec![&"b"]);
    }

    #[test]
    fn thinking_counter_survives_eviction() {
        let mut store = DiagnosticsStore::new(&DiagnosticCapacities {
            thinking: 2,
            ..DiagnosticCapacities::default()
        });
        let event = ThinkingEvent {
            thinking: Some("checking slot availability".to_string()),
            ..Default::default()
        };
        for _ in 0..5 {
            store.record_thinking(CanonicalStage::Replan, &event, None);
        }
        assert_eq!(store.thinking.len(), 2);
        assert_eq!(store.thinking_count(CanonicalStage::Replan), 5);
        assert_eq!(store.thinking_count(CanonicalStage::Impact), 0);
    }

    #[test]
    fn llm_and_tool_entries_attribute_stage_when_possible() {
        let mut store = DiagnosticsStore::new(&DiagnosticCapacities::default());
        store.record_llm_call(
            &LlmCallEvent {
                agent_name: Some("ImpactAgent".to_string()),
                tokens_used: Some(40),
                ..Default::default()
            },
            None,
        );
        store.record_llm_call(
            &LlmCallEvent {
                agent_name: Some("system".to_string()),
                tokens_used: Some(2),
                ..Default::default()
            },
            None,
        );
        store.record_tool(&ToolInvocationEvent::default(), Some("t"));
        assert_eq!(store.tokens_used(), 42);
        let stages: Vec<_> = store.llm_calls.iter().map(|e| e.stage).collect();
        assert_eq!(stages, vec![Some(CanonicalStage::Impact), None]);
        assert_eq!(store.tools.latest().unwrap().tool_name, "unknown");
    }

    #[test]
    fn token_total_saturates_instead_of_overflowing() {
        let mut store = DiagnosticsStore::new(&DiagnosticCapacities::default());
        for tokens in [u64::MAX, 5] {
            store.record_llm_call(
                &LlmCallEvent {
                    tokens_used: Some(tokens),
                    ..Default::default()
                },
                None,
            );
        }
        assert_eq!(store.tokens_used(), u64::MAX);
    }

    #[test]
    fn log_levels_are_normalized() {
        let mut store = DiagnosticsStore::new(&DiagnosticCapacities::default());
        store.record_log(
            &ExecutionLogEvent {
                level: Some("warning".to_string()),
                message: Some("slow response".to_string()),
                ..Default::default()
            },
            None,
        );
        store.record_log(&ExecutionLogEvent::default(), None);
        let levels: Vec<&str> = store.logs.iter().map(|e| e.level.as_str()).collect();
        assert_eq!(levels, vec!["WARNING", "INFO"]);
    }

    proptest! {
        #[test]
        fn length_never_exceeds_capacity(capacity in 1usize..64, pushes in 0usize..256) {
            let mut log = BoundedLog::with_capacity(capacity);
            for i in 0..pushes {
                log.push(i);
                prop_assert!(log.len() <= capacity);
            }
            prop_assert_eq!(log.len(), pushes.min(capacity));
            if pushes > 0 {
                prop_assert_eq!(log.latest(), Some(&(pushes - 1)));
            }
        }
    }
}
