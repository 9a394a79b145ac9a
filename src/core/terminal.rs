use console::{Emoji, style};

use crate::core::connection::{ConnectionSnapshot, ConnectionStatus};
use crate::core::router::events::{EventBody, InboundEvent};
use crate::core::store::ConsoleState;

pub static SUCCESS_ICON: Emoji<'_, '_> = Emoji("✅ ", "");
pub static WARN_ICON: Emoji<'_, '_> = Emoji("⚠️  ", "");
pub static ERROR_ICON: Emoji<'_, '_> = Emoji("❌ ", "");
pub static PLANE: Emoji<'_, '_> = Emoji("✈️  ", "");
pub static PLUG: Emoji<'_, '_> = Emoji("🔌 ", "");
pub static GEAR: Emoji<'_, '_> = Emoji("⚙️  ", "");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "");

pub fn print_success(msg: &str) {
    println!("{} {}", SUCCESS_ICON, style(msg).green());
}

pub fn print_warn(msg: &str) {
    println!("{} {}", WARN_ICON, style(msg).yellow());
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", ERROR_ICON, style(msg).red().bold());
}

pub fn print_status(label: &str, msg: &str) {
    println!("  {} {}: {}", GEAR, style(label).bold().cyan(), msg);
}

pub fn print_banner() {
    println!();
    println!("{}{}", PLANE, style("towerwatch").bold().cyan());
    println!(
        "{}\n",
        style("Live disruption, approval and agent activity from the ops stream.").dim()
    );
}

pub fn print_goodbye() {
    println!("\n{} {}", SPARKLE, style("Stream closed. Bye.").bold().cyan());
}

/// A titled block of `command  description` rows for help output.
pub struct GuideSection {
    title: String,
    rows: Vec<(String, String)>,
}

impl GuideSection {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            rows: Vec::new(),
        }
    }

    pub fn command(mut self, name: &str, description: &str) -> Self {
        self.rows.push((name.to_string(), description.to_string()));
        self
    }

    pub fn print(&self) {
        println!(" {}", style(&self.title).bold().underlined());
        let width = self.rows.iter().map(|(n, _)| n.len()).max().unwrap_or(0);
        for (name, description) in &self.rows {
            println!(
                "   {}  {}",
                style(format!("{:<width$}", name, width = width)).green(),
                description
            );
        }
        println!();
    }
}

pub fn print_connection(snapshot: &ConnectionSnapshot) {
    let label = match snapshot.status {
        ConnectionStatus::Connected => style(snapshot.status.as_str()).green().bold(),
        ConnectionStatus::Connecting => style(snapshot.status.as_str()).yellow(),
        ConnectionStatus::Disconnected => style(snapshot.status.as_str()).dim(),
        ConnectionStatus::Error => style(snapshot.status.as_str()).red().bold(),
    };
    let mut line = format!("{}{}", PLUG, label);
    if snapshot.reconnect_attempts > 0 {
        line.push_str(&format!(" (attempt {})", snapshot.reconnect_attempts));
    }
    if let Some(err) = &snapshot.last_error {
        line.push_str(&format!(" {}", style(err).red()));
    }
    println!("{}", line);
}

/// One compact line per routed event, or `None` for keep-alive noise.
pub fn event_line(event: &InboundEvent) -> Option<String> {
    let line = match &event.body {
        EventBody::Pong | EventBody::SubscriptionResult(_) => return None,
        EventBody::Connected(ev) => format!(
            "server greeted {} ({} topics)",
            ev.client_id.as_deref().unwrap_or("?"),
            ev.available_topics.len()
        ),
        EventBody::ServerStatus(ev) => {
            format!("server reports {} connected clients", ev.connected_clients)
        }
        EventBody::DisruptionCreated(ev) => {
            format!("disruption {} detected", ev.id().unwrap_or("?"))
        }
        EventBody::DisruptionUpdated(ev) | EventBody::DisruptionStatusChanged(ev) => {
            let status = ev
                .data
                .as_ref()
                .and_then(|d| d.get("status"))
                .and_then(|v| v.as_str())
                .unwrap_or("updated");
            format!("disruption {} {}", ev.id().unwrap_or("?"), status)
        }
        EventBody::ApprovalRequired(ev) => {
            format!("approval {} requested", ev.id().unwrap_or("?"))
        }
        EventBody::ApprovalDecision(ev) => format!(
            "approval {} {}",
            ev.id().unwrap_or("?"),
            ev.status().unwrap_or("decided")
        ),
        EventBody::WorkflowStatus(ev) => format!(
            "{} {} [{}]",
            ev.agent_name.as_deref().unwrap_or("?"),
            ev.status.as_deref().unwrap_or("?"),
            ev.workflow_id.as_deref().unwrap_or("-")
        ),
        EventBody::AgentThinking(ev) => format!(
            "{} thinking: {}",
            ev.agent_name.as_deref().unwrap_or("?"),
            truncate(ev.thinking.as_deref().unwrap_or(""), 80)
        ),
        EventBody::LlmRequest(ev) => format!(
            "llm {} ({} tokens)",
            ev.model.as_deref().unwrap_or("?"),
            ev.tokens_used.unwrap_or(0)
        ),
        EventBody::ToolInvocation(ev) => format!(
            "tool {} {}",
            ev.tool_name.as_deref().unwrap_or("?"),
            ev.status.as_deref().unwrap_or("")
        ),
        EventBody::ExecutionLog(ev) => format!(
            "[{}] {}",
            ev.level.as_deref().unwrap_or("INFO"),
            ev.message.as_deref().unwrap_or("")
        ),
        EventBody::Unknown { kind } => format!("unhandled {}", kind),
    };
    Some(line)
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    format!("{}…", cut)
}

pub fn print_summary(state: &ConsoleState) {
    println!();
    println!(" {}", style("Session summary").bold().underlined());
    print_status(
        "Disruptions",
        &format!(
            "{} tracked, {} open, {:.2} revenue at risk",
            state.workflows.len(),
            state.workflows.pending().len(),
            state.workflows.exposure()
        ),
    );
    print_status(
        "Approvals",
        &format!(
            "{} tracked, {} pending",
            state.approvals.len(),
            state.approvals.pending().len()
        ),
    );
    for agent in state.agents.iter() {
        print_status(
            agent.stage.as_str(),
            &format!(
                "{} ({} started, {} completed, {} failed)",
                agent.state, agent.runs_started, agent.runs_completed, agent.runs_failed
            ),
        );
    }
    let stats = &state.stats;
    print_status(
        "Router",
        &format!(
            "{} applied, {} acknowledged, {} anomalies, {} unattributable, {} undecodable, {} unknown",
            stats.applied,
            stats.acknowledged,
            stats.anomalies,
            stats.unattributable,
            stats.decode_failures,
            stats.unknown_types
        ),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keepalive_traffic_is_not_echoed() {
        let pong = InboundEvent::decode(r#"{"type":"pong"}"#).unwrap();
        assert_eq!(event_line(&pong), None);
    }

    #[test]
    fn event_lines_name_the_entity() {
        let created =
            InboundEvent::decode(r#"{"type":"disruption_created","data":{"id":"D1"}}"#).unwrap();
        assert_eq!(event_line(&created).unwrap(), "disruption D1 detected");
        let decision = InboundEvent::decode(
            r#"{"type":"approval_decision","data":{"id":"A1","status":"APPROVED"}}"#,
        )
        .unwrap();
        assert_eq!(event_line(&decision).unwrap(), "approval A1 APPROVED");
    }

    #[test]
    fn long_thoughts_are_truncated() {
        let text = "x".repeat(100);
        assert_eq!(truncate(&text, 10).chars().count(), 11);
        assert_eq!(truncate("short", 10), "short");
    }
}
