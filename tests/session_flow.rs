use std::sync::Arc;
use std::time::Duration;

use towerwatch::core::connection::memory::MemoryConnector;
use towerwatch::core::router::stage::CanonicalStage;
use towerwatch::core::store::{AgentState, ApprovalStatus};
use towerwatch::{ConnectionStatus, ConsoleSession, SyncConfig};

fn config() -> SyncConfig {
    SyncConfig {
        ws_url: Some("ws://sync.test".into()),
        ..SyncConfig::default()
    }
}

async fn connected(session: &ConsoleSession) {
    session
        .connection()
        .watch_status()
        .wait_for(|s| s.status == ConnectionStatus::Connected)
        .await
        .expect("status channel closed");
}

#[tokio::test(start_paused = true)]
async fn session_streams_events_into_the_stores() {
    let connector = MemoryConnector::new();
    let peer = connector.accept_next();
    let session = ConsoleSession::init(&config(), Arc::new(connector.clone())).unwrap();
    connected(&session).await;

    let attempts = connector.attempts();
    assert_eq!(attempts.len(), 1);
    assert_eq!(
        attempts[0].url,
        format!("ws://sync.test/ws/{}", session.connection().client_id())
    );

    for frame in [
        r#"{"type":"disruption_created","data":{"id":"D7","severity":"HIGH","status":"DETECTED"}}"#,
        r#"{"type":"approval_required","data":{"id":"A7","disruption_id":"D7","required_level":"MANAGER"}}"#,
        r#"{"type":"workflow_status","agent_name":"ReplanAgent","status":"AGENT_STARTED","workflow_id":"W7"}"#,
        r#"{"type":"agent_thinking","agent_name":"ReplanAgent","thinking_content":"rebook on next rotation"}"#,
        r#"{"type":"approval_decision","data":{"id":"A7","status":"APPROVED"}}"#,
    ] {
        peer.send_text(frame);
    }
    tokio::time::sleep(Duration::from_millis(10)).await;

    session.read(|state| {
        assert!(state.workflows.get("D7").is_some());
        assert_eq!(
            state.approvals.get("A7").map(|a| a.status),
            Some(ApprovalStatus::Approved)
        );
        let replan = state.agents.get(CanonicalStage::Replan);
        assert_eq!(replan.state, AgentState::Processing);
        assert_eq!(state.diagnostics.thinking.len(), 1);
        assert_eq!(state.stats.decode_failures, 0);
    });

    session.teardown().await;
    assert!(peer.closed_by_client());
}

#[tokio::test(start_paused = true)]
async fn sessions_do_not_share_state() {
    let connector = MemoryConnector::new();
    let first_peer = connector.accept_next();
    let _second_peer = connector.accept_next();

    let first = ConsoleSession::init(&config(), Arc::new(connector.clone())).unwrap();
    connected(&first).await;
    let second = ConsoleSession::init(&config(), Arc::new(connector.clone())).unwrap();
    connected(&second).await;
    assert_ne!(first.connection().client_id(), second.connection().client_id());

    first_peer.send_text(r#"{"type":"disruption_created","data":{"id":"D1"}}"#);
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(first.read(|s| s.workflows.len()), 1);
    assert_eq!(second.read(|s| s.workflows.len()), 0);

    first.teardown().await;
    second.teardown().await;
}

#[test]
fn invalid_config_is_rejected_before_connecting() {
    let connector = MemoryConnector::new();
    let config = SyncConfig {
        ws_url: Some("http://not-a-socket".into()),
        ..SyncConfig::default()
    };
    assert!(ConsoleSession::init(&config, Arc::new(connector.clone())).is_err());
    assert_eq!(connector.attempt_count(), 0);
}
