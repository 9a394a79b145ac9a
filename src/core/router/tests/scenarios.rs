use super::{feed, router};
use crate::core::router::stage::CanonicalStage;
use crate::core::store::{AgentState, ApprovalStatus, read_state};

#[test]
fn created_disruption_appears_in_pending_projection() {
    let router = router();
    feed(
        &router,
        &[r#"{"type":"disruption_created","data":{"id":"D1","severity":"CRITICAL"}}"#],
    );
    let state = read_state(router.state());
    let pending = state.workflows.pending();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, "D1");
}

#[test]
fn decided_approval_leaves_pending_queue() {
    let router = router();
    feed(
        &router,
        &[
            r#"{"type":"approval_required","data":{"id":"A1","status":"PENDING"}}"#,
            r#"{"type":"approval_decision","data":{"id":"A1","status":"APPROVED"}}"#,
        ],
    );
    let state = read_state(router.state());
    assert!(state.approvals.pending().iter().all(|a| a.id != "A1"));
    assert_eq!(
        state.approvals.get("A1").map(|a| a.status),
        Some(ApprovalStatus::Approved)
    );
}

#[test]
fn workflow_status_marks_stage_processing() {
    let router = router();
    feed(
        &router,
        &[
            r#"{"type":"workflow_status","agent_name":"DetectionAgent","status":"processing","workflow_id":"W1"}"#,
        ],
    );
    let state = read_state(router.state());
    let detection = state.agents.get(CanonicalStage::Detection);
    assert_eq!(detection.state, AgentState::Processing);
    assert_eq!(detection.workflow_id.as_deref(), Some("W1"));
}

#[test]
fn completed_status_rests_the_stage() {
    let router = router();
    feed(
        &router,
        &[
            r#"{"type":"workflow_status","agent_name":"ImpactAgent","status":"AGENT_STARTED","workflow_id":"W1"}"#,
            r#"{"type":"workflow_status","agent_name":"ImpactAgent","status":"AGENT_COMPLETED","workflow_id":"W1"}"#,
            r#"{"type":"workflow_status","agent_name":"DetectionAgent","status":"AGENT_STARTED","workflow_id":"W2"}"#,
            r#"{"type":"workflow_status","agent_name":"DetectionAgent","status":"agent_failed","workflow_id":"W2"}"#,
        ],
    );
    let state = read_state(router.state());
    let impact = state.agents.get(CanonicalStage::Impact);
    assert_eq!(impact.state, AgentState::Idle);
    assert_eq!(impact.last_outcome, Some(true));
    let detection = state.agents.get(CanonicalStage::Detection);
    assert_eq!(detection.state, AgentState::Listening);
    assert_eq!(detection.last_outcome, Some(false));
}
