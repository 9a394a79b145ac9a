use super::Applied;
use crate::core::router::stage::CanonicalStage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    Idle,
    Listening,
    Processing,
    Completed,
    Failed,
}

impl AgentState {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentState::Idle => "idle",
            AgentState::Listening => "listening",
            AgentState::Processing => "processing",
            AgentState::Completed => "completed",
            AgentState::Failed => "failed",
        }
    }

    /// Where a stage sits between runs. Detection keeps watching for new
    /// disruptions; every other stage waits to be handed work.
    pub fn resting(stage: CanonicalStage) -> Self {
        match stage {
            CanonicalStage::Detection => AgentState::Listening,
            _ => AgentState::Idle,
        }
    }

    pub fn can_transition(from: AgentState, to: AgentState) -> bool {
        if from == to {
            return true;
        }
        match from {
            AgentState::Idle | AgentState::Listening => matches!(to, AgentState::Processing),
            AgentState::Processing => matches!(to, AgentState::Completed | AgentState::Failed),
            AgentState::Completed | AgentState::Failed => matches!(
                to,
                AgentState::Idle | AgentState::Listening | AgentState::Processing
            ),
        }
    }
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct AgentActivity {
    pub stage: CanonicalStage,
    pub state: AgentState,
    pub current_step: Option<String>,
    pub workflow_id: Option<String>,
    pub last_workflow_id: Option<String>,
    /// `Some(true)` if the last finished run completed, `Some(false)` if it failed.
    pub last_outcome: Option<bool>,
    pub runs_started: u64,
    pub runs_completed: u64,
    pub runs_failed: u64,
    pub updated_at: Option<String>,
}

impl AgentActivity {
    fn resting(stage: CanonicalStage) -> Self {
        Self {
            stage,
            state: AgentState::resting(stage),
            current_step: None,
            workflow_id: None,
            last_workflow_id: None,
            last_outcome: None,
            runs_started: 0,
            runs_completed: 0,
            runs_failed: 0,
            updated_at: None,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.state == AgentState::Processing
    }
}

/// One record per pipeline stage, indexed by [`CanonicalStage`].
#[derive(Debug, Clone)]
pub struct AgentActivityStore {
    records: [AgentActivity; 6],
}

impl Default for AgentActivityStore {
    fn default() -> Self {
        Self {
            records: CanonicalStage::ALL.map(AgentActivity::resting),
        }
    }
}

impl AgentActivityStore {
    pub fn get(&self, stage: CanonicalStage) -> &AgentActivity {
        &self.records[stage.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &AgentActivity> {
        self.records.iter()
    }

    pub fn busy_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_busy()).count()
    }

    /// A stage reported progress on a workflow. The most recent report wins,
    /// even if it names a different workflow than the one attached.
    pub fn begin(
        &mut self,
        stage: CanonicalStage,
        workflow_id: Option<&str>,
        step: Option<&str>,
        at: Option<&str>,
    ) -> Applied {
        let record = &mut self.records[stage.index()];
        let was_busy = record.is_busy();
        let switched = workflow_id.is_some() && record.workflow_id.as_deref() != workflow_id;
        if !was_busy || switched {
            record.runs_started += 1;
        }
        record.state = AgentState::Processing;
        if let Some(id) = workflow_id {
            record.workflow_id = Some(id.to_string());
        }
        record.current_step = step.map(str::to_string);
        record.updated_at = at.map(str::to_string);
        if was_busy {
            Applied::Merged
        } else {
            Applied::Transitioned
        }
    }

    /// A stage reported the end of a run. The outcome is recorded and the
    /// stage returns to rest, whichever workflow it was attached to.
    pub fn finish(
        &mut self,
        stage: CanonicalStage,
        success: bool,
        workflow_id: Option<&str>,
        at: Option<&str>,
    ) -> Applied {
        let record = &mut self.records[stage.index()];
        let outcome = if success {
            AgentState::Completed
        } else {
            AgentState::Failed
        };
        let was_busy = AgentState::can_transition(record.state, outcome);
        if success {
            record.runs_completed += 1;
        } else {
            record.runs_failed += 1;
        }
        record.last_outcome = Some(success);
        record.last_workflow_id = workflow_id
            .map(str::to_string)
            .or_else(|| record.workflow_id.take());
        record.workflow_id = None;
        record.current_step = None;
        record.state = AgentState::resting(stage);
        record.updated_at = at.map(str::to_string);
        if was_busy {
            Applied::Transitioned
        } else {
            Applied::Merged
        }
    }
}
