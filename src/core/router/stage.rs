/// The six fixed pipeline stages, in processing order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalStage {
    Detection,
    Impact,
    Replan,
    Approval,
    Execution,
    Notification,
}

/// Substring vocabulary used to recognise a producer's agent name.
/// Checked in order; the first fragment found wins.
const STAGE_VOCABULARY: &[(&str, CanonicalStage)] = &[
    ("detect", CanonicalStage::Detection),
    ("impact", CanonicalStage::Impact),
    ("replan", CanonicalStage::Replan),
    ("approv", CanonicalStage::Approval),
    ("execut", CanonicalStage::Execution),
    ("notif", CanonicalStage::Notification),
];

impl CanonicalStage {
    pub const ALL: [CanonicalStage; 6] = [
        CanonicalStage::Detection,
        CanonicalStage::Impact,
        CanonicalStage::Replan,
        CanonicalStage::Approval,
        CanonicalStage::Execution,
        CanonicalStage::Notification,
    ];

    /// Map a raw agent name ("DetectionAgent", "replan_agent", ...) onto a
    /// stage. Names that match no vocabulary entry, including "system" and
    /// the empty string, resolve to `None`.
    pub fn from_agent_name(raw: &str) -> Option<Self> {
        let lowered = raw.trim().to_ascii_lowercase();
        if lowered.is_empty() {
            return None;
        }
        STAGE_VOCABULARY
            .iter()
            .find(|(fragment, _)| lowered.contains(fragment))
            .map(|(_, stage)| *stage)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CanonicalStage::Detection => "Detection",
            CanonicalStage::Impact => "Impact",
            CanonicalStage::Replan => "Replan",
            CanonicalStage::Approval => "Approval",
            CanonicalStage::Execution => "Execution",
            CanonicalStage::Notification => "Notification",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for CanonicalStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
