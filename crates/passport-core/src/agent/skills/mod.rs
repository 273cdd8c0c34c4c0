//! The six medical-passport stage skills.

mod intake;
mod localize;
mod referral;
mod structure;
mod summarize;
mod translate;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub use intake::{IntakeInput, IntakeMetadata, IntakeOutput, IntakeSkill};
pub use localize::{needs_translation, LocalizeInput, LocalizeOutput, LocalizeSkill};
pub use referral::{ReferralInput, ReferralOutput, ReferralSkill};
pub use structure::{StructureInput, StructureOutput, StructureSkill};
pub use summarize::{SummarizeInput, SummarizeOutput, SummarizeSkill};
pub use translate::{TranslateStageInput, TranslateStageOutput, TranslateSkill};

use super::AgentService;
use crate::capability::{InferenceBackend, ToolClient};
use crate::error::PassportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    Intake,
    Translate,
    Structure,
    Summarize,
    Localize,
    Referral,
}

impl StageKind {
    /// Pipeline order.
    pub const ALL: [StageKind; 6] = [
        StageKind::Intake,
        StageKind::Translate,
        StageKind::Structure,
        StageKind::Summarize,
        StageKind::Localize,
        StageKind::Referral,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Intake => "intake",
            StageKind::Translate => "translate",
            StageKind::Structure => "structure",
            StageKind::Summarize => "summarize",
            StageKind::Localize => "localize",
            StageKind::Referral => "referral",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageKind {
    type Err = PassportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StageKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| PassportError::NotFound(format!("unknown stage '{}'", s)))
    }
}

/// Agent service for one stage.
pub fn build_agent(
    stage: StageKind,
    endpoint: impl Into<String>,
    tools: Arc<dyn ToolClient>,
    reasoning: Option<Arc<dyn InferenceBackend>>,
) -> Result<AgentService, PassportError> {
    match stage {
        StageKind::Intake => AgentService::new(IntakeSkill, endpoint, tools, reasoning),
        StageKind::Translate => AgentService::new(TranslateSkill, endpoint, tools, reasoning),
        StageKind::Structure => AgentService::new(StructureSkill, endpoint, tools, reasoning),
        StageKind::Summarize => AgentService::new(SummarizeSkill, endpoint, tools, reasoning),
        StageKind::Localize => AgentService::new(LocalizeSkill, endpoint, tools, reasoning),
        StageKind::Referral => AgentService::new(ReferralSkill, endpoint, tools, reasoning),
    }
}
