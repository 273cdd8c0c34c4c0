//! Run state: one `WorkflowRun` per submission, one `AgentTask` per stage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{ErrorBody, PassportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

/// One stage's execution within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentTask {
    pub task_id: String,
    pub stage_name: String,
    pub status: TaskStatus,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl AgentTask {
    pub fn new(stage_name: impl Into<String>) -> Self {
        Self {
            task_id: Uuid::new_v4().to_string(),
            stage_name: stage_name.into(),
            status: TaskStatus::Pending,
            attempts: 0,
            endpoint: None,
            input_payload: None,
            output_payload: None,
            error: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn start(&mut self, input: Value) {
        self.status = TaskStatus::Running;
        self.input_payload = Some(input);
        self.started_at = Some(Utc::now());
    }

    /// Record the validated output. A task's output is written once.
    pub fn record_output(&mut self, output: Value) -> Result<(), PassportError> {
        if self.output_payload.is_some() {
            return Err(PassportError::Internal(format!(
                "output of stage '{}' is already recorded",
                self.stage_name
            )));
        }
        self.output_payload = Some(output);
        self.status = TaskStatus::Succeeded;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    pub fn record_error(&mut self, err: &PassportError) {
        self.error = Some(err.to_body());
        self.status = TaskStatus::Failed;
        self.finished_at = Some(Utc::now());
    }
}

/// The stage that halted a run and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageFailure {
    pub stage: String,
    pub error: ErrorBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub run_id: String,
    pub pipeline: String,
    pub stages: Vec<String>,
    pub current_stage_index: usize,
    /// In stage order; stage names are unique within a run.
    pub tasks: Vec<AgentTask>,
    pub context: Map<String, Value>,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<StageFailure>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl WorkflowRun {
    pub fn new(pipeline: impl Into<String>, stages: Vec<String>, context: Map<String, Value>) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            pipeline: pipeline.into(),
            tasks: stages.iter().map(AgentTask::new).collect(),
            stages,
            current_stage_index: 0,
            context,
            status: RunStatus::Running,
            failure: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn task(&self, stage: &str) -> Option<&AgentTask> {
        self.tasks.iter().find(|t| t.stage_name == stage)
    }

    pub fn task_mut(&mut self, stage: &str) -> Option<&mut AgentTask> {
        self.tasks.iter_mut().find(|t| t.stage_name == stage)
    }

    /// Recorded output of `stage`, if it ran to completion.
    pub fn output_of(&self, stage: &str) -> Option<&Value> {
        self.task(stage)?.output_payload.as_ref()
    }

    pub fn current_stage(&self) -> Option<&str> {
        self.stages.get(self.current_stage_index).map(String::as_str)
    }

    /// Move past the current stage. The index never decreases.
    pub fn advance(&mut self) {
        if self.current_stage_index < self.stages.len() {
            self.current_stage_index += 1;
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn succeed(&mut self) {
        self.status = RunStatus::Succeeded;
        self.finished_at = Some(Utc::now());
    }

    pub fn fail(&mut self, stage: impl Into<String>, err: &PassportError) {
        self.status = RunStatus::Failed;
        self.failure = Some(StageFailure {
            stage: stage.into(),
            error: err.to_body(),
        });
        self.finished_at = Some(Utc::now());
    }

    pub fn cancel(&mut self) {
        self.status = RunStatus::Cancelled;
        self.finished_at = Some(Utc::now());
    }

    /// The accumulated context of a succeeded run, or the error that ended it.
    pub fn into_result(self) -> Result<Map<String, Value>, PassportError> {
        match self.status {
            RunStatus::Succeeded => Ok(self.context),
            RunStatus::Failed => Err(match self.failure {
                Some(failure) => {
                    let cause = PassportError::from(failure.error);
                    match cause {
                        PassportError::PipelineHalt { .. } => cause,
                        other => PassportError::halt(failure.stage, other),
                    }
                }
                None => PassportError::Internal(format!("run {} failed without a cause", self.run_id)),
            }),
            RunStatus::Cancelled => Err(PassportError::Cancelled(format!(
                "run {} was cancelled before stage {}",
                self.run_id,
                self.current_stage().unwrap_or("-")
            ))),
            RunStatus::Running => Err(PassportError::Internal(format!(
                "run {} is still running",
                self.run_id
            ))),
        }
    }
}
