//! Orchestrator: drives a run through the pipeline's stages in order.
//!
//! Assembly (once):
//! 1. Resolve every stage's endpoint through the [`Registry`]
//! 2. Discover its descriptor and check skill name and document version
//! 3. Check statically that each stage's required input is covered by the
//!    submission fields, earlier exports and the previous stage's output
//!
//! Per run:
//! 1. Compose the stage payload (run context merged with the previous
//!    output, the output winning) and validate it against the stage's input
//! 2. Invoke, applying the retry policy and fallback resolver
//! 3. Validate the output, record it, copy the stage's exports into the
//!    run context, advance
//!
//! The first fatal error halts the run; outputs recorded so far are kept.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::RwLock;

use super::pipeline::{PipelineDefinition, StageDefinition};
use super::policy::{FallbackResolver, NoFallback, RetryPolicy};
use super::registry::{Endpoint, Registry};
use super::run::WorkflowRun;
use super::transport::AgentTransport;
use crate::envelope::{CapabilityDescriptor, InvocationRequest};
use crate::error::PassportError;
use crate::schema::{required_fields, SchemaValidator};

pub const DEFAULT_STAGE_TIMEOUT: Duration = Duration::from_secs(240);

/// Finished background runs kept for polling before the oldest are evicted.
pub const DEFAULT_MAX_RETAINED_RUNS: usize = 100;

struct AssembledStage {
    definition: StageDefinition,
    descriptor: CapabilityDescriptor,
    input: SchemaValidator,
    output: SchemaValidator,
    timeout: Duration,
}

struct RunEntry {
    snapshot: WorkflowRun,
    cancel: Arc<AtomicBool>,
}

type RunStore = Arc<RwLock<HashMap<String, RunEntry>>>;

pub struct Orchestrator {
    definition: PipelineDefinition,
    stages: Vec<AssembledStage>,
    registry: Arc<dyn Registry>,
    transport: Arc<dyn AgentTransport>,
    retry: RetryPolicy,
    fallback: Arc<dyn FallbackResolver>,
    runs: RunStore,
    max_retained_runs: usize,
}

pub struct OrchestratorBuilder {
    definition: PipelineDefinition,
    registry: Arc<dyn Registry>,
    transport: Arc<dyn AgentTransport>,
    retry: RetryPolicy,
    fallback: Arc<dyn FallbackResolver>,
    stage_timeout: Duration,
    max_retained_runs: usize,
}

impl OrchestratorBuilder {
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn fallback(mut self, resolver: Arc<dyn FallbackResolver>) -> Self {
        self.fallback = resolver;
        self
    }

    /// Timeout for stages that do not set `timeout_secs`.
    pub fn stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = timeout;
        self
    }

    /// How many finished background runs stay available to `get_run` and
    /// `list_runs`. Runs still in progress are never evicted.
    pub fn max_retained_runs(mut self, max: usize) -> Self {
        self.max_retained_runs = max;
        self
    }

    /// Discover every stage and check the pipeline is sound.
    pub async fn assemble(self) -> Result<Orchestrator, PassportError> {
        self.definition.validate()?;

        let mut stages = Vec::with_capacity(self.definition.stages.len());
        for stage in &self.definition.stages {
            let skill = stage.skill.as_str();
            let endpoint = self
                .registry
                .resolve(skill)
                .await
                .map_err(|e| PassportError::stage(skill, e))?;
            let descriptor = self
                .transport
                .discover(&endpoint)
                .await
                .map_err(|e| PassportError::stage(skill, e))?;
            descriptor
                .validate()
                .map_err(|e| PassportError::stage(skill, e))?;
            if descriptor.skill_name != skill {
                return Err(PassportError::stage(
                    skill,
                    PassportError::SchemaValidation(format!(
                        "agent at {} serves '{}'",
                        endpoint, descriptor.skill_name
                    )),
                ));
            }

            let input = SchemaValidator::compile(&descriptor.input_schema)
                .map_err(|e| PassportError::stage(skill, e))?;
            let output = SchemaValidator::compile(&descriptor.output_schema)
                .map_err(|e| PassportError::stage(skill, e))?;
            tracing::info!(
                "[Orchestrator] Stage '{}' → {} (v{})",
                skill,
                endpoint,
                descriptor.version
            );

            stages.push(AssembledStage {
                definition: stage.clone(),
                timeout: stage
                    .timeout_secs
                    .map(Duration::from_secs)
                    .unwrap_or(self.stage_timeout),
                descriptor,
                input,
                output,
            });
        }

        let descriptors: Vec<CapabilityDescriptor> =
            stages.iter().map(|s| s.descriptor.clone()).collect();
        check_sufficiency(&self.definition, &descriptors)?;

        tracing::info!(
            "[Orchestrator] Pipeline '{}' assembled with {} stages",
            self.definition.name,
            stages.len()
        );

        Ok(Orchestrator {
            definition: self.definition,
            stages,
            registry: self.registry,
            transport: self.transport,
            retry: self.retry,
            fallback: self.fallback,
            runs: Arc::new(RwLock::new(HashMap::new())),
            max_retained_runs: self.max_retained_runs,
        })
    }
}

/// Each stage's required input must be covered by the submission fields,
/// the exports of earlier stages and the previous stage's guaranteed
/// output; every export must be a guaranteed output. `descriptors` is in
/// stage order.
pub fn check_sufficiency(
    definition: &PipelineDefinition,
    descriptors: &[CapabilityDescriptor],
) -> Result<(), PassportError> {
    if descriptors.len() != definition.stages.len() {
        return Err(PassportError::Internal(format!(
            "{} descriptors for {} stages",
            descriptors.len(),
            definition.stages.len()
        )));
    }

    let mut context: BTreeSet<String> = definition.context_fields.iter().cloned().collect();
    let mut previous: BTreeSet<String> = BTreeSet::new();

    for (stage, descriptor) in definition.stages.iter().zip(descriptors) {
        let missing: Vec<String> = required_fields(&descriptor.input_schema)
            .into_iter()
            .filter(|field| !context.contains(field) && !previous.contains(field))
            .collect();
        if !missing.is_empty() {
            return Err(PassportError::SchemaValidation(format!(
                "stage '{}' requires {} but no submission field or earlier stage provides it",
                stage.skill,
                missing.join(", ")
            )));
        }

        let guaranteed = required_fields(&descriptor.output_schema);
        let unguaranteed: Vec<&str> = stage
            .exports
            .iter()
            .filter(|field| !guaranteed.contains(*field))
            .map(String::as_str)
            .collect();
        if !unguaranteed.is_empty() {
            return Err(PassportError::SchemaValidation(format!(
                "stage '{}' exports {} which its output does not guarantee",
                stage.skill,
                unguaranteed.join(", ")
            )));
        }

        context.extend(stage.exports.iter().cloned());
        previous = guaranteed;
    }
    Ok(())
}

/// Stage payload: run context overlaid with the previous stage's output.
fn compose(context: &Map<String, Value>, previous: Option<&Map<String, Value>>) -> Value {
    let mut payload = context.clone();
    if let Some(previous) = previous {
        for (key, value) in previous {
            payload.insert(key.clone(), value.clone());
        }
    }
    Value::Object(payload)
}

impl Orchestrator {
    pub fn builder(
        definition: PipelineDefinition,
        registry: Arc<dyn Registry>,
        transport: Arc<dyn AgentTransport>,
    ) -> OrchestratorBuilder {
        OrchestratorBuilder {
            definition,
            registry,
            transport,
            retry: RetryPolicy::none(),
            fallback: Arc::new(NoFallback),
            stage_timeout: DEFAULT_STAGE_TIMEOUT,
            max_retained_runs: DEFAULT_MAX_RETAINED_RUNS,
        }
    }

    pub fn definition(&self) -> &PipelineDefinition {
        &self.definition
    }

    /// Stage descriptors read at assembly, in stage order.
    pub fn descriptors(&self) -> Vec<&CapabilityDescriptor> {
        self.stages.iter().map(|s| &s.descriptor).collect()
    }

    // ─── Runs ───────────────────────────────────────────────────────────

    /// Execute a run to completion. Errors only when the submission itself
    /// is invalid; stage failures are reported in the returned run.
    ///
    /// The run is listed and cancellable while it executes and is dropped
    /// from the run table once it finishes; the caller holds the result.
    pub async fn run(&self, context: Map<String, Value>) -> Result<WorkflowRun, PassportError> {
        let (run, cancel) = self.submit(context).await?;
        let run = self.execute(run, cancel).await;
        self.runs.write().await.remove(&run.run_id);
        Ok(run)
    }

    /// Start a run in the background and return its id.
    pub async fn spawn(self: &Arc<Self>, context: Map<String, Value>) -> Result<String, PassportError> {
        let (run, cancel) = self.submit(context).await?;
        let run_id = run.run_id.clone();
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.execute(run, cancel).await;
        });
        Ok(run_id)
    }

    pub async fn get_run(&self, run_id: &str) -> Option<WorkflowRun> {
        let runs = self.runs.read().await;
        runs.get(run_id).map(|entry| entry.snapshot.clone())
    }

    /// All runs, newest first.
    pub async fn list_runs(&self) -> Vec<WorkflowRun> {
        let runs = self.runs.read().await;
        let mut all: Vec<WorkflowRun> = runs.values().map(|e| e.snapshot.clone()).collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all
    }

    /// Request cancellation. Takes effect before the next stage starts; a
    /// stage already in flight completes. Terminal runs are left as they are.
    pub async fn cancel(&self, run_id: &str) -> Result<WorkflowRun, PassportError> {
        let runs = self.runs.read().await;
        let entry = runs
            .get(run_id)
            .ok_or_else(|| PassportError::NotFound(format!("run '{}'", run_id)))?;
        if !entry.snapshot.is_terminal() {
            tracing::info!("[Orchestrator] Cancellation requested for run {}", run_id);
            entry.cancel.store(true, Ordering::SeqCst);
        }
        Ok(entry.snapshot.clone())
    }

    async fn submit(
        &self,
        context: Map<String, Value>,
    ) -> Result<(WorkflowRun, Arc<AtomicBool>), PassportError> {
        let missing: Vec<&str> = self
            .definition
            .context_fields
            .iter()
            .filter(|field| context.get(*field).map_or(true, Value::is_null))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(PassportError::SchemaValidation(format!(
                "submission is missing {}",
                missing.join(", ")
            )));
        }

        let run = WorkflowRun::new(
            self.definition.name.clone(),
            self.definition.stage_names(),
            context,
        );
        let cancel = Arc::new(AtomicBool::new(false));
        {
            let mut runs = self.runs.write().await;
            runs.insert(
                run.run_id.clone(),
                RunEntry {
                    snapshot: run.clone(),
                    cancel: cancel.clone(),
                },
            );
            evict_finished(&mut runs, self.max_retained_runs);
        }
        tracing::info!(
            "[Orchestrator] Run {} submitted ({} stages)",
            run.run_id,
            run.stages.len()
        );
        Ok((run, cancel))
    }

    async fn publish(&self, run: &WorkflowRun) {
        if let Some(entry) = self.runs.write().await.get_mut(&run.run_id) {
            entry.snapshot = run.clone();
        }
    }

    async fn execute(&self, mut run: WorkflowRun, cancel: Arc<AtomicBool>) -> WorkflowRun {
        let mut previous: Option<Map<String, Value>> = None;

        for (index, stage) in self.stages.iter().enumerate() {
            let skill = stage.definition.skill.as_str();

            if cancel.load(Ordering::SeqCst) {
                tracing::info!("[Orchestrator] Run {} cancelled before '{}'", run.run_id, skill);
                run.cancel();
                self.publish(&run).await;
                return run;
            }

            tracing::info!(
                "[Orchestrator] Run {} stage {}/{}: {}",
                run.run_id,
                index + 1,
                self.stages.len(),
                skill
            );

            let payload = compose(&run.context, previous.as_ref());
            let task_id = match run.task_mut(skill) {
                Some(task) => {
                    task.start(payload.clone());
                    task.task_id.clone()
                }
                None => String::new(),
            };
            self.publish(&run).await;

            let outcome = match stage
                .input
                .validate(&payload, "composed input")
                .map_err(|e| PassportError::stage(skill, e))
            {
                Ok(()) => self.invoke_stage(&run.run_id, &task_id, stage, &payload).await,
                Err(err) => StageOutcome::failed(err, 0, None),
            };
            let StageOutcome {
                result,
                attempts,
                endpoint,
            } = outcome;

            let recorded = result.and_then(|output| {
                stage
                    .output
                    .validate(&output, "output")
                    .map_err(|e| PassportError::stage(skill, e))?;
                match output {
                    Value::Object(map) => Ok(map),
                    _ => Err(PassportError::stage(
                        skill,
                        PassportError::SchemaValidation("output is not an object".into()),
                    )),
                }
            });

            if let Some(task) = run.task_mut(skill) {
                task.attempts = attempts;
                task.endpoint = endpoint.map(String::from);
            }

            let output = match recorded {
                Ok(output) => output,
                Err(err) => {
                    tracing::error!("[Orchestrator] Run {} halted at '{}': {}", run.run_id, skill, err);
                    if let Some(task) = run.task_mut(skill) {
                        task.record_error(&err);
                    }
                    run.fail(skill, &err);
                    self.publish(&run).await;
                    return run;
                }
            };

            let record = match run.task_mut(skill) {
                Some(task) => task.record_output(Value::Object(output.clone())),
                None => Err(PassportError::Internal(format!("run has no task for '{}'", skill))),
            };
            if let Err(err) = record {
                run.fail(skill, &err);
                self.publish(&run).await;
                return run;
            }

            for field in &stage.definition.exports {
                if let Some(value) = output.get(field) {
                    run.context.insert(field.clone(), value.clone());
                }
            }
            previous = Some(output);
            run.advance();
            self.publish(&run).await;
        }

        run.succeed();
        tracing::info!("[Orchestrator] Run {} succeeded", run.run_id);
        self.publish(&run).await;
        run
    }

    /// Invoke one stage, retrying transient failures per endpoint and
    /// moving to fallback endpoints once retries are exhausted.
    async fn invoke_stage(
        &self,
        run_id: &str,
        task_id: &str,
        stage: &AssembledStage,
        payload: &Value,
    ) -> StageOutcome {
        let skill = stage.definition.skill.as_str();
        let mut endpoint = match self.registry.resolve(skill).await {
            Ok(endpoint) => endpoint,
            Err(err) => return StageOutcome::failed(PassportError::stage(skill, err), 0, None),
        };

        let mut tried: HashSet<Endpoint> = HashSet::new();
        let mut attempts = 0u32;
        loop {
            tried.insert(endpoint.clone());
            let mut attempt = 0u32;
            let err = loop {
                attempt += 1;
                attempts += 1;
                let request = InvocationRequest::new(skill, payload.clone()).with_task(run_id, task_id);
                match self.transport.invoke(&endpoint, request, stage.timeout).await {
                    Ok(output) => {
                        return StageOutcome {
                            result: Ok(output),
                            attempts,
                            endpoint: Some(endpoint),
                        }
                    }
                    Err(err) => {
                        let err = PassportError::stage(skill, err);
                        if !self.retry.should_retry(attempt, &err) {
                            break err;
                        }
                        let delay = self.retry.backoff(attempt);
                        tracing::warn!(
                            "[Orchestrator] '{}' attempt {} at {} failed ({}); retrying in {}ms",
                            skill,
                            attempt,
                            endpoint,
                            err,
                            delay.as_millis()
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            };

            if !err.is_retryable() {
                return StageOutcome::failed(err, attempts, Some(endpoint));
            }
            match self.fallback.fallback(skill, &endpoint).await {
                Some(next) if !tried.contains(&next) => {
                    tracing::warn!("[Orchestrator] '{}' falling back from {} to {}", skill, endpoint, next);
                    endpoint = next;
                }
                _ => return StageOutcome::failed(err, attempts, Some(endpoint)),
            }
        }
    }
}

/// Drop the oldest finished runs until at most `max` remain. Runs still in
/// progress stay even when that leaves the table over the limit.
fn evict_finished(runs: &mut HashMap<String, RunEntry>, max: usize) {
    let excess = runs.len().saturating_sub(max);
    if excess == 0 {
        return;
    }
    let mut finished: Vec<(chrono::DateTime<chrono::Utc>, String)> = runs
        .iter()
        .filter(|(_, entry)| entry.snapshot.is_terminal())
        .map(|(id, entry)| (entry.snapshot.created_at, id.clone()))
        .collect();
    finished.sort();
    for (_, run_id) in finished.into_iter().take(excess) {
        tracing::debug!("[Orchestrator] Evicting finished run {}", run_id);
        runs.remove(&run_id);
    }
}

struct StageOutcome {
    result: Result<Value, PassportError>,
    attempts: u32,
    endpoint: Option<Endpoint>,
}

impl StageOutcome {
    fn failed(err: PassportError, attempts: u32, endpoint: Option<Endpoint>) -> Self {
        Self {
            result: Err(err),
            attempts,
            endpoint,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn descriptor(skill: &str, input: Value, output: Value) -> CapabilityDescriptor {
        CapabilityDescriptor {
            document_version: "1.0".into(),
            skill_name: skill.into(),
            version: "1.0.0".into(),
            description: String::new(),
            endpoint: format!("local://{}", skill),
            input_schema: input,
            output_schema: output,
            tags: vec![],
        }
    }

    fn object(required: &[&str]) -> Value {
        json!({"type": "object", "required": required})
    }

    fn definition(stages: Vec<StageDefinition>) -> PipelineDefinition {
        PipelineDefinition {
            name: "t".into(),
            description: None,
            version: "1.0".into(),
            context_fields: vec!["doc".into()],
            stages,
        }
    }

    #[test]
    fn test_compose_prefers_previous_output() {
        let context = json!({"a": 1, "b": 1}).as_object().cloned().unwrap();
        let previous = json!({"b": 2, "c": 2}).as_object().cloned().unwrap();
        assert_eq!(compose(&context, Some(&previous)), json!({"a": 1, "b": 2, "c": 2}));
        assert_eq!(compose(&context, None), json!({"a": 1, "b": 1}));
    }

    #[test]
    fn test_sufficiency_accepts_exported_fields() {
        let def = definition(vec![
            StageDefinition::new("one", &["x"]),
            StageDefinition::new("two", &[]),
            StageDefinition::new("three", &[]),
        ]);
        let descriptors = vec![
            descriptor("one", object(&["doc"]), object(&["x", "y"])),
            descriptor("two", object(&["y"]), object(&["z"])),
            descriptor("three", object(&["doc", "x", "z"]), object(&[])),
        ];
        check_sufficiency(&def, &descriptors).unwrap();
    }

    #[test]
    fn test_sufficiency_rejects_fields_lost_after_one_hop() {
        let def = definition(vec![
            StageDefinition::new("one", &[]),
            StageDefinition::new("two", &[]),
            StageDefinition::new("three", &[]),
        ]);
        let descriptors = vec![
            descriptor("one", object(&["doc"]), object(&["x"])),
            descriptor("two", object(&["x"]), object(&["z"])),
            descriptor("three", object(&["x"]), object(&[])),
        ];
        let err = check_sufficiency(&def, &descriptors).unwrap_err();
        assert!(err.to_string().contains("'three' requires x"), "{}", err);
    }

    #[test]
    fn test_sufficiency_rejects_unguaranteed_export() {
        let def = definition(vec![StageDefinition::new("one", &["maybe"])]);
        let descriptors = vec![descriptor("one", object(&["doc"]), object(&["x"]))];
        assert!(matches!(
            check_sufficiency(&def, &descriptors),
            Err(PassportError::SchemaValidation(_))
        ));
    }
}
