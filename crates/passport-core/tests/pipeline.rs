//! Orchestrator behaviour over in-process agents.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use passport_core::agent::{build_agent, AgentContext, AgentService, Skill, StageKind};
use passport_core::capability::tools::{
    ClinicalParseTool, LanguageDetector, OcrInput, OcrOutput, RenderReferralTool,
    RiskAssessmentTool, TranslateTool,
};
use passport_core::capability::{handler_fn, CapabilityServer, InferenceBackend, Tool, ToolClient};
use passport_core::orchestration::{
    DiscoveryRegistry, Endpoint, LaunchReport, LaunchRequest, LocalAgentTransport, Orchestrator,
    PipelineDefinition, RetryPolicy, RunStatus, StageDefinition, StaticFallback, StaticRegistry,
    TaskStatus, WorkflowRun,
};
use passport_core::schema::schema_of;
use passport_core::PassportError;

// ─── Stub stages ────────────────────────────────────────────────────────

type Behaviour = dyn Fn(&Map<String, Value>, usize) -> Result<Value, PassportError> + Send + Sync;

/// A stage that records what it receives and answers through `behaviour`
/// (given the payload and the 1-based call number).
struct StubSkill {
    name: String,
    guarantees: Vec<String>,
    delay: Duration,
    calls: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<Map<String, Value>>>>,
    behaviour: Arc<Behaviour>,
}

#[async_trait]
impl Skill for StubSkill {
    type Input = Map<String, Value>;
    type Output = Value;

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "stub stage"
    }

    fn output_schema(&self) -> Value {
        json!({"type": "object", "required": self.guarantees})
    }

    async fn run(&self, _ctx: &AgentContext, input: Map<String, Value>) -> Result<Value, PassportError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.seen.lock().unwrap().push(input.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.behaviour)(&input, call)
    }
}

struct Stub {
    calls: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<Map<String, Value>>>>,
    service: Arc<AgentService>,
}

impl Stub {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn seen(&self) -> Vec<Map<String, Value>> {
        self.seen.lock().unwrap().clone()
    }
}

fn no_tools() -> Arc<dyn ToolClient> {
    Arc::new(CapabilityServer::builder("none").build().unwrap())
}

/// `guarantees` lists the output fields the stage promises; only those may
/// be exported.
fn stub<F>(name: &str, guarantees: &[&str], delay: Duration, behaviour: F) -> Stub
where
    F: Fn(&Map<String, Value>, usize) -> Result<Value, PassportError> + Send + Sync + 'static,
{
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let skill = StubSkill {
        name: name.to_string(),
        guarantees: guarantees.iter().map(|f| f.to_string()).collect(),
        delay,
        calls: calls.clone(),
        seen: seen.clone(),
        behaviour: Arc::new(behaviour),
    };
    let service = AgentService::new(skill, format!("local://{}", name), no_tools(), None).unwrap();
    Stub {
        calls,
        seen,
        service: Arc::new(service),
    }
}

fn emit(value: Value) -> impl Fn(&Map<String, Value>, usize) -> Result<Value, PassportError> + Send + Sync {
    move |_: &Map<String, Value>, _: usize| Ok(value.clone())
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("not an object"),
    }
}

fn three_stage_definition() -> PipelineDefinition {
    PipelineDefinition {
        name: "abc".into(),
        description: None,
        version: "1.0".into(),
        context_fields: vec!["doc".into()],
        stages: vec![
            StageDefinition::new("a", &["x"]),
            StageDefinition::new("b", &[]),
            StageDefinition::new("c", &[]),
        ],
    }
}

async fn assemble(definition: PipelineDefinition, stubs: &[&Stub]) -> Orchestrator {
    let mut transport = LocalAgentTransport::new();
    let mut registry = StaticRegistry::default();
    for stub in stubs {
        let endpoint = stub.service.discover().endpoint.clone();
        registry.insert(stub.service.skill_name(), endpoint.as_str());
        transport = transport.with_agent(endpoint.as_str(), stub.service.clone());
    }
    Orchestrator::builder(definition, Arc::new(registry), Arc::new(transport))
        .assemble()
        .await
        .unwrap()
}

// ─── Ordering and merge ─────────────────────────────────────────────────

#[tokio::test]
async fn test_stages_run_in_order_with_merged_payloads() {
    let a = stub("a", &["x"], Duration::ZERO, emit(json!({"x": 1, "y": "from-a"})));
    let b = stub("b", &[], Duration::ZERO, emit(json!({"y": "from-b", "z": 2})));
    let c = stub("c", &[], Duration::ZERO, emit(json!({"done": true})));
    let orchestrator = assemble(three_stage_definition(), &[&a, &b, &c]).await;

    let run = orchestrator.run(object(json!({"doc": "d"}))).await.unwrap();

    assert_eq!(run.status, RunStatus::Succeeded);
    assert_eq!(run.current_stage_index, 3);
    assert_eq!(a.seen(), vec![object(json!({"doc": "d"}))]);
    // b sees the context plus a's full output.
    assert_eq!(b.seen(), vec![object(json!({"doc": "d", "x": 1, "y": "from-a"}))]);
    // c sees a's export and b's output, but not the rest of a's output.
    assert_eq!(c.seen(), vec![object(json!({"doc": "d", "x": 1, "y": "from-b", "z": 2}))]);

    assert_eq!(run.context, object(json!({"doc": "d", "x": 1})));
    let stages: Vec<&str> = run.tasks.iter().map(|t| t.stage_name.as_str()).collect();
    assert_eq!(stages, vec!["a", "b", "c"]);
    assert!(run.tasks.iter().all(|t| t.status == TaskStatus::Succeeded && t.attempts == 1));
    assert_eq!(run.output_of("b"), Some(&json!({"y": "from-b", "z": 2})));
}

#[tokio::test]
async fn test_output_wins_over_context_on_collision() {
    let a = stub("a", &["x"], Duration::ZERO, emit(json!({"x": 1, "doc": "rewritten"})));
    let b = stub("b", &[], Duration::ZERO, emit(json!({})));
    let c = stub("c", &[], Duration::ZERO, emit(json!({})));
    let orchestrator = assemble(three_stage_definition(), &[&a, &b, &c]).await;

    orchestrator.run(object(json!({"doc": "d"}))).await.unwrap();

    assert_eq!(b.seen()[0]["doc"], json!("rewritten"));
    // Not exported, so the context keeps the submitted value.
    assert_eq!(c.seen()[0]["doc"], json!("d"));
}

// ─── Halting ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_failure_halts_and_later_stages_never_run() {
    let a = stub("a", &["x"], Duration::ZERO, emit(json!({"x": 1})));
    let b = stub("b", &[], Duration::ZERO, |_, _| {
        Err(PassportError::Upstream {
            status: Some(503),
            detail: "backend down".into(),
        })
    });
    let c = stub("c", &[], Duration::ZERO, emit(json!({})));
    let orchestrator = assemble(three_stage_definition(), &[&a, &b, &c]).await;

    let run = orchestrator.run(object(json!({"doc": "d"}))).await.unwrap();

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(c.calls(), 0);
    assert_eq!(run.current_stage_index, 1);
    assert_eq!(run.failure.as_ref().map(|f| f.stage.as_str()), Some("b"));
    assert_eq!(run.output_of("a"), Some(&json!({"x": 1})));
    assert_eq!(run.task("b").unwrap().status, TaskStatus::Failed);
    assert_eq!(run.task("c").unwrap().status, TaskStatus::Pending);

    let err = run.into_result().unwrap_err();
    match &err {
        PassportError::PipelineHalt { stage, .. } => assert_eq!(stage, "b"),
        other => panic!("expected a pipeline halt, got {:?}", other),
    }
    assert_eq!(
        err.root_cause(),
        &PassportError::Upstream {
            status: Some(503),
            detail: "backend down".into()
        }
    );
}

#[tokio::test]
async fn test_output_violating_schema_halts_the_run() {
    let a = stub("a", &["x"], Duration::ZERO, emit(json!(["not", "an", "object"])));
    let b = stub("b", &[], Duration::ZERO, emit(json!({})));
    let c = stub("c", &[], Duration::ZERO, emit(json!({})));
    let orchestrator = assemble(three_stage_definition(), &[&a, &b, &c]).await;

    let run = orchestrator.run(object(json!({"doc": "d"}))).await.unwrap();

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(b.calls(), 0);
    assert!(run.output_of("a").is_none());
}

#[tokio::test]
async fn test_submission_missing_context_field_is_rejected() {
    let a = stub("a", &["x"], Duration::ZERO, emit(json!({"x": 1})));
    let b = stub("b", &[], Duration::ZERO, emit(json!({})));
    let c = stub("c", &[], Duration::ZERO, emit(json!({})));
    let orchestrator = assemble(three_stage_definition(), &[&a, &b, &c]).await;

    let err = orchestrator.run(object(json!({"doc": null}))).await.unwrap_err();
    assert!(matches!(err, PassportError::SchemaValidation(_)));
    assert_eq!(a.calls(), 0);
    assert!(orchestrator.list_runs().await.is_empty());
}

// ─── Concurrency ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_concurrent_runs_do_not_share_context() {
    let a = stub("a", &["x"], Duration::from_millis(20), |input, _| Ok(json!({"x": input["doc"].clone()})));
    let b = stub("b", &[], Duration::from_millis(5), emit(json!({})));
    let c = stub("c", &[], Duration::ZERO, |input, _| Ok(json!({"echo": input["x"].clone()})));
    let orchestrator = Arc::new(assemble(three_stage_definition(), &[&a, &b, &c]).await);

    let mut set = tokio::task::JoinSet::new();
    for i in 0..12 {
        let orchestrator = orchestrator.clone();
        set.spawn(async move {
            let run = orchestrator.run(object(json!({"doc": i}))).await.unwrap();
            (i, run)
        });
    }

    while let Some(joined) = set.join_next().await {
        let (i, run) = joined.unwrap();
        assert_eq!(run.status, RunStatus::Succeeded);
        assert_eq!(run.context["x"], json!(i));
        assert_eq!(run.output_of("c"), Some(&json!({"echo": i})));
    }
    assert!(orchestrator.list_runs().await.is_empty());
    assert_eq!(c.calls(), 12);
}

// ─── Run table ──────────────────────────────────────────────────────────

async fn wait_until_finished(orchestrator: &Orchestrator, run_id: &str) -> WorkflowRun {
    for _ in 0..100 {
        if let Some(run) = orchestrator.get_run(run_id).await {
            if run.is_terminal() {
                return run;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("run {} did not finish", run_id);
}

#[tokio::test]
async fn test_synchronous_runs_are_not_retained() {
    let a = stub("a", &["x"], Duration::ZERO, emit(json!({"x": 1})));
    let b = stub("b", &[], Duration::ZERO, emit(json!({})));
    let c = stub("c", &[], Duration::ZERO, emit(json!({})));
    let orchestrator = assemble(three_stage_definition(), &[&a, &b, &c]).await;

    for i in 0..50 {
        let run = orchestrator.run(object(json!({"doc": i}))).await.unwrap();
        assert_eq!(run.status, RunStatus::Succeeded);
        assert!(orchestrator.get_run(&run.run_id).await.is_none());
    }
    assert!(orchestrator.list_runs().await.is_empty());
}

#[tokio::test]
async fn test_background_runs_beyond_the_limit_evict_the_oldest_finished() {
    let a = stub("a", &["x"], Duration::ZERO, emit(json!({"x": 1})));
    let b = stub("b", &[], Duration::ZERO, emit(json!({})));
    let c = stub("c", &[], Duration::ZERO, emit(json!({})));
    let registry = StaticRegistry::new([("a", "local://a"), ("b", "local://b"), ("c", "local://c")]);
    let transport = LocalAgentTransport::new()
        .with_agent("local://a", a.service.clone())
        .with_agent("local://b", b.service.clone())
        .with_agent("local://c", c.service.clone());
    let orchestrator = Arc::new(
        Orchestrator::builder(three_stage_definition(), Arc::new(registry), Arc::new(transport))
            .max_retained_runs(2)
            .assemble()
            .await
            .unwrap(),
    );

    let mut ids = Vec::new();
    for i in 0..4 {
        let run_id = orchestrator.spawn(object(json!({"doc": i}))).await.unwrap();
        wait_until_finished(&orchestrator, &run_id).await;
        ids.push(run_id);
        // Distinct creation times keep the eviction order deterministic.
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let retained: Vec<String> = orchestrator.list_runs().await.into_iter().map(|r| r.run_id).collect();
    assert_eq!(retained, vec![ids[3].clone(), ids[2].clone()]);
    assert!(orchestrator.get_run(&ids[0]).await.is_none());
    assert!(orchestrator.get_run(&ids[1]).await.is_none());
}

#[tokio::test]
async fn test_runs_in_progress_are_never_evicted() {
    let a = stub("a", &["x"], Duration::from_millis(200), emit(json!({"x": 1})));
    let b = stub("b", &[], Duration::ZERO, emit(json!({})));
    let c = stub("c", &[], Duration::ZERO, emit(json!({})));
    let registry = StaticRegistry::new([("a", "local://a"), ("b", "local://b"), ("c", "local://c")]);
    let transport = LocalAgentTransport::new()
        .with_agent("local://a", a.service.clone())
        .with_agent("local://b", b.service.clone())
        .with_agent("local://c", c.service.clone());
    let orchestrator = Arc::new(
        Orchestrator::builder(three_stage_definition(), Arc::new(registry), Arc::new(transport))
            .max_retained_runs(1)
            .assemble()
            .await
            .unwrap(),
    );

    let first = orchestrator.spawn(object(json!({"doc": 1}))).await.unwrap();
    let second = orchestrator.spawn(object(json!({"doc": 2}))).await.unwrap();
    assert_eq!(orchestrator.list_runs().await.len(), 2);

    let finished = wait_until_finished(&orchestrator, &first).await;
    assert_eq!(finished.status, RunStatus::Succeeded);
    assert!(orchestrator.get_run(&second).await.is_some());
}

// ─── Retry and fallback ─────────────────────────────────────────────────

fn flaky(failures: usize) -> impl Fn(&Map<String, Value>, usize) -> Result<Value, PassportError> + Send + Sync {
    move |_: &Map<String, Value>, call: usize| {
        if call <= failures {
            Err(PassportError::Timeout("slow backend".into()))
        } else {
            Ok(json!({"x": call}))
        }
    }
}

#[tokio::test]
async fn test_default_policy_does_not_retry() {
    let a = stub("a", &["x"], Duration::ZERO, flaky(1));
    let b = stub("b", &[], Duration::ZERO, emit(json!({})));
    let c = stub("c", &[], Duration::ZERO, emit(json!({})));
    let orchestrator = assemble(three_stage_definition(), &[&a, &b, &c]).await;

    let run = orchestrator.run(object(json!({"doc": "d"}))).await.unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(a.calls(), 1);
}

#[tokio::test]
async fn test_retry_policy_recovers_transient_failures() {
    let a = stub("a", &["x"], Duration::ZERO, flaky(2));
    let b = stub("b", &[], Duration::ZERO, emit(json!({})));
    let c = stub("c", &[], Duration::ZERO, emit(json!({})));

    let mut transport = LocalAgentTransport::new();
    for s in [&a, &b, &c] {
        transport = transport.with_agent(s.service.discover().endpoint.as_str(), s.service.clone());
    }
    let registry = StaticRegistry::new([("a", "local://a"), ("b", "local://b"), ("c", "local://c")]);
    let orchestrator = Orchestrator::builder(three_stage_definition(), Arc::new(registry), Arc::new(transport))
        .retry(RetryPolicy::exponential(3, Duration::from_millis(1)))
        .assemble()
        .await
        .unwrap();

    let run = orchestrator.run(object(json!({"doc": "d"}))).await.unwrap();
    assert_eq!(run.status, RunStatus::Succeeded);
    assert_eq!(run.task("a").unwrap().attempts, 3);
    assert_eq!(run.context["x"], json!(3));
}

#[tokio::test]
async fn test_fallback_endpoint_takes_over() {
    let primary = stub("a", &["x"], Duration::ZERO, |_, _| Err(PassportError::upstream("primary down")));
    let backup = stub("a", &["x"], Duration::ZERO, emit(json!({"x": "backup"})));
    let b = stub("b", &[], Duration::ZERO, emit(json!({})));
    let c = stub("c", &[], Duration::ZERO, emit(json!({})));

    let transport = LocalAgentTransport::new()
        .with_agent("local://a-primary", primary.service.clone())
        .with_agent("local://a-backup", backup.service.clone())
        .with_agent("local://b", b.service.clone())
        .with_agent("local://c", c.service.clone());
    let registry = StaticRegistry::new([
        ("a", "local://a-primary"),
        ("b", "local://b"),
        ("c", "local://c"),
    ]);
    let fallback = StaticFallback::new().with("a", [Endpoint::new("local://a-backup")]);
    let orchestrator = Orchestrator::builder(three_stage_definition(), Arc::new(registry), Arc::new(transport))
        .fallback(Arc::new(fallback))
        .assemble()
        .await
        .unwrap();

    let run = orchestrator.run(object(json!({"doc": "d"}))).await.unwrap();
    assert_eq!(run.status, RunStatus::Succeeded);
    assert_eq!(primary.calls(), 1);
    assert_eq!(backup.calls(), 1);
    let task = run.task("a").unwrap();
    assert_eq!(task.endpoint.as_deref(), Some("local://a-backup"));
    assert_eq!(task.attempts, 2);
}

#[tokio::test]
async fn test_schema_errors_are_not_sent_to_fallback() {
    let primary = stub("a", &["x"], Duration::ZERO, |_, _| Err(PassportError::SchemaValidation("bad".into())));
    let backup = stub("a", &["x"], Duration::ZERO, emit(json!({"x": 1})));
    let b = stub("b", &[], Duration::ZERO, emit(json!({})));
    let c = stub("c", &[], Duration::ZERO, emit(json!({})));

    let transport = LocalAgentTransport::new()
        .with_agent("local://a-primary", primary.service.clone())
        .with_agent("local://a-backup", backup.service.clone())
        .with_agent("local://b", b.service.clone())
        .with_agent("local://c", c.service.clone());
    let registry = StaticRegistry::new([
        ("a", "local://a-primary"),
        ("b", "local://b"),
        ("c", "local://c"),
    ]);
    let orchestrator = Orchestrator::builder(three_stage_definition(), Arc::new(registry), Arc::new(transport))
        .retry(RetryPolicy::exponential(3, Duration::from_millis(1)))
        .fallback(Arc::new(StaticFallback::new().with("a", [Endpoint::new("local://a-backup")])))
        .assemble()
        .await
        .unwrap();

    let run = orchestrator.run(object(json!({"doc": "d"}))).await.unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(primary.calls(), 1);
    assert_eq!(backup.calls(), 0);
}

// ─── Cancellation ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_cancel_takes_effect_between_stages() {
    let a = stub("a", &["x"], Duration::from_millis(150), emit(json!({"x": 1})));
    let b = stub("b", &[], Duration::ZERO, emit(json!({})));
    let c = stub("c", &[], Duration::ZERO, emit(json!({})));
    let orchestrator = Arc::new(assemble(three_stage_definition(), &[&a, &b, &c]).await);

    let run_id = orchestrator.spawn(object(json!({"doc": "d"}))).await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    let snapshot = orchestrator.cancel(&run_id).await.unwrap();
    assert_eq!(snapshot.status, RunStatus::Running);

    let mut run = None;
    for _ in 0..100 {
        let current = orchestrator.get_run(&run_id).await.unwrap();
        if current.is_terminal() {
            run = Some(current);
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let run = run.expect("run did not finish");

    assert_eq!(run.status, RunStatus::Cancelled);
    // The in-flight stage completed; the next one never started.
    assert_eq!(run.task("a").unwrap().status, TaskStatus::Succeeded);
    assert_eq!(b.calls(), 0);
    assert!(matches!(run.into_result(), Err(PassportError::Cancelled(_))));
}

#[tokio::test]
async fn test_cancel_unknown_run_is_not_found() {
    let a = stub("a", &["x"], Duration::ZERO, emit(json!({"x": 1})));
    let b = stub("b", &[], Duration::ZERO, emit(json!({})));
    let c = stub("c", &[], Duration::ZERO, emit(json!({})));
    let orchestrator = assemble(three_stage_definition(), &[&a, &b, &c]).await;

    assert!(matches!(
        orchestrator.cancel("missing").await,
        Err(PassportError::NotFound(_))
    ));
}

// ─── Discovery ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_discovered_descriptors_match_what_agents_publish() {
    let a = stub("a", &["x"], Duration::ZERO, emit(json!({"x": 1})));
    let b = stub("b", &[], Duration::ZERO, emit(json!({})));
    let c = stub("c", &[], Duration::ZERO, emit(json!({})));
    let transport = LocalAgentTransport::new()
        .with_agent("local://a", a.service.clone())
        .with_agent("local://b", b.service.clone())
        .with_agent("local://c", c.service.clone());

    let candidates = ["local://c", "local://a", "local://b", "local://nobody"].map(Endpoint::new);
    let registry = DiscoveryRegistry::discover(&transport, candidates).await;
    let names: Vec<&str> = registry.descriptors().iter().map(|d| d.skill_name.as_str()).collect();
    assert_eq!(names, vec!["a", "b", "c"]);

    let orchestrator = Orchestrator::builder(three_stage_definition(), Arc::new(registry), Arc::new(transport))
        .assemble()
        .await
        .unwrap();
    let discovered: Vec<_> = orchestrator.descriptors().into_iter().cloned().collect();
    assert_eq!(
        discovered,
        vec![a.service.discover().clone(), b.service.discover().clone(), c.service.discover().clone()]
    );
}

#[tokio::test]
async fn test_assembly_rejects_agent_serving_another_skill() {
    let a = stub("a", &["x"], Duration::ZERO, emit(json!({"x": 1})));
    let b = stub("b", &[], Duration::ZERO, emit(json!({})));
    let transport = LocalAgentTransport::new()
        .with_agent("local://a", a.service.clone())
        .with_agent("local://b", b.service.clone());
    let registry = StaticRegistry::new([("a", "local://a"), ("b", "local://b"), ("c", "local://b")]);

    let err = Orchestrator::builder(three_stage_definition(), Arc::new(registry), Arc::new(transport))
        .assemble()
        .await
        .err()
        .expect("assembly should fail");
    assert_eq!(err.stage_name(), Some("c"));
    assert!(matches!(err.root_cause(), PassportError::SchemaValidation(_)));
}

#[tokio::test]
async fn test_assembly_rejects_export_the_stage_does_not_guarantee() {
    let a = stub("a", &[], Duration::ZERO, emit(json!({"x": 1})));
    let b = stub("b", &[], Duration::ZERO, emit(json!({})));
    let c = stub("c", &[], Duration::ZERO, emit(json!({})));
    let transport = LocalAgentTransport::new()
        .with_agent("local://a", a.service.clone())
        .with_agent("local://b", b.service.clone())
        .with_agent("local://c", c.service.clone());
    let registry = StaticRegistry::new([("a", "local://a"), ("b", "local://b"), ("c", "local://c")]);

    let err = Orchestrator::builder(three_stage_definition(), Arc::new(registry), Arc::new(transport))
        .assemble()
        .await
        .err()
        .expect("assembly should fail");
    match err {
        PassportError::SchemaValidation(message) => assert!(message.contains("exports x"), "{}", message),
        other => panic!("expected a schema error, got {:?}", other),
    }
    assert_eq!(a.calls(), 0);
}

#[tokio::test]
async fn test_declared_guarantees_are_published_in_the_descriptor() {
    let a = stub("a", &["x"], Duration::ZERO, emit(json!({"x": 1})));
    assert_eq!(a.service.discover().output_schema["required"], json!(["x"]));
}

// ─── Medical passport pipeline ──────────────────────────────────────────

const ARABIC_NOTE: &str = "المريض يعاني من ارتفاع ضغط الدم ويتناول ليزينوبريل";
const SUMMARY: &str = "Patient with hypertension on lisinopril.";

/// Answers each tool prompt the way a well-behaved model would. Translation
/// tags the text with its target language.
struct ScriptedBackend;

#[async_trait]
impl InferenceBackend for ScriptedBackend {
    async fn complete(&self, system: &str, user: &str) -> Result<String, PassportError> {
        if system.contains("translator") {
            let target = user
                .lines()
                .next()
                .and_then(|line| line.strip_prefix("Target language: "))
                .unwrap_or("?");
            let text = user.split_once("---\n").map(|(_, t)| t).unwrap_or(user);
            Ok(format!("[{}] {}", target, text))
        } else if system.contains("clinical coder") {
            Ok("```json\n{\"resourceType\": \"Bundle\", \"type\": \"collection\", \"entry\": [\
                {\"resource\": {\"resourceType\": \"Condition\", \"code\": {\"text\": \"Hypertension\"}}},\
                {\"resource\": {\"resourceType\": \"MedicationStatement\", \"medicationCodeableConcept\": {\"text\": \"Lisinopril\"}}}\
                ]}\n```"
                .to_string())
        } else if system.contains("summarizer") {
            Ok(format!("{}\n- Stroke\n- Renal decline", SUMMARY))
        } else {
            Err(PassportError::upstream("unexpected prompt"))
        }
    }
}

fn fake_ocr(text: &'static str) -> Tool {
    Tool::new(
        "ocr_image",
        handler_fn(move |input: Value| async move {
            let input: OcrInput = serde_json::from_value(input)
                .map_err(|e| PassportError::SchemaValidation(e.to_string()))?;
            Ok::<Value, PassportError>(json!({
                "text": text,
                "metadata": {"source": input.file_path, "used_lang": input.locale_hint}
            }))
        }),
        schema_of::<OcrInput>(),
        schema_of::<OcrOutput>(),
    )
}

fn passport_tools(backend: Arc<dyn InferenceBackend>, output_dir: &std::path::Path) -> Arc<dyn ToolClient> {
    let server = CapabilityServer::builder("test-capabilities")
        .register_tool(fake_ocr(ARABIC_NOTE))
        .register_typed(LanguageDetector)
        .register_typed(TranslateTool::new(backend.clone()))
        .register_typed(ClinicalParseTool::new(backend.clone()))
        .register_typed(RiskAssessmentTool::new(backend))
        .register_typed(RenderReferralTool::new(output_dir))
        .build()
        .unwrap();
    Arc::new(server)
}

async fn passport_orchestrator(definition: PipelineDefinition, tools: Arc<dyn ToolClient>) -> Result<Orchestrator, PassportError> {
    let mut transport = LocalAgentTransport::new();
    let mut registry = StaticRegistry::default();
    for kind in StageKind::ALL {
        let endpoint = format!("local://{}", kind);
        let agent = build_agent(kind, endpoint.clone(), tools.clone(), None)?;
        agent.check_tools().await?;
        transport = transport.with_agent(endpoint.as_str(), Arc::new(agent));
        registry.insert(kind.as_str(), endpoint);
    }
    Orchestrator::builder(definition, Arc::new(registry), Arc::new(transport))
        .assemble()
        .await
}

#[tokio::test]
async fn test_arabic_note_becomes_bilingual_referral() {
    let dir = tempfile::tempdir().unwrap();
    let tools = passport_tools(Arc::new(ScriptedBackend), dir.path());
    let orchestrator = passport_orchestrator(PipelineDefinition::medical_passport(), tools)
        .await
        .unwrap();

    let request = LaunchRequest::new("/scans/note.png", "ara").with_target("en");
    let run = orchestrator.run(request.into_context()).await.unwrap();
    assert_eq!(run.status, RunStatus::Succeeded, "{:?}", run.failure);

    let intake = run.output_of("intake").unwrap();
    assert_eq!(intake["patient_lang"], json!("ar"));
    assert_eq!(intake["metadata"]["used_lang"], json!("ara"));

    let translate = run.output_of("translate").unwrap();
    assert_eq!(translate["source_locale"], json!("ara"));
    assert_eq!(translate["translated_text"], json!(format!("[en] {}", ARABIC_NOTE)));

    let report = LaunchReport::from_run(&run).unwrap();
    assert_eq!(report.patient_lang, "ar");
    assert_eq!(report.source_locale, "ara");
    assert_eq!(report.summary_clinic, SUMMARY);
    assert_eq!(report.risks_clinic, vec!["Stroke", "Renal decline"]);
    assert!(report.document_path.ends_with(".html"));

    let text = std::fs::read_to_string(&report.text_path).unwrap();
    assert!(text.contains(SUMMARY));
    assert!(text.contains(&format!("[ar] {}", SUMMARY)));
    assert!(text.contains("- [ar] Stroke"));
    assert!(text.contains("- Hypertension\n- Lisinopril"));

    let html = std::fs::read_to_string(&report.document_path).unwrap();
    assert!(html.contains("<section lang=\"ar\""));
    assert!(html.contains("<section lang=\"en\""));
}

#[tokio::test]
async fn test_missing_backend_halts_before_any_artifact() {
    struct Unconfigured;

    #[async_trait]
    impl InferenceBackend for Unconfigured {
        async fn complete(&self, _: &str, _: &str) -> Result<String, PassportError> {
            Err(PassportError::upstream("OPENAI_API_KEY is not set"))
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let tools = passport_tools(Arc::new(Unconfigured), dir.path());
    let orchestrator = passport_orchestrator(PipelineDefinition::medical_passport(), tools)
        .await
        .unwrap();

    let run = orchestrator
        .run(LaunchRequest::new("/scans/note.png", "ara").into_context())
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.failure.as_ref().unwrap().stage, "translate");
    assert!(run.output_of("intake").is_some());
    assert!(LaunchReport::from_run(&run).is_err());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_pipeline_without_required_export_fails_assembly() {
    let dir = tempfile::tempdir().unwrap();
    let tools = passport_tools(Arc::new(ScriptedBackend), dir.path());
    let mut definition = PipelineDefinition::medical_passport();
    // summarize needs translated_text from two stages back.
    definition.stages[1].exports = vec!["source_locale".into()];

    let err = passport_orchestrator(definition, tools).await.err().expect("should not assemble");
    assert!(matches!(err, PassportError::SchemaValidation(_)));
    assert!(err.to_string().contains("summarize"));
}
