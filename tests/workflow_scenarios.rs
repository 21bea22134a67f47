// Scenario tests for the permission workflow.
//
// Each test builds its own store, approval channel and executor fixtures.

use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::json;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use toolgate::permissions::{
    ApprovalChannel, ApprovalPrompt, ApprovalResponse, DecisionScope, DecisionSource, DenialKind,
    MemoryRuleBackend, PendingApprovals, PermissionDecision, PermissionRequest, PermissionStore,
    PermissionWorkflow, Resolution, RuleSignature, Verdict, WorkflowState,
};
use toolgate::tools::{ToolExecutor, ToolInvocation, ToolResult};
use toolgate::{GateConfig, GateError};

/// How the scripted channel answers
#[derive(Clone, Copy)]
enum Script {
    Answer(Verdict, DecisionScope),
    Silent,
}

/// Approval channel that answers from a script and counts prompts
struct ScriptedChannel {
    script: Script,
    calls: AtomicUsize,
}

impl ScriptedChannel {
    fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ApprovalChannel for ScriptedChannel {
    async fn request_approval(&self, prompt: &ApprovalPrompt) -> anyhow::Result<ApprovalResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script {
            Script::Answer(verdict, scope) => Ok(ApprovalResponse {
                request_id: prompt.request_id,
                verdict,
                scope: Some(scope),
                responder: "reviewer".to_string(),
            }),
            Script::Silent => std::future::pending().await,
        }
    }
}

/// Executor that records how often it ran
#[derive(Default)]
struct CountingExecutor {
    runs: AtomicUsize,
    fail: bool,
}

impl CountingExecutor {
    fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolExecutor for CountingExecutor {
    async fn execute(&self, invocation: ToolInvocation) -> anyhow::Result<ToolResult> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(anyhow!("executor exploded"));
        }
        Ok(ToolResult::success(format!("ran {}", invocation.default_action())))
    }
}

fn bash(command: &str) -> ToolInvocation {
    ToolInvocation::new("Bash", json!({ "command": command }))
}

#[tokio::test]
async fn test_last_write_wins() {
    let store = PermissionStore::new();
    let sig = RuleSignature::exact("Bash", "make deploy");

    store
        .record(sig.clone(), PermissionDecision::approved("alice", DecisionScope::Session))
        .unwrap();
    store
        .record(sig.clone(), PermissionDecision::denied("bob", DecisionScope::Session))
        .unwrap();

    assert_eq!(store.lookup(&sig).unwrap().verdict, Verdict::Denied);
}

#[tokio::test]
async fn test_cached_approval_never_prompts() {
    let store = Arc::new(PermissionStore::new());
    store
        .record(
            RuleSignature::exact("Bash", "ls"),
            PermissionDecision::approved("alice", DecisionScope::Persistent),
        )
        .unwrap();

    let channel = ScriptedChannel::new(Script::Answer(Verdict::Denied, DecisionScope::Once));
    let executor = Arc::new(CountingExecutor::default());
    let workflow = PermissionWorkflow::new(store, channel.clone(), executor.clone());

    let request = PermissionRequest::new("Bash", "ls", "bob");
    let evaluation = workflow
        .evaluate(&request, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        evaluation.trace,
        vec![
            WorkflowState::Requested,
            WorkflowState::Checking,
            WorkflowState::Approved
        ]
    );
    assert!(!evaluation.reached(WorkflowState::AwaitingHuman));
    assert!(matches!(
        evaluation.resolution,
        Resolution::Approved {
            source: DecisionSource::Cached,
            ..
        }
    ));

    let result = workflow
        .run(bash("ls"), "bob", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.output, "ran ls");
    assert_eq!(channel.calls(), 0);
    assert_eq!(executor.runs(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_denies_without_durable_record() {
    let backend = Arc::new(MemoryRuleBackend::new());
    let store = Arc::new(PermissionStore::with_backend(backend.clone()));
    let channel = ScriptedChannel::new(Script::Silent);
    let executor = Arc::new(CountingExecutor::default());
    let workflow = PermissionWorkflow::new(store.clone(), channel.clone(), executor.clone())
        .with_approval_timeout(Duration::from_secs(30));

    let err = workflow
        .run(bash("curl example.com"), "bob", &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(err.is_timeout_denial());
    match err {
        GateError::Denied(refusal) => {
            assert_eq!(refusal.kind, DenialKind::TimedOut);
            assert_eq!(refusal.actor, None);
        }
        other => panic!("Expected Denied, got {:?}", other),
    }
    assert_eq!(channel.calls(), 1);
    assert_eq!(executor.runs(), 0);
    assert_eq!(backend.save_count(), 0);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_cancel_while_awaiting_human() {
    let backend = Arc::new(MemoryRuleBackend::new());
    let store = Arc::new(PermissionStore::with_backend(backend.clone()));
    let (channel, mut prompts) = PendingApprovals::new();
    let executor = Arc::new(CountingExecutor::default());
    let workflow = Arc::new(PermissionWorkflow::new(
        store.clone(),
        Arc::new(channel.clone()),
        executor.clone(),
    ));

    let cancel = CancellationToken::new();
    let task = {
        let workflow = workflow.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { workflow.run(bash("rm -rf build"), "bob", &cancel).await })
    };

    let prompt = prompts.recv().await.unwrap();
    assert!(channel.is_pending(prompt.request_id));

    cancel.cancel();
    let err = task.await.unwrap().unwrap_err();
    assert!(matches!(err, GateError::Cancelled(id) if id == prompt.request_id));

    // The prompt is gone; a late answer is ignored
    assert!(!channel.is_pending(prompt.request_id));
    let late = channel.respond(ApprovalResponse::approve(prompt.request_id, "alice").persist());
    assert!(matches!(late, Err(GateError::RequestNotFound(_))));

    assert!(store.is_empty());
    assert_eq!(backend.save_count(), 0);
    assert_eq!(executor.runs(), 0);
}

#[tokio::test]
async fn test_approve_and_persist_writes_once() {
    let backend = Arc::new(MemoryRuleBackend::new());
    let store = Arc::new(PermissionStore::with_backend(backend.clone()));
    let (channel, mut prompts) = PendingApprovals::new();
    let executor = Arc::new(CountingExecutor::default());
    let workflow = Arc::new(PermissionWorkflow::new(
        store.clone(),
        Arc::new(channel.clone()),
        executor.clone(),
    ));
    let sig = RuleSignature::exact("Bash", "rm -rf /tmp/*");
    assert!(store.lookup(&sig).is_none());

    let task = {
        let workflow = workflow.clone();
        tokio::spawn(async move {
            workflow
                .run(bash("rm -rf /tmp/*"), "bob", &CancellationToken::new())
                .await
        })
    };

    let prompt = prompts.recv().await.unwrap();
    assert_eq!(prompt.tool_name, "Bash");
    assert_eq!(prompt.action, "rm -rf /tmp/*");
    assert_eq!(prompt.requested_by, "bob");
    channel
        .respond(ApprovalResponse::approve(prompt.request_id, "alice").persist())
        .unwrap();

    let result = task.await.unwrap().unwrap();
    assert_eq!(result.output, "ran rm -rf /tmp/*");

    let decision = store.lookup(&sig).unwrap();
    assert_eq!(decision.verdict, Verdict::Approved);
    assert_eq!(decision.actor, "alice");
    assert_eq!(backend.save_count(), 1);
    assert_eq!(backend.rules()[0].action, "rm -rf /tmp/*");

    // Second attempt resolves from the store without a new prompt or write
    workflow
        .run(bash("rm -rf /tmp/*"), "bob", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(backend.save_count(), 1);
    assert_eq!(channel.pending_count(), 0);
    assert_eq!(executor.runs(), 2);
}

#[tokio::test]
async fn test_malformed_rules_file_starts_empty() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("rules.json");
    fs::write(&path, "{ \"version\": 1, \"rules\": [ oops").unwrap();

    let config = GateConfig::new().with_rules_path(&path);
    let channel = ScriptedChannel::new(Script::Answer(Verdict::Approved, DecisionScope::Once));
    let workflow = PermissionWorkflow::from_config(
        &config,
        channel.clone(),
        Arc::new(CountingExecutor::default()),
    );

    assert!(workflow.store().is_empty());

    let request = PermissionRequest::new("Read", "/etc/hosts", "bob");
    let evaluation = workflow
        .evaluate(&request, &CancellationToken::new())
        .await
        .unwrap();
    assert!(evaluation.reached(WorkflowState::AwaitingHuman));
    assert!(evaluation.is_approved());
    assert_eq!(channel.calls(), 1);
}

#[tokio::test]
async fn test_rules_file_survives_restart() {
    let temp = TempDir::new().unwrap();
    let config = GateConfig::new().with_rules_path(temp.path().join("rules.json"));

    let approving = ScriptedChannel::new(Script::Answer(Verdict::Approved, DecisionScope::Persistent));
    let first = PermissionWorkflow::from_config(
        &config,
        approving.clone(),
        Arc::new(CountingExecutor::default()),
    );
    first
        .run(bash("cargo   test"), "bob", &CancellationToken::new())
        .await
        .unwrap();

    let silent = ScriptedChannel::new(Script::Silent);
    let second = PermissionWorkflow::from_config(
        &config,
        silent.clone(),
        Arc::new(CountingExecutor::default()),
    );
    second
        .run(bash("cargo test"), "bob", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(approving.calls(), 1);
    assert_eq!(silent.calls(), 0);
}

#[tokio::test]
async fn test_session_scope_dropped_at_session_end() {
    let store = Arc::new(PermissionStore::new());
    let channel = ScriptedChannel::new(Script::Answer(Verdict::Approved, DecisionScope::Session));
    let workflow = PermissionWorkflow::new(
        store.clone(),
        channel.clone(),
        Arc::new(CountingExecutor::default()),
    );

    for _ in 0..3 {
        workflow
            .run(bash("npm install"), "bob", &CancellationToken::new())
            .await
            .unwrap();
    }
    assert_eq!(channel.calls(), 1);

    store.end_session();
    workflow
        .run(bash("npm install"), "bob", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(channel.calls(), 2);
}

#[tokio::test]
async fn test_executor_error_passed_through() {
    let executor = Arc::new(CountingExecutor {
        fail: true,
        ..Default::default()
    });
    let workflow = PermissionWorkflow::new(
        Arc::new(PermissionStore::new()),
        ScriptedChannel::new(Script::Answer(Verdict::Approved, DecisionScope::Once)),
        executor.clone(),
    );

    let err = workflow
        .run(bash("make"), "bob", &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, GateError::Execution(_)));
    assert_eq!(err.to_string(), "executor exploded");
    assert_eq!(executor.runs(), 1);
}

#[tokio::test]
async fn test_concurrent_requests_wait_independently() {
    let (channel, mut prompts) = PendingApprovals::new();
    let executor = Arc::new(CountingExecutor::default());
    let workflow = Arc::new(PermissionWorkflow::new(
        Arc::new(PermissionStore::new()),
        Arc::new(channel.clone()),
        executor.clone(),
    ));

    let tasks: Vec<_> = (0..5)
        .map(|i| {
            let workflow = workflow.clone();
            tokio::spawn(async move {
                workflow
                    .run(bash(&format!("echo {}", i)), "bob", &CancellationToken::new())
                    .await
            })
        })
        .collect();

    let mut received = Vec::new();
    for _ in 0..5 {
        received.push(prompts.recv().await.unwrap());
    }
    assert_eq!(channel.pending_count(), 5);

    // Answer in reverse order; deny the odd commands
    for prompt in received.iter().rev() {
        let n: u32 = prompt.action.trim_start_matches("echo ").parse().unwrap();
        let response = if n % 2 == 0 {
            ApprovalResponse::approve(prompt.request_id, "alice")
        } else {
            ApprovalResponse::deny(prompt.request_id, "alice")
        };
        channel.respond(response).unwrap();
    }

    let results = futures::future::join_all(tasks).await;
    let approved = results
        .into_iter()
        .map(|r| r.unwrap())
        .filter(|r| r.is_ok())
        .count();

    assert_eq!(approved, 3);
    assert_eq!(executor.runs(), 3);
    assert_eq!(channel.pending_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_records_latest_sequence_wins() {
    let backend = Arc::new(MemoryRuleBackend::new());
    let store = Arc::new(PermissionStore::with_backend(backend.clone()));
    let sig = RuleSignature::exact("Bash", "make release");

    let writers: Vec<_> = (0..16)
        .map(|i| {
            let store = store.clone();
            let sig = sig.clone();
            tokio::spawn(async move {
                let actor = format!("reviewer-{}", i);
                let decision = if i % 2 == 0 {
                    PermissionDecision::approved(actor.clone(), DecisionScope::Persistent)
                } else {
                    PermissionDecision::denied(actor.clone(), DecisionScope::Session)
                };
                let seq = tokio::task::spawn_blocking(move || store.record(sig, decision))
                    .await
                    .unwrap()
                    .unwrap()
                    .unwrap();
                (seq, actor)
            })
        })
        .collect();

    let mut recorded: Vec<(u64, String)> = futures::future::join_all(writers)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();
    recorded.sort();
    let (_, last_actor) = recorded.last().unwrap();

    assert_eq!(&store.lookup(&sig).unwrap().actor, last_actor);

    // The file holds the newest durable answer
    let newest_durable = recorded
        .iter()
        .rev()
        .find(|(_, actor)| {
            let n: u32 = actor.trim_start_matches("reviewer-").parse().unwrap();
            n % 2 == 0
        })
        .map(|(_, actor)| actor.clone());
    let rules = backend.rules();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].decided_by, newest_durable);
}

#[tokio::test]
async fn test_malformed_rules_file_not_overwritten() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("rules.json");
    let original = r#"{"rules":[{"action":"rm -rf /","decision":"denied"},]}"#;
    fs::write(&path, original).unwrap();

    let config = GateConfig::new().with_rules_path(&path);
    let workflow = PermissionWorkflow::from_config(
        &config,
        ScriptedChannel::new(Script::Answer(Verdict::Approved, DecisionScope::Persistent)),
        Arc::new(CountingExecutor::default()),
    );
    workflow
        .run(bash("ls"), "bob", &CancellationToken::new())
        .await
        .unwrap();

    let backups: Vec<_> = fs::read_dir(temp.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("rules.json.malformed-"))
        .collect();
    assert_eq!(backups.len(), 1);
    let kept = fs::read_to_string(temp.path().join(&backups[0])).unwrap();
    assert!(kept.contains("rm -rf /"));

    let rewritten = fs::read_to_string(&path).unwrap();
    assert!(rewritten.contains("\"ls\""));
}
