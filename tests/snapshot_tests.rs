//! Capture and restore of swarm and workflow state.

mod common;

use pretty_assertions::assert_eq;
use serde_json::json;

use common::{agent, delegating_agent, read_file_tool, reading_agent, registry, MockProvider};
use swarmflow::snapshot::{capture, restore, RestoreWarningKind, Snapshot, SnapshotKind};
use swarmflow::swarm::{Swarm, SwarmDefinition};
use swarmflow::registry::Registry;
use swarmflow::workflow::{NodeAgent, Workflow, WorkflowNode};

const DOCS: &str = "# API\nGET /users";

fn registry_with_reader(provider: &std::sync::Arc<MockProvider>) -> Registry {
    let registry = registry(provider);
    registry.register_tool(read_file_tool(DOCS));
    registry
}

fn research_team() -> SwarmDefinition {
    let research = SwarmDefinition::new("researcher", vec![reading_agent("researcher")]);
    SwarmDefinition::new("lead", vec![delegating_agent("lead", &["research"])])
        .with_name("app")
        .with_sub_swarm("research", research, true)
}

fn team(with_reviewer: bool) -> SwarmDefinition {
    let mut agents = vec![delegating_agent("lead", &["backend"]), agent("backend")];
    if with_reviewer {
        let mut reviewer = agent("reviewer");
        reviewer.shared_across_delegations = true;
        agents.push(reviewer);
    }
    SwarmDefinition::new("lead", agents).with_name("team")
}

async fn populated_swarm(provider: &std::sync::Arc<MockProvider>, with_reviewer: bool) -> Swarm {
    provider.queue_tool_call("lead", "c1", "delegate_to_backend", json!({"message": "write the api"}));
    provider.queue_response("lead", "api ready");

    let swarm = Swarm::new(team(with_reviewer), registry(provider)).unwrap();
    let result = swarm.execute("build an api").await;
    assert!(result.success(), "{:?}", result.error);

    swarm.scratchpad().write("notes/api.md", "GET /users", "API notes");
    swarm.read_tracking().record_read("backend@lead", "src/api.rs", "fn api() {}");
    if with_reviewer {
        let reviewer = swarm.session("reviewer").unwrap();
        assert_eq!(reviewer.lock().await.messages().len(), 1);
        swarm.read_tracking().record_read("reviewer", "src/api.rs", "fn api() {}");
    }
    swarm
}

#[tokio::test]
async fn swarm_state_survives_a_round_trip() {
    let provider = MockProvider::new();
    let original = populated_swarm(&provider, false).await;

    let snapshot = capture(&original).await.with_metadata("ticket", json!("ENG-42"));
    assert_eq!(snapshot.kind, SnapshotKind::Swarm);
    assert_eq!(snapshot.agents.keys().collect::<Vec<_>>(), vec!["lead"]);
    assert_eq!(snapshot.delegation_instances.keys().collect::<Vec<_>>(), vec!["backend@lead"]);

    let parsed = Snapshot::from_json(&snapshot.to_json().unwrap()).unwrap();
    assert_eq!(parsed, snapshot);

    let fresh = Swarm::new(team(false), registry(&provider)).unwrap();
    let outcome = restore(&fresh, &parsed).await.unwrap();

    assert!(outcome.success);
    assert!(!outcome.partial_restore);
    assert!(outcome.warnings.is_empty());

    let recaptured = capture(&fresh).await;
    assert_eq!(recaptured.agents, snapshot.agents);
    assert_eq!(recaptured.delegation_instances, snapshot.delegation_instances);
    assert_eq!(recaptured.scratchpad, snapshot.scratchpad);
    assert_eq!(recaptured.read_tracking, snapshot.read_tracking);
    assert!(fresh
        .read_tracking()
        .check_edit("backend@lead", "src/api.rs", "fn api() {}")
        .is_ok());
}

#[tokio::test]
async fn missing_agents_are_skipped_with_one_warning() {
    let provider = MockProvider::new();
    let original = populated_swarm(&provider, true).await;
    let snapshot = capture(&original).await;
    assert!(snapshot.agents.contains_key("reviewer"));

    let fresh = Swarm::new(team(false), registry(&provider)).unwrap();
    let outcome = restore(&fresh, &snapshot).await.unwrap();

    assert!(!outcome.success);
    assert!(outcome.partial_restore);
    assert_eq!(outcome.warnings.len(), 1);
    assert_eq!(outcome.warnings[0].kind, RestoreWarningKind::AgentNotFound);
    assert_eq!(outcome.skipped_agents, vec!["reviewer"]);
    assert!(outcome.skipped_delegations.is_empty());

    let lead = fresh.session("lead").unwrap();
    assert_eq!(lead.lock().await.messages(), snapshot.agents["lead"].conversation.as_slice());
    assert!(fresh.read_tracking().digest_for("reviewer", "src/api.rs").is_none());
}

#[tokio::test]
async fn delegation_instances_need_a_matching_delegate() {
    let provider = MockProvider::new();
    let original = populated_swarm(&provider, false).await;
    let snapshot = capture(&original).await;

    let solo = Swarm::new(
        SwarmDefinition::new("lead", vec![agent("lead"), agent("backend")]),
        registry(&provider),
    )
    .unwrap();
    let outcome = restore(&solo, &snapshot).await.unwrap();

    assert_eq!(outcome.skipped_delegations, vec!["backend@lead"]);
    assert!(outcome
        .warnings
        .iter()
        .all(|warning| warning.kind == RestoreWarningKind::DelegationInstanceNotRestorable));
    assert!(solo.instances().is_empty());
}

#[tokio::test]
async fn workflow_sessions_that_keep_context_are_restored() {
    let provider = MockProvider::new();
    let build = || {
        Workflow::builder("design", registry(&provider))
            .agent(agent("architect"))
            .node(WorkflowNode::new("draft").with_agent(NodeAgent::new("architect").keep_context()))
            .node(
                WorkflowNode::new("refine")
                    .depends_on(["draft"])
                    .with_agent(NodeAgent::new("architect").keep_context()),
            )
            .build()
            .unwrap()
    };

    let original = build();
    original.execute("design a cache").await.unwrap();
    let snapshot = capture(&original).await;
    assert_eq!(snapshot.kind, SnapshotKind::Workflow);
    assert_eq!(snapshot.agents["architect"].conversation.len(), 5);

    let fresh = build();
    let outcome = restore(&fresh, &snapshot).await.unwrap();
    assert!(outcome.success);
    let session = fresh.persistent_session("architect").unwrap();
    assert_eq!(session.lock().await.messages().len(), 5);

    let swarm = Swarm::new(team(false), registry(&provider)).unwrap();
    assert!(restore(&swarm, &snapshot).await.is_err());
}

#[tokio::test]
async fn sub_swarm_sessions_and_their_reads_round_trip() {
    let provider = MockProvider::new();
    provider.queue_tool_call("lead", "c1", "delegate_to_research", json!({"message": "find the docs"}));
    provider.queue_response("lead", "docs found");
    provider.queue_tool_call("researcher", "r1", "read_file", json!({"path": "docs/api.md"}));

    let original = Swarm::new(research_team(), registry_with_reader(&provider)).unwrap();

    let result = original.execute("what does the api do?").await;
    assert!(result.success(), "{:?}", result.error);

    let snapshot = capture(&original).await;
    assert_eq!(snapshot.agents.keys().collect::<Vec<_>>(), vec!["lead", "research/researcher"]);
    assert_eq!(snapshot.read_tracking.keys().collect::<Vec<_>>(), vec!["research/researcher"]);
    assert!(original.read_tracking().digest_for("researcher", "docs/api.md").is_none());

    let fresh = Swarm::new(research_team(), registry_with_reader(&provider)).unwrap();
    let outcome = restore(&fresh, &snapshot).await.unwrap();

    assert!(outcome.success, "{:?}", outcome.warnings);
    assert!(outcome.warnings.is_empty());
    let nested = fresh.sub_swarm("research").unwrap().unwrap();
    let restored = nested.session("researcher").unwrap();
    assert_eq!(
        restored.lock().await.messages(),
        snapshot.agents["research/researcher"].conversation.as_slice()
    );
    assert_eq!(restored.lock().await.messages().len(), 5);
    assert!(fresh
        .read_tracking()
        .check_edit("research/researcher", "docs/api.md", DOCS)
        .is_ok());
    assert_eq!(capture(&fresh).await.agents, snapshot.agents);
}

#[tokio::test]
async fn node_local_reads_round_trip_into_a_fresh_workflow() {
    let provider = MockProvider::new();
    provider.queue_tool_call("coder", "r1", "read_file", json!({"path": "src/main.rs"}));
    let build = || {
        Workflow::builder("ship", registry_with_reader(&provider))
            .agent(reading_agent("coder"))
            .node(WorkflowNode::new("build").agent("coder"))
            .build()
            .unwrap()
    };

    let original = build();
    let run = original.execute("fix the build").await.unwrap();
    assert!(run.success(), "{:?}", run.error);

    let snapshot = capture(&original).await;
    assert!(snapshot.agents.is_empty());
    assert_eq!(snapshot.read_tracking.keys().collect::<Vec<_>>(), vec!["build/coder"]);

    let fresh = build();
    let outcome = restore(&fresh, &snapshot).await.unwrap();
    assert!(outcome.success, "{:?}", outcome.warnings);
    assert!(fresh.read_tracking().digest_for("build/coder", "src/main.rs").is_some());

    let mut foreign = snapshot.clone();
    foreign
        .read_tracking
        .insert("deploy/coder".to_string(), snapshot.read_tracking["build/coder"].clone());
    let outcome = restore(&build(), &foreign).await.unwrap();
    assert_eq!(outcome.skipped_agents, vec!["deploy/coder"]);
    assert_eq!(outcome.warnings[0].kind, RestoreWarningKind::AgentNotFound);
}
