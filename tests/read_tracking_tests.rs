//! Stale-read protection through tools running inside a swarm.

mod common;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde_json::json;

use common::{registry, MockProvider, PROVIDER};
use swarmflow::swarm::{Swarm, SwarmDefinition};
use swarmflow::tools::{AgentTool, AgentToolParameters, ToolArguments, ToolExecutionContext};
use swarmflow::types::{ContentPart, ModelConfig};
use swarmflow::{AgentDefinition, SwarmError};

type Files = Arc<Mutex<BTreeMap<String, String>>>;

fn file_tools(files: &Files) -> (AgentTool, AgentTool) {
    let read_files = files.clone();
    let read = AgentTool::new(
        "read_file",
        "Read a file",
        AgentToolParameters::object().string("path", "File path", true).build(),
        move |args: ToolArguments, ctx: ToolExecutionContext| {
            let files = read_files.clone();
            async move {
                let path = args.get_str("path")?;
                let content = files.lock().unwrap().get(path).cloned().unwrap_or_default();
                ctx.record_read(path, &content);
                Ok::<_, SwarmError>(json!({ "content": content }))
            }
        },
    );
    let edit_files = files.clone();
    let edit = AgentTool::new(
        "edit_file",
        "Replace a file's content",
        AgentToolParameters::object()
            .string("path", "File path", true)
            .string("content", "New content", true)
            .build(),
        move |args: ToolArguments, ctx: ToolExecutionContext| {
            let files = edit_files.clone();
            async move {
                let path = args.get_str("path")?;
                let current = files.lock().unwrap().get(path).cloned().unwrap_or_default();
                ctx.check_edit(path, &current)?;
                let content = args.get_str("content")?.to_string();
                ctx.record_read(path, &content);
                files.lock().unwrap().insert(path.to_string(), content);
                Ok::<_, SwarmError>(json!({ "ok": true }))
            }
        },
    );
    (read, edit)
}

fn tool_results(messages: &[swarmflow::types::ModelMessage]) -> Vec<(String, bool)> {
    messages
        .iter()
        .flat_map(|message| message.content.iter())
        .filter_map(|part| match part {
            ContentPart::ToolResult(result) => Some((result.result.to_string(), result.is_error)),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn edits_after_an_outside_change_require_a_fresh_read() {
    let files: Files = Arc::new(Mutex::new(BTreeMap::from([(
        "src/lib.rs".to_string(),
        "fn v1() {}".to_string(),
    )])));
    let provider = MockProvider::new();
    let registry = registry(&provider);
    let (read, edit) = file_tools(&files);
    registry.register_tool(Arc::new(read));
    registry.register_tool(Arc::new(edit));

    let editor = AgentDefinition::builder()
        .name("editor")
        .model(ModelConfig::new(PROVIDER, "mock-1"))
        .tools(vec!["read_file".to_string(), "edit_file".to_string()])
        .build();
    let swarm = Swarm::new(SwarmDefinition::new("editor", vec![editor]), registry).unwrap();

    provider.queue_tool_call("editor", "r1", "read_file", json!({"path": "src/lib.rs"}));
    provider.queue_response("editor", "read it");
    assert!(swarm.execute("look at lib.rs").await.success());

    files
        .lock()
        .unwrap()
        .insert("src/lib.rs".to_string(), "fn v2() {}".to_string());

    provider.queue_tool_call("editor", "e1", "edit_file", json!({"path": "src/lib.rs", "content": "fn v3() {}"}));
    provider.queue_tool_call("editor", "r2", "read_file", json!({"path": "src/lib.rs"}));
    provider.queue_tool_call("editor", "e2", "edit_file", json!({"path": "src/lib.rs", "content": "fn v3() {}"}));
    provider.queue_response("editor", "edited");
    let result = swarm.execute("now edit it").await;

    assert!(result.success(), "{:?}", result.error);
    assert_eq!(files.lock().unwrap()["src/lib.rs"], "fn v3() {}");

    let session = swarm.session("editor").unwrap();
    let results = tool_results(session.lock().await.messages());
    assert_eq!(results.len(), 4);
    assert!(!results[0].1);
    assert!(results[1].1, "stale edit should fail");
    assert!(results[1].0.contains("modified since it was last read"), "{}", results[1].0);
    assert!(!results[2].1);
    assert!(!results[3].1);
}
