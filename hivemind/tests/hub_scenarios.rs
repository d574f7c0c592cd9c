//! End-to-end scenarios over the assembled hub: governance enforcement,
//! blocked dispatch, and the chain lifecycle through the dispatcher.

use std::sync::Arc;

use serde_json::{json, Value};

use hivemind::{
    CallToolResult, GraphStore, Hub, HubBuilder, InMemoryGraph, InventoryCache, MockRuntime,
    ModelRouter, NotebookVault, RoutingTable, DEFAULT_INVENTORY_TTL,
};

async fn build_hub(vault_root: &std::path::Path) -> (Arc<dyn GraphStore>, Hub) {
    let graph: Arc<dyn GraphStore> = Arc::new(InMemoryGraph::new());
    let vault = Arc::new(NotebookVault::new(vault_root));
    let runtime = Arc::new(MockRuntime::new(&["llama3.1"]));
    let inventory = InventoryCache::new(runtime.clone(), DEFAULT_INVENTORY_TTL);
    let router = Arc::new(ModelRouter::new(
        runtime,
        inventory,
        RoutingTable::default(),
        3,
    ));
    let hub = HubBuilder::new(graph.clone(), vault, router)
        .build()
        .await
        .unwrap();
    (graph, hub)
}

fn parse(result: &CallToolResult) -> Value {
    serde_json::from_str(result.first_text()).unwrap()
}

/// **Scenario**: with an unwritable vault root, every tools/call is
/// governance-blocked and the graph is never mutated.
#[tokio::test]
async fn governance_block_prevents_mutation() {
    let dir = tempfile::tempdir().unwrap();
    let blocked = dir.path().join("blocked");
    std::fs::write(&blocked, b"a file occupies the vault path").unwrap();
    let (graph, hub) = build_hub(&blocked).await;

    let result = hub
        .dispatcher
        .tools_call(
            None,
            "create_entity",
            json!({"label": "Person", "id": "p1", "properties": {"name": "Alice"}}),
        )
        .await;
    assert!(result.is_err());
    assert_eq!(result.error_kind, Some("governance_blocked"));
    assert_eq!(graph.count_entities("Person").await.unwrap(), 0);
}

/// **Scenario**: one successful governed call writes exactly one
/// pre-record and one post-record, timestamps non-decreasing.
#[tokio::test]
async fn governed_call_writes_record_pair() {
    let dir = tempfile::tempdir().unwrap();
    let (_graph, hub) = build_hub(dir.path()).await;

    let result = hub
        .dispatcher
        .tools_call(None, "create_task", json!({"title": "alpha"}))
        .await;
    assert!(!result.is_err());

    let (_, body) = hub.vault.read(&hub.vault.daily_log_name()).await.unwrap();
    let timestamps: Vec<&str> = body
        .lines()
        .filter(|l| l.starts_with("### ["))
        .map(|l| &l[5..l.find(']').unwrap()])
        .collect();
    assert_eq!(timestamps.len(), 2);
    assert!(timestamps[0] <= timestamps[1]);
    assert!(body.contains(":: CREATE_TASK\n") || body.contains(":: CREATE_TASK"));
    assert!(body.contains(":: CREATE_TASK_RESULT"));
}

/// **Scenario**: the chain lifecycle through the dispatcher ends with a
/// completed chain readable as a chain:// resource and exported to the
/// vault.
#[tokio::test]
async fn chain_lifecycle_over_dispatch() {
    let dir = tempfile::tempdir().unwrap();
    let (_graph, hub) = build_hub(dir.path()).await;

    let started = hub
        .dispatcher
        .tools_call(None, "start_thinking", json!({"prompt": "Capital of France?"}))
        .await;
    let chain_id = parse(&started)["chainId"].as_str().unwrap().to_string();

    for thought in ["Recall facts", "Paris is the capital"] {
        let step = hub
            .dispatcher
            .tools_call(None, "add_step", json!({"chainId": chain_id, "thought": thought}))
            .await;
        assert!(!step.is_err());
    }
    let concluded = hub
        .dispatcher
        .tools_call(
            None,
            "conclude",
            json!({"chainId": chain_id, "conclusion": "Paris"}),
        )
        .await;
    let body = parse(&concluded);
    assert_eq!(body["status"], "completed");
    let export = body["exportFile"].as_str().unwrap().to_string();

    let (fm, note) = hub.vault.read(&export).await.unwrap();
    assert_eq!(fm.get_str("status"), Some("completed"));
    assert_eq!(fm.get_str("chain_id"), Some(chain_id.as_str()));
    let conclusion = note.find("## Conclusion").unwrap();
    assert!(note[conclusion..].contains("Paris"));

    let resource = hub
        .dispatcher
        .resources_read(&format!("chain://{}", chain_id))
        .await
        .unwrap();
    assert!(resource.text.contains("### Step 1:"));
    assert!(resource.text.contains("### Step 2:"));
}

/// **Scenario**: the dispatcher flattens every sub-server's tools and
/// routes by name without a server pin.
#[tokio::test]
async fn cross_server_routing() {
    let dir = tempfile::tempdir().unwrap();
    let (_graph, hub) = build_hub(dir.path()).await;

    let tools = hub.dispatcher.tools_list().await;
    let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
    for expected in [
        "create_entity",
        "write_note",
        "chat",
        "start_thinking",
        "create_task",
    ] {
        assert!(names.contains(&expected), "missing {}", expected);
    }

    let result = hub
        .dispatcher
        .tools_call(None, "list_models", json!({}))
        .await;
    assert!(!result.is_err());
    let body = parse(&result);
    assert_eq!(body["count"], 1);
}
