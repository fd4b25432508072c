use std::sync::Arc;

use anyhow::Result;
use serde_json::json;
use serde_json::Value;
use toolpilot::{
    agent::{Agent, AgentConfig},
    builtin,
    bridge::tools_to_openai_spec,
    errors::{AgentError, AgentResult},
    invoker::ToolInvoker,
    mcp::{connect_in_process, McpClient, McpServer, McpToolbox},
    models::{
        message::Message,
        tool::{Tool, ToolCall},
    },
    providers::mock::MockProvider,
    registry::{FnHandler, ToolRegistry, Toolbox},
};

fn local() -> Arc<dyn Toolbox> {
    Arc::new(builtin::registry().expect("builtin registry"))
}

#[tokio::test]
async fn test_discovery_matches_local_registry() -> Result<()> {
    let local = local();
    let remote = connect_in_process(local.clone()).await?;

    assert_eq!(remote.name(), "builtin");
    assert_eq!(remote.tools(), local.tools());
    assert_eq!(
        tools_to_openai_spec(remote.tools())?,
        tools_to_openai_spec(local.tools())?
    );
    Ok(())
}

#[tokio::test]
async fn test_same_contract_as_local_tools() -> Result<()> {
    let local = ToolInvoker::new(local())?;
    let remote = ToolInvoker::new(Arc::new(connect_in_process(local.toolbox().clone()).await?))?;

    let calls = [
        ToolCall::new("get_weather", json!({"city": "Bengaluru"})),
        ToolCall::new("get_weather", json!({"city": "Atlantis"})),
        ToolCall::new("calculate", json!({"expression": "2+2"})),
        ToolCall::new("calculate", json!({"expression": "1/0"})),
        ToolCall::new("search_contacts", json!({"name": "charlie"})),
    ];
    for call in &calls {
        let expected = local.invoke(call).await;
        assert_eq!(remote.invoke(call).await, expected, "mismatch for {:?}", call);
        // repeatable
        assert_eq!(remote.invoke(call).await, expected);
    }

    let unknown = ToolCall::new("get_time", json!({}));
    assert_eq!(remote.invoke(&unknown).await.unwrap_err().kind(), "unknown_tool");

    let bad = ToolCall::new("search_contacts", json!({"name": 5}));
    assert_eq!(remote.invoke(&bad).await.unwrap_err().kind(), "bad_arguments");
    Ok(())
}

#[tokio::test]
async fn test_server_side_validation_without_client_checks() -> Result<()> {
    // Calling the toolbox directly skips client-side validation, so the server
    // has to reject the arguments itself.
    let remote = connect_in_process(local()).await?;
    let call = ToolCall::new("calculate", json!({"expression": ["2", "+", "2"]}));
    let expected = ToolInvoker::new(local())?.invoke(&call).await.unwrap_err();

    let err = remote.call(call).await.unwrap_err();
    assert_eq!(err.kind(), "bad_arguments");
    assert_eq!(err, expected);
    Ok(())
}

fn failing_registry() -> Arc<dyn Toolbox> {
    let schema = json!({"type": "object"});
    let registry = ToolRegistry::new("failing")
        .with_tool(
            Tool::new("backup", "Copy files somewhere safe", schema.clone()),
            FnHandler(|_: Value| -> AgentResult<Value> {
                Err(AgentError::ExecutionError("disk full".into()))
            }),
        )
        .expect("backup tool")
        .with_tool(
            Tool::new("flaky", "Fails internally", schema.clone()),
            FnHandler(|_: Value| -> AgentResult<Value> {
                Err(AgentError::Internal("lost connection".into()))
            }),
        )
        .expect("flaky tool")
        .with_tool(
            Tool::new("crash", "Panics", schema),
            FnHandler(|_: Value| -> AgentResult<Value> { panic!("segments misaligned") }),
        )
        .expect("crash tool");
    Arc::new(registry)
}

#[tokio::test]
async fn test_failing_tools_give_same_payload() -> Result<()> {
    let local = ToolInvoker::new(failing_registry())?;
    let remote = ToolInvoker::new(Arc::new(connect_in_process(failing_registry()).await?))?;

    for name in ["backup", "flaky", "crash"] {
        let call = ToolCall::new(name, json!({}));
        let expected = local.invoke(&call).await.unwrap_err();
        let actual = remote.invoke(&call).await.unwrap_err();
        assert_eq!(actual, expected, "mismatch for {}", name);
        assert_eq!(actual.to_payload(), expected.to_payload());
    }

    let payload = remote
        .invoke(&ToolCall::new("backup", json!({})))
        .await
        .unwrap_err()
        .to_payload();
    assert_eq!(
        payload,
        json!({"error": "Tool execution failed: disk full", "kind": "execution_failed"})
    );
    Ok(())
}

#[tokio::test]
async fn test_client_session_lifecycle() -> Result<()> {
    let client = McpClient::in_process(McpServer::new(local())?).await?;
    let info = client.server_info().expect("server info after handshake");
    assert_eq!(info.server_info.name, "builtin");
    assert_eq!(client.list_tools().await?.len(), 3);

    let toolbox = McpToolbox::connect(client).await?;
    assert_eq!(toolbox.tools(), local().tools());
    Ok(())
}

#[tokio::test]
async fn test_agent_over_mcp() -> Result<()> {
    let remote = connect_in_process(local()).await?;
    let provider = MockProvider::new(vec![
        Message::assistant().with_tool_request(
            "call_0",
            ToolCall::new("search_contacts", json!({"name": "Alice"})),
        ),
        Message::assistant().with_text("Alice's phone is +91-9876543210."),
    ]);
    let agent = Agent::new(Box::new(provider), Arc::new(remote), AgentConfig::default())?;

    let outcome = agent.run("What is Alice's phone number?").await?;
    let response = outcome.conversation[3].tool_response().expect("tool response");
    assert_eq!(
        response.payload(),
        json!({"phone": "+91-9876543210", "email": "alice@example.com"})
    );
    Ok(())
}
