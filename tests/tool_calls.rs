//! Tool call decoding, exercised end to end against the stub server.

use std::time::Duration;

use freelance_mcp_client::{
    schema::{CallToolResult, INTERNAL_ERROR},
    freelance,
    testutils::{connected_stub_client, init_tracing, StubReply, StubServer},
    ToolCallRequest, ToolCallResult, NO_VALID_RESPONSE,
};
use pretty_assertions::assert_eq;
use serde::Serialize;
use serde_json::{json, Value};

fn structured(value: Value) -> ToolCallResult {
    match value {
        Value::Object(map) => ToolCallResult::Structured(map),
        other => panic!("not an object: {other}"),
    }
}

#[tokio::test]
async fn test_structured_payload_returned_verbatim() {
    init_tracing();
    let payload = json!({
        "total_found": 2,
        "gigs": [
            {"title": "Rust CLI", "budget": 800},
            {"title": "Tokio service", "budget": 1500}
        ]
    });
    let stub = StubServer::new().with_tool_result(
        "search_gigs",
        CallToolResult::new()
            .with_structured_content(payload.clone())
            .with_text_content("2 gigs found"),
    );
    let (mut client, _stub) = connected_stub_client(stub).await.unwrap();

    let result = client
        .call_tool(ToolCallRequest::new("search_gigs").arg("skills", json!(["Rust"])))
        .await
        .unwrap();
    assert_eq!(result, structured(payload));

    client.disconnect().await;
}

#[tokio::test]
async fn test_text_decoding() {
    let stub = StubServer::new()
        .with_tool_result("json_text", CallToolResult::new().with_text_content("{\"a\":1}"))
        .with_tool_result("plain_text", CallToolResult::new().with_text_content("not json"))
        .with_tool_result("array_text", CallToolResult::new().with_text_content("[1,2]"))
        .with_tool_result("empty", CallToolResult::new());
    let (mut client, _stub) = connected_stub_client(stub).await.unwrap();

    let json_text = client.call_tool(ToolCallRequest::new("json_text")).await.unwrap();
    assert_eq!(json_text, structured(json!({"a": 1})));

    let plain = client.call_tool(ToolCallRequest::new("plain_text")).await.unwrap();
    assert_eq!(plain, ToolCallResult::Text("not json".to_string()));

    let array = client.call_tool(ToolCallRequest::new("array_text")).await.unwrap();
    assert_eq!(array, ToolCallResult::Text("[1,2]".to_string()));

    let empty = client.call_tool(ToolCallRequest::new("empty")).await.unwrap();
    assert_eq!(empty, ToolCallResult::Error(NO_VALID_RESPONSE.to_string()));

    client.disconnect().await;
}

#[tokio::test]
async fn test_rpc_error_becomes_error_result() {
    let stub = StubServer::new()
        .with_echo_tool("code_review")
        .on("tools/call", StubReply::error(INTERNAL_ERROR, "file not found: main.py"));
    let (mut client, _stub) = connected_stub_client(stub).await.unwrap();

    let result = client
        .call_tool(
            ToolCallRequest::new("code_review")
                .arg("file_path", "main.py")
                .with_operation("review code"),
        )
        .await
        .unwrap();

    let message = result.error_message().expect("error result");
    assert!(message.starts_with("Failed to review code"), "{message}");
    assert!(message.contains("file not found: main.py"), "{message}");
    assert_eq!(
        result.into_json(),
        json!({"error": "Failed to review code: JSON-RPC error -32603: file not found: main.py"})
    );

    client.disconnect().await;
}

#[tokio::test]
async fn test_unknown_tool_names_the_call() {
    let (mut client, _stub) = connected_stub_client(StubServer::new()).await.unwrap();

    let result = client.call_tool(ToolCallRequest::new("missing")).await.unwrap();
    let message = result.error_message().expect("error result");
    assert!(message.starts_with("Failed to call tool 'missing'"), "{message}");
    assert!(message.contains("Unknown tool"), "{message}");

    client.disconnect().await;
}

#[tokio::test]
async fn test_server_side_tool_failure_is_error() {
    let stub = StubServer::new().with_tool_result(
        "generate_proposal",
        CallToolResult::new()
            .with_text_content("GROQ_API_KEY is not configured")
            .is_error(true),
    );
    let (mut client, _stub) = connected_stub_client(stub).await.unwrap();

    let profile = json!({"name": "Ada", "skills": ["Rust"]});
    let request =
        freelance::generate_proposal("upwork_001", profile.as_object().unwrap(), None);
    let result = client.call_tool(request).await.unwrap();
    assert_eq!(
        result,
        ToolCallResult::Error("Failed to generate proposal: GROQ_API_KEY is not configured".into())
    );

    client.disconnect().await;
}

#[tokio::test]
async fn test_dropped_connection_becomes_error() {
    let stub = StubServer::new().with_tool("crash", |_| StubReply::Disconnect);
    let (mut client, mut stub) = connected_stub_client(stub).await.unwrap();

    let result = client.call_tool(ToolCallRequest::new("crash")).await.unwrap();
    let message = result.error_message().expect("error result");
    assert!(message.starts_with("Failed to call tool 'crash'"), "{message}");
    assert!(stub.finished(Duration::from_secs(2)).await);

    // The session is gone; later calls keep failing as results.
    let again = client.call_tool(ToolCallRequest::new("crash")).await.unwrap();
    assert!(again.is_error());

    client.disconnect().await;
}

#[tokio::test]
async fn test_timeout_becomes_error_and_session_survives() {
    let stub = StubServer::new()
        .with_tool("slow", |_| StubReply::Hang)
        .with_tool_result("validate", CallToolResult::new().with_text_content("ok"));
    let (mut client, _stub) = connected_stub_client(stub).await.unwrap();

    let result = client
        .call_tool(ToolCallRequest::new("slow").with_timeout(Duration::from_millis(100)))
        .await
        .unwrap();
    let message = result.error_message().expect("error result");
    assert!(message.starts_with("Failed to call tool 'slow'"), "{message}");
    assert!(message.contains("timed out"), "{message}");

    let next = client.call_tool(ToolCallRequest::new("validate")).await.unwrap();
    assert_eq!(next, ToolCallResult::Text("ok".into()));

    client.disconnect().await;
}

#[derive(Serialize)]
struct ProfileParams {
    name: String,
    title: String,
    skills: Vec<String>,
    hourly_rate: f64,
    languages: Vec<String>,
    platforms: Vec<String>,
}

#[tokio::test]
async fn test_arguments_round_trip_to_server() {
    let stub = StubServer::new().with_echo_tool("create_user_profile");
    let (mut client, stub) = connected_stub_client(stub).await.unwrap();

    let params = ProfileParams {
        name: "Ada".into(),
        title: "Systems Engineer".into(),
        skills: vec!["Rust".into(), "Tokio".into()],
        hourly_rate: 95.5,
        languages: vec!["English".into()],
        platforms: vec!["upwork".into(), "toptal".into()],
    };
    let request = ToolCallRequest::from_params("create_user_profile", &params)
        .unwrap()
        .arg("metadata", json!({"nested": {"deep": [1, null, true]}}));
    let expected = Value::Object(request.arguments().clone());

    let result = client.call_tool(request).await.unwrap();
    assert_eq!(result, structured(expected.clone()));

    let sent = stub.requests("tools/call");
    assert_eq!(sent.len(), 1);
    let params = sent[0].params.clone().unwrap();
    assert_eq!(params["name"], json!("create_user_profile"));
    assert_eq!(params["arguments"], expected);

    let keys: Vec<&str> = params["arguments"]
        .as_object()
        .unwrap()
        .keys()
        .map(String::as_str)
        .collect();
    assert_eq!(
        keys,
        vec!["name", "title", "skills", "hourly_rate", "languages", "platforms", "metadata"]
    );

    client.disconnect().await;
}
