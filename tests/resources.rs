use freelance_mcp_client::{
    schema::ReadResourceResult,
    testutils::{connected_stub_client, StubReply, StubServer},
    Error, ResourceContent,
};
use pretty_assertions::assert_eq;
use serde_json::json;

const TRENDS: &str = r#"{"trending_skills": ["Rust", "AI"], "average_rates": {"rust": 95}}"#;

#[tokio::test]
async fn test_read_text_resource() {
    let stub = StubServer::new().with_text_resource("freelance://market-trends", TRENDS);
    let (mut client, stub) = connected_stub_client(stub).await.unwrap();

    let content = client
        .read_resource("freelance://market-trends")
        .await
        .unwrap();
    assert_eq!(
        content,
        ResourceContent::Text {
            uri: "freelance://market-trends".into(),
            mime_type: None,
            text: TRENDS.into(),
        }
    );
    assert_eq!(content.json().unwrap()["average_rates"]["rust"], json!(95));

    let reads = stub.requests("resources/read");
    assert_eq!(
        reads[0].params,
        Some(json!({"uri": "freelance://market-trends"}))
    );

    client.disconnect().await;
}

#[tokio::test]
async fn test_unknown_resource_is_a_call_error() {
    let (mut client, _stub) = connected_stub_client(StubServer::new()).await.unwrap();

    match client.read_resource("freelance://profile/nobody").await {
        Err(Error::Call { operation, message }) => {
            assert_eq!(operation, "read resource freelance://profile/nobody");
            assert!(message.contains("Unknown resource"), "{message}");
        }
        other => panic!("Expected call error, got {other:?}"),
    }

    client.disconnect().await;
}

#[tokio::test]
async fn test_empty_contents_is_a_call_error() {
    let stub = StubServer::new().on("resources/read", StubReply::result(ReadResourceResult::new()));
    let (mut client, _stub) = connected_stub_client(stub).await.unwrap();

    let err = client
        .read_resource("freelance://gigs/upwork")
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Failed to read resource freelance://gigs/upwork: server returned no content"
    );

    client.disconnect().await;
}

#[tokio::test]
async fn test_blob_resource_passes_through() {
    let stub = StubServer::new().on(
        "resources/read",
        StubReply::Result(json!({
            "contents": [{
                "uri": "freelance://profile/ada/avatar",
                "mimeType": "image/png",
                "blob": "iVBORw0KGgo="
            }]
        })),
    );
    let (mut client, _stub) = connected_stub_client(stub).await.unwrap();

    let content = client
        .read_resource("freelance://profile/ada/avatar")
        .await
        .unwrap();
    assert_eq!(content.mime_type(), Some("image/png"));
    assert!(content.text().is_none());
    assert!(matches!(content, ResourceContent::Blob { .. }));

    client.disconnect().await;
}
