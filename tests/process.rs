//! The server as a real child process: launch environment and teardown.
#![cfg(unix)]

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use freelance_mcp_client::{
    ClientConfig, SessionStatus, ToolCallRequest, ToolCallResult, ToolClient,
};
use pretty_assertions::assert_eq;

/// Shell helpers for a minimal stdio server: `reply RESULT` reads one request
/// and answers it with RESULT, `handshake` completes initialize/initialized.
const PRELUDE: &str = r#"
q='"'
reply() {
    line=
    read -r line || exit 0
    id=${line#*${q}id${q}:${q}}
    id=${id%%${q}*}
    printf '{"jsonrpc":"2.0","id":"%s","result":%s}\n' "$id" "$1"
}
handshake() {
    reply '{"protocolVersion":"2025-06-18","capabilities":{"tools":{}},"serverInfo":{"name":"sh-server","version":"0.1.0"}}'
    read -r line
}
"#;

fn shell_server(body: &str) -> ClientConfig {
    ClientConfig::new()
        .with_program("/bin/sh")
        .with_args(["-c".to_string(), format!("{PRELUDE}\n{body}")])
}

fn pid_file(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "freelance-mcp-client-{}-{name}.pid",
        std::process::id()
    ))
}

fn read_pid(path: &Path) -> u32 {
    let pid = std::fs::read_to_string(path).unwrap();
    let _ = std::fs::remove_file(path);
    pid.trim().parse().unwrap()
}

fn is_alive(pid: u32) -> bool {
    std::process::Command::new("/bin/sh")
        .args(["-c", &format!("kill -0 {pid} 2>/dev/null")])
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

#[tokio::test]
async fn test_server_ignoring_eof_is_killed_after_grace() {
    let pids = pid_file("stubborn");
    let config = shell_server(r#"printf '%s' "$$" > "$PID_FILE"; handshake; exec sleep 37"#)
        .with_env("PID_FILE", pids.to_string_lossy())
        .with_shutdown_grace(Duration::from_millis(300))
        .with_request_timeout(Duration::from_millis(200));
    let mut client = ToolClient::new(config);

    client.connect().await.unwrap();
    let pid = read_pid(&pids);
    assert!(is_alive(pid));

    // A server that stopped reading still yields a result, not a hang.
    let result = client.call_tool(ToolCallRequest::new("x")).await.unwrap();
    let message = result.error_message().expect("error result");
    assert!(message.contains("timed out"), "{message}");

    let started = tokio::time::Instant::now();
    client.disconnect().await;
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(250), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(5), "{elapsed:?}");
    assert!(!is_alive(pid));
    assert_eq!(client.status(), SessionStatus::Closed);
}

#[tokio::test]
async fn test_server_exits_when_stdin_closes() {
    let pids = pid_file("polite");
    let config = shell_server(
        r#"printf '%s' "$$" > "$PID_FILE"; handshake; while read -r line; do :; done"#,
    )
    .with_env("PID_FILE", pids.to_string_lossy())
    .with_shutdown_grace(Duration::from_secs(10));
    let mut client = ToolClient::new(config);

    client.connect().await.unwrap();
    let pid = read_pid(&pids);
    assert_eq!(client.server_info().unwrap().server_info.name, "sh-server");

    let started = tokio::time::Instant::now();
    client.disconnect().await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!is_alive(pid));
}

const REPORT_ENV: &str = r#"handshake
reply "{\"content\":[{\"type\":\"text\",\"text\":\"key=$GROQ_API_KEY mode=$FREELANCE_MODE manifest=${CARGO_MANIFEST_DIR:-unset} dir=$(pwd -P)\"}]}"
while read -r line; do :; done"#;

async fn reported_env(config: ClientConfig) -> String {
    let result = ToolClient::new(config)
        .run(|client| Box::pin(client.call_tool(ToolCallRequest::new("report_env"))))
        .await
        .unwrap()
        .unwrap();
    match result {
        ToolCallResult::Text(text) => text,
        other => panic!("Expected text, got {other:?}"),
    }
}

#[tokio::test]
async fn test_launch_environment() {
    let dir = std::fs::canonicalize(std::env::temp_dir()).unwrap();
    let config = shell_server(REPORT_ENV)
        .with_api_key("gsk-test-key")
        .with_env("FREELANCE_MODE", "demo")
        .with_working_dir(&dir);

    let manifest = std::env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| "unset".to_string());
    assert_eq!(
        reported_env(config).await,
        format!("key=gsk-test-key mode=demo manifest={manifest} dir={}", dir.display())
    );
}

#[tokio::test]
async fn test_cleared_environment_keeps_only_configured_vars() {
    let dir = std::fs::canonicalize(std::env::temp_dir()).unwrap();
    let config = shell_server(REPORT_ENV)
        .with_inherit_env(false)
        .with_api_key("gsk-test-key")
        .with_env("FREELANCE_MODE", "isolated")
        .with_working_dir(&dir);

    assert_eq!(
        reported_env(config).await,
        format!("key=gsk-test-key mode=isolated manifest=unset dir={}", dir.display())
    );
}
