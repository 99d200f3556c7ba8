use std::{collections::HashMap, path::PathBuf, time::Duration};

use tracing::warn;

use crate::{codec::DEFAULT_MAX_FRAME_BYTES, schema::Implementation};

/// Environment variable the freelance server reads its LLM key from.
pub const DEFAULT_API_KEY_VAR: &str = "GROQ_API_KEY";

/// Everything a [`ToolClient`](crate::ToolClient) needs to launch and talk to
/// a server. Nothing here is read from the process environment implicitly;
/// use [`ClientConfig::from_env`] for that.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Executable that runs the server. Default: `python`.
    pub program: String,
    /// Arguments selecting the server script and its stdio mode.
    /// Default: `["freelance_server.py", "stdio"]`.
    pub args: Vec<String>,
    /// Whether the child inherits this process's environment. Default: `true`.
    pub inherit_env: bool,
    /// Extra environment variables for the child, applied on top of the
    /// inherited environment. Default: empty.
    pub env: HashMap<String, String>,
    /// Working directory for the child. Default: the current directory.
    pub working_dir: Option<PathBuf>,
    /// LLM API key exported to the child as `api_key_var`. Default: `None`.
    pub api_key: Option<String>,
    /// Default: `GROQ_API_KEY`.
    pub api_key_var: String,
    /// Identity announced during the handshake. Default: this crate's name
    /// and version.
    pub client_info: Implementation,
    /// Per-request timeout, overridable per tool call. Default: 60 seconds.
    pub request_timeout: Duration,
    /// Timeout for the initialize exchange. Default: 30 seconds.
    pub handshake_timeout: Duration,
    /// How long to wait for the server to exit after its stdin is closed
    /// before killing it. Default: 2 seconds.
    pub shutdown_grace: Duration,
    /// Longest accepted inbound line. Default: 8 MiB.
    pub max_frame_bytes: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            program: "python".to_string(),
            args: vec!["freelance_server.py".to_string(), "stdio".to_string()],
            inherit_env: true,
            env: HashMap::new(),
            working_dir: None,
            api_key: None,
            api_key_var: DEFAULT_API_KEY_VAR.to_string(),
            client_info: Implementation::new(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            request_timeout: Duration::from_secs(60),
            handshake_timeout: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(2),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults plus the API key taken from the process environment. A
    /// missing key is only a warning here: the tools that need it report the
    /// problem themselves when called.
    pub fn from_env() -> Self {
        let config = Self::default();
        let api_key = std::env::var(&config.api_key_var)
            .ok()
            .filter(|k| !k.trim().is_empty());
        if api_key.is_none() {
            warn!(
                "{} not set; LLM-backed tools on the server will not work",
                config.api_key_var
            );
        }
        Self { api_key, ..config }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Point the default launcher at a different server script, keeping the
    /// `stdio` mode argument.
    pub fn with_server_script(mut self, script: impl Into<String>) -> Self {
        self.args = vec![script.into(), "stdio".to_string()];
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_inherit_env(mut self, inherit: bool) -> Self {
        self.inherit_env = inherit;
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_client_info(mut self, info: Implementation) -> Self {
        self.client_info = info;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn with_max_frame_bytes(mut self, max: usize) -> Self {
        self.max_frame_bytes = max;
        self
    }

    /// Human-readable command line, used in logs and errors.
    pub fn launch_description(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_launch_freelance_server() {
        let config = ClientConfig::default();
        assert_eq!(config.launch_description(), "python freelance_server.py stdio");
        assert!(config.inherit_env);
        assert_eq!(config.api_key_var, "GROQ_API_KEY");
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(config.client_info.name, "freelance-mcp-client");
    }

    #[test]
    fn test_builder_overrides() {
        let config = ClientConfig::new()
            .with_program("python3")
            .with_server_script("/srv/freelance_server.py")
            .with_env("LOG_LEVEL", "debug")
            .with_api_key("gsk-test")
            .with_request_timeout(Duration::from_secs(5));

        assert_eq!(
            config.launch_description(),
            "python3 /srv/freelance_server.py stdio"
        );
        assert_eq!(config.env.get("LOG_LEVEL").map(String::as_str), Some("debug"));
        assert_eq!(config.api_key.as_deref(), Some("gsk-test"));
        assert_eq!(config.request_timeout, Duration::from_secs(5));
    }
}
