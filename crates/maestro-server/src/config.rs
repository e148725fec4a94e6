//! Server configuration: defaults, `maestro.json`, then `MAESTRO_` env vars.

use std::path::PathBuf;

use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized};
use serde::{Deserialize, Serialize};

/// Runtime configuration for the control plane.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind host.
    pub host: String,
    /// Bind port (0 = ephemeral).
    pub port: u16,
    /// `SQLite` database path (`:memory:` for ephemeral).
    pub db_path: String,
    /// Assistant CLI command for agent turns and instances.
    pub cli_command: String,
    /// Arguments passed to the CLI.
    pub cli_args: Vec<String>,
    /// Well-known CLI credentials file (profile mode target).
    pub credentials_file: PathBuf,
    /// Temp root for execution workspaces.
    pub temp_root: PathBuf,
    /// Soft wall-clock timeout per agent turn, in seconds.
    pub turn_timeout_secs: u64,
    /// Ready marker for interactive instances.
    pub ready_marker: String,
    /// Local command for the MCP endpoint, if tools should reach one.
    pub mcp_command: Option<String>,
    /// Arguments for the MCP command.
    pub mcp_args: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8900,
            db_path: "maestro.db".to_owned(),
            cli_command: "assistant".to_owned(),
            cli_args: Vec::new(),
            credentials_file: PathBuf::from(".maestro/credentials.json"),
            temp_root: std::env::temp_dir(),
            turn_timeout_secs: 600,
            ready_marker: "[maestro:ready]".to_owned(),
            mcp_command: None,
            mcp_args: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Load configuration: defaults ← `maestro.json` ← `MAESTRO_*` env.
    pub fn load() -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Json::file("maestro.json"))
            .merge(Env::prefixed("MAESTRO_"))
            .extract()
    }
}
