//! Per-turn MCP configuration.
//!
//! When tools are enabled and a workspace is present, a config file is
//! written inside the workspace instructing the assistant CLI to connect to
//! the control plane's MCP endpoint. The transport is a local command; the
//! wire protocol is the collaborator's concern.

use std::path::{Path, PathBuf};

use maestro_core::MaestroError;
use serde::{Deserialize, Serialize};

/// File name of the per-workspace MCP config.
pub const MCP_CONFIG_FILE: &str = ".maestro-mcp.json";

/// Local command the CLI launches to reach the MCP endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpEndpoint {
    /// Command to execute.
    pub command: String,
    /// Arguments.
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Serialize)]
struct McpConfig<'a> {
    #[serde(rename = "mcpServers")]
    servers: std::collections::BTreeMap<&'static str, &'a McpEndpoint>,
}

/// Write the MCP config into `workspace`, returning the config path.
pub async fn write_config(
    workspace: &Path,
    endpoint: &McpEndpoint,
) -> Result<PathBuf, MaestroError> {
    let mut servers = std::collections::BTreeMap::new();
    let _ = servers.insert("maestro", endpoint);
    let config = McpConfig { servers };

    let path = workspace.join(MCP_CONFIG_FILE);
    let json = serde_json::to_string_pretty(&config)
        .map_err(|e| MaestroError::Internal(format!("mcp config serialization: {e}")))?;
    tokio::fs::write(&path, json).await?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_config_into_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = McpEndpoint {
            command: "maestro-mcp".into(),
            args: vec!["--port".into(), "0".into()],
        };
        let path = write_config(dir.path(), &endpoint).await.unwrap();
        assert!(path.ends_with(MCP_CONFIG_FILE));

        let written = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&written).unwrap();
        assert_eq!(value["mcpServers"]["maestro"]["command"], "maestro-mcp");
        assert_eq!(value["mcpServers"]["maestro"]["args"][0], "--port");
    }
}
