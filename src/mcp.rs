//! MCP tool/resource catalog client.
//!
//! Spawns each configured MCP server as a child process speaking stdio
//! JSON-RPC and aggregates their tool and resource catalogs (names and
//! descriptions only — shell-sage never executes remote tools, it only
//! surfaces them as context so the model knows what the user has wired up).
//!
//! Connection and listing failures are per-server and non-fatal: a dead
//! server is logged and skipped, and the catalog stages of the assembler
//! simply come up empty.

use anyhow::{Context, Result};
use async_trait::async_trait;
use rmcp::service::RunningService;
use rmcp::transport::TokioChildProcess;
use rmcp::{RoleClient, ServiceExt};
use tokio::process::Command;

use crate::config::McpConfig;

/// A remotely-available tool, name and description only.
#[derive(Debug, Clone)]
pub struct CatalogTool {
    pub name: String,
    pub description: String,
}

/// A remotely-available resource.
#[derive(Debug, Clone)]
pub struct CatalogResource {
    pub uri: String,
    pub name: String,
    pub description: Option<String>,
}

/// A provider of external tool and resource catalogs.
#[async_trait]
pub trait ToolCatalog: Send + Sync {
    async fn tools(&self) -> Result<Vec<CatalogTool>>;

    /// Resources relevant to `query` (all resources when the query is empty).
    async fn resources(&self, query: &str) -> Result<Vec<CatalogResource>>;
}

type McpClient = RunningService<RoleClient, ()>;

/// Catalog aggregated from the configured MCP servers.
pub struct McpCatalog {
    clients: Vec<(String, McpClient)>,
}

impl McpCatalog {
    /// Connect to every configured server. Individual connection failures
    /// are logged and skipped; an empty config yields an empty catalog.
    pub async fn connect_all(config: &McpConfig) -> Self {
        let mut clients = Vec::new();

        for (name, server) in &config.servers {
            match Self::connect(&server.command, &server.args).await {
                Ok(client) => {
                    tracing::debug!("connected to MCP server {}", name);
                    clients.push((name.clone(), client));
                }
                Err(e) => {
                    tracing::warn!("skipping MCP server {}: {:#}", name, e);
                }
            }
        }

        Self { clients }
    }

    async fn connect(command: &str, args: &[String]) -> Result<McpClient> {
        let mut cmd = Command::new(command);
        cmd.args(args);

        let transport = TokioChildProcess::new(cmd)
            .with_context(|| format!("Failed to spawn MCP server process: {}", command))?;
        let client = ()
            .serve(transport)
            .await
            .with_context(|| format!("MCP handshake failed for: {}", command))?;
        Ok(client)
    }

    pub fn server_count(&self) -> usize {
        self.clients.len()
    }
}

#[async_trait]
impl ToolCatalog for McpCatalog {
    async fn tools(&self) -> Result<Vec<CatalogTool>> {
        let mut all = Vec::new();

        for (name, client) in &self.clients {
            match client.list_tools(Default::default()).await {
                Ok(result) => {
                    for tool in result.tools {
                        all.push(CatalogTool {
                            name: tool.name.to_string(),
                            description: tool
                                .description
                                .map(|d| d.to_string())
                                .unwrap_or_default(),
                        });
                    }
                }
                Err(e) => {
                    tracing::warn!("listing tools from MCP server {} failed: {:#}", name, e);
                }
            }
        }

        Ok(all)
    }

    async fn resources(&self, query: &str) -> Result<Vec<CatalogResource>> {
        let mut all = Vec::new();

        for (name, client) in &self.clients {
            match client.list_resources(Default::default()).await {
                Ok(result) => {
                    for resource in result.resources {
                        all.push(CatalogResource {
                            uri: resource.uri.clone(),
                            name: resource.name.clone(),
                            description: resource.description.clone(),
                        });
                    }
                }
                Err(e) => {
                    tracing::warn!("listing resources from MCP server {} failed: {:#}", name, e);
                }
            }
        }

        Ok(filter_resources(all, query))
    }
}

/// Keep resources whose uri, name, or description mention the query.
fn filter_resources(resources: Vec<CatalogResource>, query: &str) -> Vec<CatalogResource> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return resources;
    }

    resources
        .into_iter()
        .filter(|r| {
            r.uri.to_lowercase().contains(&needle)
                || r.name.to_lowercase().contains(&needle)
                || r.description
                    .as_deref()
                    .map(|d| d.to_lowercase().contains(&needle))
                    .unwrap_or(false)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(uri: &str, name: &str, description: Option<&str>) -> CatalogResource {
        CatalogResource {
            uri: uri.to_string(),
            name: name.to_string(),
            description: description.map(|d| d.to_string()),
        }
    }

    #[test]
    fn test_filter_resources_empty_query_keeps_all() {
        let resources = vec![
            resource("db://users", "users", None),
            resource("db://orders", "orders", None),
        ];
        assert_eq!(filter_resources(resources, "  ").len(), 2);
    }

    #[test]
    fn test_filter_resources_matches_any_field() {
        let resources = vec![
            resource("db://users", "user table", Some("production accounts")),
            resource("fs://logs", "logs", None),
        ];
        let filtered = filter_resources(resources, "Accounts");
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].uri, "db://users");
    }

    #[tokio::test]
    async fn test_empty_config_connects_nothing() {
        let catalog = McpCatalog::connect_all(&McpConfig::default()).await;
        assert_eq!(catalog.server_count(), 0);
        assert!(catalog.tools().await.unwrap().is_empty());
        assert!(catalog.resources("x").await.unwrap().is_empty());
    }
}
