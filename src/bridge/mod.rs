//! Read-only client for a remote vault instance ("VAULT_0") plus the
//! aggregation and import paths built on it.

mod client;
mod import;
mod overview;

pub use client::{
    normalize_base_url, BridgeClient, BridgeTransport, ReqwestTransport, RequestOptions, TransportFailure,
    TransportResponse,
};
pub use import::{import_agent_from_remote, import_ticket_from_remote, SHARED_LABEL};
pub use overview::{remote_overview, OVERVIEW_MEMORY_LIMIT};

use crate::errors::{AppError, AppResult};
use crate::models::{AgentRecord, MemoryEntry, ProjectRecord, TicketRecord};
use once_cell::sync::Lazy;
use reqwest::Url;
use serde::Deserialize;

static ROUTE_BASE: Lazy<Url> = Lazy::new(|| Url::parse("http://bridge.local").expect("valid base url"));

#[derive(Debug, Deserialize)]
struct ProjectsEnvelope {
    #[serde(default)]
    projects: Vec<ProjectRecord>,
}

#[derive(Debug, Deserialize)]
struct AgentsEnvelope {
    #[serde(default)]
    agents: Vec<AgentRecord>,
}

#[derive(Debug, Deserialize)]
struct TicketsEnvelope {
    #[serde(default)]
    tickets: Vec<TicketRecord>,
}

#[derive(Debug, Deserialize)]
struct MemoryEnvelope {
    #[serde(default)]
    entries: Vec<MemoryEntry>,
}

impl BridgeClient {
    pub async fn list_remote_projects(&self, base_url: &str, options: &RequestOptions) -> AppResult<Vec<ProjectRecord>> {
        let envelope: ProjectsEnvelope = self.request_json(base_url, "/api/projects", options).await?;
        Ok(envelope.projects)
    }

    pub async fn list_remote_agents(
        &self,
        base_url: &str,
        project_id: &str,
        options: &RequestOptions,
    ) -> AppResult<Vec<AgentRecord>> {
        let route = route_with_query("/api/agents", &[("projectId", project_id), ("includeInactive", "true")])?;
        let envelope: AgentsEnvelope = self.request_json(base_url, &route, options).await?;
        Ok(envelope.agents)
    }

    pub async fn list_remote_tickets(
        &self,
        base_url: &str,
        project_id: &str,
        options: &RequestOptions,
    ) -> AppResult<Vec<TicketRecord>> {
        let route = route_with_query("/api/tickets", &[("projectId", project_id)])?;
        let envelope: TicketsEnvelope = self.request_json(base_url, &route, options).await?;
        Ok(envelope.tickets)
    }

    pub async fn list_remote_memory(
        &self,
        base_url: &str,
        project_id: &str,
        limit: usize,
        options: &RequestOptions,
    ) -> AppResult<Vec<MemoryEntry>> {
        let limit = limit.to_string();
        let route = route_with_query("/api/memory", &[("projectId", project_id), ("limit", limit.as_str())])?;
        let envelope: MemoryEnvelope = self.request_json(base_url, &route, options).await?;
        Ok(envelope.entries)
    }
}

/// `path?k=v&...` with form-encoded values.
fn route_with_query(path: &str, pairs: &[(&str, &str)]) -> AppResult<String> {
    let mut url = ROUTE_BASE.join(path).map_err(|error| AppError::UpstreamUnknown {
        route: path.to_string(),
        message: error.to_string(),
        retryable: false,
    })?;
    url.query_pairs_mut().extend_pairs(pairs.iter().copied());
    Ok(match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    })
}
