use super::{BridgeClient, RequestOptions};
use crate::errors::{AppError, AppResult};
use crate::models::RemoteProjectSnapshot;
use futures::future::try_join_all;

pub const OVERVIEW_MEMORY_LIMIT: usize = 20;

/// Snapshot of every remote project with its agents, tickets and recent
/// memory. Per-project calls and projects themselves are fetched
/// concurrently; the first failure fails the whole overview and drops the
/// calls still pending.
pub async fn remote_overview(
    client: &BridgeClient,
    base_url: &str,
    options: &RequestOptions,
) -> AppResult<Vec<RemoteProjectSnapshot>> {
    let projects = client.list_remote_projects(base_url, options).await?;
    tracing::debug!(count = projects.len(), "fetched remote projects");

    let snapshots = projects.into_iter().map(|project| async move {
        let (agents, tickets, memory) = tokio::try_join!(
            client.list_remote_agents(base_url, &project.id, options),
            client.list_remote_tickets(base_url, &project.id, options),
            client.list_remote_memory(base_url, &project.id, OVERVIEW_MEMORY_LIMIT, options),
        )?;
        Ok::<_, AppError>(RemoteProjectSnapshot {
            project,
            agents,
            tickets,
            memory,
        })
    });

    try_join_all(snapshots).await
}
