use super::{BridgeClient, RequestOptions};
use crate::db::Database;
use crate::errors::{AppError, AppResult};
use crate::models::{
    AgentUpsert, CreateTicketPayload, ImportAgentPayload, ImportTicketPayload, TicketRecord, UpsertAgentPayload,
};

/// Label carried by every ticket copied in from the remote vault.
pub const SHARED_LABEL: &str = "shared-from-vault0";

/// Copies a remote agent into a local project. Keyed on the remote
/// `agentId`, so importing the same agent again updates it in place.
pub async fn import_agent_from_remote(
    db: &Database,
    client: &BridgeClient,
    payload: ImportAgentPayload,
    options: &RequestOptions,
) -> AppResult<AgentUpsert> {
    ensure_target_project(db, &payload.target_project_id)?;

    let agents = client
        .list_remote_agents(&payload.base_url, &payload.source_project_id, options)
        .await?;
    let source = agents
        .into_iter()
        .find(|agent| agent.id == payload.source_agent_id || agent.agent_id == payload.source_agent_id)
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "Source agent not found in VAULT_0: {} (project {})",
                payload.source_agent_id, payload.source_project_id
            ))
        })?;

    let imported = db.upsert_agent(UpsertAgentPayload {
        project_id: payload.target_project_id.clone(),
        agent_id: source.agent_id,
        display_name: source.display_name,
        role: Some(source.role),
        personality: Some(source.personality),
        skills: Some(source.skills),
        rules: Some(source.rules),
        default_prompt: Some(source.default_prompt),
        avatar_url: Some(source.avatar_url),
        is_active: Some(source.is_active),
    })?;
    tracing::info!(
        target_project_id = %payload.target_project_id,
        agent_id = %imported.agent.agent_id,
        outcome = ?imported.outcome,
        "imported agent from remote vault"
    );
    Ok(imported)
}

/// Copies a remote ticket into a local project as a brand new ticket. Not
/// idempotent: every import allocates a fresh local sequence.
pub async fn import_ticket_from_remote(
    db: &Database,
    client: &BridgeClient,
    payload: ImportTicketPayload,
    options: &RequestOptions,
) -> AppResult<TicketRecord> {
    ensure_target_project(db, &payload.target_project_id)?;

    let tickets = client
        .list_remote_tickets(&payload.base_url, &payload.source_project_id, options)
        .await?;
    let source = tickets
        .into_iter()
        .find(|ticket| ticket.id == payload.source_ticket_id)
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "Source ticket not found in VAULT_0: {} (project {})",
                payload.source_ticket_id, payload.source_project_id
            ))
        })?;

    let spec_markdown = format!(
        "VAULT_0 source ticket: {} (project {})\n\n{}",
        source.id, source.project_id, source.spec_markdown
    );
    let labels = merge_labels(source.labels, SHARED_LABEL);

    let ticket = db.create_ticket(CreateTicketPayload {
        project_id: payload.target_project_id,
        title: source.title,
        ticket_type: source.ticket_type,
        priority: source.priority,
        status: source.status,
        assignee: source.assignee,
        estimate: Some(source.estimate),
        spec_markdown: Some(spec_markdown),
        acceptance_criteria: Some(source.acceptance_criteria),
        test_plan: Some(source.test_plan),
        dependencies: Some(source.dependencies),
        labels: Some(labels),
    })?;
    tracing::info!(
        ticket_id = %ticket.id,
        source_ticket_id = %source.id,
        "imported ticket from remote vault"
    );
    Ok(ticket)
}

fn ensure_target_project(db: &Database, project_id: &str) -> AppResult<()> {
    match db.get_project(project_id)? {
        Some(_) => Ok(()),
        None => Err(AppError::NotFound(format!("Target project not found: {}", project_id))),
    }
}

/// Set union that keeps first-seen order.
fn merge_labels(labels: Vec<String>, extra: &str) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(labels.len() + 1);
    for label in labels.into_iter().chain(std::iter::once(extra.to_string())) {
        if !merged.contains(&label) {
            merged.push(label);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::{merge_labels, SHARED_LABEL};

    #[test]
    fn shared_label_is_added_once() {
        assert_eq!(
            merge_labels(vec!["shared".to_string(), "shared".to_string()], SHARED_LABEL),
            vec!["shared", SHARED_LABEL]
        );
        assert_eq!(
            merge_labels(vec![SHARED_LABEL.to_string(), "ui".to_string()], SHARED_LABEL),
            vec![SHARED_LABEL, "ui"]
        );
    }
}
