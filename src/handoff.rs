use crate::db::Database;
use crate::errors::{AppError, AppResult};
use crate::memory::MemoryLog;
use crate::models::{ProjectRecord, TicketRecord};
use chrono::SecondsFormat;
use std::fs;
use std::path::PathBuf;

pub const HANDOFF_MEMORY_LIMIT: usize = 3;

const NO_CONVENTIONS: &str = "No explicit conventions.";
const NO_MEMORY: &str = "- none";
const DELIVERY_CONSTRAINTS: [&str; 3] = [
    "- Follow TDD: failing tests first, then implementation, keep tests green.",
    "- Keep changes scoped to active ticket.",
    "- Document blockers with explicit evidence.",
];

/// Builds the agent handoff document for a ticket. Section order and labels
/// are consumed verbatim downstream.
pub fn generate_handoff(db: &Database, memory: &MemoryLog, ticket_id: &str) -> AppResult<String> {
    let (ticket, project) = load_ticket_with_project(db, ticket_id)?;
    let recent = memory.list(&project.id, HANDOFF_MEMORY_LIMIT)?;

    let memory_section = if recent.is_empty() {
        NO_MEMORY.to_string()
    } else {
        recent
            .iter()
            .map(|entry| {
                format!(
                    "- {} | {}: {}",
                    entry.date,
                    entry.agent_id,
                    entry.task_summary
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };
    let rules = if project.conventions.is_empty() {
        NO_CONVENTIONS
    } else {
        project.conventions.as_str()
    };

    let sections = [
        format!("[PROJECT] {} ({})", project.name, project.id),
        format!("[RULES]\n{}", rules),
        format!("[TICKET] {} - {}", ticket.id, ticket.title),
        format!(
            "Type={} Priority={} Status={} Assignee={}",
            ticket.ticket_type.as_str(),
            ticket.priority.as_str(),
            ticket.status.as_str(),
            ticket.assignee
        ),
        "[SPEC]".to_string(),
        ticket.spec_markdown,
        "[ACCEPTANCE_CRITERIA]".to_string(),
        ticket.acceptance_criteria,
        "[TEST_PLAN]".to_string(),
        ticket.test_plan,
        "[RECENT_MEMORY]".to_string(),
        memory_section,
        "[DELIVERY_CONSTRAINTS]".to_string(),
        DELIVERY_CONSTRAINTS.join("\n\n"),
    ];
    Ok(sections.join("\n\n"))
}

/// Writes the ticket as front-matter markdown under the project's data dir
/// and returns the file path.
pub fn export_ticket_markdown(db: &Database, memory: &MemoryLog, ticket_id: &str) -> AppResult<PathBuf> {
    let (ticket, project) = load_ticket_with_project(db, ticket_id)?;

    let lines = [
        "---".to_string(),
        format!("ticketId: {}", ticket.id),
        format!("projectId: {}", ticket.project_id),
        format!("status: {}", ticket.status.as_str()),
        format!("priority: {}", ticket.priority.as_str()),
        format!("type: {}", ticket.ticket_type.as_str()),
        format!("assignee: {}", ticket.assignee),
        format!("updatedAt: {}", ticket.updated_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
        "---".to_string(),
        String::new(),
        format!("# {} - {}", ticket.id, ticket.title),
        String::new(),
        "## Specification".to_string(),
        ticket.spec_markdown.clone(),
        String::new(),
        "## Acceptance Criteria".to_string(),
        ticket.acceptance_criteria.clone(),
        String::new(),
        "## Test Plan".to_string(),
        ticket.test_plan.clone(),
    ];

    let tickets_dir = memory.project_dir(&project.id).join("tickets");
    fs::create_dir_all(&tickets_dir)?;
    let path = tickets_dir.join(format!("{}.md", ticket.id));
    fs::write(&path, lines.join("\n"))?;
    tracing::debug!(ticket_id = %ticket.id, path = %path.display(), "exported ticket markdown");
    Ok(path)
}

fn load_ticket_with_project(db: &Database, ticket_id: &str) -> AppResult<(TicketRecord, ProjectRecord)> {
    let ticket = db
        .get_ticket(ticket_id)?
        .ok_or_else(|| AppError::NotFound(format!("Ticket not found: {}", ticket_id)))?;
    let project = db
        .get_project(&ticket.project_id)?
        .ok_or_else(|| AppError::NotFound(format!("Project not found: {}", ticket.project_id)))?;
    Ok((ticket, project))
}

#[cfg(test)]
mod tests {
    use super::{export_ticket_markdown, generate_handoff};
    use crate::db::Database;
    use crate::memory::MemoryLog;
    use crate::models::{
        AppendMemoryPayload, CreateProjectPayload, CreateTicketPayload, TicketPriority, TicketStatus, TicketType,
    };
    use std::sync::Arc;

    fn setup(dir: &tempfile::TempDir, conventions: Option<&str>) -> (Arc<Database>, MemoryLog, String) {
        let db = Arc::new(Database::open(&dir.path().join("vault.sqlite")).expect("db"));
        let memory = MemoryLog::new(db.clone(), dir.path().join("data"));
        let project = db
            .create_project(CreateProjectPayload {
                name: "Handoff Project".to_string(),
                conventions: conventions.map(ToString::to_string),
                ..CreateProjectPayload::default()
            })
            .expect("project");
        let ticket = db
            .create_ticket(CreateTicketPayload {
                project_id: project.id.clone(),
                title: "Implement desktop backlog".to_string(),
                ticket_type: TicketType::Feature,
                priority: TicketPriority::P0,
                status: TicketStatus::Ready,
                assignee: "vault1-desktop-architect".to_string(),
                estimate: Some(5),
                spec_markdown: Some("Build backlog module".to_string()),
                acceptance_criteria: Some("Backlog supports filters".to_string()),
                test_plan: Some("Unit + integration tests".to_string()),
                dependencies: None,
                labels: None,
            })
            .expect("ticket");
        (db, memory, ticket.id)
    }

    fn remember(memory: &MemoryLog, project_id: &str, text: &str) {
        memory
            .append(
                project_id,
                AppendMemoryPayload {
                    agent_id: "codex-dev".to_string(),
                    task_summary: text.to_string(),
                    ..AppendMemoryPayload::default()
                },
            )
            .expect("append memory");
    }

    #[test]
    fn handoff_includes_ticket_rules_and_last_three_sessions() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (db, memory, ticket_id) = setup(&dir, Some("Always run tests before status transitions."));
        let project_id = db.get_ticket(&ticket_id).expect("get").expect("ticket").project_id;

        for text in ["old-1", "old-2", "recent-1", "recent-2"] {
            remember(&memory, &project_id, text);
        }

        let handoff = generate_handoff(&db, &memory, &ticket_id).expect("handoff");
        assert!(handoff.starts_with("[PROJECT] Handoff Project ("));
        assert!(handoff.contains("[RULES]\nAlways run tests before status transitions."));
        assert!(handoff.contains("[TICKET] HANDOFF-PROJECT-001 - Implement desktop backlog"));
        assert!(handoff.contains("Type=feature Priority=P0 Status=ready Assignee=vault1-desktop-architect"));
        assert!(handoff.contains("[SPEC]\n\nBuild backlog module"));
        assert!(handoff.contains("[TEST_PLAN]\n\nUnit + integration tests"));
        assert!(handoff.contains("| codex-dev: old-2"));
        assert!(handoff.contains("| codex-dev: recent-1"));
        assert!(handoff.contains("| codex-dev: recent-2"));
        assert!(!handoff.contains("old-1"));

        let order = ["[PROJECT]", "[RULES]", "[TICKET]", "[SPEC]", "[ACCEPTANCE_CRITERIA]", "[TEST_PLAN]", "[RECENT_MEMORY]", "[DELIVERY_CONSTRAINTS]"];
        let positions: Vec<usize> = order
            .iter()
            .map(|label| handoff.find(label).expect("section present"))
            .collect();
        assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn handoff_uses_fallbacks_without_conventions_or_memory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (db, memory, ticket_id) = setup(&dir, None);

        let handoff = generate_handoff(&db, &memory, &ticket_id).expect("handoff");
        assert!(handoff.contains("[RULES]\nNo explicit conventions."));
        assert!(handoff.contains("[RECENT_MEMORY]\n\n- none"));
        assert!(handoff.ends_with("- Document blockers with explicit evidence."));
    }

    #[test]
    fn handoff_prints_memory_dates_as_stored() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (db, memory, ticket_id) = setup(&dir, None);
        let project_id = db.get_ticket(&ticket_id).expect("get").expect("ticket").project_id;

        memory.ensure_project_dir(&project_id).expect("memory dir");
        std::fs::write(
            memory.memory_file(&project_id),
            format!(
                "{{\"session_id\":\"s-legacy\",\"date\":\"2026-02-19\",\"projectId\":\"{}\",\"agentId\":\"agent-pm\",\"task_summary\":\"legacy\"}}\n",
                project_id
            ),
        )
        .expect("seed memory");

        let handoff = generate_handoff(&db, &memory, &ticket_id).expect("handoff");
        assert!(handoff.contains("[RECENT_MEMORY]\n\n- 2026-02-19 | agent-pm: legacy"));
    }

    #[test]
    fn handoff_for_unknown_ticket_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (db, memory, _) = setup(&dir, None);
        let error = generate_handoff(&db, &memory, "NOPE-001").expect_err("missing ticket");
        assert!(error.is_not_found());
    }

    #[test]
    fn export_writes_front_matter_markdown() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (db, memory, ticket_id) = setup(&dir, None);

        let path = export_ticket_markdown(&db, &memory, &ticket_id).expect("export");
        assert!(path.ends_with("tickets/HANDOFF-PROJECT-001.md"));
        let content = std::fs::read_to_string(&path).expect("read export");
        assert!(content.starts_with("---\nticketId: HANDOFF-PROJECT-001\n"));
        assert!(content.contains("status: ready"));
        assert!(content.contains("# HANDOFF-PROJECT-001 - Implement desktop backlog"));
        assert!(content.contains("## Acceptance Criteria\nBacklog supports filters"));
    }
}
