use crate::errors::{AppError, AppResult};
use crate::models::{
    AgentRecord, AgentUpsert, ChatMessage, CreateProjectPayload, CreateTicketPayload, ProjectRecord,
    SendChatMessagePayload, TicketPriority, TicketRecord, TicketStatus, TicketType, UpsertAgentPayload, UpsertOutcome,
};
use chrono::{DateTime, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

const SCHEMA_SQL: &str = include_str!("schema.sql");

const PROJECT_COLUMNS: &str = "id, name, description, repoPath, figmaLink, conventions, agentsConfiguration, isArchived, createdAt, updatedAt";
const TICKET_COLUMNS: &str = "id, projectId, sequence, title, type, priority, status, assignee, estimate, specMarkdown, acceptanceCriteria, testPlan, dependencies, labels, createdAt, updatedAt";
const AGENT_COLUMNS: &str = "id, projectId, agentId, displayName, role, personality, skills, rules, defaultPrompt, avatarUrl, isActive, createdAt, updatedAt";
const CHAT_COLUMNS: &str = "id, projectId, agentId, author, content, createdAt";

static NON_ALPHANUMERIC_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Z0-9]+").expect("valid regex"));

/// The single store handle. One per process, opened at startup and closed
/// explicitly with [`Database::close`].
#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl Database {
    pub fn open(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let journal_mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        if !journal_mode.eq_ignore_ascii_case("wal") {
            tracing::warn!(path = %path.display(), journal_mode = %journal_mode, "store is not running in WAL mode");
        }
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA_SQL)?;

        tracing::debug!(path = %path.display(), "opened vault store");
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    pub fn close(self) -> AppResult<()> {
        let conn = self
            .conn
            .into_inner()
            .map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        conn.close().map_err(|(_, error)| AppError::from(error))?;
        tracing::debug!(path = %self.db_path.display(), "closed vault store");
        Ok(())
    }

    pub fn create_project(&self, payload: CreateProjectPayload) -> AppResult<ProjectRecord> {
        let id = Uuid::new_v4().to_string();
        let now = format_time(Utc::now());

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO projects (
               id, name, description, repoPath, figmaLink, conventions, agentsConfiguration, isArchived, createdAt, updatedAt
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, ?9)",
            params![
                id,
                payload.name.trim(),
                trimmed_or_empty(payload.description.as_deref()),
                trimmed_or_empty(payload.repo_path.as_deref()),
                trimmed_or_empty(payload.figma_link.as_deref()),
                trimmed_or_empty(payload.conventions.as_deref()),
                trimmed_or_empty(payload.agents_configuration.as_deref()),
                now,
                now,
            ],
        )?;

        for agent in default_agents(&id) {
            upsert_agent_in(&tx, agent)?;
        }

        let project = select_project(&tx, &id)?
            .ok_or_else(|| AppError::Internal(format!("Failed to create project {}", id)))?;
        tx.commit()?;

        tracing::info!(project_id = %project.id, name = %project.name, "created project");
        Ok(project)
    }

    pub fn list_projects(&self, include_archived: bool) -> AppResult<Vec<ProjectRecord>> {
        let conn = self.lock()?;
        let sql = if include_archived {
            format!("SELECT {} FROM projects ORDER BY updatedAt DESC, id DESC", PROJECT_COLUMNS)
        } else {
            format!(
                "SELECT {} FROM projects WHERE isArchived = 0 ORDER BY updatedAt DESC, id DESC",
                PROJECT_COLUMNS
            )
        };
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], parse_project_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn get_project(&self, project_id: &str) -> AppResult<Option<ProjectRecord>> {
        let conn = self.lock()?;
        select_project(&conn, project_id)
    }

    pub fn set_project_archive_state(&self, project_id: &str, archived: bool) -> AppResult<ProjectRecord> {
        let now = format_time(Utc::now());
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE projects SET isArchived = ?1, updatedAt = ?2 WHERE id = ?3",
            params![archived as i32, now, project_id],
        )?;
        if changed == 0 {
            return Err(AppError::NotFound(format!("Project not found: {}", project_id)));
        }
        select_project(&conn, project_id)?
            .ok_or_else(|| AppError::NotFound(format!("Project not found: {}", project_id)))
    }

    pub fn create_ticket(&self, payload: CreateTicketPayload) -> AppResult<TicketRecord> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let project = select_project(&tx, &payload.project_id)?
            .ok_or_else(|| AppError::NotFound(format!("Project not found: {}", payload.project_id)))?;

        let next_sequence: i64 = tx.query_row(
            "SELECT COALESCE(MAX(sequence), 0) + 1 FROM tickets WHERE projectId = ?1",
            [&project.id],
            |row| row.get(0),
        )?;
        let slug = normalize_project_slug(&project.name);
        warn_on_slug_collision(&tx, &project, &slug)?;

        let ticket_id = format!("{}-{:03}", slug, next_sequence);
        let now = format_time(Utc::now());
        tx.execute(
            "INSERT INTO tickets (
               id, projectId, sequence, title, type, priority, status, assignee, estimate, specMarkdown,
               acceptanceCriteria, testPlan, dependencies, labels, createdAt, updatedAt
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                ticket_id,
                project.id,
                next_sequence,
                payload.title.trim(),
                payload.ticket_type.as_str(),
                payload.priority.as_str(),
                payload.status.as_str(),
                payload.assignee.trim(),
                i64::from(payload.estimate.unwrap_or(0)),
                payload.spec_markdown.unwrap_or_default(),
                payload.acceptance_criteria.unwrap_or_default(),
                payload.test_plan.unwrap_or_default(),
                encode_string_array(payload.dependencies.as_deref())?,
                encode_string_array(payload.labels.as_deref())?,
                now,
                now,
            ],
        )?;

        let ticket = select_ticket(&tx, &ticket_id)?
            .ok_or_else(|| AppError::Internal(format!("Failed to create ticket {}", ticket_id)))?;
        tx.commit()?;
        Ok(ticket)
    }

    pub fn get_ticket(&self, ticket_id: &str) -> AppResult<Option<TicketRecord>> {
        let conn = self.lock()?;
        select_ticket(&conn, ticket_id)
    }

    pub fn list_tickets(&self, project_id: &str) -> AppResult<Vec<TicketRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM tickets WHERE projectId = ?1 ORDER BY updatedAt DESC, id DESC",
            TICKET_COLUMNS
        ))?;
        let rows = stmt.query_map([project_id], parse_ticket_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn update_ticket_status(&self, ticket_id: &str, status: TicketStatus) -> AppResult<TicketRecord> {
        let now = format_time(Utc::now());
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE tickets SET status = ?1, updatedAt = ?2 WHERE id = ?3",
            params![status.as_str(), now, ticket_id],
        )?;
        if changed == 0 {
            return Err(AppError::NotFound(format!("Ticket not found: {}", ticket_id)));
        }
        select_ticket(&conn, ticket_id)?
            .ok_or_else(|| AppError::NotFound(format!("Ticket not found: {}", ticket_id)))
    }

    pub fn upsert_agent(&self, payload: UpsertAgentPayload) -> AppResult<AgentUpsert> {
        let conn = self.lock()?;
        upsert_agent_in(&conn, payload)
    }

    pub fn list_agents(&self, project_id: &str, include_inactive: bool) -> AppResult<Vec<AgentRecord>> {
        let conn = self.lock()?;
        let sql = if include_inactive {
            format!(
                "SELECT {} FROM agents WHERE projectId = ?1 ORDER BY isActive DESC, displayName ASC",
                AGENT_COLUMNS
            )
        } else {
            format!(
                "SELECT {} FROM agents WHERE projectId = ?1 AND isActive = 1 ORDER BY displayName ASC",
                AGENT_COLUMNS
            )
        };
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([project_id], parse_agent_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn send_chat_message(&self, payload: SendChatMessagePayload) -> AppResult<ChatMessage> {
        let conn = self.lock()?;
        if select_project(&conn, &payload.project_id)?.is_none() {
            return Err(AppError::NotFound(format!("Project not found: {}", payload.project_id)));
        }

        let message = ChatMessage {
            id: Uuid::new_v4().to_string(),
            project_id: payload.project_id,
            agent_id: payload.agent_id,
            author: payload.author,
            content: payload.content.trim().to_string(),
            created_at: Utc::now(),
        };
        conn.execute(
            "INSERT INTO chat_messages (id, projectId, agentId, author, content, createdAt)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                message.id,
                message.project_id,
                message.agent_id,
                message.author,
                message.content,
                format_time(message.created_at),
            ],
        )?;
        Ok(message)
    }

    pub fn list_chat_messages(&self, project_id: &str, agent_id: Option<&str>) -> AppResult<Vec<ChatMessage>> {
        let conn = self.lock()?;
        let messages = match agent_id {
            Some(agent_id) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM chat_messages WHERE projectId = ?1 AND agentId = ?2 ORDER BY createdAt ASC, rowid ASC",
                    CHAT_COLUMNS
                ))?;
                let rows = stmt.query_map(params![project_id, agent_id], parse_chat_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM chat_messages WHERE projectId = ?1 ORDER BY createdAt ASC, rowid ASC",
                    CHAT_COLUMNS
                ))?;
                let rows = stmt.query_map([project_id], parse_chat_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
        };
        Ok(messages)
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Internal("database mutex poisoned".to_string()))
    }
}

/// Ticket-id prefix: uppercased, non-alphanumeric runs collapsed to `-`,
/// edges stripped, `PROJECT` when nothing survives.
pub fn normalize_project_slug(project_name: &str) -> String {
    let upper = project_name.trim().to_uppercase();
    let collapsed = NON_ALPHANUMERIC_RUN.replace_all(&upper, "-");
    let slug = collapsed.trim_matches('-');
    if slug.is_empty() {
        "PROJECT".to_string()
    } else {
        slug.to_string()
    }
}

fn upsert_agent_in(conn: &Connection, payload: UpsertAgentPayload) -> AppResult<AgentUpsert> {
    let now = format_time(Utc::now());
    let agent_id = payload.agent_id.trim();
    let is_active = payload.is_active != Some(false);

    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM agents WHERE projectId = ?1 AND agentId = ?2",
            params![payload.project_id, agent_id],
            |row| row.get(0),
        )
        .optional()?;

    let (row_id, outcome) = match existing {
        Some(row_id) => {
            conn.execute(
                "UPDATE agents
                 SET displayName = ?1, role = ?2, personality = ?3, skills = ?4, rules = ?5,
                     defaultPrompt = ?6, avatarUrl = ?7, isActive = ?8, updatedAt = ?9
                 WHERE id = ?10",
                params![
                    payload.display_name.trim(),
                    payload.role.unwrap_or_default(),
                    payload.personality.unwrap_or_default(),
                    encode_string_array(payload.skills.as_deref())?,
                    encode_string_array(payload.rules.as_deref())?,
                    payload.default_prompt.unwrap_or_default(),
                    payload.avatar_url.unwrap_or_default(),
                    is_active as i32,
                    now,
                    row_id,
                ],
            )?;
            (row_id, UpsertOutcome::Updated)
        }
        None => {
            let row_id = Uuid::new_v4().to_string();
            conn.execute(
                "INSERT INTO agents (
                   id, projectId, agentId, displayName, role, personality, skills, rules, defaultPrompt,
                   avatarUrl, isActive, createdAt, updatedAt
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    row_id,
                    payload.project_id,
                    agent_id,
                    payload.display_name.trim(),
                    payload.role.unwrap_or_default(),
                    payload.personality.unwrap_or_default(),
                    encode_string_array(payload.skills.as_deref())?,
                    encode_string_array(payload.rules.as_deref())?,
                    payload.default_prompt.unwrap_or_default(),
                    payload.avatar_url.unwrap_or_default(),
                    is_active as i32,
                    now,
                    now,
                ],
            )?;
            (row_id, UpsertOutcome::Created)
        }
    };

    let agent = conn.query_row(
        &format!("SELECT {} FROM agents WHERE id = ?1", AGENT_COLUMNS),
        [&row_id],
        parse_agent_row,
    )?;
    Ok(AgentUpsert { outcome, agent })
}

fn default_agents(project_id: &str) -> [UpsertAgentPayload; 2] {
    [
        UpsertAgentPayload {
            project_id: project_id.to_string(),
            agent_id: "codex-dev".to_string(),
            display_name: "Codex Dev".to_string(),
            role: Some("developer".to_string()),
            personality: Some("direct, pragmatic, rigorous".to_string()),
            skills: Some(to_strings(&["typescript", "testing", "debugging", "delivery"])),
            rules: Some(to_strings(&[
                "Read project docs before coding.",
                "Follow strict TDD.",
                "Keep scope aligned with assigned ticket.",
            ])),
            default_prompt: Some(default_agent_prompt("Codex Dev")),
            avatar_url: None,
            is_active: None,
        },
        UpsertAgentPayload {
            project_id: project_id.to_string(),
            agent_id: "agent-pm".to_string(),
            display_name: "Agent PM".to_string(),
            role: Some("project manager".to_string()),
            personality: Some("structured, execution-focused".to_string()),
            skills: Some(to_strings(&["ticketing", "prioritization", "spec-writing"])),
            rules: Some(to_strings(&[
                "Write executable tickets.",
                "Always include acceptance criteria and test plan.",
            ])),
            default_prompt: Some(default_agent_prompt("Agent PM")),
            avatar_url: None,
            is_active: None,
        },
    ]
}

fn default_agent_prompt(display_name: &str) -> String {
    format!(
        "{}: execute tickets with strict TDD, local-first architecture, and deterministic delivery.",
        display_name
    )
}

fn warn_on_slug_collision(conn: &Connection, project: &ProjectRecord, slug: &str) -> AppResult<()> {
    let mut stmt = conn.prepare("SELECT id, name FROM projects WHERE id != ?1")?;
    let rows = stmt.query_map([&project.id], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
    for row in rows {
        let (other_id, other_name) = row?;
        if normalize_project_slug(&other_name) == slug {
            tracing::warn!(
                project_id = %project.id,
                other_project_id = %other_id,
                slug = %slug,
                "ticket id prefix is shared with another project"
            );
        }
    }
    Ok(())
}

fn select_project(conn: &Connection, project_id: &str) -> AppResult<Option<ProjectRecord>> {
    conn.query_row(
        &format!("SELECT {} FROM projects WHERE id = ?1", PROJECT_COLUMNS),
        [project_id],
        parse_project_row,
    )
    .optional()
    .map_err(AppError::from)
}

fn select_ticket(conn: &Connection, ticket_id: &str) -> AppResult<Option<TicketRecord>> {
    conn.query_row(
        &format!("SELECT {} FROM tickets WHERE id = ?1", TICKET_COLUMNS),
        [ticket_id],
        parse_ticket_row,
    )
    .optional()
    .map_err(AppError::from)
}

fn parse_project_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProjectRecord> {
    Ok(ProjectRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        repo_path: row.get(3)?,
        figma_link: row.get(4)?,
        conventions: row.get(5)?,
        agents_configuration: row.get(6)?,
        is_archived: row.get::<_, i32>(7)? != 0,
        created_at: parse_time(&row.get::<_, String>(8)?)?,
        updated_at: parse_time(&row.get::<_, String>(9)?)?,
    })
}

fn parse_ticket_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TicketRecord> {
    Ok(TicketRecord {
        id: row.get(0)?,
        project_id: row.get(1)?,
        sequence: row.get(2)?,
        title: row.get(3)?,
        ticket_type: parse_column(4, &row.get::<_, String>(4)?, TicketType::parse)?,
        priority: parse_column(5, &row.get::<_, String>(5)?, TicketPriority::parse)?,
        status: parse_column(6, &row.get::<_, String>(6)?, TicketStatus::parse)?,
        assignee: row.get(7)?,
        estimate: u32::try_from(row.get::<_, i64>(8)?).unwrap_or_default(),
        spec_markdown: row.get(9)?,
        acceptance_criteria: row.get(10)?,
        test_plan: row.get(11)?,
        dependencies: decode_string_array(&row.get::<_, String>(12)?),
        labels: decode_string_array(&row.get::<_, String>(13)?),
        created_at: parse_time(&row.get::<_, String>(14)?)?,
        updated_at: parse_time(&row.get::<_, String>(15)?)?,
    })
}

fn parse_agent_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AgentRecord> {
    Ok(AgentRecord {
        id: row.get(0)?,
        project_id: row.get(1)?,
        agent_id: row.get(2)?,
        display_name: row.get(3)?,
        role: row.get(4)?,
        personality: row.get(5)?,
        skills: decode_string_array(&row.get::<_, String>(6)?),
        rules: decode_string_array(&row.get::<_, String>(7)?),
        default_prompt: row.get(8)?,
        avatar_url: row.get(9)?,
        is_active: row.get::<_, i32>(10)? != 0,
        created_at: parse_time(&row.get::<_, String>(11)?)?,
        updated_at: parse_time(&row.get::<_, String>(12)?)?,
    })
}

fn parse_chat_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatMessage> {
    Ok(ChatMessage {
        id: row.get(0)?,
        project_id: row.get(1)?,
        agent_id: row.get(2)?,
        author: row.get(3)?,
        content: row.get(4)?,
        created_at: parse_time(&row.get::<_, String>(5)?)?,
    })
}

fn parse_column<T>(index: usize, raw: &str, parse: fn(&str) -> Option<T>) -> rusqlite::Result<T> {
    parse(raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            index,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Unknown value '{}'", raw),
            )),
        )
    })
}

/// Lenient decode for the JSON-array text columns: anything that is not a
/// JSON array reads as empty, and non-string elements are dropped.
pub(crate) fn decode_string_array(raw: &str) -> Vec<String> {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Array(values)) => values
            .into_iter()
            .filter_map(|value| match value {
                serde_json::Value::String(value) => Some(value),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn encode_string_array(values: Option<&[String]>) -> AppResult<String> {
    let normalized: Vec<&str> = values
        .unwrap_or_default()
        .iter()
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .collect();
    Ok(serde_json::to_string(&normalized)?)
}

fn trimmed_or_empty(value: Option<&str>) -> String {
    value.map(str::trim).unwrap_or_default().to_string()
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(ToString::to_string).collect()
}

/// Fixed-width RFC 3339 so that `ORDER BY updatedAt` sorts chronologically.
fn format_time(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_time(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, error.to_string())),
            )
        })
}
