use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TicketType {
    Story,
    Feature,
    Bug,
    Task,
    Chore,
}

impl TicketType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Story => "story",
            Self::Feature => "feature",
            Self::Bug => "bug",
            Self::Task => "task",
            Self::Chore => "chore",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "story" => Some(Self::Story),
            "feature" => Some(Self::Feature),
            "bug" => Some(Self::Bug),
            "task" => Some(Self::Task),
            "chore" => Some(Self::Chore),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TicketPriority {
    P0,
    P1,
    P2,
    P3,
}

impl TicketPriority {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::P0 => "P0",
            Self::P1 => "P1",
            Self::P2 => "P2",
            Self::P3 => "P3",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "P0" => Some(Self::P0),
            "P1" => Some(Self::P1),
            "P2" => Some(Self::P2),
            "P3" => Some(Self::P3),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TicketStatus {
    Backlog,
    ToQualify,
    Ready,
    InProgress,
    InReview,
    Blocked,
    AskBoss,
    Done,
}

impl TicketStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Backlog => "backlog",
            Self::ToQualify => "to-qualify",
            Self::Ready => "ready",
            Self::InProgress => "in-progress",
            Self::InReview => "in-review",
            Self::Blocked => "blocked",
            Self::AskBoss => "ask-boss",
            Self::Done => "done",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "backlog" => Some(Self::Backlog),
            "to-qualify" => Some(Self::ToQualify),
            "ready" => Some(Self::Ready),
            "in-progress" => Some(Self::InProgress),
            "in-review" => Some(Self::InReview),
            "blocked" => Some(Self::Blocked),
            "ask-boss" => Some(Self::AskBoss),
            "done" => Some(Self::Done),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub repo_path: String,
    #[serde(default)]
    pub figma_link: String,
    #[serde(default)]
    pub conventions: String,
    #[serde(default)]
    pub agents_configuration: String,
    #[serde(default)]
    pub is_archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketRecord {
    pub id: String,
    pub project_id: String,
    #[serde(default)]
    pub sequence: i64,
    pub title: String,
    #[serde(rename = "type")]
    pub ticket_type: TicketType,
    pub priority: TicketPriority,
    pub status: TicketStatus,
    #[serde(default)]
    pub assignee: String,
    #[serde(default)]
    pub estimate: u32,
    #[serde(default)]
    pub spec_markdown: String,
    #[serde(default)]
    pub acceptance_criteria: String,
    #[serde(default)]
    pub test_plan: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRecord {
    pub id: String,
    pub project_id: String,
    pub agent_id: String,
    pub display_name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub personality: String,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub rules: Vec<String>,
    #[serde(default)]
    pub default_prompt: String,
    #[serde(default)]
    pub avatar_url: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub project_id: String,
    pub agent_id: String,
    pub author: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// One line of a project's session log.
///
/// Field names follow the on-disk JSON exactly, so the snake-case summary
/// fields and the camel-case ownership fields are mixed on purpose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub session_id: String,
    /// RFC 3339 with millisecond precision when written locally; remote or
    /// older entries are carried verbatim.
    pub date: String,
    #[serde(rename = "projectId")]
    pub project_id: String,
    #[serde(rename = "agentId")]
    pub agent_id: String,
    pub task_summary: String,
    #[serde(default)]
    pub successes: Vec<String>,
    #[serde(default)]
    pub failures: Vec<String>,
    #[serde(default)]
    pub user_preferences: Vec<String>,
    #[serde(default)]
    pub user_frustrations: Vec<String>,
    #[serde(default)]
    pub decisions_taken: Vec<String>,
    #[serde(default)]
    pub lessons_learned: Vec<String>,
    #[serde(default)]
    pub files_changed: Vec<String>,
    #[serde(default)]
    pub commands_run: Vec<String>,
    #[serde(default)]
    pub next_session_focus: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectPayload {
    pub name: String,
    pub description: Option<String>,
    pub repo_path: Option<String>,
    pub figma_link: Option<String>,
    pub conventions: Option<String>,
    pub agents_configuration: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTicketPayload {
    pub project_id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub ticket_type: TicketType,
    pub priority: TicketPriority,
    pub status: TicketStatus,
    #[serde(default)]
    pub assignee: String,
    pub estimate: Option<u32>,
    pub spec_markdown: Option<String>,
    pub acceptance_criteria: Option<String>,
    pub test_plan: Option<String>,
    pub dependencies: Option<Vec<String>>,
    pub labels: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertAgentPayload {
    pub project_id: String,
    pub agent_id: String,
    pub display_name: String,
    pub role: Option<String>,
    pub personality: Option<String>,
    pub skills: Option<Vec<String>>,
    pub rules: Option<Vec<String>>,
    pub default_prompt: Option<String>,
    pub avatar_url: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpsertOutcome {
    Created,
    Updated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentUpsert {
    pub outcome: UpsertOutcome,
    pub agent: AgentRecord,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendChatMessagePayload {
    pub project_id: String,
    pub agent_id: String,
    pub author: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppendMemoryPayload {
    #[serde(rename = "agentId")]
    pub agent_id: String,
    pub task_summary: String,
    pub successes: Option<Vec<String>>,
    pub failures: Option<Vec<String>>,
    pub user_preferences: Option<Vec<String>>,
    pub user_frustrations: Option<Vec<String>>,
    pub decisions_taken: Option<Vec<String>>,
    pub lessons_learned: Option<Vec<String>>,
    pub files_changed: Option<Vec<String>>,
    pub commands_run: Option<Vec<String>>,
    pub next_session_focus: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportProjectFromPathPayload {
    pub name: String,
    pub repo_path: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteProjectSnapshot {
    pub project: ProjectRecord,
    pub agents: Vec<AgentRecord>,
    pub tickets: Vec<TicketRecord>,
    pub memory: Vec<MemoryEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportAgentPayload {
    pub base_url: String,
    pub source_project_id: String,
    pub source_agent_id: String,
    pub target_project_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportTicketPayload {
    pub base_url: String,
    pub source_project_id: String,
    pub source_ticket_id: String,
    pub target_project_id: String,
}

fn default_true() -> bool {
    true
}
