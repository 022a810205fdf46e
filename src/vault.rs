use crate::bridge::{self, BridgeClient, RequestOptions};
use crate::config::VaultConfig;
use crate::db::Database;
use crate::errors::{AppError, AppResult};
use crate::handoff;
use crate::memory::MemoryLog;
use crate::models::{
    AgentRecord, AgentUpsert, AppendMemoryPayload, ChatMessage, CreateProjectPayload, CreateTicketPayload,
    ImportAgentPayload, ImportProjectFromPathPayload, ImportTicketPayload, MemoryEntry, ProjectRecord,
    RemoteProjectSnapshot, SendChatMessagePayload, TicketRecord, TicketStatus, UpsertAgentPayload,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Owns the store handle and wires it into the memory log, handoff
/// composer and bridge. One per process.
pub struct VaultCore {
    db: Arc<Database>,
    memory: MemoryLog,
    bridge: BridgeClient,
    config: VaultConfig,
}

impl VaultCore {
    pub fn open(config: VaultConfig) -> AppResult<Self> {
        let bridge = BridgeClient::new(&config.bridge)?;
        Self::open_with_bridge(config, bridge)
    }

    /// Same as [`VaultCore::open`] with a caller-supplied bridge client.
    pub fn open_with_bridge(config: VaultConfig, bridge: BridgeClient) -> AppResult<Self> {
        fs::create_dir_all(&config.data_root)?;
        let db = Arc::new(Database::open(&config.db_path)?);
        let memory = MemoryLog::new(db.clone(), config.data_root.clone());
        tracing::info!(
            db_path = %config.db_path.display(),
            data_root = %config.data_root.display(),
            "vault opened"
        );
        Ok(Self {
            db,
            memory,
            bridge,
            config,
        })
    }

    /// Releases the store handle. Fails if a clone of the handle escaped.
    pub fn close(self) -> AppResult<()> {
        let Self { db, memory, .. } = self;
        drop(memory);
        let db = Arc::try_unwrap(db)
            .map_err(|_| AppError::Internal("database handle is still shared; cannot close".to_string()))?;
        db.close()?;
        tracing::info!("vault closed");
        Ok(())
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn memory(&self) -> &MemoryLog {
        &self.memory
    }

    pub fn create_project(&self, payload: CreateProjectPayload) -> AppResult<ProjectRecord> {
        let project = self.db.create_project(payload)?;
        self.memory.ensure_project_dir(&project.id)?;
        tracing::info!(project_id = %project.id, name = %project.name, "project created");
        Ok(project)
    }

    /// Registers an existing local git checkout as a project.
    pub fn import_project_from_path(&self, payload: ImportProjectFromPathPayload) -> AppResult<ProjectRecord> {
        let repo_path = resolve_repo_path(&payload.repo_path)?;
        self.create_project(CreateProjectPayload {
            name: payload.name,
            description: payload.description,
            repo_path: Some(repo_path.to_string_lossy().into_owned()),
            ..CreateProjectPayload::default()
        })
    }

    pub fn list_projects(&self, include_archived: bool) -> AppResult<Vec<ProjectRecord>> {
        self.db.list_projects(include_archived)
    }

    pub fn get_project(&self, project_id: &str) -> AppResult<Option<ProjectRecord>> {
        self.db.get_project(project_id)
    }

    pub fn set_project_archive_state(&self, project_id: &str, archived: bool) -> AppResult<ProjectRecord> {
        self.db.set_project_archive_state(project_id, archived)
    }

    pub fn create_ticket(&self, payload: CreateTicketPayload) -> AppResult<TicketRecord> {
        self.db.create_ticket(payload)
    }

    pub fn get_ticket(&self, ticket_id: &str) -> AppResult<Option<TicketRecord>> {
        self.db.get_ticket(ticket_id)
    }

    pub fn list_tickets(&self, project_id: &str) -> AppResult<Vec<TicketRecord>> {
        self.db.list_tickets(project_id)
    }

    pub fn update_ticket_status(&self, ticket_id: &str, status: TicketStatus) -> AppResult<TicketRecord> {
        self.db.update_ticket_status(ticket_id, status)
    }

    pub fn upsert_agent(&self, payload: UpsertAgentPayload) -> AppResult<AgentUpsert> {
        self.db.upsert_agent(payload)
    }

    pub fn list_agents(&self, project_id: &str, include_inactive: bool) -> AppResult<Vec<AgentRecord>> {
        self.db.list_agents(project_id, include_inactive)
    }

    pub fn send_chat_message(&self, payload: SendChatMessagePayload) -> AppResult<ChatMessage> {
        self.db.send_chat_message(payload)
    }

    pub fn list_chat_messages(&self, project_id: &str, agent_id: Option<&str>) -> AppResult<Vec<ChatMessage>> {
        self.db.list_chat_messages(project_id, agent_id)
    }

    pub fn append_memory(&self, project_id: &str, payload: AppendMemoryPayload) -> AppResult<MemoryEntry> {
        self.memory.append(project_id, payload)
    }

    pub fn list_memory(&self, project_id: &str, limit: usize) -> AppResult<Vec<MemoryEntry>> {
        self.memory.list(project_id, limit)
    }

    pub fn generate_handoff(&self, ticket_id: &str) -> AppResult<String> {
        handoff::generate_handoff(&self.db, &self.memory, ticket_id)
    }

    pub fn export_ticket_markdown(&self, ticket_id: &str) -> AppResult<PathBuf> {
        handoff::export_ticket_markdown(&self.db, &self.memory, ticket_id)
    }

    /// Remote snapshot; `base_url` falls back to the configured bridge URL.
    pub async fn remote_overview(
        &self,
        base_url: Option<&str>,
        options: &RequestOptions,
    ) -> AppResult<Vec<RemoteProjectSnapshot>> {
        let base_url = self.bridge_url(base_url)?;
        bridge::remote_overview(&self.bridge, &base_url, options).await
    }

    pub async fn import_agent_from_remote(
        &self,
        mut payload: ImportAgentPayload,
        options: &RequestOptions,
    ) -> AppResult<AgentUpsert> {
        payload.base_url = self.bridge_url(Some(&payload.base_url))?;
        bridge::import_agent_from_remote(&self.db, &self.bridge, payload, options).await
    }

    pub async fn import_ticket_from_remote(
        &self,
        mut payload: ImportTicketPayload,
        options: &RequestOptions,
    ) -> AppResult<TicketRecord> {
        payload.base_url = self.bridge_url(Some(&payload.base_url))?;
        bridge::import_ticket_from_remote(&self.db, &self.bridge, payload, options).await
    }

    fn bridge_url(&self, requested: Option<&str>) -> AppResult<String> {
        requested
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(ToString::to_string)
            .or_else(|| self.config.bridge.base_url.clone())
            .ok_or_else(|| AppError::Internal("no remote vault URL given and VAULT_BRIDGE_URL is not set".to_string()))
    }
}

fn resolve_repo_path(raw: &str) -> AppResult<PathBuf> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::InvalidPath("repository path is empty".to_string()));
    }
    let path = fs::canonicalize(Path::new(trimmed))
        .map_err(|_| AppError::InvalidPath(format!("path does not exist: {}", trimmed)))?;
    if !path.is_dir() {
        return Err(AppError::InvalidPath(format!("not a directory: {}", path.display())));
    }
    if !path.join(".git").exists() {
        return Err(AppError::InvalidPath(format!("not a git repository: {}", path.display())));
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::VaultCore;
    use crate::bridge::RequestOptions;
    use crate::config::VaultConfig;
    use crate::errors::AppError;
    use crate::models::{AppendMemoryPayload, CreateProjectPayload, ImportProjectFromPathPayload};

    fn open(dir: &tempfile::TempDir) -> VaultCore {
        VaultCore::open(VaultConfig::with_data_root(dir.path().join("vault"))).expect("open vault")
    }

    #[test]
    fn create_project_prepares_memory_dir_and_seeds_agents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let vault = open(&dir);

        let project = vault
            .create_project(CreateProjectPayload {
                name: "Vault One".to_string(),
                ..CreateProjectPayload::default()
            })
            .expect("project");

        assert!(vault.memory().project_dir(&project.id).join("memory").is_dir());
        let agents = vault.list_agents(&project.id, true).expect("agents");
        assert_eq!(agents.len(), 2);
        vault.close().expect("close");
    }

    #[test]
    fn import_from_path_requires_git_checkout() {
        let dir = tempfile::tempdir().expect("tempdir");
        let vault = open(&dir);

        let missing = vault
            .import_project_from_path(ImportProjectFromPathPayload {
                name: "Missing".to_string(),
                repo_path: dir.path().join("nope").to_string_lossy().into_owned(),
                description: None,
            })
            .expect_err("missing path");
        assert!(matches!(missing, AppError::InvalidPath(_)));

        let plain = dir.path().join("plain");
        std::fs::create_dir_all(&plain).expect("plain dir");
        let not_git = vault
            .import_project_from_path(ImportProjectFromPathPayload {
                name: "Plain".to_string(),
                repo_path: plain.to_string_lossy().into_owned(),
                description: None,
            })
            .expect_err("no .git");
        assert!(matches!(not_git, AppError::InvalidPath(_)));

        let repo = dir.path().join("repo");
        std::fs::create_dir_all(repo.join(".git")).expect("git dir");
        let project = vault
            .import_project_from_path(ImportProjectFromPathPayload {
                name: "Repo".to_string(),
                repo_path: repo.to_string_lossy().into_owned(),
                description: Some("checked out".to_string()),
            })
            .expect("import");
        let expected = std::fs::canonicalize(&repo).expect("canonical");
        assert_eq!(project.repo_path, expected.to_string_lossy());
        assert_eq!(project.description, "checked out");
    }

    #[test]
    fn memory_round_trips_through_the_facade() {
        let dir = tempfile::tempdir().expect("tempdir");
        let vault = open(&dir);
        let project = vault
            .create_project(CreateProjectPayload {
                name: "Memory".to_string(),
                ..CreateProjectPayload::default()
            })
            .expect("project");

        vault
            .append_memory(
                &project.id,
                AppendMemoryPayload {
                    agent_id: "codex-dev".to_string(),
                    task_summary: "wired the facade".to_string(),
                    ..AppendMemoryPayload::default()
                },
            )
            .expect("append");
        let entries = vault.list_memory(&project.id, 10).expect("list");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].task_summary, "wired the facade");
    }

    #[tokio::test]
    async fn remote_calls_without_any_url_fail_before_fetching() {
        let dir = tempfile::tempdir().expect("tempdir");
        let vault = open(&dir);
        let error = vault
            .remote_overview(None, &RequestOptions::default())
            .await
            .expect_err("no url");
        assert!(error.to_string().contains("VAULT_BRIDGE_URL"));
    }
}
