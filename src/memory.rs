use crate::db::Database;
use crate::errors::{AppError, AppResult};
use crate::models::{AppendMemoryPayload, MemoryEntry};
use chrono::{SecondsFormat, Utc};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

pub const DEFAULT_MEMORY_LIMIT: usize = 50;

/// Append-only session log, one JSON-lines file per project.
#[derive(Debug, Clone)]
pub struct MemoryLog {
    db: Arc<Database>,
    data_root: PathBuf,
}

impl MemoryLog {
    pub fn new(db: Arc<Database>, data_root: PathBuf) -> Self {
        Self { db, data_root }
    }

    pub fn project_dir(&self, project_id: &str) -> PathBuf {
        self.data_root.join("projects").join(project_id)
    }

    pub fn memory_file(&self, project_id: &str) -> PathBuf {
        self.project_dir(project_id).join("memory").join("sessions.jsonl")
    }

    pub fn ensure_project_dir(&self, project_id: &str) -> AppResult<()> {
        let file = self.memory_file(project_id);
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    pub fn append(&self, project_id: &str, payload: AppendMemoryPayload) -> AppResult<MemoryEntry> {
        if self.db.get_project(project_id)?.is_none() {
            return Err(AppError::NotFound(format!("Project not found: {}", project_id)));
        }

        let entry = MemoryEntry {
            session_id: Uuid::new_v4().to_string(),
            date: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            project_id: project_id.to_string(),
            agent_id: payload.agent_id,
            task_summary: payload.task_summary.trim().to_string(),
            successes: payload.successes.unwrap_or_default(),
            failures: payload.failures.unwrap_or_default(),
            user_preferences: payload.user_preferences.unwrap_or_default(),
            user_frustrations: payload.user_frustrations.unwrap_or_default(),
            decisions_taken: payload.decisions_taken.unwrap_or_default(),
            lessons_learned: payload.lessons_learned.unwrap_or_default(),
            files_changed: payload.files_changed.unwrap_or_default(),
            commands_run: payload.commands_run.unwrap_or_default(),
            next_session_focus: payload.next_session_focus.unwrap_or_default(),
        };

        self.ensure_project_dir(project_id)?;
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.memory_file(project_id))?;
        // Single write of the whole line so readers never see a partial record.
        file.write_all(line.as_bytes())?;

        Ok(entry)
    }

    /// Last `limit` entries in file order. A missing file is an empty log and
    /// unreadable lines are skipped.
    pub fn list(&self, project_id: &str, limit: usize) -> AppResult<Vec<MemoryEntry>> {
        let path = self.memory_file(project_id);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(AppError::from(error)),
        };

        let entries = parse_lines(&path, &raw);
        let skip = entries.len().saturating_sub(limit);
        Ok(entries.into_iter().skip(skip).collect())
    }
}

/// Lines are decoded one at a time so a single corrupt line, including one
/// that is not valid UTF-8, only loses itself.
fn parse_lines(path: &Path, raw: &[u8]) -> Vec<MemoryEntry> {
    let mut entries = Vec::new();
    for (index, bytes) in raw.split(|byte| *byte == b'\n').enumerate() {
        let line = match std::str::from_utf8(bytes) {
            Ok(line) => line.trim(),
            Err(error) => {
                tracing::warn!(
                    path = %path.to_string_lossy(),
                    line = index + 1,
                    error = %error,
                    "skipping memory line that is not valid UTF-8"
                );
                continue;
            }
        };
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<MemoryEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(error) => {
                tracing::warn!(
                    path = %path.to_string_lossy(),
                    line = index + 1,
                    error = %error,
                    "skipping malformed memory line"
                );
            }
        }
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::MemoryLog;
    use crate::db::Database;
    use crate::models::{AppendMemoryPayload, CreateProjectPayload};
    use std::fs::OpenOptions;
    use std::io::Write;
    use std::sync::Arc;

    fn setup(dir: &tempfile::TempDir) -> (MemoryLog, String) {
        let db = Arc::new(Database::open(&dir.path().join("vault.sqlite")).expect("db"));
        let project = db
            .create_project(CreateProjectPayload {
                name: "Memory".to_string(),
                ..CreateProjectPayload::default()
            })
            .expect("project");
        (MemoryLog::new(db, dir.path().join("data")), project.id)
    }

    fn summary(agent: &str, text: &str) -> AppendMemoryPayload {
        AppendMemoryPayload {
            agent_id: agent.to_string(),
            task_summary: text.to_string(),
            ..AppendMemoryPayload::default()
        }
    }

    #[test]
    fn missing_file_reads_as_empty_log() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (log, project_id) = setup(&dir);
        assert!(log.list(&project_id, 10).expect("list").is_empty());
    }

    #[test]
    fn tail_read_keeps_most_recent_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (log, project_id) = setup(&dir);

        for text in ["old-1", "old-2", "recent-1", "recent-2"] {
            log.append(&project_id, summary("codex-dev", text)).expect("append");
        }

        let tail: Vec<String> = log
            .list(&project_id, 3)
            .expect("list")
            .into_iter()
            .map(|entry| entry.task_summary)
            .collect();
        assert_eq!(tail, vec!["old-2", "recent-1", "recent-2"]);

        assert_eq!(log.list(&project_id, 10).expect("list").len(), 4);
        assert!(log.list(&project_id, 0).expect("list").is_empty());
    }

    #[test]
    fn append_fills_defaults_and_writes_one_line() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (log, project_id) = setup(&dir);

        let first = log
            .append(&project_id, summary("codex-dev", "  shipped board  "))
            .expect("append");
        let second = log.append(&project_id, summary("agent-pm", "groomed")).expect("append");
        assert_ne!(first.session_id, second.session_id);
        assert_eq!(first.task_summary, "shipped board");
        assert_eq!(first.project_id, project_id);
        assert!(first.commands_run.is_empty());

        let raw = std::fs::read_to_string(log.memory_file(&project_id)).expect("read file");
        assert_eq!(raw.lines().count(), 2);
        assert!(raw.ends_with('\n'));
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (log, project_id) = setup(&dir);

        log.append(&project_id, summary("codex-dev", "before")).expect("append");
        {
            let mut file = OpenOptions::new()
                .append(true)
                .open(log.memory_file(&project_id))
                .expect("open");
            writeln!(file, "{{not json").expect("write");
            writeln!(file, "[1, 2, 3]").expect("write");
            writeln!(file, "{{\"session_id\": 7}}").expect("write");
            writeln!(file).expect("write");
        }
        log.append(&project_id, summary("codex-dev", "after")).expect("append");

        let entries = log.list(&project_id, 10).expect("list");
        let summaries: Vec<&str> = entries.iter().map(|entry| entry.task_summary.as_str()).collect();
        assert_eq!(summaries, vec!["before", "after"]);
    }

    #[test]
    fn invalid_utf8_line_does_not_hide_the_rest() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (log, project_id) = setup(&dir);

        log.append(&project_id, summary("codex-dev", "good")).expect("append");
        {
            let mut file = OpenOptions::new()
                .append(true)
                .open(log.memory_file(&project_id))
                .expect("open");
            file.write_all(b"\xff\xfe garbage\n").expect("write");
        }
        log.append(&project_id, summary("codex-dev", "after")).expect("append");

        let summaries: Vec<String> = log
            .list(&project_id, 10)
            .expect("list")
            .into_iter()
            .map(|entry| entry.task_summary)
            .collect();
        assert_eq!(summaries, vec!["good", "after"]);
    }

    #[test]
    fn dates_are_kept_verbatim() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (log, project_id) = setup(&dir);

        let appended = log.append(&project_id, summary("codex-dev", "fresh")).expect("append");
        assert_eq!(appended.date.len(), "2026-02-19T10:00:00.000Z".len());
        assert!(appended.date.ends_with('Z'));
        {
            let mut file = OpenOptions::new()
                .append(true)
                .open(log.memory_file(&project_id))
                .expect("open");
            writeln!(
                file,
                r#"{{"session_id":"s-legacy","date":"2026-02-19","projectId":"{}","agentId":"agent-pm","task_summary":"legacy"}}"#,
                project_id
            )
            .expect("write");
        }

        let entries = log.list(&project_id, 10).expect("list");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].date, "2026-02-19");
        assert_eq!(entries[1].task_summary, "legacy");
    }

    #[test]
    fn append_to_unknown_project_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (log, _) = setup(&dir);
        let error = log
            .append("missing", summary("codex-dev", "nope"))
            .expect_err("missing project");
        assert!(error.is_not_found());
        assert!(!log.memory_file("missing").exists());
    }
}
