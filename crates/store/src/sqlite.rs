//! SQLite backend for tasks, steps, and the agent directory.
//!
//! Tables:
//! - `tasks`, `task_steps`: task state and the append-only step log
//! - `applications`, `agents`, `tools`, `agent_capabilities`: the directory
//!
//! JSON payloads (context, result, action) are stored as text, timestamps as
//! RFC 3339 strings. Status writes are conditional on the status they were
//! computed from, so a concurrent cancel is never overwritten.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use simplea2a_core::action::Action;
use simplea2a_core::agent::{
    AgentDirectory, AgentProfile, ConnectionProfile, Environment, SubAgentInfo, ToolInfo,
};
use simplea2a_core::error::{DirectoryError, StoreError};
use simplea2a_core::task::{
    Context, NewTask, StatusUpdate, StepPatch, StepStatus, Task, TaskInput, TaskStatus, TaskStep,
    TaskStore,
};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::{Capability, DirectoryAdmin};

const MIGRATIONS: &[(&str, &str)] = &[
    (
        "tasks table",
        r#"
        CREATE TABLE IF NOT EXISTS tasks (
            seq          INTEGER PRIMARY KEY AUTOINCREMENT,
            id           TEXT UNIQUE NOT NULL,
            agent_id     TEXT NOT NULL,
            source_id    TEXT,
            parent_id    TEXT,
            status       TEXT NOT NULL,
            instruction  TEXT NOT NULL,
            context      TEXT NOT NULL DEFAULT '{}',
            result       TEXT,
            error        TEXT,
            created_at   TEXT NOT NULL,
            started_at   TEXT,
            finished_at  TEXT
        )
        "#,
    ),
    (
        "parent index",
        "CREATE INDEX IF NOT EXISTS idx_tasks_parent ON tasks(parent_id)",
    ),
    (
        "status index",
        "CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status)",
    ),
    (
        "task_steps table",
        r#"
        CREATE TABLE IF NOT EXISTS task_steps (
            seq           INTEGER PRIMARY KEY AUTOINCREMENT,
            task_id       TEXT NOT NULL REFERENCES tasks(id),
            step_id       TEXT NOT NULL,
            agent_id      TEXT NOT NULL,
            instruction   TEXT NOT NULL,
            context       TEXT NOT NULL DEFAULT '{}',
            raw_reply     TEXT,
            action        TEXT,
            action_result TEXT,
            status        TEXT NOT NULL,
            started_at    TEXT NOT NULL,
            finished_at   TEXT,
            UNIQUE (task_id, step_id)
        )
        "#,
    ),
    (
        "applications table",
        r#"
        CREATE TABLE IF NOT EXISTS applications (
            id            TEXT PRIMARY KEY,
            name          TEXT NOT NULL,
            base_url      TEXT NOT NULL,
            api_key       TEXT,
            app_secret    TEXT,
            environment   TEXT NOT NULL DEFAULT 'chat',
            default_model TEXT
        )
        "#,
    ),
    (
        "agents table",
        r#"
        CREATE TABLE IF NOT EXISTS agents (
            id                TEXT PRIMARY KEY,
            name              TEXT NOT NULL,
            responsibilities  TEXT NOT NULL DEFAULT '',
            application_id    TEXT NOT NULL,
            model             TEXT,
            platform_agent_id TEXT
        )
        "#,
    ),
    (
        "tools table",
        r#"
        CREATE TABLE IF NOT EXISTS tools (
            name        TEXT PRIMARY KEY,
            description TEXT NOT NULL DEFAULT ''
        )
        "#,
    ),
    (
        "agent_capabilities table",
        r#"
        CREATE TABLE IF NOT EXISTS agent_capabilities (
            seq      INTEGER PRIMARY KEY AUTOINCREMENT,
            agent_id TEXT NOT NULL,
            kind     TEXT NOT NULL CHECK (kind IN ('agent', 'tool')),
            target   TEXT NOT NULL,
            UNIQUE (agent_id, kind, target)
        )
        "#,
    ),
];

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (and create if missing) a database.
    ///
    /// Pass `"sqlite::memory:"` for an ephemeral database (useful for tests).
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        // Every connection to :memory: is a separate database
        let ephemeral = path.contains(":memory:");
        let mut pool_options = SqlitePoolOptions::new().max_connections(if ephemeral { 1 } else { 4 });
        if ephemeral {
            pool_options = pool_options.idle_timeout(None).max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite store initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        for (name, sql) in MIGRATIONS {
            sqlx::query(*sql)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::MigrationFailed(format!("{name}: {e}")))?;
        }
        debug!("SQLite migrations complete");
        Ok(())
    }

    async fn fetch_step(&self, task_id: &str, step_id: &str) -> Result<TaskStep, StoreError> {
        let row = sqlx::query("SELECT * FROM task_steps WHERE task_id = ?1 AND step_id = ?2")
            .bind(task_id)
            .bind(step_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("SELECT step failed: {e}")))?
            .ok_or_else(|| StoreError::StepNotFound {
                task_id: task_id.to_string(),
                step_id: step_id.to_string(),
            })?;
        row_to_step(&row)
    }

    async fn capability_targets(
        &self,
        agent_id: &str,
        kind: &str,
    ) -> Result<Vec<String>, DirectoryError> {
        self.get_agent(agent_id).await?;
        let rows = sqlx::query(
            "SELECT target FROM agent_capabilities WHERE agent_id = ?1 AND kind = ?2 ORDER BY seq",
        )
        .bind(agent_id)
        .bind(kind)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DirectoryError::Storage(format!("SELECT capabilities failed: {e}")))?;
        rows.iter()
            .map(|r| col::<String>(r, "target").map_err(DirectoryError::Storage))
            .collect()
    }
}

fn col<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, String>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name).map_err(|e| format!("{name} column: {e}"))
}

fn task_col<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    col(row, name).map_err(StoreError::Storage)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Serialization(format!("timestamp '{raw}': {e}")))
}

fn parse_opt_ts(raw: Option<String>) -> Result<Option<DateTime<Utc>>, StoreError> {
    raw.as_deref().map(parse_ts).transpose()
}

fn parse_json<T: serde::de::DeserializeOwned>(raw: &str, what: &str) -> Result<T, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::Serialization(format!("{what}: {e}")))
}

fn to_json<T: serde::Serialize>(value: &T, what: &str) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::Serialization(format!("{what}: {e}")))
}

fn row_to_task(row: &SqliteRow) -> Result<Task, StoreError> {
    let status: String = task_col(row, "status")?;
    let context: String = task_col(row, "context")?;
    let result: Option<String> = task_col(row, "result")?;
    let created_at: String = task_col(row, "created_at")?;

    Ok(Task {
        id: task_col(row, "id")?,
        agent_id: task_col(row, "agent_id")?,
        source_id: task_col(row, "source_id")?,
        parent_id: task_col(row, "parent_id")?,
        status: status.parse()?,
        input: TaskInput {
            instruction: task_col(row, "instruction")?,
            context: parse_json::<Context>(&context, "task context")?,
        },
        result: result
            .as_deref()
            .map(|r| parse_json::<Value>(r, "task result"))
            .transpose()?,
        error: task_col(row, "error")?,
        created_at: parse_ts(&created_at)?,
        started_at: parse_opt_ts(task_col(row, "started_at")?)?,
        finished_at: parse_opt_ts(task_col(row, "finished_at")?)?,
    })
}

fn row_to_step(row: &SqliteRow) -> Result<TaskStep, StoreError> {
    let status: String = task_col(row, "status")?;
    let context: String = task_col(row, "context")?;
    let action: Option<String> = task_col(row, "action")?;
    let action_result: Option<String> = task_col(row, "action_result")?;
    let started_at: String = task_col(row, "started_at")?;

    Ok(TaskStep {
        task_id: task_col(row, "task_id")?,
        step_id: task_col(row, "step_id")?,
        agent_id: task_col(row, "agent_id")?,
        instruction: task_col(row, "instruction")?,
        context: parse_json::<Context>(&context, "step context")?,
        raw_reply: task_col(row, "raw_reply")?,
        action: action
            .as_deref()
            .map(|a| parse_json::<Action>(a, "step action"))
            .transpose()?,
        action_result: action_result
            .as_deref()
            .map(|r| parse_json::<Value>(r, "step result"))
            .transpose()?,
        status: status.parse::<StepStatus>()?,
        started_at: parse_ts(&started_at)?,
        finished_at: parse_opt_ts(task_col(row, "finished_at")?)?,
    })
}

fn row_to_agent(row: &SqliteRow) -> Result<AgentProfile, DirectoryError> {
    let get = |name: &str| col::<String>(row, name).map_err(DirectoryError::Storage);
    let get_opt = |name: &str| col::<Option<String>>(row, name).map_err(DirectoryError::Storage);
    Ok(AgentProfile {
        id: get("id")?,
        name: get("name")?,
        responsibilities: get("responsibilities")?,
        application_id: get("application_id")?,
        model: get_opt("model")?,
        platform_agent_id: get_opt("platform_agent_id")?,
    })
}

#[async_trait]
impl TaskStore for SqliteStore {
    async fn create_task(&self, new: NewTask) -> Result<Task, StoreError> {
        let task = Task::from_new(new);
        sqlx::query(
            r#"
            INSERT INTO tasks (id, agent_id, source_id, parent_id, status, instruction, context, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&task.id)
        .bind(&task.agent_id)
        .bind(&task.source_id)
        .bind(&task.parent_id)
        .bind(task.status.as_str())
        .bind(&task.input.instruction)
        .bind(to_json(&task.input.context, "task context")?)
        .bind(task.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT task failed: {e}")))?;

        debug!(task_id = %task.id, agent_id = %task.agent_id, "Task created");
        Ok(task)
    }

    async fn update_task_status(
        &self,
        task_id: &str,
        update: StatusUpdate,
    ) -> Result<Task, StoreError> {
        let mut task = self.get_task(task_id).await?;
        let previous = task.status;
        task.apply(update, Utc::now())?;

        let result = task
            .result
            .as_ref()
            .map(|r| to_json(r, "task result"))
            .transpose()?;
        let outcome = sqlx::query(
            r#"
            UPDATE tasks
            SET status = ?1, result = ?2, error = ?3, started_at = ?4, finished_at = ?5
            WHERE id = ?6 AND status = ?7
            "#,
        )
        .bind(task.status.as_str())
        .bind(result)
        .bind(&task.error)
        .bind(task.started_at.map(|t| t.to_rfc3339()))
        .bind(task.finished_at.map(|t| t.to_rfc3339()))
        .bind(task_id)
        .bind(previous.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("UPDATE task failed: {e}")))?;

        if outcome.rows_affected() == 0 {
            // Changed underneath us (typically a cancel)
            let current = self.get_task(task_id).await?;
            return Err(StoreError::InvalidTransition {
                task_id: task_id.to_string(),
                from: current.status.to_string(),
                to: task.status.to_string(),
            });
        }
        Ok(task)
    }

    async fn append_step(&self, step: &TaskStep) -> Result<(), StoreError> {
        self.get_task(&step.task_id).await?;
        let action = step
            .action
            .as_ref()
            .map(|a| to_json(a, "step action"))
            .transpose()?;
        let action_result = step
            .action_result
            .as_ref()
            .map(|r| to_json(r, "step result"))
            .transpose()?;
        sqlx::query(
            r#"
            INSERT INTO task_steps
                (task_id, step_id, agent_id, instruction, context, raw_reply, action,
                 action_result, status, started_at, finished_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&step.task_id)
        .bind(&step.step_id)
        .bind(&step.agent_id)
        .bind(&step.instruction)
        .bind(to_json(&step.context, "step context")?)
        .bind(&step.raw_reply)
        .bind(action)
        .bind(action_result)
        .bind(step.status.as_str())
        .bind(step.started_at.to_rfc3339())
        .bind(step.finished_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT step failed: {e}")))?;
        Ok(())
    }

    async fn update_step(
        &self,
        task_id: &str,
        step_id: &str,
        patch: StepPatch,
    ) -> Result<TaskStep, StoreError> {
        let mut step = self.fetch_step(task_id, step_id).await?;
        step.apply(patch, Utc::now())?;

        let action = step
            .action
            .as_ref()
            .map(|a| to_json(a, "step action"))
            .transpose()?;
        let action_result = step
            .action_result
            .as_ref()
            .map(|r| to_json(r, "step result"))
            .transpose()?;
        sqlx::query(
            r#"
            UPDATE task_steps
            SET raw_reply = ?1, action = ?2, action_result = ?3, status = ?4, finished_at = ?5
            WHERE task_id = ?6 AND step_id = ?7 AND status = 'running'
            "#,
        )
        .bind(&step.raw_reply)
        .bind(action)
        .bind(action_result)
        .bind(step.status.as_str())
        .bind(step.finished_at.map(|t| t.to_rfc3339()))
        .bind(task_id)
        .bind(step_id)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("UPDATE step failed: {e}")))?;
        Ok(step)
    }

    async fn get_task(&self, task_id: &str) -> Result<Task, StoreError> {
        let row = sqlx::query("SELECT * FROM tasks WHERE id = ?1")
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("SELECT task failed: {e}")))?
            .ok_or_else(|| StoreError::TaskNotFound(task_id.to_string()))?;
        row_to_task(&row)
    }

    async fn list_steps(&self, task_id: &str) -> Result<Vec<TaskStep>, StoreError> {
        self.get_task(task_id).await?;
        let rows = sqlx::query("SELECT * FROM task_steps WHERE task_id = ?1 ORDER BY seq")
            .bind(task_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("SELECT steps failed: {e}")))?;
        rows.iter().map(row_to_step).collect()
    }

    async fn list_children(&self, task_id: &str) -> Result<Vec<Task>, StoreError> {
        self.get_task(task_id).await?;
        let rows = sqlx::query("SELECT * FROM tasks WHERE parent_id = ?1 ORDER BY seq")
            .bind(task_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("SELECT children failed: {e}")))?;
        rows.iter().map(row_to_task).collect()
    }

    async fn list_tasks(
        &self,
        status: Option<TaskStatus>,
        limit: usize,
    ) -> Result<Vec<Task>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM tasks WHERE (?1 IS NULL OR status = ?1) ORDER BY seq DESC LIMIT ?2",
        )
        .bind(status.map(|s| s.as_str()))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("SELECT tasks failed: {e}")))?;
        rows.iter().map(row_to_task).collect()
    }

    async fn cancel_task(&self, task_id: &str) -> Result<Task, StoreError> {
        let mut task = self.get_task(task_id).await?;
        task.cancel(Utc::now());
        sqlx::query(
            "UPDATE tasks SET status = ?1, result = NULL, error = ?2, finished_at = ?3 WHERE id = ?4",
        )
        .bind(task.status.as_str())
        .bind(&task.error)
        .bind(task.finished_at.map(|t| t.to_rfc3339()))
        .bind(task_id)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("UPDATE cancel failed: {e}")))?;
        info!(task_id, "Task cancelled");
        Ok(task)
    }

    async fn reject_task(&self, task_id: &str, reason: &str) -> Result<Task, StoreError> {
        let mut task = self.get_task(task_id).await?;
        task.reject(reason, Utc::now())?;
        let outcome = sqlx::query(
            "UPDATE tasks SET status = ?1, error = ?2, finished_at = ?3 WHERE id = ?4 AND status = 'pending'",
        )
        .bind(task.status.as_str())
        .bind(&task.error)
        .bind(task.finished_at.map(|t| t.to_rfc3339()))
        .bind(task_id)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("UPDATE reject failed: {e}")))?;

        if outcome.rows_affected() == 0 {
            let current = self.get_task(task_id).await?;
            return Err(StoreError::InvalidTransition {
                task_id: task_id.to_string(),
                from: current.status.to_string(),
                to: task.status.to_string(),
            });
        }
        Ok(task)
    }
}

#[async_trait]
impl AgentDirectory for SqliteStore {
    async fn get_agent(&self, agent_id: &str) -> Result<AgentProfile, DirectoryError> {
        let row = sqlx::query("SELECT * FROM agents WHERE id = ?1")
            .bind(agent_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DirectoryError::Storage(format!("SELECT agent failed: {e}")))?
            .ok_or_else(|| DirectoryError::AgentNotFound(agent_id.to_string()))?;
        row_to_agent(&row)
    }

    async fn get_connection(
        &self,
        application_id: &str,
    ) -> Result<ConnectionProfile, DirectoryError> {
        let row = sqlx::query("SELECT * FROM applications WHERE id = ?1")
            .bind(application_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DirectoryError::Storage(format!("SELECT application failed: {e}")))?
            .ok_or_else(|| DirectoryError::ApplicationNotFound {
                agent_id: String::new(),
                application_id: application_id.to_string(),
            })?;

        let get = |name: &str| col::<String>(&row, name).map_err(DirectoryError::Storage);
        let get_opt =
            |name: &str| col::<Option<String>>(&row, name).map_err(DirectoryError::Storage);
        let environment: Environment = get("environment")?
            .parse()
            .map_err(DirectoryError::Storage)?;
        Ok(ConnectionProfile {
            application_id: get("id")?,
            name: get("name")?,
            base_url: get("base_url")?,
            api_key: get_opt("api_key")?,
            app_secret: get_opt("app_secret")?,
            environment,
            default_model: get_opt("default_model")?,
        })
    }

    async fn get_sub_agents(&self, agent_id: &str) -> Result<Vec<SubAgentInfo>, DirectoryError> {
        let mut out = Vec::new();
        for target in self.capability_targets(agent_id, "agent").await? {
            match self.get_agent(&target).await {
                Ok(agent) => out.push(SubAgentInfo {
                    id: agent.id,
                    name: agent.name,
                    responsibilities: agent.responsibilities,
                }),
                Err(DirectoryError::AgentNotFound(_)) => {
                    warn!(agent_id, sub_agent = %target, "Sub-agent not in directory, skipping")
                }
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    async fn get_tools(&self, agent_id: &str) -> Result<Vec<ToolInfo>, DirectoryError> {
        let mut out = Vec::new();
        for name in self.capability_targets(agent_id, "tool").await? {
            let row = sqlx::query("SELECT name, description FROM tools WHERE name = ?1")
                .bind(&name)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| DirectoryError::Storage(format!("SELECT tool failed: {e}")))?;
            match row {
                Some(row) => out.push(ToolInfo {
                    name: col(&row, "name").map_err(DirectoryError::Storage)?,
                    description: col(&row, "description").map_err(DirectoryError::Storage)?,
                }),
                None => warn!(agent_id, tool = %name, "Tool not registered, skipping"),
            }
        }
        Ok(out)
    }

    async fn list_agents(&self) -> Result<Vec<AgentProfile>, DirectoryError> {
        let rows = sqlx::query("SELECT * FROM agents ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DirectoryError::Storage(format!("SELECT agents failed: {e}")))?;
        rows.iter().map(row_to_agent).collect()
    }
}

#[async_trait]
impl DirectoryAdmin for SqliteStore {
    async fn upsert_application(&self, profile: &ConnectionProfile) -> Result<(), DirectoryError> {
        sqlx::query(
            r#"
            INSERT INTO applications (id, name, base_url, api_key, app_secret, environment, default_model)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                base_url = excluded.base_url,
                api_key = excluded.api_key,
                app_secret = excluded.app_secret,
                environment = excluded.environment,
                default_model = excluded.default_model
            "#,
        )
        .bind(&profile.application_id)
        .bind(&profile.name)
        .bind(&profile.base_url)
        .bind(&profile.api_key)
        .bind(&profile.app_secret)
        .bind(profile.environment.as_str())
        .bind(&profile.default_model)
        .execute(&self.pool)
        .await
        .map_err(|e| DirectoryError::Storage(format!("UPSERT application failed: {e}")))?;
        Ok(())
    }

    async fn upsert_agent(&self, profile: &AgentProfile) -> Result<(), DirectoryError> {
        sqlx::query(
            r#"
            INSERT INTO agents (id, name, responsibilities, application_id, model, platform_agent_id)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                responsibilities = excluded.responsibilities,
                application_id = excluded.application_id,
                model = excluded.model,
                platform_agent_id = excluded.platform_agent_id
            "#,
        )
        .bind(&profile.id)
        .bind(&profile.name)
        .bind(&profile.responsibilities)
        .bind(&profile.application_id)
        .bind(&profile.model)
        .bind(&profile.platform_agent_id)
        .execute(&self.pool)
        .await
        .map_err(|e| DirectoryError::Storage(format!("UPSERT agent failed: {e}")))?;
        Ok(())
    }

    async fn register_tool(&self, tool: &ToolInfo) -> Result<(), DirectoryError> {
        sqlx::query(
            r#"
            INSERT INTO tools (name, description) VALUES (?1, ?2)
            ON CONFLICT(name) DO UPDATE SET description = excluded.description
            "#,
        )
        .bind(&tool.name)
        .bind(&tool.description)
        .execute(&self.pool)
        .await
        .map_err(|e| DirectoryError::Storage(format!("UPSERT tool failed: {e}")))?;
        Ok(())
    }

    async fn grant_capability(
        &self,
        agent_id: &str,
        capability: &Capability,
    ) -> Result<(), DirectoryError> {
        sqlx::query(
            "INSERT OR IGNORE INTO agent_capabilities (agent_id, kind, target) VALUES (?1, ?2, ?3)",
        )
        .bind(agent_id)
        .bind(capability.kind())
        .bind(capability.target())
        .execute(&self.pool)
        .await
        .map_err(|e| DirectoryError::Storage(format!("INSERT capability failed: {e}")))?;
        Ok(())
    }

    async fn clear_capabilities(&self, agent_id: &str) -> Result<(), DirectoryError> {
        sqlx::query("DELETE FROM agent_capabilities WHERE agent_id = ?1")
            .bind(agent_id)
            .execute(&self.pool)
            .await
            .map_err(|e| DirectoryError::Storage(format!("DELETE capabilities failed: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn test_store() -> SqliteStore {
        SqliteStore::new("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn task_round_trips_through_sqlite() {
        let store = test_store().await;
        let mut context = Context::new();
        context.insert("city".into(), json!("Paris"));
        let task = store
            .create_task(
                NewTask::new("planner", "plan a trip")
                    .with_context(context)
                    .with_source("cli"),
            )
            .await
            .unwrap();

        let fetched = store.get_task(&task.id).await.unwrap();
        assert_eq!(fetched.input.context["city"], "Paris");
        assert_eq!(fetched.status, TaskStatus::Pending);
        assert_eq!(fetched.source_id.as_deref(), Some("cli"));
        assert!(fetched.parent_id.is_none());
    }

    #[tokio::test]
    async fn lifecycle_and_invalid_transition() {
        let store = test_store().await;
        let task = store.create_task(NewTask::new("a", "x")).await.unwrap();
        store
            .update_task_status(&task.id, StatusUpdate::Running)
            .await
            .unwrap();
        store
            .update_task_status(&task.id, StatusUpdate::Completed(json!({"answer": 42})))
            .await
            .unwrap();

        let fetched = store.get_task(&task.id).await.unwrap();
        assert_eq!(fetched.status, TaskStatus::Completed);
        assert_eq!(fetched.result, Some(json!({"answer": 42})));
        assert!(fetched.started_at.is_some());
        assert!(fetched.finished_at.is_some());

        let err = store
            .update_task_status(&task.id, StatusUpdate::Running)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn cancel_wins_over_late_completion() {
        let store = test_store().await;
        let task = store.create_task(NewTask::new("a", "x")).await.unwrap();
        store
            .update_task_status(&task.id, StatusUpdate::Running)
            .await
            .unwrap();
        store.cancel_task(&task.id).await.unwrap();

        let err = store
            .update_task_status(&task.id, StatusUpdate::Completed(json!("late")))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { ref from, .. } if from == "failed"));
        let fetched = store.get_task(&task.id).await.unwrap();
        assert!(fetched.is_cancelled());
        assert!(fetched.result.is_none());
    }

    #[tokio::test]
    async fn reject_is_a_compare_and_set_on_pending() {
        let store = test_store().await;
        let task = store.create_task(NewTask::new("a", "x")).await.unwrap();
        store.reject_task(&task.id, "queue closed").await.unwrap();

        let fetched = store.get_task(&task.id).await.unwrap();
        assert_eq!(fetched.status, TaskStatus::Failed);
        assert_eq!(fetched.error.as_deref(), Some("queue closed"));
        assert!(fetched.finished_at.is_some());

        let err = store.reject_task(&task.id, "again").await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn steps_keep_order_and_action() {
        let store = test_store().await;
        let task = store.create_task(NewTask::new("a", "x")).await.unwrap();
        for i in 1..=11 {
            store
                .append_step(&TaskStep::begin(&task, i, "x", Context::new()))
                .await
                .unwrap();
        }
        let action = Action::final_answer("42");
        store
            .update_step(&task.id, "step_2", StepPatch::reply("Final Answer: 42", Some(action.clone())))
            .await
            .unwrap();
        store
            .update_step(&task.id, "step_2", StepPatch::finish(StepStatus::Completed, json!("42")))
            .await
            .unwrap();

        let steps = store.list_steps(&task.id).await.unwrap();
        assert_eq!(steps.len(), 11);
        assert_eq!(steps[1].step_id, "step_2");
        assert_eq!(steps[10].step_id, "step_11");
        assert_eq!(steps[1].action, Some(action));
        assert_eq!(steps[1].raw_reply.as_deref(), Some("Final Answer: 42"));
        assert_eq!(steps[1].status, StepStatus::Completed);
        assert!(steps[1].finished_at.is_some());
        assert_eq!(steps[0].status, StepStatus::Running);
    }

    #[tokio::test]
    async fn step_for_unknown_task_is_rejected() {
        let store = test_store().await;
        let ghost = Task::from_new(NewTask::new("a", "x"));
        let err = store
            .append_step(&TaskStep::begin(&ghost, 1, "x", Context::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::TaskNotFound(_)));
    }

    #[tokio::test]
    async fn children_and_status_filter() {
        let store = test_store().await;
        let parent = store.create_task(NewTask::new("a", "p")).await.unwrap();
        let child = store
            .create_task(NewTask::new("b", "c").with_parent(&parent.id))
            .await
            .unwrap();

        let children = store.list_children(&parent.id).await.unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].id, child.id);
        assert_eq!(children[0].parent_id.as_deref(), Some(parent.id.as_str()));

        store
            .update_task_status(&parent.id, StatusUpdate::Running)
            .await
            .unwrap();
        store
            .update_task_status(&parent.id, StatusUpdate::Failed("boom".into()))
            .await
            .unwrap();
        let failed = store
            .list_tasks(Some(TaskStatus::Failed), 10)
            .await
            .unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].error.as_deref(), Some("boom"));

        let all = store.list_tasks(None, 10).await.unwrap();
        assert_eq!(all[0].id, child.id);
    }

    #[tokio::test]
    async fn directory_round_trip() {
        let store = test_store().await;
        store
            .upsert_application(&ConnectionProfile {
                application_id: "platform".into(),
                name: "Platform".into(),
                base_url: "https://agents.example.com".into(),
                api_key: Some("key".into()),
                app_secret: Some("secret".into()),
                environment: Environment::Platform,
                default_model: None,
            })
            .await
            .unwrap();
        for (id, name) in [("planner", "Planner"), ("writer", "Writer")] {
            store
                .upsert_agent(&AgentProfile {
                    id: id.into(),
                    name: name.into(),
                    responsibilities: format!("{name} work"),
                    application_id: "platform".into(),
                    model: None,
                    platform_agent_id: Some(format!("p-{id}")),
                })
                .await
                .unwrap();
        }
        store
            .register_tool(&ToolInfo {
                name: "current_time".into(),
                description: "Now".into(),
            })
            .await
            .unwrap();
        store
            .grant_capability("planner", &Capability::Agent("writer".into()))
            .await
            .unwrap();
        store
            .grant_capability("planner", &Capability::Agent("writer".into()))
            .await
            .unwrap();
        store
            .grant_capability("planner", &Capability::Agent("ghost".into()))
            .await
            .unwrap();
        store
            .grant_capability("planner", &Capability::Tool("current_time".into()))
            .await
            .unwrap();

        let resolved = store.resolve("planner").await.unwrap();
        assert_eq!(resolved.connection.environment, Environment::Platform);
        assert_eq!(resolved.platform_agent_id(), "p-planner");

        let subs = store.get_sub_agents("planner").await.unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].id, "writer");

        let tools = store.get_tools("planner").await.unwrap();
        assert_eq!(tools[0].description, "Now");

        store.clear_capabilities("planner").await.unwrap();
        assert!(store.get_tools("planner").await.unwrap().is_empty());

        let agents = store.list_agents().await.unwrap();
        assert_eq!(agents.len(), 2);
        assert_eq!(agents[0].id, "planner");

        assert!(matches!(
            store.resolve("nobody").await,
            Err(DirectoryError::AgentNotFound(_))
        ));
    }
}
