//! Delegated task queue persistence.

use crate::Db;
use chrono::{DateTime, Utc};
use uplift_types::error::{UpliftError, UpliftResult};
use uplift_types::scope::ScopeUri;
use uplift_types::task::{TaskId, TaskPriority, TaskRecord, TaskStatus};

/// Task queue backed by the `tasks` table.
#[derive(Clone)]
pub struct TaskStore {
    conn: Db,
}

impl TaskStore {
    /// Create a new task store wrapping the given connection.
    pub fn new(conn: Db) -> Self {
        Self { conn }
    }

    /// Persist a newly delegated task.
    pub fn insert(&self, task: &TaskRecord) -> UpliftResult<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| UpliftError::Internal(e.to_string()))?;
        let input = serde_json::to_string(&task.input_data)?;
        let scopes = serde_json::to_string(&task.shared_scopes)?;
        conn.execute(
            "INSERT INTO tasks (id, source_agent, target_agent, objective, input_data,
                 shared_scopes, priority, priority_rank, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            rusqlite::params![
                task.id.to_string(),
                task.source_agent,
                task.target_agent,
                task.objective,
                input,
                scopes,
                task.priority.as_str(),
                task.priority.rank(),
                task.status.as_str(),
                task.created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| UpliftError::Memory(e.to_string()))?;
        Ok(())
    }

    /// Load one task by id.
    pub fn get(&self, id: TaskId) -> UpliftResult<Option<TaskRecord>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| UpliftError::Internal(e.to_string()))?;
        let mut stmt = conn
            .prepare(&format!("{SELECT_TASK} WHERE id = ?1"))
            .map_err(|e| UpliftError::Memory(e.to_string()))?;
        let result = stmt.query_row(rusqlite::params![id.to_string()], row_to_task);
        match result {
            Ok(task) => Ok(Some(task?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(UpliftError::Memory(e.to_string())),
        }
    }

    /// Claim the next pending task for a target agent and mark it running.
    /// Highest priority first, oldest first within a priority.
    pub fn claim_next(&self, target_agent: &str) -> UpliftResult<Option<TaskRecord>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| UpliftError::Internal(e.to_string()))?;
        let mut stmt = conn
            .prepare(&format!(
                "{SELECT_TASK} WHERE target_agent = ?1 AND status = 'pending'
                 ORDER BY priority_rank DESC, created_at ASC LIMIT 1"
            ))
            .map_err(|e| UpliftError::Memory(e.to_string()))?;
        let result = stmt.query_row(rusqlite::params![target_agent], row_to_task);
        let mut task = match result {
            Ok(task) => task?,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(UpliftError::Memory(e.to_string())),
        };
        drop(stmt);

        let now = Utc::now();
        conn.execute(
            "UPDATE tasks SET status = 'running', started_at = ?2 WHERE id = ?1",
            rusqlite::params![task.id.to_string(), now.to_rfc3339()],
        )
        .map_err(|e| UpliftError::Memory(e.to_string()))?;
        task.status = TaskStatus::Running;
        task.started_at = Some(now);
        Ok(Some(task))
    }

    /// The task an agent is currently running, if any.
    pub fn running_for(&self, target_agent: &str) -> UpliftResult<Option<TaskRecord>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| UpliftError::Internal(e.to_string()))?;
        let mut stmt = conn
            .prepare(&format!(
                "{SELECT_TASK} WHERE target_agent = ?1 AND status = 'running'
                 ORDER BY started_at ASC LIMIT 1"
            ))
            .map_err(|e| UpliftError::Memory(e.to_string()))?;
        let result = stmt.query_row(rusqlite::params![target_agent], row_to_task);
        match result {
            Ok(task) => Ok(Some(task?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(UpliftError::Memory(e.to_string())),
        }
    }

    /// Move a task to a terminal state. Only pending and running tasks can
    /// be finalized; the update is conditional so a second report loses.
    pub fn finalize(
        &self,
        id: TaskId,
        status: TaskStatus,
        output_memory_key: Option<&str>,
        error: Option<&str>,
    ) -> UpliftResult<()> {
        if !status.is_terminal() {
            return Err(UpliftError::InvalidInput(format!(
                "'{status}' is not a terminal task status"
            )));
        }
        let conn = self
            .conn
            .lock()
            .map_err(|e| UpliftError::Internal(e.to_string()))?;
        let changed = conn
            .execute(
                "UPDATE tasks SET status = ?2, completed_at = ?3, output_memory_key = ?4, error = ?5
                 WHERE id = ?1 AND status IN ('pending', 'running')",
                rusqlite::params![
                    id.to_string(),
                    status.as_str(),
                    Utc::now().to_rfc3339(),
                    output_memory_key,
                    error,
                ],
            )
            .map_err(|e| UpliftError::Memory(e.to_string()))?;
        if changed == 0 {
            // Distinguish unknown id from double finalization.
            let exists: bool = conn
                .query_row(
                    "SELECT 1 FROM tasks WHERE id = ?1",
                    rusqlite::params![id.to_string()],
                    |_| Ok(true),
                )
                .unwrap_or(false);
            if exists {
                return Err(UpliftError::InvalidState {
                    current: "terminal".to_string(),
                    operation: "finalize".to_string(),
                });
            }
            return Err(UpliftError::TaskNotFound(id.to_string()));
        }
        Ok(())
    }

    /// List tasks, optionally filtered by agent (source or target) and
    /// status, newest first.
    pub fn list(
        &self,
        agent: Option<&str>,
        status: Option<TaskStatus>,
        limit: usize,
    ) -> UpliftResult<Vec<TaskRecord>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| UpliftError::Internal(e.to_string()))?;
        let mut sql = format!("{SELECT_TASK} WHERE 1=1");
        let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        if let Some(agent) = agent {
            params.push(Box::new(agent.to_string()));
            sql.push_str(&format!(
                " AND (source_agent = ?{n} OR target_agent = ?{n})",
                n = params.len()
            ));
        }
        if let Some(status) = status {
            params.push(Box::new(status.as_str().to_string()));
            sql.push_str(&format!(" AND status = ?{}", params.len()));
        }
        params.push(Box::new(limit as i64));
        sql.push_str(&format!(
            " ORDER BY created_at DESC LIMIT ?{}",
            params.len()
        ));

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| UpliftError::Memory(e.to_string()))?;
        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            params.iter().map(|p| p.as_ref()).collect();
        let rows = stmt
            .query_map(param_refs.as_slice(), row_to_task)
            .map_err(|e| UpliftError::Memory(e.to_string()))?;
        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row.map_err(|e| UpliftError::Memory(e.to_string()))??);
        }
        Ok(tasks)
    }
}

const SELECT_TASK: &str = "SELECT id, source_agent, target_agent, objective, input_data,
    shared_scopes, priority, status, created_at, started_at, completed_at,
    output_memory_key, error FROM tasks";

fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<UpliftResult<TaskRecord>> {
    let id_str: String = row.get(0)?;
    let source_agent: String = row.get(1)?;
    let target_agent: String = row.get(2)?;
    let objective: String = row.get(3)?;
    let input_str: String = row.get(4)?;
    let scopes_str: String = row.get(5)?;
    let priority_str: String = row.get(6)?;
    let status_str: String = row.get(7)?;
    let created_str: String = row.get(8)?;
    let started_str: Option<String> = row.get(9)?;
    let completed_str: Option<String> = row.get(10)?;
    let output_memory_key: Option<String> = row.get(11)?;
    let error: Option<String> = row.get(12)?;

    Ok(build_task(
        id_str,
        source_agent,
        target_agent,
        objective,
        input_str,
        scopes_str,
        priority_str,
        status_str,
        created_str,
        started_str,
        completed_str,
        output_memory_key,
        error,
    ))
}

#[allow(clippy::too_many_arguments)]
fn build_task(
    id_str: String,
    source_agent: String,
    target_agent: String,
    objective: String,
    input_str: String,
    scopes_str: String,
    priority_str: String,
    status_str: String,
    created_str: String,
    started_str: Option<String>,
    completed_str: Option<String>,
    output_memory_key: Option<String>,
    error: Option<String>,
) -> UpliftResult<TaskRecord> {
    let id = uuid::Uuid::parse_str(&id_str)
        .map(TaskId)
        .map_err(|e| UpliftError::Memory(e.to_string()))?;
    let input_data: serde_json::Value = serde_json::from_str(&input_str)?;
    let shared_scopes: Vec<ScopeUri> = serde_json::from_str(&scopes_str)?;
    let priority = TaskPriority::parse(&priority_str)
        .ok_or_else(|| UpliftError::Memory(format!("bad priority '{priority_str}'")))?;
    let status = TaskStatus::parse(&status_str)
        .ok_or_else(|| UpliftError::Memory(format!("bad task status '{status_str}'")))?;
    Ok(TaskRecord {
        id,
        source_agent,
        target_agent,
        objective,
        input_data,
        shared_scopes,
        priority,
        status,
        created_at: parse_ts(&created_str),
        started_at: started_str.as_deref().map(parse_ts),
        completed_at: completed_str.as_deref().map(parse_ts),
        output_memory_key,
        error,
    })
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
