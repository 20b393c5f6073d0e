//! Record Store queries: CRUD over `memories`, plus the append-only access
//! log and the aggregate stats the engine's `get_stats` reports.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{MemoryError, Result};
use crate::types::{AccessLogRow, Memory, MemoryStatus, MemoryType};

/// Filters accepted by [`scan`]. `None` means "don't filter on this field".
#[derive(Debug, Clone, Default)]
pub struct ScanFilters {
    pub project: Option<String>,
    pub memory_type: Option<String>,
    pub source_role: Option<String>,
    pub status: Option<MemoryStatus>,
}

pub fn memory_from_row(row: &Row) -> rusqlite::Result<Memory> {
    let memory_type: String = row.get("memory_type")?;
    let status: String = row.get("status")?;
    let metadata_str: String = row.get("metadata")?;
    let created_at: String = row.get("created_at")?;
    let accessed_at: String = row.get("accessed_at")?;
    Ok(Memory {
        id: row.get("id")?,
        content: row.get("content")?,
        memory_type: MemoryType::from(memory_type.as_str()),
        project: row.get("project")?,
        source_role: row.get("source_role")?,
        importance: row.get("importance")?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        accessed_at: DateTime::parse_from_rfc3339(&accessed_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        access_count: row.get("access_count")?,
        surface_count: row.get("surface_count")?,
        validated: row.get::<_, i64>("validated")? != 0,
        status: status.parse().unwrap_or(MemoryStatus::Active),
        metadata: serde_json::from_str(&metadata_str).unwrap_or_default(),
    })
}

pub fn insert(conn: &Connection, memory: &Memory) -> Result<()> {
    conn.execute(
        "INSERT INTO memories (id, content, memory_type, project, source_role, importance, \
         created_at, accessed_at, access_count, surface_count, validated, status, metadata) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            memory.id,
            memory.content,
            memory.memory_type.as_str(),
            memory.project,
            memory.source_role,
            memory.importance,
            memory.created_at.to_rfc3339(),
            memory.accessed_at.to_rfc3339(),
            memory.access_count,
            memory.surface_count,
            memory.validated as i64,
            memory.status.as_str(),
            memory.metadata.to_string(),
        ],
    )?;
    Ok(())
}

pub fn get_by_id(conn: &Connection, id: &str) -> Result<Memory> {
    conn.query_row("SELECT * FROM memories WHERE id = ?1", params![id], memory_from_row)
        .optional()?
        .ok_or_else(|| MemoryError::NotFound(id.to_string()))
}

pub fn try_get_by_id(conn: &Connection, id: &str) -> Result<Option<Memory>> {
    Ok(conn
        .query_row("SELECT * FROM memories WHERE id = ?1", params![id], memory_from_row)
        .optional()?)
}

/// Patch a handful of scalar fields. Unknown keys are a programmer error and
/// panic rather than silently no-op, since the set of updatable fields is
/// fixed and closed.
pub fn update_fields(conn: &Connection, id: &str, fields: &[(&str, FieldValue)]) -> Result<()> {
    if fields.is_empty() {
        return Ok(());
    }
    let assignments: Vec<String> = fields
        .iter()
        .enumerate()
        .map(|(i, (name, _))| format!("{name} = ?{}", i + 1))
        .collect();
    let sql = format!(
        "UPDATE memories SET {} WHERE id = ?{}",
        assignments.join(", "),
        fields.len() + 1
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut values: Vec<Box<dyn rusqlite::ToSql>> = fields
        .iter()
        .map(|(_, v)| v.to_sql_box())
        .collect();
    values.push(Box::new(id.to_string()));
    let params: Vec<&dyn rusqlite::ToSql> = values.iter().map(|v| v.as_ref()).collect();
    let changed = stmt.execute(params.as_slice())?;
    if changed == 0 {
        return Err(MemoryError::NotFound(id.to_string()));
    }
    Ok(())
}

/// A typed value for [`update_fields`], avoiding a dependency on any one
/// concrete rusqlite type at call sites.
pub enum FieldValue {
    Text(String),
    OptText(Option<String>),
    Real(f64),
    Int(i64),
    Bool(bool),
}

impl FieldValue {
    fn to_sql_box(&self) -> Box<dyn rusqlite::ToSql> {
        match self {
            FieldValue::Text(s) => Box::new(s.clone()),
            FieldValue::OptText(s) => Box::new(s.clone()),
            FieldValue::Real(r) => Box::new(*r),
            FieldValue::Int(i) => Box::new(*i),
            FieldValue::Bool(b) => Box::new(*b as i64),
        }
    }
}

pub fn delete(conn: &Connection, id: &str) -> Result<()> {
    let changed = conn.execute("DELETE FROM memories WHERE id = ?1", params![id])?;
    if changed == 0 {
        return Err(MemoryError::NotFound(id.to_string()));
    }
    Ok(())
}

pub fn scan(
    conn: &Connection,
    filters: &ScanFilters,
    limit: i64,
    newest_first: bool,
) -> Result<Vec<Memory>> {
    let mut sql = String::from("SELECT * FROM memories WHERE 1=1");
    let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(project) = &filters.project {
        sql.push_str(" AND project = ?");
        values.push(Box::new(project.clone()));
    }
    if let Some(memory_type) = &filters.memory_type {
        sql.push_str(" AND memory_type = ?");
        values.push(Box::new(memory_type.clone()));
    }
    if let Some(role) = &filters.source_role {
        sql.push_str(" AND source_role = ?");
        values.push(Box::new(role.clone()));
    }
    if let Some(status) = &filters.status {
        sql.push_str(" AND status = ?");
        values.push(Box::new(status.as_str().to_string()));
    }
    sql.push_str(if newest_first {
        " ORDER BY created_at DESC"
    } else {
        " ORDER BY created_at ASC"
    });
    sql.push_str(" LIMIT ?");
    values.push(Box::new(limit));

    let mut stmt = conn.prepare(&sql)?;
    let params: Vec<&dyn rusqlite::ToSql> = values.iter().map(|v| v.as_ref()).collect();
    let rows = stmt
        .query_map(params.as_slice(), memory_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn append_access_log(conn: &Connection, row: &AccessLogRow) -> Result<()> {
    conn.execute(
        "INSERT INTO access_log (memory_id, query, role, project, relevance, timestamp) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            row.memory_id,
            row.query,
            row.role,
            row.project,
            row.relevance,
            row.timestamp.to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// `access_count * avg(relevance)` over the last 30 days, for
/// `validation_candidates`.
pub fn access_stats_since(
    conn: &Connection,
    memory_id: &str,
    since: DateTime<Utc>,
) -> Result<(i64, f64)> {
    conn.query_row(
        "SELECT COUNT(*), COALESCE(AVG(relevance), 0.0) FROM access_log \
         WHERE memory_id = ?1 AND timestamp >= ?2",
        params![memory_id, since.to_rfc3339()],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .map_err(Into::into)
}

#[derive(Debug, Default)]
pub struct AggregateCounts {
    pub total: i64,
    pub active: i64,
    pub archived: i64,
    pub by_type: Vec<(String, i64)>,
    pub by_project: Vec<(Option<String>, i64)>,
}

pub fn aggregate_counts(conn: &Connection) -> Result<AggregateCounts> {
    let total: i64 = conn.query_row("SELECT COUNT(*) FROM memories", [], |r| r.get(0))?;
    let active: i64 = conn.query_row(
        "SELECT COUNT(*) FROM memories WHERE status = 'active'",
        [],
        |r| r.get(0),
    )?;
    let archived: i64 = conn.query_row(
        "SELECT COUNT(*) FROM memories WHERE status = 'archived'",
        [],
        |r| r.get(0),
    )?;

    let mut stmt = conn.prepare("SELECT memory_type, COUNT(*) FROM memories GROUP BY memory_type")?;
    let by_type = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut stmt = conn.prepare("SELECT project, COUNT(*) FROM memories GROUP BY project")?;
    let by_project = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(AggregateCounts {
        total,
        active,
        archived,
        by_type,
        by_project,
    })
}
