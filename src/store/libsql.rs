//! libSQL `Repository` backend — local-file persistence with
//! version-tracked migrations.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::model::{LinkStatus, Parent, Student};
use crate::store::traits::Repository;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "initial_schema",
    sql: r#"
        CREATE TABLE IF NOT EXISTS students (
            student_id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            phone TEXT NOT NULL UNIQUE,
            year TEXT NOT NULL,
            subjects TEXT NOT NULL,
            teachers TEXT NOT NULL,
            telegram_id TEXT NOT NULL,
            registered_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_students_year ON students(year);

        CREATE TABLE IF NOT EXISTS parents (
            parent_id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            phone TEXT NOT NULL UNIQUE,
            child_ref TEXT NOT NULL,
            link_status TEXT NOT NULL,
            telegram_id TEXT NOT NULL,
            registered_at TEXT NOT NULL
        );
    "#,
}];

/// libSQL repository backend.
///
/// Holds a single connection reused for all operations;
/// `libsql::Connection` is safe for concurrent async use.
pub struct LibSqlRepository {
    #[allow(dead_code)]
    db: Arc<Database>,
    conn: Connection,
}

impl LibSqlRepository {
    /// Open (or create) a local database file and run migrations.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Open(format!("Failed to create data directory: {e}")))?;
        }

        let repo = Self::build(path.to_string_lossy().as_ref()).await?;
        info!(path = %path.display(), "Record store opened");
        Ok(repo)
    }

    /// Create an in-memory database (for tests).
    pub async fn open_memory() -> Result<Self, StoreError> {
        Self::build(":memory:").await
    }

    async fn build(location: &str) -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(location)
            .build()
            .await
            .map_err(|e| StoreError::Open(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| StoreError::Open(format!("Failed to create connection: {e}")))?;

        let repo = Self {
            db: Arc::new(db),
            conn,
        };
        repo.run_migrations().await?;
        Ok(repo)
    }

    /// Apply any migrations newer than the recorded schema version.
    async fn run_migrations(&self) -> Result<(), StoreError> {
        self.conn
            .execute(
                "CREATE TABLE IF NOT EXISTS _migrations (
                    version INTEGER PRIMARY KEY,
                    name TEXT NOT NULL,
                    applied_at TEXT NOT NULL
                )",
                (),
            )
            .await
            .map_err(|e| StoreError::Query(format!("create _migrations: {e}")))?;

        let mut rows = self
            .conn
            .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
            .await
            .map_err(|e| StoreError::Query(format!("read schema version: {e}")))?;
        let current: i64 = match rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("read schema version: {e}")))?
        {
            Some(row) => row
                .get(0)
                .map_err(|e| StoreError::Query(format!("read schema version: {e}")))?,
            None => 0,
        };

        for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
            self.conn
                .execute_batch(migration.sql)
                .await
                .map_err(|e| {
                    StoreError::Query(format!("migration {} failed: {e}", migration.name))
                })?;
            self.conn
                .execute(
                    "INSERT INTO _migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
                    params![migration.version, migration.name, Utc::now().to_rfc3339()],
                )
                .await
                .map_err(|e| {
                    StoreError::Query(format!("record migration {}: {e}", migration.name))
                })?;
            debug!(version = migration.version, name = migration.name, "Migration applied");
        }
        Ok(())
    }
}

// ── Row mapping helpers ─────────────────────────────────────────────

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn link_status_to_str(status: LinkStatus) -> &'static str {
    match status {
        LinkStatus::Linked => "linked",
        LinkStatus::Unlinked => "unlinked",
    }
}

fn str_to_link_status(s: &str) -> LinkStatus {
    match s {
        "linked" => LinkStatus::Linked,
        _ => LinkStatus::Unlinked,
    }
}

fn map_store_err(op: &str, e: libsql::Error) -> StoreError {
    let msg = e.to_string();
    if msg.contains("UNIQUE") {
        StoreError::Constraint(format!("{op}: {msg}"))
    } else {
        StoreError::Query(format!("{op}: {msg}"))
    }
}

/// Column order: 0:student_id, 1:name, 2:phone, 3:year, 4:subjects,
/// 5:teachers, 6:telegram_id, 7:registered_at
fn row_to_student(row: &libsql::Row) -> Result<Student, StoreError> {
    let subjects_json: String = row
        .get(4)
        .map_err(|e| StoreError::Query(format!("read student row: {e}")))?;
    let teachers_json: String = row
        .get(5)
        .map_err(|e| StoreError::Query(format!("read student row: {e}")))?;

    let get = |i: i32| -> Result<String, StoreError> {
        row.get(i)
            .map_err(|e| StoreError::Query(format!("read student row: {e}")))
    };

    Ok(Student {
        student_id: get(0)?,
        name: get(1)?,
        phone: get(2)?,
        year: get(3)?,
        subjects: serde_json::from_str(&subjects_json)
            .map_err(|e| StoreError::Serialization(format!("student subjects: {e}")))?,
        teachers: serde_json::from_str(&teachers_json)
            .map_err(|e| StoreError::Serialization(format!("student teachers: {e}")))?,
        telegram_id: get(6)?,
        registered_at: parse_datetime(&get(7)?),
    })
}

/// Column order: 0:parent_id, 1:name, 2:phone, 3:child_ref, 4:link_status,
/// 5:telegram_id, 6:registered_at
fn row_to_parent(row: &libsql::Row) -> Result<Parent, StoreError> {
    let get = |i: i32| -> Result<String, StoreError> {
        row.get(i)
            .map_err(|e| StoreError::Query(format!("read parent row: {e}")))
    };

    Ok(Parent {
        parent_id: get(0)?,
        name: get(1)?,
        phone: get(2)?,
        child_ref: get(3)?,
        link_status: str_to_link_status(&get(4)?),
        telegram_id: get(5)?,
        registered_at: parse_datetime(&get(6)?),
    })
}

// ── Repository implementation ───────────────────────────────────────

#[async_trait]
impl Repository for LibSqlRepository {
    async fn list_students(&self) -> Result<Vec<Student>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT student_id, name, phone, year, subjects, teachers,
                        telegram_id, registered_at
                 FROM students ORDER BY registered_at",
                (),
            )
            .await
            .map_err(|e| map_store_err("list_students", e))?;

        let mut students = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| map_store_err("list_students", e))?
        {
            students.push(row_to_student(&row)?);
        }
        Ok(students)
    }

    async fn list_parents(&self) -> Result<Vec<Parent>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT parent_id, name, phone, child_ref, link_status,
                        telegram_id, registered_at
                 FROM parents ORDER BY registered_at",
                (),
            )
            .await
            .map_err(|e| map_store_err("list_parents", e))?;

        let mut parents = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| map_store_err("list_parents", e))?
        {
            parents.push(row_to_parent(&row)?);
        }
        Ok(parents)
    }

    async fn append_student(&self, student: &Student) -> Result<(), StoreError> {
        let subjects = serde_json::to_string(&student.subjects)
            .map_err(|e| StoreError::Serialization(format!("student subjects: {e}")))?;
        let teachers = serde_json::to_string(&student.teachers)
            .map_err(|e| StoreError::Serialization(format!("student teachers: {e}")))?;

        self.conn
            .execute(
                "INSERT INTO students (student_id, name, phone, year, subjects,
                    teachers, telegram_id, registered_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    student.student_id.clone(),
                    student.name.clone(),
                    student.phone.clone(),
                    student.year.clone(),
                    subjects,
                    teachers,
                    student.telegram_id.clone(),
                    student.registered_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| map_store_err("append_student", e))?;

        debug!(student_id = %student.student_id, "Student row appended");
        Ok(())
    }

    async fn append_parent(&self, parent: &Parent) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO parents (parent_id, name, phone, child_ref,
                    link_status, telegram_id, registered_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    parent.parent_id.clone(),
                    parent.name.clone(),
                    parent.phone.clone(),
                    parent.child_ref.clone(),
                    link_status_to_str(parent.link_status),
                    parent.telegram_id.clone(),
                    parent.registered_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| map_store_err("append_parent", e))?;

        debug!(parent_id = %parent.parent_id, "Parent row appended");
        Ok(())
    }
}
