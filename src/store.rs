//! Record store — owner-scoped persistence of analysis reports.
//!
//! The trait is the seam the pipeline depends on; the SQLite implementation
//! guards a single connection with a mutex (requests are short-lived and
//! low-volume, so a pool is not warranted).

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::Connection;
use thiserror::Error;
use uuid::Uuid;

use crate::db::{self, DatabaseError};
use crate::models::{ExtractedData, Report, ReportStatus};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Record store unavailable: {0}")]
    Unavailable(String),
}

impl From<DatabaseError> for StoreError {
    fn from(err: DatabaseError) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// Input to `create`; `id` and `created_at` are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewReport {
    pub owner_id: String,
    pub file_url: String,
    pub extracted: ExtractedData,
    pub recommendations: String,
    pub status: ReportStatus,
}

/// Appends and queries report records scoped to one owner.
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Persist a new report, assigning id and creation timestamp.
    async fn create(&self, new: NewReport) -> Result<Report, StoreError>;

    /// The owner's reports, newest first. Empty for a never-seen owner.
    async fn list(&self, owner_id: &str) -> Result<Vec<Report>, StoreError>;
}

pub struct SqliteReportStore {
    conn: Mutex<Connection>,
}

impl SqliteReportStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }
}

#[async_trait]
impl ReportStore for SqliteReportStore {
    async fn create(&self, new: NewReport) -> Result<Report, StoreError> {
        let report = Report {
            id: Uuid::new_v4(),
            owner_id: new.owner_id,
            file_url: new.file_url,
            extracted: new.extracted,
            recommendations: new.recommendations,
            status: new.status,
            created_at: Utc::now(),
        };

        let conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::Unavailable("connection lock poisoned".into()))?;
        db::report::insert_report(&conn, &report)?;
        Ok(report)
    }

    async fn list(&self, owner_id: &str) -> Result<Vec<Report>, StoreError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::Unavailable("connection lock poisoned".into()))?;
        Ok(db::report::list_reports(&conn, owner_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_database;

    fn store() -> SqliteReportStore {
        SqliteReportStore::new(open_memory_database().unwrap())
    }

    fn new_report(owner: &str) -> NewReport {
        NewReport {
            owner_id: owner.to_string(),
            file_url: "http://localhost/files/reports/a/1-x-r.pdf".to_string(),
            extracted: ExtractedData {
                glucose: Some(110),
                hba1c: Some(5.9),
            },
            recommendations: "## Diet Plan".to_string(),
            status: ReportStatus::Complete,
        }
    }

    #[tokio::test]
    async fn create_assigns_id_and_timestamp() {
        let store = store();
        let before = Utc::now();
        let report = store.create(new_report("alice")).await.unwrap();
        assert!(report.created_at >= before);
        assert_eq!(report.owner_id, "alice");

        let listed = store.list("alice").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, report.id);
    }

    #[tokio::test]
    async fn consecutive_creates_list_newest_first() {
        let store = store();
        let r1 = store.create(new_report("alice")).await.unwrap();
        let r2 = store.create(new_report("alice")).await.unwrap();
        let r3 = store.create(new_report("alice")).await.unwrap();

        let listed = store.list("alice").await.unwrap();
        let ids: Vec<Uuid> = listed.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![r3.id, r2.id, r1.id]);
    }

    #[tokio::test]
    async fn unknown_owner_lists_empty() {
        let store = store();
        store.create(new_report("alice")).await.unwrap();
        assert!(store.list("nobody").await.unwrap().is_empty());
    }
}
