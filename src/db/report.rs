//! Report repository — row mapping for the `reports` table.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use uuid::Uuid;

use super::DatabaseError;
use crate::models::{ExtractedData, Report, ReportStatus};

pub fn insert_report(conn: &Connection, report: &Report) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO reports (id, owner_id, file_url, glucose, hba1c, recommendations, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            report.id.to_string(),
            report.owner_id,
            report.file_url,
            report.extracted.glucose,
            report.extracted.hba1c,
            report.recommendations,
            report.status.as_str(),
            report.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// All reports for one owner, newest first.
/// `created_at` ties break by insertion order (later insert first).
pub fn list_reports(conn: &Connection, owner_id: &str) -> Result<Vec<Report>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, owner_id, file_url, glucose, hba1c, recommendations, status, created_at
         FROM reports WHERE owner_id = ?1
         ORDER BY created_at DESC, rowid DESC",
    )?;

    let rows = stmt.query_map(params![owner_id], |row| {
        Ok(ReportRow {
            id: row.get::<_, String>(0)?,
            owner_id: row.get::<_, String>(1)?,
            file_url: row.get::<_, String>(2)?,
            glucose: row.get::<_, Option<u32>>(3)?,
            hba1c: row.get::<_, Option<f64>>(4)?,
            recommendations: row.get::<_, String>(5)?,
            status: row.get::<_, String>(6)?,
            created_at: row.get::<_, String>(7)?,
        })
    })?;

    let mut reports = Vec::new();
    for row in rows {
        reports.push(report_from_row(row?)?);
    }
    Ok(reports)
}

struct ReportRow {
    id: String,
    owner_id: String,
    file_url: String,
    glucose: Option<u32>,
    hba1c: Option<f64>,
    recommendations: String,
    status: String,
    created_at: String,
}

fn report_from_row(row: ReportRow) -> Result<Report, DatabaseError> {
    let id = Uuid::parse_str(&row.id).map_err(|_| DatabaseError::InvalidField {
        field: "id".to_string(),
        value: row.id.clone(),
    })?;
    let status = ReportStatus::parse(&row.status).ok_or_else(|| DatabaseError::InvalidField {
        field: "status".to_string(),
        value: row.status.clone(),
    })?;
    let created_at = DateTime::parse_from_rfc3339(&row.created_at)
        .map_err(|_| DatabaseError::InvalidField {
            field: "created_at".to_string(),
            value: row.created_at.clone(),
        })?
        .with_timezone(&Utc);

    Ok(Report {
        id,
        owner_id: row.owner_id,
        file_url: row.file_url,
        extracted: ExtractedData {
            glucose: row.glucose,
            hba1c: row.hba1c,
        },
        recommendations: row.recommendations,
        status,
        created_at,
    })
}
