use anyhow::Result;
use rusqlite::{params, Row};
use serde::Serialize;

use crate::db::{parse_datetime, to_i64, to_u64, Database};
use crate::report::FocusReport;
use crate::session::round2;

fn row_to_report(row: &Row) -> Result<FocusReport> {
    let created_at: String = row.get("created_at")?;
    let focused_frames: i64 = row.get("focused_frames")?;
    let distracted_frames: i64 = row.get("distracted_frames")?;
    let total_frames: i64 = row.get("total_frames")?;
    let duration_secs: i64 = row.get("duration_secs")?;

    Ok(FocusReport {
        id: row.get("id")?,
        student_id: row.get("student_id")?,
        course_id: row.get("course_id")?,
        session_id: row.get("session_id")?,
        focus_percentage: row.get("focus_percentage")?,
        focused_frames: to_u64(focused_frames)?,
        distracted_frames: to_u64(distracted_frames)?,
        total_frames: to_u64(total_frames)?,
        duration_secs: to_u64(duration_secs)?,
        report_path: row.get("report_path")?,
        created_at: parse_datetime(&created_at)?,
    })
}

const REPORT_COLUMNS: &str = "id, student_id, course_id, session_id, focus_percentage, \
     focused_frames, distracted_frames, total_frames, duration_secs, report_path, created_at";

/// Per-session aggregate across all student reports, for teacher dashboards.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionAggregate {
    pub student_count: u64,
    pub average_focus: f64,
    pub max_focus: f64,
    pub min_focus: f64,
}

impl Database {
    pub async fn insert_report(&self, report: &FocusReport) -> Result<()> {
        let record = report.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO focus_reports (id, student_id, course_id, session_id, focus_percentage,
                     focused_frames, distracted_frames, total_frames, duration_secs, report_path, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    record.id,
                    record.student_id,
                    record.course_id,
                    record.session_id,
                    record.focus_percentage,
                    to_i64(record.focused_frames)?,
                    to_i64(record.distracted_frames)?,
                    to_i64(record.total_frames)?,
                    to_i64(record.duration_secs)?,
                    record.report_path,
                    record.created_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn find_report(&self, report_id: &str) -> Result<Option<FocusReport>> {
        let report_id = report_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {REPORT_COLUMNS} FROM focus_reports WHERE id = ?1"
            ))?;

            let mut rows = stmt.query(params![report_id])?;
            let report = match rows.next()? {
                Some(row) => Some(row_to_report(row)?),
                None => None,
            };
            Ok(report)
        })
        .await
    }

    /// Reports for one student, newest first, optionally scoped to a course.
    pub async fn reports_by_student(
        &self,
        student_id: &str,
        course_id: Option<&str>,
    ) -> Result<Vec<FocusReport>> {
        let student_id = student_id.to_string();
        let course_id = course_id.map(|id| id.to_string());
        self.execute(move |conn| {
            let mut reports = Vec::new();
            match course_id {
                Some(course_id) => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {REPORT_COLUMNS} FROM focus_reports
                         WHERE student_id = ?1 AND course_id = ?2
                         ORDER BY created_at DESC"
                    ))?;
                    let mut rows = stmt.query(params![student_id, course_id])?;
                    while let Some(row) = rows.next()? {
                        reports.push(row_to_report(row)?);
                    }
                }
                None => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {REPORT_COLUMNS} FROM focus_reports
                         WHERE student_id = ?1
                         ORDER BY created_at DESC"
                    ))?;
                    let mut rows = stmt.query(params![student_id])?;
                    while let Some(row) = rows.next()? {
                        reports.push(row_to_report(row)?);
                    }
                }
            }
            Ok(reports)
        })
        .await
    }

    /// Every report filed under one course, newest first.
    pub async fn reports_by_course(&self, course_id: &str) -> Result<Vec<FocusReport>> {
        let course_id = course_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {REPORT_COLUMNS} FROM focus_reports
                 WHERE course_id = ?1
                 ORDER BY created_at DESC"
            ))?;

            let mut rows = stmt.query(params![course_id])?;
            let mut reports = Vec::new();
            while let Some(row) = rows.next()? {
                reports.push(row_to_report(row)?);
            }
            Ok(reports)
        })
        .await
    }

    /// Mean focus percentage across a course's reports; zero when there are
    /// none.
    pub async fn course_average_focus(&self, course_id: &str) -> Result<f64> {
        let course_id = course_id.to_string();
        self.execute(move |conn| {
            let avg: Option<f64> = conn.query_row(
                "SELECT AVG(focus_percentage) FROM focus_reports WHERE course_id = ?1",
                params![course_id],
                |row| row.get(0),
            )?;
            Ok(round2(avg.unwrap_or(0.0)))
        })
        .await
    }

    /// The most recently created reports, capped at `limit`.
    pub async fn recent_reports(&self, limit: u32) -> Result<Vec<FocusReport>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {REPORT_COLUMNS} FROM focus_reports
                 ORDER BY created_at DESC
                 LIMIT ?1"
            ))?;

            let mut rows = stmt.query(params![limit])?;
            let mut reports = Vec::new();
            while let Some(row) = rows.next()? {
                reports.push(row_to_report(row)?);
            }
            Ok(reports)
        })
        .await
    }

    /// Remove a report. Returns false when no row had the id.
    pub async fn delete_report(&self, report_id: &str) -> Result<bool> {
        let report_id = report_id.to_string();
        self.execute(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM focus_reports WHERE id = ?1",
                params![report_id],
            )?;
            Ok(deleted > 0)
        })
        .await
    }

    /// All student reports for one monitored session, best focus first.
    pub async fn reports_by_session(&self, session_id: &str) -> Result<Vec<FocusReport>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {REPORT_COLUMNS} FROM focus_reports
                 WHERE session_id = ?1
                 ORDER BY focus_percentage DESC"
            ))?;

            let mut rows = stmt.query(params![session_id])?;
            let mut reports = Vec::new();
            while let Some(row) = rows.next()? {
                reports.push(row_to_report(row)?);
            }
            Ok(reports)
        })
        .await
    }

    /// Record where the rendered document for a report was stored.
    pub async fn update_report_path(&self, report_id: &str, report_path: &str) -> Result<bool> {
        let report_id = report_id.to_string();
        let report_path = report_path.to_string();
        self.execute(move |conn| {
            let updated = conn.execute(
                "UPDATE focus_reports SET report_path = ?1 WHERE id = ?2",
                params![report_path, report_id],
            )?;
            Ok(updated > 0)
        })
        .await
    }

    pub async fn session_statistics(&self, session_id: &str) -> Result<SessionAggregate> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let (count, avg, max, min): (i64, Option<f64>, Option<f64>, Option<f64>) = conn
                .query_row(
                    "SELECT COUNT(*), AVG(focus_percentage), MAX(focus_percentage), MIN(focus_percentage)
                     FROM focus_reports WHERE session_id = ?1",
                    params![session_id],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
                )?;

            Ok(SessionAggregate {
                student_count: to_u64(count)?,
                average_focus: round2(avg.unwrap_or(0.0)),
                max_focus: max.unwrap_or(0.0),
                min_focus: min.unwrap_or(0.0),
            })
        })
        .await
    }

    pub async fn student_average_focus(
        &self,
        student_id: &str,
        course_id: Option<&str>,
    ) -> Result<f64> {
        let reports = self.reports_by_student(student_id, course_id).await?;
        if reports.is_empty() {
            return Ok(0.0);
        }

        let total: f64 = reports.iter().map(|report| report.focus_percentage).sum();
        Ok(round2(total / reports.len() as f64))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use crate::testutil::{sample_report, test_database};

    #[tokio::test]
    async fn insert_and_find_round_trip() {
        let (db, _dir) = test_database();

        let report = sample_report("r1", "student-1", "session-1", 70.0);
        db.insert_report(&report).await.unwrap();

        let found = db.find_report("r1").await.unwrap().unwrap();
        assert_eq!(found.student_id, "student-1");
        assert_eq!(found.focus_percentage, 70.0);
        assert_eq!(found.total_frames, report.total_frames);
        assert!(db.find_report("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn student_reports_are_scoped_and_ordered() {
        let (db, _dir) = test_database();

        let mut in_course = sample_report("r1", "student-1", "session-1", 80.0);
        in_course.course_id = Some("course-a".into());
        db.insert_report(&in_course).await.unwrap();

        let mut other_course = sample_report("r2", "student-1", "session-2", 40.0);
        other_course.course_id = Some("course-b".into());
        db.insert_report(&other_course).await.unwrap();

        db.insert_report(&sample_report("r3", "student-2", "session-1", 55.0))
            .await
            .unwrap();

        let all = db.reports_by_student("student-1", None).await.unwrap();
        assert_eq!(all.len(), 2);

        let scoped = db
            .reports_by_student("student-1", Some("course-a"))
            .await
            .unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].id, "r1");

        let average = db.student_average_focus("student-1", None).await.unwrap();
        assert_eq!(average, 60.0);
    }

    #[tokio::test]
    async fn session_aggregates_cover_all_students() {
        let (db, _dir) = test_database();

        db.insert_report(&sample_report("r1", "student-1", "session-1", 90.0))
            .await
            .unwrap();
        db.insert_report(&sample_report("r2", "student-2", "session-1", 50.0))
            .await
            .unwrap();
        db.insert_report(&sample_report("r3", "student-3", "session-2", 10.0))
            .await
            .unwrap();

        let stats = db.session_statistics("session-1").await.unwrap();
        assert_eq!(stats.student_count, 2);
        assert_eq!(stats.average_focus, 70.0);
        assert_eq!(stats.max_focus, 90.0);
        assert_eq!(stats.min_focus, 50.0);

        let empty = db.session_statistics("session-9").await.unwrap();
        assert_eq!(empty.student_count, 0);
        assert_eq!(empty.average_focus, 0.0);

        let ranked = db.reports_by_session("session-1").await.unwrap();
        assert_eq!(ranked[0].id, "r1");
    }

    #[tokio::test]
    async fn report_path_updates_only_existing_rows() {
        let (db, _dir) = test_database();

        db.insert_report(&sample_report("r1", "student-1", "session-1", 70.0))
            .await
            .unwrap();

        assert!(db.update_report_path("r1", "/reports/r1.pdf").await.unwrap());
        assert!(!db.update_report_path("nope", "/reports/x.pdf").await.unwrap());

        let found = db.find_report("r1").await.unwrap().unwrap();
        assert_eq!(found.report_path.as_deref(), Some("/reports/r1.pdf"));
    }

    #[tokio::test]
    async fn course_reports_are_scoped_and_averaged() {
        let (db, _dir) = test_database();

        let mut r1 = sample_report("r1", "student-1", "session-1", 80.0);
        r1.course_id = Some("course-a".into());
        db.insert_report(&r1).await.unwrap();

        let mut r2 = sample_report("r2", "student-2", "session-1", 50.0);
        r2.course_id = Some("course-a".into());
        db.insert_report(&r2).await.unwrap();

        let mut r3 = sample_report("r3", "student-3", "session-2", 10.0);
        r3.course_id = Some("course-b".into());
        db.insert_report(&r3).await.unwrap();

        let course = db.reports_by_course("course-a").await.unwrap();
        assert_eq!(course.len(), 2);
        assert!(course
            .iter()
            .all(|report| report.course_id.as_deref() == Some("course-a")));

        assert_eq!(db.course_average_focus("course-a").await.unwrap(), 65.0);
        assert_eq!(db.course_average_focus("course-z").await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn recent_reports_come_newest_first_and_capped() {
        let (db, _dir) = test_database();

        for (id, minutes_ago) in [("r1", 3), ("r2", 2), ("r3", 1)] {
            let mut report = sample_report(id, "student-1", "session-1", 50.0);
            report.created_at = Utc::now() - Duration::minutes(minutes_ago);
            db.insert_report(&report).await.unwrap();
        }

        let recent = db.recent_reports(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id, "r3");
        assert_eq!(recent[1].id, "r2");

        assert!(db.recent_reports(0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_report_removes_only_the_named_row() {
        let (db, _dir) = test_database();

        db.insert_report(&sample_report("r1", "student-1", "session-1", 70.0))
            .await
            .unwrap();
        db.insert_report(&sample_report("r2", "student-2", "session-1", 30.0))
            .await
            .unwrap();

        assert!(db.delete_report("r1").await.unwrap());
        assert!(!db.delete_report("r1").await.unwrap());

        assert!(db.find_report("r1").await.unwrap().is_none());
        assert!(db.find_report("r2").await.unwrap().is_some());
    }
}
