use crate::error::StoreError;
use crate::models::{
    AttendanceRecord, AttendanceRow, DepartmentSummary, NewStudent, Student,
};
use chrono::NaiveDate;
use rollcall_core::{Embedding, EnrolledFace};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS students (
    student_id        TEXT PRIMARY KEY,
    name              TEXT NOT NULL,
    department        TEXT,
    email             TEXT,
    phone             TEXT,
    registration_date TEXT NOT NULL,
    is_active         INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS face_encodings (
    student_id    TEXT PRIMARY KEY REFERENCES students(student_id) ON DELETE CASCADE,
    encoding      BLOB NOT NULL,
    model_version TEXT,
    last_updated  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS attendance (
    attendance_id INTEGER PRIMARY KEY AUTOINCREMENT,
    student_id    TEXT NOT NULL REFERENCES students(student_id) ON DELETE CASCADE,
    date          TEXT NOT NULL,
    time          TEXT NOT NULL,
    status        TEXT NOT NULL CHECK (status IN ('present', 'absent', 'late')),
    recorded_by   TEXT,
    notes         TEXT,
    UNIQUE (student_id, date)
);

CREATE INDEX IF NOT EXISTS attendance_by_date ON attendance(date);
";

const STUDENT_COLUMNS: &str = "s.student_id, s.name, s.department, s.email, s.phone,
    s.registration_date, s.is_active, f.student_id IS NOT NULL";

/// SQLite-backed attendance database.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (creating if needed) the database at `path` and apply the schema.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|source| StoreError::CreateDir {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        tracing::debug!(path = %path.display(), "opened attendance database");
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Insert or update a student and their face encoding atomically.
    ///
    /// Re-registering an existing id replaces the encoding, refreshes the
    /// profile fields and reactivates the student.
    pub fn register(&mut self, student: &NewStudent, embedding: &Embedding) -> Result<(), StoreError> {
        let now = timestamp();
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO students (student_id, name, department, email, phone, registration_date, is_active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1)
             ON CONFLICT(student_id) DO UPDATE SET
                name = excluded.name,
                department = excluded.department,
                email = excluded.email,
                phone = excluded.phone,
                is_active = 1",
            params![
                student.student_id,
                student.name,
                student.department,
                student.email,
                student.phone,
                now
            ],
        )?;
        tx.execute(
            "INSERT INTO face_encodings (student_id, encoding, model_version, last_updated)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(student_id) DO UPDATE SET
                encoding = excluded.encoding,
                model_version = excluded.model_version,
                last_updated = excluded.last_updated",
            params![student.student_id, embedding.to_bytes(), embedding.model_version, now],
        )?;
        tx.commit()?;

        tracing::info!(
            student_id = %student.student_id,
            dim = embedding.dim(),
            "student registered"
        );
        Ok(())
    }

    pub fn student(&self, student_id: &str) -> Result<Option<Student>, StoreError> {
        let sql = format!(
            "SELECT {STUDENT_COLUMNS} FROM students s
             LEFT JOIN face_encodings f ON f.student_id = s.student_id
             WHERE s.student_id = ?1"
        );
        Ok(self
            .conn
            .query_row(&sql, [student_id], student_from_row)
            .optional()?)
    }

    pub fn students(&self, include_inactive: bool) -> Result<Vec<Student>, StoreError> {
        let sql = format!(
            "SELECT {STUDENT_COLUMNS} FROM students s
             LEFT JOIN face_encodings f ON f.student_id = s.student_id
             WHERE s.is_active = 1 OR ?1
             ORDER BY s.student_id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([include_inactive], student_from_row)?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    /// Returns false if no such student exists.
    pub fn set_active(&self, student_id: &str, active: bool) -> Result<bool, StoreError> {
        let n = self.conn.execute(
            "UPDATE students SET is_active = ?2 WHERE student_id = ?1",
            params![student_id, active],
        )?;
        Ok(n > 0)
    }

    /// Delete a student along with their encoding and attendance history.
    pub fn remove_student(&self, student_id: &str) -> Result<bool, StoreError> {
        let n = self
            .conn
            .execute("DELETE FROM students WHERE student_id = ?1", [student_id])?;
        if n > 0 {
            tracing::info!(student_id, "student removed");
        }
        Ok(n > 0)
    }

    /// Active students with a stored encoding. Undecodable blobs are skipped.
    pub fn load_gallery(&self) -> Result<Vec<EnrolledFace>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT s.student_id, s.name, s.department, f.encoding, f.model_version, f.last_updated
             FROM students s
             JOIN face_encodings f ON f.student_id = s.student_id
             WHERE s.is_active = 1
             ORDER BY s.student_id",
        )?;
        let mut rows = stmt.query([])?;

        let mut gallery = Vec::new();
        while let Some(row) = rows.next()? {
            let student_id: String = row.get(0)?;
            let blob: Vec<u8> = row.get(3)?;
            let Some(mut embedding) = Embedding::from_bytes(&blob) else {
                tracing::warn!(%student_id, bytes = blob.len(), "skipping undecodable face encoding");
                continue;
            };
            embedding.model_version = row.get(4)?;
            gallery.push(EnrolledFace {
                student_id,
                name: row.get(1)?,
                department: row.get(2)?,
                embedding,
                updated_at: row.get(5)?,
            });
        }

        tracing::info!(faces = gallery.len(), "gallery loaded");
        Ok(gallery)
    }

    /// Insert an attendance row. Returns `false` when the student already has
    /// a row for that date.
    pub fn mark_attendance(&self, record: &AttendanceRecord) -> Result<bool, StoreError> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM students WHERE student_id = ?1)",
            [&record.student_id],
            |r| r.get(0),
        )?;
        if !exists {
            return Err(StoreError::UnknownStudent(record.student_id.clone()));
        }

        let n = self.conn.execute(
            "INSERT INTO attendance (student_id, date, time, status, recorded_by, notes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(student_id, date) DO NOTHING",
            params![
                record.student_id,
                record.date,
                record.time,
                record.status,
                record.recorded_by,
                record.notes
            ],
        )?;
        Ok(n == 1)
    }

    pub fn is_marked(&self, student_id: &str, date: NaiveDate) -> Result<bool, StoreError> {
        Ok(self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM attendance WHERE student_id = ?1 AND date = ?2)",
            params![student_id, date],
            |r| r.get(0),
        )?)
    }

    /// Ids of every student with an attendance row on `date`.
    pub fn marked_on(&self, date: NaiveDate) -> Result<HashSet<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT student_id FROM attendance WHERE date = ?1")?;
        let ids = stmt.query_map([date], |r| r.get(0))?;
        Ok(ids.collect::<Result<_, _>>()?)
    }

    /// Attendance rows in `[from, to]`, ordered by date, department, student.
    pub fn attendance_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<AttendanceRow>, StoreError> {
        check_range(from, to)?;
        let mut stmt = self.conn.prepare(
            "SELECT s.student_id, s.name, s.department, a.date, a.time, a.status, a.recorded_by, a.notes
             FROM attendance a
             JOIN students s ON s.student_id = a.student_id
             WHERE a.date BETWEEN ?1 AND ?2
             ORDER BY a.date, s.department, s.student_id",
        )?;
        let rows = stmt.query_map(params![from, to], |r| {
            Ok(AttendanceRow {
                student_id: r.get(0)?,
                name: r.get(1)?,
                department: r.get(2)?,
                date: r.get(3)?,
                time: r.get(4)?,
                status: r.get(5)?,
                recorded_by: r.get(6)?,
                notes: r.get(7)?,
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    /// Per-department student count and status counts over `[from, to]`.
    pub fn department_summary(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DepartmentSummary>, StoreError> {
        check_range(from, to)?;
        let mut stmt = self.conn.prepare(
            "SELECT s.department,
                    COUNT(DISTINCT s.student_id),
                    COALESCE(SUM(a.status = 'present'), 0),
                    COALESCE(SUM(a.status = 'absent'), 0),
                    COALESCE(SUM(a.status = 'late'), 0)
             FROM students s
             LEFT JOIN attendance a
                ON a.student_id = s.student_id AND a.date BETWEEN ?1 AND ?2
             GROUP BY s.department
             ORDER BY s.department",
        )?;
        let rows = stmt.query_map(params![from, to], |r| {
            Ok(DepartmentSummary {
                department: r.get(0)?,
                total_students: r.get(1)?,
                present: r.get(2)?,
                absent: r.get(3)?,
                late: r.get(4)?,
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }
}

fn student_from_row(r: &Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        student_id: r.get(0)?,
        name: r.get(1)?,
        department: r.get(2)?,
        email: r.get(3)?,
        phone: r.get(4)?,
        registration_date: r.get(5)?,
        is_active: r.get(6)?,
        has_encoding: r.get(7)?,
    })
}

fn check_range(from: NaiveDate, to: NaiveDate) -> Result<(), StoreError> {
    if from > to {
        return Err(StoreError::InvalidRange { from, to });
    }
    Ok(())
}

fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}
