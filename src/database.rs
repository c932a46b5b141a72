use chrono::{NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::types::Json;
use sqlx::{Executor, Sqlite};
use std::str::FromStr;
use std::time::Duration;

use crate::models::{
    Attendance, AttendanceEntry, AttendanceMark, AttendanceStatus, NewSchool, NewUser,
    PredictionSnapshot, School, ScoreUpdate, Student, StudentDetails, StudentFilter, User,
};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS schools (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        code TEXT NOT NULL UNIQUE,
        address TEXT,
        district TEXT NOT NULL,
        state TEXT,
        latitude REAL,
        longitude REAL,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        role TEXT NOT NULL CHECK (role IN ('teacher', 'government')),
        school_id INTEGER REFERENCES schools(id),
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS students (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        school_id INTEGER NOT NULL REFERENCES schools(id),
        name TEXT NOT NULL,
        roll_number TEXT,
        rfid_tag_id TEXT,
        class TEXT,
        section TEXT,
        parent_contact TEXT,
        parent_email TEXT,
        face_descriptor TEXT,
        attendance_percentage REAL,
        max_consec_absences INTEGER,
        num_long_streaks INTEGER,
        dropout_risk REAL,
        dropout_pred INTEGER,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS students_school ON students (school_id, class)",
    r#"
    CREATE TABLE IF NOT EXISTS attendance (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        student_id INTEGER NOT NULL REFERENCES students(id),
        school_id INTEGER NOT NULL REFERENCES schools(id),
        date TEXT NOT NULL,
        status TEXT NOT NULL CHECK (status IN ('present', 'absent', 'late', 'excused')),
        method TEXT NOT NULL CHECK (method IN ('manual', 'automatic')),
        marked_by INTEGER REFERENCES users(id),
        time_in TEXT,
        remarks TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        UNIQUE (student_id, school_id, date)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS attendance_school_date ON attendance (school_id, date)",
];

const UPSERT_ATTENDANCE: &str = r#"
    INSERT INTO attendance
        (student_id, school_id, date, status, method, marked_by, time_in, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT (student_id, school_id, date) DO UPDATE SET
        status = excluded.status,
        method = excluded.method,
        marked_by = excluded.marked_by,
        time_in = excluded.time_in,
        updated_at = excluded.updated_at
    RETURNING *
"#;

const ENTRY_COLUMNS: &str = r#"
    SELECT a.*, s.name AS student_name, s.roll_number AS roll_number, s.class AS student_class
    FROM attendance a
    JOIN students s ON s.id = a.student_id
"#;

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connects and creates the schema. `sqlite::memory:` URLs keep a single
    /// connection open so the database lives as long as the pool.
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        let in_memory = url.contains(":memory:");
        let mut options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(8)
        };

        let pool = pool_options.connect_with(options).await?;
        let db = Database { pool };
        db.create_schema().await?;
        Ok(db)
    }

    async fn create_schema(&self) -> Result<(), sqlx::Error> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    // Schools

    pub async fn create_school(&self, school: &NewSchool) -> Result<School, sqlx::Error> {
        sqlx::query_as::<_, School>(
            r#"
            INSERT INTO schools (name, code, address, district, state, latitude, longitude, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(&school.name)
        .bind(&school.code)
        .bind(&school.address)
        .bind(&school.district)
        .bind(&school.state)
        .bind(school.latitude)
        .bind(school.longitude)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
    }

    pub async fn list_schools(&self) -> Result<Vec<School>, sqlx::Error> {
        sqlx::query_as::<_, School>("SELECT * FROM schools ORDER BY name")
            .fetch_all(&self.pool)
            .await
    }

    pub async fn get_school(&self, id: i64) -> Result<Option<School>, sqlx::Error> {
        sqlx::query_as::<_, School>("SELECT * FROM schools WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn find_school_by_code(&self, code: &str) -> Result<Option<School>, sqlx::Error> {
        sqlx::query_as::<_, School>("SELECT * FROM schools WHERE code = ?")
            .bind(code)
            .fetch_optional(&self.pool)
            .await
    }

    // Users

    pub async fn create_user(&self, user: &NewUser) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (name, email, password_hash, role, school_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(&user.name)
        .bind(user.email.to_lowercase())
        .bind(&user.password_hash)
        .bind(user.role)
        .bind(user.school_id)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
            .bind(email.trim().to_lowercase())
            .fetch_optional(&self.pool)
            .await
    }

    // Students

    pub async fn create_student(
        &self,
        school_id: i64,
        details: &StudentDetails,
    ) -> Result<Student, sqlx::Error> {
        let now = Utc::now();
        sqlx::query_as::<_, Student>(
            r#"
            INSERT INTO students
                (school_id, name, roll_number, rfid_tag_id, class, section,
                 parent_contact, parent_email, face_descriptor, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(school_id)
        .bind(&details.name)
        .bind(&details.roll_number)
        .bind(&details.rfid_tag_id)
        .bind(&details.class)
        .bind(&details.section)
        .bind(&details.parent_contact)
        .bind(&details.parent_email)
        .bind(Json(&details.face_descriptor))
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
    }

    /// Updates a student of the given school. Returns `None` when no such student exists there.
    pub async fn update_student(
        &self,
        id: i64,
        school_id: i64,
        details: &StudentDetails,
    ) -> Result<Option<Student>, sqlx::Error> {
        sqlx::query_as::<_, Student>(
            r#"
            UPDATE students SET
                name = ?, roll_number = ?, rfid_tag_id = ?, class = ?, section = ?,
                parent_contact = ?, parent_email = ?, face_descriptor = ?, updated_at = ?
            WHERE id = ? AND school_id = ?
            RETURNING *
            "#,
        )
        .bind(&details.name)
        .bind(&details.roll_number)
        .bind(&details.rfid_tag_id)
        .bind(&details.class)
        .bind(&details.section)
        .bind(&details.parent_contact)
        .bind(&details.parent_email)
        .bind(Json(&details.face_descriptor))
        .bind(Utc::now())
        .bind(id)
        .bind(school_id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn get_student(&self, id: i64) -> Result<Option<Student>, sqlx::Error> {
        sqlx::query_as::<_, Student>("SELECT * FROM students WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Students of a school ordered by roll number, optionally filtered by a
    /// case-insensitive substring of name, roll number or RFID tag, and by class.
    pub async fn list_students(
        &self,
        school_id: i64,
        filter: &StudentFilter,
    ) -> Result<Vec<Student>, sqlx::Error> {
        let pattern = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(like_pattern);
        let class = filter
            .class
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());

        sqlx::query_as::<_, Student>(
            r#"
            SELECT * FROM students
            WHERE school_id = ?1
              AND (?2 IS NULL OR name LIKE ?2 ESCAPE '\'
                   OR roll_number LIKE ?2 ESCAPE '\'
                   OR rfid_tag_id LIKE ?2 ESCAPE '\')
              AND (?3 IS NULL OR class = ?3)
            ORDER BY roll_number, name
            "#,
        )
        .bind(school_id)
        .bind(pattern)
        .bind(class)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn students_by_name(&self, school_id: i64) -> Result<Vec<Student>, sqlx::Error> {
        sqlx::query_as::<_, Student>("SELECT * FROM students WHERE school_id = ? ORDER BY name")
            .bind(school_id)
            .fetch_all(&self.pool)
            .await
    }

    pub async fn distinct_classes(&self, school_id: i64) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT class FROM students WHERE school_id = ? AND class IS NOT NULL ORDER BY class",
        )
        .bind(school_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn count_students(&self, school_id: i64) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM students WHERE school_id = ?")
            .bind(school_id)
            .fetch_one(&self.pool)
            .await
    }

    pub async fn count_all_students(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM students")
            .fetch_one(&self.pool)
            .await
    }

    pub async fn count_high_risk(&self, school_id: i64, threshold: f64) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM students WHERE school_id = ? AND dropout_risk > ?",
        )
        .bind(school_id)
        .bind(threshold)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn high_risk_students(
        &self,
        school_id: i64,
        threshold: f64,
        limit: i64,
    ) -> Result<Vec<Student>, sqlx::Error> {
        sqlx::query_as::<_, Student>(
            r#"
            SELECT * FROM students
            WHERE school_id = ? AND dropout_risk > ?
            ORDER BY dropout_risk DESC
            LIMIT ?
            "#,
        )
        .bind(school_id)
        .bind(threshold)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn students_with_face_descriptors(
        &self,
        school_id: i64,
    ) -> Result<Vec<Student>, sqlx::Error> {
        sqlx::query_as::<_, Student>(
            "SELECT * FROM students WHERE school_id = ? AND face_descriptor IS NOT NULL ORDER BY name",
        )
        .bind(school_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn prediction_snapshot(
        &self,
        school_id: i64,
    ) -> Result<Vec<PredictionSnapshot>, sqlx::Error> {
        sqlx::query_as::<_, PredictionSnapshot>(
            r#"
            SELECT id, name, class, school_id, attendance_percentage, max_consec_absences,
                   num_long_streaks, dropout_risk, dropout_pred
            FROM students
            WHERE school_id = ?
            ORDER BY name
            "#,
        )
        .bind(school_id)
        .fetch_all(&self.pool)
        .await
    }

    // Attendance

    /// Records one mark, replacing any existing record for the same student, school and day.
    pub async fn mark_attendance(&self, mark: &AttendanceMark) -> Result<Attendance, sqlx::Error> {
        upsert_attendance(&self.pool, mark).await
    }

    /// Records a batch of marks atomically. Returns the stored records.
    pub async fn mark_attendance_batch(
        &self,
        marks: &[AttendanceMark],
    ) -> Result<Vec<Attendance>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let mut stored = Vec::with_capacity(marks.len());
        for mark in marks {
            stored.push(upsert_attendance(&mut *tx, mark).await?);
        }
        tx.commit().await?;
        Ok(stored)
    }

    /// Changes status and remarks of a record belonging to the given school.
    pub async fn update_attendance(
        &self,
        id: i64,
        school_id: i64,
        status: AttendanceStatus,
        remarks: Option<&str>,
    ) -> Result<Option<Attendance>, sqlx::Error> {
        sqlx::query_as::<_, Attendance>(
            r#"
            UPDATE attendance SET status = ?, remarks = ?, updated_at = ?
            WHERE id = ? AND school_id = ?
            RETURNING *
            "#,
        )
        .bind(status)
        .bind(remarks)
        .bind(Utc::now())
        .bind(id)
        .bind(school_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Records of a school between `from` and `to`, both inclusive.
    pub async fn attendance_between(
        &self,
        school_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Attendance>, sqlx::Error> {
        sqlx::query_as::<_, Attendance>(
            r#"
            SELECT * FROM attendance
            WHERE school_id = ? AND date >= ? AND date <= ?
            ORDER BY date, student_id
            "#,
        )
        .bind(school_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
    }

    /// Records joined with student names, newest first, optionally for one student.
    pub async fn attendance_entries(
        &self,
        school_id: i64,
        from: NaiveDate,
        to: NaiveDate,
        student_id: Option<i64>,
    ) -> Result<Vec<AttendanceEntry>, sqlx::Error> {
        let sql = format!(
            "{ENTRY_COLUMNS} WHERE a.school_id = ?1 AND a.date >= ?2 AND a.date <= ?3 \
             AND (?4 IS NULL OR a.student_id = ?4) \
             ORDER BY a.date DESC, a.time_in DESC, s.name"
        );
        sqlx::query_as::<_, AttendanceEntry>(&sql)
            .bind(school_id)
            .bind(from)
            .bind(to)
            .bind(student_id)
            .fetch_all(&self.pool)
            .await
    }

    pub async fn student_history(
        &self,
        student_id: i64,
        limit: i64,
    ) -> Result<Vec<Attendance>, sqlx::Error> {
        sqlx::query_as::<_, Attendance>(
            "SELECT * FROM attendance WHERE student_id = ? ORDER BY date DESC LIMIT ?",
        )
        .bind(student_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn student_attendance_since(
        &self,
        student_id: i64,
        since: NaiveDate,
    ) -> Result<Vec<Attendance>, sqlx::Error> {
        sqlx::query_as::<_, Attendance>(
            "SELECT * FROM attendance WHERE student_id = ? AND date >= ? ORDER BY date",
        )
        .bind(student_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await
    }

    /// Present marks between `from` and `to` inclusive, for one school or all of them.
    pub async fn count_present(
        &self,
        school_id: Option<i64>,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM attendance
            WHERE (?1 IS NULL OR school_id = ?1)
              AND date >= ?2 AND date <= ?3
              AND status = 'present'
            "#,
        )
        .bind(school_id)
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn count_attendance_records(
        &self,
        student_id: i64,
        school_id: i64,
        date: NaiveDate,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM attendance WHERE student_id = ? AND school_id = ? AND date = ?",
        )
        .bind(student_id)
        .bind(school_id)
        .bind(date)
        .fetch_one(&self.pool)
        .await
    }

    // Scorer support

    pub async fn schools_with_attendance(&self) -> Result<Vec<i64>, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT DISTINCT school_id FROM attendance ORDER BY school_id")
            .fetch_all(&self.pool)
            .await
    }

    pub async fn attendance_for_school(&self, school_id: i64) -> Result<Vec<Attendance>, sqlx::Error> {
        sqlx::query_as::<_, Attendance>(
            "SELECT * FROM attendance WHERE school_id = ? ORDER BY date, student_id",
        )
        .bind(school_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Writes scorer output in one transaction. Returns the number of students updated.
    pub async fn apply_scores(&self, updates: &[ScoreUpdate]) -> Result<u64, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let mut updated = 0;
        let now = Utc::now();
        for update in updates {
            let result = sqlx::query(
                r#"
                UPDATE students SET
                    attendance_percentage = ?, max_consec_absences = ?, num_long_streaks = ?,
                    dropout_risk = ?, dropout_pred = ?, updated_at = ?
                WHERE id = ? AND school_id = ?
                "#,
            )
            .bind(update.attendance_percentage)
            .bind(update.max_consec_absences)
            .bind(update.num_long_streaks)
            .bind(update.dropout_risk)
            .bind(update.dropout_pred)
            .bind(now)
            .bind(update.student_id)
            .bind(update.school_id)
            .execute(&mut *tx)
            .await?;
            updated += result.rows_affected();
        }
        tx.commit().await?;
        Ok(updated)
    }
}

async fn upsert_attendance<'e, E>(executor: E, mark: &AttendanceMark) -> Result<Attendance, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let now = Utc::now();
    let time_in = mark.status.records_arrival().then_some(now);
    sqlx::query_as::<_, Attendance>(UPSERT_ATTENDANCE)
        .bind(mark.student_id)
        .bind(mark.school_id)
        .bind(mark.date)
        .bind(mark.status)
        .bind(mark.method)
        .bind(mark.marked_by)
        .bind(time_in)
        .bind(now)
        .bind(now)
        .fetch_one(executor)
        .await
}

/// Builds a `LIKE` pattern matching `term` anywhere, escaping wildcards with `\`.
fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// True when the error is a violated `UNIQUE` constraint.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("ann"), "%ann%");
        assert_eq!(like_pattern("10%_a\\b"), "%10\\%\\_a\\\\b%");
    }
}
