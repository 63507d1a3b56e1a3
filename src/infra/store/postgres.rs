//! Postgres-backed registry store.
//!
//! Capacity guards live in the SQL itself: the increment only matches rows
//! below capacity and the skill assignment only matches students holding none,
//! so concurrent processes sharing the database stay consistent.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};

use crate::core::{
    HolderKey, IncrementOutcome, NewSkill, RegistryError, RegistryStore, Skill, SkillFilter,
    Student, StudentPatch,
};

#[derive(Debug, FromRow)]
struct SkillRow {
    code: String,
    description: String,
    trainer: Option<String>,
    phone: Option<String>,
    max_selection: i32,
    selected_count: i32,
    hidden: bool,
}

impl From<SkillRow> for Skill {
    fn from(row: SkillRow) -> Self {
        Self {
            code: row.code,
            description: row.description,
            trainer: row.trainer,
            phone: row.phone,
            max_selection: u32::try_from(row.max_selection).unwrap_or_default(),
            selected_count: u32::try_from(row.selected_count).unwrap_or_default(),
            hidden: row.hidden,
        }
    }
}

#[derive(Debug, FromRow)]
struct StudentRow {
    matric_number: String,
    name: String,
    department: Option<String>,
    faculty: Option<String>,
    phone: Option<String>,
    email: Option<String>,
    email_verified: bool,
    skills: Vec<String>,
    otp: Option<String>,
    otp_expires: Option<DateTime<Utc>>,
    carry_over: bool,
    course_code: Option<String>,
}

impl From<StudentRow> for Student {
    fn from(row: StudentRow) -> Self {
        Self {
            matric_number: row.matric_number,
            name: row.name,
            department: row.department,
            faculty: row.faculty,
            phone: row.phone,
            email: row.email,
            email_verified: row.email_verified,
            skills: row.skills,
            otp: row.otp,
            otp_expires: row.otp_expires,
            carry_over: row.carry_over,
            course_code: row.course_code,
        }
    }
}

fn store_err(e: sqlx::Error) -> RegistryError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return RegistryError::EmailInUse;
        }
    }
    RegistryError::Store(e.to_string())
}

fn to_i32(value: u32) -> Result<i32, RegistryError> {
    i32::try_from(value).map_err(|_| RegistryError::Store(format!("{value} out of range")))
}

/// Column and value addressing a student.
fn key_column(key: &HolderKey) -> (&'static str, &str) {
    match key {
        HolderKey::Matric(m) => ("matric_number", m.as_str()),
        HolderKey::Email(e) => ("email", e.as_str()),
    }
}

/// Postgres store over a connection pool.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Wrap an existing pool.
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to `url`.
    pub async fn connect(url: &str) -> Result<Self, RegistryError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(store_err)?;
        Ok(Self::new(pool))
    }

    /// Migration statements for registry storage.
    pub const fn migrations() -> &'static [&'static str] {
        &[
            r"
CREATE TABLE IF NOT EXISTS skills (
    code TEXT PRIMARY KEY,
    description TEXT NOT NULL,
    trainer TEXT,
    phone TEXT,
    max_selection INTEGER NOT NULL CHECK (max_selection >= 0),
    selected_count INTEGER NOT NULL DEFAULT 0 CHECK (selected_count >= 0),
    hidden BOOLEAN NOT NULL DEFAULT FALSE,
    CONSTRAINT skills_within_capacity CHECK (selected_count <= max_selection)
);
CREATE INDEX IF NOT EXISTS idx_skills_hidden ON skills (hidden);
",
            r"
CREATE TABLE IF NOT EXISTS students (
    matric_number TEXT PRIMARY KEY,
    name TEXT NOT NULL DEFAULT '',
    department TEXT,
    faculty TEXT,
    phone TEXT,
    email TEXT,
    email_verified BOOLEAN NOT NULL DEFAULT FALSE,
    skills TEXT[] NOT NULL DEFAULT '{}',
    otp TEXT,
    otp_expires TIMESTAMPTZ,
    carry_over BOOLEAN NOT NULL DEFAULT FALSE,
    course_code TEXT
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_students_email ON students (email) WHERE email IS NOT NULL;
CREATE INDEX IF NOT EXISTS idx_students_skills ON students USING GIN (skills);
",
        ]
    }

    /// Apply [`Self::migrations`].
    pub async fn migrate(&self) -> Result<(), RegistryError> {
        for statement in Self::migrations() {
            sqlx::raw_sql(statement)
                .execute(&self.pool)
                .await
                .map_err(store_err)?;
        }
        tracing::info!("registry schema up to date");
        Ok(())
    }

    async fn student_exists(&self, matric: &str) -> Result<bool, RegistryError> {
        let found: Option<(String,)> =
            sqlx::query_as("SELECT matric_number FROM students WHERE matric_number = $1")
                .bind(matric)
                .fetch_optional(&self.pool)
                .await
                .map_err(store_err)?;
        Ok(found.is_some())
    }
}

#[async_trait]
impl RegistryStore for PostgresStore {
    async fn find_holder(&self, key: &HolderKey) -> Result<Option<Student>, RegistryError> {
        let (column, value) = key_column(key);
        let sql = format!("SELECT * FROM students WHERE {column} = $1 LIMIT 1");
        let row = sqlx::query_as::<_, StudentRow>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(row.map(Student::from))
    }

    async fn upsert_holder(
        &self,
        matric: &str,
        patch: StudentPatch,
    ) -> Result<Student, RegistryError> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;
        sqlx::query("INSERT INTO students (matric_number) VALUES ($1) ON CONFLICT DO NOTHING")
            .bind(matric)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;

        // SET expressions all read the old row, so the email comparison sees
        // the previous address.
        let row = sqlx::query_as::<_, StudentRow>(
            r"
UPDATE students SET
    name = COALESCE($2::text, name),
    department = COALESCE($3::text, department),
    faculty = COALESCE($4::text, faculty),
    phone = COALESCE($5::text, phone),
    email_verified = CASE WHEN $6::text IS NOT NULL AND email IS DISTINCT FROM $6::text
        THEN FALSE ELSE email_verified END,
    otp = CASE WHEN $6::text IS NOT NULL AND email IS DISTINCT FROM $6::text
        THEN NULL ELSE otp END,
    otp_expires = CASE WHEN $6::text IS NOT NULL AND email IS DISTINCT FROM $6::text
        THEN NULL ELSE otp_expires END,
    email = COALESCE($6::text, email),
    carry_over = COALESCE($7::boolean, carry_over),
    course_code = COALESCE($8::text, course_code)
WHERE matric_number = $1
RETURNING *
",
        )
        .bind(matric)
        .bind(patch.name)
        .bind(patch.department)
        .bind(patch.faculty)
        .bind(patch.phone)
        .bind(patch.email)
        .bind(patch.carry_over)
        .bind(patch.course_code)
        .fetch_one(&mut *tx)
        .await
        .map_err(store_err)?;
        tx.commit().await.map_err(store_err)?;
        Ok(row.into())
    }

    async fn set_otp(
        &self,
        key: &HolderKey,
        otp: &str,
        expires: DateTime<Utc>,
    ) -> Result<bool, RegistryError> {
        let (column, value) = key_column(key);
        let sql = format!("UPDATE students SET otp = $2, otp_expires = $3 WHERE {column} = $1");
        let done = sqlx::query(&sql)
            .bind(value)
            .bind(otp)
            .bind(expires)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(done.rows_affected() > 0)
    }

    async fn mark_verified(&self, key: &HolderKey) -> Result<(), RegistryError> {
        let (column, value) = key_column(key);
        let sql = format!(
            "UPDATE students SET email_verified = TRUE, otp = NULL, otp_expires = NULL WHERE {column} = $1"
        );
        let done = sqlx::query(&sql)
            .bind(value)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        if done.rows_affected() == 0 {
            return Err(RegistryError::student_not_found(value));
        }
        Ok(())
    }

    async fn assign_resources(
        &self,
        matric: &str,
        codes: &[String],
    ) -> Result<bool, RegistryError> {
        let done = sqlx::query(
            "UPDATE students SET skills = $2 WHERE matric_number = $1 AND cardinality(skills) = 0",
        )
        .bind(matric)
        .bind(codes)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        if done.rows_affected() > 0 {
            return Ok(true);
        }
        if self.student_exists(matric).await? {
            Ok(false)
        } else {
            Err(RegistryError::student_not_found(matric))
        }
    }

    async fn release_resources(
        &self,
        matric: &str,
        codes: &[String],
    ) -> Result<Vec<String>, RegistryError> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;
        let held: Option<(Vec<String>,)> =
            sqlx::query_as("SELECT skills FROM students WHERE matric_number = $1 FOR UPDATE")
                .bind(matric)
                .fetch_optional(&mut *tx)
                .await
                .map_err(store_err)?;
        let Some((held,)) = held else {
            return Err(RegistryError::student_not_found(matric));
        };
        let (removed, kept): (Vec<String>, Vec<String>) =
            held.into_iter().partition(|code| codes.contains(code));
        if !removed.is_empty() {
            sqlx::query("UPDATE students SET skills = $2 WHERE matric_number = $1")
                .bind(matric)
                .bind(&kept)
                .execute(&mut *tx)
                .await
                .map_err(store_err)?;
        }
        tx.commit().await.map_err(store_err)?;
        Ok(removed)
    }

    async fn holders_with_resources(
        &self,
        codes: &[String],
    ) -> Result<Vec<Student>, RegistryError> {
        let rows = sqlx::query_as::<_, StudentRow>(
            "SELECT * FROM students WHERE skills && $1 ORDER BY matric_number",
        )
        .bind(codes)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(rows.into_iter().map(Student::from).collect())
    }

    async fn find_resource(&self, code: &str) -> Result<Option<Skill>, RegistryError> {
        let row = sqlx::query_as::<_, SkillRow>("SELECT * FROM skills WHERE code = $1")
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(row.map(Skill::from))
    }

    async fn conditional_increment(&self, code: &str) -> Result<IncrementOutcome, RegistryError> {
        let row = sqlx::query_as::<_, SkillRow>(
            r"
UPDATE skills SET selected_count = selected_count + 1
WHERE code = $1 AND selected_count < max_selection
RETURNING *
",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;
        if let Some(row) = row {
            return Ok(IncrementOutcome::Reserved(row.into()));
        }
        Ok(match self.find_resource(code).await? {
            Some(_) => IncrementOutcome::Full,
            None => IncrementOutcome::Missing,
        })
    }

    async fn decrement(&self, code: &str, by: u32) -> Result<(), RegistryError> {
        let done = sqlx::query(
            "UPDATE skills SET selected_count = GREATEST(selected_count - $2, 0) WHERE code = $1",
        )
        .bind(code)
        .bind(to_i32(by)?)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        if done.rows_affected() == 0 {
            return Err(RegistryError::skill_not_found(code));
        }
        Ok(())
    }

    async fn list_resources(&self, filter: SkillFilter) -> Result<Vec<Skill>, RegistryError> {
        let sql = match filter {
            SkillFilter::Visible => "SELECT * FROM skills WHERE NOT hidden ORDER BY code",
            SkillFilter::Hidden => "SELECT * FROM skills WHERE hidden ORDER BY code",
            SkillFilter::All => "SELECT * FROM skills ORDER BY code",
        };
        let rows = sqlx::query_as::<_, SkillRow>(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(rows.into_iter().map(Skill::from).collect())
    }

    async fn upsert_resource(&self, skill: NewSkill) -> Result<(), RegistryError> {
        sqlx::query(
            r"
INSERT INTO skills (code, description, trainer, phone, max_selection, hidden)
VALUES ($1, $2, $3, $4, $5, $6)
ON CONFLICT (code) DO UPDATE SET
    description = EXCLUDED.description,
    trainer = EXCLUDED.trainer,
    phone = EXCLUDED.phone,
    max_selection = GREATEST(EXCLUDED.max_selection, skills.selected_count),
    hidden = EXCLUDED.hidden
",
        )
        .bind(&skill.code)
        .bind(&skill.description)
        .bind(&skill.trainer)
        .bind(&skill.phone)
        .bind(to_i32(skill.max_selection)?)
        .bind(skill.hidden)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn hide_by_description(&self, description: &str) -> Result<u64, RegistryError> {
        let done = sqlx::query(
            "UPDATE skills SET hidden = TRUE WHERE lower(trim(description)) = lower(trim($1))",
        )
        .bind(description)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(done.rows_affected())
    }

    async fn replace_limit(&self, from: u32, to: u32) -> Result<u64, RegistryError> {
        let done = sqlx::query(
            "UPDATE skills SET max_selection = $2 WHERE max_selection = $1 AND selected_count <= $2",
        )
        .bind(to_i32(from)?)
        .bind(to_i32(to)?)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(done.rows_affected())
    }

    async fn clear_holders(&self) -> Result<u64, RegistryError> {
        let done = sqlx::query("DELETE FROM students")
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(done.rows_affected())
    }

    async fn clear_resources(&self) -> Result<u64, RegistryError> {
        let done = sqlx::query("DELETE FROM skills")
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(done.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_guard_capacity_and_email() {
        let sql = PostgresStore::migrations().join("\n");
        assert!(sql.contains("CHECK (selected_count >= 0)"));
        assert!(sql.contains("CHECK (selected_count <= max_selection)"));
        assert!(sql.contains("UNIQUE INDEX IF NOT EXISTS idx_students_email"));
    }

    #[test]
    fn test_negative_counts_read_as_zero() {
        let skill: Skill = SkillRow {
            code: "A".into(),
            description: "a".into(),
            trainer: None,
            phone: None,
            max_selection: 3,
            selected_count: -1,
            hidden: false,
        }
        .into();
        assert_eq!(skill.selected_count, 0);
    }
}
