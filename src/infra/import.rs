//! CSV import of skill and student sheets.
//!
//! Headers are matched case-insensitively against a few aliases. Skill sheets
//! without a recognizable header fall back to the column order
//! `S/N, code, description, trainer, phone`.

use std::collections::HashSet;
use std::io::Read;

use thiserror::Error;

use crate::core::{NewSkill, RegistryError, RegistryStore, StudentPatch};

/// Failures while reading a sheet.
#[derive(Debug, Error)]
pub enum ImportError {
    /// Malformed CSV input.
    #[error("CSV processing error: {0}")]
    Csv(#[from] csv::Error),
    /// A required column is absent from the header.
    #[error("missing column: {0}")]
    MissingColumn(&'static str),
}

/// One skill from a skill sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillRow {
    /// Skill code.
    pub code: String,
    /// Description.
    pub description: String,
    /// Trainer name.
    pub trainer: Option<String>,
    /// Trainer phone.
    pub phone: Option<String>,
}

impl SkillRow {
    /// Skill definition with the given capacity and visibility.
    pub fn into_new_skill(self, max_selection: u32, hidden: bool) -> NewSkill {
        NewSkill {
            code: self.code,
            description: self.description,
            trainer: self.trainer,
            phone: self.phone,
            max_selection,
            hidden,
        }
    }
}

/// One student from an enrolment sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentRow {
    /// Matric number.
    pub matric_number: String,
    /// Full name.
    pub name: String,
    /// Department.
    pub department: Option<String>,
    /// Faculty.
    pub faculty: Option<String>,
    /// Phone.
    pub phone: Option<String>,
    /// Course code.
    pub course_code: Option<String>,
}

impl StudentRow {
    /// Patch applied when seeding this student.
    pub fn patch(&self) -> StudentPatch {
        StudentPatch {
            name: Some(self.name.clone()),
            department: self.department.clone(),
            faculty: self.faculty.clone(),
            phone: self.phone.clone(),
            course_code: self.course_code.clone(),
            ..StudentPatch::default()
        }
    }
}

const SKILL_CODE: &[&str] = &["code", "skill code", "skill_code"];
const SKILL_DESCRIPTION: &[&str] = &["description", "skill", "skill description", "skill name"];
const SKILL_TRAINER: &[&str] = &["trainer", "trainer name", "trainer's name"];
const SKILL_PHONE: &[&str] = &["phone", "phone no", "phone number", "trainer phone", "trainer's phone"];

const MATRIC: &[&str] = &["matric number", "matricnumber", "matric_number", "matric"];
const NAME: &[&str] = &["name", "full name", "fullname"];
const FIRST_NAME: &[&str] = &["firstname", "first name", "first_name"];
const LAST_NAME: &[&str] = &["lastname", "last name", "last_name", "surname"];
const DEPARTMENT: &[&str] = &["department"];
const FACULTY: &[&str] = &["faculty"];
const PHONE: &[&str] = &["phone", "phone no", "phone number"];
const COURSE_CODE: &[&str] = &["course code", "course_code", "course"];

fn column(headers: &csv::StringRecord, aliases: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| aliases.contains(&h.trim().to_lowercase().as_str()))
}

fn field(record: &csv::StringRecord, idx: Option<usize>) -> Option<String> {
    idx.and_then(|i| record.get(i))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

/// Read skill rows. Rows without a code or description are skipped.
pub fn read_skill_rows<R: Read>(input: R) -> Result<Vec<SkillRow>, ImportError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(input);
    let headers = reader.headers()?.clone();
    let (code_col, description_col, trainer_col, phone_col) = match column(&headers, SKILL_CODE) {
        Some(code) => (
            Some(code),
            column(&headers, SKILL_DESCRIPTION),
            column(&headers, SKILL_TRAINER),
            column(&headers, SKILL_PHONE),
        ),
        None => (Some(1), Some(2), Some(3), Some(4)),
    };
    if description_col.is_none() {
        return Err(ImportError::MissingColumn("description"));
    }

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let (Some(code), Some(description)) =
            (field(&record, code_col), field(&record, description_col))
        else {
            tracing::debug!("skipping skill row {}: no code or description", line + 2);
            continue;
        };
        rows.push(SkillRow {
            code,
            description,
            trainer: field(&record, trainer_col),
            phone: field(&record, phone_col),
        });
    }
    Ok(rows)
}

/// Read student rows. Rows without a matric number or name are skipped.
pub fn read_student_rows<R: Read>(input: R) -> Result<Vec<StudentRow>, ImportError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(input);
    let headers = reader.headers()?.clone();
    let matric = column(&headers, MATRIC).ok_or(ImportError::MissingColumn("matric number"))?;
    let name = column(&headers, NAME);
    let first = column(&headers, FIRST_NAME);
    let last = column(&headers, LAST_NAME);
    let department = column(&headers, DEPARTMENT);
    let faculty = column(&headers, FACULTY);
    let phone = column(&headers, PHONE);
    let course = column(&headers, COURSE_CODE);

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let full_name = field(&record, name).or_else(|| {
            let parts: Vec<String> = [field(&record, first), field(&record, last)]
                .into_iter()
                .flatten()
                .collect();
            (!parts.is_empty()).then(|| parts.join(" "))
        });
        let (Some(matric_number), Some(name)) = (field(&record, Some(matric)), full_name) else {
            tracing::warn!("skipping student row {}: missing matric number or name", line + 2);
            continue;
        };
        rows.push(StudentRow {
            matric_number,
            name,
            department: field(&record, department),
            faculty: field(&record, faculty),
            phone: field(&record, phone),
            course_code: field(&record, course),
        });
    }
    Ok(rows)
}

/// Upsert skills, hiding those whose description is listed. Existing counts
/// are kept. Returns the number of skills written.
pub async fn seed_skills<S: RegistryStore>(
    store: &S,
    rows: Vec<SkillRow>,
    max_selection: u32,
    hidden_descriptions: &[String],
) -> Result<usize, RegistryError> {
    let hidden: HashSet<String> = hidden_descriptions
        .iter()
        .map(|d| d.trim().to_lowercase())
        .collect();
    let mut written = 0;
    for row in rows {
        let is_hidden = hidden.contains(&row.description.to_lowercase());
        let code = row.code.clone();
        match store
            .upsert_resource(row.into_new_skill(max_selection, is_hidden))
            .await
        {
            Ok(()) => {
                written += 1;
                tracing::info!("seeded skill {}{}", code, if is_hidden { " (hidden)" } else { "" });
            }
            Err(e) => tracing::error!("error seeding skill {}: {}", code, e),
        }
    }
    Ok(written)
}

/// Upsert students by matric number. Returns the number written.
pub async fn seed_students<S: RegistryStore>(
    store: &S,
    rows: &[StudentRow],
) -> Result<usize, RegistryError> {
    let mut written = 0;
    for row in rows {
        match store.upsert_holder(&row.matric_number, row.patch()).await {
            Ok(_) => {
                written += 1;
                tracing::info!("seeded student {} - {}", row.matric_number, row.name);
            }
            Err(e) => tracing::error!("error seeding {} - {}: {}", row.matric_number, row.name, e),
        }
    }
    Ok(written)
}
