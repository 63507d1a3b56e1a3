//! Store abstraction for students and skills.
//!
//! Every capacity-changing operation here must be atomic at the backend:
//! correctness of reservations relies on it, not on in-process locking, since
//! several processes may share one store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::RegistryError;

/// A capacity-bounded training option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skill {
    /// Unique skill code, e.g. `TEC80`.
    pub code: String,
    /// Human-readable description.
    pub description: String,
    /// Trainer name.
    pub trainer: Option<String>,
    /// Trainer phone number.
    pub phone: Option<String>,
    /// Maximum number of students.
    pub max_selection: u32,
    /// Current number of reservations.
    pub selected_count: u32,
    /// Hidden skills are never offered to students.
    pub hidden: bool,
}

impl Skill {
    /// Slots still available.
    pub const fn remaining(&self) -> u32 {
        self.max_selection.saturating_sub(self.selected_count)
    }
}

/// Seed data for creating or replacing a skill definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSkill {
    /// Skill code.
    pub code: String,
    /// Description.
    pub description: String,
    /// Trainer name.
    pub trainer: Option<String>,
    /// Trainer phone number.
    pub phone: Option<String>,
    /// Capacity.
    pub max_selection: u32,
    /// Whether the skill starts hidden.
    pub hidden: bool,
}

/// A student, identified by matric number and optionally by a unique email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    /// Matriculation number (primary identity).
    pub matric_number: String,
    /// Full name.
    pub name: String,
    /// Department.
    pub department: Option<String>,
    /// Faculty.
    pub faculty: Option<String>,
    /// Phone number.
    pub phone: Option<String>,
    /// Email address, unique when present.
    pub email: Option<String>,
    /// Set once the emailed code was confirmed.
    pub email_verified: bool,
    /// Held skill codes; non-empty means registration is complete.
    pub skills: Vec<String>,
    /// Pending one-time code.
    pub otp: Option<String>,
    /// Expiry of the pending code.
    pub otp_expires: Option<DateTime<Utc>>,
    /// Carry-over student flag.
    pub carry_over: bool,
    /// Course code from the enrolment sheet.
    pub course_code: Option<String>,
}

impl Student {
    /// A student holding any skill has finished registration.
    pub fn is_registered(&self) -> bool {
        !self.skills.is_empty()
    }
}

/// Partial update applied by [`RegistryStore::upsert_holder`]. `None` leaves a
/// field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentPatch {
    /// Full name.
    pub name: Option<String>,
    /// Department.
    pub department: Option<String>,
    /// Faculty.
    pub faculty: Option<String>,
    /// Phone number.
    pub phone: Option<String>,
    /// Email address.
    pub email: Option<String>,
    /// Carry-over flag.
    pub carry_over: Option<bool>,
    /// Course code.
    pub course_code: Option<String>,
}

/// How a student is addressed by callers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HolderKey {
    /// By matriculation number.
    Matric(String),
    /// By verified email.
    Email(String),
}

impl HolderKey {
    /// Identifiers containing `@` are emails, anything else a matric number.
    pub fn parse(identifier: &str) -> Self {
        let identifier = identifier.trim();
        if identifier.contains('@') {
            Self::Email(identifier.to_lowercase())
        } else {
            Self::Matric(identifier.to_string())
        }
    }

    /// Raw identifier value.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Matric(v) | Self::Email(v) => v,
        }
    }
}

/// Outcome of a guarded increment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncrementOutcome {
    /// One unit reserved; carries the updated skill.
    Reserved(Skill),
    /// The skill is at capacity.
    Full,
    /// No skill with that code.
    Missing,
}

/// Selection of skills for listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SkillFilter {
    /// Only skills offered to students.
    #[default]
    Visible,
    /// Only hidden skills.
    Hidden,
    /// Everything.
    All,
}

impl SkillFilter {
    /// Whether a skill passes this filter.
    pub const fn matches(self, skill: &Skill) -> bool {
        match self {
            Self::Visible => !skill.hidden,
            Self::Hidden => skill.hidden,
            Self::All => true,
        }
    }
}

/// Abstraction for the persistent registry backend.
#[async_trait]
pub trait RegistryStore: Send + Sync + 'static {
    /// Look up a student.
    async fn find_holder(&self, key: &HolderKey) -> Result<Option<Student>, RegistryError>;

    /// Create the student if missing, then apply the patch.
    ///
    /// Fails with [`RegistryError::EmailInUse`] when the patch assigns an email
    /// held by another student.
    async fn upsert_holder(
        &self,
        matric: &str,
        patch: StudentPatch,
    ) -> Result<Student, RegistryError>;

    /// Store a one-time code and its expiry. Returns `false` if no such student.
    async fn set_otp(
        &self,
        key: &HolderKey,
        otp: &str,
        expires: DateTime<Utc>,
    ) -> Result<bool, RegistryError>;

    /// Mark the email verified and clear any pending code.
    async fn mark_verified(&self, key: &HolderKey) -> Result<(), RegistryError>;

    /// Write the skill set only if the student currently holds none.
    ///
    /// Returns `false` when the student was already registered.
    async fn assign_resources(&self, matric: &str, codes: &[String])
        -> Result<bool, RegistryError>;

    /// Remove the given codes from a student, returning the ones that were held.
    async fn release_resources(
        &self,
        matric: &str,
        codes: &[String],
    ) -> Result<Vec<String>, RegistryError>;

    /// Students holding any of the given codes.
    async fn holders_with_resources(&self, codes: &[String])
        -> Result<Vec<Student>, RegistryError>;

    /// Look up a skill.
    async fn find_resource(&self, code: &str) -> Result<Option<Skill>, RegistryError>;

    /// Atomically increment `selected_count` if below `max_selection`.
    async fn conditional_increment(&self, code: &str) -> Result<IncrementOutcome, RegistryError>;

    /// Decrement `selected_count` by `by`, never below zero.
    async fn decrement(&self, code: &str, by: u32) -> Result<(), RegistryError>;

    /// List skills passing the filter, ordered by code.
    async fn list_resources(&self, filter: SkillFilter) -> Result<Vec<Skill>, RegistryError>;

    /// Insert or replace a skill definition, keeping its current count.
    async fn upsert_resource(&self, skill: NewSkill) -> Result<(), RegistryError>;

    /// Set the hidden flag on every skill whose description matches
    /// case-insensitively. Returns the number of matched skills.
    async fn hide_by_description(&self, description: &str) -> Result<u64, RegistryError>;

    /// Change `max_selection` from `from` to `to` wherever it equals `from`.
    async fn replace_limit(&self, from: u32, to: u32) -> Result<u64, RegistryError>;

    /// Delete every student. Returns the number removed.
    async fn clear_holders(&self) -> Result<u64, RegistryError>;

    /// Delete every skill. Returns the number removed.
    async fn clear_resources(&self) -> Result<u64, RegistryError>;
}
