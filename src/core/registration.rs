//! Student-facing registration flow.
//!
//! Lookup by matric number, identity confirmation, contact details with an
//! emailed one-time code, then skill selection. Mail goes through the
//! [`DispatchGovernor`] and never blocks or fails the caller's operation.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::core::dispatch::{DispatchGovernor, SendRequest};
use crate::core::reservation::CapacityReservation;
use crate::core::store::{HolderKey, RegistryStore, Skill, SkillFilter, Student, StudentPatch};
use crate::core::{DispatchError, RegistryError};

/// Default lifetime of a one-time code.
pub const DEFAULT_OTP_TTL: Duration = Duration::from_secs(10 * 60);

/// Result of looking up a matric number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatricLookup {
    /// Known student who still has to pick skills.
    Pending(Student),
    /// Registration already completed with these codes.
    Registered(Vec<String>),
}

/// Contact details submitted after identity confirmation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailsSubmission {
    /// Matric number.
    pub matric_number: String,
    /// Department.
    pub department: Option<String>,
    /// Faculty.
    pub faculty: Option<String>,
    /// Phone number.
    pub phone: Option<String>,
    /// Email address to verify.
    pub email: Option<String>,
}

/// Trainer details for a chosen skill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainerContact {
    /// Skill code.
    pub code: String,
    /// Skill description.
    pub description: String,
    /// Trainer name.
    pub trainer: Option<String>,
    /// Trainer phone.
    pub phone: Option<String>,
}

impl From<&Skill> for TrainerContact {
    fn from(skill: &Skill) -> Self {
        Self {
            code: skill.code.clone(),
            description: skill.description.clone(),
            trainer: skill.trainer.clone(),
            phone: skill.phone.clone(),
        }
    }
}

/// Result of a skill selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillSelection {
    /// Student matric number.
    pub matric_number: String,
    /// Trainers for the skills the student holds.
    pub trainers: Vec<TrainerContact>,
    /// `false` when the student had already registered.
    pub newly_registered: bool,
}

/// Registration operations over a store and a dispatch governor.
pub struct RegistrationService<S> {
    store: Arc<S>,
    reservation: CapacityReservation<S>,
    governor: DispatchGovernor,
    otp_ttl: Duration,
}

impl<S: RegistryStore> RegistrationService<S> {
    /// Create a service sharing `store` with its reservation engine.
    pub fn new(store: Arc<S>, governor: DispatchGovernor) -> Self {
        Self {
            reservation: CapacityReservation::new(Arc::clone(&store)),
            store,
            governor,
            otp_ttl: DEFAULT_OTP_TTL,
        }
    }

    /// Replace the reservation engine, e.g. to attach an audit sink.
    #[must_use]
    pub fn with_reservation(mut self, reservation: CapacityReservation<S>) -> Self {
        self.reservation = reservation;
        self
    }

    /// Override the one-time code lifetime.
    #[must_use]
    pub const fn with_otp_ttl(mut self, ttl: Duration) -> Self {
        self.otp_ttl = ttl;
        self
    }

    /// Look up a student without creating one.
    pub async fn lookup(&self, matric: &str) -> Result<MatricLookup, RegistryError> {
        let student = self
            .store
            .find_holder(&HolderKey::Matric(matric.trim().to_string()))
            .await?
            .ok_or_else(|| RegistryError::student_not_found(matric.trim()))?;
        if student.is_registered() {
            return Ok(MatricLookup::Registered(student.skills));
        }
        Ok(MatricLookup::Pending(student))
    }

    /// Record the confirmed name, creating the student if needed.
    pub async fn confirm_identity(
        &self,
        matric: &str,
        name: &str,
        carry_over: bool,
    ) -> Result<Student, RegistryError> {
        let patch = StudentPatch {
            name: Some(name.trim().to_string()),
            carry_over: carry_over.then_some(true),
            ..StudentPatch::default()
        };
        self.store.upsert_holder(matric.trim(), patch).await
    }

    /// Save contact details and, for an unverified email, send a one-time code.
    ///
    /// Returns whether a code was issued.
    pub async fn submit_details(&self, details: DetailsSubmission) -> Result<bool, RegistryError> {
        let matric = details.matric_number.trim().to_string();
        let email = details
            .email
            .as_deref()
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty());

        if let Some(email) = &email {
            if let Some(owner) = self
                .store
                .find_holder(&HolderKey::Email(email.clone()))
                .await?
            {
                if owner.matric_number != matric {
                    return Err(RegistryError::EmailInUse);
                }
            }
        }

        let student = self
            .store
            .upsert_holder(
                &matric,
                StudentPatch {
                    department: details.department,
                    faculty: details.faculty,
                    phone: details.phone,
                    email: email.clone(),
                    ..StudentPatch::default()
                },
            )
            .await?;

        let Some(email) = email else {
            return Ok(false);
        };
        if student.email_verified {
            return Err(RegistryError::EmailAlreadyVerified);
        }

        let otp = generate_otp();
        let ttl = chrono::Duration::from_std(self.otp_ttl)
            .map_err(|e| RegistryError::Config(format!("otp ttl out of range: {e}")))?;
        let key = HolderKey::Email(email.clone());
        if !self.store.set_otp(&key, &otp, Utc::now() + ttl).await? {
            return Err(RegistryError::student_not_found(email));
        }
        self.notify(SendRequest::text(
            email,
            "Your OTP Code",
            format!("Your OTP code is: {otp}"),
        ));
        Ok(true)
    }

    /// Check a one-time code. A match before expiry verifies the email.
    pub async fn verify_otp(&self, identifier: &str, code: &str) -> Result<bool, RegistryError> {
        let key = HolderKey::parse(identifier);
        let Some(student) = self.store.find_holder(&key).await? else {
            return Ok(false);
        };
        let matches = student.otp.as_deref() == Some(code.trim());
        let fresh = student.otp_expires.is_some_and(|at| at >= Utc::now());
        if !(matches && fresh) {
            tracing::debug!("otp rejected for {}", student.matric_number);
            return Ok(false);
        }
        self.store.mark_verified(&key).await?;
        tracing::info!("email verified for {}", student.matric_number);
        Ok(true)
    }

    /// Skills offered to students. Hidden skills are never listed.
    pub async fn available_skills(&self) -> Result<Vec<Skill>, RegistryError> {
        self.store.list_resources(SkillFilter::Visible).await
    }

    /// Reserve skills and, on a fresh registration, mail the trainer details.
    pub async fn select_skills(
        &self,
        identifier: &str,
        codes: &[String],
    ) -> Result<SkillSelection, RegistryError> {
        let key = HolderKey::parse(identifier);
        let reservation = self.reservation.reserve(&key, codes).await?;
        let trainers: Vec<TrainerContact> =
            reservation.resources.iter().map(TrainerContact::from).collect();

        if reservation.newly_registered {
            let email = reservation.holder.email.clone().or_else(|| match &key {
                HolderKey::Email(e) => Some(e.clone()),
                HolderKey::Matric(_) => None,
            });
            if let Some(email) = email {
                self.notify(SendRequest::text(
                    email,
                    "Skill Selection Confirmation & Trainer Details",
                    confirmation_text(&trainers),
                ));
            }
        }

        Ok(SkillSelection {
            matric_number: reservation.holder.matric_number,
            trainers,
            newly_registered: reservation.newly_registered,
        })
    }

    /// Fire-and-forget: the worker logs the outcome.
    fn notify(&self, request: SendRequest) {
        let to = request.to.clone();
        match self.governor.dispatch(request) {
            Ok(_) => tracing::debug!("queued mail to {}", to),
            Err(DispatchError::TransportDisabled) => {
                tracing::warn!("mail transport disabled; {} not notified", to);
            }
            Err(e) => tracing::warn!("could not queue mail to {}: {}", to, e),
        }
    }
}

/// A six-digit one-time code.
pub fn generate_otp() -> String {
    rand::rng().random_range(100_000..=999_999).to_string()
}

/// Body of the selection confirmation mail.
pub fn confirmation_text(trainers: &[TrainerContact]) -> String {
    let lines: Vec<String> = trainers
        .iter()
        .map(|t| {
            format!(
                "Skill: {}\n - Trainer: {}\n - Phone: {}",
                t.description,
                t.trainer.as_deref().unwrap_or("N/A"),
                t.phone.as_deref().unwrap_or("N/A")
            )
        })
        .collect();
    format!(
        "Your skill selection is confirmed. Please contact your trainer(s):\n\n{}",
        lines.join("\n")
    )
}
