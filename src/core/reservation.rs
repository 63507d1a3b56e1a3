//! Capacity-bounded skill reservation with rollback on partial failure.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::audit::{build_audit_event, AuditAction, AuditSink};
use crate::core::store::{HolderKey, IncrementOutcome, RegistryStore, Skill, Student};
use crate::core::RegistryError;

/// Result of a reservation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    /// The student after the call.
    pub holder: Student,
    /// Skills the student now holds, in the order they were chosen.
    pub resources: Vec<Skill>,
    /// `false` when the student was already registered and nothing changed.
    pub newly_registered: bool,
}

/// Reserves one unit per requested skill for a student.
///
/// Each unit is claimed through the store's guarded increment, so two students
/// racing for the last slot cannot both win. Units claimed before a failure
/// are returned before the error is reported.
pub struct CapacityReservation<S> {
    store: Arc<S>,
    audit: Option<Arc<Mutex<Box<dyn AuditSink>>>>,
}

impl<S> Clone for CapacityReservation<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            audit: self.audit.clone(),
        }
    }
}

impl<S: RegistryStore> CapacityReservation<S> {
    /// Create a reservation engine over a shared store.
    pub const fn new(store: Arc<S>) -> Self {
        Self { store, audit: None }
    }

    /// Attach an audit sink.
    #[must_use]
    pub fn with_audit(mut self, audit: Box<dyn AuditSink>) -> Self {
        self.audit = Some(Arc::new(Mutex::new(audit)));
        self
    }

    /// Reserve the given skills for a student.
    ///
    /// A student who already holds skills gets those back unchanged.
    pub async fn reserve(
        &self,
        holder: &HolderKey,
        codes: &[String],
    ) -> Result<Reservation, RegistryError> {
        let student = self
            .store
            .find_holder(holder)
            .await?
            .ok_or_else(|| RegistryError::student_not_found(holder.as_str()))?;

        if student.is_registered() {
            tracing::debug!("student {} already registered", student.matric_number);
            return self.existing(student).await;
        }

        validate_selection(codes)?;

        let mut claimed: Vec<Skill> = Vec::with_capacity(codes.len());
        for code in codes {
            let outcome = match self.store.conditional_increment(code).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    self.roll_back(&student.matric_number, &claimed).await;
                    return Err(e);
                }
            };
            match outcome {
                IncrementOutcome::Reserved(skill) => {
                    self.record(&student.matric_number, &skill.code, AuditAction::Reserve, None);
                    claimed.push(skill);
                }
                IncrementOutcome::Full => {
                    tracing::warn!(
                        "skill {} full; releasing {} claimed slot(s) for {}",
                        code,
                        claimed.len(),
                        student.matric_number
                    );
                    self.roll_back(&student.matric_number, &claimed).await;
                    return Err(RegistryError::CapacityExceeded(code.clone()));
                }
                IncrementOutcome::Missing => {
                    self.roll_back(&student.matric_number, &claimed).await;
                    return Err(RegistryError::skill_not_found(code.clone()));
                }
            }
        }

        match self.store.assign_resources(&student.matric_number, codes).await {
            Ok(true) => {}
            Ok(false) => {
                // Another call registered this student first.
                self.roll_back(&student.matric_number, &claimed).await;
                let current = self
                    .store
                    .find_holder(&HolderKey::Matric(student.matric_number.clone()))
                    .await?
                    .ok_or_else(|| RegistryError::student_not_found(&student.matric_number))?;
                return self.existing(current).await;
            }
            Err(e) => {
                self.roll_back(&student.matric_number, &claimed).await;
                return Err(e);
            }
        }

        self.record(
            &student.matric_number,
            &codes.join(","),
            AuditAction::Register,
            None,
        );
        tracing::info!(
            "registered {} for {}",
            student.matric_number,
            codes.join(", ")
        );

        let holder = Student {
            skills: codes.to_vec(),
            ..student
        };
        Ok(Reservation {
            holder,
            resources: claimed,
            newly_registered: true,
        })
    }

    async fn existing(&self, student: Student) -> Result<Reservation, RegistryError> {
        let mut resources = Vec::with_capacity(student.skills.len());
        for code in &student.skills {
            match self.store.find_resource(code).await? {
                Some(skill) => resources.push(skill),
                None => tracing::warn!(
                    "student {} holds unknown skill {}",
                    student.matric_number,
                    code
                ),
            }
        }
        Ok(Reservation {
            holder: student,
            resources,
            newly_registered: false,
        })
    }

    /// Return every claimed unit. Failures are logged and audited, never raised,
    /// so the caller still sees the original error.
    async fn roll_back(&self, matric: &str, claimed: &[Skill]) {
        for skill in claimed.iter().rev() {
            match self.store.decrement(&skill.code, 1).await {
                Ok(()) => self.record(matric, &skill.code, AuditAction::Rollback, None),
                Err(e) => {
                    tracing::error!(
                        "rollback of {} for {} failed, count may be too high: {}",
                        skill.code,
                        matric,
                        e
                    );
                    self.record(
                        matric,
                        &skill.code,
                        AuditAction::RollbackFailed,
                        Some(e.to_string()),
                    );
                }
            }
        }
    }

    fn record(&self, holder: &str, resource: &str, action: AuditAction, detail: Option<String>) {
        if let Some(sink) = self.audit.as_ref() {
            sink.lock()
                .record(build_audit_event(holder, resource, action, detail));
        }
    }
}

fn validate_selection(codes: &[String]) -> Result<(), RegistryError> {
    if codes.is_empty() {
        return Err(RegistryError::InvalidSelection("no skills selected".into()));
    }
    let mut seen = HashSet::with_capacity(codes.len());
    for code in codes {
        if code.trim().is_empty() {
            return Err(RegistryError::InvalidSelection("empty skill code".into()));
        }
        if !seen.insert(code.as_str()) {
            return Err(RegistryError::InvalidSelection(format!(
                "skill {code} selected twice"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_empty_selection() {
        assert!(matches!(
            validate_selection(&[]),
            Err(RegistryError::InvalidSelection(_))
        ));
    }

    #[test]
    fn test_rejects_repeated_code() {
        let codes = vec!["TEC80".to_string(), "TEC80".to_string()];
        let err = validate_selection(&codes).unwrap_err();
        assert_eq!(err.to_string(), "invalid selection: skill TEC80 selected twice");
    }

    #[test]
    fn test_accepts_distinct_codes() {
        let codes = vec!["TEC80".to_string(), "AGR12".to_string()];
        assert!(validate_selection(&codes).is_ok());
    }
}
