//! Maintenance of hidden skills.
//!
//! Skills withdrawn from the catalog are flagged hidden. Students holding one
//! are told to pick again, then released so the flow lets them register anew.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::audit::{build_audit_event, AuditAction, AuditSink};
use crate::core::dispatch::{DispatchGovernor, SendRequest};
use crate::core::store::{RegistryStore, SkillFilter};
use crate::core::RegistryError;

/// A student holding at least one hidden skill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HiddenSkillHolder {
    /// Matric number.
    pub matric_number: String,
    /// Name.
    pub name: String,
    /// Email, if on file.
    pub email: Option<String>,
    /// Hidden skills held, as `(code, description)`.
    pub hidden_skills: Vec<(String, String)>,
}

/// Outcome of a bulk notice run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoticeReport {
    /// Notices delivered.
    pub sent: usize,
    /// Notices that failed terminally.
    pub failed: usize,
    /// Holders without an email, or every holder in a dry run.
    pub skipped: usize,
}

/// Outcome of releasing hidden skills.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseReport {
    /// Students whose skill list changed.
    pub holders_updated: usize,
    /// Units returned per skill code.
    pub decrements: BTreeMap<String, u32>,
    /// Students whose release failed; they keep their skills.
    pub failed: Vec<String>,
}

/// Hidden-skill maintenance operations.
pub struct HiddenSkillMaintenance<S> {
    store: Arc<S>,
    governor: DispatchGovernor,
    registration_url: String,
    audit: Option<Arc<Mutex<Box<dyn AuditSink>>>>,
}

impl<S: RegistryStore> HiddenSkillMaintenance<S> {
    /// Create the maintenance runner.
    pub fn new(store: Arc<S>, governor: DispatchGovernor, registration_url: impl Into<String>) -> Self {
        Self {
            store,
            governor,
            registration_url: registration_url.into(),
            audit: None,
        }
    }

    /// Attach an audit sink.
    #[must_use]
    pub fn with_audit(mut self, audit: Box<dyn AuditSink>) -> Self {
        self.audit = Some(Arc::new(Mutex::new(audit)));
        self
    }

    /// Flag skills hidden by exact, case-insensitive description.
    pub async fn hide_by_description(&self, descriptions: &[String]) -> Result<u64, RegistryError> {
        let mut total = 0;
        for description in descriptions {
            let matched = self.store.hide_by_description(description.trim()).await?;
            if matched == 0 {
                tracing::warn!("no skill matches {:?}", description);
            } else {
                tracing::info!("hidden: {} ({} matched)", description, matched);
            }
            total += matched;
        }
        Ok(total)
    }

    /// Change every capacity equal to `from` into `to`. Limits only go up.
    pub async fn raise_limits(&self, from: u32, to: u32) -> Result<u64, RegistryError> {
        if to < from {
            return Err(RegistryError::InvalidLimit(format!(
                "cannot lower max selection from {from} to {to}"
            )));
        }
        let changed = self.store.replace_limit(from, to).await?;
        tracing::info!("max selection {} -> {} on {} skill(s)", from, to, changed);
        Ok(changed)
    }

    /// Every student holding a hidden skill.
    pub async fn holders_with_hidden_skills(&self) -> Result<Vec<HiddenSkillHolder>, RegistryError> {
        let hidden = self.store.list_resources(SkillFilter::Hidden).await?;
        if hidden.is_empty() {
            tracing::info!("no hidden skills");
            return Ok(Vec::new());
        }
        let descriptions: BTreeMap<&str, &str> = hidden
            .iter()
            .map(|s| (s.code.as_str(), s.description.as_str()))
            .collect();
        let codes: Vec<String> = hidden.iter().map(|s| s.code.clone()).collect();

        let holders = self.store.holders_with_resources(&codes).await?;
        Ok(holders
            .into_iter()
            .map(|student| HiddenSkillHolder {
                hidden_skills: student
                    .skills
                    .iter()
                    .filter_map(|code| {
                        descriptions
                            .get(code.as_str())
                            .map(|d| (code.clone(), (*d).to_string()))
                    })
                    .collect(),
                matric_number: student.matric_number,
                name: student.name,
                email: student.email.filter(|e| !e.is_empty()),
            })
            .collect())
    }

    /// Mail a re-registration notice to each holder with an email.
    ///
    /// Sends are awaited one by one so the report is exact; the governor paces them.
    pub async fn notify_holders(
        &self,
        holders: &[HiddenSkillHolder],
        dry_run: bool,
    ) -> Result<NoticeReport, RegistryError> {
        let mut report = NoticeReport::default();
        let total = holders.len();
        for (i, holder) in holders.iter().enumerate() {
            let Some(email) = holder.email.as_deref() else {
                report.skipped += 1;
                continue;
            };
            if dry_run {
                tracing::info!("[{}/{}] [dry run] would mail {} ({})", i + 1, total, email, holder.name);
                report.skipped += 1;
                continue;
            }
            match self.governor.send(self.notice(holder, email)).await {
                Ok(_) => {
                    report.sent += 1;
                    tracing::info!("[{}/{}] notice sent to {} ({})", i + 1, total, email, holder.name);
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::error!("[{}/{}] notice to {} failed: {}", i + 1, total, email, e);
                }
            }
        }
        tracing::info!(
            "notices: {} sent, {} failed, {} skipped of {}",
            report.sent,
            report.failed,
            report.skipped,
            total
        );
        Ok(report)
    }

    /// Remove hidden skills from every holder and return the freed units.
    ///
    /// Each student's units are returned right after their release, so a
    /// failure for one student never strands the places freed before it.
    pub async fn release_hidden_skills(&self) -> Result<ReleaseReport, RegistryError> {
        let hidden = self.store.list_resources(SkillFilter::Hidden).await?;
        let codes: Vec<String> = hidden.into_iter().map(|s| s.code).collect();
        let mut report = ReleaseReport::default();
        if codes.is_empty() {
            return Ok(report);
        }

        for student in self.store.holders_with_resources(&codes).await? {
            let matric = student.matric_number.as_str();
            let removed = match self.store.release_resources(matric, &codes).await {
                Ok(removed) => removed,
                Err(e) => {
                    tracing::error!("releasing hidden skills from {} failed: {}", matric, e);
                    report.failed.push(student.matric_number.clone());
                    continue;
                }
            };
            if removed.is_empty() {
                continue;
            }
            for code in &removed {
                self.record(matric, code, AuditAction::Release, None);
                match self.store.decrement(code, 1).await {
                    Ok(()) => *report.decrements.entry(code.clone()).or_default() += 1,
                    Err(e) => {
                        tracing::error!(
                            "returning {} released from {} failed, count may be too high: {}",
                            code,
                            matric,
                            e
                        );
                        self.record(matric, code, AuditAction::RollbackFailed, Some(e.to_string()));
                    }
                }
            }
            report.holders_updated += 1;
            tracing::info!(
                "released {} hidden skill(s) from {} ({})",
                removed.len(),
                student.name,
                matric
            );
        }

        tracing::info!(
            "released hidden skills from {} student(s), {} failed",
            report.holders_updated,
            report.failed.len()
        );
        Ok(report)
    }

    fn notice(&self, holder: &HiddenSkillHolder, email: &str) -> SendRequest {
        let list: Vec<String> = holder
            .hidden_skills
            .iter()
            .map(|(_, description)| format!("• {description}"))
            .collect();
        let list = list.join("\n");
        let url = &self.registration_url;
        let name = &holder.name;

        let text = format!(
            "Hello {name},\n\n\
             We noticed that you registered for the following skill(s) that are no longer available:\n\n\
             {list}\n\n\
             Action Required: Please log in to the registration portal to select a new skill from the available options.\n\n\
             Your previous skill selection has been removed, and you will need to register for a new skill to complete your enrollment.\n\n\
             Registration URL: {url}\n\n\
             If you have any questions, please contact the registration office."
        );
        let html = format!(
            "<div style=\"font-family:Segoe UI, Arial, sans-serif; color:#222;\">\
             <h2 style=\"font-size:18px;\">Important: Skill Re-registration Required</h2>\
             <p>Hello {name},</p>\
             <p>We noticed that you registered for the following skill(s) that are no longer available:</p>\
             <pre style=\"white-space:pre-wrap;\">{list}</pre>\
             <p><strong>Action Required:</strong> Please log in to the registration portal to select a new skill from the available options.</p>\
             <p><a href=\"{url}\">Register for New Skill</a></p>\
             <p style=\"color:#888; font-size:12px;\">If you have any questions, please contact the registration office.</p>\
             </div>"
        );
        SendRequest::text(email, "Action Required: Re-register for Skill", text).with_html(html)
    }

    fn record(&self, holder: &str, code: &str, action: AuditAction, detail: Option<String>) {
        if let Some(sink) = self.audit.as_ref() {
            sink.lock()
                .record(build_audit_event(holder, code, action, detail));
        }
    }
}
