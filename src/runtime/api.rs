//! API-facing request/response models and thin handlers.
//!
//! Handlers never fail: every error is folded into an [`ApiResponse`] with
//! `success: false` and a message, which is what the web layer returns.

use serde::{Deserialize, Serialize};

use crate::core::{
    DetailsSubmission, DispatchGovernor, MatricLookup, RegistrationService, RegistryError,
    RegistryStore, Skill, TrainerContact,
};

/// Envelope returned by every handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Payload on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Error message on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Successful response.
    pub const fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Failed response.
    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }

    fn from_result(result: Result<T, RegistryError>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => {
                tracing::debug!("request failed: {}", e);
                Self::err(user_message(&e))
            }
        }
    }
}

/// Message shown to the student for a failure.
pub fn user_message(error: &RegistryError) -> String {
    match error {
        RegistryError::NotFound { kind: "student", .. } => {
            "Student not found or registration already completed.".into()
        }
        RegistryError::EmailInUse => "Email already in use by another student.".into(),
        RegistryError::EmailAlreadyVerified => "Email already verified. No OTP sent.".into(),
        RegistryError::CapacityExceeded(code) => {
            format!("Skill {code} is full. Please choose another skill.")
        }
        RegistryError::Store(_) | RegistryError::Config(_) => {
            "Service temporarily unavailable.".into()
        }
        other => other.to_string(),
    }
}

/// Matric number lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatricRequest {
    /// Matric number.
    pub matric_number: String,
}

/// Profile of a student who still has to register.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentProfile {
    /// Name.
    pub name: String,
    /// Department.
    pub department: Option<String>,
    /// Faculty.
    pub faculty: Option<String>,
    /// Phone.
    pub phone: Option<String>,
    /// Email.
    pub email: Option<String>,
}

/// Identity confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmRequest {
    /// Matric number.
    pub matric_number: String,
    /// Confirmed name.
    pub name: String,
    /// Carry-over student.
    #[serde(default)]
    pub carry_over: bool,
}

/// Contact details.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailsRequest {
    /// Matric number.
    pub matric_number: String,
    /// Department.
    pub department: Option<String>,
    /// Faculty.
    pub faculty: Option<String>,
    /// Phone.
    pub phone: Option<String>,
    /// Email.
    pub email: Option<String>,
}

/// Whether a one-time code was mailed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailsResponse {
    /// A code was issued.
    pub otp_sent: bool,
}

/// One-time code check.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOtpRequest {
    /// Email or matric number.
    #[serde(alias = "email")]
    pub identifier: String,
    /// Submitted code.
    pub otp: String,
}

/// Result of a code check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyOtpResponse {
    /// Code accepted.
    pub verified: bool,
}

/// Skill selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectSkillsRequest {
    /// Email or matric number.
    #[serde(alias = "email")]
    pub identifier: String,
    /// Chosen skill codes.
    pub skills: Vec<String>,
}

/// Trainers for the held skills.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectSkillsResponse {
    /// Trainer contacts.
    pub trainers: Vec<TrainerContact>,
    /// `true` when the student had registered before this call.
    pub already_registered: bool,
}

/// Health response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Health {
    /// Healthy flag.
    pub ok: bool,
    /// Whether outbound mail is configured.
    pub mail_enabled: bool,
    /// Mails waiting in the governor queue.
    pub mail_queued: u64,
}

/// `POST student/matric`. Never creates a student.
pub async fn lookup_matric<S: RegistryStore>(
    service: &RegistrationService<S>,
    req: MatricRequest,
) -> ApiResponse<StudentProfile> {
    match service.lookup(&req.matric_number).await {
        Ok(MatricLookup::Pending(student)) => ApiResponse::ok(StudentProfile {
            name: student.name,
            department: student.department,
            faculty: student.faculty,
            phone: student.phone,
            email: student.email,
        }),
        Ok(MatricLookup::Registered(_)) => {
            ApiResponse::err(user_message(&RegistryError::student_not_found(req.matric_number)))
        }
        Err(e) => ApiResponse::from_result(Err(e)),
    }
}

/// `POST student/confirm`. Returns no student data.
pub async fn confirm_identity<S: RegistryStore>(
    service: &RegistrationService<S>,
    req: ConfirmRequest,
) -> ApiResponse<()> {
    let result = service
        .confirm_identity(&req.matric_number, &req.name, req.carry_over)
        .await
        .map(|_| ());
    ApiResponse::from_result(result)
}

/// `POST student/details`.
pub async fn submit_details<S: RegistryStore>(
    service: &RegistrationService<S>,
    req: DetailsRequest,
) -> ApiResponse<DetailsResponse> {
    let details = DetailsSubmission {
        matric_number: req.matric_number,
        department: req.department,
        faculty: req.faculty,
        phone: req.phone,
        email: req.email,
    };
    let result = service
        .submit_details(details)
        .await
        .map(|otp_sent| DetailsResponse { otp_sent });
    ApiResponse::from_result(result)
}

/// `POST student/verify-otp`.
pub async fn verify_otp<S: RegistryStore>(
    service: &RegistrationService<S>,
    req: VerifyOtpRequest,
) -> ApiResponse<VerifyOtpResponse> {
    let result = service
        .verify_otp(&req.identifier, &req.otp)
        .await
        .map(|verified| VerifyOtpResponse { verified });
    ApiResponse::from_result(result)
}

/// `GET student/skills`.
pub async fn list_skills<S: RegistryStore>(
    service: &RegistrationService<S>,
) -> ApiResponse<Vec<Skill>> {
    ApiResponse::from_result(service.available_skills().await)
}

/// `POST student/skills`.
pub async fn select_skills<S: RegistryStore>(
    service: &RegistrationService<S>,
    req: SelectSkillsRequest,
) -> ApiResponse<SelectSkillsResponse> {
    let result = service
        .select_skills(&req.identifier, &req.skills)
        .await
        .map(|selection| SelectSkillsResponse {
            trainers: selection.trainers,
            already_registered: !selection.newly_registered,
        });
    ApiResponse::from_result(result)
}

/// Return a health payload.
pub fn health(governor: &DispatchGovernor) -> Health {
    Health {
        ok: true,
        mail_enabled: governor.is_enabled(),
        mail_queued: governor.stats().queued,
    }
}
