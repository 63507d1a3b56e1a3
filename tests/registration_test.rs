//! Integration tests for the student registration flow.
//!
//! This test validates:
//! 1. Lookup never creates students and reports completed registrations
//! 2. One-time codes are mailed, checked, and expire
//! 3. Email ownership rules
//! 4. Skill selection mails trainer details once, and never fails on mail

mod support;

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};

use skill_registry::config::GovernorConfig;
use skill_registry::core::{
    DetailsSubmission, DispatchGovernor, HolderKey, MatricLookup, RegistrationService,
    RegistryError, RegistryStore, SenderIdentity, Transport,
};
use skill_registry::infra::InMemoryStore;
use skill_registry::runtime::TokioSpawner;
use support::{seed_skill, seed_student, skill, ScriptedTransport};

struct Fixture {
    store: Arc<InMemoryStore>,
    transport: Arc<ScriptedTransport>,
    service: RegistrationService<InMemoryStore>,
}

fn fixture() -> Fixture {
    let store = Arc::new(InMemoryStore::new());
    let transport = ScriptedTransport::new();
    let shared: Arc<dyn Transport> = transport.clone();
    let governor = DispatchGovernor::start(
        GovernorConfig::default().without_delays(),
        SenderIdentity {
            display_name: "Registry".into(),
            address: "noreply@school.edu".into(),
            ..SenderIdentity::default()
        },
        shared,
        &TokioSpawner::current(),
    );
    let service = RegistrationService::new(Arc::clone(&store), governor);
    Fixture {
        store,
        transport,
        service,
    }
}

/// Let the dispatch worker drain fire-and-forget mail.
async fn settle(transport: &ScriptedTransport, expected: usize) {
    for _ in 0..1_000 {
        if transport.call_count() >= expected {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("expected {expected} mail(s), saw {}", transport.call_count());
}

fn details(matric: &str, email: &str) -> DetailsSubmission {
    DetailsSubmission {
        matric_number: matric.into(),
        department: Some("Physics".into()),
        faculty: Some("Science".into()),
        phone: Some("08011112222".into()),
        email: Some(email.into()),
    }
}

#[tokio::test]
async fn test_lookup_does_not_create_students() {
    let f = fixture();
    let err = f.service.lookup("U404").await.unwrap_err();
    assert_eq!(err, RegistryError::student_not_found("U404"));
    assert_eq!(f.store.holder_count(), 0);
}

#[tokio::test]
async fn test_lookup_reports_pending_and_registered() {
    let f = fixture();
    seed_skill(&f.store, "TEC80", 5).await;
    seed_student(&f.store, "U1", None).await;

    assert!(matches!(
        f.service.lookup("U1").await.unwrap(),
        MatricLookup::Pending(s) if s.name == "Student U1"
    ));

    f.service.select_skills("U1", &["TEC80".into()]).await.unwrap();
    assert_eq!(
        f.service.lookup(" U1 ").await.unwrap(),
        MatricLookup::Registered(vec!["TEC80".into()])
    );
}

#[tokio::test]
async fn test_confirm_identity_creates_student() {
    let f = fixture();
    let student = f.service.confirm_identity("U9", " Ada Obi ", true).await.unwrap();
    assert_eq!(student.name, "Ada Obi");
    assert!(student.carry_over);
}

#[tokio::test]
async fn test_otp_is_mailed_and_verifies_email() {
    let f = fixture();
    f.service.confirm_identity("U1", "Ada", false).await.unwrap();

    assert!(f
        .service
        .submit_details(details("U1", " Ada@Example.com "))
        .await
        .unwrap());
    settle(&f.transport, 1).await;

    let student = f
        .store
        .find_holder(&HolderKey::Matric("U1".into()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(student.email.as_deref(), Some("ada@example.com"));
    let otp = student.otp.unwrap();
    assert_eq!(otp.len(), 6);

    let (_, mail) = f.transport.calls().remove(0);
    assert_eq!(mail.to, "ada@example.com");
    assert_eq!(mail.subject, "Your OTP Code");
    assert_eq!(mail.text, format!("Your OTP code is: {otp}"));

    assert!(!f.service.verify_otp("ada@example.com", "000000").await.unwrap());
    assert!(f.service.verify_otp("ada@example.com", &otp).await.unwrap());

    let verified = f
        .store
        .find_holder(&HolderKey::Matric("U1".into()))
        .await
        .unwrap()
        .unwrap();
    assert!(verified.email_verified);
    assert!(verified.otp.is_none() && verified.otp_expires.is_none());

    assert_eq!(
        f.service.submit_details(details("U1", "ada@example.com")).await,
        Err(RegistryError::EmailAlreadyVerified)
    );
}

#[tokio::test]
async fn test_expired_otp_is_rejected() {
    let f = fixture();
    seed_student(&f.store, "U1", Some("ada@example.com")).await;
    let key = HolderKey::Email("ada@example.com".into());
    f.store
        .set_otp(&key, "123456", Utc::now() - ChronoDuration::seconds(1))
        .await
        .unwrap();

    assert!(!f.service.verify_otp("ada@example.com", "123456").await.unwrap());
    assert!(!f.service.verify_otp("nobody@example.com", "123456").await.unwrap());
}

#[tokio::test]
async fn test_email_owned_by_another_student() {
    let f = fixture();
    seed_student(&f.store, "U1", Some("ada@example.com")).await;
    seed_student(&f.store, "U2", None).await;

    assert_eq!(
        f.service.submit_details(details("U2", "ADA@example.com")).await,
        Err(RegistryError::EmailInUse)
    );
}

#[tokio::test]
async fn test_details_without_email_issue_no_code() {
    let f = fixture();
    let submission = DetailsSubmission {
        email: None,
        ..details("U1", "")
    };
    assert!(!f.service.submit_details(submission).await.unwrap());
    assert_eq!(f.transport.call_count(), 0);
}

#[tokio::test]
async fn test_disabled_mail_does_not_block_registration() {
    let store = Arc::new(InMemoryStore::new());
    seed_skill(&store, "TEC80", 5).await;
    let service = RegistrationService::new(Arc::clone(&store), DispatchGovernor::disabled());

    service.confirm_identity("U1", "Ada", false).await.unwrap();
    assert!(service
        .submit_details(details("U1", "ada@example.com"))
        .await
        .unwrap());
    let selection = service
        .select_skills("ada@example.com", &["TEC80".into()])
        .await
        .unwrap();
    assert!(selection.newly_registered);
}

#[tokio::test]
async fn test_selection_mails_trainers_once() {
    let f = fixture();
    f.store
        .upsert_resource(skill("TEC80", "Solar Installation", 5))
        .await
        .unwrap();
    seed_student(&f.store, "U1", Some("ada@example.com")).await;

    let selection = f
        .service
        .select_skills("ada@example.com", &["TEC80".into()])
        .await
        .unwrap();
    assert!(selection.newly_registered);
    assert_eq!(selection.matric_number, "U1");
    assert_eq!(selection.trainers[0].trainer.as_deref(), Some("Trainer TEC80"));
    settle(&f.transport, 1).await;

    let (_, mail) = f.transport.calls().remove(0);
    assert_eq!(mail.subject, "Skill Selection Confirmation & Trainer Details");
    assert!(mail.text.contains("Skill: Solar Installation"));

    let again = f
        .service
        .select_skills("U1", &["TEC80".into()])
        .await
        .unwrap();
    assert!(!again.newly_registered);
    assert_eq!(again.trainers, selection.trainers);
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
    assert_eq!(f.transport.call_count(), 1);
}

#[tokio::test]
async fn test_hidden_skills_are_not_offered() {
    let f = fixture();
    seed_skill(&f.store, "A", 5).await;
    f.store
        .upsert_resource(skill("B", "Glass blowing", 5))
        .await
        .unwrap();
    f.store.hide_by_description("glass BLOWING").await.unwrap();

    let offered: Vec<String> = f
        .service
        .available_skills()
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.code)
        .collect();
    assert_eq!(offered, vec!["A".to_string()]);
}
