//! Tests for configuration loading and validation

use std::collections::HashMap;

use skill_registry::config::{GovernorConfig, ProviderKind, RegistryConfig};

fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    move |key: &str| vars.get(key).cloned()
}

#[test]
fn test_registry_config_defaults_validate() {
    let cfg = RegistryConfig::default();
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.otp_ttl_secs, 600);
    assert_eq!(cfg.default_max_selection, 160);
    assert!(cfg.transport.select().is_none());
}

#[test]
fn test_governor_config_invalid_max_per_minute() {
    let invalid = GovernorConfig {
        max_per_minute: 0,
        ..GovernorConfig::default()
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_from_lookup_reads_environment_names() {
    let cfg = RegistryConfig::from_lookup(lookup(&[
        ("GMAIL_USER", "registry@gmail.com"),
        ("GMAIL_PASS", "app-password"),
        ("GMAIL_SENDER_NAME", "Skills Office"),
        ("MAIL_MAX_PER_MINUTE", "20"),
        ("MAIL_RECIPIENT_COOLDOWN_MS", "off"),
        ("OTP_TTL_SECS", "300"),
        ("REGISTRATION_URL", "https://register.school.edu"),
        ("DATABASE_URL", "postgres://localhost/skills"),
    ]))
    .unwrap();

    assert_eq!(cfg.governor.max_per_minute, 20);
    assert_eq!(cfg.governor.recipient_cooldown_ms, None);
    assert_eq!(cfg.otp_ttl_secs, 300);
    assert_eq!(cfg.registration_url, "https://register.school.edu");
    assert_eq!(cfg.database_url.as_deref(), Some("postgres://localhost/skills"));

    let profile = cfg.transport.select().unwrap();
    assert_eq!(profile.kind, ProviderKind::PersonalMailbox);
    let sender = cfg.transport.sender_identity(Some(&profile));
    assert_eq!(sender.mailbox(), "Skills Office <registry@gmail.com>");
}

#[test]
fn test_from_lookup_prefers_relay() {
    let cfg = RegistryConfig::from_lookup(lookup(&[
        ("ZOHO_USER", "emailapikey"),
        ("ZOHO_PASS", "token"),
        ("GMAIL_USER", "registry@gmail.com"),
        ("GMAIL_PASS", "app-password"),
        ("EMAIL_SENDER", "noreply@school.edu"),
    ]))
    .unwrap();
    let profile = cfg.transport.select().unwrap();
    assert_eq!(profile.kind, ProviderKind::BulkRelay);
    assert_eq!(profile.host, "smtp.zeptomail.eu");
    assert_eq!(
        cfg.transport.sender_identity(Some(&profile)).address,
        "noreply@school.edu"
    );
}

#[test]
fn test_from_lookup_rejects_bad_numbers() {
    let err = RegistryConfig::from_lookup(lookup(&[("MAIL_MAX_PER_MINUTE", "lots")])).unwrap_err();
    assert!(err.contains("MAIL_MAX_PER_MINUTE"));
    assert!(RegistryConfig::from_lookup(lookup(&[("SMTP_PROVIDER", "fax")])).is_err());
}

#[test]
fn test_from_json_str() {
    let cfg = RegistryConfig::from_json_str(
        r#"{"governor": {"max_per_minute": 50}, "default_max_selection": 40}"#,
    )
    .unwrap();
    assert_eq!(cfg.governor.max_per_minute, 50);
    assert_eq!(cfg.governor.min_interval_ms, 9_000);
    assert_eq!(cfg.default_max_selection, 40);

    assert!(RegistryConfig::from_json_str(r#"{"otp_ttl_secs": 0}"#).is_err());
    assert!(RegistryConfig::from_json_str("not json").is_err());
}
