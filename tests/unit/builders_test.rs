//! Tests for builder modules

use skill_registry::builders::GovernorBuilder;
use skill_registry::config::{Credentials, GovernorConfig, ProviderKind, RegistryConfig};
use skill_registry::core::{DispatchError, SendRequest};
use skill_registry::runtime::TokioSpawner;

#[test]
fn test_builder_rejects_invalid_config() {
    let config = RegistryConfig {
        governor: GovernorConfig {
            queue_depth: 0,
            ..GovernorConfig::default()
        },
        ..RegistryConfig::default()
    };
    assert!(GovernorBuilder::new(config).is_err());
}

#[test]
fn test_builder_selects_profile() {
    let mut config = RegistryConfig::default();
    config.transport.mailbox = Credentials::pair(Some("me@gmail.com".into()), Some("pw".into()));

    let builder = GovernorBuilder::new(config).unwrap();
    let profile = builder.profile().unwrap();
    assert_eq!(profile.kind, ProviderKind::PersonalMailbox);
    assert_eq!(profile.port, 465);
    assert_eq!(builder.sender().address, "me@gmail.com");
}

#[tokio::test]
async fn test_builder_without_credentials_is_disabled() {
    let builder = GovernorBuilder::new(RegistryConfig::default()).unwrap();
    let governor = builder.build(&TokioSpawner::current());

    assert!(!governor.is_enabled());
    assert_eq!(
        governor
            .send(SendRequest::text("a@example.com", "Hello", "Hi"))
            .await,
        Err(DispatchError::TransportDisabled)
    );
}
