//! Tests for tokio spawner utilities and API envelopes

use skill_registry::core::{DispatchGovernor, RegistryError, Spawn};
use skill_registry::runtime::api::user_message;
use skill_registry::runtime::{health, TokioSpawner};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tokio_spawner_spawn() {
    let spawner = TokioSpawner::new(tokio::runtime::Handle::current());

    let (tx, rx) = tokio::sync::oneshot::channel();
    spawner.spawn(async move {
        tx.send(123).unwrap();
    });

    let result = rx.await.expect("oneshot result");
    assert_eq!(result, 123);
}

#[test]
fn test_try_current_outside_runtime() {
    assert!(TokioSpawner::try_current().is_none());
}

#[test]
fn test_user_message_masks_store_errors() {
    let message = user_message(&RegistryError::Store("password=hunter2".into()));
    assert!(!message.contains("hunter2"));
    assert_eq!(
        user_message(&RegistryError::CapacityExceeded("TEC80".into())),
        "Skill TEC80 is full. Please choose another skill."
    );
}

#[test]
fn test_health_of_disabled_governor() {
    let body = health(&DispatchGovernor::disabled());
    assert!(body.ok);
    assert!(!body.mail_enabled);
    assert_eq!(body.mail_queued, 0);
}
