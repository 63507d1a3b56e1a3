//! Tests for error types

use skill_registry::core::{DispatchError, RegistryError};

#[test]
fn test_not_found_errors() {
    assert_eq!(
        RegistryError::student_not_found("U1").to_string(),
        "student not found: U1"
    );
    assert_eq!(
        RegistryError::skill_not_found("TEC80").to_string(),
        "skill not found: TEC80"
    );
}

#[test]
fn test_capacity_exceeded_error() {
    let err = RegistryError::CapacityExceeded("TEC80".to_string());
    assert_eq!(format!("{}", err), "skill TEC80 is full");
}

#[test]
fn test_store_error() {
    let err = RegistryError::Store("connection failed".to_string());
    assert_eq!(format!("{}", err), "store error: connection failed");
}

#[test]
fn test_dispatch_errors_report_attempts() {
    let err = DispatchError::RateLimited {
        attempts: 2,
        message: "421 4.7.0 try again later".into(),
    };
    assert_eq!(
        err.to_string(),
        "rate limited after 2 attempt(s): 421 4.7.0 try again later"
    );
    assert_eq!(DispatchError::QueueFull.to_string(), "send queue full");
    assert_eq!(
        DispatchError::TransportDisabled.to_string(),
        "mail transport disabled"
    );
}

#[test]
fn test_invalid_limit_error() {
    let err = RegistryError::InvalidLimit("cannot lower max selection from 3 to 1".into());
    assert_eq!(
        err.to_string(),
        "invalid limit: cannot lower max selection from 3 to 1"
    );
}
