//! # Skill Registry
//!
//! Capacity-bounded skill registration with a throttled, serialized outbound
//! mail pipeline.
//!
//! Students look up their matric number, confirm their identity, verify an
//! email with a one-time code, then pick skills. Each skill has a fixed number
//! of places; places are taken with an atomic conditional increment at the
//! store, so concurrent registrations never overbook a skill, even across
//! processes sharing one database.
//!
//! ## Key Features
//!
//! - **Capacity Reservation**: per-skill guarded increments, reverse-order
//!   rollback on partial failure, idempotent re-registration
//! - **Dispatch Governor**: one FIFO queue and one worker per process; layered
//!   throttles (global per-minute cap, minimum interval, per-recipient
//!   cooldown, per-domain cap) and a retry state machine driven by error
//!   classification
//! - **Provider Selection**: bulk relay or personal mailbox SMTP profile,
//!   picked once from configuration; without credentials mail is disabled
//!   and registration carries on
//! - **Maintenance**: hide withdrawn skills, notify and release their holders
//!
//! ## Capacity Reservation
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use skill_registry::core::{CapacityReservation, HolderKey};
//! use skill_registry::infra::InMemoryStore;
//!
//! let store = Arc::new(InMemoryStore::new());
//! let reservation = CapacityReservation::new(Arc::clone(&store));
//! let held = reservation
//!     .reserve(&HolderKey::parse("U2020/1234"), &["TEC80".into()])
//!     .await?;
//! ```
//!
//! ## Dispatch Governor
//!
//! ```rust,ignore
//! use skill_registry::builders::GovernorBuilder;
//! use skill_registry::config::RegistryConfig;
//! use skill_registry::runtime::TokioSpawner;
//!
//! let governor = GovernorBuilder::new(RegistryConfig::from_env()?)?
//!     .build(&TokioSpawner::current());
//! governor.dispatch(SendRequest::text("ada@example.com", "Hi", "Hello"))?;
//! ```
//!
//! For complete examples, see:
//! - `tests/reservation_test.rs` - Concurrent reservation behaviour
//! - `tests/governor_test.rs` - Throttle timing and retry behaviour

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core domain types, the reservation engine, and the dispatch governor.
pub mod core;
/// Configuration models for the governor, transport, and registry.
pub mod config;
/// Builders to construct runtime components from configuration.
pub mod builders;
/// Infrastructure adapters for stores, transports, and sheet import.
pub mod infra;
/// Runtime adapters and API surface.
pub mod runtime;
/// Shared utilities.
pub mod util;
