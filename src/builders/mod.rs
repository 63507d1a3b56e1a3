//! Builders to construct runtime components from configuration.

pub mod governor_builder;

pub use governor_builder::GovernorBuilder;
