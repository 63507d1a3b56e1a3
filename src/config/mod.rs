//! Configuration models for the dispatch governor, mail transport, and registry.

pub mod governor;
pub mod registry;
pub mod transport;

pub use governor::GovernorConfig;
pub use registry::RegistryConfig;
pub use transport::{Credentials, ProviderKind, ProviderProfile, TransportConfig};
