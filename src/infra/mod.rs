//! Infrastructure adapters for stores, mail transports, and sheet import.

#[cfg(feature = "cli")]
pub mod import;
pub mod store;
pub mod transport;

pub use store::InMemoryStore;
#[cfg(feature = "postgres")]
pub use store::PostgresStore;
#[cfg(feature = "smtp")]
pub use transport::SmtpTransport;
