//! Mail transport adapters.

#[cfg(feature = "smtp")]
pub mod smtp;

#[cfg(feature = "smtp")]
pub use smtp::SmtpTransport;
