//! Classification of transport error text into retry classes.
//!
//! Matching is table-driven: rules are tried in order and the first hit wins,
//! so provider throttling signals take precedence over the generic SMTP soft
//! failure codes they are usually wrapped in.

use std::sync::LazyLock;

use regex::Regex;

/// How the governor reacts to a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Provider throttling: long backoff, one retry.
    RateLimit,
    /// Network or soft server failure: exponential backoff.
    Transient,
    /// Anything else: fail immediately.
    Permanent,
}

/// Ordered `(class, pattern)` rules. Patterns are case-insensitive.
pub const RULES: &[(ErrorClass, &str)] = &[
    // Enhanced status 4.7.x is used by Gmail (4.7.28) and others for throttling.
    (ErrorClass::RateLimit, r"\b4\.7\.\d+\b"),
    (ErrorClass::RateLimit, r"rate ?limit"),
    (ErrorClass::RateLimit, r"try again later"),
    (ErrorClass::RateLimit, r"temporarily deferred"),
    (ErrorClass::RateLimit, r"greylist"),
    (ErrorClass::RateLimit, r"too many (messages|emails|recipients|connections)"),
    (ErrorClass::Transient, r"etimedout|econnreset|enotfound|econnrefused"),
    (ErrorClass::Transient, r"time(d)? ?out"),
    (ErrorClass::Transient, r"connection (reset|refused|closed|aborted)"),
    (ErrorClass::Transient, r"temporary failure"),
    (ErrorClass::Transient, r"failed to lookup address|\bdns\b"),
    (ErrorClass::Transient, r"\b(421|450|451|452)\b"),
];

static COMPILED: LazyLock<Vec<(ErrorClass, Regex)>> = LazyLock::new(|| {
    RULES
        .iter()
        .filter_map(|(class, pattern)| match Regex::new(&format!("(?i){pattern}")) {
            Ok(re) => Some((*class, re)),
            Err(e) => {
                tracing::error!("invalid classification pattern {}: {}", pattern, e);
                None
            }
        })
        .collect()
});

/// Map a transport error message to its retry class.
pub fn classify(message: &str) -> ErrorClass {
    COMPILED
        .iter()
        .find(|(_, re)| re.is_match(message))
        .map_or(ErrorClass::Permanent, |(class, _)| *class)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_rules_compile() {
        assert_eq!(COMPILED.len(), RULES.len());
    }

    #[test]
    fn test_gmail_throttle_is_rate_limit() {
        let msg = "451 4.7.28 [1.2.3.4] Our system has detected an unusual rate of unsolicited mail";
        assert_eq!(classify(msg), ErrorClass::RateLimit);
    }

    #[test]
    fn test_rate_limit_phrases() {
        for msg in [
            "Rate limit exceeded",
            "UnsolicitedRateLimitError",
            "Please try again later",
            "Message temporarily deferred",
            "Greylisted, please retry",
            "550 Too many messages sent",
        ] {
            assert_eq!(classify(msg), ErrorClass::RateLimit, "{msg}");
        }
    }

    #[test]
    fn test_transient_network_errors() {
        for msg in [
            "connect ETIMEDOUT 1.2.3.4:587",
            "read ECONNRESET",
            "getaddrinfo ENOTFOUND smtp.example.com",
            "Connection refused (os error 111)",
            "network timeout while reading greeting",
            "operation timed out",
            "Temporary failure in name resolution",
        ] {
            assert_eq!(classify(msg), ErrorClass::Transient, "{msg}");
        }
    }

    #[test]
    fn test_soft_smtp_codes_are_transient() {
        assert_eq!(classify("421 Service not available"), ErrorClass::Transient);
        assert_eq!(classify("450 Mailbox busy"), ErrorClass::Transient);
        assert_eq!(classify("452 Insufficient storage"), ErrorClass::Transient);
    }

    #[test]
    fn test_codes_need_word_boundary() {
        assert_eq!(classify("ticket 14210 rejected"), ErrorClass::Permanent);
    }

    #[test]
    fn test_everything_else_is_permanent() {
        assert_eq!(classify("550 5.1.1 User unknown"), ErrorClass::Permanent);
        assert_eq!(classify("535 Authentication failed"), ErrorClass::Permanent);
        assert_eq!(classify(""), ErrorClass::Permanent);
    }
}
