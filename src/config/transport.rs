//! Mail transport profiles and provider selection.

use serde::{Deserialize, Serialize};

use crate::core::dispatch::SenderIdentity;

/// The two supported provider profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Transactional bulk relay (ZeptoMail), STARTTLS on 587.
    BulkRelay,
    /// Personal mailbox (Gmail), implicit TLS on 465.
    PersonalMailbox,
}

impl ProviderKind {
    /// Parse the provider flag. Accepts profile and vendor names.
    pub fn from_flag(flag: &str) -> Option<Self> {
        match flag.trim().to_lowercase().as_str() {
            "relay" | "bulk-relay" | "bulk_relay" | "zoho" | "zeptomail" => Some(Self::BulkRelay),
            "mailbox" | "personal-mailbox" | "personal_mailbox" | "gmail" => {
                Some(Self::PersonalMailbox)
            }
            _ => None,
        }
    }

    /// Short name for logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BulkRelay => "bulk-relay",
            Self::PersonalMailbox => "personal-mailbox",
        }
    }
}

/// Username and password for one provider.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// SMTP username.
    pub user: String,
    /// SMTP password or app password.
    pub pass: String,
}

impl Credentials {
    /// Build a pair when both halves are present and non-empty.
    pub fn pair(user: Option<String>, pass: Option<String>) -> Option<Self> {
        match (user, pass) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => {
                Some(Self { user, pass })
            }
            _ => None,
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("pass", &"***")
            .finish()
    }
}

/// SMTP endpoint and credentials selected for this process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderProfile {
    /// Which profile was selected.
    pub kind: ProviderKind,
    /// SMTP host.
    pub host: String,
    /// SMTP port.
    pub port: u16,
    /// `true` for implicit TLS, `false` for STARTTLS.
    pub implicit_tls: bool,
    /// Login.
    pub credentials: Credentials,
    /// Connection timeout in seconds.
    pub timeout_secs: u64,
}

/// Transport configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Explicit provider flag (`relay`/`zoho` or `mailbox`/`gmail`).
    pub provider: Option<String>,
    /// Bulk relay credentials.
    pub relay: Option<Credentials>,
    /// Bulk relay host.
    pub relay_host: String,
    /// Bulk relay port.
    pub relay_port: u16,
    /// Personal mailbox credentials.
    pub mailbox: Option<Credentials>,
    /// Personal mailbox host.
    pub mailbox_host: String,
    /// Personal mailbox port.
    pub mailbox_port: u16,
    /// Sender display name.
    pub sender_name: String,
    /// Sender address; the selected login when empty.
    pub sender_address: Option<String>,
    /// `X-Mailer` header value.
    pub mailer: String,
    /// `List-Unsubscribe` URL.
    pub unsubscribe_url: Option<String>,
    /// `List-Unsubscribe` mailto address.
    pub unsubscribe_email: Option<String>,
    /// Connection timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            provider: None,
            relay: None,
            relay_host: "smtp.zeptomail.eu".into(),
            relay_port: 587,
            mailbox: None,
            mailbox_host: "smtp.gmail.com".into(),
            mailbox_port: 465,
            sender_name: "Student Skill Registration".into(),
            sender_address: None,
            mailer: "Skill-Registration-System".into(),
            unsubscribe_url: None,
            unsubscribe_email: None,
            timeout_secs: 30,
        }
    }
}

impl TransportConfig {
    /// Validate transport configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(flag) = &self.provider {
            if !flag.trim().is_empty() && ProviderKind::from_flag(flag).is_none() {
                return Err(format!("unknown provider `{flag}`"));
            }
        }
        if self.relay_port == 0 || self.mailbox_port == 0 {
            return Err("smtp ports must be greater than 0".into());
        }
        if self.timeout_secs == 0 {
            return Err("timeout_secs must be greater than 0".into());
        }
        Ok(())
    }

    /// Pick the provider profile.
    ///
    /// The relay wins when flagged, or when its credentials exist and the flag
    /// does not ask for the mailbox. Otherwise the mailbox is used if it has
    /// credentials. `None` means mail is disabled.
    pub fn select(&self) -> Option<ProviderProfile> {
        let flag = self.provider.as_deref().and_then(ProviderKind::from_flag);

        let wants_relay = match flag {
            Some(ProviderKind::BulkRelay) => true,
            Some(ProviderKind::PersonalMailbox) => false,
            None => self.relay.is_some(),
        };
        if wants_relay {
            if let Some(credentials) = &self.relay {
                return Some(self.profile(ProviderKind::BulkRelay, credentials.clone()));
            }
            tracing::warn!("bulk relay requested but no relay credentials configured");
        }

        if let Some(credentials) = &self.mailbox {
            if flag == Some(ProviderKind::BulkRelay) {
                tracing::warn!("falling back to personal mailbox");
            }
            return Some(self.profile(ProviderKind::PersonalMailbox, credentials.clone()));
        }
        if flag == Some(ProviderKind::PersonalMailbox) {
            tracing::warn!("personal mailbox requested but no mailbox credentials configured");
        }
        None
    }

    /// Sender identity for the selected profile.
    pub fn sender_identity(&self, profile: Option<&ProviderProfile>) -> SenderIdentity {
        let address = self
            .sender_address
            .clone()
            .filter(|a| !a.is_empty())
            .or_else(|| profile.map(|p| p.credentials.user.clone()))
            .unwrap_or_default();
        SenderIdentity {
            display_name: self.sender_name.clone(),
            address,
            mailer: self.mailer.clone(),
            unsubscribe_url: self.unsubscribe_url.clone(),
            unsubscribe_email: self.unsubscribe_email.clone(),
        }
    }

    fn profile(&self, kind: ProviderKind, credentials: Credentials) -> ProviderProfile {
        let (host, port) = match kind {
            ProviderKind::BulkRelay => (self.relay_host.clone(), self.relay_port),
            ProviderKind::PersonalMailbox => (self.mailbox_host.clone(), self.mailbox_port),
        };
        ProviderProfile {
            kind,
            host,
            implicit_tls: port == 465,
            port,
            credentials,
            timeout_secs: self.timeout_secs,
        }
    }
}
