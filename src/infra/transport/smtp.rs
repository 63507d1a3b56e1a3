//! SMTP transport built on lettre.

use std::time::Duration;

use async_trait::async_trait;
use lettre::address::{Address, Envelope};
use lettre::message::header::{ContentType, HeaderName, HeaderValue};
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::{ProviderKind, ProviderProfile};
use crate::core::dispatch::{OutboundMessage, SendReceipt, Transport, TransportError};

/// Pooled async SMTP connection for one provider profile.
pub struct SmtpTransport {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    kind: ProviderKind,
    host: String,
}

impl SmtpTransport {
    /// Build a transport for the selected profile. Does not connect yet.
    pub fn from_profile(profile: &ProviderProfile) -> Result<Self, TransportError> {
        let builder = if profile.implicit_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&profile.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&profile.host)
        }
        .map_err(|e| TransportError::new(e.to_string()))?;

        let mailer = builder
            .port(profile.port)
            .credentials(Credentials::new(
                profile.credentials.user.clone(),
                profile.credentials.pass.clone(),
            ))
            .timeout(Some(Duration::from_secs(profile.timeout_secs)))
            .build();
        tracing::info!(
            "smtp transport {} via {}:{}",
            profile.kind.as_str(),
            profile.host,
            profile.port
        );
        Ok(Self {
            mailer,
            kind: profile.kind,
            host: profile.host.clone(),
        })
    }
}

fn parse_address(raw: &str) -> Result<Address, TransportError> {
    raw.parse()
        .map_err(|e| TransportError::new(format!("invalid address {raw:?}: {e}")))
}

fn parse_mailbox(raw: &str) -> Result<Mailbox, TransportError> {
    raw.parse()
        .map_err(|e| TransportError::new(format!("invalid mailbox {raw:?}: {e}")))
}

/// `<uuid@domain>` using the sender's domain.
fn message_id(envelope_from: &str) -> String {
    let domain = envelope_from
        .rsplit_once('@')
        .map_or("localhost", |(_, d)| d);
    format!("<{}@{}>", uuid::Uuid::new_v4(), domain)
}

/// Convert a prepared message into a lettre message.
fn build_message(message: &OutboundMessage, id: &str) -> Result<Message, TransportError> {
    let envelope_to = message
        .envelope_to
        .iter()
        .map(|a| parse_address(a))
        .collect::<Result<Vec<_>, _>>()?;
    let envelope = Envelope::new(Some(parse_address(&message.envelope_from)?), envelope_to)
        .map_err(|e| TransportError::new(format!("invalid envelope: {e}")))?;

    let mut builder = Message::builder()
        .from(parse_mailbox(&message.from)?)
        .to(parse_mailbox(&message.to)?)
        .subject(message.subject.clone())
        .message_id(Some(id.to_string()))
        .envelope(envelope);
    for (name, value) in &message.headers {
        let name = HeaderName::new_from_ascii(name.clone())
            .map_err(|e| TransportError::new(format!("invalid header {name:?}: {e}")))?;
        builder = builder.raw_header(HeaderValue::new(name, value.clone()));
    }

    let built = match &message.html {
        Some(html) => builder.multipart(MultiPart::alternative_plain_html(
            message.text.clone(),
            html.clone(),
        )),
        None => builder
            .header(ContentType::TEXT_PLAIN)
            .body(message.text.clone()),
    };
    built.map_err(|e| TransportError::new(format!("message build failed: {e}")))
}

#[async_trait]
impl Transport for SmtpTransport {
    fn name(&self) -> &str {
        self.kind.as_str()
    }

    async fn send(&self, message: &OutboundMessage) -> Result<SendReceipt, TransportError> {
        let id = message_id(&message.envelope_from);
        let email = build_message(message, &id)?;
        tracing::debug!("smtp {} -> {} via {}", id, message.to, self.host);
        let response = self
            .mailer
            .send(email)
            .await
            .map_err(|e| TransportError::new(e.to_string()))?;
        let text: Vec<&str> = response.message().collect();
        Ok(SendReceipt {
            message_id: id,
            response: Some(format!("{} {}", response.code(), text.join(" "))),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outbound() -> OutboundMessage {
        OutboundMessage {
            from: "Registry <noreply@school.edu>".into(),
            to: "ada@example.com".into(),
            subject: "Hello".into(),
            text: "plain".into(),
            html: Some("<p>plain</p>".into()),
            headers: vec![("X-Priority".into(), "3".into())],
            envelope_from: "noreply@school.edu".into(),
            envelope_to: vec!["ada@example.com".into()],
        }
    }

    #[test]
    fn test_message_id_uses_sender_domain() {
        let id = message_id("noreply@school.edu");
        assert!(id.starts_with('<') && id.ends_with("@school.edu>"));
    }

    #[test]
    fn test_build_message_carries_headers() {
        let raw = String::from_utf8(build_message(&outbound(), "<x@school.edu>").unwrap().formatted())
            .unwrap();
        assert!(raw.contains("X-Priority: 3"));
        assert!(raw.contains("Message-ID: <x@school.edu>"));
        assert!(raw.contains("multipart/alternative"));
    }

    #[test]
    fn test_bad_recipient_is_reported() {
        let mut msg = outbound();
        msg.to = "not an address".into();
        assert!(build_message(&msg, "<x@y>").is_err());
    }
}
