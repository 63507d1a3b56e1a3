//! Send requests and their deterministic enrichment before delivery.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Upper bound on a derived plain-text body.
pub const MAX_DERIVED_TEXT: usize = 8000;

/// A mail to deliver. Exists only while the governor processes it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendRequest {
    /// Recipient address.
    pub to: String,
    /// Sender mailbox (`Name <addr>`); the configured sender when absent.
    pub from: Option<String>,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub text: Option<String>,
    /// HTML body.
    pub html: Option<String>,
    /// Caller headers; these win over the defaults the governor adds.
    pub headers: Vec<(String, String)>,
}

impl SendRequest {
    /// Plain-text request.
    pub fn text(to: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            text: Some(body.into()),
            ..Self::default()
        }
    }

    /// Add an HTML alternative.
    #[must_use]
    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.html = Some(html.into());
        self
    }

    /// Add a custom header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Lowercased domain part of the recipient, if any.
    pub fn recipient_domain(&self) -> Option<String> {
        recipient_domain(&self.to)
    }
}

/// Who the governor sends as.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderIdentity {
    /// Display name in the `From` header.
    pub display_name: String,
    /// Sender address, also used as the envelope sender.
    pub address: String,
    /// Value of the `X-Mailer` header.
    pub mailer: String,
    /// `List-Unsubscribe` URL.
    pub unsubscribe_url: Option<String>,
    /// `List-Unsubscribe` mailto address.
    pub unsubscribe_email: Option<String>,
}

impl SenderIdentity {
    /// `Name <address>`, or the bare address without a name.
    pub fn mailbox(&self) -> String {
        if self.display_name.is_empty() {
            self.address.clone()
        } else {
            format!("{} <{}>", self.display_name, self.address)
        }
    }
}

/// A fully prepared message handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// `From` header mailbox.
    pub from: String,
    /// `To` header address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// Plain-text body, always present.
    pub text: String,
    /// HTML alternative.
    pub html: Option<String>,
    /// Headers in emission order.
    pub headers: Vec<(String, String)>,
    /// SMTP `MAIL FROM`.
    pub envelope_from: String,
    /// SMTP `RCPT TO`.
    pub envelope_to: Vec<String>,
}

impl OutboundMessage {
    /// Header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Prepare a request for delivery.
///
/// Derives a text body from HTML when none is given, adds delivery headers the
/// caller did not set, and fixes the envelope to the configured sender and the
/// single recipient.
pub fn enrich(request: SendRequest, sender: &SenderIdentity) -> OutboundMessage {
    let from = request.from.clone().unwrap_or_else(|| sender.mailbox());
    let envelope_from = if sender.address.is_empty() {
        bare_address(&from).to_string()
    } else {
        sender.address.clone()
    };

    let text = match (&request.text, &request.html) {
        (Some(text), _) if !text.is_empty() => text.clone(),
        (_, Some(html)) => html_to_text(html),
        _ => String::new(),
    };

    let mut defaults: Vec<(String, String)> = vec![
        ("X-Priority".into(), "3".into()),
        ("Importance".into(), "normal".into()),
    ];
    if !sender.mailer.is_empty() {
        defaults.push(("X-Mailer".into(), sender.mailer.clone()));
    }
    let mut unsubscribe = Vec::new();
    if let Some(url) = &sender.unsubscribe_url {
        unsubscribe.push(format!("<{url}>"));
    }
    if let Some(email) = &sender.unsubscribe_email {
        unsubscribe.push(format!("<mailto:{email}>"));
    }
    if !unsubscribe.is_empty() {
        defaults.push(("List-Unsubscribe".into(), unsubscribe.join(", ")));
        if sender.unsubscribe_url.is_some() {
            defaults.push((
                "List-Unsubscribe-Post".into(),
                "List-Unsubscribe=One-Click".into(),
            ));
        }
    }

    let mut headers: Vec<(String, String)> = defaults
        .into_iter()
        .filter(|(name, _)| {
            !request
                .headers
                .iter()
                .any(|(own, _)| own.eq_ignore_ascii_case(name))
        })
        .collect();
    headers.extend(request.headers);

    let to = request.to.trim().to_string();
    OutboundMessage {
        from,
        envelope_to: vec![bare_address(&to).to_string()],
        to,
        subject: request.subject,
        text,
        html: request.html,
        headers,
        envelope_from,
    }
}

/// Lowercased domain of an address such as `Name <a@b.com>` or `a@b.com`.
pub fn recipient_domain(address: &str) -> Option<String> {
    bare_address(address)
        .rsplit_once('@')
        .map(|(_, domain)| domain.to_lowercase())
        .filter(|d| !d.is_empty())
}

/// The address inside angle brackets, or the trimmed input.
pub fn bare_address(mailbox: &str) -> &str {
    let trimmed = mailbox.trim();
    match (trimmed.rfind('<'), trimmed.rfind('>')) {
        (Some(start), Some(end)) if start < end => trimmed[start + 1..end].trim(),
        _ => trimmed,
    }
}

static STRIP_RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"(?is)<style.*?</style>", ""),
        (r"(?is)<script.*?</script>", ""),
        (r"(?i)<br\s*/?>(\r?\n)?", "\n"),
        (r"(?i)</(p|div|h\d|li)>", "\n"),
        (r"(?i)<li[^>]*>", "• "),
        (r"<[^>]+>", ""),
    ]
    .into_iter()
    .filter_map(|(pattern, replacement)| Regex::new(pattern).ok().map(|re| (re, replacement)))
    .collect()
});

/// Strip markup from an HTML body to build its plain-text fallback.
pub fn html_to_text(html: &str) -> String {
    let mut text = html.to_string();
    for (re, replacement) in STRIP_RULES.iter() {
        text = re.replace_all(&text, *replacement).into_owned();
    }
    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&amp;", "&");
    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    let mut collapsed = String::with_capacity(text.len());
    let mut blank_run = 0;
    for line in lines {
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        collapsed.push_str(line);
        collapsed.push('\n');
    }
    collapsed.trim().chars().take(MAX_DERIVED_TEXT).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender() -> SenderIdentity {
        SenderIdentity {
            display_name: "Skill Registration".into(),
            address: "noreply@school.edu".into(),
            mailer: "Skill-Registry".into(),
            unsubscribe_url: None,
            unsubscribe_email: None,
        }
    }

    #[test]
    fn test_text_derived_from_html() {
        let req = SendRequest {
            to: "ada@example.com".into(),
            subject: "Hi".into(),
            html: Some("<p>Hello <b>Ada</b></p><ul><li>One</li><li>Two</li></ul>".into()),
            ..SendRequest::default()
        };
        let msg = enrich(req, &sender());
        assert_eq!(msg.text, "Hello Ada\n• One\n• Two");
        assert!(msg.html.is_some());
    }

    #[test]
    fn test_existing_text_kept() {
        let req = SendRequest::text("ada@example.com", "Hi", "plain").with_html("<p>rich</p>");
        assert_eq!(enrich(req, &sender()).text, "plain");
    }

    #[test]
    fn test_default_headers_added() {
        let msg = enrich(SendRequest::text("ada@example.com", "Hi", "x"), &sender());
        assert_eq!(msg.header("x-priority"), Some("3"));
        assert_eq!(msg.header("X-Mailer"), Some("Skill-Registry"));
        assert_eq!(msg.header("Importance"), Some("normal"));
        assert_eq!(msg.header("List-Unsubscribe"), None);
    }

    #[test]
    fn test_caller_headers_win() {
        let req = SendRequest::text("ada@example.com", "Hi", "x").with_header("x-priority", "1");
        let msg = enrich(req, &sender());
        assert_eq!(msg.header("X-Priority"), Some("1"));
        assert_eq!(
            msg.headers
                .iter()
                .filter(|(k, _)| k.eq_ignore_ascii_case("x-priority"))
                .count(),
            1
        );
    }

    #[test]
    fn test_envelope_uses_configured_sender() {
        let req = SendRequest {
            from: Some("Other <other@school.edu>".into()),
            ..SendRequest::text(" Ada <ada@example.com> ", "Hi", "x")
        };
        let msg = enrich(req, &sender());
        assert_eq!(msg.from, "Other <other@school.edu>");
        assert_eq!(msg.envelope_from, "noreply@school.edu");
        assert_eq!(msg.envelope_to, vec!["ada@example.com".to_string()]);
    }

    #[test]
    fn test_envelope_falls_back_to_from_address() {
        let id = SenderIdentity::default();
        let req = SendRequest {
            from: Some("Desk <desk@school.edu>".into()),
            ..SendRequest::text("ada@example.com", "Hi", "x")
        };
        assert_eq!(enrich(req, &id).envelope_from, "desk@school.edu");
    }

    #[test]
    fn test_unsubscribe_headers() {
        let mut id = sender();
        id.unsubscribe_url = Some("https://school.edu/unsub".into());
        id.unsubscribe_email = Some("unsub@school.edu".into());
        let msg = enrich(SendRequest::text("ada@example.com", "Hi", "x"), &id);
        assert_eq!(
            msg.header("List-Unsubscribe"),
            Some("<https://school.edu/unsub>, <mailto:unsub@school.edu>")
        );
        assert_eq!(
            msg.header("List-Unsubscribe-Post"),
            Some("List-Unsubscribe=One-Click")
        );
    }

    #[test]
    fn test_html_entities_and_scripts() {
        let html = "<style>p{}</style><script>x()</script>A&nbsp;&amp;&lt;B&gt;<br/>C";
        assert_eq!(html_to_text(html), "A &<B>\nC");
    }

    #[test]
    fn test_recipient_domain() {
        assert_eq!(
            recipient_domain("Ada <ada@Example.COM>"),
            Some("example.com".to_string())
        );
        assert_eq!(recipient_domain("nobody"), None);
    }
}
