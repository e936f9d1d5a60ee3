/// Outbound mail transports
///
/// [`Mailer`] is the seam between the delivery worker and the wire. Two
/// implementations ship:
///
/// - [`SmtpMailer`]: lettre over SMTP. Port 465 or `secure` selects implicit
///   TLS, `localhost` talks plaintext, anything else uses STARTTLS.
/// - [`ResendMailer`]: the Resend HTTP API, picked when the configured SMTP
///   host mentions `resend`. The SMTP password doubles as the API key.
///
/// [`MemoryMailer`] records messages instead of sending them.
///
/// # Example
///
/// ```no_run
/// use leadbook_shared::email::transport::{mailer_for, OutboundEmail, TransportConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let mailer = mailer_for(&TransportConfig {
///     host: "smtp.example.com".to_string(),
///     port: Some(587),
///     username: Some("mailer".to_string()),
///     password: Some("secret".to_string()),
///     secure: false,
/// })?;
///
/// let receipt = mailer.deliver(&OutboundEmail {
///     from_name: Some("Acme".to_string()),
///     from_email: "hello@acme.test".to_string(),
///     reply_to: None,
///     to: vec!["ada@example.com".to_string()],
///     bcc: vec![],
///     subject: "Hi".to_string(),
///     html: "<p>Hi</p>".to_string(),
///     text: None,
/// }).await?;
/// println!("{:?}", receipt.message_id);
/// # Ok(())
/// # }
/// ```

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::{Deserialize, Serialize};

/// Default Resend API base URL
pub const RESEND_API_URL: &str = "https://api.resend.com";

/// Mail delivery errors
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    /// A sender or recipient address does not parse
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Message could not be assembled
    #[error("Failed to build message: {0}")]
    Build(String),

    /// No transport configured
    #[error("Email transport not configured")]
    NotConfigured,

    /// SMTP conversation failed
    #[error("SMTP error: {0}")]
    Smtp(String),

    /// HTTP API rejected the message
    #[error("Email API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// HTTP request failed before a response
    #[error("HTTP error: {0}")]
    Http(String),
}

impl MailError {
    /// Errors that will fail the same way on every retry
    pub fn is_permanent(&self) -> bool {
        match self {
            MailError::InvalidAddress(_) | MailError::Build(_) | MailError::NotConfigured => true,
            MailError::Api { status, .. } => (400..500).contains(status) && *status != 429,
            MailError::Smtp(_) | MailError::Http(_) => false,
        }
    }
}

/// Fully rendered message ready for delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    pub from_name: Option<String>,
    pub from_email: String,
    pub reply_to: Option<String>,
    pub to: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub html: String,
    pub text: Option<String>,
}

/// What the transport reported back
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReceipt {
    /// Provider message ID, when the transport returns one
    pub message_id: Option<String>,
}

/// Delivers outbound email
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Transport name for logs
    fn name(&self) -> &str;

    async fn deliver(&self, email: &OutboundEmail) -> Result<DeliveryReceipt, MailError>;
}

/// Connection settings for an owner's (or the platform's) transport
#[derive(Debug, Clone, Default)]
pub struct TransportConfig {
    pub host: String,
    pub port: Option<u16>,
    pub username: Option<String>,

    /// Decrypted SMTP password or API key
    pub password: Option<String>,

    /// Force implicit TLS
    pub secure: bool,
}

/// How an SMTP connection is secured
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpSecurity {
    ImplicitTls,
    StartTls,
    Plaintext,
}

impl TransportConfig {
    /// Whether this configuration targets the Resend HTTP API
    pub fn is_resend(&self) -> bool {
        self.host.to_ascii_lowercase().contains("resend")
    }

    pub fn security(&self) -> SmtpSecurity {
        let host = self.host.trim().to_ascii_lowercase();
        if self.secure || self.port == Some(465) {
            SmtpSecurity::ImplicitTls
        } else if host == "localhost" || host == "127.0.0.1" {
            SmtpSecurity::Plaintext
        } else {
            SmtpSecurity::StartTls
        }
    }

    /// Port to connect to: configured, else the default for the security mode
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or(match self.security() {
            SmtpSecurity::ImplicitTls => 465,
            SmtpSecurity::StartTls => 587,
            SmtpSecurity::Plaintext => 25,
        })
    }
}

/// Picks the transport for a configuration
pub fn mailer_for(config: &TransportConfig) -> Result<Box<dyn Mailer>, MailError> {
    if config.host.trim().is_empty() {
        return Err(MailError::NotConfigured);
    }

    if config.is_resend() {
        let api_key = config
            .password
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or(MailError::NotConfigured)?;
        return Ok(Box::new(ResendMailer::new(api_key)));
    }

    Ok(Box::new(SmtpMailer::new(config)?))
}

fn mailbox(name: Option<&str>, address: &str) -> Result<Mailbox, MailError> {
    let address = address
        .trim()
        .parse()
        .map_err(|_| MailError::InvalidAddress(address.to_string()))?;
    let name = name.map(str::trim).filter(|n| !n.is_empty()).map(str::to_string);
    Ok(Mailbox::new(name, address))
}

/// Formats the From header value used by HTTP transports
pub fn format_sender(name: Option<&str>, address: &str) -> String {
    match name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => format!("{} <{}>", name.replace(['<', '>', '"'], ""), address.trim()),
        None => address.trim().to_string(),
    }
}

/// Builds the lettre message for an outbound email
pub fn build_message(email: &OutboundEmail) -> Result<Message, MailError> {
    let mut builder = Message::builder()
        .from(mailbox(email.from_name.as_deref(), &email.from_email)?)
        .subject(email.subject.clone());

    if let Some(reply_to) = email.reply_to.as_deref().filter(|r| !r.trim().is_empty()) {
        builder = builder.reply_to(mailbox(None, reply_to)?);
    }
    for to in &email.to {
        builder = builder.to(mailbox(None, to)?);
    }
    for bcc in &email.bcc {
        builder = builder.bcc(mailbox(None, bcc)?);
    }

    let result = match &email.text {
        Some(text) => builder.multipart(MultiPart::alternative_plain_html(
            text.clone(),
            email.html.clone(),
        )),
        None => builder.singlepart(
            SinglePart::builder()
                .header(ContentType::TEXT_HTML)
                .body(email.html.clone()),
        ),
    };

    result.map_err(|e| MailError::Build(e.to_string()))
}

/// SMTP transport
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(config: &TransportConfig) -> Result<Self, MailError> {
        let host = config.host.trim();

        let builder = match config.security() {
            SmtpSecurity::ImplicitTls => AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                .map_err(|e| MailError::Smtp(e.to_string()))?,
            SmtpSecurity::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(|e| MailError::Smtp(e.to_string()))?,
            SmtpSecurity::Plaintext => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host),
        };

        let mut builder = builder
            .port(config.effective_port())
            .timeout(Some(Duration::from_secs(30)));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    fn name(&self) -> &str {
        "smtp"
    }

    async fn deliver(&self, email: &OutboundEmail) -> Result<DeliveryReceipt, MailError> {
        let message = build_message(email)?;

        let response = self
            .transport
            .send(message)
            .await
            .map_err(|e| MailError::Smtp(e.to_string()))?;

        // Servers usually echo a queue ID in the final reply line
        let message_id = response.message().last().map(str::to_string);

        Ok(DeliveryReceipt { message_id })
    }
}

#[derive(Debug, Serialize)]
struct ResendRequest<'a> {
    from: String,
    to: &'a [String],
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    bcc: &'a [String],
    subject: &'a str,
    html: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ResendResponse {
    id: Option<String>,
}

/// Resend HTTP API transport
pub struct ResendMailer {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl ResendMailer {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, RESEND_API_URL)
    }

    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    fn name(&self) -> &str {
        "resend"
    }

    async fn deliver(&self, email: &OutboundEmail) -> Result<DeliveryReceipt, MailError> {
        let body = ResendRequest {
            from: format_sender(email.from_name.as_deref(), &email.from_email),
            to: &email.to,
            bcc: &email.bcc,
            subject: &email.subject,
            html: &email.html,
            text: email.text.as_deref(),
            reply_to: email.reply_to.as_deref(),
        };

        let response = self
            .client
            .post(format!("{}/emails", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| MailError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(MailError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ResendResponse = response
            .json()
            .await
            .map_err(|e| MailError::Http(e.to_string()))?;

        Ok(DeliveryReceipt {
            message_id: parsed.id,
        })
    }
}

/// Mailer that keeps messages in memory
#[derive(Clone, Default)]
pub struct MemoryMailer {
    sent: Arc<Mutex<Vec<OutboundEmail>>>,
    fail_with: Arc<Mutex<Option<String>>>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following delivery fail with a transient SMTP error
    pub fn fail_with(&self, message: impl Into<String>) {
        if let Ok(mut guard) = self.fail_with.lock() {
            *guard = Some(message.into());
        }
    }

    /// Messages delivered so far
    pub fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    fn name(&self) -> &str {
        "memory"
    }

    async fn deliver(&self, email: &OutboundEmail) -> Result<DeliveryReceipt, MailError> {
        build_message(email)?;

        if let Some(message) = self.fail_with.lock().ok().and_then(|g| g.clone()) {
            return Err(MailError::Smtp(message));
        }

        let mut sent = self
            .sent
            .lock()
            .map_err(|_| MailError::Smtp("mailbox lock poisoned".to_string()))?;
        sent.push(email.clone());

        Ok(DeliveryReceipt {
            message_id: Some(format!("memory-{}", sent.len())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(host: &str, port: Option<u16>, secure: bool) -> TransportConfig {
        TransportConfig {
            host: host.to_string(),
            port,
            username: None,
            password: Some("key".to_string()),
            secure,
        }
    }

    fn email() -> OutboundEmail {
        OutboundEmail {
            from_name: Some("Acme Sales".to_string()),
            from_email: "sales@acme.test".to_string(),
            reply_to: Some("help@acme.test".to_string()),
            to: vec!["sales@acme.test".to_string()],
            bcc: vec!["a@example.com".to_string(), "b@example.com".to_string()],
            subject: "Spring news".to_string(),
            html: "<p>Hello</p>".to_string(),
            text: Some("Hello".to_string()),
        }
    }

    #[test]
    fn test_security_selection() {
        assert_eq!(config("smtp.x.test", Some(465), false).security(), SmtpSecurity::ImplicitTls);
        assert_eq!(config("smtp.x.test", Some(587), true).security(), SmtpSecurity::ImplicitTls);
        assert_eq!(config("smtp.x.test", Some(587), false).security(), SmtpSecurity::StartTls);
        assert_eq!(config("localhost", Some(1025), false).security(), SmtpSecurity::Plaintext);
    }

    #[test]
    fn test_default_ports() {
        assert_eq!(config("smtp.x.test", None, true).effective_port(), 465);
        assert_eq!(config("smtp.x.test", None, false).effective_port(), 587);
        assert_eq!(config("localhost", None, false).effective_port(), 25);
        assert_eq!(config("localhost", Some(1025), false).effective_port(), 1025);
    }

    #[test]
    fn test_resend_detection() {
        assert!(config("smtp.resend.com", Some(465), true).is_resend());
        assert!(!config("smtp.sendgrid.net", Some(587), false).is_resend());
    }

    #[test]
    fn test_mailer_for_selects_transport() {
        assert_eq!(mailer_for(&config("smtp.resend.com", None, false)).unwrap().name(), "resend");

        let mut no_key = config("smtp.resend.com", None, false);
        no_key.password = None;
        assert!(matches!(mailer_for(&no_key), Err(MailError::NotConfigured)));

        assert!(matches!(mailer_for(&config("  ", None, false)), Err(MailError::NotConfigured)));
    }

    #[tokio::test]
    async fn test_smtp_mailer_builds_for_localhost() {
        let mailer = mailer_for(&config("localhost", Some(1025), false)).unwrap();
        assert_eq!(mailer.name(), "smtp");
    }

    #[test]
    fn test_build_message_with_bcc() {
        let message = build_message(&email()).unwrap();
        let envelope = message.envelope();
        assert_eq!(envelope.to().len(), 3);

        let formatted = String::from_utf8(message.formatted()).unwrap();
        assert!(formatted.contains("Subject: Spring news"));
        assert!(!formatted.contains("a@example.com"));
    }

    #[test]
    fn test_build_message_rejects_bad_address() {
        let mut bad = email();
        bad.to = vec!["not an address".to_string()];
        assert!(matches!(build_message(&bad), Err(MailError::InvalidAddress(_))));
    }

    #[test]
    fn test_format_sender() {
        assert_eq!(format_sender(Some("Acme"), "a@acme.test"), "Acme <a@acme.test>");
        assert_eq!(format_sender(Some("  "), "a@acme.test"), "a@acme.test");
        assert_eq!(format_sender(None, " a@acme.test "), "a@acme.test");
    }

    #[test]
    fn test_permanent_errors() {
        assert!(MailError::InvalidAddress("x".into()).is_permanent());
        assert!(MailError::Api { status: 422, message: String::new() }.is_permanent());
        assert!(!MailError::Api { status: 429, message: String::new() }.is_permanent());
        assert!(!MailError::Api { status: 503, message: String::new() }.is_permanent());
        assert!(!MailError::Smtp("timeout".into()).is_permanent());
    }

    #[tokio::test]
    async fn test_memory_mailer_records() {
        let mailer = MemoryMailer::new();
        let receipt = mailer.deliver(&email()).await.unwrap();
        assert_eq!(receipt.message_id.as_deref(), Some("memory-1"));
        assert_eq!(mailer.sent().len(), 1);

        mailer.fail_with("connection refused");
        assert!(mailer.deliver(&email()).await.is_err());
        assert_eq!(mailer.sent().len(), 1);
    }
}
