/// Message composition helpers shared by the API and the worker
///
/// Newsletters go out as BCC chunks: the recipient list is deduplicated
/// case-insensitively and split into groups of at most [`BCC_CHUNK_SIZE`];
/// each chunk becomes one message addressed To the sender.

use crate::crypto::{CryptoError, SecretBox};
use crate::models::app_settings::AppSettings;
use crate::models::email_send::EmailSend;

use super::transport::{OutboundEmail, TransportConfig};

/// Maximum BCC recipients per newsletter message
pub const BCC_CHUNK_SIZE: usize = 50;

/// Sender identity for a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub name: Option<String>,
    pub email: String,
    pub reply_to: Option<String>,
}

impl Sender {
    /// Sender configured in an owner's settings, if a from address is set
    pub fn from_settings(settings: &AppSettings) -> Option<Self> {
        let email = settings
            .from_email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())?
            .to_string();

        let name = settings
            .from_name
            .clone()
            .or_else(|| settings.company_name.clone())
            .filter(|n| !n.trim().is_empty());

        Some(Self {
            name,
            email,
            reply_to: settings.reply_to.clone().filter(|r| !r.trim().is_empty()),
        })
    }
}

/// Trims, drops empties and removes case-insensitive duplicates
pub fn dedupe_addresses<I, S>(addresses: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();

    for address in addresses {
        let address = address.as_ref().trim();
        if address.is_empty() {
            continue;
        }
        if seen.insert(address.to_lowercase()) {
            out.push(address.to_string());
        }
    }

    out
}

/// Splits recipients into groups of at most `size`
pub fn chunk_recipients(recipients: &[String], size: usize) -> Vec<Vec<String>> {
    recipients
        .chunks(size.max(1))
        .map(<[String]>::to_vec)
        .collect()
}

/// Transport settings for an owner, decrypting the stored SMTP password
///
/// Returns `Ok(None)` when the owner has no SMTP host configured.
pub fn transport_config(
    settings: &AppSettings,
    secrets: &SecretBox,
) -> Result<Option<TransportConfig>, CryptoError> {
    if !settings.has_transport() {
        return Ok(None);
    }

    let password = settings
        .smtp_password_encrypted
        .as_deref()
        .map(|encrypted| secrets.decrypt(encrypted))
        .transpose()?;

    Ok(Some(TransportConfig {
        host: settings.smtp_host.clone().unwrap_or_default(),
        port: settings.smtp_port.and_then(|p| u16::try_from(p).ok()),
        username: settings.smtp_username.clone().filter(|u| !u.is_empty()),
        password,
        secure: settings.smtp_secure,
    }))
}

/// Assembles the outbound message for a queued send
pub fn outbound_for_send(send: &EmailSend, sender: &Sender) -> OutboundEmail {
    OutboundEmail {
        from_name: sender.name.clone(),
        from_email: sender.email.clone(),
        reply_to: sender.reply_to.clone(),
        to: send.to_addresses.clone(),
        bcc: send.bcc_addresses.clone(),
        subject: send.subject.clone(),
        html: send.body_html.clone(),
        text: send.body_text.clone(),
    }
}
