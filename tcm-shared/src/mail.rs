/// Outgoing onboarding mail
///
/// Handlers depend on the `Mailer` trait only. `LogMailer` writes the message
/// to the log, which is what development and tests use; a delivery backend
/// plugs in by implementing the trait.

use async_trait::async_trait;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// An invitation to join an organization
#[derive(Debug, Clone)]
pub struct InvitationMail<'a> {
    pub to: &'a str,
    pub organization_name: &'a str,
    pub invited_by: &'a str,
    pub accept_url: String,
}

/// A link confirming ownership of an email address
#[derive(Debug, Clone)]
pub struct VerificationMail<'a> {
    pub to: &'a str,
    pub name: &'a str,
    pub verify_url: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_invitation(&self, mail: InvitationMail<'_>) -> Result<(), MailError>;

    async fn send_verification(&self, mail: VerificationMail<'_>) -> Result<(), MailError>;
}

/// Builds a link to a frontend page carrying a one-time token
pub fn token_link(base_url: &str, path: &str, token: &str) -> String {
    format!(
        "{}/{}?token={}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/'),
        token
    )
}

fn check_recipient(to: &str) -> Result<(), MailError> {
    match to.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(MailError::InvalidRecipient(to.to_string())),
    }
}

/// Logs messages instead of sending them
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_invitation(&self, mail: InvitationMail<'_>) -> Result<(), MailError> {
        check_recipient(mail.to)?;

        info!(
            to = mail.to,
            organization = mail.organization_name,
            invited_by = mail.invited_by,
            url = %mail.accept_url,
            "Invitation mail"
        );

        Ok(())
    }

    async fn send_verification(&self, mail: VerificationMail<'_>) -> Result<(), MailError> {
        check_recipient(mail.to)?;

        info!(to = mail.to, name = mail.name, url = %mail.verify_url, "Verification mail");

        Ok(())
    }
}
