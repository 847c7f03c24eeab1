//! Invitation email delivery.
//!
//! Delivery is best-effort and at-most-once: the lifecycle controller calls
//! the notifier inline after a create or resend and logs failures without
//! rolling back the invitation write.

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use service_core::error::AppError;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::config::SmtpConfig;
use crate::models::Invitation;

#[async_trait]
pub trait InvitationNotifier: Send + Sync {
    async fn send_invitation(
        &self,
        invitation: &Invitation,
        invite_url: &str,
    ) -> Result<(), AppError>;
}

pub struct SmtpNotifier {
    config: SmtpConfig,
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
}

impl SmtpNotifier {
    pub fn new(config: SmtpConfig) -> Result<Self, AppError> {
        if !config.enabled {
            return Ok(Self {
                config,
                transport: None,
            });
        }

        let creds = Credentials::new(config.user.clone(), config.password.clone());

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| AppError::EmailError(format!("Failed to create SMTP relay: {}", e)))?
            .port(config.port)
            .credentials(creds)
            .build();

        Ok(Self {
            config,
            transport: Some(transport),
        })
    }

    fn bodies(invitation: &Invitation, invite_url: &str) -> (String, String) {
        let note = invitation
            .message
            .as_deref()
            .map(|m| format!("\n\n{}\n", m))
            .unwrap_or_default();

        let text = format!(
            "You have been invited to join an organization.{}\n\
             Open the link below to accept the invitation. It expires on {}.\n\n{}\n",
            note,
            invitation.expires_at.format("%Y-%m-%d %H:%M UTC"),
            invite_url,
        );

        let html_note = invitation
            .message
            .as_deref()
            .map(|m| format!("<p>{}</p>", m))
            .unwrap_or_default();

        let html = format!(
            "<p>You have been invited to join an organization.</p>{}\
             <p><a href=\"{}\">Accept your invitation</a></p>\
             <p>This link expires on {}.</p>",
            html_note,
            invite_url,
            invitation.expires_at.format("%Y-%m-%d %H:%M UTC"),
        );

        (text, html)
    }
}

#[async_trait]
impl InvitationNotifier for SmtpNotifier {
    async fn send_invitation(
        &self,
        invitation: &Invitation,
        invite_url: &str,
    ) -> Result<(), AppError> {
        if !self.config.enabled {
            return Err(AppError::EmailError(
                "SMTP notifier is not enabled".to_string(),
            ));
        }

        let transport = self
            .transport
            .as_ref()
            .ok_or_else(|| AppError::EmailError("SMTP transport not initialized".to_string()))?;

        let from_mailbox: Mailbox =
            format!("{} <{}>", self.config.from_name, self.config.from_email)
                .parse()
                .map_err(|e| AppError::EmailError(format!("Invalid from address: {}", e)))?;

        let to_mailbox: Mailbox = invitation
            .email
            .parse()
            .map_err(|e| AppError::EmailError(format!("Invalid recipient: {}", e)))?;

        let (text, html) = Self::bodies(invitation, invite_url);

        let message = Message::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject("You have been invited")
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html),
                    ),
            )
            .map_err(|e| AppError::EmailError(format!("Failed to build message: {}", e)))?;

        transport
            .send(message)
            .await
            .map_err(|e| AppError::EmailError(format!("Failed to send email: {}", e)))?;

        tracing::info!(
            to = %invitation.email,
            invitation_id = %invitation.invitation_id,
            "Invitation email sent"
        );

        Ok(())
    }
}

/// Mock notifier for tests and disabled-SMTP deployments. Counts sends and
/// can be flipped into a failing mode to exercise the swallow-and-log path.
#[derive(Default)]
pub struct MockNotifier {
    send_count: AtomicU64,
    failing: AtomicBool,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send_count(&self) -> u64 {
        self.send_count.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl InvitationNotifier for MockNotifier {
    async fn send_invitation(
        &self,
        invitation: &Invitation,
        invite_url: &str,
    ) -> Result<(), AppError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::EmailError(
                "Mock notifier configured to fail".to_string(),
            ));
        }

        self.send_count.fetch_add(1, Ordering::SeqCst);

        tracing::info!(
            to = %invitation.email,
            url = %invite_url,
            "[MOCK] Invitation email would be sent"
        );

        Ok(())
    }
}
