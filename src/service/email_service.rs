//! Email Service
//!
//! Outbound email for one-time passcodes. The [`EmailGateway`] trait is the
//! seam the OTP lifecycle depends on; delivery failures are reported as
//! `false` rather than raised, so a failed send never loses the stored code.

use async_trait::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use log::{error, info, warn};

use crate::config::EmailConfig;
use crate::utils::error::{AppError, AppResult};

/// Delivery contract for outbound email
#[async_trait]
pub trait EmailGateway: Send + Sync {
    /// Deliver a plain-text message, returning whether it was accepted
    async fn send(&self, to: &str, subject: &str, body: &str) -> bool;
}

/// Subject and body of the email carrying a one-time passcode
pub fn compose_otp_email(app_name: &str, code: &str, ttl_seconds: u64) -> (String, String) {
    let minutes = (ttl_seconds / 60).max(1);
    let subject = format!("{} - Verification Code", app_name);
    let body = format!(
        "Your verification code is: {}\n\n\
         This code will expire in {} minutes.\n\n\
         If you didn't request this code, you can safely ignore this email.\n\n\
         The {} Team",
        code, minutes, app_name
    );
    (subject, body)
}

/// SMTP delivery through lettre
pub struct SmtpEmailGateway {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    config: EmailConfig,
}

impl SmtpEmailGateway {
    pub fn new(config: EmailConfig) -> AppResult<Self> {
        let creds = Credentials::new(config.smtp_username.clone(), config.smtp_password.clone());

        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
            .map_err(|e| AppError::Configuration(format!("Failed to configure SMTP relay: {}", e)))?
            .port(config.smtp_port)
            .credentials(creds)
            .build();

        Ok(Self { transport, config })
    }

    fn build_message(&self, to: &str, subject: &str, body: &str) -> AppResult<Message> {
        Message::builder()
            .from(
                format!("{} <{}>", self.config.from_name, self.config.from_email)
                    .parse()
                    .map_err(|e| {
                        AppError::Configuration(format!("Invalid from email address: {}", e))
                    })?,
            )
            .to(to.parse().map_err(|e| {
                AppError::BadRequest(format!("Invalid recipient email address: {}", e))
            })?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| AppError::Internal(format!("Failed to build email message: {}", e)))
    }
}

#[async_trait]
impl EmailGateway for SmtpEmailGateway {
    async fn send(&self, to: &str, subject: &str, body: &str) -> bool {
        let message = match self.build_message(to, subject, body) {
            Ok(message) => message,
            Err(e) => {
                error!("Could not build email to {}: {}", to, e);
                return false;
            }
        };

        match self.transport.send(message).await {
            Ok(_) => {
                info!("Email '{}' sent to {}", subject, to);
                true
            }
            Err(e) => {
                error!("Failed to send email to {}: {}", to, e);
                false
            }
        }
    }
}

/// Gateway that only logs, used when SMTP is not configured
///
/// The body is never logged because it carries the code.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogEmailGateway;

#[async_trait]
impl EmailGateway for LogEmailGateway {
    async fn send(&self, to: &str, subject: &str, _body: &str) -> bool {
        warn!(
            "SMTP not configured; email '{}' to {} was not delivered",
            subject, to
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> EmailConfig {
        EmailConfig {
            smtp_host: "smtp.example.com".to_string(),
            smtp_port: 587,
            smtp_username: "mailer".to_string(),
            smtp_password: "password".to_string(),
            from_name: "Identity Service".to_string(),
            from_email: "noreply@example.com".to_string(),
        }
    }

    #[test]
    fn test_compose_otp_email() {
        let (subject, body) = compose_otp_email("Identity Service", "042917", 600);
        assert_eq!(subject, "Identity Service - Verification Code");
        assert!(body.contains("042917"));
        assert!(body.contains("10 minutes"));
    }

    #[tokio::test]
    async fn test_smtp_message_building() {
        let gateway = SmtpEmailGateway::new(test_config()).unwrap();

        assert!(gateway
            .build_message("user@example.com", "Subject", "Body")
            .is_ok());
        assert!(gateway.build_message("not an address", "Subject", "Body").is_err());
    }

    #[tokio::test]
    async fn test_log_gateway_accepts() {
        assert!(LogEmailGateway.send("user@example.com", "Subject", "123456").await);
    }
}
