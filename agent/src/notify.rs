//! SMTP notification sink for job outcomes
//!
//! Best-effort: a failed or missing mailer never fails the job.

use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::models::SmtpSettings;
use crate::errors::AgentError;

/// SMTP client for deployment notifications
pub struct Mailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl Mailer {
    /// Build a mailer from the control-row SMTP settings. Returns `None`
    /// when no SMTP host or sender is configured.
    pub fn from_settings(settings: &SmtpSettings) -> Result<Option<Self>, AgentError> {
        let (Some(host), Some(from)) = (&settings.smtp_host, &settings.smtp_from) else {
            return Ok(None);
        };

        let from: Mailbox = from
            .parse()
            .map_err(|e| AgentError::NotificationError(format!("invalid sender address: {}", e)))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .map_err(|e| AgentError::NotificationError(e.to_string()))?;

        if let Some(port) = settings.smtp_port {
            builder = builder.port(port as u16);
        }
        if let (Some(user), Some(password)) = (&settings.smtp_user, &settings.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
        }

        Ok(Some(Self {
            transport: builder.build(),
            from,
        }))
    }

    /// Send a job outcome notification to all recipients.
    pub async fn send_job_notification(
        &self,
        recipients: &[String],
        status: &str,
        release_version: &str,
        error_message: Option<&str>,
        job_id: Uuid,
    ) -> Result<(), AgentError> {
        if recipients.is_empty() {
            warn!("No notification recipients configured");
            return Ok(());
        }

        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(subject_for(status, release_version))
            .header(ContentType::TEXT_HTML);

        for recipient in recipients {
            let mailbox: Mailbox = recipient.parse().map_err(|e| {
                AgentError::NotificationError(format!("invalid recipient {}: {}", recipient, e))
            })?;
            builder = builder.to(mailbox);
        }

        let message = builder
            .body(body_for(status, release_version, error_message, job_id))
            .map_err(|e| AgentError::NotificationError(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| AgentError::NotificationError(e.to_string()))?;

        info!(
            "Notification sent ({}, version {}, {} recipients)",
            status,
            release_version,
            recipients.len()
        );
        Ok(())
    }
}

fn subject_for(status: &str, release_version: &str) -> String {
    match status {
        "SUCCESS" => format!("Deployment Successful - {}", release_version),
        "FAILED" => format!("Deployment Failed - {}", release_version),
        "ROLLBACK_SUCCESS" => format!("Rollback Successful - {}", release_version),
        "ROLLBACK_FAILED" => format!("Rollback Failed - {}", release_version),
        _ => format!("Deployment Notification - {}", release_version),
    }
}

fn body_for(
    status: &str,
    release_version: &str,
    error_message: Option<&str>,
    job_id: Uuid,
) -> String {
    let headline = match status {
        "SUCCESS" => "Deployment completed successfully.",
        "FAILED" => "Deployment failed.",
        "ROLLBACK_SUCCESS" => "Rollback completed successfully.",
        "ROLLBACK_FAILED" => "Rollback failed.",
        _ => "Deployment update.",
    };

    let mut body = format!(
        "<html><body>\
         <h2>{}</h2>\
         <p><b>Release version:</b> {}</p>\
         <p><b>Job:</b> {}</p>",
        headline, release_version, job_id
    );
    if let Some(error) = error_message {
        body.push_str(&format!("<p><b>Error:</b> {}</p>", error));
    }
    body.push_str("</body></html>");
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_templates() {
        assert_eq!(subject_for("SUCCESS", "v3"), "Deployment Successful - v3");
        assert_eq!(subject_for("FAILED", "v3"), "Deployment Failed - v3");
        assert_eq!(
            subject_for("ROLLBACK_SUCCESS", "v2"),
            "Rollback Successful - v2"
        );
        assert_eq!(subject_for("other", "v2"), "Deployment Notification - v2");
    }

    #[test]
    fn test_body_includes_error_when_present() {
        let id = Uuid::new_v4();
        let body = body_for("FAILED", "v3", Some("helm exited 1"), id);
        assert!(body.contains("helm exited 1"));
        assert!(body.contains(&id.to_string()));

        let body = body_for("SUCCESS", "v3", None, id);
        assert!(!body.contains("Error:"));
    }

    #[test]
    fn test_mailer_disabled_without_host() {
        let settings = SmtpSettings {
            smtp_host: None,
            smtp_port: None,
            smtp_user: None,
            smtp_password: None,
            smtp_from: Some("agent@example.com".to_string()),
        };
        assert!(Mailer::from_settings(&settings).unwrap().is_none());
    }
}
