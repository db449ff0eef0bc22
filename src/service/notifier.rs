use anyhow::{Context, Result};
use lettre::message::{Mailbox, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use sqlx::MySqlPool;

use crate::config::SmtpConfig;
use crate::model::conge::{Conge, LeaveStatus};
use crate::model::notification::NotificationKind;

#[derive(Clone)]
pub enum Mailer {
    Smtp {
        transport: AsyncSmtpTransport<Tokio1Executor>,
        from: Mailbox,
    },
    /// No SMTP configured: mails are written to the log only.
    LogOnly,
}

impl Mailer {
    pub fn from_config(smtp: Option<&SmtpConfig>) -> Result<Self> {
        let Some(smtp) = smtp else {
            return Ok(Mailer::LogOnly);
        };

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host)
            .with_context(|| format!("invalid SMTP host {}", smtp.host))?
            .port(smtp.port);
        if let (Some(user), Some(pass)) = (&smtp.username, &smtp.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        let from = smtp
            .from
            .parse::<Mailbox>()
            .with_context(|| format!("invalid SMTP_FROM address {}", smtp.from))?;

        Ok(Mailer::Smtp {
            transport: builder.build(),
            from,
        })
    }

    pub async fn send(&self, to: &str, subject: &str, body: String) -> Result<()> {
        match self {
            Mailer::Smtp { transport, from } => {
                let email = Message::builder()
                    .from(from.clone())
                    .to(to.parse().with_context(|| format!("invalid recipient {to}"))?)
                    .subject(subject)
                    .header(ContentType::TEXT_PLAIN)
                    .body(body)?;
                transport.send(email).await?;
            }
            Mailer::LogOnly => {
                tracing::info!(to, subject, "Email (SMTP disabled)");
            }
        }
        Ok(())
    }
}

/// In-app notifications plus best-effort email.
#[derive(Clone)]
pub struct Notifier {
    pool: MySqlPool,
    mailer: Mailer,
}

impl Notifier {
    pub fn new(pool: MySqlPool, mailer: Mailer) -> Self {
        Self { pool, mailer }
    }

    /// Writes a notification row. Failures are logged and swallowed.
    pub async fn notify(&self, recipient_id: u64, kind: NotificationKind, title: &str, message: &str) {
        let result = sqlx::query(
            "INSERT INTO notifications (recipient_id, kind, title, message) VALUES (?, ?, ?, ?)",
        )
        .bind(recipient_id)
        .bind(kind.to_string())
        .bind(title)
        .bind(message)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            tracing::warn!(error = %e, recipient_id, %kind, "Failed to store notification");
        }
    }

    /// Sends on a background task; the caller never waits for SMTP.
    pub fn email_in_background(&self, to: String, subject: String, body: String) {
        let mailer = self.mailer.clone();
        actix_web::rt::spawn(async move {
            if let Err(e) = mailer.send(&to, &subject, body).await {
                tracing::warn!(error = %e, to = %to, "Failed to send email");
            }
        });
    }

    async fn recipient(&self, employee_id: u64) -> Option<(String, String)> {
        sqlx::query_as::<_, (String, String)>(
            "SELECT email, first_name FROM employees WHERE id = ?",
        )
        .bind(employee_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| tracing::warn!(error = %e, employee_id, "Failed to load recipient"))
        .ok()
        .flatten()
    }

    pub async fn leave_submitted(&self, conge: &Conge) {
        let Some(chef_id) = conge.chef_id else {
            return;
        };
        let message = format!(
            "Employee #{} requested {} day(s) of {} leave from {} to {}.",
            conge.employee_id, conge.number_of_days, conge.leave_type, conge.start_date, conge.end_date
        );
        self.notify(chef_id, NotificationKind::LeaveSubmitted, "New leave request", &message)
            .await;
    }

    pub async fn leave_decided(&self, conge: &Conge) {
        let status = match conge.status() {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(leave_id = conge.id, error = %e, "Decision notification skipped");
                return;
            }
        };
        let kind = match status {
            LeaveStatus::Approved => NotificationKind::LeaveApproved,
            LeaveStatus::Rejected => NotificationKind::LeaveRejected,
            LeaveStatus::Pending => return,
        };
        let Some((email, first_name)) = self.recipient(conge.employee_id).await else {
            return;
        };
        let (subject, body) = leave_decision_email(&first_name, conge, status);
        self.notify(conge.employee_id, kind, &subject, &body).await;
        self.email_in_background(email, subject, body);
    }

    pub async fn leave_cancelled(&self, conge: &Conge) {
        if let Some(chef_id) = conge.chef_id {
            let message = format!(
                "Leave request #{} of employee #{} was deleted.",
                conge.id, conge.employee_id
            );
            self.notify(chef_id, NotificationKind::LeaveCancelled, "Leave request deleted", &message)
                .await;
        }
    }
}

pub fn leave_decision_email(first_name: &str, conge: &Conge, status: LeaveStatus) -> (String, String) {
    let verdict = match status {
        LeaveStatus::Approved => "approved",
        LeaveStatus::Rejected => "rejected",
        LeaveStatus::Pending => "updated",
    };
    let subject = format!("Your leave request has been {verdict}");
    let mut body = format!(
        "Hello {first_name},\n\nYour {} leave request from {} to {} ({} day(s)) has been {verdict}.",
        conge.leave_type, conge.start_date, conge.end_date, conge.number_of_days
    );
    if let Some(comment) = conge.decision_comment.as_deref().filter(|c| !c.trim().is_empty()) {
        body.push_str(&format!("\n\nComment: {comment}"));
    }
    body.push_str("\n\nHR team");
    (subject, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn approved_conge(comment: Option<&str>) -> Conge {
        Conge {
            id: 5,
            employee_id: 9,
            chef_id: Some(2),
            leave_type: "annual".into(),
            start_date: NaiveDate::from_ymd_opt(2026, 7, 6).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2026, 7, 10).unwrap(),
            number_of_days: 5,
            reason: None,
            status: "approved".into(),
            is_medical: false,
            deduct_from_balance: true,
            decided_by: Some(2),
            decided_at: None,
            decision_comment: comment.map(str::to_string),
            created_at: None,
        }
    }

    #[test]
    fn decision_email_mentions_period_and_verdict() {
        let (subject, body) = leave_decision_email("Ana", &approved_conge(None), LeaveStatus::Approved);
        assert_eq!(subject, "Your leave request has been approved");
        assert!(body.starts_with("Hello Ana,"));
        assert!(body.contains("from 2026-07-06 to 2026-07-10 (5 day(s))"));
        assert!(!body.contains("Comment:"));
    }

    #[test]
    fn decision_email_carries_the_comment() {
        let conge = approved_conge(Some("Enjoy"));
        let (_, body) = leave_decision_email("Ana", &conge, LeaveStatus::Approved);
        assert!(body.contains("Comment: Enjoy"));
    }

    #[actix_web::test]
    async fn log_only_mailer_always_succeeds() {
        let mailer = Mailer::from_config(None).unwrap();
        assert!(mailer.send("nobody@example.com", "s", "b".into()).await.is_ok());
    }
}
