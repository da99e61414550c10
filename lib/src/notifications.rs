// lib/src/notifications.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{error, info};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;

use models::errors::{PortalError, PortalResult};
use models::timestamps::Zone;
use models::medical::Appointment;

use crate::util::CallLimits;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl Notification {
    pub fn appointment_confirmation(
        to: &str,
        patient_name: &str,
        appointment: &Appointment,
        zone: Zone,
    ) -> Self {
        let when = zone.format(appointment.appointment_date, "%A, %B %-d %Y at %H:%M (UTC%:z)");
        let doctor = match &appointment.doctor_specialty {
            Some(specialty) => format!("{} ({})", appointment.doctor_name, specialty),
            None => appointment.doctor_name.clone(),
        };
        Notification {
            to: to.to_string(),
            subject: "Your appointment is confirmed".to_string(),
            body: format!(
                "Hello {},\n\nYour appointment with {} is booked for {}.\nReason: {}\n",
                patient_name,
                doctor,
                when,
                appointment.reason
            ),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationSink: Send + Sync + 'static {
    async fn send(&self, notification: Notification) -> PortalResult<()>;
}

/// Writes notifications to the log instead of delivering them.
#[derive(Debug, Default)]
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn send(&self, notification: Notification) -> PortalResult<()> {
        info!("Notification to {}: {}", notification.to, notification.subject);
        Ok(())
    }
}

/// POSTs each notification as JSON to a mail relay webhook.
pub struct WebhookNotificationSink {
    http_client: Client,
    url: String,
}

impl WebhookNotificationSink {
    pub fn new(url: &str) -> Self {
        WebhookNotificationSink {
            http_client: Client::new(),
            url: url.to_string(),
        }
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    #[serde(flatten)]
    notification: &'a Notification,
    sent_at: DateTime<Utc>,
}

#[async_trait]
impl NotificationSink for WebhookNotificationSink {
    async fn send(&self, notification: Notification) -> PortalResult<()> {
        let response = self
            .http_client
            .post(&self.url)
            .json(&WebhookPayload {
                notification: &notification,
                sent_at: Utc::now(),
            })
            .send()
            .await
            .map_err(|e| PortalError::upstream("notification", e.to_string()))?;
        if !response.status().is_success() {
            return Err(PortalError::upstream(
                "notification",
                format!("HTTP {}", response.status()),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationConfig {
    /// Deliver through this webhook; notifications are only logged when unset.
    #[serde(default)]
    pub webhook_url: Option<String>,
}

impl NotificationConfig {
    pub fn build(&self) -> Arc<dyn NotificationSink> {
        match self.webhook_url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
            Some(url) => Arc::new(WebhookNotificationSink::new(url)),
            None => Arc::new(LogNotificationSink),
        }
    }
}

/// Sends notifications in the background. Delivery failures and timeouts are
/// logged at error level and never reach the caller.
#[derive(Clone)]
pub struct Notifier {
    sink: Arc<dyn NotificationSink>,
    limits: CallLimits,
}

impl Notifier {
    pub fn new(sink: Arc<dyn NotificationSink>, limits: CallLimits) -> Self {
        Notifier { sink, limits }
    }

    pub fn dispatch(&self, notification: Notification) -> JoinHandle<()> {
        let sink = self.sink.clone();
        let limits = self.limits;
        tokio::spawn(async move {
            let to = notification.to.clone();
            if let Err(e) = limits.run("notification", sink.send(notification)).await {
                error!("Failed to deliver notification to {}: {}", to, e);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use models::medical::NewAppointment;
    use std::time::Duration;
    use uuid::Uuid;

    fn appointment() -> Appointment {
        Appointment::from_new(NewAppointment {
            patient_id: Uuid::new_v4(),
            doctor_name: "Dr. Sarah Wilson".to_string(),
            doctor_specialty: Some("Cardiology".to_string()),
            appointment_date: "2026-03-02T09:30:00Z".parse().unwrap(),
            reason: "Chest pain".to_string(),
        })
    }

    #[test]
    fn confirmation_renders_in_requested_zone() {
        let zone = Zone::Fixed(chrono::FixedOffset::east_opt(5 * 3600 + 1800).unwrap());
        let note = Notification::appointment_confirmation("ada@x.com", "Ada", &appointment(), zone);
        assert_eq!(note.to, "ada@x.com");
        assert!(note.body.contains("Dr. Sarah Wilson (Cardiology)"));
        assert!(note.body.contains("15:00"));
    }

    #[tokio::test]
    async fn failed_delivery_is_swallowed() {
        let mut sink = MockNotificationSink::new();
        sink.expect_send()
            .times(1)
            .returning(|_| Err(PortalError::upstream("notification", "relay down")));
        let notifier = Notifier::new(Arc::new(sink), CallLimits::new(Duration::from_millis(100)));
        let handle = notifier.dispatch(Notification {
            to: "ada@x.com".to_string(),
            subject: "s".to_string(),
            body: "b".to_string(),
        });
        assert!(handle.await.is_ok());
    }
}
