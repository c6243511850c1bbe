//! Alert delivery
//!
//! A confirmed sound anomaly sends two messages: a movement directive for
//! the robot and a human readable alert for the dashboard. Delivery is
//! at-most-once; failures are reported to the caller, never retried here.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{ALERT_MESSAGE, TOPIC_ROBOT_MOVE, TOPIC_WEB_ALERT};
use crate::logic::error::{DetectError, DetectResult};

// ============================================================================
// PAYLOADS
// ============================================================================

/// Robot movement command
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MoveDirective {
    pub x: i32,
    pub y: i32,
}

impl MoveDirective {
    /// Single step forward, towards the patient
    pub fn forward() -> Self {
        Self { x: 0, y: 1 }
    }
}

/// Dashboard alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HumanAlert {
    pub alert: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl HumanAlert {
    pub fn abnormal_sound(subject_id: &str, timestamp: &str) -> Self {
        Self {
            alert: ALERT_MESSAGE.to_string(),
            subject_id: Some(subject_id.to_string()),
            timestamp: Some(timestamp.to_string()),
        }
    }
}

/// Topic + payload pairs for one confirmed anomaly, in send order
pub fn alert_messages(subject_id: &str, timestamp: &str) -> DetectResult<Vec<(&'static str, Value)>> {
    let to_json = |v: serde_json::Result<Value>| v.map_err(|e| DetectError::Config(format!("alert payload: {}", e)));
    Ok(vec![
        (TOPIC_ROBOT_MOVE, to_json(serde_json::to_value(MoveDirective::forward()))?),
        (
            TOPIC_WEB_ALERT,
            to_json(serde_json::to_value(HumanAlert::abnormal_sound(subject_id, timestamp)))?,
        ),
    ])
}

// ============================================================================
// CHANNELS
// ============================================================================

pub trait AlertChannel: Send + Sync {
    fn publish(&self, topic: &str, payload: &Value) -> DetectResult<()>;
}

impl<T: AlertChannel + ?Sized> AlertChannel for Arc<T> {
    fn publish(&self, topic: &str, payload: &Value) -> DetectResult<()> {
        (**self).publish(topic, payload)
    }
}

/// POSTs each message as JSON to `<base_url>/<topic>`
pub struct WebhookChannel {
    base_url: String,
    timeout: Duration,
}

impl WebhookChannel {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn url_for(&self, topic: &str) -> String {
        format!("{}/{}", self.base_url, topic.trim_start_matches('/'))
    }
}

impl AlertChannel for WebhookChannel {
    fn publish(&self, topic: &str, payload: &Value) -> DetectResult<()> {
        let url = self.url_for(topic);
        let response = ureq::post(&url)
            .timeout(self.timeout)
            .set("Content-Type", "application/json")
            .send_string(&payload.to_string());

        match response {
            Ok(resp) => {
                log::info!("Alert sent to {} ({})", url, resp.status());
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to send alert to {}: {}", url, e);
                Err(DetectError::Connectivity(format!("alert channel {}: {}", url, e)))
            }
        }
    }
}

/// Writes alerts to the log only (no bus configured)
#[derive(Debug, Default)]
pub struct LogChannel;

impl AlertChannel for LogChannel {
    fn publish(&self, topic: &str, payload: &Value) -> DetectResult<()> {
        log::warn!("[ALERT] {} <- {}", topic, payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_alert_payloads() {
        let messages = alert_messages("10", "2025-03-01 10:00:00").unwrap();
        assert_eq!(messages[0], (TOPIC_ROBOT_MOVE, json!({"x": 0, "y": 1})));
        assert_eq!(messages[1].0, TOPIC_WEB_ALERT);
        assert_eq!(messages[1].1["alert"], json!("Patient abnormal sound detected!"));
        assert_eq!(messages[1].1["subject_id"], json!("10"));
    }

    #[test]
    fn test_webhook_url() {
        let channel = WebhookChannel::new("http://bus.local:8080/");
        assert_eq!(channel.url_for("robot/move"), "http://bus.local:8080/robot/move");
    }

    #[test]
    fn test_unreachable_webhook_is_connectivity_error() {
        // bind then drop: the port refuses connections right away
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let channel = WebhookChannel::new(&format!("http://127.0.0.1:{}", port))
            .with_timeout(Duration::from_millis(500));
        let result = channel.publish(TOPIC_WEB_ALERT, &json!({"alert": "x"}));
        assert!(matches!(result, Err(DetectError::Connectivity(_))));
    }
}
