//! Results of applying a form submission

use crate::error::CloudError;
use serde::{Deserialize, Serialize};

/// Result of applying a submission
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplyResult {
    /// Successfully applied actions
    pub succeeded: Vec<ActionResult>,

    /// Failed actions
    pub failed: Vec<ActionResult>,

    /// Total execution time in milliseconds
    pub duration_ms: u64,
}

impl ApplyResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Nothing was attempted
    pub fn is_empty(&self) -> bool {
        self.succeeded.is_empty() && self.failed.is_empty()
    }

    pub fn add_success(&mut self, action_id: impl Into<String>, message: impl Into<String>) {
        self.succeeded.push(ActionResult {
            action_id: action_id.into(),
            success: true,
            message: message.into(),
            error: None,
            timed_out: false,
        });
    }

    pub fn add_failure(&mut self, action_id: impl Into<String>, error: &CloudError) {
        self.failed.push(ActionResult {
            action_id: action_id.into(),
            success: false,
            message: String::new(),
            error: Some(error.to_string()),
            timed_out: matches!(
                error,
                CloudError::Timeout(_) | CloudError::ProvisioningTimedOut { .. }
            ),
        });
    }

    /// User-facing notifications, one per action
    pub fn notifications(&self) -> Vec<Notification> {
        let mut out: Vec<Notification> = self
            .succeeded
            .iter()
            .map(|r| Notification::success(&r.action_id, &r.message))
            .collect();

        for r in &self.failed {
            let body = r.error.clone().unwrap_or_default();
            if r.timed_out {
                out.push(Notification::warning(
                    &r.action_id,
                    format!("{}. Verify the current state manually.", body),
                ));
            } else {
                out.push(Notification::danger(&r.action_id, body));
            }
        }
        out
    }
}

/// Result of a single action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    /// ID of the action
    pub action_id: String,

    /// Whether the action succeeded
    pub success: bool,

    /// Success message
    pub message: String,

    /// Error message if failed
    pub error: Option<String>,

    /// The outcome of the external call is unknown
    #[serde(default)]
    pub timed_out: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Success,
    Warning,
    Danger,
}

/// Message shown to the user after a submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub title: String,
    pub body: String,
}

impl Notification {
    fn new(level: NotificationLevel, action_id: &str, body: impl Into<String>) -> Self {
        let title = match level {
            NotificationLevel::Success => format!("{} applied", action_id),
            NotificationLevel::Warning => format!("{} timed out", action_id),
            NotificationLevel::Danger => format!("{} failed", action_id),
        };
        Self {
            level,
            title,
            body: body.into(),
        }
    }

    pub fn success(action_id: &str, body: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Success, action_id, body)
    }

    pub fn warning(action_id: &str, body: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Warning, action_id, body)
    }

    pub fn danger(action_id: &str, body: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Danger, action_id, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notifications_by_outcome() {
        let mut result = ApplyResult::new();
        assert!(result.is_empty());

        result.add_success("horizontal", "HPA 2-5 replicas at 70% CPU");
        result.add_failure(
            "vertical",
            &CloudError::operation_failed("aws", "the server could not find the requested resource"),
        );
        result.add_failure("replicas", &CloudError::Timeout("kubectl after 120s".into()));

        assert!(!result.is_success());
        let levels: Vec<_> = result.notifications().iter().map(|n| n.level).collect();
        assert_eq!(
            levels,
            vec![
                NotificationLevel::Success,
                NotificationLevel::Danger,
                NotificationLevel::Warning
            ]
        );

        let danger = &result.notifications()[1];
        assert_eq!(danger.title, "vertical failed");
        assert!(danger.body.contains("could not find the requested resource"));
    }
}
