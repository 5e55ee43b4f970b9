use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payload sent to the backend's auto-fix endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub error_message: String,
    #[serde(default)]
    pub stack: Option<String>,
    #[serde(default)]
    pub component_stack: Option<String>,
    /// Data URL of a page capture, when one was taken.
    #[serde(default)]
    pub screenshot: Option<String>,
    pub url: String,
}

impl ErrorReport {
    pub fn new(error_message: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            error_message: error_message.into(),
            stack: None,
            component_stack: None,
            screenshot: None,
            url: url.into(),
        }
    }

    pub fn from_panic(payload: &(dyn std::any::Any + Send), url: impl Into<String>) -> Self {
        Self::new(panic_message(payload), url)
    }
}

pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AutoFixState {
    Idle,
    Sending,
    Analysed(Value),
    Failed(String),
}

/// Client-side state of the "send report" fallback. Retrying is manual and
/// only allowed after a failure.
#[derive(Debug, Clone)]
pub struct AutoFixFlow {
    report: ErrorReport,
    state: AutoFixState,
}

impl AutoFixFlow {
    pub fn new(report: ErrorReport) -> Self {
        Self {
            report,
            state: AutoFixState::Idle,
        }
    }

    pub fn state(&self) -> &AutoFixState {
        &self.state
    }

    pub fn report(&self) -> &ErrorReport {
        &self.report
    }

    pub fn attach_screenshot(&mut self, data_url: impl Into<String>) {
        self.report.screenshot = Some(data_url.into());
    }

    /// Moves to `Sending` and hands out the payload, or `None` while a send
    /// is in flight or already succeeded.
    pub fn begin_send(&mut self) -> Option<&ErrorReport> {
        match self.state {
            AutoFixState::Idle | AutoFixState::Failed(_) => {
                self.state = AutoFixState::Sending;
                Some(&self.report)
            }
            AutoFixState::Sending | AutoFixState::Analysed(_) => None,
        }
    }

    pub fn finish<E: std::fmt::Display>(&mut self, outcome: Result<Value, E>) {
        self.state = match outcome {
            Ok(analysis) => AutoFixState::Analysed(analysis),
            Err(err) => AutoFixState::Failed(err.to_string()),
        };
    }

    pub fn can_retry(&self) -> bool {
        matches!(self.state, AutoFixState::Failed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flow_sends_once_and_retries_after_failure() {
        let mut flow = AutoFixFlow::new(ErrorReport::new("boom", "http://localhost/"));
        assert!(flow.begin_send().is_some());
        assert!(flow.begin_send().is_none());

        flow.finish::<String>(Err("connection refused".into()));
        assert!(flow.can_retry());
        assert_eq!(flow.state(), &AutoFixState::Failed("connection refused".into()));

        assert!(flow.begin_send().is_some());
        flow.finish::<String>(Ok(json!({"diagnosis": "null user"})));
        assert!(!flow.can_retry());
        assert!(flow.begin_send().is_none());
    }

    #[test]
    fn screenshot_is_optional_in_payload() {
        let mut report = ErrorReport::new("boom", "/goals");
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["screenshot"], Value::Null);

        report.screenshot = Some("data:image/png;base64,AAAA".into());
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["screenshot"], "data:image/png;base64,AAAA");
        assert_eq!(value["error_message"], "boom");
    }

    #[test]
    fn panic_payloads_become_messages() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("static str");
        assert_eq!(panic_message(payload.as_ref()), "static str");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(ErrorReport::from_panic(payload.as_ref(), "/").error_message, "owned");
    }
}
