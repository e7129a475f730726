//! In-memory transport for dry runs.
//!
//! [`RecordingTransport`] prints every element command as a JSON line instead
//! of sending it, and takes as long as the gesture would. [`PlannedWaiter`]
//! pretends the awaited element shows up after a given number of scrolls.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::sync::watch;

use fludrive_core::driver::{Condition, ConditionWaiter, DriverError, ElementCommandExecutor};
use fludrive_core::element::ElementLocator;
use fludrive_core::gesture::SCROLL_COMMAND;

pub struct RecordingTransport {
    scrolls: watch::Sender<usize>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        let (scrolls, _) = watch::channel(0);
        Self { scrolls }
    }

    pub fn scroll_count(&self) -> watch::Receiver<usize> {
        self.scrolls.subscribe()
    }
}

impl Default for RecordingTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ElementCommandExecutor for RecordingTransport {
    async fn execute_element_command(
        &self,
        command: &str,
        element: &ElementLocator,
        payload: Map<String, Value>,
    ) -> Result<Value, DriverError> {
        let gesture_us = payload.get("duration").and_then(Value::as_u64);
        let line = json!({
            "command": command,
            "element": element.as_str(),
            "target": element.to_string(),
            "payload": payload,
        });
        println!("{}", line);

        if command == SCROLL_COMMAND {
            self.scrolls.send_modify(|n| *n += 1);
            if let Some(us) = gesture_us {
                tokio::time::sleep(Duration::from_micros(us)).await;
            }
        }
        Ok(json!({"planned": command}))
    }
}

/// Resolves once `after` scrolls were planned, or never.
pub struct PlannedWaiter {
    after: Option<usize>,
    scrolls: watch::Receiver<usize>,
}

impl PlannedWaiter {
    pub fn new(after: Option<usize>, scrolls: watch::Receiver<usize>) -> Self {
        Self { after, scrolls }
    }
}

#[async_trait]
impl ConditionWaiter for PlannedWaiter {
    async fn wait_for(&self, _item: &ElementLocator, _condition: Condition) -> Result<(), DriverError> {
        let Some(after) = self.after else {
            return std::future::pending().await;
        };
        let mut rx = self.scrolls.clone();
        rx.wait_for(|n| *n >= after)
            .await
            .map(|_| ())
            .map_err(|_| DriverError::NotConnected)
    }
}
