//! Transport seams and the shared error type.
//!
//! The driver never talks to the instrumented app directly. Every gesture is
//! reduced to a named element command handed to an [`ElementCommandExecutor`],
//! and readiness checks go through a [`ConditionWaiter`]. Both are traits so a
//! real transport, a mock, or the CLI's recording planner can stand behind
//! them.

use std::fmt;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::element::ElementLocator;

/// Errors surfaced by driver operations.
///
/// Callers see a small, stable set of kinds. Transport errors raised inside
/// the scroll retry loop are absorbed and only ever show up as
/// [`DriverError::Timeout`].
#[derive(Error, Debug)]
pub enum DriverError {
    /// Malformed or missing option, or a zero-displacement scroll.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The session capabilities name a platform with no proxy driver.
    #[error("Unsupported platformName: {0}")]
    UnsupportedPlatform(String),

    /// The element never reached the condition within the wait budget.
    #[error(
        "Stop scrolling as timeout {}: element never became {condition} (gesture duration {gesture_duration_ms}ms)",
        budget(.timeout_ms)
    )]
    Timeout {
        condition: Condition,
        timeout_ms: Option<u64>,
        gesture_duration_ms: u64,
    },

    /// The transport rejected or failed a command.
    #[error("Command failed: {0}")]
    CommandFailed(String),

    /// A condition waiter rejected instead of resolving.
    #[error("Condition wait failed: {0}")]
    ConditionFailed(String),

    /// An execute script name this driver does not handle.
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// No transport is attached.
    #[error("Not connected to the instrumented app")]
    NotConnected,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn budget(timeout_ms: &Option<u64>) -> String {
    match timeout_ms {
        Some(ms) => format!("{}ms", ms),
        None => "unset".to_string(),
    }
}

/// The state a condition waiter waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    /// Present in the widget tree and on screen.
    Visible,
    /// On screen and able to receive a hit-test.
    Tappable,
}

impl Condition {
    /// The element command that waits for this condition.
    pub fn command_name(&self) -> &'static str {
        match self {
            Condition::Visible => "waitFor",
            Condition::Tappable => "waitForTappable",
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Visible => f.write_str("visible"),
            Condition::Tappable => f.write_str("tappable"),
        }
    }
}

/// Dispatches named commands against a single element.
#[async_trait]
pub trait ElementCommandExecutor: Send + Sync {
    /// Execute `command` against `element` with a JSON object payload.
    ///
    /// Returns whatever the app answered. Transport and protocol failures
    /// come back as [`DriverError`].
    async fn execute_element_command(
        &self,
        command: &str,
        element: &ElementLocator,
        payload: Map<String, Value>,
    ) -> Result<Value, DriverError>;
}

/// Resolves once an element satisfies a [`Condition`].
///
/// There is no cancellation primitive: a caller that stops caring drops the
/// future (or cancels the task running it).
#[async_trait]
pub trait ConditionWaiter: Send + Sync {
    async fn wait_for(&self, item: &ElementLocator, condition: Condition) -> Result<(), DriverError>;
}

/// A [`ConditionWaiter`] that asks the app itself, via the `waitFor` and
/// `waitForTappable` element commands.
pub struct ElementCommandWaiter<E: ?Sized> {
    executor: std::sync::Arc<E>,
}

impl<E: ElementCommandExecutor + ?Sized> ElementCommandWaiter<E> {
    pub fn new(executor: std::sync::Arc<E>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl<E: ElementCommandExecutor + ?Sized> ConditionWaiter for ElementCommandWaiter<E> {
    async fn wait_for(&self, item: &ElementLocator, condition: Condition) -> Result<(), DriverError> {
        self.executor
            .execute_element_command(condition.command_name(), item, Map::new())
            .await
            .map(|_| ())
    }
}
