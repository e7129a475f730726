//! Scroll-until-condition engine.
//!
//! Drives a scrollable widget with repeated drag gestures until another
//! widget (the `item`) becomes visible or tappable, then centers the item
//! with `scrollIntoView`.
//!
//! The condition waiter cannot be cancelled by the app protocol and may never
//! resolve, so the engine does not block on it. The waiter runs as its own
//! task and flips a one-way [`WaitOutcome`] flag when it resolves; the loop
//! polls that flag between gestures and bounds the whole search by the
//! caller's wall-clock `wait_timeout_ms`. Every waiter task carries a
//! cancellation token that is cancelled when the loop exits, so a waiter
//! that resolves late never writes to the flag.
//!
//! Without a wait timeout there is no retry budget: the loop body runs once,
//! issuing at most one gesture.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, Instrument};

use crate::config::{DriverConfig, WaiterFailurePolicy};
use crate::driver::{Condition, ConditionWaiter, DriverError, ElementCommandExecutor};
use crate::element::ElementLocator;
use crate::gesture::{self, finite, ScrollIntoViewOptions, ScrollOptions};

/// Parameters of one scroll-until search.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrollUntilSpec {
    /// The widget that should become visible or tappable.
    pub item: ElementLocator,
    /// Final viewport alignment of `item`.
    pub alignment: f64,
    pub dx_scroll: f64,
    pub dy_scroll: f64,
    /// Reported in the timeout error. Each gesture uses the configured step
    /// duration instead.
    pub gesture_duration_ms: u64,
    /// Gesture frequency; the configured default when unset.
    pub frequency: Option<u32>,
    /// Wall-clock retry budget. Unset or zero means no retry.
    pub wait_timeout_ms: Option<u64>,
}

impl ScrollUntilSpec {
    pub fn new(item: ElementLocator, dx_scroll: f64, dy_scroll: f64) -> Self {
        Self {
            item,
            alignment: 0.0,
            dx_scroll,
            dy_scroll,
            gesture_duration_ms: 100,
            frequency: None,
            wait_timeout_ms: None,
        }
    }

    pub fn with_alignment(mut self, alignment: f64) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn with_wait_timeout(mut self, wait_timeout_ms: u64) -> Self {
        self.wait_timeout_ms = Some(wait_timeout_ms);
        self
    }

    fn validate(&self) -> Result<(), DriverError> {
        finite("alignment", self.alignment)?;
        let dx = finite("dxScroll", self.dx_scroll)?;
        let dy = finite("dyScroll", self.dy_scroll)?;
        if dx == 0.0 && dy == 0.0 {
            return Err(DriverError::InvalidArgument(
                "dxScroll and dyScroll cannot both be 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// One-way flag set by a waiter task when its condition is met.
///
/// Only ever goes from unset to set, so the order in which the waiter and
/// the loop interleave cannot corrupt it.
#[derive(Debug, Default)]
pub struct WaitOutcome {
    satisfied: AtomicBool,
}

impl WaitOutcome {
    pub fn mark_satisfied(&self) {
        self.satisfied.store(true, Ordering::Release);
    }

    pub fn is_satisfied(&self) -> bool {
        self.satisfied.load(Ordering::Acquire)
    }
}

fn should_retry(start: Instant, wait_timeout_ms: Option<u64>) -> bool {
    match wait_timeout_ms {
        None | Some(0) => false,
        Some(ms) => start.elapsed() <= Duration::from_millis(ms),
    }
}

/// Runs scroll-until searches for one session.
pub struct ScrollEngine<'a> {
    executor: &'a dyn ElementCommandExecutor,
    waiter: Arc<dyn ConditionWaiter>,
    config: &'a DriverConfig,
}

impl<'a> ScrollEngine<'a> {
    pub fn new(
        executor: &'a dyn ElementCommandExecutor,
        waiter: Arc<dyn ConditionWaiter>,
        config: &'a DriverConfig,
    ) -> Self {
        Self {
            executor,
            waiter,
            config,
        }
    }

    /// The transport gestures are dispatched through.
    pub fn executor(&self) -> &'a dyn ElementCommandExecutor {
        self.executor
    }

    /// Scrolls `target` until `spec.item` is visible, then centers it.
    pub async fn scroll_until_visible(
        &self,
        target: &ElementLocator,
        spec: &ScrollUntilSpec,
    ) -> Result<Value, DriverError> {
        self.scroll_until(target, spec, Condition::Visible).await
    }

    /// Scrolls `target` until `spec.item` is tappable, then centers it.
    pub async fn scroll_until_tappable(
        &self,
        target: &ElementLocator,
        spec: &ScrollUntilSpec,
    ) -> Result<Value, DriverError> {
        self.scroll_until(target, spec, Condition::Tappable).await
    }

    async fn scroll_until(
        &self,
        target: &ElementLocator,
        spec: &ScrollUntilSpec,
        condition: Condition,
    ) -> Result<Value, DriverError> {
        spec.validate()?;

        let span = info_span!("scroll_until", %condition, item = %spec.item);
        async {
            let start = Instant::now();
            let token = CancellationToken::new();
            let _stop_waiters = token.clone().drop_guard();
            let outcome = Arc::new(WaitOutcome::default());

            let attempts = self.search(target, spec, condition, &outcome, &token).await?;
            token.cancel();

            let elapsed_ms = start.elapsed().as_millis() as u64;
            if !outcome.is_satisfied() {
                debug!(attempts, elapsed_ms, "condition not reached");
                return Err(DriverError::Timeout {
                    condition,
                    timeout_ms: spec.wait_timeout_ms,
                    gesture_duration_ms: spec.gesture_duration_ms,
                });
            }

            debug!(attempts, elapsed_ms, "condition reached, scrolling into view");
            gesture::scroll_into_view(
                self.executor,
                &spec.item,
                &ScrollIntoViewOptions::aligned(spec.alignment),
            )
            .await
        }
        .instrument(span)
        .await
    }

    /// The retry loop. Returns the number of scroll attempts made; whether the
    /// search succeeded is read from `outcome`.
    async fn search(
        &self,
        target: &ElementLocator,
        spec: &ScrollUntilSpec,
        condition: Condition,
        outcome: &Arc<WaitOutcome>,
        token: &CancellationToken,
    ) -> Result<u32, DriverError> {
        let start = Instant::now();
        let mut in_flight: Option<JoinHandle<Result<(), DriverError>>> = None;
        let mut attempts = 0u32;

        loop {
            match in_flight.take() {
                Some(handle) if !handle.is_finished() => in_flight = Some(handle),
                Some(handle) => {
                    let rejection = match handle.await {
                        Ok(Ok(())) => None,
                        Ok(Err(err)) => Some(err.to_string()),
                        Err(join_err) => Some(join_err.to_string()),
                    };
                    if let Some(reason) = rejection.filter(|_| !outcome.is_satisfied()) {
                        if self.config.waiter_failure == WaiterFailurePolicy::Abort {
                            return Err(DriverError::ConditionFailed(reason));
                        }
                        debug!(error = %reason, "condition waiter rejected, relaunching");
                        in_flight = Some(self.launch_waiter(spec, condition, outcome, token));
                    }
                }
                None => in_flight = Some(self.launch_waiter(spec, condition, outcome, token)),
            }

            if outcome.is_satisfied() {
                break;
            }

            attempts += 1;
            if let Err(err) = self.scroll_attempt(target, spec).await {
                debug!(attempt = attempts, error = %err, "scroll attempt failed, continuing");
                tokio::time::sleep(self.config.retry_backoff()).await;
            }

            if !(outcome.is_satisfied() || should_retry(start, spec.wait_timeout_ms)) {
                break;
            }
        }

        Ok(attempts)
    }

    fn launch_waiter(
        &self,
        spec: &ScrollUntilSpec,
        condition: Condition,
        outcome: &Arc<WaitOutcome>,
        token: &CancellationToken,
    ) -> JoinHandle<Result<(), DriverError>> {
        let waiter = Arc::clone(&self.waiter);
        let item = spec.item.clone();
        let outcome = Arc::clone(outcome);
        let token = token.clone();

        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => Ok(()),
                result = waiter.wait_for(&item, condition) => {
                    if result.is_ok() && !token.is_cancelled() {
                        outcome.mark_satisfied();
                    }
                    result
                }
            }
        })
    }

    async fn scroll_attempt(
        &self,
        target: &ElementLocator,
        spec: &ScrollUntilSpec,
    ) -> Result<(), DriverError> {
        let opts = ScrollOptions {
            dx: spec.dx_scroll,
            dy: spec.dy_scroll,
            duration_ms: self.config.scroll_step_ms as f64,
            frequency: spec.frequency.unwrap_or(self.config.frequency),
        };
        gesture::scroll(self.executor, target, &opts).await.map(|_| ())
    }
}
