//! Session lifecycle for the Flutter driver.
//!
//! [`FlutterDriver`] is the session object. It owns the element-command
//! transport used by gestures, the condition waiter used by the
//! scroll-until engine, and the [`SessionProxyBinding`] to the platform
//! proxy driver picked at session start.
//!
//! # Lifecycle
//!
//! - [`create_session`](FlutterDriver::create_session) reads `platformName`
//!   from the capabilities, starts the matching proxy, hands it the session's
//!   security policy and binds it. Without `platformName` the session runs
//!   with no proxy. On any failure the session is torn down before the
//!   original error is returned.
//! - [`delete_session`](FlutterDriver::delete_session) releases the proxy
//!   if one is bound. Calling it again is a no-op.
//!
//! Start and teardown are sequential phases of one session and take
//! `&mut self`.
//!
//! # Events
//!
//! Lifecycle changes are broadcast as [`SessionEvent`]s; see
//! [`subscribe`](FlutterDriver::subscribe).

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::DriverConfig;
use crate::driver::{ConditionWaiter, DriverError, ElementCommandExecutor, ElementCommandWaiter};
use crate::element::ElementLocator;
use crate::gesture::{self, LongTapOptions, ScrollIntoViewOptions, ScrollOptions};
use crate::proxy::{Capabilities, Platform, ProxyFactories, SessionProxyBinding};
use crate::scroll_until::{ScrollEngine, ScrollUntilSpec};

/// Lifecycle events broadcast to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A proxy driver was started and bound to the session.
    ProxyBound {
        platform: Platform,
    },
    /// The bound proxy driver was asked to delete its session and unbound.
    ProxyReleased {
        platform: Platform,
    },
    /// Teardown ran. `released` is true when a proxy was bound at the time.
    SessionDeleted {
        released: bool,
    },
}

/// A Flutter automation session.
pub struct FlutterDriver {
    config: DriverConfig,
    executor: Arc<dyn ElementCommandExecutor>,
    waiter: Arc<dyn ConditionWaiter>,
    factories: ProxyFactories,
    binding: SessionProxyBinding,
    session_id: Option<String>,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl FlutterDriver {
    /// Creates a driver with no session yet.
    ///
    /// Conditions are waited for with the app's own `waitFor` and
    /// `waitForTappable` commands unless replaced with
    /// [`with_waiter`](Self::with_waiter).
    pub fn new(
        config: DriverConfig,
        executor: Arc<dyn ElementCommandExecutor>,
        factories: ProxyFactories,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(16);
        let waiter = Arc::new(ElementCommandWaiter::new(Arc::clone(&executor)));
        Self {
            config,
            executor,
            waiter,
            factories,
            binding: SessionProxyBinding::Unbound,
            session_id: None,
            event_tx,
        }
    }

    pub fn with_waiter(mut self, waiter: Arc<dyn ConditionWaiter>) -> Self {
        self.waiter = waiter;
        self
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// The platform of the bound proxy driver, if any.
    pub fn proxy_platform(&self) -> Option<Platform> {
        self.binding.platform()
    }

    pub(crate) fn executor(&self) -> &dyn ElementCommandExecutor {
        self.executor.as_ref()
    }

    /// Subscribes to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.event_tx.send(event);
    }

    /// Starts a session, delegating to a platform proxy when the capabilities
    /// name one.
    ///
    /// Returns the session id and the resolved driver options. If anything
    /// fails, [`delete_session`](Self::delete_session) runs first and the
    /// original error is returned unchanged.
    pub async fn create_session(
        &mut self,
        session_id: impl Into<String>,
        caps: &Capabilities,
        args: &[Value],
    ) -> Result<(String, DriverConfig), DriverError> {
        let session_id = session_id.into();
        let span = info_span!("create_session", session_id = %session_id);
        async {
            if let Err(err) = self.start_proxy(caps, args).await {
                if let Err(cleanup) = self.delete_session().await {
                    warn!(error = %cleanup, "teardown after failed session start failed");
                }
                return Err(err);
            }
            self.session_id = Some(session_id.clone());
            Ok((session_id, self.config.clone()))
        }
        .instrument(span)
        .await
    }

    async fn start_proxy(&mut self, caps: &Capabilities, args: &[Value]) -> Result<(), DriverError> {
        // A proxy left from an earlier session never carries over, whether or
        // not the new capabilities ask for one.
        if let Some((platform, result)) = self.binding.release().await {
            warn!(%platform, ok = result.is_ok(), "released proxy driver left from previous session");
            self.emit(SessionEvent::ProxyReleased { platform });
            result?;
        }

        let platform = match caps.platform() {
            Ok(Some(platform)) => platform,
            Ok(None) => {
                debug!("no platformName, running without a proxy driver");
                return Ok(());
            }
            Err(err) => {
                error!(error = %err, "cannot start proxy driver");
                return Err(err);
            }
        };

        let proxy = self
            .factories
            .for_platform(platform)
            .start_session(caps, args)
            .await?;
        self.binding = SessionProxyBinding::bind(platform, proxy, &self.config.security);

        info!(%platform, driver = platform.driver_name(), "proxy driver bound");
        self.emit(SessionEvent::ProxyBound { platform });
        Ok(())
    }

    /// Tears the session down, releasing the proxy driver if one is bound.
    ///
    /// The binding is cleared even if the proxy fails to delete its own
    /// session; that failure is returned. Safe to call repeatedly.
    pub async fn delete_session(&mut self) -> Result<(), DriverError> {
        debug!("Deleting Flutter driver session");
        self.session_id = None;

        match self.binding.release().await {
            None => {
                self.emit(SessionEvent::SessionDeleted { released: false });
                Ok(())
            }
            Some((platform, result)) => {
                info!(%platform, ok = result.is_ok(), "proxy driver released");
                self.emit(SessionEvent::ProxyReleased { platform });
                self.emit(SessionEvent::SessionDeleted { released: true });
                result
            }
        }
    }

    pub async fn scroll(&self, target: &ElementLocator, opts: &ScrollOptions) -> Result<Value, DriverError> {
        gesture::scroll(self.executor(), target, opts).await
    }

    pub async fn long_tap(&self, target: &ElementLocator, opts: &LongTapOptions) -> Result<Value, DriverError> {
        gesture::long_tap(self.executor(), target, opts).await
    }

    pub async fn scroll_into_view(
        &self,
        target: &ElementLocator,
        opts: &ScrollIntoViewOptions,
    ) -> Result<Value, DriverError> {
        gesture::scroll_into_view(self.executor(), target, opts).await
    }

    pub async fn scroll_until_visible(
        &self,
        target: &ElementLocator,
        spec: &ScrollUntilSpec,
    ) -> Result<Value, DriverError> {
        self.engine().scroll_until_visible(target, spec).await
    }

    pub async fn scroll_until_tappable(
        &self,
        target: &ElementLocator,
        spec: &ScrollUntilSpec,
    ) -> Result<Value, DriverError> {
        self.engine().scroll_until_tappable(target, spec).await
    }

    pub(crate) fn engine(&self) -> ScrollEngine<'_> {
        ScrollEngine::new(self.executor(), Arc::clone(&self.waiter), &self.config)
    }
}
