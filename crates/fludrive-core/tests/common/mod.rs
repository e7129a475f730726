//! Shared test helpers for fludrive-core integration tests.
//!
//! Provides a recording element-command transport with scripted failures,
//! programmable condition waiters that resolve relative to the number of
//! scroll gestures seen, and recording proxy factories.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::sync::{broadcast, watch};

use fludrive_core::config::{DriverConfig, SecurityPolicy};
use fludrive_core::driver::{Condition, ConditionWaiter, DriverError, ElementCommandExecutor};
use fludrive_core::element::ElementLocator;
use fludrive_core::proxy::{
    Capabilities, ProxyDriver, ProxyFactories, ProxySession, ProxySessionFactory, ProxyTransport,
};
use fludrive_core::session::{FlutterDriver, SessionEvent};

// ---------------------------------------------------------------------------
// Recording transport
// ---------------------------------------------------------------------------

/// One element command as received by the mock transport.
#[derive(Debug, Clone)]
pub struct RecordedCommand {
    pub command: String,
    pub element: ElementLocator,
    pub payload: Map<String, Value>,
}

/// Transport that records every element command.
///
/// Each successful `scroll` takes `gesture_cost` of (tokio) time, like a real
/// drag does. The first `failing_scrolls` scrolls fail immediately.
pub struct MockTransport {
    calls: Mutex<Vec<RecordedCommand>>,
    scrolls: watch::Sender<usize>,
    gesture_cost: Duration,
    failing_scrolls: usize,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Self::with_failing_scrolls(0)
    }

    pub fn with_failing_scrolls(failing_scrolls: usize) -> Arc<Self> {
        let (scrolls, _) = watch::channel(0);
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            scrolls,
            gesture_cost: Duration::from_millis(100),
            failing_scrolls,
        })
    }

    pub fn calls(&self) -> Vec<RecordedCommand> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_named(&self, command: &str) -> Vec<RecordedCommand> {
        self.calls()
            .into_iter()
            .filter(|c| c.command == command)
            .collect()
    }

    /// Watches the number of `scroll` commands received so far.
    pub fn scroll_count(&self) -> watch::Receiver<usize> {
        self.scrolls.subscribe()
    }
}

#[async_trait]
impl ElementCommandExecutor for MockTransport {
    async fn execute_element_command(
        &self,
        command: &str,
        element: &ElementLocator,
        payload: Map<String, Value>,
    ) -> Result<Value, DriverError> {
        self.calls.lock().unwrap().push(RecordedCommand {
            command: command.to_string(),
            element: element.clone(),
            payload,
        });

        if command == "scroll" {
            let mut seen = 0;
            self.scrolls.send_modify(|n| {
                *n += 1;
                seen = *n;
            });
            if seen <= self.failing_scrolls {
                return Err(DriverError::CommandFailed(format!("scroll {} rejected", seen)));
            }
            tokio::time::sleep(self.gesture_cost).await;
        }

        Ok(json!({"status": "ok", "command": command}))
    }
}

// ---------------------------------------------------------------------------
// Programmable condition waiter
// ---------------------------------------------------------------------------

/// How a [`MockWaiter`] behaves each time it is launched.
#[derive(Debug, Clone, Copy)]
pub enum WaiterScript {
    /// Never resolves.
    Never,
    /// Resolves once the transport has seen this many scrolls.
    AfterScrolls(usize),
    /// Rejects shortly after being launched.
    Reject,
}

pub struct MockWaiter {
    script: WaiterScript,
    scrolls: watch::Receiver<usize>,
    launches: AtomicUsize,
    conditions: Mutex<Vec<Condition>>,
}

impl MockWaiter {
    pub fn new(script: WaiterScript, transport: &MockTransport) -> Arc<Self> {
        Arc::new(Self {
            script,
            scrolls: transport.scroll_count(),
            launches: AtomicUsize::new(0),
            conditions: Mutex::new(Vec::new()),
        })
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn conditions(&self) -> Vec<Condition> {
        self.conditions.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConditionWaiter for MockWaiter {
    async fn wait_for(&self, _item: &ElementLocator, condition: Condition) -> Result<(), DriverError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        self.conditions.lock().unwrap().push(condition);

        match self.script {
            WaiterScript::Never => std::future::pending().await,
            WaiterScript::AfterScrolls(n) => {
                let mut rx = self.scrolls.clone();
                rx.wait_for(|count| *count >= n)
                    .await
                    .map(|_| ())
                    .map_err(|e| DriverError::CommandFailed(e.to_string()))
            }
            WaiterScript::Reject => {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Err(DriverError::CommandFailed("widget tree unavailable".to_string()))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Proxy factories
// ---------------------------------------------------------------------------

/// Counters shared between a mock factory and the proxies it starts.
#[derive(Default)]
pub struct ProxyProbe {
    pub starts: AtomicUsize,
    pub deletes: AtomicUsize,
    pub transport_closes: AtomicUsize,
    pub policy: Mutex<Option<SecurityPolicy>>,
    pub last_args: Mutex<Vec<Value>>,
}

impl ProxyProbe {
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn transport_closes(&self) -> usize {
        self.transport_closes.load(Ordering::SeqCst)
    }
}

struct MockProxyDriver {
    probe: Arc<ProxyProbe>,
}

#[async_trait]
impl ProxyDriver for MockProxyDriver {
    fn apply_security_policy(&mut self, policy: &SecurityPolicy) {
        *self.probe.policy.lock().unwrap() = Some(policy.clone());
    }

    async fn delete_session(&mut self) -> Result<(), DriverError> {
        self.probe.deletes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct MockProxyTransport {
    probe: Arc<ProxyProbe>,
}

#[async_trait]
impl ProxyTransport for MockProxyTransport {
    async fn close(&mut self) -> Result<(), DriverError> {
        self.probe.transport_closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct MockProxyFactory {
    probe: Arc<ProxyProbe>,
    fail: bool,
}

impl MockProxyFactory {
    pub fn working() -> (Arc<Self>, Arc<ProxyProbe>) {
        Self::build(false)
    }

    pub fn failing() -> (Arc<Self>, Arc<ProxyProbe>) {
        Self::build(true)
    }

    fn build(fail: bool) -> (Arc<Self>, Arc<ProxyProbe>) {
        let probe = Arc::new(ProxyProbe::default());
        (
            Arc::new(Self {
                probe: probe.clone(),
                fail,
            }),
            probe,
        )
    }
}

#[async_trait]
impl ProxySessionFactory for MockProxyFactory {
    async fn start_session(
        &self,
        _caps: &Capabilities,
        args: &[Value],
    ) -> Result<ProxySession, DriverError> {
        self.probe.starts.fetch_add(1, Ordering::SeqCst);
        *self.probe.last_args.lock().unwrap() = args.to_vec();
        if self.fail {
            return Err(DriverError::CommandFailed("simulator did not boot".to_string()));
        }
        Ok(ProxySession {
            driver: Box::new(MockProxyDriver {
                probe: self.probe.clone(),
            }),
            transport: Some(Box::new(MockProxyTransport {
                probe: self.probe.clone(),
            })),
        })
    }
}

// ---------------------------------------------------------------------------
// Driver assembly
// ---------------------------------------------------------------------------

/// Probes for the iOS and Android factories of a test driver.
pub struct Probes {
    pub ios: Arc<ProxyProbe>,
    pub android: Arc<ProxyProbe>,
}

/// A driver with working proxy factories and the given waiter.
pub fn test_driver(
    config: DriverConfig,
    transport: Arc<MockTransport>,
    waiter: Arc<dyn ConditionWaiter>,
) -> (FlutterDriver, Probes) {
    let (ios, ios_probe) = MockProxyFactory::working();
    let (android, android_probe) = MockProxyFactory::working();
    driver_with_factories(config, transport, waiter, ios, android, ios_probe, android_probe)
}

pub fn driver_with_factories(
    config: DriverConfig,
    transport: Arc<MockTransport>,
    waiter: Arc<dyn ConditionWaiter>,
    ios: Arc<MockProxyFactory>,
    android: Arc<MockProxyFactory>,
    ios_probe: Arc<ProxyProbe>,
    android_probe: Arc<ProxyProbe>,
) -> (FlutterDriver, Probes) {
    let factories = ProxyFactories { ios, android };
    let driver = FlutterDriver::new(config, transport, factories).with_waiter(waiter);
    (
        driver,
        Probes {
            ios: ios_probe,
            android: android_probe,
        },
    )
}

pub fn caps(value: Value) -> Capabilities {
    match value {
        Value::Object(map) => Capabilities::new(map),
        _ => panic!("capabilities must be a JSON object"),
    }
}

/// Collects every event currently queued on the receiver.
pub fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn locator(name: &str) -> ElementLocator {
    ElementLocator::new(name)
}
