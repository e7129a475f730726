//! Platform proxy drivers.
//!
//! A session that targets a live device delegates device-level commands to a
//! platform proxy driver (XCUITest on iOS, UiAutomator2 on Android). This
//! module defines the closed set of [`Platform`]s, the factory seam that
//! starts a proxy session for one of them, and the [`SessionProxyBinding`]
//! a session uses to hold at most one proxy at a time.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::SecurityPolicy;
use crate::driver::DriverError;

/// Platforms with a proxy driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Ios,
    Android,
}

impl Platform {
    /// Name of the proxy driver family serving this platform.
    pub fn driver_name(&self) -> &'static str {
        match self {
            Platform::Ios => "XCUITestDriver",
            Platform::Android => "AndroidUiautomator2Driver",
        }
    }
}

impl FromStr for Platform {
    type Err = DriverError;

    /// Parses a `platformName` capability, ignoring case.
    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.to_lowercase().as_str() {
            "ios" => Ok(Platform::Ios),
            "android" => Ok(Platform::Android),
            _ => Err(DriverError::UnsupportedPlatform(name.to_string())),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Ios => f.write_str("iOS"),
            Platform::Android => f.write_str("Android"),
        }
    }
}

/// Session capabilities as sent by the client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capabilities(Map<String, Value>);

impl Capabilities {
    pub fn new(caps: Map<String, Value>) -> Self {
        Self(caps)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// The platform named by `platformName`, if any.
    ///
    /// An absent or `null` capability means no proxy is wanted. Any value that
    /// is not `ios` or `android` (in any case) is rejected.
    pub fn platform(&self) -> Result<Option<Platform>, DriverError> {
        match self.0.get("platformName") {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(name)) => name.parse().map(Some),
            Some(other) => Err(DriverError::UnsupportedPlatform(other.to_string())),
        }
    }
}

impl From<Map<String, Value>> for Capabilities {
    fn from(caps: Map<String, Value>) -> Self {
        Self(caps)
    }
}

/// A running platform proxy session.
#[async_trait]
pub trait ProxyDriver: Send + Sync {
    /// Adopts the parent session's security posture.
    fn apply_security_policy(&mut self, policy: &SecurityPolicy);

    /// Ends the proxy's own session and frees the device.
    async fn delete_session(&mut self) -> Result<(), DriverError>;
}

/// The connection a proxy session opened to the instrumented app.
#[async_trait]
pub trait ProxyTransport: Send + Sync {
    async fn close(&mut self) -> Result<(), DriverError> {
        Ok(())
    }
}

/// What a platform factory hands back: the proxy and its app connection.
pub struct ProxySession {
    pub driver: Box<dyn ProxyDriver>,
    pub transport: Option<Box<dyn ProxyTransport>>,
}

/// Starts a proxy session for one platform.
#[async_trait]
pub trait ProxySessionFactory: Send + Sync {
    async fn start_session(
        &self,
        caps: &Capabilities,
        args: &[Value],
    ) -> Result<ProxySession, DriverError>;
}

/// One factory per [`Platform`].
#[derive(Clone)]
pub struct ProxyFactories {
    pub ios: Arc<dyn ProxySessionFactory>,
    pub android: Arc<dyn ProxySessionFactory>,
}

impl ProxyFactories {
    pub fn for_platform(&self, platform: Platform) -> &dyn ProxySessionFactory {
        match platform {
            Platform::Ios => self.ios.as_ref(),
            Platform::Android => self.android.as_ref(),
        }
    }
}

/// The proxy a session delegates to, if any.
///
/// `Unbound` holds no driver and no transport.
#[derive(Default)]
pub enum SessionProxyBinding {
    #[default]
    Unbound,
    Bound {
        platform: Platform,
        driver: Box<dyn ProxyDriver>,
        transport: Option<Box<dyn ProxyTransport>>,
    },
}

impl SessionProxyBinding {
    /// Binds a freshly started proxy, handing it the parent's security policy.
    pub fn bind(platform: Platform, session: ProxySession, policy: &SecurityPolicy) -> Self {
        let ProxySession {
            mut driver,
            transport,
        } = session;
        driver.apply_security_policy(policy);
        SessionProxyBinding::Bound {
            platform,
            driver,
            transport,
        }
    }

    pub fn platform(&self) -> Option<Platform> {
        match self {
            SessionProxyBinding::Unbound => None,
            SessionProxyBinding::Bound { platform, .. } => Some(*platform),
        }
    }

    pub fn is_bound(&self) -> bool {
        matches!(self, SessionProxyBinding::Bound { .. })
    }

    /// Deletes the proxy session and clears the binding.
    ///
    /// Returns `None` when nothing was bound. The binding is cleared before
    /// the proxy is asked to delete its session, so it ends up `Unbound`
    /// whether or not that call succeeds.
    pub async fn release(&mut self) -> Option<(Platform, Result<(), DriverError>)> {
        let SessionProxyBinding::Bound {
            platform,
            mut driver,
            transport,
        } = std::mem::take(self)
        else {
            return None;
        };

        let result = driver.delete_session().await;
        if let Some(mut transport) = transport {
            if let Err(e) = transport.close().await {
                debug!(error = %e, "closing proxy transport failed");
            }
        }
        Some((platform, result))
    }
}

impl fmt::Debug for SessionProxyBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionProxyBinding::Unbound => f.write_str("Unbound"),
            SessionProxyBinding::Bound {
                platform, transport, ..
            } => f
                .debug_struct("Bound")
                .field("platform", platform)
                .field("has_transport", &transport.is_some())
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn caps(value: Value) -> Capabilities {
        match value {
            Value::Object(map) => Capabilities::new(map),
            _ => panic!("capabilities must be an object"),
        }
    }

    struct CountingDriver {
        deletes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ProxyDriver for CountingDriver {
        fn apply_security_policy(&mut self, _policy: &SecurityPolicy) {}

        async fn delete_session(&mut self) -> Result<(), DriverError> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            Err(DriverError::CommandFailed("device gone".to_string()))
        }
    }

    #[test]
    fn test_platform_name_is_case_insensitive() {
        assert_eq!("IOS".parse::<Platform>().unwrap(), Platform::Ios);
        assert_eq!("iOS".parse::<Platform>().unwrap(), Platform::Ios);
        assert_eq!("Android".parse::<Platform>().unwrap(), Platform::Android);
        let err = "bsd".parse::<Platform>().unwrap_err();
        assert!(matches!(err, DriverError::UnsupportedPlatform(ref p) if p == "bsd"));
    }

    #[test]
    fn test_capabilities_platform() {
        assert_eq!(caps(json!({})).platform().unwrap(), None);
        assert_eq!(caps(json!({"platformName": null})).platform().unwrap(), None);
        assert_eq!(
            caps(json!({"platformName": "android"})).platform().unwrap(),
            Some(Platform::Android)
        );
        assert!(caps(json!({"platformName": 7})).platform().is_err());
    }

    #[tokio::test]
    async fn test_release_clears_binding_even_when_delete_fails() {
        let deletes = Arc::new(AtomicUsize::new(0));
        let session = ProxySession {
            driver: Box::new(CountingDriver {
                deletes: deletes.clone(),
            }),
            transport: None,
        };
        let mut binding = SessionProxyBinding::bind(Platform::Ios, session, &SecurityPolicy::default());
        assert_eq!(binding.platform(), Some(Platform::Ios));

        let (platform, result) = binding.release().await.expect("binding was bound");
        assert_eq!(platform, Platform::Ios);
        assert!(result.is_err());
        assert!(!binding.is_bound());

        assert!(binding.release().await.is_none());
        assert_eq!(deletes.load(Ordering::SeqCst), 1);
    }
}
