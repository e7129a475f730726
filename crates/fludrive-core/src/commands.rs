//! Execute-script command surface.
//!
//! Clients reach the gesture commands through execute scripts such as
//! `flutter:scroll`, passing `[elementLocator, {options}]` as arguments.
//! [`FlutterCommand::parse`] turns that loosely typed JSON into a typed
//! command, rejecting options that are present but not numbers;
//! [`run_command`] executes it.
//!
//! # Example
//!
//! ```
//! use fludrive_core::commands::FlutterCommand;
//! use fludrive_core::config::DriverConfig;
//! use serde_json::json;
//!
//! let command = FlutterCommand::parse(
//!     "flutter:scroll",
//!     &[json!("c2Nyb2xsYWJsZQ=="), json!({"dx": 0, "dy": -300, "durationMilliseconds": 200})],
//!     &DriverConfig::default(),
//! ).unwrap();
//! assert_eq!(command.name(), "scroll");
//! ```

use std::time::Instant;

use serde_json::{Map, Value};
use tracing::{debug, info_span, Instrument};

use crate::config::DriverConfig;
use crate::driver::DriverError;
use crate::element::ElementLocator;
use crate::gesture::{self, LongTapOptions, ScrollIntoViewOptions, ScrollOptions};
use crate::scroll_until::{ScrollEngine, ScrollUntilSpec};
use crate::session::FlutterDriver;

/// A parsed gesture command.
#[derive(Debug, Clone, PartialEq)]
pub enum FlutterCommand {
    Scroll {
        target: ElementLocator,
        opts: ScrollOptions,
    },
    LongTap {
        target: ElementLocator,
        opts: LongTapOptions,
    },
    ScrollUntilVisible {
        target: ElementLocator,
        spec: ScrollUntilSpec,
    },
    ScrollUntilTappable {
        target: ElementLocator,
        spec: ScrollUntilSpec,
    },
    ScrollIntoView {
        target: ElementLocator,
        opts: ScrollIntoViewOptions,
    },
}

impl FlutterCommand {
    /// Short name for logs, without the `flutter:` prefix.
    pub fn name(&self) -> &'static str {
        match self {
            FlutterCommand::Scroll { .. } => "scroll",
            FlutterCommand::LongTap { .. } => "longTap",
            FlutterCommand::ScrollUntilVisible { .. } => "scrollUntilVisible",
            FlutterCommand::ScrollUntilTappable { .. } => "scrollUntilTappable",
            FlutterCommand::ScrollIntoView { .. } => "scrollIntoView",
        }
    }

    /// Parses an execute script and its arguments.
    ///
    /// `defaults` supplies the gesture frequency when the options omit it.
    pub fn parse(script: &str, args: &[Value], defaults: &DriverConfig) -> Result<Self, DriverError> {
        let name = script.strip_prefix("flutter:").unwrap_or(script);
        let target = match args.first() {
            Some(Value::String(locator)) => ElementLocator::new(locator.as_str()),
            Some(other) => {
                return Err(DriverError::InvalidArgument(format!(
                    "element locator must be a string, got {}",
                    other
                )))
            }
            None => {
                return Err(DriverError::InvalidArgument(
                    "missing element locator argument".to_string(),
                ))
            }
        };
        let empty = Map::new();
        let opts = match args.get(1) {
            Some(Value::Object(map)) => OptionArgs(map),
            None | Some(Value::Null) => OptionArgs(&empty),
            Some(other) => {
                return Err(DriverError::InvalidArgument(format!(
                    "options must be an object, got {}",
                    other
                )))
            }
        };

        match name {
            "scroll" => Ok(FlutterCommand::Scroll {
                target,
                opts: ScrollOptions {
                    dx: opts.required_number("dx")?,
                    dy: opts.required_number("dy")?,
                    duration_ms: opts.required_number("durationMilliseconds")?,
                    frequency: opts.frequency()?.unwrap_or(defaults.frequency),
                },
            }),
            "longTap" => Ok(FlutterCommand::LongTap {
                target,
                opts: LongTapOptions {
                    duration_ms: opts.required_number("durationMilliseconds")?,
                    frequency: opts.frequency()?.unwrap_or(defaults.frequency),
                },
            }),
            "scrollUntilVisible" => Ok(FlutterCommand::ScrollUntilVisible {
                target,
                spec: opts.scroll_until_spec()?,
            }),
            "scrollUntilTapable" | "scrollUntilTappable" => Ok(FlutterCommand::ScrollUntilTappable {
                target,
                spec: opts.scroll_until_spec()?,
            }),
            "scrollIntoView" => Ok(FlutterCommand::ScrollIntoView {
                target,
                opts: ScrollIntoViewOptions {
                    alignment: opts.number("alignment")?.unwrap_or(0.0),
                    timeout_ms: opts.millis("timeout")?,
                },
            }),
            _ => Err(DriverError::UnknownCommand(script.to_string())),
        }
    }
}

/// Typed accessors over a JSON options object.
struct OptionArgs<'a>(&'a Map<String, Value>);

impl OptionArgs<'_> {
    /// A numeric option. Only an absent key reads as unset; `null` is rejected.
    fn number(&self, key: &str) -> Result<Option<f64>, DriverError> {
        match self.0.get(key) {
            None => Ok(None),
            Some(Value::Number(n)) => Ok(n.as_f64()),
            Some(other) => Err(DriverError::InvalidArgument(format!(
                "{} must be a number, got {}",
                key, other
            ))),
        }
    }

    fn required_number(&self, key: &str) -> Result<f64, DriverError> {
        self.number(key)?
            .ok_or_else(|| DriverError::InvalidArgument(format!("{} is required", key)))
    }

    /// A non-negative millisecond count, truncated to whole milliseconds.
    fn millis(&self, key: &str) -> Result<Option<u64>, DriverError> {
        match self.number(key)? {
            None => Ok(None),
            Some(ms) if ms >= 0.0 && ms.is_finite() => Ok(Some(ms.trunc() as u64)),
            Some(ms) => Err(DriverError::InvalidArgument(format!(
                "{} must be a non-negative number of milliseconds, got {}",
                key, ms
            ))),
        }
    }

    fn frequency(&self) -> Result<Option<u32>, DriverError> {
        match self.number("frequency")? {
            None => Ok(None),
            Some(f) if f.fract() == 0.0 && f >= 0.0 && f <= u32::MAX as f64 => Ok(Some(f as u32)),
            Some(f) => Err(DriverError::InvalidArgument(format!(
                "frequency must be a non-negative integer, got {}",
                f
            ))),
        }
    }

    fn scroll_until_spec(&self) -> Result<ScrollUntilSpec, DriverError> {
        let item = match self.0.get("item") {
            Some(Value::String(item)) => ElementLocator::new(item.as_str()),
            Some(other) => {
                return Err(DriverError::InvalidArgument(format!(
                    "item must be an element locator string, got {}",
                    other
                )))
            }
            None => return Err(DriverError::InvalidArgument("item is required".to_string())),
        };

        Ok(ScrollUntilSpec {
            item,
            alignment: self.number("alignment")?.unwrap_or(0.0),
            dx_scroll: self.number("dxScroll")?.unwrap_or(0.0),
            dy_scroll: self.number("dyScroll")?.unwrap_or(0.0),
            gesture_duration_ms: self.millis("durationMilliseconds")?.unwrap_or(100),
            frequency: self.frequency()?,
            wait_timeout_ms: self.millis("waitTimeout")?,
        })
    }
}

/// Runs a parsed command against a transport and condition waiter.
pub async fn run_command(engine: &ScrollEngine<'_>, command: FlutterCommand) -> Result<Value, DriverError> {
    let executor = engine.executor();
    match command {
        FlutterCommand::Scroll { target, opts } => gesture::scroll(executor, &target, &opts).await,
        FlutterCommand::LongTap { target, opts } => gesture::long_tap(executor, &target, &opts).await,
        FlutterCommand::ScrollUntilVisible { target, spec } => {
            engine.scroll_until_visible(&target, &spec).await
        }
        FlutterCommand::ScrollUntilTappable { target, spec } => {
            engine.scroll_until_tappable(&target, &spec).await
        }
        FlutterCommand::ScrollIntoView { target, opts } => {
            gesture::scroll_into_view(executor, &target, &opts).await
        }
    }
}

impl FlutterDriver {
    /// Parses and runs an execute script such as `flutter:scrollUntilVisible`.
    pub async fn execute(&self, script: &str, args: &[Value]) -> Result<Value, DriverError> {
        let command = FlutterCommand::parse(script, args, self.config())?;
        let span = info_span!("execute_command", command = command.name());
        async {
            let start = Instant::now();
            let result = run_command(&self.engine(), command).await;
            debug!(
                elapsed_ms = start.elapsed().as_millis() as u64,
                success = result.is_ok(),
                "command complete"
            );
            result
        }
        .instrument(span)
        .await
    }
}
