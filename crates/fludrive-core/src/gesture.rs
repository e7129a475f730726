//! Gesture command builder.
//!
//! Validates gesture options and reduces them to the single element command
//! the instrumented app understands. `scroll` and `long_tap` both become the
//! `scroll` primitive (a long tap is a scroll that does not move), and
//! `scroll_into_view` becomes `scrollIntoView`.
//!
//! The app's gesture primitive measures duration in microseconds; options on
//! this side are in milliseconds and converted on dispatch.

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::debug;

use crate::driver::{DriverError, ElementCommandExecutor};
use crate::element::ElementLocator;

/// Element command name of the gesture primitive.
pub const SCROLL_COMMAND: &str = "scroll";

/// Element command name of the centering primitive.
pub const SCROLL_INTO_VIEW_COMMAND: &str = "scrollIntoView";

/// Gesture sample rate used when none is given.
pub const DEFAULT_FREQUENCY: u32 = 60;

/// Options for a scroll (drag) gesture on an element.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrollOptions {
    /// Horizontal displacement in logical pixels.
    pub dx: f64,
    /// Vertical displacement in logical pixels.
    pub dy: f64,
    /// How long the drag lasts.
    pub duration_ms: f64,
    /// Move events per second.
    pub frequency: u32,
}

impl ScrollOptions {
    pub fn new(dx: f64, dy: f64, duration_ms: f64) -> Self {
        Self {
            dx,
            dy,
            duration_ms,
            frequency: DEFAULT_FREQUENCY,
        }
    }

    pub fn with_frequency(mut self, frequency: u32) -> Self {
        self.frequency = frequency;
        self
    }
}

/// Options for a long tap.
#[derive(Debug, Clone, PartialEq)]
pub struct LongTapOptions {
    pub duration_ms: f64,
    pub frequency: u32,
}

impl LongTapOptions {
    pub fn new(duration_ms: f64) -> Self {
        Self {
            duration_ms,
            frequency: DEFAULT_FREQUENCY,
        }
    }
}

/// Options for scrolling an element into view.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScrollIntoViewOptions {
    /// Where in the viewport the element lands, 0.0 (leading edge) to 1.0.
    pub alignment: f64,
    /// Optional timeout forwarded to the app. Left out of the payload when unset.
    pub timeout_ms: Option<u64>,
}

impl ScrollIntoViewOptions {
    pub fn aligned(alignment: f64) -> Self {
        Self {
            alignment,
            timeout_ms: None,
        }
    }
}

/// One primitive gesture, exactly as sent to the app.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GestureSpec {
    #[serde(serialize_with = "serialize_offset")]
    pub dx: f64,
    #[serde(serialize_with = "serialize_offset")]
    pub dy: f64,
    #[serde(rename = "duration")]
    pub duration_micros: u64,
    pub frequency: u32,
}

impl GestureSpec {
    /// Builds a scroll gesture, rejecting non-finite values and a null move.
    pub fn scroll(opts: &ScrollOptions) -> Result<Self, DriverError> {
        let dx = finite("dx", opts.dx)?;
        let dy = finite("dy", opts.dy)?;
        let duration_micros = micros(opts.duration_ms)?;

        if dx == 0.0 && dy == 0.0 {
            return Err(DriverError::InvalidArgument(
                "dx and dy cannot both be 0".to_string(),
            ));
        }

        Ok(Self {
            dx,
            dy,
            duration_micros,
            frequency: opts.frequency,
        })
    }

    /// Builds the zero-displacement gesture that stands for a long tap.
    pub fn long_tap(opts: &LongTapOptions) -> Result<Self, DriverError> {
        Ok(Self {
            dx: 0.0,
            dy: 0.0,
            duration_micros: micros(opts.duration_ms)?,
            frequency: opts.frequency,
        })
    }

    fn payload(&self) -> Map<String, Value> {
        let mut payload = Map::new();
        payload.insert("dx".to_string(), offset_value(self.dx));
        payload.insert("dy".to_string(), offset_value(self.dy));
        payload.insert("duration".to_string(), Value::from(self.duration_micros));
        payload.insert("frequency".to_string(), Value::from(self.frequency));
        payload
    }
}

/// Largest magnitude an `f64` holds without losing integer precision.
const MAX_EXACT_INT: f64 = 9_007_199_254_740_992.0;

/// Whole-pixel offsets go out as JSON integers, fractional ones as floats.
fn offset_value(offset: f64) -> Value {
    if offset.fract() == 0.0 && offset.abs() <= MAX_EXACT_INT {
        Value::from(offset as i64)
    } else {
        Value::from(offset)
    }
}

fn serialize_offset<S: Serializer>(offset: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    offset_value(*offset).serialize(serializer)
}

pub(crate) fn finite(name: &str, value: f64) -> Result<f64, DriverError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(DriverError::InvalidArgument(format!(
            "{} must be a number, got {}",
            name, value
        )))
    }
}

fn micros(duration_ms: f64) -> Result<u64, DriverError> {
    let ms = finite("durationMilliseconds", duration_ms)?;
    if ms < 0.0 {
        return Err(DriverError::InvalidArgument(format!(
            "durationMilliseconds cannot be negative, got {}",
            ms
        )));
    }
    Ok((ms * 1000.0).round() as u64)
}

async fn dispatch(
    executor: &dyn ElementCommandExecutor,
    target: &ElementLocator,
    gesture: GestureSpec,
) -> Result<Value, DriverError> {
    debug!(
        element = %target,
        dx = gesture.dx,
        dy = gesture.dy,
        duration_us = gesture.duration_micros,
        "dispatching gesture"
    );
    executor
        .execute_element_command(SCROLL_COMMAND, target, gesture.payload())
        .await
}

/// Drags `target` by `(dx, dy)`. Issues exactly one `scroll` command.
pub async fn scroll(
    executor: &dyn ElementCommandExecutor,
    target: &ElementLocator,
    opts: &ScrollOptions,
) -> Result<Value, DriverError> {
    let gesture = GestureSpec::scroll(opts)?;
    dispatch(executor, target, gesture).await
}

/// Presses and holds `target`. Issues one zero-displacement `scroll` command.
pub async fn long_tap(
    executor: &dyn ElementCommandExecutor,
    target: &ElementLocator,
    opts: &LongTapOptions,
) -> Result<Value, DriverError> {
    let gesture = GestureSpec::long_tap(opts)?;
    dispatch(executor, target, gesture).await
}

/// Asks the app to scroll `target` into view at the given alignment.
pub async fn scroll_into_view(
    executor: &dyn ElementCommandExecutor,
    target: &ElementLocator,
    opts: &ScrollIntoViewOptions,
) -> Result<Value, DriverError> {
    let alignment = finite("alignment", opts.alignment)?;

    let mut payload = Map::new();
    payload.insert("alignment".to_string(), Value::from(alignment));
    if let Some(timeout) = opts.timeout_ms {
        payload.insert("timeout".to_string(), Value::from(timeout));
    }

    executor
        .execute_element_command(SCROLL_INTO_VIEW_COMMAND, target, payload)
        .await
}
