//! Element locators for Flutter widget automation.
//!
//! The instrumented app identifies widgets by a serialized finder: a JSON
//! object tagged with `finderType`, base64-encoded into an opaque string.
//! [`ElementLocator`] carries that string through the driver untouched;
//! [`Finder`] is the typed form used to build one.
//!
//! # Example
//!
//! ```
//! use fludrive_core::element::{Finder, ElementLocator};
//!
//! let locator = Finder::by_value_key("increment").to_locator();
//! assert_eq!(locator.finder(), Some(Finder::by_value_key("increment")));
//!
//! // Locators received from a client are passed through as-is.
//! let raw = ElementLocator::new(locator.as_str());
//! assert_eq!(raw, locator);
//! ```

use std::fmt;

use base64::Engine;
use serde::{Deserialize, Serialize};

/// Opaque reference to a widget, as understood by the instrumented app.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementLocator(String);

impl ElementLocator {
    /// Wraps an already-encoded locator string.
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    /// The encoded form sent on the wire.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decodes the finder behind this locator.
    ///
    /// Returns `None` for locators that are not base64-encoded finder JSON;
    /// such locators are still valid to send, the app is the judge.
    pub fn finder(&self) -> Option<Finder> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(self.0.as_bytes())
            .ok()?;
        serde_json::from_slice(&bytes).ok()
    }
}

impl fmt::Display for ElementLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.finder() {
            Some(finder) => write!(f, "{}", finder),
            None => f.write_str(&self.0),
        }
    }
}

/// Type of a `ValueKey` as declared in the widget tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyValueType {
    /// `ValueKey<String>`
    #[serde(rename = "String")]
    String,
    /// `ValueKey<int>`
    #[serde(rename = "int")]
    Int,
}

/// A widget finder, serialized with a `finderType` discriminator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "finderType")]
pub enum Finder {
    /// Match a widget by its `ValueKey`.
    ByValueKey {
        /// The key value, always transmitted as a string.
        #[serde(rename = "keyValueString")]
        key: String,
        /// Whether the key is a string or an integer key.
        #[serde(rename = "keyValueType")]
        key_type: KeyValueType,
    },
    /// Match a `Text` widget by its content.
    ByText {
        /// The exact text.
        text: String,
    },
    /// Match by widget runtime type name.
    ByType {
        /// The widget type, e.g. `"ElevatedButton"`.
        #[serde(rename = "type")]
        widget_type: String,
    },
    /// Match a widget by its tooltip message.
    ByTooltipMessage {
        /// The tooltip text.
        text: String,
    },
    /// Match by semantics label.
    BySemanticsLabel {
        /// The label, or a pattern when `is_reg_exp` is set.
        label: String,
        /// Interpret `label` as a regular expression.
        #[serde(rename = "isRegExp", default)]
        is_reg_exp: bool,
    },
    /// The platform back button of the current page.
    PageBack,
}

impl Finder {
    /// Finder for a `ValueKey<String>`.
    pub fn by_value_key(key: impl Into<String>) -> Self {
        Finder::ByValueKey {
            key: key.into(),
            key_type: KeyValueType::String,
        }
    }

    /// Finder for a `ValueKey<int>`.
    pub fn by_int_value_key(key: i64) -> Self {
        Finder::ByValueKey {
            key: key.to_string(),
            key_type: KeyValueType::Int,
        }
    }

    pub fn by_text(text: impl Into<String>) -> Self {
        Finder::ByText { text: text.into() }
    }

    pub fn by_type(widget_type: impl Into<String>) -> Self {
        Finder::ByType {
            widget_type: widget_type.into(),
        }
    }

    pub fn by_tooltip(text: impl Into<String>) -> Self {
        Finder::ByTooltipMessage { text: text.into() }
    }

    pub fn by_semantics_label(label: impl Into<String>, is_reg_exp: bool) -> Self {
        Finder::BySemanticsLabel {
            label: label.into(),
            is_reg_exp,
        }
    }

    /// Serializes this finder into the locator string the app expects.
    pub fn to_locator(&self) -> ElementLocator {
        // A finder is a tagged map of strings and bools; serialization cannot fail.
        let json = serde_json::to_vec(self).unwrap_or_default();
        ElementLocator(base64::engine::general_purpose::STANDARD.encode(json))
    }
}

impl fmt::Display for Finder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Finder::ByValueKey { key, .. } => write!(f, "key '{}'", key),
            Finder::ByText { text } => write!(f, "text '{}'", text),
            Finder::ByType { widget_type } => write!(f, "type {}", widget_type),
            Finder::ByTooltipMessage { text } => write!(f, "tooltip '{}'", text),
            Finder::BySemanticsLabel { label, .. } => write!(f, "semantics '{}'", label),
            Finder::PageBack => f.write_str("page back"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_key_wire_shape() {
        let locator = Finder::by_value_key("counter").to_locator();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(locator.as_str())
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "finderType": "ByValueKey",
                "keyValueString": "counter",
                "keyValueType": "String",
            })
        );
    }

    #[test]
    fn test_int_key_is_sent_as_string() {
        let locator = Finder::by_int_value_key(42).to_locator();
        match locator.finder() {
            Some(Finder::ByValueKey { key, key_type }) => {
                assert_eq!(key, "42");
                assert_eq!(key_type, KeyValueType::Int);
            }
            other => panic!("Expected ByValueKey, got {:?}", other),
        }
    }

    #[test]
    fn test_page_back_has_only_tag() {
        let json = serde_json::to_value(Finder::PageBack).unwrap();
        assert_eq!(json, serde_json::json!({"finderType": "PageBack"}));
    }

    #[test]
    fn test_opaque_locator_has_no_finder() {
        let locator = ElementLocator::new("not-base64!");
        assert!(locator.finder().is_none());
        assert_eq!(locator.to_string(), "not-base64!");
    }

    #[test]
    fn test_display_uses_decoded_finder() {
        let locator = Finder::by_text("You have pushed the button").to_locator();
        assert_eq!(locator.to_string(), "text 'You have pushed the button'");
    }
}
