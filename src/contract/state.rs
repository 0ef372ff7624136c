//! Live plugin readiness as reported by `GetState`.

use serde::{Deserialize, Serialize};

use super::Bundle;

/// Readiness of a plugin.
///
/// Never persisted. A missing or malformed answer is represented by the
/// caller as `None`, not by a variant of this type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PluginState {
    /// The plugin can answer queries.
    Ready {
        /// Optional status text shown next to the plugin.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
    /// The plugin needs first-run configuration before it can answer.
    #[serde(rename_all = "camelCase")]
    SetupRequired {
        /// Activity (entry point) the user opens to finish setup.
        setup_activity: String,
        /// Optional explanation for the user.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl PluginState {
    /// Ready without status text.
    pub fn ready() -> Self {
        Self::Ready { text: None }
    }

    /// Setup required without a message.
    pub fn setup_required(setup_activity: impl Into<String>) -> Self {
        Self::SetupRequired { setup_activity: setup_activity.into(), message: None }
    }

    /// Whether the plugin can answer queries.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }

    /// Decode a `GetState` answer. Unknown types and missing required
    /// fields yield `None`.
    pub fn from_bundle(bundle: &Bundle) -> Option<Self> {
        serde_json::from_value(serde_json::Value::Object(bundle.clone())).ok()
    }

    /// Encode as a `GetState` answer.
    pub fn to_bundle(&self) -> Bundle {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => Bundle::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bundle(value: serde_json::Value) -> Bundle {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_ready() {
        let state = PluginState::from_bundle(&bundle(json!({ "type": "Ready" })));
        assert_eq!(state, Some(PluginState::ready()));
    }

    #[test]
    fn test_setup_required_without_message() {
        let state = PluginState::from_bundle(&bundle(json!({
            "type": "SetupRequired",
            "setupActivity": "com.example/.Setup"
        })));
        assert_eq!(
            state,
            Some(PluginState::SetupRequired {
                setup_activity: "com.example/.Setup".to_string(),
                message: None,
            })
        );
    }

    #[test]
    fn test_setup_required_with_message() {
        let state = PluginState::from_bundle(&bundle(json!({
            "type": "SetupRequired",
            "setupActivity": "com.example/.Setup",
            "message": "Sign in first"
        })))
        .unwrap();
        assert!(!state.is_ready());
        assert!(matches!(state, PluginState::SetupRequired { message: Some(ref m), .. } if m == "Sign in first"));
    }

    #[test]
    fn test_setup_required_missing_activity_is_absent() {
        let state = PluginState::from_bundle(&bundle(json!({ "type": "SetupRequired" })));
        assert_eq!(state, None);
    }

    #[test]
    fn test_unknown_or_missing_type_is_absent() {
        assert_eq!(PluginState::from_bundle(&bundle(json!({ "type": "Sleeping" }))), None);
        assert_eq!(PluginState::from_bundle(&bundle(json!({}))), None);
    }

    #[test]
    fn test_to_bundle_uses_wire_names() {
        let bundle = PluginState::setup_required("pkg/.Setup").to_bundle();
        assert_eq!(bundle.get("type"), Some(&json!("SetupRequired")));
        assert_eq!(bundle.get("setupActivity"), Some(&json!("pkg/.Setup")));
        assert!(!bundle.contains_key("message"));
    }
}
