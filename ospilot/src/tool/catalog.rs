//! The fixed function catalog.
//!
//! [`FUNCTIONS`] lists every function the model may call, in prompt order.
//! [`Action`] is the typed form of one call, resolved from a function name and
//! a loose JSON parameter map at the tool-caller boundary.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::errors::ActionError;

/// Timer id used when a call names none.
pub const DEFAULT_TIMER_ID: &str = "default";

fn default_timer_id() -> String {
    DEFAULT_TIMER_ID.to_owned()
}

const fn default_brightness() -> u8 {
    50
}

/// On/off/toggle switch position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Toggle {
    /// Turn on.
    On,
    /// Turn off.
    Off,
    /// Flip the current state.
    #[default]
    Toggle,
}

impl Toggle {
    /// Desired state, `None` for a flip.
    #[must_use]
    pub const fn enable(self) -> Option<bool> {
        match self {
            Self::On => Some(true),
            Self::Off => Some(false),
            Self::Toggle => None,
        }
    }

    /// Lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Off => "off",
            Self::Toggle => "toggle",
        }
    }
}

/// What `control_volume` should do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeAction {
    /// Silence output.
    #[default]
    #[serde(alias = "off", alias = "silent")]
    Mute,
    /// Restore output.
    Unmute,
    /// Turn it up.
    #[serde(alias = "up", alias = "higher")]
    Increase,
    /// Turn it down.
    #[serde(alias = "down", alias = "lower")]
    Decrease,
}

/// A resolved call of one catalog function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "function", rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum Action {
    OpenApplication {
        app_name: String,
    },
    SetTimer {
        #[serde(default, deserialize_with = "lenient::count")]
        minutes: u64,
        #[serde(default, deserialize_with = "lenient::count")]
        seconds: u64,
        #[serde(default = "default_timer_id")]
        timer_id: String,
    },
    GetTimerStatus {
        #[serde(default = "default_timer_id")]
        timer_id: String,
    },
    CancelTimer {
        #[serde(default = "default_timer_id")]
        timer_id: String,
    },
    ToggleBluetooth {
        #[serde(default)]
        action: Toggle,
    },
    ToggleWifi {
        #[serde(default)]
        action: Toggle,
    },
    ChangeBackground {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        color: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image_path: Option<String>,
    },
    SetBrightness {
        #[serde(default = "default_brightness", deserialize_with = "lenient::percent")]
        level: u8,
    },
    SetVolume {
        #[serde(
            default,
            deserialize_with = "lenient::opt_percent",
            skip_serializing_if = "Option::is_none"
        )]
        level: Option<u8>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        level_text: Option<String>,
    },
    ControlVolume {
        #[serde(default)]
        action: VolumeAction,
        #[serde(
            default,
            deserialize_with = "lenient::opt_percent",
            skip_serializing_if = "Option::is_none"
        )]
        level: Option<u8>,
    },
    LockScreen,
    SleepSystem,
    ShutdownSystem,
    RestartSystem,
    ToggleAirplaneMode {
        #[serde(default)]
        action: Toggle,
    },
    OpenSystemSettings {
        #[serde(default)]
        setting_type: String,
    },
    GetSystemInfo,
}

impl Action {
    /// Resolve a call from its function name and parameter map.
    ///
    /// A `function` key inside `params` is ignored. String values of `action`
    /// are matched case-insensitively.
    pub fn from_call(name: &str, params: &Map<String, Value>) -> Result<Self, ActionError> {
        if function_spec(name).is_none() {
            return Err(ActionError::unknown_function(name));
        }

        let mut object = params.clone();
        if let Some(Value::String(action)) = object.get_mut("action") {
            *action = action.trim().to_lowercase();
        }
        object.insert("function".into(), Value::String(name.to_owned()));

        serde_json::from_value(Value::Object(object))
            .map_err(|e| ActionError::invalid_params(name, e.to_string()))
    }

    /// The catalog name of this call's function.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::OpenApplication { .. } => "open_application",
            Self::SetTimer { .. } => "set_timer",
            Self::GetTimerStatus { .. } => "get_timer_status",
            Self::CancelTimer { .. } => "cancel_timer",
            Self::ToggleBluetooth { .. } => "toggle_bluetooth",
            Self::ToggleWifi { .. } => "toggle_wifi",
            Self::ChangeBackground { .. } => "change_background",
            Self::SetBrightness { .. } => "set_brightness",
            Self::SetVolume { .. } => "set_volume",
            Self::ControlVolume { .. } => "control_volume",
            Self::LockScreen => "lock_screen",
            Self::SleepSystem => "sleep_system",
            Self::ShutdownSystem => "shutdown_system",
            Self::RestartSystem => "restart_system",
            Self::ToggleAirplaneMode { .. } => "toggle_airplane_mode",
            Self::OpenSystemSettings { .. } => "open_system_settings",
            Self::GetSystemInfo => "get_system_info",
        }
    }

    /// Typed parameters as a JSON map, without the `function` key.
    #[must_use]
    pub fn params(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(mut object)) => {
                object.remove("function");
                object
            }
            _ => Map::new(),
        }
    }

    /// Whether this call is served by the in-process timer manager.
    #[must_use]
    pub const fn is_timer(&self) -> bool {
        matches!(
            self,
            Self::SetTimer { .. } | Self::GetTimerStatus { .. } | Self::CancelTimer { .. }
        )
    }
}

/// Map a spoken volume level such as "low" or "max" to a percentage.
#[must_use]
pub fn volume_from_text(text: &str) -> Option<u8> {
    match text.trim().to_lowercase().as_str() {
        "off" | "mute" | "silent" => Some(0),
        "low" | "quiet" | "soft" => Some(25),
        "mid" | "middle" | "medium" | "normal" => Some(50),
        "high" | "loud" | "volume" | "up" => Some(75),
        "max" | "maximum" | "full" | "highest" | "loudest" => Some(100),
        _ => None,
    }
}

/// Prompt-facing description of one catalog function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionSpec {
    /// Function name.
    pub name: &'static str,
    /// One-line description.
    pub description: &'static str,
    /// Parameter names with a short type and meaning.
    pub params: &'static [(&'static str, &'static str)],
    /// One example call.
    pub example: &'static str,
}

const TOGGLE_PARAMS: &[(&str, &str)] = &[("action", "string - 'on', 'off', or 'toggle'")];
const TIMER_ID_PARAM: &[(&str, &str)] = &[("timer_id", "string - timer name (optional)")];

/// Every callable function, in prompt order.
pub const FUNCTIONS: [FunctionSpec; 17] = [
    FunctionSpec {
        name: "open_application",
        description: "Open an application by name",
        params: &[("app_name", "string - name of application to open")],
        example: r#"{"function": "open_application", "app_name": "notepad"}"#,
    },
    FunctionSpec {
        name: "set_timer",
        description: "Set a countdown timer",
        params: &[
            ("minutes", "number - minutes"),
            ("seconds", "number - seconds (optional)"),
            ("timer_id", "string - timer name (optional)"),
        ],
        example: r#"{"function": "set_timer", "minutes": 10}"#,
    },
    FunctionSpec {
        name: "get_timer_status",
        description: "Get status of a timer",
        params: &[(
            "timer_id",
            "string - timer name (optional, default is 'default')",
        )],
        example: r#"{"function": "get_timer_status", "timer_id": "kitchen"}"#,
    },
    FunctionSpec {
        name: "cancel_timer",
        description: "Cancel a running timer",
        params: TIMER_ID_PARAM,
        example: r#"{"function": "cancel_timer", "timer_id": "default"}"#,
    },
    FunctionSpec {
        name: "toggle_bluetooth",
        description: "Turn Bluetooth on/off",
        params: TOGGLE_PARAMS,
        example: r#"{"function": "toggle_bluetooth", "action": "on"}"#,
    },
    FunctionSpec {
        name: "toggle_wifi",
        description: "Turn Wi-Fi on/off",
        params: TOGGLE_PARAMS,
        example: r#"{"function": "toggle_wifi", "action": "off"}"#,
    },
    FunctionSpec {
        name: "change_background",
        description: "Change desktop background to a color or an image file",
        params: &[
            ("color", "string - color name (e.g., 'blue', 'red')"),
            ("image_path", "string - path to an image file (optional)"),
        ],
        example: r#"{"function": "change_background", "color": "blue"}"#,
    },
    FunctionSpec {
        name: "set_brightness",
        description: "Set screen brightness",
        params: &[("level", "number - 0-100")],
        example: r#"{"function": "set_brightness", "level": 80}"#,
    },
    FunctionSpec {
        name: "set_volume",
        description: "Set system volume to specific level (0-100) or by text",
        params: &[
            ("level", "number - 0-100"),
            ("level_text", "string - 'low', 'mid', 'high'"),
        ],
        example: r#"{"function": "set_volume", "level": 50} or {"function": "set_volume", "level_text": "mid"}"#,
    },
    FunctionSpec {
        name: "control_volume",
        description: "Control system volume",
        params: &[
            ("action", "string - 'mute', 'unmute', 'increase', 'decrease'"),
            ("level", "number - optional volume level"),
        ],
        example: r#"{"function": "control_volume", "action": "mute"}"#,
    },
    FunctionSpec {
        name: "lock_screen",
        description: "Lock the screen",
        params: &[],
        example: r#"{"function": "lock_screen"}"#,
    },
    FunctionSpec {
        name: "sleep_system",
        description: "Put system to sleep",
        params: &[],
        example: r#"{"function": "sleep_system"}"#,
    },
    FunctionSpec {
        name: "shutdown_system",
        description: "Shutdown the system",
        params: &[],
        example: r#"{"function": "shutdown_system"}"#,
    },
    FunctionSpec {
        name: "restart_system",
        description: "Restart the system",
        params: &[],
        example: r#"{"function": "restart_system"}"#,
    },
    FunctionSpec {
        name: "toggle_airplane_mode",
        description: "Turn Airplane Mode on/off",
        params: TOGGLE_PARAMS,
        example: r#"{"function": "toggle_airplane_mode", "action": "on"}"#,
    },
    FunctionSpec {
        name: "open_system_settings",
        description: "Open system settings for a specific category",
        params: &[("setting_type", "string - e.g., 'display', 'sound', 'network'")],
        example: r#"{"function": "open_system_settings", "setting_type": "display"}"#,
    },
    FunctionSpec {
        name: "get_system_info",
        description: "Get detailed system information",
        params: &[],
        example: r#"{"function": "get_system_info"}"#,
    },
];

/// Look up a catalog function by name.
#[must_use]
pub fn function_spec(name: &str) -> Option<&'static FunctionSpec> {
    FUNCTIONS.iter().find(|spec| spec.name == name)
}

/// Render the whole catalog as prompt text.
#[must_use]
pub fn function_definitions() -> String {
    let mut out = String::from("Available Functions:\n================\n\n");
    for spec in &FUNCTIONS {
        let params = spec
            .params
            .iter()
            .map(|(name, meaning)| format!("{}: {}", quote(name), quote(meaning)))
            .collect::<Vec<_>>()
            .join(", ");
        out.push_str(&format!(
            "Function: {}\nDescription: {}\nParameters: {{{params}}}\nExample: {}\n\n",
            spec.name, spec.description, spec.example
        ));
    }
    out
}

fn quote(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| format!("\"{text}\""))
}

/// Deserializers that accept the loose numbers models tend to emit.
mod lenient {
    use serde::de::{Deserializer, Error};
    use serde::Deserialize;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Number {
        Int(i64),
        Float(f64),
        Text(String),
    }

    impl Number {
        #[allow(clippy::cast_possible_truncation)]
        fn whole(self) -> Result<i64, String> {
            match self {
                Self::Int(n) => Ok(n),
                Self::Float(f) if f.is_finite() && f.fract() == 0.0 => Ok(f as i64),
                Self::Float(f) => Err(format!("expected a whole number, got {f}")),
                Self::Text(s) => s
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| format!("expected a number, got {s:?}")),
            }
        }
    }

    /// Non-negative whole number; `null` reads as zero.
    pub(super) fn count<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        match Option::<Number>::deserialize(d)? {
            None => Ok(0),
            Some(n) => {
                let n = n.whole().map_err(D::Error::custom)?;
                u64::try_from(n).map_err(|_| D::Error::custom(format!("{n} is negative")))
            }
        }
    }

    fn clamp_percent(n: i64) -> u8 {
        u8::try_from(n.clamp(0, 100)).unwrap_or(100)
    }

    /// Whole number clamped to `0..=100`.
    pub(super) fn percent<'de, D: Deserializer<'de>>(d: D) -> Result<u8, D::Error> {
        let n = Number::deserialize(d)?.whole().map_err(D::Error::custom)?;
        Ok(clamp_percent(n))
    }

    /// Optional whole number clamped to `0..=100`.
    pub(super) fn opt_percent<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u8>, D::Error> {
        Option::<Number>::deserialize(d)?
            .map(|n| n.whole().map(clamp_percent).map_err(D::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn test_catalog_order_and_size() {
        let names: Vec<&str> = FUNCTIONS.iter().map(|f| f.name).collect();
        assert_eq!(names.len(), 17);
        assert_eq!(names[0], "open_application");
        assert_eq!(names[16], "get_system_info");
        for spec in &FUNCTIONS {
            let example = spec.example.split(" or ").next().unwrap();
            let value: Value = serde_json::from_str(example).unwrap();
            let call = params(value);
            let action = Action::from_call(spec.name, &call).unwrap();
            assert_eq!(action.name(), spec.name);
        }
    }

    #[test]
    fn test_timer_defaults_and_lenient_numbers() {
        let action =
            Action::from_call("set_timer", &params(json!({"minutes": "5", "seconds": 30.0})))
                .unwrap();
        assert_eq!(
            action,
            Action::SetTimer {
                minutes: 5,
                seconds: 30,
                timer_id: "default".into()
            }
        );
        assert!(action.is_timer());

        let err = Action::from_call("set_timer", &params(json!({"minutes": -2}))).unwrap_err();
        assert!(matches!(err, ActionError::InvalidParams { .. }));
    }

    #[test]
    fn test_unknown_function() {
        let err = Action::from_call("fly_to_moon", &Map::new()).unwrap_err();
        assert_eq!(err, ActionError::unknown_function("fly_to_moon"));
    }

    #[test]
    fn test_action_case_and_aliases() {
        let action = Action::from_call("toggle_wifi", &params(json!({"action": "OFF"}))).unwrap();
        assert_eq!(action, Action::ToggleWifi { action: Toggle::Off });

        let action =
            Action::from_call("control_volume", &params(json!({"action": "up"}))).unwrap();
        assert_eq!(
            action,
            Action::ControlVolume {
                action: VolumeAction::Increase,
                level: None
            }
        );
    }

    #[test]
    fn test_percent_is_clamped() {
        let action = Action::from_call("set_brightness", &params(json!({"level": 250}))).unwrap();
        assert_eq!(action, Action::SetBrightness { level: 100 });
        let action = Action::from_call("set_brightness", &Map::new()).unwrap();
        assert_eq!(action, Action::SetBrightness { level: 50 });
    }

    #[test]
    fn test_params_drop_function_key() {
        let action = Action::from_call(
            "open_application",
            &params(json!({"function": "ignored", "app_name": "notepad"})),
        )
        .unwrap();
        assert_eq!(action.params(), params(json!({"app_name": "notepad"})));
        assert!(Action::LockScreen.params().is_empty());
    }

    #[test]
    fn test_volume_from_text() {
        assert_eq!(volume_from_text("Loudest"), Some(100));
        assert_eq!(volume_from_text(" quiet "), Some(25));
        assert_eq!(volume_from_text("eleven"), None);
    }

    #[test]
    fn test_function_definitions() {
        let text = function_definitions();
        assert!(text.starts_with("Available Functions:\n"));
        assert!(text.contains(
            "Function: set_brightness\nDescription: Set screen brightness\nParameters: {\"level\": \"number - 0-100\"}\n"
        ));
        assert!(text.contains("Function: lock_screen\nDescription: Lock the screen\nParameters: {}\n"));
    }
}
