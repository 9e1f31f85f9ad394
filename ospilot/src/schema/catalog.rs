//! Built-in schema catalog.

use super::{FieldSpec, Schema};

/// A generic `{function, params}` call.
pub const TOOL_CALL: &str = "tool_call";
/// Timer set, cancel and status calls.
pub const TIMER: &str = "timer";
/// Wallpaper changes.
pub const BACKGROUND_CHANGE: &str = "background_change";
/// Application launches.
pub const APPLICATION: &str = "application";
/// On/off style system toggles.
pub const SYSTEM_CONTROL: &str = "system_control";
/// Volume changes.
pub const VOLUME_CONTROL: &str = "volume_control";
/// Responses reported back to a front end.
pub const RESPONSE: &str = "response";

/// All built-in schemas.
#[must_use]
pub fn builtin() -> Vec<Schema> {
    vec![
        Schema::new(TOOL_CALL)
            .required(["function", "params"])
            .field(
                "function",
                FieldSpec::string().describe("Function name to call"),
            )
            .field("params", FieldSpec::object().describe("Function parameters"))
            .field(
                "metadata",
                FieldSpec::object().describe("Optional confidence and timestamp"),
            ),
        Schema::new(TIMER)
            .required(["function"])
            .field(
                "function",
                FieldSpec::string().one_of(["set_timer", "cancel_timer", "get_timer_status"]),
            )
            .field("minutes", FieldSpec::integer().min(0.0))
            .field("seconds", FieldSpec::integer().min(0.0).max(59.0))
            .field("timer_id", FieldSpec::string()),
        Schema::new(BACKGROUND_CHANGE)
            .required(["function"])
            .field("function", FieldSpec::string().one_of(["change_background"]))
            .field("color", FieldSpec::string())
            .field("image_path", FieldSpec::string()),
        Schema::new(APPLICATION)
            .required(["function", "app_name"])
            .field("function", FieldSpec::string().one_of(["open_application"]))
            .field("app_name", FieldSpec::string()),
        Schema::new(SYSTEM_CONTROL)
            .required(["function", "action"])
            .field("function", FieldSpec::string())
            .field(
                "action",
                FieldSpec::string().one_of([
                    "on", "off", "toggle", "mute", "unmute", "increase", "decrease",
                ]),
            ),
        Schema::new(VOLUME_CONTROL)
            .required(["function"])
            .field(
                "function",
                FieldSpec::string().one_of(["set_volume", "control_volume"]),
            )
            .field("level", FieldSpec::integer().min(0.0).max(100.0))
            .field("level_text", FieldSpec::string())
            .field("action", FieldSpec::string()),
        Schema::new(RESPONSE)
            .field(
                "status",
                FieldSpec::string().one_of(["success", "error", "pending", "scheduled"]),
            )
            .field("message", FieldSpec::string())
            .field("data", FieldSpec::object())
            .field("function", FieldSpec::string())
            .field("scheduled", FieldSpec::boolean())
            .field("delay_seconds", FieldSpec::integer()),
    ]
}
