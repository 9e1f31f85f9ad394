//! Prompt templates.

use std::fmt::Write as _;

use crate::tool::function_definitions;

const COMMAND_GUIDE: &str = r#"IMPORTANT INSTRUCTIONS:

1. For "set_volume" or "control_volume" functions:
   - User says "set volume to 50" → {"function": "set_volume", "level": 50}
   - User says "set volume to middle" → {"function": "set_volume", "level_text": "mid"}
   - User says "set volume low" → {"function": "set_volume", "level_text": "low"}
   - User says "set volume high" → {"function": "set_volume", "level_text": "high"}
   - User says "mute volume" → {"function": "control_volume", "action": "mute"}
   - User says "unmute volume" → {"function": "control_volume", "action": "unmute"}

2. For "set_timer" function:
   - If the user says "set timer for 10 minutes", respond with {"function": "set_timer", "minutes": 10}
   - If the user says "set timer for 30 seconds", respond with {"function": "set_timer", "seconds": 30}
   - You can optionally add a timer_id: {"function": "set_timer", "minutes": 10, "timer_id": "kitchen"}

3. For "change_background" function:
   - If the user provides a file path (contains backslash \ or forward slash /), use it as "image_path"
   - If the user provides a color name (blue, red, green, etc.), use it as "color"

Decide if the user is asking for a system function or just having a conversation:

1. If it's a clear system command, respond with JSON:
{"function": "function_name", "param1": "value1"}

2. If it's a question or general conversation, respond with:
{"type": "chat", "response": "Your conversational response here"}

Examples:
- "set volume to 50" → {"function": "set_volume", "level": 50}
- "mute volume" → {"function": "control_volume", "action": "mute"}
- "open notepad" → {"function": "open_application", "app_name": "notepad"}
- "set timer for 10 minutes" → {"function": "set_timer", "minutes": 10}
- "change background to blue" → {"function": "change_background", "color": "blue"}

Respond only with JSON, no other text."#;

/// Prompt asking the model to map `command` onto a catalog function or a chat reply.
#[must_use]
pub fn command_prompt(command: &str) -> String {
    format!(
        "You are an intelligent OS assistant with access to system functions.\n\
         You understand English commands.\n\n\
         {}\n\
         User Command: \"{command}\"\n\n\
         {COMMAND_GUIDE}",
        function_definitions()
    )
}

/// Like [`command_prompt`], with rendered schemas the reply must match.
#[must_use]
pub fn schema_command_prompt(command: &str, schema_name: &str, schemas: &str) -> String {
    format!(
        "You are an intelligent OS assistant with access to system functions.\n\n\
         {}\n\
         {schemas}\n\n\
         User Command: \"{command}\"\n\n\
         IMPORTANT: Always respond with valid JSON matching the {schema_name} schema.\n\
         Only respond with JSON, no markdown or other text.",
        function_definitions()
    )
}

/// Who said a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    /// The person typing.
    User,
    /// The model.
    Assistant,
}

/// One chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    /// Who said it.
    pub speaker: Speaker,
    /// What was said.
    pub content: String,
}

impl ChatTurn {
    /// A user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::User,
            content: content.into(),
        }
    }

    /// A model message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Assistant,
            content: content.into(),
        }
    }
}

/// Chat prompt over the last `window` messages of `history`.
#[must_use]
pub fn chat_prompt(history: &[ChatTurn], window: usize) -> String {
    let mut context = String::from("Conversation history:\n");
    let start = history.len().saturating_sub(window);
    for turn in &history[start..] {
        let role = match turn.speaker {
            Speaker::User => "User",
            Speaker::Assistant => "Assistant",
        };
        let _ = writeln!(context, "{role}: {}", turn.content);
    }
    context.push_str("\n\nAssistant (provide a short and helpful response):");
    context
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_prompt_embeds_catalog_and_command() {
        let prompt = command_prompt("open notepad");
        assert!(prompt.contains("Available Functions:"));
        assert!(prompt.contains("Function: get_system_info"));
        assert!(prompt.contains("User Command: \"open notepad\""));
        assert!(prompt.ends_with("Respond only with JSON, no other text."));
    }

    #[test]
    fn test_schema_prompt() {
        let prompt = schema_command_prompt("mute", "tool_call", "Schema: tool_call");
        assert!(prompt.contains("Schema: tool_call"));
        assert!(prompt.contains("matching the tool_call schema"));
    }

    #[test]
    fn test_chat_prompt_window() {
        let history: Vec<ChatTurn> = (0..7)
            .map(|i| {
                if i % 2 == 0 {
                    ChatTurn::user(format!("u{i}"))
                } else {
                    ChatTurn::assistant(format!("a{i}"))
                }
            })
            .collect();
        let prompt = chat_prompt(&history, 5);
        assert!(prompt.starts_with("Conversation history:\nUser: u2\nAssistant: a3\n"));
        assert!(!prompt.contains("u0"));
        assert!(prompt.contains("User: u6\n\n\nAssistant (provide a short and helpful response):"));
    }
}
