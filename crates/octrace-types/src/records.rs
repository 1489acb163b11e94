use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Tool name that denotes "invoke a sub-agent".
pub const TASK_TOOL: &str = "task";

macro_rules! string_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(Error::unknown($kind, other)),
                }
            }
        }
    };
}

/// One conversation session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub project_id: Option<String>,
    /// Parent hint written by the source tool; trace resolution does not rely on it.
    pub parent_id: Option<String>,
    pub title: Option<String>,
    pub directory: Option<String>,
    /// Epoch milliseconds.
    pub created_at: i64,
    pub updated_at: Option<i64>,
    pub source_path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
}

string_enum!(MessageRole, "message role", {
    User => "user",
    Assistant => "assistant",
});

/// One message within a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub session_id: String,
    pub role: MessageRole,
    /// Agent identity the message was authored under.
    pub agent: Option<String>,
    pub model_id: Option<String>,
    pub provider_id: Option<String>,
    pub created_at: i64,
    pub completed_at: Option<i64>,
    pub tokens_in: i64,
    pub tokens_out: i64,
    pub tokens_reasoning: i64,
    pub cache_read: i64,
    pub cache_write: i64,
    pub cost: f64,
    /// Error payload as JSON text.
    pub error: Option<String>,
    pub source_path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PartType {
    Text,
    Reasoning,
    Tool,
    StepStart,
    StepFinish,
    File,
    Patch,
    Snapshot,
    Agent,
    Subtask,
    Retry,
    Compaction,
}

string_enum!(PartType, "part type", {
    Text => "text",
    Reasoning => "reasoning",
    Tool => "tool",
    StepStart => "step-start",
    StepFinish => "step-finish",
    File => "file",
    Patch => "patch",
    Snapshot => "snapshot",
    Agent => "agent",
    Subtask => "subtask",
    Retry => "retry",
    Compaction => "compaction",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Pending,
    Running,
    Completed,
    Error,
}

string_enum!(ToolStatus, "tool status", {
    Pending => "pending",
    Running => "running",
    Completed => "completed",
    Error => "error",
});

/// One fragment of a message: text, reasoning, a tool invocation, ...
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartRecord {
    pub id: String,
    pub session_id: String,
    pub message_id: String,
    pub part_type: PartType,
    /// Text body for text/reasoning parts.
    pub text: Option<String>,
    pub tool_name: Option<String>,
    pub call_id: Option<String>,
    pub tool_status: Option<ToolStatus>,
    /// Tool arguments as JSON text.
    pub tool_input: Option<String>,
    pub tool_output: Option<String>,
    pub tool_error: Option<String>,
    /// Session spawned by a `task` tool invocation.
    pub target_session_id: Option<String>,
    pub started_at: Option<i64>,
    pub ended_at: Option<i64>,
    pub source_path: String,
}

impl PartRecord {
    /// True if this part invokes a sub-agent.
    pub fn is_delegation(&self) -> bool {
        self.part_type == PartType::Tool && self.tool_name.as_deref() == Some(TASK_TOOL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_type_uses_kebab_case() {
        assert_eq!(PartType::StepFinish.as_str(), "step-finish");
        assert_eq!("step-start".parse::<PartType>().unwrap(), PartType::StepStart);
        assert!("mystery".parse::<PartType>().is_err());
    }

    #[test]
    fn test_is_delegation_only_for_task_tool() {
        let mut part = PartRecord {
            id: "prt_1".to_string(),
            session_id: "ses_1".to_string(),
            message_id: "msg_1".to_string(),
            part_type: PartType::Tool,
            text: None,
            tool_name: Some("task".to_string()),
            call_id: None,
            tool_status: Some(ToolStatus::Running),
            tool_input: None,
            tool_output: None,
            tool_error: None,
            target_session_id: None,
            started_at: None,
            ended_at: None,
            source_path: String::new(),
        };
        assert!(part.is_delegation());

        part.tool_name = Some("bash".to_string());
        assert!(!part.is_delegation());
    }
}
