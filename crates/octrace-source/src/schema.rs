use octrace_types::{MessageRole, ToolStatus};
use serde::Deserialize;
use serde_json::Value;

// On-disk shapes written by opencode. Required fields are plain, optional
// ones default. Closed sets (role, part type, tool status) reject unknown
// values instead of guessing.

#[derive(Debug, Deserialize)]
pub(crate) struct SessionFile {
    pub id: String,
    #[serde(rename = "projectID", default)]
    pub project_id: Option<String>,
    #[serde(rename = "parentID", default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub directory: Option<String>,
    pub time: SessionTime,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SessionTime {
    pub created: i64,
    #[serde(default)]
    pub updated: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessageFile {
    pub id: String,
    #[serde(rename = "sessionID")]
    pub session_id: String,
    pub role: MessageRole,
    pub time: MessageTime,
    #[serde(default)]
    pub agent: Option<String>,
    /// Older files record the agent identity as `mode`.
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(rename = "modelID", default)]
    pub model_id: Option<String>,
    #[serde(rename = "providerID", default)]
    pub provider_id: Option<String>,
    #[serde(default)]
    pub cost: f64,
    #[serde(default)]
    pub tokens: Tokens,
    #[serde(default)]
    pub error: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessageTime {
    pub created: i64,
    #[serde(default)]
    pub completed: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Tokens {
    #[serde(default)]
    pub input: i64,
    #[serde(default)]
    pub output: i64,
    #[serde(default)]
    pub reasoning: i64,
    #[serde(default)]
    pub cache: CacheTokens,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct CacheTokens {
    #[serde(default)]
    pub read: i64,
    #[serde(default)]
    pub write: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PartFile {
    pub id: String,
    #[serde(rename = "sessionID")]
    pub session_id: String,
    #[serde(rename = "messageID")]
    pub message_id: String,
    #[serde(flatten)]
    pub body: PartBody,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub(crate) enum PartBody {
    Text(TextPart),
    Reasoning(TextPart),
    Tool(ToolPart),
    StepStart(Marker),
    StepFinish(Marker),
    File(FilePart),
    Patch(Marker),
    Snapshot(Marker),
    Agent(AgentPart),
    Subtask(SubtaskPart),
    Retry(Marker),
    Compaction(Marker),
}

/// Payload-free part kinds; any extra fields are ignored.
#[derive(Debug, Deserialize)]
pub(crate) struct Marker {}

#[derive(Debug, Deserialize)]
pub(crate) struct TextPart {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub time: Option<SpanTime>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SpanTime {
    #[serde(default)]
    pub start: Option<i64>,
    #[serde(default)]
    pub end: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ToolPart {
    #[serde(rename = "callID", default)]
    pub call_id: Option<String>,
    pub tool: String,
    pub state: ToolState,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ToolState {
    pub status: ToolStatus,
    #[serde(default)]
    pub input: Option<Value>,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
    #[serde(default)]
    pub time: Option<SpanTime>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FilePart {
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AgentPart {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubtaskPart {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub agent: Option<String>,
}
