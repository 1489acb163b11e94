use octrace_types::{MessageRecord, PartRecord, PartType, SessionRecord};
use serde_json::Value;

use crate::schema::{MessageFile, PartBody, PartFile, SessionFile, SpanTime};

/// Metadata keys under which the task tool records the spawned session.
const TARGET_SESSION_KEYS: [&str; 3] = ["sessionId", "sessionID", "session_id"];

pub(crate) fn map_session(file: SessionFile, source_path: &str) -> Result<SessionRecord, String> {
    require_id("session", &file.id)?;

    Ok(SessionRecord {
        id: file.id,
        project_id: file.project_id,
        parent_id: file.parent_id.filter(|p| !p.is_empty()),
        title: file.title,
        directory: file.directory,
        created_at: file.time.created,
        updated_at: file.time.updated,
        source_path: source_path.to_string(),
    })
}

pub(crate) fn map_message(file: MessageFile, source_path: &str) -> Result<MessageRecord, String> {
    require_id("message", &file.id)?;
    require_id("message sessionID", &file.session_id)?;

    let agent = file.agent.or(file.mode).filter(|a| !a.is_empty());
    let error = file
        .error
        .filter(|e| !e.is_null())
        .map(|e| e.to_string());

    Ok(MessageRecord {
        id: file.id,
        session_id: file.session_id,
        role: file.role,
        agent,
        model_id: file.model_id,
        provider_id: file.provider_id,
        created_at: file.time.created,
        completed_at: file.time.completed,
        tokens_in: file.tokens.input,
        tokens_out: file.tokens.output,
        tokens_reasoning: file.tokens.reasoning,
        cache_read: file.tokens.cache.read,
        cache_write: file.tokens.cache.write,
        cost: file.cost,
        error,
        source_path: source_path.to_string(),
    })
}

pub(crate) fn map_part(file: PartFile, source_path: &str) -> Result<PartRecord, String> {
    require_id("part", &file.id)?;
    require_id("part messageID", &file.message_id)?;

    let mut record = PartRecord {
        id: file.id,
        session_id: file.session_id,
        message_id: file.message_id,
        part_type: PartType::Text,
        text: None,
        tool_name: None,
        call_id: None,
        tool_status: None,
        tool_input: None,
        tool_output: None,
        tool_error: None,
        target_session_id: None,
        started_at: None,
        ended_at: None,
        source_path: source_path.to_string(),
    };

    match file.body {
        PartBody::Text(text) => {
            record.part_type = PartType::Text;
            apply_span(&mut record, text.time.as_ref());
            record.text = Some(text.text);
        }
        PartBody::Reasoning(text) => {
            record.part_type = PartType::Reasoning;
            apply_span(&mut record, text.time.as_ref());
            record.text = Some(text.text);
        }
        PartBody::Tool(tool) => {
            record.part_type = PartType::Tool;
            record.target_session_id = tool.state.metadata.as_ref().and_then(target_session);
            record.tool_name = Some(tool.tool);
            record.call_id = tool.call_id;
            record.tool_status = Some(tool.state.status);
            record.tool_input = tool.state.input.map(|v| v.to_string());
            record.tool_output = tool.state.output;
            record.tool_error = tool.state.error;
            apply_span(&mut record, tool.state.time.as_ref());
        }
        PartBody::File(file_part) => {
            record.part_type = PartType::File;
            record.text = file_part.filename.or(file_part.url);
        }
        PartBody::Agent(agent) => {
            record.part_type = PartType::Agent;
            record.text = Some(agent.name);
        }
        PartBody::Subtask(subtask) => {
            record.part_type = PartType::Subtask;
            record.text = subtask.prompt;
            record.tool_name = subtask.agent;
        }
        PartBody::StepStart(_) => record.part_type = PartType::StepStart,
        PartBody::StepFinish(_) => record.part_type = PartType::StepFinish,
        PartBody::Patch(_) => record.part_type = PartType::Patch,
        PartBody::Snapshot(_) => record.part_type = PartType::Snapshot,
        PartBody::Retry(_) => record.part_type = PartType::Retry,
        PartBody::Compaction(_) => record.part_type = PartType::Compaction,
    }

    Ok(record)
}

fn require_id(what: &str, id: &str) -> Result<(), String> {
    if id.trim().is_empty() {
        Err(format!("{} id is empty", what))
    } else {
        Ok(())
    }
}

fn apply_span(record: &mut PartRecord, time: Option<&SpanTime>) {
    if let Some(time) = time {
        record.started_at = time.start;
        record.ended_at = time.end;
    }
}

fn target_session(metadata: &Value) -> Option<String> {
    TARGET_SESSION_KEYS
        .iter()
        .find_map(|key| metadata.get(*key).and_then(Value::as_str))
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}
