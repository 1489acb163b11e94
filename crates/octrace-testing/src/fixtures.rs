//! JSON builders for synthetic opencode records.
//!
//! The shapes match what opencode writes to `storage/`, trimmed to the
//! fields ingestion reads.

use serde_json::{Value, json};

pub fn session_json(id: &str, project: &str, created: i64) -> Value {
    json!({
        "id": id,
        "projectID": project,
        "title": format!("session {}", id),
        "directory": "/work",
        "time": { "created": created, "updated": created },
    })
}

/// A message file.
#[derive(Debug, Clone)]
pub struct MessageSpec {
    pub id: String,
    pub session_id: String,
    pub role: &'static str,
    pub agent: Option<String>,
    pub created: i64,
    pub completed: Option<i64>,
    pub tokens_in: i64,
    pub tokens_out: i64,
    pub cost: f64,
}

impl MessageSpec {
    pub fn user(id: &str, session_id: &str, created: i64) -> Self {
        Self {
            id: id.to_string(),
            session_id: session_id.to_string(),
            role: "user",
            agent: None,
            created,
            completed: None,
            tokens_in: 0,
            tokens_out: 0,
            cost: 0.0,
        }
    }

    /// Completed assistant message 10 ms after `created`.
    pub fn assistant(id: &str, session_id: &str, agent: &str, created: i64) -> Self {
        Self {
            role: "assistant",
            agent: Some(agent.to_string()),
            completed: Some(created + 10),
            ..Self::user(id, session_id, created)
        }
    }

    pub fn agent(mut self, agent: &str) -> Self {
        self.agent = Some(agent.to_string());
        self
    }

    pub fn tokens(mut self, tokens_in: i64, tokens_out: i64) -> Self {
        self.tokens_in = tokens_in;
        self.tokens_out = tokens_out;
        self
    }

    pub fn cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    /// Still streaming.
    pub fn running(mut self) -> Self {
        self.completed = None;
        self
    }

    pub fn to_json(&self) -> Value {
        let mut time = json!({ "created": self.created });
        if let Some(completed) = self.completed {
            time["completed"] = json!(completed);
        }

        let mut value = json!({
            "id": self.id,
            "sessionID": self.session_id,
            "role": self.role,
            "time": time,
            "cost": self.cost,
            "tokens": {
                "input": self.tokens_in,
                "output": self.tokens_out,
                "reasoning": 0,
                "cache": { "read": 0, "write": 0 },
            },
        });
        if let Some(agent) = &self.agent {
            value["agent"] = json!(agent);
        }
        value
    }
}

/// A part file.
#[derive(Debug, Clone)]
pub struct PartSpec {
    pub id: String,
    pub session_id: String,
    pub message_id: String,
    body: Value,
}

impl PartSpec {
    fn new(id: &str, session_id: &str, message_id: &str, body: Value) -> Self {
        Self {
            id: id.to_string(),
            session_id: session_id.to_string(),
            message_id: message_id.to_string(),
            body,
        }
    }

    pub fn text(id: &str, session_id: &str, message_id: &str, text: &str) -> Self {
        Self::new(
            id,
            session_id,
            message_id,
            json!({ "type": "text", "text": text }),
        )
    }

    pub fn tool(id: &str, session_id: &str, message_id: &str, tool: &str, status: &str) -> Self {
        Self::new(
            id,
            session_id,
            message_id,
            json!({
                "type": "tool",
                "callID": format!("call_{}", id),
                "tool": tool,
                "state": { "status": status, "input": {} },
            }),
        )
    }

    /// `task` invocation that spawned `target_session`.
    pub fn task(
        id: &str,
        session_id: &str,
        message_id: &str,
        target_session: &str,
        prompt: &str,
        started: i64,
    ) -> Self {
        Self::new(
            id,
            session_id,
            message_id,
            json!({
                "type": "tool",
                "callID": format!("call_{}", id),
                "tool": "task",
                "state": {
                    "status": "completed",
                    "input": { "prompt": prompt, "subagent_type": "general" },
                    "output": format!("done: {}", prompt),
                    "metadata": { "sessionId": target_session },
                    "time": { "start": started, "end": started + 100 },
                },
            }),
        )
    }

    pub fn to_json(&self) -> Value {
        let mut value = self.body.clone();
        value["id"] = json!(self.id);
        value["sessionID"] = json!(self.session_id);
        value["messageID"] = json!(self.message_id);
        value
    }
}
