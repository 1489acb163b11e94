use octrace_types::{AgentTrace, MessageRecord, SessionRecord};
use std::collections::BTreeMap;

use super::TraceSource;

/// Contiguous run of a session's messages under one agent identity.
#[derive(Debug, Clone)]
pub(crate) struct Segment<'a> {
    pub index: usize,
    pub agent: Option<&'a str>,
    pub messages: Vec<&'a MessageRecord>,
}

impl Segment<'_> {
    pub fn first_created_at(&self) -> Option<i64> {
        self.messages.first().map(|m| m.created_at)
    }

    pub fn contains_message(&self, message_id: &str) -> bool {
        self.messages.iter().any(|m| m.id == message_id)
    }
}

/// A session with its messages split into segments. Always holds at least one
/// segment, possibly empty when the session has no messages yet.
#[derive(Debug, Clone)]
pub(crate) struct SessionTimeline<'a> {
    pub session_id: &'a str,
    pub session: Option<&'a SessionRecord>,
    pub segments: Vec<Segment<'a>>,
}

impl<'a> SessionTimeline<'a> {
    /// Session creation time, else the first message's.
    pub fn started_at(&self) -> i64 {
        self.session
            .map(|s| s.created_at)
            .or_else(|| self.segments.first().and_then(Segment::first_created_at))
            .unwrap_or(0)
    }

    pub fn segment_started_at(&self, segment: &Segment<'_>) -> i64 {
        if segment.index == 0 {
            let session_start = self.started_at();
            match segment.first_created_at() {
                Some(first) => first.min(session_start),
                None => session_start,
            }
        } else {
            segment.first_created_at().unwrap_or_else(|| self.started_at())
        }
    }

    pub fn trace_id(&self, segment: &Segment<'_>) -> String {
        AgentTrace::segment_id(self.session_id, segment.index)
    }

    /// Segment holding `message_id`; when the message is unknown, the last
    /// segment that started at or before `at`.
    pub fn locate(&self, message_id: &str, at: Option<i64>) -> &Segment<'a> {
        if let Some(segment) = self.segments.iter().find(|s| s.contains_message(message_id)) {
            return segment;
        }

        let by_time = at.and_then(|ts| {
            self.segments
                .iter()
                .rev()
                .find(|s| self.segment_started_at(s) <= ts)
        });

        match by_time {
            Some(segment) => segment,
            None => &self.segments[0],
        }
    }

    pub fn is_last(&self, segment: &Segment<'_>) -> bool {
        segment.index + 1 == self.segments.len()
    }
}

/// Split ordered messages at every change of agent identity.
///
/// Messages without an identity extend the current segment.
pub(crate) fn split_segments<'a>(messages: &[&'a MessageRecord]) -> Vec<Segment<'a>> {
    let mut segments = vec![Segment {
        index: 0,
        agent: None,
        messages: Vec::new(),
    }];

    for message in messages {
        let agent = message.agent.as_deref();
        let Some(current) = segments.last_mut() else {
            continue;
        };

        match (current.agent, agent) {
            (Some(active), Some(next)) if active != next => {
                let index = segments.len();
                segments.push(Segment {
                    index,
                    agent: Some(next),
                    messages: vec![*message],
                });
            }
            (None, Some(next)) => {
                current.agent = Some(next);
                current.messages.push(*message);
            }
            _ => current.messages.push(*message),
        }
    }

    segments
}

/// One timeline per known session, keyed by session id.
///
/// A session is known if its session file or any of its messages was ingested.
pub(crate) fn build_timelines<'a>(source: &TraceSource<'a>) -> BTreeMap<&'a str, SessionTimeline<'a>> {
    let mut by_session: BTreeMap<&'a str, (Option<&'a SessionRecord>, Vec<&'a MessageRecord>)> =
        BTreeMap::new();

    for session in source.sessions {
        by_session.entry(session.id.as_str()).or_default().0 = Some(session);
    }
    for message in source.messages {
        by_session
            .entry(message.session_id.as_str())
            .or_default()
            .1
            .push(message);
    }

    by_session
        .into_iter()
        .map(|(session_id, (session, mut messages))| {
            messages.sort_by(|a, b| {
                a.created_at
                    .cmp(&b.created_at)
                    .then_with(|| a.id.cmp(&b.id))
            });
            let timeline = SessionTimeline {
                session_id,
                session,
                segments: split_segments(&messages),
            };
            (session_id, timeline)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use octrace_types::MessageRole;

    fn message(id: &str, agent: Option<&str>, created_at: i64) -> MessageRecord {
        MessageRecord {
            id: id.to_string(),
            session_id: "ses_1".to_string(),
            role: MessageRole::Assistant,
            agent: agent.map(str::to_string),
            model_id: None,
            provider_id: None,
            created_at,
            completed_at: None,
            tokens_in: 0,
            tokens_out: 0,
            tokens_reasoning: 0,
            cache_read: 0,
            cache_write: 0,
            cost: 0.0,
            error: None,
            source_path: String::new(),
        }
    }

    #[test]
    fn test_single_identity_is_one_segment() {
        let a = message("m1", Some("build"), 1);
        let b = message("m2", None, 2);
        let c = message("m3", Some("build"), 3);
        let segments = split_segments(&[&a, &b, &c]);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].agent, Some("build"));
        assert_eq!(segments[0].messages.len(), 3);
    }

    #[test]
    fn test_identity_change_starts_new_segment() {
        let a = message("m1", Some("plan"), 1);
        let b = message("m2", Some("plan"), 2);
        let c = message("m3", Some("build"), 3);
        let d = message("m4", None, 4);
        let e = message("m5", Some("plan"), 5);
        let segments = split_segments(&[&a, &b, &c, &d, &e]);

        let shape: Vec<(usize, Option<&str>, usize)> = segments
            .iter()
            .map(|s| (s.index, s.agent, s.messages.len()))
            .collect();
        assert_eq!(
            shape,
            vec![(0, Some("plan"), 2), (1, Some("build"), 2), (2, Some("plan"), 1)]
        );
    }

    #[test]
    fn test_leading_anonymous_messages_join_first_identity() {
        let a = message("m1", None, 1);
        let b = message("m2", Some("build"), 2);
        let segments = split_segments(&[&a, &b]);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].agent, Some("build"));
    }

    #[test]
    fn test_timeline_without_session_file_starts_at_first_message() {
        let messages = vec![message("m2", Some("build"), 50), message("m1", Some("build"), 20)];
        let source = TraceSource {
            sessions: &[],
            messages: &messages,
            parts: &[],
        };
        let timelines = build_timelines(&source);
        let timeline = &timelines["ses_1"];
        assert!(timeline.session.is_none());
        assert_eq!(timeline.started_at(), 20);
        assert_eq!(timeline.segments[0].messages[0].id, "m1");
    }

    #[test]
    fn test_locate_falls_back_to_time() {
        let a = message("m1", Some("plan"), 10);
        let b = message("m2", Some("build"), 20);
        let timeline = SessionTimeline {
            session_id: "ses_1",
            session: None,
            segments: split_segments(&[&a, &b]),
        };

        assert_eq!(timeline.locate("m2", None).index, 1);
        assert_eq!(timeline.locate("gone", Some(25)).index, 1);
        assert_eq!(timeline.locate("gone", Some(15)).index, 0);
        assert_eq!(timeline.locate("gone", None).index, 0);
        assert_eq!(timeline.trace_id(&timeline.segments[1]), "ses_1:seg1");
    }
}
