use serde::{Deserialize, Serialize};

use crate::domain::query::{Query, SessionId};
use crate::domain::response::SanitizedResponse;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub query: Query,
    pub response: SanitizedResponse,
}

/// Per-session history, oldest turn first.
///
/// Only the orchestrator appends, and only after a response has been
/// delivered, so every recorded turn pairs a query with the exact text the
/// customer saw.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationState {
    session_id: Option<SessionId>,
    turns: Vec<ConversationTurn>,
}

impl ConversationState {
    pub fn new(session_id: SessionId) -> Self {
        Self { session_id: Some(session_id), turns: Vec::new() }
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Appends a delivered turn, dropping the oldest turns beyond `limit`.
    /// A limit of zero keeps everything.
    pub fn record(&mut self, query: Query, response: SanitizedResponse, limit: usize) {
        self.turns.push(ConversationTurn { query, response });
        if limit > 0 && self.turns.len() > limit {
            let excess = self.turns.len() - limit;
            self.turns.drain(..excess);
        }
    }

    /// The last `count` turns, oldest first.
    pub fn recent(&self, count: usize) -> &[ConversationTurn] {
        let start = self.turns.len().saturating_sub(count);
        &self.turns[start..]
    }

    /// Plain-text rendering of the last `count` turns for model prompts.
    pub fn transcript(&self, count: usize) -> String {
        self.recent(count)
            .iter()
            .map(|turn| format!("Customer: {}\nAssistant: {}", turn.query.text, turn.response.text))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::ConversationState;
    use crate::domain::category::Category;
    use crate::domain::query::{Query, Role, SessionId};
    use crate::domain::response::SanitizedResponse;

    fn turn(text: &str) -> (Query, SanitizedResponse) {
        (
            Query::new(text, SessionId::new("s"), Role::Customer),
            SanitizedResponse { text: format!("re: {text}"), category: Category::Knowledge },
        )
    }

    #[test]
    fn record_keeps_order_and_applies_limit() {
        let mut state = ConversationState::new(SessionId::new("s"));
        for text in ["one", "two", "three"] {
            let (query, response) = turn(text);
            state.record(query, response, 2);
        }

        let texts: Vec<&str> = state.turns().iter().map(|t| t.query.text.as_str()).collect();
        assert_eq!(texts, vec!["two", "three"]);
    }

    #[test]
    fn zero_limit_keeps_full_history() {
        let mut state = ConversationState::default();
        for text in ["a", "b", "c", "d"] {
            let (query, response) = turn(text);
            state.record(query, response, 0);
        }
        assert_eq!(state.len(), 4);
    }

    #[test]
    fn transcript_renders_recent_turns() {
        let mut state = ConversationState::new(SessionId::new("s"));
        for text in ["first", "second"] {
            let (query, response) = turn(text);
            state.record(query, response, 10);
        }

        assert_eq!(state.transcript(1), "Customer: second\nAssistant: re: second");
        assert_eq!(state.recent(5).len(), 2);
    }
}
