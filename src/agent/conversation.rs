use crate::llm::Turn;

/// Append-only message history for one request.
///
/// Every model call receives the whole history; turns are never edited or
/// removed once pushed.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new(system_prompt: &str, user_query: &str) -> Self {
        Self { turns: vec![Turn::system(system_prompt), Turn::user(user_query)] }
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
