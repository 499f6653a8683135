use shelfmate_core::domain::message::{History, Message};
use shelfmate_core::domain::mode::Mode;
use shelfmate_core::domain::session::{ConversationState, SessionId};

use crate::personas;

/// One conversation. Mode and user id are fixed at creation.
#[derive(Clone, Debug)]
pub struct ConversationSession {
    id: SessionId,
    mode: Mode,
    user_id: Option<String>,
    history: History,
    state: ConversationState,
}

impl ConversationSession {
    /// Opens a session whose history starts with the mode's greeting.
    pub fn open(mode: Mode, user_id: Option<String>) -> Self {
        Self::with_id(SessionId::generate(), mode, user_id)
    }

    pub fn with_id(id: SessionId, mode: Mode, user_id: Option<String>) -> Self {
        let mut history = History::new();
        history.push(Message::agent(personas::greeting(mode)));
        Self { id, mode, user_id, history, state: ConversationState::new() }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn greeting(&self) -> &'static str {
        personas::greeting(self.mode)
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    pub(crate) fn history_mut(&mut self) -> &mut History {
        &mut self.history
    }

    pub(crate) fn state_mut(&mut self) -> &mut ConversationState {
        &mut self.state
    }
}
