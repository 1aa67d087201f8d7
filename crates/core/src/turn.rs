//! Turn-taking state shared by both legs of a call.
//!
//! The model decides who is speaking; the bridge only mirrors what the model
//! protocol reports (plus the fact that caller audio is flowing) in a single
//! [`TurnPhase`], so "user speaking" and "bot speaking" can never both hold.

use std::fmt;

/// Whose turn it is to speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnPhase {
    #[default]
    Idle,
    UserSpeaking,
    BotSpeaking,
}

impl fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnPhase::Idle => write!(f, "idle"),
            TurnPhase::UserSpeaking => write!(f, "user_speaking"),
            TurnPhase::BotSpeaking => write!(f, "bot_speaking"),
        }
    }
}

/// Edge-triggered turn signals, emitted only when the phase actually changes
/// (or, for `TurnComplete`/`Interrupted`, whenever the model reports them).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnEvent {
    UserStarted,
    UserStopped,
    BotStarted,
    TurnComplete,
    Interrupted,
}

/// Owns the [`TurnPhase`] of one model session and derives [`TurnEvent`]s from
/// protocol observations.
#[derive(Debug, Default)]
pub struct TurnTracker {
    phase: TurnPhase,
}

impl TurnTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    /// Caller audio is being sent upstream.
    ///
    /// Only an idle session moves to `UserSpeaking`. While the bot is talking the
    /// caller's line keeps streaming (often silence), so barge-in is left to the
    /// model's `interrupted` signal.
    pub fn on_user_audio(&mut self) -> Option<TurnEvent> {
        match self.phase {
            TurnPhase::Idle => {
                self.phase = TurnPhase::UserSpeaking;
                Some(TurnEvent::UserStarted)
            }
            TurnPhase::UserSpeaking | TurnPhase::BotSpeaking => None,
        }
    }

    /// The model produced audio. The first audio of a bot turn ends the user's turn.
    pub fn on_bot_audio(&mut self) -> Vec<TurnEvent> {
        match self.phase {
            TurnPhase::BotSpeaking => Vec::new(),
            TurnPhase::UserSpeaking => {
                self.phase = TurnPhase::BotSpeaking;
                vec![TurnEvent::UserStopped, TurnEvent::BotStarted]
            }
            TurnPhase::Idle => {
                self.phase = TurnPhase::BotSpeaking;
                vec![TurnEvent::BotStarted]
            }
        }
    }

    pub fn on_turn_complete(&mut self) -> TurnEvent {
        self.phase = TurnPhase::Idle;
        TurnEvent::TurnComplete
    }

    /// The caller talked over the bot; the floor goes back to the caller.
    pub fn on_interrupted(&mut self) -> TurnEvent {
        self.phase = TurnPhase::UserSpeaking;
        TurnEvent::Interrupted
    }
}
