mod math;
mod race;
mod typing;

pub use math::{MathQuestion, MathQuiz};
pub use race::TriviaRace;
pub use typing::{SpeedTyping, check_word};

use tokio::sync::broadcast;

use crate::config::ServerConfig;
use crate::lobby::{LobbyCore, LobbyEvent};
use crate::types::{GameInfo, GameKind};

/// One player action, already decoded from the wire. Variants a game does
/// not understand are silently ignored by it.
#[derive(Debug, Clone)]
pub enum GameInput {
    Answer { answer: serde_json::Value },
    Word { current_word: String, typed_word: String },
    RaceAnswer { question_index: usize, answer_index: usize },
}

/// What the orchestrator should do after an input was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputOutcome {
    Continue,
    /// The game's early-completion condition fired; end the round now.
    RoundComplete,
}

/// The uniform contract every minigame variant implements against a lobby.
///
/// A game is only called between `begin` and the round's end; it owns all
/// round-local state and mutates player scores exclusively through the
/// LobbyCore accessors so the tie-break clock stays consistent.
pub trait Minigame: Send {
    fn kind(&self) -> GameKind;

    fn duration_secs(&self) -> u64;

    /// Round-start side effects: reset round scores, broadcast the initial
    /// payload (first question, word list, question pool).
    fn begin(&mut self, core: &mut LobbyCore, tx: &broadcast::Sender<LobbyEvent>);

    /// Processes one active player's action. Malformed payloads must not
    /// end the round or the connection.
    fn handle_input(
        &mut self,
        core: &mut LobbyCore,
        tx: &broadcast::Sender<LobbyEvent>,
        player_id: &str,
        input: &GameInput,
    ) -> InputOutcome;

    /// Re-sends the round payload to one player after a mid-round
    /// reconnect, so they have something to play against before the next
    /// round.
    fn resume(&mut self, core: &mut LobbyCore, tx: &broadcast::Sender<LobbyEvent>, player_id: &str);

    /// Round-scoped score override for games that rank by something other
    /// than accumulated points (the race ranks by track position). `None`
    /// means "use the player's round score".
    fn current_score(&self, player_id: &str) -> Option<i64>;
}

/// Builds a fresh minigame instance for one round.
pub fn create(kind: GameKind, config: &ServerConfig) -> Box<dyn Minigame> {
    match kind {
        GameKind::MathQuiz => Box::new(MathQuiz::new(config)),
        GameKind::SpeedTyping => Box::new(SpeedTyping::new(config)),
        GameKind::TriviaRace => Box::new(TriviaRace::new(config)),
    }
}

/// Preview metadata shown to players before a round starts.
pub fn game_info(kind: GameKind, config: &ServerConfig) -> GameInfo {
    match kind {
        GameKind::MathQuiz => GameInfo {
            name: "Math Dash".to_string(),
            description: "Solve as many sums as you can before the clock runs out".to_string(),
            duration_secs: config.math_duration_secs,
        },
        GameKind::SpeedTyping => GameInfo {
            name: "Speed Typing".to_string(),
            description: "Type the words faster than everyone else".to_string(),
            duration_secs: config.typing_duration_secs,
        },
        GameKind::TriviaRace => GameInfo {
            name: "Trivia Race".to_string(),
            description: "Answer trivia to race your rivals to the finish line".to_string(),
            duration_secs: config.race_duration_secs,
        },
    }
}
