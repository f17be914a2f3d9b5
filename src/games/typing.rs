use rand::seq::IndexedRandom;
use tokio::sync::broadcast;

use super::{GameInput, InputOutcome, Minigame};
use crate::config::ServerConfig;
use crate::lobby::{LobbyCore, LobbyEvent};
use crate::tournament;
use crate::types::{GameKind, ServerMsg};

const WORD_BANK: &[&str] = &[
    "apple", "banana", "cherry", "date", "elderberry", "fig", "grape",
    "house", "island", "jungle", "kite", "lemon", "mango", "nest",
    "ocean", "piano", "queen", "river", "sun", "tiger", "umbrella",
    "violet", "water", "xylophone", "yellow", "zebra", "cloud",
    "dream", "energy", "flower", "garden", "happy", "image", "juice",
    "king", "lion", "mouse", "night", "orange", "pencil", "quiet",
    "radio", "snake", "tree", "unicorn", "vision", "whale", "xray",
];

/// Case-insensitive, whitespace-trimmed word comparison.
pub fn check_word(target: &str, typed: &str) -> bool {
    let target = target.trim();
    !target.is_empty() && target.eq_ignore_ascii_case(typed.trim())
}

/// Shared-progress typing race: one word list for everyone, a point per
/// correctly typed word, and a leaderboard refresh for the whole lobby on
/// every score.
pub struct SpeedTyping {
    duration_secs: u64,
    word_count: usize,
    words: Vec<String>,
}

impl SpeedTyping {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            duration_secs: config.typing_duration_secs,
            word_count: config.typing_word_count,
            words: Vec::new(),
        }
    }

    fn generate_words(&self) -> Vec<String> {
        let mut rng = rand::rng();
        (0..self.word_count)
            .map(|_| WORD_BANK.choose(&mut rng).copied().unwrap_or("apple").to_string())
            .collect()
    }

    fn knows_word(&self, claimed: &str) -> bool {
        let claimed = claimed.trim();
        self.words.iter().any(|w| w.eq_ignore_ascii_case(claimed))
    }
}

impl Minigame for SpeedTyping {
    fn kind(&self) -> GameKind {
        GameKind::SpeedTyping
    }

    fn duration_secs(&self) -> u64 {
        self.duration_secs
    }

    fn begin(&mut self, core: &mut LobbyCore, tx: &broadcast::Sender<LobbyEvent>) {
        core.reset_round_scores();
        self.words = self.generate_words();
        core.broadcast(tx, ServerMsg::Game2Start { duration: self.duration_secs });
        core.broadcast(tx, ServerMsg::NewWords { words: self.words.clone() });
    }

    fn handle_input(
        &mut self,
        core: &mut LobbyCore,
        tx: &broadcast::Sender<LobbyEvent>,
        player_id: &str,
        input: &GameInput,
    ) -> InputOutcome {
        let GameInput::Word { current_word, typed_word } = input else {
            return InputOutcome::Continue;
        };

        // The claimed word has to come from this round's list; a correct
        // transcription of an invented word scores nothing.
        let correct = self.knows_word(current_word) && check_word(current_word, typed_word);

        if correct {
            core.award_point(player_id);
            core.send_to(tx, player_id, ServerMsg::WordResult { correct: true });
            let board = tournament::leaderboard(core, None);
            core.broadcast(tx, ServerMsg::ScoreUpdate { leaderboard: board });
        } else {
            core.send_to(tx, player_id, ServerMsg::WordResult { correct: false });
        }
        InputOutcome::Continue
    }

    fn resume(&mut self, core: &mut LobbyCore, tx: &broadcast::Sender<LobbyEvent>, player_id: &str) {
        core.send_to(tx, player_id, ServerMsg::Game2Start { duration: self.duration_secs });
        core.send_to(tx, player_id, ServerMsg::NewWords { words: self.words.clone() });
    }

    fn current_score(&self, _player_id: &str) -> Option<i64> {
        None
    }
}
