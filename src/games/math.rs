use std::collections::HashMap;

use rand::Rng;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::{GameInput, InputOutcome, Minigame};
use crate::config::ServerConfig;
use crate::lobby::{LobbyCore, LobbyEvent};
use crate::types::{GameKind, MathQuestionView, ServerMsg};

/// A primary-grade arithmetic question. The answer never leaves the server.
#[derive(Debug, Clone)]
pub struct MathQuestion {
    pub id: String,
    pub text: String,
    pub answer: i64,
}

impl MathQuestion {
    /// Subtraction operands are swapped when needed so the answer is never
    /// negative.
    pub fn new(num1: i64, num2: i64, op: char) -> Self {
        let (num1, num2) = if op == '-' && num1 < num2 { (num2, num1) } else { (num1, num2) };
        let (answer, text) = match op {
            '+' => (num1 + num2, format!("{num1} + {num2}")),
            _ => (num1 - num2, format!("{num1} - {num2}")),
        };
        let mut id = Uuid::new_v4().to_string();
        id.truncate(8);
        Self { id, text, answer }
    }

    pub fn generate(rng: &mut impl Rng) -> Self {
        let num1 = rng.random_range(1..=20);
        let num2 = rng.random_range(1..=20);
        let op = if rng.random_bool(0.5) { '+' } else { '-' };
        Self::new(num1, num2, op)
    }

    fn view(&self) -> MathQuestionView {
        MathQuestionView { id: self.id.clone(), text: self.text.clone() }
    }
}

/// Continuous-flow quiz: every player has their own question and gets a
/// fresh one the moment they answer correctly.
pub struct MathQuiz {
    duration_secs: u64,
    questions: HashMap<String, MathQuestion>,
}

impl MathQuiz {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            duration_secs: config.math_duration_secs,
            questions: HashMap::new(),
        }
    }
}

impl Minigame for MathQuiz {
    fn kind(&self) -> GameKind {
        GameKind::MathQuiz
    }

    fn duration_secs(&self) -> u64 {
        self.duration_secs
    }

    fn begin(&mut self, core: &mut LobbyCore, tx: &broadcast::Sender<LobbyEvent>) {
        core.reset_round_scores();
        core.broadcast(tx, ServerMsg::Game1Start { duration: self.duration_secs });

        let mut rng = rand::rng();
        for player_id in core.active.clone() {
            let question = MathQuestion::generate(&mut rng);
            core.send_to(tx, &player_id, ServerMsg::NewQuestion { question: question.view() });
            self.questions.insert(player_id, question);
        }
    }

    fn handle_input(
        &mut self,
        core: &mut LobbyCore,
        tx: &broadcast::Sender<LobbyEvent>,
        player_id: &str,
        input: &GameInput,
    ) -> InputOutcome {
        let GameInput::Answer { answer } = input else {
            return InputOutcome::Continue;
        };
        // Non-numeric payloads are dropped without an acknowledgment.
        let Some(value) = parse_answer(answer) else {
            return InputOutcome::Continue;
        };
        let Some(question) = self.questions.get(player_id) else {
            return InputOutcome::Continue;
        };

        let correct = value == question.answer;
        if correct {
            core.award_point(player_id);
            let next = MathQuestion::generate(&mut rand::rng());
            core.send_to(tx, player_id, ServerMsg::NewQuestion { question: next.view() });
            self.questions.insert(player_id.to_string(), next);
        }
        core.send_to(tx, player_id, ServerMsg::AnswerResult { correct, new_pos: None });
        InputOutcome::Continue
    }

    fn resume(&mut self, core: &mut LobbyCore, tx: &broadcast::Sender<LobbyEvent>, player_id: &str) {
        core.send_to(tx, player_id, ServerMsg::Game1Start { duration: self.duration_secs });
        let question = self
            .questions
            .entry(player_id.to_string())
            .or_insert_with(|| MathQuestion::generate(&mut rand::rng()));
        let view = question.view();
        core.send_to(tx, player_id, ServerMsg::NewQuestion { question: view });
    }

    fn current_score(&self, _player_id: &str) -> Option<i64> {
        None
    }
}

fn parse_answer(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
