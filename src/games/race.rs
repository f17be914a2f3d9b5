use std::collections::HashMap;

use rand::seq::SliceRandom;
use tokio::sync::broadcast;

use super::{GameInput, InputOutcome, Minigame};
use crate::config::ServerConfig;
use crate::lobby::{LobbyCore, LobbyEvent};
use crate::types::{GameKind, RaceQuestionView, ServerMsg};

/// A trivia question with its answer key. Only the view without the
/// solution goes over the wire; grading happens here.
#[derive(Debug, Clone, Copy)]
struct RaceQuestion {
    text: &'static str,
    options: [&'static str; 4],
    solution: usize,
}

const QUESTION_BANK: &[RaceQuestion] = &[
    RaceQuestion { text: "Which isn't a programming language?", options: ["Java", "Python", "HTML", "C++"], solution: 2 },
    RaceQuestion { text: "What does CPU stand for?", options: ["Central Processing Unit", "Central Process Unit", "Computer Personal Unit", "Central Processor Unit"], solution: 0 },
    RaceQuestion { text: "Which language is used for styling?", options: ["HTML", "CSS", "Python", "Java"], solution: 1 },
    RaceQuestion { text: "Who created Python?", options: ["Elon Musk", "Bill Gates", "Mark Zuckerberg", "Guido van Rossum"], solution: 3 },
    RaceQuestion { text: "What is 101 in binary?", options: ["5", "3", "2", "6"], solution: 0 },
    RaceQuestion { text: "RAM stands for?", options: ["Read Access Memory", "Random Access Memory", "Run Access Memory", "Real Access Memory"], solution: 1 },
    RaceQuestion { text: "Which keyword defines a function?", options: ["func", "function", "def", "define"], solution: 2 },
    RaceQuestion { text: "Smallest unit of data?", options: ["Bit", "Byte", "Kilobyte", "Megabyte"], solution: 0 },
    RaceQuestion { text: "Language for Android apps?", options: ["Swift", "Ruby", "Kotlin", "PHP"], solution: 2 },
    RaceQuestion { text: "Which is a database?", options: ["React", "Express", "Node", "PostgreSQL"], solution: 3 },
];

/// Race to the finish line on a bounded track: +1 for a correct answer,
/// -1 for a wrong one, finish order pays rank bonuses, and the round ends
/// early once every active player is home.
pub struct TriviaRace {
    duration_secs: u64,
    track_length: i32,
    bonuses: Vec<i64>,
    questions: Vec<RaceQuestion>,
    positions: HashMap<String, i32>,
    finishers: Vec<String>,
}

impl TriviaRace {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            duration_secs: config.race_duration_secs,
            track_length: config.race_track_length,
            bonuses: config.race_finish_bonuses.clone(),
            questions: Vec::new(),
            positions: HashMap::new(),
            finishers: Vec::new(),
        }
    }

    fn question_views(&self) -> Vec<RaceQuestionView> {
        self.questions
            .iter()
            .map(|q| RaceQuestionView {
                text: q.text.to_string(),
                options: q.options.iter().map(|o| o.to_string()).collect(),
            })
            .collect()
    }

    fn finish_bonus(&self, rank: usize) -> i64 {
        self.bonuses
            .get(rank - 1)
            .or(self.bonuses.last())
            .copied()
            .unwrap_or(0)
    }

    fn all_active_finished(&self, core: &LobbyCore) -> bool {
        !core.active.is_empty() && core.active.iter().all(|id| self.finishers.contains(id))
    }
}

impl Minigame for TriviaRace {
    fn kind(&self) -> GameKind {
        GameKind::TriviaRace
    }

    fn duration_secs(&self) -> u64 {
        self.duration_secs
    }

    fn begin(&mut self, core: &mut LobbyCore, tx: &broadcast::Sender<LobbyEvent>) {
        core.reset_round_scores();
        self.positions = core.active.iter().map(|id| (id.clone(), 0)).collect();
        self.questions = QUESTION_BANK.to_vec();
        self.questions.shuffle(&mut rand::rng());

        core.broadcast(
            tx,
            ServerMsg::Game3Start {
                duration: self.duration_secs,
                total_steps: self.track_length,
                questions: self.question_views(),
            },
        );
    }

    fn handle_input(
        &mut self,
        core: &mut LobbyCore,
        tx: &broadcast::Sender<LobbyEvent>,
        player_id: &str,
        input: &GameInput,
    ) -> InputOutcome {
        let GameInput::RaceAnswer { question_index, answer_index } = input else {
            return InputOutcome::Continue;
        };
        // Finished players are parked; their extra inputs are no-ops.
        if self.finishers.iter().any(|id| id == player_id) {
            return InputOutcome::Continue;
        }
        let Some(question) = self.questions.get(*question_index) else {
            return InputOutcome::Continue;
        };

        let correct = question.solution == *answer_index;
        let current = self.positions.get(player_id).copied().unwrap_or(0);
        let new_pos = (current + if correct { 1 } else { -1 }).clamp(0, self.track_length);
        let moved = new_pos != current;
        self.positions.insert(player_id.to_string(), new_pos);

        core.send_to(tx, player_id, ServerMsg::AnswerResult { correct, new_pos: Some(new_pos) });

        if moved {
            if new_pos > current {
                core.touch(player_id);
            }
            core.broadcast(
                tx,
                ServerMsg::PlayerMoved { player_id: player_id.to_string(), new_pos },
            );
        }

        if new_pos >= self.track_length {
            self.finishers.push(player_id.to_string());
            let rank = self.finishers.len();
            let bonus = self.finish_bonus(rank);
            core.add_score(player_id, bonus);
            core.send_to(tx, player_id, ServerMsg::PlayerFinished { rank, bonus });

            if self.all_active_finished(core) {
                return InputOutcome::RoundComplete;
            }
        }
        InputOutcome::Continue
    }

    fn resume(&mut self, core: &mut LobbyCore, tx: &broadcast::Sender<LobbyEvent>, player_id: &str) {
        core.send_to(
            tx,
            player_id,
            ServerMsg::Game3Start {
                duration: self.duration_secs,
                total_steps: self.track_length,
                questions: self.question_views(),
            },
        );
        let new_pos = self.positions.get(player_id).copied().unwrap_or(0);
        core.send_to(
            tx,
            player_id,
            ServerMsg::PlayerMoved { player_id: player_id.to_string(), new_pos },
        );
    }

    fn current_score(&self, player_id: &str) -> Option<i64> {
        self.positions.get(player_id).copied().map(i64::from)
    }
}
