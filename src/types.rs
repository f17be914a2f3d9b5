use serde::{Deserialize, Serialize};

/// Avatar shapes a player can pick for their badge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shape {
    Square,
    #[default]
    Circle,
    Triangle,
    Star,
    Hexagon,
}

/// The fixed set of minigames a tournament rotates through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameKind {
    MathQuiz,
    SpeedTyping,
    TriviaRace,
}

impl GameKind {
    pub const ALL: [GameKind; 3] = [GameKind::MathQuiz, GameKind::SpeedTyping, GameKind::TriviaRace];

    /// Wire-visible game number (0 is reserved for "no game").
    pub fn number(self) -> u8 {
        match self {
            GameKind::MathQuiz => 1,
            GameKind::SpeedTyping => 2,
            GameKind::TriviaRace => 3,
        }
    }
}

/// Public view of a player for roster broadcasts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub id: String,
    pub username: String,
    pub color: String,
    pub shape: Shape,
    pub is_ready: bool,
    pub is_host: bool,
    pub connected: bool,
}

/// Lightweight lobby info for the discovery endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LobbySummary {
    pub id: String,
    pub host_name: String,
    pub player_count: usize,
    pub capacity: usize,
    pub in_game: bool,
}

/// One ranked row of the tournament leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub id: String,
    pub username: String,
    pub score: i64,
}

/// Roster entry in a ROUND_END broadcast, with the terminal round score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundStanding {
    pub id: String,
    pub username: String,
    pub color: String,
    pub shape: Shape,
    pub score: i64,
}

/// Preview metadata announced before a round starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameInfo {
    pub name: String,
    pub description: String,
    pub duration_secs: u64,
}

/// A math question as shown to the player. The answer stays server-side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MathQuestionView {
    pub id: String,
    pub text: String,
}

/// A trivia question as shown to racers. The solution stays server-side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceQuestionView {
    pub text: String,
    pub options: Vec<String>,
}

/// Messages sent from server to clients via WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMsg {
    LobbyJoined {
        summary: LobbySummary,
        you: PlayerSnapshot,
    },
    RosterUpdate {
        players: Vec<PlayerSnapshot>,
    },
    GamePreview {
        game_number: u8,
        game_info: GameInfo,
        round_number: u32,
    },
    #[serde(rename = "GAME_1_START")]
    Game1Start {
        duration: u64,
    },
    NewQuestion {
        question: MathQuestionView,
    },
    #[serde(rename = "GAME_2_START")]
    Game2Start {
        duration: u64,
    },
    NewWords {
        words: Vec<String>,
    },
    #[serde(rename = "GAME_3_START")]
    Game3Start {
        duration: u64,
        total_steps: i32,
        questions: Vec<RaceQuestionView>,
    },
    AnswerResult {
        correct: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        new_pos: Option<i32>,
    },
    WordResult {
        correct: bool,
    },
    ScoreUpdate {
        leaderboard: Vec<LeaderboardEntry>,
    },
    PlayerMoved {
        player_id: String,
        new_pos: i32,
    },
    PlayerFinished {
        rank: usize,
        bonus: i64,
    },
    RoundEnd {
        advancing: Vec<RoundStanding>,
        eliminated: Vec<RoundStanding>,
        next_game: Option<u8>,
    },
    TournamentWinner {
        winner: Option<PlayerSnapshot>,
    },
    Error {
        msg: String,
    },
}

/// Messages sent from clients to server via WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMsg {
    CreateLobby {
        capacity: usize,
    },
    JoinLobby {
        lobby_id: String,
    },
    UpdateProfile {
        #[serde(default)]
        color: Option<String>,
        #[serde(default)]
        shape: Option<Shape>,
        #[serde(default)]
        username: Option<String>,
    },
    ToggleReady,
    LeaveLobby,
    StartGame {
        #[serde(default)]
        test_mode: bool,
    },
    SubmitAnswer {
        answer: serde_json::Value,
    },
    SubmitWord {
        current_word: String,
        typed_word: String,
    },
    SubmitRaceAnswer {
        question_index: usize,
        answer_index: usize,
    },
}
