use crate::types::LeaderboardEntry;

/// Final outcome of one tournament, handed to the statistics collaborator.
#[derive(Debug, Clone)]
pub struct TournamentResult {
    pub lobby_code: String,
    pub rounds_played: u32,
    pub winner: Option<LeaderboardEntry>,
    pub standings: Vec<LeaderboardEntry>,
}

/// Narrow seam to the external profile/statistics store. The core only ever
/// pushes a finished tournament through this; persistence lives elsewhere.
pub trait StatsSink: Send + Sync {
    fn record_result(&self, result: &TournamentResult);
}

/// Default sink that just logs the outcome.
pub struct LogStats;

impl StatsSink for LogStats {
    fn record_result(&self, result: &TournamentResult) {
        match &result.winner {
            Some(winner) => tracing::info!(
                lobby = %result.lobby_code,
                rounds = result.rounds_played,
                winner = %winner.username,
                score = winner.score,
                "tournament finished"
            ),
            None => tracing::info!(
                lobby = %result.lobby_code,
                rounds = result.rounds_played,
                "tournament finished with no winner"
            ),
        }
    }
}
