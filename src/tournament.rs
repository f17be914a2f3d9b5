use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{broadcast, mpsc};

use crate::games::{self, GameInput, InputOutcome, Minigame};
use crate::lobby::{LobbyCommand, LobbyCore, LobbyEvent, LobbyState, Phase, TimerPhase};
use crate::stats::{StatsSink, TournamentResult};
use crate::types::*;

/// Channels and collaborators the orchestrator needs while handling one
/// command inside the lobby task.
pub struct RoundCtx<'a> {
    pub tx: &'a broadcast::Sender<LobbyEvent>,
    pub cmd_tx: &'a mpsc::Sender<LobbyCommand>,
    pub stats: &'a Arc<dyn StatsSink>,
}

/// Spawns a sleeper that reports back into the lobby's own command queue.
/// The epoch makes the wakeup a no-op if the round has moved on; a timer
/// outliving its lobby sends into a closed channel and disappears.
fn schedule(ctx: &RoundCtx<'_>, delay_secs: u64, epoch: u64, phase: TimerPhase) {
    let cmd_tx = ctx.cmd_tx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(delay_secs)).await;
        let _ = cmd_tx.send(LobbyCommand::Timer { epoch, phase }).await;
    });
}

/// Weighted anti-repeat choice over the minigame set.
///
/// Games in the last two history entries are excluded; if that empties the
/// pool, only the most recent is excluded; if even that fails, the full set
/// is eligible. Unplayed-ever games weigh 2.0, games absent from the last
/// three rounds 1.5, everything else 1.0.
pub fn select_next_game(history: &[GameKind], rng: &mut impl Rng) -> GameKind {
    let recent: Vec<GameKind> = history.iter().rev().take(2).copied().collect();
    let mut candidates: Vec<GameKind> = GameKind::ALL
        .iter()
        .copied()
        .filter(|k| !recent.contains(k))
        .collect();

    if candidates.is_empty() {
        let last = history.last().copied();
        candidates = GameKind::ALL.iter().copied().filter(|k| Some(*k) != last).collect();
    }
    if candidates.is_empty() {
        candidates = GameKind::ALL.to_vec();
    }

    let weights: Vec<f64> = candidates
        .iter()
        .map(|k| {
            if !history.contains(k) {
                2.0
            } else if history.len() >= 3 && !history[history.len() - 3..].contains(k) {
                1.5
            } else {
                1.0
            }
        })
        .collect();

    let total: f64 = weights.iter().sum();
    let mut roll = rng.random_range(0.0..total);
    for (kind, weight) in candidates.iter().zip(&weights) {
        if roll < *weight {
            return *kind;
        }
        roll -= weight;
    }
    candidates.last().copied().unwrap_or(GameKind::MathQuiz)
}

/// The deterministic ranked view of active + spectator scores.
///
/// The score source is the running minigame's `current_score` override when
/// it has one (progress races rank by position), otherwise the accumulated
/// round score. Sort: score descending, earlier score-clock tick first on
/// ties, participant id as the final total-order fallback. Ids without a
/// surviving participant record are filtered here.
pub fn leaderboard(core: &LobbyCore, game: Option<&dyn Minigame>) -> Vec<LeaderboardEntry> {
    let mut rows: Vec<(LeaderboardEntry, u64)> = core
        .active
        .iter()
        .chain(core.spectators.iter())
        .filter_map(|id| {
            let p = core.participants.get(id)?;
            let score = game.and_then(|g| g.current_score(id)).unwrap_or(p.score);
            let tick = p.last_score_update.unwrap_or(u64::MAX);
            Some((
                LeaderboardEntry {
                    id: id.clone(),
                    username: p.username.clone(),
                    score,
                },
                tick,
            ))
        })
        .collect();

    rows.sort_by(|(a, ta), (b, tb)| b.score.cmp(&a.score).then(ta.cmp(tb)).then(a.id.cmp(&b.id)));
    rows.into_iter().map(|(entry, _)| entry).collect()
}

/// Splits the active players into advancing and eliminated halves and
/// applies the split. `ranked` must be the leaderboard order restricted to
/// active players. The orchestrator calls this exactly once per round.
pub fn advance_players(core: &mut LobbyCore, ranked: &[LeaderboardEntry]) -> (Vec<String>, Vec<String>) {
    if core.active.len() <= 1 {
        return (core.active.clone(), Vec::new());
    }

    let cut = core.active.len().div_ceil(2);
    let advancing: Vec<String> = ranked.iter().take(cut).map(|e| e.id.clone()).collect();
    let eliminated: Vec<String> = ranked.iter().skip(cut).map(|e| e.id.clone()).collect();

    core.active = advancing.clone();
    core.spectators.extend(eliminated.iter().cloned());
    (advancing, eliminated)
}

/// Resets tournament bookkeeping and kicks off round one.
pub fn begin_tournament(state: &mut LobbyState, ctx: &RoundCtx<'_>) {
    let core = &mut state.core;
    core.active = core
        .seating
        .iter()
        .filter(|id| {
            core.participants
                .get(*id)
                .is_some_and(|p| p.conn_id.is_some())
        })
        .cloned()
        .collect();
    core.spectators.clear();
    core.game_history.clear();
    core.round_number = 0;
    core.score_clock = 0;
    core.reset_round_scores();

    let first = choose_next(core);
    core.pending_game = Some(first);
    queue_preview(state, ctx);
}

/// Selects a game and logs it in the history (unconditionally, per the
/// anti-repeat contract).
fn choose_next(core: &mut LobbyCore) -> GameKind {
    let kind = select_next_game(&core.game_history, &mut rand::rng());
    core.game_history.push(kind);
    kind
}

/// Announces the next game and schedules the round start.
fn queue_preview(state: &mut LobbyState, ctx: &RoundCtx<'_>) {
    let core = &mut state.core;
    let kind = match core.pending_game.take() {
        Some(kind) => kind,
        None => choose_next(core),
    };

    core.round_number += 1;
    core.phase = Phase::Preview;
    core.round_epoch += 1;
    core.current_game = Some(kind);

    tracing::info!(code = %core.code, round = core.round_number, game = kind.number(), "round preview");

    core.broadcast(
        ctx.tx,
        ServerMsg::GamePreview {
            game_number: kind.number(),
            game_info: games::game_info(kind, &core.config),
            round_number: core.round_number,
        },
    );
    schedule(ctx, core.config.preview_delay_secs, core.round_epoch, TimerPhase::RunGame);
}

/// Constructs the minigame, lets it broadcast its start payload and starts
/// the round duration timer.
fn start_round(state: &mut LobbyState, ctx: &RoundCtx<'_>) {
    let core = &mut state.core;
    let Some(kind) = core.current_game else {
        return;
    };

    core.phase = Phase::Running;
    core.round_epoch += 1;

    let mut game = games::create(kind, &core.config);
    game.begin(core, ctx.tx);
    schedule(ctx, game.duration_secs(), core.round_epoch, TimerPhase::RoundOver);
    state.game = Some(game);
}

/// Timer dispatch. Stale epochs and phase mismatches fall through silently;
/// that is what makes round completion exactly-once.
pub fn on_timer(state: &mut LobbyState, ctx: &RoundCtx<'_>, epoch: u64, phase: TimerPhase) {
    if epoch != state.core.round_epoch {
        return;
    }
    match phase {
        TimerPhase::RunGame if state.core.phase == Phase::Preview => start_round(state, ctx),
        TimerPhase::RoundOver if state.core.phase == Phase::Running => round_over(state, ctx),
        TimerPhase::Preview if state.core.phase == Phase::RoundEnd => queue_preview(state, ctx),
        _ => {}
    }
}

/// Routes one player's action into the running minigame. Input outside a
/// running round, from spectators or from unknown connections is dropped.
pub fn on_game_input(state: &mut LobbyState, ctx: &RoundCtx<'_>, conn_id: &str, input: &GameInput) {
    if state.core.phase != Phase::Running {
        return;
    }
    let Some(pid) = state.core.participant_id_by_conn(conn_id) else {
        return;
    };
    if !state.core.is_active(&pid) {
        return;
    }
    let Some(mut game) = state.game.take() else {
        return;
    };

    let outcome = game.handle_input(&mut state.core, ctx.tx, &pid, input);
    state.game = Some(game);

    if outcome == InputOutcome::RoundComplete {
        round_over(state, ctx);
    }
}

/// Scores the round, advances/eliminates, and either queues the next
/// preview or finishes the tournament.
fn round_over(state: &mut LobbyState, ctx: &RoundCtx<'_>) {
    let game = state.game.take();
    let core = &mut state.core;

    core.phase = Phase::RoundEnd;
    core.round_epoch += 1;
    core.current_game = None;

    let board = leaderboard(core, game.as_deref());
    let scores: HashMap<String, i64> = board.iter().map(|e| (e.id.clone(), e.score)).collect();
    let ranked_active: Vec<LeaderboardEntry> = board
        .iter()
        .filter(|e| core.is_active(&e.id))
        .cloned()
        .collect();

    let (advancing, eliminated) = advance_players(core, &ranked_active);

    let finished = core.round_number >= core.config.elimination_rounds || core.active.len() <= 1;
    let next_game = if finished { None } else { Some(choose_next(core)) };
    core.pending_game = next_game;

    tracing::info!(
        code = %core.code,
        round = core.round_number,
        advancing = advancing.len(),
        eliminated = eliminated.len(),
        "round over"
    );

    core.broadcast(
        ctx.tx,
        ServerMsg::RoundEnd {
            advancing: standings(core, &advancing, &scores),
            eliminated: standings(core, &eliminated, &scores),
            next_game: next_game.map(GameKind::number),
        },
    );

    if finished {
        // Ready flags do not carry over to a rematch.
        for p in core.participants.values_mut() {
            p.is_ready = false;
        }
        let winner = board
            .first()
            .and_then(|e| core.participants.get(&e.id))
            .map(|p| p.snapshot());
        core.broadcast(ctx.tx, ServerMsg::TournamentWinner { winner });
        core.phase = Phase::Finished;
        core.round_epoch += 1;
        core.broadcast_roster(ctx.tx);

        ctx.stats.record_result(&TournamentResult {
            lobby_code: core.code.clone(),
            rounds_played: core.round_number,
            winner: board.first().cloned(),
            standings: board,
        });
    } else {
        schedule(ctx, core.config.intermission_secs, core.round_epoch, TimerPhase::Preview);
    }
}

fn standings(core: &LobbyCore, ids: &[String], scores: &HashMap<String, i64>) -> Vec<RoundStanding> {
    ids.iter()
        .filter_map(|id| {
            let p = core.participants.get(id)?;
            Some(RoundStanding {
                id: id.clone(),
                username: p.username.clone(),
                color: p.color.clone(),
                shape: p.shape,
                score: scores.get(id).copied().unwrap_or(p.score),
            })
        })
        .collect()
}
