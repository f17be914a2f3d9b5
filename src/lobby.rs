use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::games::GameInput;
use crate::registry::Registry;
use crate::stats::StatsSink;
use crate::tournament::{self, RoundCtx};
use crate::types::*;

const DEFAULT_COLOR: &str = "#4a148c";

/// Commands the WebSocket layer sends to a lobby task.
#[derive(Debug)]
pub enum LobbyCommand {
    Join {
        conn_id: String,
        username: String,
        /// Answered once the join is ruled on, so the transport registers
        /// the socket as a member only on acceptance.
        reply: Option<oneshot::Sender<bool>>,
    },
    UpdateProfile {
        conn_id: String,
        color: Option<String>,
        shape: Option<Shape>,
        username: Option<String>,
    },
    ToggleReady {
        conn_id: String,
    },
    Leave {
        conn_id: String,
    },
    Disconnect {
        conn_id: String,
    },
    StartGame {
        conn_id: String,
        test_mode: bool,
    },
    GameInput {
        conn_id: String,
        input: GameInput,
    },
    /// Self-sent by scheduled timers; stale epochs are dropped.
    Timer {
        epoch: u64,
        phase: TimerPhase,
    },
}

/// Which phase transition a timer is due to trigger.
#[derive(Debug, Clone, Copy)]
pub enum TimerPhase {
    RunGame,
    RoundOver,
    Preview,
}

/// Events fanned out from a lobby task to its WebSocket connections.
#[derive(Debug, Clone)]
pub enum LobbyEvent {
    /// Send a message to a specific connection.
    SendTo { conn_id: String, msg: ServerMsg },
    /// Broadcast a message to all connections in the lobby.
    Broadcast { msg: ServerMsg },
    /// Broadcast a message to all except one connection.
    BroadcastExcept { exclude: String, msg: ServerMsg },
}

/// Tournament state machine phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Lobby,
    Preview,
    Running,
    RoundEnd,
    Finished,
}

/// One seat in the lobby. The transport connection id is a swappable
/// attribute, so a player who drops and rejoins under the same username
/// keeps score, standing and tie-break clock without any map migration.
#[derive(Debug, Clone)]
pub struct Participant {
    pub id: String,
    pub username: String,
    pub conn_id: Option<String>,
    pub color: String,
    pub shape: Shape,
    pub is_ready: bool,
    pub is_host: bool,
    pub score: i64,
    pub last_score_update: Option<u64>,
}

impl Participant {
    pub fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            id: self.id.clone(),
            username: self.username.clone(),
            color: self.color.clone(),
            shape: self.shape,
            is_ready: self.is_ready,
            is_host: self.is_host,
            connected: self.conn_id.is_some(),
        }
    }
}

/// Result of an add_player attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined(String),
    Reconnected(String),
    Full,
    NameTaken,
}

/// Everything a lobby owns except the in-flight minigame. Minigames and the
/// round orchestrator mutate this through exclusive access inside the lobby
/// task; there is no other path to it.
pub struct LobbyCore {
    pub code: String,
    pub capacity: usize,
    pub host_id: Option<String>,
    pub config: Arc<ServerConfig>,
    pub participants: HashMap<String, Participant>,
    pub by_username: HashMap<String, String>,
    /// Participant ids in join order; drives roster display and seeds `active`.
    pub seating: Vec<String>,
    /// Ids still competing. Only this population is scored and advanced.
    pub active: Vec<String>,
    /// Eliminated ids, append-only. Never re-enters `active`.
    pub spectators: Vec<String>,
    pub game_history: Vec<GameKind>,
    pub round_number: u32,
    pub phase: Phase,
    /// Bumped on every phase transition; timers carry the epoch they were
    /// scheduled under and are ignored once it moves on.
    pub round_epoch: u64,
    /// Monotonic counter standing in for score-update timestamps. Earlier
    /// tick wins ties, and it cannot collide the way wall clocks can.
    pub score_clock: u64,
    /// Game already chosen for the next round (announced in ROUND_END).
    pub pending_game: Option<GameKind>,
    pub current_game: Option<GameKind>,
}

impl LobbyCore {
    pub fn new(code: String, capacity: usize, config: Arc<ServerConfig>) -> Self {
        Self {
            code,
            capacity,
            host_id: None,
            config,
            participants: HashMap::new(),
            by_username: HashMap::new(),
            seating: Vec::new(),
            active: Vec::new(),
            spectators: Vec::new(),
            game_history: Vec::new(),
            round_number: 0,
            phase: Phase::Lobby,
            round_epoch: 0,
            score_clock: 0,
            pending_game: None,
            current_game: None,
        }
    }

    /// Adds a player, or reconnects them if their username already holds a
    /// seat with no live connection. Reconnection bypasses the capacity
    /// check: the seat was never vacated.
    pub fn add_player(&mut self, conn_id: &str, username: &str) -> JoinOutcome {
        if let Some(pid) = self.by_username.get(username).cloned() {
            if let Some(p) = self.participants.get_mut(&pid) {
                if p.conn_id.is_some() {
                    return JoinOutcome::NameTaken;
                }
                p.conn_id = Some(conn_id.to_string());
                return JoinOutcome::Reconnected(pid);
            }
        }

        if self.participants.len() >= self.capacity {
            return JoinOutcome::Full;
        }

        let id = Uuid::new_v4().to_string();
        let is_host = self.participants.is_empty();
        let participant = Participant {
            id: id.clone(),
            username: username.to_string(),
            conn_id: Some(conn_id.to_string()),
            color: DEFAULT_COLOR.to_string(),
            shape: Shape::default(),
            is_ready: false,
            is_host,
            score: 0,
            last_score_update: None,
        };
        self.participants.insert(id.clone(), participant);
        self.by_username.insert(username.to_string(), id.clone());
        self.seating.push(id.clone());
        if is_host {
            self.host_id = Some(id.clone());
        }
        JoinOutcome::Joined(id)
    }

    /// Clears the connection of whoever is behind `conn_id`, keeping their
    /// tournament bookkeeping for a later reconnect. Returns the participant id.
    pub fn mark_disconnected(&mut self, conn_id: &str) -> Option<String> {
        let pid = self.participant_id_by_conn(conn_id)?;
        if let Some(p) = self.participants.get_mut(&pid) {
            p.conn_id = None;
        }
        Some(pid)
    }

    /// Removes a participant from the roster and all tournament collections.
    pub fn purge_player(&mut self, player_id: &str) {
        if let Some(p) = self.participants.remove(player_id) {
            self.by_username.remove(&p.username);
        }
        self.seating.retain(|id| id != player_id);
        self.active.retain(|id| id != player_id);
        self.spectators.retain(|id| id != player_id);
    }

    /// A lobby with no live connection left is dead and gets destroyed.
    pub fn is_empty(&self) -> bool {
        self.participants.values().all(|p| p.conn_id.is_none())
    }

    pub fn connected_count(&self) -> usize {
        self.participants.values().filter(|p| p.conn_id.is_some()).count()
    }

    pub fn participant_id_by_conn(&self, conn_id: &str) -> Option<String> {
        self.participants
            .values()
            .find(|p| p.conn_id.as_deref() == Some(conn_id))
            .map(|p| p.id.clone())
    }

    pub fn is_active(&self, player_id: &str) -> bool {
        self.active.iter().any(|id| id == player_id)
    }

    /// +1 round score with a fresh tie-break tick.
    pub fn award_point(&mut self, player_id: &str) {
        self.add_score(player_id, 1);
    }

    pub fn add_score(&mut self, player_id: &str, delta: i64) {
        self.score_clock += 1;
        let tick = self.score_clock;
        if let Some(p) = self.participants.get_mut(player_id) {
            p.score += delta;
            p.last_score_update = Some(tick);
        }
    }

    /// Advances the tie-break clock for a player without changing the score
    /// (progress-race games rank by position, not points).
    pub fn touch(&mut self, player_id: &str) {
        self.score_clock += 1;
        let tick = self.score_clock;
        if let Some(p) = self.participants.get_mut(player_id) {
            p.last_score_update = Some(tick);
        }
    }

    /// Zeroes the round scores of the currently active players. Each
    /// minigame calls this when its round starts.
    pub fn reset_round_scores(&mut self) {
        let ids: Vec<String> = self.active.clone();
        for id in ids {
            if let Some(p) = self.participants.get_mut(&id) {
                p.score = 0;
                p.last_score_update = None;
            }
        }
    }

    pub fn roster_snapshot(&self) -> Vec<PlayerSnapshot> {
        self.seating
            .iter()
            .filter_map(|id| self.participants.get(id))
            .map(Participant::snapshot)
            .collect()
    }

    pub fn summary(&self) -> LobbySummary {
        let host_name = self
            .host_id
            .as_ref()
            .and_then(|id| self.participants.get(id))
            .map(|p| p.username.clone())
            .unwrap_or_else(|| "Unknown".to_string());
        LobbySummary {
            id: self.code.clone(),
            host_name,
            player_count: self.connected_count(),
            capacity: self.capacity,
            in_game: !matches!(self.phase, Phase::Lobby | Phase::Finished),
        }
    }

    pub fn send_to(&self, tx: &broadcast::Sender<LobbyEvent>, player_id: &str, msg: ServerMsg) {
        if let Some(conn_id) = self.participants.get(player_id).and_then(|p| p.conn_id.clone()) {
            let _ = tx.send(LobbyEvent::SendTo { conn_id, msg });
        }
    }

    pub fn broadcast(&self, tx: &broadcast::Sender<LobbyEvent>, msg: ServerMsg) {
        let _ = tx.send(LobbyEvent::Broadcast { msg });
    }

    pub fn broadcast_roster(&self, tx: &broadcast::Sender<LobbyEvent>) {
        self.broadcast(tx, ServerMsg::RosterUpdate { players: self.roster_snapshot() });
    }
}

/// A lobby plus its in-flight minigame, if a round is running. Split from
/// LobbyCore so games can borrow the core mutably while owned by the state.
pub struct LobbyState {
    pub core: LobbyCore,
    pub game: Option<Box<dyn crate::games::Minigame>>,
}

#[derive(Clone)]
pub struct LobbyHandle {
    pub code: String,
    pub cmd_tx: mpsc::Sender<LobbyCommand>,
    pub event_tx: broadcast::Sender<LobbyEvent>,
}

/// Create a new lobby and spawn its task. Returns the lobby handle.
pub fn spawn_lobby(
    registry: Arc<Registry>,
    config: Arc<ServerConfig>,
    stats: Arc<dyn StatsSink>,
    requested_capacity: usize,
) -> LobbyHandle {
    let code = registry.new_lobby_code();
    let capacity = config.clamp_capacity(requested_capacity);

    let (cmd_tx, cmd_rx) = mpsc::channel(256);
    let (event_tx, _) = broadcast::channel(256);

    let handle = LobbyHandle {
        code: code.clone(),
        cmd_tx: cmd_tx.clone(),
        event_tx: event_tx.clone(),
    };
    registry.lobbies.insert(code.clone(), handle.clone());

    let state = LobbyState {
        core: LobbyCore::new(code.clone(), capacity, config),
        game: None,
    };

    tokio::spawn(lobby_task(state, cmd_rx, cmd_tx, event_tx, registry, stats));

    tracing::info!(code = %code, capacity, "lobby created");

    handle
}

async fn lobby_task(
    mut state: LobbyState,
    mut cmd_rx: mpsc::Receiver<LobbyCommand>,
    cmd_tx: mpsc::Sender<LobbyCommand>,
    event_tx: broadcast::Sender<LobbyEvent>,
    registry: Arc<Registry>,
    stats: Arc<dyn StatsSink>,
) {
    let ctx = RoundCtx {
        tx: &event_tx,
        cmd_tx: &cmd_tx,
        stats: &stats,
    };

    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            LobbyCommand::Join { conn_id, username, reply } => {
                handle_join(&mut state, &event_tx, &conn_id, &username, reply);
            }
            LobbyCommand::UpdateProfile { conn_id, color, shape, username } => {
                handle_update_profile(&mut state.core, &event_tx, &conn_id, color, shape, username);
            }
            LobbyCommand::ToggleReady { conn_id } => {
                handle_toggle_ready(&mut state.core, &event_tx, &conn_id);
            }
            LobbyCommand::Leave { conn_id } => {
                handle_leave(&mut state.core, &event_tx, &conn_id);
            }
            LobbyCommand::Disconnect { conn_id } => {
                handle_disconnect(&mut state.core, &event_tx, &conn_id);
            }
            LobbyCommand::StartGame { conn_id, test_mode } => {
                handle_start(&mut state, &ctx, &conn_id, test_mode);
            }
            LobbyCommand::GameInput { conn_id, input } => {
                tournament::on_game_input(&mut state, &ctx, &conn_id, &input);
            }
            LobbyCommand::Timer { epoch, phase } => {
                tournament::on_timer(&mut state, &ctx, epoch, phase);
            }
        }

        if state.core.is_empty() {
            registry.remove_lobby(&state.core.code);
            tracing::info!(code = %state.core.code, "lobby empty, shutting down");
            return;
        }
        registry.publish_summary(state.core.summary());
    }

    // All handles dropped - cleanup
    registry.remove_lobby(&state.core.code);
    tracing::info!(code = %state.core.code, "lobby task ended");
}

fn handle_join(
    state: &mut LobbyState,
    tx: &broadcast::Sender<LobbyEvent>,
    conn_id: &str,
    username: &str,
    reply: Option<oneshot::Sender<bool>>,
) {
    let name = username.trim();
    let accepted = if name.is_empty() || name.len() > 20 {
        let _ = tx.send(LobbyEvent::SendTo {
            conn_id: conn_id.to_string(),
            msg: ServerMsg::Error { msg: "Invalid username".to_string() },
        });
        false
    } else {
        match state.core.add_player(conn_id, name) {
            JoinOutcome::Full => {
                let _ = tx.send(LobbyEvent::SendTo {
                    conn_id: conn_id.to_string(),
                    msg: ServerMsg::Error { msg: "Lobby is full".to_string() },
                });
                false
            }
            JoinOutcome::NameTaken => {
                let _ = tx.send(LobbyEvent::SendTo {
                    conn_id: conn_id.to_string(),
                    msg: ServerMsg::Error { msg: "Player already connected".to_string() },
                });
                false
            }
            JoinOutcome::Joined(id) => {
                let core = &mut state.core;
                tracing::info!(code = %core.code, player = %name, "player joined");
                let you = core.participants[&id].snapshot();
                core.send_to(tx, &id, ServerMsg::LobbyJoined { summary: core.summary(), you });
                core.broadcast_roster(tx);
                true
            }
            JoinOutcome::Reconnected(id) => {
                let core = &mut state.core;
                tracing::info!(code = %core.code, player = %name, "player reconnected");
                let you = core.participants[&id].snapshot();
                core.send_to(tx, &id, ServerMsg::LobbyJoined { summary: core.summary(), you });
                core.broadcast_roster(tx);
                // Mid-tournament rejoiners get the current standings straight away.
                if !matches!(core.phase, Phase::Lobby | Phase::Finished) {
                    let board = tournament::leaderboard(core, state.game.as_deref());
                    core.send_to(tx, &id, ServerMsg::ScoreUpdate { leaderboard: board });
                }
                // A rejoiner mid-round also needs the round payload back.
                if state.core.phase == Phase::Running && state.core.is_active(&id) {
                    if let Some(mut game) = state.game.take() {
                        game.resume(&mut state.core, tx, &id);
                        state.game = Some(game);
                    }
                }
                true
            }
        }
    };

    if let Some(reply) = reply {
        let _ = reply.send(accepted);
    }
}

fn handle_update_profile(
    core: &mut LobbyCore,
    tx: &broadcast::Sender<LobbyEvent>,
    conn_id: &str,
    color: Option<String>,
    shape: Option<Shape>,
    username: Option<String>,
) {
    let Some(pid) = core.participant_id_by_conn(conn_id) else {
        return;
    };

    if let Some(new_name) = username {
        let new_name = new_name.trim().to_string();
        let current = core.participants[&pid].username.clone();
        if !new_name.is_empty() && new_name != current {
            if core.by_username.contains_key(&new_name) {
                core.send_to(tx, &pid, ServerMsg::Error { msg: "Username already taken".to_string() });
                return;
            }
            core.by_username.remove(&current);
            core.by_username.insert(new_name.clone(), pid.clone());
            if let Some(p) = core.participants.get_mut(&pid) {
                p.username = new_name;
            }
        }
    }

    if let Some(p) = core.participants.get_mut(&pid) {
        if let Some(color) = color {
            p.color = color;
        }
        if let Some(shape) = shape {
            p.shape = shape;
        }
    }
    core.broadcast_roster(tx);
}

fn handle_toggle_ready(core: &mut LobbyCore, tx: &broadcast::Sender<LobbyEvent>, conn_id: &str) {
    let Some(pid) = core.participant_id_by_conn(conn_id) else {
        return;
    };
    if let Some(p) = core.participants.get_mut(&pid) {
        p.is_ready = !p.is_ready;
    }
    core.broadcast_roster(tx);
}

fn handle_leave(core: &mut LobbyCore, tx: &broadcast::Sender<LobbyEvent>, conn_id: &str) {
    let Some(pid) = core.participant_id_by_conn(conn_id) else {
        return;
    };
    tracing::info!(code = %core.code, "player left");
    core.purge_player(&pid);
    let _ = tx.send(LobbyEvent::BroadcastExcept {
        exclude: conn_id.to_string(),
        msg: ServerMsg::RosterUpdate { players: core.roster_snapshot() },
    });
}

fn handle_disconnect(core: &mut LobbyCore, tx: &broadcast::Sender<LobbyEvent>, conn_id: &str) {
    // Before the tournament there is nothing to resume; drop the seat.
    // Mid-tournament the record stays so the player can rejoin by username.
    if matches!(core.phase, Phase::Lobby | Phase::Finished) {
        if let Some(pid) = core.participant_id_by_conn(conn_id) {
            core.purge_player(&pid);
            core.broadcast_roster(tx);
        }
    } else if core.mark_disconnected(conn_id).is_some() {
        core.broadcast_roster(tx);
    }
}

fn handle_start(state: &mut LobbyState, ctx: &RoundCtx<'_>, conn_id: &str, test_mode: bool) {
    let core = &mut state.core;
    let Some(pid) = core.participant_id_by_conn(conn_id) else {
        return;
    };

    if core.host_id.as_deref() != Some(pid.as_str()) {
        core.send_to(ctx.tx, &pid, ServerMsg::Error { msg: "Only the host can start the game".to_string() });
        return;
    }
    if !matches!(core.phase, Phase::Lobby | Phase::Finished) {
        core.send_to(ctx.tx, &pid, ServerMsg::Error { msg: "Tournament already in progress".to_string() });
        return;
    }

    let bypass = test_mode && core.config.allow_test_mode;
    if test_mode && !core.config.allow_test_mode {
        tracing::warn!(code = %core.code, "test_mode requested but not enabled");
    }

    if !bypass {
        if core.connected_count() < 2 {
            core.send_to(ctx.tx, &pid, ServerMsg::Error { msg: "Need at least 2 players".to_string() });
            return;
        }
        let all_ready = core
            .participants
            .values()
            .filter(|p| p.conn_id.is_some())
            .all(|p| p.is_ready);
        if !all_ready {
            core.send_to(ctx.tx, &pid, ServerMsg::Error { msg: "All players must be ready".to_string() });
            return;
        }
    }

    tracing::info!(code = %core.code, "tournament starting");
    tournament::begin_tournament(state, ctx);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;

    fn core_with_capacity(capacity: usize) -> LobbyCore {
        LobbyCore::new("TEST01".to_string(), capacity, Arc::new(ServerConfig::default()))
    }

    #[test]
    fn joins_past_capacity_fail_without_mutation() {
        let mut core = core_with_capacity(5);
        for i in 0..5 {
            let outcome = core.add_player(&format!("conn-{i}"), &format!("player{i}"));
            assert!(matches!(outcome, JoinOutcome::Joined(_)));
        }
        for i in 5..9 {
            let outcome = core.add_player(&format!("conn-{i}"), &format!("player{i}"));
            assert_eq!(outcome, JoinOutcome::Full);
            assert_eq!(core.participants.len(), 5);
        }
    }

    #[test]
    fn first_join_becomes_host() {
        let mut core = core_with_capacity(5);
        let JoinOutcome::Joined(host) = core.add_player("conn-a", "alice") else {
            panic!("expected join");
        };
        core.add_player("conn-b", "bob");
        assert_eq!(core.host_id.as_deref(), Some(host.as_str()));
        assert!(core.participants[&host].is_host);
    }

    #[test]
    fn duplicate_username_on_live_connection_is_rejected() {
        let mut core = core_with_capacity(5);
        core.add_player("conn-a", "alice");
        assert_eq!(core.add_player("conn-b", "alice"), JoinOutcome::NameTaken);
    }

    #[test]
    fn reconnect_preserves_tournament_state() {
        let mut core = core_with_capacity(5);
        let JoinOutcome::Joined(pid) = core.add_player("conn-a", "alice") else {
            panic!("expected join");
        };
        core.active = vec![pid.clone()];
        core.add_score(&pid, 7);
        let tick = core.participants[&pid].last_score_update;

        core.phase = Phase::Running;
        assert_eq!(core.mark_disconnected("conn-a"), Some(pid.clone()));
        assert!(core.participants[&pid].conn_id.is_none());
        assert!(core.is_active(&pid));

        let outcome = core.add_player("conn-b", "alice");
        assert_eq!(outcome, JoinOutcome::Reconnected(pid.clone()));
        let p = &core.participants[&pid];
        assert_eq!(p.conn_id.as_deref(), Some("conn-b"));
        assert_eq!(p.score, 7);
        assert_eq!(p.last_score_update, tick);
        assert!(core.is_active(&pid));
    }

    #[test]
    fn reconnect_bypasses_capacity() {
        let mut core = core_with_capacity(5);
        for i in 0..5 {
            core.add_player(&format!("conn-{i}"), &format!("player{i}"));
        }
        let pid = core.participant_id_by_conn("conn-0").unwrap();
        core.phase = Phase::Running;
        core.mark_disconnected("conn-0");
        assert_eq!(core.add_player("conn-9", "player0"), JoinOutcome::Reconnected(pid));
    }

    #[test]
    fn lobby_is_empty_only_without_live_connections() {
        let mut core = core_with_capacity(5);
        assert!(core.is_empty());
        core.add_player("conn-a", "alice");
        core.add_player("conn-b", "bob");
        assert!(!core.is_empty());

        core.phase = Phase::Running;
        core.mark_disconnected("conn-a");
        assert!(!core.is_empty());
        core.mark_disconnected("conn-b");
        assert!(core.is_empty());
    }

    #[test]
    fn purge_removes_every_trace() {
        let mut core = core_with_capacity(5);
        let JoinOutcome::Joined(pid) = core.add_player("conn-a", "alice") else {
            panic!("expected join");
        };
        core.active.push(pid.clone());
        core.purge_player(&pid);
        assert!(core.participants.is_empty());
        assert!(core.by_username.is_empty());
        assert!(core.seating.is_empty());
        assert!(core.active.is_empty());
    }

    #[test]
    fn join_reply_reports_the_decision() {
        let mut state = LobbyState {
            core: LobbyCore::new("TEST01".to_string(), 1, Arc::new(ServerConfig::default())),
            game: None,
        };
        let (tx, _rx) = broadcast::channel(64);

        let (reply_tx, mut reply_rx) = oneshot::channel();
        handle_join(&mut state, &tx, "conn-a", "alice", Some(reply_tx));
        assert!(matches!(reply_rx.try_recv(), Ok(true)));

        // Full lobby: refused, and the roster is untouched.
        let (reply_tx, mut reply_rx) = oneshot::channel();
        handle_join(&mut state, &tx, "conn-b", "bob", Some(reply_tx));
        assert!(matches!(reply_rx.try_recv(), Ok(false)));
        assert_eq!(state.core.participants.len(), 1);

        // Same name on a live connection: also refused.
        let (reply_tx, mut reply_rx) = oneshot::channel();
        handle_join(&mut state, &tx, "conn-c", "alice", Some(reply_tx));
        assert!(matches!(reply_rx.try_recv(), Ok(false)));
    }

    #[test]
    fn midround_reconnect_gets_the_round_payload_back() {
        let config = Arc::new(ServerConfig::default());
        let mut core = LobbyCore::new("TEST01".to_string(), 5, config.clone());
        let JoinOutcome::Joined(pid) = core.add_player("conn-a", "alice") else {
            panic!("expected join");
        };
        core.active = vec![pid.clone()];
        core.phase = Phase::Running;

        let (tx, mut rx) = broadcast::channel(64);
        let mut game = crate::games::create(GameKind::MathQuiz, &config);
        game.begin(&mut core, &tx);
        core.mark_disconnected("conn-a");
        while rx.try_recv().is_ok() {}

        let mut state = LobbyState { core, game: Some(game) };
        handle_join(&mut state, &tx, "conn-b", "alice", None);

        let mut saw_question = false;
        let mut saw_standings = false;
        while let Ok(event) = rx.try_recv() {
            if let LobbyEvent::SendTo { conn_id, msg } = event {
                assert_eq!(conn_id, "conn-b");
                match msg {
                    ServerMsg::NewQuestion { .. } => saw_question = true,
                    ServerMsg::ScoreUpdate { .. } => saw_standings = true,
                    _ => {}
                }
            }
        }
        assert!(saw_question, "expected the question to be resent");
        assert!(saw_standings, "expected the standings to be resent");
    }

    #[test]
    fn roster_keeps_join_order() {
        let mut core = core_with_capacity(5);
        core.add_player("conn-a", "alice");
        core.add_player("conn-b", "bob");
        core.add_player("conn-c", "carol");
        let names: Vec<String> = core.roster_snapshot().into_iter().map(|p| p.username).collect();
        assert_eq!(names, vec!["alice", "bob", "carol"]);
    }
}
