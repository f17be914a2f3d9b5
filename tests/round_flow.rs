//! End-to-end tournament flow driven through a lobby task's command queue.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, oneshot};
use tokio_test::assert_ok;

use mayhem_server::config::ServerConfig;
use mayhem_server::lobby::{self, LobbyCommand, LobbyEvent};
use mayhem_server::registry::Registry;
use mayhem_server::stats::LogStats;
use mayhem_server::types::ServerMsg;

fn fast_config() -> Arc<ServerConfig> {
    Arc::new(ServerConfig {
        preview_delay_secs: 0,
        intermission_secs: 0,
        math_duration_secs: 1,
        typing_duration_secs: 1,
        race_duration_secs: 1,
        ..ServerConfig::default()
    })
}

/// Pulls broadcasts until `pred` matches, skipping everything else.
async fn wait_for<F>(rx: &mut broadcast::Receiver<LobbyEvent>, mut pred: F) -> ServerMsg
where
    F: FnMut(&ServerMsg) -> bool,
{
    let deadline = Duration::from_secs(5);
    tokio::time::timeout(deadline, async {
        loop {
            match rx.recv().await {
                Ok(LobbyEvent::Broadcast { msg }) if pred(&msg) => return msg,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("lobby closed early"),
            }
        }
    })
    .await
    .expect("timed out waiting for lobby event")
}

/// Pulls events addressed to one connection until `pred` matches.
async fn wait_for_unicast<F>(
    rx: &mut broadcast::Receiver<LobbyEvent>,
    conn: &str,
    mut pred: F,
) -> ServerMsg
where
    F: FnMut(&ServerMsg) -> bool,
{
    let deadline = Duration::from_secs(5);
    tokio::time::timeout(deadline, async {
        loop {
            match rx.recv().await {
                Ok(LobbyEvent::SendTo { conn_id, msg }) if conn_id == conn && pred(&msg) => {
                    return msg;
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("lobby closed early"),
            }
        }
    })
    .await
    .expect("timed out waiting for lobby event")
}

fn is_game_start(msg: &ServerMsg) -> bool {
    matches!(
        msg,
        ServerMsg::Game1Start { .. } | ServerMsg::Game2Start { .. } | ServerMsg::Game3Start { .. }
    )
}

#[tokio::test]
async fn two_player_tournament_runs_to_a_winner() {
    let registry = Registry::new();
    let handle = lobby::spawn_lobby(registry.clone(), fast_config(), Arc::new(LogStats), 10);
    let mut rx = handle.event_tx.subscribe();

    for (conn, name) in [("conn-a", "alice"), ("conn-b", "bob")] {
        tokio_test::assert_ok!(
            handle
                .cmd_tx
                .send(LobbyCommand::Join { conn_id: conn.into(), username: name.into(), reply: None })
                .await
        );
        tokio_test::assert_ok!(
            handle.cmd_tx.send(LobbyCommand::ToggleReady { conn_id: conn.into() }).await
        );
    }

    // alice joined first, so she is the host.
    tokio_test::assert_ok!(
        handle
            .cmd_tx
            .send(LobbyCommand::StartGame { conn_id: "conn-a".into(), test_mode: false })
            .await
    );

    let preview = wait_for(&mut rx, |m| matches!(m, ServerMsg::GamePreview { .. })).await;
    let ServerMsg::GamePreview { game_number, round_number, .. } = preview else {
        unreachable!();
    };
    assert_eq!(round_number, 1);
    assert!((1..=3).contains(&game_number));

    wait_for(&mut rx, is_game_start).await;

    // Two players: the round eliminates the bottom half, so one advances
    // and one spectates, and the tournament ends immediately after.
    let round_end = wait_for(&mut rx, |m| matches!(m, ServerMsg::RoundEnd { .. })).await;
    let ServerMsg::RoundEnd { advancing, eliminated, next_game } = round_end else {
        unreachable!();
    };
    assert_eq!(advancing.len(), 1);
    assert_eq!(eliminated.len(), 1);
    assert_eq!(next_game, None);

    let finale = wait_for(&mut rx, |m| matches!(m, ServerMsg::TournamentWinner { .. })).await;
    let ServerMsg::TournamentWinner { winner } = finale else {
        unreachable!();
    };
    let winner = winner.expect("two-player tournament must name a winner");
    assert_eq!(winner.id, advancing[0].id);
}

#[tokio::test]
async fn start_is_rejected_until_everyone_is_ready() {
    let registry = Registry::new();
    let handle = lobby::spawn_lobby(registry.clone(), fast_config(), Arc::new(LogStats), 10);
    let mut rx = handle.event_tx.subscribe();

    for (conn, name) in [("conn-a", "alice"), ("conn-b", "bob")] {
        tokio_test::assert_ok!(
            handle
                .cmd_tx
                .send(LobbyCommand::Join { conn_id: conn.into(), username: name.into(), reply: None })
                .await
        );
    }

    tokio_test::assert_ok!(
        handle
            .cmd_tx
            .send(LobbyCommand::StartGame { conn_id: "conn-a".into(), test_mode: false })
            .await
    );
    let err = wait_for_unicast(&mut rx, "conn-a", |m| matches!(m, ServerMsg::Error { .. })).await;
    let ServerMsg::Error { msg } = err else { unreachable!() };
    assert!(msg.contains("ready"));

    // A non-host cannot start either, ready or not.
    tokio_test::assert_ok!(
        handle
            .cmd_tx
            .send(LobbyCommand::StartGame { conn_id: "conn-b".into(), test_mode: false })
            .await
    );
    let err = wait_for_unicast(&mut rx, "conn-b", |m| matches!(m, ServerMsg::Error { .. })).await;
    let ServerMsg::Error { msg } = err else { unreachable!() };
    assert!(msg.contains("host"));
}

#[tokio::test]
async fn join_is_confirmed_and_visible_to_an_early_subscriber() {
    let registry = Registry::new();
    let handle = lobby::spawn_lobby(registry.clone(), fast_config(), Arc::new(LogStats), 10);
    // Subscribed before the join command, as the socket layer does.
    let mut rx = handle.event_tx.subscribe();

    let (reply_tx, reply_rx) = oneshot::channel();
    tokio_test::assert_ok!(
        handle
            .cmd_tx
            .send(LobbyCommand::Join {
                conn_id: "conn-a".into(),
                username: "alice".into(),
                reply: Some(reply_tx),
            })
            .await
    );
    let accepted = tokio::time::timeout(Duration::from_secs(5), reply_rx)
        .await
        .expect("timed out waiting for the join reply")
        .expect("join reply dropped");
    assert!(accepted);

    let joined =
        wait_for_unicast(&mut rx, "conn-a", |m| matches!(m, ServerMsg::LobbyJoined { .. })).await;
    let ServerMsg::LobbyJoined { you, .. } = joined else { unreachable!() };
    assert_eq!(you.username, "alice");

    // A second live connection under the same name is refused.
    let (reply_tx, reply_rx) = oneshot::channel();
    tokio_test::assert_ok!(
        handle
            .cmd_tx
            .send(LobbyCommand::Join {
                conn_id: "conn-b".into(),
                username: "alice".into(),
                reply: Some(reply_tx),
            })
            .await
    );
    let accepted = tokio::time::timeout(Duration::from_secs(5), reply_rx)
        .await
        .expect("timed out waiting for the join reply")
        .expect("join reply dropped");
    assert!(!accepted);
}

#[tokio::test]
async fn empty_lobby_is_removed_from_the_registry() {
    let registry = Registry::new();
    let handle = lobby::spawn_lobby(registry.clone(), fast_config(), Arc::new(LogStats), 10);
    let code = handle.code.clone();

    tokio_test::assert_ok!(
        handle
            .cmd_tx
            .send(LobbyCommand::Join { conn_id: "conn-a".into(), username: "alice".into(), reply: None })
            .await
    );
    tokio_test::assert_ok!(
        handle.cmd_tx.send(LobbyCommand::Leave { conn_id: "conn-a".into() }).await
    );

    let deadline = Duration::from_secs(5);
    tokio::time::timeout(deadline, async {
        while registry.lobbies.contains_key(&code) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("lobby should be torn down once empty");
}
