use tokio::sync::{broadcast, mpsc};

use crate::lobby::LobbyEvent;
use crate::types::ServerMsg;

/// Resolves one lobby event against a connection id. Unicasts addressed to
/// someone else and exclusions naming this connection yield nothing.
pub fn message_for(event: LobbyEvent, conn_id: &str) -> Option<ServerMsg> {
    match event {
        LobbyEvent::SendTo { conn_id: target, msg } if target == conn_id => Some(msg),
        LobbyEvent::SendTo { .. } => None,
        LobbyEvent::Broadcast { msg } => Some(msg),
        LobbyEvent::BroadcastExcept { exclude, msg } if exclude != conn_id => Some(msg),
        LobbyEvent::BroadcastExcept { .. } => None,
    }
}

enum Step {
    Keep,
    Swap(Option<broadcast::Receiver<LobbyEvent>>),
}

/// Fan-out pump for one connection.
///
/// `sub_rx` carries the socket's current lobby subscription: `Some(rx)`
/// attaches or replaces it, `None` detaches. The caller creates the
/// subscription before it sends the join command, so events the lobby emits
/// while the pump has not attached yet are buffered in the receiver, not
/// lost. On a switch the old subscription is drained before it is dropped,
/// so nothing already queued goes missing either.
pub async fn forward_events(
    conn_id: String,
    mut sub_rx: mpsc::Receiver<Option<broadcast::Receiver<LobbyEvent>>>,
    out: mpsc::Sender<ServerMsg>,
) {
    let mut event_rx: Option<broadcast::Receiver<LobbyEvent>> = None;

    loop {
        let Some(rx) = event_rx.as_mut() else {
            match sub_rx.recv().await {
                Some(next) => {
                    event_rx = next;
                    continue;
                }
                None => return,
            }
        };

        let step = tokio::select! {
            next = sub_rx.recv() => {
                while let Ok(event) = rx.try_recv() {
                    if let Some(msg) = message_for(event, &conn_id) {
                        if out.send(msg).await.is_err() {
                            return;
                        }
                    }
                }
                match next {
                    Some(next) => Step::Swap(next),
                    None => return,
                }
            }
            received = rx.recv() => match received {
                Ok(event) => {
                    if let Some(msg) = message_for(event, &conn_id) {
                        if out.send(msg).await.is_err() {
                            return;
                        }
                    }
                    Step::Keep
                }
                Err(broadcast::error::RecvError::Lagged(_)) => Step::Keep,
                Err(broadcast::error::RecvError::Closed) => Step::Swap(None),
            },
        };

        match step {
            Step::Keep => {}
            Step::Swap(next) => event_rx = next,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    fn marker(tag: &str) -> ServerMsg {
        ServerMsg::Error { msg: tag.to_string() }
    }

    async fn next_out(out_rx: &mut mpsc::Receiver<ServerMsg>) -> ServerMsg {
        timeout(Duration::from_secs(5), out_rx.recv())
            .await
            .expect("timed out waiting for forwarded message")
            .expect("pump ended early")
    }

    #[test]
    fn routes_only_events_addressed_to_the_connection() {
        let mine = LobbyEvent::SendTo { conn_id: "conn-a".into(), msg: marker("x") };
        let theirs = LobbyEvent::SendTo { conn_id: "conn-b".into(), msg: marker("x") };
        assert!(message_for(mine, "conn-a").is_some());
        assert!(message_for(theirs, "conn-a").is_none());

        let all = LobbyEvent::Broadcast { msg: marker("x") };
        assert!(message_for(all, "conn-a").is_some());

        let not_me = LobbyEvent::BroadcastExcept { exclude: "conn-a".into(), msg: marker("x") };
        let not_them = LobbyEvent::BroadcastExcept { exclude: "conn-b".into(), msg: marker("x") };
        assert!(message_for(not_me, "conn-a").is_none());
        assert!(message_for(not_them, "conn-a").is_some());
    }

    #[tokio::test]
    async fn events_published_before_attach_are_delivered() {
        let (lobby_tx, lobby_rx) = broadcast::channel(64);
        let (sub_tx, sub_rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(64);
        tokio::spawn(forward_events("conn-a".into(), sub_rx, out_tx));

        // The lobby answers the join before the pump holds the subscription.
        lobby_tx
            .send(LobbyEvent::SendTo {
                conn_id: "conn-a".into(),
                msg: ServerMsg::RosterUpdate { players: vec![] },
            })
            .unwrap();
        sub_tx.send(Some(lobby_rx)).await.unwrap();

        let msg = next_out(&mut out_rx).await;
        assert!(matches!(msg, ServerMsg::RosterUpdate { .. }));
    }

    #[tokio::test]
    async fn switching_lobbies_drops_the_old_subscription() {
        let (tx_a, rx_a) = broadcast::channel(64);
        let (tx_b, rx_b) = broadcast::channel(64);
        let (sub_tx, sub_rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(64);
        tokio::spawn(forward_events("conn-a".into(), sub_rx, out_tx));

        sub_tx.send(Some(rx_a)).await.unwrap();
        tx_a.send(LobbyEvent::Broadcast { msg: marker("a1") }).unwrap();
        assert!(matches!(next_out(&mut out_rx).await, ServerMsg::Error { msg } if msg == "a1"));

        sub_tx.send(Some(rx_b)).await.unwrap();
        tx_b.send(LobbyEvent::Broadcast { msg: marker("b1") }).unwrap();
        // Receiving b1 proves the pump moved on and dropped the old receiver.
        assert!(matches!(next_out(&mut out_rx).await, ServerMsg::Error { msg } if msg == "b1"));

        let _ = tx_a.send(LobbyEvent::Broadcast { msg: marker("a2") });
        tx_b.send(LobbyEvent::Broadcast { msg: marker("b2") }).unwrap();
        assert!(matches!(next_out(&mut out_rx).await, ServerMsg::Error { msg } if msg == "b2"));
    }
}
