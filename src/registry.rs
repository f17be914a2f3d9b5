use std::sync::Arc;

use rand::Rng;

use crate::lobby::LobbyHandle;
use crate::types::LobbySummary;

// No 0/O/1/I, codes have to survive being read out loud.
const CODE_CHARS: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Process-wide shared state: the lobby directory and the connection registry.
///
/// Everything here is touched concurrently from arbitrary connection tasks;
/// no lobby state lives here, only routing and discovery data.
pub struct Registry {
    /// lobby code -> handle to the lobby task
    pub lobbies: dashmap::DashMap<String, LobbyHandle>,
    /// connection id -> lobby code
    pub socket_lobbies: dashmap::DashMap<String, String>,
    /// connection id -> validated username
    pub connections: dashmap::DashMap<String, String>,
    /// lobby code -> latest published summary (for REST discovery)
    summaries: dashmap::DashMap<String, LobbySummary>,
}

impl Registry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            lobbies: dashmap::DashMap::new(),
            socket_lobbies: dashmap::DashMap::new(),
            connections: dashmap::DashMap::new(),
            summaries: dashmap::DashMap::new(),
        })
    }

    /// Records a freshly accepted connection with its validated identity.
    pub fn register(&self, conn_id: &str, username: &str) {
        self.connections.insert(conn_id.to_string(), username.to_string());
    }

    /// Removes a connection. Idempotent.
    pub fn unregister(&self, conn_id: &str) {
        self.connections.remove(conn_id);
        self.socket_lobbies.remove(conn_id);
    }

    /// Handle of the lobby a connection currently belongs to, if any.
    pub fn lobby_for_socket(&self, conn_id: &str) -> Option<LobbyHandle> {
        let code = self.socket_lobbies.get(conn_id)?.clone();
        self.lobbies.get(&code).map(|h| h.clone())
    }

    pub fn publish_summary(&self, summary: LobbySummary) {
        self.summaries.insert(summary.id.clone(), summary);
    }

    pub fn remove_lobby(&self, code: &str) {
        self.lobbies.remove(code);
        self.summaries.remove(code);
        self.socket_lobbies.retain(|_, c| c != code);
    }

    pub fn lobby_summaries(&self) -> Vec<LobbySummary> {
        self.summaries.iter().map(|e| e.value().clone()).collect()
    }

    /// Mints a short lobby code not currently in use.
    pub fn new_lobby_code(&self) -> String {
        let mut rng = rand::rng();
        loop {
            let code: String = (0..6)
                .map(|_| char::from(CODE_CHARS[rng.random_range(0..CODE_CHARS.len())]))
                .collect();
            if !self.lobbies.contains_key(&code) {
                return code;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_short_and_typeable() {
        let registry = Registry::new();
        for _ in 0..50 {
            let code = registry.new_lobby_code();
            assert_eq!(code.len(), 6);
            assert!(code.bytes().all(|b| CODE_CHARS.contains(&b)));
        }
    }

    #[test]
    fn unregister_is_idempotent() {
        let registry = Registry::new();
        registry.register("conn-1", "alice");
        registry.unregister("conn-1");
        registry.unregister("conn-1");
        assert!(registry.connections.is_empty());
    }
}
