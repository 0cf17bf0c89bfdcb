use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use embedsql_core::{Context, MemoryManager, Pid, Session};
use smol_str::SmolStr;

/// Allocates connection ids and query pids and wraps each new connection's
/// `Session` in a fresh `Context` per query, the way a front-end's
/// connection handler hands each incoming statement a context carrying the
/// session, a cancellation token and the next pid.
pub struct SessionManager {
    next_connection_id: AtomicU32,
    next_pid: AtomicU64,
    memory_soft_limit_bytes: u64,
}

impl SessionManager {
    pub fn new(memory_soft_limit_bytes: u64) -> Self {
        SessionManager {
            next_connection_id: AtomicU32::new(1),
            next_pid: AtomicU64::new(1),
            memory_soft_limit_bytes,
        }
    }

    pub fn new_session(
        &self,
        server_address: impl Into<SmolStr>,
        client_address: impl Into<SmolStr>,
        user: impl Into<SmolStr>,
    ) -> Arc<Session> {
        let connection_id = self.next_connection_id.fetch_add(1, Ordering::SeqCst);
        Arc::new(Session::new(server_address, client_address, user, connection_id))
    }

    pub fn new_context(&self, session: Arc<Session>, query_text: impl Into<SmolStr>) -> Context {
        let pid = self.next_pid();
        Context::new(session, Arc::new(MemoryManager::new(self.memory_soft_limit_bytes)), pid, query_text)
    }

    pub fn next_pid(&self) -> Pid {
        self.next_pid.fetch_add(1, Ordering::SeqCst)
    }
}
