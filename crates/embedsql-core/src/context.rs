use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use smol_str::SmolStr;

use crate::error::{PlanError, PlanResult};

pub type Pid = u64;

/// A per-connection record the front-end owns the lifetime of; the core
/// reads and mutates it through a `Context` but never drops it itself.
#[derive(Debug)]
pub struct Session {
    pub server_address: SmolStr,
    pub client_address: SmolStr,
    pub user: SmolStr,
    pub connection_id: u32,
    variables: Mutex<Vec<(SmolStr, SmolStr)>>,
    warnings: Mutex<Vec<SmolStr>>,
    current_database: Mutex<SmolStr>,
}

impl Session {
    pub fn new(
        server_address: impl Into<SmolStr>,
        client_address: impl Into<SmolStr>,
        user: impl Into<SmolStr>,
        connection_id: u32,
    ) -> Self {
        Session {
            server_address: server_address.into(),
            client_address: client_address.into(),
            user: user.into(),
            connection_id,
            variables: Mutex::new(Vec::new()),
            warnings: Mutex::new(Vec::new()),
            current_database: Mutex::new(SmolStr::default()),
        }
    }

    pub fn current_database(&self) -> SmolStr {
        self.current_database.lock().unwrap().clone()
    }

    pub fn set_current_database(&self, name: impl Into<SmolStr>) {
        *self.current_database.lock().unwrap() = name.into();
    }

    pub fn set_variable(&self, name: impl Into<SmolStr>, value: impl Into<SmolStr>) {
        let name = name.into();
        let value = value.into();
        let mut vars = self.variables.lock().unwrap();
        if let Some(entry) = vars.iter_mut().find(|(n, _)| *n == name) {
            entry.1 = value;
        } else {
            vars.push((name, value));
        }
    }

    pub fn variable(&self, name: &str) -> Option<SmolStr> {
        self.variables
            .lock()
            .unwrap()
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
    }

    pub fn push_warning(&self, message: impl Into<SmolStr>) {
        self.warnings.lock().unwrap().push(message.into());
    }

    pub fn warnings(&self) -> Vec<SmolStr> {
        self.warnings.lock().unwrap().clone()
    }

    pub fn clear_warnings(&self) {
        self.warnings.lock().unwrap().clear();
    }
}

/// A cooperative cancellation flag shared between a query's context and the
/// front-end connection that may need to abort it.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Every iterator's `Next` must call this before doing expensive work.
    pub fn check(&self) -> PlanResult<()> {
        if self.is_cancelled() {
            Err(PlanError::UnsupportedFeature("query cancelled".into()))
        } else {
            Ok(())
        }
    }
}

/// Tracks allocations against a soft limit for memory-heavy operators (sort,
/// hash-join, group-by accumulation). Spilling is operator-local; this only
/// provides the shared accounting and limit check.
#[derive(Debug)]
pub struct MemoryManager {
    soft_limit_bytes: u64,
    used_bytes: std::sync::atomic::AtomicU64,
}

impl MemoryManager {
    pub fn new(soft_limit_bytes: u64) -> Self {
        MemoryManager {
            soft_limit_bytes,
            used_bytes: std::sync::atomic::AtomicU64::new(0),
        }
    }

    pub fn reserve(&self, bytes: u64) -> PlanResult<()> {
        let used = self.used_bytes.fetch_add(bytes, Ordering::SeqCst) + bytes;
        if used > self.soft_limit_bytes {
            self.used_bytes.fetch_sub(bytes, Ordering::SeqCst);
            return Err(PlanError::UnsupportedFeature("memory limit exceeded".into()));
        }
        Ok(())
    }

    pub fn release(&self, bytes: u64) {
        self.used_bytes.fetch_sub(bytes, Ordering::SeqCst);
    }

    pub fn used(&self) -> u64 {
        self.used_bytes.load(Ordering::SeqCst)
    }
}

/// A per-query envelope: a cancellation signal, a session reference, a
/// memory-accounting handle, a process id, and the original query text.
/// Derived contexts (e.g. for a subquery) share the session and process id
/// but may carry their own tracing span.
#[derive(Clone)]
pub struct Context {
    pub session: Arc<Session>,
    pub cancellation: CancellationToken,
    pub memory: Arc<MemoryManager>,
    pub pid: Pid,
    pub query_text: SmolStr,
}

impl Context {
    pub fn new(
        session: Arc<Session>,
        memory: Arc<MemoryManager>,
        pid: Pid,
        query_text: impl Into<SmolStr>,
    ) -> Self {
        Context {
            session,
            cancellation: CancellationToken::new(),
            memory,
            pid,
            query_text: query_text.into(),
        }
    }

    /// A derived context for a nested analysis/execution (e.g. a correlated
    /// subquery): same session and pid, independent cancellation token so a
    /// caller can scope cancellation to just the child if needed.
    pub fn derive(&self) -> Context {
        Context {
            session: self.session.clone(),
            cancellation: self.cancellation.clone(),
            memory: self.memory.clone(),
            pid: self.pid,
            query_text: self.query_text.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_check_errors_once_cancelled() {
        let token = CancellationToken::new();
        assert!(token.check().is_ok());
        token.cancel();
        assert!(token.check().is_err());
    }

    #[test]
    fn memory_manager_rejects_over_limit() {
        let mgr = MemoryManager::new(100);
        assert!(mgr.reserve(50).is_ok());
        assert!(mgr.reserve(60).is_err());
        assert_eq!(mgr.used(), 50);
    }

    #[test]
    fn session_warnings_round_trip() {
        let session = Session::new("127.0.0.1:3306", "10.0.0.1:5555", "root", 1);
        session.push_warning("deprecated syntax");
        assert_eq!(session.warnings().len(), 1);
        session.clear_warnings();
        assert!(session.warnings().is_empty());
    }
}
