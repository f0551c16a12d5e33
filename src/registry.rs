//! Explicit store of buffer managers keyed by opaque session ids.
//! Owned by whoever runs the sessions; there is no process-wide registry.

use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use crate::manager::BufferManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

pub struct SessionRegistry<D> {
    next_id: u64,
    sessions: HashMap<SessionId, BufferManager<D>>,
}

impl<D> Default for SessionRegistry<D> {
    fn default() -> Self {
        Self {
            next_id: 1,
            sessions: HashMap::new(),
        }
    }
}

impl<D> SessionRegistry<D> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a manager and return the id it is reachable under.
    /// Ids are never reused within a registry.
    pub fn create(&mut self, manager: BufferManager<D>) -> SessionId {
        let id = SessionId(self.next_id);
        self.next_id += 1;
        self.sessions.insert(id, manager);
        debug!("registered {}", id);
        id
    }

    pub fn get(&self, id: SessionId) -> Option<&BufferManager<D>> {
        self.sessions.get(&id)
    }

    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut BufferManager<D>> {
        self.sessions.get_mut(&id)
    }

    /// Remove a session, returning its manager so any buffered documents can still be drained.
    pub fn dispose(&mut self, id: SessionId) -> Option<BufferManager<D>> {
        let manager = self.sessions.remove(&id);
        if let Some(m) = &manager {
            let stats = m.total_stats();
            debug!(
                "disposed {} with {} buffered documents",
                id, stats.item_count
            );
        }
        manager
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
