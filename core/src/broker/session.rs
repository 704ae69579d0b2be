use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::path::ObjectPath;
use crate::variant::VariantMap;

/// Session ids are handed out from one counter for the whole process, so an
/// id is never seen twice even across broker instances.
static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_session_id() -> u64 {
    NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed)
}

/// Where a session is in its (short) life
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Created, no data submitted yet
    Open,
    /// At least one `process` call recorded
    Processed,
}

/// One authentication attempt opened by the client under test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerSession {
    /// Sequential id, unique for the process lifetime
    pub id: u64,

    /// Object path the client addresses the session by
    pub path: ObjectPath,

    /// Identity handle passed when the session was opened
    pub identity: u32,

    /// Authentication method, e.g. "oauth2" or "password"
    pub method: String,

    /// Mechanism from the most recent `process` call
    pub mechanism: Option<String>,

    /// Data bundle from the most recent `process` call
    pub received_data: Option<VariantMap>,

    /// Number of `process` calls seen
    #[serde(default)]
    pub process_count: u32,
}

impl BrokerSession {
    pub(crate) fn new(id: u64, path: ObjectPath, identity: u32, method: String) -> Self {
        Self {
            id,
            path,
            identity,
            method,
            mechanism: None,
            received_data: None,
            process_count: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        if self.process_count == 0 {
            SessionState::Open
        } else {
            SessionState::Processed
        }
    }

    /// Overwrite whatever an earlier call recorded.
    pub(crate) fn record(&mut self, data: VariantMap, mechanism: &str) {
        self.received_data = Some(data);
        self.mechanism = Some(mechanism.to_string());
        self.process_count = self.process_count.saturating_add(1);
    }
}
