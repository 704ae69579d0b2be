//! The mock authentication broker.
//!
//! [`AuthBroker`] stands in for the single-sign-on daemon's backend. It hands
//! out identity references, opens authentication sessions and records what
//! the client under test submits to each session so a test can inspect it
//! after the round trip. Nothing here blocks or yields; callers sharing a
//! broker across tasks go through [`SharedBroker`], which serializes calls.

mod session;
mod shared;

pub use session::{BrokerSession, SessionState};
pub use shared::SharedBroker;

use std::collections::HashMap;
use tracing::{debug, info, trace};

use crate::config::{BrokerConfig, DEFAULT_IDENTITY_PREFIX, DEFAULT_SESSION_PREFIX};
use crate::dispatch::{CallOutcome, CallRecord, MethodCall};
use crate::path::ObjectPath;
use crate::variant::{Variant, VariantMap};
use crate::{BrokerError, BrokerResult};

/// Sessions owned by one broker instance, keyed by object path.
#[derive(Debug, Default)]
pub struct BrokerState {
    sessions: HashMap<ObjectPath, BrokerSession>,
}

impl BrokerState {
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn get(&self, path: &ObjectPath) -> Option<&BrokerSession> {
        self.sessions.get(path)
    }

    pub fn contains(&self, path: &ObjectPath) -> bool {
        self.sessions.contains_key(path)
    }

    fn get_mut(&mut self, path: &ObjectPath) -> Option<&mut BrokerSession> {
        self.sessions.get_mut(path)
    }

    fn insert(&mut self, session: BrokerSession) {
        self.sessions.insert(session.path.clone(), session);
    }

    fn values(&self) -> impl Iterator<Item = &BrokerSession> {
        self.sessions.values()
    }

    fn clear(&mut self) {
        self.sessions.clear();
    }
}

/// Mock backend answering identity and auth-session calls
#[derive(Debug)]
pub struct AuthBroker {
    config: BrokerConfig,
    identity_prefix: ObjectPath,
    session_prefix: ObjectPath,
    state: BrokerState,
    journal: Vec<CallRecord>,
}

impl AuthBroker {
    /// Broker with the default signond names.
    pub fn new() -> Self {
        Self {
            config: BrokerConfig::default(),
            identity_prefix: ObjectPath::from_static(DEFAULT_IDENTITY_PREFIX),
            session_prefix: ObjectPath::from_static(DEFAULT_SESSION_PREFIX),
            state: BrokerState::default(),
            journal: Vec::new(),
        }
    }

    /// Broker answering under the names in `config`.
    pub fn with_config(config: BrokerConfig) -> BrokerResult<Self> {
        config.validate()?;
        let identity_prefix = config.identity_prefix()?;
        let session_prefix = config.session_prefix()?;
        Ok(Self {
            config,
            identity_prefix,
            session_prefix,
            state: BrokerState::default(),
            journal: Vec::new(),
        })
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn session_prefix(&self) -> &ObjectPath {
        &self.session_prefix
    }

    /// Resolve a numeric identity handle to its reference path. Always
    /// succeeds and has no side effects.
    pub fn resolve_identity(&self, identity: u32) -> BrokerResult<(ObjectPath, VariantMap)> {
        let path = self.identity_prefix.child(identity)?;
        debug!(identity, path = %path, "Resolved identity");
        Ok((path, VariantMap::new()))
    }

    /// Open a new authentication session for `identity` using `method`.
    pub fn open_session(&mut self, identity: u32, method: &str) -> BrokerResult<ObjectPath> {
        if method.is_empty() {
            return Err(BrokerError::InvalidArgs(
                "authentication method must not be empty".to_string(),
            ));
        }
        let id = session::next_session_id();
        let path = self.session_prefix.child(id)?;
        self.state.insert(BrokerSession::new(
            id,
            path.clone(),
            identity,
            method.to_string(),
        ));
        info!(identity, method, path = %path, "Opened auth session");
        Ok(path)
    }

    /// Record `data` and `mechanism` against the session and echo `data` back.
    ///
    /// Only the most recent call is retained. An unknown path is rejected and
    /// leaves every session untouched.
    pub fn process(
        &mut self,
        session: &ObjectPath,
        data: VariantMap,
        mechanism: &str,
    ) -> BrokerResult<VariantMap> {
        let entry = self
            .state
            .get_mut(session)
            .ok_or_else(|| BrokerError::UnknownSession(session.clone()))?;
        debug!(path = %session, mechanism, keys = data.len(), "process");
        trace!(path = %session, data = %Variant::Map(data.clone()), "process data");
        entry.record(data.clone(), mechanism);
        Ok(data)
    }

    pub fn session(&self, path: &ObjectPath) -> Option<&BrokerSession> {
        self.state.get(path)
    }

    pub fn has_session(&self, path: &ObjectPath) -> bool {
        self.state.contains(path)
    }

    /// All sessions, ordered by id (creation order).
    pub fn sessions(&self) -> Vec<&BrokerSession> {
        let mut sessions: Vec<_> = self.state.values().collect();
        sessions.sort_by_key(|s| s.id);
        sessions
    }

    pub fn sessions_by_method(&self, method: &str) -> Vec<&BrokerSession> {
        self.sessions()
            .into_iter()
            .filter(|s| s.method == method)
            .collect()
    }

    pub fn session_count(&self) -> usize {
        self.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    /// Calls answered by [`AuthBroker::dispatch`], in arrival order.
    pub fn journal(&self) -> &[CallRecord] {
        &self.journal
    }

    pub(crate) fn record_call(&mut self, call: &MethodCall, outcome: CallOutcome) {
        let sequence = self.journal.len() as u64 + 1;
        self.journal.push(CallRecord {
            sequence,
            path: call.path.clone(),
            member: call.member.clone(),
            outcome,
        });
    }

    /// Drop every session and the call journal. Ids are not recycled.
    pub fn reset(&mut self) {
        if !self.state.is_empty() {
            debug!(count = self.state.len(), "Releasing broker sessions");
        }
        self.state.clear();
        self.journal.clear();
    }
}

impl Default for AuthBroker {
    fn default() -> Self {
        Self::new()
    }
}
