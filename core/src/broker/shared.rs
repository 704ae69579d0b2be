use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, TryLockError};

use super::{AuthBroker, BrokerSession};
use crate::dispatch::{BusError, MethodCall};
use crate::path::ObjectPath;
use crate::variant::{Variant, VariantMap};
use crate::BrokerResult;

/// Cloneable handle to one broker instance.
///
/// Each call holds the lock for its full duration, so calls from concurrent
/// tasks are answered one at a time in the order they acquire the lock.
#[derive(Debug, Clone, Default)]
pub struct SharedBroker {
    inner: Arc<Mutex<AuthBroker>>,
}

impl SharedBroker {
    pub fn new(broker: AuthBroker) -> Self {
        Self {
            inner: Arc::new(Mutex::new(broker)),
        }
    }

    pub async fn resolve_identity(&self, identity: u32) -> BrokerResult<(ObjectPath, VariantMap)> {
        self.inner.lock().await.resolve_identity(identity)
    }

    pub async fn open_session(&self, identity: u32, method: &str) -> BrokerResult<ObjectPath> {
        self.inner.lock().await.open_session(identity, method)
    }

    pub async fn process(
        &self,
        session: &ObjectPath,
        data: VariantMap,
        mechanism: &str,
    ) -> BrokerResult<VariantMap> {
        self.inner.lock().await.process(session, data, mechanism)
    }

    /// Route a bus-shaped call through the broker's dispatcher.
    pub async fn call(&self, call: &MethodCall) -> Result<Vec<Variant>, BusError> {
        self.inner.lock().await.dispatch(call)
    }

    /// Run `f` against the broker while holding the lock.
    pub async fn inspect<R>(&self, f: impl FnOnce(&AuthBroker) -> R) -> R {
        let broker = self.inner.lock().await;
        f(&*broker)
    }

    /// Owned copies of every session, in creation order.
    pub async fn sessions(&self) -> Vec<BrokerSession> {
        self.inspect(|b| b.sessions().into_iter().cloned().collect())
            .await
    }

    pub async fn session_count(&self) -> usize {
        self.inspect(AuthBroker::session_count).await
    }

    pub async fn reset(&self) {
        self.inner.lock().await.reset();
    }

    /// Blocking reset for callers outside any async runtime.
    pub(crate) fn blocking_reset(&self) {
        self.inner.blocking_lock().reset();
    }

    /// Non-blocking lock, for teardown paths that cannot await.
    pub(crate) fn try_lock(&self) -> Result<MutexGuard<'_, AuthBroker>, TryLockError> {
        self.inner.try_lock()
    }
}

impl From<AuthBroker> for SharedBroker {
    fn from(broker: AuthBroker) -> Self {
        Self::new(broker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variant::variant_map;

    #[tokio::test]
    async fn concurrent_opens_yield_distinct_paths() {
        let broker = SharedBroker::default();
        let mut handles = Vec::new();
        for i in 0..16u32 {
            let broker = broker.clone();
            handles.push(tokio::spawn(async move {
                broker.open_session(i, "password").await
            }));
        }

        let mut paths = Vec::new();
        for handle in handles {
            paths.push(handle.await.unwrap().unwrap());
        }
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), 16);
        assert_eq!(broker.session_count().await, 16);
    }

    #[tokio::test]
    async fn process_through_handle_is_visible_to_clones() {
        let broker = SharedBroker::default();
        let path = broker.open_session(1, "oauth2").await.unwrap();
        let other = broker.clone();
        other
            .process(&path, variant_map([("Token", "t")]), "web_server")
            .await
            .unwrap();

        let sessions = broker.sessions().await;
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].mechanism.as_deref(), Some("web_server"));
    }

    #[tokio::test]
    async fn reset_empties_the_shared_broker() {
        let broker = SharedBroker::default();
        broker.open_session(1, "oauth2").await.unwrap();
        broker.reset().await;
        assert_eq!(broker.session_count().await, 0);
    }
}
