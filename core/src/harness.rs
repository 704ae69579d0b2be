//! Per-test broker fixture.
//!
//! Each test builds its own [`BrokerFixture`]; dropping it releases every
//! session the test opened, so nothing leaks into the next test.

use serde::Serialize;
use std::ops::Deref;
use tracing::{debug, warn};

use crate::broker::{AuthBroker, BrokerSession, SharedBroker};
use crate::config::BrokerConfig;
use crate::variant::VariantMap;
use crate::BrokerResult;

/// What a test asserts on for one session, independent of its path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionRecord {
    pub method: String,
    pub mechanism: Option<String>,
    pub data: Option<VariantMap>,
}

impl SessionRecord {
    pub fn new(method: &str, mechanism: &str, data: VariantMap) -> Self {
        Self {
            method: method.to_string(),
            mechanism: Some(mechanism.to_string()),
            data: Some(data),
        }
    }

    fn sort_key(&self) -> (String, String, String) {
        (
            self.method.clone(),
            self.mechanism.clone().unwrap_or_default(),
            self.data
                .as_ref()
                .and_then(|d| serde_json::to_string(d).ok())
                .unwrap_or_default(),
        )
    }
}

impl From<&BrokerSession> for SessionRecord {
    fn from(session: &BrokerSession) -> Self {
        Self {
            method: session.method.clone(),
            mechanism: session.mechanism.clone(),
            data: session.received_data.clone(),
        }
    }
}

/// Sort records so two sets compare equal regardless of arrival order.
pub fn sorted_records(mut records: Vec<SessionRecord>) -> Vec<SessionRecord> {
    records.sort_by_key(SessionRecord::sort_key);
    records
}

/// Client data as the sign-on UI forwards it on re-authentication: the
/// original client data with the extra data laid over it.
pub fn merged_client_data(client_data: &VariantMap, extra_data: &VariantMap) -> VariantMap {
    let mut merged = client_data.clone();
    merged.extend(extra_data.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

/// A fresh broker for the duration of one test.
pub struct BrokerFixture {
    broker: SharedBroker,
}

impl BrokerFixture {
    pub fn new() -> Self {
        Self {
            broker: SharedBroker::default(),
        }
    }

    pub fn with_config(config: BrokerConfig) -> BrokerResult<Self> {
        Ok(Self {
            broker: SharedBroker::new(AuthBroker::with_config(config)?),
        })
    }

    pub fn broker(&self) -> &SharedBroker {
        &self.broker
    }

    /// Every session as a [`SessionRecord`], sorted for order-independent comparison.
    pub async fn snapshot(&self) -> Vec<SessionRecord> {
        let records = self
            .broker
            .inspect(|b| b.sessions().into_iter().map(SessionRecord::from).collect())
            .await;
        sorted_records(records)
    }
}

impl Default for BrokerFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for BrokerFixture {
    type Target = SharedBroker;

    fn deref(&self) -> &Self::Target {
        &self.broker
    }
}

impl Drop for BrokerFixture {
    fn drop(&mut self) {
        // Clones handed to spawned tasks may outlive the fixture; empty the
        // broker so they cannot observe this test's sessions.
        if let Ok(mut broker) = self.broker.try_lock() {
            if !broker.is_empty() {
                debug!(count = broker.session_count(), "Fixture teardown");
            }
            broker.reset();
            return;
        }

        let broker = self.broker.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!("Broker busy at fixture teardown, reset deferred until the lock is free");
                handle.spawn(async move { broker.reset().await });
            }
            Err(_) => {
                warn!("Broker busy at fixture teardown, waiting for the lock");
                broker.blocking_reset();
            }
        }
    }
}
