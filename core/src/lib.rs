//! Signon Mock Core Library
//!
//! A mock of the single-sign-on daemon's authentication backend, for tests
//! that drive a sign-on client and need to check what it submitted. The
//! broker resolves identities, opens authentication sessions and records the
//! data and mechanism each session receives, echoing the data back.

pub mod broker;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod harness;
pub mod logging;
pub mod path;
pub mod variant;

pub use broker::{AuthBroker, BrokerSession, BrokerState, SessionState, SharedBroker};
pub use config::BrokerConfig;
pub use dispatch::{BusError, CallOutcome, CallRecord, MethodCall};
pub use error::BrokerError;
pub use harness::{merged_client_data, sorted_records, BrokerFixture, SessionRecord};
pub use logging::{RedactedLoggerBuilder, RedactionPolicy};
pub use path::ObjectPath;
pub use variant::{variant_map, Variant, VariantMap};

/// Result type for configuration and file plumbing
pub type Result<T> = anyhow::Result<T>;

/// Result type for broker operations
pub type BrokerResult<T> = std::result::Result<T, BrokerError>;
