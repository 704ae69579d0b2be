//! Scripted broker scenarios.
//!
//! A scenario is an ordered list of calls a sign-on client would make,
//! written in TOML, plus optional expectations about the sessions the broker
//! should hold afterwards. Every call goes through the broker's bus binding,
//! exactly as a connected client's would.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use signon_mock_core::dispatch::{GET_AUTH_SESSION_OBJECT_PATH, GET_IDENTITY, PROCESS};
use signon_mock_core::{
    sorted_records, BrokerError, BrokerSession, BusError, MethodCall, ObjectPath, SessionRecord,
    SharedBroker, Variant, VariantMap,
};

#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("step {step}: session index {index} refers to no earlier open_session step")]
    SessionIndex { step: usize, index: usize },

    #[error("step {step}: give exactly one of `session` or `path`")]
    Target { step: usize },

    #[error("step {step}: {source}")]
    Path {
        step: usize,
        source: BrokerError,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub steps: Vec<Step>,

    /// Sessions the broker must hold at the end, in any order
    #[serde(default)]
    pub expect_sessions: Option<Vec<ExpectedSession>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum Step {
    GetIdentity {
        identity: u32,
        #[serde(default)]
        expect_error: bool,
    },
    OpenSession {
        identity: u32,
        method: String,
        #[serde(default)]
        expect_error: bool,
    },
    Process {
        /// Index into the sessions opened so far, in opening order
        #[serde(default)]
        session: Option<usize>,
        /// Literal object path, for addressing sessions the scenario never opened
        #[serde(default)]
        path: Option<String>,
        #[serde(default)]
        data: VariantMap,
        mechanism: String,
        #[serde(default)]
        expect_error: bool,
    },
}

impl Step {
    fn expect_error(&self) -> bool {
        match self {
            Step::GetIdentity { expect_error, .. }
            | Step::OpenSession { expect_error, .. }
            | Step::Process { expect_error, .. } => *expect_error,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExpectedSession {
    pub method: String,
    pub mechanism: Option<String>,
    pub data: Option<VariantMap>,
}

impl From<ExpectedSession> for SessionRecord {
    fn from(e: ExpectedSession) -> Self {
        SessionRecord {
            method: e.method,
            mechanism: e.mechanism,
            data: e.data,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub index: usize,
    pub member: String,
    pub path: String,
    pub reply: Option<String>,
    pub error: Option<String>,
    pub passed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub name: Option<String>,
    pub steps: Vec<StepReport>,
    pub sessions: Vec<BrokerSession>,
    /// Set when `expect_sessions` was given and did not match
    pub session_mismatch: Option<String>,
}

impl RunReport {
    pub fn passed(&self) -> bool {
        self.session_mismatch.is_none() && self.steps.iter().all(|s| s.passed)
    }

    pub fn failed_steps(&self) -> usize {
        self.steps.iter().filter(|s| !s.passed).count()
    }
}

impl Scenario {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario: {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse scenario: {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Drive `broker` through every step, then compare its sessions with the
    /// expectations. Steps keep running after a failure.
    pub async fn run(&self, broker: &SharedBroker) -> Result<RunReport> {
        let root = broker
            .inspect(|b| b.config().root_path())
            .await
            .context("Broker root path is invalid")?;
        let mut opened: Vec<ObjectPath> = Vec::new();
        let mut steps = Vec::with_capacity(self.steps.len());

        for (index, step) in self.steps.iter().enumerate() {
            let call = match build_call(index, step, &root, &opened) {
                Ok(call) => call,
                Err(ScenarioError::Path { source, .. }) => {
                    steps.push(rejected_step(index, step, source));
                    continue;
                }
                Err(err) => return Err(err.into()),
            };
            debug!(step = index, member = %call.member, path = %call.path, "Running step");
            let result = broker.call(&call).await;

            if let (Step::OpenSession { .. }, Ok(reply)) = (step, &result) {
                if let Some(path) = reply.first().and_then(Variant::as_str) {
                    opened.push(ObjectPath::new(path).map_err(|source| ScenarioError::Path {
                        step: index,
                        source,
                    })?);
                }
            }
            steps.push(report_step(index, step, &call, result));
        }

        let sessions = broker.sessions().await;
        let session_mismatch = self
            .expect_sessions
            .as_ref()
            .and_then(|expected| compare_sessions(expected, &sessions));

        Ok(RunReport {
            name: self.name.clone(),
            steps,
            sessions,
            session_mismatch,
        })
    }
}

fn build_call(
    index: usize,
    step: &Step,
    root: &ObjectPath,
    opened: &[ObjectPath],
) -> Result<MethodCall, ScenarioError> {
    Ok(match step {
        Step::GetIdentity { identity, .. } => {
            MethodCall::new(root.clone(), GET_IDENTITY).arg(*identity)
        }
        Step::OpenSession {
            identity, method, ..
        } => MethodCall::new(root.clone(), GET_AUTH_SESSION_OBJECT_PATH)
            .arg(*identity)
            .arg(method.as_str()),
        Step::Process {
            session,
            path,
            data,
            mechanism,
            ..
        } => {
            let target = match (session, path) {
                (Some(i), None) => opened
                    .get(*i)
                    .cloned()
                    .ok_or(ScenarioError::SessionIndex {
                        step: index,
                        index: *i,
                    })?,
                (None, Some(p)) => {
                    ObjectPath::new(p.as_str()).map_err(|source| ScenarioError::Path {
                    step: index,
                    source,
                })?
                }
                _ => return Err(ScenarioError::Target { step: index }),
            };
            MethodCall::new(target, PROCESS)
                .arg(data.clone())
                .arg(mechanism.as_str())
        }
    })
}

fn report_step(
    index: usize,
    step: &Step,
    call: &MethodCall,
    result: Result<Vec<Variant>, BusError>,
) -> StepReport {
    let expect_error = step.expect_error();
    let (reply, error, passed) = match result {
        Ok(values) => {
            let rendered = values
                .iter()
                .map(Variant::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            (Some(rendered), None, !expect_error)
        }
        Err(err) => (None, Some(err.to_string()), expect_error),
    };
    StepReport {
        index,
        member: call.member.clone(),
        path: call.path.to_string(),
        reply,
        error,
        passed,
    }
}

/// A step whose literal path is malformed never reaches the broker; it is
/// reported as the `InvalidArgs` reply a bus would give.
fn rejected_step(index: usize, step: &Step, source: BrokerError) -> StepReport {
    let path = match step {
        Step::Process { path, .. } => path.clone().unwrap_or_default(),
        _ => String::new(),
    };
    StepReport {
        index,
        member: PROCESS.to_string(),
        path,
        reply: None,
        error: Some(BusError::from(source).to_string()),
        passed: step.expect_error(),
    }
}

fn compare_sessions(expected: &[ExpectedSession], actual: &[BrokerSession]) -> Option<String> {
    let want = sorted_records(expected.iter().cloned().map(SessionRecord::from).collect());
    let have = sorted_records(actual.iter().map(SessionRecord::from).collect());
    if want == have {
        return None;
    }
    if want.len() != have.len() {
        return Some(format!(
            "expected {} sessions, broker holds {}",
            want.len(),
            have.len()
        ));
    }
    want.iter()
        .zip(&have)
        .find(|(w, h)| w != h)
        .map(|(w, h)| format!("expected {}, found {}", describe(w), describe(h)))
}

fn describe(record: &SessionRecord) -> String {
    format!(
        "(method={}, mechanism={}, data={})",
        record.method,
        record.mechanism.as_deref().unwrap_or("-"),
        record
            .data
            .clone()
            .map(|d| Variant::Map(d).to_string())
            .unwrap_or_else(|| "-".to_string())
    )
}
