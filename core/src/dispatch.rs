//! Bus-call binding for the broker.
//!
//! A [`MethodCall`] carries what a bus message would: object path, optional
//! interface, member name and positional arguments. [`AuthBroker::dispatch`]
//! routes it to the service object or to one of the session objects, checks
//! the argument signature and answers with the reply arguments or a
//! [`BusError`] named the way bus daemons name them. Moving bytes between
//! processes is left to whatever connection sits in front of this.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::broker::AuthBroker;
use crate::error::names;
use crate::path::ObjectPath;
use crate::variant::{Variant, VariantMap};
use crate::BrokerError;

pub const GET_IDENTITY: &str = "getIdentity";
pub const GET_AUTH_SESSION_OBJECT_PATH: &str = "getAuthSessionObjectPath";
pub const PROCESS: &str = "process";

/// An inbound call addressed to one of the broker's objects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    pub path: ObjectPath,
    /// `None` resolves the member on whichever interface the object implements
    #[serde(default)]
    pub interface: Option<String>,
    pub member: String,
    #[serde(default)]
    pub args: Vec<Variant>,
}

impl MethodCall {
    pub fn new(path: ObjectPath, member: impl Into<String>) -> Self {
        Self {
            path,
            interface: None,
            member: member.into(),
            args: Vec::new(),
        }
    }

    pub fn interface(mut self, interface: impl Into<String>) -> Self {
        self.interface = Some(interface.into());
        self
    }

    pub fn arg(mut self, value: impl Into<Variant>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Concatenated signature of the arguments, e.g. `us`.
    pub fn signature(&self) -> String {
        self.args.iter().map(Variant::signature).collect()
    }
}

/// Error reply returned to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{name}: {message}")]
pub struct BusError {
    pub name: String,
    pub message: String,
}

impl From<BrokerError> for BusError {
    fn from(err: BrokerError) -> Self {
        Self {
            name: err.bus_error_name().to_string(),
            message: err.to_string(),
        }
    }
}

/// Outcome of one dispatched call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CallOutcome {
    Reply { signature: String },
    Error { name: String },
}

/// Journal entry, in arrival order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    pub sequence: u64,
    pub path: ObjectPath,
    pub member: String,
    #[serde(flatten)]
    pub outcome: CallOutcome,
}

impl CallRecord {
    pub fn is_error(&self) -> bool {
        matches!(self.outcome, CallOutcome::Error { .. })
    }
}

enum Target {
    Service,
    Session,
}

impl AuthBroker {
    /// Answer a bus-shaped call. Rejected calls leave the sessions untouched.
    pub fn dispatch(&mut self, call: &MethodCall) -> Result<Vec<Variant>, BusError> {
        debug!(
            path = %call.path,
            member = %call.member,
            signature = %call.signature(),
            "Dispatching call"
        );
        let result = self.route(call);
        let outcome = match &result {
            Ok(reply) => CallOutcome::Reply {
                signature: reply.iter().map(Variant::signature).collect(),
            },
            Err(err) => {
                warn!(path = %call.path, member = %call.member, error = %err, "Call rejected");
                CallOutcome::Error {
                    name: err.bus_error_name().to_string(),
                }
            }
        };
        self.record_call(call, outcome);
        result.map_err(BusError::from)
    }

    fn route(&mut self, call: &MethodCall) -> Result<Vec<Variant>, BrokerError> {
        match self.target_of(&call.path)? {
            Target::Service => {
                check_interface(call, &self.config().service_interface())?;
                match call.member.as_str() {
                    GET_IDENTITY => {
                        expect_signature(call, "u")?;
                        let identity = arg_u32(call, 0)?;
                        let (path, extra) = self.resolve_identity(identity)?;
                        Ok(vec![Variant::ObjectPath(path), Variant::Map(extra)])
                    }
                    GET_AUTH_SESSION_OBJECT_PATH => {
                        expect_signature(call, "us")?;
                        let identity = arg_u32(call, 0)?;
                        let method = arg_str(call, 1)?;
                        let path = self.open_session(identity, method)?;
                        Ok(vec![Variant::String(path.into())])
                    }
                    _ => Err(unknown_method(call, &self.config().service_interface())),
                }
            }
            Target::Session => {
                check_interface(call, &self.config().session_interface())?;
                if call.member != PROCESS {
                    return Err(unknown_method(call, &self.config().session_interface()));
                }
                expect_signature(call, "a{sv}s")?;
                let data = arg_map(call, 0)?;
                let mechanism = arg_str(call, 1)?;
                let reply = self.process(&call.path, data, mechanism)?;
                Ok(vec![Variant::Map(reply)])
            }
        }
    }

    fn target_of(&self, path: &ObjectPath) -> Result<Target, BrokerError> {
        if self.config().root_path()? == *path {
            return Ok(Target::Service);
        }
        if path.is_child_of(self.session_prefix()) {
            if self.has_session(path) {
                return Ok(Target::Session);
            }
            return Err(BrokerError::UnknownSession(path.clone()));
        }
        Err(BrokerError::UnknownObject(path.to_string()))
    }
}

fn check_interface(call: &MethodCall, expected: &str) -> Result<(), BrokerError> {
    match call.interface.as_deref() {
        None => Ok(()),
        Some(iface) if iface == expected => Ok(()),
        Some(other) => Err(BrokerError::UnknownInterface(format!(
            "{other} is not implemented by {}",
            call.path
        ))),
    }
}

fn unknown_method(call: &MethodCall, interface: &str) -> BrokerError {
    BrokerError::UnknownMethod {
        interface: interface.to_string(),
        member: call.member.clone(),
    }
}

/// Arity and types must match; any integer counts as `u` when it fits.
fn expect_signature(call: &MethodCall, expected: &str) -> Result<(), BrokerError> {
    let matches = call.args.len() == expected_arity(expected)
        && call
            .args
            .iter()
            .zip(split_signature(expected))
            .all(|(arg, want)| {
                arg.signature() == want || (want == "u" && arg.as_u32().is_some())
            });
    if matches {
        Ok(())
    } else {
        Err(BrokerError::InvalidArgs(format!(
            "{} expects ({expected}), got ({})",
            call.member,
            call.signature()
        )))
    }
}

fn expected_arity(signature: &str) -> usize {
    split_signature(signature).len()
}

/// Split the handful of signatures the broker declares into single types.
fn split_signature(signature: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut rest = signature;
    while !rest.is_empty() {
        let len = if rest.starts_with("a{sv}") {
            5
        } else if rest.starts_with('a') {
            2
        } else {
            1
        };
        let (head, tail) = rest.split_at(len.min(rest.len()));
        parts.push(head);
        rest = tail;
    }
    parts
}

fn arg_u32(call: &MethodCall, index: usize) -> Result<u32, BrokerError> {
    call.args
        .get(index)
        .and_then(Variant::as_u32)
        .ok_or_else(|| BrokerError::InvalidArgs(format!("argument {index} must be uint32")))
}

fn arg_str(call: &MethodCall, index: usize) -> Result<&str, BrokerError> {
    call.args
        .get(index)
        .and_then(Variant::as_str)
        .ok_or_else(|| BrokerError::InvalidArgs(format!("argument {index} must be a string")))
}

fn arg_map(call: &MethodCall, index: usize) -> Result<VariantMap, BrokerError> {
    call.args
        .get(index)
        .and_then(Variant::as_map)
        .cloned()
        .ok_or_else(|| BrokerError::InvalidArgs(format!("argument {index} must be a{{sv}}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_ROOT_PATH;
    use crate::variant::variant_map;

    fn service_call(member: &str) -> MethodCall {
        MethodCall::new(ObjectPath::new(DEFAULT_ROOT_PATH).unwrap(), member)
    }

    fn open(broker: &mut AuthBroker, method: &str) -> ObjectPath {
        let reply = broker
            .dispatch(
                &service_call(GET_AUTH_SESSION_OBJECT_PATH)
                    .arg(45000u32)
                    .arg(method),
            )
            .unwrap();
        ObjectPath::new(reply[0].as_str().unwrap()).unwrap()
    }

    #[test]
    fn get_identity_replies_path_and_empty_map() {
        let mut broker = AuthBroker::new();
        let reply = broker
            .dispatch(
                &service_call(GET_IDENTITY)
                    .interface("com.google.code.AccountsSSO.SingleSignOn.AuthService")
                    .arg(45000u32),
            )
            .unwrap();
        assert_eq!(reply.len(), 2);
        assert_eq!(
            reply[0].as_object_path().map(ObjectPath::as_str),
            Some("/identity/45000")
        );
        assert_eq!(reply[1], Variant::Map(VariantMap::new()));
    }

    #[test]
    fn session_path_is_returned_as_string() {
        let mut broker = AuthBroker::new();
        let path = open(&mut broker, "TheMethod");
        assert_eq!(broker.session(&path).unwrap().method, "TheMethod");
    }

    #[test]
    fn process_echoes_bundle() {
        let mut broker = AuthBroker::new();
        let path = open(&mut broker, "TheMethod");
        let data = variant_map([("OneKey", "OneValue")]);

        let reply = broker
            .dispatch(
                &MethodCall::new(path.clone(), PROCESS)
                    .arg(data.clone())
                    .arg("TheMechanism"),
            )
            .unwrap();

        assert_eq!(reply, vec![Variant::Map(data.clone())]);
        assert_eq!(broker.session(&path).unwrap().received_data, Some(data));
    }

    #[test]
    fn process_on_unissued_path_is_unknown_object() {
        let mut broker = AuthBroker::new();
        let call = MethodCall::new(ObjectPath::new("/session/0").unwrap(), PROCESS)
            .arg(VariantMap::new())
            .arg("m");
        let err = broker.dispatch(&call).unwrap_err();
        assert_eq!(err.name, names::UNKNOWN_OBJECT);
        assert!(broker.is_empty());
    }

    #[test]
    fn unrelated_path_is_unknown_object() {
        let mut broker = AuthBroker::new();
        let err = broker
            .dispatch(&MethodCall::new(ObjectPath::new("/elsewhere").unwrap(), "x"))
            .unwrap_err();
        assert_eq!(err.name, names::UNKNOWN_OBJECT);
    }

    #[test]
    fn wrong_arguments_are_invalid_args() {
        let mut broker = AuthBroker::new();
        let err = broker
            .dispatch(&service_call(GET_AUTH_SESSION_OBJECT_PATH).arg("45000").arg("m"))
            .unwrap_err();
        assert_eq!(err.name, names::INVALID_ARGS);

        let err = broker
            .dispatch(&service_call(GET_IDENTITY))
            .unwrap_err();
        assert_eq!(err.name, names::INVALID_ARGS);

        let path = open(&mut broker, "m");
        let err = broker
            .dispatch(&MethodCall::new(path.clone(), PROCESS).arg("not a map").arg("m"))
            .unwrap_err();
        assert_eq!(err.name, names::INVALID_ARGS);
        assert!(broker.session(&path).unwrap().received_data.is_none());
    }

    #[test]
    fn empty_method_is_invalid_args() {
        let mut broker = AuthBroker::new();
        let err = broker
            .dispatch(&service_call(GET_AUTH_SESSION_OBJECT_PATH).arg(1u32).arg(""))
            .unwrap_err();
        assert_eq!(err.name, names::INVALID_ARGS);
        assert!(broker.is_empty());
    }

    #[test]
    fn untyped_integers_count_as_uint32() {
        let mut broker = AuthBroker::new();
        let reply = broker
            .dispatch(&service_call(GET_IDENTITY).arg(Variant::Int64(12)))
            .unwrap();
        assert_eq!(reply[0].to_string(), "/identity/12");
    }

    #[test]
    fn non_negative_int32_counts_as_uint32() {
        let mut broker = AuthBroker::new();
        let reply = broker
            .dispatch(&service_call(GET_IDENTITY).arg(45000i32))
            .unwrap();
        assert_eq!(reply[0].to_string(), "/identity/45000");

        let err = broker
            .dispatch(&service_call(GET_IDENTITY).arg(-1i32))
            .unwrap_err();
        assert_eq!(err.name, names::INVALID_ARGS);
    }

    #[test]
    fn unknown_member_and_interface() {
        let mut broker = AuthBroker::new();
        let err = broker.dispatch(&service_call("queryDialog")).unwrap_err();
        assert_eq!(err.name, names::UNKNOWN_METHOD);

        let err = broker
            .dispatch(&service_call(GET_IDENTITY).interface("com.nokia.singlesignonui").arg(1u32))
            .unwrap_err();
        assert_eq!(err.name, names::UNKNOWN_INTERFACE);

        let path = open(&mut broker, "m");
        let err = broker
            .dispatch(&MethodCall::new(path, "cancel"))
            .unwrap_err();
        assert_eq!(err.name, names::UNKNOWN_METHOD);
    }

    #[test]
    fn journal_keeps_arrival_order() {
        let mut broker = AuthBroker::new();
        let path = open(&mut broker, "m");
        let _ = broker.dispatch(&service_call("bogus"));
        broker
            .dispatch(&MethodCall::new(path, PROCESS).arg(VariantMap::new()).arg("x"))
            .unwrap();

        let journal = broker.journal();
        let members: Vec<_> = journal.iter().map(|r| r.member.as_str()).collect();
        assert_eq!(members, vec![GET_AUTH_SESSION_OBJECT_PATH, "bogus", PROCESS]);
        assert!(journal.windows(2).all(|w| w[0].sequence < w[1].sequence));
        assert!(journal[1].is_error());
        assert_eq!(
            journal[2].outcome,
            CallOutcome::Reply { signature: "a{sv}".to_string() }
        );
    }

    #[test]
    fn split_signature_handles_dicts() {
        assert_eq!(split_signature("a{sv}s"), vec!["a{sv}", "s"]);
        assert_eq!(split_signature("us"), vec!["u", "s"]);
        assert_eq!(split_signature("asu"), vec!["as", "u"]);
    }
}
