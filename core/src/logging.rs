//! Logging with credential redaction.
//!
//! Session data bundles routinely carry secrets (`Secret`, `AccessToken`,
//! `ClientSecret`, cookies), and at trace level the broker logs every bundle
//! it receives. The subscriber installed here formats every event into one
//! line and scrubs those values before the line is written. `RUST_LOG` still applies on top
//! of the configured level.

use chrono::{SecondsFormat, Utc};
use regex::{Captures, Regex};
use std::borrow::Cow;
use std::fmt::{self, Write};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::{FormatFields, Writer};
use tracing_subscriber::fmt::{FmtContext, FormatEvent};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

/// Keys whose values never reach the log.
const SENSITIVE_KEYS: &[&str] = &[
    "secret",
    "password",
    "passphrase",
    "token",
    "accesstoken",
    "access_token",
    "refreshtoken",
    "refresh_token",
    "idtoken",
    "id_token",
    "clientsecret",
    "client_secret",
    "consumersecret",
    "tokensecret",
    "cookie",
    "cookies",
    "otp",
];

const AUTH_HEADERS: &[&str] = &["authorization", "proxy-authorization"];

/// Builder for the process-wide redacting subscriber.
pub struct RedactedLoggerBuilder {
    level: tracing::Level,
    include_timestamp: bool,
    include_target: bool,
    policy: RedactionPolicy,
}

impl RedactedLoggerBuilder {
    pub fn new(level: tracing::Level) -> Self {
        Self {
            level,
            include_timestamp: true,
            include_target: false,
            policy: RedactionPolicy::default(),
        }
    }

    /// Toggle timestamps (default: true).
    pub fn include_timestamp(mut self, include: bool) -> Self {
        self.include_timestamp = include;
        self
    }

    /// Toggle the event target / module path (default: false).
    pub fn include_target(mut self, include: bool) -> Self {
        self.include_target = include;
        self
    }

    pub fn policy(mut self, policy: RedactionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Install globally. Fails if a subscriber is already set.
    pub fn init(self) -> Result<(), tracing_subscriber::util::TryInitError> {
        let formatter =
            RedactingFormatter::new(self.policy, self.include_timestamp, self.include_target);
        let filter = EnvFilter::builder()
            .with_default_directive(tracing::level_filters::LevelFilter::from_level(self.level).into())
            .from_env_lossy();

        tracing_subscriber::util::SubscriberInitExt::try_init(
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(self.include_target)
                .with_writer(std::io::stderr)
                .event_format(formatter),
        )
    }
}

/// Compiled redaction rules plus the mask they substitute.
#[derive(Clone)]
pub struct RedactionPolicy {
    mask: String,
    rules: Vec<RedactionRule>,
}

impl Default for RedactionPolicy {
    fn default() -> Self {
        Self::new("[REDACTED]")
    }
}

impl RedactionPolicy {
    pub fn new(mask: impl Into<String>) -> Self {
        Self {
            mask: mask.into(),
            rules: build_rules(SENSITIVE_KEYS),
        }
    }

    /// Also redact values stored under `keys` (matched case-insensitively).
    pub fn with_extra_keys(mask: impl Into<String>, keys: &[&str]) -> Self {
        let mut all: Vec<&str> = SENSITIVE_KEYS.to_vec();
        all.extend_from_slice(keys);
        Self {
            mask: mask.into(),
            rules: build_rules(&all),
        }
    }

    /// Returns the input borrowed when nothing matched.
    pub fn redact<'a>(&self, input: &'a str) -> Cow<'a, str> {
        self.rules
            .iter()
            .fold(Cow::Borrowed(input), |acc, rule| rule.apply(acc, &self.mask))
    }
}

#[derive(Clone, Copy)]
enum RuleKind {
    /// `Secret=abc`, `password: abc`
    Assignment,
    /// `"Secret": "abc"` as rendered for JSON and variant maps
    Quoted,
    /// `Authorization: Bearer abc`
    Header,
}

#[derive(Clone)]
struct RedactionRule {
    pattern: Regex,
    kind: RuleKind,
}

impl RedactionRule {
    fn apply<'a>(&self, text: Cow<'a, str>, mask: &str) -> Cow<'a, str> {
        if !self.pattern.is_match(text.as_ref()) {
            return text;
        }
        let replaced = self
            .pattern
            .replace_all(text.as_ref(), |caps: &Captures| match self.kind {
                RuleKind::Assignment => format!("{}{}{}", &caps["key"], &caps["sep"], mask),
                RuleKind::Quoted => format!("{}{}{}", &caps["prefix"], mask, &caps["suffix"]),
                RuleKind::Header => {
                    let scheme = caps.name("scheme").map_or("", |m| m.as_str());
                    format!("{}{}{}", &caps["prefix"], scheme, mask)
                }
            });
        Cow::Owned(replaced.into_owned())
    }
}

fn build_rules(keys: &[&str]) -> Vec<RedactionRule> {
    let keys = alternation(keys);
    let headers = alternation(AUTH_HEADERS);
    vec![
        RedactionRule {
            pattern: Regex::new(&format!(
                r#"(?i)(?P<prefix>"(?:{keys})"\s*:\s*")(?P<value>[^"]*)(?P<suffix>")"#
            ))
            .expect("invalid quoted-value regex"),
            kind: RuleKind::Quoted,
        },
        RedactionRule {
            pattern: Regex::new(&format!(
                r#"(?i)(?P<prefix>\b(?:{headers})\s*[:=]\s*)(?P<scheme>(?:bearer|basic|oauth)\s+)?(?P<value>[^\s,;"]+)"#
            ))
            .expect("invalid header regex"),
            kind: RuleKind::Header,
        },
        RedactionRule {
            pattern: Regex::new(&format!(
                r#"(?i)(?P<key>\b(?:{keys})\b)(?P<sep>\s*[:=]\s*)(?P<value>'[^']*'|[^\s,;"'\[{{}}]+)"#
            ))
            .expect("invalid assignment regex"),
            kind: RuleKind::Assignment,
        },
    ]
}

fn alternation(values: &[&str]) -> String {
    values
        .iter()
        .map(|v| regex::escape(v))
        .collect::<Vec<_>>()
        .join("|")
}

#[derive(Default)]
struct FieldCollector {
    message: Option<String>,
    fields: Vec<(String, String)>,
}

impl FieldCollector {
    fn push(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            self.message = Some(value);
        } else {
            self.fields.push((field.name().to_string(), value));
        }
    }
}

impl Visit for FieldCollector {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.push(field, format!("{:?}", value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.push(field, value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.push(field, value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.push(field, value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.push(field, value.to_string());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.push(field, value.to_string());
    }
}

#[derive(Clone)]
struct RedactingFormatter {
    policy: RedactionPolicy,
    include_timestamp: bool,
    include_target: bool,
}

impl RedactingFormatter {
    fn new(policy: RedactionPolicy, include_timestamp: bool, include_target: bool) -> Self {
        Self {
            policy,
            include_timestamp,
            include_target,
        }
    }

    fn render(&self, event: &Event<'_>) -> Result<String, fmt::Error> {
        let mut line = String::new();
        if self.include_timestamp {
            write!(line, "{} ", Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))?;
        }
        write!(line, "{:<5} ", event.metadata().level())?;
        if self.include_target {
            write!(line, "{} ", event.metadata().target())?;
        }

        let mut collector = FieldCollector::default();
        event.record(&mut collector);
        if let Some(message) = collector.message {
            line.push_str(&message);
        }
        for (key, value) in collector.fields {
            write!(line, " {key}={value}")?;
        }
        Ok(line)
    }
}

impl<S, N> FormatEvent<S, N> for RedactingFormatter
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
    N: for<'writer> FormatFields<'writer> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let line = self.render(event)?;
        writer.write_str(&self.policy.redact(&line))?;
        writer.write_char('\n')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_assignment() {
        let policy = RedactionPolicy::default();
        assert_eq!(policy.redact("Secret=hunter2 next"), "Secret=[REDACTED] next");
        assert_eq!(policy.redact("password: abc"), "password: [REDACTED]");
    }

    #[test]
    fn redacts_variant_map_rendering() {
        let policy = RedactionPolicy::default();
        let line = r#"data={"AccessToken": "abc.def", "UserName": "bob"}"#;
        assert_eq!(
            policy.redact(line),
            r#"data={"AccessToken": "[REDACTED]", "UserName": "bob"}"#
        );
    }

    #[test]
    fn redacts_authorization_header() {
        let policy = RedactionPolicy::default();
        assert_eq!(
            policy.redact("Authorization: Bearer abcdef012345"),
            "Authorization: Bearer [REDACTED]"
        );
    }

    #[test]
    fn leaves_ordinary_text_borrowed() {
        let policy = RedactionPolicy::default();
        let input = "Opened auth session method=oauth2 path=/session/4";
        assert!(matches!(policy.redact(input), Cow::Borrowed(_)));
    }

    #[derive(Clone, Default)]
    struct Captured(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn formatted_events_are_redacted() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_writer(move || writer.clone())
            .event_format(RedactingFormatter::new(RedactionPolicy::default(), false, false))
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let mut broker = crate::broker::AuthBroker::new();
            let path = broker.open_session(1, "oauth2").unwrap();
            let data = crate::variant::variant_map([
                ("AccessToken", "tok-123"),
                ("UserName", "alice"),
            ]);
            broker.process(&path, data, "user_agent").unwrap();
            tracing::warn!(header = "Authorization: Bearer abc.def", "Secret=hunter2 rejected");
        });

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("process data"), "{output}");
        assert!(output.contains(r#""AccessToken": "[REDACTED]""#), "{output}");
        assert!(output.contains(r#""UserName": "alice""#), "{output}");
        assert!(output.contains("Secret=[REDACTED] rejected"), "{output}");
        assert!(output.contains("Bearer [REDACTED]"), "{output}");
        assert!(!output.contains("tok-123"));
        assert!(!output.contains("hunter2"));
        assert!(!output.contains("abc.def"));
        assert!(output.lines().all(|l| !l.is_empty()));
    }

    #[test]
    fn extra_keys_are_honored() {
        let policy = RedactionPolicy::with_extra_keys("***", &["PIN"]);
        assert_eq!(policy.redact("pin=1234"), "pin=***");
        assert_eq!(policy.redact("Secret=x"), "Secret=***");
    }
}
