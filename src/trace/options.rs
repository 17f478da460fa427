// SPDX-License-Identifier: MIT
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::error::TelemetryError;

pub const SERVICE_NAME_VAR: &str = "SERVICE_NAME";
pub const COLLECTOR_URL_VAR: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";
pub const INSECURE_MODE_VAR: &str = "INSECURE_MODE";

/// OTLP wire protocol.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Protocol {
    #[default]
    Grpc,
    Http,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Grpc => "grpc",
            Protocol::Http => "http",
        }
    }
}

impl FromStr for Protocol {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "grpc" => Ok(Protocol::Grpc),
            "http" => Ok(Protocol::Http),
            other => Err(TelemetryError::InvalidProtocol(other.to_string())),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Environment-sourced defaults, captured once.
///
/// Values are read from:
/// * `SERVICE_NAME` – service identity.
/// * `OTEL_EXPORTER_OTLP_ENDPOINT` – collector endpoint.
/// * `INSECURE_MODE` – any non-empty value disables TLS for OTLP/gRPC.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EnvDefaults {
    pub service_name: String,
    pub collector_url: String,
    pub insecure: bool,
}

impl EnvDefaults {
    /// Snapshot of the process environment, taken on first use and reused for
    /// the lifetime of the process.
    pub fn process() -> &'static EnvDefaults {
        static DEFAULTS: OnceLock<EnvDefaults> = OnceLock::new();
        DEFAULTS.get_or_init(|| EnvDefaults::from_lookup(|key| std::env::var(key).ok()))
    }

    /// Builds defaults from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            service_name: lookup(SERVICE_NAME_VAR).unwrap_or_default(),
            collector_url: lookup(COLLECTOR_URL_VAR).unwrap_or_default(),
            insecure: lookup(INSECURE_MODE_VAR).is_some_and(|v| !v.is_empty()),
        }
    }
}

/// One tracing configuration delta; see [`TraceOptions::apply`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TraceOption {
    Name(String),
    Env(String),
    Version(String),
    Url(String),
    Insecure(bool),
    Protocol(Protocol),
}

/// Resolved tracing-provider configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceOptions {
    pub(crate) name: String,
    pub(crate) env: String,
    pub(crate) version: String,
    pub(crate) url: String,
    pub(crate) insecure: bool,
    pub(crate) protocol: Protocol,
}

impl Default for TraceOptions {
    fn default() -> Self {
        Self::from_env(EnvDefaults::process())
    }
}

impl TraceOptions {
    pub fn from_env(defaults: &EnvDefaults) -> Self {
        Self {
            name: defaults.service_name.clone(),
            env: "dev".to_string(),
            version: String::new(),
            url: defaults.collector_url.clone(),
            insecure: defaults.insecure,
            protocol: Protocol::Grpc,
        }
    }

    pub fn apply(&mut self, option: TraceOption) {
        match option {
            TraceOption::Name(name) => self.name = name,
            TraceOption::Env(env) => self.env = env,
            TraceOption::Version(version) => self.version = version,
            TraceOption::Url(url) => self.url = url,
            TraceOption::Insecure(insecure) => self.insecure = insecure,
            TraceOption::Protocol(protocol) => self.protocol = protocol,
        }
    }

    fn with(mut self, option: TraceOption) -> Self {
        self.apply(option);
        self
    }

    pub fn with_name(self, name: impl Into<String>) -> Self {
        self.with(TraceOption::Name(name.into()))
    }

    pub fn with_env(self, env: impl Into<String>) -> Self {
        self.with(TraceOption::Env(env.into()))
    }

    pub fn with_version(self, version: impl Into<String>) -> Self {
        self.with(TraceOption::Version(version.into()))
    }

    pub fn with_url(self, url: impl Into<String>) -> Self {
        self.with(TraceOption::Url(url.into()))
    }

    pub fn with_insecure(self, insecure: bool) -> Self {
        self.with(TraceOption::Insecure(insecure))
    }

    pub fn with_protocol(self, protocol: Protocol) -> Self {
        self.with(TraceOption::Protocol(protocol))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn env(&self) -> &str {
        &self.env
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn insecure(&self) -> bool {
        self.insecure
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }
}

impl Extend<TraceOption> for TraceOptions {
    fn extend<I: IntoIterator<Item = TraceOption>>(&mut self, iter: I) {
        for option in iter {
            self.apply(option);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> EnvDefaults {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EnvDefaults::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn environment_feeds_defaults() {
        let env = lookup(&[
            (SERVICE_NAME_VAR, "checkout"),
            (COLLECTOR_URL_VAR, "collector:4317"),
            (INSECURE_MODE_VAR, "1"),
        ]);
        let options = TraceOptions::from_env(&env);

        assert_eq!(options.name(), "checkout");
        assert_eq!(options.url(), "collector:4317");
        assert!(options.insecure());
        assert_eq!(options.env(), "dev");
        assert_eq!(options.protocol(), Protocol::Grpc);
    }

    #[test]
    fn empty_insecure_variable_means_secure() {
        assert!(!lookup(&[(INSECURE_MODE_VAR, "")]).insecure);
        assert!(!lookup(&[]).insecure);
    }

    #[test]
    fn explicit_options_override_environment_and_last_one_wins() {
        let env = lookup(&[(SERVICE_NAME_VAR, "from-env"), (INSECURE_MODE_VAR, "yes")]);
        let mut options = TraceOptions::from_env(&env)
            .with_name("explicit")
            .with_insecure(false)
            .with_protocol(Protocol::Http);
        options.extend([
            TraceOption::Env("staging".into()),
            TraceOption::Env("prod".into()),
            TraceOption::Version("1.4.2".into()),
        ]);

        assert_eq!(options.name(), "explicit");
        assert!(!options.insecure());
        assert_eq!(options.protocol(), Protocol::Http);
        assert_eq!(options.env(), "prod");
        assert_eq!(options.version(), "1.4.2");
    }

    #[test]
    fn protocol_parsing() {
        assert_eq!("grpc".parse::<Protocol>().unwrap(), Protocol::Grpc);
        assert_eq!("http".parse::<Protocol>().unwrap(), Protocol::Http);
        assert!(matches!(
            "thrift".parse::<Protocol>(),
            Err(TelemetryError::InvalidProtocol(p)) if p == "thrift"
        ));
    }
}
