use crate::error::{PortalError, Result};
use crate::models::CreditSumPolicy;
use serde_json::Value;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/116.0.0.0 Safari/537.36";

/// Tree node of the scorecard index page (all scorecards of degree 82).
pub const DEFAULT_INDEX_NODE_ID: &str = "auswahlBaum|abschluss:abschl=82";

pub const DEFAULT_SESSION_KEY: &str = "JSESSIONID";

const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// How the session token travels to the portal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionTransport {
    /// As a cookie, e.g. `Cookie: JSESSIONID=...`.
    Cookie { name: String },
    /// As a query parameter on every request.
    QueryParameter { name: String },
}

impl SessionTransport {
    pub fn name(&self) -> &str {
        match self {
            SessionTransport::Cookie { name } | SessionTransport::QueryParameter { name } => name,
        }
    }

    fn parse(kind: &str, name: String) -> Result<Self> {
        match kind.trim().to_lowercase().as_str() {
            "cookie" => Ok(SessionTransport::Cookie { name }),
            "query" | "query-parameter" | "query_parameter" => {
                Ok(SessionTransport::QueryParameter { name })
            }
            other => Err(PortalError::Config(format!(
                "Unknown session transport: {}",
                other
            ))),
        }
    }
}

impl Default for SessionTransport {
    fn default() -> Self {
        SessionTransport::Cookie {
            name: DEFAULT_SESSION_KEY.to_string(),
        }
    }
}

/// Everything the fetcher and client need to know about the portal.
#[derive(Debug, Clone)]
pub struct PortalConfig {
    /// Scheme and host, e.g. `https://qis.example.edu`.
    pub base_url: String,
    /// Path of the QIS servlet, e.g. `/qisserver/rds`.
    pub service_path: String,
    /// Upper bound for a single request, connect included.
    pub timeout: Duration,
    pub user_agent: String,
    pub session_transport: SessionTransport,
    /// `nodeID` of the tree page that lists the scorecards.
    pub index_node_id: String,
    pub credit_sum_policy: CreditSumPolicy,
}

impl PortalConfig {
    pub fn new(base_url: impl Into<String>, service_path: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            service_path: service_path.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            session_transport: SessionTransport::default(),
            index_node_id: DEFAULT_INDEX_NODE_ID.to_string(),
            credit_sum_policy: CreditSumPolicy::default(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_session_transport(mut self, transport: SessionTransport) -> Self {
        self.session_transport = transport;
        self
    }

    pub fn with_credit_sum_policy(mut self, policy: CreditSumPolicy) -> Self {
        self.credit_sum_policy = policy;
        self
    }

    /// Full URL of the QIS servlet.
    pub fn service_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if self.service_path.is_empty() || self.service_path.starts_with('/') {
            format!("{}{}", base, self.service_path)
        } else {
            format!("{}/{}", base, self.service_path)
        }
    }

    /// Loads `path` if it exists, otherwise reads the `QIS_*` environment variables.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::info!(
                path = %path.display(),
                "config file not found, reading portal settings from the environment"
            );
            Self::from_env()
        }
    }

    /// Reads a JSON file of the form `{"QIS": {"BASE_URL": ..., "SERVICE_PATH": ...}}`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            PortalError::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        let settings: Value = serde_json::from_str(&content).map_err(|e| {
            PortalError::Config(format!("Invalid JSON in {}: {}", path.display(), e))
        })?;

        Self::from_lookup(|key| setting_value(&settings, key))
    }

    /// Reads `QIS_BASE_URL`, `QIS_SERVICE_PATH` and the optional `QIS_*` settings,
    /// after loading a `.env` file if one is present.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(format!("QIS_{}", key)).ok())
    }

    /// Builds a config from a key lookup (`BASE_URL`, `SERVICE_PATH`, ...).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let setting = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let required = |key: &str| {
            setting(key).ok_or_else(|| PortalError::Config(format!("Missing setting QIS/{}", key)))
        };

        let mut config = Self::new(required("BASE_URL")?, required("SERVICE_PATH")?);

        if let Some(secs) = setting("TIMEOUT_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                PortalError::Config(format!("Invalid TIMEOUT_SECS: {}", secs))
            })?;
            if secs == 0 {
                return Err(PortalError::Config("TIMEOUT_SECS must be positive".to_string()));
            }
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(user_agent) = setting("USER_AGENT") {
            config.user_agent = user_agent;
        }
        if let Some(kind) = setting("SESSION_TRANSPORT") {
            let name = setting("SESSION_KEY").unwrap_or_else(|| DEFAULT_SESSION_KEY.to_string());
            config.session_transport = SessionTransport::parse(&kind, name)?;
        } else if let Some(name) = setting("SESSION_KEY") {
            config.session_transport = SessionTransport::Cookie { name };
        }
        if let Some(node_id) = setting("INDEX_NODE_ID") {
            config.index_node_id = node_id;
        }
        if let Some(policy) = setting("CREDIT_SUM_POLICY") {
            config.credit_sum_policy = policy.parse().map_err(PortalError::Config)?;
        }

        Ok(config)
    }
}

fn setting_value(settings: &Value, key: &str) -> Option<String> {
    match settings.get("QIS")?.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn reads_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"QIS": {{"BASE_URL": "http://x", "SERVICE_PATH": "/s", "TIMEOUT_SECS": 3}}}}"#
        )
        .unwrap();

        let config = PortalConfig::from_file(file.path()).unwrap();
        assert_eq!(config.base_url, "http://x");
        assert_eq!(config.service_url(), "http://x/s");
        assert_eq!(config.timeout, Duration::from_secs(3));
        assert_eq!(config.session_transport, SessionTransport::default());
    }

    #[test]
    fn missing_key_is_a_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"QIS": {{}}}}"#).unwrap();
        assert!(matches!(
            PortalConfig::from_file(file.path()),
            Err(PortalError::Config(_))
        ));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            PortalConfig::from_file(dir.path().join("config.json")),
            Err(PortalError::Config(_))
        ));
    }

    #[test]
    fn optional_settings_override_defaults() {
        let config = PortalConfig::from_lookup(lookup_from(&[
            ("BASE_URL", "https://qis.example.edu/"),
            ("SERVICE_PATH", "qisserver/rds"),
            ("SESSION_TRANSPORT", "query"),
            ("SESSION_KEY", "sid"),
            ("CREDIT_SUM_POLICY", "graded-only"),
            ("INDEX_NODE_ID", "auswahlBaum|abschluss:abschl=84"),
        ]))
        .unwrap();

        assert_eq!(config.service_url(), "https://qis.example.edu/qisserver/rds");
        assert_eq!(
            config.session_transport,
            SessionTransport::QueryParameter {
                name: "sid".to_string()
            }
        );
        assert_eq!(config.session_transport.name(), "sid");
        assert_eq!(config.credit_sum_policy, CreditSumPolicy::GradedOnly);
        assert_eq!(config.index_node_id, "auswahlBaum|abschluss:abschl=84");
    }

    #[test]
    fn rejects_invalid_values() {
        let base = [("BASE_URL", "http://x"), ("SERVICE_PATH", "/s")];
        for extra in [
            ("TIMEOUT_SECS", "0"),
            ("TIMEOUT_SECS", "soon"),
            ("SESSION_TRANSPORT", "header"),
            ("CREDIT_SUM_POLICY", "sometimes"),
        ] {
            let mut pairs = base.to_vec();
            pairs.push(extra);
            assert!(
                matches!(PortalConfig::from_lookup(lookup_from(&pairs)), Err(PortalError::Config(_))),
                "{:?} should be rejected",
                extra
            );
        }
    }
}
