use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context};
use pd_http::{RemoteConfig, DEFAULT_FIELD_ID};
use pd_lock::LockConfig;
use pd_store::TaskPolling;
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE: &str = "pointdown.toml";
pub const EMAIL_VAR: &str = "POINTDOWN_EMAIL";
pub const TOKEN_VAR: &str = "POINTDOWN_TOKEN";

/// Contents of `pointdown.toml`. Every field is optional.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub remote: RemoteSection,
    pub lock: LockSection,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSection {
    pub base_url: String,
    pub email: String,
    pub token: String,
    pub field_id: String,
    pub request_timeout_ms: u64,
}

impl Default for RemoteSection {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            email: String::new(),
            token: String::new(),
            field_id: DEFAULT_FIELD_ID.into(),
            request_timeout_ms: 30_000,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockSection {
    /// Commit without the cooperative lock when false.
    pub enabled: bool,
    pub key: String,
    pub ttl_ms: u64,
    pub total_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub max_jitter_ms: u64,
    pub task_poll_interval_ms: u64,
    pub task_poll_max_attempts: u32,
}

impl Default for LockSection {
    fn default() -> Self {
        let lock = LockConfig::default();
        Self {
            enabled: true,
            key: lock.key,
            ttl_ms: millis(lock.ttl),
            total_timeout_ms: millis(lock.total_timeout),
            poll_interval_ms: millis(lock.poll_interval),
            max_jitter_ms: millis(lock.max_jitter),
            task_poll_interval_ms: millis(lock.task_polling.interval),
            task_poll_max_attempts: lock.task_polling.max_attempts,
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl LockSection {
    pub fn lock_config(&self) -> LockConfig {
        LockConfig {
            key: self.key.clone(),
            ttl: Duration::from_millis(self.ttl_ms),
            total_timeout: Duration::from_millis(self.total_timeout_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            max_jitter: Duration::from_millis(self.max_jitter_ms),
            task_polling: TaskPolling {
                interval: Duration::from_millis(self.task_poll_interval_ms),
                max_attempts: self.task_poll_max_attempts,
            },
        }
    }
}

impl Config {
    /// Load from `path`, or from `./pointdown.toml` if it exists, then apply
    /// credential overrides from the environment.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => Self::read(path)?,
            None if Path::new(CONFIG_FILE).exists() => Self::read(Path::new(CONFIG_FILE))?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    fn read(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Non-empty values returned by `lookup` replace the stored credentials.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let present = |name| lookup(name).filter(|v: &String| !v.trim().is_empty());
        if let Some(email) = present(EMAIL_VAR) {
            self.remote.email = email;
        }
        if let Some(token) = present(TOKEN_VAR) {
            self.remote.token = token;
        }
    }

    pub fn remote_config(&self) -> anyhow::Result<RemoteConfig> {
        let remote = &self.remote;
        if remote.base_url.trim().is_empty() {
            bail!("remote.base_url is not set (see {CONFIG_FILE})");
        }
        if remote.email.is_empty() || remote.token.is_empty() {
            bail!("credentials missing: set remote.email/remote.token or {EMAIL_VAR}/{TOKEN_VAR}");
        }
        let mut config = RemoteConfig::new(remote.base_url.trim(), &remote.email, &remote.token)?
            .with_field_id(&remote.field_id);
        config.request_timeout = Duration::from_millis(remote.request_timeout_ms);
        Ok(config)
    }
}
