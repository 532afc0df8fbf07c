use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

/// Key lookup used to build a [`Config`]. The process environment in
/// production, a map in tests.
pub trait VarSource {
    fn var(&self, key: &str) -> Option<String>;
}

/// Reads from the process environment.
pub struct ProcessEnv;

impl VarSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }
}

impl VarSource for std::collections::HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Profiled lookup: tries `{PROFILE}_{KEY}` first, falls back to `{KEY}`.
struct Profiled<'a> {
    profile: &'a str,
    source: &'a dyn VarSource,
}

impl Profiled<'_> {
    fn opt(&self, key: &str) -> Option<String> {
        if !self.profile.is_empty() {
            let prefixed = format!("{}_{}", self.profile, key);
            if let Some(v) = self.source.var(&prefixed).filter(|s| !s.is_empty()) {
                return Some(v);
            }
        }
        self.source.var(key).filter(|s| !s.is_empty())
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.opt(key).unwrap_or_else(|| default.to_string())
    }

    /// Parse a value, falling back to `default` (with a warning) when it is
    /// present but malformed.
    fn parsed<T: FromStr>(&self, key: &str, default: T) -> T
    where
        T::Err: std::fmt::Display,
    {
        match self.opt(key) {
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                tracing::warn!(key, value = %raw, error = %e, "invalid config value, using default");
                default
            }),
            None => default,
        }
    }
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub gateway: GatewayConfig,
    pub rserve: RserveConfig,
    pub scratch: ScratchConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `GORP_PROFILE`. When set (e.g. `PROD`), every key
    /// is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = ProcessEnv.var("GORP_PROFILE").unwrap_or_default();
        Self::for_profile(&profile, &ProcessEnv)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str, source: &dyn VarSource) -> Self {
        let p = profile.to_uppercase();
        let vars = Profiled { profile: &p, source };
        Self {
            gateway: GatewayConfig::from_vars(&vars),
            rserve: RserveConfig::from_vars(&vars),
            scratch: ScratchConfig::from_vars(&vars),
            profile: p,
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  gateway:  listen={}, max_body_bytes={}",
            self.gateway.listen_addr,
            self.gateway.max_body_bytes
        );
        tracing::info!(
            "  rserve:   addr={}, max_pending={}, eval_timeout={}",
            self.rserve.addr,
            self.rserve.max_pending,
            self.rserve
                .eval_timeout_secs
                .map(|s| format!("{s}s"))
                .unwrap_or_else(|| "none".to_string())
        );
        tracing::info!(
            "  scratch:  dir={}, retention={}, timezone={}",
            self.scratch.dir.display(),
            self.scratch.retention,
            self.scratch.zone
        );
    }
}

// ── Gateway ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub listen_addr: String,
    pub max_body_bytes: usize,
}

impl GatewayConfig {
    fn from_vars(vars: &Profiled<'_>) -> Self {
        Self {
            listen_addr: vars.or("LISTEN_ADDR", "localhost:8080"),
            max_body_bytes: vars.parsed("MAX_BODY_BYTES", 16 * 1024 * 1024),
        }
    }
}

// ── Rserve ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RserveConfig {
    /// `host:port` of the Rserve daemon. Must be local.
    pub addr: String,
    /// Requests allowed to queue for, or hold, the single connection.
    pub max_pending: usize,
    /// Per-evaluation timeout; `None` waits forever.
    pub eval_timeout_secs: Option<u64>,
}

impl RserveConfig {
    fn from_vars(vars: &Profiled<'_>) -> Self {
        let timeout: u64 = vars.parsed("RSERVE_EVAL_TIMEOUT_SECS", 0);
        Self {
            addr: vars.or("RSERVE_ADDR", "localhost:6311"),
            max_pending: vars.parsed("RSERVE_MAX_PENDING", 16usize).max(1),
            eval_timeout_secs: (timeout > 0).then_some(timeout),
        }
    }
}

// ── Scratch tables ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScratchConfig {
    pub dir: PathBuf,
    pub retention: ScratchRetention,
    pub zone: ScratchZone,
}

impl ScratchConfig {
    fn from_vars(vars: &Profiled<'_>) -> Self {
        Self {
            dir: vars
                .opt("SCRATCH_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(env::temp_dir),
            retention: vars.parsed("SCRATCH_RETENTION", ScratchRetention::Remove),
            zone: vars.parsed("SCRATCH_TIMEZONE", ScratchZone::Local),
        }
    }
}

/// What happens to a scratch table once the engine has read it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScratchRetention {
    /// Delete after the last evaluation attempt.
    Remove,
    /// Leave on disk for debugging.
    Keep,
}

impl FromStr for ScratchRetention {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "remove" => Ok(Self::Remove),
            "keep" => Ok(Self::Keep),
            _ => Err(CoreError::InvalidSetting {
                key: "SCRATCH_RETENTION",
                value: s.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for ScratchRetention {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Remove => "remove",
            Self::Keep => "keep",
        })
    }
}

/// Zone used to render scratch-table timestamps as naive datetimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScratchZone {
    Local,
    Utc,
}

impl FromStr for ScratchZone {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "utc" => Ok(Self::Utc),
            _ => Err(CoreError::InvalidSetting {
                key: "SCRATCH_TIMEZONE",
                value: s.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for ScratchZone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Local => "local",
            Self::Utc => "utc",
        })
    }
}
