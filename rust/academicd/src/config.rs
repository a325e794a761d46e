use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const ENV_API_BASE: &str = "ACADEMICD_API_BASE";
pub const ENV_API_TIMEOUT: &str = "ACADEMICD_API_TIMEOUT_SECS";
pub const ENV_LOG: &str = "ACADEMICD_LOG";

/// Settings key holding the per-workspace override.
pub const SETTINGS_KEY: &str = "setup.backend";

const DEFAULT_API_BASE: &str = "http://localhost:5000";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SIGNATURE_KEY: &str = "applicantSignature";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackendConfig {
    pub api_base_url: String,
    pub timeout_secs: u64,
    /// `keyInsert` used when a template declares no signature field.
    pub default_signature_key: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            default_signature_key: DEFAULT_SIGNATURE_KEY.to_string(),
        }
    }
}

impl BackendConfig {
    /// Defaults overridden by `ACADEMICD_API_BASE` / `ACADEMICD_API_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(base) = std::env::var(ENV_API_BASE) {
            if !base.trim().is_empty() {
                cfg.api_base_url = base.trim().to_string();
            }
        }
        if let Ok(raw) = std::env::var(ENV_API_TIMEOUT) {
            match raw.trim().parse::<u64>() {
                Ok(secs) if (1..=600).contains(&secs) => cfg.timeout_secs = secs,
                _ => tracing::warn!(value = %raw, "ignoring invalid {}", ENV_API_TIMEOUT),
            }
        }
        cfg
    }

    /// Applies a partial update. Unknown keys and bad values are rejected
    /// without touching `self`.
    pub fn apply_patch(&mut self, patch: &Value) -> Result<(), String> {
        let obj = patch
            .as_object()
            .ok_or_else(|| "patch must be an object".to_string())?;
        let mut next = self.clone();
        for (key, v) in obj {
            match key.as_str() {
                "apiBaseUrl" => {
                    let s = parse_string_max(v, key, 512)?;
                    if !(s.starts_with("http://") || s.starts_with("https://")) {
                        return Err("apiBaseUrl must start with http:// or https://".into());
                    }
                    next.api_base_url = s;
                }
                "timeoutSecs" => {
                    next.timeout_secs = parse_u64_range(v, key, 1, 600)?;
                }
                "defaultSignatureKey" => {
                    let s = parse_string_max(v, key, 128)?;
                    if s.is_empty() {
                        return Err("defaultSignatureKey must not be empty".into());
                    }
                    next.default_signature_key = s;
                }
                other => return Err(format!("unknown setting: {}", other)),
            }
        }
        *self = next;
        Ok(())
    }

    /// Keys that differ from `base`; this is what gets stored per workspace.
    pub fn diff_from(&self, base: &BackendConfig) -> Value {
        let mut out = Map::new();
        if self.api_base_url != base.api_base_url {
            out.insert("apiBaseUrl".into(), Value::from(self.api_base_url.clone()));
        }
        if self.timeout_secs != base.timeout_secs {
            out.insert("timeoutSecs".into(), Value::from(self.timeout_secs));
        }
        if self.default_signature_key != base.default_signature_key {
            out.insert(
                "defaultSignatureKey".into(),
                Value::from(self.default_signature_key.clone()),
            );
        }
        Value::Object(out)
    }
}

fn parse_u64_range(v: &Value, key: &str, min: u64, max: u64) -> Result<u64, String> {
    let n = v
        .as_u64()
        .ok_or_else(|| format!("{} must be a positive integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.len() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    Ok(s.to_string())
}
