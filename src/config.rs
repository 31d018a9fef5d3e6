//! Supabase configuration parsed from environment variables.

pub const DEFAULT_PROFILES_TABLE: &str = "profiles";
pub const DEFAULT_ROLE_COLUMN: &str = "role";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing config: env var {var} not set")]
    Missing { var: &'static str },
    #[error("invalid config value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupabaseConfig {
    /// Project URL without a trailing slash, e.g. `https://xyz.supabase.co`.
    pub url: String,
    /// Public anon key sent as `apikey` on every request.
    pub anon_key: String,
    pub profiles_table: String,
    pub role_column: String,
    pub timeouts: HttpTimeouts,
}

impl SupabaseConfig {
    /// Build a config with default table, column and timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `url` is not an http(s) URL or
    /// `anon_key` is blank.
    pub fn new(url: &str, anon_key: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            url: normalize_url(url)?,
            anon_key: non_blank("SUPABASE_ANON_KEY", anon_key)?,
            profiles_table: DEFAULT_PROFILES_TABLE.to_owned(),
            role_column: DEFAULT_ROLE_COLUMN.to_owned(),
            timeouts: HttpTimeouts::default(),
        })
    }

    /// Build typed Supabase config from environment variables.
    ///
    /// Required:
    /// - `SUPABASE_URL`
    /// - `SUPABASE_ANON_KEY`
    ///
    /// Optional:
    /// - `SUPABASE_PROFILES_TABLE`: default `profiles`
    /// - `SUPABASE_ROLE_COLUMN`: default `role`
    /// - `SUPABASE_REQUEST_TIMEOUT_SECS`: default 30
    /// - `SUPABASE_CONNECT_TIMEOUT_SECS`: default 10
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a value is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let url = std::env::var("SUPABASE_URL").map_err(|_| ConfigError::Missing { var: "SUPABASE_URL" })?;
        let anon_key =
            std::env::var("SUPABASE_ANON_KEY").map_err(|_| ConfigError::Missing { var: "SUPABASE_ANON_KEY" })?;

        let mut config = Self::new(&url, &anon_key)?;
        if let Ok(table) = std::env::var("SUPABASE_PROFILES_TABLE") {
            config.profiles_table = non_blank("SUPABASE_PROFILES_TABLE", &table)?;
        }
        if let Ok(column) = std::env::var("SUPABASE_ROLE_COLUMN") {
            config.role_column = non_blank("SUPABASE_ROLE_COLUMN", &column)?;
        }
        config.timeouts = HttpTimeouts {
            request_secs: env_parse_u64("SUPABASE_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_secs: env_parse_u64("SUPABASE_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
        };
        Ok(config)
    }

    #[must_use]
    pub fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.url, path.trim_start_matches('/'))
    }

    #[must_use]
    pub fn rest_url(&self, path: &str) -> String {
        format!("{}/rest/v1/{}", self.url, path.trim_start_matches('/'))
    }
}

fn normalize_url(raw: &str) -> Result<String, ConfigError> {
    let url = raw.trim().trim_end_matches('/');
    if !(url.starts_with("https://") || url.starts_with("http://")) {
        return Err(ConfigError::Invalid { var: "SUPABASE_URL", reason: format!("expected http(s) URL, got '{raw}'") });
    }
    if url.split("://").nth(1).is_none_or(str::is_empty) {
        return Err(ConfigError::Invalid { var: "SUPABASE_URL", reason: "missing host".into() });
    }
    Ok(url.to_owned())
}

fn non_blank(var: &'static str, raw: &str) -> Result<String, ConfigError> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(ConfigError::Invalid { var, reason: "empty value".into() });
    }
    Ok(value.to_owned())
}

fn env_parse_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
