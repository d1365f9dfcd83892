use std::env;
use std::path::PathBuf;

use chrono::Duration;

use crate::throttle::ThrottlePolicy;

#[derive(Debug, Clone)]
pub struct PortalConfig {
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub state_file: PathBuf,
    pub login: ThrottlePolicy,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: 5,
            state_file: default_state_file(),
            login: ThrottlePolicy::default(),
        }
    }
}

impl PortalConfig {
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| env::var(key).ok())
    }

    /// Applies overrides from `lookup`. Values that fail to parse keep the
    /// default.
    fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("DATABASE_URL").filter(|v| !v.trim().is_empty()) {
            self.database_url = Some(v);
        }
        if let Some(v) = lookup("PORTAL_MAX_CONNECTIONS") {
            self.max_connections = v.parse().unwrap_or(self.max_connections);
        }
        if let Some(v) = lookup("PORTAL_STATE_FILE").filter(|v| !v.trim().is_empty()) {
            self.state_file = PathBuf::from(v);
        }
        if let Some(v) = lookup("PORTAL_LOGIN_MAX_ATTEMPTS") {
            self.login.max_attempts = v
                .parse()
                .ok()
                .filter(|attempts| *attempts > 0)
                .unwrap_or(self.login.max_attempts);
        }
        if let Some(v) = lookup("PORTAL_LOGIN_COOLDOWN_SECS") {
            if let Ok(secs) = v.parse::<i64>() {
                if secs > 0 {
                    self.login.cooldown = Duration::seconds(secs);
                }
            }
        }
        self
    }
}

fn default_state_file() -> PathBuf {
    match env::var("HOME") {
        Ok(home) => PathBuf::from(home)
            .join(".config")
            .join("campus-portal")
            .join("state.json"),
        Err(_) => PathBuf::from("campus-portal-state.json"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_with(vars: &[(&str, &str)]) -> PortalConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        PortalConfig::default().with_overrides(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_match_login_policy() {
        let config = config_with(&[]);
        assert_eq!(config.login.max_attempts, 5);
        assert_eq!(config.login.cooldown, Duration::minutes(15));
        assert_eq!(config.max_connections, 5);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn overrides_apply_and_bad_values_fall_back() {
        let config = config_with(&[
            ("DATABASE_URL", "postgres://localhost/portal"),
            ("PORTAL_MAX_CONNECTIONS", "lots"),
            ("PORTAL_STATE_FILE", "/tmp/portal.json"),
            ("PORTAL_LOGIN_MAX_ATTEMPTS", "3"),
            ("PORTAL_LOGIN_COOLDOWN_SECS", "-10"),
        ]);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/portal"));
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.state_file, PathBuf::from("/tmp/portal.json"));
        assert_eq!(config.login.max_attempts, 3);
        assert_eq!(config.login.cooldown, Duration::minutes(15));
    }
}
