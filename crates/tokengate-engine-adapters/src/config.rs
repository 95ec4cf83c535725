#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeProfile {
    /// Real provider surfaces required; missing ones disable the adapter.
    Production,
    /// Missing surfaces fall back to the deterministic in-memory chain.
    Development,
}

#[derive(Debug, Clone)]
pub struct AdapterConfig {
    pub runtime_profile: RuntimeProfile,
    pub eip1193_proxy_url: Option<String>,
    pub tron_proxy_url: Option<String>,
    /// Account the Tron proxy bridge signs for; the key itself never leaves
    /// the bridge.
    pub tron_account: Option<String>,
    pub http_timeout_ms: u64,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            runtime_profile: RuntimeProfile::Development,
            eip1193_proxy_url: None,
            tron_proxy_url: None,
            tron_account: None,
            http_timeout_ms: 15_000,
        }
    }
}

impl AdapterConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(profile) = std::env::var("TOKENGATE_RUNTIME_PROFILE") {
            if profile.eq_ignore_ascii_case("production") {
                config.runtime_profile = RuntimeProfile::Production;
            }
        }
        if let Ok(url) = std::env::var("TOKENGATE_EIP1193_PROXY_URL") {
            if !url.is_empty() {
                config.eip1193_proxy_url = Some(url);
            }
        }
        if let Ok(url) = std::env::var("TOKENGATE_TRON_PROXY_URL") {
            if !url.is_empty() {
                config.tron_proxy_url = Some(url);
            }
        }
        if let Ok(account) = std::env::var("TOKENGATE_TRON_ACCOUNT") {
            if !account.is_empty() {
                config.tron_account = Some(account);
            }
        }
        if let Ok(timeout) = std::env::var("TOKENGATE_HTTP_TIMEOUT_MS") {
            if let Ok(parsed) = timeout.parse() {
                config.http_timeout_ms = parsed;
            }
        }
        config
    }

    pub fn strict_runtime_required(&self) -> bool {
        self.runtime_profile == RuntimeProfile::Production
    }
}
