use anyhow::Error;
use clap::Parser;
use serde::Deserialize;

#[derive(Parser, Debug)]
#[command(version = crate::version::get_short_version())]
pub struct Cli {
    #[clap(long, default_value = "callbridge.toml")]
    pub conf: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub http_addr: String,
    pub log_level: Option<String>,
    pub log_file: Option<String>,
    /// Public origin the telephony provider can reach for webhook callbacks,
    /// e.g. "https://calls.example.org".
    pub public_origin: String,
    /// When set, every outbound leg dials this number instead of the record's
    /// target. Test environments only.
    pub target_number_override: Option<String>,
    pub provider: ProviderConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub account_sid: String,
    pub auth_token: String,
    /// The fixed number humans dial to reach the bridge; also the caller id
    /// presented on the outbound leg.
    pub source_number: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_addr: "0.0.0.0:8080".to_string(),
            log_level: None,
            log_file: None,
            public_origin: "http://localhost:8080".to_string(),
            target_number_override: None,
            provider: ProviderConfig::default(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.telephony.example.com/v1".to_string(),
            account_sid: String::new(),
            auth_token: String::new(),
            source_number: String::new(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Provider credentials and the test destination override come from the
    /// environment when present, so secrets stay out of config files.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(sid) = std::env::var("PROVIDER_ACCOUNT_SID") {
            self.provider.account_sid = sid;
        }
        if let Ok(token) = std::env::var("PROVIDER_AUTH_TOKEN") {
            self.provider.auth_token = token;
        }
        if let Ok(number) = std::env::var("PROVIDER_SOURCE_NUMBER") {
            self.provider.source_number = number;
        }
        if let Ok(origin) = std::env::var("PUBLIC_ORIGIN") {
            self.public_origin = origin;
        }
        if let Ok(target) = std::env::var("TARGET_NUMBER_OVERRIDE") {
            if !target.is_empty() {
                self.target_number_override = Some(target);
            }
        }
    }
}
