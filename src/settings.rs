use config::{Config, ConfigError, File, FileFormat};
use ethers::types::Address;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::Path;

use crate::registry::DEFAULT_SAFETY_WINDOW;

#[derive(Debug, Deserialize, Clone)]
pub struct Router {
    /// Dispatcher contract the encoded programs are submitted to.
    pub address: Address,
    pub wrapped_native: Address,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Venues {
    /// Vault shared by every balancer pool; spender and funding target of balancer hops.
    #[serde(default)]
    pub balancer_vault: Address,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Registry {
    pub admin: Address,
    #[serde(default = "default_safety_window_blocks")]
    pub safety_window_blocks: u64,
}

fn default_safety_window_blocks() -> u64 {
    DEFAULT_SAFETY_WINDOW
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub router: Router,
    /// Venue identifier -> executor contract address.
    #[serde(default)]
    pub executors: HashMap<String, Address>,
    #[serde(default)]
    pub venues: Venues,
    pub registry: Registry,
}

impl Settings {
    /// Reads `Config.toml` from the working directory, then applies `SDK_*`
    /// environment overrides (a `.env` file is loaded first when present).
    pub fn new() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        let s = Config::builder()
            .add_source(File::with_name("Config.toml"))
            .build()?;
        Self::finish(s)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::from(path.as_ref()).format(FileFormat::Toml))
            .build()?;
        Self::finish(s)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::from_str(raw, FileFormat::Toml))
            .build()?;
        Self::finish(s)
    }

    pub fn executor_address(&self, venue: &str) -> Option<Address> {
        self.executors.get(venue).copied()
    }

    /// Executors sorted by venue identifier.
    pub fn sorted_executors(&self) -> Vec<(&str, Address)> {
        let mut entries: Vec<(&str, Address)> = self
            .executors
            .iter()
            .map(|(venue, address)| (venue.as_str(), *address))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }

    fn finish(s: Config) -> Result<Self, ConfigError> {
        let mut settings: Self = s.try_deserialize()?;
        apply_env_overrides(&mut settings);
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.router.address.is_zero() {
            return Err(ConfigError::Message("router.address must be set".to_string()));
        }
        if self.router.wrapped_native.is_zero() {
            return Err(ConfigError::Message("router.wrapped_native must be set".to_string()));
        }
        if let Some((venue, _)) = self.executors.iter().find(|(_, address)| address.is_zero()) {
            return Err(ConfigError::Message(format!("executor for {} has the zero address", venue)));
        }
        Ok(())
    }
}

fn apply_env_overrides(settings: &mut Settings) {
    if let Some(addr) = env_address("SDK_ROUTER_ADDRESS") {
        settings.router.address = addr;
    }
    if let Some(addr) = env_address("SDK_ROUTER_WRAPPED_NATIVE") {
        settings.router.wrapped_native = addr;
    }
    if let Some(addr) = env_address("SDK_VENUES_BALANCER_VAULT") {
        settings.venues.balancer_vault = addr;
    }
    if let Ok(raw) = env::var("SDK_REGISTRY_SAFETY_WINDOW_BLOCKS") {
        match raw.trim().parse::<u64>() {
            Ok(window) => settings.registry.safety_window_blocks = window,
            Err(e) => log::warn!("ignoring SDK_REGISTRY_SAFETY_WINDOW_BLOCKS={}: {}", raw, e),
        }
    }

    // JSON object: { "venue": "0xexecutor" }
    if let Ok(raw) = env::var("SDK_EXECUTORS") {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            match serde_json::from_str::<HashMap<String, Address>>(trimmed) {
                Ok(map) => settings.executors.extend(map),
                Err(e) => log::warn!("failed to parse SDK_EXECUTORS as JSON: {}", e),
            }
        }
    }
}

fn env_address(key: &str) -> Option<Address> {
    let raw = env::var(key).ok()?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.parse() {
        Ok(addr) => Some(addr),
        Err(e) => {
            log::warn!("ignoring {}={}: {}", key, trimmed, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
[router]
address = "0x00000000000000000000000000000000000000d1"
wrapped_native = "0x000000000000000000000000000000000000eeee"

[executors]
uniswap_v2 = "0x00000000000000000000000000000000000000e2"
curve = "0x00000000000000000000000000000000000000e4"

[registry]
admin = "0x0000000000000000000000000000000000000001"
"#;

    #[test]
    fn test_from_toml_str_defaults() {
        let settings = Settings::from_toml_str(SAMPLE).unwrap();
        assert_eq!(settings.router.address, Address::from_low_u64_be(0xd1));
        assert_eq!(settings.registry.safety_window_blocks, DEFAULT_SAFETY_WINDOW);
        assert!(settings.venues.balancer_vault.is_zero());
        let venues: Vec<&str> = settings.sorted_executors().into_iter().map(|(v, _)| v).collect();
        assert_eq!(venues, vec!["curve", "uniswap_v2"]);
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let settings = Settings::from_path(file.path()).unwrap();
        assert_eq!(
            settings.executor_address("curve"),
            Some(Address::from_low_u64_be(0xe4))
        );
    }

    #[test]
    fn test_zero_router_rejected() {
        let raw = SAMPLE.replace(
            "0x00000000000000000000000000000000000000d1",
            "0x0000000000000000000000000000000000000000",
        );
        assert!(Settings::from_toml_str(&raw).is_err());
    }
}
