// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Configuration loader for bouncer-server.
//!
//! Configuration is assembled with the following precedence (highest to lowest):
//! 1. CLI arguments (applied by the binary)
//! 2. Environment variables (`BOUNCER_*` prefix)
//! 3. Configuration file (YAML)
//! 4. Default values

use super::types::GuardFileConfig;
use crate::guard::{parse_prefix, Category};
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Load configuration from file and environment, then validate it.
///
/// # Arguments
///
/// * `config_path` - Optional path to configuration file. If None, searches default locations.
///
/// # Default Locations
///
/// If no config path is specified, searches in order:
/// 1. `./bouncer.yaml` (current directory)
/// 2. `/etc/bouncer/config.yaml` (system-wide)
/// 3. `$XDG_CONFIG_HOME/bouncer/config.yaml` or `~/.config/bouncer/config.yaml`
///
/// When no file is found the defaults are used.
///
/// # Environment Variables
///
/// - `BOUNCER_BIND_ADDRESS` - Bind address (e.g., "0.0.0.0")
/// - `BOUNCER_PORT` - Listen port
/// - `BOUNCER_WINDOW` - Observation window in seconds
/// - `BOUNCER_SWEEP_INTERVAL` - Sweeper interval in seconds
/// - `BOUNCER_LOGIN_LIMIT` - Capacity of the login category
/// - `BOUNCER_PASSWORD_LIMIT` - Capacity of the password category
/// - `BOUNCER_ADDRESS_LIMIT` - Capacity of the source address category
///
/// # Errors
///
/// Returns an error if:
/// - Configuration file cannot be read or parsed
/// - Environment variables have invalid values
/// - Configuration validation fails
pub fn load_config(config_path: Option<&Path>) -> Result<GuardFileConfig> {
    let mut config = GuardFileConfig::default();

    if let Some(path) = config_path {
        config = load_config_file(path).context("Failed to load configuration file")?;
        tracing::info!(path = %path.display(), "Loaded configuration from file");
    } else {
        for path in default_config_paths() {
            if path.exists() {
                config = load_config_file(&path).context("Failed to load configuration file")?;
                tracing::info!(path = %path.display(), "Loaded configuration from file");
                break;
            }
        }
    }

    config = apply_env_overrides(config)?;

    validate_config(&config)?;

    Ok(config)
}

/// Generate a configuration template as YAML string.
pub fn generate_config_template() -> String {
    let config = GuardFileConfig::default();
    let mut yaml = String::new();

    yaml.push_str("# bouncer-server configuration file\n");
    yaml.push_str("#\n");
    yaml.push_str("# limits.window          observation window in seconds\n");
    yaml.push_str("# limits.sweep_interval  idle bucket sweep interval in seconds (0 = window)\n");
    yaml.push_str("# limits.capacity        attempts admitted per window, per category\n");
    yaml.push_str("# policy.allow/deny      CIDR prefixes that bypass rate limiting\n");
    yaml.push_str("#\n");
    yaml.push_str("# Configuration hierarchy (highest to lowest precedence):\n");
    yaml.push_str("# 1. CLI arguments\n");
    yaml.push_str("# 2. Environment variables (BOUNCER_* prefix)\n");
    yaml.push_str("# 3. This configuration file\n");
    yaml.push_str("# 4. Default values\n\n");

    yaml.push_str(&serde_yaml::to_string(&config).unwrap_or_default());

    yaml
}

fn load_config_file(path: &Path) -> Result<GuardFileConfig> {
    let content =
        std::fs::read_to_string(path).context(format!("Failed to read {}", path.display()))?;

    serde_yaml::from_str(&content).context(format!("Failed to parse {}", path.display()))
}

fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = vec![
        PathBuf::from("./bouncer.yaml"),
        PathBuf::from("/etc/bouncer/config.yaml"),
    ];

    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("bouncer/config.yaml"));
    }

    paths
}

fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(value) => {
            let parsed = value
                .trim()
                .parse()
                .context(format!("Invalid {name} value: {value}"))?;
            tracing::debug!(var = name, value = %value, "Applied environment override");
            Ok(Some(parsed))
        }
        Err(_) => Ok(None),
    }
}

fn apply_env_overrides(mut config: GuardFileConfig) -> Result<GuardFileConfig> {
    if let Ok(addr) = std::env::var("BOUNCER_BIND_ADDRESS") {
        tracing::debug!(address = %addr, "Applied BOUNCER_BIND_ADDRESS override");
        config.server.bind_address = addr;
    }

    if let Some(port) = env_parse("BOUNCER_PORT")? {
        config.server.port = port;
    }

    if let Some(window) = env_parse("BOUNCER_WINDOW")? {
        config.limits.window = window;
    }

    if let Some(interval) = env_parse("BOUNCER_SWEEP_INTERVAL")? {
        config.limits.sweep_interval = interval;
    }

    for (var, category) in [
        ("BOUNCER_LOGIN_LIMIT", Category::Login),
        ("BOUNCER_PASSWORD_LIMIT", Category::Password),
        ("BOUNCER_ADDRESS_LIMIT", Category::SourceAddress),
    ] {
        if let Some(limit) = env_parse(var)? {
            config.limits.capacity.insert(category, limit);
        }
    }

    Ok(config)
}

/// Validate configuration for correctness.
pub fn validate_config(config: &GuardFileConfig) -> Result<()> {
    if config.server.port == 0 {
        anyhow::bail!("Server port cannot be 0");
    }

    if config.server.max_request_bytes == 0 {
        anyhow::bail!("max_request_bytes must be greater than 0");
    }

    if config.server.max_connections == 0 {
        anyhow::bail!("max_connections must be greater than 0");
    }

    if config.limits.window == 0 {
        anyhow::bail!("limits.window must be greater than 0");
    }

    for category in Category::ALL {
        match config.limits.capacity.get(&category) {
            None => anyhow::bail!("No capacity configured for category '{category}'"),
            Some(0) => anyhow::bail!("Capacity for category '{category}' must be greater than 0"),
            Some(_) => {}
        }
    }

    let mut allowed = HashSet::new();
    for cidr in &config.policy.allow {
        let network = parse_prefix(cidr).context("Invalid CIDR notation in policy.allow")?;
        allowed.insert(network);
    }

    for cidr in &config.policy.deny {
        let network = parse_prefix(cidr).context("Invalid CIDR notation in policy.deny")?;
        if allowed.contains(&network) {
            anyhow::bail!("Prefix {network} appears in both policy.allow and policy.deny");
        }
    }

    tracing::info!("Configuration validation passed");
    Ok(())
}
