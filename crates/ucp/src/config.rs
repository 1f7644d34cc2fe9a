//! Bootstrap configuration (spec §4.2 "populated from a declarative config
//! at bootstrap", §6 "Config (environment)"), loaded once from a YAML file.

use deploy::environment::Environment;
use planes::PlaneConfig;
use serde::Deserialize;
use std::net::SocketAddr;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub listen_addr: SocketAddr,
    #[serde(default)]
    pub planes: PlaneConfig,
    #[serde(default)]
    pub environments: Vec<Environment>,
    /// Base URL of an OCI distribution-compatible registry, used to fetch
    /// bicep templates (spec §4.5.3 step 2).
    pub oci_registry_url: url::Url,
    /// Base URL of the deployment engine, invoked as a black box (spec §1).
    pub deployment_engine_url: url::Url,
}

pub fn load(path: &std::path::Path) -> anyhow::Result<Config> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&raw)?)
}
