//!
//! # Connection provider
//!
//! Resolves the kubeconfig to use and turns it into a shared client.
//!
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use k8_client::{K8Client, SharedK8Client};
use k8_config::{K8Config, KubeConfig, KubeContext};
use tracing::{debug, info};

pub const KUBECONFIG_ENV: &str = "KUBECONFIG";

#[derive(thiserror::Error, Debug)]
pub enum ConnectionError {
    #[error("kubeconfig not found: {}", .0.display())]
    MissingConfig(PathBuf),
    #[error("home directory unknown and {KUBECONFIG_ENV} is not set")]
    NoHomeDir,
    #[error("invalid kubeconfig {}: {reason}", .path.display())]
    InvalidConfig { path: PathBuf, reason: String },
    #[error("unable to create kubernetes client: {0}")]
    Client(String),
}

/// `KUBECONFIG` wins when set and non empty, otherwise `<home>/.kube/config`.
/// When `KUBECONFIG` holds a path list only the first entry is used.
pub fn resolve_kubeconfig_path(
    env: Option<OsString>,
    home: Option<PathBuf>,
) -> Result<PathBuf, ConnectionError> {
    if let Some(first) = env
        .filter(|value| !value.is_empty())
        .and_then(|value| std::env::split_paths(&value).find(|p| !p.as_os_str().is_empty()))
    {
        return Ok(first);
    }

    home.map(|home| home.join(".kube").join("config"))
        .ok_or(ConnectionError::NoHomeDir)
}

/// resolve kubeconfig from the process environment
pub fn resolve_connection() -> Result<K8Config, ConnectionError> {
    let path = resolve_kubeconfig_path(std::env::var_os(KUBECONFIG_ENV), home::home_dir())?;
    info!(path = %path.display(), "using kubeconfig");
    load_kubeconfig(&path)
}

pub fn load_kubeconfig(path: &Path) -> Result<K8Config, ConnectionError> {
    if !path.is_file() {
        return Err(ConnectionError::MissingConfig(path.to_path_buf()));
    }

    let invalid = |reason: String| ConnectionError::InvalidConfig {
        path: path.to_path_buf(),
        reason,
    };

    let config = KubeConfig::from_file(path).map_err(|err| invalid(err.to_string()))?;

    let namespace = config
        .current_context()
        .ok_or_else(|| invalid("no current context".to_owned()))?
        .context
        .namespace()
        .to_owned();

    let api_path = config
        .current_cluster()
        .ok_or_else(|| invalid("current context has no cluster".to_owned()))?
        .cluster
        .server
        .clone();

    debug!(%api_path, %namespace, "kubeconfig loaded");

    Ok(K8Config::KubeConfig(KubeContext {
        namespace,
        api_path,
        config,
    }))
}

/// build a client for a resolved configuration; no retries
pub fn connect(config: K8Config) -> Result<SharedK8Client, ConnectionError> {
    let client = K8Client::new(config).map_err(|err| ConnectionError::Client(err.to_string()))?;
    Ok(Arc::new(client))
}
