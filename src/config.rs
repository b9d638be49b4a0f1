use std::path::Path;

use serde::Deserialize;
use smart_default::SmartDefault;

use crate::driver::ReducePolicy;
use crate::error::{Error, Result};
use crate::opts::DelegateOpts;

/// Daemon configuration, loaded from a TOML file:
///
/// ```toml
/// listen = "0.0.0.0:5032"
/// reduce-policy = "first-reply"
/// delegates = [
///     "mysql://db0.internal:3306/shard_0",
///     "mysql://db1.internal:3306/shard_1",
/// ]
/// ```
#[derive(Debug, Clone, Deserialize, SmartDefault)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct ProxyConfig {
    /// Address the daemon listens on.
    #[default("0.0.0.0:5032".to_string())]
    pub listen: String,

    /// How per-delegate replies collapse into the client's reply.
    pub reduce_policy: ReducePolicy,

    /// One `mysql://` URL per delegate; fan-out order follows list order.
    pub delegates: Vec<String>,
}

impl ProxyConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            Error::BadConfig(format!("cannot read {}: {}", path.display(), err))
        })?;
        toml::from_str(&raw)
            .map_err(|err| Error::BadConfig(format!("cannot parse {}: {}", path.display(), err)))
    }

    /// Parse the delegate URLs. Errors on an empty list: a proxy with nothing
    /// behind it cannot answer anything.
    pub fn delegate_opts(&self) -> Result<Vec<DelegateOpts>> {
        if self.delegates.is_empty() {
            return Err(Error::BadConfig("no delegates configured".to_string()));
        }
        self.delegates
            .iter()
            .map(|url| DelegateOpts::try_from(url.as_str()))
            .collect()
    }
}
