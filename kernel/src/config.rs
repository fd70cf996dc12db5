//! Declarative kernel configuration, loaded from YAML.
//!
//! ```yaml
//! delegate_factory:
//!   enabled: true
//! forwards:
//!   - alias: primary-cache
//!     target: cache:tier=memory
//! queries:
//!   secure-common: common:secure=true
//! ```

use crate::error::{Error, Result};
use crate::kernel::Kernel;
use crate::naming::NamingKey;

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct KernelConfig {
  #[serde(default)]
  pub delegate_factory: DelegateFactoryConfig,
  #[serde(default)]
  pub forwards: Vec<ForwardConfig>,
  /// Alias -> compound naming query.
  #[serde(default)]
  pub queries: BTreeMap<String, NamingKey>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DelegateFactoryConfig {
  #[serde(default = "default_enabled")]
  pub enabled: bool,
}

impl Default for DelegateFactoryConfig {
  fn default() -> Self {
    Self { enabled: true }
  }
}

fn default_enabled() -> bool {
  true
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ForwardConfig {
  pub alias: String,
  pub target: String,
}

impl KernelConfig {
  pub fn from_yaml_str(text: &str) -> Result<Self> {
    serde_yaml::from_str(text).map_err(|e| Error::ConfigParse(e.to_string()))
  }

  pub fn from_path(path: &Path) -> Result<Self> {
    let file = File::open(path)?;
    let reader = io::BufReader::new(file);
    serde_yaml::from_reader(reader).map_err(|e| Error::ConfigParse(e.to_string()))
  }

  /// Installs the named queries, then the forwards, on an existing kernel.
  /// Stops at the first alias that collides with a registered name.
  pub fn apply(&self, kernel: &Kernel) -> Result<()> {
    for (alias, key) in &self.queries {
      kernel.add_named_query(alias.clone(), key.clone())?;
    }
    for forward in &self.forwards {
      kernel.register_forwarding(forward.alias.clone(), forward.target.clone())?;
    }
    tracing::debug!(
      queries = self.queries.len(),
      forwards = self.forwards.len(),
      "applied kernel configuration"
    );
    Ok(())
  }
}
