//! Configuration: connection settings and the optional TOML config file.
//!
//! Precedence (highest wins): CLI flag, environment variable, config file.
//! Flags and environment variables are merged by the CLI layer before they
//! reach [`resolve_connection`]; the file is the last fallback.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::client::Exclusion;
use crate::error::SyncError;
use crate::mapping::{
    DEFAULT_LINKED_TYPES, DEFAULT_ROOT_TYPES, DEFAULT_TARGET_ROOT_TYPE, IdentityMapper, TypeMapper,
};
use crate::model::fields;

/// Default bound on ids fetched per enumeration page.
pub const DEFAULT_PAGE_SIZE: usize = 200;

/// Which side of the replication a connection belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Source,
    Target,
}

impl Side {
    const fn names(self) -> [(&'static str, &'static str, &'static str); 3] {
        match self {
            Self::Source => [
                ("source_org", "--source-org", "ADO_SOURCE_ORG_URL"),
                ("source_project", "--source-project", "ADO_SOURCE_PROJECT"),
                ("source_pat", "--source-pat", "ADO_SOURCE_PAT"),
            ],
            Self::Target => [
                ("target_org", "--target-org", "ADO_TARGET_ORG_URL"),
                ("target_project", "--target-project", "ADO_TARGET_PROJECT"),
                ("target_pat", "--target-pat", "ADO_TARGET_PAT"),
            ],
        }
    }
}

/// A fully resolved connection to one organization and project.
#[derive(Clone, PartialEq, Eq)]
pub struct Connection {
    pub org_url: String,
    pub project: String,
    pub pat: String,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("org_url", &self.org_url)
            .field("project", &self.project)
            .field("pat", &"<redacted>")
            .finish()
    }
}

/// Connection settings as found in one layer; any of them may be missing.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialConnection {
    #[serde(default)]
    pub org_url: Option<String>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub pat: Option<String>,
}

impl fmt::Debug for PartialConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartialConnection")
            .field("org_url", &self.org_url)
            .field("project", &self.project)
            .field("pat", &self.pat.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn present(value: Option<&String>) -> Option<String> {
    value
        .map(|raw| raw.trim())
        .filter(|raw| !raw.is_empty())
        .map(ToString::to_string)
}

/// Merge a higher-precedence layer over the config file and require every setting.
///
/// # Errors
///
/// Returns [`SyncError::MissingSetting`] naming the first absent setting.
pub fn resolve_connection(
    side: Side,
    layered: &PartialConnection,
    file: &PartialConnection,
) -> Result<Connection, SyncError> {
    let [org, project, pat] = side.names();
    let pick = |primary: Option<&String>, fallback: Option<&String>, names: (&'static str, &'static str, &'static str)| {
        present(primary)
            .or_else(|| present(fallback))
            .ok_or(SyncError::MissingSetting {
                name: names.0,
                flag: names.1,
                env: names.2,
            })
    };

    Ok(Connection {
        org_url: pick(layered.org_url.as_ref(), file.org_url.as_ref(), org)?,
        project: pick(layered.project.as_ref(), file.project.as_ref(), project)?,
        pat: pick(layered.pat.as_ref(), file.pat.as_ref(), pat)?,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default)]
    pub area_root: Option<String>,
    #[serde(default)]
    pub iteration_root: Option<String>,
    #[serde(default)]
    pub force_root: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default)]
    pub exclude_field: Option<String>,
    #[serde(default)]
    pub exclude_value: Option<String>,
}

impl FilterConfig {
    /// The exclusion predicate, only when both halves are present.
    #[must_use]
    pub fn exclusion(&self) -> Option<Exclusion> {
        Some(Exclusion {
            field: present(self.exclude_field.as_ref())?,
            value: present(self.exclude_value.as_ref())?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypesConfig {
    #[serde(default = "default_root_types")]
    pub root: Vec<String>,
    #[serde(default = "default_target_root")]
    pub target_root: String,
    #[serde(default = "default_linked_types")]
    pub linked: BTreeMap<String, String>,
}

impl Default for TypesConfig {
    fn default() -> Self {
        Self {
            root: default_root_types(),
            target_root: default_target_root(),
            linked: default_linked_types(),
        }
    }
}

impl TypesConfig {
    #[must_use]
    pub fn mapper(&self) -> TypeMapper {
        TypeMapper::new(self.root.clone(), &self.target_root, self.linked.clone())
    }
}

/// Contents of `config.toml`. Every key is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default = "default_correlation_field")]
    pub correlation_field: String,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub source: PartialConnection,
    #[serde(default)]
    pub target: PartialConnection,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub types: TypesConfig,
    #[serde(default)]
    pub users: BTreeMap<String, String>,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            correlation_field: default_correlation_field(),
            page_size: default_page_size(),
            timeout_secs: None,
            source: PartialConnection::default(),
            target: PartialConnection::default(),
            paths: PathsConfig::default(),
            filter: FilterConfig::default(),
            types: TypesConfig::default(),
            users: BTreeMap::new(),
        }
    }
}

impl FileConfig {
    #[must_use]
    pub fn identity_mapper(&self) -> IdentityMapper {
        IdentityMapper::new(self.users.clone())
    }

    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Reject values that would make a run meaningless.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConfig`] describing the first bad value.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.correlation_field.trim().is_empty() {
            return Err(SyncError::InvalidConfig(
                "correlation_field must not be empty".to_string(),
            ));
        }
        if self.page_size == 0 {
            return Err(SyncError::InvalidConfig(
                "page_size must be at least 1".to_string(),
            ));
        }
        if self.types.root.is_empty() {
            return Err(SyncError::InvalidConfig(
                "types.root must list at least one type".to_string(),
            ));
        }
        Ok(())
    }
}

/// Default location: `<config_dir>/witsync/config.toml`.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("witsync").join("config.toml"))
}

/// Parse config text.
///
/// # Errors
///
/// Returns [`SyncError::ConfigParse`] when the TOML is malformed or the
/// values fail validation.
pub fn parse_config(content: &str, path: &Path) -> Result<FileConfig, SyncError> {
    let config = toml::from_str::<FileConfig>(content).map_err(|err| SyncError::ConfigParse {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    config.validate()?;
    Ok(config)
}

/// Load the config file. An explicit path must exist; the default path may not.
///
/// # Errors
///
/// Fails when an explicit file is missing, unreadable, or invalid.
pub fn load_config(explicit: Option<&Path>) -> Result<FileConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match default_config_path() {
            Some(path) if path.exists() => path,
            _ => return Ok(FileConfig::default()),
        },
    };

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    Ok(parse_config(&content, &path)?)
}

fn default_correlation_field() -> String {
    fields::REFLECTED_WORK_ITEM_ID.to_string()
}

const fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_root_types() -> Vec<String> {
    DEFAULT_ROOT_TYPES.iter().map(ToString::to_string).collect()
}

fn default_target_root() -> String {
    DEFAULT_TARGET_ROOT_TYPE.to_string()
}

fn default_linked_types() -> BTreeMap<String, String> {
    DEFAULT_LINKED_TYPES
        .iter()
        .map(|(from, to)| ((*from).to_string(), (*to).to_string()))
        .collect()
}
