//! Durable artifacts created and removed in lockstep with member actions.
//!
//! Generated robot credentials are stored as a `kubernetes.io/dockerconfigjson`
//! secret, one file per (registry, project, member), so that adding and then
//! removing a member round-trips to a clean directory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use regfleet_core::{Credentials, Error, Result};

/// Secret type of persisted credentials.
pub const DOCKER_CONFIG_SECRET_TYPE: &str = "kubernetes.io/dockerconfigjson";

/// Key of the docker config inside the secret.
pub const DOCKER_CONFIG_KEY: &str = ".dockerconfigjson";

/// Annotation carrying the project name.
pub const PROJECT_NAME_ANNOTATION: &str = "regfleet.io/project-name";

/// Annotation carrying the registry name.
pub const REGISTRY_NAME_ANNOTATION: &str = "regfleet.io/registry-name";

/// Identity of one persisted credential.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CredentialKey {
    /// Registry name.
    pub registry: String,
    /// Project name.
    pub project: String,
    /// Member name.
    pub member: String,
}

impl CredentialKey {
    /// Creates a credential key.
    pub fn new(
        registry: impl Into<String>,
        project: impl Into<String>,
        member: impl Into<String>,
    ) -> Self {
        Self {
            registry: registry.into(),
            project: project.into(),
            member: member.into(),
        }
    }

    /// Returns the file name the credential is stored under.
    pub fn file_name(&self) -> String {
        format!("{}_{}_{}_creds.yaml", self.registry, self.project, self.member)
    }
}

impl std::fmt::Display for CredentialKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.registry, self.project, self.member)
    }
}

/// Serialization of the persisted secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SecretFormat {
    /// YAML document.
    #[default]
    Yaml,
    /// JSON document.
    Json,
}

impl FromStr for SecretFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "yaml" => Ok(Self::Yaml),
            "json" => Ok(Self::Json),
            other => Err(Error::configuration(format!(
                "unknown secret format '{other}', expected 'yaml' or 'json'"
            ))),
        }
    }
}

/// Where and how side effects are persisted.
#[derive(Debug, Clone)]
pub struct SideEffectContext {
    dir: PathBuf,
    format: SecretFormat,
}

impl SideEffectContext {
    /// Creates a context persisting into `dir`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the directory cannot be created.
    pub fn new(dir: impl Into<PathBuf>, format: SecretFormat) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            Error::configuration(format!(
                "credential directory {} is unusable: {e}",
                dir.display()
            ))
        })?;
        Ok(Self { dir, format })
    }

    /// Returns the persistence directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the path a credential is stored at.
    pub fn path_for(&self, key: &CredentialKey) -> PathBuf {
        self.dir.join(key.file_name())
    }
}

/// Artifact produced by a member action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideEffect {
    /// Nothing to persist.
    None,
    /// Store generated credentials.
    PersistCredentials {
        /// Credential identity.
        key: CredentialKey,
        /// API endpoint the credentials authenticate against.
        endpoint: String,
        /// Generated credentials.
        credentials: Credentials,
    },
    /// Delete previously stored credentials.
    RemoveCredentials {
        /// Credential identity.
        key: CredentialKey,
    },
}

impl SideEffect {
    /// Returns true if there is nothing to do.
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Applies the side effect.
    ///
    /// A no-op never needs a context.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] without a context, or
    /// [`Error::Recoverable`] if the file cannot be written or is missing on
    /// removal.
    pub fn perform(&self, context: Option<&SideEffectContext>) -> Result<()> {
        if self.is_none() {
            return Ok(());
        }
        let context = context.ok_or_else(|| {
            Error::configuration("no credential persistence directory is configured")
        })?;

        match self {
            Self::None => Ok(()),
            Self::PersistCredentials {
                key,
                endpoint,
                credentials,
            } => {
                let secret = credentials_secret(key, endpoint, credentials)?;
                let content = match context.format {
                    SecretFormat::Yaml => serde_yaml::to_string(&secret)
                        .map_err(|e| Error::configuration(format!("cannot encode secret: {e}")))?,
                    SecretFormat::Json => serde_json::to_string_pretty(&secret)
                        .map_err(|e| Error::configuration(format!("cannot encode secret: {e}")))?,
                };
                let path = context.path_for(key);
                std::fs::write(&path, content).map_err(|e| {
                    Error::recoverable(format!("failed to write {}: {e}", path.display()))
                })?;
                info!(credential = %key, path = %path.display(), "persisted credentials");
                Ok(())
            }
            Self::RemoveCredentials { key } => {
                let path = context.path_for(key);
                std::fs::remove_file(&path).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::NotFound {
                        Error::recoverable(format!(
                            "credential file {} does not exist",
                            path.display()
                        ))
                    } else {
                        Error::recoverable(format!("failed to remove {}: {e}", path.display()))
                    }
                })?;
                info!(credential = %key, path = %path.display(), "removed credentials");
                Ok(())
            }
        }
    }
}

impl std::fmt::Display for SideEffect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::PersistCredentials { key, .. } => write!(f, "persist credentials {}", key.file_name()),
            Self::RemoveCredentials { key } => write!(f, "remove credentials {}", key.file_name()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct DockerConfig {
    auths: BTreeMap<String, DockerAuth>,
}

#[derive(Debug, Serialize, Deserialize)]
struct DockerAuth {
    auth: String,
}

fn credentials_secret(
    key: &CredentialKey,
    endpoint: &str,
    credentials: &Credentials,
) -> Result<Secret> {
    let auth = STANDARD.encode(format!("{}:{}", credentials.username, credentials.password));
    let config = DockerConfig {
        auths: BTreeMap::from([(endpoint.to_string(), DockerAuth { auth })]),
    };
    let docker_config = serde_json::to_string(&config)
        .map_err(|e| Error::configuration(format!("cannot encode docker config: {e}")))?;

    Ok(Secret {
        metadata: ObjectMeta {
            name: Some(key.member.clone()),
            annotations: Some(BTreeMap::from([
                (PROJECT_NAME_ANNOTATION.to_string(), key.project.clone()),
                (REGISTRY_NAME_ANNOTATION.to_string(), key.registry.clone()),
            ])),
            ..ObjectMeta::default()
        },
        type_: Some(DOCKER_CONFIG_SECRET_TYPE.to_string()),
        string_data: Some(BTreeMap::from([(
            DOCKER_CONFIG_KEY.to_string(),
            docker_config,
        )])),
        ..Secret::default()
    })
}

/// Credentials read back from a persisted secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCredentials {
    /// API endpoint the credentials belong to.
    pub endpoint: String,
    /// Username and password.
    pub credentials: Credentials,
}

/// Reads a persisted credential file.
///
/// Both serializations are accepted.
///
/// # Errors
///
/// Returns [`Error::Recoverable`] if the file is missing, or
/// [`Error::Configuration`] if it does not hold a docker config secret.
pub fn read_credentials(path: impl AsRef<Path>) -> Result<StoredCredentials> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::recoverable(format!("cannot read credential file {}: {e}", path.display()))
    })?;
    let scheme_error =
        |reason: &str| Error::configuration(format!("{}: {reason}", path.display()));

    let secret: Secret = serde_yaml::from_str(&content)
        .map_err(|e| scheme_error(&format!("not a secret: {e}")))?;
    if secret.type_.as_deref() != Some(DOCKER_CONFIG_SECRET_TYPE) {
        return Err(scheme_error("unexpected secret type"));
    }

    let raw = match secret
        .string_data
        .as_ref()
        .and_then(|data| data.get(DOCKER_CONFIG_KEY))
    {
        Some(value) => value.clone(),
        None => secret
            .data
            .as_ref()
            .and_then(|data| data.get(DOCKER_CONFIG_KEY))
            .map(|bytes| String::from_utf8_lossy(&bytes.0).into_owned())
            .ok_or_else(|| scheme_error("no docker config entry"))?,
    };

    let config: DockerConfig =
        serde_json::from_str(&raw).map_err(|e| scheme_error(&format!("bad docker config: {e}")))?;
    let (endpoint, entry) = config
        .auths
        .into_iter()
        .next()
        .ok_or_else(|| scheme_error("empty auths map"))?;
    let decoded = STANDARD
        .decode(entry.auth.as_bytes())
        .map_err(|e| scheme_error(&format!("auth is not base64: {e}")))?;
    let decoded = String::from_utf8(decoded).map_err(|_| scheme_error("auth is not UTF-8"))?;
    let (username, password) = decoded
        .split_once(':')
        .ok_or_else(|| scheme_error("auth is not user:password"))?;

    debug!(path = %path.display(), endpoint = %endpoint, "read persisted credentials");
    Ok(StoredCredentials {
        endpoint,
        credentials: Credentials::new(username, password),
    })
}
