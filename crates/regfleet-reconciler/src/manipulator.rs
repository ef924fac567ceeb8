//! Persistence of generated cluster objects.
//!
//! The reconciler only ever writes or removes whole objects. Where they end
//! up is decided by the [`ResourceManipulator`] passed in by the caller.

use std::fmt::Debug;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::CronJob;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, DeleteParams, Patch, PatchParams};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{ReconcileError, Result};

/// Field manager used for server-side apply.
pub const FIELD_MANAGER: &str = "regfleet";

/// An object the reconciler manages.
#[derive(Debug, Clone, PartialEq)]
pub enum ManagedResource {
    /// Repository list of a copy-tool job.
    ConfigMap(ConfigMap),
    /// Scheduled copy-tool job.
    CronJob(CronJob),
    /// Persisted credentials.
    Secret(Secret),
}

impl ManagedResource {
    /// Returns the object kind.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ConfigMap(_) => "ConfigMap",
            Self::CronJob(_) => "CronJob",
            Self::Secret(_) => "Secret",
        }
    }

    const fn metadata(&self) -> &ObjectMeta {
        match self {
            Self::ConfigMap(o) => &o.metadata,
            Self::CronJob(o) => &o.metadata,
            Self::Secret(o) => &o.metadata,
        }
    }

    /// Returns the object name, empty if unset.
    pub fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }

    /// Returns the object namespace, if set.
    pub fn namespace(&self) -> Option<&str> {
        self.metadata().namespace.as_deref()
    }

    /// Serializes the object as a YAML manifest.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Serialization`] if encoding fails.
    pub fn to_yaml(&self) -> Result<String> {
        let encoded = match self {
            Self::ConfigMap(o) => serde_yaml::to_string(o),
            Self::CronJob(o) => serde_yaml::to_string(o),
            Self::Secret(o) => serde_yaml::to_string(o),
        };
        encoded.map_err(|e| ReconcileError::Serialization {
            resource: self.to_string(),
            reason: e.to_string(),
        })
    }

    fn require_name(&self) -> Result<&str> {
        let name = self.name();
        if name.is_empty() {
            return Err(ReconcileError::invalid_config(format!(
                "{} without a name cannot be persisted",
                self.kind()
            )));
        }
        Ok(name)
    }
}

impl std::fmt::Display for ManagedResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind(), self.name())
    }
}

/// Writes and removes generated objects.
#[async_trait]
pub trait ResourceManipulator: Send + Sync {
    /// Creates or replaces an object.
    async fn write_resource(&self, resource: &ManagedResource) -> Result<()>;

    /// Removes an object. Removing an absent object succeeds.
    async fn remove_resource(&self, resource: &ManagedResource) -> Result<()>;
}

/// Stores each object as a YAML file in a directory.
#[derive(Debug, Clone)]
pub struct ManifestDirectory {
    dir: PathBuf,
}

impl ManifestDirectory {
    /// Opens (and creates if needed) the manifest directory.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Io`] if the directory cannot be created.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| ReconcileError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    /// Returns the directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the file an object is stored in.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::InvalidConfig`] for an unnamed object.
    pub fn path_for(&self, resource: &ManagedResource) -> Result<PathBuf> {
        let name = resource.require_name()?;
        Ok(self
            .dir
            .join(format!("{}_{name}.yaml", resource.kind().to_ascii_lowercase())))
    }
}

#[async_trait]
impl ResourceManipulator for ManifestDirectory {
    async fn write_resource(&self, resource: &ManagedResource) -> Result<()> {
        let path = self.path_for(resource)?;
        let content = resource.to_yaml()?;
        tokio::fs::write(&path, content)
            .await
            .map_err(|source| ReconcileError::Io {
                path: path.clone(),
                source,
            })?;
        info!(resource = %resource, path = %path.display(), "wrote manifest");
        Ok(())
    }

    async fn remove_resource(&self, resource: &ManagedResource) -> Result<()> {
        let path = self.path_for(resource)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!(resource = %resource, path = %path.display(), "removed manifest");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(resource = %resource, "manifest already absent");
                Ok(())
            }
            Err(source) => Err(ReconcileError::Io { path, source }),
        }
    }
}

/// Applies objects to a Kubernetes cluster.
///
/// Writes use server-side apply; objects without a namespace go to the
/// manipulator's default namespace.
#[derive(Clone)]
pub struct KubeResourceManipulator {
    client: kube::Client,
    namespace: String,
}

impl std::fmt::Debug for KubeResourceManipulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeResourceManipulator")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl KubeResourceManipulator {
    /// Creates a manipulator using the client's default namespace.
    pub fn new(client: kube::Client) -> Self {
        let namespace = client.default_namespace().to_string();
        Self { client, namespace }
    }

    /// Overrides the default namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    fn api<K>(&self, resource: &ManagedResource) -> Api<K>
    where
        K: kube::Resource<Scope = NamespaceResourceScope>,
        K::DynamicType: Default,
    {
        let namespace = resource.namespace().unwrap_or(&self.namespace);
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn apply<K>(&self, resource: &ManagedResource, object: &K) -> Result<()>
    where
        K: kube::Resource<Scope = NamespaceResourceScope>
            + Clone
            + Debug
            + DeserializeOwned
            + Serialize,
        K::DynamicType: Default,
    {
        let name = resource.require_name()?;
        self.api::<K>(resource)
            .patch(name, &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Apply(object))
            .await
            .map_err(|source| ReconcileError::Kube {
                resource: resource.to_string(),
                source,
            })?;
        info!(resource = %resource, "applied object");
        Ok(())
    }

    async fn delete<K>(&self, resource: &ManagedResource) -> Result<()>
    where
        K: kube::Resource<Scope = NamespaceResourceScope> + Clone + Debug + DeserializeOwned,
        K::DynamicType: Default,
    {
        let name = resource.require_name()?;
        match self
            .api::<K>(resource)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => {
                info!(resource = %resource, "deleted object");
                Ok(())
            }
            Err(kube::Error::Api(response)) if response.code == 404 => {
                debug!(resource = %resource, "object already absent");
                Ok(())
            }
            Err(source) => Err(ReconcileError::Kube {
                resource: resource.to_string(),
                source,
            }),
        }
    }
}

#[async_trait]
impl ResourceManipulator for KubeResourceManipulator {
    async fn write_resource(&self, resource: &ManagedResource) -> Result<()> {
        match resource {
            ManagedResource::ConfigMap(o) => self.apply(resource, o).await,
            ManagedResource::CronJob(o) => self.apply(resource, o).await,
            ManagedResource::Secret(o) => self.apply(resource, o).await,
        }
    }

    async fn remove_resource(&self, resource: &ManagedResource) -> Result<()> {
        match resource {
            ManagedResource::ConfigMap(_) => self.delete::<ConfigMap>(resource).await,
            ManagedResource::CronJob(_) => self.delete::<CronJob>(resource).await,
            ManagedResource::Secret(_) => self.delete::<Secret>(resource).await,
        }
    }
}
