//! Dynamic resource client
//!
//! Objects are handled as JSON through [`ResourceClient`]. The kube-backed
//! implementation builds one `ApiResource` per `apiVersion:kind` on first use
//! and reuses it afterwards.

use async_trait::async_trait;
use dashmap::DashMap;
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams};
use kube::discovery::ApiResource;
use kube::{Client, Config};
use serde_json::Value;
use tracing::debug;

use crate::error::OpenShiftError;

pub type ClientResult<T> = std::result::Result<T, OpenShiftError>;

/// An API type the backend works with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectKind {
    pub api_version: &'static str,
    pub kind: &'static str,
    pub plural: &'static str,
    pub namespaced: bool,
}

impl ObjectKind {
    pub fn cache_key(&self) -> String {
        format!("{}:{}", self.api_version, self.kind)
    }

    /// `(group, version)`; the core group is empty
    pub fn group_version(&self) -> (&'static str, &'static str) {
        match self.api_version.rfind('/') {
            Some(idx) => (&self.api_version[..idx], &self.api_version[idx + 1..]),
            None => ("", self.api_version),
        }
    }

    fn scope<'a>(&self, namespace: &'a str) -> Option<&'a str> {
        self.namespaced.then_some(namespace)
    }
}

pub const PROJECT: ObjectKind = ObjectKind {
    api_version: "project.openshift.io/v1",
    kind: "Project",
    plural: "projects",
    namespaced: false,
};

pub const USER: ObjectKind = ObjectKind {
    api_version: "user.openshift.io/v1",
    kind: "User",
    plural: "users",
    namespaced: false,
};

pub const IDENTITY: ObjectKind = ObjectKind {
    api_version: "user.openshift.io/v1",
    kind: "Identity",
    plural: "identities",
    namespaced: false,
};

pub const USER_IDENTITY_MAPPING: ObjectKind = ObjectKind {
    api_version: "user.openshift.io/v1",
    kind: "UserIdentityMapping",
    plural: "useridentitymappings",
    namespaced: false,
};

pub const ROLE_BINDING: ObjectKind = ObjectKind {
    api_version: "rbac.authorization.k8s.io/v1",
    kind: "RoleBinding",
    plural: "rolebindings",
    namespaced: true,
};

pub const RESOURCE_QUOTA: ObjectKind = ObjectKind {
    api_version: "v1",
    kind: "ResourceQuota",
    plural: "resourcequotas",
    namespaced: true,
};

pub const LIMIT_RANGE: ObjectKind = ObjectKind {
    api_version: "v1",
    kind: "LimitRange",
    plural: "limitranges",
    namespaced: true,
};

/// Generic typed-resource access; `namespace` is ignored for cluster-scoped kinds
#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// `None` when the object does not exist
    async fn get(&self, kind: ObjectKind, namespace: &str, name: &str)
    -> ClientResult<Option<Value>>;

    async fn list(&self, kind: ObjectKind, namespace: &str) -> ClientResult<Vec<Value>>;

    async fn create(&self, kind: ObjectKind, namespace: &str, object: &Value)
    -> ClientResult<Value>;

    /// JSON merge patch
    async fn patch(
        &self,
        kind: ObjectKind,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> ClientResult<Value>;

    /// Returns `false` when there was nothing to delete
    async fn delete(&self, kind: ObjectKind, namespace: &str, name: &str) -> ClientResult<bool>;
}

/// kube-backed client with a per-kind `ApiResource` cache
pub struct KubeResourceClient {
    client: Client,
    apis: DashMap<String, ApiResource>,
}

impl KubeResourceClient {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            apis: DashMap::new(),
        }
    }

    /// Connect to an API endpoint with a bearer token
    pub fn connect(api_url: &str, token: String) -> ClientResult<Self> {
        let cluster_url = api_url
            .parse()
            .map_err(|e| OpenShiftError::Config(format!("invalid API URL '{}': {}", api_url, e)))?;
        let mut config = Config::new(cluster_url);
        config.auth_info.token = Some(token.into());
        let client = Client::try_from(config)?;
        Ok(Self::new(client))
    }

    pub fn cached_kinds(&self) -> usize {
        self.apis.len()
    }

    fn api_resource(&self, kind: ObjectKind) -> ApiResource {
        self.apis
            .entry(kind.cache_key())
            .or_insert_with(|| {
                let (group, version) = kind.group_version();
                debug!(api_version = %kind.api_version, kind = %kind.kind, "Caching API resource");
                ApiResource {
                    group: group.to_string(),
                    version: version.to_string(),
                    api_version: kind.api_version.to_string(),
                    kind: kind.kind.to_string(),
                    plural: kind.plural.to_string(),
                }
            })
            .clone()
    }

    fn api(&self, kind: ObjectKind, namespace: &str) -> Api<DynamicObject> {
        let ar = self.api_resource(kind);
        match kind.scope(namespace) {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &ar),
            None => Api::all_with(self.client.clone(), &ar),
        }
    }
}

#[async_trait]
impl ResourceClient for KubeResourceClient {
    async fn get(
        &self,
        kind: ObjectKind,
        namespace: &str,
        name: &str,
    ) -> ClientResult<Option<Value>> {
        match self.api(kind, namespace).get_opt(name).await? {
            Some(obj) => Ok(Some(serde_json::to_value(obj)?)),
            None => Ok(None),
        }
    }

    async fn list(&self, kind: ObjectKind, namespace: &str) -> ClientResult<Vec<Value>> {
        let list = self
            .api(kind, namespace)
            .list(&ListParams::default())
            .await?;
        list.items
            .into_iter()
            .map(|obj| serde_json::to_value(obj).map_err(OpenShiftError::from))
            .collect()
    }

    async fn create(
        &self,
        kind: ObjectKind,
        namespace: &str,
        object: &Value,
    ) -> ClientResult<Value> {
        let obj: DynamicObject = serde_json::from_value(object.clone())?;
        let created = self
            .api(kind, namespace)
            .create(&PostParams::default(), &obj)
            .await?;
        Ok(serde_json::to_value(created)?)
    }

    async fn patch(
        &self,
        kind: ObjectKind,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> ClientResult<Value> {
        let patched = self
            .api(kind, namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(patch))
            .await?;
        Ok(serde_json::to_value(patched)?)
    }

    async fn delete(&self, kind: ObjectKind, namespace: &str, name: &str) -> ClientResult<bool> {
        match self
            .api(kind, namespace)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_version() {
        assert_eq!(PROJECT.group_version(), ("project.openshift.io", "v1"));
        assert_eq!(RESOURCE_QUOTA.group_version(), ("", "v1"));
    }

    #[test]
    fn test_cache_key() {
        assert_eq!(ROLE_BINDING.cache_key(), "rbac.authorization.k8s.io/v1:RoleBinding");
        assert_ne!(USER.cache_key(), IDENTITY.cache_key());
    }

    #[test]
    fn test_scope() {
        assert_eq!(PROJECT.scope("ns"), None);
        assert_eq!(LIMIT_RANGE.scope("ns"), Some("ns"));
    }
}
