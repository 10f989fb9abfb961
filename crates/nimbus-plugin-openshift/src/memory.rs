//! In-memory [`ResourceClient`]
//!
//! Holds objects as JSON keyed by kind, namespace and name, and counts
//! mutating calls.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use crate::client::{ClientResult, ObjectKind, PROJECT, ResourceClient};
use crate::error::OpenShiftError;

#[derive(Default)]
pub struct InMemoryResourceClient {
    objects: DashMap<String, Value>,
    mutations: AtomicUsize,
}

impl InMemoryResourceClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of create, patch and delete calls so far
    pub fn mutations(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    /// Store an object directly, without counting a mutation
    pub fn seed(&self, kind: ObjectKind, namespace: &str, object: Value) -> ClientResult<()> {
        let name = object_name(&object)?;
        self.objects
            .insert(key(kind, namespace, &name), normalize(kind, namespace, object));
        Ok(())
    }

    fn touch(&self) {
        self.mutations.fetch_add(1, Ordering::SeqCst);
    }
}

fn prefix(kind: ObjectKind, namespace: &str) -> String {
    let ns = if kind.namespaced { namespace } else { "" };
    format!("{}/{}/", kind.cache_key(), ns)
}

fn key(kind: ObjectKind, namespace: &str, name: &str) -> String {
    format!("{}{}", prefix(kind, namespace), name)
}

fn object_name(object: &Value) -> ClientResult<String> {
    object["metadata"]["name"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| OpenShiftError::InvalidObject("metadata.name is required".to_string()))
}

fn normalize(kind: ObjectKind, namespace: &str, mut object: Value) -> Value {
    object["apiVersion"] = Value::from(kind.api_version);
    object["kind"] = Value::from(kind.kind);
    if kind.namespaced {
        object["metadata"]["namespace"] = Value::from(namespace);
    }
    object
}

/// RFC 7386 merge: objects merge recursively, `null` removes, anything else replaces
pub fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Default::default());
    }
    if let Value::Object(target_map) = target {
        for (k, v) in patch_map {
            if v.is_null() {
                target_map.remove(k);
            } else {
                merge_patch(target_map.entry(k.clone()).or_insert(Value::Null), v);
            }
        }
    }
}

#[async_trait]
impl ResourceClient for InMemoryResourceClient {
    async fn get(
        &self,
        kind: ObjectKind,
        namespace: &str,
        name: &str,
    ) -> ClientResult<Option<Value>> {
        Ok(self
            .objects
            .get(&key(kind, namespace, name))
            .map(|v| v.value().clone()))
    }

    async fn list(&self, kind: ObjectKind, namespace: &str) -> ClientResult<Vec<Value>> {
        let prefix = prefix(kind, namespace);
        let mut items: Vec<(String, Value)> = self
            .objects
            .iter()
            .filter(|e| e.key().starts_with(&prefix))
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        items.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(items.into_iter().map(|(_, v)| v).collect())
    }

    async fn create(
        &self,
        kind: ObjectKind,
        namespace: &str,
        object: &Value,
    ) -> ClientResult<Value> {
        let name = object_name(object)?;
        let key = key(kind, namespace, &name);
        if self.objects.contains_key(&key) {
            return Err(OpenShiftError::AlreadyExists(format!("{} {}", kind.kind, name)));
        }
        let object = normalize(kind, namespace, object.clone());
        self.objects.insert(key, object.clone());
        self.touch();
        Ok(object)
    }

    async fn patch(
        &self,
        kind: ObjectKind,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> ClientResult<Value> {
        let mut entry = self
            .objects
            .get_mut(&key(kind, namespace, name))
            .ok_or_else(|| OpenShiftError::NotFound(format!("{} {}", kind.kind, name)))?;
        merge_patch(entry.value_mut(), patch);
        self.touch();
        Ok(entry.value().clone())
    }

    async fn delete(&self, kind: ObjectKind, namespace: &str, name: &str) -> ClientResult<bool> {
        let removed = self.objects.remove(&key(kind, namespace, name)).is_some();
        if removed {
            self.touch();
        }
        // Deleting a project takes its namespace and everything in it
        if removed && kind == PROJECT {
            self.objects
                .retain(|_, object| object["metadata"]["namespace"].as_str() != Some(name));
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::RESOURCE_QUOTA;
    use serde_json::json;

    #[test]
    fn test_merge_patch() {
        let mut target = json!({"metadata": {"labels": {"a": "1", "b": "2"}}, "spec": [1]});
        merge_patch(
            &mut target,
            &json!({"metadata": {"labels": {"b": null, "c": "3"}}, "spec": [2]}),
        );
        assert_eq!(
            target,
            json!({"metadata": {"labels": {"a": "1", "c": "3"}}, "spec": [2]})
        );
    }

    #[tokio::test]
    async fn test_namespaced_and_cluster_scope() {
        let client = InMemoryResourceClient::new();
        client
            .create(PROJECT, "ignored", &json!({"metadata": {"name": "p1"}}))
            .await
            .unwrap();
        client
            .create(RESOURCE_QUOTA, "p1", &json!({"metadata": {"name": "q"}}))
            .await
            .unwrap();

        assert!(client.get(PROJECT, "", "p1").await.unwrap().is_some());
        assert_eq!(client.list(RESOURCE_QUOTA, "p1").await.unwrap().len(), 1);
        assert!(client.list(RESOURCE_QUOTA, "p2").await.unwrap().is_empty());

        let quota = client.get(RESOURCE_QUOTA, "p1", "q").await.unwrap().unwrap();
        assert_eq!(quota["metadata"]["namespace"], "p1");
        assert_eq!(quota["kind"], "ResourceQuota");
        assert_eq!(client.mutations(), 2);
    }

    #[tokio::test]
    async fn test_create_conflict_and_delete() {
        let client = InMemoryResourceClient::new();
        let project = json!({"metadata": {"name": "p1"}});
        client.create(PROJECT, "", &project).await.unwrap();
        assert!(matches!(
            client.create(PROJECT, "", &project).await,
            Err(OpenShiftError::AlreadyExists(_))
        ));
        assert!(client.delete(PROJECT, "", "p1").await.unwrap());
        assert!(!client.delete(PROJECT, "", "p1").await.unwrap());
    }

    #[tokio::test]
    async fn test_project_delete_removes_namespaced_objects() {
        let client = InMemoryResourceClient::new();
        client.create(PROJECT, "", &json!({"metadata": {"name": "p1"}})).await.unwrap();
        client
            .create(RESOURCE_QUOTA, "p1", &json!({"metadata": {"name": "q"}}))
            .await
            .unwrap();
        client
            .create(RESOURCE_QUOTA, "p2", &json!({"metadata": {"name": "q"}}))
            .await
            .unwrap();

        assert!(client.delete(PROJECT, "", "p1").await.unwrap());
        assert!(client.list(RESOURCE_QUOTA, "p1").await.unwrap().is_empty());
        assert_eq!(client.list(RESOURCE_QUOTA, "p2").await.unwrap().len(), 1);
    }
}
