//! Access to custom resources through the Kubernetes API
//!
//! The dbops core never talks to the API server directly; it goes through
//! the finder/writer traits below so tests can substitute an in-memory
//! store. Writes carry the resource version of the copy they were derived
//! from, so a concurrent writer surfaces as a 409 conflict instead of a
//! silent overwrite.

use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, ListParams, PostParams};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};

/// Lookup of a single namespaced resource
#[async_trait]
pub trait CustomResourceFinder<T>: Send + Sync {
    async fn find_by_name_and_namespace(&self, name: &str, namespace: &str)
        -> Result<Option<T>>;
}

/// Conditional writes of a namespaced resource
#[async_trait]
pub trait CustomResourceWriter<T>: Send + Sync {
    /// Replace the resource, conditional on its resource version
    async fn update(&self, resource: &T) -> Result<T>;

    /// Replace the status subresource, conditional on the resource version
    async fn update_status(&self, resource: &T) -> Result<T>;
}

/// Lookup of cluster pods by label selector
#[async_trait]
pub trait PodScanner: Send + Sync {
    async fn find_by_label(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>>;
}

/// Finder and writer backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeResourceStore {
    client: Client,
}

impl KubeResourceStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api_for<T>(&self, resource: &T) -> Api<T>
    where
        T: Resource<Scope = NamespaceResourceScope>,
        T::DynamicType: Default,
    {
        let namespace = resource.namespace().unwrap_or_else(|| "default".to_string());
        Api::namespaced(self.client.clone(), &namespace)
    }
}

#[async_trait]
impl<T> CustomResourceFinder<T> for KubeResourceStore
where
    T: Resource<Scope = NamespaceResourceScope>
        + Clone
        + DeserializeOwned
        + Debug
        + Send
        + Sync
        + 'static,
    T::DynamicType: Default,
{
    async fn find_by_name_and_namespace(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<T>> {
        let api: Api<T> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name).await.map_err(Error::KubeError)
    }
}

#[async_trait]
impl<T> CustomResourceWriter<T> for KubeResourceStore
where
    T: Resource<Scope = NamespaceResourceScope>
        + Clone
        + DeserializeOwned
        + Serialize
        + Debug
        + Send
        + Sync
        + 'static,
    T::DynamicType: Default,
{
    async fn update(&self, resource: &T) -> Result<T> {
        self.api_for(resource)
            .replace(&resource.name_any(), &PostParams::default(), resource)
            .await
            .map_err(Error::KubeError)
    }

    async fn update_status(&self, resource: &T) -> Result<T> {
        let data = serde_json::to_vec(resource)?;
        self.api_for(resource)
            .replace_status(&resource.name_any(), &PostParams::default(), data)
            .await
            .map_err(Error::KubeError)
    }
}

/// Pod scanner backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubePodScanner {
    client: Client,
}

impl KubePodScanner {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PodScanner for KubePodScanner {
    async fn find_by_label(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let pods = api
            .list(&ListParams::default().labels(selector))
            .await
            .map_err(Error::KubeError)?;
        Ok(pods.items)
    }
}
