use std::future::Future;

use kube::{
    Api, Error as KubeError,
    api::{ListParams, ObjectList, PostParams},
};
use serde::{Serialize, de::DeserializeOwned};

use super::{RetryPolicy, retry_with_policy};

/// Retry extension methods for `Api<T>`.
pub trait ApiRetryExt<K> {
    fn list_with_retry<'a>(
        &'a self,
        policy: RetryPolicy,
        lp: &'a ListParams,
    ) -> impl Future<Output = Result<ObjectList<K>, KubeError>> + Send + 'a
    where
        K: Clone + DeserializeOwned + std::fmt::Debug;

    fn create_with_retry<'a>(
        &'a self,
        policy: RetryPolicy,
        pp: &'a PostParams,
        data: &'a K,
    ) -> impl Future<Output = Result<K, KubeError>> + Send + 'a
    where
        K: Clone + DeserializeOwned + std::fmt::Debug + Serialize;
}

impl<K> ApiRetryExt<K> for Api<K>
where
    K: Send + Sync,
{
    fn list_with_retry<'a>(
        &'a self,
        policy: RetryPolicy,
        lp: &'a ListParams,
    ) -> impl Future<Output = Result<ObjectList<K>, KubeError>> + Send + 'a
    where
        K: Clone + DeserializeOwned + std::fmt::Debug,
    {
        async move { retry_with_policy(&policy, || self.list(lp)).await }
    }

    fn create_with_retry<'a>(
        &'a self,
        policy: RetryPolicy,
        pp: &'a PostParams,
        data: &'a K,
    ) -> impl Future<Output = Result<K, KubeError>> + Send + 'a
    where
        K: Clone + DeserializeOwned + std::fmt::Debug + Serialize,
    {
        async move { retry_with_policy(&policy, || self.create(pp, data)).await }
    }
}
