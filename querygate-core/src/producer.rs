//! Producer trait for fetching query data.
//!
//! The cache never knows where data comes from. Callers supply a
//! [`QueryFn`] and the executor invokes it on the async runtime.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

use crate::error::ProducerFailure;
use crate::key::QueryKey;

/// Marker trait for values that can be cached.
///
/// Values are cloned into every snapshot, so they must be `Clone`, and they
/// cross task boundaries, so they must be `Send + Sync + 'static`.
pub trait QueryData: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> QueryData for T {}

/// Asynchronous producer for one query.
#[async_trait]
pub trait QueryFn<T: QueryData>: Send + Sync {
    /// Fetch the value for `key`.
    async fn fetch(&self, key: &QueryKey) -> Result<T, ProducerFailure>;
}

/// Adapter turning an async closure into a [`QueryFn`].
pub struct FnQuery<F> {
    f: F,
}

impl<F> FnQuery<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<T, F, Fut> QueryFn<T> for FnQuery<F>
where
    T: QueryData,
    F: Fn(QueryKey) -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, ProducerFailure>> + Send + 'static,
{
    async fn fetch(&self, key: &QueryKey) -> Result<T, ProducerFailure> {
        (self.f)(key.clone()).await
    }
}

/// Wrap an async closure as a shareable producer.
///
/// ```
/// use querygate_core::{query_fn, ProducerFailure};
///
/// let producer = query_fn(|key| async move {
///     Ok::<_, ProducerFailure>(key.last_str().unwrap_or_default().to_uppercase())
/// });
/// # let _ = producer;
/// ```
pub fn query_fn<T, F, Fut>(f: F) -> Arc<dyn QueryFn<T>>
where
    T: QueryData,
    F: Fn(QueryKey) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ProducerFailure>> + Send + 'static,
{
    Arc::new(FnQuery::new(f))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query_key;

    struct Upper;

    #[async_trait]
    impl QueryFn<String> for Upper {
        async fn fetch(&self, key: &QueryKey) -> Result<String, ProducerFailure> {
            key.last_str()
                .map(str::to_uppercase)
                .ok_or_else(|| ProducerFailure::new("no string part"))
        }
    }

    #[tokio::test]
    async fn test_trait_impl_fetches() {
        let producer: Arc<dyn QueryFn<String>> = Arc::new(Upper);
        let value = producer.fetch(&query_key!["abc"]).await;
        assert_eq!(value, Ok("ABC".to_string()));

        let missing = producer.fetch(&query_key![1i64]).await;
        assert!(missing.is_err());
    }

    #[tokio::test]
    async fn test_closure_adapter_receives_key() {
        let producer = query_fn(|key: QueryKey| async move { Ok(key.len()) });
        assert_eq!(producer.fetch(&query_key!["a", "b", "c"]).await, Ok(3));
    }

    #[tokio::test]
    async fn test_closure_adapter_propagates_failure() {
        let producer =
            query_fn(|_key: QueryKey| async move { Err::<u8, _>(ProducerFailure::new("down")) });
        let err = producer.fetch(&QueryKey::new()).await.unwrap_err();
        assert_eq!(err.message(), "down");
    }
}
