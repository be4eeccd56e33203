//! Query observer: one caller's view of a query across input changes.
//!
//! The observer re-evaluates its request only when the encoded key or the
//! run state changed. Swapping in a new producer closure for the same key
//! and policy does nothing, matching how a view layer hands over a fresh
//! closure on every render.

use querygate_core::{
    EncodedKey, ExecutionRequest, QueryData, QueryKey, QueryResult, RunState, Snapshot,
    StoreError, Suppression,
};
use tokio::sync::watch;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::client::QueryClient;
use crate::resolver::Resolution;
use crate::store::FetchClaim;

/// Tracks one request and follows its key's snapshots.
pub struct QueryObserver<T: QueryData> {
    id: Uuid,
    client: QueryClient<T>,
    request: ExecutionRequest<T>,
    encoded: EncodedKey,
    run_state: RunState,
    receiver: watch::Receiver<Snapshot<T>>,
}

impl<T: QueryData> QueryObserver<T> {
    /// Evaluate the request and subscribe to its key.
    pub fn new(client: QueryClient<T>, request: ExecutionRequest<T>) -> QueryResult<Self> {
        let encoded = request.key.encode();
        let resolution = client.resolve(&request)?;
        let mut receiver = client.store().subscribe(&encoded)?;
        receiver.borrow_and_update();
        let observer = Self {
            id: Uuid::now_v7(),
            run_state: request.run_state(),
            client,
            request,
            encoded,
            receiver,
        };
        debug!(observer = %observer.id, key = %observer.encoded, ?resolution, "Observer created");
        Ok(observer)
    }

    /// Replace the tracked request.
    ///
    /// Returns the resolution if the key or the run state changed, `None`
    /// otherwise. On error the observer keeps its previous key and run state,
    /// so the same request can be retried.
    pub fn set_request(&mut self, request: ExecutionRequest<T>) -> QueryResult<Option<Resolution>> {
        let encoded = request.key.encode();
        let run_state = request.run_state();
        let key_changed = encoded != self.encoded;
        let policy_changed = run_state != self.run_state;

        if !key_changed && !policy_changed {
            self.request = request;
            return Ok(None);
        }

        let receiver = if key_changed {
            Some(self.client.store().subscribe(&encoded)?)
        } else {
            None
        };
        let resolution = match self.client.resolve(&request) {
            Ok(resolution) => resolution,
            Err(err) => {
                if let Some(receiver) = receiver {
                    drop(receiver);
                    self.release(&encoded);
                }
                return Err(err);
            }
        };

        if let Some(receiver) = receiver {
            self.receiver = receiver;
            let previous = std::mem::replace(&mut self.encoded, encoded);
            self.release(&previous);
        }
        self.run_state = run_state;
        self.request = request;
        self.receiver.borrow_and_update();
        debug!(
            observer = %self.id,
            key = %self.encoded,
            key_changed,
            policy_changed,
            ?resolution,
            "Observer re-evaluated"
        );
        Ok(Some(resolution))
    }

    /// Force a new fetch for the current key.
    ///
    /// Does nothing while the request carries the skip sentinel. A frozen
    /// request can still be refetched explicitly.
    pub fn refetch(&self) -> QueryResult<Option<FetchClaim>> {
        if self.run_state == RunState::Suppressed(Suppression::Deleted) {
            return Ok(None);
        }
        let Some(producer) = self.request.query_fn.producer() else {
            return Ok(None);
        };
        let staleness = self
            .request
            .staleness
            .unwrap_or(self.client.config().default_staleness);
        self.client
            .refetch_with_staleness(&self.request.key, producer.clone(), staleness)
            .map(Some)
    }

    fn release(&self, key: &EncodedKey) {
        if let Err(err) = self.client.store().release_observer(key) {
            warn!(observer = %self.id, key = %key, error = %err, "Failed to release observer channel");
        }
    }

    /// Latest snapshot for the current key.
    pub fn snapshot(&self) -> Snapshot<T> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next snapshot change and return it.
    pub async fn changed(&mut self) -> QueryResult<Snapshot<T>> {
        self.receiver
            .changed()
            .await
            .map_err(|_| self.closed())?;
        Ok(self.receiver.borrow_and_update().clone())
    }

    /// Wait until a snapshot satisfies `predicate`, checking the current one first.
    pub async fn wait_for(
        &mut self,
        mut predicate: impl FnMut(&Snapshot<T>) -> bool,
    ) -> QueryResult<Snapshot<T>> {
        let closed = self.closed();
        let snapshot = self
            .receiver
            .wait_for(|snapshot| predicate(snapshot))
            .await
            .map_err(|_| closed)?;
        Ok(snapshot.clone())
    }

    fn closed(&self) -> StoreError {
        StoreError::ObserverClosed {
            key: self.encoded.to_string(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn key(&self) -> &QueryKey {
        &self.request.key
    }

    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    pub fn request(&self) -> &ExecutionRequest<T> {
        &self.request
    }
}
