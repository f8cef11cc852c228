//! Upload clients owned by one editing session.
//!
//! [`UploadClientManager::acquire`] fetches a temporary credential, binds an
//! object store to it and spawns a refresh task. The task sleeps until
//! `expires_at - safety_margin`, refreshes, and reschedules from the new
//! credential. All state lives in a [`ClientState`] published on a watch
//! channel; transitions go through [`ClientState::apply`].
//!
//! Dropping or disposing the [`UploadClient`] cancels the refresh task. A
//! fetch already in flight completes but its result is discarded.
mod error;
mod state;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::{
    covers::{cover_object_key, CoverUpload},
    credentials::{
        schedule::{
            refresh_at, refresh_delay, safety_margin, timer_duration, Clock, SystemClock,
            DEFAULT_SAFETY_MARGIN_SECS,
        },
        FetchResult, HttpTokenFetcher, TokenFetcher,
    },
    storage::{ObjectStore, S3Connector, StoreConnector, StoreError},
    types::Environment,
};

pub use error::{RefreshFailure, UploadFailure, UploadResult};
pub use state::{ClientEvent, ClientState, ClientStatus};

/// Floor between two scheduled refreshes, so a token endpoint issuing
/// credentials shorter than the safety margin cannot spin the scheduler
const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(5);

/// Creates one [`UploadClient`] per editing session
pub struct UploadClientManager {
    fetcher: Arc<dyn TokenFetcher>,
    connector: Arc<dyn StoreConnector>,
    clock: Arc<dyn Clock>,
    safety_margin: TimeDelta,
}

impl UploadClientManager {
    /// Creates a manager using the system clock and the default safety margin
    #[must_use]
    pub fn new(fetcher: Arc<dyn TokenFetcher>, connector: Arc<dyn StoreConnector>) -> Self {
        Self {
            fetcher,
            connector,
            clock: Arc::new(SystemClock),
            safety_margin: safety_margin(DEFAULT_SAFETY_MARGIN_SECS),
        }
    }

    /// Creates a manager talking to the token endpoint and bucket configured for `environment`
    ///
    /// # Errors
    ///
    /// Returns `CredentialFetchError::ConfigError` if the HTTP client cannot be built
    pub fn from_environment(environment: &Environment) -> FetchResult<Self> {
        let fetcher = HttpTokenFetcher::new(
            environment.token_endpoint_url(),
            environment.console_auth_token(),
            environment.token_request_timeout(),
        )?;
        let connector = S3Connector::new(environment.storage_target());

        info!(
            "Upload client manager using token endpoint {}",
            fetcher.endpoint()
        );

        Ok(Self::new(Arc::new(fetcher), Arc::new(connector))
            .with_safety_margin_secs(environment.refresh_safety_margin_secs()))
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_safety_margin_secs(mut self, secs: u32) -> Self {
        self.safety_margin = safety_margin(secs);
        self
    }

    /// Fetches a credential and returns a ready client with its refresh task running
    ///
    /// # Errors
    ///
    /// Returns `CredentialFetchError` if the token endpoint is unreachable,
    /// rejects the request or answers with an unusable credential. No client
    /// is created in that case.
    #[instrument(skip_all)]
    pub async fn acquire(&self) -> FetchResult<UploadClient> {
        let credential = self
            .fetcher
            .fetch()
            .await
            .inspect_err(|e| tracing::error!("Failed to acquire upload credentials: {e}"))?;

        let delay = refresh_delay(credential.expires_at, self.clock.now(), self.safety_margin);
        info!(
            "Acquired upload credential {} expiring at {}, refresh in {}s",
            credential.access_key_id,
            credential.expires_at,
            delay.num_seconds()
        );

        let store = self.connector.connect(&credential);
        let (state, _) = watch::channel(ClientState::Uninitialized);

        let shared = Arc::new(Shared {
            fetcher: self.fetcher.clone(),
            connector: self.connector.clone(),
            clock: self.clock.clone(),
            safety_margin: self.safety_margin,
            state,
            refresh_gate: Mutex::new(()),
            cancel: CancellationToken::new(),
        });
        shared.transition(ClientEvent::Acquired { credential, store });

        let scheduler = tokio::spawn(run_refresh_schedule(shared.clone()));

        Ok(UploadClient {
            shared,
            scheduler: Some(scheduler),
        })
    }
}

/// Credentialed storage handle owned by one editing session
pub struct UploadClient {
    shared: Arc<Shared>,
    scheduler: Option<JoinHandle<()>>,
}

impl UploadClient {
    #[must_use]
    pub fn status(&self) -> ClientStatus {
        self.shared.state.borrow().status()
    }

    /// Snapshot of the current state
    #[must_use]
    pub fn state(&self) -> ClientState {
        self.shared.state.borrow().clone()
    }

    /// Receiver notified on every state change, e.g. to disable the upload
    /// button once the client turns stale
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ClientState> {
        self.shared.state.subscribe()
    }

    /// When the bound credential is due for a proactive refresh
    #[must_use]
    pub fn next_refresh_at(&self) -> Option<DateTime<Utc>> {
        match &*self.shared.state.borrow() {
            ClientState::Ready { credential, .. } => {
                Some(refresh_at(credential.expires_at, self.shared.safety_margin))
            }
            _ => None,
        }
    }

    /// Public URL of an object stored at `key`
    #[must_use]
    pub fn public_url(&self, key: &str) -> String {
        self.shared.connector.public_url(key)
    }

    /// Replaces the credential now.
    ///
    /// Concurrent calls coalesce into one fetch; every caller observes the
    /// same settled outcome.
    ///
    /// # Errors
    ///
    /// Returns `RefreshFailure` if the client is stale or disposed, or the fetch failed
    pub async fn refresh(&self) -> Result<(), RefreshFailure> {
        let observed = self.shared.state.borrow().generation();
        self.shared.refresh_from(observed).await
    }

    /// Stores `body` under `key` with the current credential.
    ///
    /// An upload never starts with a credential known to be expired: it
    /// waits for a refresh in flight, or triggers one itself. If the storage
    /// service rejects the credential a refresh is triggered so that a user
    /// retry runs on a fresh one; the upload itself is not repeated.
    ///
    /// # Errors
    ///
    /// Returns `UploadFailure::Stale` if a background refresh failed
    /// Returns `UploadFailure::Unauthorized` or `UploadFailure::Storage` if the put failed
    /// Returns `UploadFailure::EmptyBody` for an empty body
    #[instrument(skip(self, body), fields(size = body.len()))]
    pub async fn upload(&self, key: &str, body: Vec<u8>, content_type: &str) -> UploadResult<()> {
        if body.is_empty() {
            return Err(UploadFailure::EmptyBody);
        }

        let (store, generation) = self.ready_store().await?;

        match store.put_object(key, body, content_type).await {
            Ok(()) => {
                info!("Uploaded {key}");
                Ok(())
            }
            Err(StoreError::Unauthorized(msg)) => {
                warn!("Storage rejected the credential while uploading {key}: {msg}");
                if let Err(e) = self.shared.refresh_from(generation).await {
                    warn!("Refresh after rejected upload failed: {e}");
                }
                Err(UploadFailure::Unauthorized(msg))
            }
            Err(e) => {
                warn!("Upload of {key} failed: {e}");
                Err(e.into())
            }
        }
    }

    /// Uploads a cover image under its content-addressed key
    ///
    /// # Errors
    ///
    /// Returns `UploadFailure::UnsupportedContentType` for non-image content
    /// and any error of [`UploadClient::upload`]
    pub async fn upload_cover(
        &self,
        body: Vec<u8>,
        content_type: &str,
    ) -> UploadResult<CoverUpload> {
        let key = cover_object_key(&body, content_type)?;
        self.upload(&key, body, content_type).await?;

        let url = self.public_url(&key);
        Ok(CoverUpload { key, url })
    }

    /// Ends the session: cancels the refresh task and waits for it to stop.
    /// A token fetch in flight is not waited for; its result is discarded.
    pub async fn dispose(mut self) {
        self.shared.shutdown();
        if let Some(scheduler) = self.scheduler.take() {
            if let Err(e) = scheduler.await {
                warn!("Refresh task ended abnormally: {e}");
            }
        }
    }

    async fn ready_store(&self) -> UploadResult<(Arc<dyn ObjectStore>, u64)> {
        let mut updates = self.shared.state.subscribe();
        let mut refreshed = false;

        loop {
            let state = updates.borrow_and_update().clone();
            match state {
                ClientState::Ready {
                    credential,
                    store,
                    generation,
                } => {
                    if !credential.is_expired_at(self.shared.clock.now()) {
                        return Ok((store, generation));
                    }
                    if refreshed {
                        return Err(UploadFailure::CredentialExpired);
                    }
                    debug!("Credential expired before upload, refreshing");
                    refreshed = true;
                    if let Err(e) = self.shared.refresh_from(generation).await {
                        debug!("Refresh before upload failed: {e}");
                    }
                }
                ClientState::Refreshing { .. } => {
                    if updates.changed().await.is_err() {
                        return Err(UploadFailure::Disposed);
                    }
                }
                ClientState::Stale { reason, .. } => return Err(UploadFailure::Stale(reason)),
                ClientState::Uninitialized => return Err(UploadFailure::NotReady),
                ClientState::Disposed => return Err(UploadFailure::Disposed),
            }
        }
    }
}

impl Drop for UploadClient {
    fn drop(&mut self) {
        self.shared.shutdown();
    }
}

/// State shared between the client handle and its refresh task
struct Shared {
    fetcher: Arc<dyn TokenFetcher>,
    connector: Arc<dyn StoreConnector>,
    clock: Arc<dyn Clock>,
    safety_margin: TimeDelta,
    state: watch::Sender<ClientState>,
    refresh_gate: Mutex<()>,
    cancel: CancellationToken,
}

impl Shared {
    fn transition(&self, event: ClientEvent) {
        self.state.send_modify(|state| {
            let from = state.status();
            let next = std::mem::replace(state, ClientState::Uninitialized).apply(event);
            debug!("Upload client {from} -> {}", next.status());
            *state = next;
        });
    }

    /// Refreshes unless the state settled since `observed` was read.
    ///
    /// The refresh runs on its own task so that it settles even when the
    /// caller stops waiting for it.
    async fn refresh_from(self: &Arc<Self>, observed: u64) -> Result<(), RefreshFailure> {
        let shared = Arc::clone(self);
        let settlement = tokio::spawn(async move { shared.settle_refresh(observed).await });

        match settlement.await {
            Ok(result) => result,
            Err(e) => {
                warn!("Refresh task ended abnormally: {e}");
                let failure = RefreshFailure::Interrupted(e.to_string());
                self.transition(ClientEvent::RefreshFailed(failure.clone()));
                Err(failure)
            }
        }
    }

    async fn settle_refresh(&self, observed: u64) -> Result<(), RefreshFailure> {
        let _gate = self.refresh_gate.lock().await;

        {
            let current = self.state.borrow();
            let is_ready = matches!(*current, ClientState::Ready { .. });
            if current.generation() != observed || !is_ready {
                return settled(&current);
            }
        }

        self.transition(ClientEvent::RefreshStarted);
        let result = self.fetcher.fetch().await;

        if self.cancel.is_cancelled() {
            debug!("Discarding refresh result of a disposed client");
            return Err(RefreshFailure::Disposed);
        }

        match result {
            Ok(credential) => {
                info!(
                    "Refreshed upload credential {} expiring at {}",
                    credential.access_key_id, credential.expires_at
                );
                let store = self.connector.connect(&credential);
                self.transition(ClientEvent::RefreshSucceeded { credential, store });
                Ok(())
            }
            Err(e) => {
                let failure = RefreshFailure::from(e);
                warn!("Upload client is stale: {failure}");
                self.transition(ClientEvent::RefreshFailed(failure.clone()));
                Err(failure)
            }
        }
    }

    fn shutdown(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.cancel.cancel();
        self.transition(ClientEvent::Disposed);
        info!("Upload client disposed");
    }
}

fn settled(state: &ClientState) -> Result<(), RefreshFailure> {
    match state {
        ClientState::Ready { .. } => Ok(()),
        ClientState::Stale { reason, .. } => Err(reason.clone()),
        ClientState::Disposed => Err(RefreshFailure::Disposed),
        ClientState::Uninitialized | ClientState::Refreshing { .. } => {
            Err(RefreshFailure::NotAcquired)
        }
    }
}

/// Sleeps until the bound credential is due and refreshes it, until the
/// client is disposed or turns stale
async fn run_refresh_schedule(shared: Arc<Shared>) {
    let mut updates = shared.state.subscribe();
    let mut first = true;

    loop {
        let due = {
            let state = updates.borrow_and_update();
            match &*state {
                ClientState::Ready {
                    credential,
                    generation,
                    ..
                } => Some((credential.expires_at, *generation)),
                ClientState::Refreshing { .. } => None,
                ClientState::Uninitialized | ClientState::Stale { .. } | ClientState::Disposed => {
                    debug!("Refresh schedule stopped in {} state", state.status());
                    return;
                }
            }
        };

        let (expires_at, generation) = match due {
            Some(due) => due,
            None => {
                // a refresh is in flight; wait for it to settle
                tokio::select! {
                    biased;
                    () = shared.cancel.cancelled() => return,
                    changed = updates.changed() => {
                        if changed.is_err() {
                            return;
                        }
                    }
                }
                continue;
            }
        };

        let delay = refresh_delay(expires_at, shared.clock.now(), shared.safety_margin);
        let mut wait = timer_duration(delay);
        if !first {
            wait = wait.max(MIN_REFRESH_INTERVAL);
        }
        first = false;
        debug!("Next credential refresh in {}s", wait.as_secs());

        tokio::select! {
            biased;
            () = shared.cancel.cancelled() => return,
            changed = updates.changed() => {
                if changed.is_err() {
                    return;
                }
            }
            () = tokio::time::sleep(wait) => {
                // a fetch still in flight on dispose settles on its own task
                tokio::select! {
                    biased;
                    () = shared.cancel.cancelled() => return,
                    result = shared.refresh_from(generation) => {
                        if let Err(e) = result {
                            warn!("Scheduled credential refresh failed: {e}");
                        }
                    }
                }
            }
        }
    }
}
