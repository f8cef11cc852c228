// Not every helper is used in every test, so we allow dead code
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use uploader::{
    credentials::{schedule::Clock, CredentialFetchError, FetchResult, TemporaryCredential, TokenFetcher},
    session::UploadClientManager,
    storage::{ObjectStore, StoreConnector, StoreError, StoreResult},
};

pub const PUBLIC_BASE_URL: &str = "https://growth-public.oss-cn-shanghai.aliyuncs.com";

/// Fixed instant all fake clocks start at
pub fn epoch() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

pub fn credential(key: &str, expires_at: DateTime<Utc>) -> TemporaryCredential {
    TemporaryCredential {
        access_key_id: key.to_string(),
        access_key_secret: format!("{key}-secret"),
        security_token: format!("{key}-token"),
        expires_at,
    }
}

pub fn expiring_in(key: &str, secs: i64) -> TemporaryCredential {
    credential(key, epoch() + TimeDelta::seconds(secs))
}

/// Clock that only moves when told to
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(now),
        })
    }

    pub fn advance(&self, secs: i64) {
        let mut now = self.now.lock().unwrap();
        *now += TimeDelta::seconds(secs);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Token fetcher answering from a script; fails once the script runs out
pub struct ScriptedFetcher {
    responses: Mutex<VecDeque<FetchResult<TemporaryCredential>>>,
    calls: AtomicUsize,
    latency: Duration,
}

impl ScriptedFetcher {
    pub fn new(responses: Vec<FetchResult<TemporaryCredential>>) -> Arc<Self> {
        Self::with_latency(responses, Duration::ZERO)
    }

    pub fn with_latency(
        responses: Vec<FetchResult<TemporaryCredential>>,
        latency: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
            latency,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenFetcher for ScriptedFetcher {
    async fn fetch(&self) -> FetchResult<TemporaryCredential> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(CredentialFetchError::Unreachable(
                "script exhausted".to_string(),
            )))
    }
}

/// One recorded put
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Put {
    pub access_key_id: String,
    pub key: String,
    pub size: usize,
    pub content_type: String,
}

/// Connector whose stores record puts in memory
#[derive(Default)]
pub struct RecordingConnector {
    puts: Arc<Mutex<Vec<Put>>>,
    failures: Arc<Mutex<VecDeque<StoreError>>>,
    connected: Mutex<Vec<String>>,
    put_latency: Duration,
}

impl RecordingConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Stores that take `latency` to complete each put
    pub fn with_put_latency(latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            put_latency: latency,
            ..Self::default()
        })
    }

    /// Makes the next put fail with `error`, whichever store performs it
    pub fn fail_next_put(&self, error: StoreError) {
        self.failures.lock().unwrap().push_back(error);
    }

    pub fn puts(&self) -> Vec<Put> {
        self.puts.lock().unwrap().clone()
    }

    /// Access key ids stores were bound to, in order
    pub fn connected(&self) -> Vec<String> {
        self.connected.lock().unwrap().clone()
    }
}

impl StoreConnector for RecordingConnector {
    fn connect(&self, credential: &TemporaryCredential) -> Arc<dyn ObjectStore> {
        self.connected
            .lock()
            .unwrap()
            .push(credential.access_key_id.clone());

        Arc::new(RecordingStore {
            access_key_id: credential.access_key_id.clone(),
            puts: self.puts.clone(),
            failures: self.failures.clone(),
            latency: self.put_latency,
        })
    }

    fn public_url(&self, key: &str) -> String {
        format!("{PUBLIC_BASE_URL}/{key}")
    }
}

struct RecordingStore {
    access_key_id: String,
    puts: Arc<Mutex<Vec<Put>>>,
    failures: Arc<Mutex<VecDeque<StoreError>>>,
    latency: Duration,
}

#[async_trait]
impl ObjectStore for RecordingStore {
    async fn put_object(&self, key: &str, body: Vec<u8>, content_type: &str) -> StoreResult<()> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }

        self.puts.lock().unwrap().push(Put {
            access_key_id: self.access_key_id.clone(),
            key: key.to_string(),
            size: body.len(),
            content_type: content_type.to_string(),
        });
        Ok(())
    }
}

/// Manager wired to fakes, with a 60 second safety margin
pub struct TestContext {
    pub clock: Arc<ManualClock>,
    pub fetcher: Arc<ScriptedFetcher>,
    pub connector: Arc<RecordingConnector>,
    pub manager: UploadClientManager,
}

impl TestContext {
    pub fn new(responses: Vec<FetchResult<TemporaryCredential>>) -> Self {
        Self::with_fetcher(ScriptedFetcher::new(responses))
    }

    pub fn with_fetcher(fetcher: Arc<ScriptedFetcher>) -> Self {
        Self::with_parts(fetcher, RecordingConnector::new())
    }

    pub fn with_parts(fetcher: Arc<ScriptedFetcher>, connector: Arc<RecordingConnector>) -> Self {
        let clock = ManualClock::new(epoch());
        let manager = UploadClientManager::new(fetcher.clone(), connector.clone())
            .with_clock(clock.clone())
            .with_safety_margin_secs(60);

        Self {
            clock,
            fetcher,
            connector,
            manager,
        }
    }
}
