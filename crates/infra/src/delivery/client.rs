//! Periodic batch sender.
//!
//! Every report tick snapshots the agent's store, encodes the snapshot as one
//! batch and POSTs it to the server's batch route. Sends run concurrently up
//! to `rate_limit`; a tick that finds every permit taken waits for one. Each
//! send retries transient failures on its own fresh backoff policy and is
//! dropped (logged) once the policy stops. Counters are sent as running
//! totals read from the store, so a dropped tick is made up by the next
//! successful one.

use std::net::{IpAddr, UdpSocket};
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::{Client, Url};
use tally_common::{retry_with_backoff, BackoffPolicy};
use tally_core::MetricStore;
use tally_domain::constants::{
    GZIP_ENCODING, HASH_HEADER, JSON_CONTENT_TYPE, REAL_IP_HEADER, UPDATES_PATH,
};
use tally_domain::{AgentConfig, MetricBatch, Result, RetrySettings, TallyError};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, instrument, warn};

use crate::errors::conversions::{infra_err, status_to_error};
use crate::scheduling::{BackgroundTask, SchedulerResult};
use crate::wire::{EncodedPayload, WireEncoder};

const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Sender settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryConfig {
    /// Server base URL including scheme
    pub base_url: String,
    /// Sent with every batch; may not name a header the sender sets itself
    pub extra_headers: HeaderMap,
    pub report_interval: Duration,
    /// Maximum concurrent in-flight sends
    pub rate_limit: usize,
    pub request_timeout: Duration,
    pub retry: RetrySettings,
    /// How long `stop` waits for in-flight sends
    pub shutdown_timeout: Duration,
}

impl DeliveryConfig {
    /// # Errors
    ///
    /// Returns a config error when a configured header is not a valid HTTP
    /// header
    pub fn from_agent_config(config: &AgentConfig) -> Result<Self> {
        let mut extra_headers = HeaderMap::with_capacity(config.headers.len());
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TallyError::Config(format!("invalid header name '{name}': {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| TallyError::Config(format!("invalid value for header '{name}': {e}")))?;
            extra_headers.insert(name, value);
        }

        Ok(Self {
            base_url: config.base_url(),
            extra_headers,
            report_interval: config.report_interval(),
            rate_limit: config.rate_limit,
            request_timeout: config.request_timeout(),
            retry: config.retry.clone(),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        })
    }

    pub fn updates_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), UPDATES_PATH)
    }
}

/// What one tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Batch accepted by the server
    Sent { records: usize },
    /// Store was empty; nothing was sent
    Empty,
}

struct Sender {
    store: Arc<dyn MetricStore>,
    http: Client,
    encoder: WireEncoder,
    url: String,
    extra_headers: HeaderMap,
    real_ip: Option<String>,
    retry: RetrySettings,
    permits: Arc<Semaphore>,
}

/// Ships the store's contents to the server on a fixed period.
pub struct DeliveryClient {
    sender: Arc<Sender>,
    report_interval: Duration,
    task: BackgroundTask,
}

impl DeliveryClient {
    /// # Errors
    ///
    /// Returns a config error when the URL or the retry schedule is invalid,
    /// or when the HTTP client cannot be built
    pub fn new(
        config: DeliveryConfig,
        store: Arc<dyn MetricStore>,
        encoder: WireEncoder,
    ) -> Result<Self> {
        if config.rate_limit < 1 {
            return Err(TallyError::Config("rate_limit must be at least 1".to_string()));
        }
        backoff_policy(&config.retry)?;
        let reserved = [CONTENT_TYPE, CONTENT_ENCODING];
        for name in config.extra_headers.keys() {
            if reserved.contains(name)
                || name.as_str().eq_ignore_ascii_case(HASH_HEADER)
                || name.as_str().eq_ignore_ascii_case(REAL_IP_HEADER)
            {
                return Err(TallyError::Config(format!("header '{name}' is set by the sender")));
            }
        }

        let url = config.updates_url();
        let parsed = Url::parse(&url)
            .map_err(|e| TallyError::Config(format!("invalid server address {url}: {e}")))?;

        let http = Client::builder()
            .timeout(config.request_timeout)
            .no_proxy()
            .build()
            .map_err(infra_err)?;

        let sender = Sender {
            store,
            http,
            encoder,
            real_ip: outbound_ip(&parsed).map(|ip| ip.to_string()),
            url,
            extra_headers: config.extra_headers,
            retry: config.retry,
            permits: Arc::new(Semaphore::new(config.rate_limit)),
        };

        Ok(Self {
            sender: Arc::new(sender),
            report_interval: config.report_interval,
            task: BackgroundTask::new("delivery", config.shutdown_timeout),
        })
    }

    /// Send the current store contents once, with retry.
    pub async fn send_once(&self) -> Result<TickOutcome> {
        self.sender.send_once().await
    }

    /// Start the report loop; the first tick fires one interval from now.
    ///
    /// # Errors
    ///
    /// Returns error if the loop is already running
    pub async fn start(&mut self) -> SchedulerResult<()> {
        let sender = Arc::clone(&self.sender);
        let period = self.report_interval;

        self.task
            .start(move |cancel| async move {
                let mut ticker = interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                let mut in_flight = JoinSet::new();

                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = ticker.tick() => {}
                    }

                    let permit = tokio::select! {
                        _ = cancel.cancelled() => break,
                        permit = Arc::clone(&sender.permits).acquire_owned() => match permit {
                            Ok(permit) => permit,
                            Err(_) => break,
                        },
                    };

                    let tick_sender = Arc::clone(&sender);
                    in_flight.spawn(async move {
                        let _permit = permit;
                        tick_sender.tick().await;
                    });

                    while let Some(joined) = in_flight.try_join_next() {
                        if let Err(e) = joined {
                            error!(error = %e, "delivery task panicked");
                        }
                    }
                }

                debug!(in_flight = in_flight.len(), "delivery loop cancelled, draining sends");
                while let Some(joined) = in_flight.join_next().await {
                    if let Err(e) = joined {
                        error!(error = %e, "delivery task panicked");
                    }
                }
            })
            .await
    }

    /// Stop ticking and wait for in-flight sends to finish.
    ///
    /// # Errors
    ///
    /// Returns error if the loop is not running or does not drain within the
    /// shutdown timeout
    pub async fn stop(&mut self) -> SchedulerResult<()> {
        self.task.stop().await
    }

    pub fn is_running(&self) -> bool {
        self.task.is_running()
    }
}

impl Sender {
    async fn tick(&self) {
        match self.send_once().await {
            Ok(TickOutcome::Sent { records }) => debug!(records, "batch delivered"),
            Ok(TickOutcome::Empty) => debug!("store empty, nothing to deliver"),
            Err(e) => error!(error = %e, url = %self.url, "batch dropped"),
        }
    }

    #[instrument(skip(self), fields(url = %self.url))]
    async fn send_once(&self) -> Result<TickOutcome> {
        let values = self.store.get_all().await?;
        if values.is_empty() {
            return Ok(TickOutcome::Empty);
        }

        let batch: MetricBatch =
            values.iter().map(|(name, value)| value.to_record(name.as_str())).collect();
        let payload = self.encoder.encode(&batch)?;

        let policy = backoff_policy(&self.retry)?;
        let payload = &payload;
        retry_with_backoff(policy, "deliver_batch", TallyError::is_transient, move || {
            self.post(payload)
        })
        .await?;

        Ok(TickOutcome::Sent { records: batch.len() })
    }

    async fn post(&self, payload: &EncodedPayload) -> Result<()> {
        let mut request = self
            .http
            .post(&self.url)
            .headers(self.extra_headers.clone())
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
            .body(payload.body.clone());

        if payload.gzip {
            request = request.header(CONTENT_ENCODING, GZIP_ENCODING);
        }
        if let Some(hash) = &payload.hash {
            request = request.header(HASH_HEADER, hash);
        }
        if let Some(ip) = &self.real_ip {
            request = request.header(REAL_IP_HEADER, ip);
        }

        let response = request.send().await.map_err(infra_err)?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        warn!(status = status.as_u16(), body = %body.trim(), "server refused batch");
        Err(status_to_error(status))
    }
}

fn backoff_policy(retry: &RetrySettings) -> Result<BackoffPolicy> {
    BackoffPolicy::new(retry.initial_interval(), retry.increment(), retry.max_attempts)
        .map_err(|e| TallyError::Config(e.to_string()))
}

/// Local address the OS would route through to reach `url`.
///
/// Connecting a UDP socket sends nothing; it only fixes the route.
fn outbound_ip(url: &Url) -> Option<IpAddr> {
    let host = url.host_str()?;
    let port = url.port_or_known_default()?;
    let socket = UdpSocket::bind(("0.0.0.0", 0)).ok()?;
    socket.connect((host, port)).ok()?;
    socket.local_addr().ok().map(|addr| addr.ip())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tally_common::IntegrityGuard;
    use tally_core::MemoryStore;
    use tally_domain::{MetricRecord, MetricSample};
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    use super::*;

    fn config(server: &MockServer) -> DeliveryConfig {
        DeliveryConfig {
            base_url: server.uri(),
            extra_headers: HeaderMap::new(),
            report_interval: Duration::from_millis(20),
            rate_limit: 1,
            request_timeout: Duration::from_secs(2),
            retry: RetrySettings { initial_interval_ms: 5, increment_ms: 5, max_attempts: 3 },
            shutdown_timeout: Duration::from_secs(5),
        }
    }

    async fn seeded_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.set_metric(None, "PollCount", MetricSample::Counter(3)).await.unwrap();
        store.set_metric(None, "Alloc", MetricSample::Gauge(1.5)).await.unwrap();
        store
    }

    #[tokio::test]
    async fn sends_snapshot_with_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/updates"))
            .and(header("content-type", "application/json"))
            .and(header_exists("HashSHA256"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let encoder = WireEncoder::new().with_integrity(IntegrityGuard::new("k").unwrap());
        let client = DeliveryClient::new(config(&server), seeded_store().await, encoder).unwrap();

        assert_eq!(client.send_once().await.unwrap(), TickOutcome::Sent { records: 2 });

        let requests = server.received_requests().await.unwrap();
        let batch: Vec<MetricRecord> = serde_json::from_slice(&requests[0].body).unwrap();
        assert!(batch.contains(&MetricRecord::counter("PollCount", 3)));
        assert!(batch.contains(&MetricRecord::gauge("Alloc", 1.5)));

        let hash = requests[0].headers.get("HashSHA256").unwrap().to_str().unwrap();
        assert_eq!(hash, IntegrityGuard::new("k").unwrap().sign(&requests[0].body));
    }

    #[tokio::test]
    async fn retries_transient_status_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .with_priority(2)
            .mount(&server)
            .await;

        let client =
            DeliveryClient::new(config(&server), seeded_store().await, WireEncoder::new()).unwrap();
        assert_eq!(client.send_once().await.unwrap(), TickOutcome::Sent { records: 2 });
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn rejected_batch_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400))
            .expect(1)
            .mount(&server)
            .await;

        let client =
            DeliveryClient::new(config(&server), seeded_store().await, WireEncoder::new()).unwrap();
        let err = client.send_once().await.unwrap_err();
        assert!(matches!(err, TallyError::Rejected(_)));
    }

    #[tokio::test]
    async fn gives_up_after_schedule_is_exhausted() {
        let server = MockServer::start().await;
        Mock::given(method("POST")).respond_with(ResponseTemplate::new(503)).mount(&server).await;

        let client =
            DeliveryClient::new(config(&server), seeded_store().await, WireEncoder::new()).unwrap();
        let err = client.send_once().await.unwrap_err();
        assert!(err.is_transient());
        // one initial attempt plus three retries
        assert_eq!(server.received_requests().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn empty_store_sends_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client =
            DeliveryClient::new(config(&server), Arc::new(MemoryStore::new()), WireEncoder::new())
                .unwrap();
        assert_eq!(client.send_once().await.unwrap(), TickOutcome::Empty);
    }

    #[tokio::test]
    async fn loop_delivers_until_stopped() {
        let server = MockServer::start().await;
        Mock::given(method("POST")).respond_with(ResponseTemplate::new(200)).mount(&server).await;

        let mut client =
            DeliveryClient::new(config(&server), seeded_store().await, WireEncoder::new()).unwrap();
        client.start().await.unwrap();
        assert!(client.is_running());

        tokio::time::sleep(Duration::from_millis(90)).await;
        client.stop().await.unwrap();
        assert!(!client.is_running());

        let sent = server.received_requests().await.unwrap().len();
        assert!(sent >= 2, "expected several ticks, got {sent}");

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(server.received_requests().await.unwrap().len(), sent);
    }

    /// Answers after `delay` and records how many requests overlap.
    ///
    /// A request counts as open until its delayed response has been written,
    /// so the client cannot free its permit any earlier.
    #[derive(Clone)]
    struct SlowResponder {
        delay: Duration,
        open: Arc<parking_lot::Mutex<Vec<std::time::Instant>>>,
        peak: Arc<AtomicUsize>,
        received: Arc<AtomicUsize>,
    }

    impl SlowResponder {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                open: Arc::default(),
                peak: Arc::default(),
                received: Arc::default(),
            }
        }
    }

    impl Respond for SlowResponder {
        fn respond(&self, _request: &Request) -> ResponseTemplate {
            let now = std::time::Instant::now();
            let mut open = self.open.lock();
            open.retain(|arrived| *arrived + self.delay > now);
            open.push(now);
            self.peak.fetch_max(open.len(), Ordering::SeqCst);
            self.received.fetch_add(1, Ordering::SeqCst);
            ResponseTemplate::new(200).set_delay(self.delay)
        }
    }

    #[tokio::test]
    async fn rate_limit_caps_concurrent_sends_and_waiting_ticks_send_later() {
        let server = MockServer::start().await;
        // several report intervals long
        let responder = SlowResponder::new(Duration::from_millis(150));
        Mock::given(method("POST")).respond_with(responder.clone()).mount(&server).await;

        let config = DeliveryConfig { rate_limit: 2, ..config(&server) };
        let mut client =
            DeliveryClient::new(config, seeded_store().await, WireEncoder::new()).unwrap();
        client.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(450)).await;
        client.stop().await.unwrap();

        assert_eq!(responder.peak.load(Ordering::SeqCst), 2);
        let received = responder.received.load(Ordering::SeqCst);
        assert!(received >= 4, "ticks that waited for a permit were never sent, got {received}");
    }

    #[tokio::test]
    async fn configured_headers_ride_along() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("x-agent-id", "edge-7"))
            .and(header("content-type", "application/json"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let agent = AgentConfig {
            address: server.uri(),
            headers: BTreeMap::from([("X-Agent-Id".to_string(), "edge-7".to_string())]),
            ..AgentConfig::default()
        };
        let config = DeliveryConfig::from_agent_config(&agent).unwrap();
        let client = DeliveryClient::new(config, seeded_store().await, WireEncoder::new()).unwrap();

        assert_eq!(client.send_once().await.unwrap(), TickOutcome::Sent { records: 2 });
    }

    #[tokio::test]
    async fn headers_owned_by_the_sender_cannot_be_configured() {
        let server = MockServer::start().await;
        for name in ["Content-Type", "HashSHA256", "X-Real-IP"] {
            let mut config = config(&server);
            config
                .extra_headers
                .insert(HeaderName::from_bytes(name.as_bytes()).unwrap(), HeaderValue::from_static("x"));
            let err = DeliveryClient::new(config, seeded_store().await, WireEncoder::new())
                .err()
                .unwrap();
            assert!(matches!(err, TallyError::Config(_)), "{name}: {err:?}");
        }
    }

    #[test]
    fn invalid_configured_header_is_a_config_error() {
        let agent = AgentConfig {
            headers: BTreeMap::from([("bad header".to_string(), "v".to_string())]),
            ..AgentConfig::default()
        };
        let err = DeliveryConfig::from_agent_config(&agent).unwrap_err();
        assert!(matches!(err, TallyError::Config(_)));
    }

    #[test]
    fn updates_url_joins_base() {
        let config = DeliveryConfig::from_agent_config(&AgentConfig {
            address: "localhost:9000/".to_string(),
            ..AgentConfig::default()
        })
        .unwrap();
        assert_eq!(config.updates_url(), "http://localhost:9000/updates");
        assert_eq!(config.shutdown_timeout, DEFAULT_SHUTDOWN_TIMEOUT);
        assert!(config.extra_headers.is_empty());
    }
}
