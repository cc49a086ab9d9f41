use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context};
use rand::RngExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use unidl_core::models::message::{parse_message, ServerMessage};

use crate::core::reconnect::ReconnectPolicy;
use crate::core::registry::{Subscription, SubscriptionRegistry};
use crate::core::transport::{Channel, Transport};

const CLIENT_ID_LEN: usize = 8;
const CLIENT_ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Short lowercase alphanumeric token identifying this session to the backend.
pub fn generate_client_id() -> String {
    let mut rng = rand::rng();
    (0..CLIENT_ID_LEN)
        .map(|_| CLIENT_ID_ALPHABET[rng.random_range(0..CLIENT_ID_ALPHABET.len())] as char)
        .collect()
}

/// Push endpoint for an HTTP base address: same origin, `ws`/`wss` scheme,
/// `/ws/{client_id}` path.
pub fn ws_endpoint(base_url: &str, client_id: &str) -> anyhow::Result<String> {
    let mut url =
        url::Url::parse(base_url).with_context(|| format!("invalid backend url '{}'", base_url))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(anyhow!("unsupported backend scheme '{}'", other)),
    };
    url.set_scheme(scheme)
        .map_err(|_| anyhow!("cannot use scheme {} for {}", scheme, base_url))?;
    let path = format!("{}/ws/{}", url.path().trim_end_matches('/'), client_id);
    url.set_path(&path);
    url.set_query(None);
    url.set_fragment(None);
    Ok(url.to_string())
}

struct Inner {
    transport: Arc<dyn Transport>,
    url: String,
    policy: ReconnectPolicy,
    registry: SubscriptionRegistry,
    connected: watch::Sender<bool>,
    running: AtomicBool,
    shutdown: CancellationToken,
}

/// Owns the single duplex channel of a session and fans its messages out to
/// subscribers. Dropping the manager tears the channel down for good.
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    pub fn new(
        transport: Arc<dyn Transport>,
        base_url: &str,
        policy: ReconnectPolicy,
    ) -> anyhow::Result<Self> {
        let url = ws_endpoint(base_url, &generate_client_id())?;
        let (connected, _) = watch::channel(false);
        Ok(Self {
            inner: Arc::new(Inner {
                transport,
                url,
                policy,
                registry: SubscriptionRegistry::new(),
                connected,
                running: AtomicBool::new(false),
                shutdown: CancellationToken::new(),
            }),
        })
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Starts the connection loop unless one is already live. Must be called
    /// from within a tokio runtime.
    pub fn connect(&self) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }
        if self.inner.running.swap(true, Ordering::AcqRel) {
            return;
        }
        let inner = self.inner.clone();
        tokio::spawn(async move {
            inner.run().await;
            inner.running.store(false, Ordering::Release);
        });
    }

    pub fn is_connected(&self) -> bool {
        *self.inner.connected.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<bool> {
        self.inner.connected.subscribe()
    }

    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ServerMessage) + Send + Sync + 'static,
    {
        self.inner.registry.subscribe(handler)
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.inner.registry
    }

    /// Closes the live channel and cancels any scheduled reconnect.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.inner.shutdown.cancel();
    }
}

impl Inner {
    async fn run(&self) {
        let mut attempt: u32 = 0;
        loop {
            let opened = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                opened = self.transport.open(&self.url) => opened,
            };

            match opened {
                Ok(mut channel) => {
                    tracing::info!("[ws] connected to {}", self.url);
                    attempt = 0;
                    self.connected.send_replace(true);
                    let stopped = self.pump(channel.as_mut()).await;
                    self.connected.send_replace(false);
                    channel.close().await;
                    if stopped {
                        break;
                    }
                    tracing::info!("[ws] disconnected");
                }
                Err(e) => tracing::debug!("[ws] connect failed: {:#}", e),
            }

            attempt = attempt.saturating_add(1);
            let Some(delay) = self.policy.delay_for(attempt) else {
                tracing::warn!("[ws] giving up after {} reconnect attempts", attempt - 1);
                break;
            };
            tracing::debug!("[ws] reconnecting in {:?}", delay);
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        self.connected.send_replace(false);
    }

    /// Reads until the channel ends. Returns `true` when stopped by shutdown.
    async fn pump(&self, channel: &mut dyn Channel) -> bool {
        loop {
            let frame = tokio::select! {
                _ = self.shutdown.cancelled() => return true,
                frame = channel.next_text() => frame,
            };
            match frame {
                Some(Ok(text)) => self.dispatch(&text),
                Some(Err(e)) => {
                    tracing::debug!("[ws] transport error: {:#}", e);
                    return false;
                }
                None => return false,
            }
        }
    }

    fn dispatch(&self, text: &str) {
        match parse_message(text) {
            Ok(message) => self.registry.dispatch(&message),
            Err(e) => tracing::warn!("[ws] dropping malformed message: {:#}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::FakeTransport;
    use std::sync::Mutex;
    use std::time::Duration;

    const DELAY: Duration = Duration::from_secs(3);

    fn manager(transport: Arc<FakeTransport>, policy: ReconnectPolicy) -> ConnectionManager {
        ConnectionManager::new(transport, "http://127.0.0.1:8000", policy).unwrap()
    }

    #[test]
    fn endpoint_swaps_scheme_and_appends_client() {
        assert_eq!(
            ws_endpoint("http://127.0.0.1:8000", "abc123").unwrap(),
            "ws://127.0.0.1:8000/ws/abc123"
        );
        assert_eq!(
            ws_endpoint("https://dl.example.com/", "abc123").unwrap(),
            "wss://dl.example.com/ws/abc123"
        );
        assert_eq!(
            ws_endpoint("https://example.com/downloader?x=1", "id").unwrap(),
            "wss://example.com/downloader/ws/id"
        );
        assert!(ws_endpoint("ftp://example.com", "id").is_err());
        assert!(ws_endpoint("not a url", "id").is_err());
    }

    #[test]
    fn client_ids_are_short_alphanumeric() {
        let a = generate_client_id();
        assert_eq!(a.len(), CLIENT_ID_LEN);
        assert!(a.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
        assert_ne!(a, generate_client_id());

        let pooled: String = (0..64).map(|_| generate_client_id()).collect();
        assert!(pooled.chars().any(|c| c.is_ascii_digit()));
        assert!(pooled.chars().any(|c| c.is_ascii_lowercase()));
    }

    #[tokio::test(start_paused = true)]
    async fn connect_is_idempotent() {
        let (transport, mut accepted) = FakeTransport::new();
        let conn = manager(transport.clone(), ReconnectPolicy::fixed(DELAY));

        conn.connect();
        conn.connect();
        let _server = accepted.recv().await.unwrap();
        conn.connect();
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(transport.attempt_count(), 1);
        assert!(conn.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn close_schedules_exactly_one_retry_after_delay() {
        let (transport, mut accepted) = FakeTransport::new();
        let conn = manager(transport.clone(), ReconnectPolicy::fixed(DELAY));
        conn.connect();

        let mut server = accepted.recv().await.unwrap();
        assert!(server.url.starts_with("ws://127.0.0.1:8000/ws/"));

        for round in 1..=5 {
            server.hang_up();
            server = accepted.recv().await.unwrap();

            let attempts = transport.attempts();
            assert_eq!(attempts.len(), round + 1);
            let gap = attempts[round].1 - attempts[round - 1].1;
            assert!(gap >= DELAY, "retried after {:?}", gap);
            assert!(gap < DELAY + Duration::from_millis(100), "retried after {:?}", gap);
        }

        // An open channel schedules nothing.
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(transport.attempt_count(), 6);
        drop(server);
    }

    #[tokio::test(start_paused = true)]
    async fn refused_connections_keep_retrying_at_fixed_delay() {
        let (transport, mut accepted) = FakeTransport::new();
        transport.refuse_connections(true);
        let conn = manager(transport.clone(), ReconnectPolicy::fixed(DELAY));
        conn.connect();

        tokio::time::sleep(DELAY * 10 + Duration::from_millis(10)).await;
        assert_eq!(transport.attempt_count(), 11);
        assert!(!conn.is_connected());

        transport.refuse_connections(false);
        let _server = accepted.recv().await.unwrap();
        assert!(conn.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_policy_stops_retrying() {
        let (transport, _accepted) = FakeTransport::new();
        transport.refuse_connections(true);
        let conn = manager(
            transport.clone(),
            ReconnectPolicy::fixed(DELAY).with_max_attempts(2),
        );
        conn.connect();

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(transport.attempt_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_error_closes_channel_and_reconnects() {
        let (transport, mut accepted) = FakeTransport::new();
        let conn = manager(transport.clone(), ReconnectPolicy::fixed(DELAY));
        let mut state = conn.watch_state();
        conn.connect();

        let server = accepted.recv().await.unwrap();
        state.wait_for(|c| *c).await.unwrap();
        server.fail("connection reset");
        state.wait_for(|c| !*c).await.unwrap();

        let _server = accepted.recv().await.unwrap();
        assert_eq!(transport.attempt_count(), 2);
        assert!(conn.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_reconnecting() {
        let (transport, mut accepted) = FakeTransport::new();
        let conn = manager(transport.clone(), ReconnectPolicy::fixed(DELAY));
        conn.connect();
        let server = accepted.recv().await.unwrap();

        server.hang_up();
        tokio::time::sleep(Duration::from_secs(1)).await;
        conn.shutdown();
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(transport.attempt_count(), 1);
        assert!(!conn.is_connected());
        conn.connect();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(transport.attempt_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_payloads_never_reach_handlers() {
        let (transport, mut accepted) = FakeTransport::new();
        let conn = manager(transport.clone(), ReconnectPolicy::fixed(DELAY));
        let seen: Arc<Mutex<Vec<ServerMessage>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = conn.subscribe(move |msg| sink.lock().unwrap().push(msg.clone()));
        conn.connect();

        let server = accepted.recv().await.unwrap();
        server.send("{not json");
        server.send(r#"{"type":"progress","taskId":"t1","status":"teleported"}"#);
        server.send(r#"[{"type":"progress"}]"#);
        server.send(r#"{"type":"progress","taskId":"t1","status":"downloading","progress":42}"#);
        tokio::time::sleep(Duration::from_millis(10)).await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(matches!(&seen[0], ServerMessage::Task(u) if u.task_id == "t1"));
        assert!(conn.is_connected());
        assert_eq!(transport.attempt_count(), 1);
    }
}
