// src/network/pool.rs

//! Mining pool client implementation
//!
//! The session runs on the main thread with blocking I/O: resolve, connect,
//! send the hello, then read server messages until the connection drops or
//! the pool rejects too many shares in a row. Workers submit shares through
//! a [`PoolLink`], which writes on a cloned handle of the same socket.
use crate::miner::collision::ShareSink;
use crate::miner::template::BlockTemplateStore;
use crate::network::protocol::{
    Hello, ServerMessage, classify_result, derive_pool_password, encode_submission,
};
use crate::stats::reporter::{SessionStats, sleep_while_running, total_collisions};
use crate::types::{BlockHeader, format_u256};
use crate::utils::error::MinerError;
use serde::{Deserialize, Serialize};
use std::io::{BufReader, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use url::{Host, Url};

/// Pool used when none is configured
pub const DEFAULT_POOL_URL: &str = "tcp://ptsmine.beeeeer.org:1337";

/// Port used when the pool URL has none
pub const DEFAULT_POOL_PORT: u16 = 1337;

/// Consecutive non-accepted results that force a reconnect
pub const REJECT_LIMIT: u32 = 3;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// Bounds how long a share write can hold the link
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for connecting to a mining pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Pool address (e.g., "tcp://pool.example.com:1337")
    #[serde(default = "default_url")]
    pub url: String,
    /// Payout address or pool username
    pub user: String,
    /// Password before derivation (the pool only sees a hash of it)
    #[serde(default = "default_password")]
    pub password: String,
    /// Miner software identifier announced in the hello
    #[serde(default)]
    pub miner_id: u16,
    /// Pool fee percentage offered in the hello
    #[serde(default)]
    pub fee: u8,
    /// Seconds to wait before reconnecting
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,
}

fn default_url() -> String {
    DEFAULT_POOL_URL.to_string()
}

fn default_password() -> String {
    "blabla".to_string()
}

fn default_reconnect_delay() -> u64 {
    10
}

impl PoolConfig {
    /// Configuration for `user` on the default pool
    pub fn for_user(user: impl Into<String>) -> Self {
        PoolConfig {
            url: default_url(),
            user: user.into(),
            password: default_password(),
            miner_id: 0,
            fee: 0,
            reconnect_delay_secs: default_reconnect_delay(),
        }
    }

    /// Host and port of the pool
    ///
    /// # Errors
    /// Returns `MinerError` if:
    /// - URL is invalid
    /// - the scheme is not `tcp`
    /// - the URL has no host
    pub fn endpoint(&self) -> Result<(String, u16), MinerError> {
        let url = Url::parse(&self.url)?;
        if url.scheme() != "tcp" {
            return Err(MinerError::ConfigError(format!(
                "pool URL '{}' must use the tcp:// scheme",
                self.url
            )));
        }
        let host = match url.host() {
            Some(Host::Domain(domain)) => domain.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            None => {
                return Err(MinerError::ConfigError(format!(
                    "pool URL '{}' has no host",
                    self.url
                )));
            }
        };
        Ok((host, url.port().unwrap_or(DEFAULT_POOL_PORT)))
    }

    /// Reconnect backoff
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

/// Write side of the current pool connection, shared with the workers
///
/// Cloning is cheap; all clones refer to the same connection slot.
#[derive(Clone, Default)]
pub struct PoolLink {
    inner: Arc<LinkInner>,
}

#[derive(Default)]
struct LinkInner {
    stream: Mutex<Option<TcpStream>>,
    submitted: AtomicU64,
}

impl PoolLink {
    /// A link with no connection attached
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<TcpStream>> {
        self.inner
            .stream
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Makes `stream` the target of future submissions
    pub fn attach(&self, stream: TcpStream) {
        *self.slot() = Some(stream);
    }

    /// Forgets the current connection
    pub fn detach(&self) {
        *self.slot() = None;
    }

    /// Whether a connection is attached
    pub fn is_connected(&self) -> bool {
        self.slot().is_some()
    }

    /// Writes one share to the pool
    ///
    /// # Errors
    /// `ConnectionError` when no connection is attached, `IoError` when the
    /// write fails. Failed writes are not retried.
    pub fn submit_share(&self, header: &BlockHeader) -> Result<(), MinerError> {
        let mut slot = self.slot();
        let stream = slot
            .as_mut()
            .ok_or_else(|| MinerError::ConnectionError("Not connected".into()))?;
        stream.write_all(&encode_submission(header))?;
        self.inner.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Shares written since the last reset
    pub fn submitted(&self) -> u64 {
        self.inner.submitted.load(Ordering::Relaxed)
    }

    /// Restarts the submitted-share count
    pub fn reset_submitted(&self) {
        self.inner.submitted.store(0, Ordering::Relaxed);
    }

    /// Shuts the socket down so a blocked session read returns
    pub fn shutdown(&self) {
        if let Some(stream) = self.slot().as_ref() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

impl ShareSink for PoolLink {
    fn submit(&self, header: &BlockHeader, thread_id: usize) {
        log::info!(
            "[WORKER{}] share found: {} <-> {} @ {}",
            thread_id,
            header.birthday_a,
            header.birthday_b,
            header.time
        );
        if let Err(e) = self.submit_share(header) {
            log::warn!("[WORKER{}] share dropped: {}", thread_id, e);
        }
    }
}

/// Why a connection ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Read error or the pool closed the connection
    ConnectionLost(String),
    /// Too many non-accepted results in a row
    TooManyRejects,
    /// The running flag was cleared
    Shutdown,
}

/// Client for communicating with a mining pool
pub struct PoolSession {
    /// Pool connection configuration
    config: PoolConfig,
    /// Login sent on every connect
    hello: Hello,
    /// Where received templates go
    store: Arc<BlockTemplateStore>,
    /// Shared write side used by the workers
    link: PoolLink,
    running: Arc<AtomicBool>,
    /// Per-worker collision counters, for the stats line
    counters: Vec<Arc<AtomicU64>>,
    stats: SessionStats,
    reject_streak: u32,
}

impl PoolSession {
    /// Creates a new session
    ///
    /// # Arguments
    /// * `config` - Pool connection configuration
    /// * `threads` - Worker count announced to the pool
    /// * `store` - Template store the workers read from
    /// * `link` - Write side shared with the workers
    /// * `running` - Cleared to stop the session
    ///
    /// # Errors
    /// `InputError` if the hello cannot be encoded.
    pub fn new(
        config: PoolConfig,
        threads: usize,
        store: Arc<BlockTemplateStore>,
        link: PoolLink,
        running: Arc<AtomicBool>,
    ) -> Result<Self, MinerError> {
        let hello = Hello {
            username: config.user.clone(),
            threads: u8::try_from(threads).unwrap_or(u8::MAX),
            fee: config.fee,
            miner_id: config.miner_id,
            password: derive_pool_password(&config.password),
        };
        hello.encode()?;

        Ok(PoolSession {
            config,
            hello,
            store,
            link,
            running,
            counters: Vec::new(),
            stats: SessionStats::new(),
            reject_streak: 0,
        })
    }

    /// Uses the workers' collision counters for the stats line
    pub fn with_collision_counters(mut self, counters: Vec<Arc<AtomicU64>>) -> Self {
        self.counters = counters;
        self
    }

    /// Statistics of the current connection
    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Consecutive non-accepted results
    pub fn reject_streak(&self) -> u32 {
        self.reject_streak
    }

    /// Connects and serves the pool until the running flag is cleared
    ///
    /// Connection failures are never fatal: the store is cleared, the
    /// session backs off and tries again.
    ///
    /// # Errors
    /// Returns `MinerError` only if the pool URL is invalid
    pub fn run(&mut self) -> Result<(), MinerError> {
        let (host, port) = self.config.endpoint()?;
        log::info!("[MASTER] pool {}:{} as {}", host, port, self.config.user);

        while self.running.load(Ordering::SeqCst) {
            match self.connect(&host, port) {
                Ok(stream) => {
                    let reason = self.serve(stream);
                    log::info!("[MASTER] connection closed: {:?}", reason);
                }
                Err(e) => log::warn!("[MASTER] cannot connect to {}:{}: {}", host, port, e),
            }

            self.store.clear();
            self.link.detach();
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            log::info!(
                "no connection to the server, reconnecting in {} seconds",
                self.config.reconnect_delay_secs
            );
            sleep_while_running(self.config.reconnect_delay(), &self.running);
        }

        log::info!("[MASTER] pool session stopped");
        Ok(())
    }

    /// Resolves the pool and tries every address in order
    fn connect(&self, host: &str, port: u16) -> Result<TcpStream, MinerError> {
        let addrs: Vec<SocketAddr> = (host, port).to_socket_addrs()?.collect();
        let mut last_error = None;

        for addr in &addrs {
            match TcpStream::connect_timeout(addr, CONNECT_TIMEOUT) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    log::info!("[MASTER] connected to {}", addr);
                    return Ok(stream);
                }
                Err(e) => {
                    log::debug!("[MASTER] {} refused: {}", addr, e);
                    last_error = Some(e);
                }
            }
        }

        Err(match last_error {
            Some(e) => e.into(),
            None => MinerError::ConnectionError(format!("{} resolved to no addresses", host)),
        })
    }

    /// Handshakes on a fresh connection and streams it until it closes
    fn serve(&mut self, stream: TcpStream) -> CloseReason {
        self.stats.reset(total_collisions(&self.counters));
        self.link.reset_submitted();
        self.reject_streak = 0;

        let hello = match self.hello.encode() {
            Ok(hello) => hello,
            Err(e) => return CloseReason::ConnectionLost(e.to_string()),
        };
        if let Err(e) = (&stream).write_all(&hello) {
            return CloseReason::ConnectionLost(format!("hello failed: {}", e));
        }
        let writer = stream
            .try_clone()
            .and_then(|writer| writer.set_write_timeout(Some(WRITE_TIMEOUT)).map(|_| writer));
        match writer {
            Ok(writer) => self.link.attach(writer),
            Err(e) => return CloseReason::ConnectionLost(format!("cannot share socket: {}", e)),
        }

        let mut reader = BufReader::new(stream);
        self.stream_messages(&mut reader)
    }

    /// Reads and handles server messages until the stream ends
    pub fn stream_messages<R: Read>(&mut self, reader: &mut R) -> CloseReason {
        loop {
            if !self.running.load(Ordering::SeqCst) {
                return CloseReason::Shutdown;
            }
            let message = match ServerMessage::read_from(reader) {
                Ok(message) => message,
                Err(_) if !self.running.load(Ordering::SeqCst) => return CloseReason::Shutdown,
                Err(e) => return CloseReason::ConnectionLost(e.to_string()),
            };
            if let Some(reason) = self.handle_message(message) {
                return reason;
            }
        }
    }

    /// Applies one server message; returns a reason if the connection must close
    pub fn handle_message(&mut self, message: ServerMessage) -> Option<CloseReason> {
        match message {
            ServerMessage::Template(header) => {
                self.store.publish(header);
                log::info!(
                    "[MASTER] work received - sharetarget {}",
                    format_u256(&header.target_share)
                );
                None
            }
            ServerMessage::ShareResult(code) => {
                let result = classify_result(code);
                log::info!("[MASTER] submitted share -> {}", result);

                if result.is_accepted() {
                    self.reject_streak = 0;
                } else {
                    self.reject_streak += 1;
                }
                self.stats.record(result);
                log::info!(
                    "{}",
                    self.stats
                        .summary_line(total_collisions(&self.counters), self.link.submitted())
                );

                if self.reject_streak >= REJECT_LIMIT {
                    log::warn!(
                        "too many rejects ({}) in a row, forcing reconnect.",
                        REJECT_LIMIT
                    );
                    return Some(CloseReason::TooManyRejects);
                }
                None
            }
            ServerMessage::KeepAlive => {
                log::trace!("[MASTER] keepalive");
                None
            }
            ServerMessage::Unknown(kind) => {
                log::debug!("[MASTER] ignoring message type {}", kind);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::protocol::{MSG_KEEPALIVE, MSG_SHARE_RESULT, MSG_TEMPLATE};
    use crate::types::TEMPLATE_PAYLOAD_SIZE;
    use std::io::Cursor;

    fn session() -> (PoolSession, Arc<BlockTemplateStore>) {
        let store = Arc::new(BlockTemplateStore::new(2));
        let session = PoolSession::new(
            PoolConfig::for_user("Ptest"),
            2,
            Arc::clone(&store),
            PoolLink::new(),
            Arc::new(AtomicBool::new(true)),
        )
        .unwrap();
        (session, store)
    }

    fn result(code: i32) -> Vec<u8> {
        let mut bytes = vec![MSG_SHARE_RESULT];
        bytes.extend_from_slice(&code.to_le_bytes());
        bytes
    }

    fn template(fill: u8) -> Vec<u8> {
        let mut bytes = vec![MSG_TEMPLATE];
        bytes.extend_from_slice(&[fill; TEMPLATE_PAYLOAD_SIZE]);
        bytes
    }

    #[test]
    fn test_endpoint_parsing() {
        let config = PoolConfig::for_user("P");
        assert_eq!(
            config.endpoint().unwrap(),
            ("ptsmine.beeeeer.org".to_string(), 1337)
        );

        let mut local = PoolConfig::for_user("P");
        local.url = "tcp://127.0.0.1:4000".into();
        assert_eq!(local.endpoint().unwrap(), ("127.0.0.1".to_string(), 4000));

        local.url = "http://127.0.0.1:4000".into();
        assert!(matches!(local.endpoint(), Err(MinerError::ConfigError(_))));
    }

    #[test]
    fn test_three_rejects_force_reconnect() {
        let (mut session, _store) = session();
        let stream = [result(0), result(-1), result(0), template(1)].concat();

        let reason = session.stream_messages(&mut Cursor::new(stream));

        assert_eq!(reason, CloseReason::TooManyRejects);
        assert_eq!(session.stats().rejected, 2);
        assert_eq!(session.stats().stale, 1);
    }

    #[test]
    fn test_accept_resets_reject_streak() {
        let (mut session, _store) = session();
        let stream = [result(0), result(0), result(5), result(0), result(0)].concat();

        let reason = session.stream_messages(&mut Cursor::new(stream));

        assert!(matches!(reason, CloseReason::ConnectionLost(_)));
        assert_eq!(session.reject_streak(), 2);
        assert_eq!(session.stats().valid(), 1);
    }

    #[test]
    fn test_large_result_code_counts_as_block() {
        let (mut session, _store) = session();
        session.stream_messages(&mut Cursor::new(result(5000)));
        assert_eq!(session.stats().blocks, 1);
    }

    #[test]
    fn test_template_is_published() {
        let (mut session, store) = session();
        let stream = [template(0x42), vec![MSG_KEEPALIVE, 0x7f], template(0x43)].concat();

        let reason = session.stream_messages(&mut Cursor::new(stream));

        assert!(matches!(reason, CloseReason::ConnectionLost(_)));
        let header = store.snapshot().unwrap();
        assert_eq!(header.prev_hash, [0x43; 32]);
        assert_eq!(header.target_share, [0x43; 32]);
    }

    #[test]
    fn test_truncated_message_closes() {
        let (mut session, store) = session();
        let mut stream = template(1);
        stream.truncate(40);

        let reason = session.stream_messages(&mut Cursor::new(stream));

        assert!(matches!(reason, CloseReason::ConnectionLost(_)));
        assert!(store.snapshot().is_none());
    }

    #[test]
    fn test_stopped_session_reads_nothing() {
        let (mut session, store) = session();
        session.running.store(false, Ordering::SeqCst);
        let reason = session.stream_messages(&mut Cursor::new(template(1)));
        assert_eq!(reason, CloseReason::Shutdown);
        assert!(store.snapshot().is_none());
    }

    #[test]
    fn test_link_without_connection_drops_share() {
        let link = PoolLink::new();
        assert!(!link.is_connected());
        assert!(matches!(
            link.submit_share(&BlockHeader::default()),
            Err(MinerError::ConnectionError(_))
        ));
        link.submit(&BlockHeader::default(), 0);
        assert_eq!(link.submitted(), 0);
    }
}
