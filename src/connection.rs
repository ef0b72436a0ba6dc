//! Connection lifecycle, reconnect backoff and health statistics
//!
//! The manager owns the adapter. Callers invoke
//! [`ConnectionManager::ensure_connection`] before each protocol operation;
//! it reconnects when the channel is down, but never more often than the
//! current backoff delay allows. Loss and restoration are each logged once
//! per outage.

use crate::adapter::ProtocolAdapter;
use crate::config::ConnectionConfig;
use crate::error::{HeatlinkError, Result};
use crate::logging::{StructuredLogger, get_device_logger};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Exponential reconnect delay bounded by `[base, max]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
    pub multiplier: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from(&ConnectionConfig::default())
    }
}

impl From<&ConnectionConfig> for BackoffPolicy {
    fn from(config: &ConnectionConfig) -> Self {
        Self {
            base: config.base_delay(),
            max: config.max_delay(),
            multiplier: config.reconnect_multiplier,
        }
    }
}

impl BackoffPolicy {
    /// Delay to wait after another failure at `current`
    pub fn next_delay(&self, current: Duration) -> Duration {
        Duration::try_from_secs_f64(current.as_secs_f64() * self.multiplier.max(1.0))
            .unwrap_or(self.max)
            .clamp(self.base.min(self.max), self.max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    Reconnecting { delay: Duration },
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Connected => f.write_str("connected"),
            Self::Reconnecting { delay } => {
                write!(f, "reconnecting ({:.1}s)", delay.as_secs_f64())
            }
        }
    }
}

/// Cumulative counters since process start
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConnectionStats {
    pub total_connects: u64,
    pub total_disconnects: u64,
    pub total_reconnects: u64,
    pub total_read_errors: u64,
    pub total_write_errors: u64,
    pub last_error: Option<String>,
    pub last_successful_read: Option<DateTime<Utc>>,
    pub uptime_start: Option<DateTime<Utc>>,
}

/// Point-in-time view for health checks
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub endpoint: String,
    pub protocol: &'static str,
    pub is_connected: bool,
    pub state: String,
    pub consecutive_failures: u32,
    pub current_reconnect_delay_secs: f64,
    pub uptime_seconds: Option<f64>,
    #[serde(flatten)]
    pub stats: ConnectionStats,
}

pub struct ConnectionManager {
    adapter: Box<dyn ProtocolAdapter>,
    backoff: BackoffPolicy,
    current_delay: Duration,
    consecutive_failures: u32,
    last_attempt: Option<Instant>,
    /// Set while a session is believed to be live
    connected_at: Option<Instant>,
    ever_connected: bool,
    connection_lost: bool,
    stats: ConnectionStats,
    logger: StructuredLogger,
}

impl ConnectionManager {
    pub fn new(adapter: Box<dyn ProtocolAdapter>, backoff: BackoffPolicy) -> Self {
        let logger = get_device_logger("connection", &adapter.endpoint());
        Self {
            adapter,
            current_delay: backoff.base,
            backoff,
            consecutive_failures: 0,
            last_attempt: None,
            connected_at: None,
            ever_connected: false,
            connection_lost: false,
            stats: ConnectionStats::default(),
            logger,
        }
    }

    pub fn adapter(&mut self) -> &mut dyn ProtocolAdapter {
        self.adapter.as_mut()
    }

    pub fn endpoint(&self) -> String {
        self.adapter.endpoint()
    }

    pub fn is_connected(&self) -> bool {
        self.adapter.is_open()
    }

    pub fn state(&self) -> ConnectionState {
        if self.adapter.is_open() {
            ConnectionState::Connected
        } else if self.consecutive_failures > 0 || self.connection_lost {
            ConnectionState::Reconnecting {
                delay: self.current_delay,
            }
        } else {
            ConnectionState::Disconnected
        }
    }

    pub fn current_delay(&self) -> Duration {
        self.current_delay
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    fn on_connected(&mut self) {
        self.current_delay = self.backoff.base;
        self.consecutive_failures = 0;
        self.connected_at = Some(Instant::now());
        self.ever_connected = true;
        self.connection_lost = false;
        self.stats.uptime_start = Some(Utc::now());
    }

    fn note_disconnect(&mut self) {
        if self.connected_at.take().is_some() {
            self.stats.total_disconnects += 1;
        }
    }

    /// Explicit connect; counts toward `total_connects`
    pub async fn connect(&mut self) -> Result<()> {
        self.last_attempt = Some(Instant::now());
        match self.adapter.connect().await {
            Ok(()) => {
                self.stats.total_connects += 1;
                self.on_connected();
                self.logger.info(&format!(
                    "Connected via {} to {}",
                    self.adapter.protocol(),
                    self.adapter.endpoint()
                ));
                Ok(())
            }
            Err(e) => {
                self.stats.last_error = Some(e.to_string());
                self.logger.error(&format!("Connect failed: {}", e));
                Err(e)
            }
        }
    }

    /// Make sure the channel is up, reconnecting if the backoff allows.
    /// Returns whether the adapter is usable right now.
    pub async fn ensure_connection(&mut self) -> bool {
        if self.adapter.is_open() {
            if self.connection_lost {
                self.connection_lost = false;
                self.current_delay = self.backoff.base;
                self.consecutive_failures = 0;
                self.logger.info("Connection restored");
            }
            return true;
        }

        self.note_disconnect();
        if self.ever_connected && !self.connection_lost {
            self.connection_lost = true;
            self.logger
                .warn(&format!("Connection to {} lost", self.adapter.endpoint()));
        }

        let now = Instant::now();
        if let Some(last) = self.last_attempt
            && now.saturating_duration_since(last) < self.current_delay
        {
            return false;
        }
        self.last_attempt = Some(now);

        match self.adapter.connect().await {
            Ok(()) => {
                let restored = self.connection_lost;
                if self.ever_connected {
                    self.stats.total_reconnects += 1;
                } else {
                    self.stats.total_connects += 1;
                }
                self.on_connected();
                if restored {
                    self.logger.info("Connection restored");
                } else {
                    self.logger
                        .info(&format!("Connected to {}", self.adapter.endpoint()));
                }
                true
            }
            Err(e) => {
                self.consecutive_failures += 1;
                self.current_delay = self.backoff.next_delay(self.current_delay);
                self.logger.debug(&format!(
                    "Reconnect attempt {} failed: {}; next attempt in {:.1}s",
                    self.consecutive_failures,
                    e,
                    self.current_delay.as_secs_f64()
                ));
                self.stats.last_error = Some(e.to_string());
                false
            }
        }
    }

    pub async fn close(&mut self) {
        self.note_disconnect();
        self.adapter.close().await;
    }

    /// Read through the adapter, accounting for any session it reopened
    pub async fn read_block(&mut self, address: u16, count: u16) -> Result<Vec<i32>> {
        let result = self.adapter.read_block(address, count).await;
        self.collect_adapter_reconnects();
        result
    }

    /// Write through the adapter, accounting for any session it reopened
    pub async fn write_block(&mut self, address: u16, values: &[u16]) -> Result<()> {
        let result = self.adapter.write_block(address, values).await;
        self.collect_adapter_reconnects();
        result
    }

    fn collect_adapter_reconnects(&mut self) {
        let reopened = self.adapter.take_reconnects();
        if reopened == 0 {
            return;
        }
        self.stats.total_disconnects += u64::from(reopened);
        self.stats.total_reconnects += u64::from(reopened);
        self.logger.info(&format!(
            "Session to {} reopened after transport failure",
            self.adapter.endpoint()
        ));
        if self.adapter.is_open() {
            self.on_connected();
        } else {
            self.connected_at = None;
        }
    }

    pub fn record_read_error(&mut self, error: &HeatlinkError) {
        self.stats.total_read_errors += 1;
        self.stats.last_error = Some(error.to_string());
    }

    pub fn record_write_error(&mut self, error: &HeatlinkError) {
        self.stats.total_write_errors += 1;
        self.stats.last_error = Some(error.to_string());
    }

    pub fn mark_successful_read(&mut self) {
        self.stats.last_successful_read = Some(Utc::now());
    }

    pub fn health(&self) -> HealthSnapshot {
        let is_connected = self.adapter.is_open();
        HealthSnapshot {
            endpoint: self.adapter.endpoint(),
            protocol: self.adapter.protocol(),
            is_connected,
            state: self.state().to_string(),
            consecutive_failures: self.consecutive_failures,
            current_reconnect_delay_secs: self.current_delay.as_secs_f64(),
            uptime_seconds: self
                .connected_at
                .filter(|_| is_connected)
                .map(|at| at.elapsed().as_secs_f64()),
            stats: self.stats.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    #[derive(Default)]
    struct Switch {
        reachable: AtomicBool,
        attempts: AtomicU32,
        reopened: AtomicU32,
    }

    struct SwitchAdapter {
        open: bool,
        switch: Arc<Switch>,
    }

    #[async_trait::async_trait]
    impl ProtocolAdapter for SwitchAdapter {
        fn protocol(&self) -> &'static str {
            "mock"
        }
        fn endpoint(&self) -> String {
            "mock:0".into()
        }
        fn is_open(&self) -> bool {
            self.open
        }
        fn take_reconnects(&mut self) -> u32 {
            self.switch.reopened.swap(0, Ordering::SeqCst)
        }
        async fn connect(&mut self) -> Result<()> {
            self.switch.attempts.fetch_add(1, Ordering::SeqCst);
            self.open = self.switch.reachable.load(Ordering::SeqCst);
            if self.open {
                Ok(())
            } else {
                Err(HeatlinkError::connection("refused"))
            }
        }
        async fn close(&mut self) {
            self.open = false;
        }
        async fn read_block(&mut self, _address: u16, count: u16) -> Result<Vec<i32>> {
            Ok(vec![0; usize::from(count)])
        }
        async fn write_block(&mut self, _address: u16, _values: &[u16]) -> Result<()> {
            Ok(())
        }
    }

    fn manager(reachable: bool) -> (ConnectionManager, Arc<Switch>) {
        let switch = Arc::new(Switch::default());
        switch.reachable.store(reachable, Ordering::SeqCst);
        let adapter = SwitchAdapter {
            open: false,
            switch: switch.clone(),
        };
        let policy = BackoffPolicy {
            base: Duration::from_secs(1),
            max: Duration::from_secs(8),
            multiplier: 2.0,
        };
        (ConnectionManager::new(Box::new(adapter), policy), switch)
    }

    #[test]
    fn next_delay_is_capped() {
        let policy = BackoffPolicy {
            base: Duration::from_secs(1),
            max: Duration::from_secs(60),
            multiplier: 2.0,
        };
        assert_eq!(policy.next_delay(Duration::from_secs(1)), Duration::from_secs(2));
        assert_eq!(policy.next_delay(Duration::from_secs(40)), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn first_connect_counts_as_connect() {
        let (mut mgr, _) = manager(true);
        assert_eq!(mgr.state(), ConnectionState::Disconnected);
        assert!(mgr.ensure_connection().await);
        assert_eq!(mgr.stats().total_connects, 1);
        assert_eq!(mgr.stats().total_reconnects, 0);
        assert_eq!(mgr.state(), ConnectionState::Connected);
        assert!(mgr.health().uptime_seconds.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn sessions_reopened_by_the_adapter_count_as_reconnects() {
        let (mut mgr, switch) = manager(true);
        assert!(mgr.ensure_connection().await);
        let first_uptime = mgr.stats().uptime_start;

        tokio::time::advance(Duration::from_secs(30)).await;
        switch.reopened.store(1, Ordering::SeqCst);
        assert_eq!(mgr.read_block(10, 2).await.unwrap(), vec![0, 0]);

        assert_eq!(mgr.stats().total_connects, 1);
        assert_eq!(mgr.stats().total_reconnects, 1);
        assert_eq!(mgr.stats().total_disconnects, 1);
        assert!(mgr.stats().uptime_start >= first_uptime);
        assert_eq!(mgr.health().uptime_seconds, Some(0.0));

        mgr.write_block(10, &[1]).await.unwrap();
        assert_eq!(mgr.stats().total_reconnects, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn attempts_are_rate_limited_by_delay() {
        let (mut mgr, switch) = manager(false);
        assert!(!mgr.ensure_connection().await);
        assert!(!mgr.ensure_connection().await);
        assert_eq!(switch.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(
            mgr.state(),
            ConnectionState::Reconnecting {
                delay: Duration::from_secs(2)
            }
        );

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!mgr.ensure_connection().await);
        assert_eq!(switch.attempts.load(Ordering::SeqCst), 2);
        assert_eq!(mgr.consecutive_failures(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn lost_connection_counts_disconnect_and_reconnect_once() {
        let (mut mgr, _) = manager(true);
        mgr.connect().await.unwrap();
        mgr.adapter().close().await;

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(mgr.ensure_connection().await);
        let stats = mgr.stats();
        assert_eq!(stats.total_connects, 1);
        assert_eq!(stats.total_disconnects, 1);
        assert_eq!(stats.total_reconnects, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn close_counts_disconnect() {
        let (mut mgr, _) = manager(true);
        mgr.connect().await.unwrap();
        mgr.close().await;
        mgr.close().await;
        assert_eq!(mgr.stats().total_disconnects, 1);
        assert!(!mgr.is_connected());
    }
}
