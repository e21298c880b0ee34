//! Client-mirror reconnect/failover controller (§4.7). The engine itself is
//! broker-side, but a broker that also originates connections (federation,
//! shovel-style links) needs the same failover machinery a client would; this
//! is that controller, kept in the crate because SPEC_FULL.md names it as a
//! component of the engine rather than of a separate client crate.
//!
//! Grounded in the teacher's `connection::builder` URL handling (`url::Url`
//! for connection targets) and its exponential-backoff-free reconnect being
//! absent; the backoff/attempt-accounting loop itself follows the general
//! shape of `session::engine::SessionEngine::wait_for_remote_end`'s
//! "keep trying while legal" loop, adapted to multiple candidate URLs.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use url::Url;

use crate::config::ConfigError;

/// What happened when a resumed session tried to re-establish credit/state.
#[derive(Debug, Clone)]
pub enum ResumeOutcome {
    Failed(String),
    ResourceLimitExceeded,
}

/// External collaborator: actually dialing a candidate URL and resuming
/// sessions on the new transport are both outside this crate's concern (the
/// wire codec and transport are external collaborators per §1).
#[async_trait::async_trait]
pub trait ReconnectTransport: Send + Sync {
    /// Attempt a TCP connect + protocol/SASL handshake to `url`. On success,
    /// returns any server-advertised known-broker URLs to merge in.
    async fn connect(&self, url: &Url) -> Result<Vec<Url>, String>;

    /// Re-issue `session.resume` for every session that was attached before
    /// the failure.
    async fn resume_sessions(&self) -> Result<(), ResumeOutcome>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ReconnectError {
    #[error("no candidate urls are configured")]
    NoUrls,
    #[error("reconnect attempt limit of {0} exceeded")]
    LimitExceeded(u32),
    #[error("reconnect timed out after {0:?}")]
    TimedOut(Duration),
    #[error("a resource limit was exceeded during resume and reconnect-on-limit-exceeded is disabled")]
    ResourceLimitExceeded,
}

/// `{reconnect, minInterval, maxInterval, limit, timeout,
/// reconnectOnLimitExceeded}` (§4.7, §6).
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    pub reconnect: bool,
    pub min_interval: Duration,
    pub max_interval: Duration,
    pub limit: Option<u32>,
    pub timeout: Option<Duration>,
    pub reconnect_on_limit_exceeded: bool,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            reconnect: true,
            min_interval: Duration::from_millis(100),
            max_interval: Duration::from_secs(30),
            limit: None,
            timeout: None,
            reconnect_on_limit_exceeded: false,
        }
    }
}

fn normalized_key(url: &Url) -> (String, Option<String>, Option<u16>) {
    (
        url.scheme().to_string(),
        url.host_str().map(|h| h.to_ascii_lowercase()),
        url.port_or_known_default(),
    )
}

/// Maintains `urls` (ordered, de-duplicated by normalized authority) and
/// drives the backoff/resume loop (§4.7).
pub struct ReconnectController {
    config: ReconnectConfig,
    urls: Vec<Url>,
    seen: HashSet<(String, Option<String>, Option<u16>)>,
    attempts: u32,
    current_interval: Duration,
}

impl ReconnectController {
    pub fn new(config: ReconnectConfig, urls: Vec<Url>) -> Self {
        let mut controller = Self {
            current_interval: config.min_interval,
            config,
            urls: Vec::new(),
            seen: HashSet::new(),
            attempts: 0,
        };
        for url in urls {
            controller.push_url(url);
        }
        controller
    }

    /// Inserts `url` if its normalized authority hasn't been seen before;
    /// insertion order is preserved (§4.7: "ordered, de-duplicated insertion").
    pub fn push_url(&mut self, url: Url) {
        let key = normalized_key(&url);
        if self.seen.insert(key) {
            self.urls.push(url);
        }
    }

    pub fn merge_known_brokers(&mut self, urls: impl IntoIterator<Item = Url>) {
        for url in urls {
            self.push_url(url);
        }
    }

    pub fn urls(&self) -> &[Url] {
        &self.urls
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    fn check_budget(&self, started_at: Instant) -> Result<(), ReconnectError> {
        if let Some(limit) = self.config.limit {
            if self.attempts >= limit {
                return Err(ReconnectError::LimitExceeded(limit));
            }
        }
        if let Some(timeout) = self.config.timeout {
            if started_at.elapsed() > timeout {
                return Err(ReconnectError::TimedOut(timeout));
            }
        }
        Ok(())
    }

    /// Runs the failover loop until a transport connects and every session
    /// resumes, or a hard limit/timeout/unrecoverable resume failure aborts
    /// it (§4.7).
    pub async fn run(&mut self, transport: &dyn ReconnectTransport) -> Result<(), ReconnectError> {
        if !self.config.reconnect {
            return Ok(());
        }
        if self.urls.is_empty() {
            return Err(ReconnectError::NoUrls);
        }
        let started_at = Instant::now();
        loop {
            let candidates = self.urls.clone();
            for url in &candidates {
                self.check_budget(started_at)?;
                self.attempts += 1;

                let known_brokers = match transport.connect(url).await {
                    Ok(known) => known,
                    Err(_) => continue,
                };
                self.merge_known_brokers(known_brokers);

                match transport.resume_sessions().await {
                    Ok(()) => {
                        self.attempts = 0;
                        self.current_interval = self.config.min_interval;
                        return Ok(());
                    }
                    Err(ResumeOutcome::ResourceLimitExceeded) => {
                        if self.config.reconnect_on_limit_exceeded {
                            // Restart the whole cycle from the top of `urls`.
                            break;
                        }
                        return Err(ReconnectError::ResourceLimitExceeded);
                    }
                    Err(ResumeOutcome::Failed(_)) => continue,
                }
            }
            self.check_budget(started_at)?;
            tokio::time::sleep(self.current_interval).await;
            self.current_interval = (self.current_interval * 2).min(self.config.max_interval);
        }
    }
}

mod mode {
    #[derive(Debug)]
    pub struct Uninitialized;
    #[derive(Debug)]
    pub struct Initialized;
}

/// Typestate builder for [`ReconnectConfig`] (§1c).
#[derive(Debug, Clone)]
pub struct ReconnectControllerBuilder<Mode = mode::Initialized> {
    reconnect: bool,
    min_interval: Duration,
    max_interval: Duration,
    limit: Option<u32>,
    timeout: Option<Duration>,
    reconnect_on_limit_exceeded: bool,
    marker: std::marker::PhantomData<Mode>,
}

impl Default for ReconnectControllerBuilder<mode::Initialized> {
    fn default() -> Self {
        let defaults = ReconnectConfig::default();
        Self {
            reconnect: defaults.reconnect,
            min_interval: defaults.min_interval,
            max_interval: defaults.max_interval,
            limit: defaults.limit,
            timeout: defaults.timeout,
            reconnect_on_limit_exceeded: defaults.reconnect_on_limit_exceeded,
            marker: std::marker::PhantomData,
        }
    }
}

impl ReconnectControllerBuilder<mode::Initialized> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reconnect(mut self, enabled: bool) -> Self {
        self.reconnect = enabled;
        self
    }

    /// Rejects a zero or inverted interval pair on `validate`.
    pub fn intervals(mut self, min: Duration, max: Duration) -> ReconnectControllerBuilder<mode::Uninitialized> {
        self.min_interval = min;
        self.max_interval = max;
        ReconnectControllerBuilder {
            reconnect: self.reconnect,
            min_interval: self.min_interval,
            max_interval: self.max_interval,
            limit: self.limit,
            timeout: self.timeout,
            reconnect_on_limit_exceeded: self.reconnect_on_limit_exceeded,
            marker: std::marker::PhantomData,
        }
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn reconnect_on_limit_exceeded(mut self, enabled: bool) -> Self {
        self.reconnect_on_limit_exceeded = enabled;
        self
    }

    pub fn build(self) -> Result<ReconnectConfig, ConfigError> {
        Ok(ReconnectConfig {
            reconnect: self.reconnect,
            min_interval: self.min_interval,
            max_interval: self.max_interval,
            limit: self.limit,
            timeout: self.timeout,
            reconnect_on_limit_exceeded: self.reconnect_on_limit_exceeded,
        })
    }
}

impl ReconnectControllerBuilder<mode::Uninitialized> {
    pub fn validate(self) -> Result<ReconnectControllerBuilder<mode::Initialized>, ConfigError> {
        if self.min_interval.is_zero() {
            return Err(ConfigError::Zero {
                field: "min_interval",
            });
        }
        if self.max_interval < self.min_interval {
            return Err(ConfigError::NotPositive {
                field: "max_interval",
                value: self.max_interval.as_millis() as i64 - self.min_interval.as_millis() as i64,
            });
        }
        Ok(ReconnectControllerBuilder {
            reconnect: self.reconnect,
            min_interval: self.min_interval,
            max_interval: self.max_interval,
            limit: self.limit,
            timeout: self.timeout,
            reconnect_on_limit_exceeded: self.reconnect_on_limit_exceeded,
            marker: std::marker::PhantomData,
        })
    }
}
