//! Typestate builder for [`SessionConfig`] (§1c), mirroring the
//! `Uninitialized`/`Initialized` marker-type pattern the teacher uses for its
//! own connection builder (`connection::builder::mode`).

use std::marker::PhantomData;
use std::time::Duration;

use crate::config::ConfigError;
use crate::flow::FlowConfig;

use super::SessionConfig;

mod mode {
    #[derive(Debug)]
    pub struct Uninitialized;
    #[derive(Debug)]
    pub struct Initialized;
}

use mode::{Initialized, Uninitialized};

/// Builder for [`SessionConfig`]. `build()` is only available once every
/// eagerly-validated field has been set (type state `Initialized`), though
/// every field has a sensible default so `SessionEngineBuilder::new().build()`
/// is always valid.
#[derive(Debug, Clone)]
pub struct SessionEngineBuilder<Mode = Initialized> {
    replay_buffer_size: usize,
    ack_frequency: u32,
    idle_timeout: Duration,
    flow_rate: u32,
    marker: PhantomData<Mode>,
}

impl Default for SessionEngineBuilder<Initialized> {
    fn default() -> Self {
        let defaults = SessionConfig::default();
        Self {
            replay_buffer_size: defaults.replay_buffer_size,
            ack_frequency: defaults.ack_frequency,
            idle_timeout: defaults.idle_timeout,
            flow_rate: defaults.flow.rate,
            marker: PhantomData,
        }
    }
}

impl SessionEngineBuilder<Initialized> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects a zero buffer (§1c: "reject a zero `channel_max`" is the
    /// connection-side analogue; here a replay buffer of zero would make
    /// `resume` unable to replay anything, defeating its purpose).
    pub fn replay_buffer_size(mut self, size: usize) -> SessionEngineBuilder<Uninitialized> {
        self.replay_buffer_size = size;
        SessionEngineBuilder {
            replay_buffer_size: self.replay_buffer_size,
            ack_frequency: self.ack_frequency,
            idle_timeout: self.idle_timeout,
            flow_rate: self.flow_rate,
            marker: PhantomData,
        }
    }

    pub fn ack_frequency(mut self, frequency: u32) -> Self {
        self.ack_frequency = frequency;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Producer rate limit in messages/sec (§4.6); zero means unlimited.
    pub fn flow_rate(mut self, rate: u32) -> Self {
        self.flow_rate = rate;
        self
    }

    pub fn build(self) -> Result<SessionConfig, ConfigError> {
        Ok(SessionConfig {
            replay_buffer_size: self.replay_buffer_size,
            ack_frequency: self.ack_frequency,
            idle_timeout: self.idle_timeout,
            flow: FlowConfig::rate(self.flow_rate),
        })
    }
}

impl SessionEngineBuilder<Uninitialized> {
    /// Validates the replay buffer size just set, returning to the
    /// `Initialized` state on success.
    pub fn validate(self) -> Result<SessionEngineBuilder<Initialized>, ConfigError> {
        if self.replay_buffer_size == 0 {
            return Err(ConfigError::Zero {
                field: "replay_buffer_size",
            });
        }
        Ok(SessionEngineBuilder {
            replay_buffer_size: self.replay_buffer_size,
            ack_frequency: self.ack_frequency,
            idle_timeout: self.idle_timeout,
            flow_rate: self.flow_rate,
            marker: PhantomData,
        })
    }
}
