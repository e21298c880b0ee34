//! Typestate builder for [`super::ConnectionConfig`] (§1c), mirroring the
//! teacher's `connection::builder` `Uninitialized`/`Initialized`
//! `PhantomData` marker pattern.

use std::marker::PhantomData;
use std::time::Duration;

use crate::config::ConfigError;

use super::ConnectionConfig;

mod mode {
    #[derive(Debug)]
    pub struct Uninitialized;
    #[derive(Debug)]
    pub struct Initialized;
}

use mode::{Initialized, Uninitialized};

/// Builder for [`ConnectionConfig`]. Every field has a sensible default, so
/// `ConnectionEngineBuilder::new().build()` is always valid; `channel_max_cap`
/// and `frame_max_cap` go through the `Uninitialized` state because a zero
/// value for either would make the connection unusable (§1c: "reject a zero
/// `channel_max`").
#[derive(Debug, Clone)]
pub struct ConnectionEngineBuilder<Mode = Initialized> {
    channel_max_cap: u16,
    frame_max_cap: u32,
    heartbeat_max: u16,
    mechanisms: Vec<String>,
    locales: Vec<String>,
    idle_timeout: Duration,
    marker: PhantomData<Mode>,
}

impl Default for ConnectionEngineBuilder<Initialized> {
    fn default() -> Self {
        let defaults = ConnectionConfig::default();
        Self {
            channel_max_cap: defaults.channel_max_cap,
            frame_max_cap: defaults.frame_max_cap,
            heartbeat_max: defaults.heartbeat_max,
            mechanisms: defaults.mechanisms,
            locales: defaults.locales,
            idle_timeout: defaults.idle_timeout,
            marker: PhantomData,
        }
    }
}

impl ConnectionEngineBuilder<Initialized> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps the negotiable channel-max; zero would leave no usable channels.
    pub fn channel_max_cap(mut self, cap: u16) -> ConnectionEngineBuilder<Uninitialized> {
        self.channel_max_cap = cap;
        self.into_uninitialized()
    }

    /// Caps the negotiable frame-max; zero would make every frameset illegal.
    pub fn frame_max_cap(mut self, cap: u32) -> ConnectionEngineBuilder<Uninitialized> {
        self.frame_max_cap = cap;
        self.into_uninitialized()
    }

    pub fn heartbeat_max(mut self, max: u16) -> Self {
        self.heartbeat_max = max;
        self
    }

    pub fn mechanisms(mut self, mechanisms: Vec<String>) -> Self {
        self.mechanisms = mechanisms;
        self
    }

    pub fn locales(mut self, locales: Vec<String>) -> Self {
        self.locales = locales;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn build(self) -> Result<ConnectionConfig, ConfigError> {
        Ok(ConnectionConfig {
            channel_max_cap: self.channel_max_cap,
            frame_max_cap: self.frame_max_cap,
            heartbeat_max: self.heartbeat_max,
            mechanisms: self.mechanisms,
            locales: self.locales,
            idle_timeout: self.idle_timeout,
        })
    }

    fn into_uninitialized(self) -> ConnectionEngineBuilder<Uninitialized> {
        ConnectionEngineBuilder {
            channel_max_cap: self.channel_max_cap,
            frame_max_cap: self.frame_max_cap,
            heartbeat_max: self.heartbeat_max,
            mechanisms: self.mechanisms,
            locales: self.locales,
            idle_timeout: self.idle_timeout,
            marker: PhantomData,
        }
    }
}

impl ConnectionEngineBuilder<Uninitialized> {
    pub fn validate(self) -> Result<ConnectionEngineBuilder<Initialized>, ConfigError> {
        if self.channel_max_cap == 0 {
            return Err(ConfigError::Zero {
                field: "channel_max_cap",
            });
        }
        if self.frame_max_cap == 0 {
            return Err(ConfigError::Zero {
                field: "frame_max_cap",
            });
        }
        Ok(ConnectionEngineBuilder {
            channel_max_cap: self.channel_max_cap,
            frame_max_cap: self.frame_max_cap,
            heartbeat_max: self.heartbeat_max,
            mechanisms: self.mechanisms,
            locales: self.locales,
            idle_timeout: self.idle_timeout,
            marker: PhantomData,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_build_successfully() {
        let config = ConnectionEngineBuilder::new().build().unwrap();
        assert_eq!(config.channel_max_cap, ConnectionConfig::default().channel_max_cap);
    }

    #[test]
    fn zero_channel_max_cap_is_rejected() {
        let err = ConnectionEngineBuilder::new()
            .channel_max_cap(0)
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Zero { .. }));
    }

    #[test]
    fn nonzero_channel_max_cap_validates() {
        let config = ConnectionEngineBuilder::new()
            .channel_max_cap(256)
            .validate()
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(config.channel_max_cap, 256);
    }
}
