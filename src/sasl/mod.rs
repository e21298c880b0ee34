//! Server-side SASL negotiation (§4.2). Only the mechanism plumbing is in
//! scope here; the cryptographic details of any mechanism beyond ANONYMOUS
//! and PLAIN are an explicit non-goal, so there is no SCRAM support.

use bytes::Bytes;

use crate::error::SaslError;

mod anonymous;
mod plain;

pub use anonymous::AnonymousMechanism;
pub use plain::PlainMechanism;

/// Outcome of feeding one round of SASL bytes to a [`SaslNegotiator`].
pub enum SaslStep {
    /// Authentication succeeded; negotiation is over.
    Complete { principal: String },
    /// Another round is required; `challenge` is sent to the peer as `secure(challenge)`.
    Continue { challenge: Bytes },
}

/// Server side of a single SASL mechanism, driven once per connection
/// (§4.2: "never attempt a second SASL round after failure").
pub trait SaslNegotiator: Send {
    /// The mechanism name this negotiator implements, e.g. `"PLAIN"`.
    fn mechanism(&self) -> &str;

    /// Handle the client's initial response from `start-ok`.
    fn on_start_ok(&mut self, response: &[u8]) -> Result<SaslStep, SaslError>;

    /// Handle a subsequent response from `secure-ok`, if [`Self::on_start_ok`]
    /// returned [`SaslStep::Continue`].
    fn on_secure_ok(&mut self, response: &[u8]) -> Result<SaslStep, SaslError>;
}

/// Chooses and constructs a [`SaslNegotiator`] for one of the mechanisms this
/// broker advertises in `connection.start`.
pub struct SaslServerConfig {
    factories: Vec<(String, Box<dyn Fn() -> Box<dyn SaslNegotiator> + Send + Sync>)>,
}

impl SaslServerConfig {
    pub fn new() -> Self {
        Self {
            factories: Vec::new(),
        }
    }

    pub fn with_anonymous(mut self) -> Self {
        self.factories.push((
            "ANONYMOUS".to_string(),
            Box::new(|| Box::new(AnonymousMechanism::new()) as Box<dyn SaslNegotiator>),
        ));
        self
    }

    pub fn with_plain(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        let username = username.into();
        let password = password.into();
        self.factories.push((
            "PLAIN".to_string(),
            Box::new(move || {
                Box::new(PlainMechanism::new(username.clone(), password.clone()))
                    as Box<dyn SaslNegotiator>
            }),
        ));
        self
    }

    /// The mechanism names advertised in `connection.start`, in registration order.
    pub fn mechanisms(&self) -> Vec<String> {
        self.factories.iter().map(|(name, _)| name.clone()).collect()
    }

    /// Instantiates the negotiator the client asked for in `start-ok`.
    pub fn create(&self, mechanism: &str) -> Result<Box<dyn SaslNegotiator>, SaslError> {
        self.factories
            .iter()
            .find(|(name, _)| name == mechanism)
            .map(|(_, make)| make())
            .ok_or_else(|| SaslError::UnsupportedMechanism(mechanism.to_string()))
    }
}

impl Default for SaslServerConfig {
    fn default() -> Self {
        Self::new().with_anonymous()
    }
}
