use crate::error::SaslError;

use super::{SaslNegotiator, SaslStep};

/// ANONYMOUS mechanism (RFC 4505): the initial response, if any, is an opaque
/// trace string, not a credential. Always succeeds in one round.
#[derive(Debug, Default)]
pub struct AnonymousMechanism {
    _private: (),
}

impl AnonymousMechanism {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SaslNegotiator for AnonymousMechanism {
    fn mechanism(&self) -> &str {
        "ANONYMOUS"
    }

    fn on_start_ok(&mut self, response: &[u8]) -> Result<SaslStep, SaslError> {
        let principal = String::from_utf8_lossy(response).into_owned();
        let principal = if principal.is_empty() {
            "anonymous".to_string()
        } else {
            principal
        };
        Ok(SaslStep::Complete { principal })
    }

    fn on_secure_ok(&mut self, _response: &[u8]) -> Result<SaslStep, SaslError> {
        Err(SaslError::RepeatedAfterFailure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_response_defaults_principal() {
        let mut mech = AnonymousMechanism::new();
        match mech.on_start_ok(b"").unwrap() {
            SaslStep::Complete { principal } => assert_eq!(principal, "anonymous"),
            _ => panic!("expected immediate completion"),
        }
    }

    #[test]
    fn trace_string_becomes_principal() {
        let mut mech = AnonymousMechanism::new();
        match mech.on_start_ok(b"trace@example.com").unwrap() {
            SaslStep::Complete { principal } => assert_eq!(principal, "trace@example.com"),
            _ => panic!("expected immediate completion"),
        }
    }
}
