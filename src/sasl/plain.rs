use crate::error::SaslError;

use super::{SaslNegotiator, SaslStep};

/// PLAIN mechanism (RFC 4616): initial response is `authzid \0 authcid \0 passwd`.
/// Credentials are compared in the clear; TLS (or an equivalent transport
/// wrapper) is assumed to already be in place if that matters to the deployment.
#[derive(Debug)]
pub struct PlainMechanism {
    username: String,
    password: String,
}

impl PlainMechanism {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    fn validate(&self, response: &[u8]) -> bool {
        let mut split = response.split(|b| *b == 0u8);
        let _authzid = match split.next() {
            Some(v) => v,
            None => return false,
        };
        let authcid = match split.next() {
            Some(v) => v,
            None => return false,
        };
        let passwd = match split.next() {
            Some(v) => v,
            None => return false,
        };
        authcid == self.username.as_bytes() && passwd == self.password.as_bytes()
    }
}

impl SaslNegotiator for PlainMechanism {
    fn mechanism(&self) -> &str {
        "PLAIN"
    }

    fn on_start_ok(&mut self, response: &[u8]) -> Result<SaslStep, SaslError> {
        if self.validate(response) {
            Ok(SaslStep::Complete {
                principal: self.username.clone(),
            })
        } else {
            Err(SaslError::Rejected("invalid credentials".to_string()))
        }
    }

    fn on_secure_ok(&mut self, _response: &[u8]) -> Result<SaslStep, SaslError> {
        Err(SaslError::RepeatedAfterFailure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(authzid: &str, authcid: &str, passwd: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(authzid.as_bytes());
        buf.push(0);
        buf.extend_from_slice(authcid.as_bytes());
        buf.push(0);
        buf.extend_from_slice(passwd.as_bytes());
        buf
    }

    #[test]
    fn accepts_matching_credentials() {
        let mut mech = PlainMechanism::new("alice", "hunter2");
        let step = mech.on_start_ok(&response("", "alice", "hunter2")).unwrap();
        match step {
            SaslStep::Complete { principal } => assert_eq!(principal, "alice"),
            _ => panic!("expected immediate completion"),
        }
    }

    #[test]
    fn rejects_wrong_password() {
        let mut mech = PlainMechanism::new("alice", "hunter2");
        let err = mech.on_start_ok(&response("", "alice", "wrong")).unwrap_err();
        assert!(matches!(err, SaslError::Rejected(_)));
    }

    #[test]
    fn rejects_malformed_response() {
        let mut mech = PlainMechanism::new("alice", "hunter2");
        let err = mech.on_start_ok(b"garbage").unwrap_err();
        assert!(matches!(err, SaslError::Rejected(_)));
    }
}
