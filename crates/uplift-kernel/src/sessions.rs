//! Session tokens injected into agent processes.
//!
//! Tokens have the form `<agent-name>.<nonce>.<mac>` where the MAC is
//! HMAC-SHA256 over `<agent-name>.<nonce>` with a per-boot kernel secret.
//! Tokens are stateless: they die with the daemon that minted them, which
//! matches the lifetime of the processes they are injected into.

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use uplift_types::error::{UpliftError, UpliftResult};

type HmacSha256 = Hmac<Sha256>;

/// Issues and verifies agent session tokens.
pub struct SessionManager {
    secret: [u8; 32],
}

impl SessionManager {
    /// Create a session manager with a fresh random secret.
    pub fn new() -> Self {
        let mut secret = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret);
        Self { secret }
    }

    /// Issue a token for the named agent.
    pub fn issue(&self, agent_name: &str) -> String {
        let mut nonce = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut nonce);
        let nonce = hex::encode(nonce);
        let mac = self.mac_for(agent_name, &nonce);
        format!("{agent_name}.{nonce}.{mac}")
    }

    /// Verify a token and return the agent name it was issued to.
    pub fn verify(&self, token: &str) -> UpliftResult<String> {
        // Agent names are [a-z0-9_-], so '.' only appears as a separator.
        let mut parts = token.split('.');
        let (agent, nonce, mac) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(agent), Some(nonce), Some(mac), None) => (agent, nonce, mac),
            _ => {
                return Err(UpliftError::AuthDenied(
                    "malformed session token".to_string(),
                ))
            }
        };
        let expected = self.mac_for(agent, nonce);
        if expected.as_bytes().ct_eq(mac.as_bytes()).into() {
            Ok(agent.to_string())
        } else {
            Err(UpliftError::AuthDenied("invalid session token".to_string()))
        }
    }

    fn mac_for(&self, agent: &str, nonce: &str) -> String {
        // HMAC-SHA256 accepts any key length, so this cannot fail.
        let mut mac = match HmacSha256::new_from_slice(&self.secret) {
            Ok(mac) => mac,
            Err(_) => unreachable!("HMAC accepts any key length"),
        };
        mac.update(agent.as_bytes());
        mac.update(b".");
        mac.update(nonce.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}
