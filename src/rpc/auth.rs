//! Connection authentication.
//!
//! The first frame a client sends on any connection must be its
//! credentials:
//!
//! ```text
//! client ──▶ {"username": "...", "password": "..."}
//! device ◀── {"result": "ok"}      (match)
//!            {"result": "error"}   (missing field, wrong value, timeout)
//! ```
//!
//! One attempt per connection.  There is no retry on the same connection;
//! the server closes it after a failure.

use core::time::Duration;
use log::{info, warn};

use crate::error::{Error, Result};

use super::codec::{ActionMap, Field, field};
use super::response;
use super::transport::Transport;

pub const USERNAME_KEY: &str = "username";
pub const PASSWORD_KEY: &str = "password";

/// Checks the credential frame at the start of a connection.
#[derive(Debug, Clone)]
pub struct AuthenticationGate {
    username: Field,
    password: Field,
    timeout: Duration,
}

impl AuthenticationGate {
    /// `timeout` bounds the wait for the credential frame.
    pub fn new(username: &str, password: &str, timeout: Duration) -> Result<Self> {
        let username = field(username).ok_or(Error::Config("auth username longer than 255 bytes"))?;
        let password = field(password).ok_or(Error::Config("auth password longer than 255 bytes"))?;
        Ok(Self {
            username,
            password,
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether `frame` carries exactly the configured credentials.
    pub fn verify(&self, frame: &ActionMap) -> bool {
        let (Some(user), Some(pass)) = (frame.get_str(USERNAME_KEY), frame.get_str(PASSWORD_KEY))
        else {
            return false;
        };
        // Evaluate both so a wrong username costs the same as a wrong password.
        let user_ok = ct_eq(user.as_bytes(), self.username.as_bytes());
        let pass_ok = ct_eq(pass.as_bytes(), self.password.as_bytes());
        user_ok & pass_ok
    }

    /// Read one credential frame from `conn`, reply, and report the verdict.
    pub fn authenticate<T: Transport + ?Sized>(&self, conn: &mut T) -> bool {
        let frame = ActionMap::read_from(conn, self.timeout);
        let accepted = self.verify(&frame);
        if accepted {
            info!("auth: client authenticated");
        } else if frame.is_empty() {
            warn!("auth: no credential frame received");
        } else {
            warn!("auth: credentials rejected");
        }
        response::reply(conn, accepted);
        accepted
    }
}

/// Byte-exact comparison whose running time depends only on the lengths.
fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
