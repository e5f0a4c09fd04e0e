//! Fuzz target: `AuthenticationGate::verify`
//!
//! Decodes arbitrary bytes as a credential frame.  Invariants checked:
//! - No panics
//! - Acceptance implies both fields equal the configured values exactly
//!
//! cargo fuzz run fuzz_auth_frame

#![no_main]

use std::time::Duration;

use libfuzzer_sys::fuzz_target;
use remote_control::rpc::auth::{AuthenticationGate, PASSWORD_KEY, USERNAME_KEY};
use remote_control::rpc::codec::ActionMap;

fuzz_target!(|data: &[u8]| {
    let gate = AuthenticationGate::new("admin", "password", Duration::from_millis(1))
        .expect("short credentials");
    let frame = ActionMap::decode(data);

    if gate.verify(&frame) {
        assert_eq!(frame.get_str(USERNAME_KEY), Some("admin"));
        assert_eq!(frame.get_str(PASSWORD_KEY), Some("password"));
    }
});
