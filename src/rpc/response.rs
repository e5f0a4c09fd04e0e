//! Canonical response frames.
//!
//! Every reply the device sends is one of two single-entry maps:
//! `{"result": "ok"}` or `{"result": "error"}`.

use super::codec::ResponseMap;
use super::transport::Transport;

pub const RESULT_KEY: &str = "result";
pub const RESULT_OK: &str = "ok";
pub const RESULT_ERROR: &str = "error";

pub fn success() -> ResponseMap {
    ResponseMap::from_pairs(&[(RESULT_KEY, RESULT_OK)])
}

pub fn error() -> ResponseMap {
    ResponseMap::from_pairs(&[(RESULT_KEY, RESULT_ERROR)])
}

/// Send the success or error frame.  Write failures are logged and
/// swallowed; the connection is about to be closed either way.
pub fn reply<T: Transport + ?Sized>(conn: &mut T, ok: bool) {
    let frame = if ok { success() } else { error() };
    if let Err(e) = frame.write_to(conn) {
        log::warn!("response: write failed ({:?})", e);
    }
}
