//! Fuzz target: `FrameScanner::feed`
//!
//! The first byte picks a chunk size; the rest is fed in chunks of that
//! size.  Invariants checked:
//! - No panics
//! - `feed` never claims more bytes than it was given
//! - Once finished, further input is ignored
//! - `wanted()` is 0 exactly when the scanner is finished
//!
//! cargo fuzz run fuzz_frame_scanner

#![no_main]

use libfuzzer_sys::fuzz_target;
use remote_control::rpc::codec::FrameScanner;

fuzz_target!(|data: &[u8]| {
    let Some((&first, rest)) = data.split_first() else {
        return;
    };
    let chunk = usize::from(first % 32) + 1;

    let mut scanner = FrameScanner::new();
    for piece in rest.chunks(chunk) {
        let was_finished = scanner.is_finished();
        let used = scanner.feed(piece);
        assert!(used <= piece.len());
        if was_finished {
            assert_eq!(used, 0);
        }
        assert_eq!(scanner.wanted() == 0, scanner.is_finished());
    }
});
