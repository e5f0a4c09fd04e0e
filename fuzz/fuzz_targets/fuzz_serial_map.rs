//! Fuzz target: `SerialMap::decode`
//!
//! Invariants checked:
//! - No panics under any byte sequence
//! - The decoded map never exceeds its capacity
//! - Whatever decodes re-encodes to a frame that decodes to the same map
//!
//! cargo fuzz run fuzz_serial_map

#![no_main]

use libfuzzer_sys::fuzz_target;
use remote_control::rpc::codec::ActionMap;

fuzz_target!(|data: &[u8]| {
    let map = ActionMap::decode(data);
    assert!(map.len() <= map.capacity());

    let mut out = vec![0u8; map.encoded_len()];
    let n = map.serialize(&mut out).expect("buffer sized from encoded_len");
    assert_eq!(ActionMap::decode(&out[..n]), map);
});
