//! Validation helpers shared by the radio and credential adapters.

/// Returns `true` if every byte of `s` is in the printable ASCII range
/// `0x20..=0x7E`.
pub(super) fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

/// Wrapping 16-bit sum of every byte in `parts`.
pub(super) fn checksum16(parts: &[&[u8]]) -> u16 {
    parts
        .iter()
        .flat_map(|part| part.iter())
        .fold(0u16, |acc, &b| acc.wrapping_add(u16::from(b)))
}
