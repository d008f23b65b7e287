//! Content addressing primitives.
//!
//! SHA-256 of bytes, canonical key joining for tree/chunk/symbol IDs, and
//! UUIDv7 generation for time-sortable event IDs.

use sha2::{Digest, Sha256};

/// SHA-256 of a byte slice, lower-case hex, 64 characters.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex_encode(&hasher.finalize())
}

/// SHA-256 over the concatenation of already-UTF8 parts, joined with `\n`
/// and a trailing `\n` after the final part — the tree-hash shape, where
/// each `(relPath, sha256)` pair is terminated independently of what comes
/// after it.
pub fn sha256_joined<'a, I: IntoIterator<Item = &'a str>>(parts: I) -> String {
    let mut buf = String::new();
    for part in parts {
        buf.push_str(part);
        buf.push('\n');
    }
    sha256_hex(buf.as_bytes())
}

/// SHA-256 over parts joined with `\n` but with no trailing separator
/// after the last part — the chunk-ID/symbol-ID shape, a literal field
/// join rather than a sequence of terminated records.
pub fn sha256_joined_fields<'a, I: IntoIterator<Item = &'a str>>(parts: I) -> String {
    let mut buf = String::new();
    for (i, part) in parts.into_iter().enumerate() {
        if i > 0 {
            buf.push('\n');
        }
        buf.push_str(part);
    }
    sha256_hex(buf.as_bytes())
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{:02x}", b));
    }
    s
}

/// Minimal UUIDv7 generator: 48-bit millisecond Unix timestamp followed by
/// 74 bits of randomness, laid out per RFC 9562 so lexicographic ordering
/// of the hyphenated string matches time ordering.
///
/// Takes the current time explicitly (callers own wall-clock access) so
/// this function stays pure and trivially testable.
pub fn uuid_v7(unix_millis: u128, random: [u8; 10]) -> String {
    let mut bytes = [0u8; 16];
    bytes[0] = ((unix_millis >> 40) & 0xff) as u8;
    bytes[1] = ((unix_millis >> 32) & 0xff) as u8;
    bytes[2] = ((unix_millis >> 24) & 0xff) as u8;
    bytes[3] = ((unix_millis >> 16) & 0xff) as u8;
    bytes[4] = ((unix_millis >> 8) & 0xff) as u8;
    bytes[5] = (unix_millis & 0xff) as u8;

    // version 7 in the high nibble of byte 6, 12 bits of randomness follow
    bytes[6] = 0x70 | (random[0] & 0x0f);
    bytes[7] = random[1];

    // variant bits `10` in byte 8, 62 bits of randomness follow
    bytes[8] = 0x80 | (random[2] & 0x3f);
    bytes[9] = random[3];
    bytes[10] = random[4];
    bytes[11] = random[5];
    bytes[12] = random[6];
    bytes[13] = random[7];
    bytes[14] = random[8];
    bytes[15] = random[9];

    format_uuid(&bytes)
}

fn format_uuid(b: &[u8; 16]) -> String {
    format!(
        "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
        b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7], b[8], b[9], b[10], b[11], b[12], b[13], b[14], b[15]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_hex_is_64_lowercase_hex_chars() {
        let h = sha256_hex(b"hello");
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn sha256_hex_matches_known_vector() {
        // SHA256("abc")
        let h = sha256_hex(b"abc");
        assert_eq!(
            h,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn sha256_joined_is_deterministic() {
        let a = sha256_joined(["a.ts", "deadbeef"]);
        let b = sha256_joined(["a.ts", "deadbeef"]);
        assert_eq!(a, b);
    }

    #[test]
    fn sha256_joined_distinguishes_part_boundaries() {
        // "ab" + "\n" + "c" must differ from "a" + "\n" + "bc"
        let a = sha256_joined(["ab", "c"]);
        let b = sha256_joined(["a", "bc"]);
        assert_ne!(a, b);
    }

    #[test]
    fn sha256_joined_fields_has_no_trailing_separator() {
        assert_eq!(sha256_joined_fields(["a", "b"]), sha256_hex(b"a\nb"));
        assert_ne!(sha256_joined_fields(["a", "b"]), sha256_joined(["a", "b"]));
    }

    #[test]
    fn sha256_joined_fields_distinguishes_part_boundaries() {
        let a = sha256_joined_fields(["ab", "c"]);
        let b = sha256_joined_fields(["a", "bc"]);
        assert_ne!(a, b);
    }

    #[test]
    fn uuid_v7_embeds_timestamp_in_high_bits() {
        let id_early = uuid_v7(1_000_000, [0u8; 10]);
        let id_later = uuid_v7(2_000_000, [0u8; 10]);
        assert!(id_early < id_later);
    }

    #[test]
    fn uuid_v7_has_version_and_variant_nibbles() {
        let id = uuid_v7(123456789, [0xff; 10]);
        let groups: Vec<&str> = id.split('-').collect();
        assert_eq!(groups.len(), 5);
        assert_eq!(&groups[2][0..1], "7");
        let variant_nibble = u8::from_str_radix(&groups[3][0..1], 16).unwrap();
        assert_eq!(variant_nibble & 0b1100, 0b1000);
    }
}
