//! Credential generation.

/// Bytes of entropy behind every generated principal, password, and
/// schema name.
pub const SECRET_BYTES: usize = 16;

/// Generate `byte_length` bytes from the OS random source, hex encoded.
///
/// The result is `2 * byte_length` lowercase hex characters.
///
/// # Panics
///
/// Panics if the OS random source fails. That is a platform failure the
/// process cannot recover from.
pub fn generate_secret(byte_length: usize) -> String {
    let mut buf = vec![0u8; byte_length];
    if let Err(e) = getrandom::getrandom(&mut buf) {
        panic!("os random source failed: {e}");
    }
    hex::encode(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn length_is_twice_byte_length() {
        assert_eq!(generate_secret(16).len(), 32);
        assert_eq!(generate_secret(1).len(), 2);
        assert_eq!(generate_secret(0).len(), 0);
    }

    #[test]
    fn output_is_lowercase_hex() {
        let s = generate_secret(SECRET_BYTES);
        assert!(s.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn no_collisions_in_a_small_sample() {
        let seen: HashSet<String> = (0..1000).map(|_| generate_secret(SECRET_BYTES)).collect();
        assert_eq!(seen.len(), 1000);
    }
}
