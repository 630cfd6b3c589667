//! Identifier generation for catalog entities
//!
//! Entity ids have the form `<prefix>_<random>_<timestamp>`: seven random
//! base-36 characters followed by the creation time in milliseconds, base-36
//! encoded. The embedded timestamp keeps ids generated on different devices
//! from colliding without any coordination between them.

use rand::Rng;

const ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const RANDOM_LEN: usize = 7;

/// Generate a fresh entity id with the given prefix.
///
/// Example output: `media_k3f9a2x_lqx8z0v`
pub fn uid(prefix: &str) -> String {
    let mut rng = rand::thread_rng();
    let mut random = String::with_capacity(RANDOM_LEN);
    for _ in 0..RANDOM_LEN {
        random.push(ALPHABET[rng.gen_range(0..ALPHABET.len())] as char);
    }
    format!(
        "{}_{}_{}",
        prefix,
        random,
        to_base36(crate::time::now_millis())
    )
}

/// Encode a non-negative integer as lowercase base 36.
pub fn to_base36(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(ALPHABET[(n % 36) as usize]);
        n /= 36;
    }
    digits.reverse();
    // ALPHABET is pure ASCII so the bytes are valid UTF-8
    String::from_utf8(digits).unwrap_or_default()
}
