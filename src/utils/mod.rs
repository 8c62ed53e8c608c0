// Utility functions and helpers

use rand::Rng;
use rand::distributions::Alphanumeric;

/// Alphabet used for the random suffix of generated usernames.
pub const USERNAME_SUFFIX_ALPHABET: &str = "123456789";

/// Random alphanumeric string of the given length.
pub fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Random string drawn only from the characters of `alphabet`.
///
/// Returns an empty string when `alphabet` is empty.
pub fn random_string_with_alphabet(len: usize, alphabet: &str) -> String {
    let chars: Vec<char> = alphabet.chars().collect();
    if chars.is_empty() {
        return String::new();
    }

    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| chars[rng.gen_range(0..chars.len())])
        .collect()
}
