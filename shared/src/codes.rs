//! Room code rules: 4-8 uppercase letters and digits.

use rand::Rng;

pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
pub const MIN_CODE_LEN: usize = 4;
pub const MAX_CODE_LEN: usize = 8;

/// Length generated codes use. Custom codes may be 4-8 characters.
const GENERATED_CODE_LEN: usize = 6;

pub fn is_valid_code(code: &str) -> bool {
    (MIN_CODE_LEN..=MAX_CODE_LEN).contains(&code.len())
        && code
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
}

/// Uppercases and trims user input before validation, so `" abcd "` and
/// `"ABCD"` name the same room.
pub fn normalize_code(input: &str) -> String {
    input.trim().to_ascii_uppercase()
}

/// Random code drawn uniformly from the room-code alphabet.
pub fn generate_code(rng: &mut impl Rng) -> String {
    (0..GENERATED_CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_codes_in_range() {
        for code in ["ABCD", "ROOM42", "A1B2C3D4", "9999"] {
            assert!(is_valid_code(code), "should accept {}", code);
        }
    }

    #[test]
    fn rejects_bad_codes() {
        for code in ["", "ABC", "TOOLONGCODE", "abcd", "AB CD", "AB-D", "ÅBCD"] {
            assert!(!is_valid_code(code), "should reject {}", code);
        }
    }

    #[test]
    fn normalize_uppercases_and_trims() {
        assert_eq!(normalize_code("  abcd12 "), "ABCD12");
        assert!(is_valid_code(&normalize_code(" room42 ")));
    }

    #[test]
    fn generated_codes_are_valid() {
        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            let code = generate_code(&mut rng);
            assert!(is_valid_code(&code), "generated invalid code {}", code);
        }
    }
}
