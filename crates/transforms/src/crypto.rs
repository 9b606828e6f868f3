//! Literal encryption shared by the rewriter and the injected decryptor.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

/// Symmetric string cipher. Ciphertext is text so it can be written back as a
/// string literal.
pub trait Cipher {
    fn encrypt(&self, plaintext: &str) -> String;
    fn decrypt(&self, ciphertext: &str) -> Option<String>;
}

/// Repeating-key XOR over UTF-8 bytes, base64 encoded.
///
/// Mirrors `XorBytes` in the string decryptor template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XorCipher {
    key: Vec<u8>,
}

impl XorCipher {
    pub fn new(key: &str) -> Self {
        Self {
            key: key.as_bytes().to_vec(),
        }
    }

    fn xor(&self, data: &mut [u8]) {
        if self.key.is_empty() {
            return;
        }
        for (byte, k) in data.iter_mut().zip(self.key.iter().cycle()) {
            *byte ^= k;
        }
    }
}

impl Cipher for XorCipher {
    fn encrypt(&self, plaintext: &str) -> String {
        let mut bytes = plaintext.as_bytes().to_vec();
        self.xor(&mut bytes);
        STANDARD.encode(bytes)
    }

    fn decrypt(&self, ciphertext: &str) -> Option<String> {
        let mut bytes = STANDARD.decode(ciphertext).ok()?;
        self.xor(&mut bytes);
        String::from_utf8(bytes).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decrypt_inverts_encrypt() {
        let cipher = XorCipher::new("K3Y9QZ0PLM");
        for literal in ["", "hello", "C:\\Windows\\System32", "naïve ☃ text", "\"quoted\"\n"] {
            let sealed = cipher.encrypt(literal);
            assert_eq!(cipher.decrypt(&sealed).as_deref(), Some(literal));
        }
    }

    #[test]
    fn ciphertext_hides_plaintext() {
        let cipher = XorCipher::new("KEY");
        let sealed = cipher.encrypt("password");
        assert!(!sealed.contains("password"));
        assert_ne!(sealed, STANDARD.encode("password"));
    }

    #[test]
    fn wrong_input_is_rejected() {
        let cipher = XorCipher::new("KEY");
        assert_eq!(cipher.decrypt("not base64!"), None);
    }
}
