use std::fmt;

use data_encoding::{BASE32, HEXLOWER};
use sha1::Sha1;

/// SHA-1 of a torrent's bencoded info dictionary.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct InfoHash([u8; 20]);

impl InfoHash {
    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Hash the given bencoded info dictionary.
    pub fn of(info: &[u8]) -> Self {
        Self(Sha1::from(info).digest().bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn encode_hex(&self) -> String {
        HEXLOWER.encode(&self.0)
    }

    pub fn encode_base32(&self) -> String {
        BASE32.encode(&self.0)
    }

    /// Escaped form used in tracker query strings.
    pub fn encode_url(&self) -> String {
        url::form_urlencoded::byte_serialize(&self.0).collect()
    }
}

impl From<[u8; 20]> for InfoHash {
    fn from(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for InfoHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode_hex())
    }
}

impl fmt::Debug for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InfoHash({})", self.encode_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_lowercase_hex() {
        let mut bytes = [0; 20];
        bytes[0] = 0xAB;
        bytes[19] = 0x01;
        let ih = InfoHash::new(bytes);
        assert_eq!("ab00000000000000000000000000000000000001", ih.to_string());
    }

    #[test]
    fn base32_is_32_chars() {
        let ih = InfoHash::new([0xff; 20]);
        assert_eq!("77777777777777777777777777777777", ih.encode_base32());
    }

    #[test]
    fn url_escapes_binary() {
        let mut bytes = [b'a'; 20];
        bytes[0] = 0x00;
        bytes[1] = b' ';
        let ih = InfoHash::new(bytes);
        assert_eq!("%00+aaaaaaaaaaaaaaaaaa", ih.encode_url());
    }

    #[test]
    fn hash_of_data() {
        assert_eq!(
            "da39a3ee5e6b4b0d3255bfef95601890afd80709",
            InfoHash::of(b"").encode_hex()
        );
    }
}
