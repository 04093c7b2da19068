use itoa::Buffer;

/// Append `i<value>e`.
pub fn encode_int(buf: &mut Vec<u8>, value: i64) {
    buf.push(b'i');
    buf.extend_from_slice(Buffer::new().format(value).as_bytes());
    buf.push(b'e');
}

/// Append `<len>:<bytes>`.
pub fn encode_bytes<I>(buf: &mut Vec<u8>, value: I)
where
    I: AsRef<[u8]>,
{
    let value = value.as_ref();
    buf.extend_from_slice(Buffer::new().format(value.len()).as_bytes());
    buf.push(b':');
    buf.extend_from_slice(value);
}

/// Values that can be written as bencode.
pub trait Encode {
    fn encode(&self, buf: &mut Vec<u8>);

    fn encode_to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        buf
    }
}

/// Streaming list writer. The closing `e` is written on drop.
pub struct ListEncoder<'a> {
    buf: &'a mut Vec<u8>,
}

impl<'a> ListEncoder<'a> {
    pub fn new(buf: &'a mut Vec<u8>) -> Self {
        buf.push(b'l');
        Self { buf }
    }

    pub fn push<E: Encode>(&mut self, value: E) {
        value.encode(self.buf);
    }

    /// Start a nested list. It must be finished before this list is used again.
    pub fn push_list(&mut self) -> ListEncoder<'_> {
        ListEncoder::new(self.buf)
    }

    pub fn finish(self) {}
}

impl Drop for ListEncoder<'_> {
    fn drop(&mut self) {
        self.buf.push(b'e');
    }
}

/// Streaming dictionary writer. The closing `e` is written on drop.
///
/// Keys must be inserted in strictly increasing byte order; debug builds
/// panic otherwise.
pub struct DictEncoder<'a> {
    buf: &'a mut Vec<u8>,
    #[cfg(debug_assertions)]
    last_key: Option<Vec<u8>>,
}

impl<'a> DictEncoder<'a> {
    pub fn new(buf: &'a mut Vec<u8>) -> Self {
        buf.push(b'd');
        Self {
            buf,
            #[cfg(debug_assertions)]
            last_key: None,
        }
    }

    pub fn insert<E: Encode>(&mut self, key: &str, value: E) {
        self.key(key);
        value.encode(self.buf);
    }

    pub fn insert_list(&mut self, key: &str) -> ListEncoder<'_> {
        self.key(key);
        ListEncoder::new(self.buf)
    }

    pub fn insert_dict(&mut self, key: &str) -> DictEncoder<'_> {
        self.key(key);
        DictEncoder::new(self.buf)
    }

    /// Insert an already bencoded value verbatim. `value` must be exactly
    /// one well-formed bencode value.
    pub fn insert_raw(&mut self, key: &str, value: &[u8]) {
        self.key(key);
        self.buf.extend_from_slice(value);
    }

    pub fn finish(self) {}

    fn key(&mut self, key: &str) {
        #[cfg(debug_assertions)]
        {
            let key = key.as_bytes();
            if let Some(last) = &self.last_key {
                assert!(key != &last[..], "Keys must be unique");
                assert!(key > &last[..], "Keys must be sorted");
            }
            self.last_key = Some(key.to_vec());
        }
        encode_bytes(self.buf, key);
    }
}

impl Drop for DictEncoder<'_> {
    fn drop(&mut self) {
        self.buf.push(b'e');
    }
}

impl<T: Encode + ?Sized> Encode for &T {
    fn encode(&self, buf: &mut Vec<u8>) {
        (**self).encode(buf);
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode(&self, buf: &mut Vec<u8>) {
        let mut list = ListEncoder::new(buf);
        for item in self {
            list.push(item);
        }
    }
}

impl Encode for [u8] {
    fn encode(&self, buf: &mut Vec<u8>) {
        encode_bytes(buf, self);
    }
}

impl<const N: usize> Encode for [u8; N] {
    fn encode(&self, buf: &mut Vec<u8>) {
        encode_bytes(buf, self);
    }
}

impl Encode for str {
    fn encode(&self, buf: &mut Vec<u8>) {
        encode_bytes(buf, self);
    }
}

impl Encode for String {
    fn encode(&self, buf: &mut Vec<u8>) {
        encode_bytes(buf, self);
    }
}

impl Encode for i64 {
    fn encode(&self, buf: &mut Vec<u8>) {
        encode_int(buf, *self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_negative_int() {
        let buf = &mut vec![];
        encode_int(buf, -42);
        assert_eq!(b"i-42e", &buf[..]);
    }

    #[test]
    fn encode_binary_string() {
        let buf = &mut vec![];
        encode_bytes(buf, [0u8, 0xff, 0x10]);
        assert_eq!(b"3:\x00\xff\x10", &buf[..]);
    }

    #[test]
    fn dict_closes_on_drop() {
        let buf = &mut vec![];
        let mut dict = DictEncoder::new(buf);
        dict.insert("metadata_size", 31235i64);
        drop(dict);
        assert_eq!(&b"d13:metadata_sizei31235ee"[..], &buf[..]);
    }

    #[test]
    fn list_of_strings() {
        let buf = &mut vec![];
        vec!["udp://a", "http://b"].encode(buf);
        assert_eq!(&b"l7:udp://a8:http://be"[..], &buf[..]);
    }

    #[test]
    fn encode_raw_value() {
        let buf = &mut vec![];
        let mut dict = DictEncoder::new(buf);
        dict.insert("a", 1i64);
        dict.insert_raw("info", b"d4:name3:fooe");
        dict.finish();
        assert_eq!(&b"d1:ai1e4:infod4:name3:fooee"[..], &buf[..]);
    }

    #[test]
    fn encode_nested_containers() {
        let buf = &mut vec![];
        let mut dict = DictEncoder::new(buf);
        {
            let mut tiers = dict.insert_list("announce-list");
            let mut tier = tiers.push_list();
            tier.push("udp://a");
            tier.finish();
            tiers.finish();
        }
        dict.insert_dict("x").insert("k", vec!["v"]);
        dict.finish();
        assert_eq!(
            &b"d13:announce-listll7:udp://aee1:xd1:kl1:veee"[..],
            &buf[..]
        );
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "Keys must be sorted")]
    fn unsorted_keys_panic() {
        let buf = &mut vec![];
        let mut dict = DictEncoder::new(buf);
        dict.insert("v", "x");
        dict.insert("m", "y");
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "Keys must be unique")]
    fn duplicate_keys_panic() {
        let buf = &mut vec![];
        let mut dict = DictEncoder::new(buf);
        dict.insert("m", "x");
        dict.insert("m", "y");
    }
}
