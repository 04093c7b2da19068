use std::ops::Deref;

use bytes::BufMut;

use crate::msg::*;

/// Outgoing side of a peer connection. Messages are framed into an internal
/// buffer which is drained through `get_send_buf`.
pub struct Connection {
    send_buf: Vec<u8>,
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

impl Connection {
    pub fn new() -> Self {
        Self {
            send_buf: Vec::with_capacity(1024),
        }
    }

    pub fn send(&mut self, msg: &Message) {
        match msg {
            Message::KeepAlive => self.send_keepalive(),
            Message::Choke => self.send_simple(CHOKE),
            Message::Unchoke => self.send_simple(UNCHOKE),
            Message::Interested => self.send_interested(),
            Message::NotInterested => self.send_simple(NOT_INTERESTED),
            Message::Have(index) => self.send_have(*index),
            Message::Bitfield(bytes) => self.send_raw(BITFIELD, bytes),
            Message::Request { index, begin, len } => {
                self.send_triple(REQUEST, *index, *begin, *len)
            }
            Message::Piece { index, begin, data } => self.send_piece(*index, *begin, data),
            Message::Cancel { index, begin, len } => self.send_triple(CANCEL, *index, *begin, *len),
            Message::Port(port) => {
                self.send_buf.put_u32(3);
                self.send_buf.put_u8(PORT);
                self.send_buf.put_u16(*port);
            }
            Message::Extended { id, payload } => self.send_extended(*id, payload),
            Message::Unknown { id, payload } => self.send_raw(*id, payload),
        }
    }

    pub fn send_keepalive(&mut self) {
        self.send_buf.put_u32(0);
    }

    pub fn send_interested(&mut self) {
        self.send_simple(INTERESTED);
    }

    pub fn send_have(&mut self, index: u32) {
        self.send_buf.put_u32(5);
        self.send_buf.put_u8(HAVE);
        self.send_buf.put_u32(index);
    }

    pub fn send_piece(&mut self, index: u32, begin: u32, data: &[u8]) {
        self.send_buf.put_u32(9 + data.len() as u32);
        self.send_buf.put_u8(PIECE);
        self.send_buf.put_u32(index);
        self.send_buf.put_u32(begin);
        self.send_buf.extend(data);
    }

    pub fn send_extended(&mut self, id: u8, payload: &[u8]) {
        let len = 2 + payload.len() as u32;
        self.send_buf.put_u32(len);
        self.send_buf.put_u8(EXTENDED);
        self.send_buf.put_u8(id);
        self.send_buf.extend(payload);
    }

    fn send_simple(&mut self, id: u8) {
        self.send_buf.put_u32(1);
        self.send_buf.put_u8(id);
    }

    fn send_triple(&mut self, id: u8, index: u32, begin: u32, len: u32) {
        self.send_buf.put_u32(13);
        self.send_buf.put_u8(id);
        self.send_buf.put_u32(index);
        self.send_buf.put_u32(begin);
        self.send_buf.put_u32(len);
    }

    fn send_raw(&mut self, id: u8, payload: &[u8]) {
        self.send_buf.put_u32(1 + payload.len() as u32);
        self.send_buf.put_u8(id);
        self.send_buf.extend(payload);
    }

    pub fn get_send_buf(&mut self) -> SendBuf<'_> {
        SendBuf {
            buf: &mut self.send_buf,
        }
    }
}

/// Pending outgoing bytes. Cleared when dropped.
pub struct SendBuf<'a> {
    buf: &'a mut Vec<u8>,
}

impl<'a> Deref for SendBuf<'a> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.buf
    }
}

impl<'a> Drop for SendBuf<'a> {
    fn drop(&mut self) {
        self.buf.clear();
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[test]
    fn frames_round_trip_through_parse() {
        let msgs = [
            Message::KeepAlive,
            Message::Interested,
            Message::Have(7),
            Message::Request {
                index: 1,
                begin: 0,
                len: 16384,
            },
            Message::Extended {
                id: 3,
                payload: Bytes::from_static(b"d8:msg_typei0e5:piecei0ee"),
            },
        ];

        let mut conn = Connection::new();
        for msg in &msgs {
            conn.send(msg);
        }

        let buf = conn.get_send_buf().to_vec();
        let mut rest = &buf[..];
        for msg in &msgs {
            let len = u32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
            let frame = Bytes::copy_from_slice(&rest[4..4 + len]);
            assert_eq!(msg, &Message::parse(frame).unwrap());
            rest = &rest[4 + len..];
        }
        assert!(rest.is_empty());
    }

    #[test]
    fn send_buf_clears_on_drop() {
        let mut conn = Connection::new();
        conn.send_keepalive();
        assert_eq!(&[0, 0, 0, 0], &*conn.get_send_buf());
        assert!(conn.get_send_buf().is_empty());
    }

    #[test]
    fn extended_frame_layout() {
        let mut conn = Connection::new();
        conn.send_extended(0, b"de");
        assert_eq!(&[0, 0, 0, 4, EXTENDED, 0, b'd', b'e'], &*conn.get_send_buf());
    }
}
