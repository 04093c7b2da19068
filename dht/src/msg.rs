//! KRPC messages. Only `get_peers` is ever sent; responses are decoded into
//! owned values so the parser can be reused right away.

use std::net::SocketAddr;

use anyhow::{anyhow, bail, Context};
use ben::{Dict, DictEncoder, Encode, Parser};

use crate::contact::{decode_addr, decode_nodes, Contact};
use crate::id::NodeId;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TxnId(pub u16);

impl TxnId {
    pub fn next_id(&mut self) -> Self {
        let out = *self;
        self.0 = self.0.wrapping_add(1);
        out
    }
}

impl Encode for TxnId {
    fn encode(&self, buf: &mut Vec<u8>) {
        ben::encode_bytes(buf, self.0.to_be_bytes());
    }
}

#[derive(Debug)]
pub struct GetPeers {
    pub txn_id: TxnId,
    pub id: NodeId,
    pub info_hash: NodeId,
}

impl Encode for GetPeers {
    fn encode(&self, buf: &mut Vec<u8>) {
        let mut d = DictEncoder::new(buf);

        let mut a = d.insert_dict("a");
        a.insert("id", self.id);
        a.insert("info_hash", self.info_hash);
        a.finish();

        d.insert("q", "get_peers");
        d.insert("t", self.txn_id);
        d.insert("y", "q");
    }
}

#[derive(Debug, PartialEq)]
pub struct Response {
    pub txn_id: TxnId,
    pub id: NodeId,
    pub nodes: Vec<Contact>,
    pub values: Vec<SocketAddr>,
}

#[derive(Debug, PartialEq)]
pub enum Msg {
    Response(Response),
    Error { txn_id: TxnId, code: i64 },
    /// Queries from other nodes. They are not answered.
    Query { txn_id: TxnId },
}

impl Msg {
    pub fn parse(parser: &mut Parser, buf: &[u8]) -> anyhow::Result<Self> {
        let dict = parser.parse::<Dict>(buf)?;

        let txn_id = dict.get_bytes("t").context("Transaction ID is required")?;
        let txn_id: [u8; 2] = txn_id
            .try_into()
            .map_err(|_| anyhow!("Transaction ID must be 2 bytes"))?;
        let txn_id = TxnId(u16::from_be_bytes(txn_id));

        let msg = match dict.get_bytes("y") {
            Some(b"r") => Msg::Response(Response::decode(txn_id, &dict)?),
            Some(b"e") => {
                let code = dict
                    .get_list("e")
                    .and_then(|list| list.get(0))
                    .and_then(|code| code.as_int::<i64>())
                    .unwrap_or(0);
                Msg::Error { txn_id, code }
            }
            Some(b"q") => Msg::Query { txn_id },
            other => bail!("Unexpected message type: {:?}", other),
        };
        Ok(msg)
    }
}

impl Response {
    fn decode(txn_id: TxnId, dict: &Dict) -> anyhow::Result<Self> {
        let body = dict.get_dict("r").context("Response body is required")?;
        let id = body
            .get_bytes("id")
            .and_then(NodeId::from_bytes)
            .context("Node ID must be 20 bytes")?;

        let mut nodes = vec![];
        if let Some(buf) = body.get_bytes("nodes") {
            nodes.extend(decode_nodes(buf, false)?);
        }
        if let Some(buf) = body.get_bytes("nodes6") {
            nodes.extend(decode_nodes(buf, true)?);
        }

        let values = body
            .get_list("values")
            .map(|list| {
                list.iter()
                    .filter_map(|value| value.as_bytes())
                    .filter_map(decode_addr)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            txn_id,
            id,
            nodes,
            values,
        })
    }
}
