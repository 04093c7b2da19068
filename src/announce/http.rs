use std::net::{IpAddr, SocketAddr};

use anyhow::{bail, ensure, Context};
use ben::{decode::Dict, Parser};
use percent_encoding::{percent_encode, NON_ALPHANUMERIC};
use reqwest::Client;
use tracing::{debug, trace};

use crate::announce::{AnnounceRequest, AnnounceResponse};
use crate::peer::{compact_v4, compact_v6};

pub async fn announce(url: &str, req: AnnounceRequest<'_>) -> anyhow::Result<AnnounceResponse> {
    let url = announce_url(url, &req);
    debug!("Announcing to {}", url);

    let data = Client::new()
        .get(&url)
        .send()
        .await?
        .error_for_status()?
        .bytes()
        .await?;

    trace!("Announce response: {:?}", data);
    parse_response(&data)
}

fn announce_url(base: &str, req: &AnnounceRequest<'_>) -> String {
    let sep = if base.contains('?') { '&' } else { '?' };
    format!(
        "{}{}info_hash={}&peer_id={}&port={}&uploaded=0&downloaded=0&left={}&compact=1&event=started",
        base,
        sep,
        percent_encode(req.info_hash.as_bytes(), NON_ALPHANUMERIC),
        percent_encode(req.peer_id, NON_ALPHANUMERIC),
        req.port,
        req.left,
    )
}

fn parse_response(data: &[u8]) -> anyhow::Result<AnnounceResponse> {
    let mut parser = Parser::new();
    parser.sorted_keys(false);
    let value = parser.parse::<Dict>(data)?;

    if let Some(reason) = value.get_str("failure reason") {
        bail!("Tracker failure: {}", reason);
    }

    let interval = value.get_int("interval").unwrap_or(0);

    let mut peers = match value.get("peers") {
        Some(peers) if peers.is_list() => {
            let mut v = vec![];
            for peer in peers.as_list().into_iter().flatten() {
                let peer = peer.as_dict().context("Peer not a dict")?;
                let ip = peer.get_str("ip").context("IP not present")?;
                let port = peer.get_int("port").context("Port not present")?;
                // Host names are not resolved here
                match ip.parse::<IpAddr>() {
                    Ok(ip) => v.push(SocketAddr::new(ip, port)),
                    Err(_) => debug!("Skipping peer with non-IP address {}", ip),
                }
            }
            v
        }
        Some(peers) => {
            let peers = peers.as_bytes().unwrap_or_default();
            ensure!(peers.len() % 6 == 0, "Invalid peer len");
            peers.chunks_exact(6).filter_map(compact_v4).collect()
        }
        None => vec![],
    };

    let peers6 = value.get_bytes("peers6").unwrap_or_default();
    ensure!(peers6.len() % 18 == 0, "Invalid peer6 len");
    peers.extend(peers6.chunks_exact(18).filter_map(compact_v6));

    debug!("Found {} peers", peers.len());
    Ok(AnnounceResponse { interval, peers })
}

#[cfg(test)]
mod tests {
    use client::proto::InfoHash;

    use super::*;

    #[test]
    fn url_escapes_binary_fields() {
        let ih = InfoHash::new([0xab; 20]);
        let req = AnnounceRequest {
            info_hash: &ih,
            peer_id: b"-MT0100-abcdefghijkl",
            port: 6881,
            left: 16384,
        };
        let url = announce_url("http://t.example/announce", &req);
        assert!(url.starts_with("http://t.example/announce?info_hash=%AB%AB"));
        assert!(url.contains("&peer_id=%2DMT0100%2Dabcdefghijkl&port=6881"));
        assert!(url.ends_with("&left=16384&compact=1&event=started"));

        let url = announce_url("http://t.example/announce?key=1", &req);
        assert!(url.starts_with("http://t.example/announce?key=1&info_hash="));
    }

    #[test]
    fn compact_response() {
        let mut data = b"d8:intervali1800e5:peers12:".to_vec();
        data.extend_from_slice(&[127, 0, 0, 1, 0x1a, 0xe1, 10, 0, 0, 2, 0, 80]);
        data.extend_from_slice(b"6:peers618:");
        let mut v6 = [0u8; 18];
        v6[15] = 1;
        v6[17] = 81;
        data.extend_from_slice(&v6);
        data.push(b'e');

        let resp = parse_response(&data).unwrap();
        assert_eq!(1800, resp.interval);
        let expected: Vec<SocketAddr> = vec![
            "127.0.0.1:6881".parse().unwrap(),
            "10.0.0.2:80".parse().unwrap(),
            "[::1]:81".parse().unwrap(),
        ];
        assert_eq!(expected, resp.peers);
    }

    #[test]
    fn dict_response() {
        let data = b"d5:peersld2:ip9:127.0.0.14:porti6881eed2:ip11:example.com4:porti1eeee";
        let resp = parse_response(data).unwrap();
        assert_eq!(vec!["127.0.0.1:6881".parse::<SocketAddr>().unwrap()], resp.peers);
    }

    #[test]
    fn failure_reason() {
        let err = parse_response(b"d14:failure reason9:not founde").unwrap_err();
        assert_eq!("Tracker failure: not found", err.to_string());
    }

    #[test]
    fn bad_compact_len() {
        let err = parse_response(b"d5:peers5:abcdee").unwrap_err();
        assert_eq!("Invalid peer len", err.to_string());
    }
}
