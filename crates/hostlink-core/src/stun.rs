//! Minimal STUN (RFC 5389) binding-request client, used only by the add
//! task to discover a host's WAN address when it reports a private
//! (RFC 1918) local one (§4.H "performs a STUN lookup (fixed server) to
//! populate the remote address"). Grounded on the original's
//! `LiFindExternalAddressIP4` call; no pack example does STUN, so this
//! is a from-scratch, single-purpose client rather than an adapted one.

use std::net::Ipv4Addr;
use std::time::Duration;

use rand::RngCore;
use tokio::net::UdpSocket;

const STUN_SERVER: &str = "stun.moonlight-stream.org:3478";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(3);
const MAGIC_COOKIE: u32 = 0x2112_A442;
const BINDING_REQUEST: u16 = 0x0001;
const XOR_MAPPED_ADDRESS: u16 = 0x0020;
const MAPPED_ADDRESS: u16 = 0x0001;

/// Best-effort external IPv4 lookup. Any failure (DNS, timeout,
/// malformed response) is swallowed and reported as `None` — a STUN
/// failure must never block the add flow (original: "STUN failed to
/// get WAN address" is a warning, not an error).
pub async fn lookup_external_ipv4() -> Option<Ipv4Addr> {
    match tokio::time::timeout(REQUEST_TIMEOUT, query()).await {
        Ok(Ok(addr)) => Some(addr),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "STUN lookup failed to get WAN address");
            None
        }
        Err(_) => {
            tracing::warn!("STUN lookup timed out");
            None
        }
    }
}

async fn query() -> Result<Ipv4Addr, std::io::Error> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.connect(STUN_SERVER).await?;

    let transaction_id: [u8; 12] = {
        let mut id = [0u8; 12];
        rand::rngs::OsRng.fill_bytes(&mut id);
        id
    };
    let request = encode_binding_request(&transaction_id);
    socket.send(&request).await?;

    let mut buf = [0u8; 512];
    let n = socket.recv(&mut buf).await?;
    decode_binding_response(&buf[..n], &transaction_id)
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidData, "malformed STUN response"))
}

fn encode_binding_request(transaction_id: &[u8; 12]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(20);
    buf.extend_from_slice(&BINDING_REQUEST.to_be_bytes());
    buf.extend_from_slice(&0u16.to_be_bytes()); // message length, no attributes
    buf.extend_from_slice(&MAGIC_COOKIE.to_be_bytes());
    buf.extend_from_slice(transaction_id);
    buf
}

fn decode_binding_response(data: &[u8], transaction_id: &[u8; 12]) -> Option<Ipv4Addr> {
    if data.len() < 20 {
        return None;
    }
    let msg_type = u16::from_be_bytes([data[0], data[1]]);
    if msg_type != 0x0101 {
        return None; // not a Binding Success Response
    }
    let msg_len = u16::from_be_bytes([data[2], data[3]]) as usize;
    if data[4..8] != MAGIC_COOKIE.to_be_bytes() || data[8..20] != transaction_id[..] {
        return None;
    }

    let mut offset = 20;
    let end = (20 + msg_len).min(data.len());
    while offset + 4 <= end {
        let attr_type = u16::from_be_bytes([data[offset], data[offset + 1]]);
        let attr_len = u16::from_be_bytes([data[offset + 2], data[offset + 3]]) as usize;
        let value_start = offset + 4;
        let value_end = value_start + attr_len;
        if value_end > end {
            break;
        }
        let value = &data[value_start..value_end];

        match attr_type {
            XOR_MAPPED_ADDRESS if value.len() >= 8 && value[1] == 0x01 => {
                let xport = u16::from_be_bytes([value[2], value[3]]);
                let _port = xport ^ (MAGIC_COOKIE >> 16) as u16;
                let xaddr = u32::from_be_bytes([value[4], value[5], value[6], value[7]]);
                let addr = xaddr ^ MAGIC_COOKIE;
                return Some(Ipv4Addr::from(addr));
            }
            MAPPED_ADDRESS if value.len() >= 8 && value[1] == 0x01 => {
                return Some(Ipv4Addr::new(value[4], value[5], value[6], value[7]));
            }
            _ => {}
        }

        // attributes are padded to a 4-byte boundary
        offset = value_end + ((4 - (attr_len % 4)) % 4);
    }
    None
}

/// RFC 1918 private IPv4 ranges.
pub fn is_private_ipv4(addr: Ipv4Addr) -> bool {
    addr.is_private() || addr.is_loopback() || addr.is_link_local()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_private_ranges() {
        assert!(is_private_ipv4(Ipv4Addr::new(192, 168, 1, 50)));
        assert!(is_private_ipv4(Ipv4Addr::new(10, 0, 0, 1)));
        assert!(is_private_ipv4(Ipv4Addr::new(172, 16, 0, 1)));
        assert!(!is_private_ipv4(Ipv4Addr::new(203, 0, 113, 5)));
    }

    #[test]
    fn decodes_xor_mapped_address() {
        let transaction_id = [0u8; 12];
        let ip = Ipv4Addr::new(203, 0, 113, 9);
        let port: u16 = 54321;

        let xport = port ^ (MAGIC_COOKIE >> 16) as u16;
        let xaddr = u32::from(ip) ^ MAGIC_COOKIE;

        let mut attr_value = Vec::new();
        attr_value.push(0u8);
        attr_value.push(0x01);
        attr_value.extend_from_slice(&xport.to_be_bytes());
        attr_value.extend_from_slice(&xaddr.to_be_bytes());

        let mut msg = Vec::new();
        msg.extend_from_slice(&0x0101u16.to_be_bytes());
        msg.extend_from_slice(&((4 + attr_value.len()) as u16).to_be_bytes());
        msg.extend_from_slice(&MAGIC_COOKIE.to_be_bytes());
        msg.extend_from_slice(&transaction_id);
        msg.extend_from_slice(&XOR_MAPPED_ADDRESS.to_be_bytes());
        msg.extend_from_slice(&(attr_value.len() as u16).to_be_bytes());
        msg.extend_from_slice(&attr_value);

        assert_eq!(decode_binding_response(&msg, &transaction_id), Some(ip));
    }

    #[test]
    fn rejects_mismatched_transaction_id() {
        let msg = vec![0x01, 0x01, 0, 0, 0x21, 0x12, 0xA4, 0x42, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12];
        let transaction_id = [0xFFu8; 12];
        assert_eq!(decode_binding_response(&msg, &transaction_id), None);
    }
}
