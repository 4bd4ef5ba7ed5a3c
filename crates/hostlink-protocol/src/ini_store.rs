//! `hosts.ini` persistence (§4.B, §8). The file has a `[hosts]` section
//! with a `size` key, followed by one `[hostN]` section per record. PEM
//! certificates contain literal newlines, which the `ini` crate's writer
//! does not round-trip cleanly inside a single value, so they are stored
//! with newlines swapped for the `$CR$` token and restored on load.

use ini::Ini;

use crate::error::ProtocolError;
use crate::host_record::{Address, HostRecord};

const NEWLINE_TOKEN: &str = "$CR$";

/// Encode a PEM blob for storage as a single INI value. Self-inverse with
/// [`decode_cert`].
pub fn encode_cert(pem: &str) -> String {
    pem.replace('\n', NEWLINE_TOKEN)
}

pub fn decode_cert(encoded: &str) -> String {
    encoded.replace(NEWLINE_TOKEN, "\n")
}

fn address_to_strings(addr: &Option<Address>) -> (String, String) {
    match addr {
        Some(a) => (a.host.clone(), a.port.to_string()),
        None => (String::new(), String::new()),
    }
}

fn address_from_strings(host: Option<&str>, port: Option<&str>) -> Option<Address> {
    let host = host?.trim();
    if host.is_empty() {
        return None;
    }
    let port: u16 = port.and_then(|p| p.trim().parse().ok()).unwrap_or(0);
    Some(Address {
        host: host.to_string(),
        port,
    })
}

/// Serialize records into `hosts.ini` text, in the given order.
pub fn serialize(hosts: &[HostRecord]) -> String {
    let mut ini = Ini::new();
    ini.with_section(Some("hosts"))
        .set("size", hosts.len().to_string());

    for (index, host) in hosts.iter().enumerate() {
        let section = format!("host{index}");
        let (local_host, local_port) = address_to_strings(&host.local_address);
        let (remote_host, remote_port) = address_to_strings(&host.remote_address);
        let (ipv6_host, ipv6_port) = address_to_strings(&host.ipv6_address);
        let (manual_host, manual_port) = address_to_strings(&host.manual_address);
        let apps_json = serde_json::to_string(&host.app_list).unwrap_or_default();

        ini.with_section(Some(section.as_str()))
            .set("uuid", &host.uuid)
            .set("name", &host.name)
            .set("customname", host.custom_name.to_string())
            .set("mac", &host.mac)
            .set("localaddress", local_host)
            .set("localport", local_port)
            .set("remoteaddress", remote_host)
            .set("remoteport", remote_port)
            .set("ipv6address", ipv6_host)
            .set("ipv6port", ipv6_port)
            .set("manualaddress", manual_host)
            .set("manualport", manual_port)
            .set("cert", encode_cert(&host.server_cert_pem))
            .set("nvidia", host.is_nvidia_software.to_string())
            .set("apps", apps_json);
    }

    let mut buf = Vec::new();
    ini.write_to(&mut buf).expect("writing to an in-memory buffer cannot fail");
    String::from_utf8(buf).expect("ini writer only emits valid utf-8")
}

/// Parse `hosts.ini` text into records, in file order. Missing or
/// malformed sections are skipped rather than failing the whole load,
/// since a single corrupted entry should not strand every other host.
pub fn deserialize(text: &str) -> Result<Vec<HostRecord>, ProtocolError> {
    let ini = Ini::load_from_str(text).map_err(|e| ProtocolError::IniParse(e.to_string()))?;

    let size: usize = ini
        .section(Some("hosts"))
        .and_then(|s| s.get("size"))
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    let mut hosts = Vec::with_capacity(size);
    for index in 0..size {
        let section_name = format!("host{index}");
        let Some(section) = ini.section(Some(section_name.as_str())) else {
            tracing::warn!(section = %section_name, "hosts.ini missing expected section, skipping");
            continue;
        };

        let Some(uuid) = section.get("uuid") else {
            tracing::warn!(section = %section_name, "host section has no uuid, skipping");
            continue;
        };

        let mut record = HostRecord::new(uuid.to_string(), section.get("name").unwrap_or_default().to_string());
        record.custom_name = section.get("customname") == Some("true");
        record.mac = section.get("mac").unwrap_or_default().to_string();
        record.local_address = address_from_strings(section.get("localaddress"), section.get("localport"));
        record.remote_address = address_from_strings(section.get("remoteaddress"), section.get("remoteport"));
        record.ipv6_address = address_from_strings(section.get("ipv6address"), section.get("ipv6port"));
        record.manual_address = address_from_strings(section.get("manualaddress"), section.get("manualport"));
        record.server_cert_pem = section.get("cert").map(decode_cert).unwrap_or_default();
        record.is_nvidia_software = section.get("nvidia") == Some("true");
        record.app_list = section
            .get("apps")
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default();

        hosts.push(record);
    }

    Ok(hosts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_host() -> HostRecord {
        let mut h = HostRecord::new("abc-123".into(), "Living Room".into());
        h.custom_name = true;
        h.mac = "aabbccddeeff".into();
        h.local_address = Some(Address {
            host: "192.168.1.50".into(),
            port: 47989,
        });
        h.server_cert_pem = "-----BEGIN CERTIFICATE-----\nMIIB...\n-----END CERTIFICATE-----\n".into();
        h.is_nvidia_software = true;
        h
    }

    #[test]
    fn cert_newline_encoding_is_self_inverse() {
        let pem = "-----BEGIN CERTIFICATE-----\nMIIB...\n-----END CERTIFICATE-----\n";
        assert_eq!(decode_cert(&encode_cert(pem)), pem);
    }

    #[test]
    fn roundtrip_single_host() {
        let hosts = vec![sample_host()];
        let text = serialize(&hosts);
        let parsed = deserialize(&text).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].uuid, "abc-123");
        assert_eq!(parsed[0].name, "Living Room");
        assert!(parsed[0].custom_name);
        assert_eq!(parsed[0].mac, "aabbccddeeff");
        assert_eq!(parsed[0].local_address, hosts[0].local_address);
        assert_eq!(parsed[0].server_cert_pem, hosts[0].server_cert_pem);
        assert!(parsed[0].is_nvidia_software);
    }

    #[test]
    fn roundtrip_empty_list() {
        let text = serialize(&[]);
        assert_eq!(deserialize(&text).unwrap().len(), 0);
    }

    #[test]
    fn missing_section_is_skipped_not_fatal() {
        let text = "[hosts]\nsize=2\n[host0]\nuuid=only-one\nname=Solo\n";
        let parsed = deserialize(text).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].uuid, "only-one");
    }

    #[test]
    fn apps_survive_roundtrip() {
        use crate::app::Application;
        let mut host = sample_host();
        host.app_list = vec![Application {
            id: 1,
            guid: "g1".into(),
            name: "Game".into(),
            game_platform: "steam".into(),
            hdr_supported: true,
            is_app_collector_game: false,
            hidden: true,
            direct_launch: false,
            last_app_start_time: 42,
            box_art: "art.png".into(),
        }];
        let text = serialize(&[host]);
        let parsed = deserialize(&text).unwrap();
        assert_eq!(parsed[0].app_list.len(), 1);
        assert_eq!(parsed[0].app_list[0].name, "Game");
        assert!(parsed[0].app_list[0].hidden);
    }
}
