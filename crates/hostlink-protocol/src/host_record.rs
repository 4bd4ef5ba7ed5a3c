use serde::{Deserialize, Serialize};

use crate::app::{merge_app_lists, Application};
use crate::xml::XmlResponse;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostState {
    #[default]
    Unknown,
    Online,
    Offline,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PairState {
    #[default]
    Unknown,
    Paired,
    NotPaired,
}

/// Identity-federated pair mode (§3). `Unknown` is the record's initial
/// state before any pairing attempt has run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FederatedPairMode {
    #[default]
    Unknown,
    Manual,
    Automatic,
    Disable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub host: String,
    pub port: u16,
}

impl Address {
    pub fn is_empty(&self) -> bool {
        self.host.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayMode {
    pub width: u32,
    pub height: u32,
    pub refresh_rate: u32,
}

/// A server-reported app-version quad (`major.minor.patch.build`), used to
/// choose the pairing hash function ([`hostlink_crypto::HashAlgo`]).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionQuad {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub build: u32,
}

impl VersionQuad {
    pub fn parse(s: &str) -> Self {
        let mut parts = s.trim().split('.').map(|p| p.parse().unwrap_or(0));
        Self {
            major: parts.next().unwrap_or(0),
            minor: parts.next().unwrap_or(0),
            patch: parts.next().unwrap_or(0),
            build: parts.next().unwrap_or(0),
        }
    }
}

/// All state hostlink tracks for one remote host. §3 in full: `uuid` is
/// immutable once set. Persisted fields round-trip through `hosts.ini`;
/// ephemeral fields are never written to disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostRecord {
    pub uuid: String,

    // --- persisted ---
    pub name: String,
    pub custom_name: bool,
    /// Normalized hex, no separators. Empty for an absent/all-zero MAC.
    pub mac: String,
    pub local_address: Option<Address>,
    pub remote_address: Option<Address>,
    pub ipv6_address: Option<Address>,
    pub manual_address: Option<Address>,
    pub server_cert_pem: String,
    pub is_nvidia_software: bool,
    pub app_list: Vec<Application>,

    // --- ephemeral ---
    #[serde(skip)]
    pub state: HostState,
    #[serde(skip)]
    pub pair_state: PairState,
    #[serde(skip)]
    pub active_address: Option<Address>,
    #[serde(skip)]
    pub active_https_port: u16,
    #[serde(skip)]
    pub current_game_id: i32,
    #[serde(skip)]
    pub server_app_version: VersionQuad,
    #[serde(skip)]
    pub supported_codecs: u32,
    #[serde(skip)]
    pub max_luma_pixels_hevc: i64,
    #[serde(skip)]
    pub gpu_model: String,
    #[serde(skip)]
    pub federated_pair_mode: FederatedPairMode,
    #[serde(skip)]
    pub uses_same_external_identity: bool,
    #[serde(skip)]
    pub display_modes: Vec<DisplayMode>,
    #[serde(skip)]
    pub pending_quit: bool,
}

const EMPTY_MAC: &str = "00:00:00:00:00:00";

impl HostRecord {
    pub fn new(uuid: String, name: String) -> Self {
        Self {
            uuid,
            name,
            custom_name: false,
            mac: String::new(),
            local_address: None,
            remote_address: None,
            ipv6_address: None,
            manual_address: None,
            server_cert_pem: String::new(),
            is_nvidia_software: false,
            app_list: Vec::new(),
            state: HostState::Unknown,
            pair_state: PairState::Unknown,
            active_address: None,
            active_https_port: 0,
            current_game_id: 0,
            server_app_version: VersionQuad::default(),
            supported_codecs: 0,
            max_luma_pixels_hevc: 0,
            gpu_model: String::new(),
            federated_pair_mode: FederatedPairMode::Unknown,
            uses_same_external_identity: false,
            display_modes: Vec::new(),
            pending_quit: false,
        }
    }

    /// Parse a transient record out of a `serverinfo` response, for merging
    /// into the live record via [`HostRecord::update`]. Numeric fields
    /// default safely on parse error per §4.B.
    pub fn from_server_info(resp: &XmlResponse) -> Self {
        let uuid = resp.field_or_default("uniqueid");
        let mut record = Self::new(uuid, resp.field_or_default("hostname"));

        record.mac = normalize_mac(&resp.field_or_default("mac"));

        let local_ip = resp.field_or_default("LocalIP");
        if !local_ip.is_empty() {
            record.local_address = Some(Address {
                host: local_ip,
                port: 47989,
            });
        }
        let https_port: u16 = resp.field_parsed("HttpsPort");
        let external_ip = resp.field_or_default("ExternalIP");
        let external_port: u16 = resp.field_parsed("ExternalPort");
        if !external_ip.is_empty() {
            record.remote_address = Some(Address {
                host: external_ip,
                port: if external_port == 0 {
                    47989
                } else {
                    external_port
                },
            });
        }
        record.active_https_port = https_port;

        record.state = if resp.field_or_default("state").contains("MJOLNIR") {
            record.is_nvidia_software = true;
            HostState::Online
        } else {
            record.is_nvidia_software = false;
            HostState::Online
        };

        record.current_game_id = resp.field_parsed("currentgame");
        record.pair_state = match resp.field_or_default("PairStatus").as_str() {
            "1" => PairState::Paired,
            "0" => PairState::NotPaired,
            _ => PairState::Unknown,
        };
        record.server_app_version = VersionQuad::parse(&resp.field_or_default("appversion"));
        record.gpu_model = resp.field_or_default("gputype");
        record.max_luma_pixels_hevc = resp.field_parsed("MaxLumaPixelsHEVC");
        record.supported_codecs = resp.field_parsed("ServerCodecModeSupport");

        record.uses_same_external_identity = resp.field_or_default("RazerIdIdentifier") == "true";
        record.federated_pair_mode = match resp.field_or_default("RazerIdPairStatus").as_str() {
            "Manual" => FederatedPairMode::Manual,
            "Automatic" => FederatedPairMode::Automatic,
            "Disable" => FederatedPairMode::Disable,
            _ => FederatedPairMode::Unknown,
        };

        if let Some(modes) = resp.repeated.get("DisplayMode") {
            record.display_modes = modes
                .iter()
                .map(|m| DisplayMode {
                    width: m.get("Width").and_then(|v| v.parse().ok()).unwrap_or(0),
                    height: m.get("Height").and_then(|v| v.parse().ok()).unwrap_or(0),
                    refresh_rate: m
                        .get("RefreshRate")
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(0),
                })
                .collect();
        }

        record
    }

    /// Field-by-field merge of `other` into `self`. Returns whether
    /// anything actually changed. Custom-named records never have their
    /// `name` overwritten; empty/zero incoming values never clobber an
    /// existing non-empty value (§4.B).
    pub fn update(&mut self, other: &HostRecord) -> bool {
        assert_eq!(
            self.uuid, other.uuid,
            "update() must never be called across different host uuids"
        );

        let mut changed = false;

        if !self.custom_name && !other.name.is_empty() && self.name != other.name {
            self.name = other.name.clone();
            changed = true;
        }
        if !other.mac.is_empty() && self.mac != other.mac {
            self.mac = other.mac.clone();
            changed = true;
        }
        changed |= assign_if_some_and_differs(&mut self.local_address, &other.local_address);
        changed |= assign_if_some_and_differs(&mut self.remote_address, &other.remote_address);
        changed |= assign_if_some_and_differs(&mut self.ipv6_address, &other.ipv6_address);
        if !other.server_cert_pem.is_empty() && self.server_cert_pem != other.server_cert_pem {
            self.server_cert_pem = other.server_cert_pem.clone();
            changed = true;
        }
        if self.is_nvidia_software != other.is_nvidia_software {
            self.is_nvidia_software = other.is_nvidia_software;
            changed = true;
        }

        let merged_apps = merge_app_lists(&self.app_list, other.app_list.clone());
        if merged_apps != self.app_list {
            self.app_list = merged_apps;
            changed = true;
        }

        if self.state != other.state {
            self.state = other.state;
            changed = true;
        }
        if other.pair_state != PairState::Unknown && self.pair_state != other.pair_state {
            self.pair_state = other.pair_state;
            changed = true;
        }
        if self.current_game_id != other.current_game_id {
            self.current_game_id = other.current_game_id;
            changed = true;
        }
        if other.active_https_port != 0 && self.active_https_port != other.active_https_port {
            self.active_https_port = other.active_https_port;
            changed = true;
        }
        if self.gpu_model != other.gpu_model && !other.gpu_model.is_empty() {
            self.gpu_model = other.gpu_model.clone();
            changed = true;
        }
        if self.server_app_version != other.server_app_version
            && other.server_app_version != VersionQuad::default()
        {
            self.server_app_version = other.server_app_version;
            changed = true;
        }
        if self.max_luma_pixels_hevc != other.max_luma_pixels_hevc {
            self.max_luma_pixels_hevc = other.max_luma_pixels_hevc;
            changed = true;
        }
        if self.supported_codecs != other.supported_codecs {
            self.supported_codecs = other.supported_codecs;
            changed = true;
        }
        if self.display_modes != other.display_modes && !other.display_modes.is_empty() {
            self.display_modes = other.display_modes.clone();
            changed = true;
        }
        if self.uses_same_external_identity != other.uses_same_external_identity {
            self.uses_same_external_identity = other.uses_same_external_identity;
            changed = true;
        }
        if self.federated_pair_mode != other.federated_pair_mode {
            self.federated_pair_mode = other.federated_pair_mode;
            changed = true;
        }

        changed
    }

    /// Deduplicated `[active, local, remote, ipv6, manual]`, skipping null
    /// entries, earlier positions taking precedence (§3, §8).
    pub fn unique_addresses(&self) -> Vec<Address> {
        let candidates = [
            self.active_address.clone(),
            self.local_address.clone(),
            self.remote_address.clone(),
            self.ipv6_address.clone(),
            self.manual_address.clone(),
        ];
        let mut seen = std::collections::HashSet::new();
        candidates
            .into_iter()
            .flatten()
            .filter(|addr| seen.insert((addr.host.clone(), addr.port)))
            .collect()
    }

    /// Compares only persisted fields — used by the Registry to decide
    /// whether a save-to-disk is actually needed (§3, §8).
    pub fn is_equal_serialized(&self, other: &HostRecord) -> bool {
        self.uuid == other.uuid
            && self.name == other.name
            && self.custom_name == other.custom_name
            && self.mac == other.mac
            && self.local_address == other.local_address
            && self.remote_address == other.remote_address
            && self.ipv6_address == other.ipv6_address
            && self.manual_address == other.manual_address
            && self.server_cert_pem == other.server_cert_pem
            && self.is_nvidia_software == other.is_nvidia_software
            && self.app_list == other.app_list
    }
}

fn assign_if_some_and_differs(slot: &mut Option<Address>, incoming: &Option<Address>) -> bool {
    if let Some(addr) = incoming {
        if slot.as_ref() != Some(addr) {
            *slot = Some(addr.clone());
            return true;
        }
    }
    false
}

/// Normalize a MAC address to lowercase hex with no separators, or the
/// empty string for an absent/all-zero MAC (§4.B).
pub fn normalize_mac(raw: &str) -> String {
    let stripped: String = raw
        .chars()
        .filter(|c| c.is_ascii_hexdigit())
        .collect::<String>()
        .to_lowercase();
    if stripped.is_empty() || raw.trim() == EMPTY_MAC || stripped.chars().all(|c| c == '0') {
        return String::new();
    }
    stripped
}

/// Build the magic-packet payload: `6×0xFF` followed by the target MAC
/// repeated 16 times (§4.B `wake()`).
pub fn build_magic_packet(mac_hex: &str) -> Option<Vec<u8>> {
    if mac_hex.is_empty() || mac_hex.len() != 12 {
        return None;
    }
    let mut mac_bytes = [0u8; 6];
    for i in 0..6 {
        mac_bytes[i] = u8::from_str_radix(&mac_hex[i * 2..i * 2 + 2], 16).ok()?;
    }
    let mut packet = vec![0xFFu8; 6];
    for _ in 0..16 {
        packet.extend_from_slice(&mac_bytes);
    }
    Some(packet)
}

/// Standard wake-on-LAN UDP ports, plus ports derived from the record's
/// known HTTP base port (the GameStream/Sunshine server software also
/// listens for WOL on offsets of its own HTTP port) (§4.B).
pub fn standard_wake_ports() -> [u16; 2] {
    [9, 47009]
}

pub fn dynamic_wake_ports(http_base_port: u16) -> Vec<u16> {
    if http_base_port == 0 {
        return Vec::new();
    }
    [0i32, 5, 20].iter().filter_map(|offset| {
        let port = i32::from(http_base_port) + offset;
        u16::try_from(port).ok()
    }).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_mac_normalizes_to_empty_string() {
        assert_eq!(normalize_mac("00:00:00:00:00:00"), "");
        assert_eq!(normalize_mac(""), "");
    }

    #[test]
    fn mac_normalizes_to_lowercase_hex() {
        assert_eq!(normalize_mac("AA:BB:CC:DD:EE:FF"), "aabbccddeeff");
    }

    #[test]
    fn unique_addresses_dedups_preserving_first_occurrence() {
        let mut record = HostRecord::new("u1".into(), "Host".into());
        let addr = Address {
            host: "10.0.0.5".into(),
            port: 47989,
        };
        record.active_address = Some(addr);
        record.local_address = Some(addr);
        record.remote_address = Some(Address {
            host: "1.2.3.4".into(),
            port: 47989,
        });
        let addrs = record.unique_addresses();
        assert_eq!(addrs.len(), 2);
        assert_eq!(addrs[0], addr);
    }

    #[test]
    fn unique_addresses_nonempty_even_with_only_active() {
        let mut record = HostRecord::new("u1".into(), "Host".into());
        record.active_address = Some(Address {
            host: "10.0.0.5".into(),
            port: 1,
        });
        assert_eq!(record.unique_addresses().len(), 1);
    }

    #[test]
    fn update_is_idempotent() {
        let mut a = HostRecord::new("u1".into(), "A".into());
        let mut b = HostRecord::new("u1".into(), "B".into());
        b.mac = "aabbccddeeff".into();

        assert!(a.update(&b));
        assert!(!a.update(&b), "second identical update must report no change");
    }

    #[test]
    fn update_self_with_self_is_noop() {
        let mut a = HostRecord::new("u1".into(), "A".into());
        a.mac = "aabbccddeeff".into();
        let snapshot = a.clone();
        assert!(!a.update(&snapshot));
    }

    #[test]
    fn custom_named_record_does_not_overwrite_name() {
        let mut a = HostRecord::new("u1".into(), "My Custom Name".into());
        a.custom_name = true;
        let mut b = HostRecord::new("u1".into(), "Server Reported Name".into());
        b.mac = "aabbccddeeff".into();
        a.update(&b);
        assert_eq!(a.name, "My Custom Name");
    }

    #[test]
    #[should_panic]
    fn update_panics_on_uuid_mismatch() {
        let mut a = HostRecord::new("u1".into(), "A".into());
        let b = HostRecord::new("u2".into(), "B".into());
        a.update(&b);
    }

    #[test]
    fn magic_packet_has_expected_shape() {
        let packet = build_magic_packet("aabbccddeeff").unwrap();
        assert_eq!(packet.len(), 6 + 16 * 6);
        assert_eq!(&packet[0..6], &[0xFFu8; 6]);
        assert_eq!(&packet[6..12], &[0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
    }

    #[test]
    fn magic_packet_none_for_empty_mac() {
        assert!(build_magic_packet("").is_none());
    }

    #[test]
    fn is_equal_serialized_ignores_ephemeral_fields() {
        let mut a = HostRecord::new("u1".into(), "A".into());
        let mut b = a.clone();
        b.state = HostState::Online;
        b.current_game_id = 42;
        assert!(a.is_equal_serialized(&b));
        b.name = "Different".into();
        assert!(!a.is_equal_serialized(&b));
        let _ = &mut a;
    }
}
