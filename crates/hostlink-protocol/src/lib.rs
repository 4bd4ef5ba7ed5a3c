pub mod app;
pub mod error;
pub mod host_record;
pub mod ini_store;
pub mod xml;

pub use app::{merge_app_lists, parse_app_list, Application};
pub use error::{GfeResponseError, ProtocolError};
pub use host_record::{
    build_magic_packet, dynamic_wake_ports, normalize_mac, standard_wake_ports, Address,
    DisplayMode, FederatedPairMode, HostRecord, HostState, PairState, VersionQuad,
};
pub use xml::{parse_root, XmlResponse};
