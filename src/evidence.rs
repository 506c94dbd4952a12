//! Typed evidence records handed to the engine by the protocol collectors.
//!
//! The collectors (port scanner, HTTP fetcher, SSDP/mDNS listeners, ONVIF
//! WS-Discovery, BLE advertisement scanner) own the wire formats. What lands
//! here is already decoded and is never mutated once built.
use serde_derive::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// HTTP fingerprint taken from the root page of a host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpFingerprint {
    pub status: Option<u16>,
    pub server: Option<String>,
    pub auth_challenge: bool,
    pub title: Option<String>,
}

/// Fields lifted from an SSDP `M-SEARCH` response or `NOTIFY`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SsdpRecord {
    pub server: Option<String>,
    pub location: Option<String>,
    pub service_type: Option<String>,
    pub unique_name: Option<String>,
}

/// One announced DNS-SD service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub name: String,
    /// Service type such as `_rtsp._tcp`.
    pub service_type: String,
    pub port: u16,
    pub txt: BTreeMap<String, String>,
}

/// Everything collected for one candidate host in one scan cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceBundle {
    pub open_ports: BTreeSet<u16>,
    pub http: Option<HttpFingerprint>,
    pub ssdp: Option<SsdpRecord>,
    pub services: Vec<ServiceRecord>,
    pub onvif_discovered: bool,
    pub onvif_endpoints: Vec<String>,
    /// Vendor name from the hardware-address (OUI) lookup.
    pub vendor: Option<String>,
}

impl EvidenceBundle {
    /// Bundle with only the open port set filled in.
    pub fn with_ports<I: IntoIterator<Item = u16>>(ports: I) -> Self {
        Self {
            open_ports: ports.into_iter().collect(),
            ..Self::default()
        }
    }
}

/// Manufacturer-specific data block of a BLE advertisement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManufacturerData {
    pub company_id: u16,
    pub payload: Vec<u8>,
}

/// Decoded BLE advertisement for one peripheral.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BleEvidence {
    pub local_name: Option<String>,
    pub manufacturer: Option<ManufacturerData>,
    /// 16-bit service UUIDs.
    pub service_uuids: Vec<u16>,
    pub connectable: bool,
    pub rssi: Option<i16>,
}
