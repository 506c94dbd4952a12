//! BLE peripheral rule set and advertisement decoding helpers.
use super::{ConfidenceModel, ConfidenceResult, Scorecard};
use crate::evidence::BleEvidence;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt;

const COMPANY_POINTS: u32 = 25;
const BEACON_POINTS: u32 = 30;
const CONNECTABLE_POINTS: u32 = 10;
const NAME_POINTS: u32 = 10;
const SERVICE_POINTS: u32 = 10;
const STRONG_SIGNAL_POINTS: u32 = 10;
/// RSSI at or above this counts as "nearby".
pub const STRONG_RSSI_DBM: i16 = -70;

const APPLE: u16 = 0x004C;
const EDDYSTONE_SERVICE: u16 = 0xFEAA;

/// Bluetooth SIG company identifiers for vendors commonly seen on a bench.
static COMPANY_IDS: Lazy<HashMap<u16, &'static str>> = Lazy::new(|| {
    HashMap::from([
        (0x0006, "Microsoft"),
        (0x000F, "Broadcom"),
        (0x004C, "Apple, Inc."),
        (0x0059, "Nordic Semiconductor ASA"),
        (0x0075, "Samsung Electronics Co. Ltd."),
        (0x0087, "Garmin International"),
        (0x00E0, "Google"),
        (0x0131, "Cypress Semiconductor"),
        (0x0157, "Anhui Huami Information Technology"),
        (0x02E5, "Espressif Systems"),
        (0x038F, "Xiaomi Inc."),
        (0x0499, "Ruuvi Innovations Ltd."),
    ])
});

/// Looks up the SIG-assigned vendor name for a company id.
pub fn company_name(company_id: u16) -> Option<&'static str> {
    COMPANY_IDS.get(&company_id).copied()
}

/// Recognised beacon frame formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeaconKind {
    IBeacon,
    Eddystone,
    AltBeacon,
}

impl fmt::Display for BeaconKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::IBeacon => "iBeacon",
            Self::Eddystone => "Eddystone",
            Self::AltBeacon => "AltBeacon",
        };
        f.write_str(s)
    }
}

/// Classifies an advertisement as a known beacon format, if it is one.
pub fn classify_beacon(evidence: &BleEvidence) -> Option<BeaconKind> {
    if let Some(data) = &evidence.manufacturer {
        match data.payload.as_slice() {
            [0x02, 0x15, ..] if data.company_id == APPLE => return Some(BeaconKind::IBeacon),
            [0xBE, 0xAC, ..] => return Some(BeaconKind::AltBeacon),
            _ => {}
        }
    }
    evidence
        .service_uuids
        .contains(&EDDYSTONE_SERVICE)
        .then_some(BeaconKind::Eddystone)
}

/// Scores how identifiable a BLE peripheral is.
#[derive(Debug, Clone, Copy, Default)]
pub struct BleModel;

impl ConfidenceModel for BleModel {
    type Evidence = BleEvidence;

    fn score(&self, evidence: &BleEvidence) -> ConfidenceResult {
        let mut card = Scorecard::default();

        if let Some(data) = &evidence.manufacturer {
            if let Some(name) = company_name(data.company_id) {
                card.add(
                    COMPANY_POINTS,
                    format!("Company ID 0x{:04X} decodes to {name}", data.company_id),
                );
            }
        }

        if let Some(kind) = classify_beacon(evidence) {
            card.add(BEACON_POINTS, format!("{kind} beacon pattern recognised"));
        }

        card.add_if(
            evidence.connectable,
            CONNECTABLE_POINTS,
            "Peripheral accepts connections",
        );

        if let Some(name) = evidence.local_name.as_deref().filter(|n| !n.trim().is_empty()) {
            card.add(NAME_POINTS, format!("Advertises local name \"{name}\""));
        }

        if !evidence.service_uuids.is_empty() {
            card.add(
                SERVICE_POINTS,
                format!("{} service UUID(s) advertised", evidence.service_uuids.len()),
            );
        }

        card.add_if(
            evidence.rssi.is_some_and(|rssi| rssi >= STRONG_RSSI_DBM),
            STRONG_SIGNAL_POINTS,
            "Strong signal, peripheral is nearby",
        );

        card.finish()
    }
}
