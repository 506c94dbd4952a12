//! Camera / NVR rule set.
use super::{mentions_any, ConfidenceModel, ConfidenceResult, Scorecard};
use crate::evidence::EvidenceBundle;
use itertools::Itertools;

/// Port weights for camera-typical services.
pub const CAMERA_PORT_WEIGHTS: &[(u16, u32)] = &[
    (554, 30),   // RTSP
    (8554, 15),  // Alt RTSP
    (3702, 20),  // WS-Discovery
    (2020, 20),  // ONVIF (Tapo)
    (37777, 15), // Dahua
    (80, 10),    // HTTP
    (443, 10),   // HTTPS
    (8000, 10),  // NVR
    (8080, 5),   // Alt HTTP
    (8443, 5),   // Alt HTTPS
];

const ONVIF_POINTS: u32 = 40;
const ONVIF_ENDPOINT_POINTS: u32 = 10;
const SSDP_POINTS: u32 = 20;
const SSDP_CAMERA_TYPE_POINTS: u32 = 10;
const MDNS_CAMERA_POINTS: u32 = 20;
const HTTP_TITLE_POINTS: u32 = 10;
const HTTP_AUTH_POINTS: u32 = 5;
const VENDOR_POINTS: u32 = 10;

const CAMERA_WORDS: &[&str] = &[
    "camera", "ipcam", "nvr", "dvr", "webcam", "network video", "surveillance",
];

const CAMERA_SERVICE_TYPES: &[&str] = &[
    "_rtsp._tcp",
    "_onvif._tcp",
    "_axis-video._tcp",
    "_camera._tcp",
    "_nvr._tcp",
];

const SSDP_CAMERA_TYPES: &[&str] = &["camera", "nvr", "mediaserver", "digitalsecuritycamera"];

const CAMERA_VENDORS: &[&str] = &[
    "tp-link", "tplink", "hikvision", "dahua", "axis", "reolink", "amcrest", "uniview", "google",
    "wyze", "hanwha", "foscam",
];

/// Scores how likely a host is to be an IP camera or recorder.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceModel;

impl ConfidenceModel for DeviceModel {
    type Evidence = EvidenceBundle;

    fn score(&self, evidence: &EvidenceBundle) -> ConfidenceResult {
        let mut card = Scorecard::default();

        let matched = evidence
            .open_ports
            .iter()
            .filter_map(|port| {
                CAMERA_PORT_WEIGHTS
                    .iter()
                    .find(|(p, _)| p == port)
                    .copied()
            })
            .collect::<Vec<_>>();
        if !matched.is_empty() {
            let points = matched.iter().map(|(_, w)| w).sum::<u32>();
            let ports = matched.iter().map(|(p, _)| p).join(", ");
            card.add(
                points,
                format!("Open ports {ports} match camera services (+{points})"),
            );
        }

        card.add_if(
            evidence.onvif_discovered,
            ONVIF_POINTS,
            "ONVIF discovery response observed",
        );
        card.add_if(
            !evidence.onvif_endpoints.is_empty(),
            ONVIF_ENDPOINT_POINTS,
            "ONVIF device service endpoint advertised",
        );

        if let Some(ssdp) = &evidence.ssdp {
            card.add(SSDP_POINTS, "SSDP response present");
            let camera_type = ssdp
                .service_type
                .as_deref()
                .is_some_and(|t| mentions_any(t, SSDP_CAMERA_TYPES));
            card.add_if(
                camera_type,
                SSDP_CAMERA_TYPE_POINTS,
                "SSDP device type names a camera or media server",
            );
        }

        let camera_service = evidence
            .services
            .iter()
            .find(|s| CAMERA_SERVICE_TYPES.contains(&s.service_type.as_str()));
        if let Some(service) = camera_service {
            card.add(
                MDNS_CAMERA_POINTS,
                format!("mDNS announces {} ({})", service.service_type, service.name),
            );
        }

        if let Some(http) = &evidence.http {
            let camera_title = http
                .title
                .as_deref()
                .is_some_and(|t| mentions_any(t, CAMERA_WORDS));
            card.add_if(
                camera_title,
                HTTP_TITLE_POINTS,
                "HTTP title suggests camera/NVR vocabulary",
            );
            card.add_if(
                http.auth_challenge,
                HTTP_AUTH_POINTS,
                "HTTP endpoint requests authentication",
            );
        }

        if let Some(vendor) = evidence.vendor.as_deref() {
            if mentions_any(vendor, CAMERA_VENDORS) {
                card.add(
                    VENDOR_POINTS,
                    format!("Hardware vendor {vendor} ships cameras"),
                );
            }
        }

        card.finish()
    }
}
