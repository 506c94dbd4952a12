//! Generic host rule set.
use super::{ConfidenceModel, ConfidenceResult, Scorecard};
use crate::evidence::EvidenceBundle;

const POINTS_PER_PORT: u32 = 5;
const PORT_POINTS_CAP: u32 = 25;
const HTTP_POINTS: u32 = 10;
const SERVER_HEADER_POINTS: u32 = 5;
const SSDP_POINTS: u32 = 15;
const MDNS_POINTS: u32 = 15;
const VENDOR_POINTS: u32 = 10;
const ONVIF_POINTS: u32 = 15;

/// Scores how sure we are that a live, identifiable host sits at an address.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostModel;

impl ConfidenceModel for HostModel {
    type Evidence = EvidenceBundle;

    fn score(&self, evidence: &EvidenceBundle) -> ConfidenceResult {
        let mut card = Scorecard::default();

        let open = u32::try_from(evidence.open_ports.len()).unwrap_or(u32::MAX);
        if open > 0 {
            let points = open.saturating_mul(POINTS_PER_PORT).min(PORT_POINTS_CAP);
            card.add(points, format!("{open} open TCP port(s) (+{points})"));
        }

        if let Some(http) = &evidence.http {
            card.add_if(
                http.status.is_some(),
                HTTP_POINTS,
                "HTTP service responded",
            );
            if let Some(server) = http.server.as_deref().filter(|s| !s.trim().is_empty()) {
                card.add(SERVER_HEADER_POINTS, format!("HTTP server header: {server}"));
            }
        }

        card.add_if(evidence.ssdp.is_some(), SSDP_POINTS, "SSDP response present");

        if !evidence.services.is_empty() {
            card.add(
                MDNS_POINTS,
                format!("{} mDNS service record(s) announced", evidence.services.len()),
            );
        }

        if let Some(vendor) = evidence.vendor.as_deref().filter(|v| !v.trim().is_empty()) {
            card.add(VENDOR_POINTS, format!("Hardware vendor resolved: {vendor}"));
        }

        card.add_if(
            evidence.onvif_discovered,
            ONVIF_POINTS,
            "ONVIF discovery response observed",
        );

        card.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confidence::ConfidenceLevel;
    use crate::evidence::{HttpFingerprint, SsdpRecord};

    #[test]
    fn port_contribution_is_capped() {
        let few = HostModel.score(&EvidenceBundle::with_ports([22, 80]));
        let many = HostModel.score(&EvidenceBundle::with_ports(1..=40));
        assert_eq!(few.score, 10);
        assert_eq!(many.score, PORT_POINTS_CAP);
    }

    #[test]
    fn chatty_host_without_onvif_is_medium() {
        let evidence = EvidenceBundle {
            open_ports: [22, 80, 443, 1900, 5353].into_iter().collect(),
            http: Some(HttpFingerprint {
                status: Some(200),
                server: Some("lighttpd".to_owned()),
                ..HttpFingerprint::default()
            }),
            ssdp: Some(SsdpRecord::default()),
            vendor: Some("Raspberry Pi Trading".to_owned()),
            ..EvidenceBundle::default()
        };

        let result = HostModel.score(&evidence);

        assert_eq!(result.score, 25 + 10 + 5 + 15 + 10);
        assert_eq!(result.level, ConfidenceLevel::Medium);
        assert_eq!(result.reasons.len(), 5);
    }

    #[test]
    fn blank_vendor_is_ignored() {
        let evidence = EvidenceBundle {
            vendor: Some("   ".to_owned()),
            ..EvidenceBundle::default()
        };
        assert_eq!(HostModel.score(&evidence).score, 0);
    }
}
