//! This crate exposes the discovery fusion and fleet lifecycle engine behind
//! the `fleetscout` command line tool.
//!
//! Collectors elsewhere gather raw evidence (open ports, HTTP banners, SSDP
//! and mDNS announcements, ONVIF replies, BLE advertisements). This crate
//! turns that evidence into fleet state an operator can act on:
//!
//! 1. **Confidence**: [`confidence`] scores evidence into an explainable
//!    low / medium / high verdict with one reason per rule.
//! 2. **Identity**: [`identity`] maps the many handles of one device onto the
//!    label the operator gave it.
//! 3. **Probing**: [`prober`] validates RTSP stream paths with a bounded
//!    number of attempts in flight, honouring a global safe-mode switch.
//! 4. **Fleet state**: [`registry`] holds claimed and observed nodes overlaid
//!    with live presence, and [`flash`] follows one freshly flashed device
//!    until it shows up online.
//!
//! Every component is a plain value owned by the caller. Nothing here keeps
//! global state.
//!
//! ## Basic Usage Example
//!
//! ```rust
//! use fleetscout::confidence::{ConfidenceLevel, ConfidenceModel, DeviceModel};
//! use fleetscout::evidence::EvidenceBundle;
//! use fleetscout::identity::{IdentityKeys, IdentityResolver, MemoryAliasStore};
//!
//! let mut evidence = EvidenceBundle::with_ports([80, 554, 3702]);
//! evidence.onvif_discovered = true;
//! let verdict = DeviceModel.score(&evidence);
//! assert_eq!(verdict.level, ConfidenceLevel::High);
//!
//! let resolver = IdentityResolver::new(MemoryAliasStore::from_pairs([(
//!     "aa:bb:cc:dd:ee:ff",
//!     "Porch camera",
//! )]));
//! let keys = IdentityKeys::for_host(
//!     Some("AA-BB-CC-DD-EE-FF"),
//!     Some("192.168.1.20"),
//!     None,
//!     None,
//! );
//! assert_eq!(
//!     resolver.resolve_or(keys.as_slice(), "192.168.1.20"),
//!     "Porch camera"
//! );
//! ```
//!
//! ## Error Handling
//!
//! Discovery outcomes are data, not errors: a failed probe attempt is
//! recorded in its [`prober::ProbeAttempt`], a safe-mode refusal is a
//! [`prober::ProbeOutcome`], and an invalid lifecycle step returns `false`.
//! Only I/O at the edges (alias files, the config file, name resolution)
//! returns [`error::Error`].
#![doc(html_root_url = "https://docs.rs/fleetscout/0.3.0")]

pub mod error;

pub mod evidence;

pub mod confidence;

pub mod identity;

pub mod prober;

pub mod registry;

pub mod flash;

pub mod target;

pub mod input;
