//! Weft: bootstrap coordination for a mesh VPN overlay with erasure-coded storage.
//!
//! Each node in a weft network boots independently, with no shared memory and
//! no central coordinator. Correctness rests on every node deriving an
//! identical view of the mesh topology from a shared declarative manifest and
//! converging on the same introducer locator despite arbitrary startup order.
//!
//! # Key Components
//!
//! - [`manifest`]: typed manifest model, schema loading, consistency validation
//! - [`topology`]: pure derivation of a node's roles and peer set from a manifest
//! - [`keys`]: overlay keypair lifecycle and peer key import/verification
//! - [`bootstrap`]: the per-process coordinator state machine that sequences
//!   link readiness, locator discovery, and idempotent config regeneration
//! - [`overlay`] / [`storage`]: on-disk config generation for the external
//!   overlay and storage daemons (invoked, never reimplemented here)
//!
//! # Architecture
//!
//! The coordinator runs once per process lifetime as a single sequential
//! async task. Cross-node coordination happens only through the externally
//! synced manifest file; every read is treated as a point-in-time snapshot
//! and every write of local configuration is staged through a temp file and
//! renamed into place, so readers never observe a torn file.

pub mod bootstrap;
pub mod clock;
pub mod fsutil;
pub mod keys;
pub mod locator;
pub mod manifest;
pub mod overlay;
pub mod storage;
pub mod topology;

pub use bootstrap::{BootstrapConfig, BootstrapCoordinator, BootstrapError, BootstrapOutcome};
pub use clock::{Clock, SimulatedClock, SystemClock};
pub use locator::IntroducerLocator;
pub use manifest::{Manifest, NetworkConfig, NodeDescriptor, RedundancyPolicy, Role};
pub use topology::{HostDescriptor, Topology};
