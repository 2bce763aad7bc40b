//! Negotiated-congestion FPGA router.
//!
//! The router takes a [`Device`] resource graph and a [`Design`] netlist and
//! produces per-net pip lists. Signal nets go through iterative congestion
//! negotiation; clock and static nets are routed globally up front. Three
//! flows are supported: full (route everything from scratch), partial (keep
//! existing routing, route the rest around it) and ECO (partial plus LUT
//! route-throughs for walled-in sinks).

pub mod connection;
pub mod error;
pub mod global;
pub mod graph;
pub mod legalize;
pub mod route;
pub mod strategy;
pub mod timing;

pub use error::RouteError;
pub use route::{Router, RoutingSummary};

use fpga_common::db::design::Design;
use fpga_common::db::device::Device;
use fpga_common::util::config::Config;
use std::sync::Arc;

/// Routes `design` on `device` in place and returns run statistics.
pub fn route(
    device: Arc<Device>,
    design: &mut Design,
    config: &Config,
) -> Result<RoutingSummary, RouteError> {
    let router = Router::new(device, design, config.router.clone())?;
    router.run()
}
