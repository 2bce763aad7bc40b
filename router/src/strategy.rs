//! Pluggable policies that distinguish the routing modes. The core loop is
//! identical in all modes; what differs is how nets enter the flow, which
//! arcs the expansion may take, and what to try when a connection fails.

use crate::graph::RouteGraph;
use crate::route::RouterCore;
use fpga_common::db::design::{Design, NetType};
use fpga_common::db::device::{Device, WireKind};
use fpga_common::db::indices::{NetId, NodeId};

/// How a net enters the flow.
pub enum NetAction {
    /// Route from scratch; any existing pips are discarded.
    Route,
    /// Route, but claim the net's existing pips as a reusable prefix.
    RoutePreserved,
    /// Keep the existing routing untouched and claim its nodes.
    Preserve,
    /// Nothing to do (no sinks).
    Skip,
    /// The net makes this run invalid.
    Fail(String),
}

pub trait NetClassifier {
    fn classify(&self, design: &Design, net: NetId) -> NetAction;

    /// Extra acceptable terminals for a sink node, resolved per connection.
    fn sink_alternates(&self, _device: &Device, _sink: NodeId) -> Vec<NodeId> {
        Vec::new()
    }
}

fn fully_routed(design: &Design, net: NetId) -> bool {
    design
        .net(net)
        .sinks
        .iter()
        .all(|&p| design.pin(p).routed)
}

/// Full flow: everything is fair game, existing routing is thrown away.
pub struct FullClassifier;

impl NetClassifier for FullClassifier {
    fn classify(&self, design: &Design, net: NetId) -> NetAction {
        let data = design.net(net);
        if data.kind == NetType::Signal && data.sinks.is_empty() {
            return NetAction::Skip;
        }
        NetAction::Route
    }
}

/// Partial flow: routed nets are preserved wholesale, partially routed nets
/// keep their prefix, unrouted nets route normally.
pub struct PartialClassifier;

impl NetClassifier for PartialClassifier {
    fn classify(&self, design: &Design, net: NetId) -> NetAction {
        let data = design.net(net);
        match data.kind {
            NetType::Clock | NetType::Static => {
                if data.has_pips() {
                    NetAction::Preserve
                } else {
                    NetAction::Route
                }
            }
            NetType::Signal => {
                if data.sinks.is_empty() {
                    NetAction::Skip
                } else if !data.has_pips() {
                    NetAction::Route
                } else if fully_routed(design, net) {
                    NetAction::Preserve
                } else {
                    NetAction::RoutePreserved
                }
            }
        }
    }
}

/// ECO flow: like partial, but the clock tree and static rails must already
/// exist, and blocked sinks may be reached through unused LUTs.
pub struct EcoClassifier;

impl NetClassifier for EcoClassifier {
    fn classify(&self, design: &Design, net: NetId) -> NetAction {
        let data = design.net(net);
        match data.kind {
            NetType::Clock | NetType::Static => {
                if data.has_pips() {
                    NetAction::Preserve
                } else {
                    NetAction::Fail(
                        "clock and static nets must be routed before an ECO pass".to_string(),
                    )
                }
            }
            NetType::Signal => PartialClassifier.classify(design, net),
        }
    }

    fn sink_alternates(&self, device: &Device, sink: NodeId) -> Vec<NodeId> {
        device
            .lut_route_thrus
            .get(&sink)
            .cloned()
            .unwrap_or_default()
    }
}

/// Decides which device arcs the expansion may not take. Verdicts are baked
/// into cached child lists, so they must not depend on per-connection state.
pub trait EdgeExclusionPolicy {
    fn is_excluded(&self, graph: &RouteGraph, parent: NodeId, child: NodeId) -> bool;
}

pub struct BaseExclusion {
    /// Allow wires that head straight back into the tile they came from.
    pub use_uturn_nodes: bool,
    /// Drop arcs crossing clock distribution rows.
    pub mask_rclk: bool,
}

impl BaseExclusion {
    /// Architecture-level exclusions, independent of preservation.
    pub fn type_excluded(&self, device: &Device, parent: NodeId, child: NodeId) -> bool {
        if !self.use_uturn_nodes {
            let p = device.node(parent);
            let c = device.node(child);
            if c.kind == WireKind::Wire
                && c.length > 0
                && c.end_tile_x == p.tile_x
                && c.end_tile_y == p.tile_y
            {
                return true;
            }
        }
        if self.mask_rclk && device.crosses_rclk(parent, child) {
            return true;
        }
        false
    }
}

impl EdgeExclusionPolicy for BaseExclusion {
    fn is_excluded(&self, graph: &RouteGraph, parent: NodeId, child: NodeId) -> bool {
        if graph.preserved_by(child).is_some() {
            return true;
        }
        self.type_excluded(graph.device(), parent, child)
    }
}

/// Partial-mode exclusion: preserved nodes stay off limits unless they carry
/// a seeded back-pointer from `parent`, meaning the arc is part of the very
/// route being extended.
pub struct PartialExclusion {
    pub base: BaseExclusion,
}

impl EdgeExclusionPolicy for PartialExclusion {
    fn is_excluded(&self, graph: &RouteGraph, parent: NodeId, child: NodeId) -> bool {
        if graph.preserved_by(child).is_some() {
            let seeded = graph
                .lookup(child)
                .and_then(|r| graph.rnode(r).prev)
                .map(|p| graph.rnode(p).node == parent)
                .unwrap_or(false);
            return !seeded;
        }
        self.base.type_excluded(graph.device(), parent, child)
    }
}

/// Reacts to a connection that could not be routed this iteration. Returns
/// true when something changed and the connection is worth another pass.
pub trait UnroutableFallbackPolicy {
    fn handle(&self, core: &mut RouterCore, conn: usize, iteration: usize) -> bool;
}

/// Full-mode ladder: grow the search window, then try an alternate output
/// pin on the first failure.
pub struct EnlargeAndSwap;

impl UnroutableFallbackPolicy for EnlargeAndSwap {
    fn handle(&self, core: &mut RouterCore, conn: usize, iteration: usize) -> bool {
        let mut changed = false;
        if core.config.enlarge_bound_box {
            changed |= core.enlarge_bounding_box(conn);
        }
        if iteration == 1 {
            changed |= core.swap_output_pin(conn);
        }
        changed
    }
}

/// Partial-mode ladder: everything the full ladder does, plus releasing the
/// preserved nets that wall off the sink once congestion has had a chance.
pub struct SoftPreserveFallback {
    pub inner: EnlargeAndSwap,
}

impl UnroutableFallbackPolicy for SoftPreserveFallback {
    fn handle(&self, core: &mut RouterCore, conn: usize, iteration: usize) -> bool {
        let mut changed = self.inner.handle(core, conn, iteration);
        if iteration == 2 && core.config.soft_preserve {
            changed |= core.unpreserve_blockers(conn) > 0;
        }
        changed
    }
}
