//! The negotiated-congestion core. Connections are routed one at a time by a
//! best-first search over the lazily materialized resource graph; oversubscribed
//! nodes get progressively more expensive across iterations until every net
//! owns its resources outright.

use crate::connection::{BoundingBox, Connection, NetWrapper};
use crate::error::RouteError;
use crate::global::{BfsGlobalRouter, GlobalRouter};
use crate::graph::RouteGraph;
use crate::graph::node::CAPACITY;
use crate::legalize;
use crate::strategy::{
    BaseExclusion, EcoClassifier, EdgeExclusionPolicy, EnlargeAndSwap, FullClassifier, NetAction,
    NetClassifier, PartialClassifier, PartialExclusion, SoftPreserveFallback,
    UnroutableFallbackPolicy,
};
use crate::timing::{EstimatedTiming, TimingOracle};
use fpga_common::db::design::{Design, NetType, Pip};
use fpga_common::db::device::{Device, WireKind};
use fpga_common::db::indices::{NetId, NodeId, PinId, RnodeId};
use fpga_common::util::config::{RouterConfig, RoutingMode};
use fpga_common::util::profiler::ScopedTimer;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::collections::BinaryHeap;
use std::sync::Arc;

/// Expansion budget when probing for a dedicated same-tile path.
const DIRECT_SEARCH_BUDGET: usize = 64;

#[derive(Copy, Clone, PartialEq)]
struct State {
    total: f32,
    partial: f32,
    rnode: RnodeId,
}

impl Eq for State {}

impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .total
            .total_cmp(&self.total)
            .then_with(|| other.partial.total_cmp(&self.partial))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Default, Clone)]
pub struct RoutingSummary {
    pub iterations: usize,
    pub routed_connections: usize,
    pub failed_connections: usize,
    pub nodes_created: usize,
    pub nodes_pushed: u64,
    pub nodes_popped: u64,
    pub wirelength: u64,
}

struct DirectConnection {
    net: NetId,
    sink_pin: PinId,
    path: Vec<NodeId>,
}

/// Mode-independent router state. The strategy objects in [`Router`] call
/// back into this; everything here behaves identically in all modes.
pub struct RouterCore<'d> {
    pub config: RouterConfig,
    pub device: Arc<Device>,
    pub design: &'d mut Design,
    pub graph: RouteGraph,
    pub nets: Vec<NetWrapper>,
    pub connections: Vec<Connection>,
    pub present_factor: f32,
    sorted: Vec<usize>,
    direct: Vec<DirectConnection>,
    clock_nets: Vec<NetId>,
    static_nets: Vec<NetId>,
    seeded_nets: Vec<NetId>,
    queue: BinaryHeap<State>,
    reroute_criticality: f32,
    stats: RoutingSummary,
    // Derived cost weights.
    rnode_cost_weight: f32,
    rnode_wl_weight: f32,
    est_wl_weight: f32,
    dly_weight: f32,
    est_dly_weight: f32,
}

pub struct Router<'d> {
    core: RouterCore<'d>,
    classifier: Box<dyn NetClassifier>,
    exclusion: Box<dyn EdgeExclusionPolicy>,
    fallback: Box<dyn UnroutableFallbackPolicy>,
    global: Box<dyn GlobalRouter>,
    timing: Option<Box<dyn TimingOracle>>,
}

impl<'d> Router<'d> {
    pub fn new(
        device: Arc<Device>,
        design: &'d mut Design,
        config: RouterConfig,
    ) -> Result<Self, RouteError> {
        validate_config(&config)?;

        let (classifier, exclusion, fallback): (
            Box<dyn NetClassifier>,
            Box<dyn EdgeExclusionPolicy>,
            Box<dyn UnroutableFallbackPolicy>,
        ) = match config.mode {
            RoutingMode::Full => (
                Box::new(FullClassifier),
                Box::new(BaseExclusion {
                    use_uturn_nodes: config.use_uturn_nodes,
                    mask_rclk: config.mask_nodes_cross_rclk,
                }),
                Box::new(EnlargeAndSwap),
            ),
            RoutingMode::Partial => (
                Box::new(PartialClassifier),
                Box::new(PartialExclusion {
                    base: BaseExclusion {
                        use_uturn_nodes: config.use_uturn_nodes,
                        mask_rclk: config.mask_nodes_cross_rclk,
                    },
                }),
                Box::new(SoftPreserveFallback {
                    inner: EnlargeAndSwap,
                }),
            ),
            RoutingMode::Eco => (
                Box::new(EcoClassifier),
                Box::new(PartialExclusion {
                    base: BaseExclusion {
                        use_uturn_nodes: config.use_uturn_nodes,
                        mask_rclk: config.mask_nodes_cross_rclk,
                    },
                }),
                Box::new(SoftPreserveFallback {
                    inner: EnlargeAndSwap,
                }),
            ),
        };

        let timing: Option<Box<dyn TimingOracle>> = if config.timing_driven {
            Some(Box::new(EstimatedTiming))
        } else {
            None
        };

        let cost_weight = if config.timing_driven {
            1.0 - config.timing_weight
        } else {
            1.0
        };
        let core = RouterCore {
            present_factor: config.initial_present_congestion_factor,
            rnode_cost_weight: cost_weight,
            rnode_wl_weight: cost_weight * (1.0 - config.wirelength_weight),
            est_wl_weight: cost_weight * config.wirelength_weight,
            dly_weight: config.timing_weight * (1.0 - config.wirelength_weight) / 100.0,
            est_dly_weight: config.timing_weight * config.wirelength_weight,
            graph: RouteGraph::new(Arc::clone(&device)),
            device,
            design,
            config,
            nets: Vec::new(),
            connections: Vec::new(),
            sorted: Vec::new(),
            direct: Vec::new(),
            clock_nets: Vec::new(),
            static_nets: Vec::new(),
            seeded_nets: Vec::new(),
            queue: BinaryHeap::new(),
            reroute_criticality: f32::MAX,
            stats: RoutingSummary::default(),
        };

        Ok(Self {
            core,
            classifier,
            exclusion,
            fallback,
            global: Box::new(BfsGlobalRouter),
            timing,
        })
    }

    pub fn run(mut self) -> Result<RoutingSummary, RouteError> {
        let timer = ScopedTimer::new("routing");
        self.initialize()?;
        self.route_global_nets()?;
        self.route_indirect_connections()?;
        self.finalize()?;
        log::info!(
            "Routed {} connections ({} direct) in {} iterations, wirelength {}.",
            self.core.stats.routed_connections,
            self.core.direct.len(),
            self.core.stats.iterations,
            self.core.stats.wirelength
        );
        drop(timer);
        Ok(self.core.stats)
    }

    /// Classifies every net, kicks off preservation, and builds the
    /// connection list for the negotiation loop.
    fn initialize(&mut self) -> Result<(), RouteError> {
        let _t = ScopedTimer::new("initialization");
        let mut signal_nets: Vec<NetId> = Vec::new();

        for net in self.core.design.net_ids() {
            match self.classifier.classify(self.core.design, net) {
                NetAction::Fail(reason) => {
                    return Err(RouteError::GlobalNet {
                        net: self.core.design.net(net).name.clone(),
                        reason,
                    });
                }
                NetAction::Skip => {}
                NetAction::Preserve => {
                    let nodes = self.core.design.routing_nodes(net);
                    self.core.graph.async_preserve(net, nodes);
                }
                NetAction::Route => {
                    if self.core.config.mode == RoutingMode::Full {
                        // Stale routing from the checkpoint is discarded.
                        self.core.design.net_mut(net).pips.clear();
                        let sinks = self.core.design.net(net).sinks.clone();
                        for pin in sinks {
                            self.core.design.pin_mut(pin).routed = false;
                        }
                    }
                    match self.core.design.net(net).kind {
                        NetType::Clock => self.core.clock_nets.push(net),
                        NetType::Static => self.core.static_nets.push(net),
                        NetType::Signal => signal_nets.push(net),
                    }
                }
                NetAction::RoutePreserved => {
                    let nodes = self.core.design.routing_nodes(net);
                    self.core.graph.async_preserve(net, nodes);
                    self.core.seeded_nets.push(net);
                    signal_nets.push(net);
                }
            }
        }
        self.core.graph.await_preserve();

        for net in signal_nets {
            self.admit_signal_net(net)?;
        }

        // Partially routed nets reuse their surviving prefix: back-pointers
        // are seeded from the checkpoint pips, and sinks whose paths are
        // intact come up already routed.
        let seeded = std::mem::take(&mut self.core.seeded_nets);
        for net in &seeded {
            self.core.seed_existing_routing(*net);
        }
        self.core.seeded_nets = seeded;

        self.core.sort_connections();
        log::info!(
            "Prepared {} indirect connections across {} nets.",
            self.core.sorted.len(),
            self.core.nets.len()
        );
        Ok(())
    }

    fn admit_signal_net(&mut self, net: NetId) -> Result<(), RouteError> {
        let device = Arc::clone(&self.core.device);
        let classifier = &*self.classifier;
        self.core
            .admit_net(net, &|sink| classifier.sink_alternates(&device, sink))
    }

    fn route_global_nets(&mut self) -> Result<(), RouteError> {
        if self.core.clock_nets.is_empty() && self.core.static_nets.is_empty() {
            return Ok(());
        }
        let _t = ScopedTimer::new("global nets");
        let nets: Vec<NetId> = self
            .core
            .clock_nets
            .iter()
            .chain(self.core.static_nets.iter())
            .copied()
            .collect();
        for net in nets {
            let pips =
                self.global
                    .route(&self.core.device, &self.core.graph, self.core.design, net)?;
            self.core.design.net_mut(net).pips = pips;
            let sinks = self.core.design.net(net).sinks.clone();
            for pin in sinks {
                self.core.design.pin_mut(pin).routed = true;
            }
            // Claimed immediately so later global nets and the signal search
            // stay off these resources.
            for node in self.core.design.routing_nodes(net) {
                if let Some(owner) = self.core.graph.preserve(node, net) {
                    log::warn!(
                        "Global net {:?} lost node '{}' to net {:?}.",
                        net,
                        self.core.device.node(node).name,
                        owner
                    );
                }
            }
            log::info!(
                "Routed global net '{}' ({} pips).",
                self.core.design.net(net).name,
                self.core.design.net(net).pips.len()
            );
        }
        Ok(())
    }

    fn route_indirect_connections(&mut self) -> Result<(), RouteError> {
        let _t = ScopedTimer::new("connection routing");
        let mut converged = false;

        for iteration in 1..=self.core.config.max_iterations {
            self.core.stats.iterations = iteration;
            let rerouted = self.route_iteration(iteration);

            let unrouted = self
                .core
                .sorted
                .iter()
                .filter(|&&i| !self.core.connections[i].routed)
                .count();
            let overused = self.core.count_overused();
            log::info!(
                "Iter {:3} | Rerouted {:5} | Unrouted {:4} | Overused {:5} | Nodes {:7} | pcf {:.2}",
                iteration,
                rerouted,
                unrouted,
                overused,
                self.core.graph.len(),
                self.core.present_factor
            );

            if unrouted == 0 && overused == 0 {
                converged = true;
                break;
            }
            self.core.update_cost_factors();
        }

        self.core.stats.routed_connections = self
            .core
            .sorted
            .iter()
            .filter(|&&i| self.core.connections[i].routed)
            .count()
            + self.core.direct.len();
        self.core.stats.failed_connections =
            self.core.sorted.len() - (self.core.stats.routed_connections - self.core.direct.len());

        if converged {
            return Ok(());
        }
        self.core.log_congestion_diagnostics();
        if let Some(&idx) = self
            .core
            .sorted
            .iter()
            .find(|&&i| !self.core.connections[i].routed)
        {
            let conn = &self.core.connections[idx];
            return Err(RouteError::Unroutable {
                net: self.core.design.net(conn.net_id).name.clone(),
                sink: self.core.design.pin(conn.sink_pin).name.clone(),
                iterations: self.core.stats.iterations,
            });
        }
        Err(RouteError::NoConvergence(self.core.config.max_iterations))
    }

    /// One full sweep: re-routes every connection that needs work and runs
    /// the fallback ladder on failures. Returns the number attempted.
    fn route_iteration(&mut self, iteration: usize) -> usize {
        if let Some(oracle) = &mut self.timing {
            oracle.update_criticality(
                &mut self.core.connections,
                self.core.config.criticality_exponent,
            );
        }
        self.core.set_reroute_criticality();

        let order = self.core.sorted.clone();
        let mut rerouted = 0usize;
        for idx in order {
            if !self.core.should_route(idx) {
                continue;
            }
            rerouted += 1;
            self.core.rip_up(idx);
            if !self.route_connection(idx) {
                self.fallback.handle(&mut self.core, idx, iteration);
            }
        }
        rerouted
    }

    /// One best-first search. Termination is by target pop: pushing a target
    /// clears the queue, so the next pop must be a terminal.
    fn route_connection(&mut self, idx: usize) -> bool {
        self.core.prepare_route_connection(idx);

        let mut found = None;
        while let Some(state) = self.core.queue.pop() {
            self.core.stats.nodes_popped += 1;
            if self.core.graph.rnode(state.rnode).is_target {
                found = Some(state.rnode);
                break;
            }
            self.explore_and_expand(idx, state);
        }

        if let Some(terminal) = found {
            self.core.save_routing(idx, terminal);
            self.core.update_users_of(idx);
        }
        self.core.graph.reset_expansion();
        self.core.queue.clear();
        found.is_some()
    }

    fn explore_and_expand(&mut self, idx: usize, state: State) {
        let parent = state.rnode;
        self.core.graph.ensure_children(parent, self.exclusion.as_ref());

        for i in 0..self.core.graph.children_len(parent) {
            let child = self.core.graph.child(parent, i);
            let c = self.core.graph.rnode(child);
            if c.visited {
                // Visited nodes are never re-keyed, even if this path is
                // cheaper; the forfeited optimality buys a leaner queue.
                continue;
            }
            if !c.is_target {
                let conn = &self.core.connections[idx];
                match c.kind {
                    // Another sink's feed; only a target may be entered.
                    WireKind::PinfeedIn => continue,
                    // Long lines are for SLR crossings only.
                    WireKind::SuperLongLine if !conn.cross_slr => continue,
                    _ => {}
                }
                if self.core.config.use_bounding_box && !conn.bbox.contains(c.tile_x, c.tile_y) {
                    continue;
                }
            }
            self.core.evaluate_cost_and_push(idx, state, child);
        }
    }

    fn finalize(&mut self) -> Result<(), RouteError> {
        let _t = ScopedTimer::new("finalization");
        legalize::fix_routes(&mut self.core);
        self.core.assign_routing_to_design();
        self.core.stats.nodes_created = self.core.graph.len();

        let conflicts = self.core.count_overused();
        if conflicts > 0 {
            log::warn!("{} nodes remain claimed by more than one net.", conflicts);
            if self.core.config.strict {
                return Err(RouteError::PipConflict { count: conflicts });
            }
        }
        Ok(())
    }
}

impl<'d> RouterCore<'d> {
    /// Registers a signal net for negotiation: builds its wrapper, resolves
    /// dedicated paths, and creates one connection per remaining sink.
    pub fn admit_net(
        &mut self,
        net: NetId,
        sink_alternates: &dyn Fn(NodeId) -> Vec<NodeId>,
    ) -> Result<(), RouteError> {
        let data = self.design.net(net);
        let name = data.name.clone();
        let source_pin = data.source.ok_or(RouteError::MissingSource { net: name })?;
        let source_node = self.design.pin(source_pin).node;
        let sinks = data.sinks.clone();

        let src = self.device.node(source_node);
        let (mut min_x, mut max_x) = (src.end_tile_x, src.end_tile_x);
        let (mut min_y, mut max_y) = (src.end_tile_y, src.end_tile_y);
        let (mut sum_x, mut sum_y) = (src.end_tile_x as f32, src.end_tile_y as f32);
        let mut count = 1.0f32;

        let w = self.nets.len();
        let source_rnode = self.graph.get_or_create(source_node);
        self.nets.push(NetWrapper {
            net,
            source_rnode,
            connections: Vec::new(),
            x_center: 0.0,
            y_center: 0.0,
            double_hpwl: 1.0,
        });

        for sink_pin in sinks {
            let sink_node = self.design.pin(sink_pin).node;
            let snk = self.device.node(sink_node);

            // Same-tile sinks ride dedicated resources outside negotiation.
            if (snk.tile_x, snk.tile_y) == (src.tile_x, src.tile_y) {
                if let Some(path) =
                    self.device
                        .find_path(source_node, sink_node, DIRECT_SEARCH_BUDGET)
                {
                    for &n in &path {
                        if let Some(owner) = self.graph.preserve(n, net) {
                            log::warn!(
                                "Direct path of net '{}' crosses node '{}' held by net {:?}.",
                                self.design.net(net).name,
                                self.device.node(n).name,
                                owner
                            );
                        }
                    }
                    self.direct.push(DirectConnection {
                        net,
                        sink_pin,
                        path,
                    });
                    continue;
                }
            }

            sum_x += snk.end_tile_x as f32;
            sum_y += snk.end_tile_y as f32;
            count += 1.0;
            min_x = min_x.min(snk.end_tile_x);
            max_x = max_x.max(snk.end_tile_x);
            min_y = min_y.min(snk.end_tile_y);
            max_y = max_y.max(snk.end_tile_y);

            let sink_rnode = self.graph.get_or_create(sink_node);
            let alt_sink_nodes: Vec<_> = sink_alternates(sink_node)
                .into_iter()
                .filter(|&alt| {
                    self.graph
                        .preserved_by(alt)
                        .is_none_or(|owner| owner == net)
                })
                .collect();
            let alt_sink_rnodes: Vec<RnodeId> = alt_sink_nodes
                .into_iter()
                .map(|alt| self.graph.get_or_create(alt))
                .collect();

            let hpwl = (snk.end_tile_x - src.end_tile_x).unsigned_abs()
                + (snk.end_tile_y - src.end_tile_y).unsigned_abs();
            let bbox = BoundingBox::of_span(
                src.end_tile_x,
                src.end_tile_y,
                snk.end_tile_x,
                snk.end_tile_y,
                self.config.bound_box_extension_x,
                self.config.bound_box_extension_y,
                self.device.width as i16,
                self.device.height as i16,
            );

            let idx = self.connections.len();
            self.connections.push(Connection {
                net: w,
                net_id: net,
                sink_pin,
                source_rnode,
                sink_rnode,
                alt_sink_rnodes,
                sink_x: snk.end_tile_x,
                sink_y: snk.end_tile_y,
                sink_slr: snk.slr,
                cross_slr: snk.slr != src.slr,
                hpwl,
                bbox,
                criticality: 0.0,
                rnodes: Vec::new(),
                routed: false,
            });
            self.nets[w].connections.push(idx);
            self.sorted.push(idx);
        }

        let hpwl_span = (max_x - min_x + 1) as f32 + (max_y - min_y + 1) as f32;
        self.nets[w].x_center = sum_x / count;
        self.nets[w].y_center = sum_y / count;
        self.nets[w].double_hpwl = (2.0 * hpwl_span).max(1.0);
        Ok(())
    }

    /// Seeds checkpoint routing of a partially routed net into the graph and
    /// recovers the connections whose paths survived intact.
    fn seed_existing_routing(&mut self, net: NetId) {
        let pips = std::mem::take(&mut self.design.net_mut(net).pips);
        for pip in &pips {
            let start = self.graph.get_or_create(pip.start);
            let end = self.graph.get_or_create(pip.end);
            self.graph.set_seed_prev(end, Some(start));
        }

        let Some(w) = self.nets.iter().position(|n| n.net == net) else {
            return;
        };
        for k in 0..self.nets[w].connections.len() {
            let idx = self.nets[w].connections[k];
            if !self.design.pin(self.connections[idx].sink_pin).routed {
                continue;
            }
            self.finish_route_connection(idx);
            if !self.connections[idx].routed {
                let pin = self.connections[idx].sink_pin;
                log::warn!(
                    "Checkpoint path of sink '{}' is broken; rerouting.",
                    self.design.pin(pin).name
                );
                self.design.pin_mut(pin).routed = false;
            }
        }
    }

    /// Walks seeded back-pointers from the sink toward the source. On a full
    /// walk the connection is adopted as routed and its usage committed.
    fn finish_route_connection(&mut self, idx: usize) {
        let sink = self.connections[idx].sink_rnode;
        let source = self.connections[idx].source_rnode;
        let mut path = vec![sink];
        let mut cur = sink;
        while cur != source {
            match self.graph.rnode(cur).prev {
                Some(p) if path.len() <= self.graph.len() => {
                    path.push(p);
                    cur = p;
                }
                _ => return,
            }
        }
        self.connections[idx].rnodes = path;
        self.connections[idx].routed = true;
        self.update_users_of(idx);
    }

    /// Fanout-heavy nets first, short connections within them; ties resolve
    /// by index so runs are reproducible.
    fn sort_connections(&mut self) {
        let conns = &self.connections;
        let nets = &self.nets;
        self.sorted.sort_by(|&a, &b| {
            let fa = nets[conns[a].net].fanout();
            let fb = nets[conns[b].net].fanout();
            fb.cmp(&fa)
                .then(conns[a].hpwl.cmp(&conns[b].hpwl))
                .then(a.cmp(&b))
        });
    }

    fn should_route(&self, idx: usize) -> bool {
        let conn = &self.connections[idx];
        if !conn.routed {
            return true;
        }
        if conn
            .rnodes
            .iter()
            .any(|&r| self.graph.rnode(r).is_overused())
        {
            return true;
        }
        self.config.timing_driven && conn.criticality > self.reroute_criticality
    }

    /// Caps how much of the design a timing-driven pass may churn: at most
    /// `reroute_percentage` percent of connections qualify by criticality.
    fn set_reroute_criticality(&mut self) {
        if !self.config.timing_driven {
            self.reroute_criticality = f32::MAX;
            return;
        }
        let floor = self.config.min_reroute_criticality;
        let budget =
            (self.sorted.len() as f32 * self.config.reroute_percentage / 100.0).ceil() as usize;
        let mut hot: Vec<f32> = self
            .connections
            .iter()
            .map(|c| c.criticality)
            .filter(|&c| c > floor)
            .collect();
        if hot.len() <= budget.max(1) {
            self.reroute_criticality = floor;
        } else {
            hot.sort_by(|a, b| b.total_cmp(a));
            self.reroute_criticality = hot[budget.max(1) - 1];
        }
    }

    fn rip_up(&mut self, idx: usize) {
        let net = self.connections[idx].net_id;
        let path = std::mem::take(&mut self.connections[idx].rnodes);
        let pcf = self.present_factor;
        for r in path {
            let n = self.graph.rnode_mut(r);
            n.decrement_user(net);
            n.update_present_congestion_cost(pcf);
        }
        self.connections[idx].routed = false;
    }

    fn update_users_of(&mut self, idx: usize) {
        let net = self.connections[idx].net_id;
        let path = self.connections[idx].rnodes.clone();
        let pcf = self.present_factor;
        for r in path {
            let n = self.graph.rnode_mut(r);
            n.increment_user(net);
            n.update_present_congestion_cost(pcf);
        }
    }

    /// Sets up targets and the starting frontier for one search: the sink
    /// (plus alternates), any surviving tail of this connection's previous
    /// path, the source, and the routed trunks of sibling connections.
    fn prepare_route_connection(&mut self, idx: usize) {
        let sink = self.connections[idx].sink_rnode;
        let source = self.connections[idx].source_rnode;

        self.graph.set_target(sink);
        for i in 0..self.connections[idx].alt_sink_rnodes.len() {
            let alt = self.connections[idx].alt_sink_rnodes[i];
            self.graph.set_target(alt);
        }
        // Seeded back-pointers upstream of the sink mean a checkpoint path
        // still ends here; reaching any node of it completes the route.
        let mut cur = sink;
        let mut guard = 0usize;
        while let Some(p) = self.graph.rnode(cur).prev {
            guard += 1;
            if guard > self.graph.len() || p == source || self.graph.rnode(p).is_overused() {
                break;
            }
            self.graph.set_target(p);
            cur = p;
        }

        // Routed siblings seed the frontier up to their first congested
        // node, so a net's connections converge on one trunk.
        let w = self.connections[idx].net;
        for k in 0..self.nets[w].connections.len() {
            let sibling = self.nets[w].connections[k];
            if sibling == idx || !self.connections[sibling].routed {
                continue;
            }
            let len = self.connections[sibling].rnodes.len();
            for t in (0..len).rev() {
                let r = self.connections[sibling].rnodes[t];
                if self.graph.rnode(r).is_overused() {
                    break;
                }
                if self.graph.rnode(r).visited {
                    continue;
                }
                let prev = if t + 1 < len {
                    Some(self.connections[sibling].rnodes[t + 1])
                } else {
                    None
                };
                self.push(idx, r, prev, 0.0);
            }
        }

        if !self.graph.rnode(source).visited {
            self.push(idx, source, None, 0.0);
        }
    }

    fn evaluate_cost_and_push(&mut self, idx: usize, state: State, child: RnodeId) {
        let conn = &self.connections[idx];
        let wrapper = &self.nets[conn.net];
        let c = self.graph.rnode(child);

        let count = c.count_connections_of_user(conn.net_id);
        let mut sharing = 1.0 + count as f32;
        if self.config.timing_driven {
            sharing = sharing.powf(self.config.share_exponent);
        }

        // A net already using the node does not add occupancy, so it sees
        // one less step of present congestion.
        let present = if count > 0 {
            1.0 + (c.occupancy() - CAPACITY).max(0) as f32 * self.present_factor
        } else {
            c.present_congestion_cost
        };

        let mut node_cost = c.base_cost * c.historical_congestion_cost * present / sharing;
        if !c.is_target {
            node_cost += c.base_cost / wrapper.fanout().max(1) as f32
                * ((c.end_tile_x as f32 - wrapper.x_center).abs()
                    + (c.end_tile_y as f32 - wrapper.y_center).abs())
                / wrapper.double_hpwl;
        }

        let mut partial = state.partial
            + self.rnode_cost_weight * node_cost
            + self.rnode_wl_weight * c.length as f32 / sharing;
        if self.config.timing_driven {
            partial += self.dly_weight * conn.criticality * c.delay;
        }

        let dx = (c.end_tile_x - conn.sink_x).abs() as f32;
        let mut dy = (c.end_tile_y - conn.sink_y).abs() as f32;
        if c.slr != conn.sink_slr {
            // The remaining path must ride a long line across each SLR gap.
            let hops = (c.slr as i16 - conn.sink_slr as i16).unsigned_abs() as f32;
            dy = dy.max(hops * self.device.sll_length as f32);
        }
        let mut total = partial + self.est_wl_weight * (dx + dy) / sharing;
        if self.config.timing_driven {
            total += self.est_dly_weight * conn.criticality * (0.32 * dx + 0.16 * dy);
        }

        self.push_state(child, Some(state.rnode), partial, total);
    }

    fn push(&mut self, idx: usize, rnode: RnodeId, prev: Option<RnodeId>, partial: f32) {
        let conn = &self.connections[idx];
        let r = self.graph.rnode(rnode);
        let dx = (r.end_tile_x - conn.sink_x).abs() as f32;
        let dy = (r.end_tile_y - conn.sink_y).abs() as f32;
        let total = partial + self.est_wl_weight * (dx + dy);
        self.push_state(rnode, prev, partial, total);
    }

    fn push_state(&mut self, rnode: RnodeId, prev: Option<RnodeId>, partial: f32, total: f32) {
        self.graph.visit(rnode, prev, partial, total);
        if self.graph.rnode(rnode).is_target {
            // Nothing left in the queue can beat a reached target.
            self.queue.clear();
        }
        self.queue.push(State {
            total,
            partial,
            rnode,
        });
        self.stats.nodes_pushed += 1;
    }

    /// Records the found path. `terminal` is either the sink itself (or an
    /// alternate), or an intermediate target on a seeded checkpoint path;
    /// in the latter case the walk starts at the sink and runs through it.
    fn save_routing(&mut self, idx: usize, terminal: RnodeId) {
        let conn = &self.connections[idx];
        let start = if conn.is_terminal(terminal) {
            terminal
        } else {
            conn.sink_rnode
        };
        let source = conn.source_rnode;

        let mut path = vec![start];
        let mut cur = start;
        while cur != source && path.len() <= self.graph.len() {
            match self.graph.rnode(cur).prev {
                Some(p) => {
                    path.push(p);
                    cur = p;
                }
                None => break,
            }
        }
        let complete = cur == source;
        if !complete {
            log::error!(
                "Back-pointer walk from {:?} did not reach the source of net {:?}.",
                start,
                conn.net_id
            );
        }
        let conn = &mut self.connections[idx];
        conn.rnodes = path;
        conn.routed = complete;
    }

    fn count_overused(&self) -> usize {
        (0..self.graph.len())
            .filter(|&i| self.graph.rnode(RnodeId::new(i)).is_overused())
            .count()
    }

    /// Escalates congestion pricing for the next iteration: the present
    /// factor grows geometrically, and overused nodes bank historical cost.
    fn update_cost_factors(&mut self) {
        self.present_factor *= self.config.present_congestion_multiplier;
        let pcf = self.present_factor;
        let hcf = self.config.historical_congestion_factor;
        for i in 0..self.graph.len() {
            let n = self.graph.rnode_mut(RnodeId::new(i));
            let overuse = n.overuse();
            if overuse == 0 {
                n.present_congestion_cost = 1.0 + pcf;
            } else if overuse > 0 {
                n.present_congestion_cost = 1.0 + (overuse + 1) as f32 * pcf;
                n.historical_congestion_cost += overuse as f32 * hcf;
            }
        }
    }

    /// Moves the net's source to an alternate output pin of the same site.
    /// The whole net swaps; routed siblings are ripped so they re-route from
    /// the new pin.
    pub fn swap_output_pin(&mut self, idx: usize) -> bool {
        let w = self.connections[idx].net;
        let net = self.nets[w].net;
        let Some(source_pin) = self.design.net(net).source else {
            return false;
        };
        let alternates = self.design.pin(source_pin).alternates.clone();
        let Some(pos) = alternates.iter().position(|&alt| {
            self.graph
                .preserved_by(alt)
                .is_none_or(|owner| owner == net)
        }) else {
            return false;
        };

        let new_node = alternates[pos];
        let old_node = self.design.pin(source_pin).node;
        log::info!(
            "Swapping output pin of net '{}' to '{}'.",
            self.design.net(net).name,
            self.device.node(new_node).name
        );
        {
            let pin = self.design.pin_mut(source_pin);
            pin.node = new_node;
            pin.alternates.remove(pos);
            pin.alternates.push(old_node);
        }

        let source_rnode = self.graph.get_or_create(new_node);
        self.nets[w].source_rnode = source_rnode;
        for k in 0..self.nets[w].connections.len() {
            let c = self.nets[w].connections[k];
            if self.connections[c].routed {
                self.rip_up(c);
            }
            self.connections[c].source_rnode = source_rnode;
        }
        true
    }

    pub fn enlarge_bounding_box(&mut self, idx: usize) -> bool {
        let (dx, dy) = (
            self.config.extension_x_increment,
            self.config.extension_y_increment,
        );
        let (w, h) = (self.device.width as i16, self.device.height as i16);
        self.connections[idx].bbox.enlarge(dx, dy, w, h)
    }

    /// Soft preservation: releases signal nets whose preserved routing walls
    /// off this connection's sink or source, and admits them into the
    /// negotiation so both sides can settle the conflict on cost.
    pub fn unpreserve_blockers(&mut self, idx: usize) -> usize {
        let sink_node = self.graph.rnode(self.connections[idx].sink_rnode).node;
        let source_node = self.graph.rnode(self.connections[idx].source_rnode).node;
        let this_net = self.connections[idx].net_id;

        let mut blockers: BTreeSet<NetId> = BTreeSet::new();
        for &p in self.device.parents(sink_node) {
            if let Some(owner) = self.graph.preserved_by(p) {
                if owner != this_net {
                    blockers.insert(owner);
                }
            }
        }
        for &c in self.device.children(source_node) {
            if let Some(owner) = self.graph.preserved_by(c) {
                if owner != this_net {
                    blockers.insert(owner);
                }
            }
        }
        blockers.retain(|&n| self.design.net(n).kind == NetType::Signal);
        // Nets already negotiating were only partially preserved; releasing
        // them again does nothing.
        blockers.retain(|&n| self.nets.iter().all(|w| w.net != n));

        let count = blockers.len();
        for net in blockers {
            log::info!(
                "Unpreserving net '{}' to free resources around '{}'.",
                self.design.net(net).name,
                self.design.pin(self.connections[idx].sink_pin).name
            );
            let nodes = self.design.routing_nodes(net);
            let masks = BaseExclusion {
                use_uturn_nodes: self.config.use_uturn_nodes,
                mask_rclk: self.config.mask_nodes_cross_rclk,
            };
            self.graph.unpreserve_net(net, &nodes, &masks);
            if let Err(e) = self.admit_net(net, &|_| Vec::new()) {
                log::error!("Could not admit unpreserved net: {}", e);
                continue;
            }
            self.seed_existing_routing(net);
        }
        if count > 0 {
            self.sort_connections();
        }
        count
    }

    /// Converts connection paths back into per-net pip lists and pin states.
    fn assign_routing_to_design(&mut self) {
        for d in &self.direct {
            let net = self.design.net_mut(d.net);
            for pair in d.path.windows(2) {
                let pip = Pip {
                    start: pair[0],
                    end: pair[1],
                };
                if !net.pips.contains(&pip) {
                    net.pips.push(pip);
                }
            }
            self.design.pin_mut(d.sink_pin).routed = true;
        }

        for w in &self.nets {
            let mut pips: Vec<Pip> = Vec::new();
            for &ci in &w.connections {
                let conn = &self.connections[ci];
                self.design.pin_mut(conn.sink_pin).routed = conn.routed;
                if !conn.routed {
                    continue;
                }
                // Sink-first storage; emit source-first.
                for i in (1..conn.rnodes.len()).rev() {
                    let pip = Pip {
                        start: self.graph.rnode(conn.rnodes[i]).node,
                        end: self.graph.rnode(conn.rnodes[i - 1]).node,
                    };
                    if !pips.contains(&pip) {
                        pips.push(pip);
                    }
                }
            }
            let existing_direct: Vec<Pip> = self.design.net(w.net).pips.clone();
            for pip in existing_direct {
                if !pips.contains(&pip) {
                    pips.push(pip);
                }
            }
            self.design.net_mut(w.net).pips = pips;
        }

        let mut wirelength = 0u64;
        for i in 0..self.graph.len() {
            let n = self.graph.rnode(RnodeId::new(i));
            if n.occupancy() > 0 {
                wirelength += n.length as u64;
            }
        }
        self.stats.wirelength = wirelength;
    }

    fn log_congestion_diagnostics(&self) {
        let mut worst: Vec<(i32, RnodeId)> = (0..self.graph.len())
            .map(|i| RnodeId::new(i))
            .filter(|&r| self.graph.rnode(r).is_overused())
            .map(|r| (self.graph.rnode(r).overuse(), r))
            .collect();
        worst.sort_by(|a, b| b.0.cmp(&a.0));
        for &(overuse, r) in worst.iter().take(10) {
            let n = self.graph.rnode(r);
            log::error!(
                "Overused: '{}' at ({}, {}) carries {} extra nets.",
                self.device.node(n.node).name,
                n.tile_x,
                n.tile_y,
                overuse
            );
        }
        for &idx in &self.sorted {
            let conn = &self.connections[idx];
            if !conn.routed {
                log::error!(
                    "Unrouted: sink '{}' of net '{}'.",
                    self.design.pin(conn.sink_pin).name,
                    self.design.net(conn.net_id).name
                );
            }
        }
    }
}

fn validate_config(config: &RouterConfig) -> Result<(), RouteError> {
    if config.max_iterations == 0 {
        return Err(RouteError::Config(
            "max_iterations must be positive".to_string(),
        ));
    }
    if config.present_congestion_multiplier <= 1.0 {
        return Err(RouteError::Config(
            "present_congestion_multiplier must exceed 1.0".to_string(),
        ));
    }
    if !(0.0..=1.0).contains(&config.wirelength_weight) {
        return Err(RouteError::Config(
            "wirelength_weight must lie in [0, 1]".to_string(),
        ));
    }
    if !(0.0..=1.0).contains(&config.timing_weight) {
        return Err(RouteError::Config(
            "timing_weight must lie in [0, 1]".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fpga_common::db::device::NodeDesc;
    use fpga_common::util::check;
    use fpga_common::util::generator::{
        IN0, IN1, OUT0, OUT1, grid_device, grid_node, random_design,
    };
    use std::collections::HashMap;

    /// Recomputes occupancy from the committed connection paths; the node
    /// counters must agree with it between iterations.
    fn assert_occupancy_matches_committed_paths(core: &RouterCore) {
        let mut users: HashMap<RnodeId, BTreeSet<NetId>> = HashMap::new();
        for conn in &core.connections {
            if !conn.routed {
                continue;
            }
            for &r in &conn.rnodes {
                users.entry(r).or_default().insert(conn.net_id);
            }
        }
        for i in 0..core.graph.len() {
            let id = RnodeId::new(i);
            let expected = users.get(&id).map_or(0, |nets| nets.len()) as i32;
            assert_eq!(core.graph.rnode(id).occupancy(), expected);
        }
    }

    fn pin_desc(name: &str, kind: WireKind, x: i16, y: i16) -> NodeDesc {
        NodeDesc {
            name: name.to_string(),
            kind,
            tile_x: x,
            tile_y: y,
            end_tile_x: x,
            end_tile_y: y,
            slr: 0,
            length: 0,
            delay: 0.0,
        }
    }

    fn span_wire(name: &str, length: u16) -> NodeDesc {
        NodeDesc {
            name: name.to_string(),
            kind: WireKind::Wire,
            tile_x: 0,
            tile_y: 0,
            end_tile_x: 1,
            end_tile_y: 0,
            slr: 0,
            length,
            delay: 1.0,
        }
    }

    #[test]
    fn two_pin_net_routes_in_one_iteration() {
        let device = Arc::new(grid_device(4, 1));
        let mut design = Design::new("t".to_string());
        let net = design.add_net("a".to_string(), NetType::Signal);
        design.add_pin("a_o".to_string(), net, grid_node(4, 0, 0, OUT0), true);
        design.add_pin("a_i".to_string(), net, grid_node(4, 3, 0, IN0), false);

        let router =
            Router::new(Arc::clone(&device), &mut design, RouterConfig::default()).unwrap();
        let summary = router.run().expect("uncontested net must route");

        assert_eq!(summary.iterations, 1);
        // OUT0 -> E -> E -> E -> IN0.
        assert_eq!(design.net(net).pips.len(), 4);
        assert!(design.pins.iter().all(|p| p.is_source || p.routed));
        check::run(&device, &design).expect("clean routing");
    }

    #[test]
    fn competing_nets_negotiate_a_detour() {
        let device = Arc::new(grid_device(3, 3));
        let mut design = Design::new("t".to_string());
        let a = design.add_net("a".to_string(), NetType::Signal);
        design.add_pin("a_o".to_string(), a, grid_node(3, 0, 0, OUT0), true);
        design.add_pin("a_i".to_string(), a, grid_node(3, 2, 0, IN0), false);
        let b = design.add_net("b".to_string(), NetType::Signal);
        design.add_pin("b_o".to_string(), b, grid_node(3, 0, 0, OUT1), true);
        design.add_pin("b_i".to_string(), b, grid_node(3, 2, 0, IN1), false);

        let router =
            Router::new(Arc::clone(&device), &mut design, RouterConfig::default()).unwrap();
        let summary = router.run().expect("a detour through row 1 exists");

        // Both nets want the same two east wires; one must yield.
        assert!(summary.iterations >= 2);
        assert!(design.pins.iter().all(|p| p.is_source || p.routed));
        check::run(&device, &design).expect("no shared wires after convergence");
    }

    #[test]
    fn partial_mode_keeps_preserved_routing_intact() {
        let device = Arc::new(grid_device(4, 2));
        let mut design = Design::new("t".to_string());
        let a = design.add_net("a".to_string(), NetType::Signal);
        design.add_pin("a_o".to_string(), a, grid_node(4, 0, 0, OUT0), true);
        design.add_pin("a_i".to_string(), a, grid_node(4, 3, 0, IN0), false);

        Router::new(Arc::clone(&device), &mut design, RouterConfig::default())
            .unwrap()
            .run()
            .expect("first pass");
        let frozen = design.net(a).pips.clone();

        let b = design.add_net("b".to_string(), NetType::Signal);
        design.add_pin("b_o".to_string(), b, grid_node(4, 0, 0, OUT1), true);
        let b_sink = design.add_pin("b_i".to_string(), b, grid_node(4, 3, 0, IN1), false);

        let mut config = RouterConfig::default();
        config.mode = RoutingMode::Partial;
        Router::new(Arc::clone(&device), &mut design, config)
            .unwrap()
            .run()
            .expect("second pass routes b around a");

        assert_eq!(design.net(a).pips, frozen);
        assert!(design.pin(b_sink).routed);
        check::run(&device, &design).expect("clean routing");
    }

    #[test]
    fn eco_mode_rejects_unrouted_clock_nets() {
        let device = Arc::new(grid_device(2, 1));
        let mut design = Design::new("t".to_string());
        let clk = design.add_net("clk".to_string(), NetType::Clock);
        design.add_pin("clk_o".to_string(), clk, grid_node(2, 0, 0, OUT0), true);
        design.add_pin("clk_i".to_string(), clk, grid_node(2, 1, 0, IN0), false);

        let mut config = RouterConfig::default();
        config.mode = RoutingMode::Eco;
        let err = Router::new(Arc::clone(&device), &mut design, config)
            .unwrap()
            .run()
            .unwrap_err();
        assert!(matches!(err, RouteError::GlobalNet { .. }));
    }

    #[test]
    fn soft_preserve_releases_a_blocking_net() {
        // Two sources in tile (0,0), two sinks in (1,0). X reaches both
        // sinks, Y only reaches a's sink; b has no path but through X.
        let mut dev = Device::new("contested".to_string(), 2, 1);
        let src_a = dev.add_node(pin_desc("SRC_A", WireKind::PinfeedOut, 0, 0));
        let src_b = dev.add_node(pin_desc("SRC_B", WireKind::PinfeedOut, 0, 0));
        let x = dev.add_node(span_wire("X", 1));
        let y = dev.add_node(span_wire("Y", 1));
        let snk_a = dev.add_node(pin_desc("SNK_A", WireKind::PinfeedIn, 1, 0));
        let snk_b = dev.add_node(pin_desc("SNK_B", WireKind::PinfeedIn, 1, 0));
        dev.add_edge(src_a, x);
        dev.add_edge(src_a, y);
        dev.add_edge(src_b, x);
        dev.add_edge(x, snk_a);
        dev.add_edge(y, snk_a);
        dev.add_edge(x, snk_b);
        let device = Arc::new(dev);

        let mut design = Design::new("t".to_string());
        let a = design.add_net("a".to_string(), NetType::Signal);
        design.add_pin("a_o".to_string(), a, src_a, true);
        let a_sink = design.add_pin("a_i".to_string(), a, snk_a, false);
        design.pin_mut(a_sink).routed = true;
        design.net_mut(a).pips = vec![
            Pip { start: src_a, end: x },
            Pip { start: x, end: snk_a },
        ];
        let b = design.add_net("b".to_string(), NetType::Signal);
        design.add_pin("b_o".to_string(), b, src_b, true);
        let b_sink = design.add_pin("b_i".to_string(), b, snk_b, false);

        let mut config = RouterConfig::default();
        config.mode = RoutingMode::Partial;
        config.soft_preserve = true;
        let summary = Router::new(Arc::clone(&device), &mut design, config)
            .unwrap()
            .run()
            .expect("releasing a makes b routable");

        // b fails twice before a is released, then a shifts to Y.
        assert!(summary.iterations >= 3);
        assert!(design.pin(b_sink).routed);
        assert!(design.net(a).pips.contains(&Pip { start: src_a, end: y }));
        check::run(&device, &design).expect("clean routing");
    }

    #[test]
    fn eco_mode_routes_through_a_lut_alternate() {
        // The nominal sink is unreachable; an unused LUT input in the same
        // site is registered as a route-through alternate.
        let mut dev = Device::new("routethru".to_string(), 2, 1);
        let src = dev.add_node(pin_desc("SRC", WireKind::PinfeedOut, 0, 0));
        let w = dev.add_node(span_wire("W", 1));
        let snk = dev.add_node(pin_desc("SNK", WireKind::PinfeedIn, 1, 0));
        let alt = dev.add_node(pin_desc("ALT", WireKind::PinfeedIn, 1, 0));
        dev.add_edge(src, w);
        dev.add_edge(w, alt);
        dev.lut_route_thrus.insert(snk, vec![alt]);
        let device = Arc::new(dev);

        let mut design = Design::new("t".to_string());
        let n = design.add_net("n".to_string(), NetType::Signal);
        design.add_pin("n_o".to_string(), n, src, true);
        let sink = design.add_pin("n_i".to_string(), n, snk, false);

        let mut config = RouterConfig::default();
        config.mode = RoutingMode::Eco;
        Router::new(Arc::clone(&device), &mut design, config)
            .unwrap()
            .run()
            .expect("alternate terminal is reachable");

        assert!(design.pin(sink).routed);
        assert!(design.net(n).pips.contains(&Pip { start: w, end: alt }));
    }

    #[test]
    fn bottleneck_resolves_after_historical_cost_applies() {
        // Three nets share a cheap single-capacity wire; each also has a
        // private detour that is four times longer. Present cost alone makes
        // everyone bounce between the two; only once historical cost sticks
        // to the bottleneck do exactly two nets settle on their detours.
        let mut dev = Device::new("bottleneck".to_string(), 2, 1);
        let bottleneck = dev.add_node(span_wire("B", 1));
        let mut nets = Vec::new();
        for i in 0..3 {
            let src = dev.add_node(pin_desc(&format!("SRC{}", i), WireKind::PinfeedOut, 0, 0));
            let detour = dev.add_node(span_wire(&format!("D{}", i), 4));
            let snk = dev.add_node(pin_desc(&format!("SNK{}", i), WireKind::PinfeedIn, 1, 0));
            dev.add_edge(src, bottleneck);
            dev.add_edge(src, detour);
            dev.add_edge(bottleneck, snk);
            dev.add_edge(detour, snk);
            nets.push((src, snk));
        }
        let device = Arc::new(dev);

        let mut design = Design::new("t".to_string());
        for (i, &(src, snk)) in nets.iter().enumerate() {
            let net = design.add_net(format!("n{}", i), NetType::Signal);
            design.add_pin(format!("n{}_o", i), net, src, true);
            design.add_pin(format!("n{}_i", i), net, snk, false);
        }

        let summary = Router::new(Arc::clone(&device), &mut design, RouterConfig::default())
            .unwrap()
            .run()
            .expect("two detours resolve the bottleneck");

        assert!(summary.iterations >= 2);
        // One net keeps the unit wire, two pay for length-4 detours.
        assert_eq!(summary.wirelength, 1 + 4 + 4);
        check::run(&device, &design).expect("clean routing");
    }

    #[test]
    fn clean_connections_keep_paths_and_occupancy_across_iterations() {
        // a has row 2 to itself; b and c fight over row 0's east wires.
        // Later iterations may only touch the fighters.
        let device = Arc::new(grid_device(3, 3));
        let mut design = Design::new("t".to_string());
        let a = design.add_net("a".to_string(), NetType::Signal);
        design.add_pin("a_o".to_string(), a, grid_node(3, 0, 2, OUT0), true);
        design.add_pin("a_i".to_string(), a, grid_node(3, 2, 2, IN0), false);
        let b = design.add_net("b".to_string(), NetType::Signal);
        design.add_pin("b_o".to_string(), b, grid_node(3, 0, 0, OUT0), true);
        design.add_pin("b_i".to_string(), b, grid_node(3, 2, 0, IN0), false);
        let c = design.add_net("c".to_string(), NetType::Signal);
        design.add_pin("c_o".to_string(), c, grid_node(3, 0, 0, OUT1), true);
        design.add_pin("c_i".to_string(), c, grid_node(3, 2, 0, IN1), false);

        let mut router =
            Router::new(Arc::clone(&device), &mut design, RouterConfig::default()).unwrap();
        router.initialize().unwrap();
        assert_eq!(router.route_iteration(1), 3);
        assert_occupancy_matches_committed_paths(&router.core);

        // Connection 0 is a's; it shares no wires with the fighters.
        let clean = 0usize;
        assert_eq!(router.core.connections[clean].net_id, a);
        assert!(router.core.connections[clean].routed);
        assert!(
            router.core.connections[clean]
                .rnodes
                .iter()
                .all(|&r| !router.core.graph.rnode(r).is_overused())
        );
        let path = router.core.connections[clean].rnodes.clone();
        let occupancy: Vec<i32> = path
            .iter()
            .map(|&r| router.core.graph.rnode(r).occupancy())
            .collect();

        router.core.update_cost_factors();
        // Only the two congested connections qualify for a reroute.
        assert_eq!(router.route_iteration(2), 2);

        assert_eq!(router.core.connections[clean].rnodes, path);
        let after: Vec<i32> = path
            .iter()
            .map(|&r| router.core.graph.rnode(r).occupancy())
            .collect();
        assert_eq!(after, occupancy);
        assert_occupancy_matches_committed_paths(&router.core);
    }

    #[test]
    fn competing_direct_paths_resolve_to_the_lower_net() {
        // Both same-tile sinks ride the same dedicated hop; the claim stays
        // with the first (lowest-id) net.
        let mut dev = Device::new("direct".to_string(), 1, 1);
        let src_a = dev.add_node(pin_desc("SRC_A", WireKind::PinfeedOut, 0, 0));
        let src_b = dev.add_node(pin_desc("SRC_B", WireKind::PinfeedOut, 0, 0));
        let mid = dev.add_node(pin_desc("MID", WireKind::Wire, 0, 0));
        let snk_a = dev.add_node(pin_desc("SNK_A", WireKind::PinfeedIn, 0, 0));
        let snk_b = dev.add_node(pin_desc("SNK_B", WireKind::PinfeedIn, 0, 0));
        dev.add_edge(src_a, mid);
        dev.add_edge(src_b, mid);
        dev.add_edge(mid, snk_a);
        dev.add_edge(mid, snk_b);
        let device = Arc::new(dev);

        let mut design = Design::new("t".to_string());
        let a = design.add_net("a".to_string(), NetType::Signal);
        design.add_pin("a_o".to_string(), a, src_a, true);
        design.add_pin("a_i".to_string(), a, snk_a, false);
        let b = design.add_net("b".to_string(), NetType::Signal);
        design.add_pin("b_o".to_string(), b, src_b, true);
        design.add_pin("b_i".to_string(), b, snk_b, false);

        let mut router =
            Router::new(Arc::clone(&device), &mut design, RouterConfig::default()).unwrap();
        router.initialize().unwrap();

        assert_eq!(router.core.direct.len(), 2);
        assert_eq!(router.core.graph.preserved_by(mid), Some(a));
        // The loser still holds its uncontested endpoints.
        assert_eq!(router.core.graph.preserved_by(snk_b), Some(b));
    }

    #[test]
    fn full_flow_routes_a_random_design() {
        let device = Arc::new(grid_device(10, 10));
        let mut design = random_design(&device, 4, 1, 3);

        let summary = Router::new(Arc::clone(&device), &mut design, RouterConfig::default())
            .unwrap()
            .run()
            .expect("sparse design converges");

        assert!(summary.failed_connections == 0);
        assert!(design.pins.iter().all(|p| p.is_source || p.routed));
        check::run(&device, &design).expect("clean routing");
    }
}
