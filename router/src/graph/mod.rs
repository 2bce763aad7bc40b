pub mod node;

use crate::strategy::EdgeExclusionPolicy;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use fpga_common::db::device::Device;
use fpga_common::db::indices::{NetId, NodeId, RnodeId};
use node::RouteNode;
use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};

/// Barrier for fire-and-forget preservation tasks: counts up when a task is
/// spawned, down when it completes, and lets the router block until all
/// outstanding work has drained.
pub struct CountUpDownLatch {
    count: Mutex<usize>,
    zero: Condvar,
}

impl CountUpDownLatch {
    pub fn new() -> Self {
        Self {
            count: Mutex::new(0),
            zero: Condvar::new(),
        }
    }

    pub fn count_up(&self) {
        let mut count = self.count.lock().unwrap();
        *count += 1;
    }

    pub fn count_down(&self) {
        let mut count = self.count.lock().unwrap();
        *count -= 1;
        if *count == 0 {
            self.zero.notify_all();
        }
    }

    pub fn wait(&self) {
        let mut count = self.count.lock().unwrap();
        while *count > 0 {
            count = self.zero.wait(count).unwrap();
        }
    }
}

impl Default for CountUpDownLatch {
    fn default() -> Self {
        Self::new()
    }
}

/// Lazily materialized routing-resource graph. Device nodes get a
/// [`RouteNode`] the first time something touches them; children lists are
/// computed on demand and cached, with the exclusion policy applied at
/// expansion time. Search bookkeeping is reset in O(visited).
pub struct RouteGraph {
    device: Arc<Device>,
    nodes: Vec<RouteNode>,
    index: HashMap<NodeId, RnodeId>,
    visited: Vec<RnodeId>,
    targets: Vec<RnodeId>,
    preserved: Arc<DashMap<NodeId, NetId>>,
    latch: Arc<CountUpDownLatch>,
}

impl RouteGraph {
    pub fn new(device: Arc<Device>) -> Self {
        Self {
            device,
            nodes: Vec::new(),
            index: HashMap::new(),
            visited: Vec::new(),
            targets: Vec::new(),
            preserved: Arc::new(DashMap::new()),
            latch: Arc::new(CountUpDownLatch::new()),
        }
    }

    #[inline(always)]
    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline(always)]
    pub fn rnode(&self, id: RnodeId) -> &RouteNode {
        &self.nodes[id.index()]
    }

    #[inline(always)]
    pub fn rnode_mut(&mut self, id: RnodeId) -> &mut RouteNode {
        &mut self.nodes[id.index()]
    }

    pub fn lookup(&self, node: NodeId) -> Option<RnodeId> {
        self.index.get(&node).copied()
    }

    /// Materializes the routing state of a device node. Idempotent.
    pub fn get_or_create(&mut self, node: NodeId) -> RnodeId {
        if let Some(&id) = self.index.get(&node) {
            return id;
        }
        let id = RnodeId::new(self.nodes.len());
        self.nodes.push(RouteNode::new(
            node,
            self.device.node(node),
            self.device.sll_length,
        ));
        self.index.insert(node, id);
        id
    }

    /// Builds and caches the child list of `rnode`, filtered through the
    /// exclusion policy. Cached lists are shared across connections, so the
    /// policy must not depend on per-connection state.
    pub fn ensure_children(&mut self, rnode: RnodeId, policy: &dyn EdgeExclusionPolicy) {
        if self.nodes[rnode.index()].expanded {
            return;
        }
        let parent = self.nodes[rnode.index()].node;
        let candidates: Vec<NodeId> = self.device.children(parent).to_vec();
        let kept: Vec<NodeId> = candidates
            .into_iter()
            .filter(|&child| !policy.is_excluded(self, parent, child))
            .collect();
        let ids: Vec<RnodeId> = kept.into_iter().map(|c| self.get_or_create(c)).collect();
        let slot = &mut self.nodes[rnode.index()];
        slot.children = ids.into_boxed_slice();
        slot.expanded = true;
    }

    #[inline(always)]
    pub fn children_len(&self, rnode: RnodeId) -> usize {
        self.nodes[rnode.index()].children.len()
    }

    #[inline(always)]
    pub fn child(&self, rnode: RnodeId, i: usize) -> RnodeId {
        self.nodes[rnode.index()].children[i]
    }

    /// Marks a node reached by the search, recording the back-pointer and
    /// path costs. Visited nodes are never re-keyed.
    pub fn visit(&mut self, rnode: RnodeId, prev: Option<RnodeId>, partial: f32, total: f32) {
        let n = &mut self.nodes[rnode.index()];
        n.visited = true;
        n.prev = prev;
        n.upstream_path_cost = partial;
        n.lower_bound_total_cost = total;
        self.visited.push(rnode);
    }

    pub fn set_target(&mut self, rnode: RnodeId) {
        if !self.nodes[rnode.index()].is_target {
            self.nodes[rnode.index()].is_target = true;
            self.targets.push(rnode);
        }
    }

    /// Clears per-search state, touching only the nodes the search reached.
    pub fn reset_expansion(&mut self) {
        for id in self.visited.drain(..) {
            let n = &mut self.nodes[id.index()];
            n.visited = false;
            n.prev = None;
        }
        for id in self.targets.drain(..) {
            self.nodes[id.index()].is_target = false;
        }
    }

    /// Records a back-pointer without marking the node visited; used to seed
    /// existing routing so it survives `reset_expansion`.
    pub fn set_seed_prev(&mut self, rnode: RnodeId, prev: Option<RnodeId>) {
        self.nodes[rnode.index()].prev = prev;
    }

    /// Claims `node` for `net`. Races between preservation tasks resolve to
    /// the smallest net id, independent of scheduling. Returns the competing
    /// owner when the node was already claimed by another net.
    pub fn preserve(&self, node: NodeId, net: NetId) -> Option<NetId> {
        match self.preserved.entry(node) {
            Entry::Vacant(v) => {
                v.insert(net);
                None
            }
            Entry::Occupied(mut o) => {
                let existing = *o.get();
                if existing == net {
                    return None;
                }
                if net < existing {
                    o.insert(net);
                }
                Some(existing)
            }
        }
    }

    /// Claims a whole net's nodes on a worker thread. Pair with
    /// [`RouteGraph::await_preserve`] before reading the preserved set.
    pub fn async_preserve(&self, net: NetId, nodes: Vec<NodeId>) {
        self.latch.count_up();
        let preserved = Arc::clone(&self.preserved);
        let latch = Arc::clone(&self.latch);
        rayon::spawn(move || {
            for node in nodes {
                match preserved.entry(node) {
                    Entry::Vacant(v) => {
                        v.insert(net);
                    }
                    Entry::Occupied(mut o) => {
                        if net < *o.get() {
                            o.insert(net);
                        }
                    }
                }
            }
            latch.count_down();
        });
    }

    pub fn await_preserve(&self) {
        self.latch.wait();
    }

    pub fn preserved_by(&self, node: NodeId) -> Option<NetId> {
        self.preserved.get(&node).map(|e| *e.value())
    }

    /// Releases a net's claims and patches its nodes back into the cached
    /// child lists of already-expanded parents. The exclusion policy is
    /// re-applied, so arcs masked for architectural reasons stay masked.
    pub fn unpreserve_net(
        &mut self,
        net: NetId,
        nodes: &[NodeId],
        policy: &dyn EdgeExclusionPolicy,
    ) {
        for &node in nodes {
            self.preserved.remove_if(&node, |_, owner| *owner == net);
        }
        for &node in nodes {
            let rnode = self.get_or_create(node);
            for i in 0..self.device.parents(node).len() {
                let parent = self.device.parents(node)[i];
                let Some(pr) = self.lookup(parent) else {
                    continue;
                };
                let slot = &self.nodes[pr.index()];
                if !slot.expanded || slot.children.contains(&rnode) {
                    continue;
                }
                if policy.is_excluded(self, parent, node) {
                    continue;
                }
                let mut children = std::mem::take(&mut self.nodes[pr.index()].children).into_vec();
                children.push(rnode);
                self.nodes[pr.index()].children = children.into_boxed_slice();
            }
        }
    }
}
