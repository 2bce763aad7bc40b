use fpga_common::db::device::{NodeDesc, WireKind};
use fpga_common::db::indices::{NetId, NodeId, RnodeId};

/// Every routing resource legally carries one net.
pub const CAPACITY: i32 = 1;

/// Mutable routing state of one materialized device node. Created lazily the
/// first time the search or a preserved route touches the node.
pub struct RouteNode {
    pub node: NodeId,
    pub kind: WireKind,
    pub tile_x: i16,
    pub tile_y: i16,
    pub end_tile_x: i16,
    pub end_tile_y: i16,
    pub slr: u8,
    pub length: u16,
    pub delay: f32,
    pub base_cost: f32,
    pub present_congestion_cost: f32,
    pub historical_congestion_cost: f32,
    /// Cost of the best path from the connection source, set on visit.
    pub upstream_path_cost: f32,
    /// Upstream cost plus the estimate to the sink, set on visit.
    pub lower_bound_total_cost: f32,
    pub is_target: bool,
    pub visited: bool,
    pub prev: Option<RnodeId>,
    /// Nets occupying this node, with how many of their connections pass
    /// through it. Linear scan; fanout per node is tiny in practice.
    users: Vec<(NetId, u16)>,
    pub children: Box<[RnodeId]>,
    pub expanded: bool,
}

impl RouteNode {
    pub fn new(node: NodeId, desc: &NodeDesc, sll_length: u16) -> Self {
        Self {
            node,
            kind: desc.kind,
            tile_x: desc.tile_x,
            tile_y: desc.tile_y,
            end_tile_x: desc.end_tile_x,
            end_tile_y: desc.end_tile_y,
            slr: desc.slr,
            length: desc.length,
            delay: desc.delay,
            base_cost: base_cost(desc, sll_length),
            present_congestion_cost: 1.0,
            historical_congestion_cost: 1.0,
            upstream_path_cost: 0.0,
            lower_bound_total_cost: 0.0,
            is_target: false,
            visited: false,
            prev: None,
            users: Vec::new(),
            children: Box::new([]),
            expanded: false,
        }
    }

    /// Number of distinct nets occupying the node.
    #[inline(always)]
    pub fn occupancy(&self) -> i32 {
        self.users.len() as i32
    }

    #[inline(always)]
    pub fn overuse(&self) -> i32 {
        self.occupancy() - CAPACITY
    }

    #[inline(always)]
    pub fn is_overused(&self) -> bool {
        self.occupancy() > CAPACITY
    }

    pub fn count_connections_of_user(&self, net: NetId) -> u16 {
        self.users
            .iter()
            .find(|(n, _)| *n == net)
            .map(|(_, c)| *c)
            .unwrap_or(0)
    }

    pub fn increment_user(&mut self, net: NetId) {
        match self.users.iter_mut().find(|(n, _)| *n == net) {
            Some((_, c)) => *c += 1,
            None => self.users.push((net, 1)),
        }
    }

    pub fn decrement_user(&mut self, net: NetId) {
        if let Some(pos) = self.users.iter().position(|(n, _)| *n == net) {
            self.users[pos].1 -= 1;
            if self.users[pos].1 == 0 {
                self.users.swap_remove(pos);
            }
        }
    }

    pub fn user_nets(&self) -> impl Iterator<Item = NetId> + '_ {
        self.users.iter().map(|(n, _)| *n)
    }

    /// Refreshes the present congestion cost from the current occupancy.
    pub fn update_present_congestion_cost(&mut self, present_factor: f32) {
        let occ = self.occupancy();
        if occ < CAPACITY {
            self.present_congestion_cost = 1.0;
        } else {
            self.present_congestion_cost = 1.0 + (occ - CAPACITY + 1) as f32 * present_factor;
        }
    }
}

fn base_cost(desc: &NodeDesc, sll_length: u16) -> f32 {
    match desc.kind {
        WireKind::PinfeedIn => 0.4,
        WireKind::PinfeedOut => 1.0,
        WireKind::SuperLongLine => 0.3 * desc.length as f32 / sll_length.max(1) as f32,
        WireKind::Wire => {
            // Horizontal jumps pay per tile; everything else is flat.
            if desc.end_tile_x != desc.tile_x && desc.end_tile_y == desc.tile_y {
                0.4 * desc.length.max(1) as f32
            } else {
                0.4
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire(len: u16, horizontal: bool) -> NodeDesc {
        NodeDesc {
            name: "w".to_string(),
            kind: WireKind::Wire,
            tile_x: 0,
            tile_y: 0,
            end_tile_x: if horizontal { len as i16 } else { 0 },
            end_tile_y: if horizontal { 0 } else { len as i16 },
            slr: 0,
            length: len,
            delay: 0.0,
        }
    }

    #[test]
    fn user_counts_drive_occupancy() {
        let mut n = RouteNode::new(NodeId(0), &wire(1, true), 0);
        assert_eq!(n.occupancy(), 0);

        n.increment_user(NetId(3));
        n.increment_user(NetId(3));
        n.increment_user(NetId(5));
        assert_eq!(n.occupancy(), 2);
        assert_eq!(n.count_connections_of_user(NetId(3)), 2);
        assert!(n.is_overused());

        n.decrement_user(NetId(3));
        n.decrement_user(NetId(3));
        assert_eq!(n.occupancy(), 1);
        assert!(!n.is_overused());
        assert_eq!(n.count_connections_of_user(NetId(3)), 0);
    }

    #[test]
    fn present_cost_tracks_overuse() {
        let mut n = RouteNode::new(NodeId(0), &wire(1, true), 0);
        n.update_present_congestion_cost(0.5);
        assert_eq!(n.present_congestion_cost, 1.0);

        n.increment_user(NetId(0));
        n.update_present_congestion_cost(0.5);
        assert_eq!(n.present_congestion_cost, 1.5);

        n.increment_user(NetId(1));
        n.update_present_congestion_cost(0.5);
        assert_eq!(n.present_congestion_cost, 2.0);
    }

    #[test]
    fn horizontal_wires_scale_base_cost_with_length() {
        let short = RouteNode::new(NodeId(0), &wire(1, true), 0);
        let long = RouteNode::new(NodeId(1), &wire(4, true), 0);
        let vertical = RouteNode::new(NodeId(2), &wire(4, false), 0);
        assert_eq!(short.base_cost, 0.4);
        assert_eq!(long.base_cost, 1.6);
        assert_eq!(vertical.base_cost, 0.4);
    }
}
