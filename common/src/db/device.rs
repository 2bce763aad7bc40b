use crate::db::indices::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use thiserror::Error;

/// Classification of a routing resource, mirroring the wire taxonomy of the
/// target architecture. The router derives base costs from this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireKind {
    /// Input site pin, the last hop into logic. Only usable by its own sink.
    PinfeedIn,
    /// Output site pin, the first hop out of logic.
    PinfeedOut,
    /// General interconnect wire.
    Wire,
    /// Dedicated long wire crossing an SLR boundary.
    SuperLongLine,
}

/// Static description of one routing resource node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDesc {
    pub name: String,
    pub kind: WireKind,
    /// Tile of the node's driver end.
    pub tile_x: i16,
    pub tile_y: i16,
    /// Tile of the node's far end. Equal to the base tile for local wires.
    pub end_tile_x: i16,
    pub end_tile_y: i16,
    pub slr: u8,
    /// Span in tiles along the node's primary direction.
    pub length: u16,
    /// Intrinsic delay estimate, in arbitrary timing units.
    pub delay: f32,
}

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("adjacency tables have {downhill} downhill / {uphill} uphill rows for {nodes} nodes")]
    TableMismatch {
        nodes: usize,
        downhill: usize,
        uphill: usize,
    },
    #[error("node {0} references out-of-range node {1}")]
    DanglingEdge(usize, u32),
    #[error("edge {0} -> {1} has no uphill mirror")]
    AsymmetricEdge(u32, u32),
}

/// Flat routing-resource graph of a device. Nodes are stored in index order;
/// adjacency is kept as forward (downhill) and reverse (uphill) lists so the
/// router can expand in either direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub name: String,
    /// Tile grid extents.
    pub width: u16,
    pub height: u16,
    /// Tile rows per SLR. Zero means a single-SLR device.
    pub slr_height: u16,
    /// Vertical span of a SuperLongLine, in tiles.
    pub sll_length: u16,
    pub nodes: Vec<NodeDesc>,
    pub downhill: Vec<Vec<NodeId>>,
    pub uphill: Vec<Vec<NodeId>>,
    /// Tile rows occupied by clock distribution; arcs crossing one can be
    /// masked off during expansion.
    pub rclk_rows: Vec<i16>,
    /// ECO route-throughs: for a sink site pin, LUT input nodes that reach
    /// the same logic through an unused LUT.
    pub lut_route_thrus: HashMap<NodeId, Vec<NodeId>>,
    #[serde(skip)]
    name_map: HashMap<String, NodeId>,
}

impl Device {
    pub fn new(name: String, width: u16, height: u16) -> Self {
        Self {
            name,
            width,
            height,
            slr_height: 0,
            sll_length: 0,
            nodes: Vec::new(),
            downhill: Vec::new(),
            uphill: Vec::new(),
            rclk_rows: Vec::new(),
            lut_route_thrus: HashMap::new(),
            name_map: HashMap::new(),
        }
    }

    pub fn add_node(&mut self, desc: NodeDesc) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        self.name_map.insert(desc.name.clone(), id);
        self.nodes.push(desc);
        self.downhill.push(Vec::new());
        self.uphill.push(Vec::new());
        id
    }

    pub fn add_edge(&mut self, from: NodeId, to: NodeId) {
        self.downhill[from.index()].push(to);
        self.uphill[to.index()].push(from);
    }

    #[inline(always)]
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    #[inline(always)]
    pub fn node(&self, id: NodeId) -> &NodeDesc {
        &self.nodes[id.index()]
    }

    #[inline(always)]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.downhill[id.index()]
    }

    #[inline(always)]
    pub fn parents(&self, id: NodeId) -> &[NodeId] {
        &self.uphill[id.index()]
    }

    pub fn node_by_name(&self, name: &str) -> Option<NodeId> {
        self.name_map.get(name).copied()
    }

    /// Rebuilds the name lookup after deserialization.
    pub fn rebuild_name_map(&mut self) {
        self.name_map = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.name.clone(), NodeId::new(i)))
            .collect();
    }

    /// True when the arc from `parent` to `child` crosses a clock
    /// distribution row.
    pub fn crosses_rclk(&self, parent: NodeId, child: NodeId) -> bool {
        let py = self.node(parent).tile_y;
        let cy = self.node(child).end_tile_y;
        let (lo, hi) = if py <= cy { (py, cy) } else { (cy, py) };
        self.rclk_rows.iter().any(|&row| lo < row && row < hi)
    }

    /// Bounded breadth-first search along downhill edges. Returns the node
    /// sequence from `from` to `to` inclusive, or None when `to` is not
    /// reachable within `budget` expansions. Used to resolve dedicated
    /// (direct) connections such as carry chains.
    pub fn find_path(&self, from: NodeId, to: NodeId, budget: usize) -> Option<Vec<NodeId>> {
        if from == to {
            return Some(vec![from]);
        }
        let mut prev: HashMap<NodeId, NodeId> = HashMap::new();
        let mut queue = VecDeque::new();
        queue.push_back(from);
        let mut expanded = 0usize;
        while let Some(n) = queue.pop_front() {
            expanded += 1;
            if expanded > budget {
                return None;
            }
            for &child in self.children(n) {
                if child == from || prev.contains_key(&child) {
                    continue;
                }
                prev.insert(child, n);
                if child == to {
                    let mut path = vec![to];
                    let mut cur = to;
                    while let Some(&p) = prev.get(&cur) {
                        path.push(p);
                        cur = p;
                    }
                    path.reverse();
                    return Some(path);
                }
                queue.push_back(child);
            }
        }
        None
    }

    /// Structural consistency check, run once after loading a device file.
    pub fn validate(&self) -> Result<(), DeviceError> {
        let n = self.nodes.len();
        if self.downhill.len() != n || self.uphill.len() != n {
            return Err(DeviceError::TableMismatch {
                nodes: n,
                downhill: self.downhill.len(),
                uphill: self.uphill.len(),
            });
        }
        for (i, children) in self.downhill.iter().enumerate() {
            for &c in children {
                if c.index() >= n {
                    return Err(DeviceError::DanglingEdge(i, c.0));
                }
                if !self.uphill[c.index()].contains(&NodeId::new(i)) {
                    return Err(DeviceError::AsymmetricEdge(i as u32, c.0));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(name: &str, kind: WireKind, x: i16, y: i16) -> NodeDesc {
        NodeDesc {
            name: name.to_string(),
            kind,
            tile_x: x,
            tile_y: y,
            end_tile_x: x,
            end_tile_y: y,
            slr: 0,
            length: 1,
            delay: 0.0,
        }
    }

    #[test]
    fn find_path_follows_downhill_edges() {
        let mut dev = Device::new("t".to_string(), 2, 2);
        let a = dev.add_node(desc("a", WireKind::PinfeedOut, 0, 0));
        let b = dev.add_node(desc("b", WireKind::Wire, 0, 0));
        let c = dev.add_node(desc("c", WireKind::PinfeedIn, 1, 0));
        dev.add_edge(a, b);
        dev.add_edge(b, c);

        assert_eq!(dev.find_path(a, c, 100), Some(vec![a, b, c]));
        assert_eq!(dev.find_path(c, a, 100), None);
        assert!(dev.validate().is_ok());
    }

    #[test]
    fn validate_rejects_asymmetric_edges() {
        let mut dev = Device::new("t".to_string(), 1, 1);
        let a = dev.add_node(desc("a", WireKind::Wire, 0, 0));
        let b = dev.add_node(desc("b", WireKind::Wire, 0, 0));
        dev.downhill[a.index()].push(b);

        assert!(matches!(
            dev.validate(),
            Err(DeviceError::AsymmetricEdge(_, _))
        ));
    }

    #[test]
    fn rclk_crossing_detection() {
        let mut dev = Device::new("t".to_string(), 1, 8);
        dev.rclk_rows.push(4);
        let a = dev.add_node(desc("a", WireKind::Wire, 0, 2));
        let b = dev.add_node(desc("b", WireKind::Wire, 0, 6));
        let c = dev.add_node(desc("c", WireKind::Wire, 0, 3));
        dev.add_edge(a, b);
        dev.add_edge(a, c);

        assert!(dev.crosses_rclk(a, b));
        assert!(!dev.crosses_rclk(a, c));
    }
}
