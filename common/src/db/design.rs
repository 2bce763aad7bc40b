use crate::db::indices::{NetId, NodeId, PinId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetType {
    Clock,
    Static,
    Signal,
}

/// A programmable interconnect point: the `end` node is driven from the
/// `start` node when the pip is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pip {
    pub start: NodeId,
    pub end: NodeId,
}

/// A site pin of a placed cell, projected onto its device node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pin {
    pub name: String,
    pub net: NetId,
    pub node: NodeId,
    /// Equivalent nodes this pin could be moved to (alternate output pins
    /// of the same site for sources).
    pub alternates: Vec<NodeId>,
    pub is_source: bool,
    pub routed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetData {
    pub name: String,
    pub kind: NetType,
    pub source: Option<PinId>,
    pub sinks: Vec<PinId>,
    /// Enabled pips of the net's routing. Empty for unrouted nets.
    pub pips: Vec<Pip>,
}

impl NetData {
    pub fn has_pips(&self) -> bool {
        !self.pips.is_empty()
    }
}

/// A placed design over some device: nets, their site pins, and whatever
/// routing the input checkpoint already carried.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Design {
    pub name: String,
    pub nets: Vec<NetData>,
    pub pins: Vec<Pin>,
    #[serde(skip)]
    net_name_map: HashMap<String, NetId>,
}

impl Design {
    pub fn new(name: String) -> Self {
        Self {
            name,
            ..Default::default()
        }
    }

    pub fn add_net(&mut self, name: String, kind: NetType) -> NetId {
        let id = NetId::new(self.nets.len());
        self.net_name_map.insert(name.clone(), id);
        self.nets.push(NetData {
            name,
            kind,
            source: None,
            sinks: Vec::new(),
            pips: Vec::new(),
        });
        id
    }

    pub fn add_pin(
        &mut self,
        name: String,
        net: NetId,
        node: NodeId,
        is_source: bool,
    ) -> PinId {
        let id = PinId::new(self.pins.len());
        self.pins.push(Pin {
            name,
            net,
            node,
            alternates: Vec::new(),
            is_source,
            routed: false,
        });
        if is_source {
            self.nets[net.index()].source = Some(id);
        } else {
            self.nets[net.index()].sinks.push(id);
        }
        id
    }

    #[inline(always)]
    pub fn net(&self, id: NetId) -> &NetData {
        &self.nets[id.index()]
    }

    #[inline(always)]
    pub fn net_mut(&mut self, id: NetId) -> &mut NetData {
        &mut self.nets[id.index()]
    }

    #[inline(always)]
    pub fn pin(&self, id: PinId) -> &Pin {
        &self.pins[id.index()]
    }

    #[inline(always)]
    pub fn pin_mut(&mut self, id: PinId) -> &mut Pin {
        &mut self.pins[id.index()]
    }

    pub fn num_nets(&self) -> usize {
        self.nets.len()
    }

    pub fn net_ids(&self) -> impl Iterator<Item = NetId> + use<> {
        (0..self.nets.len()).map(NetId::new)
    }

    pub fn net_by_name(&self, name: &str) -> Option<NetId> {
        self.net_name_map.get(name).copied()
    }

    /// Device node the net's routing starts from, if the net has a source.
    pub fn source_node(&self, net: NetId) -> Option<NodeId> {
        self.net(net).source.map(|p| self.pin(p).node)
    }

    /// All device nodes the net's current routing occupies: the source node
    /// plus every pip endpoint.
    pub fn routing_nodes(&self, net: NetId) -> Vec<NodeId> {
        let data = self.net(net);
        let mut nodes = Vec::with_capacity(data.pips.len() * 2 + 1);
        if let Some(src) = self.source_node(net) {
            nodes.push(src);
        }
        for pip in &data.pips {
            nodes.push(pip.start);
            nodes.push(pip.end);
        }
        nodes.sort_unstable();
        nodes.dedup();
        nodes
    }

    /// Rebuilds the name lookup after deserialization.
    pub fn rebuild_name_map(&mut self) {
        self.net_name_map = self
            .nets
            .iter()
            .enumerate()
            .map(|(i, n)| (n.name.clone(), NetId::new(i)))
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routing_nodes_deduplicates_pip_endpoints() {
        let mut design = Design::new("t".to_string());
        let net = design.add_net("n0".to_string(), NetType::Signal);
        design.add_pin("src".to_string(), net, NodeId(0), true);
        design.add_pin("snk".to_string(), net, NodeId(3), false);
        design.net_mut(net).pips = vec![
            Pip {
                start: NodeId(0),
                end: NodeId(1),
            },
            Pip {
                start: NodeId(1),
                end: NodeId(3),
            },
        ];

        assert_eq!(
            design.routing_nodes(net),
            vec![NodeId(0), NodeId(1), NodeId(3)]
        );
    }

    #[test]
    fn pins_attach_to_their_net() {
        let mut design = Design::new("t".to_string());
        let net = design.add_net("n0".to_string(), NetType::Signal);
        let src = design.add_pin("o".to_string(), net, NodeId(7), true);
        let snk = design.add_pin("i".to_string(), net, NodeId(9), false);

        assert_eq!(design.net(net).source, Some(src));
        assert_eq!(design.net(net).sinks, vec![snk]);
        assert_eq!(design.source_node(net), Some(NodeId(7)));
        assert_eq!(design.net_by_name("n0"), Some(net));
    }
}
