use crate::error::RouteError;
use crate::graph::RouteGraph;
use fpga_common::db::design::{Design, Pip};
use fpga_common::db::device::Device;
use fpga_common::db::indices::{NetId, NodeId};
use std::collections::{HashMap, HashSet, VecDeque};

/// Routes clock and static nets. These carry no congestion negotiation; the
/// implementation owns whatever dedicated resources the architecture offers.
pub trait GlobalRouter {
    fn route(
        &mut self,
        device: &Device,
        graph: &RouteGraph,
        design: &Design,
        net: NetId,
    ) -> Result<Vec<Pip>, RouteError>;
}

/// Grows a breadth-first tree from the source, claiming the shortest
/// uncontested path to each sink in turn. Nodes preserved by other nets are
/// off limits.
pub struct BfsGlobalRouter;

impl GlobalRouter for BfsGlobalRouter {
    fn route(
        &mut self,
        device: &Device,
        graph: &RouteGraph,
        design: &Design,
        net: NetId,
    ) -> Result<Vec<Pip>, RouteError> {
        let data = design.net(net);
        let source = design
            .source_node(net)
            .ok_or_else(|| RouteError::MissingSource {
                net: data.name.clone(),
            })?;

        let mut tree: HashSet<NodeId> = HashSet::from([source]);
        let mut pips: Vec<Pip> = Vec::new();

        for &sink_pin in &data.sinks {
            let sink = design.pin(sink_pin).node;
            if tree.contains(&sink) {
                continue;
            }

            let mut prev: HashMap<NodeId, NodeId> = HashMap::new();
            let mut queue: VecDeque<NodeId> = tree.iter().copied().collect();
            let mut found = false;

            'search: while let Some(n) = queue.pop_front() {
                for &child in device.children(n) {
                    if prev.contains_key(&child) || tree.contains(&child) {
                        continue;
                    }
                    if graph.preserved_by(child).is_some_and(|owner| owner != net) {
                        continue;
                    }
                    prev.insert(child, n);
                    if child == sink {
                        found = true;
                        break 'search;
                    }
                    queue.push_back(child);
                }
            }

            if !found {
                return Err(RouteError::GlobalNet {
                    net: data.name.clone(),
                    reason: format!("no path to sink '{}'", design.pin(sink_pin).name),
                });
            }

            // Graft the new branch onto the tree, sink back to the junction.
            let mut cur = sink;
            while let Some(&p) = prev.get(&cur) {
                pips.push(Pip { start: p, end: cur });
                tree.insert(cur);
                if tree.contains(&p) {
                    break;
                }
                cur = p;
            }
        }

        Ok(pips)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fpga_common::db::design::NetType;
    use fpga_common::util::generator::{IN0, IN1, OUT0, grid_device, grid_node};
    use std::sync::Arc;

    #[test]
    fn clock_tree_reaches_all_sinks_with_single_drivers() {
        let device = Arc::new(grid_device(4, 4));
        let graph = RouteGraph::new(Arc::clone(&device));
        let mut design = Design::new("t".to_string());
        let clk = design.add_net("clk".to_string(), NetType::Clock);
        design.add_pin("clk_o".to_string(), clk, grid_node(4, 0, 0, OUT0), true);
        design.add_pin("clk_i0".to_string(), clk, grid_node(4, 3, 0, IN0), false);
        design.add_pin("clk_i1".to_string(), clk, grid_node(4, 3, 3, IN1), false);

        let pips = BfsGlobalRouter
            .route(&device, &graph, &design, clk)
            .expect("routable");

        let mut driver: HashMap<NodeId, NodeId> = HashMap::new();
        for pip in &pips {
            assert!(device.children(pip.start).contains(&pip.end));
            assert!(driver.insert(pip.end, pip.start).is_none(), "double driver");
        }
        let ends: Vec<NodeId> = pips.iter().map(|p| p.end).collect();
        assert!(ends.contains(&grid_node(4, 3, 0, IN0)));
        assert!(ends.contains(&grid_node(4, 3, 3, IN1)));
    }

    #[test]
    fn preserved_nodes_are_avoided() {
        let device = Arc::new(grid_device(3, 1));
        let graph = RouteGraph::new(Arc::clone(&device));
        // Wall off the straight path; 3x1 leaves no detour.
        graph.preserve(grid_node(3, 0, 0, fpga_common::util::generator::WIRE_E), NetId(7));

        let mut design = Design::new("t".to_string());
        let clk = design.add_net("clk".to_string(), NetType::Clock);
        design.add_pin("clk_o".to_string(), clk, grid_node(3, 0, 0, OUT0), true);
        design.add_pin("clk_i".to_string(), clk, grid_node(3, 2, 0, IN0), false);

        assert!(matches!(
            BfsGlobalRouter.route(&device, &graph, &design, clk),
            Err(RouteError::GlobalNet { .. })
        ));
    }
}
