use crate::db::design::{Design, NetType};
use crate::db::device::Device;
use crate::db::indices::{NetId, NodeId};
use dashmap::DashMap;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Post-route verification: no routing resource is claimed by two nets, and
/// every net's pips form a source-rooted tree reaching all routed sinks.
pub fn run(device: &Device, design: &Design) -> Result<(), String> {
    log::info!("Starting Routing Verification (Shorts/Opens)");

    let (shorts_result, opens_result) = rayon::join(
        || check_shorts(device, design),
        || check_opens(design),
    );

    let mut valid = true;
    let mut msgs = Vec::new();

    match shorts_result {
        Err(e) => {
            log::error!("\x1b[31mFAIL\x1b[0m: Resource Conflict Detected");
            log::error!("{}", e);
            msgs.push(e);
            valid = false;
        }
        Ok(_) => log::info!("\x1b[32mPASS\x1b[0m: No node is shared between nets."),
    }

    match opens_result {
        Err(e) => {
            log::error!("\x1b[31mFAIL\x1b[0m: Open Net (Disconnected) Detected");
            log::error!("{}", e);
            msgs.push(e);
            valid = false;
        }
        Ok(_) => log::info!("\x1b[32mPASS\x1b[0m: All routed nets form valid trees."),
    }

    if valid {
        log::info!("\x1b[32mSUCCESS\x1b[0m: VALID ROUTING");
        Ok(())
    } else {
        log::error!("\x1b[31mFAILURE\x1b[0m: INVALID ROUTING ({} Errors)", msgs.len());
        Err(msgs.join("; "))
    }
}

fn check_shorts(device: &Device, design: &Design) -> Result<(), String> {
    let claims: DashMap<NodeId, NetId> = DashMap::new();
    let error_found = AtomicBool::new(false);
    let error_msg = Arc::new(Mutex::new(String::new()));

    design
        .nets
        .par_iter()
        .enumerate()
        .for_each(|(net_idx, net)| {
            if error_found.load(Ordering::Relaxed) {
                return;
            }
            let net_id = NetId::new(net_idx);

            for pip in &net.pips {
                if !device.children(pip.start).contains(&pip.end) {
                    if !error_found.swap(true, Ordering::Relaxed) {
                        *error_msg.lock().unwrap() = format!(
                            "Net '{}': pip {:?} -> {:?} is not an arc of the device",
                            net.name, pip.start, pip.end
                        );
                    }
                    return;
                }
            }

            for node in design.routing_nodes(net_id) {
                if let Some(owner) = claims.insert(node, net_id) {
                    if owner != net_id {
                        let n1 = &design.net(owner).name;
                        if !error_found.swap(true, Ordering::Relaxed) {
                            *error_msg.lock().unwrap() = format!(
                                "SHORT: node '{}' claimed by '{}' and '{}'",
                                device.node(node).name,
                                n1,
                                net.name
                            );
                        }
                        return;
                    }
                }
            }
        });

    if error_found.load(Ordering::Relaxed) {
        Err(error_msg.lock().unwrap().clone())
    } else {
        Ok(())
    }
}

fn check_opens(design: &Design) -> Result<(), String> {
    let error_found = AtomicBool::new(false);
    let error_msg = Arc::new(Mutex::new(String::new()));

    design
        .nets
        .par_iter()
        .enumerate()
        .for_each(|(net_idx, net)| {
            if error_found.load(Ordering::Relaxed) {
                return;
            }
            let net_id = NetId::new(net_idx);
            let routed_sinks: Vec<NodeId> = net
                .sinks
                .iter()
                .filter(|&&p| design.pin(p).routed)
                .map(|&p| design.pin(p).node)
                .collect();
            if routed_sinks.is_empty() {
                return;
            }

            let source = match design.source_node(net_id) {
                Some(s) => s,
                None => {
                    if !error_found.swap(true, Ordering::Relaxed) {
                        *error_msg.lock().unwrap() =
                            format!("Net '{}': routed sinks but no source pin", net.name);
                    }
                    return;
                }
            };

            // Every node must have exactly one driver within the net.
            let mut driver: HashMap<NodeId, NodeId> = HashMap::new();
            let mut adj: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
            for pip in &net.pips {
                if let Some(&other) = driver.get(&pip.end) {
                    if other != pip.start {
                        if !error_found.swap(true, Ordering::Relaxed) {
                            *error_msg.lock().unwrap() = format!(
                                "Net '{}': node {:?} driven twice ({:?} and {:?})",
                                net.name, pip.end, other, pip.start
                            );
                        }
                        return;
                    }
                }
                driver.insert(pip.end, pip.start);
                adj.entry(pip.start).or_default().push(pip.end);
            }

            let mut visited: HashSet<NodeId> = HashSet::new();
            let mut queue = VecDeque::new();
            visited.insert(source);
            queue.push_back(source);
            while let Some(n) = queue.pop_front() {
                if let Some(children) = adj.get(&n) {
                    for &c in children {
                        if visited.insert(c) {
                            queue.push_back(c);
                        }
                    }
                }
            }

            for &sink in &routed_sinks {
                if !visited.contains(&sink) {
                    if !error_found.swap(true, Ordering::Relaxed) {
                        *error_msg.lock().unwrap() = format!(
                            "Net '{}': sink node {:?} not reached from source (Split net).",
                            net.name, sink
                        );
                    }
                    return;
                }
            }

            if net.kind == NetType::Signal && visited.len() < net.pips.len() + 1 {
                // Tree property: |edges| == |nodes| - 1 once every pip is
                // reachable. A surplus means detached cycles.
                if !error_found.swap(true, Ordering::Relaxed) {
                    *error_msg.lock().unwrap() =
                        format!("Net '{}': routing contains detached segments", net.name);
                }
            }
        });

    if error_found.load(Ordering::Relaxed) {
        Err(error_msg.lock().unwrap().clone())
    } else {
        Ok(())
    }
}
