use crate::db::design::{Design, NetType};
use crate::db::device::{Device, NodeDesc, WireKind};
use crate::db::indices::NodeId;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;

// Per-tile node layout: 2 site output pins, 4 site input pins, and one
// unit-length track wire per direction.
pub const OUT0: usize = 0;
pub const OUT1: usize = 1;
pub const IN0: usize = 2;
pub const IN1: usize = 3;
pub const IN2: usize = 4;
pub const IN3: usize = 5;
pub const WIRE_N: usize = 6;
pub const WIRE_E: usize = 7;
pub const WIRE_S: usize = 8;
pub const WIRE_W: usize = 9;

pub const NODES_PER_TILE: usize = 10;

const TAGS: [&str; NODES_PER_TILE] = [
    "OUT0", "OUT1", "IN0", "IN1", "IN2", "IN3", "N", "E", "S", "W",
];

/// Node id of slot `k` in tile (x, y) of a `grid_device` of the given width.
#[inline]
pub fn grid_node(width: u16, x: u16, y: u16, k: usize) -> NodeId {
    NodeId::new((y as usize * width as usize + x as usize) * NODES_PER_TILE + k)
}

/// Builds a synthetic island-style device: a width x height tile grid where
/// each tile holds one logic site (two output pins, four input pins) and four
/// unit track wires. A track wire lands in the adjacent tile and fans out to
/// that tile's wires and input pins. Deterministic, so tests can name nodes
/// by position.
pub fn grid_device(width: u16, height: u16) -> Device {
    let mut dev = Device::new(format!("grid{}x{}", width, height), width, height);

    for y in 0..height {
        for x in 0..width {
            for (k, tag) in TAGS.iter().enumerate() {
                let (kind, end) = match k {
                    OUT0 | OUT1 => (WireKind::PinfeedOut, (x as i16, y as i16)),
                    IN0..=IN3 => (WireKind::PinfeedIn, (x as i16, y as i16)),
                    WIRE_N => (WireKind::Wire, (x as i16, y as i16 + 1)),
                    WIRE_E => (WireKind::Wire, (x as i16 + 1, y as i16)),
                    WIRE_S => (WireKind::Wire, (x as i16, y as i16 - 1)),
                    _ => (WireKind::Wire, (x as i16 - 1, y as i16)),
                };
                dev.add_node(NodeDesc {
                    name: format!("T{}_{}_{}", x, y, tag),
                    kind,
                    tile_x: x as i16,
                    tile_y: y as i16,
                    end_tile_x: end.0,
                    end_tile_y: end.1,
                    slr: 0,
                    length: if kind == WireKind::Wire { 1 } else { 0 },
                    delay: if kind == WireKind::Wire { 1.0 } else { 0.0 },
                });
            }
        }
    }

    for y in 0..height {
        for x in 0..width {
            for out in [OUT0, OUT1] {
                for wire in [WIRE_N, WIRE_E, WIRE_S, WIRE_W] {
                    dev.add_edge(grid_node(width, x, y, out), grid_node(width, x, y, wire));
                }
            }
            for (wire, dx, dy) in [
                (WIRE_N, 0i32, 1i32),
                (WIRE_E, 1, 0),
                (WIRE_S, 0, -1),
                (WIRE_W, -1, 0),
            ] {
                let nx = x as i32 + dx;
                let ny = y as i32 + dy;
                if nx < 0 || ny < 0 || nx >= width as i32 || ny >= height as i32 {
                    continue;
                }
                let from = grid_node(width, x, y, wire);
                for k in [WIRE_N, WIRE_E, WIRE_S, WIRE_W, IN0, IN1, IN2, IN3] {
                    dev.add_edge(from, grid_node(width, nx as u16, ny as u16, k));
                }
            }
        }
    }

    dev
}

/// Generates a random placed-but-unrouted design on a grid device. Site pins
/// are claimed exclusively, so every net is routable in isolation. Seeded for
/// reproducibility.
pub fn random_design(device: &Device, num_nets: usize, max_fanout: usize, seed: u64) -> Design {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut design = Design::new(format!("random_s{}", seed));
    let mut used: HashSet<NodeId> = HashSet::new();
    let (w, h) = (device.width, device.height);

    log::info!(
        "Generating random design: {} nets, fanout <= {} on {}",
        num_nets,
        max_fanout,
        device.name
    );

    for i in 0..num_nets {
        let net = design.add_net(format!("net{}", i), NetType::Signal);

        let (sx, sy, src) = loop {
            let x = rng.gen_range(0..w);
            let y = rng.gen_range(0..h);
            let k = if rng.gen_bool(0.5) { OUT0 } else { OUT1 };
            let node = grid_node(w, x, y, k);
            if used.insert(node) {
                break (x, y, node);
            }
        };
        let src_pin = design.add_pin(format!("net{}_o", i), net, src, true);
        let alt = grid_node(w, sx, sy, if src == grid_node(w, sx, sy, OUT0) { OUT1 } else { OUT0 });
        if !used.contains(&alt) {
            design.pin_mut(src_pin).alternates.push(alt);
        }

        let fanout = rng.gen_range(1..=max_fanout);
        for j in 0..fanout {
            let sink = loop {
                let x = clamp_jitter(&mut rng, sx, w);
                let y = clamp_jitter(&mut rng, sy, h);
                let k = IN0 + rng.gen_range(0..4usize);
                let node = grid_node(w, x, y, k);
                if node != src && used.insert(node) {
                    break node;
                }
            };
            design.add_pin(format!("net{}_i{}", i, j), net, sink, false);
        }
    }

    design
}

// Sink tiles land within a small window of the source so bounding boxes
// stay meaningful on big grids.
fn clamp_jitter(rng: &mut StdRng, center: u16, limit: u16) -> u16 {
    let radius = 4i32;
    let v = center as i32 + rng.gen_range(-radius..=radius);
    v.clamp(0, limit as i32 - 1) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_device_is_structurally_valid() {
        let dev = grid_device(4, 3);
        assert_eq!(dev.num_nodes(), 4 * 3 * NODES_PER_TILE);
        assert!(dev.validate().is_ok());

        // Output pins fan out to the tile's own wires only.
        let out = grid_node(4, 1, 1, OUT0);
        assert_eq!(dev.children(out).len(), 4);
        // Input pins are leaves.
        let inp = grid_node(4, 1, 1, IN0);
        assert!(dev.children(inp).is_empty());
        // An east wire lands one tile over.
        let east = grid_node(4, 1, 1, WIRE_E);
        let desc = dev.node(east);
        assert_eq!((desc.end_tile_x, desc.end_tile_y), (2, 1));
        assert!(dev.children(east).contains(&grid_node(4, 2, 1, IN0)));
    }

    #[test]
    fn edge_wires_do_not_leave_the_grid() {
        let dev = grid_device(3, 3);
        let west = grid_node(3, 0, 0, WIRE_W);
        let south = grid_node(3, 0, 0, WIRE_S);
        assert!(dev.children(west).is_empty());
        assert!(dev.children(south).is_empty());
    }

    #[test]
    fn random_design_claims_pins_exclusively() {
        let dev = grid_device(8, 8);
        let design = random_design(&dev, 12, 3, 7);

        let mut seen = HashSet::new();
        for pin in &design.pins {
            assert!(seen.insert(pin.node), "pin node reused: {:?}", pin.node);
        }
        assert_eq!(design.num_nets(), 12);
    }

    #[test]
    fn random_design_is_deterministic_per_seed() {
        let dev = grid_device(8, 8);
        let a = random_design(&dev, 6, 2, 42);
        let b = random_design(&dev, 6, 2, 42);
        let nodes_a: Vec<_> = a.pins.iter().map(|p| p.node).collect();
        let nodes_b: Vec<_> = b.pins.iter().map(|p| p.node).collect();
        assert_eq!(nodes_a, nodes_b);
    }
}
