use crate::connection::Connection;

/// Hard ceiling so no connection can dominate the cost function outright.
pub const MAX_CRITICALITY: f32 = 0.99;

/// Supplies per-connection criticalities between iterations. The router only
/// reads criticality and per-node delay; how slack is computed is the
/// oracle's business.
pub trait TimingOracle {
    fn update_criticality(&mut self, connections: &mut [Connection], exponent: f32);
}

/// Cheap stand-in for a real timing engine: treats a connection's span as a
/// proxy for its delay, so the longest connections route first and straightest.
pub struct EstimatedTiming;

impl TimingOracle for EstimatedTiming {
    fn update_criticality(&mut self, connections: &mut [Connection], exponent: f32) {
        let max_hpwl = connections
            .iter()
            .map(|c| c.hpwl)
            .max()
            .unwrap_or(1)
            .max(1) as f32;
        for conn in connections {
            let relative = conn.hpwl as f32 / max_hpwl;
            conn.criticality = relative.powf(exponent).min(MAX_CRITICALITY);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::BoundingBox;
    use fpga_common::db::indices::{NetId, PinId, RnodeId};

    fn conn(hpwl: u16) -> Connection {
        Connection {
            net: 0,
            net_id: NetId(0),
            sink_pin: PinId(0),
            source_rnode: RnodeId(0),
            sink_rnode: RnodeId(1),
            alt_sink_rnodes: Vec::new(),
            sink_x: 0,
            sink_y: 0,
            sink_slr: 0,
            cross_slr: false,
            hpwl,
            bbox: BoundingBox {
                x_min: 0,
                x_max: 0,
                y_min: 0,
                y_max: 0,
            },
            criticality: 0.0,
            rnodes: Vec::new(),
            routed: false,
        }
    }

    #[test]
    fn criticality_is_shaped_and_capped() {
        let mut conns = vec![conn(10), conn(5), conn(1)];
        EstimatedTiming.update_criticality(&mut conns, 3.0);

        assert_eq!(conns[0].criticality, MAX_CRITICALITY);
        assert!((conns[1].criticality - 0.125).abs() < 1e-6);
        assert!(conns[2].criticality < conns[1].criticality);
    }
}
