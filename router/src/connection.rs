use fpga_common::db::indices::{NetId, PinId, RnodeId};

/// Tile-space search window of one connection. Expansion never pushes a
/// non-target node whose tile falls outside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x_min: i16,
    pub x_max: i16,
    pub y_min: i16,
    pub y_max: i16,
}

impl BoundingBox {
    pub fn of_span(
        ax: i16,
        ay: i16,
        bx: i16,
        by: i16,
        ext_x: i16,
        ext_y: i16,
        width: i16,
        height: i16,
    ) -> Self {
        Self {
            x_min: (ax.min(bx) - ext_x).max(0),
            x_max: (ax.max(bx) + ext_x).min(width - 1),
            y_min: (ay.min(by) - ext_y).max(0),
            y_max: (ay.max(by) + ext_y).min(height - 1),
        }
    }

    #[inline(always)]
    pub fn contains(&self, x: i16, y: i16) -> bool {
        x >= self.x_min && x <= self.x_max && y >= self.y_min && y <= self.y_max
    }

    /// Grows the window, clamped to the device. Returns false once the
    /// window already covers everything it can.
    pub fn enlarge(&mut self, dx: i16, dy: i16, width: i16, height: i16) -> bool {
        let before = *self;
        self.x_min = (self.x_min - dx).max(0);
        self.x_max = (self.x_max + dx).min(width - 1);
        self.y_min = (self.y_min - dy).max(0);
        self.y_max = (self.y_max + dy).min(height - 1);
        *self != before
    }
}

/// One source-to-sink routing requirement of a net.
pub struct Connection {
    /// Index of the owning wrapper in the router's net list.
    pub net: usize,
    pub net_id: NetId,
    pub sink_pin: PinId,
    pub source_rnode: RnodeId,
    pub sink_rnode: RnodeId,
    /// Additional acceptable terminals (ECO route-throughs).
    pub alt_sink_rnodes: Vec<RnodeId>,
    pub sink_x: i16,
    pub sink_y: i16,
    pub sink_slr: u8,
    pub cross_slr: bool,
    pub hpwl: u16,
    pub bbox: BoundingBox,
    pub criticality: f32,
    /// Current path, sink first. Empty while unrouted.
    pub rnodes: Vec<RnodeId>,
    pub routed: bool,
}

impl Connection {
    pub fn is_terminal(&self, rnode: RnodeId) -> bool {
        rnode == self.sink_rnode || self.alt_sink_rnodes.contains(&rnode)
    }
}

/// Per-net routing state shared by the net's connections.
pub struct NetWrapper {
    pub net: NetId,
    pub source_rnode: RnodeId,
    pub connections: Vec<usize>,
    pub x_center: f32,
    pub y_center: f32,
    pub double_hpwl: f32,
}

impl NetWrapper {
    pub fn fanout(&self) -> usize {
        self.connections.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bbox_span_is_clamped_to_device() {
        let b = BoundingBox::of_span(1, 0, 3, 2, 3, 15, 8, 8);
        assert_eq!(b, BoundingBox {
            x_min: 0,
            x_max: 6,
            y_min: 0,
            y_max: 7,
        });
        assert!(b.contains(6, 7));
        assert!(!b.contains(7, 0));
    }

    #[test]
    fn enlarge_is_monotonic_and_saturates() {
        let mut b = BoundingBox::of_span(4, 4, 4, 4, 0, 0, 10, 10);
        let mut prev = b;
        while b.enlarge(1, 2, 10, 10) {
            assert!(b.x_min <= prev.x_min && b.x_max >= prev.x_max);
            assert!(b.y_min <= prev.y_min && b.y_max >= prev.y_max);
            prev = b;
        }
        assert_eq!(b, BoundingBox {
            x_min: 0,
            x_max: 9,
            y_min: 0,
            y_max: 9,
        });
        assert!(!b.enlarge(1, 2, 10, 10));
    }
}
