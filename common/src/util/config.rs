use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub input: InputConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            router: RouterConfig::default(),
            input: InputConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RoutingMode {
    /// Route everything from scratch; existing routing is discarded.
    Full,
    /// Keep routed nets untouched and route only what is missing.
    Partial,
    /// Partial routing with route-through fallbacks for locked designs.
    Eco,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RouterConfig {
    #[serde(default = "default_mode")]
    pub mode: RoutingMode,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_initial_present_congestion_factor")]
    pub initial_present_congestion_factor: f32,
    #[serde(default = "default_present_congestion_multiplier")]
    pub present_congestion_multiplier: f32,
    #[serde(default = "default_historical_congestion_factor")]
    pub historical_congestion_factor: f32,
    #[serde(default = "default_wirelength_weight")]
    pub wirelength_weight: f32,
    #[serde(default = "default_timing_weight")]
    pub timing_weight: f32,
    #[serde(default = "default_share_exponent")]
    pub share_exponent: f32,
    #[serde(default = "default_criticality_exponent")]
    pub criticality_exponent: f32,
    #[serde(default = "default_min_reroute_criticality")]
    pub min_reroute_criticality: f32,
    #[serde(default = "default_reroute_percentage")]
    pub reroute_percentage: f32,
    #[serde(default = "default_use_bounding_box")]
    pub use_bounding_box: bool,
    #[serde(default = "default_bound_box_extension_x")]
    pub bound_box_extension_x: i16,
    #[serde(default = "default_bound_box_extension_y")]
    pub bound_box_extension_y: i16,
    #[serde(default)]
    pub enlarge_bound_box: bool,
    #[serde(default = "default_extension_x_increment")]
    pub extension_x_increment: i16,
    #[serde(default = "default_extension_y_increment")]
    pub extension_y_increment: i16,
    #[serde(default)]
    pub use_uturn_nodes: bool,
    #[serde(default)]
    pub mask_nodes_cross_rclk: bool,
    #[serde(default)]
    pub soft_preserve: bool,
    #[serde(default)]
    pub timing_driven: bool,
    /// Fail the run if any node is still claimed by two nets after
    /// finalization, instead of just reporting the count.
    #[serde(default)]
    pub strict: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            max_iterations: default_max_iterations(),
            initial_present_congestion_factor: default_initial_present_congestion_factor(),
            present_congestion_multiplier: default_present_congestion_multiplier(),
            historical_congestion_factor: default_historical_congestion_factor(),
            wirelength_weight: default_wirelength_weight(),
            timing_weight: default_timing_weight(),
            share_exponent: default_share_exponent(),
            criticality_exponent: default_criticality_exponent(),
            min_reroute_criticality: default_min_reroute_criticality(),
            reroute_percentage: default_reroute_percentage(),
            use_bounding_box: default_use_bounding_box(),
            bound_box_extension_x: default_bound_box_extension_x(),
            bound_box_extension_y: default_bound_box_extension_y(),
            enlarge_bound_box: false,
            extension_x_increment: default_extension_x_increment(),
            extension_y_increment: default_extension_y_increment(),
            use_uturn_nodes: false,
            mask_nodes_cross_rclk: false,
            soft_preserve: false,
            timing_driven: false,
            strict: false,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct InputConfig {
    #[serde(default = "default_device_file")]
    pub device_file: String,
    #[serde(default = "default_design_file")]
    pub design_file: String,
    #[serde(default = "default_output_file")]
    pub output_file: String,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            device_file: default_device_file(),
            design_file: default_design_file(),
            output_file: default_output_file(),
        }
    }
}

fn default_mode() -> RoutingMode {
    RoutingMode::Full
}

fn default_max_iterations() -> usize {
    100
}

fn default_initial_present_congestion_factor() -> f32 {
    0.5
}

fn default_present_congestion_multiplier() -> f32 {
    2.0
}

fn default_historical_congestion_factor() -> f32 {
    1.0
}

fn default_wirelength_weight() -> f32 {
    0.8
}

fn default_timing_weight() -> f32 {
    0.35
}

fn default_share_exponent() -> f32 {
    2.0
}

fn default_criticality_exponent() -> f32 {
    3.0
}

fn default_min_reroute_criticality() -> f32 {
    0.85
}

fn default_reroute_percentage() -> f32 {
    3.0
}

fn default_use_bounding_box() -> bool {
    true
}

fn default_bound_box_extension_x() -> i16 {
    3
}

fn default_bound_box_extension_y() -> i16 {
    15
}

fn default_extension_x_increment() -> i16 {
    1
}

fn default_extension_y_increment() -> i16 {
    2
}

fn default_device_file() -> String {
    "inputs/device.json".to_string()
}

fn default_design_file() -> String {
    "inputs/design.json".to_string()
}

fn default_output_file() -> String {
    "output/routed.json".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.router.max_iterations, 100);
        assert_eq!(config.router.mode, RoutingMode::Full);
        assert_eq!(config.router.present_congestion_multiplier, 2.0);
        assert!(!config.router.enlarge_bound_box);
        assert_eq!(config.input.device_file, "inputs/device.json");
    }
}
