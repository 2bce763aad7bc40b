use thiserror::Error;

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("invalid router configuration: {0}")]
    Config(String),

    #[error("net '{net}' has no source pin")]
    MissingSource { net: String },

    #[error("sink '{sink}' of net '{net}' is unroutable after {iterations} iterations")]
    Unroutable {
        net: String,
        sink: String,
        iterations: usize,
    },

    #[error("congestion did not resolve within {0} iterations")]
    NoConvergence(usize),

    #[error("{count} nodes are claimed by more than one net after finalization")]
    PipConflict { count: usize },

    #[error("global net '{net}' cannot be routed: {reason}")]
    GlobalNet { net: String, reason: String },
}
