use ts_core::entity::EntityId;
use ts_core::error::CoreError;

pub type SimResult<T> = Result<T, SimError>;

#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("time step must be positive and finite, got {0}")]
    InvalidDelta(f64),

    #[error("invalid catalog: {0}")]
    Catalog(String),

    #[error("invalid config: {0}")]
    Config(String),

    #[error("invalid route: {0}")]
    InvalidRoute(String),

    #[error("merchant {merchant} is at stop {index} of a route with {len} stops")]
    StopOutOfRange {
        merchant: EntityId,
        index: usize,
        len: usize,
    },

    #[error("the catalog has no {0} blueprint")]
    MissingBlueprint(&'static str),
}
