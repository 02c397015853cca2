use crate::entity::{EntityId, FamilyId};

/// Alias for `Result<T, CoreError>`.
pub type CoreResult<T> = Result<T, CoreError>;

/// Invariant violations raised by the entity store and world model.
///
/// Rejected operations (an occupied cell, an unaffordable purchase) are not
/// errors; they come back as `false` or `None`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoreError {
    /// The handle is stale or was never issued.
    #[error("entity not found: {0}")]
    EntityNotFound(EntityId),

    /// The entity exists but lacks a required component.
    #[error("entity {entity} has no {component} component")]
    ComponentNotFound {
        /// The entity queried.
        entity: EntityId,
        /// Name of the missing kind.
        component: &'static str,
    },

    /// The family index is outside the family list.
    #[error("{0} does not exist")]
    FamilyNotFound(FamilyId),
}
