//! Core types for Township: the entity store, components, and the world model.
//!
//! This crate holds the data the simulation runs on. It has no notion of
//! time; the systems that advance the economy live in `ts-simulation`. You
//! can build a [`World`] by hand, as the tests do, or load one from a
//! blueprint catalog.

/// The closed set of component kinds and their column storage.
pub mod component;
/// Entity handles and families.
pub mod entity;
/// Error types used throughout the crate.
pub mod error;
/// Grid snapping and cell occupancy.
pub mod grid;
/// Market radius checks and the market ↔ influencee index.
pub mod influence;
/// Typed views over entities that carry a set of components.
pub mod query;
/// The entity store.
pub mod registry;
/// The world model that owns the store, families, grid, and index.
pub mod world;

/// Re-export component types.
pub use component::{
    Amounts, Component, Demander, Dweller, Footprint, Generator, Ghost, Inventory, Market,
    Merchant, Named, Pickable, Price, Producer, Rates, RenderMesh, RenderTex, Route, Site, Stop,
    Trader,
};
/// Re-export entity types.
pub use entity::{EntityId, Family, FamilyId};
/// Re-export error types.
pub use error::{CoreError, CoreResult};
/// Re-export grid helpers.
pub use grid::Grid;
/// Re-export the store.
pub use registry::{EntityBuilder, Registry};
/// Re-export the typed entity views.
pub use query::{Query, View, ViewIter};
/// Re-export the world model.
pub use world::World;
