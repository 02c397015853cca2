//! Tick-based town economy simulation.
//!
//! Drives a [`ts_core::World`] forward in time: generators and producers
//! make goods, dwellings consume them, each market's demand moves its prices,
//! traders exchange stock with their market's commons, merchants carry goods
//! between markets, and markets grow or shrink with how well they are
//! supplied. Each of those stages is a [`System`]; [`Simulation`] runs them in
//! a fixed order every tick and is also the entry point for placement and
//! build mode.

/// Blueprint catalogs: loading, validation, and installing into a world.
pub mod catalog;
/// Simulation clock for tracking ticks and elapsed simulated time.
pub mod clock;
/// Configuration types for simulation runs.
pub mod config;
/// Mutable context passed to systems each tick.
pub mod context;
/// Error types for the simulation crate.
pub mod error;
/// Simulation event types and the event log.
pub mod event;
/// Market population growth and dwelling spawning.
pub mod growth;
/// Merchants travelling and trading along routes.
pub mod merchant;
/// Market demand and prices.
pub mod pricing;
/// Generators, producers, and consumption.
pub mod production;
/// Top-level simulation orchestrator.
pub mod simulation;
/// The trait that all simulation systems implement.
pub mod system;
/// Trader bids and settlement against market commons.
pub mod trade;
/// Starting map generation.
pub mod worldgen;

/// Re-export of [`catalog::Catalog`].
pub use catalog::Catalog;
/// Re-export of [`clock::SimClock`].
pub use clock::SimClock;
/// Re-exports of the configuration types.
pub use config::{PricingConfig, SimConfig, TradeConfig, WorldgenConfig};
/// Re-export of [`context::SimContext`].
pub use context::SimContext;
/// Re-exports of [`error::SimError`] and [`error::SimResult`].
pub use error::{SimError, SimResult};
/// Re-exports of [`event::EventLog`], [`event::SimEvent`], and [`event::SimEventKind`].
pub use event::{EventLog, SimEvent, SimEventKind};
/// Re-export of [`simulation::Simulation`].
pub use simulation::Simulation;
/// Re-export of [`system::System`].
pub use system::System;
/// Re-exports of the standard family handles.
pub use worldgen::{PLAYER, TOWN};
