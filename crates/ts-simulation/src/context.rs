use rand::rngs::StdRng;
use ts_core::entity::EntityId;
use ts_core::world::World;

use crate::clock::SimClock;
use crate::config::{PricingConfig, SimConfig, TradeConfig};
use crate::event::{EventLog, SimEvent, SimEventKind};

/// Everything a system may touch while it runs.
///
/// The clock has already been advanced when systems tick, so events emitted
/// through [`SimContext::emit`] carry the number of the tick being run.
pub struct SimContext<'a> {
    pub world: &'a mut World,
    pub clock: &'a SimClock,
    pub events: &'a mut EventLog,
    /// Shared seeded generator; systems draw from it in registration order.
    pub rng: &'a mut StdRng,
    pub config: &'a SimConfig,
    /// Simulated seconds covered by this tick.
    ///
    /// Always finite and positive during [`System::tick`]. Zero during
    /// [`System::init`], which runs before any time has passed.
    ///
    /// [`System::tick`]: crate::system::System::tick
    /// [`System::init`]: crate::system::System::init
    pub delta: f64,
}

impl<'a> SimContext<'a> {
    /// Record an event stamped with the current tick.
    pub fn emit(&mut self, kind: SimEventKind, description: impl Into<String>) {
        self.events
            .push(SimEvent::new(self.clock.tick(), kind, description));
    }

    /// Number of the tick being run.
    pub fn tick(&self) -> u64 {
        self.clock.tick()
    }

    /// Pricing settings. Outlives the borrow of the context, so it can be
    /// held across mutable world access.
    pub fn pricing(&self) -> &'a PricingConfig {
        &self.config.pricing
    }

    pub fn trade(&self) -> &'a TradeConfig {
        &self.config.trade
    }

    /// Display name of `entity`, for event descriptions.
    pub fn name_of(&self, entity: EntityId) -> String {
        self.world.entities().name_of(entity)
    }
}
