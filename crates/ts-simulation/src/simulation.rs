use glam::Vec2;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info};
use ts_core::component::{Footprint, Ghost, Market, Named, Price, RenderMesh, Route, Site, Trader};
use ts_core::entity::{EntityId, Family, FamilyId};
use ts_core::world::World;

use crate::catalog::Catalog;
use crate::clock::SimClock;
use crate::config::SimConfig;
use crate::context::SimContext;
use crate::error::{SimError, SimResult};
use crate::event::{EventLog, SimEvent, SimEventKind};
use crate::growth::{self, GrowthSystem};
use crate::merchant::{self, MerchantSystem};
use crate::pricing::PricingSystem;
use crate::production::{ConsumptionSystem, GeneratorSystem, ProducerSystem};
use crate::system::{System, Vacant};
use crate::trade::TradeSystem;
use crate::worldgen;

/// The top-level simulation orchestrator.
///
/// Owns the world, clock, RNG, event log, and registered systems.
/// Drives the tick loop and is the entry point for everything a player can
/// do to the town between ticks.
pub struct Simulation {
    world: World,
    config: SimConfig,
    clock: SimClock,
    rng: StdRng,
    events: EventLog,
    systems: Vec<Box<dyn System>>,
    initialized: bool,
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("tick", &self.clock.tick())
            .field("systems", &self.systems.len())
            .field("events", &self.events.len())
            .finish()
    }
}

impl Simulation {
    /// Create a simulation over `world` with the standard systems registered:
    /// generators, producers, consumption, pricing, trade, merchants, growth.
    pub fn new(world: World, config: SimConfig) -> Self {
        let mut sim = Self::empty(world, config);
        sim.add_system(GeneratorSystem::new());
        sim.add_system(ProducerSystem::new());
        sim.add_system(ConsumptionSystem::new());
        sim.add_system(PricingSystem::new());
        sim.add_system(TradeSystem::new());
        sim.add_system(MerchantSystem::new());
        sim.add_system(GrowthSystem::new());
        sim
    }

    /// Create a simulation with no systems registered.
    pub fn empty(world: World, config: SimConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        let events = EventLog::new(config.max_events);
        Self {
            world,
            config,
            clock: SimClock::new(),
            rng,
            events,
            systems: Vec::new(),
            initialized: false,
        }
    }

    /// Build a fresh town: install `catalog` into an empty map and lay out
    /// markets, industries, dwellings, and a merchant route.
    pub fn generate(catalog: &Catalog, config: SimConfig) -> SimResult<Self> {
        config.validate()?;
        let mut world = World::new(config.map_width, config.map_height);
        catalog.install(&mut world)?;

        let mut sim = Self::new(world, config);
        worldgen::generate_map(&mut sim.world, &mut sim.rng, &sim.config)?;
        info!(
            seed = sim.config.seed,
            entities = sim.world.entities().len(),
            "simulation ready"
        );
        Ok(sim)
    }

    /// Register a system. Systems are ticked in registration order.
    pub fn add_system<S: System + 'static>(&mut self, system: S) {
        self.systems.push(Box::new(system));
    }

    /// Initialize all registered systems.
    pub fn init(&mut self) -> SimResult<()> {
        if self.initialized {
            return Ok(());
        }
        self.run_systems(0.0, true)?;
        self.initialized = true;
        Ok(())
    }

    /// Advance the simulation by one tick covering `delta` seconds.
    pub fn tick(&mut self, delta: f64) -> SimResult<()> {
        if !delta.is_finite() || delta <= 0.0 {
            return Err(SimError::InvalidDelta(delta));
        }
        if !self.initialized {
            self.init()?;
        }

        self.clock.advance(delta);
        self.run_systems(delta, false)
    }

    /// Advance the simulation by `n` ticks of `delta` seconds each.
    pub fn run(&mut self, n: u64, delta: f64) -> SimResult<()> {
        for _ in 0..n {
            self.tick(delta)?;
        }
        Ok(())
    }

    fn run_systems(&mut self, delta: f64, init: bool) -> SimResult<()> {
        for i in 0..self.systems.len() {
            let mut system = std::mem::replace(&mut self.systems[i], Box::new(Vacant));
            let mut ctx = SimContext {
                world: &mut self.world,
                clock: &self.clock,
                events: &mut self.events,
                rng: &mut self.rng,
                config: &self.config,
                delta,
            };
            let result = if init {
                system.init(&mut ctx)
            } else {
                system.tick(&mut ctx)
            };
            self.systems[i] = system;
            result?;
        }
        Ok(())
    }

    fn emit(&mut self, kind: SimEventKind, description: impl Into<String>) {
        self.events
            .push(SimEvent::new(self.clock.tick(), kind, description));
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn clock(&self) -> &SimClock {
        &self.clock
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Access a system by downcasting to a concrete type.
    pub fn get_system<T: System + 'static>(&self) -> Option<&T> {
        self.systems
            .iter()
            .find_map(|s| s.as_any().downcast_ref::<T>())
    }

    /// Access a system mutably by downcasting to a concrete type.
    pub fn get_system_mut<T: System + 'static>(&mut self) -> Option<&mut T> {
        self.systems
            .iter_mut()
            .find_map(|s| s.as_any_mut().downcast_mut::<T>())
    }

    /// Extract the world, consuming the simulation.
    pub fn into_world(self) -> World {
        self.world
    }

    pub fn current_tick(&self) -> u64 {
        self.clock.tick()
    }

    // -----------------------------------------------------------------------
    // Placement
    // -----------------------------------------------------------------------

    /// Where `blueprint` would land if dropped at `position`.
    pub fn snap(&self, blueprint: EntityId, position: Vec2) -> SimResult<Vec2> {
        let footprint = self.world.entities().get::<Footprint>(blueprint)?.dimensions;
        Ok(self.world.snap(position, footprint))
    }

    pub fn can_place(&self, blueprint: EntityId, position: Vec2) -> SimResult<bool> {
        let snapped = self.snap(blueprint, position)?;
        Ok(self.world.can_place(blueprint, snapped)?)
    }

    /// Place a copy of `blueprint` at `position` without charging anyone.
    pub fn try_place(&mut self, blueprint: EntityId, position: Vec2) -> SimResult<Option<EntityId>> {
        let Some(placed) = self.world.try_place(blueprint, position)? else {
            return Ok(None);
        };
        let description = format!("{} was built", self.world.entities().name_of(placed));
        self.emit(
            SimEventKind::Placed {
                entity: placed,
                blueprint,
            },
            description,
        );
        Ok(Some(placed))
    }

    /// Remove an entity from the map.
    pub fn destroy(&mut self, entity: EntityId) -> SimResult<()> {
        let description = format!("{} was torn down", self.world.entities().name_of(entity));
        self.world.destroy(entity)?;
        self.emit(SimEventKind::Destroyed { entity }, description);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Markets
    // -----------------------------------------------------------------------

    pub fn market_at(&self, position: Vec2) -> Option<EntityId> {
        self.world.market_at(position)
    }

    /// True if `entity`'s site lies inside `market`'s region.
    pub fn in_market(&self, entity: EntityId, market: EntityId) -> SimResult<bool> {
        let entities = self.world.entities();
        let site = entities.get::<Site>(entity)?;
        let market_site = entities.get::<Site>(market)?;
        let state = entities.get::<Market>(market)?;
        Ok(self.world.in_market(site, market_site, state))
    }

    pub fn market_stock(&self, market: EntityId, commodity: EntityId) -> SimResult<u32> {
        Ok(self.world.market_stock(market, commodity)?)
    }

    pub fn market_demand(&self, market: EntityId, commodity: EntityId) -> SimResult<f64> {
        Ok(self.world.market_demand(market, commodity)?)
    }

    /// Build a dwelling somewhere inside `market`'s radius.
    pub fn spawn_dwelling(&mut self, market: EntityId) -> SimResult<Option<EntityId>> {
        let Some(dwelling) = growth::spawn_dwelling(&mut self.world, &mut self.rng, market)? else {
            return Ok(None);
        };
        let description = format!(
            "a new dwelling went up near {}",
            self.world.entities().name_of(market)
        );
        self.emit(SimEventKind::DwellingSpawned { market, dwelling }, description);
        Ok(Some(dwelling))
    }

    // -----------------------------------------------------------------------
    // Families, merchants, routes
    // -----------------------------------------------------------------------

    pub fn families(&self) -> &[Family] {
        self.world.families()
    }

    pub fn family(&self, id: FamilyId) -> SimResult<&Family> {
        Ok(self.world.family(id)?)
    }

    /// Hire a new merchant for `family` from the catalog's merchant template.
    pub fn hire_merchant(&mut self, family: FamilyId, name: &str) -> SimResult<EntityId> {
        let proto = self
            .world
            .merchant_blueprint()
            .ok_or(SimError::MissingBlueprint("merchant"))?;
        merchant::hire(&mut self.world, proto, family, name)
    }

    pub fn assign_route(&mut self, merchant: EntityId, route: Route) -> SimResult<()> {
        merchant::assign_route(&mut self.world, merchant, route)
    }

    pub fn add_route(&mut self, route: Route) {
        self.world.add_route(route);
    }

    pub fn routes(&self) -> &[Route] {
        self.world.routes()
    }

    // -----------------------------------------------------------------------
    // Build mode
    // -----------------------------------------------------------------------

    /// Start planning a building: spawns a ghost of `blueprint` at the
    /// snapped `position`. Ghosts hold no cells and are skipped by every
    /// system.
    pub fn begin_build(&mut self, blueprint: EntityId, position: Vec2) -> SimResult<EntityId> {
        let entities = self.world.entities();
        let footprint = *entities.get::<Footprint>(blueprint)?;
        let mesh = entities.try_get::<RenderMesh>(blueprint).cloned();
        let name = format!("{} (planned)", entities.name_of(blueprint));
        let position = self.world.snap(position, footprint.dimensions);

        let ghost = self
            .world
            .entities_mut()
            .spawn()
            .with(Named::new(name))
            .with(footprint)
            .maybe(mesh)
            .with(Ghost { proto: blueprint })
            .with(Site { position })
            .id();
        debug!(%ghost, %blueprint, "build started");
        Ok(ghost)
    }

    pub fn move_ghost(&mut self, ghost: EntityId, position: Vec2) -> SimResult<()> {
        self.world.entities().get::<Ghost>(ghost)?;
        let footprint = self.world.entities().get::<Footprint>(ghost)?.dimensions;
        let position = self.world.snap(position, footprint);
        self.world.entities_mut().get_mut::<Site>(ghost)?.position = position;
        Ok(())
    }

    /// Build the ghost's blueprint where the ghost stands, paid for by
    /// `family`.
    ///
    /// Returns `None` and leaves everything untouched if the family cannot
    /// afford the blueprint or the spot is taken.
    pub fn confirm_build(&mut self, ghost: EntityId, family: FamilyId) -> SimResult<Option<EntityId>> {
        let blueprint = self.world.entities().get::<Ghost>(ghost)?.proto;
        let position = self.world.entities().get::<Site>(ghost)?.position;
        let cost = self
            .world
            .entities()
            .try_get::<Price>(blueprint)
            .map_or(0.0, |p| p.price);
        let balance = self.world.family(family)?.balance;
        if balance < cost {
            debug!(%ghost, %family, cost, balance, "build rejected, cannot afford");
            return Ok(None);
        }

        let Some(placed) = self.try_place(blueprint, position)? else {
            return Ok(None);
        };
        self.world.family_mut(family)?.balance -= cost;
        if let Some(trader) = self.world.entities_mut().try_get_mut::<Trader>(placed) {
            trader.family = family;
        }
        self.world.destroy(ghost)?;
        Ok(Some(placed))
    }

    pub fn cancel_build(&mut self, ghost: EntityId) -> SimResult<()> {
        self.world.entities().get::<Ghost>(ghost)?;
        self.world.destroy(ghost)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worldgen::{PLAYER, TOWN};
    use ts_core::component::{Dweller, Inventory, Merchant, Stop};

    fn town(seed: u64) -> Simulation {
        Simulation::generate(&Catalog::builtin(), SimConfig::default().with_seed(seed)).unwrap()
    }

    fn markets(sim: &Simulation) -> Vec<EntityId> {
        sim.world().entities().view::<(Market, Site)>().iter().collect()
    }

    fn total_stock(sim: &Simulation) -> u32 {
        sim.world()
            .entities()
            .view::<(Inventory,)>()
            .iter()
            .filter_map(|e| sim.world().entities().try_get::<Inventory>(e))
            .map(Inventory::total)
            .sum()
    }

    #[test]
    fn full_tick_integration() {
        let mut sim = town(42);
        sim.run(200, 1.0).unwrap();

        assert_eq!(sim.current_tick(), 200);
        assert!((sim.clock().elapsed_secs() - 200.0).abs() < 1e-9);
        assert!(!sim.events().is_empty());
        assert!(total_stock(&sim) > 0);
    }

    #[test]
    fn custom_system_registration() {
        #[derive(Debug)]
        struct CustomSystem {
            ticked: bool,
            delta: f64,
        }
        impl System for CustomSystem {
            fn name(&self) -> &str {
                "custom"
            }
            fn tick(&mut self, ctx: &mut SimContext<'_>) -> SimResult<()> {
                self.ticked = true;
                self.delta = ctx.delta;
                Ok(())
            }
            fn as_any(&self) -> &dyn std::any::Any {
                self
            }
            fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
                self
            }
        }

        let mut sim = Simulation::empty(World::new(10, 10), SimConfig::default());
        sim.add_system(CustomSystem {
            ticked: false,
            delta: 0.0,
        });

        sim.tick(0.25).unwrap();

        let custom = sim.get_system::<CustomSystem>().unwrap();
        assert!(custom.ticked);
        assert_eq!(custom.delta, 0.25);
    }

    #[test]
    fn standard_systems_run_in_order() {
        let sim = Simulation::new(World::new(10, 10), SimConfig::default());
        let names: Vec<&str> = sim.systems.iter().map(|s| s.name()).collect();
        assert_eq!(
            names,
            [
                "generators",
                "producers",
                "consumption",
                "pricing",
                "trade",
                "merchants",
                "growth"
            ]
        );
        assert!(sim.get_system::<GrowthSystem>().is_some());
    }

    #[test]
    fn deterministic_rng() {
        let run = |seed| {
            let mut sim = town(seed);
            sim.run(300, 0.5).unwrap();
            sim.events()
                .events()
                .iter()
                .map(|e| e.description.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(run(123), run(123));
    }

    #[test]
    fn rejects_bad_time_steps() {
        let mut sim = town(1);
        for delta in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(sim.tick(delta), Err(SimError::InvalidDelta(_))));
        }
        assert_eq!(sim.current_tick(), 0);
    }

    #[test]
    fn empty_world_no_crash() {
        let mut sim = Simulation::new(World::new(8, 8), SimConfig::default());
        sim.run(100, 1.0).unwrap();
        assert_eq!(sim.current_tick(), 100);
        assert!(sim.events().is_empty());
    }

    #[test]
    fn merchant_makes_the_rounds() {
        let mut sim = town(42);
        sim.run(400, 1.0).unwrap();
        let arrivals = sim
            .events()
            .events()
            .iter()
            .filter(|e| matches!(e.kind, SimEventKind::Arrived { .. }))
            .count();
        assert!(arrivals >= 2, "merchant arrived {arrivals} times");
    }

    #[test]
    fn build_mode_places_and_charges() {
        let mut sim = town(42);
        let dwelling = sim.world().blueprint_named("Dwelling").unwrap();
        let before = sim.family(PLAYER).unwrap().balance;
        let cost = sim.world().entities().get::<Price>(dwelling).unwrap().price;

        let ghost = sim.begin_build(dwelling, Vec2::new(2.2, 2.7)).unwrap();
        assert_eq!(
            sim.world().entities().get::<Site>(ghost).unwrap().position,
            Vec2::new(2.5, 2.5)
        );
        sim.move_ghost(ghost, Vec2::new(3.9, 3.1)).unwrap();

        let placed = sim.confirm_build(ghost, PLAYER).unwrap().unwrap();
        assert_eq!(
            sim.world().entities().get::<Site>(placed).unwrap().position,
            Vec2::new(3.5, 3.5)
        );
        assert!(!sim.world().entities().contains(ghost));
        assert!(!sim.world().entities().has::<Ghost>(placed));
        assert_eq!(sim.family(PLAYER).unwrap().balance, before - cost);
        assert!(!sim.can_place(dwelling, Vec2::new(3.5, 3.5)).unwrap());
    }

    #[test]
    fn build_mode_rejects_what_the_family_cannot_afford() {
        let config = SimConfig::default().with_seed(42).with_player_balance(0.0);
        let mut sim = Simulation::generate(&Catalog::builtin(), config).unwrap();
        let market = sim.world().blueprint_named("Market").unwrap();
        let entities = sim.world().entities().len();

        let ghost = sim.begin_build(market, Vec2::new(3.0, 3.0)).unwrap();
        assert_eq!(sim.confirm_build(ghost, PLAYER).unwrap(), None);
        assert!(sim.world().entities().contains(ghost));
        assert_eq!(sim.family(PLAYER).unwrap().balance, 0.0);

        sim.cancel_build(ghost).unwrap();
        assert_eq!(sim.world().entities().len(), entities);
    }

    #[test]
    fn ghosts_are_ignored_by_systems() {
        let mut sim = town(42);
        let dwelling = sim.world().blueprint_named("Dwelling").unwrap();
        let ghost = sim.begin_build(dwelling, Vec2::new(2.5, 2.5)).unwrap();
        sim.run(50, 1.0).unwrap();
        assert!(sim.events().events_for_entity(ghost).is_empty());
        assert!(sim.world().market_of(ghost).is_none());
    }

    #[test]
    fn spawn_dwelling_emits_an_event() {
        let mut sim = town(42);
        let market = markets(&sim)[0];
        let before = sim.world().entities().view::<(Dweller, Site)>().count();
        let dwelling = sim.spawn_dwelling(market).unwrap().unwrap();
        assert!(sim.in_market(dwelling, market).unwrap());
        assert_eq!(
            sim.world().entities().view::<(Dweller, Site)>().count(),
            before + 1
        );
        assert_eq!(sim.events().events_for_entity(dwelling).len(), 1);
    }

    #[test]
    fn hired_merchant_can_be_routed() {
        let mut sim = town(42);
        let markets = markets(&sim);
        assert_eq!(markets.len(), 2);
        let (first, second) = (markets[0], markets[1]);
        let merchant = sim.hire_merchant(PLAYER, "Peddler").unwrap();
        let route = Route::new("Loop", vec![Stop::new(first), Stop::new(second)]);
        sim.add_route(route.clone());
        sim.assign_route(merchant, route).unwrap();

        assert_eq!(sim.routes().len(), 2);
        let trader = sim.world().entities().get::<Trader>(merchant).unwrap();
        assert_eq!(trader.family, PLAYER);
        let state = sim.world().entities().get::<Merchant>(merchant).unwrap();
        assert_eq!(state.route.as_ref().unwrap().name, "Loop");
        assert_ne!(trader.family, TOWN);
    }

    #[test]
    fn destroy_emits_and_frees_cells() {
        let mut sim = town(42);
        let dwelling = sim.world().blueprint_named("Dwelling").unwrap();
        let placed = sim.try_place(dwelling, Vec2::new(1.5, 1.5)).unwrap().unwrap();
        sim.destroy(placed).unwrap();
        assert!(sim.can_place(dwelling, Vec2::new(1.5, 1.5)).unwrap());
        assert_eq!(sim.events().events_for_entity(placed).len(), 2);
    }

    #[test]
    fn destroying_a_route_market_keeps_the_run_going() {
        let mut sim = town(42);
        sim.tick(1.0).unwrap();
        let markets = markets(&sim);
        sim.destroy(markets[1]).unwrap();
        sim.run(50, 1.0).unwrap();

        let routed: Vec<EntityId> = sim
            .world()
            .entities()
            .view::<(Merchant,)>()
            .iter()
            .filter(|m| {
                sim.world()
                    .entities()
                    .get::<Merchant>(*m)
                    .is_ok_and(|state| state.route.is_some())
            })
            .collect();
        assert!(!routed.is_empty());
        for merchant in routed {
            let state = sim.world().entities().get::<Merchant>(merchant).unwrap();
            let route = state.route.as_ref().unwrap();
            assert!(route.stops.iter().all(|stop| stop.destination != markets[1]));
        }
        assert!(sim.routes().iter().all(|r| r.stops.len() == 1));
    }

    #[test]
    fn destroying_every_stop_idles_the_merchant() {
        let mut sim = town(42);
        for market in markets(&sim) {
            sim.destroy(market).unwrap();
        }
        sim.run(20, 1.0).unwrap();
        assert!(sim.routes().is_empty());
        let merchants = sim.world().entities().view::<(Merchant,)>();
        for merchant in merchants.iter() {
            assert!(sim.world().entities().get::<Merchant>(merchant).unwrap().route.is_none());
        }
    }
}
