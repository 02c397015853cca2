use rand::rngs::StdRng;
use tracing::{info, warn};
use ts_core::component::{Market, Site};
use ts_core::entity::EntityId;
use ts_core::world::World;

use crate::context::SimContext;
use crate::error::{SimError, SimResult};
use crate::event::SimEventKind;
use crate::system::System;
use crate::worldgen;

/// How well a market is supplied, in `[-1, 1]`.
///
/// Each commodity with local pull scores `d / (1 + d)` for its demand `d`,
/// so a satisfied market (all demand zero) reads `1` and a starving one
/// approaches `-1`. A market nobody pulls from reads `0`.
pub fn prosperity(world: &World, market: EntityId) -> SimResult<f64> {
    let state = world.entities().get::<Market>(market)?;
    let mut total = 0.0;
    let mut counted = 0u32;
    for commodity in world.commodities() {
        if world.market_demand(market, *commodity)? <= 0.0 {
            continue;
        }
        let demand = state.demand_for(*commodity);
        total += demand / (1.0 + demand);
        counted += 1;
    }
    if counted == 0 {
        return Ok(0.0);
    }
    Ok(1.0 - 2.0 * total / f64::from(counted))
}

/// Place a fresh dwelling at a random free spot inside `market`'s radius.
///
/// Returns `None` when no spot fits.
pub fn spawn_dwelling(
    world: &mut World,
    rng: &mut StdRng,
    market: EntityId,
) -> SimResult<Option<EntityId>> {
    let dwelling = world
        .dwelling_blueprint()
        .ok_or(SimError::MissingBlueprint("dwelling"))?;
    let centre = world.entities().get::<Site>(market)?.position;
    let radius = world.entities().get::<Market>(market)?.radius;
    worldgen::place_near(world, rng, dwelling, centre, radius)
}

/// What a market's growth accumulator did this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Steady,
    /// Residents gained.
    Grew(u32),
    /// Residents lost.
    Shrank(u32),
}

/// Integrate `signal` into the market's growth accumulator and apply every
/// whole population step it holds.
///
/// Only the fractional part stays in the accumulator. Losses stop at an
/// empty market.
pub fn grow(market: &mut Market, signal: f64, delta: f64) -> Step {
    let population = f64::from(market.population);
    market.growth += market.growth_rate * signal * delta * (1.0 + population);
    let whole = market.growth.trunc();
    if whole == 0.0 {
        return Step::Steady;
    }
    market.growth -= whole;

    let units = whole.abs().min(f64::from(u32::MAX)) as u32;
    if whole > 0.0 {
        market.population = market.population.saturating_add(units);
        return Step::Grew(units);
    }
    let lost = units.min(market.population);
    market.population -= lost;
    if lost == 0 {
        Step::Steady
    } else {
        Step::Shrank(lost)
    }
}

/// Grows or shrinks each market's population and builds a dwelling for
/// every new resident.
#[derive(Debug, Default)]
pub struct GrowthSystem;

impl GrowthSystem {
    pub fn new() -> Self {
        Self
    }
}

impl System for GrowthSystem {
    fn name(&self) -> &str {
        "growth"
    }

    fn tick(&mut self, ctx: &mut SimContext<'_>) -> SimResult<()> {
        let markets: Vec<EntityId> = ctx.world.entities().view::<(Market, Site)>().iter().collect();
        for market in markets {
            let signal = prosperity(ctx.world, market)?;
            let state = ctx.world.entities_mut().get_mut::<Market>(market)?;
            let step = grow(state, signal, ctx.delta);
            let population = state.population;
            if step == Step::Steady {
                continue;
            }

            let name = ctx.name_of(market);
            info!(%market, population, ?step, "population changed");
            ctx.emit(
                SimEventKind::PopulationChanged { market, population },
                format!("{name} population is now {population}"),
            );

            let Step::Grew(residents) = step else {
                continue;
            };
            if ctx.world.dwelling_blueprint().is_none() {
                continue;
            }
            for _ in 0..residents {
                let Some(dwelling) = spawn_dwelling(ctx.world, ctx.rng, market)? else {
                    warn!(%market, "no room for a new dwelling");
                    break;
                };
                ctx.emit(
                    SimEventKind::DwellingSpawned { market, dwelling },
                    format!("a new dwelling went up near {name}"),
                );
            }
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::clock::SimClock;
    use crate::config::SimConfig;
    use crate::event::EventLog;
    use glam::Vec2;
    use rand::SeedableRng;
    use ts_core::component::{Demander, Dweller};

    fn town() -> (World, EntityId) {
        let mut world = World::new(40, 40);
        Catalog::builtin().install(&mut world).unwrap();
        let proto = world.blueprint_named("market").unwrap();
        let market = world.try_place(proto, Vec2::new(20.0, 20.0)).unwrap().unwrap();
        (world, market)
    }

    fn dwellings(world: &World) -> usize {
        world.entities().view::<(Dweller, Site)>().count()
    }

    #[test]
    fn accumulator_steps_population() {
        let mut market = Market::new(5.0, 0.5);
        assert_eq!(grow(&mut market, 1.0, 1.0), Step::Steady);
        assert_eq!(grow(&mut market, 1.0, 1.0), Step::Grew(1));
        assert_eq!(market.population, 1);
        assert!(market.growth.abs() < 1e-9);
        // One resident doubles the pace.
        assert_eq!(grow(&mut market, -1.0, 1.0), Step::Shrank(1));
        assert_eq!(market.population, 0);
    }

    #[test]
    fn large_steps_apply_every_whole_unit() {
        let mut market = Market::new(5.0, 5.0);
        assert_eq!(grow(&mut market, 1.0, 1.0), Step::Grew(5));
        assert_eq!(market.population, 5);
        assert!(market.growth.abs() < 1e-9);

        market.growth_rate = 0.5;
        // 0.5 * 1.0 * 1.5 * 6 = 4.5
        assert_eq!(grow(&mut market, -1.0, 1.5), Step::Shrank(4));
        assert_eq!(market.population, 1);
        assert!((market.growth + 0.5).abs() < 1e-9);
    }

    #[test]
    fn population_never_goes_negative() {
        let mut market = Market::new(5.0, 1.0);
        for _ in 0..5 {
            grow(&mut market, -1.0, 1.0);
        }
        assert_eq!(market.population, 0);

        market.population = 2;
        market.growth = 0.0;
        assert_eq!(grow(&mut market, -1.0, 10.0), Step::Shrank(2));
        assert_eq!(market.population, 0);
        assert!(market.growth.abs() < 1.0);
    }

    #[test]
    fn one_dwelling_per_new_resident() {
        let (mut world, market) = town();
        let dwelling = world.dwelling_blueprint().unwrap();
        world.try_place(dwelling, Vec2::new(23.5, 20.5)).unwrap().unwrap();
        world.entities_mut().get_mut::<Market>(market).unwrap().growth_rate = 3.0;

        let clock = SimClock::new();
        let mut events = EventLog::new(100);
        let mut rng = StdRng::seed_from_u64(5);
        let config = SimConfig::default();
        let mut ctx = SimContext {
            world: &mut world,
            clock: &clock,
            events: &mut events,
            rng: &mut rng,
            config: &config,
            delta: 1.0,
        };
        GrowthSystem::new().tick(&mut ctx).unwrap();

        assert_eq!(world.entities().get::<Market>(market).unwrap().population, 3);
        assert_eq!(dwellings(&world), 4);
        let spawned = events
            .events()
            .iter()
            .filter(|e| matches!(e.kind, SimEventKind::DwellingSpawned { .. }))
            .count();
        assert_eq!(spawned, 3);
    }

    #[test]
    fn idle_market_has_neutral_prosperity() {
        let (world, market) = town();
        assert_eq!(prosperity(&world, market).unwrap(), 0.0);
    }

    #[test]
    fn unmet_demand_lowers_prosperity() {
        let (mut world, market) = town();
        let dwelling = world.dwelling_blueprint().unwrap();
        world.try_place(dwelling, Vec2::new(23.5, 20.5)).unwrap().unwrap();
        // Pull with no demand yet reads as fully supplied.
        assert_eq!(prosperity(&world, market).unwrap(), 1.0);

        let bread = world.commodity_named("Bread").unwrap();
        world
            .entities_mut()
            .get_mut::<Market>(market)
            .unwrap()
            .demand
            .insert(bread, 1.0);
        let signal = prosperity(&world, market).unwrap();
        assert!(signal < 1.0);
        assert!(signal > -1.0);
    }

    #[test]
    fn spawn_dwelling_lands_inside_the_market() {
        let (mut world, market) = town();
        let mut rng = StdRng::seed_from_u64(3);
        let placed = spawn_dwelling(&mut world, &mut rng, market).unwrap().unwrap();
        assert!(world.entities().has::<Demander>(placed));
        assert_eq!(world.market_of(placed), Some(market));
        assert_eq!(dwellings(&world), 1);
    }

    #[test]
    fn spawn_dwelling_needs_a_dwelling_blueprint() {
        let mut world = World::new(40, 40);
        let mut catalog = Catalog::builtin();
        catalog.blueprints.retain(|b| !b.dwelling);
        catalog.install(&mut world).unwrap();
        let proto = world.blueprint_named("market").unwrap();
        let market = world.try_place(proto, Vec2::new(20.0, 20.0)).unwrap().unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        assert!(matches!(
            spawn_dwelling(&mut world, &mut rng, market),
            Err(SimError::MissingBlueprint(_))
        ));
    }
}
