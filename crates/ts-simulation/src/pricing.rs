use tracing::trace;
use ts_core::component::{Market, Price, Site};
use ts_core::entity::EntityId;
use ts_core::world::World;

use crate::config::PricingConfig;
use crate::context::SimContext;
use crate::error::SimResult;
use crate::system::System;

/// Integrate one tick of demand: pull raises it, held stock relieves it.
pub fn next_demand(current: f64, pull: f64, stock: u32, delta: f64, config: &PricingConfig) -> f64 {
    let change = pull - config.stock_relief * f64::from(stock);
    (current + delta * change).clamp(0.0, config.max_demand)
}

/// Price of a commodity with the given base price at `demand`.
pub fn price_for(base: f64, demand: f64, config: &PricingConfig) -> f64 {
    base * (1.0 + config.sensitivity * demand)
}

/// Recompute demand and price of every commodity at one market.
pub fn update_market(
    world: &mut World,
    market: EntityId,
    delta: f64,
    config: &PricingConfig,
) -> SimResult<()> {
    let commodities = world.commodities().to_vec();
    let mut updates = Vec::with_capacity(commodities.len());
    {
        let state = world.entities().get::<Market>(market)?;
        for commodity in &commodities {
            let pull = world.market_demand(market, *commodity)?;
            let stock = world.market_stock(market, *commodity)?;
            let base = world.entities().get::<Price>(*commodity)?.price;
            let demand = next_demand(state.demand_for(*commodity), pull, stock, delta, config);
            updates.push((*commodity, demand, price_for(base, demand, config)));
        }
    }

    let state = world.entities_mut().get_mut::<Market>(market)?;
    for (commodity, demand, price) in updates {
        state.demand.insert(commodity, demand);
        state.prices.insert(commodity, price);
    }
    Ok(())
}

/// Moves every placed market's demand and prices toward its local balance
/// of pull and stock.
#[derive(Debug, Default)]
pub struct PricingSystem;

impl PricingSystem {
    pub fn new() -> Self {
        Self
    }
}

impl System for PricingSystem {
    fn name(&self) -> &str {
        "pricing"
    }

    fn tick(&mut self, ctx: &mut SimContext<'_>) -> SimResult<()> {
        let markets: Vec<EntityId> = ctx.world.entities().view::<(Market, Site)>().iter().collect();
        let config = ctx.pricing();
        for market in markets {
            update_market(ctx.world, market, ctx.delta, config)?;
            trace!(%market, "prices updated");
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
    use glam::Vec2;
    use proptest::prelude::*;
    use ts_core::component::{Demander, Footprint, Inventory, Named};

    fn config() -> PricingConfig {
        PricingConfig::default()
    }

    fn market_world() -> (World, EntityId, EntityId, EntityId) {
        let mut world = World::new(40, 40);
        let bread = world.add_commodity("Bread", 5.0);
        let stone = world.add_commodity("Stone", 4.0);
        let proto = world
            .entities_mut()
            .spawn()
            .with(Named::new("Market"))
            .with(Footprint::new(2.0, 2.0))
            .with(Market::new(5.0, 0.001))
            .id();
        let market = world.try_place(proto, Vec2::new(10.0, 10.0)).unwrap().unwrap();
        (world, market, bread, stone)
    }

    #[test]
    fn demand_rises_with_pull_and_falls_with_stock() {
        let cfg = config();
        assert!((next_demand(0.0, 2.0, 0, 1.0, &cfg) - 2.0).abs() < 1e-9);
        let relieved = next_demand(2.0, 0.0, 20, 1.0, &cfg);
        assert!((relieved - 1.0).abs() < 1e-9);
    }

    #[test]
    fn demand_is_clamped() {
        let cfg = config();
        assert_eq!(next_demand(1.0, 0.0, 1_000, 1.0, &cfg), 0.0);
        assert_eq!(next_demand(49.0, 100.0, 0, 1.0, &cfg), cfg.max_demand);
    }

    #[test]
    fn price_at_zero_demand_is_base() {
        assert_eq!(price_for(5.0, 0.0, &config()), 5.0);
        assert!((price_for(5.0, 10.0, &config()) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn every_commodity_gets_a_price() {
        let (mut world, market, bread, stone) = market_world();
        update_market(&mut world, market, 1.0, &config()).unwrap();
        let state = world.entities().get::<Market>(market).unwrap();
        assert_eq!(state.prices.len(), 2);
        assert_eq!(state.price_of(bread), 5.0);
        assert_eq!(state.price_of(stone), 4.0);
    }

    #[test]
    fn hungry_dwellings_raise_local_price() {
        let (mut world, market, bread, stone) = market_world();
        let house = world
            .entities_mut()
            .spawn()
            .with(Named::new("House"))
            .with(Footprint::new(1.0, 1.0))
            .with(Inventory::default())
            .with(Demander::new([(bread, 1.0)].into_iter().collect()))
            .id();
        world.try_place(house, Vec2::new(12.5, 10.5)).unwrap().unwrap();

        for _ in 0..3 {
            update_market(&mut world, market, 1.0, &config()).unwrap();
        }
        let state = world.entities().get::<Market>(market).unwrap();
        assert!((state.demand_for(bread) - 3.0).abs() < 1e-9);
        assert!(state.price_of(bread) > 5.0);
        assert_eq!(state.price_of(stone), 4.0);
    }

    #[test]
    fn missing_market_is_an_error() {
        let (mut world, _, bread, _) = market_world();
        assert!(update_market(&mut world, bread, 1.0, &config()).is_err());
    }

    proptest! {
        #[test]
        fn price_is_monotonic_in_demand(
            base in 0.1f64..100.0,
            low in 0.0f64..50.0,
            extra in 0.0f64..50.0,
        ) {
            let cfg = config();
            prop_assert!(price_for(base, low, &cfg) <= price_for(base, low + extra, &cfg));
        }

        #[test]
        fn demand_stays_in_bounds(
            current in 0.0f64..50.0,
            pull in 0.0f64..100.0,
            stock in 0u32..10_000,
            delta in 0.01f64..10.0,
        ) {
            let cfg = config();
            let demand = next_demand(current, pull, stock, delta, &cfg);
            prop_assert!((0.0..=cfg.max_demand).contains(&demand));
        }
    }
}
