use std::collections::BTreeMap;

use tracing::debug;
use ts_core::component::{Demander, Generator, Inventory, Market, Producer, Rates, Site, Trader};
use ts_core::entity::EntityId;
use ts_core::world::World;

use crate::context::SimContext;
use crate::error::SimResult;
use crate::event::SimEventKind;
use crate::system::System;

/// Which way goods moved in a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Commons to trader.
    Buy,
    /// Trader to commons.
    Sell,
}

/// One settled exchange between a trader and a market's commons.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trade {
    pub trader: EntityId,
    pub market: EntityId,
    pub commodity: EntityId,
    pub side: Side,
    pub amount: u32,
    /// Unit price at settlement.
    pub price: f64,
}

impl Trade {
    /// Total money that changed hands.
    pub fn value(&self) -> f64 {
        f64::from(self.amount) * self.price
    }

    /// The event recording this trade.
    pub fn event(&self, world: &World) -> (SimEventKind, String) {
        let names = world.entities();
        let (verb, kind) = match self.side {
            Side::Buy => (
                "bought",
                SimEventKind::Bought {
                    trader: self.trader,
                    market: self.market,
                    commodity: self.commodity,
                    amount: self.amount,
                    price: self.price,
                },
            ),
            Side::Sell => (
                "sold",
                SimEventKind::Sold {
                    trader: self.trader,
                    market: self.market,
                    commodity: self.commodity,
                    amount: self.amount,
                    price: self.price,
                },
            ),
        };
        let description = format!(
            "{} {verb} {} {} at {} for {:.2}",
            names.name_of(self.trader),
            self.amount,
            names.name_of(self.commodity),
            names.name_of(self.market),
            self.value()
        );
        (kind, description)
    }
}

/// Largest number of units `balance` pays for at `price`, never on credit.
///
/// Free goods (`price <= 0`) are unlimited.
pub fn affordable(balance: f64, price: f64) -> u32 {
    if price <= 0.0 {
        return u32::MAX;
    }
    if balance <= 0.0 {
        return 0;
    }
    let mut units = (balance / price).floor().min(f64::from(u32::MAX)) as u32;
    while units > 0 && f64::from(units) * price > balance {
        units -= 1;
    }
    units
}

/// Move up to `wanted` units from the trader into the market's commons.
///
/// The trader and its family are both paid. Returns `None` if the trader
/// holds none.
pub fn sell(
    world: &mut World,
    trader: EntityId,
    market: EntityId,
    commodity: EntityId,
    wanted: u32,
) -> SimResult<Option<Trade>> {
    let commons = world.commons_of(market)?;
    let price = world.entities().get::<Market>(market)?.price_of(commodity);
    let family = world.entities().get::<Trader>(trader)?.family;
    world.family(family)?;
    let held = world.entities().get::<Inventory>(trader)?.count(commodity);
    let amount = wanted.min(held);
    if amount == 0 {
        return Ok(None);
    }

    world
        .entities_mut()
        .get_mut::<Inventory>(trader)?
        .take(commodity, amount);
    world
        .entities_mut()
        .get_mut::<Inventory>(commons)?
        .add(commodity, amount);

    let trade = Trade {
        trader,
        market,
        commodity,
        side: Side::Sell,
        amount,
        price,
    };
    settle_balances(world, &trade, trade.value())?;
    Ok(Some(trade))
}

/// Move up to `wanted` units from the market's commons to the trader.
///
/// Truncated to what the commons holds and to what the trader's own balance
/// covers; the trader and its family both pay. Returns `None` if nothing
/// changed hands.
pub fn buy(
    world: &mut World,
    trader: EntityId,
    market: EntityId,
    commodity: EntityId,
    wanted: u32,
) -> SimResult<Option<Trade>> {
    let commons = world.commons_of(market)?;
    let price = world.entities().get::<Market>(market)?.price_of(commodity);
    let buyer = world.entities().get::<Trader>(trader)?;
    let (family, balance) = (buyer.family, buyer.balance);
    world.family(family)?;
    world.entities().get::<Inventory>(trader)?;
    let available = world.entities().get::<Inventory>(commons)?.count(commodity);
    let amount = wanted.min(available).min(affordable(balance, price));
    if amount == 0 {
        return Ok(None);
    }

    world
        .entities_mut()
        .get_mut::<Inventory>(commons)?
        .take(commodity, amount);
    world
        .entities_mut()
        .get_mut::<Inventory>(trader)?
        .add(commodity, amount);

    let trade = Trade {
        trader,
        market,
        commodity,
        side: Side::Buy,
        amount,
        price,
    };
    settle_balances(world, &trade, -trade.value())?;
    Ok(Some(trade))
}

/// Apply a trade's money to the trader and its family and shrink the
/// trader's outstanding bid.
fn settle_balances(world: &mut World, trade: &Trade, delta: f64) -> SimResult<()> {
    let trader = world.entities_mut().get_mut::<Trader>(trade.trader)?;
    trader.balance += delta;
    if let Some(bid) = trader.bid.get_mut(&trade.commodity) {
        match trade.side {
            Side::Buy => *bid -= f64::from(trade.amount),
            Side::Sell => *bid += f64::from(trade.amount),
        }
    }
    let family = trader.family;
    world.family_mut(family)?.balance += delta;
    Ok(())
}

/// The bid a building should post: positive buys, negative sells.
///
/// Producers want one cycle of inputs and hold no output; generators hold no
/// output; demanders want `buffer_secs` of consumption in stock.
pub fn bid_for(world: &World, entity: EntityId, buffer_secs: f64) -> Rates {
    let entities = world.entities();
    let mut targets: BTreeMap<EntityId, f64> = BTreeMap::new();

    if let Some(producer) = entities.try_get::<Producer>(entity) {
        for (commodity, amount) in &producer.inputs {
            *targets.entry(*commodity).or_insert(0.0) += f64::from(*amount);
        }
        for commodity in producer.outputs.keys() {
            targets.entry(*commodity).or_insert(0.0);
        }
    }
    if let Some(generator) = entities.try_get::<Generator>(entity) {
        targets.entry(generator.output).or_insert(0.0);
    }
    if let Some(demander) = entities.try_get::<Demander>(entity) {
        for (commodity, rate) in &demander.rate {
            *targets.entry(*commodity).or_insert(0.0) += (rate * buffer_secs).ceil();
        }
    }

    let stock = entities.try_get::<Inventory>(entity);
    targets
        .into_iter()
        .map(|(commodity, target)| {
            let held = stock.map_or(0, |inv| inv.count(commodity));
            (commodity, target - f64::from(held))
        })
        .filter(|(_, bid)| bid.abs() >= 1.0)
        .collect()
}

/// Posts bids for every on-map trader and settles them against the local
/// market's commons.
///
/// Sells settle before buys. Each building trades only with the first market
/// that influences it.
#[derive(Debug, Default)]
pub struct TradeSystem;

impl TradeSystem {
    pub fn new() -> Self {
        Self
    }
}

impl System for TradeSystem {
    fn name(&self) -> &str {
        "trade"
    }

    fn tick(&mut self, ctx: &mut SimContext<'_>) -> SimResult<()> {
        let buffer_secs = ctx.trade().buffer_secs;
        let traders: Vec<EntityId> = ctx
            .world
            .entities()
            .view::<(Trader, Inventory, Site)>()
            .iter()
            .collect();
        for trader in &traders {
            let bid = bid_for(ctx.world, *trader, buffer_secs);
            ctx.world.entities_mut().get_mut::<Trader>(*trader)?.bid = bid;
        }

        let markets: Vec<EntityId> = ctx
            .world
            .entities()
            .view::<(Market, Site)>()
            .iter()
            .filter(|m| {
                ctx.world
                    .entities()
                    .try_get::<Market>(*m)
                    .is_some_and(|market| market.commons.is_some())
            })
            .collect();

        for market in markets {
            let local: Vec<EntityId> = traders
                .iter()
                .copied()
                .filter(|t| ctx.world.market_of(*t) == Some(market))
                .collect();
            if local.is_empty() {
                continue;
            }

            let mut trades = Vec::new();
            for side in [Side::Sell, Side::Buy] {
                for trader in &local {
                    let bid = ctx.world.entities().get::<Trader>(*trader)?.bid.clone();
                    for (commodity, amount) in bid {
                        let trade = match side {
                            Side::Sell if amount <= -1.0 => {
                                sell(ctx.world, *trader, market, commodity, (-amount) as u32)?
                            }
                            Side::Buy if amount >= 1.0 => {
                                buy(ctx.world, *trader, market, commodity, amount as u32)?
                            }
                            _ => None,
                        };
                        trades.extend(trade);
                    }
                }
            }

            for trade in trades {
                let (kind, description) = trade.event(ctx.world);
                debug!(%description, "local trade");
                ctx.emit(kind, description);
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
