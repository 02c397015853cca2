use std::collections::BTreeSet;

use tracing::debug;
use ts_core::component::{Inventory, Market, Merchant, Named, Rates, Route, Site, Stop, Trader};
use ts_core::entity::{EntityId, FamilyId};
use ts_core::world::World;

use crate::context::SimContext;
use crate::error::{SimError, SimResult};
use crate::event::SimEventKind;
use crate::system::System;
use crate::trade::{self, Trade};

/// Instantiate the merchant template for `family`.
pub fn hire(
    world: &mut World,
    proto: EntityId,
    family: FamilyId,
    name: &str,
) -> SimResult<EntityId> {
    world.family(family)?;
    let merchant = world.entities_mut().instantiate(proto)?;
    world.entities_mut().insert(merchant, Named::new(name))?;
    world.entities_mut().get_mut::<Trader>(merchant)?.family = family;
    debug!(merchant = %merchant, %family, "merchant hired");
    Ok(merchant)
}

/// Put a merchant on `route`, starting from its first stop.
///
/// The route must have at least one stop and every destination must be on
/// the map.
pub fn assign_route(world: &mut World, merchant: EntityId, route: Route) -> SimResult<()> {
    if route.stops.is_empty() {
        return Err(SimError::InvalidRoute(format!("{} has no stops", route.name)));
    }
    for (i, stop) in route.stops.iter().enumerate() {
        if !world.entities().has::<Site>(stop.destination) {
            return Err(SimError::InvalidRoute(format!(
                "stop {i} of {} goes to {}, which is not on the map",
                route.name, stop.destination
            )));
        }
    }

    let state = world.entities_mut().get_mut::<Merchant>(merchant)?;
    debug!(merchant = %merchant, route = %route.name, "route assigned");
    *state = Merchant {
        route: Some(route),
        last_stop: 0,
        trading: false,
        travelled: 0.0,
    };
    world.entities_mut().get_mut::<Trader>(merchant)?.bid.clear();
    Ok(())
}

/// The market a stop trades against: the destination itself if it is a
/// market, otherwise the first market covering its site.
pub fn stop_market(world: &World, destination: EntityId) -> SimResult<Option<EntityId>> {
    if world.entities().has::<Market>(destination) {
        return Ok(Some(destination));
    }
    let site = world.entities().get::<Site>(destination)?;
    Ok(world.market_at(site.position))
}

/// What a merchant will do at a stop: positive buys, negative sells.
///
/// Every commodity held but not named in the stop's profile is sold off.
pub fn plan(stop: &Stop, inventory: &Inventory) -> Rates {
    let commodities: BTreeSet<EntityId> = stop
        .leave_with
        .keys()
        .chain(inventory.stock.keys())
        .copied()
        .collect();
    commodities
        .into_iter()
        .map(|c| (c, f64::from(stop.target(c)) - f64::from(inventory.count(c))))
        .filter(|(_, amount)| amount.abs() >= 1.0)
        .collect()
}

/// Trade at `market` until the merchant's stock matches the stop's profile
/// or nothing more can be sold or afforded. Sells settle first.
pub fn settle(
    world: &mut World,
    merchant: EntityId,
    market: EntityId,
    stop: &Stop,
) -> SimResult<Vec<Trade>> {
    let wanted = plan(stop, world.entities().get::<Inventory>(merchant)?);
    let mut trades = Vec::new();
    for (commodity, amount) in &wanted {
        if *amount < 0.0 {
            trades.extend(trade::sell(world, merchant, market, *commodity, (-amount) as u32)?);
        }
    }
    for (commodity, amount) in &wanted {
        if *amount > 0.0 {
            trades.extend(trade::buy(world, merchant, market, *commodity, *amount as u32)?);
        }
    }
    Ok(trades)
}

/// Moves routed merchants between stops and settles their trades.
///
/// Travel between two stops takes their distance divided by the configured
/// merchant speed. On arrival a merchant posts its plan as its bid and
/// trades on the following tick, then heads for the next stop.
#[derive(Debug, Default)]
pub struct MerchantSystem;

impl MerchantSystem {
    pub fn new() -> Self {
        Self
    }
}

impl System for MerchantSystem {
    fn name(&self) -> &str {
        "merchants"
    }

    fn tick(&mut self, ctx: &mut SimContext<'_>) -> SimResult<()> {
        let speed = ctx.trade().merchant_speed;
        let merchants: Vec<EntityId> = ctx
            .world
            .entities()
            .view::<(Merchant, Trader, Inventory)>()
            .iter()
            .collect();

        for id in merchants {
            let mut state = ctx.world.entities().get::<Merchant>(id)?.clone();
            let Some(route) = state.route.as_ref() else {
                continue;
            };
            let len = route.stops.len();
            if state.last_stop >= len {
                return Err(SimError::StopOutOfRange {
                    merchant: id,
                    index: state.last_stop,
                    len,
                });
            }
            let next = route.next_index(state.last_stop);
            let stop = route.stops[next].clone();

            if state.trading {
                match stop_market(ctx.world, stop.destination)? {
                    Some(market) if ctx.world.commons_of(market).is_ok() => {
                        for trade in settle(ctx.world, id, market, &stop)? {
                            let (kind, description) = trade.event(ctx.world);
                            debug!(%description, "merchant trade");
                            ctx.emit(kind, description);
                        }
                    }
                    _ => debug!(merchant = %id, "no market at stop"),
                }
                ctx.world.entities_mut().get_mut::<Trader>(id)?.bid.clear();
                state.trading = false;
                state.last_stop = next;
                state.travelled = 0.0;
                let description = format!(
                    "{} left {}",
                    ctx.name_of(id),
                    ctx.name_of(stop.destination)
                );
                ctx.emit(
                    SimEventKind::Departed {
                        merchant: id,
                        from: stop.destination,
                    },
                    description,
                );
            } else {
                let from = route.stops[state.last_stop].destination;
                let start = ctx.world.entities().get::<Site>(from)?.position;
                let end = ctx.world.entities().get::<Site>(stop.destination)?.position;
                let journey = f64::from(start.distance(end)) / speed;

                state.travelled += ctx.delta;
                if state.travelled >= journey {
                    state.trading = true;
                    state.travelled = 0.0;
                    let bid = plan(&stop, ctx.world.entities().get::<Inventory>(id)?);
                    ctx.world.entities_mut().get_mut::<Trader>(id)?.bid = bid;
                    let description = format!(
                        "{} arrived at {}",
                        ctx.name_of(id),
                        ctx.name_of(stop.destination)
                    );
                    ctx.emit(
                        SimEventKind::Arrived {
                            merchant: id,
                            at: stop.destination,
                        },
                        description,
                    );
                }
            }
            *ctx.world.entities_mut().get_mut::<Merchant>(id)? = state;
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
