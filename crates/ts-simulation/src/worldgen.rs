use glam::Vec2;
use rand::Rng;
use rand::rngs::StdRng;
use tracing::{info, warn};
use ts_core::component::{Footprint, Generator, Market, Producer, Route, Site, Stop};
use ts_core::entity::{EntityId, Family, FamilyId};
use ts_core::world::World;

use crate::config::SimConfig;
use crate::error::SimResult;
use crate::merchant;

/// The town's own family: owns every building placed by world generation.
pub const TOWN: FamilyId = FamilyId(0);
/// The player's family: pays for buildings placed in build mode.
pub const PLAYER: FamilyId = FamilyId(1);

/// Lay out the starting map for a world whose catalog is already installed.
///
/// Markets are spaced evenly along the horizontal midline. Each gets one of
/// every generator and producer blueprint plus a few dwellings at random free
/// cells inside its radius. With two or more markets, one merchant is hired
/// on a route that visits them in order.
pub fn generate_map(world: &mut World, rng: &mut StdRng, config: &SimConfig) -> SimResult<()> {
    world.add_family(Family::new("Town", config.town_balance));
    world.add_family(Family::new("Player", config.player_balance));

    let blueprints = world.blueprints().to_vec();
    let dwelling = world.dwelling_blueprint();
    let market_proto = blueprints
        .iter()
        .copied()
        .find(|b| world.entities().has::<Market>(*b));
    let industries: Vec<EntityId> = blueprints
        .iter()
        .copied()
        .filter(|b| Some(*b) != dwelling)
        .filter(|b| {
            world.entities().has::<Generator>(*b) || world.entities().has::<Producer>(*b)
        })
        .collect();

    let Some(market_proto) = market_proto else {
        warn!("catalog has no market blueprint, generated map is empty");
        return Ok(());
    };

    let count = config.worldgen.markets;
    let mut markets = Vec::with_capacity(count);
    let mut buildings = 0;
    for i in 0..count {
        let x = world.grid().width() as f32 * (i + 1) as f32 / (count + 1) as f32;
        let y = world.grid().height() as f32 / 2.0;
        let Some(market) = world.try_place(market_proto, Vec2::new(x, y))? else {
            warn!(x, y, "no room for market");
            continue;
        };
        markets.push(market);

        let centre = world.entities().get::<Site>(market)?.position;
        let radius = world.entities().get::<Market>(market)?.radius;
        for proto in &industries {
            if place_near(world, rng, *proto, centre, radius)?.is_some() {
                buildings += 1;
            }
        }
        if let Some(dwelling) = dwelling {
            for _ in 0..config.worldgen.dwellings_per_market {
                if place_near(world, rng, dwelling, centre, radius)?.is_some() {
                    buildings += 1;
                }
            }
        }
    }

    let merchant_proto = world.merchant_blueprint().filter(|_| markets.len() >= 2);
    if let Some(proto) = merchant_proto {
        let stops = markets
            .iter()
            .map(|m| local_cargo(world, *m, config.worldgen.cargo))
            .collect();
        let route = Route::new("Trade road", stops);
        world.add_route(route.clone());
        let hired = merchant::hire(world, proto, TOWN, "Merchant")?;
        merchant::assign_route(world, hired, route)?;
    }

    info!(
        markets = markets.len(),
        buildings,
        routes = world.routes().len(),
        "map generated"
    );
    Ok(())
}

/// Place `proto` at a random free spot whose centre lies within `radius` of
/// `centre`. Returns `None` if nothing fits.
pub fn place_near(
    world: &mut World,
    rng: &mut StdRng,
    proto: EntityId,
    centre: Vec2,
    radius: f32,
) -> SimResult<Option<EntityId>> {
    let half = world.entities().get::<Footprint>(proto)?.dimensions / 2.0;
    let min = (centre - radius).floor().as_ivec2();
    let max = (centre + radius).ceil().as_ivec2();

    let mut candidates = Vec::new();
    for x in min.x..=max.x {
        for y in min.y..=max.y {
            let position = Vec2::new(x as f32, y as f32) + half;
            if position.distance(centre) <= radius && world.can_place(proto, position)? {
                candidates.push(position);
            }
        }
    }
    if candidates.is_empty() {
        return Ok(None);
    }
    let pick = candidates[rng.random_range(0..candidates.len())];
    Ok(world.try_place(proto, pick)?)
}

/// A stop at `market` that picks up `cargo` units of every commodity its
/// influenced industries make and sells everything else.
fn local_cargo(world: &World, market: EntityId, cargo: u32) -> Stop {
    let mut stop = Stop::new(market);
    for entity in world.influence().influencees(market) {
        if let Some(generator) = world.entities().try_get::<Generator>(entity) {
            stop = stop.leave_with(generator.output, cargo);
        }
        if let Some(producer) = world.entities().try_get::<Producer>(entity) {
            for commodity in producer.outputs.keys() {
                stop = stop.leave_with(*commodity, cargo);
            }
        }
    }
    stop
}
