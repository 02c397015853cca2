use std::collections::{BTreeMap, BTreeSet};

use crate::component::{Market, Site};
use crate::entity::EntityId;

/// True if `site` lies within `market`'s circular region around `market_site`.
pub fn in_market(site: &Site, market_site: &Site, market: &Market) -> bool {
    site.position.distance(market_site.position) <= market.radius
}

/// Bidirectional market ↔ influencee index.
///
/// This is a cache derived from `Site` and `Market` components; the entity
/// store stays the source of truth. Whoever moves a site, changes a radius,
/// or adds/removes a market must refresh the affected entries (see
/// [`World::refresh_market`](crate::world::World::refresh_market) and
/// [`World::refresh_entity`](crate::world::World::refresh_entity)).
#[derive(Debug, Clone, Default)]
pub struct InfluenceIndex {
    market_influencees: BTreeMap<EntityId, BTreeSet<EntityId>>,
    influencee_markets: BTreeMap<EntityId, BTreeSet<EntityId>>,
}

impl InfluenceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entities influenced by `market`, in handle order.
    pub fn influencees(&self, market: EntityId) -> impl Iterator<Item = EntityId> + '_ {
        self.market_influencees
            .get(&market)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    /// Markets influencing `entity`, in handle order.
    pub fn markets_of(&self, entity: EntityId) -> impl Iterator<Item = EntityId> + '_ {
        self.influencee_markets
            .get(&entity)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    /// True if `market` currently influences `entity`.
    pub fn is_influenced(&self, market: EntityId, entity: EntityId) -> bool {
        self.market_influencees
            .get(&market)
            .is_some_and(|set| set.contains(&entity))
    }

    /// Markets that have an entry, in handle order.
    pub fn markets(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.market_influencees.keys().copied()
    }

    /// Replace a market's influencee set and fix the reverse entries.
    pub fn set_market(&mut self, market: EntityId, influencees: BTreeSet<EntityId>) {
        self.remove_market(market);
        for entity in &influencees {
            self.influencee_markets
                .entry(*entity)
                .or_default()
                .insert(market);
        }
        self.market_influencees.insert(market, influencees);
    }

    /// Record that `market` influences `entity`.
    pub fn link(&mut self, market: EntityId, entity: EntityId) {
        self.market_influencees
            .entry(market)
            .or_default()
            .insert(entity);
        self.influencee_markets
            .entry(entity)
            .or_default()
            .insert(market);
    }

    /// Drop a market and every reverse entry pointing at it.
    pub fn remove_market(&mut self, market: EntityId) {
        if let Some(previous) = self.market_influencees.remove(&market) {
            for entity in previous {
                if let Some(markets) = self.influencee_markets.get_mut(&entity) {
                    markets.remove(&market);
                    if markets.is_empty() {
                        self.influencee_markets.remove(&entity);
                    }
                }
            }
        }
    }

    /// Drop an influencee from every market.
    pub fn unlink_entity(&mut self, entity: EntityId) {
        if let Some(markets) = self.influencee_markets.remove(&entity) {
            for market in markets {
                if let Some(set) = self.market_influencees.get_mut(&market) {
                    set.remove(&entity);
                }
            }
        }
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.market_influencees.clear();
        self.influencee_markets.clear();
    }
}
