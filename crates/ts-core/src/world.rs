use std::collections::BTreeSet;

use glam::Vec2;
use tracing::debug;

use crate::component::{
    Demander, Footprint, Ghost, Inventory, Market, Merchant, Named, Price, Route, Site, Trader,
};
use crate::entity::{EntityId, Family, FamilyId};
use crate::error::{CoreError, CoreResult};
use crate::grid::{self, Grid};
use crate::influence::{self, InfluenceIndex};
use crate::registry::Registry;

/// The simulation's state: entities, families, the occupancy grid, and the
/// market-influence cache.
#[derive(Debug, Clone)]
pub struct World {
    entities: Registry,
    families: Vec<Family>,
    grid: Grid,
    influence: InfluenceIndex,

    // Catalog handles
    commodities: Vec<EntityId>,
    blueprints: Vec<EntityId>,
    merchant_blueprint: Option<EntityId>,
    dwelling_blueprint: Option<EntityId>,
    routes: Vec<Route>,
}

impl World {
    /// An empty world with a `width` by `height` grid.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            entities: Registry::new(),
            families: Vec::new(),
            grid: Grid::new(width, height),
            influence: InfluenceIndex::new(),
            commodities: Vec::new(),
            blueprints: Vec::new(),
            merchant_blueprint: None,
            dwelling_blueprint: None,
            routes: Vec::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn entities(&self) -> &Registry {
        &self.entities
    }

    /// Direct mutable access to the store.
    ///
    /// Changing a `Site` or a `Market` radius through this handle leaves the
    /// influence cache stale until [`World::refresh_market`] or
    /// [`World::refresh_entity`] is called.
    pub fn entities_mut(&mut self) -> &mut Registry {
        &mut self.entities
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn influence(&self) -> &InfluenceIndex {
        &self.influence
    }

    pub fn commodities(&self) -> &[EntityId] {
        &self.commodities
    }

    pub fn blueprints(&self) -> &[EntityId] {
        &self.blueprints
    }

    pub fn merchant_blueprint(&self) -> Option<EntityId> {
        self.merchant_blueprint
    }

    pub fn dwelling_blueprint(&self) -> Option<EntityId> {
        self.dwelling_blueprint
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Find a commodity by name (case-insensitive).
    pub fn commodity_named(&self, name: &str) -> Option<EntityId> {
        self.find_named(&self.commodities, name)
    }

    /// Find a blueprint by name (case-insensitive).
    pub fn blueprint_named(&self, name: &str) -> Option<EntityId> {
        self.find_named(&self.blueprints, name)
    }

    fn find_named(&self, ids: &[EntityId], name: &str) -> Option<EntityId> {
        let wanted = name.to_lowercase();
        ids.iter().copied().find(|id| {
            self.entities
                .try_get::<Named>(*id)
                .is_some_and(|n| n.name.to_lowercase() == wanted)
        })
    }

    // -----------------------------------------------------------------------
    // Catalog registration
    // -----------------------------------------------------------------------

    /// Create a commodity entity with a base price.
    pub fn add_commodity(&mut self, name: impl Into<String>, base_price: f64) -> EntityId {
        let id = self
            .entities
            .spawn()
            .with(Named::new(name))
            .with(Price { price: base_price })
            .id();
        self.commodities.push(id);
        id
    }

    /// Record an existing entity as a placeable blueprint.
    pub fn add_blueprint(&mut self, blueprint: EntityId) {
        self.blueprints.push(blueprint);
    }

    pub fn set_merchant_blueprint(&mut self, blueprint: EntityId) {
        self.merchant_blueprint = Some(blueprint);
    }

    pub fn set_dwelling_blueprint(&mut self, blueprint: EntityId) {
        self.dwelling_blueprint = Some(blueprint);
    }

    /// Store a route template.
    pub fn add_route(&mut self, route: Route) {
        self.routes.push(route);
    }

    // -----------------------------------------------------------------------
    // Families
    // -----------------------------------------------------------------------

    pub fn add_family(&mut self, family: Family) -> FamilyId {
        self.families.push(family);
        FamilyId(self.families.len() - 1)
    }

    pub fn families(&self) -> &[Family] {
        &self.families
    }

    pub fn family(&self, id: FamilyId) -> CoreResult<&Family> {
        self.families.get(id.0).ok_or(CoreError::FamilyNotFound(id))
    }

    pub fn family_mut(&mut self, id: FamilyId) -> CoreResult<&mut Family> {
        self.families
            .get_mut(id.0)
            .ok_or(CoreError::FamilyNotFound(id))
    }

    // -----------------------------------------------------------------------
    // Placement
    // -----------------------------------------------------------------------

    /// Snap a position to the grid for a footprint.
    pub fn snap(&self, position: Vec2, footprint: Vec2) -> Vec2 {
        grid::snap(position, footprint)
    }

    /// True if `entity`'s footprint fits at `position`: every covered cell is
    /// on the map and free.
    pub fn can_place(&self, entity: EntityId, position: Vec2) -> CoreResult<bool> {
        let footprint = self.entities.get::<Footprint>(entity)?.dimensions;
        Ok(self
            .grid
            .can_claim(&grid::covered_cells(position, footprint)))
    }

    /// Place a copy of `proto` at `position` if its footprint fits.
    ///
    /// On success the copy gets a `Site` at the snapped position, claims all
    /// of its cells, and joins the influence index; a placed market also gets
    /// its own commons. On failure nothing changes.
    pub fn try_place(&mut self, proto: EntityId, position: Vec2) -> CoreResult<Option<EntityId>> {
        let footprint = self.entities.get::<Footprint>(proto)?.dimensions;
        let snapped = grid::snap(position, footprint);
        let cells = grid::covered_cells(snapped, footprint);
        if !self.grid.can_claim(&cells) {
            debug!(
                proto = %proto,
                x = snapped.x,
                y = snapped.y,
                "placement rejected"
            );
            return Ok(None);
        }

        let placed = self.entities.instantiate(proto)?;
        self.entities.remove::<Ghost>(placed)?;
        self.entities.insert(placed, Site { position: snapped })?;
        self.grid.claim(&cells, placed);

        if self.entities.has::<Market>(placed) {
            self.open_market(placed)?;
        }
        self.refresh_entity(placed)?;

        debug!(
            entity = %placed,
            name = %self.entities.name_of(placed),
            x = snapped.x,
            y = snapped.y,
            "placed"
        );
        Ok(Some(placed))
    }

    /// Give a freshly placed market its commons and list every commodity.
    fn open_market(&mut self, market: EntityId) -> CoreResult<()> {
        let commons_name = format!("{} commons", self.entities.name_of(market));
        let commons = self
            .entities
            .spawn()
            .with(Named::new(commons_name))
            .with(Inventory::default())
            .id();

        let base_prices: Vec<(EntityId, f64)> = self
            .commodities
            .iter()
            .map(|c| {
                let base = self.entities.try_get::<Price>(*c).map_or(0.0, |p| p.price);
                (*c, base)
            })
            .collect();

        let state = self.entities.get_mut::<Market>(market)?;
        state.commons = Some(commons);
        for (commodity, base) in base_prices {
            state.prices.entry(commodity).or_insert(base);
            state.demand.entry(commodity).or_insert(0.0);
        }
        self.refresh_market(market)
    }

    /// Destroy an entity, freeing its cells and its influence entries.
    ///
    /// Destroying a market also destroys its commons. Route stops at the
    /// entity are dropped from the stored templates and from every merchant.
    pub fn destroy(&mut self, entity: EntityId) -> CoreResult<()> {
        let commons = self
            .entities
            .try_get::<Market>(entity)
            .and_then(|m| m.commons);

        self.grid.release(entity);
        self.influence.remove_market(entity);
        self.influence.unlink_entity(entity);
        self.entities.destroy(entity)?;

        if let Some(commons) = commons.filter(|c| self.entities.contains(*c)) {
            self.entities.destroy(commons)?;
        }
        self.forget_stops_to(entity)?;
        debug!(entity = %entity, "destroyed");
        Ok(())
    }

    fn forget_stops_to(&mut self, destination: EntityId) -> CoreResult<()> {
        for route in &mut self.routes {
            route.remove_stops_to(destination);
        }
        self.routes.retain(|route| !route.stops.is_empty());

        let merchants: Vec<EntityId> = self.entities.view::<(Merchant,)>().iter().collect();
        for merchant in merchants {
            if !self.entities.get_mut::<Merchant>(merchant)?.forget_stop(destination) {
                continue;
            }
            if let Some(trader) = self.entities.try_get_mut::<Trader>(merchant) {
                trader.bid.clear();
            }
            debug!(merchant = %merchant, stop = %destination, "route stop removed");
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Market influence
    // -----------------------------------------------------------------------

    /// True if `site` lies within `market`'s region around `market_site`.
    pub fn in_market(&self, site: &Site, market_site: &Site, market: &Market) -> bool {
        influence::in_market(site, market_site, market)
    }

    /// The first market (in handle order) whose region contains `position`.
    pub fn market_at(&self, position: Vec2) -> Option<EntityId> {
        let probe = Site { position };
        self.entities.view::<(Market, Site)>().iter().find(|m| {
            match (
                self.entities.try_get::<Market>(*m),
                self.entities.try_get::<Site>(*m),
            ) {
                (Some(market), Some(site)) => influence::in_market(&probe, site, market),
                _ => false,
            }
        })
    }

    /// The first market influencing `entity`, if any.
    pub fn market_of(&self, entity: EntityId) -> Option<EntityId> {
        self.influence.markets_of(entity).next()
    }

    /// Entities influenced by `market`.
    pub fn influencees(&self, market: EntityId) -> Vec<EntityId> {
        self.influence.influencees(market).collect()
    }

    /// The commons entity holding a market's stock.
    pub fn commons_of(&self, market: EntityId) -> CoreResult<EntityId> {
        self.entities
            .get::<Market>(market)?
            .commons
            .ok_or(CoreError::ComponentNotFound {
                entity: market,
                component: "commons",
            })
    }

    /// Units of `commodity` held by the market's commons and every influenced
    /// entity with an inventory.
    pub fn market_stock(&self, market: EntityId, commodity: EntityId) -> CoreResult<u32> {
        let state = self.entities.get::<Market>(market)?;
        let commons = state
            .commons
            .and_then(|c| self.entities.try_get::<Inventory>(c))
            .map_or(0, |inv| inv.count(commodity));
        let influenced: u32 = self
            .influence
            .influencees(market)
            .filter_map(|e| self.entities.try_get::<Inventory>(e))
            .map(|inv| inv.count(commodity))
            .sum();
        Ok(commons + influenced)
    }

    /// Consumption rates plus positive trader bids for `commodity`, summed
    /// over the market's influencees.
    pub fn market_demand(&self, market: EntityId, commodity: EntityId) -> CoreResult<f64> {
        self.entities.get::<Market>(market)?;
        let mut demand = 0.0;
        for entity in self.influence.influencees(market) {
            if let Some(demander) = self.entities.try_get::<Demander>(entity) {
                demand += demander.rate.get(&commodity).copied().unwrap_or(0.0);
            }
            if let Some(trader) = self.entities.try_get::<Trader>(entity) {
                demand += trader.bid.get(&commodity).copied().unwrap_or(0.0).max(0.0);
            }
        }
        Ok(demand)
    }

    /// Recompute which entities `market` influences.
    ///
    /// Call after creating or moving a market or changing its radius. A
    /// market that lost its `Market` or `Site` component is dropped.
    pub fn refresh_market(&mut self, market: EntityId) -> CoreResult<()> {
        let (state, centre) = match (
            self.entities.try_get::<Market>(market),
            self.entities.try_get::<Site>(market),
        ) {
            (Some(state), Some(site)) => (state, site),
            _ => {
                self.influence.remove_market(market);
                return Ok(());
            }
        };

        let influencees: BTreeSet<EntityId> = self
            .on_map()
            .filter(|e| *e != market)
            .filter(|e| {
                self.entities
                    .try_get::<Site>(*e)
                    .is_some_and(|site| influence::in_market(site, centre, state))
            })
            .collect();
        debug!(
            market = %market,
            influencees = influencees.len(),
            "market influence rebuilt"
        );
        self.influence.set_market(market, influencees);
        Ok(())
    }

    /// Recompute which markets influence a single entity.
    ///
    /// Call after placing or moving a non-market entity.
    pub fn refresh_entity(&mut self, entity: EntityId) -> CoreResult<()> {
        if !self.entities.contains(entity) {
            return Err(CoreError::EntityNotFound(entity));
        }
        self.influence.unlink_entity(entity);
        let site = match self.entities.try_get::<Site>(entity) {
            Some(site) if !self.entities.has::<Ghost>(entity) => *site,
            _ => return Ok(()),
        };

        let markets: Vec<EntityId> = self
            .entities
            .view::<(Market, Site)>()
            .iter()
            .filter(|m| *m != entity)
            .filter(|m| {
                match (
                    self.entities.try_get::<Market>(*m),
                    self.entities.try_get::<Site>(*m),
                ) {
                    (Some(market), Some(centre)) => influence::in_market(&site, centre, market),
                    _ => false,
                }
            })
            .collect();
        for market in markets {
            self.influence.link(market, entity);
        }
        Ok(())
    }

    /// Rebuild the whole influence index from the store.
    pub fn rebuild_influence(&mut self) -> CoreResult<()> {
        self.influence.clear();
        let markets: Vec<EntityId> = self.entities.view::<(Market, Site)>().iter().collect();
        for market in markets {
            self.refresh_market(market)?;
        }
        Ok(())
    }

    /// On-map entities: carry a `Site` and are not ghosts.
    fn on_map(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities
            .view::<(Site,)>()
            .into_iter()
            .filter(|e| !self.entities.has::<Ghost>(*e))
    }
}
