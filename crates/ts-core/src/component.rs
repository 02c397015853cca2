use std::collections::BTreeMap;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::entity::{EntityId, FamilyId};

/// A typed data record that can be attached to an entity.
///
/// The set of component kinds is closed: every kind is declared once in the
/// `components!` invocation below, which gives it its own column in the
/// registry. The trait is sealed so no other kinds can be added from outside.
pub trait Component: sealed::Sealed + Clone + 'static {
    /// Snake-case name of the kind, used in errors and logs.
    const NAME: &'static str;

    #[doc(hidden)]
    fn column(columns: &Columns) -> &Storage<Self>;

    #[doc(hidden)]
    fn column_mut(columns: &mut Columns) -> &mut Storage<Self>;
}

mod sealed {
    pub trait Sealed {}
}

/// A single component column, indexed by entity slot.
#[doc(hidden)]
#[derive(Debug, Clone)]
pub struct Storage<T> {
    slots: Vec<Option<T>>,
}

impl<T> Default for Storage<T> {
    fn default() -> Self {
        Self { slots: Vec::new() }
    }
}

impl<T> Storage<T> {
    pub(crate) fn get(&self, index: usize) -> Option<&T> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.slots.get_mut(index).and_then(Option::as_mut)
    }

    pub(crate) fn insert(&mut self, index: usize, value: T) -> Option<T> {
        if index >= self.slots.len() {
            self.slots.resize_with(index + 1, || None);
        }
        self.slots[index].replace(value)
    }

    pub(crate) fn remove(&mut self, index: usize) -> Option<T> {
        self.slots.get_mut(index).and_then(Option::take)
    }

    pub(crate) fn contains(&self, index: usize) -> bool {
        self.get(index).is_some()
    }
}

macro_rules! components {
    ($($field:ident: $ty:ty,)*) => {
        /// Every component column, one field per kind.
        #[doc(hidden)]
        #[derive(Debug, Clone, Default)]
        pub struct Columns {
            $($field: Storage<$ty>,)*
        }

        impl Columns {
            /// Drop every component stored in a slot.
            pub(crate) fn clear(&mut self, index: usize) {
                $(self.$field.remove(index);)*
            }

            /// Clone every component in slot `from` into slot `to`.
            pub(crate) fn clone_slot(&mut self, from: usize, to: usize) {
                $(
                    if let Some(value) = self.$field.get(from).cloned() {
                        self.$field.insert(to, value);
                    }
                )*
            }

            /// Names of the kinds present in a slot.
            pub(crate) fn kinds_at(&self, index: usize) -> Vec<&'static str> {
                let mut kinds = Vec::new();
                $(
                    if self.$field.contains(index) {
                        kinds.push(stringify!($field));
                    }
                )*
                kinds
            }
        }

        $(
            impl sealed::Sealed for $ty {}

            impl Component for $ty {
                const NAME: &'static str = stringify!($field);

                fn column(columns: &Columns) -> &Storage<Self> {
                    &columns.$field
                }

                fn column_mut(columns: &mut Columns) -> &mut Storage<Self> {
                    &mut columns.$field
                }
            }
        )*
    };
}

components! {
    named: Named,
    price: Price,
    footprint: Footprint,
    site: Site,
    ghost: Ghost,
    dweller: Dweller,
    demander: Demander,
    trader: Trader,
    generator: Generator,
    producer: Producer,
    inventory: Inventory,
    market: Market,
    merchant: Merchant,
    render_mesh: RenderMesh,
    render_tex: RenderTex,
    pickable: Pickable,
}

/// Quantity of one commodity, keyed by the commodity entity.
pub type Amounts = BTreeMap<EntityId, u32>;

/// Rate or level per commodity.
pub type Rates = BTreeMap<EntityId, f64>;

// ---------------------------------------------------------------------------
// Descriptive
// ---------------------------------------------------------------------------

/// Display name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Named {
    /// The name shown to players.
    pub name: String,
}

impl Named {
    /// Create a name component.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Unit price of a commodity, or the build cost of a blueprint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Price {
    /// Never negative.
    pub price: f64,
}

/// Extent of a building on the grid, in cells.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Footprint {
    /// Width and depth; both positive.
    pub dimensions: Vec2,
}

impl Footprint {
    /// A `w` by `h` footprint.
    pub fn new(w: f32, h: f32) -> Self {
        Self {
            dimensions: Vec2::new(w, h),
        }
    }
}

/// Position on the map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Site {
    /// Centre of the entity's footprint, in map units.
    pub position: Vec2,
}

impl Site {
    /// A site at `(x, y)`.
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            position: Vec2::new(x, y),
        }
    }
}

/// Marks a provisional, not-yet-placed copy of a blueprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ghost {
    /// The blueprint this ghost previews.
    pub proto: EntityId,
}

/// Marks a dwelling that houses part of a market's population.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dweller;

// ---------------------------------------------------------------------------
// Economic actors
// ---------------------------------------------------------------------------

/// Consumes commodities at fixed rates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Demander {
    /// Units consumed per second, per commodity. Never negative.
    pub rate: Rates,
    /// Fractional consumption carried between ticks.
    #[serde(default)]
    pub consumed: Rates,
}

impl Demander {
    /// A demander with the given rates and no carried consumption.
    pub fn new(rate: Rates) -> Self {
        Self {
            rate,
            consumed: Rates::new(),
        }
    }
}

/// Buys and sells on behalf of a family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trader {
    /// The family this trader works for.
    pub family: FamilyId,
    /// Positive bids buy, negative bids sell.
    #[serde(default)]
    pub bid: Rates,
    /// Running balance; purchases are never taken on credit.
    #[serde(default)]
    pub balance: f64,
}

impl Trader {
    /// A trader for `family` with a starting balance.
    pub fn new(family: FamilyId, balance: f64) -> Self {
        Self {
            family,
            bid: Rates::new(),
            balance,
        }
    }
}

/// Produces one commodity unconditionally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generator {
    /// The commodity emitted.
    pub output: EntityId,
    /// Units per second.
    pub rate: f64,
    /// Progress toward the next unit, in `[0, 1)`.
    #[serde(default)]
    pub progress: f64,
}

/// Converts input commodities into output commodities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Producer {
    /// Consumed at the start of each cycle.
    pub inputs: Amounts,
    /// Credited at the end of each cycle.
    pub outputs: Amounts,
    /// Cycles per second.
    pub rate: f64,
    /// True between deducting inputs and crediting outputs.
    #[serde(default)]
    pub producing: bool,
    /// Progress through the current cycle, in `[0, 1)`.
    #[serde(default)]
    pub progress: f64,
}

/// Integer stock per commodity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    /// Units held, per commodity.
    pub stock: Amounts,
}

impl Inventory {
    /// Units of `commodity` held.
    pub fn count(&self, commodity: EntityId) -> u32 {
        self.stock.get(&commodity).copied().unwrap_or(0)
    }

    /// Add `amount` units of `commodity`.
    pub fn add(&mut self, commodity: EntityId, amount: u32) {
        if amount > 0 {
            *self.stock.entry(commodity).or_insert(0) += amount;
        }
    }

    /// Remove `amount` units if that many are held; otherwise change nothing.
    pub fn take(&mut self, commodity: EntityId, amount: u32) -> bool {
        let held = self.count(commodity);
        if held < amount {
            return false;
        }
        if amount > 0 {
            self.stock.insert(commodity, held - amount);
        }
        true
    }

    /// True if every requirement is covered.
    pub fn has_all(&self, requirements: &Amounts) -> bool {
        requirements
            .iter()
            .all(|(commodity, amount)| self.count(*commodity) >= *amount)
    }

    /// Remove every requirement, or nothing at all.
    pub fn take_all(&mut self, requirements: &Amounts) -> bool {
        if !self.has_all(requirements) {
            return false;
        }
        for (commodity, amount) in requirements {
            self.take(*commodity, *amount);
        }
        true
    }

    /// Add every amount.
    pub fn add_all(&mut self, amounts: &Amounts) {
        for (commodity, amount) in amounts {
            self.add(*commodity, *amount);
        }
    }

    /// Total units held across all commodities.
    pub fn total(&self) -> u32 {
        self.stock.values().sum()
    }
}

/// Price and demand hub that influences every site within `radius`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {
    /// Current price per commodity.
    #[serde(default)]
    pub prices: Rates,
    /// Current demand per commodity.
    #[serde(default)]
    pub demand: Rates,
    /// Entity holding the market-side stock. `None` only on blueprints.
    #[serde(default)]
    pub commons: Option<EntityId>,
    /// Influence radius in map units.
    pub radius: f32,
    /// Dwellings' worth of residents.
    #[serde(default)]
    pub population: u32,
    /// Growth per second at full prosperity.
    pub growth_rate: f64,
    /// Accumulated growth; whole units turn into population changes.
    #[serde(default)]
    pub growth: f64,
}

impl Market {
    /// A market with the given radius and growth rate and no prices yet.
    pub fn new(radius: f32, growth_rate: f64) -> Self {
        Self {
            prices: Rates::new(),
            demand: Rates::new(),
            commons: None,
            radius,
            population: 0,
            growth_rate,
            growth: 0.0,
        }
    }

    /// Current price of `commodity`, zero if unlisted.
    pub fn price_of(&self, commodity: EntityId) -> f64 {
        self.prices.get(&commodity).copied().unwrap_or(0.0)
    }

    /// Current demand for `commodity`, zero if unlisted.
    pub fn demand_for(&self, commodity: EntityId) -> f64 {
        self.demand.get(&commodity).copied().unwrap_or(0.0)
    }
}

// ---------------------------------------------------------------------------
// Merchants and routes
// ---------------------------------------------------------------------------

/// One stop on a route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    /// Where to trade; must carry a [`Site`].
    pub destination: EntityId,
    /// Stock level to leave with, per commodity.
    #[serde(default)]
    pub leave_with: Amounts,
}

impl Stop {
    /// A stop at `destination` with an empty profile.
    pub fn new(destination: EntityId) -> Self {
        Self {
            destination,
            leave_with: Amounts::new(),
        }
    }

    /// Add a desired stock level to the profile.
    pub fn leave_with(mut self, commodity: EntityId, amount: u32) -> Self {
        self.leave_with.insert(commodity, amount);
        self
    }

    /// Desired stock of `commodity` on departure.
    pub fn target(&self, commodity: EntityId) -> u32 {
        self.leave_with.get(&commodity).copied().unwrap_or(0)
    }
}

/// A named, cyclic list of stops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    /// Display name.
    pub name: String,
    /// Visited in order, wrapping to the first after the last.
    pub stops: Vec<Stop>,
}

impl Route {
    /// A route with the given stops.
    pub fn new(name: impl Into<String>, stops: Vec<Stop>) -> Self {
        Self {
            name: name.into(),
            stops,
        }
    }

    /// Index of the stop after `index`.
    pub fn next_index(&self, index: usize) -> usize {
        (index + 1) % self.stops.len().max(1)
    }

    /// Drop every stop at `destination`, returning how many went.
    pub fn remove_stops_to(&mut self, destination: EntityId) -> usize {
        let before = self.stops.len();
        self.stops.retain(|stop| stop.destination != destination);
        before - self.stops.len()
    }
}

/// An itinerant trader following a route.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Merchant {
    /// The assigned route, if any.
    #[serde(default)]
    pub route: Option<Route>,
    /// Index of the stop most recently left.
    #[serde(default)]
    pub last_stop: usize,
    /// True while settling at the next stop.
    #[serde(default)]
    pub trading: bool,
    /// Seconds travelled toward the next stop.
    #[serde(default)]
    pub travelled: f64,
}

impl Merchant {
    /// The stop the merchant is heading to or trading at.
    pub fn next_stop(&self) -> Option<&Stop> {
        let route = self.route.as_ref()?;
        route.stops.get(route.next_index(self.last_stop))
    }

    /// Remove stops at `destination` from the route.
    ///
    /// The merchant keeps heading for the same next stop when it survives,
    /// otherwise for the first surviving stop after it. Progress on the
    /// current leg is discarded, and a route left without stops is dropped.
    /// Returns false when the route did not visit `destination`.
    pub fn forget_stop(&mut self, destination: EntityId) -> bool {
        let Some(route) = self.route.as_mut() else {
            return false;
        };
        let next = route.next_index(self.last_stop);
        let kept_before_next = route
            .stops
            .iter()
            .take(next)
            .filter(|stop| stop.destination != destination)
            .count();
        if route.remove_stops_to(destination) == 0 {
            return false;
        }
        self.trading = false;
        self.travelled = 0.0;
        let len = route.stops.len();
        if len == 0 {
            self.route = None;
            self.last_stop = 0;
            return true;
        }
        self.last_stop = (kept_before_next % len + len - 1) % len;
        true
    }
}

// ---------------------------------------------------------------------------
// Client-facing
// ---------------------------------------------------------------------------

/// Mesh file drawn for this entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderMesh {
    /// Path relative to the asset root.
    pub filename: String,
}

/// Icon texture for this entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderTex {
    /// Path relative to the asset root.
    pub filename: String,
}

/// Marks entities the player can inspect by clicking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pickable;

#[cfg(test)]
mod tests {
    use super::*;

    fn commodity(index: u32) -> EntityId {
        EntityId::new(index, 0)
    }

    #[test]
    fn inventory_take_is_all_or_nothing() {
        let wood = commodity(1);
        let mut inventory = Inventory::default();
        inventory.add(wood, 2);
        assert!(!inventory.take(wood, 3));
        assert_eq!(inventory.count(wood), 2);
        assert!(inventory.take(wood, 2));
        assert_eq!(inventory.count(wood), 0);
    }

    #[test]
    fn inventory_take_all_checks_every_requirement() {
        let wood = commodity(1);
        let stone = commodity(2);
        let mut inventory = Inventory::default();
        inventory.add(wood, 2);

        let needs: Amounts = [(wood, 2), (stone, 1)].into_iter().collect();
        assert!(!inventory.take_all(&needs));
        assert_eq!(inventory.count(wood), 2);

        inventory.add(stone, 1);
        assert!(inventory.take_all(&needs));
        assert_eq!(inventory.total(), 0);
    }

    #[test]
    fn route_next_index_wraps() {
        let route = Route::new(
            "loop",
            vec![Stop::new(commodity(1)), Stop::new(commodity(2))],
        );
        assert_eq!(route.next_index(0), 1);
        assert_eq!(route.next_index(1), 0);
    }

    #[test]
    fn forget_stop_keeps_the_next_destination() {
        let (a, b, c) = (commodity(1), commodity(2), commodity(3));
        let mut merchant = Merchant {
            route: Some(Route::new(
                "loop",
                vec![Stop::new(a), Stop::new(b), Stop::new(c)],
            )),
            last_stop: 1,
            trading: true,
            travelled: 4.0,
        };

        assert!(merchant.forget_stop(a));
        assert_eq!(merchant.next_stop().unwrap().destination, c);
        assert!(!merchant.trading);
        assert_eq!(merchant.travelled, 0.0);

        assert!(!merchant.forget_stop(a));
        assert!(merchant.forget_stop(c));
        assert_eq!(merchant.next_stop().unwrap().destination, b);
        assert!(merchant.forget_stop(b));
        assert!(merchant.route.is_none());
        assert!(merchant.next_stop().is_none());
    }

    #[test]
    fn forget_stop_skips_to_the_following_stop() {
        let (a, b, c) = (commodity(1), commodity(2), commodity(3));
        let mut merchant = Merchant {
            route: Some(Route::new(
                "loop",
                vec![Stop::new(a), Stop::new(b), Stop::new(c)],
            )),
            last_stop: 0,
            ..Merchant::default()
        };
        assert!(merchant.forget_stop(b));
        assert_eq!(merchant.next_stop().unwrap().destination, c);

        // Heading back to the first stop after the last one.
        merchant.last_stop = 1;
        assert!(merchant.forget_stop(a));
        assert_eq!(merchant.last_stop, 0);
        assert_eq!(merchant.next_stop().unwrap().destination, c);
    }

    #[test]
    fn merchant_without_route_has_no_next_stop() {
        assert!(Merchant::default().next_stop().is_none());
    }

    #[test]
    fn market_lookups_default_to_zero() {
        let market = Market::new(5.0, 0.001);
        assert_eq!(market.price_of(commodity(3)), 0.0);
        assert_eq!(market.demand_for(commodity(3)), 0.0);
    }
}
