use std::marker::PhantomData;

use crate::component::{Columns, Component};
use crate::entity::EntityId;
use crate::registry::Registry;

/// A combination of component kinds an entity must carry.
///
/// Implemented for tuples of one to five components.
pub trait Query {
    /// True if the slot carries every kind in the combination.
    fn matches(columns: &Columns, slot: usize) -> bool;
}

macro_rules! impl_query {
    ($($name:ident),+) => {
        impl<$($name: Component),+> Query for ($($name,)+) {
            fn matches(columns: &Columns, slot: usize) -> bool {
                $($name::column(columns).contains(slot))&&+
            }
        }
    };
}

impl_query!(A);
impl_query!(A, B);
impl_query!(A, B, C);
impl_query!(A, B, C, D);
impl_query!(A, B, C, D, E);

/// A lazy, restartable view over the entities matching `Q`.
///
/// Iterating never allocates; each call to [`View::iter`] starts over from
/// the first slot. Entities come out in ascending handle order.
pub struct View<'r, Q> {
    registry: &'r Registry,
    _query: PhantomData<fn() -> Q>,
}

impl<Q> Clone for View<'_, Q> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<Q> Copy for View<'_, Q> {}

impl<'r, Q: Query> View<'r, Q> {
    pub(crate) fn new(registry: &'r Registry) -> Self {
        Self {
            registry,
            _query: PhantomData,
        }
    }

    /// Start iterating from the first slot.
    pub fn iter(&self) -> ViewIter<'r, Q> {
        ViewIter {
            registry: self.registry,
            slot: 0,
            _query: PhantomData,
        }
    }

    /// Number of matching entities.
    pub fn count(&self) -> usize {
        self.iter().count()
    }

    /// True if nothing matches.
    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// True if `entity` is alive and matches.
    pub fn contains(&self, entity: EntityId) -> bool {
        let slot = entity.index() as usize;
        self.registry.live_id(slot) == Some(entity) && Q::matches(self.registry.columns(), slot)
    }
}

impl<'r, Q: Query> IntoIterator for View<'r, Q> {
    type Item = EntityId;
    type IntoIter = ViewIter<'r, Q>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'r, Q: Query> IntoIterator for &View<'r, Q> {
    type Item = EntityId;
    type IntoIter = ViewIter<'r, Q>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator produced by a [`View`].
pub struct ViewIter<'r, Q> {
    registry: &'r Registry,
    slot: usize,
    _query: PhantomData<fn() -> Q>,
}

impl<Q: Query> Iterator for ViewIter<'_, Q> {
    type Item = EntityId;

    fn next(&mut self) -> Option<EntityId> {
        while self.slot < self.registry.slot_count() {
            let slot = self.slot;
            self.slot += 1;
            match self.registry.live_id(slot) {
                Some(id) if Q::matches(self.registry.columns(), slot) => return Some(id),
                _ => {}
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Inventory, Market, Named, Site};

    fn test_registry() -> (Registry, [EntityId; 3]) {
        let mut registry = Registry::new();
        let market = registry
            .spawn()
            .with(Named::new("Market"))
            .with(Site::new(10.0, 10.0))
            .with(Market::new(5.0, 0.001))
            .id();
        let farm = registry
            .spawn()
            .with(Named::new("Farm"))
            .with(Site::new(12.0, 10.0))
            .with(Inventory::default())
            .id();
        let blueprint = registry.spawn().with(Named::new("Blueprint")).id();
        (registry, [market, farm, blueprint])
    }

    #[test]
    fn view_matches_all_listed_kinds() {
        let (registry, [market, farm, _]) = test_registry();
        let sited: Vec<_> = registry.view::<(Site,)>().iter().collect();
        assert_eq!(sited, vec![market, farm]);

        let markets: Vec<_> = registry.view::<(Site, Market)>().iter().collect();
        assert_eq!(markets, vec![market]);

        assert_eq!(registry.view::<(Named, Site, Inventory)>().count(), 1);
    }

    #[test]
    fn view_is_restartable() {
        let (registry, _) = test_registry();
        let view = registry.view::<(Named,)>();
        assert_eq!(view.iter().count(), 3);
        assert_eq!(view.iter().count(), 3);
        let first_pass: Vec<_> = view.into_iter().collect();
        let second_pass: Vec<_> = view.into_iter().collect();
        assert_eq!(first_pass, second_pass);
    }

    #[test]
    fn view_skips_destroyed_entities() {
        let (mut registry, [_, farm, _]) = test_registry();
        registry.destroy(farm).unwrap();
        let view = registry.view::<(Site,)>();
        assert_eq!(view.count(), 1);
        assert!(!view.contains(farm));
    }

    #[test]
    fn views_are_usable_from_the_crate_root() {
        let (registry, [market, _, _]) = test_registry();
        let view: crate::View<'_, (Market,)> = registry.view::<(Market,)>();
        let mut iter: crate::ViewIter<'_, (Market,)> = view.iter();
        assert_eq!(iter.next(), Some(market));
        assert_eq!(iter.next(), None);
    }

    #[test]
    fn empty_view() {
        let registry = Registry::new();
        assert!(registry.view::<(Market,)>().is_empty());
    }
}
