use crate::component::{Columns, Component, Named};
use crate::entity::EntityId;
use crate::error::{CoreError, CoreResult};
use crate::query::{Query, View};

/// The entity store. Owns every component of every entity.
///
/// Each component kind lives in its own column indexed by the entity's slot.
/// Slots of destroyed entities are recycled with a bumped generation, so old
/// handles stop resolving.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    columns: Columns,
    generations: Vec<u32>,
    alive: Vec<bool>,
    free: Vec<u32>,
    live: usize,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Entity lifecycle
    // -----------------------------------------------------------------------

    /// Create an entity with no components.
    pub fn create(&mut self) -> EntityId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = index as usize;
            self.alive[slot] = true;
            return EntityId::new(index, self.generations[slot]);
        }
        let index = self.generations.len() as u32;
        self.generations.push(0);
        self.alive.push(true);
        EntityId::new(index, 0)
    }

    /// Create an entity and attach components fluently.
    pub fn spawn(&mut self) -> EntityBuilder<'_> {
        let id = self.create();
        EntityBuilder { registry: self, id }
    }

    /// Create a new entity carrying a clone of every component on `proto`.
    pub fn instantiate(&mut self, proto: EntityId) -> CoreResult<EntityId> {
        self.check(proto)?;
        let id = self.create();
        self.columns
            .clone_slot(proto.index() as usize, id.index() as usize);
        Ok(id)
    }

    /// Destroy an entity and every component attached to it.
    pub fn destroy(&mut self, entity: EntityId) -> CoreResult<()> {
        let slot = self.check(entity)?;
        self.columns.clear(slot);
        self.alive[slot] = false;
        self.generations[slot] = self.generations[slot].wrapping_add(1);
        self.free.push(entity.index());
        self.live -= 1;
        Ok(())
    }

    /// True if the handle refers to a live entity.
    pub fn contains(&self, entity: EntityId) -> bool {
        self.check(entity).is_ok()
    }

    /// Number of live entities.
    pub fn len(&self) -> usize {
        self.live
    }

    /// True if no entity is alive.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Every live entity, in slot order.
    pub fn ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.alive
            .iter()
            .enumerate()
            .filter(|(_, alive)| **alive)
            .map(|(slot, _)| EntityId::new(slot as u32, self.generations[slot]))
    }

    // -----------------------------------------------------------------------
    // Component access
    // -----------------------------------------------------------------------

    /// Attach a component, returning the one it replaced.
    pub fn insert<T: Component>(&mut self, entity: EntityId, component: T) -> CoreResult<Option<T>> {
        let slot = self.check(entity)?;
        Ok(T::column_mut(&mut self.columns).insert(slot, component))
    }

    /// Detach a component, returning it if it was present.
    pub fn remove<T: Component>(&mut self, entity: EntityId) -> CoreResult<Option<T>> {
        let slot = self.check(entity)?;
        Ok(T::column_mut(&mut self.columns).remove(slot))
    }

    /// Borrow a component that must be present.
    pub fn get<T: Component>(&self, entity: EntityId) -> CoreResult<&T> {
        let slot = self.check(entity)?;
        T::column(&self.columns)
            .get(slot)
            .ok_or(CoreError::ComponentNotFound {
                entity,
                component: T::NAME,
            })
    }

    /// Mutably borrow a component that must be present.
    pub fn get_mut<T: Component>(&mut self, entity: EntityId) -> CoreResult<&mut T> {
        let slot = self.check(entity)?;
        T::column_mut(&mut self.columns)
            .get_mut(slot)
            .ok_or(CoreError::ComponentNotFound {
                entity,
                component: T::NAME,
            })
    }

    /// Borrow a component whose presence is conditional.
    pub fn try_get<T: Component>(&self, entity: EntityId) -> Option<&T> {
        let slot = self.check(entity).ok()?;
        T::column(&self.columns).get(slot)
    }

    /// Mutably borrow a component whose presence is conditional.
    pub fn try_get_mut<T: Component>(&mut self, entity: EntityId) -> Option<&mut T> {
        let slot = self.check(entity).ok()?;
        T::column_mut(&mut self.columns).get_mut(slot)
    }

    /// True if the entity is alive and carries `T`.
    pub fn has<T: Component>(&self, entity: EntityId) -> bool {
        self.try_get::<T>(entity).is_some()
    }

    /// Copy one component from `from` onto `to`. Returns false if `from` lacks it.
    pub fn copy_component<T: Component>(&mut self, from: EntityId, to: EntityId) -> CoreResult<bool> {
        let value = self.try_get::<T>(from).cloned();
        self.check(to)?;
        match value {
            Some(value) => {
                self.insert(to, value)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Names of every component kind attached to an entity.
    pub fn kinds(&self, entity: EntityId) -> CoreResult<Vec<&'static str>> {
        let slot = self.check(entity)?;
        Ok(self.columns.kinds_at(slot))
    }

    /// Display name of an entity, or its handle if it has none.
    pub fn name_of(&self, entity: EntityId) -> String {
        self.try_get::<Named>(entity)
            .map(|n| n.name.clone())
            .unwrap_or_else(|| entity.to_string())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Lazy view over entities carrying every kind in `Q`.
    pub fn view<Q: Query>(&self) -> View<'_, Q> {
        View::new(self)
    }

    pub(crate) fn columns(&self) -> &Columns {
        &self.columns
    }

    pub(crate) fn slot_count(&self) -> usize {
        self.alive.len()
    }

    /// Handle for a slot if it is alive.
    pub(crate) fn live_id(&self, slot: usize) -> Option<EntityId> {
        if *self.alive.get(slot)? {
            Some(EntityId::new(slot as u32, self.generations[slot]))
        } else {
            None
        }
    }

    fn check(&self, entity: EntityId) -> CoreResult<usize> {
        let slot = entity.index() as usize;
        match (self.alive.get(slot), self.generations.get(slot)) {
            (Some(true), Some(generation)) if *generation == entity.generation() => Ok(slot),
            _ => Err(CoreError::EntityNotFound(entity)),
        }
    }
}

/// Attaches components to a freshly created entity.
pub struct EntityBuilder<'r> {
    registry: &'r mut Registry,
    id: EntityId,
}

impl EntityBuilder<'_> {
    /// Attach a component.
    pub fn with<T: Component>(mut self, component: T) -> Self {
        T::column_mut(&mut self.registry.columns).insert(self.id.index() as usize, component);
        self
    }

    /// Attach a component if one is given.
    pub fn maybe<T: Component>(self, component: Option<T>) -> Self {
        match component {
            Some(component) => self.with(component),
            None => self,
        }
    }

    /// Finish building and return the handle.
    pub fn id(self) -> EntityId {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Footprint, Inventory, Price, Site};

    #[test]
    fn create_and_get_components() {
        let mut registry = Registry::new();
        let e = registry
            .spawn()
            .with(Named::new("Farm"))
            .with(Site::new(1.0, 2.0))
            .id();

        assert_eq!(registry.get::<Named>(e).unwrap().name, "Farm");
        assert!(registry.has::<Site>(e));
        assert!(!registry.has::<Price>(e));
    }

    #[test]
    fn missing_component_is_not_found() {
        let mut registry = Registry::new();
        let e = registry.create();
        let err = registry.get::<Price>(e).unwrap_err();
        assert_eq!(
            err,
            CoreError::ComponentNotFound {
                entity: e,
                component: "price"
            }
        );
        assert!(registry.try_get::<Price>(e).is_none());
    }

    #[test]
    fn insert_replaces_and_returns_previous() {
        let mut registry = Registry::new();
        let e = registry.spawn().with(Price { price: 1.0 }).id();
        let old = registry.insert(e, Price { price: 2.0 }).unwrap();
        assert_eq!(old, Some(Price { price: 1.0 }));
        assert_eq!(registry.get::<Price>(e).unwrap().price, 2.0);
    }

    #[test]
    fn remove_detaches_component() {
        let mut registry = Registry::new();
        let e = registry.spawn().with(Price { price: 1.0 }).id();
        assert!(registry.remove::<Price>(e).unwrap().is_some());
        assert!(!registry.has::<Price>(e));
        assert!(registry.remove::<Price>(e).unwrap().is_none());
    }

    #[test]
    fn destroyed_handles_stop_resolving_after_reuse() {
        let mut registry = Registry::new();
        let old = registry.spawn().with(Named::new("Old")).id();
        registry.destroy(old).unwrap();

        let new = registry.spawn().with(Named::new("New")).id();
        assert_eq!(old.index(), new.index());
        assert_ne!(old, new);
        assert!(!registry.contains(old));
        assert_eq!(registry.get::<Named>(old), Err(CoreError::EntityNotFound(old)));
        assert_eq!(registry.get::<Named>(new).unwrap().name, "New");
    }

    #[test]
    fn destroy_clears_every_component() {
        let mut registry = Registry::new();
        let e = registry
            .spawn()
            .with(Named::new("Gone"))
            .with(Inventory::default())
            .id();
        registry.destroy(e).unwrap();
        let reused = registry.create();
        assert!(registry.kinds(reused).unwrap().is_empty());
        assert!(registry.destroy(e).is_err());
    }

    #[test]
    fn instantiate_clones_all_components() {
        let mut registry = Registry::new();
        let proto = registry
            .spawn()
            .with(Named::new("Quarry"))
            .with(Footprint::new(2.0, 2.0))
            .id();
        let copy = registry.instantiate(proto).unwrap();

        assert_ne!(copy, proto);
        assert_eq!(registry.get::<Named>(copy).unwrap().name, "Quarry");
        registry.get_mut::<Named>(copy).unwrap().name = "Changed".into();
        assert_eq!(registry.get::<Named>(proto).unwrap().name, "Quarry");
    }

    #[test]
    fn len_tracks_live_entities() {
        let mut registry = Registry::new();
        let a = registry.create();
        registry.create();
        assert_eq!(registry.len(), 2);
        registry.destroy(a).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.ids().count(), 1);
    }

    #[test]
    fn kinds_lists_attached_components() {
        let mut registry = Registry::new();
        let e = registry
            .spawn()
            .with(Named::new("Mill"))
            .with(Price { price: 3.0 })
            .id();
        assert_eq!(registry.kinds(e).unwrap(), vec!["named", "price"]);
    }

    #[test]
    fn copy_component_reports_absence() {
        let mut registry = Registry::new();
        let from = registry.spawn().with(Footprint::new(1.0, 1.0)).id();
        let to = registry.create();
        assert!(registry.copy_component::<Footprint>(from, to).unwrap());
        assert!(!registry.copy_component::<Price>(from, to).unwrap());
        assert!(registry.has::<Footprint>(to));
    }
}
