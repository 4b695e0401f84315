//! Minimal typed entity/component store.
//!
//! Each component type gets one dense `Vec<Option<C>>` storage, kept in a map keyed
//! by `TypeId`. Queries are tuples of component references and are checked at
//! compile time: `world.view::<(&Transform, &Mesh)>()` yields
//! `(Entity, (&Transform, &Mesh))`.

use std::any::{Any, TypeId};
use std::collections::HashMap;

/// Index into the component storages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity(u32);

impl Entity {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

trait ComponentStorage: Any {
    fn clear_slot(&mut self, index: usize);
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

struct Storage<C> {
    items: Vec<Option<C>>,
}

impl<C: 'static> ComponentStorage for Storage<C> {
    fn clear_slot(&mut self, index: usize) {
        if let Some(slot) = self.items.get_mut(index) {
            *slot = None;
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[derive(Default)]
pub struct World {
    alive: Vec<bool>,
    storages: HashMap<TypeId, Box<dyn ComponentStorage>>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(&mut self) -> Entity {
        self.alive.push(true);
        Entity((self.alive.len() - 1) as u32)
    }

    /// Removes every component of `entity`. The index is not reused.
    pub fn despawn(&mut self, entity: Entity) {
        if let Some(alive) = self.alive.get_mut(entity.index()) {
            *alive = false;
            for storage in self.storages.values_mut() {
                storage.clear_slot(entity.index());
            }
        }
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        self.alive.get(entity.index()).copied().unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.alive.iter().filter(|alive| **alive).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Attach `component`, replacing an existing one of the same type.
    /// Components on despawned entities are dropped.
    pub fn insert<C: 'static>(&mut self, entity: Entity, component: C) {
        if !self.is_alive(entity) {
            return;
        }
        let storage = self
            .storages
            .entry(TypeId::of::<C>())
            .or_insert_with(|| Box::new(Storage::<C> { items: Vec::new() }));
        if let Some(storage) = storage.as_any_mut().downcast_mut::<Storage<C>>() {
            if storage.items.len() <= entity.index() {
                storage.items.resize_with(entity.index() + 1, || None);
            }
            storage.items[entity.index()] = Some(component);
        }
    }

    pub fn remove<C: 'static>(&mut self, entity: Entity) -> Option<C> {
        self.storage_mut::<C>()?
            .items
            .get_mut(entity.index())
            .and_then(Option::take)
    }

    pub fn get<C: 'static>(&self, entity: Entity) -> Option<&C> {
        self.storage::<C>()?
            .items
            .get(entity.index())
            .and_then(Option::as_ref)
    }

    pub fn get_mut<C: 'static>(&mut self, entity: Entity) -> Option<&mut C> {
        self.storage_mut::<C>()?
            .items
            .get_mut(entity.index())
            .and_then(Option::as_mut)
    }

    /// Iterate all entities that have every component in `Q`.
    pub fn view<'w, Q: Query<'w>>(&'w self) -> impl Iterator<Item = (Entity, Q::Item)> + 'w {
        (0..self.alive.len()).filter_map(move |index| {
            let entity = Entity(index as u32);
            Q::fetch(self, entity).map(|item| (entity, item))
        })
    }

    /// Drain one component type out of every entity, e.g. to release GPU handles.
    pub fn drain<C: 'static>(&mut self) -> Vec<(Entity, C)> {
        let Some(storage) = self.storage_mut::<C>() else {
            return Vec::new();
        };
        storage
            .items
            .iter_mut()
            .enumerate()
            .filter_map(|(index, slot)| slot.take().map(|c| (Entity(index as u32), c)))
            .collect()
    }

    fn storage<C: 'static>(&self) -> Option<&Storage<C>> {
        self.storages
            .get(&TypeId::of::<C>())
            .and_then(|b| b.as_any().downcast_ref())
    }

    fn storage_mut<C: 'static>(&mut self) -> Option<&mut Storage<C>> {
        self.storages
            .get_mut(&TypeId::of::<C>())
            .and_then(|b| b.as_any_mut().downcast_mut())
    }
}

/// A compile-time shaped component query.
pub trait Query<'w> {
    type Item;

    fn fetch(world: &'w World, entity: Entity) -> Option<Self::Item>;
}

impl<'w, C: 'static> Query<'w> for &'w C {
    type Item = &'w C;

    fn fetch(world: &'w World, entity: Entity) -> Option<Self::Item> {
        world.get::<C>(entity)
    }
}

macro_rules! impl_tuple_query {
    ($($name:ident),+) => {
        impl<'w, $($name: Query<'w>),+> Query<'w> for ($($name,)+) {
            type Item = ($($name::Item,)+);

            fn fetch(world: &'w World, entity: Entity) -> Option<Self::Item> {
                Some(($($name::fetch(world, entity)?,)+))
            }
        }
    };
}

impl_tuple_query!(A);
impl_tuple_query!(A, B);
impl_tuple_query!(A, B, C);
impl_tuple_query!(A, B, C, D);

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Position(f32);
    #[derive(Debug, PartialEq)]
    struct Label(&'static str);
    #[derive(Debug, PartialEq)]
    struct Hidden;

    #[test]
    fn test_view_matches_only_complete_entities() {
        let mut world = World::new();
        let a = world.spawn();
        let b = world.spawn();
        let c = world.spawn();
        world.insert(a, Position(1.0));
        world.insert(a, Label("a"));
        world.insert(b, Position(2.0));
        world.insert(c, Label("c"));
        world.insert(c, Position(3.0));

        let found: Vec<_> = world
            .view::<(&Position, &Label)>()
            .map(|(e, (p, l))| (e, p.0, l.0))
            .collect();
        assert_eq!(found, vec![(a, 1.0, "a"), (c, 3.0, "c")]);

        assert_eq!(world.view::<&Position>().count(), 3);
        assert_eq!(world.view::<(&Hidden,)>().count(), 0);
    }

    #[test]
    fn test_insert_replaces_and_remove_takes() {
        let mut world = World::new();
        let e = world.spawn();
        world.insert(e, Position(1.0));
        world.insert(e, Position(5.0));
        assert_eq!(world.get::<Position>(e), Some(&Position(5.0)));
        world.get_mut::<Position>(e).unwrap().0 = 6.0;
        assert_eq!(world.remove::<Position>(e), Some(Position(6.0)));
        assert_eq!(world.get::<Position>(e), None);
    }

    #[test]
    fn test_despawn_clears_components() {
        let mut world = World::new();
        let e = world.spawn();
        let f = world.spawn();
        world.insert(e, Position(1.0));
        world.insert(f, Position(2.0));
        world.despawn(e);
        assert!(!world.is_alive(e));
        assert_eq!(world.len(), 1);
        assert_eq!(world.view::<&Position>().count(), 1);
        world.insert(e, Position(3.0));
        assert_eq!(world.get::<Position>(e), None);
    }

    #[test]
    fn test_drain_empties_storage() {
        let mut world = World::new();
        let e = world.spawn();
        world.insert(e, Label("x"));
        let drained = world.drain::<Label>();
        assert_eq!(drained, vec![(e, Label("x"))]);
        assert!(world.drain::<Label>().is_empty());
        assert!(world.drain::<Hidden>().is_empty());
    }
}
