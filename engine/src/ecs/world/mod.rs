//! The world: entity bookkeeping plus one storage per component type.
//!
//! # Layout
//!
//! Entities are plain `u32` indices into a fixed-capacity table. The table
//! tracks, per index, whether the entity is alive and the [`Mask`] of
//! components it carries. Component values live in per-type [`Storage`]s
//! keyed by the same index. The invariant tying them together: a storage
//! holds a value for an index exactly when the matching composition bit is
//! set.
//!
//! Index 0 is claimed at construction for the *singleton entity*, a
//! permanently-live entity for world-global state. It cannot be destroyed.
//!
//! # Concurrency model
//!
//! Setup and structural mutation go through `&mut World` (or a [`WorldEdit`]
//! guard for systems that declared write-all access). During a frame,
//! systems hold `&World` and reach component data through [`World::read`]
//! and [`World::write`] guards. Nothing here locks: the scheduler's access
//! masks guarantee that no two systems with conflicting declarations run at
//! the same time, and that guarantee is the safety argument for every
//! `unsafe` block below. Debug builds back it up with [`AccessSentinel`]s
//! that panic on any access the masks should have made impossible.

use std::any::Any;
use std::cell::UnsafeCell;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};

use fixedbitset::FixedBitSet;
use log::warn;

use super::component::{Component, ComponentSet, TypeRegistry};
use super::mask::Mask;
use super::storage::{AccessSentinel, Backing, Storage};

/// The fixed entity capacity of a world.
pub const MAX_ENTITIES: usize = 4096;

/// A handle to an entity: an index into the world's table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Entity(u32);

impl Entity {
    /// The permanently-live entity at index 0.
    pub const SINGLETON: Entity = Entity(0);

    /// A handle that never names a live entity.
    pub const INVALID: Entity = Entity(u32::MAX);

    pub fn index(self) -> u32 {
        self.0
    }

    pub(crate) const fn from_index(index: u32) -> Entity {
        Entity(index)
    }
}

/// Type-erased handle to a [`Store`], for operations that walk every
/// storage without knowing the component types.
trait AnyStore: Send + Sync {
    /// Drop the value at an index, if any.
    ///
    /// # Safety
    ///
    /// The caller must have exclusive access to the store.
    unsafe fn destroy(&self, index: u32);

    /// Drop every stored value.
    ///
    /// # Safety
    ///
    /// The caller must have exclusive access to the store.
    unsafe fn clear(&self);

    fn sentinel(&self) -> &AccessSentinel;

    fn as_any(&self) -> &dyn Any;
}

/// A single component type's storage behind an [`UnsafeCell`], shared
/// across worker threads.
struct Store<T: Component> {
    cell: UnsafeCell<Storage<T>>,
    sentinel: AccessSentinel,
    name: &'static str,
}

// Safety: all access to `cell` goes through World's guard methods or
// through `&mut World`, and the scheduler's masks prevent conflicting
// guards from existing at the same time.
unsafe impl<T: Component> Sync for Store<T> {}

impl<T: Component> AnyStore for Store<T> {
    unsafe fn destroy(&self, index: u32) {
        // Safety: exclusivity is the caller's contract.
        unsafe { (*self.cell.get()).remove(index) };
    }

    unsafe fn clear(&self) {
        // Safety: exclusivity is the caller's contract.
        unsafe { (*self.cell.get()).clear() };
    }

    fn sentinel(&self) -> &AccessSentinel {
        &self.sentinel
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Entity table, component storages, and the type registry.
pub struct World {
    registry: TypeRegistry,
    existence: UnsafeCell<FixedBitSet>,
    composition: UnsafeCell<Vec<Mask>>,
    live: AtomicUsize,
    table_sentinel: AccessSentinel,
    stores: Vec<Option<Box<dyn AnyStore>>>,
}

// Safety: the table cells are only written through `&mut World` or a
// `WorldEdit` guard, and a `WorldEdit` can only be produced for a system
// that declared write-all access, which the scheduler serializes against
// every other system. Concurrent readers of the table are therefore never
// racing a writer.
unsafe impl Sync for World {}

impl World {
    /// Create an empty world with the singleton entity already live.
    pub fn new() -> Self {
        let mut existence = FixedBitSet::with_capacity(MAX_ENTITIES);
        existence.insert(Entity::SINGLETON.index() as usize);

        World {
            registry: TypeRegistry::new(),
            existence: UnsafeCell::new(existence),
            composition: UnsafeCell::new(vec![Mask::EMPTY; MAX_ENTITIES]),
            live: AtomicUsize::new(1),
            table_sentinel: AccessSentinel::new(),
            stores: Vec::new(),
        }
    }

    /// The world's type registry.
    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Register a component type with the given storage backing, returning
    /// its bit index. Registering the same type again is a no-op.
    pub fn register_component<T: Component>(&mut self, backing: Backing) -> usize {
        let bit = self.registry.register::<T>();
        if self.stores.len() <= bit {
            self.stores.resize_with(bit + 1, || None);
        }
        if self.stores[bit].is_none() {
            self.stores[bit] = Some(Box::new(Store::<T> {
                cell: UnsafeCell::new(Storage::new(backing, MAX_ENTITIES)),
                sentinel: AccessSentinel::new(),
                name: std::any::type_name::<T>(),
            }));
        }
        bit
    }

    /// Register a named resource, returning its bit index. Resources have
    /// no storage here; the bit exists so systems can declare access to
    /// state they manage themselves.
    pub fn register_resource(&self, name: &'static str) -> usize {
        self.registry.register_resource(name)
    }

    // Entity lifecycle, exclusive surface.

    /// Create an entity, scanning for a free index from `hint` (wrapping).
    /// Returns `None` when the table is full.
    pub fn create_entity(&mut self, hint: u32) -> Option<Entity> {
        // Safety: `&mut self` is exclusive access.
        unsafe { self.create_unchecked(hint) }
    }

    /// Destroy an entity, dropping all its component values. Destroying a
    /// dead entity (or the singleton) is a logged no-op.
    pub fn destroy_entity(&mut self, entity: Entity) {
        // Safety: `&mut self` is exclusive access.
        unsafe { self.destroy_unchecked(entity) }
    }

    /// Attach a component value to a live entity, replacing any prior value
    /// of the same type.
    ///
    /// # Panics
    ///
    /// Panics if `T` was never registered or the entity is not alive.
    pub fn add_component<T: Component>(&mut self, entity: Entity, value: T) {
        // Safety: `&mut self` is exclusive access.
        unsafe { self.add_unchecked(entity, value) }
    }

    /// Detach and return a component value, clearing its composition bit.
    /// Returns `None` if the entity does not carry the component.
    pub fn remove_component<T: Component>(&mut self, entity: Entity) -> Option<T> {
        // Safety: `&mut self` is exclusive access.
        unsafe { self.remove_unchecked(entity) }
    }

    pub fn get_component<T: Component>(&self, entity: Entity) -> Option<&T> {
        if !self.exists(entity) {
            return None;
        }
        let store = self.store::<T>();
        // Safety: shared access to the storage value; writers are excluded
        // by the caller holding `&self` plus the scheduler's masks, the same
        // argument as `read`.
        unsafe { (*store.cell.get()).get(entity.index()) }
    }

    pub fn get_component_mut<T: Component>(&mut self, entity: Entity) -> Option<&mut T> {
        if !self.exists(entity) {
            return None;
        }
        let store = self.store::<T>();
        // Safety: `&mut self` is exclusive access.
        unsafe { (*store.cell.get()).get_mut(entity.index()) }
    }

    /// Destroy every entity except the singleton and drop every stored
    /// component value, including the singleton's.
    pub fn clear_entities(&mut self) {
        // Safety: `&mut self` is exclusive access.
        unsafe { self.clear_unchecked() }
    }

    // Table queries, shared surface.

    pub fn exists(&self, entity: Entity) -> bool {
        let index = entity.index() as usize;
        if index >= MAX_ENTITIES {
            return false;
        }
        // Safety: concurrent table writers are excluded, see the Sync impl.
        unsafe { (*self.existence.get()).contains(index) }
    }

    /// The composition mask of an entity. Empty for dead entities.
    pub fn mask_of(&self, entity: Entity) -> Mask {
        if !self.exists(entity) {
            return Mask::EMPTY;
        }
        // Safety: concurrent table writers are excluded, see the Sync impl.
        unsafe { (&(*self.composition.get()))[entity.index() as usize] }
    }

    /// True if the entity is alive and carries every component in `mask`.
    pub fn has_components(&self, entity: Entity, mask: Mask) -> bool {
        self.exists(entity) && self.mask_of(entity).contains_all(mask)
    }

    /// The number of live entities, the singleton included.
    pub fn live_count(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// The mask for a set of registered component types.
    pub fn mask_for<S: ComponentSet>(&self) -> Mask {
        S::mask(&self.registry)
    }

    // Concurrent component access.

    /// Borrow a component storage for reading.
    ///
    /// The caller's system must have declared read (or write) access to `T`;
    /// debug builds panic if a writer is active.
    pub fn read<T: Component>(&self) -> ReadGuard<'_, T> {
        let store = self.store::<T>();
        store.sentinel.begin_read(store.name);
        ReadGuard {
            // Safety: the masks exclude concurrent writers; the sentinel
            // enforces this in debug builds.
            storage: unsafe { &*store.cell.get() },
            sentinel: &store.sentinel,
        }
    }

    /// Borrow a component storage for writing.
    ///
    /// The caller's system must have declared write access to `T`; debug
    /// builds panic if any other access is active.
    pub fn write<T: Component>(&self) -> WriteGuard<'_, T> {
        let store = self.store::<T>();
        store.sentinel.begin_write(store.name);
        WriteGuard {
            // Safety: the masks make this the only access; the sentinel
            // enforces this in debug builds.
            storage: unsafe { &mut *store.cell.get() },
            sentinel: &store.sentinel,
        }
    }

    /// Borrow a dense component storage for writing a single shard's slice
    /// of the entity table, `start..=end`.
    ///
    /// Shards of one split system hold these guards concurrently; the
    /// guard's range check is what keeps their writes disjoint. Requires a
    /// dense backing.
    ///
    /// # Panics
    ///
    /// Panics if `T`'s storage is sparse.
    pub fn write_split<T: Component>(&self, start: u32, end: u32) -> SplitWriteGuard<'_, T> {
        let store = self.store::<T>();
        store.sentinel.begin_shard_write(store.name);
        // Safety: a shared peek at the storage enum to reach the dense
        // slots. Actual writes go through the returned guard's raw pointer,
        // and the sentinel has just excluded readers and full writers.
        let slots = match unsafe { &*store.cell.get() } {
            Storage::Dense(slots) => slots.as_ptr() as *mut Option<T>,
            Storage::Sparse(_) => {
                store.sentinel.end_shard_write();
                panic!("sharded writes require a dense backing for {}", store.name);
            }
        };
        SplitWriteGuard { slots, start, end, sentinel: &store.sentinel, _marker: PhantomData }
    }

    /// Take exclusive structural access to the whole world from a shared
    /// reference.
    ///
    /// Only for systems that declared write-all access; the scheduler runs
    /// such systems alone. Debug builds panic if any other guard is live.
    pub fn edit(&self) -> WorldEdit<'_> {
        self.table_sentinel.begin_write("entity table");
        for store in self.stores.iter().flatten() {
            store.sentinel().begin_write("store");
        }
        WorldEdit { world: self }
    }

    fn store<T: Component>(&self) -> &Store<T> {
        let bit = self.registry.expect::<T>();
        let store = self.stores.get(bit).and_then(Option::as_ref).unwrap_or_else(|| {
            panic!("component type {} has no storage", std::any::type_name::<T>())
        });
        store
            .as_any()
            .downcast_ref::<Store<T>>()
            .expect("storage registered under a different type")
    }

    // Shared implementations for the `&mut self` methods and `WorldEdit`.
    // Safety contract for all of them: the caller holds exclusive access to
    // the entity table and every store.

    unsafe fn create_unchecked(&self, hint: u32) -> Option<Entity> {
        let existence = unsafe { &mut *self.existence.get() };
        let start = (hint as usize).min(MAX_ENTITIES - 1);

        let found = (start..MAX_ENTITIES)
            .chain(0..start)
            .find(|&index| !existence.contains(index));

        match found {
            Some(index) => {
                existence.insert(index);
                unsafe { (&mut (*self.composition.get()))[index] = Mask::EMPTY };
                self.live.fetch_add(1, Ordering::AcqRel);
                Some(Entity(index as u32))
            }
            None => {
                warn!("entity table full ({MAX_ENTITIES} slots), creation refused");
                None
            }
        }
    }

    unsafe fn destroy_unchecked(&self, entity: Entity) {
        if entity == Entity::SINGLETON {
            warn!("ignoring attempt to destroy the singleton entity");
            return;
        }
        if !self.exists(entity) {
            warn!("ignoring destroy of dead entity {}", entity.index());
            return;
        }

        let index = entity.index();
        let mask = unsafe { (&(*self.composition.get()))[index as usize] };
        for (bit, store) in self.stores.iter().enumerate() {
            if mask.intersects(Mask::bit(bit))
                && let Some(store) = store
            {
                unsafe { store.destroy(index) };
            }
        }

        unsafe {
            (&mut (*self.composition.get()))[index as usize] = Mask::EMPTY;
            (*self.existence.get()).remove(index as usize);
        }
        self.live.fetch_sub(1, Ordering::AcqRel);
    }

    unsafe fn add_unchecked<T: Component>(&self, entity: Entity, value: T) {
        assert!(
            self.exists(entity),
            "cannot add {} to dead entity {}",
            std::any::type_name::<T>(),
            entity.index()
        );
        let bit = self.registry.expect::<T>();
        let store = self.store::<T>();
        unsafe {
            (*store.cell.get()).insert(entity.index(), value);
            (&mut (*self.composition.get()))[entity.index() as usize] |= Mask::bit(bit);
        }
    }

    unsafe fn remove_unchecked<T: Component>(&self, entity: Entity) -> Option<T> {
        if !self.exists(entity) {
            return None;
        }
        let bit = self.registry.expect::<T>();
        let store = self.store::<T>();
        unsafe {
            let removed = (*store.cell.get()).remove(entity.index());
            if removed.is_some() {
                let mask = &mut (&mut (*self.composition.get()))[entity.index() as usize];
                *mask = mask.without(Mask::bit(bit));
            }
            removed
        }
    }

    unsafe fn clear_unchecked(&self) {
        for store in self.stores.iter().flatten() {
            unsafe { store.clear() };
        }
        unsafe {
            let existence = &mut *self.existence.get();
            existence.clear();
            existence.insert(Entity::SINGLETON.index() as usize);
            (*self.composition.get()).fill(Mask::EMPTY);
        }
        self.live.store(1, Ordering::Release);
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared read access to one component type's storage. Released on drop.
pub struct ReadGuard<'w, T: Component> {
    storage: &'w Storage<T>,
    sentinel: &'w AccessSentinel,
}

impl<T: Component> Deref for ReadGuard<'_, T> {
    type Target = Storage<T>;

    fn deref(&self) -> &Storage<T> {
        self.storage
    }
}

impl<T: Component> Drop for ReadGuard<'_, T> {
    fn drop(&mut self) {
        self.sentinel.end_read();
    }
}

/// Exclusive write access to one component type's storage. Released on
/// drop.
pub struct WriteGuard<'w, T: Component> {
    storage: &'w mut Storage<T>,
    sentinel: &'w AccessSentinel,
}

impl<T: Component> Deref for WriteGuard<'_, T> {
    type Target = Storage<T>;

    fn deref(&self) -> &Storage<T> {
        self.storage
    }
}

impl<T: Component> DerefMut for WriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Storage<T> {
        self.storage
    }
}

impl<T: Component> Drop for WriteGuard<'_, T> {
    fn drop(&mut self) {
        self.sentinel.end_write();
    }
}

/// Ranged write access to a dense storage, for one shard of a split
/// system. Released on drop.
///
/// Other shards of the same system hold their own guards over different
/// ranges at the same time; every other kind of access is excluded by the
/// scheduler's masks (and, in debug builds, the sentinel).
pub struct SplitWriteGuard<'w, T: Component> {
    slots: *mut Option<T>,
    start: u32,
    end: u32,
    sentinel: &'w AccessSentinel,
    _marker: PhantomData<&'w mut T>,
}

impl<T: Component> SplitWriteGuard<'_, T> {
    pub fn get(&self, index: u32) -> Option<&T> {
        self.check(index);
        // Safety: in-range indices belong to this shard alone.
        unsafe { (*self.slots.add(index as usize)).as_ref() }
    }

    pub fn get_mut(&mut self, index: u32) -> Option<&mut T> {
        self.check(index);
        // Safety: in-range indices belong to this shard alone, and `&mut
        // self` keeps the returned borrows from overlapping.
        unsafe { (*self.slots.add(index as usize)).as_mut() }
    }

    fn check(&self, index: u32) {
        assert!(
            self.start <= index && index <= self.end,
            "index {index} outside this shard's range [{}, {}]",
            self.start,
            self.end
        );
    }
}

impl<T: Component> Drop for SplitWriteGuard<'_, T> {
    fn drop(&mut self) {
        self.sentinel.end_shard_write();
    }
}

/// Exclusive structural access to the world, for write-all systems.
///
/// While a `WorldEdit` is live no other guard may exist; the scheduler
/// guarantees this by never running a write-all system alongside anything
/// else.
pub struct WorldEdit<'w> {
    world: &'w World,
}

impl WorldEdit<'_> {
    pub fn create_entity(&mut self, hint: u32) -> Option<Entity> {
        // Safety: this guard holds exclusive access to the table and every
        // store.
        unsafe { self.world.create_unchecked(hint) }
    }

    pub fn destroy_entity(&mut self, entity: Entity) {
        // Safety: as in `create_entity`.
        unsafe { self.world.destroy_unchecked(entity) }
    }

    pub fn add_component<T: Component>(&mut self, entity: Entity, value: T) {
        // Safety: as in `create_entity`.
        unsafe { self.world.add_unchecked(entity, value) }
    }

    pub fn remove_component<T: Component>(&mut self, entity: Entity) -> Option<T> {
        // Safety: as in `create_entity`.
        unsafe { self.world.remove_unchecked(entity) }
    }

    pub fn get_component<T: Component>(&self, entity: Entity) -> Option<&T> {
        if !self.world.exists(entity) {
            return None;
        }
        let store = self.world.store::<T>();
        // Safety: as in `create_entity`.
        unsafe { (*store.cell.get()).get(entity.index()) }
    }

    pub fn get_component_mut<T: Component>(&mut self, entity: Entity) -> Option<&mut T> {
        if !self.world.exists(entity) {
            return None;
        }
        let store = self.world.store::<T>();
        // Safety: as in `create_entity`, and `&mut self` prevents a second
        // live borrow through this guard.
        unsafe { (*store.cell.get()).get_mut(entity.index()) }
    }

    pub fn clear_entities(&mut self) {
        // Safety: as in `create_entity`.
        unsafe { self.world.clear_unchecked() }
    }

    pub fn exists(&self, entity: Entity) -> bool {
        self.world.exists(entity)
    }

    pub fn live_count(&self) -> usize {
        self.world.live_count()
    }
}

impl Drop for WorldEdit<'_> {
    fn drop(&mut self) {
        for store in self.world.stores.iter().flatten() {
            store.sentinel().end_write();
        }
        self.world.table_sentinel.end_write();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::log::ChannelLogger;

    struct Position {
        x: f32,
    }
    impl Component for Position {}

    struct Tag;
    impl Component for Tag {}

    fn world() -> World {
        let mut world = World::new();
        world.register_component::<Position>(Backing::Dense);
        world.register_component::<Tag>(Backing::Sparse);
        world
    }

    #[test]
    fn new_world_holds_only_the_singleton() {
        // Given / When
        let world = World::new();

        // Then
        assert!(world.exists(Entity::SINGLETON));
        assert_eq!(world.live_count(), 1);
        assert!(!world.exists(Entity::INVALID));
        assert_eq!(world.mask_of(Entity::SINGLETON), Mask::EMPTY);
    }

    #[test]
    fn created_entities_reuse_destroyed_slots() {
        // Given
        let mut world = world();
        let first = world.create_entity(0).unwrap();
        assert_eq!(first.index(), 1);

        // When
        world.destroy_entity(first);
        let second = world.create_entity(0).unwrap();

        // Then - the freed slot is handed out again
        assert_eq!(second.index(), 1);
        assert_eq!(world.live_count(), 2);
    }

    #[test]
    fn creation_honors_the_hint() {
        // Given
        let mut world = world();

        // When
        let entity = world.create_entity(100).unwrap();

        // Then
        assert_eq!(entity.index(), 100);

        // When - the hinted slot is taken, the scan moves on
        let next = world.create_entity(100).unwrap();

        // Then
        assert_eq!(next.index(), 101);
    }

    #[test]
    fn creation_wraps_past_the_end_of_the_table() {
        // Given
        let mut world = world();
        let last = (MAX_ENTITIES - 1) as u32;
        world.create_entity(last).unwrap();

        // When - the hint points at the occupied last slot
        let entity = world.create_entity(last).unwrap();

        // Then - the scan wrapped around to the low end
        assert_eq!(entity.index(), 1);
    }

    #[test]
    fn a_full_table_refuses_creation_with_a_warning() {
        // Given - a channel logger capturing engine diagnostics
        let (logger, receiver) = ChannelLogger::with_receiver();
        log::set_boxed_logger(Box::new(logger)).expect("no other logger installed");
        log::set_max_level(log::LevelFilter::Warn);

        let mut world = world();
        for _ in 1..MAX_ENTITIES {
            assert!(world.create_entity(0).is_some());
        }
        assert_eq!(world.live_count(), MAX_ENTITIES);

        // When
        assert!(world.create_entity(0).is_none());

        // Then - the refusal was diagnosed, not silent
        let warned = receiver.try_iter().any(|message| {
            message.level == log::Level::Warn && message.message.contains("entity table full")
        });
        assert!(warned);
    }

    #[test]
    fn components_track_the_composition_mask() {
        // Given
        let mut world = world();
        let entity = world.create_entity(0).unwrap();

        // When
        world.add_component(entity, Position { x: 1.0 });
        world.add_component(entity, Tag);

        // Then
        let expected = world.mask_for::<(Position, Tag)>();
        assert_eq!(world.mask_of(entity), expected);
        assert!(world.has_components(entity, world.mask_for::<(Position,)>()));
        assert_eq!(world.get_component::<Position>(entity).unwrap().x, 1.0);

        // When
        world.remove_component::<Tag>(entity);

        // Then
        assert_eq!(world.mask_of(entity), world.mask_for::<(Position,)>());
        assert!(!world.has_components(entity, world.mask_for::<(Tag,)>()));
    }

    #[test]
    fn destroy_drops_component_values() {
        // Given
        let mut world = world();
        let entity = world.create_entity(0).unwrap();
        world.add_component(entity, Position { x: 2.0 });

        // When
        world.destroy_entity(entity);

        // Then - the slot is dead and its data is gone
        assert!(!world.exists(entity));
        assert_eq!(world.mask_of(entity), Mask::EMPTY);
        let reborn = world.create_entity(0).unwrap();
        assert_eq!(reborn.index(), entity.index());
        assert!(world.get_component::<Position>(reborn).is_none());
    }

    #[test]
    fn destroying_the_dead_or_the_singleton_is_a_noop() {
        // Given
        let mut world = world();
        let entity = world.create_entity(0).unwrap();
        world.destroy_entity(entity);

        // When - both are ignored
        world.destroy_entity(entity);
        world.destroy_entity(Entity::SINGLETON);

        // Then
        assert_eq!(world.live_count(), 1);
        assert!(world.exists(Entity::SINGLETON));
    }

    #[test]
    fn clear_keeps_the_singleton_and_nothing_else() {
        // Given
        let mut world = world();
        world.add_component(Entity::SINGLETON, Position { x: 9.0 });
        let entity = world.create_entity(0).unwrap();
        world.add_component(entity, Tag);

        // When
        world.clear_entities();

        // Then
        assert_eq!(world.live_count(), 1);
        assert!(world.exists(Entity::SINGLETON));
        assert!(!world.exists(entity));
        assert!(world.get_component::<Position>(Entity::SINGLETON).is_none());
    }

    #[test]
    fn guards_expose_storage_contents() {
        // Given
        let mut world = world();
        let entity = world.create_entity(0).unwrap();
        world.add_component(entity, Position { x: 3.0 });

        // When - a writer updates through the guard
        {
            let mut positions = world.write::<Position>();
            positions.get_mut(entity.index()).unwrap().x = 4.0;
        }

        // Then - readers observe the update, and may overlap
        let a = world.read::<Position>();
        let b = world.read::<Position>();
        assert_eq!(a.get(entity.index()).unwrap().x, 4.0);
        assert_eq!(b.get(entity.index()).unwrap().x, 4.0);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "undeclared access")]
    fn conflicting_guards_panic_in_debug() {
        let world = world();
        let _reader = world.read::<Position>();
        let _writer = world.write::<Position>();
    }

    #[test]
    fn split_guards_write_disjoint_ranges_concurrently() {
        // Given - entities on both sides of a shard boundary
        let mut world = world();
        for index in [1u32, 100] {
            let entity = world.create_entity(index).unwrap();
            world.add_component(entity, Position { x: 0.0 });
        }

        // When - two shard guards are live at once
        {
            let mut low = world.write_split::<Position>(0, 63);
            let mut high = world.write_split::<Position>(64, 127);
            low.get_mut(1).unwrap().x = 1.0;
            high.get_mut(100).unwrap().x = 2.0;
        }

        // Then
        assert_eq!(world.get_component::<Position>(Entity::from_index(1)).unwrap().x, 1.0);
        assert_eq!(world.get_component::<Position>(Entity::from_index(100)).unwrap().x, 2.0);
    }

    #[test]
    #[should_panic(expected = "outside this shard's range")]
    fn split_guards_reject_out_of_range_indices() {
        let mut world = world();
        let entity = world.create_entity(100).unwrap();
        world.add_component(entity, Position { x: 0.0 });

        let mut guard = world.write_split::<Position>(0, 63);
        guard.get_mut(100);
    }

    #[test]
    #[should_panic(expected = "require a dense backing")]
    fn split_guards_refuse_sparse_storages() {
        let world = world();
        world.write_split::<Tag>(0, 63);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "undeclared access")]
    fn split_guards_conflict_with_readers() {
        let world = world();
        let _reader = world.read::<Position>();
        let _split = world.write_split::<Position>(0, 63);
    }

    #[test]
    fn edit_performs_structural_changes_from_a_shared_reference() {
        // Given
        let world = world();

        // When
        let spawned = {
            let mut edit = world.edit();
            let entity = edit.create_entity(0).unwrap();
            edit.add_component(entity, Position { x: 5.0 });
            entity
        };

        // Then - visible after the guard is released
        assert!(world.exists(spawned));
        assert_eq!(world.get_component::<Position>(spawned).unwrap().x, 5.0);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "undeclared access")]
    fn edit_conflicts_with_live_guards() {
        let world = world();
        let _reader = world.read::<Position>();
        let _edit = world.edit();
    }
}
