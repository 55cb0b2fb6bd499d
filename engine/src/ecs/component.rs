//! Component types and the bit registry.
//!
//! A component is any plain data type the host marks with the [`Component`]
//! trait. The [`TypeRegistry`] hands each distinct component type (and each
//! named resource) a stable bit index on first sight; everything downstream
//! of registration works in terms of [`Mask`]s built from those bits.

use std::any::{TypeId, type_name};
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;

use super::mask::Mask;

/// The hard cap on distinct component types plus named resources. One bit
/// each in a [`Mask`].
pub const MAX_COMPONENT_TYPES: usize = Mask::CAPACITY;

/// Marker trait for component data.
///
/// Components are stored and handed out across worker threads, hence the
/// `Send + Sync` bound.
///
/// ```ignore
/// struct Position { x: f32, y: f32 }
/// impl Component for Position {}
/// ```
pub trait Component: Send + Sync + 'static {}

/// Assigns bit indices to component types and named resources.
///
/// Registration is idempotent and callable from any thread; a type keeps the
/// bit it was first given for the registry's lifetime.
pub struct TypeRegistry {
    types: DashMap<TypeId, usize>,
    resources: DashMap<&'static str, usize>,
    names: RwLock<Vec<&'static str>>,
    next_bit: AtomicUsize,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self {
            types: DashMap::new(),
            resources: DashMap::new(),
            names: RwLock::new(Vec::new()),
            next_bit: AtomicUsize::new(0),
        }
    }

    /// Register a component type, returning its bit index. Registering a
    /// type twice returns the same bit.
    ///
    /// # Panics
    ///
    /// Panics when the combined count of component types and resources would
    /// exceed [`MAX_COMPONENT_TYPES`].
    pub fn register<T: Component>(&self) -> usize {
        *self
            .types
            .entry(TypeId::of::<T>())
            .or_insert_with(|| self.allocate(type_name::<T>()))
    }

    /// Register a named resource, returning its bit index. Resources share
    /// the bit space with component types.
    pub fn register_resource(&self, name: &'static str) -> usize {
        *self.resources.entry(name).or_insert_with(|| self.allocate(name))
    }

    /// The bit previously assigned to `T`, if any.
    pub fn lookup<T: Component>(&self) -> Option<usize> {
        self.types.get(&TypeId::of::<T>()).map(|bit| *bit)
    }

    /// The bit assigned to `T`.
    ///
    /// # Panics
    ///
    /// Panics if `T` was never registered.
    pub fn expect<T: Component>(&self) -> usize {
        match self.lookup::<T>() {
            Some(bit) => bit,
            None => panic!("component type {} was never registered", type_name::<T>()),
        }
    }

    /// The name recorded for a bit, for diagnostics.
    pub fn name_of(&self, bit: usize) -> Option<&'static str> {
        self.names.read().unwrap().get(bit).copied()
    }

    /// How many bits have been handed out so far.
    pub fn len(&self) -> usize {
        self.next_bit.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn allocate(&self, name: &'static str) -> usize {
        let bit = self.next_bit.fetch_add(1, Ordering::AcqRel);
        if bit >= MAX_COMPONENT_TYPES {
            panic!(
                "type registry exhausted: cannot register {name}, \
                 the limit is {MAX_COMPONENT_TYPES} component types and resources"
            );
        }
        let mut names = self.names.write().unwrap();
        // Entries created under the dashmap shard lock can land out of order.
        if names.len() <= bit {
            names.resize(bit + 1, "");
        }
        names[bit] = name;
        bit
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A statically-known set of component types, convertible to the mask of
/// their registered bits.
///
/// Implemented for tuples of [`Component`] types up to arity eight; a single
/// type is written as the one-element tuple `(T,)`.
pub trait ComponentSet {
    fn mask(registry: &TypeRegistry) -> Mask;
}

macro_rules! impl_component_set {
    ($($ty:ident),+) => {
        impl<$($ty: Component),+> ComponentSet for ($($ty,)+) {
            fn mask(registry: &TypeRegistry) -> Mask {
                Mask::EMPTY $(.union(Mask::bit(registry.expect::<$ty>())))+
            }
        }
    };
}

impl_component_set!(A);
impl_component_set!(A, B);
impl_component_set!(A, B, C);
impl_component_set!(A, B, C, D);
impl_component_set!(A, B, C, D, E);
impl_component_set!(A, B, C, D, E, F);
impl_component_set!(A, B, C, D, E, F, G);
impl_component_set!(A, B, C, D, E, F, G, H);

#[cfg(test)]
mod tests {
    use super::*;

    struct Position;
    impl Component for Position {}

    struct Velocity;
    impl Component for Velocity {}

    struct Health;
    impl Component for Health {}

    #[test]
    fn registration_assigns_sequential_bits() {
        // Given
        let registry = TypeRegistry::new();

        // When
        let a = registry.register::<Position>();
        let b = registry.register::<Velocity>();

        // Then
        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn registration_is_idempotent() {
        // Given
        let registry = TypeRegistry::new();
        let first = registry.register::<Position>();

        // When
        let second = registry.register::<Position>();

        // Then
        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn resources_share_the_bit_space() {
        // Given
        let registry = TypeRegistry::new();
        registry.register::<Position>();

        // When
        let resource = registry.register_resource("render-queue");
        let component = registry.register::<Velocity>();

        // Then
        assert_eq!(resource, 1);
        assert_eq!(component, 2);
        assert_eq!(registry.name_of(1), Some("render-queue"));
    }

    #[test]
    fn lookup_distinguishes_registered_from_unknown() {
        // Given
        let registry = TypeRegistry::new();
        registry.register::<Position>();

        // Then
        assert_eq!(registry.lookup::<Position>(), Some(0));
        assert_eq!(registry.lookup::<Velocity>(), None);
    }

    #[test]
    #[should_panic(expected = "never registered")]
    fn expect_panics_for_unknown_type() {
        let registry = TypeRegistry::new();
        registry.expect::<Health>();
    }

    #[test]
    fn component_set_masks_union_member_bits() {
        // Given
        let registry = TypeRegistry::new();
        registry.register::<Position>();
        registry.register::<Velocity>();
        registry.register::<Health>();

        // When
        let single = <(Velocity,)>::mask(&registry);
        let pair = <(Position, Health)>::mask(&registry);

        // Then
        assert_eq!(single, Mask::bit(1));
        assert_eq!(pair, Mask::bit(0) | Mask::bit(2));
    }

    #[test]
    #[should_panic(expected = "type registry exhausted")]
    fn overflowing_the_bit_space_is_fatal() {
        // Given - a registry with every bit taken by resources
        let registry = TypeRegistry::new();
        for i in 0..MAX_COMPONENT_TYPES {
            let name: &'static str = Box::leak(format!("resource-{i}").into_boxed_str());
            registry.register_resource(name);
        }

        // When / Then
        registry.register::<Position>();
    }
}
