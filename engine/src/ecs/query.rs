//! Entity iteration over composition masks.
//!
//! A [`GroupIter`] walks a slice of the entity table and yields the live
//! entities whose composition contains a required mask. Systems drive it
//! with their [`SystemContext`] so that a split system's shards each visit
//! only their own slice.

use super::component::ComponentSet;
use super::mask::Mask;
use super::system::SystemContext;
use super::world::{Entity, World};

/// Iterator over live entities carrying at least the required components,
/// restricted to an index range.
pub struct GroupIter<'w> {
    world: &'w World,
    mask: Mask,
    next: u32,
    end: u32,
}

impl<'w> GroupIter<'w> {
    /// Iterate the context's entity range for entities matching `mask`.
    pub fn new(world: &'w World, ctx: &SystemContext, mask: Mask) -> Self {
        GroupIter { world, mask, next: ctx.start, end: ctx.end }
    }
}

impl Iterator for GroupIter<'_> {
    type Item = Entity;

    fn next(&mut self) -> Option<Entity> {
        while self.next <= self.end {
            let entity = Entity::from_index(self.next);
            self.next += 1;
            if self.world.has_components(entity, self.mask) {
                return Some(entity);
            }
        }
        None
    }
}

impl World {
    /// Iterate the context's entity range for entities carrying every
    /// component in `S`.
    pub fn iterate<S: ComponentSet>(&self, ctx: &SystemContext) -> GroupIter<'_> {
        GroupIter::new(self, ctx, self.mask_for::<S>())
    }
}
