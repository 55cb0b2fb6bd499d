//! A small particle simulation driving the engine end to end: a spawner
//! with structural access, a sharded movement system, a decay system that
//! destroys expired particles, and a once-per-frame report.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use log::{LevelFilter, info};

use helix_engine::core::log::TermLogger;
use helix_engine::core::tasks::Executor;
use helix_engine::ecs::storage::Backing;
use helix_engine::{Access, Component, Config, Scheduler, System, SystemContext, World};

struct Position {
    x: f32,
    y: f32,
}
impl Component for Position {}

struct Velocity {
    dx: f32,
    dy: f32,
}
impl Component for Velocity {}

struct Lifetime {
    remaining: f32,
}
impl Component for Lifetime {}

/// Spawns a particle per step. Needs write-all access because it creates
/// entities, so the scheduler runs it alone.
struct SpawnSystem {
    // xorshift state, good enough for scattering particles.
    seed: AtomicU32,
}

impl SpawnSystem {
    fn next(&self) -> f32 {
        let mut x = self.seed.load(Ordering::Relaxed);
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.seed.store(x, Ordering::Relaxed);
        (x as f32 / u32::MAX as f32) * 2.0 - 1.0
    }
}

impl System for SpawnSystem {
    fn name(&self) -> &'static str {
        "spawn"
    }

    fn priority(&self) -> i32 {
        -10
    }

    fn startup(&mut self, world: &mut World) -> Access {
        world.register_component::<Position>(Backing::Dense);
        world.register_component::<Velocity>(Backing::Dense);
        world.register_component::<Lifetime>(Backing::Sparse);
        Access::builder(world).writes_all().build()
    }

    fn run(&self, _ctx: &SystemContext, world: &World) {
        let mut edit = world.edit();
        if let Some(entity) = edit.create_entity(0) {
            edit.add_component(entity, Position { x: 0.0, y: 0.0 });
            edit.add_component(
                entity,
                Velocity { dx: self.next() * 4.0, dy: self.next() * 4.0 },
            );
            edit.add_component(entity, Lifetime { remaining: 1.5 });
        }
    }
}

/// Integrates positions. Opted into sharding; under load its shards run
/// concurrently over disjoint entity ranges.
struct MovementSystem;

impl System for MovementSystem {
    fn name(&self) -> &'static str {
        "movement"
    }

    fn split_jobs(&self) -> usize {
        4
    }

    fn startup(&mut self, world: &mut World) -> Access {
        Access::builder(world).reads::<(Velocity,)>().writes::<(Position,)>().build()
    }

    fn run(&self, ctx: &SystemContext, world: &World) {
        let velocities = world.read::<Velocity>();
        let mut positions = world.write_split::<Position>(ctx.start, ctx.end);
        for entity in world.iterate::<(Position, Velocity)>(ctx) {
            let velocity = velocities.get(entity.index()).unwrap();
            let position = positions.get_mut(entity.index()).unwrap();
            position.x += velocity.dx * ctx.delta;
            position.y += velocity.dy * ctx.delta;
        }
    }
}

/// Ages particles and destroys the expired ones. Destruction is structural,
/// hence write-all.
struct DecaySystem;

impl System for DecaySystem {
    fn name(&self) -> &'static str {
        "decay"
    }

    fn priority(&self) -> i32 {
        10
    }

    fn startup(&mut self, world: &mut World) -> Access {
        Access::builder(world).writes_all().build()
    }

    fn run(&self, ctx: &SystemContext, world: &World) {
        let mut edit = world.edit();
        let mut expired = Vec::new();
        for entity in world.iterate::<(Lifetime,)>(ctx) {
            if let Some(lifetime) = edit.get_component_mut::<Lifetime>(entity) {
                lifetime.remaining -= ctx.delta;
                if lifetime.remaining <= 0.0 {
                    expired.push(entity);
                }
            }
        }
        for entity in expired {
            edit.destroy_entity(entity);
        }
    }
}

/// Logs the particle population once per rendered frame.
struct ReportSystem;

impl System for ReportSystem {
    fn name(&self) -> &'static str {
        "report"
    }

    fn startup(&mut self, world: &mut World) -> Access {
        Access::builder(world).reads::<(Position,)>().build()
    }

    fn run(&self, ctx: &SystemContext, world: &World) {
        let count = world.iterate::<(Position,)>(ctx).count();
        info!("{count} particles live ({} entities total)", world.live_count());
    }
}

fn main() {
    TermLogger::init(LevelFilter::Debug);

    let mut world = World::new();
    let executor = Executor::new(4);
    let mut scheduler = Scheduler::new(Config::default());

    let simulation = scheduler.add_subgraph("simulation", 1.0 / 120.0);
    scheduler.add_system(simulation, SpawnSystem { seed: AtomicU32::new(0x9e3779b9) });
    scheduler.add_system(simulation, MovementSystem);
    scheduler.add_system(simulation, DecaySystem);

    let frame = scheduler.add_subgraph("frame", 0.0);
    scheduler.add_system(frame, ReportSystem);

    scheduler.startup(&mut world);

    let frame_time = 1.0 / 30.0;
    for _ in 0..120 {
        scheduler.run_frame(&world, frame_time, &executor);
        std::thread::sleep(Duration::from_secs_f32(frame_time));
    }

    scheduler.shutdown(&mut world);
    info!("simulation finished with {} entities live", world.live_count());
}
