//! Compositing demo: builds one surface from stamps, a forest and a road.
//!
//! Usage: cargo run --release --bin composite_demo -- [OPTIONS]
//!
//! Options:
//!   --config <PATH>   Surface configuration JSON (default: built-in)
//!   --seed <SEED>     Noise seed (default: 12345)
//!   --stamps <N>      Number of hill stamps (default: 6)
//!   --trees <N>       Trees per row of the forest grid (default: 12)
//!   --budget <N>      Requests applied per tick (default: 8)
//!   --out <DIR>       Save the composited stack to DIR

use std::path::PathBuf;
use std::time::Instant;

use glam::{Vec2, Vec3};

use strata::apply::{ApplyBudget, ApplyManager, ChannelKind, FalloffCurve, Footprint, JobStatus, WriteRequest};
use strata::core::Result;
use strata::layer::{
    BlendMode, CompoundQuery, CompoundResult, EntityKind, EntitySpawn, Layer, LayerKind, LayerStack,
    PrototypeRef, SurfaceConfig,
};
use strata::math::CellRect;
use strata::persist::disk_io;
use strata::stamp::{HeightStamp, NoiseParams, PolylineFalloff, StampInstance, StampTemplate};

const GOLDEN_ANGLE: f32 = 2.399_963;

fn main() {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .format_timestamp_millis()
    .init();

    if let Err(e) = run() {
        log::error!("composite_demo failed: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let config = match parse_str_arg(&args, "--config") {
        Some(path) => SurfaceConfig::load(&PathBuf::from(path))?,
        None => SurfaceConfig::default(),
    };
    let seed = parse_u32_arg(&args, "--seed").unwrap_or(12345);
    let stamps = parse_usize_arg(&args, "--stamps").unwrap_or(6);
    let trees = parse_usize_arg(&args, "--trees").unwrap_or(12);
    let budget = parse_usize_arg(&args, "--budget").unwrap_or(8);
    let out = parse_str_arg(&args, "--out").map(PathBuf::from);

    println!("=== Strata Compositing Demo ===");
    println!(
        "Height {}x{}, splat {}x{}, entities {}x{}",
        config.height_resolution.width,
        config.height_resolution.height,
        config.splat_resolution.width,
        config.splat_resolution.height,
        config.entity_resolution.width,
        config.entity_resolution.height
    );
    println!("Seed: {}, stamps: {}, forest: {}x{}", seed, stamps, trees, trees);
    println!();

    let mut stack = LayerStack::new("demo_surface", config)?;
    stack.push_layer(Layer::new("roads", LayerKind::Procedural))?;
    stack.push_layer(Layer::new("hills", LayerKind::Stamp))?;
    stack.push_layer(Layer::new("forest", LayerKind::Stamp))?;
    stack.push_layer(Layer::new("base", LayerKind::Painted).with_blend_mode(BlendMode::Additive))?;

    let grass = stack.config().surface_by_name("grass");
    let dirt = stack.config().surface_by_name("dirt");
    let rock = stack.config().surface_by_name("rock");

    let mut manager = ApplyManager::with_budget(ApplyBudget {
        max_requests_per_tick: budget.max(1),
        ..Default::default()
    });

    // Base terrain: low rolling noise and grass everywhere
    let base = HeightStamp::from_noise(
        64,
        64,
        &NoiseParams { seed, amplitude: 4.0, ..Default::default() },
    )?;
    let mut base_template = StampTemplate::new("base").with_height(base);
    if let Some(grass) = grass {
        base_template = base_template.with_surface(grass, HeightStamp::new(1, 1, vec![1.0])?);
    }
    let base_instance = StampInstance::new("base", 1, Vec2::splat(0.5), Vec2::ONE)
        .with_falloff(0.0, FalloffCurve::Constant);
    manager.submit_all(base_instance.requests(&base_template)?)?;

    // Hills: one noise template stamped several times at increasing priority
    let hill = HeightStamp::from_fn(32, 32, |uv| {
        let d = (uv - Vec2::splat(0.5)).length() * 2.0;
        (1.0 - d).max(0.0) * 12.0
    })?;
    let mut hill_template = StampTemplate::new("hill").with_height(hill);
    if let Some(rock) = rock {
        hill_template = hill_template.with_surface(rock, HeightStamp::new(1, 1, vec![0.7])?);
    }
    for i in 0..stamps {
        let angle = i as f32 * GOLDEN_ANGLE;
        let radius = 0.15 + 0.25 * (i as f32 / stamps.max(1) as f32);
        let center = Vec2::splat(0.5) + Vec2::from_angle(angle) * radius;
        let instance = StampInstance::new("hills", 10 + i as u32, center, Vec2::splat(0.3))
            .with_rotation(angle)
            .with_falloff(0.3, FalloffCurve::Smooth);
        manager.submit_all(instance.requests(&hill_template)?)?;
    }

    // Forest: jittered grid of trees
    let mut spawns = Vec::with_capacity(trees * trees);
    for z in 0..trees {
        for x in 0..trees {
            let jitter = Vec2::new(
                ((x * 7 + z * 13) % 10) as f32 / 10.0 - 0.5,
                ((x * 11 + z * 3) % 10) as f32 / 10.0 - 0.5,
            ) * 0.5;
            let uv = (Vec2::new(x as f32, z as f32) + Vec2::splat(0.5) + jitter) / trees as f32;
            spawns.push(EntitySpawn::new(PrototypeRef((x + z) as u32 % 3), uv));
        }
    }
    manager.submit(
        WriteRequest::builder("forest", ChannelKind::Entities(EntityKind::Tree))
            .priority(5)
            .footprint(Footprint::full())
            .spawns(spawns)
            .build()?,
    )?;

    // Road: flattens terrain, paints dirt and clears trees along a polyline
    let road = PolylineFalloff::new(
        vec![
            Vec3::new(0.05, 2.0, 0.2),
            Vec3::new(0.4, 3.0, 0.45),
            Vec3::new(0.6, 3.0, 0.55),
            Vec3::new(0.95, 2.5, 0.85),
        ],
        0.02,
    )?
    .with_falloff(0.04, FalloffCurve::Smooth);
    let road_request = |channel| {
        WriteRequest::builder("roads", channel).priority(1000).geometry(&road)
    };
    manager.submit(road_request(ChannelKind::Height).values(road.elevation()).build()?)?;
    if let Some(dirt) = dirt {
        manager.submit(road_request(ChannelKind::SurfaceWeight(dirt)).value(1.0).build()?)?;
    }
    manager.submit(road_request(ChannelKind::Entities(EntityKind::Tree)).remove().build()?)?;

    println!("Submitted {} requests", manager.pending_count());
    let start = Instant::now();
    let mut job = manager.begin_job();
    loop {
        match job.tick(&mut stack) {
            JobStatus::InProgress { remaining } => log::debug!("Tick {}: {} remaining", job.ticks(), remaining),
            JobStatus::Complete => break,
        }
    }
    let report = job.into_report();
    println!(
        "Applied {} requests in {:.1}ms ({} rejected, {} cells written, {} blocked)",
        report.applied,
        start.elapsed().as_secs_f64() * 1000.0,
        report.rejected,
        report.cells.written,
        report.cells.blocked
    );
    println!(
        "Entities: {} spawned, {} tombstoned",
        report.entities_spawned, report.entities_removed
    );

    let size = stack.config().height_resolution;
    if let CompoundResult::Grid(heights) =
        stack.query(&CompoundQuery::Height(CellRect::full(size.width, size.height)))
    {
        println!("Compound height: min {:.2}, max {:.2}", heights.min(), heights.max());
    }
    if let Some(dirt) = dirt {
        let splat = stack.config().splat_resolution;
        if let CompoundResult::Grid(weights) =
            stack.query(&CompoundQuery::SurfaceWeight(dirt, CellRect::full(splat.width, splat.height)))
        {
            let covered = weights.values().iter().filter(|w| **w > 0.5).count();
            println!("Dirt coverage: {} of {} cells", covered, weights.values().len());
        }
    }
    let planted = stack.layer("forest").map_or(0, |l| l.entities(EntityKind::Tree).len());
    let surviving = stack.compound_entities(EntityKind::Tree).len();
    println!("Trees: {} planted, {} surviving", planted, surviving);
    println!("Dirty layers: {:?}", stack.take_dirty_layers());

    if let Some(dir) = out {
        let path = disk_io::save_stack(&dir, &stack)?;
        println!("Saved to {}", path.display());
    }
    Ok(())
}

fn parse_u32_arg(args: &[String], flag: &str) -> Option<u32> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_usize_arg(args: &[String], flag: &str) -> Option<usize> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_str_arg(args: &[String], flag: &str) -> Option<String> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}
