use criterion::{criterion_group, criterion_main, Criterion, black_box};

use strata::apply::{apply_request, ApplyManager, ChannelKind, FalloffCurve, Footprint, RadialBrush, WriteRequest};
use strata::layer::{BlendMode, Layer, LayerKind, LayerStack, SurfaceConfig, SurfaceType};
use strata::math::CellRect;
use strata::stencil::codec;

use glam::Vec2;

fn brush_request(layer: &str, priority: u32, center: Vec2) -> WriteRequest {
    let brush = RadialBrush {
        center,
        radius: 0.2,
        hardness: 0.5,
        curve: FalloffCurve::Smooth,
    };
    WriteRequest::builder(layer, ChannelKind::Height)
        .priority(priority)
        .geometry(&brush)
        .value(5.0)
        .build()
        .unwrap()
}

fn layered_stack(layers: usize) -> LayerStack {
    let mut stack = LayerStack::new("bench", SurfaceConfig::default()).unwrap();
    for i in 0..layers {
        let mode = if i % 2 == 0 { BlendMode::Stencil } else { BlendMode::Additive };
        stack
            .push_layer(Layer::new(format!("layer_{}", i), LayerKind::Stamp).with_blend_mode(mode))
            .unwrap();
        let center = Vec2::new(0.2 + 0.6 * (i as f32 / layers as f32), 0.5);
        apply_request(&mut stack, &brush_request(&format!("layer_{}", i), 1 + i as u32, center)).unwrap();
    }
    stack
}

fn bench_codec(c: &mut Criterion) {
    c.bench_function("stencil_encode_decode", |b| {
        b.iter(|| {
            let mut acc = 0u32;
            for key in 1..1024u32 {
                let packed = codec::encode(black_box(key), black_box(0.37));
                acc = acc.wrapping_add(codec::decode(packed).key);
            }
            acc
        });
    });
}

fn bench_apply_height_brush(c: &mut Criterion) {
    let request = brush_request("paint", 3, Vec2::splat(0.5));
    c.bench_function("apply_height_brush_65", |b| {
        b.iter(|| {
            let mut stack = LayerStack::new("bench", SurfaceConfig::default()).unwrap();
            apply_request(&mut stack, black_box(&request)).unwrap()
        });
    });
}

fn bench_apply_splat_renormalize(c: &mut Criterion) {
    let requests: Vec<WriteRequest> = (0..3u16)
        .map(|t| {
            WriteRequest::builder("paint", ChannelKind::SurfaceWeight(SurfaceType(t)))
                .priority(1)
                .footprint(Footprint::full())
                .value(0.5)
                .build()
                .unwrap()
        })
        .collect();
    c.bench_function("apply_splat_three_surfaces_64", |b| {
        b.iter(|| {
            let mut stack = LayerStack::new("bench", SurfaceConfig::default()).unwrap();
            let mut manager = ApplyManager::new();
            manager.submit_all(requests.iter().cloned()).unwrap();
            manager.apply_all(&mut stack)
        });
    });
}

fn bench_compound_heights(c: &mut Criterion) {
    let stack = layered_stack(8);
    let rect = CellRect::full(65, 65);
    c.bench_function("compound_heights_8_layers_65", |b| {
        b.iter(|| stack.compound_heights(black_box(rect)));
    });
}

criterion_group!(
    benches,
    bench_codec,
    bench_apply_height_brush,
    bench_apply_splat_renormalize,
    bench_compound_heights,
);
criterion_main!(benches);
