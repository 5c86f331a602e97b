use cdcres::animation::{Animation, BlendShapeFrame, FrameCodecOptions, Track};
use cdcres::builder::ResourceBuilder;
use cdcres::common::{Game, ResourceType};
use cdcres::reader::ResourceReader;
use cdcres::resource::{ResourceKey, ResourceReference};
use cdcres::vertex::AttributeCodec;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

const ANIMATION: ResourceKey = ResourceKey::new(ResourceType::Animation, 1);
const MODEL: ResourceKey = ResourceKey::new(ResourceType::Model, 2);

fn face_animation() -> Animation {
    let mut animation = Animation::new(ANIMATION.id);
    animation.num_frames = 240;
    animation.blend_shape_tracks = (0..32)
        .map(|id| Track {
            id,
            frames: (0..240)
                .map(|frame| BlendShapeFrame {
                    weight: Some(((frame + id) as f32 * 0.05).sin() * 0.5 + 0.5),
                })
                .collect(),
        })
        .collect();
    animation
}

fn encode_animation(animation: &Animation) -> Vec<u8> {
    let mut builder = ResourceBuilder::new(ANIMATION, Game::Sottr);
    animation
        .write(&mut builder, &FrameCodecOptions::default())
        .unwrap();
    builder.build().unwrap()
}

fn decode_animation(data: &[u8]) {
    let mut reader = ResourceReader::new(ANIMATION, data, true, Game::Sottr).unwrap();
    Animation::read(&mut reader).unwrap();
}

fn build_references() -> Vec<u8> {
    let mut builder = ResourceBuilder::new(MODEL, Game::Tr2013);
    for i in 0..512u32 {
        let reference = match i % 3 {
            0 => builder.make_internal_ref_at(i as u64 * 8),
            1 => ResourceReference::new(ResourceKey::new(ResourceType::Material, i), 0x10),
            _ => ResourceReference::new(ResourceKey::new(ResourceType::Texture, i), 0),
        };
        builder.write_ref(Some(&reference)).unwrap();
    }
    builder.build().unwrap()
}

fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("vertex codec", |b| {
        let mut bytes = [0u8; 8];
        b.iter(|| {
            AttributeCodec::R16G16B16A16Snorm.encode(&mut bytes, black_box(&[0.25, -0.5, 1.0, 0.0]));
            AttributeCodec::R16G16B16A16Snorm.decode(&bytes)
        })
    });

    let animation = face_animation();
    c.bench_function("animation encode", |b| b.iter(|| encode_animation(&animation)));

    let data = encode_animation(&animation);
    c.bench_function("animation decode", |b| b.iter(|| decode_animation(&data)));

    c.bench_function("relocation build", |b| b.iter(build_references));

    let references = build_references();
    c.bench_function("relocation parse", |b| {
        b.iter(|| ResourceReader::new(MODEL, black_box(&references), true, Game::Tr2013).unwrap())
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
