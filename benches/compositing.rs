use criterion::{black_box, criterion_group, criterion_main, Criterion};
use image::{ImageFormat, RgbaImage};
use rakkan::compositor::composite;
use std::io::Cursor;

fn create_bench_image(width: u32, height: u32) -> Vec<u8> {
    let mut img = RgbaImage::new(width, height);
    for (x, y, pixel) in img.enumerate_pixels_mut() {
        *pixel = image::Rgba([(x % 255) as u8, (y % 255) as u8, ((x + y) % 255) as u8, 255]);
    }
    let mut buffer = Cursor::new(Vec::new());
    img.write_to(&mut buffer, ImageFormat::Png).unwrap();
    buffer.into_inner()
}

fn bench_compositing(c: &mut Criterion) {
    // Generate a reasonably sized input image (e.g. 1920x1080)
    let base = create_bench_image(1920, 1080);
    let watermark = create_bench_image(400, 200);

    let mut group = c.benchmark_group("compositing");
    group.sample_size(10); // Image ops are slow, reduce sample size

    group.bench_function("composite_1080p_plain", |b| {
        b.iter(|| {
            composite(black_box(&base), None).unwrap();
        })
    });

    group.bench_function("composite_1080p_watermarked", |b| {
        b.iter(|| {
            composite(black_box(&base), black_box(Some(&watermark))).unwrap();
        })
    });

    group.finish();
}

criterion_group!(benches, bench_compositing);
criterion_main!(benches);
