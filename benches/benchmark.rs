use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use quality_lens::engine::{
    compare, diff, encode_jpeg, find_threshold, psnr, resize_bitmap, ssim, AlphaHandling, Bitmap,
    JpegCodec,
};
use quality_lens::Quality;

fn photo_like(width: u32, height: u32) -> Bitmap {
    Bitmap::from_fn(width, height, |x, y| {
        let r = ((x * 255) / width) as u8;
        let g = ((y * 255) / height) as u8;
        let b = (((x ^ y) * 7) % 256) as u8;
        [r, g, b, 255]
    })
    .expect("valid bitmap")
}

fn degraded(reference: &Bitmap) -> Bitmap {
    let bytes = encode_jpeg(reference, Quality::new(40).expect("quality"), AlphaHandling::Discard)
        .expect("encode");
    quality_lens::engine::decode_jpeg(&bytes).expect("decode")
}

fn bench_metrics(c: &mut Criterion) {
    let reference = photo_like(512, 384);
    let compressed = degraded(&reference);

    let mut group = c.benchmark_group("metrics");
    group.bench_function("psnr_512x384", |b| {
        b.iter(|| psnr(black_box(&reference), black_box(&compressed)))
    });
    group.bench_function("ssim_512x384", |b| {
        b.iter(|| ssim(black_box(&reference), black_box(&compressed)))
    });
    group.bench_function("compare_512x384", |b| {
        b.iter(|| compare(black_box(&reference), black_box(&compressed)))
    });
    group.bench_function("heat_map_512x384", |b| {
        b.iter(|| diff(black_box(&reference), black_box(&compressed)))
    });
    group.finish();
}

fn bench_codec(c: &mut Criterion) {
    let reference = photo_like(512, 384);

    let mut group = c.benchmark_group("codec");
    for quality in [95u8, 80, 50] {
        let q = Quality::try_from(quality).expect("quality");
        group.bench_with_input(BenchmarkId::new("encode_jpeg", quality), &q, |b, &q| {
            b.iter(|| encode_jpeg(black_box(&reference), q, AlphaHandling::Discard))
        });
    }
    group.bench_function("resize_512x384_to_256x192", |b| {
        b.iter(|| resize_bitmap(black_box(&reference), 256, 192))
    });
    group.finish();
}

fn bench_dead_zone(c: &mut Criterion) {
    let reference = photo_like(512, 384);
    let original = encode_jpeg(&reference, Quality::new(70).expect("quality"), AlphaHandling::Discard)
        .expect("encode");
    let reference_size = original.len() as u64;

    c.bench_function("dead_zone_search_512x384", |b| {
        b.iter(|| {
            find_threshold(
                &JpegCodec,
                Some(black_box(&reference)),
                reference_size,
                512,
                384,
                AlphaHandling::Discard,
            )
        })
    });
}

criterion_group!(benches, bench_metrics, bench_codec, bench_dead_zone);
criterion_main!(benches);
