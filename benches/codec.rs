//! Frame codec benchmarks
//!
//! One outbound chunk (4096 samples at 16 kHz) and one typical inbound
//! frame (~40 ms at 24 kHz), through PCM packing and base64.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;

use live_voice::audio::LinearResampler;
use live_voice::codec::{AudioFrame, PcmDecoder, PcmEncoder, Quantization, SampleFormat};

fn generate_audio(len: usize, sample_rate: u32) -> Vec<f32> {
    (0..len)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (220.0 * 2.0 * std::f32::consts::PI * t).sin() * 0.5
        })
        .collect()
}

fn bench_encode(c: &mut Criterion) {
    let samples = generate_audio(4096, 16_000);
    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Elements(samples.len() as u64));

    for quantization in [Quantization::Symmetric, Quantization::Asymmetric] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{:?}", quantization)),
            &samples,
            |b, samples| {
                let mut encoder = PcmEncoder::outbound(quantization);
                b.iter(|| black_box(encoder.encode(black_box(samples))));
            },
        );
    }

    group.bench_function("encode_to_base64", |b| {
        let mut encoder = PcmEncoder::outbound(Quantization::default());
        b.iter(|| black_box(encoder.encode(black_box(&samples)).to_base64()));
    });

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let samples = generate_audio(960, 24_000);
    let frame = PcmEncoder::new(SampleFormat::inbound(), Quantization::default()).encode(&samples);
    let text = frame.to_base64();

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Elements(samples.len() as u64));

    group.bench_function("pcm", |b| {
        let mut decoder = PcmDecoder::new();
        b.iter(|| black_box(decoder.decode_native(black_box(&frame))));
    });

    group.bench_function("base64_and_pcm", |b| {
        let mut decoder = PcmDecoder::new();
        b.iter(|| {
            let frame = AudioFrame::from_base64(black_box(&text), SampleFormat::inbound());
            black_box(frame.map(|frame| decoder.decode_native(&frame)))
        });
    });

    group.finish();
}

fn bench_resample(c: &mut Criterion) {
    let device_audio = generate_audio(4410, 44_100);
    let mut group = c.benchmark_group("resample");
    group.throughput(Throughput::Elements(device_audio.len() as u64));

    for (from, to) in [(44_100, 16_000), (48_000, 16_000), (24_000, 48_000)] {
        group.bench_with_input(
            BenchmarkId::new("linear", format!("{}->{}", from, to)),
            &device_audio,
            |b, audio| {
                let mut resampler = LinearResampler::new(from, to).expect("valid rates");
                b.iter(|| black_box(resampler.process(black_box(audio))));
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode, bench_resample);
criterion_main!(benches);
