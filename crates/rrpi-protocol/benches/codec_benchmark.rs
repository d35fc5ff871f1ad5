//! Benchmarks for command encoding and incremental decoding.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rrpi_protocol::{Command, CommandCodec, RadioPayload, Timeout, TransferData};

fn bench_transfer_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("spi_transfer_decode");
    for size in [16usize, 1024, 65535] {
        let frame = Command::SpiTransfer {
            data: TransferData::new(vec![0xA5; size]).unwrap(),
        }
        .encode();
        group.bench_with_input(BenchmarkId::from_parameter(size), &frame, |b, frame| {
            b.iter(|| {
                let mut codec = CommandCodec::new();
                codec.push(black_box(frame));
                codec.decode().unwrap()
            })
        });
    }
    group.finish();
}

fn bench_radio_stream(c: &mut Criterion) {
    // A typical polling loop: send, poll, receive
    let mut stream = Vec::new();
    for _ in 0..100 {
        stream.extend(
            Command::RadioSend {
                data: RadioPayload::new(vec![1; 32]).unwrap(),
            }
            .encode(),
        );
        stream.extend(Command::RadioPoll { timeout: Timeout(0.01) }.encode());
        stream.extend(Command::RadioReceive { count: 32 }.encode());
    }

    c.bench_function("radio_stream_decode", |b| {
        b.iter(|| {
            let mut codec = CommandCodec::new();
            codec.push(black_box(&stream));
            let mut count = 0;
            while let Some(_cmd) = codec.decode().unwrap() {
                count += 1;
            }
            count
        })
    });
}

criterion_group!(benches, bench_transfer_decode, bench_radio_stream);
criterion_main!(benches);
