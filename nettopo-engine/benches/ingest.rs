use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use nettopo_engine::{decode_line, Engine};

fn packet_line(i: usize) -> String {
    format!(
        r#"{{"src_ip": "192.168.1.10", "dst_ip": "10.0.{}.{}", "protocol": "TCP", "length": 60}}"#,
        (i / 250) % 250,
        i % 250
    )
}

fn traceroute_line(hops: usize) -> String {
    let hops: Vec<_> = (1..=hops)
        .map(|ttl| {
            format!(
                r#"{{"ttl": {ttl}, "responses": [{{"ip": "10.{ttl}.0.1", "rtts": [1.5, 2.5, "*"]}}]}}"#
            )
        })
        .collect();
    format!(
        r#"{{"protocol": "TRACEROUTE", "dst_ip": "8.8.8.8", "hops": [{}]}}"#,
        hops.join(",")
    )
}

/// Benchmark decoding of packet and traceroute lines
fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    let packet = packet_line(7);
    let trace = traceroute_line(12);

    group.bench_function("packet", |b| {
        b.iter(|| black_box(decode_line(black_box(&packet))))
    });
    group.bench_function("traceroute_12_hops", |b| {
        b.iter(|| black_box(decode_line(black_box(&trace))))
    });
    group.bench_function("banner", |b| {
        b.iter(|| black_box(decode_line(black_box("🚀 Capture started on en0"))))
    });
    group.finish();
}

/// Benchmark applying packets to a graph of existing hosts
fn bench_apply_known_hosts(c: &mut Criterion) {
    let mut group = c.benchmark_group("apply_known_hosts");

    for hosts in [10, 100, 1000].iter() {
        let engine = Engine::builder().local_identity("192.168.1.10").build();
        let events: Vec<_> = (0..*hosts)
            .map(|i| decode_line(&packet_line(i)).unwrap())
            .collect();
        for event in &events {
            engine.apply_at(event, 0);
        }

        group.throughput(Throughput::Elements(*hosts as u64));
        group.bench_with_input(BenchmarkId::from_parameter(hosts), hosts, |b, _| {
            b.iter(|| {
                for event in &events {
                    black_box(engine.apply_at(event, 1));
                }
            });
        });
    }
    group.finish();
}

/// Benchmark the per-event cost with subscribers attached
fn bench_apply_with_subscribers(c: &mut Criterion) {
    let mut group = c.benchmark_group("apply_with_subscribers");
    let event = decode_line(&packet_line(1)).unwrap();

    for subscribers in [0, 1, 8].iter() {
        let engine = Engine::builder()
            .local_identity("192.168.1.10")
            .subscriber_buffer(1)
            .build();
        engine.apply_at(&event, 0);
        let _subs: Vec<_> = (0..*subscribers).map(|_| engine.subscribe()).collect();

        group.bench_with_input(
            BenchmarkId::from_parameter(subscribers),
            subscribers,
            |b, _| {
                b.iter(|| black_box(engine.apply_at(&event, 1)));
            },
        );
    }
    group.finish();
}

/// Benchmark re-applying the same traceroute
fn bench_retrace(c: &mut Criterion) {
    let engine = Engine::builder().local_identity("192.168.1.10").build();
    let event = decode_line(&traceroute_line(12)).unwrap();
    engine.apply_at(&event, 0);

    c.bench_function("retrace_12_hops", |b| {
        b.iter(|| black_box(engine.apply_at(&event, 1)))
    });
}

criterion_group!(
    benches,
    bench_decode,
    bench_apply_known_hosts,
    bench_apply_with_subscribers,
    bench_retrace
);
criterion_main!(benches);
