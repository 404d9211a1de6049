use criterion::{criterion_group, criterion_main};


criterion_group!(
    benches,
    mqtt::bench_encode_publish,
    mqtt::bench_decode_stream,
    mqtt::bench_dispatch,
    datagram::bench_apply
);
criterion_main!(benches);
