use chaff_crypto::{generate_decoys, generate_symmetric_key, Opener, Sealer};

fn make_data(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| (i.wrapping_mul(7) ^ (i >> 3)) as u8)
        .collect()
}

#[divan::bench(args = [1024, 8192])]
fn bench_seal_entry(bencher: divan::Bencher, size: usize) {
    let key = generate_symmetric_key();
    let mut sealer = Sealer::new(&key);
    let data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench_local(|| sealer.seal(divan::black_box(&data)).unwrap());
}

#[divan::bench(args = [1024, 8192])]
fn bench_open_entry(bencher: divan::Bencher, size: usize) {
    let key = generate_symmetric_key();
    let entry = Sealer::new(&key).seal(&make_data(size)).unwrap();
    let opener = Opener::new(&key);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| {
            opener
                .open(
                    &entry.address,
                    &entry.nonce,
                    divan::black_box(&entry.ciphertext),
                )
                .unwrap()
        });
}

#[divan::bench(args = [16, 128])]
fn bench_seal_all(bencher: divan::Bencher, entries: usize) {
    let key = generate_symmetric_key();
    let payloads: Vec<Vec<u8>> = (0..entries).map(|_| make_data(8192)).collect();
    bencher
        .counter(divan::counter::BytesCount::new(entries * 8192))
        .bench_local(|| Sealer::new(&key).seal_all(divan::black_box(&payloads)).unwrap());
}

#[divan::bench]
fn bench_generate_decoys(bencher: divan::Bencher) {
    let key = generate_symmetric_key();
    bencher.bench_local(|| {
        let mut sealer = Sealer::new(&key);
        generate_decoys(&mut sealer, 8, 3).unwrap()
    });
}

fn main() {
    divan::main();
}
