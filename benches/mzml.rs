use criterion::{black_box, criterion_group, criterion_main, Criterion};

use mzkit::io::mzml::{read_mzml, MzMLReader};

fn read_all(file_path: &str) {
    let collection = read_mzml(file_path).unwrap();
    assert_eq!(collection.len(), 4);
}

fn streaming(file_path: &str) {
    let reader = MzMLReader::open_path(file_path).unwrap();
    let total: usize = reader.map(|s| s.mzs().unwrap().len()).sum();
    assert!(total > 0);
}

fn mzml_reading(c: &mut Criterion) {
    c.bench_function("read_all", |b| {
        b.iter(|| read_all(black_box("./test/data/small.mzML")))
    });
    c.bench_function("streaming", |b| {
        b.iter(|| streaming(black_box("./test/data/small.mzML")))
    });
}

criterion_group!(benches, mzml_reading);
criterion_main!(benches);
