use criterion::{black_box, criterion_group, criterion_main, Criterion};

use mzkit::chemistry::{FragmentType, PeptideSequence};
use mzkit::io::mzml::read_mzml;
use mzkit::peak_picking::{PeakPicker, PeakPickerParams};

fn picking(c: &mut Criterion) {
    let collection = read_mzml("./test/data/small.mzML").unwrap();
    let profile = collection.get(0).unwrap().clone();
    let picker = PeakPicker::new(PeakPickerParams::default()).unwrap();
    let mut noisy = PeakPickerParams::default();
    noisy.signal_to_noise = 1.0;
    let noisy = PeakPicker::new(noisy).unwrap();

    c.bench_function("pick_spectrum", |b| {
        b.iter(|| picker.pick(black_box(&profile)).unwrap())
    });
    c.bench_function("pick_spectrum_signal_to_noise", |b| {
        b.iter(|| noisy.pick(black_box(&profile)).unwrap())
    });
    c.bench_function("pick_collection", |b| {
        b.iter(|| picker.pick_collection(black_box(&collection)).unwrap())
    });
}

fn isotopes(c: &mut Criterion) {
    let peptide: PeptideSequence = "DFPIAM(Oxidation)GERPEPTIDEK".parse().unwrap();
    let formula = peptide.formula(FragmentType::Full, 0);
    c.bench_function("isotope_distribution", |b| {
        b.iter(|| black_box(&formula).isotope_distribution(10))
    });
}

criterion_group!(benches, picking, isotopes);
criterion_main!(benches);
