use std::collections::BTreeMap;
use std::error::Error;
use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};
use log::{debug, info};

use mzkit::chemistry::{ElementalFormula, FragmentType, IsotopeDistribution, PeptideSequence};
use mzkit::io::mzml::{read_mzml, write_mzml_with_compression};
use mzkit::params::ParamValue;
use mzkit::peak_picking::{PeakPicker, PeakPickerParams};
use mzkit::spectrum::{BinaryCompressionType, SpectrumLike};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Summarize the spectra in an mzML file
    Info {
        path: PathBuf,
        /// List every spectrum
        #[arg(short, long)]
        verbose: bool,
    },
    /// Centroid the profile spectra of an mzML file
    Pick {
        input: PathBuf,
        output: PathBuf,
        /// Only pick spectra of this MS level, may be repeated
        #[arg(long = "ms-level")]
        ms_levels: Vec<u8>,
        #[arg(long)]
        signal_to_noise: Option<f64>,
        /// Set a picker option by name, e.g. `--param SignalToNoise:win_len=100`
        #[arg(short, long = "param", value_parser = parse_key_value)]
        params: Vec<(String, String)>,
        /// Write the binary arrays without zlib compression
        #[arg(long)]
        uncompressed: bool,
    },
    /// Compute the formula, masses and m/z of a peptide
    Mass {
        sequence: String,
        #[arg(short, long, default_value = "full")]
        fragment: FragmentType,
        #[arg(short, long, default_value_t = 0, allow_negative_numbers = true)]
        charge: i32,
    },
    /// Compute the isotope distribution of a formula or a peptide
    Isotopes {
        /// An elemental formula, or a peptide with `--sequence`
        query: String,
        #[arg(short, default_value_t = 5)]
        n: usize,
        #[arg(short, long)]
        sequence: bool,
    },
}

fn parse_key_value(text: &str) -> Result<(String, String), String> {
    text.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .ok_or_else(|| format!("expected name=value, got {text:?}"))
}

fn info(path: PathBuf, verbose: bool) -> Result<(), Box<dyn Error>> {
    let collection = read_mzml(&path)?;
    println!("{}: {} spectra", path.display(), collection.len());
    let mut levels: BTreeMap<u8, usize> = BTreeMap::new();
    for spectrum in collection.iter() {
        *levels.entry(spectrum.ms_level()).or_default() += 1;
    }
    for (level, count) in levels {
        println!("MS{level}: {count}");
    }
    if verbose {
        for spectrum in collection.iter() {
            let base_peak = spectrum.peaks().base_peak();
            println!(
                "{}\tMS{}\t{:?}\t{} points\tbase peak {:.4} ({:.1})",
                spectrum.id(),
                spectrum.ms_level(),
                spectrum.signal_continuity(),
                spectrum.len(),
                base_peak.mz,
                base_peak.intensity
            );
        }
    }
    Ok(())
}

fn pick(
    input: PathBuf,
    output: PathBuf,
    ms_levels: Vec<u8>,
    signal_to_noise: Option<f64>,
    params: Vec<(String, String)>,
    uncompressed: bool,
) -> Result<(), Box<dyn Error>> {
    let mut config = PeakPickerParams::from_pairs(
        params
            .into_iter()
            .map(|(name, value)| (name, ParamValue::parse(&value))),
    )?;
    if !ms_levels.is_empty() {
        config.ms_levels = ms_levels;
    }
    if let Some(signal_to_noise) = signal_to_noise {
        config.signal_to_noise = signal_to_noise;
    }
    let picker = PeakPicker::new(config)?;
    for (name, value) in picker.params().parameters() {
        debug!("{name} = {value}");
    }

    let start = Instant::now();
    let mut collection = read_mzml(&input)?;
    info!("Read {} spectra from {}", collection.len(), input.display());
    picker.pick_collection_in_place(&mut collection)?;
    info!("Picked peaks in {:0.3}s", start.elapsed().as_secs_f64());

    let compression = if uncompressed {
        BinaryCompressionType::NoCompression
    } else {
        BinaryCompressionType::Zlib
    };
    write_mzml_with_compression(&output, &collection, compression)?;
    info!("Wrote {}", output.display());
    Ok(())
}

fn mass(sequence: &str, fragment: FragmentType, charge: i32) -> Result<(), Box<dyn Error>> {
    let peptide: PeptideSequence = sequence.parse()?;
    let formula = peptide.formula(fragment, charge);
    println!("Sequence: {peptide}");
    println!("Fragment: {fragment}");
    println!("Formula: {formula}");
    println!("Monoisotopic mass: {:.6}", formula.monoisotopic_mass());
    println!("Average mass: {:.6}", formula.average_mass());
    if charge != 0 {
        println!("m/z: {:.6}", formula.mz());
    }
    Ok(())
}

fn isotopes(query: &str, n: usize, sequence: bool) -> Result<(), Box<dyn Error>> {
    let formula: ElementalFormula = if sequence {
        query
            .parse::<PeptideSequence>()?
            .formula(FragmentType::Full, 0)
    } else {
        query.parse()?
    };
    let distribution = IsotopeDistribution::from_formula(&formula, n);
    println!("Formula: {formula}");
    for (mass, probability) in distribution.iter() {
        println!("{mass}\t{probability:.6}");
    }
    println!("Total: {:.6}", distribution.total_probability());
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    match args.command {
        Commands::Info { path, verbose } => info(path, verbose),
        Commands::Pick {
            input,
            output,
            ms_levels,
            signal_to_noise,
            params,
            uncompressed,
        } => pick(
            input,
            output,
            ms_levels,
            signal_to_noise,
            params,
            uncompressed,
        ),
        Commands::Mass {
            sequence,
            fragment,
            charge,
        } => mass(&sequence, fragment, charge),
        Commands::Isotopes { query, n, sequence } => isotopes(&query, n, sequence),
    }
}
