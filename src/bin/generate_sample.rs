//! Writes a synthetic concentration series in the instrument formats: one
//! spectrometer `.txt` table and one power meter `.csv` export per sample.
//!
//! Usage: `generate_sample [output_dir]` (defaults to `sample_data`).

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::info;
use raman_lod::data::loader::{shift_to_wavelength, POWER_HEADER_LINES};
use raman_lod::IngestOptions;

const N_PIXELS: usize = 1024;
const N_REPEATS: usize = 5;
const CONCENTRATIONS: [f64; 6] = [0.0, 0.5, 1.0, 2.0, 5.0, 10.0];

fn gaussian(x: f64, mu: f64, sigma: f64, amplitude: f64) -> f64 {
    amplitude * (-(x - mu).powi(2) / (2.0 * sigma.powi(2))).exp()
}

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

/// Uncalibrated wavelength axis covering roughly 300–1800 cm⁻¹.
fn raw_wavelengths(excitation: f64) -> Vec<f64> {
    let lo = shift_to_wavelength(excitation, 300.0);
    let hi = shift_to_wavelength(excitation, 1800.0);
    (0..N_PIXELS)
        .map(|i| lo + (hi - lo) * i as f64 / (N_PIXELS - 1) as f64)
        .collect()
}

/// One repeat: fluorescence background, a solvent band, the analyte line at
/// the instrument's (uncalibrated) position, shot noise and the odd cosmic ray.
fn trace(
    wavelengths: &[f64],
    analyte_wl: f64,
    concentration: f64,
    laser_power: f64,
    rng: &mut SimpleRng,
) -> Vec<f64> {
    let mid = wavelengths[N_PIXELS / 2];
    let mut values: Vec<f64> = wavelengths
        .iter()
        .map(|&wl| {
            let u = (wl - mid) / 60.0;
            let background = 900.0 - 250.0 * u + 120.0 * u * u;
            let solvent = gaussian(wl, mid - 25.0, 1.2, 300.0);
            let analyte = gaussian(wl, analyte_wl, 0.6, 80.0 * concentration);
            let signal = (background + solvent + analyte) * laser_power;
            signal + rng.gauss(0.0, signal.max(1.0).sqrt())
        })
        .collect();
    if rng.next_f64() < 0.4 {
        let hit = (rng.next_u64() % N_PIXELS as u64) as usize;
        values[hit] += 5000.0;
    }
    values
}

fn spectrometer_text(wavelengths: &[f64], traces: &[Vec<f64>]) -> String {
    let mut text = String::new();
    let row = |text: &mut String, lead: &str, values: &mut dyn Iterator<Item = String>| {
        text.push_str(lead);
        for v in values {
            text.push('\t');
            text.push_str(&v);
        }
        text.push('\n');
    };
    row(&mut text, "Pixel\t", &mut (0..wavelengths.len()).map(|i| i.to_string()));
    row(&mut text, "Wavelength\tnm", &mut wavelengths.iter().map(|w| format!("{w:.4}")));
    row(&mut text, "Raman Shift\tcm-1", &mut std::iter::empty::<String>());
    for (i, t) in traces.iter().enumerate() {
        let lead = format!("{}\t0", i + 1);
        row(&mut text, &lead, &mut t.iter().map(|v| format!("{v:.2}")));
    }
    text
}

fn power_csv(excitation: f64, samples: &[f64]) -> Result<String> {
    let mut header = String::new();
    for i in 0..POWER_HEADER_LINES {
        match i {
            0 => writeln!(header, "Power Meter Export,synthetic")?,
            4 => writeln!(header, "Start Time,07/01/2022 10:00:00")?,
            5 => writeln!(header, "Sampling Interval,1 s")?,
            11 => writeln!(header, "Wavelength,{excitation} nm")?,
            _ => writeln!(header, "Field {i},")?,
        }
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["Samples", "Date (MM/dd/yyyy)", "Time of day (hh:mm:ss)", "Power (W)"])?;
    for (i, p) in samples.iter().enumerate() {
        writer.write_record([
            i.to_string(),
            "07/01/2022".to_string(),
            format!("10:{:02}:{:02}", i / 60, i % 60),
            format!("{p:.6e}"),
        ])?;
    }
    let table = String::from_utf8(writer.into_inner()?)?;
    Ok(header + &table)
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("writing {}", path.display()))
}

fn main() -> Result<()> {
    env_logger::init();

    let out_dir = PathBuf::from(std::env::args().nth(1).unwrap_or_else(|| "sample_data".into()));
    fs::create_dir_all(&out_dir)
        .with_context(|| format!("creating output directory {}", out_dir.display()))?;

    let options = IngestOptions::default();
    let excitation = options.excitation_wavelength;
    let wavelengths = raw_wavelengths(excitation);
    let analyte_wl = shift_to_wavelength(excitation, options.measured_raman_shift);

    let mut rng = SimpleRng::new(42);
    for (n, &concentration) in CONCENTRATIONS.iter().enumerate() {
        let n_samples = N_REPEATS * options.acquisition_time + 5;
        let power: Vec<f64> = (0..n_samples)
            .map(|_| 0.045 + rng.gauss(0.0, 0.002))
            .collect();

        let traces: Vec<Vec<f64>> = (0..N_REPEATS)
            .map(|r| {
                let window = &power[r * options.acquisition_time..(r + 1) * options.acquisition_time];
                let mean = window.iter().sum::<f64>() / window.len() as f64;
                trace(&wavelengths, analyte_wl, concentration, mean / 0.045, &mut rng)
            })
            .collect();

        let stem = format!("sample_{n:02}_{concentration}ppm");
        write_file(&out_dir.join(format!("{stem}.txt")), &spectrometer_text(&wavelengths, &traces))?;
        write_file(&out_dir.join(format!("{stem}.csv")), &power_csv(excitation, &power)?)?;
        info!("wrote {stem} ({N_REPEATS} repeats, {n_samples} power samples)");
    }

    println!(
        "Wrote {} measurements ({N_PIXELS} pixels, {N_REPEATS} repeats each) to {}",
        CONCENTRATIONS.len(),
        out_dir.display()
    );
    Ok(())
}
