use std::collections::BTreeMap;
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::model::{MetadataValue, SpectrumMetadata, SpectrumRecord};
use crate::error::{Error, Result};

const SPECTROMETER: &str = "spectrometer";
const POWER_METER: &str = "power meter";

/// Lines preceding the sample table in a power meter export.
pub const POWER_HEADER_LINES: usize = 14;
const START_TIME_LINE: usize = 4;
const INTERVAL_LINE: usize = 5;
const EXCITATION_LINE: usize = 11;
const POWER_COLUMN: &str = "Power (W)";

// ---------------------------------------------------------------------------
// Ingestion options
// ---------------------------------------------------------------------------

/// Metadata defaults applied before the instrument files are read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestOptions {
    pub target_raman_shift: f64,
    pub measured_raman_shift: f64,
    pub power_buffer_offset: usize,
    pub acquisition_time: usize,
    /// Used when no power stream provides the excitation wavelength.
    pub excitation_wavelength: f64,
    pub sampling_interval: String,
    pub concentration: MetadataValue,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            target_raman_shift: 1049.0,
            measured_raman_shift: 1033.0,
            power_buffer_offset: 0,
            acquisition_time: 10,
            excitation_wavelength: 830.0,
            sampling_interval: "1".into(),
            concentration: MetadataValue::Integer(0),
        }
    }
}

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Parse one measurement into a calibrated [`SpectrumRecord`].
///
/// `spectrometer` is the tab-separated trace table; `power` is the optional
/// power meter CSV export. Without it the record has no average power and
/// power normalisation is skipped later on.
pub fn ingest(
    filename: &str,
    label: &str,
    spectrometer: &str,
    power: Option<&str>,
    options: &IngestOptions,
) -> Result<SpectrumRecord> {
    let mut metadata = SpectrumMetadata {
        filename: filename.to_string(),
        label: label.to_string(),
        excitation_wavelength: options.excitation_wavelength,
        acquisition_time: options.acquisition_time,
        sampling_interval: options.sampling_interval.clone(),
        start_time: String::new(),
        concentration: options.concentration.clone(),
        target_raman_shift: options.target_raman_shift,
        measured_raman_shift: options.measured_raman_shift,
        power_buffer_offset: options.power_buffer_offset,
    };

    let power_log = match power {
        Some(text) => {
            let (header, samples) = parse_power_meter(text)?;
            metadata.start_time = header.start_time;
            metadata.sampling_interval = header.sampling_interval;
            metadata.excitation_wavelength = header.excitation_wavelength;
            Some(samples)
        }
        None => {
            warn!("{filename}: no power meter data, power normalisation will be skipped");
            None
        }
    };

    let table = parse_spectrometer(spectrometer)?;
    let calibration = Calibration::new(
        metadata.excitation_wavelength,
        metadata.target_raman_shift,
        metadata.measured_raman_shift,
    )?;
    let wavelength = calibration.calibrate(&table.wavelengths);
    let raman_shift = calibration.raman_shift(&wavelength);

    let avg_power = power_log
        .map(|samples| {
            average_power(
                &samples,
                table.traces.len(),
                metadata.power_buffer_offset,
                metadata.acquisition_time,
            )
        })
        .transpose()?;

    info!(
        "{filename}: {} traces x {} bins, calibration offset {:.4} nm",
        table.traces.len(),
        wavelength.len(),
        calibration.offset
    );

    SpectrumRecord::new(table.traces, wavelength, raman_shift, avg_power, metadata)
}

/// Ingest `<stem>.txt` and, when present, its sibling `<stem>.csv`.
///
/// The stem is taken verbatim, so dots inside it (`sample_0.5ppm`) are kept.
pub fn ingest_path(stem: impl AsRef<Path>, options: &IngestOptions) -> Result<SpectrumRecord> {
    let stem = stem.as_ref();
    let spectrometer_path = with_suffix(stem, ".txt");
    let power_path = with_suffix(stem, ".csv");

    let spectrometer = read_text(&spectrometer_path)?;
    let power = match std::fs::read_to_string(&power_path) {
        Ok(text) => Some(text),
        Err(e) if e.kind() == ErrorKind::NotFound => None,
        Err(source) => {
            return Err(Error::Io {
                path: power_path.display().to_string(),
                source,
            })
        }
    };

    let filename = stem.display().to_string();
    let label = stem
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| filename.clone());
    ingest(&filename, &label, &spectrometer, power.as_deref(), options)
}

fn with_suffix(stem: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(stem.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.display().to_string(),
        source,
    })
}

// ---------------------------------------------------------------------------
// Wavelength calibration
// ---------------------------------------------------------------------------

/// Wavelength offset that moves the measured calibration line onto its known shift.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub excitation_wavelength: f64,
    pub offset: f64,
}

impl Calibration {
    pub fn new(excitation_wavelength: f64, target_shift: f64, measured_shift: f64) -> Result<Self> {
        if !(excitation_wavelength.is_finite() && excitation_wavelength > 0.0) {
            return Err(Error::InvalidParameter(format!(
                "excitation wavelength must be positive, got {excitation_wavelength}"
            )));
        }
        let target = shift_to_wavelength(excitation_wavelength, target_shift);
        let measured = shift_to_wavelength(excitation_wavelength, measured_shift);
        Ok(Self {
            excitation_wavelength,
            offset: target - measured,
        })
    }

    /// Apply the offset to raw wavelengths (nm).
    pub fn calibrate(&self, raw: &[f64]) -> Vec<f64> {
        raw.iter().map(|w| w + self.offset).collect()
    }

    /// Raman shift (cm⁻¹) of calibrated wavelengths (nm).
    pub fn raman_shift(&self, wavelength: &[f64]) -> Vec<f64> {
        wavelength
            .iter()
            .map(|w| (1.0 / self.excitation_wavelength - 1.0 / w) * 1e7)
            .collect()
    }
}

/// Wavelength (nm) of scattered light at `shift` cm⁻¹ from `excitation` nm.
pub fn shift_to_wavelength(excitation: f64, shift: f64) -> f64 {
    1.0 / (1.0 / excitation - shift / 1e7)
}

// ---------------------------------------------------------------------------
// Spectrometer table
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct SpectrometerTable {
    wavelengths: Vec<f64>,
    traces: Vec<Vec<f64>>,
}

/// Layout: pixel indices, raw wavelengths, one ignored line, then one trace
/// per line. Every line is tab-separated with two leading columns to skip.
fn parse_spectrometer(text: &str) -> Result<SpectrometerTable> {
    let mut lines = text.lines().enumerate().map(|(i, l)| (i + 1, l));

    let (_, pixel_line) = lines
        .next()
        .ok_or_else(|| Error::format(SPECTROMETER, 1, "missing pixel index line"))?;
    let n_pixels = data_columns(pixel_line).count();

    let (wl_no, wl_line) = lines
        .next()
        .ok_or_else(|| Error::format(SPECTROMETER, 2, "missing wavelength line"))?;
    let wavelengths = parse_row(wl_line, wl_no)?;
    if wavelengths.len() != n_pixels {
        return Err(Error::format(
            SPECTROMETER,
            wl_no,
            format!("{} wavelengths for {n_pixels} pixels", wavelengths.len()),
        ));
    }
    if wavelengths.is_empty() {
        return Err(Error::format(SPECTROMETER, wl_no, "no wavelength columns"));
    }

    lines
        .next()
        .ok_or_else(|| Error::format(SPECTROMETER, 3, "missing third header line"))?;

    let mut traces = Vec::new();
    for (line_no, line) in lines {
        if line.trim().is_empty() {
            continue;
        }
        let trace = parse_row(line, line_no)?;
        if trace.len() != n_pixels {
            return Err(Error::format(
                SPECTROMETER,
                line_no,
                format!(
                    "trace {} has {} values, expected {n_pixels}",
                    traces.len() + 1,
                    trace.len()
                ),
            ));
        }
        traces.push(trace);
    }

    if traces.is_empty() {
        return Err(Error::format(SPECTROMETER, 4, "no trace lines"));
    }
    debug!("spectrometer table: {} traces, {n_pixels} pixels", traces.len());

    Ok(SpectrometerTable {
        wavelengths,
        traces,
    })
}

fn data_columns(line: &str) -> impl Iterator<Item = &str> {
    line.trim().split('\t').skip(2)
}

fn parse_row(line: &str, line_no: usize) -> Result<Vec<f64>> {
    data_columns(line)
        .enumerate()
        .map(|(j, tok)| {
            tok.trim().parse::<f64>().map_err(|_| {
                Error::format(
                    SPECTROMETER,
                    line_no,
                    format!("column {}: '{tok}' is not a number", j + 3),
                )
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Power meter export
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
struct PowerHeader {
    start_time: String,
    sampling_interval: String,
    excitation_wavelength: f64,
}

/// Split the fixed header from the sample table and read the `Power (W)` column.
fn parse_power_meter(text: &str) -> Result<(PowerHeader, Vec<f64>)> {
    let mut header_lines = Vec::with_capacity(POWER_HEADER_LINES);
    let mut rest = text;
    for i in 0..POWER_HEADER_LINES {
        let (line, tail) = match rest.split_once('\n') {
            Some((line, tail)) => (line, tail),
            None if !rest.is_empty() => (rest, ""),
            None => {
                return Err(Error::format(
                    POWER_METER,
                    i + 1,
                    format!("header ends after {i} lines, expected {POWER_HEADER_LINES}"),
                ))
            }
        };
        header_lines.push(line.trim_end_matches('\r'));
        rest = tail;
    }

    let header = PowerHeader {
        start_time: header_value(&header_lines, START_TIME_LINE)?.to_string(),
        sampling_interval: header_value(&header_lines, INTERVAL_LINE)?.to_string(),
        excitation_wavelength: {
            let value = header_value(&header_lines, EXCITATION_LINE)?;
            let token = value.split_whitespace().next().unwrap_or("");
            token.parse::<f64>().map_err(|_| {
                Error::format(
                    POWER_METER,
                    EXCITATION_LINE + 1,
                    format!("'{value}' is not a wavelength"),
                )
            })?
        },
    };

    let samples = parse_power_samples(rest)?;
    debug!("power meter: {} samples", samples.len());
    Ok((header, samples))
}

/// Second comma-separated field of a header line.
fn header_value<'a>(lines: &[&'a str], index: usize) -> Result<&'a str> {
    lines[index]
        .split(',')
        .nth(1)
        .map(str::trim)
        .ok_or_else(|| Error::format(POWER_METER, index + 1, "expected 'key,value'"))
}

fn parse_power_samples(table: &str) -> Result<Vec<f64>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(table.as_bytes());

    let table_line = |pos: Option<&csv::Position>| {
        pos.map_or(POWER_HEADER_LINES + 1, |p| POWER_HEADER_LINES + p.line() as usize)
    };

    let headers = reader
        .headers()
        .map_err(|e| Error::format(POWER_METER, POWER_HEADER_LINES + 1, e.to_string()))?
        .clone();
    let column = headers
        .iter()
        .position(|h| h == POWER_COLUMN)
        .ok_or_else(|| {
            Error::format(
                POWER_METER,
                POWER_HEADER_LINES + 1,
                format!("no '{POWER_COLUMN}' column"),
            )
        })?;

    let mut samples = Vec::new();
    for result in reader.records() {
        let record = result
            .map_err(|e| Error::format(POWER_METER, table_line(e.position()), e.to_string()))?;
        let line = table_line(record.position());
        let cell = record
            .get(column)
            .ok_or_else(|| Error::format(POWER_METER, line, format!("missing '{POWER_COLUMN}'")))?;
        let value = cell
            .parse::<f64>()
            .map_err(|_| Error::format(POWER_METER, line, format!("'{cell}' is not a power")))?;
        samples.push(value);
    }
    Ok(samples)
}

/// Mean laser power for each acquisition repeat.
///
/// Repeat `i` averages `acquisition_time` samples starting at
/// `offset + i * acquisition_time`.
pub fn average_power(
    samples: &[f64],
    n_repeats: usize,
    offset: usize,
    acquisition_time: usize,
) -> Result<Vec<f64>> {
    if acquisition_time == 0 {
        return Err(Error::InvalidParameter(
            "acquisition time must be at least one second".into(),
        ));
    }
    (0..n_repeats)
        .map(|i| {
            let (start, end) = i
                .checked_mul(acquisition_time)
                .and_then(|skip| offset.checked_add(skip))
                .and_then(|start| Some((start, start.checked_add(acquisition_time)?)))
                .ok_or_else(|| {
                    Error::InvalidParameter(format!(
                        "power window of repeat {} overflows (offset {offset}, {acquisition_time} s)",
                        i + 1
                    ))
                })?;
            let window = samples.get(start..end).ok_or_else(|| {
                Error::format(
                    POWER_METER,
                    POWER_HEADER_LINES + 2 + samples.len(),
                    format!(
                        "{} samples cannot cover repeat {} (samples {start}..{end})",
                        samples.len(),
                        i + 1
                    ),
                )
            })?;
            Ok(window.iter().sum::<f64>() / acquisition_time as f64)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Batch uploads
// ---------------------------------------------------------------------------

/// The decoded instrument files of one measurement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadPair {
    /// File stem shared by both files.
    pub stem: String,
    pub spectrometer: Option<String>,
    pub power: Option<String>,
}

impl UploadPair {
    /// Default label: the last path segment of the stem.
    pub fn label(&self) -> &str {
        self.stem.rsplit('/').next().unwrap_or(&self.stem)
    }

    pub fn ingest(&self, options: &IngestOptions) -> Result<SpectrumRecord> {
        let spectrometer = self.spectrometer.as_deref().ok_or_else(|| {
            Error::MissingData(format!("{} has a power file but no spectrometer file", self.stem))
        })?;
        ingest(
            &self.stem,
            self.label(),
            spectrometer,
            self.power.as_deref(),
            options,
        )
    }
}

/// Group uploaded `(file name, text)` pairs by stem: `.txt` files are
/// spectrometer tables, `.csv` files power meter exports.
pub fn pair_uploads<S: AsRef<str>, T: Into<String>>(
    files: impl IntoIterator<Item = (S, T)>,
) -> Result<Vec<UploadPair>> {
    let mut pairs: BTreeMap<String, UploadPair> = BTreeMap::new();
    for (name, text) in files {
        let name = name.as_ref();
        let (stem, ext) = name.rsplit_once('.').unwrap_or((name, ""));
        let pair = pairs.entry(stem.to_string()).or_insert_with(|| UploadPair {
            stem: stem.to_string(),
            ..Default::default()
        });
        match ext.to_ascii_lowercase().as_str() {
            "txt" => pair.spectrometer = Some(text.into()),
            "csv" => pair.power = Some(text.into()),
            other => {
                return Err(Error::InvalidParameter(format!(
                    "unrecognized file extension '.{other}' on {name}"
                )))
            }
        }
    }
    Ok(pairs.into_values().collect())
}
