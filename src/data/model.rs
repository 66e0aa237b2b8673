use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// MetadataValue – a user-editable metadata cell
// ---------------------------------------------------------------------------

/// A dynamically-typed metadata value as it arrives from an editable table.
///
/// Concentrations are typed by the user, so they may be numbers, numeric
/// text (`"2.5"`), arbitrary text or empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Integer(i64),
    Float(f64),
    String(String),
    Null,
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::String(s) => write!(f, "{s}"),
            MetadataValue::Integer(i) => write!(f, "{i}"),
            MetadataValue::Float(v) => write!(f, "{v}"),
            MetadataValue::Null => write!(f, "<null>"),
        }
    }
}

impl From<f64> for MetadataValue {
    fn from(v: f64) -> Self {
        MetadataValue::Float(v)
    }
}

impl From<i64> for MetadataValue {
    fn from(v: i64) -> Self {
        MetadataValue::Integer(v)
    }
}

impl From<&str> for MetadataValue {
    fn from(v: &str) -> Self {
        MetadataValue::String(v.to_string())
    }
}

impl MetadataValue {
    /// Interpret the value as an `f64`. Text is accepted when it parses as a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Float(v) => Some(*v),
            MetadataValue::Integer(i) => Some(*i as f64),
            MetadataValue::String(s) => s.trim().parse::<f64>().ok(),
            MetadataValue::Null => None,
        }
    }

    /// Interpret the value as a non-negative whole number.
    pub fn as_usize(&self) -> Option<usize> {
        match self {
            MetadataValue::Integer(i) => usize::try_from(*i).ok(),
            MetadataValue::Float(v) if v.fract() == 0.0 && *v >= 0.0 => Some(*v as usize),
            MetadataValue::String(s) => s.trim().parse::<usize>().ok(),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// SpectrumMetadata – acquisition and calibration parameters
// ---------------------------------------------------------------------------

/// Per-record metadata. Populated with defaults at ingestion and editable
/// afterwards by the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumMetadata {
    pub filename: String,
    pub label: String,
    /// Laser excitation wavelength in nm.
    pub excitation_wavelength: f64,
    /// Seconds per acquisition repeat; also the number of power samples per repeat.
    pub acquisition_time: usize,
    /// Power meter sampling interval, verbatim from the file header.
    pub sampling_interval: String,
    /// Measurement start time, verbatim from the file header.
    pub start_time: String,
    pub concentration: MetadataValue,
    /// Known Raman shift (cm⁻¹) of the calibration line.
    pub target_raman_shift: f64,
    /// Raman shift (cm⁻¹) at which the calibration line was observed.
    pub measured_raman_shift: f64,
    /// Index of the first power sample belonging to the first repeat.
    pub power_buffer_offset: usize,
}

impl SpectrumMetadata {
    /// Set a metadata field by its external key.
    pub fn edit(&mut self, key: &str, value: MetadataValue) -> Result<()> {
        let number = |value: &MetadataValue| {
            value.as_f64().ok_or_else(|| {
                Error::InvalidParameter(format!("{key} must be numeric, got {value}"))
            })
        };
        let count = |value: &MetadataValue| {
            value.as_usize().ok_or_else(|| {
                Error::InvalidParameter(format!("{key} must be a whole number, got {value}"))
            })
        };

        match key {
            "filename" => self.filename = value.to_string(),
            "label" => self.label = value.to_string(),
            "excitationWavelength" => self.excitation_wavelength = number(&value)?,
            "acquisitionTimeSeconds" => self.acquisition_time = count(&value)?,
            "samplingInterval" => self.sampling_interval = value.to_string(),
            "startTime" => self.start_time = value.to_string(),
            "concentration" => self.concentration = value,
            "targetRamanShift" => self.target_raman_shift = number(&value)?,
            "measuredRamanShift" => self.measured_raman_shift = number(&value)?,
            "powerBufferOffset" => self.power_buffer_offset = count(&value)?,
            other => {
                return Err(Error::InvalidParameter(format!(
                    "unknown metadata key '{other}'"
                )))
            }
        }
        Ok(())
    }

    /// Header lines written at the top of every processing log.
    fn log_header(&self) -> Vec<String> {
        vec![
            format!("**Spectrum for {} ({})**", self.filename, self.label),
            format!("Measurement Date: {}", self.start_time),
            format!("Excitation Wavelength: {} nm", self.excitation_wavelength),
            format!("Acquisition Time: {} s", self.acquisition_time),
            format!("Sampling Interval: {}", self.sampling_interval),
        ]
    }
}

// ---------------------------------------------------------------------------
// MetadataRow – one row of the editable metadata table
// ---------------------------------------------------------------------------

/// The table row the presentation layer shows and edits for each record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRow {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Nspec", default)]
    pub n_spectra: usize,
    #[serde(rename = "Time(s)")]
    pub acquisition_time: MetadataValue,
    #[serde(rename = "Label")]
    pub label: String,
    #[serde(rename = "Concentration")]
    pub concentration: MetadataValue,
}

// ---------------------------------------------------------------------------
// SpectrumRecord – repeats of one sample plus their mean and spread
// ---------------------------------------------------------------------------

/// One sample: every acquisition repeat on a shared, calibrated spectral axis.
///
/// Invariant: `wavelength`, `raman_shift`, `reference`, `noise` and every
/// trace share one length, and `avg_power` (when present) has one entry per
/// trace. Constructors enforce it; stages produce new records through
/// [`SpectrumRecord::with_traces`], which recomputes `reference`/`noise`.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumRecord {
    traces: Vec<Vec<f64>>,
    wavelength: Vec<f64>,
    raman_shift: Vec<f64>,
    avg_power: Option<Vec<f64>>,
    reference: Vec<f64>,
    noise: Vec<f64>,
    pub metadata: SpectrumMetadata,
    log: Vec<String>,
}

impl SpectrumRecord {
    /// Build a record from raw traces, computing reference and noise and
    /// starting a fresh processing log.
    pub fn new(
        traces: Vec<Vec<f64>>,
        wavelength: Vec<f64>,
        raman_shift: Vec<f64>,
        avg_power: Option<Vec<f64>>,
        metadata: SpectrumMetadata,
    ) -> Result<Self> {
        check_axes(&wavelength, &raman_shift)?;
        check_traces(&traces, wavelength.len())?;
        if let Some(power) = &avg_power {
            if power.len() != traces.len() {
                return Err(Error::Shape(format!(
                    "{} power averages for {} traces",
                    power.len(),
                    traces.len()
                )));
            }
        }

        let (reference, noise) = mean_and_std(&traces);
        let mut record = SpectrumRecord {
            traces,
            wavelength,
            raman_shift,
            avg_power,
            reference,
            noise,
            metadata,
            log: Vec::new(),
        };
        record.init_log();
        Ok(record)
    }

    /// Reassemble a record whose reduced vectors were stored separately.
    ///
    /// `reference`/`noise` are taken as given since derived operations
    /// (subtraction, rescaling) leave them detached from the traces.
    pub(crate) fn from_parts(
        mut record: SpectrumRecord,
        reference: Vec<f64>,
        noise: Vec<f64>,
        log: Vec<String>,
    ) -> Result<Self> {
        check_reduced(&reference, &noise, record.n_bins())?;
        record.reference = reference;
        record.noise = noise;
        record.log = log;
        Ok(record)
    }

    /// A copy of this record with `traces` replaced and reference/noise recomputed.
    pub fn with_traces(&self, traces: Vec<Vec<f64>>) -> Result<Self> {
        check_traces(&traces, self.n_bins())?;
        if traces.len() != self.traces.len() {
            return Err(Error::Shape(format!(
                "stage produced {} traces from {}",
                traces.len(),
                self.traces.len()
            )));
        }
        let (reference, noise) = mean_and_std(&traces);
        Ok(SpectrumRecord {
            traces,
            reference,
            noise,
            ..self.clone()
        })
    }

    /// A copy of this record with reference/noise replaced; traces untouched.
    pub(crate) fn with_reduced(&self, reference: Vec<f64>, noise: Vec<f64>) -> Result<Self> {
        check_reduced(&reference, &noise, self.n_bins())?;
        Ok(SpectrumRecord {
            reference,
            noise,
            ..self.clone()
        })
    }

    pub fn traces(&self) -> &[Vec<f64>] {
        &self.traces
    }

    pub fn wavelength(&self) -> &[f64] {
        &self.wavelength
    }

    pub fn raman_shift(&self) -> &[f64] {
        &self.raman_shift
    }

    pub fn avg_power(&self) -> Option<&[f64]> {
        self.avg_power.as_deref()
    }

    pub fn reference(&self) -> &[f64] {
        &self.reference
    }

    pub fn noise(&self) -> &[f64] {
        &self.noise
    }

    /// Number of acquisition repeats.
    pub fn n_traces(&self) -> usize {
        self.traces.len()
    }

    /// Number of spectral bins.
    pub fn n_bins(&self) -> usize {
        self.wavelength.len()
    }

    /// Name used in messages: the label, or the filename when unlabeled.
    pub fn display_name(&self) -> &str {
        if self.metadata.label.is_empty() {
            &self.metadata.filename
        } else {
            &self.metadata.label
        }
    }

    /// Index of the bin whose Raman shift is closest to `shift`.
    /// Ties resolve to the lower index.
    pub fn nearest_bin(&self, shift: f64) -> Option<usize> {
        self.raman_shift
            .iter()
            .enumerate()
            .fold(None, |best: Option<(usize, f64)>, (i, &x)| {
                let d = (x - shift).abs();
                match best {
                    Some((_, bd)) if bd <= d => best,
                    _ => Some((i, d)),
                }
            })
            .map(|(i, _)| i)
    }

    /// Set a metadata field by its external key.
    pub fn edit_meta(&mut self, key: &str, value: MetadataValue) -> Result<()> {
        self.metadata.edit(key, value)
    }

    // -- processing log --

    /// Reset the processing log to its header.
    pub fn init_log(&mut self) {
        self.log = self.metadata.log_header();
    }

    pub fn push_log(&mut self, entry: impl Into<String>) {
        self.log.push(entry.into());
    }

    pub fn log_entries(&self) -> &[String] {
        &self.log
    }

    /// The processing log as a markdown block with hard line breaks.
    pub fn render_log(&self) -> String {
        let mut out = String::new();
        for entry in &self.log {
            out.push_str(entry);
            out.push_str("  \n");
        }
        out
    }

    /// The metadata table row for this record.
    pub fn table_row(&self) -> MetadataRow {
        MetadataRow {
            name: self.metadata.filename.clone(),
            n_spectra: self.n_traces(),
            acquisition_time: MetadataValue::Integer(self.metadata.acquisition_time as i64),
            label: self.metadata.label.clone(),
            concentration: self.metadata.concentration.clone(),
        }
    }
}

// -- invariant checks --

fn check_axes(wavelength: &[f64], raman_shift: &[f64]) -> Result<()> {
    if wavelength.is_empty() {
        return Err(Error::Shape("spectral axis is empty".into()));
    }
    if wavelength.len() != raman_shift.len() {
        return Err(Error::Shape(format!(
            "{} wavelengths but {} Raman shifts",
            wavelength.len(),
            raman_shift.len()
        )));
    }
    Ok(())
}

fn check_traces(traces: &[Vec<f64>], n_bins: usize) -> Result<()> {
    if traces.is_empty() {
        return Err(Error::Shape("record has no traces".into()));
    }
    if let Some((i, t)) = traces.iter().enumerate().find(|(_, t)| t.len() != n_bins) {
        return Err(Error::Shape(format!(
            "trace {i} has {} bins, axis has {n_bins}",
            t.len()
        )));
    }
    Ok(())
}

fn check_reduced(reference: &[f64], noise: &[f64], n_bins: usize) -> Result<()> {
    if reference.len() != n_bins || noise.len() != n_bins {
        return Err(Error::Shape(format!(
            "reference/noise have {}/{} bins, axis has {n_bins}",
            reference.len(),
            noise.len()
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Per-bin statistics across repeats
// ---------------------------------------------------------------------------

/// Element-wise mean and population standard deviation across `traces`.
///
/// All traces must be non-empty slices of one length.
pub fn mean_and_std(traces: &[Vec<f64>]) -> (Vec<f64>, Vec<f64>) {
    let n_bins = traces.first().map_or(0, Vec::len);
    let n = traces.len() as f64;

    let mut mean = vec![0.0; n_bins];
    for trace in traces {
        for (m, &v) in mean.iter_mut().zip(trace) {
            *m += v;
        }
    }
    mean.iter_mut().for_each(|m| *m /= n);

    let mut var = vec![0.0; n_bins];
    for trace in traces {
        for ((s, &v), &m) in var.iter_mut().zip(trace).zip(&mean) {
            *s += (v - m) * (v - m);
        }
    }
    let std = var.into_iter().map(|s| (s / n).sqrt()).collect();

    (mean, std)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    use approx::assert_relative_eq;

    pub(crate) fn metadata(name: &str) -> SpectrumMetadata {
        SpectrumMetadata {
            filename: name.to_string(),
            label: name.to_string(),
            excitation_wavelength: 830.0,
            acquisition_time: 10,
            sampling_interval: "1".into(),
            start_time: String::new(),
            concentration: MetadataValue::Integer(0),
            target_raman_shift: 1049.0,
            measured_raman_shift: 1033.0,
            power_buffer_offset: 0,
        }
    }

    /// A record on an evenly spaced Raman axis `0, 1, 2, ...`.
    pub(crate) fn record(traces: Vec<Vec<f64>>) -> SpectrumRecord {
        let n = traces[0].len();
        let axis: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let wavelength = axis.iter().map(|x| 850.0 + x).collect();
        SpectrumRecord::new(traces, wavelength, axis, None, metadata("sample")).unwrap()
    }

    #[test]
    fn reference_and_noise_follow_traces() {
        let r = record(vec![vec![1.0, 2.0, 3.0], vec![3.0, 2.0, 7.0]]);
        assert_eq!(r.reference(), &[2.0, 2.0, 5.0]);
        assert_eq!(r.noise(), &[1.0, 0.0, 2.0]);
    }

    #[test]
    fn single_repeat_has_zero_noise() {
        let r = record(vec![vec![4.0, 5.0]]);
        assert_eq!(r.reference(), &[4.0, 5.0]);
        assert_eq!(r.noise(), &[0.0, 0.0]);
    }

    #[test]
    fn with_traces_recomputes_and_keeps_identity_fields() {
        let r = record(vec![vec![1.0, 1.0], vec![3.0, 3.0]]);
        let r2 = r.with_traces(vec![vec![0.0, 2.0], vec![0.0, 4.0]]).unwrap();
        assert_eq!(r2.reference(), &[0.0, 3.0]);
        assert_relative_eq!(r2.noise()[1], 1.0);
        assert_eq!(r2.metadata, r.metadata);
        assert_eq!(r2.raman_shift(), r.raman_shift());
    }

    #[test]
    fn mismatched_trace_is_rejected() {
        let r = record(vec![vec![1.0, 1.0]]);
        assert!(matches!(
            r.with_traces(vec![vec![1.0]]),
            Err(Error::Shape(_))
        ));
    }

    #[test]
    fn power_count_must_match_traces() {
        let err = SpectrumRecord::new(
            vec![vec![1.0], vec![2.0]],
            vec![850.0],
            vec![100.0],
            Some(vec![1.0]),
            metadata("p"),
        );
        assert!(matches!(err, Err(Error::Shape(_))));
    }

    #[test]
    fn nearest_bin_prefers_lower_index_on_tie() {
        let r = record(vec![vec![0.0; 4]]);
        assert_eq!(r.nearest_bin(1.5), Some(1));
        assert_eq!(r.nearest_bin(2.9), Some(3));
        assert_eq!(r.nearest_bin(-10.0), Some(0));
    }

    #[test]
    fn edit_meta_converts_and_rejects() {
        let mut r = record(vec![vec![0.0]]);
        r.edit_meta("acquisitionTimeSeconds", "20".into()).unwrap();
        assert_eq!(r.metadata.acquisition_time, 20);
        r.edit_meta("concentration", "2.5".into()).unwrap();
        assert_eq!(r.metadata.concentration.as_f64(), Some(2.5));
        assert!(r.edit_meta("excitationWavelength", "green".into()).is_err());
        assert!(r.edit_meta("colour", "red".into()).is_err());
    }

    #[test]
    fn init_log_resets_to_header() {
        let mut r = record(vec![vec![0.0]]);
        r.push_log("- Applied something");
        assert_eq!(r.log_entries().len(), 6);
        r.metadata.label = "renamed".into();
        r.init_log();
        assert_eq!(r.log_entries().len(), 5);
        assert!(r.log_entries()[0].contains("(renamed)"));
        assert!(r.render_log().ends_with("  \n"));
    }

    #[test]
    fn metadata_value_numbers() {
        assert_eq!(MetadataValue::String(" 3 ".into()).as_f64(), Some(3.0));
        assert_eq!(MetadataValue::Null.as_f64(), None);
        assert_eq!(MetadataValue::Float(4.0).as_usize(), Some(4));
        assert_eq!(MetadataValue::Integer(-1).as_usize(), None);
    }
}
