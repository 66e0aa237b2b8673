use log::info;

use super::loader::{pair_uploads, IngestOptions};
use super::model::{MetadataRow, SpectrumRecord};
use super::schema;
use crate::analysis::lod::{estimate_lod, LodEstimate};
use crate::analysis::ops::{self, SelectedPoint};
use crate::color::generate_palette;
use crate::error::{Error, Result};
use crate::processing::pipeline::{self, PipelineConfig};

const LOG_SEPARATOR: &str = "________________________________________________________________";

// ---------------------------------------------------------------------------
// Cohort – the records analysed together
// ---------------------------------------------------------------------------

/// An ordered set of records, e.g. a concentration series.
///
/// Cohort operations return a new cohort; the receiver is left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cohort {
    records: Vec<SpectrumRecord>,
}

impl Cohort {
    pub fn new(records: Vec<SpectrumRecord>) -> Self {
        Self { records }
    }

    /// Ingest uploaded files and run the standard preprocessing on each record.
    pub fn from_uploads<S: AsRef<str>, T: Into<String>>(
        files: impl IntoIterator<Item = (S, T)>,
        options: &IngestOptions,
        config: &PipelineConfig,
    ) -> Result<Self> {
        let records = pair_uploads(files)?
            .iter()
            .map(|pair| {
                let record = pair.ingest(options)?;
                pipeline::run_standard_preprocessing(&record, config)
            })
            .collect::<Result<Vec<_>>>()?;
        info!("ingested cohort of {} records", records.len());
        Ok(Self { records })
    }

    /// Rebuild the cohort from the uploads after the metadata table was edited.
    ///
    /// Rows are matched to uploads by name; uploads whose row was deleted are
    /// dropped and rows without an upload are ignored. Label, acquisition time
    /// and concentration come from the row and apply before power averaging.
    pub fn resync<S: AsRef<str>, T: Into<String>>(
        files: impl IntoIterator<Item = (S, T)>,
        rows: &[MetadataRow],
        options: &IngestOptions,
        config: &PipelineConfig,
    ) -> Result<Self> {
        let pairs = pair_uploads(files)?;
        let mut records = Vec::with_capacity(rows.len());

        for row in rows {
            let Some(pair) = pairs.iter().find(|p| p.stem == row.name) else {
                continue;
            };
            let acquisition_time = row.acquisition_time.as_usize().ok_or_else(|| {
                Error::InvalidParameter(format!(
                    "{}: acquisition time {} is not a whole number of seconds",
                    row.name, row.acquisition_time
                ))
            })?;
            let row_options = IngestOptions {
                acquisition_time,
                concentration: row.concentration.clone(),
                ..options.clone()
            };

            let mut record = pair.ingest(&row_options)?;
            record.metadata.label = row.label.clone();
            record.init_log();
            records.push(pipeline::run_standard_preprocessing(&record, config)?);
        }
        info!("resynced cohort: {} of {} rows matched", records.len(), rows.len());
        Ok(Self { records })
    }

    pub fn records(&self) -> &[SpectrumRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<SpectrumRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Wrap a display counter (which may run negative) onto a record index.
    pub fn display_index(&self, counter: i64) -> Option<usize> {
        if self.records.is_empty() {
            return None;
        }
        let n = self.records.len() as i64;
        Some(counter.rem_euclid(n) as usize)
    }

    fn selected(&self, counter: i64) -> Result<(usize, &SpectrumRecord)> {
        let index = self
            .display_index(counter)
            .ok_or_else(|| Error::MissingData("cohort is empty".into()))?;
        Ok((index, &self.records[index]))
    }

    // -- cohort-wide operations --

    /// Subtract the displayed record from every other record.
    pub fn subtract_reference(&self, counter: i64) -> Result<Self> {
        let (index, reference) = self.selected(counter)?;
        let records = self
            .records
            .iter()
            .enumerate()
            .map(|(i, r)| {
                if i == index {
                    Ok(r.clone())
                } else {
                    ops::subtract(r, reference)
                }
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { records })
    }

    /// Rescale every record so that its value at the displayed record's local
    /// maximum near `point` becomes 1.
    pub fn normalize_to_peak(&self, counter: i64, point: SelectedPoint, radius: usize) -> Result<Self> {
        let (_, target) = self.selected(counter)?;
        let (peak, index) = ops::find_local_max(target, point, radius)?;
        let records = self
            .records
            .iter()
            .map(|r| {
                let value = r.reference().get(index).copied().ok_or_else(|| {
                    Error::Shape(format!("{} has no bin {index}", r.display_name()))
                })?;
                ops::rescale(r, peak, peak.value / value)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { records })
    }

    /// Baseline removal on every record with the parameters in `config`.
    pub fn remove_baselines(&self, config: &PipelineConfig) -> Result<Self> {
        let params = config.baseline_params();
        let records = self
            .records
            .iter()
            .map(|r| pipeline::remove_baseline(r, &params, config.baseline_cutoff_wavelength))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { records })
    }

    pub fn estimate_lod(&self, point: SelectedPoint) -> Result<LodEstimate> {
        estimate_lod(&self.records, point)
    }

    // -- presentation helpers --

    /// Rows for the editable metadata table.
    pub fn table(&self) -> Vec<MetadataRow> {
        self.records.iter().map(SpectrumRecord::table_row).collect()
    }

    /// One colour per record, by index.
    pub fn colors(&self) -> Vec<String> {
        generate_palette(self.records.len())
    }

    /// Every record's processing log, separated by rules.
    pub fn combined_log(&self) -> String {
        self.records
            .iter()
            .map(|r| format!("{}\n{LOG_SEPARATOR}", r.render_log()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// The combined log followed by an LOD summary.
    pub fn lod_report(&self, estimate: &LodEstimate) -> String {
        let mut report = self.combined_log();
        report.push('\n');
        for line in estimate.summary() {
            report.push_str(&line);
            report.push_str("  \n");
        }
        report.push('\n');
        report.push_str(LOG_SEPARATOR);
        report
    }

    pub fn to_json(&self) -> Result<String> {
        schema::to_json(&self.records)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(Self {
            records: schema::from_json(text)?,
        })
    }
}
