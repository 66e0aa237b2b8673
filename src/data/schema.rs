//! Versioned serialized form of [`SpectrumRecord`].
//!
//! The presentation layer keeps cohorts in session state as JSON and hands
//! them back unchanged. The document layout is fixed per [`SCHEMA_VERSION`]
//! and decoupled from the in-memory record.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::model::{MetadataValue, SpectrumMetadata, SpectrumRecord};
use crate::error::{Error, Result};

pub const SCHEMA_VERSION: u32 = 1;

/// Serialized record, schema version 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordDocument {
    pub version: u32,
    pub traces: Vec<Vec<f64>>,
    pub wavelength_axis: Vec<f64>,
    pub raman_shift_axis: Vec<f64>,
    pub avg_power: Option<Vec<f64>>,
    pub reference: Vec<f64>,
    pub noise: Vec<f64>,
    pub metadata: MetadataDocument,
    pub processing_log: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataDocument {
    pub filename: String,
    pub label: String,
    pub excitation_wavelength: f64,
    pub acquisition_time_seconds: usize,
    pub sampling_interval: String,
    pub start_time: String,
    pub concentration: MetadataValue,
    pub target_raman_shift: f64,
    pub measured_raman_shift: f64,
    pub power_buffer_offset: usize,
}

#[derive(Deserialize)]
struct VersionProbe {
    version: u32,
}

impl From<&SpectrumMetadata> for MetadataDocument {
    fn from(m: &SpectrumMetadata) -> Self {
        MetadataDocument {
            filename: m.filename.clone(),
            label: m.label.clone(),
            excitation_wavelength: m.excitation_wavelength,
            acquisition_time_seconds: m.acquisition_time,
            sampling_interval: m.sampling_interval.clone(),
            start_time: m.start_time.clone(),
            concentration: m.concentration.clone(),
            target_raman_shift: m.target_raman_shift,
            measured_raman_shift: m.measured_raman_shift,
            power_buffer_offset: m.power_buffer_offset,
        }
    }
}

impl From<MetadataDocument> for SpectrumMetadata {
    fn from(m: MetadataDocument) -> Self {
        SpectrumMetadata {
            filename: m.filename,
            label: m.label,
            excitation_wavelength: m.excitation_wavelength,
            acquisition_time: m.acquisition_time_seconds,
            sampling_interval: m.sampling_interval,
            start_time: m.start_time,
            concentration: m.concentration,
            target_raman_shift: m.target_raman_shift,
            measured_raman_shift: m.measured_raman_shift,
            power_buffer_offset: m.power_buffer_offset,
        }
    }
}

impl From<&SpectrumRecord> for RecordDocument {
    fn from(r: &SpectrumRecord) -> Self {
        RecordDocument {
            version: SCHEMA_VERSION,
            traces: r.traces().to_vec(),
            wavelength_axis: r.wavelength().to_vec(),
            raman_shift_axis: r.raman_shift().to_vec(),
            avg_power: r.avg_power().map(<[f64]>::to_vec),
            reference: r.reference().to_vec(),
            noise: r.noise().to_vec(),
            metadata: MetadataDocument::from(&r.metadata),
            processing_log: r.log_entries().to_vec(),
        }
    }
}

impl TryFrom<RecordDocument> for SpectrumRecord {
    type Error = Error;

    fn try_from(doc: RecordDocument) -> Result<Self> {
        if doc.version != SCHEMA_VERSION {
            return Err(Error::SchemaVersion {
                found: doc.version,
                expected: SCHEMA_VERSION,
            });
        }
        let record = SpectrumRecord::new(
            doc.traces,
            doc.wavelength_axis,
            doc.raman_shift_axis,
            doc.avg_power,
            doc.metadata.into(),
        )?;
        SpectrumRecord::from_parts(record, doc.reference, doc.noise, doc.processing_log)
    }
}

/// Serialize a cohort as a JSON array of record documents.
pub fn to_json(records: &[SpectrumRecord]) -> Result<String> {
    let docs: Vec<RecordDocument> = records.iter().map(RecordDocument::from).collect();
    Ok(serde_json::to_string(&docs)?)
}

/// Parse a JSON array produced by [`to_json`].
///
/// The version of each document is checked before its body is decoded so
/// that documents from another schema report a version error.
pub fn from_json(text: &str) -> Result<Vec<SpectrumRecord>> {
    let values: Vec<JsonValue> = serde_json::from_str(text)?;
    values
        .into_iter()
        .map(|value| {
            let probe = VersionProbe::deserialize(&value)?;
            if probe.version != SCHEMA_VERSION {
                return Err(Error::SchemaVersion {
                    found: probe.version,
                    expected: SCHEMA_VERSION,
                });
            }
            let doc: RecordDocument = serde_json::from_value(value)?;
            SpectrumRecord::try_from(doc)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::data::model::tests::record;

    #[test]
    fn detached_reference_survives_round_trip() {
        let r = record(vec![vec![0.1, 0.2, 0.3], vec![0.3, 0.1, 0.7]]);
        let detached = r
            .with_reduced(vec![1.0 / 3.0, -2.5, 1e-17], vec![0.0, 0.5, 0.25])
            .unwrap();
        let back = from_json(&to_json(&[detached.clone()]).unwrap()).unwrap();
        assert_eq!(back, vec![detached]);
    }

    #[test]
    fn string_concentration_keeps_its_type() {
        let mut r = record(vec![vec![1.0]]);
        r.metadata.concentration = MetadataValue::String("2.5 ppm".into());
        let back = from_json(&to_json(&[r.clone()]).unwrap()).unwrap();
        assert_eq!(back[0].metadata.concentration, r.metadata.concentration);
    }

    #[test]
    fn other_versions_are_rejected() {
        let json = r#"[{"version": 2, "somethingNew": true}]"#;
        assert!(matches!(
            from_json(json),
            Err(Error::SchemaVersion { found: 2, expected: 1 })
        ));
    }

    #[test]
    fn inconsistent_lengths_are_rejected() {
        let r = record(vec![vec![1.0, 2.0]]);
        let mut doc = RecordDocument::from(&r);
        doc.noise.pop();
        assert!(matches!(SpectrumRecord::try_from(doc), Err(Error::Shape(_))));
    }
}
