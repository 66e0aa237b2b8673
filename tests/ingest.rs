mod common;

use approx::assert_relative_eq;
use proptest::prelude::*;

use common::{power_text, spectrometer_text};
use raman_lod::data::loader::shift_to_wavelength;
use raman_lod::{ingest, pair_uploads, Error, IngestOptions};

fn axis(n: usize) -> Vec<f64> {
    (0..n).map(|i| 860.0 + i as f64 * 0.25).collect()
}

#[test]
fn calibration_moves_measured_line_onto_target() {
    let options = IngestOptions::default();
    let measured = shift_to_wavelength(830.0, options.measured_raman_shift);
    let wavelengths = vec![measured - 1.0, measured, measured + 1.0];
    let text = spectrometer_text(&[vec![1.0, 2.0, 3.0]], &wavelengths);

    let record = ingest("cal", "cal", &text, None, &options).unwrap();
    assert_relative_eq!(
        record.raman_shift()[1],
        options.target_raman_shift,
        epsilon = 1e-6
    );
    // a constant offset in wavelength
    let offset = record.wavelength()[0] - wavelengths[0];
    assert_relative_eq!(record.wavelength()[2] - wavelengths[2], offset, epsilon = 1e-9);
    assert!(record.avg_power().is_none());
}

#[test]
fn power_is_averaged_per_repeat_from_buffer_offset() {
    let traces = vec![vec![1.0; 4], vec![2.0; 4]];
    let samples: Vec<f64> = (0..12).map(|i| i as f64).collect();
    let options = IngestOptions {
        power_buffer_offset: 2,
        acquisition_time: 3,
        ..IngestOptions::default()
    };
    let record = ingest(
        "p",
        "p",
        &spectrometer_text(&traces, &axis(4)),
        Some(&power_text(&samples, 785.0)),
        &options,
    )
    .unwrap();

    assert_eq!(record.avg_power().unwrap(), &[3.0, 6.0]);
    assert_eq!(record.metadata.excitation_wavelength, 785.0);
    assert_eq!(record.metadata.start_time, "2022-07-01 10:00:00");
    assert_eq!(record.metadata.sampling_interval, "1 s");
}

#[test]
fn short_power_log_fails_ingestion() {
    let traces = vec![vec![1.0; 4]; 3];
    let samples = vec![1e-3; 20];
    let result = ingest(
        "p",
        "p",
        &spectrometer_text(&traces, &axis(4)),
        Some(&power_text(&samples, 830.0)),
        &IngestOptions::default(),
    );
    assert!(matches!(result, Err(Error::Format { stream: "power meter", .. })));
}

#[test]
fn uploads_pair_by_stem() {
    let pairs = pair_uploads(vec![
        ("run/b.txt", "b-spec"),
        ("run/a.csv", "a-power"),
        ("run/a.txt", "a-spec"),
    ])
    .unwrap();
    assert_eq!(pairs.len(), 2);
    assert_eq!(pairs[0].stem, "run/a");
    assert_eq!(pairs[0].label(), "a");
    assert_eq!(pairs[0].power.as_deref(), Some("a-power"));
    assert!(pairs[1].power.is_none());

    assert!(matches!(
        pair_uploads(vec![("run/a.parquet", "")]),
        Err(Error::InvalidParameter(_))
    ));
}

proptest! {
    #[test]
    fn every_data_line_becomes_a_trace(
        traces in (1usize..12, 2usize..16).prop_flat_map(|(n, bins)| {
            prop::collection::vec(prop::collection::vec(-1e4..1e4f64, bins), n)
        })
    ) {
        let bins = traces[0].len();
        let record = ingest(
            "n",
            "n",
            &spectrometer_text(&traces, &axis(bins)),
            None,
            &IngestOptions::default(),
        )
        .unwrap();
        prop_assert_eq!(record.n_traces(), traces.len());
        prop_assert_eq!(record.n_bins(), bins);
        prop_assert_eq!(record.traces(), &traces[..]);
    }

    #[test]
    fn truncated_row_is_rejected_with_its_line(
        n in 1usize..8,
        bad in 0usize..8,
    ) {
        let bad = bad % n;
        let mut traces = vec![vec![1.0, 2.0, 3.0]; n];
        traces[bad].pop();
        let result = ingest(
            "t",
            "t",
            &spectrometer_text(&traces, &axis(3)),
            None,
            &IngestOptions::default(),
        );
        match result {
            Err(Error::Format { stream, line, .. }) => {
                prop_assert_eq!(stream, "spectrometer");
                prop_assert_eq!(line, 4 + bad);
            }
            other => prop_assert!(false, "expected format error, got {:?}", other),
        }
    }
}
