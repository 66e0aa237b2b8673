#![allow(dead_code)]

use raman_lod::{MetadataValue, SpectrumMetadata, SpectrumRecord};

pub fn metadata(name: &str) -> SpectrumMetadata {
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

/// A record on the Raman axis `0, 1, 2, ...` with no power readings.
pub fn record(name: &str, traces: Vec<Vec<f64>>) -> SpectrumRecord {
    let n = traces[0].len();
    let axis: Vec<f64> = (0..n).map(|i| i as f64).collect();
    let wavelength = axis.iter().map(|x| 850.0 + x).collect();
    SpectrumRecord::new(traces, wavelength, axis, None, metadata(name)).unwrap()
}

/// Spectrometer export: pixel line, wavelength line, a skipped line, traces.
pub fn spectrometer_text(traces: &[Vec<f64>], wavelengths: &[f64]) -> String {
    let row = |values: Vec<String>| format!("0\t0\t{}\n", values.join("\t"));
    let mut text = row((0..wavelengths.len()).map(|i| i.to_string()).collect());
    text += &row(wavelengths.iter().map(|w| w.to_string()).collect());
    text += "x\tx\tx\n";
    for t in traces {
        text += &row(t.iter().map(|v| v.to_string()).collect());
    }
    text
}

/// Power meter export with a 14-line header.
pub fn power_text(samples: &[f64], excitation: f64) -> String {
    let mut text = String::new();
    for i in 0..14 {
        text += &match i {
            4 => "Start Time,2022-07-01 10:00:00\n".to_string(),
            5 => "Sampling Interval,1 s\n".to_string(),
            11 => format!("Wavelength,{excitation} nm\n"),
            _ => format!("Header {i},\n"),
        };
    }
    text += "Samples,Date (MM/dd/yyyy),Time of day (hh:mm:ss),Power (W)\n";
    for (i, s) in samples.iter().enumerate() {
        text += &format!("{i},07/01/2022,10:00:{:02},{s}\n", i % 60);
    }
    text
}

/// Element-wise mean and population standard deviation, computed naively.
pub fn expected_stats(traces: &[Vec<f64>]) -> (Vec<f64>, Vec<f64>) {
    let n = traces.len() as f64;
    (0..traces[0].len())
        .map(|j| {
            let mean = traces.iter().map(|t| t[j]).sum::<f64>() / n;
            let var = traces.iter().map(|t| (t[j] - mean).powi(2)).sum::<f64>() / n;
            (mean, var.sqrt())
        })
        .unzip()
}
