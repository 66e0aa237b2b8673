use palette::{Hsl, IntoColor, Srgb};

// ---------------------------------------------------------------------------
// Cohort palette
// ---------------------------------------------------------------------------

/// `n` visually distinct `#RRGGBB` colours at evenly spaced hues.
///
/// Rendering collaborators key series by cohort index, so entry `i` is the
/// colour of record `i`.
pub fn generate_palette(n: usize) -> Vec<String> {
    (0..n)
        .map(|i| {
            let hue = (i as f32 / n as f32) * 360.0;
            let hsl = Hsl::new(hue, 0.75, 0.55);
            let rgb: Srgb = hsl.into_color();
            let rgb: Srgb<u8> = rgb.into_format();
            format!("#{:02X}{:02X}{:02X}", rgb.red, rgb.green, rgb.blue)
        })
        .collect()
}
