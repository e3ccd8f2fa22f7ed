//! Colour scales. Anchor tables are the matplotlib maps sampled at ninths;
//! values between anchors are linearly interpolated in sRGB.

pub type Color = [u8; 3];

/// Matplotlib `tab10`. The first four are the cluster colours of the study.
const TAB10: [Color; 10] = [
    [0x1f, 0x77, 0xb4],
    [0xff, 0x7f, 0x0e],
    [0x2c, 0xa0, 0x2c],
    [0xd6, 0x27, 0x28],
    [0x94, 0x67, 0xbd],
    [0x8c, 0x56, 0x4b],
    [0xe3, 0x77, 0xc2],
    [0x7f, 0x7f, 0x7f],
    [0xbc, 0xbd, 0x22],
    [0x17, 0xbe, 0xcf],
];

const VIRIDIS: [Color; 9] = [
    [68, 1, 84],
    [71, 45, 123],
    [59, 82, 139],
    [44, 114, 142],
    [33, 145, 140],
    [40, 174, 128],
    [94, 201, 98],
    [173, 220, 48],
    [253, 231, 37],
];

const REDS: [Color; 9] = [
    [255, 245, 240],
    [254, 224, 210],
    [252, 187, 161],
    [252, 146, 114],
    [251, 106, 74],
    [239, 59, 44],
    [203, 24, 29],
    [165, 15, 21],
    [103, 0, 13],
];

/// Colour for cluster label `i`; cycles after ten.
pub fn categorical(i: usize) -> Color {
    TAB10[i % TAB10.len()]
}

fn lerp_table(table: &[Color], t: f64) -> Color {
    let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
    let pos = t * (table.len() - 1) as f64;
    let i = (pos.floor() as usize).min(table.len() - 2);
    let f = pos - i as f64;
    let (a, b) = (table[i], table[i + 1]);
    [0, 1, 2].map(|k| (a[k] as f64 + (b[k] as f64 - a[k] as f64) * f).round() as u8)
}

pub fn viridis(t: f64) -> Color {
    lerp_table(&VIRIDIS, t)
}

/// Reversed viridis: low values yellow, high values purple.
pub fn viridis_r(t: f64) -> Color {
    viridis(1.0 - t)
}

pub fn reds(t: f64) -> Color {
    lerp_table(&REDS, t)
}

/// `alpha` of `fg` over `bg`.
pub fn blend(fg: Color, bg: Color, alpha: f64) -> Color {
    let a = alpha.clamp(0.0, 1.0);
    [0, 1, 2].map(|k| (fg[k] as f64 * a + bg[k] as f64 * (1.0 - a)).round() as u8)
}

/// Linear normalisation of `v` into [0, 1] over `[lo, hi]`.
pub fn normalize(v: f64, lo: f64, hi: f64) -> f64 {
    if hi > lo {
        ((v - lo) / (hi - lo)).clamp(0.0, 1.0)
    } else {
        0.5
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_hit_anchor_colours() {
        assert_eq!(viridis(0.0), [68, 1, 84]);
        assert_eq!(viridis(1.0), [253, 231, 37]);
        assert_eq!(viridis_r(0.0), [253, 231, 37]);
        assert_eq!(reds(1.0), [103, 0, 13]);
    }

    #[test]
    fn out_of_range_and_nan_are_clamped() {
        assert_eq!(reds(-3.0), reds(0.0));
        assert_eq!(reds(7.0), reds(1.0));
        assert_eq!(viridis(f64::NAN), viridis(0.0));
    }

    #[test]
    fn midpoint_interpolates_between_anchors() {
        // Halfway between anchors 0 and 1 of Reds.
        assert_eq!(reds(1.0 / 16.0), [255, 235, 225]);
    }

    #[test]
    fn cluster_colours_start_with_study_palette() {
        assert_eq!(categorical(0), [0x1f, 0x77, 0xb4]);
        assert_eq!(categorical(3), [0xd6, 0x27, 0x28]);
        assert_eq!(categorical(10), categorical(0));
    }

    #[test]
    fn blend_and_normalize() {
        assert_eq!(blend([255, 0, 0], [255, 255, 255], 0.7), [255, 77, 77]);
        assert_eq!(normalize(5.0, 0.0, 10.0), 0.5);
        assert_eq!(normalize(5.0, 3.0, 3.0), 0.5);
    }
}
