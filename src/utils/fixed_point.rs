// src/utils/fixed_point.rs

/// Nodata marker for fixed-point int16 output.
pub const NODATA_INT16: i16 = -10000;
/// Nodata marker for float32 output.
pub const NODATA_FLOAT32: f32 = -999.0;

/// Scale index values into int16, mapping undefined pixels to `nodata_value`.
///
/// Values are clamped to (-1, 1) first so a scale of 10000 never collides
/// with the nodata marker.
pub fn to_fixed_point(data: &[f64], scale_factor: i32, nodata_value: i16) -> Vec<i16> {
    data.iter()
        .map(|&value| {
            if !value.is_finite() {
                nodata_value
            } else {
                // Clamp to avoid overflow and scale
                let clamped = value.clamp(-0.9999, 0.9999);
                (clamped * scale_factor as f64).round() as i16
            }
        })
        .collect()
}

/// Narrow to float32, mapping undefined pixels to `nodata_value`.
pub fn to_float32(data: &[f64], nodata_value: f32) -> Vec<f32> {
    data.iter()
        .map(|&value| {
            if value.is_finite() {
                value as f32
            } else {
                nodata_value
            }
        })
        .collect()
}
