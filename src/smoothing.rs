//! Exponential smoothing and amplitude to dB conversion

/// Exponential smoothing step.
///
/// `factor` is the weight kept from `previous`: 0 passes `current` through,
/// 1 freezes the value. The result never leaves the range spanned by the two
/// inputs.
pub fn smooth(previous: f32, current: f32, factor: f32) -> f32 {
    let factor = factor.clamp(0.0, 1.0);
    let next = factor * previous + (1.0 - factor) * current;
    next.clamp(previous.min(current), previous.max(current))
}

/// Convert linear amplitude to decibels, guarding against log(0)
pub fn amplitude_to_db(amplitude: f32, epsilon: f32) -> f32 {
    20.0 * (amplitude.max(0.0) + epsilon).log10()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn zero_factor_passes_current_through() {
        assert_eq!(smooth(-40.0, -10.0, 0.0), -10.0);
    }

    #[test]
    fn unit_factor_freezes_value() {
        let mut value = -80.0;
        for current in [-10.0, 0.0, -5.0] {
            value = smooth(value, current, 1.0);
        }
        assert_eq!(value, -80.0);
    }

    #[test]
    fn typical_factor_weights_previous() {
        let next = smooth(-100.0, 0.0, 0.3);
        assert!((next - -30.0).abs() < 1e-4);
    }

    #[test]
    fn tenth_amplitude_is_minus_twenty_db() {
        let db = amplitude_to_db(0.1, 0.0);
        assert!((db - -20.0).abs() < 1e-4);
    }

    #[test]
    fn zero_amplitude_stays_finite() {
        let db = amplitude_to_db(0.0, 1e-6);
        assert!(db.is_finite());
        assert!((db - -120.0).abs() < 1e-3);
    }

    proptest! {
        #[test]
        fn smoothing_stays_within_inputs(
            previous in -1.0e6f32..1.0e6,
            current in -1.0e6f32..1.0e6,
            factor in 0.0f32..=1.0,
        ) {
            let next = smooth(previous, current, factor);
            prop_assert!(next >= previous.min(current));
            prop_assert!(next <= previous.max(current));
        }
    }
}
