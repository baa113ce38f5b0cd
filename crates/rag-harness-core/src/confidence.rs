//! Distance-to-confidence conversion.
//!
//! The vector store reports cosine distance `1 - cos(a, b)`, which lies in
//! `[0, 2]`: `0` for identical directions, `2` for opposite ones. The
//! mapping below is calibrated to exactly that scale. A store using another
//! metric (L2, inner product, unnormalized vectors) must recalibrate this
//! function rather than reuse it.

/// Convert a nearest-neighbour distance into a confidence in `[0, 1]`.
///
/// `confidence = clamp(1 - distance / 2, 0, 1)`. Non-finite distances map
/// to `0.0`.
///
/// ```rust
/// use rag_harness_core::confidence::distance_to_confidence;
///
/// assert_eq!(distance_to_confidence(0.0), 1.0);
/// assert_eq!(distance_to_confidence(2.0), 0.0);
/// assert_eq!(distance_to_confidence(0.4), 0.8);
/// ```
pub fn distance_to_confidence(distance: f64) -> f64 {
    if !distance.is_finite() {
        return 0.0;
    }
    (1.0 - distance / 2.0).clamp(0.0, 1.0)
}

/// Round to two decimal places, the precision surfaced to callers.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// [`distance_to_confidence`] rounded for display.
pub fn display_confidence(distance: f64) -> f64 {
    round2(distance_to_confidence(distance))
}
