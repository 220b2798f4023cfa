//! Core traits for the measurement pipeline.
//!
//! The engine depends on a signal-derivation function it does not own.
//! [`VitalsDeriver`] is that seam.

/// Vital signs derived from one sequence.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VitalSigns {
    /// Heart rate (beats per minute).
    pub heart_rate: f64,
    /// Peripheral oxygen saturation (%).
    pub spo2: f64,
    /// Respiration rate (breaths per minute).
    pub respiration_rate: f64,
    /// Body temperature (°C).
    pub temperature: f64,
    /// Systolic blood pressure (mmHg).
    pub systolic: f64,
    /// Diastolic blood pressure (mmHg).
    pub diastolic: f64,
}

/// Turns raw waveform samples plus the sequence scalar into vital signs.
///
/// Implementations MUST be pure: no I/O, same input gives the same output.
/// Closures with the matching signature implement this trait.
///
/// # Example
///
/// ```
/// use vitalink::core::{VitalSigns, VitalsDeriver};
///
/// let deriver = |_a: &[i64], _b: &[i64], temperature: f32| VitalSigns {
///     temperature: f64::from(temperature),
///     ..VitalSigns::default()
/// };
/// let vitals = deriver.derive(&[1, 2], &[3, 4], 36.5);
/// assert_eq!(vitals.temperature, 36.5);
/// ```
pub trait VitalsDeriver: Send + Sync {
    /// Derive vital signs for one sequence.
    fn derive(&self, channel_a: &[i64], channel_b: &[i64], scalar: f32) -> VitalSigns;
}

impl<F> VitalsDeriver for F
where
    F: Fn(&[i64], &[i64], f32) -> VitalSigns + Send + Sync,
{
    fn derive(&self, channel_a: &[i64], channel_b: &[i64], scalar: f32) -> VitalSigns {
        self(channel_a, channel_b, scalar)
    }
}
