//! Patient measurement types for glaucoma risk prediction.
//!
//! Clinical readings (IOP, corneal thickness, vitals) plus wearable-derived
//! lifestyle signals (screen time, sleep, blink rate, pupil size).

use serde::{Deserialize, Serialize};

/// Binary gender code as used by the trained model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(try_from = "u8", into = "u8")]
pub enum Gender {
    /// Code 0
    #[default]
    Male,
    /// Code 1
    Female,
}

impl Gender {
    /// Numeric code fed to the classifier.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::Male => 0,
            Self::Female => 1,
        }
    }
}

impl TryFrom<u8> for Gender {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Male),
            1 => Ok(Self::Female),
            other => Err(format!("Gender {other} must be 0 or 1")),
        }
    }
}

impl From<Gender> for u8 {
    fn from(g: Gender) -> Self {
        g.code()
    }
}

/// Raw measurements for one patient, supplied by the caller.
///
/// Built fresh per evaluation and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientInput {
    /// Age in years (18-90)
    pub age: u32,

    /// Gender code (0 = male, 1 = female)
    pub gender: Gender,

    /// Intraocular pressure in mmHg (8-40)
    pub iop: f64,

    /// Central corneal thickness in µm (420-650)
    pub cct: f64,

    /// Resting heart rate in bpm (45-120)
    pub heart_rate: u32,

    /// Systolic blood pressure in mmHg (90-180)
    pub bp_sys: u32,

    /// Daily screen time in hours (0-14)
    pub screen_time_h: f64,

    /// Daily sleep in hours (3-10)
    pub sleep_h: f64,

    /// Blinks per minute (5-40)
    pub blink_per_min: u32,

    /// Pupil diameter in mm (2-6)
    pub pupil_mm: f64,
}

impl Default for PatientInput {
    /// Default values of the intake form.
    fn default() -> Self {
        Self {
            age: 50,
            gender: Gender::Male,
            iop: 16.0,
            cct: 540.0,
            heart_rate: 72,
            bp_sys: 120,
            screen_time_h: 5.0,
            sleep_h: 7.0,
            blink_per_min: 18,
            pupil_mm: 3.2,
        }
    }
}

fn check_int(errors: &mut Vec<String>, label: &str, value: u32, min: u32, max: u32) {
    if !(min..=max).contains(&value) {
        errors.push(format!("{label} {value} out of range [{min}, {max}]"));
    }
}

fn check_float(errors: &mut Vec<String>, label: &str, value: f64, min: f64, max: f64) {
    if !value.is_finite() {
        errors.push(format!("{label} must be a finite number"));
    } else if !(min..=max).contains(&value) {
        errors.push(format!("{label} {value} out of range [{min}, {max}]"));
    }
}

impl PatientInput {
    /// Validate that every measurement is within its clinically plausible range.
    ///
    /// # Errors
    /// Returns all violations at once, one message per field.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        check_int(&mut errors, "Age", self.age, 18, 90);
        check_float(&mut errors, "IOP", self.iop, 8.0, 40.0);
        check_float(&mut errors, "Corneal thickness", self.cct, 420.0, 650.0);
        check_int(&mut errors, "Heart rate", self.heart_rate, 45, 120);
        check_int(&mut errors, "Systolic BP", self.bp_sys, 90, 180);
        check_float(&mut errors, "Screen time", self.screen_time_h, 0.0, 14.0);
        check_float(&mut errors, "Sleep hours", self.sleep_h, 3.0, 10.0);
        check_int(&mut errors, "Blink rate", self.blink_per_min, 5, 40);
        check_float(&mut errors, "Pupil size", self.pupil_mm, 2.0, 6.0);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
