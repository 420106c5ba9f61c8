//! Heart-disease risk scoring.
//!
//! A [`RiskModel`] maps the thirteen intake measurements to a score in `[0, 100)`. The
//! bundled [`LogisticRiskModel`] is deterministic; a trained model can be swapped in behind
//! the same trait.

use crate::{CardioError, CardioResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The thirteen clinical measurements captured by the intake form.
///
/// Field names follow the heart-disease dataset the risk model is calibrated on.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Measurements {
    /// Years.
    pub age: u32,
    /// 0 = female, 1 = male.
    pub sex: u8,
    /// Chest pain type: 0 typical angina, 1 atypical, 2 non-anginal, 3 asymptomatic.
    pub cp: u8,
    /// Resting blood pressure, mm Hg.
    pub trtbps: u32,
    /// Serum cholesterol, mg/dl.
    pub chol: u32,
    /// Fasting blood sugar > 120 mg/dl.
    pub fbs: u8,
    /// Resting ECG: 0 normal, 1 ST-T abnormality, 2 LV hypertrophy.
    pub restecg: u8,
    /// Maximum heart rate achieved.
    pub thalach: u32,
    /// Exercise induced angina.
    pub exang: u8,
    /// ST depression induced by exercise relative to rest.
    pub oldpeak: f64,
    /// Slope of the peak exercise ST segment.
    pub slope: u8,
    /// Number of major vessels coloured by fluoroscopy.
    pub ca: u8,
    /// Thalassemia: 0 normal, 1 fixed defect, 2 reversible defect.
    pub thal: u8,
}

impl Measurements {
    pub fn validate(&self) -> CardioResult<()> {
        fn at_most(field: &str, value: u8, max: u8) -> CardioResult<()> {
            if value > max {
                return Err(CardioError::validation(
                    field,
                    format!("must be between 0 and {max}, got {value}"),
                ));
            }
            Ok(())
        }

        fn within(field: &str, value: u32, min: u32, max: u32) -> CardioResult<()> {
            if !(min..=max).contains(&value) {
                return Err(CardioError::validation(
                    field,
                    format!("must be between {min} and {max}, got {value}"),
                ));
            }
            Ok(())
        }

        within("age", self.age, 0, 120)?;
        at_most("sex", self.sex, 1)?;
        at_most("cp", self.cp, 3)?;
        within("trtbps", self.trtbps, 50, 250)?;
        within("chol", self.chol, 100, 600)?;
        at_most("fbs", self.fbs, 1)?;
        at_most("restecg", self.restecg, 2)?;
        within("thalach", self.thalach, 50, 250)?;
        at_most("exang", self.exang, 1)?;
        if !self.oldpeak.is_finite() || !(0.0..=10.0).contains(&self.oldpeak) {
            return Err(CardioError::validation(
                "oldpeak",
                format!("must be between 0 and 10, got {}", self.oldpeak),
            ));
        }
        at_most("slope", self.slope, 2)?;
        at_most("ca", self.ca, 3)?;
        at_most("thal", self.thal, 2)?;
        Ok(())
    }
}

pub trait RiskModel: Send + Sync + fmt::Debug {
    /// Identifies the model on stored records.
    fn name(&self) -> &'static str;

    /// Risk in `[0, 100)` for validated measurements.
    fn score(&self, measurements: &Measurements) -> f64;
}

/// Logistic regression over the measurements with fixed coefficients.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogisticRiskModel;

impl LogisticRiskModel {
    const INTERCEPT: f64 = -7.0;
    const CHEST_PAIN: [f64; 4] = [0.0, -0.3, -0.2, 1.0];
    const THAL: [f64; 3] = [0.0, 0.8, 1.2];
    const MAX_SCORE: f64 = 99.99;
}

impl RiskModel for LogisticRiskModel {
    fn name(&self) -> &'static str {
        "logistic-v1"
    }

    fn score(&self, m: &Measurements) -> f64 {
        let pick = |table: &[f64], i: u8| table.get(usize::from(i)).copied().unwrap_or(0.0);

        let z = Self::INTERCEPT
            + 0.045 * f64::from(m.age)
            + 0.9 * f64::from(m.sex)
            + pick(&Self::CHEST_PAIN, m.cp)
            + 0.015 * (f64::from(m.trtbps) - 120.0)
            + 0.004 * (f64::from(m.chol) - 200.0)
            + 0.4 * f64::from(m.fbs)
            + 0.3 * f64::from(m.restecg)
            - 0.02 * (f64::from(m.thalach) - 150.0)
            + f64::from(m.exang)
            + 0.5 * m.oldpeak
            + 0.4 * f64::from(m.slope)
            + 0.7 * f64::from(m.ca)
            + pick(&Self::THAL, m.thal);

        let probability = 1.0 / (1.0 + (-z).exp());
        let percent = (probability * 10_000.0).round() / 100.0;
        percent.clamp(0.0, Self::MAX_SCORE)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
}

impl RiskLevel {
    pub fn from_risk(risk: f64) -> Self {
        if risk > 70.0 {
            Self::High
        } else if risk > 30.0 {
            Self::Moderate
        } else {
            Self::Low
        }
    }
}

/// Trend of a record's risk against the patient's previous record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionStatus {
    Still,
    Improved,
    Deteriorated,
}

impl ConditionStatus {
    pub fn classify(previous: Option<f64>, current: f64) -> Self {
        match previous {
            Some(prev) if current > prev => Self::Deteriorated,
            Some(prev) if current < prev => Self::Improved,
            _ => Self::Still,
        }
    }
}
