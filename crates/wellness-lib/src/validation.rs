//! Feature validation and sanitization
//!
//! Two entry points: a strict validator that requires every canonical field,
//! coerces types and range-checks values, and a lenient sanitizer that only
//! turns numeric strings into numbers.

use crate::error::ValidationError;
use crate::models::features::*;
use crate::models::CanonicalFeatureVector;
use serde_json::{Map, Number, Value};
use std::collections::HashMap;

/// Expected type of a canonical field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Int,
    Float,
}

/// Type and closed range for one canonical field
#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    pub name: &'static str,
    pub kind: FieldKind,
    pub min: f64,
    pub max: f64,
}

const fn float(name: &'static str, min: f64, max: f64) -> FieldRule {
    FieldRule {
        name,
        kind: FieldKind::Float,
        min,
        max,
    }
}

const fn int(name: &'static str, min: f64, max: f64) -> FieldRule {
    FieldRule {
        name,
        kind: FieldKind::Int,
        min,
        max,
    }
}

/// Rules for the seventeen canonical fields, in canonical order
pub const FIELD_RULES: [FieldRule; 17] = [
    float(AVG_CYCLE_LENGTH, 1.0, 90.0),
    float(STD_CYCLE_LENGTH, 0.0, 60.0),
    float(IRREGULAR_CYCLES_PERCENT, 0.0, 100.0),
    float(AVG_LUTEAL_PHASE, 0.0, 40.0),
    float(SHORT_LUTEAL_PERCENT, 0.0, 100.0),
    float(AVG_MENSES_LENGTH, 0.0, 30.0),
    float(UNUSUAL_BLEEDING_PERCENT, 0.0, 100.0),
    float(AVG_OVULATION_DAY, 0.0, 90.0),
    float(OVULATION_VARIABILITY, 0.0, 60.0),
    float(AVG_BLEEDING_INTENSITY, 0.0, 5.0),
    int(AGE, 10.0, 80.0),
    float(BMI, 10.0, 60.0),
    int(TOTAL_CYCLES, 0.0, 500.0),
    int(NUMBER_PREGNANCIES, 0.0, 30.0),
    int(ABORTIONS, 0.0, 30.0),
    int(AGE_AT_MENARCHE, 5.0, 25.0),
    int(BREASTFEEDING, 0.0, 1.0),
];

pub fn rule_for(name: &str) -> Option<&'static FieldRule> {
    FIELD_RULES.iter().find(|r| r.name == name)
}

/// Strictly validate a raw feature mapping into a canonical vector
///
/// Reports every missing field at once; type and range failures report the
/// first offending field with its value.
pub fn validate(raw: &Map<String, Value>) -> Result<CanonicalFeatureVector, ValidationError> {
    let missing: Vec<String> = CANONICAL
        .iter()
        .filter(|name| raw.get(**name).is_none())
        .map(|name| name.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(ValidationError::MissingFields(missing));
    }

    let mut coerced: HashMap<&str, f64> = HashMap::with_capacity(FIELD_RULES.len());
    for rule in &FIELD_RULES {
        let value = raw
            .get(rule.name)
            .ok_or_else(|| ValidationError::MissingFields(vec![rule.name.to_string()]))?;
        coerced.insert(rule.name, coerce(rule, value)?);
    }
    let field = |name: &str| coerced.get(name).copied().unwrap_or_default();

    // The optional percent metric is carried only when it is a clean number
    let avg_cycle_length_percent = raw
        .get(AVG_CYCLE_LENGTH_PERCENT)
        .and_then(as_float)
        .filter(|v| *v >= 0.0);

    Ok(CanonicalFeatureVector {
        avg_cycle_length: field(AVG_CYCLE_LENGTH),
        std_cycle_length: field(STD_CYCLE_LENGTH),
        irregular_cycles_percent: field(IRREGULAR_CYCLES_PERCENT),
        avg_luteal_phase: field(AVG_LUTEAL_PHASE),
        short_luteal_percent: field(SHORT_LUTEAL_PERCENT),
        avg_menses_length: field(AVG_MENSES_LENGTH),
        unusual_bleeding_percent: field(UNUSUAL_BLEEDING_PERCENT),
        avg_ovulation_day: field(AVG_OVULATION_DAY),
        ovulation_variability: field(OVULATION_VARIABILITY),
        avg_bleeding_intensity: field(AVG_BLEEDING_INTENSITY),
        age: field(AGE) as u32,
        bmi: field(BMI),
        total_cycles: field(TOTAL_CYCLES) as u32,
        number_pregnancies: field(NUMBER_PREGNANCIES) as u32,
        abortions: field(ABORTIONS) as u32,
        age_at_menarche: field(AGE_AT_MENARCHE) as u32,
        breastfeeding: field(BREASTFEEDING) as u8,
        avg_cycle_length_percent,
    })
}

fn coerce(rule: &FieldRule, value: &Value) -> Result<f64, ValidationError> {
    let coerced = match rule.kind {
        FieldKind::Int => as_int(value).map(|v| v as f64),
        FieldKind::Float => as_float(value),
    };
    let number = coerced.ok_or_else(|| ValidationError::InvalidType {
        field: rule.name.to_string(),
        value: value.clone(),
    })?;

    if number < rule.min || number > rule.max {
        return Err(ValidationError::OutOfRange {
            field: rule.name.to_string(),
            value: number,
            min: rule.min,
            max: rule.max,
        });
    }
    Ok(number)
}

/// Integer coercion: floats truncate, booleans map to 0/1, strings must be integral
fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::Bool(b) => Some(i64::from(*b)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn as_float(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|f| f.is_finite())
}

/// Best-effort coercion of numeric strings; everything else passes through unchanged
pub fn sanitize(raw: &Map<String, Value>) -> Map<String, Value> {
    raw.iter()
        .map(|(key, value)| (key.clone(), sanitize_value(value)))
        .collect()
}

fn sanitize_value(value: &Value) -> Value {
    let Value::String(s) = value else {
        return value.clone();
    };
    let trimmed = s.trim();
    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::Number(i.into());
    }
    trimmed
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| value.clone())
}
