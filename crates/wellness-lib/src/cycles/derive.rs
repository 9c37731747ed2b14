//! Metric derivation from normalized cycles
//!
//! Computes the canonical cycle statistics used by every model: cycle length
//! statistics, bleeding pattern statistics, and luteal/ovulation estimates.
//! Ovulation is never observed directly. It is placed a fixed luteal phase
//! before the next period, and every estimate has a deterministic fallback so
//! that sparse input degrades to population values instead of failing.

use super::normalize::{days_between, NormalizedCycleSet, MAX_CYCLES, MIN_CYCLES};
use crate::error::WellnessError;
use crate::models::features::*;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Menses longer than this many days count as unusual bleeding
pub const UNUSUAL_MENSES_DAYS: i64 = 7;

/// Intensity at or above this level counts as heavy bleeding
pub const HEAVY_INTENSITY: u8 = 4;

/// Thresholds and fallbacks used by the derivation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DerivationParams {
    /// Assumed luteal phase length used to place ovulation
    pub assumed_luteal_days: i64,
    /// Deviation from the mean cycle length that marks a cycle irregular
    pub irregular_threshold_days: f64,
    /// Luteal phases at or below this length count as short
    pub short_luteal_max_days: i64,
    /// Plausible observed luteal lengths (inclusive)
    pub luteal_min_days: i64,
    pub luteal_max_days: i64,
    /// Plausible ovulation days of cycle (inclusive)
    pub ovulation_day_min: i64,
    pub ovulation_day_max: i64,
    /// Most recent cycles kept after normalization
    pub max_cycles: usize,
    pub default_cycle_length: f64,
    pub default_menses_length: f64,
    pub default_intensity: f64,
}

impl Default for DerivationParams {
    fn default() -> Self {
        Self {
            assumed_luteal_days: 14,
            irregular_threshold_days: 7.0,
            short_luteal_max_days: 11,
            luteal_min_days: 7,
            luteal_max_days: 24,
            ovulation_day_min: 1,
            ovulation_day_max: 35,
            max_cycles: MAX_CYCLES,
            default_cycle_length: 28.0,
            default_menses_length: 5.0,
            default_intensity: 3.0,
        }
    }
}

/// The derived cycle statistics, rounded to one decimal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleMetrics {
    #[serde(rename = "AvgCycleLength")]
    pub avg_cycle_length: f64,
    #[serde(rename = "AvgCycleLengthPercent")]
    pub avg_cycle_length_percent: f64,
    #[serde(rename = "IrregularCyclesPercent")]
    pub irregular_cycles_percent: f64,
    #[serde(rename = "StdCycleLength")]
    pub std_cycle_length: f64,
    #[serde(rename = "AvgMensesLength")]
    pub avg_menses_length: f64,
    #[serde(rename = "AvgBleedingIntensity")]
    pub avg_bleeding_intensity: f64,
    #[serde(rename = "UnusualBleedingPercent")]
    pub unusual_bleeding_percent: f64,
    #[serde(rename = "AvgLutealPhase")]
    pub avg_luteal_phase: f64,
    #[serde(rename = "ShortLutealPercent")]
    pub short_luteal_percent: f64,
    #[serde(rename = "AvgOvulationDay")]
    pub avg_ovulation_day: f64,
    #[serde(rename = "OvulationVariability")]
    pub ovulation_variability: f64,
    #[serde(rename = "TotalCycles")]
    pub total_cycles: u32,
}

impl CycleMetrics {
    /// Metrics keyed by canonical feature name
    pub fn to_feature_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert(AVG_CYCLE_LENGTH.into(), json!(self.avg_cycle_length));
        map.insert(
            AVG_CYCLE_LENGTH_PERCENT.into(),
            json!(self.avg_cycle_length_percent),
        );
        map.insert(
            IRREGULAR_CYCLES_PERCENT.into(),
            json!(self.irregular_cycles_percent),
        );
        map.insert(STD_CYCLE_LENGTH.into(), json!(self.std_cycle_length));
        map.insert(AVG_MENSES_LENGTH.into(), json!(self.avg_menses_length));
        map.insert(
            AVG_BLEEDING_INTENSITY.into(),
            json!(self.avg_bleeding_intensity),
        );
        map.insert(
            UNUSUAL_BLEEDING_PERCENT.into(),
            json!(self.unusual_bleeding_percent),
        );
        map.insert(AVG_LUTEAL_PHASE.into(), json!(self.avg_luteal_phase));
        map.insert(SHORT_LUTEAL_PERCENT.into(), json!(self.short_luteal_percent));
        map.insert(AVG_OVULATION_DAY.into(), json!(self.avg_ovulation_day));
        map.insert(
            OVULATION_VARIABILITY.into(),
            json!(self.ovulation_variability),
        );
        map.insert(TOTAL_CYCLES.into(), json!(self.total_cycles));
        map
    }
}

/// Derives cycle metrics from a normalized cycle set
#[derive(Debug, Clone, Default)]
pub struct MetricDeriver {
    params: DerivationParams,
}

impl MetricDeriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_params(params: DerivationParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &DerivationParams {
        &self.params
    }

    pub fn derive(&self, set: &NormalizedCycleSet) -> Result<CycleMetrics, WellnessError> {
        let p = &self.params;
        let cycles = set.cycles();
        if cycles.len() < MIN_CYCLES {
            return Err(WellnessError::InsufficientData {
                cycles: cycles.len(),
            });
        }

        // Cycle lengths between consecutive starts
        let lengths: Vec<i64> = cycles
            .windows(2)
            .map(|pair| days_between(pair[0].start, pair[1].start))
            .collect();
        let lengths_f: Vec<f64> = lengths.iter().map(|&l| l as f64).collect();

        let avg_cycle = mean(&lengths_f).unwrap_or(p.default_cycle_length);
        let avg_cycle_percent = if avg_cycle > 0.0 {
            let deviations: Vec<f64> = lengths_f
                .iter()
                .map(|l| (l - avg_cycle).abs() / avg_cycle * 100.0)
                .collect();
            mean(&deviations).unwrap_or(0.0)
        } else {
            0.0
        };
        let irregular = lengths_f
            .iter()
            .filter(|l| (*l - avg_cycle).abs() > p.irregular_threshold_days)
            .count();
        let std_cycle = sample_std_dev(&lengths_f).unwrap_or(0.0);

        // Bleeding pattern
        let menses: Vec<f64> = cycles.iter().map(|c| c.menses_days() as f64).collect();
        let avg_menses = mean(&menses).unwrap_or(p.default_menses_length);

        let intensities: Vec<f64> = cycles
            .iter()
            .filter_map(|c| c.intensity.map(f64::from))
            .collect();
        let avg_intensity = mean(&intensities).unwrap_or(p.default_intensity);

        let default_intensity = p.default_intensity.round() as u8;
        let unusual = cycles
            .iter()
            .filter(|c| {
                c.menses_days() > UNUSUAL_MENSES_DAYS
                    || c.intensity.unwrap_or(default_intensity) >= HEAVY_INTENSITY
            })
            .count();

        // Ovulation placed `assumed_luteal_days` before the next period
        let mut luteal_lengths = Vec::new();
        let mut ovulation_days = Vec::new();
        for (pair, &length) in cycles.windows(2).zip(&lengths) {
            let (current, next) = (&pair[0], &pair[1]);
            let estimated_day = length - p.assumed_luteal_days;
            let Some(ovulation_date) = current
                .start
                .checked_add_signed(Duration::days(estimated_day - 1))
            else {
                continue;
            };

            let luteal = days_between(ovulation_date, next.start);
            if (p.luteal_min_days..=p.luteal_max_days).contains(&luteal) {
                luteal_lengths.push(luteal as f64);
            }

            let day_of_cycle = days_between(current.start, ovulation_date) + 1;
            if (p.ovulation_day_min..=p.ovulation_day_max).contains(&day_of_cycle) {
                ovulation_days.push(day_of_cycle as f64);
            }
        }

        let avg_luteal = mean(&luteal_lengths).unwrap_or(p.assumed_luteal_days as f64);
        let short_luteal = if luteal_lengths.is_empty() {
            if p.assumed_luteal_days > p.short_luteal_max_days {
                0.0
            } else {
                100.0
            }
        } else {
            let short = luteal_lengths
                .iter()
                .filter(|&&l| l <= p.short_luteal_max_days as f64)
                .count();
            percentage(short, luteal_lengths.len())
        };

        let avg_ovulation = mean(&ovulation_days)
            .unwrap_or_else(|| (avg_cycle - p.assumed_luteal_days as f64).max(1.0));
        let ovulation_variability = if ovulation_days.len() >= 2 {
            sample_std_dev(&ovulation_days).unwrap_or(std_cycle)
        } else {
            std_cycle
        };

        Ok(CycleMetrics {
            avg_cycle_length: round1(avg_cycle),
            avg_cycle_length_percent: round1(avg_cycle_percent),
            irregular_cycles_percent: round1(percentage(irregular, lengths.len())),
            std_cycle_length: round1(std_cycle),
            avg_menses_length: round1(avg_menses),
            avg_bleeding_intensity: round1(avg_intensity),
            unusual_bleeding_percent: round1(percentage(unusual, cycles.len())),
            avg_luteal_phase: round1(avg_luteal),
            short_luteal_percent: round1(short_luteal),
            avg_ovulation_day: round1(avg_ovulation),
            ovulation_variability: round1(ovulation_variability),
            total_cycles: cycles.len() as u32,
        })
    }
}

/// Derive with the default parameters
pub fn derive(set: &NormalizedCycleSet) -> Result<CycleMetrics, WellnessError> {
    MetricDeriver::new().derive(set)
}

/// Rule-based 0-100 summary of cycle regularity and bleeding pattern
pub fn cycle_health_score(metrics: &CycleMetrics) -> u8 {
    let mut score: i32 = 100;
    if metrics.irregular_cycles_percent > 20.0 {
        score -= 20;
    }
    if metrics.avg_cycle_length < 21.0 || metrics.avg_cycle_length > 35.0 {
        score -= 15;
    }
    if metrics.avg_bleeding_intensity > 4.0 {
        score -= 10;
    }
    if metrics.unusual_bleeding_percent > 30.0 {
        score -= 15;
    }
    score.max(0) as u8
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (n - 1 denominator)
fn sample_std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let avg = mean(values)?;
    let sum_sq: f64 = values.iter().map(|v| (v - avg).powi(2)).sum();
    Some((sum_sq / (values.len() - 1) as f64).sqrt())
}

fn percentage(count: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    count as f64 / total as f64 * 100.0
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cycles::normalize;
    use crate::models::CycleRecord;

    /// One record per reporting month, in order, regardless of start dates
    fn set_from(dates: &[(&str, &str)]) -> NormalizedCycleSet {
        let records: Vec<CycleRecord> = dates
            .iter()
            .enumerate()
            .map(|(i, (start, end))| {
                CycleRecord::new(*start, *end).with_month_key(format!("2024-{:02}", i + 1))
            })
            .collect();
        normalize(&records).unwrap()
    }

    fn reference_set() -> NormalizedCycleSet {
        set_from(&[
            ("2024-01-01", "2024-01-05"),
            ("2024-01-29", "2024-02-02"),
            ("2024-02-27", "2024-03-02"),
        ])
    }

    #[test]
    fn test_reference_scenario() {
        let m = derive(&reference_set()).unwrap();
        assert_eq!(m.avg_cycle_length, 28.5);
        assert!((m.std_cycle_length - 0.71).abs() < 0.05);
        assert_eq!(m.irregular_cycles_percent, 0.0);
        assert_eq!(m.avg_cycle_length_percent, 1.8);
        assert_eq!(m.avg_menses_length, 5.0);
        assert_eq!(m.avg_bleeding_intensity, 3.0);
        assert_eq!(m.unusual_bleeding_percent, 0.0);
        assert_eq!(m.avg_ovulation_day, 14.5);
        assert_eq!(m.total_cycles, 3);
    }

    #[test]
    fn test_luteal_estimates_within_plausible_window() {
        let m = derive(&reference_set()).unwrap();
        assert!((7.0..=24.0).contains(&m.avg_luteal_phase));
        assert_eq!(m.short_luteal_percent, 0.0);
    }

    #[test]
    fn test_luteal_fallback_when_nothing_plausible() {
        let params = DerivationParams {
            luteal_min_days: 16,
            luteal_max_days: 24,
            ..Default::default()
        };
        let m = MetricDeriver::with_params(params)
            .derive(&reference_set())
            .unwrap();
        assert_eq!(m.avg_luteal_phase, 14.0);
        assert_eq!(m.short_luteal_percent, 0.0);

        let short_assumption = DerivationParams {
            assumed_luteal_days: 10,
            luteal_min_days: 30,
            luteal_max_days: 40,
            ..Default::default()
        };
        let m = MetricDeriver::with_params(short_assumption)
            .derive(&reference_set())
            .unwrap();
        assert_eq!(m.avg_luteal_phase, 10.0);
        assert_eq!(m.short_luteal_percent, 100.0);
    }

    #[test]
    fn test_long_cycle_ovulation_day() {
        let m = derive(&set_from(&[
            ("2024-01-01", "2024-01-05"),
            ("2024-02-12", "2024-02-16"),
        ]))
        .unwrap();
        assert_eq!(m.avg_cycle_length, 42.0);
        assert_eq!(m.avg_ovulation_day, 28.0);
        assert_eq!(m.ovulation_variability, 0.0);
    }

    #[test]
    fn test_ovulation_day_outside_window_excluded() {
        // Lengths 50 and 28: day 36 is dropped, day 14 kept
        let m = derive(&set_from(&[
            ("2024-01-01", "2024-01-05"),
            ("2024-02-20", "2024-02-24"),
            ("2024-03-19", "2024-03-23"),
        ]))
        .unwrap();
        assert_eq!(m.avg_cycle_length, 39.0);
        assert_eq!(m.avg_ovulation_day, 14.0);
        // Fewer than two kept days falls back to cycle length spread
        assert_eq!(m.ovulation_variability, m.std_cycle_length);
        assert_eq!(m.irregular_cycles_percent, 100.0);
    }

    #[test]
    fn test_ovulation_fallback_uses_cycle_length() {
        let m = derive(&set_from(&[
            ("2024-01-01", "2024-01-05"),
            ("2024-02-25", "2024-02-28"),
        ]))
        .unwrap();
        assert_eq!(m.avg_cycle_length, 55.0);
        assert_eq!(m.avg_ovulation_day, 41.0);
    }

    #[test]
    fn test_bleeding_metrics() {
        let records = vec![
            CycleRecord::new("2024-01-01", "2024-01-09").with_intensity(2),
            CycleRecord::new("2024-01-29", "2024-02-02")
                .with_intensity(5)
                .with_month_key("2024-02"),
            CycleRecord::new("2024-02-26", "2024-03-01").with_month_key("2024-03"),
            CycleRecord::new("2024-03-25", "2024-03-28")
                .with_intensity(2)
                .with_month_key("2024-04"),
        ];
        let m = derive(&normalize(&records).unwrap()).unwrap();
        // Missing intensity is excluded from the mean
        assert_eq!(m.avg_bleeding_intensity, 3.0);
        // 9-day menses and intensity 5 are unusual
        assert_eq!(m.unusual_bleeding_percent, 50.0);
        assert_eq!(m.avg_menses_length, 5.8);
    }

    #[test]
    fn test_percent_metrics_bounded() {
        let m = derive(&set_from(&[
            ("2024-01-01", "2024-01-05"),
            ("2024-01-22", "2024-01-26"),
            ("2024-03-05", "2024-03-09"),
            ("2024-04-01", "2024-04-04"),
        ]))
        .unwrap();
        assert!(m.avg_cycle_length_percent >= 0.0);
        assert!((0.0..=100.0).contains(&m.irregular_cycles_percent));
        assert!((0.0..=100.0).contains(&m.unusual_bleeding_percent));
        assert!((0.0..=100.0).contains(&m.short_luteal_percent));
    }

    #[test]
    fn test_derive_is_idempotent() {
        let set = reference_set();
        assert_eq!(derive(&set).unwrap(), derive(&set).unwrap());
    }

    #[test]
    fn test_total_cycles_matches_window() {
        let records: Vec<CycleRecord> = (1..=12)
            .chain(1..=3)
            .enumerate()
            .map(|(i, month)| {
                let year = if i < 12 { 2023 } else { 2024 };
                CycleRecord::new(
                    format!("{year}-{month:02}-02"),
                    format!("{year}-{month:02}-06"),
                )
            })
            .collect();
        let set = normalize(&records).unwrap();
        let m = derive(&set).unwrap();
        assert_eq!(m.total_cycles as usize, set.len());
        assert!(set.len() <= MAX_CYCLES);
    }

    #[test]
    fn test_health_score_deductions() {
        let mut m = derive(&reference_set()).unwrap();
        assert_eq!(cycle_health_score(&m), 100);
        m.irregular_cycles_percent = 50.0;
        m.avg_cycle_length = 40.0;
        m.avg_bleeding_intensity = 4.5;
        m.unusual_bleeding_percent = 60.0;
        assert_eq!(cycle_health_score(&m), 40);
    }

    #[test]
    fn test_feature_map_uses_canonical_names() {
        let map = derive(&reference_set()).unwrap().to_feature_map();
        assert_eq!(map[AVG_CYCLE_LENGTH], json!(28.5));
        assert_eq!(map[TOTAL_CYCLES], json!(3));
        assert!(map.contains_key(OVULATION_VARIABILITY));
    }
}
