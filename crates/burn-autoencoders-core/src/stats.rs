//! Running statistics for logging
//!
//! Each named meter tracks the last value, the simple mean since the last
//! reset and an exponential moving average.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Smoothing factor of the exponential moving average
pub const SMOOTHING: f64 = 0.99;

/// A single named meter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Meter {
    /// Most recent value
    pub last: Option<f64>,
    /// Sum of the values since the last reset
    pub sum: f64,
    /// Number of values since the last reset
    pub count: usize,
    /// Exponential moving average, seeded by the first value
    pub smooth: Option<f64>,
}

impl Meter {
    pub fn update(&mut self, value: f64) {
        self.last = Some(value);
        self.sum += value;
        self.count += 1;
        self.smooth = Some(match self.smooth {
            Some(s) => SMOOTHING * s + (1.0 - SMOOTHING) * value,
            None => value,
        });
    }

    pub fn avg(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

/// Collection of named meters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsMeter {
    meters: BTreeMap<String, Meter>,
}

impl StatsMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers meters (existing ones are left untouched)
    pub fn new_meter<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            self.meters.entry(name.into()).or_default();
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.meters.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.meters.keys().map(String::as_str)
    }

    pub fn update(&mut self, name: &str, value: f64) -> Result<()> {
        self.meters
            .get_mut(name)
            .ok_or_else(|| Error::UnknownStat(name.to_string()))?
            .update(value);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Meter> {
        self.meters.get(name)
    }

    /// Clears every meter but keeps the registered names
    pub fn reset(&mut self) {
        for meter in self.meters.values_mut() {
            *meter = Meter::default();
        }
    }

    /// Simple averages of meters that received at least one value
    pub fn avgs(&self) -> BTreeMap<String, f64> {
        self.meters
            .iter()
            .filter_map(|(k, m)| m.avg().map(|v| (k.clone(), v)))
            .collect()
    }

    /// Exponential moving averages of meters that received at least one value
    pub fn smooths(&self) -> BTreeMap<String, f64> {
        self.meters
            .iter()
            .filter_map(|(k, m)| m.smooth.map(|v| (k.clone(), v)))
            .collect()
    }

    /// Snapshot of every meter
    pub fn export(&self) -> BTreeMap<String, Meter> {
        self.meters.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_averages() {
        let mut stats = StatsMeter::new();
        stats.new_meter(["rec_loss", "reg"]);

        stats.update("rec_loss", 1.0).unwrap();
        stats.update("rec_loss", 3.0).unwrap();

        let avgs = stats.avgs();
        assert_eq!(avgs.get("rec_loss"), Some(&2.0));
        assert!(!avgs.contains_key("reg"));

        let smooth = stats.smooths()["rec_loss"];
        assert!((smooth - (0.99 * 1.0 + 0.01 * 3.0)).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_stat() {
        let mut stats = StatsMeter::new();
        assert!(matches!(stats.update("missing", 1.0), Err(Error::UnknownStat(_))));
    }

    #[test]
    fn test_reset_keeps_names() {
        let mut stats = StatsMeter::new();
        stats.new_meter(["imp"]);
        stats.update("imp", 4.0).unwrap();
        stats.reset();

        assert!(stats.contains("imp"));
        assert!(stats.avgs().is_empty());
        assert_eq!(stats.get("imp").unwrap().count, 0);
    }

    #[test]
    fn test_export_serializes() {
        let mut stats = StatsMeter::new();
        stats.new_meter(["error"]);
        stats.update("error", 0.25).unwrap();

        let json = serde_json::to_string(&stats.export()).unwrap();
        assert!(json.contains("\"error\""));
    }
}
