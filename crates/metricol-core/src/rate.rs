//! Counter-to-rate conversion.
//!
//! Every input that exposes monotonically increasing totals owns one
//! [`RateTracker`] and passes it into its metric extraction explicitly. The
//! first observation of a key only records a baseline; later observations
//! yield `current - previous`.

use std::collections::HashMap;

use crate::record::MetricValue;

/// What to emit when a counter goes backwards (restart, wraparound).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResetPolicy {
    /// Emit zero.
    #[default]
    Clamp,
    /// Emit nothing for this interval; the new value becomes the baseline.
    Skip,
    /// Emit the negative delta unchanged.
    PassThrough,
}

/// Last raw value seen per counter key. Never shared between workers.
#[derive(Debug, Default)]
pub struct RateTracker {
    previous: HashMap<String, MetricValue>,
}

impl RateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `current` for `key` and return the delta since the previous
    /// observation, if there is one to emit.
    ///
    /// Text values are never tracked. A key that changes between integer
    /// and float representation diffs as float.
    pub fn observe(
        &mut self,
        key: &str,
        current: &MetricValue,
        policy: ResetPolicy,
    ) -> Option<MetricValue> {
        if !current.is_numeric() {
            return None;
        }
        let previous = self.previous.insert(key.to_string(), current.clone())?;
        let delta = match (&previous, current) {
            (MetricValue::Int(p), MetricValue::Int(c)) => MetricValue::Int(c.wrapping_sub(*p)),
            (p, c) => MetricValue::Float(as_f64(c)? - as_f64(p)?),
        };

        if !is_negative(&delta) {
            return Some(delta);
        }
        match policy {
            ResetPolicy::Clamp => Some(match delta {
                MetricValue::Float(_) => MetricValue::Float(0.0),
                _ => MetricValue::Int(0),
            }),
            ResetPolicy::Skip => None,
            ResetPolicy::PassThrough => Some(delta),
        }
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.previous.len()
    }

    pub fn is_empty(&self) -> bool {
        self.previous.is_empty()
    }
}

fn as_f64(v: &MetricValue) -> Option<f64> {
    match v {
        MetricValue::Int(i) => Some(*i as f64),
        MetricValue::Float(f) => Some(*f),
        MetricValue::Text(_) => None,
    }
}

fn is_negative(v: &MetricValue) -> bool {
    match v {
        MetricValue::Int(i) => *i < 0,
        MetricValue::Float(f) => *f < 0.0,
        MetricValue::Text(_) => false,
    }
}
