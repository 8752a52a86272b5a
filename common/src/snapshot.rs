//! Exchange-rate snapshots.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::CurrencyCode;

/// As of `timestamp`, 1 unit of `base` equals `rates[target]` units of `target`.
///
/// The base never appears among the targets and every rate is positive and finite.
/// Snapshots are immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSnapshot")]
pub struct RateSnapshot {
    base: CurrencyCode,
    rates: HashMap<CurrencyCode, f64>,
    timestamp: DateTime<Utc>,
}

/// Wire form of a snapshot, checked by `RateSnapshot::new` on the way in.
#[derive(Deserialize)]
struct RawSnapshot {
    base: CurrencyCode,
    rates: HashMap<CurrencyCode, f64>,
    timestamp: DateTime<Utc>,
}

impl TryFrom<RawSnapshot> for RateSnapshot {
    type Error = ValidationError;

    fn try_from(raw: RawSnapshot) -> Result<Self, Self::Error> {
        Self::new(raw.base, raw.rates, raw.timestamp)
    }
}

impl RateSnapshot {
    /// Build a snapshot, enforcing the rate invariants.
    pub fn new(
        base: CurrencyCode,
        rates: HashMap<CurrencyCode, f64>,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        if rates.contains_key(&base) {
            return Err(ValidationError::BaseInRates(base));
        }
        if let Some((target, rate)) = rates.iter().find(|(_, r)| !(r.is_finite() && **r > 0.0)) {
            return Err(ValidationError::InvalidRate {
                base: base.clone(),
                target: target.clone(),
                rate: *rate,
            });
        }

        Ok(Self {
            base,
            rates,
            timestamp,
        })
    }

    /// Snapshot holding a single pair.
    pub fn single(
        base: CurrencyCode,
        target: CurrencyCode,
        rate: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        if base == target {
            return Err(ValidationError::SameCurrency(base));
        }
        Self::new(base, HashMap::from([(target, rate)]), timestamp)
    }

    pub fn base(&self) -> &CurrencyCode {
        &self.base
    }

    pub fn rates(&self) -> &HashMap<CurrencyCode, f64> {
        &self.rates
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Rate from base to `target`, if present.
    pub fn rate(&self, target: &CurrencyCode) -> Option<f64> {
        self.rates.get(target).copied()
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// The only target when the snapshot holds exactly one rate.
    pub fn sole_target(&self) -> Option<&CurrencyCode> {
        if self.rates.len() == 1 {
            self.rates.keys().next()
        } else {
            None
        }
    }

    /// Derive the `other → base` rate from this snapshot's `base → other` rate.
    ///
    /// The result is a single-pair snapshot keyed on `other`, carrying this snapshot's
    /// timestamp. The rate is `1 / stored` with no rounding.
    pub fn reciprocal(&self, other: &CurrencyCode) -> Option<RateSnapshot> {
        let stored = self.rate(other)?;
        Some(RateSnapshot {
            base: other.clone(),
            rates: HashMap::from([(self.base.clone(), 1.0 / stored)]),
            timestamp: self.timestamp,
        })
    }

    /// Narrow to one target, keeping base and timestamp.
    pub fn extract(&self, target: &CurrencyCode) -> Option<RateSnapshot> {
        let rate = self.rate(target)?;
        Some(RateSnapshot {
            base: self.base.clone(),
            rates: HashMap::from([(target.clone(), rate)]),
            timestamp: self.timestamp,
        })
    }

    /// One single-pair snapshot per target.
    pub fn split(&self) -> Vec<RateSnapshot> {
        self.rates
            .iter()
            .map(|(target, rate)| RateSnapshot {
                base: self.base.clone(),
                rates: HashMap::from([(target.clone(), *rate)]),
                timestamp: self.timestamp,
            })
            .collect()
    }

    /// Merge the rates of another snapshot with the same base.
    ///
    /// The merged timestamp is the older of the two, so the result never claims to be
    /// fresher than any rate it holds.
    pub fn merge(mut self, other: RateSnapshot) -> RateSnapshot {
        debug_assert_eq!(self.base, other.base);
        self.timestamp = self.timestamp.min(other.timestamp);
        self.rates.extend(other.rates);
        self
    }
}
