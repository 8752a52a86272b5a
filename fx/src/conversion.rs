//! Currency conversion types.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use fxgate_common::{CurrencyCode, RateSnapshot, ValidationError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request to convert an amount from one currency into several.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionRequest {
    /// Currency to convert from, as supplied by the caller.
    pub base: String,
    /// Currencies to convert to, as supplied by the caller.
    pub targets: Vec<String>,
    /// Amount of `base` to convert.
    pub amount: f64,
}

impl ConversionRequest {
    /// Create a new conversion request.
    pub fn new<S: Into<String>>(base: impl Into<String>, targets: Vec<S>, amount: f64) -> Self {
        Self {
            base: base.into(),
            targets: targets.into_iter().map(Into::into).collect(),
            amount,
        }
    }

    /// Check the request shape without touching any cache, registry or upstream.
    ///
    /// Returns the parsed base and the de-duplicated targets in request order.
    pub fn validate(&self) -> Result<(CurrencyCode, Vec<CurrencyCode>), ValidationError> {
        if !(self.amount.is_finite() && self.amount > 0.0) {
            return Err(ValidationError::NonPositiveAmount(self.amount));
        }
        if self.targets.is_empty() {
            return Err(ValidationError::NoTargets);
        }

        let base = CurrencyCode::parse(&self.base)?;
        let mut seen = BTreeSet::new();
        let mut targets = Vec::with_capacity(self.targets.len());
        for raw in &self.targets {
            let target = CurrencyCode::parse(raw)?;
            if target == base {
                return Err(ValidationError::SameCurrency(base));
            }
            if seen.insert(target.clone()) {
                targets.push(target);
            }
        }

        Ok((base, targets))
    }
}

/// A completed conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversion {
    /// Unique conversion ID.
    pub id: Uuid,
    /// Currency converted from.
    pub base: CurrencyCode,
    /// Amount of `base` converted.
    pub amount: f64,
    /// Converted amount per target.
    pub conversions: BTreeMap<CurrencyCode, f64>,
    /// Rate used per target.
    pub rates: BTreeMap<CurrencyCode, f64>,
    /// Observation time of the oldest rate used.
    pub observed_at: DateTime<Utc>,
    /// When the conversion was executed.
    pub executed_at: DateTime<Utc>,
}

impl Conversion {
    /// Convert `amount` of the snapshot's base with every rate it holds.
    pub fn from_snapshot(amount: f64, snapshot: &RateSnapshot) -> Self {
        let rates: BTreeMap<_, _> = snapshot
            .rates()
            .iter()
            .map(|(target, rate)| (target.clone(), *rate))
            .collect();
        let conversions = rates
            .iter()
            .map(|(target, rate)| (target.clone(), amount * rate))
            .collect();

        Self {
            id: Uuid::now_v7(),
            base: snapshot.base().clone(),
            amount,
            conversions,
            rates,
            observed_at: snapshot.timestamp(),
            executed_at: Utc::now(),
        }
    }

    /// Converted amount for `target`.
    pub fn converted(&self, target: &CurrencyCode) -> Option<f64> {
        self.conversions.get(target).copied()
    }
}
