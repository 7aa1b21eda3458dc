//! Staleness-bounded telemetry aggregation.

use std::{collections::BTreeMap, time::Duration};

use remote_exec_core::{PeripheralKind, TelemetrySample, config::DEFAULT_STALENESS_WINDOW};

use crate::decode::{DecodeError, decode};

/// Folds per-port samples into a map of last-known readings.
///
/// Eviction is lazy: stale ports are only dropped when a newer sample
/// arrives on any port.
#[derive(Debug, Clone)]
pub struct TelemetryAggregator {
    window_ms: u64,
    samples: BTreeMap<String, TelemetrySample>,
}

impl Default for TelemetryAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_STALENESS_WINDOW)
    }
}

impl TelemetryAggregator {
    /// Create an empty aggregator with the given staleness window.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window_ms: u64::try_from(window.as_millis()).unwrap_or(u64::MAX),
            samples: BTreeMap::new(),
        }
    }

    /// Merge a sample and return the updated view.
    pub fn ingest(&mut self, sample: TelemetrySample) -> &BTreeMap<String, TelemetrySample> {
        let cutoff = sample.observed_at.saturating_sub(self.window_ms);
        self.samples.retain(|port, held| {
            let fresh = held.observed_at >= cutoff;
            if !fresh {
                tracing::trace!(port, observed_at = held.observed_at, "evicting stale sample");
            }
            fresh
        });
        self.samples.insert(sample.port.clone(), sample);
        &self.samples
    }

    /// Decode a raw reading and merge it.
    ///
    /// # Errors
    /// Returns error if the payload cannot be decoded; the view is unchanged.
    pub fn ingest_raw(
        &mut self,
        port: &str,
        kind: PeripheralKind,
        payload: &str,
        observed_at: u64,
    ) -> Result<&BTreeMap<String, TelemetrySample>, DecodeError> {
        let reading = decode(kind, payload)?;
        Ok(self.ingest(TelemetrySample::new(port, reading, observed_at)))
    }

    /// Current view.
    #[must_use]
    pub const fn peripherals(&self) -> &BTreeMap<String, TelemetrySample> {
        &self.samples
    }

    /// Copy of the current view, `None` when nothing has been received.
    #[must_use]
    pub fn snapshot(&self) -> Option<BTreeMap<String, TelemetrySample>> {
        (!self.samples.is_empty()).then(|| self.samples.clone())
    }
}
