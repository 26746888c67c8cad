//! Background recomputation of comparison tables.
//!
//! ```text
//! ┌──────────┐  request(params)   ┌────────────────────┐
//! │  caller  │ ─────────────────▶ │ selection-N thread │  compare(...)
//! │          │ ◀── bounded(1) ─── │                    │
//! └──────────┘   poll() / wait()  └────────────────────┘
//! ```
//!
//! Only the receiver of the latest request is kept. Superseded threads finish
//! their work and their send fails silently, so a burst of requests coalesces
//! into the last one.

use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, Receiver, TryRecvError};

use crate::aggregate::{compare, ComparisonTable, SelectionParams};
use crate::data::model::ObservationTable;
use crate::error::EngineResult;
use crate::stats::ReducerConfig;

struct Pending {
    generation: u64,
    receiver: Receiver<EngineResult<ComparisonTable>>,
}

/// Runs [`compare`] off the calling thread.
pub struct SelectionWorker {
    table: Arc<ObservationTable>,
    generation: u64,
    pending: Option<Pending>,
}

impl SelectionWorker {
    pub fn new(table: Arc<ObservationTable>) -> Self {
        Self {
            table,
            generation: 0,
            pending: None,
        }
    }

    /// Start computing a comparison; supersedes any request still in flight.
    ///
    /// Returns the generation number of the new request.
    pub fn request(
        &mut self,
        params: SelectionParams,
        config: ReducerConfig,
    ) -> std::io::Result<u64> {
        self.generation += 1;
        let generation = self.generation;
        let (sender, receiver) = bounded(1);
        let table = Arc::clone(&self.table);

        thread::Builder::new()
            .name(format!("selection-{generation}"))
            .spawn(move || {
                let result = compare(&table, &params, &config);
                if sender.send(result).is_err() {
                    log::debug!("selection {generation} superseded, result discarded");
                }
            })?;

        if let Some(previous) = self.pending.replace(Pending {
            generation,
            receiver,
        }) {
            log::debug!(
                "selection {} superseded by {generation}",
                previous.generation
            );
        }
        Ok(generation)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Generation of the request currently in flight.
    pub fn pending_generation(&self) -> Option<u64> {
        self.pending.as_ref().map(|p| p.generation)
    }

    /// Non-blocking: the latest request's result once it is ready.
    pub fn poll(&mut self) -> Option<EngineResult<ComparisonTable>> {
        let pending = self.pending.as_ref()?;
        match pending.receiver.try_recv() {
            Ok(result) => {
                self.pending = None;
                Some(result)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                log::error!("selection {} worker exited without a result", pending.generation);
                self.pending = None;
                None
            }
        }
    }

    /// Block until the latest request completes. `None` if nothing is in flight
    /// or the worker thread died.
    pub fn wait(&mut self) -> Option<EngineResult<ComparisonTable>> {
        let pending = self.pending.take()?;
        match pending.receiver.recv() {
            Ok(result) => Some(result),
            Err(_) => {
                log::error!("selection {} worker exited without a result", pending.generation);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::filter::ObservationFilter;
    use crate::data::model::{MeasurementType, Observation, Schema, TypeSelector};

    fn table() -> Arc<ObservationTable> {
        let obs = |m: &str, a: &str, t: f64| Observation {
            material: m.into(),
            adsorbate: a.into(),
            measurement_type: MeasurementType::Experimental,
            temperature: t,
            isotherm: None,
            values: vec![1.0],
        };
        Arc::new(
            ObservationTable::new(
                Schema::classify(["kH"], "kH"),
                vec![
                    obs("M1", "CO2", 303.0),
                    obs("M1", "N2", 303.0),
                    obs("M2", "CO2", 77.0),
                    obs("M2", "N2", 77.0),
                ],
            )
            .unwrap(),
        )
    }

    fn params(t: f64) -> SelectionParams {
        SelectionParams {
            adsorbate_x: "CO2".into(),
            adsorbate_y: "N2".into(),
            filter: ObservationFilter::new(TypeSelector::All, t, 1.0),
        }
    }

    #[test]
    fn wait_returns_latest_request() {
        let mut worker = SelectionWorker::new(table());
        worker.request(params(303.0), ReducerConfig::default()).unwrap();
        let gen = worker.request(params(77.0), ReducerConfig::default()).unwrap();
        assert_eq!(gen, 2);
        assert_eq!(worker.pending_generation(), Some(2));

        let table = worker.wait().unwrap().unwrap();
        assert_eq!(table.materials().collect::<Vec<_>>(), vec!["M2"]);
        assert!(!worker.is_pending());
        assert!(worker.wait().is_none());
    }

    #[test]
    fn poll_eventually_delivers() {
        let mut worker = SelectionWorker::new(table());
        worker.request(params(303.0), ReducerConfig::default()).unwrap();
        let result = loop {
            if let Some(r) = worker.poll() {
                break r;
            }
            thread::yield_now();
        };
        assert_eq!(result.unwrap().materials().collect::<Vec<_>>(), vec!["M1"]);
        assert!(worker.poll().is_none());
    }

    #[test]
    fn errors_are_delivered() {
        let mut worker = SelectionWorker::new(table());
        let mut bad = params(303.0);
        bad.filter.tolerance = -1.0;
        worker.request(bad, ReducerConfig::default()).unwrap();
        assert!(worker.wait().unwrap().is_err());
    }
}
