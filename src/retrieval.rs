//! The retrieval loop: stations one at a time, windows in order, every
//! per-window failure logged and skipped.

use std::path::PathBuf;

use crate::client::WaveformSource;
use crate::condition::SignalConditioner;
use crate::config::RequestSpec;
use crate::error::{RunError, SegmentError};
use crate::imprint::imprint;
use crate::inventory::{Station, StationInventory};
use crate::persist::TraceWriter;
use crate::quality::{self, QualityVerdict};
use crate::segment::{SegmentClock, SegmentWindow};

/// Result of one (station, window) attempt.
#[derive(Debug)]
pub enum SegmentOutcome {
    /// Every trace of the batch was written, in this order.
    Persisted(Vec<PathBuf>),
    Failed(SegmentError),
}

impl SegmentOutcome {
    pub fn is_persisted(&self) -> bool {
        matches!(self, SegmentOutcome::Persisted(_))
    }
}

pub struct Retriever<S, W> {
    spec: RequestSpec,
    source: S,
    writer: W,
    conditioner: Option<SignalConditioner>,
}

impl<S: WaveformSource, W: TraceWriter> Retriever<S, W> {
    pub fn new(spec: RequestSpec, source: S, writer: W) -> Self {
        let conditioner = spec
            .preprocess
            .then(|| SignalConditioner::new(spec.filter_resample));
        Self {
            spec,
            source,
            writer,
            conditioner,
        }
    }

    pub fn spec(&self) -> &RequestSpec {
        &self.spec
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    pub fn into_parts(self) -> (S, W) {
        (self.source, self.writer)
    }

    /// Validates the request, fetches the inventory once and walks every
    /// station through every window. Only configuration and inventory
    /// failures end the run early.
    pub fn run(&mut self) -> Result<(), RunError> {
        self.spec.validate()?;

        log::info!("requesting station inventory");
        let inventory = self
            .source
            .list_stations(&self.spec)
            .map_err(RunError::Inventory)?;

        for station in inventory.stations() {
            let clock = SegmentClock::new(
                self.spec.start_time,
                self.spec.end_time,
                self.spec.segment_length(),
            );
            for window in clock {
                match self.process_segment(station, &window, &inventory) {
                    SegmentOutcome::Persisted(paths) => {
                        log::info!(
                            "{}.{} {}: wrote {} traces",
                            station.network,
                            station.code,
                            window,
                            paths.len()
                        );
                    }
                    SegmentOutcome::Failed(e) => {
                        log::warn!("{}.{} {}: {}, continuing", station.network, station.code, window, e);
                    }
                }
            }
        }
        log::info!("done");
        Ok(())
    }

    /// fetch -> quality gate -> channel count -> imprint -> condition -> persist
    pub fn process_segment(
        &mut self,
        station: &Station,
        window: &SegmentWindow,
        inventory: &StationInventory,
    ) -> SegmentOutcome {
        match self.try_segment(station, window, inventory) {
            Ok(paths) => SegmentOutcome::Persisted(paths),
            Err(e) => SegmentOutcome::Failed(e),
        }
    }

    fn try_segment(
        &mut self,
        station: &Station,
        window: &SegmentWindow,
        inventory: &StationInventory,
    ) -> Result<Vec<PathBuf>, SegmentError> {
        log::info!("fetching waveforms @{}: {}", station.code, window);
        let mut batch = self
            .source
            .fetch_waveforms(
                &station.network,
                &station.code,
                &self.spec.location,
                &self.spec.channels,
                window,
            )
            .map_err(SegmentError::Fetch)?;

        // the gate runs first, it is the one check that copes with empty batches
        if let QualityVerdict::Reject(reason) =
            quality::evaluate(&batch, self.spec.strict_length, self.spec.segment_duration)
        {
            return Err(SegmentError::Rejected(reason));
        }

        let found = batch.channel_codes().len();
        if found != self.spec.channel_count {
            return Err(SegmentError::ChannelCountMismatch {
                expected: self.spec.channel_count,
                found,
            });
        }

        for trace in batch.iter_mut() {
            imprint(trace, inventory);
        }

        if let Some(conditioner) = &self.conditioner {
            for trace in batch.iter_mut() {
                conditioner.condition(trace)?;
            }
        }

        let mut paths = Vec::with_capacity(batch.len());
        for trace in batch.iter() {
            let path = self
                .writer
                .write(trace, &self.spec.file_name_format, &self.spec.output_dir)
                .map_err(|reason| SegmentError::Persist {
                    id: trace.id.clone(),
                    reason,
                })?;
            paths.push(path);
        }
        Ok(paths)
    }
}
