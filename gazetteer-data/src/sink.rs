//! Destinations for candidate records emitted by the importers.

use std::convert::Infallible;
use std::error::Error;

use gazetteer_core::{CandidateRecord, IndexGateway, ReconcileError, ReconciliationDriver};

/// Boxed failure raised by a [`RecordSink`], carried inside parse errors.
pub type SinkError = Box<dyn Error + Send + Sync>;

/// Receiver of candidate records, one at a time.
pub trait RecordSink {
    /// Failure that stops the import.
    type Error: Error + Send + Sync + 'static;

    /// Accept one record.
    ///
    /// # Errors
    /// Returns the sink's error when the record cannot be handled; the
    /// importer stops and reports it.
    fn accept(&mut self, record: CandidateRecord) -> Result<(), Self::Error>;
}

impl RecordSink for Vec<CandidateRecord> {
    type Error = Infallible;

    fn accept(&mut self, record: CandidateRecord) -> Result<(), Self::Error> {
        self.push(record);
        Ok(())
    }
}

impl<G: IndexGateway + ?Sized> RecordSink for ReconciliationDriver<'_, G> {
    type Error = ReconcileError;

    fn accept(&mut self, record: CandidateRecord) -> Result<(), Self::Error> {
        self.process(record).map(|_| ())
    }
}

/// Forward `record` to `sink`, boxing any failure.
pub(crate) fn emit<S: RecordSink + ?Sized>(
    sink: &mut S,
    record: CandidateRecord,
) -> Result<(), SinkError> {
    sink.accept(record).map_err(|err| Box::new(err) as SinkError)
}
