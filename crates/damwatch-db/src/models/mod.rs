//! Database models for the acquisition pipeline.

pub mod acquisition_job;
pub mod instrument;
pub mod instrument_reading;

pub use acquisition_job::{
    AcquisitionJob, CreateAcquisitionJob, JobStatus, ERROR_MESSAGE_MAX_LEN, MAX_RETRIES,
};
pub use instrument::Instrument;
pub use instrument_reading::{InstrumentReading, NewInstrumentReading};
