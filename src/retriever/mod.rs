//! Retrievers
//!
//! A retriever turns a stream definition into records: it asks its
//! partition router for slices, then for each slice runs the
//! request → extract → paginate loop, feeding every emitted record to the
//! stream's cursor and closing the slice's partition once it is exhausted.
//!
//! - [`SimpleRetriever`] - one request loop per slice
//! - [`SubstreamRetriever`] - records nested in, or addressed by, parent records
//! - [`AsyncRetriever`] - slices are asynchronous export jobs

mod async_job;
mod simple;
mod substream;
mod types;

pub use async_job::{
    AsyncJobConfig, AsyncJobState, AsyncPartition, AsyncRetriever, HttpJobOrchestrator,
    JobHandle, JobOrchestrator, ASYNC_PARTITION_FIELD,
};
pub use simple::SimpleRetriever;
pub use substream::SubstreamRetriever;
pub use types::Retriever;
