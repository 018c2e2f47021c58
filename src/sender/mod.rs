pub mod error;
pub mod http;

pub use error::SinkError;
pub use http::{HttpSink, SinkConfig, SinkStats, SinkStatsSnapshot};

use crate::domain::ErrorRecord;
use std::future::Future;
use std::sync::Arc;

/// Remote append-only destination for error records.
///
/// `submit` resolves to `Ok` only when the whole batch was accepted. Any
/// error means none of it should be considered delivered.
pub trait ErrorSink: Send + Sync + 'static {
    fn submit(
        &self,
        batch: &[Arc<ErrorRecord>],
    ) -> impl Future<Output = Result<(), SinkError>> + Send;
}

impl<S: ErrorSink> ErrorSink for Arc<S> {
    fn submit(
        &self,
        batch: &[Arc<ErrorRecord>],
    ) -> impl Future<Output = Result<(), SinkError>> + Send {
        self.as_ref().submit(batch)
    }
}
