pub mod client;
pub mod types;

pub use client::AnalysisClient;
pub use types::{AnalysisRequest, AnalysisResult, Metric};

use std::future::Future;

use crate::error::AnalysisError;

/// Something that turns a frame into an analysis. The capture cycle only
/// depends on this; `AnalysisClient` is the HTTP implementation.
pub trait Analyzer: Send + Sync + 'static {
    fn analyze(
        &self,
        request: AnalysisRequest,
    ) -> impl Future<Output = Result<AnalysisResult, AnalysisError>> + Send;
}
