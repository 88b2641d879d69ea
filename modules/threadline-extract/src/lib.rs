pub mod annotate;
pub mod conversation;
pub mod linearize;
pub mod output;
pub mod pipeline;
pub mod retry;
pub mod scheduler;
pub mod sink;
pub mod task;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;

pub use pipeline::{run_extraction, RunReport, RunSettings};
pub use retry::RetryPolicy;
pub use scheduler::{ExtractionScheduler, SubjectOutcome};
pub use sink::{result_channel, RecordWriter, ResultSender, ResultSink, SinkReport};
pub use task::{extract_subject, TaskStats};
pub use traits::ReplyGraph;
