use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{error, info, info_span, Instrument};

use threadline_common::Subject;

use crate::retry::RetryPolicy;
use crate::sink::ResultSender;
use crate::task::{extract_subject, TaskStats};
use crate::traits::ReplyGraph;

/// How one subject's extraction ended.
#[derive(Debug, Clone)]
pub struct SubjectOutcome {
    pub subject: Subject,
    pub result: Result<TaskStats, String>,
}

impl SubjectOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Runs one extraction task per subject with at most `workers` in flight.
pub struct ExtractionScheduler {
    graph: Arc<dyn ReplyGraph>,
    workers: usize,
    retry: RetryPolicy,
}

impl ExtractionScheduler {
    pub fn new(graph: Arc<dyn ReplyGraph>, workers: usize, retry: RetryPolicy) -> Self {
        Self {
            graph,
            workers: workers.max(1),
            retry,
        }
    }

    /// Run every subject to completion. Consumes `results`: once this returns,
    /// no sender remains and the sink sees the end of the stream.
    ///
    /// Each task runs on its own tokio task, so a panic or error in one subject
    /// is recorded against that subject and never reaches its siblings.
    pub async fn run(&self, subjects: Vec<Subject>, results: ResultSender) -> Vec<SubjectOutcome> {
        info!(subjects = subjects.len(), workers = self.workers, "Scheduling extraction");

        let outcomes: Vec<SubjectOutcome> = stream::iter(subjects.into_iter().map(|subject| {
            let graph = Arc::clone(&self.graph);
            let retry = self.retry;
            let results = results.clone();
            let span = info_span!("subject", subject = subject.id.as_str());
            let task_subject = subject.clone();

            async move {
                let handle = tokio::spawn(
                    async move {
                        extract_subject(graph.as_ref(), &task_subject, &retry, &results).await
                    }
                    .instrument(span),
                );

                let result = match handle.await {
                    Ok(Ok(stats)) => Ok(stats),
                    Ok(Err(e)) => {
                        error!(subject = subject.id.as_str(), error = %e, "Subject extraction failed");
                        Err(e.to_string())
                    }
                    Err(join_err) => {
                        error!(subject = subject.id.as_str(), error = %join_err, "Subject task panicked");
                        Err(format!("task aborted: {join_err}"))
                    }
                };
                SubjectOutcome { subject, result }
            }
        }))
        .buffer_unordered(self.workers)
        .collect()
        .await;

        drop(results);

        let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
        info!(
            succeeded = outcomes.len() - failed,
            failed,
            "All subject tasks finished"
        );
        outcomes
    }
}
