use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{error, info};
use uuid::Uuid;

use threadline_common::{FileConfig, Result, Subject, ThreadlineError};

use crate::retry::RetryPolicy;
use crate::scheduler::{ExtractionScheduler, SubjectOutcome};
use crate::sink::{result_channel, RecordWriter, ResultSink, SinkReport};
use crate::traits::ReplyGraph;

/// Knobs for one extraction run.
#[derive(Debug, Clone, Copy)]
pub struct RunSettings {
    /// Identifies this run in logs, the report and graph conversation keys.
    pub run_id: Uuid,
    pub workers: usize,
    pub channel_capacity: usize,
    pub heartbeat: Duration,
    pub sink_join_timeout: Duration,
    pub retry: RetryPolicy,
}

impl From<&FileConfig> for RunSettings {
    fn from(config: &FileConfig) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            workers: config.extraction.workers,
            channel_capacity: config.extraction.channel_capacity,
            heartbeat: config.extraction.heartbeat(),
            sink_join_timeout: config.extraction.sink_join_timeout(),
            retry: RetryPolicy::from(&config.retry),
        }
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<SubjectOutcome>,
    pub sink: SinkReport,
}

impl RunReport {
    pub fn conversations_persisted(&self) -> u64 {
        self.sink.conversations
    }

    pub fn failed(&self) -> impl Iterator<Item = &SubjectOutcome> {
        self.outcomes.iter().filter(|o| !o.is_ok())
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed().next().is_none()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let elapsed = self.finished_at - self.started_at;
        let failed = self.failed().count();
        writeln!(
            f,
            "run {}: {} subjects ({} ok, {} failed), {} conversations persisted in {}s",
            self.run_id,
            self.outcomes.len(),
            self.outcomes.len() - failed,
            failed,
            self.sink.conversations,
            elapsed.num_seconds(),
        )?;
        for outcome in &self.outcomes {
            match &outcome.result {
                Ok(stats) => writeln!(f, "  {}: {}", outcome.subject, stats)?,
                Err(reason) => writeln!(f, "  {}: FAILED: {}", outcome.subject, reason)?,
            }
        }
        Ok(())
    }
}

/// Extract every subject and persist the results through `writer`.
///
/// Subject failures are reported in the returned [`RunReport`]. Only sink
/// failures (a write error, or the sink not draining within
/// `sink_join_timeout`) fail the run itself.
pub async fn run_extraction<W>(
    graph: Arc<dyn ReplyGraph>,
    writer: W,
    subjects: Vec<Subject>,
    settings: RunSettings,
) -> Result<RunReport>
where
    W: RecordWriter + 'static,
{
    let run_id = settings.run_id;
    let started_at = Utc::now();
    info!(%run_id, subjects = subjects.len(), "Extraction run starting");

    let (results, rx) = result_channel(settings.channel_capacity);
    let sink = tokio::spawn(ResultSink::new(rx, writer, settings.heartbeat).run());

    let scheduler = ExtractionScheduler::new(graph, settings.workers, settings.retry);
    let outcomes = scheduler.run(subjects, results).await;

    let sink = match tokio::time::timeout(settings.sink_join_timeout, sink).await {
        Ok(Ok(Ok(report))) => report,
        Ok(Ok(Err(e))) => {
            error!(%run_id, error = %e, "Sink failed");
            return Err(e);
        }
        Ok(Err(join_err)) => {
            error!(%run_id, error = %join_err, "Sink task aborted");
            return Err(ThreadlineError::Sink(format!("sink task aborted: {join_err}")));
        }
        Err(_) => {
            error!(%run_id, timeout = ?settings.sink_join_timeout, "Sink did not finish in time");
            return Err(ThreadlineError::SinkTimeout(settings.sink_join_timeout));
        }
    };

    let report = RunReport {
        run_id,
        started_at,
        finished_at: Utc::now(),
        outcomes,
        sink,
    };
    info!(
        %run_id,
        conversations = report.conversations_persisted(),
        failed = report.failed().count(),
        "Extraction run finished"
    );
    Ok(report)
}
