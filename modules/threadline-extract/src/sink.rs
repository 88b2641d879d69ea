//! Single consumer of extracted conversations.
//!
//! Workers hold a [`ResultSender`]; the sink owns the receiving end and the
//! conversation id counter. The stream ends when every sender has been
//! dropped, which the scheduler arranges once all tasks are finished.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info};

use threadline_common::{AnnotatedConversation, ConversationRecord, Result, ThreadlineError};

/// Append-only destination for finished conversation records.
#[async_trait]
pub trait RecordWriter: Send {
    /// Durably append one record (conversation row plus one row per member).
    async fn append(&mut self, record: &ConversationRecord) -> Result<()>;

    /// Called once after the last record.
    async fn finish(&mut self) -> Result<()>;
}

/// Producer handle given to extraction tasks.
#[derive(Clone)]
pub struct ResultSender {
    tx: mpsc::Sender<AnnotatedConversation>,
}

impl ResultSender {
    /// Hand a conversation to the sink. Waits while the channel is full.
    pub async fn send(&self, conversation: AnnotatedConversation) -> Result<()> {
        self.tx
            .send(conversation)
            .await
            .map_err(|_| ThreadlineError::ChannelClosed)
    }
}

/// Bounded worker -> sink channel.
pub fn result_channel(capacity: usize) -> (ResultSender, mpsc::Receiver<AnnotatedConversation>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (ResultSender { tx }, rx)
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SinkReport {
    pub conversations: u64,
    pub members: u64,
    pub heartbeats: u64,
}

pub struct ResultSink<W: RecordWriter> {
    rx: mpsc::Receiver<AnnotatedConversation>,
    writer: W,
    next_id: u64,
    heartbeat: Duration,
    report: SinkReport,
}

impl<W: RecordWriter> ResultSink<W> {
    pub fn new(rx: mpsc::Receiver<AnnotatedConversation>, writer: W, heartbeat: Duration) -> Self {
        Self {
            rx,
            writer,
            next_id: 1,
            heartbeat,
            report: SinkReport::default(),
        }
    }

    /// Assign the next id to a conversation and persist it. Returns the id.
    pub async fn emit(&mut self, conversation: AnnotatedConversation) -> Result<u64> {
        let id = self.next_id;
        let record = ConversationRecord::from_annotated(id, conversation);
        self.writer.append(&record).await?;
        self.next_id += 1;

        self.report.conversations += 1;
        self.report.members += record.members.len() as u64;
        debug!(
            conversation_id = id,
            subject = record.subject_id.as_str(),
            members = record.members.len(),
            "Conversation persisted"
        );
        Ok(id)
    }

    /// Drain the channel until every producer is gone, then finish the writer.
    pub async fn run(mut self) -> Result<SinkReport> {
        loop {
            match tokio::time::timeout(self.heartbeat, self.rx.recv()).await {
                Ok(Some(conversation)) => {
                    self.emit(conversation).await?;
                }
                Ok(None) => break,
                Err(_) => {
                    self.report.heartbeats += 1;
                    info!(
                        persisted = self.report.conversations,
                        "Sink waiting for conversations"
                    );
                }
            }
        }

        self.writer.finish().await?;
        info!(
            conversations = self.report.conversations,
            members = self.report.members,
            "Sink drained"
        );
        Ok(self.report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{involved_conversation, MemoryWriter};

    #[tokio::test]
    async fn ids_start_at_one_and_follow_arrival_order() {
        let (tx, rx) = result_channel(4);
        let writer = MemoryWriter::new();
        let sink = tokio::spawn(ResultSink::new(rx, writer.clone(), Duration::from_secs(5)).run());

        tx.send(involved_conversation("s1", &["a", "b", "c"])).await.unwrap();
        tx.send(involved_conversation("s2", &["x", "y", "z", "w"])).await.unwrap();
        drop(tx);

        let report = sink.await.unwrap().unwrap();
        assert_eq!(report.conversations, 2);
        assert_eq!(report.members, 7);

        let records = writer.records();
        let ids: Vec<u64> = records.iter().map(|r| r.conversation_id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(records[1].subject_id, "s2");
        assert!(writer.is_finished());
    }

    #[tokio::test]
    async fn ends_only_when_every_sender_is_gone() {
        let (tx, rx) = result_channel(1);
        let other = tx.clone();
        let writer = MemoryWriter::new();
        let sink = tokio::spawn(ResultSink::new(rx, writer.clone(), Duration::from_millis(20)).run());

        drop(tx);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!sink.is_finished());

        other.send(involved_conversation("s", &["a", "b", "c"])).await.unwrap();
        drop(other);

        let report = sink.await.unwrap().unwrap();
        assert_eq!(report.conversations, 1);
        assert!(report.heartbeats >= 1);
    }

    #[tokio::test]
    async fn write_failure_stops_the_sink() {
        let (tx, rx) = result_channel(4);
        let writer = MemoryWriter::new().failing_after(1);
        let sink = tokio::spawn(ResultSink::new(rx, writer.clone(), Duration::from_secs(5)).run());

        tx.send(involved_conversation("s", &["a", "b", "c"])).await.unwrap();
        tx.send(involved_conversation("s", &["d", "e", "f"])).await.unwrap();

        let err = sink.await.unwrap().unwrap_err();
        assert!(matches!(err, ThreadlineError::Sink(_)));
        assert_eq!(writer.records().len(), 1);
        assert!(!writer.is_finished());

        // The receiver is gone, so producers see the closed channel.
        let err = tx
            .send(involved_conversation("s", &["g", "h", "i"]))
            .await
            .unwrap_err();
        assert!(matches!(err, ThreadlineError::ChannelClosed));
    }

    #[tokio::test]
    async fn failed_append_does_not_consume_an_id() {
        let (_tx, rx) = result_channel(1);
        let mut sink = ResultSink::new(rx, MemoryWriter::new().failing_after(0), Duration::from_secs(1));
        assert!(sink.emit(involved_conversation("s", &["a", "b", "c"])).await.is_err());
        assert_eq!(sink.next_id, 1);
    }
}
