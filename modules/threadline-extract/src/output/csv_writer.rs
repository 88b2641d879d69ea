use std::fs::{self, File};
use std::path::Path;

use async_trait::async_trait;
use tracing::info;

use threadline_common::{ConversationRecord, Result, ThreadlineError};

use crate::sink::RecordWriter;

pub const CONVERSATIONS_FILE: &str = "conversations.csv";
pub const EDGES_FILE: &str = "conversation_edges.csv";

const CONVERSATION_HEADER: [&str; 5] = [":LABEL", ":ID(Conversation)", "subjectId", "start", "end"];
const EDGE_HEADER: [&str; 5] = [
    ":START_ID(Conversation)",
    ":END_ID(Tweet)",
    ":TYPE",
    "positionType:int",
    "sequenceIndex:int",
];

/// Writes neo4j-admin import files: one conversation row per record and one
/// PART_OF edge row per member. Both files are flushed after every record.
pub struct CsvRecordWriter {
    conversations: csv::Writer<File>,
    edges: csv::Writer<File>,
}

impl CsvRecordWriter {
    /// Create (or truncate) both files under `dir` and write their headers.
    pub fn create(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .map_err(|e| sink_err(format!("failed to create {}: {e}", dir.display())))?;

        let mut conversations = open(&dir.join(CONVERSATIONS_FILE))?;
        let mut edges = open(&dir.join(EDGES_FILE))?;
        conversations.write_record(CONVERSATION_HEADER).map_err(csv_err)?;
        edges.write_record(EDGE_HEADER).map_err(csv_err)?;
        conversations.flush().map_err(|e| sink_err(e.to_string()))?;
        edges.flush().map_err(|e| sink_err(e.to_string()))?;

        info!(dir = %dir.display(), "Writing conversation import files");
        Ok(Self {
            conversations,
            edges,
        })
    }
}

#[async_trait]
impl RecordWriter for CsvRecordWriter {
    async fn append(&mut self, record: &ConversationRecord) -> Result<()> {
        let key = record.key();

        for member in &record.members {
            let code = member.position.code().to_string();
            let index = member.sequence_index.to_string();
            self.edges
                .write_record([
                    key.as_str(),
                    member.post_id.as_str(),
                    "PART_OF",
                    code.as_str(),
                    index.as_str(),
                ])
                .map_err(csv_err)?;
        }
        self.edges.flush().map_err(|e| sink_err(e.to_string()))?;

        // The conversation row goes last so a reader never sees a conversation
        // whose edges are still missing.
        self.conversations
            .write_record([
                "Conversation",
                key.as_str(),
                record.subject_id.as_str(),
                record.started_at.as_deref().unwrap_or(""),
                record.ended_at.as_deref().unwrap_or(""),
            ])
            .map_err(csv_err)?;
        self.conversations
            .flush()
            .map_err(|e| sink_err(e.to_string()))?;

        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        self.edges.flush().map_err(|e| sink_err(e.to_string()))?;
        self.conversations
            .flush()
            .map_err(|e| sink_err(e.to_string()))?;
        Ok(())
    }
}

fn open(path: &Path) -> Result<csv::Writer<File>> {
    csv::Writer::from_path(path)
        .map_err(|e| sink_err(format!("failed to open {}: {e}", path.display())))
}

fn csv_err(e: csv::Error) -> ThreadlineError {
    sink_err(e.to_string())
}

fn sink_err(msg: String) -> ThreadlineError {
    ThreadlineError::Sink(msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use threadline_common::{AnnotatedConversation, PositionLabel};

    fn record(id: u64, subject: &str, posts: &[(&str, PositionLabel)]) -> ConversationRecord {
        ConversationRecord::from_annotated(
            id,
            AnnotatedConversation {
                subject_id: subject.to_string(),
                posts: posts.iter().map(|(p, l)| (p.to_string(), *l)).collect(),
                started_at: Some("Wed Oct 10 20:19:24 +0000 2018".to_string()),
                ended_at: None,
            },
        )
    }

    #[tokio::test]
    async fn writes_headers_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = CsvRecordWriter::create(dir.path()).unwrap();

        writer
            .append(&record(
                1,
                "22536055",
                &[
                    ("10", PositionLabel::Pre),
                    ("11", PositionLabel::Involved),
                    ("12", PositionLabel::Post),
                ],
            ))
            .await
            .unwrap();
        writer.finish().await.unwrap();

        let conversations = fs::read_to_string(dir.path().join(CONVERSATIONS_FILE)).unwrap();
        let lines: Vec<&str> = conversations.lines().collect();
        assert_eq!(lines[0], ":LABEL,:ID(Conversation),subjectId,start,end");
        assert_eq!(lines[1], "Conversation,c1,22536055,Wed Oct 10 20:19:24 +0000 2018,");

        let edges = fs::read_to_string(dir.path().join(EDGES_FILE)).unwrap();
        let lines: Vec<&str> = edges.lines().collect();
        assert_eq!(
            lines,
            vec![
                ":START_ID(Conversation),:END_ID(Tweet),:TYPE,positionType:int,sequenceIndex:int",
                "c1,10,PART_OF,1,0",
                "c1,11,PART_OF,0,1",
                "c1,12,PART_OF,2,2",
            ]
        );
    }

    #[tokio::test]
    async fn rows_are_visible_before_finish() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = CsvRecordWriter::create(dir.path()).unwrap();
        writer
            .append(&record(
                3,
                "s",
                &[("a", PositionLabel::Pre), ("b", PositionLabel::Involved), ("c", PositionLabel::Post)],
            ))
            .await
            .unwrap();

        let conversations = fs::read_to_string(dir.path().join(CONVERSATIONS_FILE)).unwrap();
        assert!(conversations.contains("Conversation,c3,s,"));
        drop(writer);
    }
}
