pub mod csv_writer;

use async_trait::async_trait;

use threadline_common::{ConversationRecord, Result};
use threadline_graph::ConversationWriter;

use crate::sink::RecordWriter;

pub use csv_writer::{CsvRecordWriter, CONVERSATIONS_FILE, EDGES_FILE};

/// The destinations selectable from `[output] kind`.
pub enum OutputWriter {
    Csv(CsvRecordWriter),
    Graph(ConversationWriter),
}

#[async_trait]
impl RecordWriter for OutputWriter {
    async fn append(&mut self, record: &ConversationRecord) -> Result<()> {
        match self {
            OutputWriter::Csv(w) => w.append(record).await,
            OutputWriter::Graph(w) => w.append(record).await,
        }
    }

    async fn finish(&mut self) -> Result<()> {
        match self {
            OutputWriter::Csv(w) => w.finish().await,
            OutputWriter::Graph(w) => w.finish().await,
        }
    }
}
