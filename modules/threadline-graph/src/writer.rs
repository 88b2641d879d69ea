use neo4rs::{query, BoltInteger, BoltMap, BoltString, BoltType};
use tracing::debug;

use threadline_common::{ConversationMember, ConversationRecord};

use crate::GraphClient;

/// Persists conversation records as `Conversation` nodes linked to their tweets.
///
/// Record ids restart at 1 every run, so the node key is qualified with the
/// run id: `<run_id>/c<N>`. Conversations from earlier runs are never touched.
pub struct ConversationWriter {
    client: GraphClient,
    run_id: String,
}

impl ConversationWriter {
    pub fn new(client: GraphClient, run_id: impl Into<String>) -> Self {
        Self {
            client,
            run_id: run_id.into(),
        }
    }

    /// Graph key of `record` within this writer's run.
    pub fn node_key(&self, record: &ConversationRecord) -> String {
        format!("{}/{}", self.run_id, record.key())
    }

    /// Write one conversation and all of its PART_OF edges in a single statement.
    /// MERGE keeps a replayed record from producing duplicates.
    pub async fn write(&self, record: &ConversationRecord) -> Result<(), neo4rs::Error> {
        let members: Vec<BoltType> = record.members.iter().map(member_to_bolt).collect();

        let q = query(
            "MERGE (c:Conversation {conversationId: $conversation_id})
             SET c.runId = $run_id,
                 c.subjectId = $subject_id,
                 c.start = $start,
                 c.end = $end
             WITH c
             UNWIND $members AS member
             MATCH (t:Tweet {tweetId: member.post_id})
             MERGE (c)-[r:PART_OF]->(t)
             SET r.positionType = member.position_type,
                 r.position = member.position,
                 r.sequenceIndex = member.sequence_index",
        )
        .param("conversation_id", self.node_key(record))
        .param("run_id", self.run_id.as_str())
        .param("subject_id", record.subject_id.as_str())
        .param("start", record.started_at.clone())
        .param("end", record.ended_at.clone())
        .param("members", members);

        self.client.inner().run(q).await?;
        debug!(
            run_id = %self.run_id,
            conversation_id = record.conversation_id,
            members = record.members.len(),
            "Conversation written to graph"
        );
        Ok(())
    }
}

fn member_to_bolt(member: &ConversationMember) -> BoltType {
    BoltType::Map(BoltMap::from_iter(vec![
        (
            BoltString::from("post_id"),
            BoltType::String(BoltString::from(member.post_id.as_str())),
        ),
        (
            BoltString::from("position_type"),
            BoltType::Integer(BoltInteger::new(member.position.code())),
        ),
        (
            BoltString::from("position"),
            BoltType::String(BoltString::from(member.position.as_str())),
        ),
        (
            BoltString::from("sequence_index"),
            BoltType::Integer(BoltInteger::new(member.sequence_index as i64)),
        ),
    ]))
}
