// Trait abstractions for the extraction pipeline's external collaborators.
//
// ReplyGraph: everything a subject task needs from the graph store.
// RecordWriter (see sink.rs): where the sink appends finished records.
//
// MockReplyGraph and MemoryWriter in `testing` implement both without a
// database, so task/scheduler/sink behaviour is testable in-process.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;

use threadline_common::{ComponentId, ConversationRecord, PostId, Result, ThreadlineError};
use threadline_graph::{ConversationWriter, ReplyGraphReader};

use crate::sink::RecordWriter;

#[async_trait]
pub trait ReplyGraph: Send + Sync {
    /// Create the named server-side scope used for component computation,
    /// replacing any stale scope of the same name.
    async fn acquire_scope(&self, name: &str) -> Result<()>;

    /// Tear down the named scope. Succeeds when it does not exist.
    async fn release_scope(&self, name: &str) -> Result<()>;

    /// Component id for every post, computed inside the named scope.
    async fn components(&self, scope: &str) -> Result<Vec<(PostId, ComponentId)>>;

    /// Ids of every post authored by the subject.
    async fn subject_posts(&self, subject_id: &str) -> Result<HashSet<PostId>>;

    /// Direct repliers of each post, restricted to `post_ids`.
    async fn children_of(&self, post_ids: &[PostId]) -> Result<HashMap<PostId, Vec<PostId>>>;

    /// Creation timestamps for the given posts; posts without one are absent.
    async fn created_at(&self, post_ids: &[PostId]) -> Result<HashMap<PostId, String>>;
}

fn backend(e: neo4rs::Error) -> ThreadlineError {
    ThreadlineError::Backend(e.to_string())
}

#[async_trait]
impl ReplyGraph for ReplyGraphReader {
    async fn acquire_scope(&self, name: &str) -> Result<()> {
        self.project(name).await.map_err(backend)
    }

    async fn release_scope(&self, name: &str) -> Result<()> {
        self.drop_projection(name).await.map_err(backend)
    }

    async fn components(&self, scope: &str) -> Result<Vec<(PostId, ComponentId)>> {
        ReplyGraphReader::components(self, scope).await.map_err(backend)
    }

    async fn subject_posts(&self, subject_id: &str) -> Result<HashSet<PostId>> {
        ReplyGraphReader::subject_posts(self, subject_id).await.map_err(backend)
    }

    async fn children_of(&self, post_ids: &[PostId]) -> Result<HashMap<PostId, Vec<PostId>>> {
        ReplyGraphReader::children_of(self, post_ids).await.map_err(backend)
    }

    async fn created_at(&self, post_ids: &[PostId]) -> Result<HashMap<PostId, String>> {
        ReplyGraphReader::created_at(self, post_ids).await.map_err(backend)
    }
}

#[async_trait]
impl RecordWriter for ConversationWriter {
    async fn append(&mut self, record: &ConversationRecord) -> Result<()> {
        self.write(record)
            .await
            .map_err(|e| ThreadlineError::Sink(e.to_string()))
    }

    async fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}
