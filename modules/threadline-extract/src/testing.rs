// Test doubles for the extraction pipeline.
//
// - MockReplyGraph (ReplyGraph): in-memory reply forest with scripted failures
// - MemoryWriter (RecordWriter): collects records behind a shared handle
//
// Plus helpers for building annotated conversations.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use threadline_common::{
    AnnotatedConversation, ComponentId, ConversationRecord, PositionLabel, PostId, Result,
    ThreadlineError,
};

use crate::sink::RecordWriter;
use crate::traits::ReplyGraph;

/// Message of the transient error the mock injects.
pub const DEADLOCK: &str =
    "Neo.TransientError.Transaction.DeadlockDetected: ForsetiClient[3] can't acquire ExclusiveLock";

// ---------------------------------------------------------------------------
// MockReplyGraph
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct MockPost {
    id: PostId,
    author: String,
    parent: Option<PostId>,
    created_at: Option<String>,
}

#[derive(Default)]
struct MockState {
    active_scopes: HashSet<String>,
    acquired: u32,
    released: u32,
    peak_active: usize,
    transient: HashMap<&'static str, u32>,
    calls: HashMap<&'static str, u32>,
}

/// Reply graph held in memory. Posts are returned in insertion order, and
/// components are the connected pieces of the parent links.
///
/// Builder pattern: `.post()`, `.post_at()`, `.fail_transient()`,
/// `.fail_subject()`, `.panic_on_subject()`.
pub struct MockReplyGraph {
    posts: Vec<MockPost>,
    fatal_subjects: HashSet<String>,
    panic_subjects: HashSet<String>,
    state: Mutex<MockState>,
}

impl Default for MockReplyGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl MockReplyGraph {
    pub fn new() -> Self {
        Self {
            posts: Vec::new(),
            fatal_subjects: HashSet::new(),
            panic_subjects: HashSet::new(),
            state: Mutex::new(MockState::default()),
        }
    }

    pub fn post(self, id: &str, author: &str, parent: Option<&str>) -> Self {
        self.push(id, author, parent, None)
    }

    pub fn post_at(self, id: &str, author: &str, parent: Option<&str>, created_at: &str) -> Self {
        self.push(id, author, parent, Some(created_at))
    }

    /// Fail the next `times` calls of `op` with a deadlock error.
    pub fn fail_transient(self, op: &'static str, times: u32) -> Self {
        self.lock().transient.insert(op, times);
        self
    }

    /// Fail `subject_posts` for this subject with a non-retryable error.
    pub fn fail_subject(mut self, subject_id: &str) -> Self {
        self.fatal_subjects.insert(subject_id.to_string());
        self
    }

    /// Panic inside `subject_posts` for this subject.
    pub fn panic_on_subject(mut self, subject_id: &str) -> Self {
        self.panic_subjects.insert(subject_id.to_string());
        self
    }

    pub fn acquired(&self) -> u32 {
        self.lock().acquired
    }

    pub fn released(&self) -> u32 {
        self.lock().released
    }

    /// Most scopes held at the same time during the run.
    pub fn peak_active_scopes(&self) -> usize {
        self.lock().peak_active
    }

    pub fn active_scopes(&self) -> Vec<String> {
        let mut scopes: Vec<String> = self.lock().active_scopes.iter().cloned().collect();
        scopes.sort();
        scopes
    }

    /// Calls made to `op`, failed attempts included.
    pub fn calls(&self, op: &str) -> u32 {
        self.lock().calls.get(op).copied().unwrap_or(0)
    }

    fn push(mut self, id: &str, author: &str, parent: Option<&str>, created_at: Option<&str>) -> Self {
        self.posts.push(MockPost {
            id: id.to_string(),
            author: author.to_string(),
            parent: parent.map(str::to_string),
            created_at: created_at.map(str::to_string),
        });
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Count the call and consume one scripted failure if any are left.
    fn enter(&self, op: &'static str) -> Result<()> {
        let mut state = self.lock();
        *state.calls.entry(op).or_insert(0) += 1;
        if let Some(remaining) = state.transient.get_mut(op) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ThreadlineError::Backend(DEADLOCK.to_string()));
            }
        }
        Ok(())
    }

    fn component_ids(&self) -> Vec<ComponentId> {
        let index: HashMap<&str, usize> = self
            .posts
            .iter()
            .enumerate()
            .map(|(i, p)| (p.id.as_str(), i))
            .collect();
        let mut parent: Vec<usize> = (0..self.posts.len()).collect();

        fn find(parent: &mut [usize], mut i: usize) -> usize {
            while parent[i] != i {
                parent[i] = parent[parent[i]];
                i = parent[i];
            }
            i
        }

        for (i, post) in self.posts.iter().enumerate() {
            let Some(&j) = post.parent.as_deref().and_then(|p| index.get(p)) else {
                continue;
            };
            let (a, b) = (find(&mut parent, i), find(&mut parent, j));
            if a != b {
                parent[a.max(b)] = a.min(b);
            }
        }

        (0..self.posts.len())
            .map(|i| find(&mut parent, i) as ComponentId)
            .collect()
    }
}

#[async_trait]
impl ReplyGraph for MockReplyGraph {
    async fn acquire_scope(&self, name: &str) -> Result<()> {
        self.enter("acquire_scope")?;
        let mut state = self.lock();
        state.acquired += 1;
        state.active_scopes.insert(name.to_string());
        state.peak_active = state.peak_active.max(state.active_scopes.len());
        Ok(())
    }

    async fn release_scope(&self, name: &str) -> Result<()> {
        self.enter("release_scope")?;
        let mut state = self.lock();
        state.released += 1;
        state.active_scopes.remove(name);
        Ok(())
    }

    async fn components(&self, scope: &str) -> Result<Vec<(PostId, ComponentId)>> {
        self.enter("components")?;
        if !self.lock().active_scopes.contains(scope) {
            return Err(ThreadlineError::Backend(format!(
                "Neo.ClientError.Procedure.ProcedureCallFailed: graph '{scope}' does not exist"
            )));
        }
        Ok(self
            .posts
            .iter()
            .map(|p| p.id.clone())
            .zip(self.component_ids())
            .collect())
    }

    async fn subject_posts(&self, subject_id: &str) -> Result<HashSet<PostId>> {
        self.enter("subject_posts")?;
        if self.panic_subjects.contains(subject_id) {
            panic!("mock reply graph asked to panic for subject {subject_id}");
        }
        if self.fatal_subjects.contains(subject_id) {
            return Err(ThreadlineError::Backend(format!(
                "Neo.ClientError.Statement.SyntaxError: bad lookup for {subject_id}"
            )));
        }
        Ok(self
            .posts
            .iter()
            .filter(|p| p.author == subject_id)
            .map(|p| p.id.clone())
            .collect())
    }

    async fn children_of(&self, post_ids: &[PostId]) -> Result<HashMap<PostId, Vec<PostId>>> {
        self.enter("children_of")?;
        let wanted: HashSet<&str> = post_ids.iter().map(String::as_str).collect();
        let mut children: HashMap<PostId, Vec<PostId>> = self
            .posts
            .iter()
            .filter(|p| wanted.contains(p.id.as_str()))
            .map(|p| (p.id.clone(), Vec::new()))
            .collect();
        for post in &self.posts {
            if !wanted.contains(post.id.as_str()) {
                continue;
            }
            if let Some(parent) = post.parent.as_deref() {
                if let Some(replies) = children.get_mut(parent) {
                    replies.push(post.id.clone());
                }
            }
        }
        Ok(children)
    }

    async fn created_at(&self, post_ids: &[PostId]) -> Result<HashMap<PostId, String>> {
        self.enter("created_at")?;
        let wanted: HashSet<&str> = post_ids.iter().map(String::as_str).collect();
        Ok(self
            .posts
            .iter()
            .filter(|p| wanted.contains(p.id.as_str()))
            .filter_map(|p| p.created_at.clone().map(|ts| (p.id.clone(), ts)))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// MemoryWriter
// ---------------------------------------------------------------------------

/// Collects appended records. Clones share the same storage, so a test can
/// hand one clone to the sink and inspect the other afterwards.
#[derive(Clone, Default)]
pub struct MemoryWriter {
    records: Arc<Mutex<Vec<ConversationRecord>>>,
    finished: Arc<AtomicBool>,
    fail_after: Option<usize>,
    finish_delay: Option<Duration>,
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `n` records, then fail every further append.
    pub fn failing_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// Sleep this long inside `finish`.
    pub fn slow_finish(mut self, delay: Duration) -> Self {
        self.finish_delay = Some(delay);
        self
    }

    pub fn records(&self) -> Vec<ConversationRecord> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordWriter for MemoryWriter {
    async fn append(&mut self, record: &ConversationRecord) -> Result<()> {
        let mut records = self
            .records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if self.fail_after.is_some_and(|n| records.len() >= n) {
            return Err(ThreadlineError::Sink("disk full".into()));
        }
        records.push(record.clone());
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        if let Some(delay) = self.finish_delay {
            tokio::time::sleep(delay).await;
        }
        self.finished.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// An annotated conversation over `posts`, all labelled INVOLVED.
pub fn involved_conversation(subject_id: &str, posts: &[&str]) -> AnnotatedConversation {
    AnnotatedConversation {
        subject_id: subject_id.to_string(),
        posts: posts
            .iter()
            .map(|p| (p.to_string(), PositionLabel::Involved))
            .collect(),
        started_at: None,
        ended_at: None,
    }
}
