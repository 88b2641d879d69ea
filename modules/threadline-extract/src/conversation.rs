use std::collections::HashSet;

use thiserror::Error;

use threadline_common::PostId;

/// Minimum number of posts a conversation keeps after trimming.
pub const MIN_CONVERSATION_LEN: usize = 3;

/// A trimmed, validated slice of a linearized reply component.
///
/// Only [`build_conversation`] constructs these, so holding one means the
/// sequence has at least [`MIN_CONVERSATION_LEN`] posts, contains a subject
/// post, and neither starts nor ends with one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    subject_id: String,
    posts: Vec<PostId>,
}

impl Conversation {
    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    pub fn posts(&self) -> &[PostId] {
        &self.posts
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }
}

/// Why a linearized component did not become a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("no subject post left after trimming")]
    NoSubjectPosts,
    #[error("only {0} posts left after trimming")]
    TooShort(usize),
}

/// Trim leading and trailing runs of subject posts, then validate what remains.
pub fn build_conversation(
    subject_id: &str,
    sequence: Vec<PostId>,
    subject_posts: &HashSet<PostId>,
) -> Result<Conversation, Rejection> {
    let is_subject = |id: &PostId| subject_posts.contains(id);

    let start = sequence
        .iter()
        .position(|id| !is_subject(id))
        .unwrap_or(sequence.len());
    let end = sequence
        .iter()
        .rposition(|id| !is_subject(id))
        .map_or(start, |last| last + 1);

    let mut posts = sequence;
    posts.truncate(end);
    posts.drain(..start);

    if !posts.iter().any(is_subject) {
        return Err(Rejection::NoSubjectPosts);
    }
    if posts.len() < MIN_CONVERSATION_LEN {
        return Err(Rejection::TooShort(posts.len()));
    }

    Ok(Conversation {
        subject_id: subject_id.to_string(),
        posts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[&str]) -> Vec<PostId> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    fn subject(raw: &[&str]) -> HashSet<PostId> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn keeps_sandwiched_subject_posts() {
        let conv = build_conversation("s", ids(&["a", "b", "c", "d", "e"]), &subject(&["b", "d"]))
            .unwrap();
        assert_eq!(conv.posts(), ids(&["a", "b", "c", "d", "e"]).as_slice());
        assert_eq!(conv.subject_id(), "s");
    }

    #[test]
    fn trims_both_ends() {
        let conv = build_conversation(
            "s",
            ids(&["s1", "s2", "x", "s3", "y", "s4"]),
            &subject(&["s1", "s2", "s3", "s4"]),
        )
        .unwrap();
        assert_eq!(conv.posts(), ids(&["x", "s3", "y"]).as_slice());
    }

    #[test]
    fn leading_subject_only_is_rejected() {
        let err = build_conversation("s", ids(&["b", "x", "y"]), &subject(&["b"])).unwrap_err();
        assert_eq!(err, Rejection::NoSubjectPosts);
    }

    #[test]
    fn two_posts_are_rejected() {
        assert!(build_conversation("s", ids(&["x", "b"]), &subject(&["b"])).is_err());
        assert!(build_conversation("s", ids(&["x", "y"]), &subject(&["b"])).is_err());
    }

    #[test]
    fn inner_subject_posts_survive_trimming() {
        let subject_posts = subject(&["b", "b2", "b3"]);
        let conv = build_conversation("s", ids(&["b", "x", "b2", "y", "b3"]), &subject_posts).unwrap();
        assert_eq!(conv.posts(), ids(&["x", "b2", "y"]).as_slice());

        let err = build_conversation("s", ids(&["b", "x", "b2", "b3"]), &subject_posts).unwrap_err();
        assert_eq!(err, Rejection::NoSubjectPosts);
    }

    #[test]
    fn all_subject_posts_are_rejected() {
        let err = build_conversation("s", ids(&["b", "c"]), &subject(&["b", "c"])).unwrap_err();
        assert_eq!(err, Rejection::NoSubjectPosts);
    }

    #[test]
    fn result_never_starts_or_ends_with_subject() {
        let subject_posts = subject(&["s"]);
        let shapes: [&[&str]; 5] = [
            &["s", "a", "s", "b", "s"],
            &["a", "s", "b"],
            &["s", "s", "a", "s", "b", "c", "s"],
            &["a", "b", "s", "c"],
            &["a", "s", "s", "s", "b"],
        ];
        for shape in shapes {
            if let Ok(conv) = build_conversation("s", ids(shape), &subject_posts) {
                assert!(!subject_posts.contains(&conv.posts()[0]));
                assert!(!subject_posts.contains(&conv.posts()[conv.len() - 1]));
                assert!(conv.len() >= MIN_CONVERSATION_LEN);
            }
        }
    }
}
