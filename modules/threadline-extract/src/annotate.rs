use std::collections::HashSet;

use threadline_common::{PositionLabel, PostId};

use crate::conversation::Conversation;

/// Label every post by where it sits relative to the subject's first and last post.
///
/// Non-subject posts between the first and last subject post share the
/// `Involved` label with the subject's own posts.
pub fn annotate(conversation: &Conversation, subject_posts: &HashSet<PostId>) -> Vec<PositionLabel> {
    label_positions(conversation.posts(), subject_posts)
}

pub(crate) fn label_positions(posts: &[PostId], subject_posts: &HashSet<PostId>) -> Vec<PositionLabel> {
    let first = posts.iter().position(|id| subject_posts.contains(id));
    let last = posts.iter().rposition(|id| subject_posts.contains(id));

    let (Some(first), Some(last)) = (first, last) else {
        return vec![PositionLabel::Involved; posts.len()];
    };

    posts
        .iter()
        .enumerate()
        .map(|(i, id)| {
            if subject_posts.contains(id) {
                PositionLabel::Involved
            } else if i < first {
                PositionLabel::Pre
            } else if i > last {
                PositionLabel::Post
            } else {
                PositionLabel::Involved
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::build_conversation;

    use PositionLabel::{Involved, Post, Pre};

    fn ids(raw: &[&str]) -> Vec<PostId> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    fn subject(raw: &[&str]) -> HashSet<PostId> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn labels_window_around_subject() {
        let subject_posts = subject(&["b", "d"]);
        let conv = build_conversation("s", ids(&["a", "b", "c", "d", "e"]), &subject_posts).unwrap();
        assert_eq!(
            annotate(&conv, &subject_posts),
            vec![Pre, Involved, Involved, Involved, Post]
        );
    }

    #[test]
    fn long_tails_on_both_sides() {
        let subject_posts = subject(&["s"]);
        let conv = build_conversation("s", ids(&["a", "b", "s", "c", "d", "e"]), &subject_posts).unwrap();
        assert_eq!(
            annotate(&conv, &subject_posts),
            vec![Pre, Pre, Involved, Post, Post, Post]
        );
    }

    #[test]
    fn labels_are_parallel_to_posts() {
        let subject_posts = subject(&["s1", "s2"]);
        let conv = build_conversation(
            "s",
            ids(&["a", "s1", "b", "c", "s2", "d", "e"]),
            &subject_posts,
        )
        .unwrap();
        let labels = annotate(&conv, &subject_posts);
        assert_eq!(labels.len(), conv.len());
        for (id, label) in conv.posts().iter().zip(&labels) {
            if subject_posts.contains(id) {
                assert_eq!(*label, Involved);
            }
        }
        assert_eq!(labels, vec![Pre, Involved, Involved, Involved, Involved, Post, Post]);
    }

    #[test]
    fn no_subject_posts_labels_everything_involved() {
        let labels = label_positions(&ids(&["a", "b"]), &subject(&["z"]));
        assert_eq!(labels, vec![Involved, Involved]);
    }
}
