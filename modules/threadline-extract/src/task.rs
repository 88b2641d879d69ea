use std::collections::{HashMap, HashSet};
use std::fmt;

use tracing::{debug, info, warn};

use threadline_common::{
    AnnotatedConversation, ComponentId, PostId, Result, Subject, ThreadlineError,
};

use crate::annotate::annotate;
use crate::conversation::{build_conversation, Rejection};
use crate::linearize::linearize;
use crate::retry::RetryPolicy;
use crate::sink::ResultSender;
use crate::traits::ReplyGraph;

/// Per-subject counters, reported back to the scheduler.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TaskStats {
    pub posts: usize,
    pub components: usize,
    pub singletons_skipped: usize,
    pub rejected_no_subject: usize,
    pub rejected_too_short: usize,
    pub conversations_emitted: usize,
}

impl fmt::Display for TaskStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} conversations from {} components ({} singletons, {} without subject, {} too short)",
            self.conversations_emitted,
            self.components,
            self.singletons_skipped,
            self.rejected_no_subject,
            self.rejected_too_short,
        )
    }
}

/// Extract every conversation for one subject and hand it to the sink.
///
/// The subject's server-side scope is always released afterwards, even when
/// extraction fails; a failed release is logged and does not fail the task.
pub async fn extract_subject(
    graph: &dyn ReplyGraph,
    subject: &Subject,
    retry: &RetryPolicy,
    results: &ResultSender,
) -> Result<TaskStats> {
    let scope = subject.scope_name();

    retry
        .run("acquire_scope", || graph.acquire_scope(&scope))
        .await?;

    let outcome = extract_in_scope(graph, subject, &scope, retry, results).await;

    if let Err(e) = retry
        .run("release_scope", || graph.release_scope(&scope))
        .await
    {
        warn!(scope = scope.as_str(), error = %e, "Failed to release scope");
    }

    outcome
}

async fn extract_in_scope(
    graph: &dyn ReplyGraph,
    subject: &Subject,
    scope: &str,
    retry: &RetryPolicy,
    results: &ResultSender,
) -> Result<TaskStats> {
    let mut stats = TaskStats::default();

    let membership = retry.run("components", || graph.components(scope)).await?;
    let subject_posts = retry
        .run("subject_posts", || graph.subject_posts(&subject.id))
        .await?;

    stats.posts = membership.len();
    let components = group_components(membership);
    stats.components = components.len();
    info!(
        posts = stats.posts,
        components = stats.components,
        subject_posts = subject_posts.len(),
        "Components computed"
    );

    for (component_id, members) in components {
        if members.len() < 2 {
            stats.singletons_skipped += 1;
            continue;
        }
        // Linearizing cannot add subject posts, so these would be rejected anyway.
        if !members.iter().any(|id| subject_posts.contains(id)) {
            stats.rejected_no_subject += 1;
            continue;
        }

        let children = retry
            .run("children_of", || graph.children_of(&members))
            .await?;
        check_restricted(component_id, &members, &children)?;

        let sequence = linearize(&members, &children);
        let conversation = match build_conversation(&subject.id, sequence, &subject_posts) {
            Ok(conversation) => conversation,
            Err(rejection) => {
                match rejection {
                    Rejection::NoSubjectPosts => stats.rejected_no_subject += 1,
                    Rejection::TooShort(_) => stats.rejected_too_short += 1,
                }
                debug!(component = component_id, reason = %rejection, "Component rejected");
                continue;
            }
        };
        let labels = annotate(&conversation, &subject_posts);

        let posts = conversation.posts();
        let bounds = [posts[0].clone(), posts[posts.len() - 1].clone()];
        let mut stamps = retry
            .run("created_at", || graph.created_at(&bounds))
            .await?;

        let [first, last] = bounds;
        let annotated = AnnotatedConversation {
            subject_id: subject.id.clone(),
            posts: posts.iter().cloned().zip(labels).collect(),
            started_at: stamps.remove(&first),
            ended_at: stamps.remove(&last),
        };
        results.send(annotated).await?;
        stats.conversations_emitted += 1;
    }

    info!(%stats, "Subject extraction complete");
    Ok(stats)
}

/// Group `(post, component)` pairs by component, keeping the order in which
/// components and their posts first appear. Repeated posts are dropped.
fn group_components(membership: Vec<(PostId, ComponentId)>) -> Vec<(ComponentId, Vec<PostId>)> {
    let mut slots: HashMap<ComponentId, usize> = HashMap::new();
    let mut seen: HashSet<PostId> = HashSet::new();
    let mut grouped: Vec<(ComponentId, Vec<PostId>)> = Vec::new();

    for (post_id, component_id) in membership {
        if !seen.insert(post_id.clone()) {
            continue;
        }
        let slot = *slots.entry(component_id).or_insert_with(|| {
            grouped.push((component_id, Vec::new()));
            grouped.len() - 1
        });
        grouped[slot].1.push(post_id);
    }

    grouped
}

/// The backend must only report edges inside the requested post set.
fn check_restricted(
    component_id: ComponentId,
    members: &[PostId],
    children: &HashMap<PostId, Vec<PostId>>,
) -> Result<()> {
    let member_set: HashSet<&str> = members.iter().map(String::as_str).collect();
    for (parent, replies) in children {
        if !member_set.contains(parent.as_str()) {
            return Err(ThreadlineError::MalformedComponent {
                component_id,
                reason: format!("children reported for non-member post {parent}"),
            });
        }
        if let Some(stray) = replies.iter().find(|r| !member_set.contains(r.as_str())) {
            return Err(ThreadlineError::MalformedComponent {
                component_id,
                reason: format!("post {parent} has reply {stray} outside the component"),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(post: &str, component: ComponentId) -> (PostId, ComponentId) {
        (post.to_string(), component)
    }

    #[test]
    fn grouping_keeps_first_seen_order_and_drops_repeats() {
        let grouped = group_components(vec![
            pair("a", 7),
            pair("x", 2),
            pair("b", 7),
            pair("a", 7),
            pair("y", 2),
            pair("z", 9),
        ]);
        assert_eq!(
            grouped,
            vec![
                (7, vec!["a".to_string(), "b".to_string()]),
                (2, vec!["x".to_string(), "y".to_string()]),
                (9, vec!["z".to_string()]),
            ]
        );
    }

    #[test]
    fn restriction_check_flags_foreign_posts() {
        let members = vec!["a".to_string(), "b".to_string()];

        let ok: HashMap<PostId, Vec<PostId>> =
            HashMap::from([("a".to_string(), vec!["b".to_string()]), ("b".to_string(), vec![])]);
        assert!(check_restricted(1, &members, &ok).is_ok());

        let stray_child: HashMap<PostId, Vec<PostId>> =
            HashMap::from([("a".to_string(), vec!["q".to_string()])]);
        let err = check_restricted(1, &members, &stray_child).unwrap_err();
        assert!(matches!(err, ThreadlineError::MalformedComponent { component_id: 1, .. }));

        let stray_parent: HashMap<PostId, Vec<PostId>> =
            HashMap::from([("q".to_string(), vec!["a".to_string()])]);
        assert!(check_restricted(1, &members, &stray_parent).is_err());
    }
}
