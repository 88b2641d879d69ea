//! Flattening of one reply component into a single root-first sequence.
//!
//! Roots are the members that never appear as a reply to another member.
//! Each root is walked depth-first in post-order (children, then the node),
//! the per-root walks are concatenated in root order, and the whole list is
//! reversed so that a thread reads from its opening post onwards.
//!
//! When a component holds several reply trees (multiple roots), their
//! relative order is the order roots are encountered in `members`, which is
//! the order the backend returned them. That order carries no chronological
//! meaning. Members unreachable from any root (only possible with a reply
//! cycle) are walked afterwards in `members` order so the output is always a
//! permutation of the component.

use std::collections::{HashMap, HashSet};

use threadline_common::PostId;

/// Linearize a component. `children` maps a member to its direct repliers;
/// entries and repliers outside `members` are ignored, as are duplicate members.
pub fn linearize(members: &[PostId], children: &HashMap<PostId, Vec<PostId>>) -> Vec<PostId> {
    // Arena: dense index per distinct member, first occurrence wins.
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(members.len());
    let mut nodes: Vec<&str> = Vec::with_capacity(members.len());
    for id in members {
        if !index.contains_key(id.as_str()) {
            index.insert(id.as_str(), nodes.len());
            nodes.push(id.as_str());
        }
    }

    let mut child_idx: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    let mut is_child = vec![false; nodes.len()];
    for (node, slot) in nodes.iter().zip(child_idx.iter_mut()) {
        let Some(replies) = children.get(*node) else {
            continue;
        };
        for reply in replies {
            if let Some(&c) = index.get(reply.as_str()) {
                slot.push(c);
                is_child[c] = true;
            }
        }
    }

    let mut visited: HashSet<usize> = HashSet::with_capacity(nodes.len());
    let mut order: Vec<usize> = Vec::with_capacity(nodes.len());

    let roots = (0..nodes.len()).filter(|&i| !is_child[i]);
    for root in roots {
        walk_post_order(root, &child_idx, &mut visited, &mut order);
    }
    for leftover in 0..nodes.len() {
        walk_post_order(leftover, &child_idx, &mut visited, &mut order);
    }

    order
        .into_iter()
        .rev()
        .map(|i| nodes[i].to_string())
        .collect()
}

/// Iterative post-order walk from `start`, skipping anything already visited.
fn walk_post_order(
    start: usize,
    child_idx: &[Vec<usize>],
    visited: &mut HashSet<usize>,
    order: &mut Vec<usize>,
) {
    if !visited.insert(start) {
        return;
    }

    // (node, position of the next child to look at)
    let mut stack: Vec<(usize, usize)> = vec![(start, 0)];
    while let Some(top) = stack.last_mut() {
        let (node, next) = *top;
        if let Some(&child) = child_idx[node].get(next) {
            top.1 += 1;
            if visited.insert(child) {
                stack.push((child, 0));
            }
        } else {
            stack.pop();
            order.push(node);
        }
    }
}
