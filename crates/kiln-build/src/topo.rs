use std::collections::{HashMap, HashSet, VecDeque};

use indexmap::IndexSet;
use kiln_core::FileId;

use crate::{BuildError, Result};

/// Orders `nodes` so that, where possible, each file comes after the files it
/// depends on.
///
/// Repeatedly emits the frontier of nodes with no dependencies left among the
/// unsorted nodes. When that frontier is empty the remaining nodes contain a
/// cycle; the smallest cycle found from at most `probe_limit` seeds is
/// emitted as one unit. Dependencies outside `nodes` and self-edges are
/// ignored. The result contains every node exactly once.
pub fn topological_order(
    nodes: &[FileId],
    dependencies: impl Fn(FileId) -> Vec<FileId>,
    probe_limit: usize,
) -> Result<Vec<FileId>> {
    let mut remaining: IndexSet<FileId> = nodes.iter().copied().collect();
    let edges: HashMap<FileId, Vec<FileId>> = remaining
        .iter()
        .map(|&node| {
            let deps = dependencies(node)
                .into_iter()
                .filter(|dep| *dep != node && remaining.contains(dep))
                .collect();
            (node, deps)
        })
        .collect();
    let out_edges = |node: FileId| edges.get(&node).map(Vec::as_slice).unwrap_or(&[]);

    let mut order = Vec::with_capacity(remaining.len());
    while !remaining.is_empty() {
        let mut frontier: Vec<FileId> = remaining
            .iter()
            .copied()
            .filter(|node| out_edges(*node).iter().all(|dep| !remaining.contains(dep)))
            .collect();

        if frontier.is_empty() {
            frontier = smallest_cycle(&remaining, &out_edges, probe_limit);
            if frontier.is_empty() {
                return Err(BuildError::Internal(format!(
                    "no cycle found among {} blocked files",
                    remaining.len()
                )));
            }
            tracing::debug!(
                target = "kiln.build",
                size = frontier.len(),
                "breaking dependency cycle"
            );
            frontier.sort_by_key(|node| remaining.get_index_of(node));
        }

        for node in frontier {
            if remaining.shift_remove(&node) {
                order.push(node);
            }
        }
    }
    Ok(order)
}

/// Smallest cycle through any of the first `probe_limit` remaining nodes.
///
/// Every remaining node has an out-edge inside `remaining`, so following
/// first edges from any node must revisit one; that walk is the fallback
/// when no probed seed lies on a cycle.
fn smallest_cycle<'a>(
    remaining: &IndexSet<FileId>,
    out_edges: &impl Fn(FileId) -> &'a [FileId],
    probe_limit: usize,
) -> Vec<FileId> {
    let mut best: Option<Vec<FileId>> = None;
    for &seed in remaining.iter().take(probe_limit.max(1)) {
        let Some(cycle) = shortest_cycle_through(seed, remaining, out_edges) else {
            continue;
        };
        if best.as_ref().map_or(true, |b| cycle.len() < b.len()) {
            best = Some(cycle);
        }
        if best.as_ref().is_some_and(|b| b.len() <= 2) {
            break;
        }
    }
    if let Some(best) = best {
        return best;
    }

    let Some(&start) = remaining.first() else {
        return Vec::new();
    };
    let mut path = vec![start];
    let mut position = HashMap::from([(start, 0usize)]);
    let mut current = start;
    loop {
        let Some(&next) = out_edges(current).iter().find(|n| remaining.contains(*n)) else {
            return Vec::new();
        };
        if let Some(&at) = position.get(&next) {
            return path.split_off(at);
        }
        position.insert(next, path.len());
        path.push(next);
        current = next;
    }
}

/// Breadth-first search from `seed` back to itself within `remaining`.
fn shortest_cycle_through<'a>(
    seed: FileId,
    remaining: &IndexSet<FileId>,
    out_edges: &impl Fn(FileId) -> &'a [FileId],
) -> Option<Vec<FileId>> {
    let mut parent: HashMap<FileId, FileId> = HashMap::new();
    let mut visited = HashSet::from([seed]);
    let mut queue = VecDeque::from([seed]);
    while let Some(node) = queue.pop_front() {
        for &next in out_edges(node) {
            if !remaining.contains(&next) {
                continue;
            }
            if next == seed {
                let mut cycle = vec![node];
                let mut at = node;
                while at != seed {
                    at = parent[&at];
                    cycle.push(at);
                }
                cycle.reverse();
                return Some(cycle);
            }
            if visited.insert(next) {
                parent.insert(next, node);
                queue.push_back(next);
            }
        }
    }
    None
}
