//! Node construction: capture-to-subtree mapping and begin/end region
//! expansion.
//!
//! # Algorithm
//! 1. A winning match becomes one node named after its pattern.
//! 2. Capture groups become child nodes, parented by span containment.
//! 3. A range pattern then scans forward, interleaving sub-pattern matches
//!    with the search for its end anchor; the earliest wins, with
//!    declaration of the end match breaking ties unless the region is still
//!    zero-width.
//!
//! # Invariants
//! - All offsets here are byte offsets; the driver rewrites them to runes.
//! - A region never extends past the next line break when its end regex
//!   stops matching before any sub-pattern was consumed.
//! - The region scan draws on the pass's shared iteration budget, so a
//!   zero-width sub-pattern cannot loop forever.

use memchr::memchr;

use crate::grammar::{Captures, PatternKind};
use crate::matcher::{Hit, MatchCtx};
use crate::regex::{MatchSpans, Regex};
use crate::tree::Node;

/// Builds the node for a winning match, recursing through region bodies.
pub(crate) fn build_node(ctx: &mut MatchCtx<'_>, hit: &Hit) -> Node {
    let grammar = ctx.grammar(hit.slot);
    let pattern = grammar.pattern(hit.pattern);
    let mut node = Node::new(pattern.name.clone(), hit.spans.start()..hit.spans.end());

    match &pattern.kind {
        PatternKind::Match { .. } => {
            create_capture_nodes(&hit.spans, &mut node, &pattern.captures);
        }
        PatternKind::Range {
            begin_captures,
            end,
            end_captures,
            ..
        } => {
            let begin_caps = pick(begin_captures, &pattern.captures);
            create_capture_nodes(&hit.spans, &mut node, begin_caps);
            if !end.is_empty() {
                expand_region(
                    ctx,
                    hit,
                    end,
                    pick(end_captures, &pattern.captures),
                    &mut node,
                );
            }
        }
        PatternKind::Include { .. } | PatternKind::Group => {}
    }

    node.update_range();
    node
}

fn pick<'c>(specific: &'c Captures, fallback: &'c Captures) -> &'c Captures {
    if specific.is_empty() {
        fallback
    } else {
        specific
    }
}

/// Scans forward from the begin anchor, interleaving sub-pattern matches
/// with the end anchor, and terminates the node.
fn expand_region(
    ctx: &mut MatchCtx<'_>,
    hit: &Hit,
    end: &Regex,
    end_caps: &Captures,
    node: &mut Node,
) {
    let hay = ctx.haystack();
    let mut found = false;
    let mut cursor = node.range.end;
    let mut end_pos = hay.len();
    while cursor < hay.len() {
        if !ctx.consume_budget() {
            break;
        }
        let end_match = match end.find(hay, cursor) {
            Some(em) => {
                end_pos = em.end();
                em
            }
            None => {
                if !found {
                    // The end never matches at all: terminate at the line
                    // boundary so a malformed grammar cannot run off to EOF.
                    end_pos = memchr(b'\n', &hay[cursor..]).map_or(hay.len(), |off| cursor + off);
                } else {
                    end_pos = cursor;
                }
                break;
            }
        };
        // Sub-patterns may still apply before the end is reached.
        if ctx.has_live_children(hit.slot, hit.pattern) {
            if let Some(sub) = ctx.first_match(hit.slot, hit.pattern, cursor) {
                let wins = sub.start() < end_match.start()
                    || (sub.start() == end_match.start()
                        && node.range.start == node.range.end);
                if wins {
                    found = true;
                    let child = build_node(ctx, &sub);
                    cursor = child.range.end;
                    node.append(child);
                    continue;
                }
            }
        }
        create_capture_nodes(&end_match, node, end_caps);
        break;
    }
    node.range.end = end_pos;
}

/// Builds one node per present capture and parents each by span
/// containment: groups 0 and 1 hang off the caller's node; a later group
/// hangs off the nearest earlier group whose span covers it (equal spans
/// count as coverage), walking outward to the nearest group that actually
/// produced a node.
fn create_capture_nodes(spans: &MatchSpans, parent: &mut Node, caps: &Captures) {
    if caps.is_empty() {
        return;
    }
    let group_count = spans.group_count();

    // Nearest earlier covering group for each group; uncovered groups fall
    // through to 0.
    let mut parent_idx = vec![0usize; group_count];
    for i in 2..group_count {
        let Some(range) = spans.group(i) else { continue };
        for j in (0..i).rev() {
            if let Some(candidate) = spans.group(j) {
                if candidate.start <= range.start && range.end <= candidate.end {
                    parent_idx[i] = j;
                    break;
                }
            }
        }
    }

    let mut nodes: Vec<Option<Node>> = (0..group_count).map(|_| None).collect();
    let mut child_lists: Vec<Vec<usize>> = vec![Vec::new(); group_count];
    let mut outer: Vec<usize> = Vec::new();
    let mut has_node = vec![false; group_count];

    for cap in caps.as_slice() {
        let group = cap.group;
        if group >= group_count {
            continue;
        }
        let Some(range) = spans.group(group) else { continue };
        nodes[group] = Some(Node::new(cap.name.clone(), range));
        has_node[group] = true;
        if group == 0 {
            outer.push(0);
            continue;
        }
        let mut walk = group;
        loop {
            walk = parent_idx[walk];
            if has_node[walk] {
                child_lists[walk].push(group);
                break;
            }
            if walk < 2 {
                outer.push(group);
                break;
            }
        }
    }

    for &group in &outer {
        if let Some(node) = assemble(group, &mut nodes, &child_lists) {
            parent.append(node);
        }
    }
}

fn assemble(group: usize, nodes: &mut [Option<Node>], child_lists: &[Vec<usize>]) -> Option<Node> {
    let mut node = nodes[group].take()?;
    for &child in &child_lists[group] {
        if let Some(child_node) = assemble(child, nodes, child_lists) {
            node.append(child_node);
        }
    }
    Some(node)
}
