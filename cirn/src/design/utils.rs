use std::collections::HashMap;

use lazy_static::lazy_static;
use petgraph::graphmap::{DiGraphMap, NodeTrait};
use petgraph::Direction;
use regex::Regex;

lazy_static! {
	static ref VALID_ID_REGEX: Regex = Regex::new(r"^[a-zA-Z_][0-9a-zA-Z_]*$").unwrap();
	static ref VALID_PIN_REGEX: Regex = Regex::new(r"^([a-zA-Z_][0-9a-zA-Z_]*|[0-9]+)$").unwrap();
}

/// Checks if given name is a valid identifier
pub fn is_name_valid(name: &str) -> bool {
	VALID_ID_REGEX.is_match(name)
}

/// Pins may additionally be named with plain numbers (footprint pads)
pub fn is_pin_name_valid(name: &str) -> bool {
	VALID_PIN_REGEX.is_match(name)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
	Visiting,
	Done,
}

/// Finds a cycle in a directed graph. The returned path starts and ends
/// with the same node. Nodes and edges are visited in insertion order,
/// so the result is deterministic for a deterministically built graph.
pub fn find_cycle<N: NodeTrait>(graph: &DiGraphMap<N, ()>) -> Option<Vec<N>> {
	let mut marks = HashMap::new();
	let mut stack = Vec::new();
	for node in graph.nodes() {
		if marks.contains_key(&node) {
			continue;
		}

		if let Some(cycle) = visit(graph, node, &mut marks, &mut stack) {
			return Some(cycle);
		}
	}
	None
}

fn visit<N: NodeTrait>(
	graph: &DiGraphMap<N, ()>,
	node: N,
	marks: &mut HashMap<N, Mark>,
	stack: &mut Vec<N>,
) -> Option<Vec<N>> {
	marks.insert(node, Mark::Visiting);
	stack.push(node);

	for next in graph.neighbors_directed(node, Direction::Outgoing) {
		match marks.get(&next) {
			Some(Mark::Visiting) => {
				let start = stack.iter().position(|n| *n == next)?;
				let mut cycle = stack[start..].to_vec();
				cycle.push(next);
				return Some(cycle);
			},
			Some(Mark::Done) => {},
			None => {
				if let Some(cycle) = visit(graph, next, marks, stack) {
					return Some(cycle);
				}
			},
		}
	}

	stack.pop();
	marks.insert(node, Mark::Done);
	None
}
