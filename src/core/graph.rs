/// Dialog graph model and parser.
///
/// Nodes live in an arena addressed by `NodeIdx`; children and parents are
/// index lists, so cycles need no shared ownership.
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use thiserror::Error;

use crate::schema::action::ActionType;
use crate::schema::dialog::{
    ActionNode, ChoiceNode, ConditionNode, DialogRecord, NodeLink, ReferenceNode, Speaker,
    TextLineNode,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("dialog must have exactly one root node, found {0}")]
    RootNodeCountNotOne(usize),
}

/// Position of a node in the graph arena. Also its creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIdx(pub usize);

/// Which outgoing branch of a node an edge leaves from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortId {
    Index(i32),
    Else,
}

impl PortId {
    /// Map a link's port string to a port id.
    ///
    /// `else` (any case) is the else branch. Otherwise a `choice` or
    /// `condition` prefix is stripped and the rest parsed as an integer.
    /// A missing or unparsable port falls back to `Index(0)`.
    pub fn parse(port: Option<&str>) -> PortId {
        let Some(port) = port.map(str::trim) else {
            return PortId::Index(0);
        };
        if port.eq_ignore_ascii_case("else") {
            return PortId::Else;
        }
        let lower = port.to_ascii_lowercase();
        let number = lower
            .strip_prefix("choice")
            .or_else(|| lower.strip_prefix("condition"))
            .unwrap_or(&lower);
        match number.parse() {
            Ok(index) => PortId::Index(index),
            Err(_) => {
                tracing::debug!(%port, "unparsable link port, using port 0");
                PortId::Index(0)
            }
        }
    }
}

/// The step kinds, as used for function naming and extraction rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepKind {
    PlayerText,
    NpcText,
    Choice,
    Condition,
    Action,
    Reference,
}

impl StepKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::PlayerText => "PlayerText",
            Self::NpcText => "NpcText",
            Self::Choice => "Choice",
            Self::Condition => "Condition",
            Self::Action => "Action",
            Self::Reference => "Reference",
        }
    }
}

/// The payload of a node. Exactly one kind per node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    TextLine(TextLineNode),
    Choice(ChoiceNode),
    Condition(ConditionNode),
    Action(ActionNode),
    Reference(ReferenceNode),
}

impl NodeKind {
    pub fn id(&self) -> &str {
        match self {
            Self::TextLine(node) => &node.id,
            Self::Choice(node) => &node.id,
            Self::Condition(node) => &node.id,
            Self::Action(node) => &node.id,
            Self::Reference(node) => &node.id,
        }
    }

    pub fn step_kind(&self) -> StepKind {
        match self {
            Self::TextLine(line) => match line.speaker {
                Speaker::Player => StepKind::PlayerText,
                Speaker::Npc => StepKind::NpcText,
            },
            Self::Choice(_) => StepKind::Choice,
            Self::Condition(_) => StepKind::Condition,
            Self::Action(_) => StepKind::Action,
            Self::Reference(_) => StepKind::Reference,
        }
    }

    /// The action type of an action node, if it is a known one.
    pub fn action_type(&self) -> Option<ActionType> {
        match self {
            Self::Action(action) => ActionType::from_id(action.action_type),
            _ => None,
        }
    }

    fn is_branching(&self) -> bool {
        matches!(self, Self::Choice(_) | Self::Condition(_))
    }

    /// Ports in author-declared order, for branching nodes.
    fn declared_ports(&self) -> Vec<PortId> {
        match self {
            Self::Choice(choice) => choice
                .choices
                .iter()
                .map(|option| PortId::Index(option.id))
                .collect(),
            Self::Condition(condition) => condition
                .conditions
                .iter()
                .map(|branch| PortId::Index(branch.id))
                .collect(),
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphChild {
    pub port: PortId,
    pub target: NodeIdx,
}

#[derive(Debug, Clone)]
pub struct GraphNode {
    pub id: String,
    pub node_index: usize,
    pub kind: NodeKind,
    pub parents: Vec<NodeIdx>,
    pub children: Vec<GraphChild>,
    /// Set by function extraction when this node starts its own function.
    pub function_name: Option<String>,
    /// Set by the loop check once the node is known to reach an end.
    pub reaches_end: bool,
}

impl GraphNode {
    fn new(node_index: usize, kind: NodeKind) -> Self {
        Self {
            id: kind.id().to_string(),
            node_index,
            kind,
            parents: Vec::new(),
            children: Vec::new(),
            function_name: None,
            reaches_end: false,
        }
    }

    pub fn child_for_port(&self, port: PortId) -> Option<NodeIdx> {
        self.children
            .iter()
            .find(|child| child.port == port)
            .map(|child| child.target)
    }

    /// The follow-up step of a linear node.
    pub fn next(&self) -> Option<NodeIdx> {
        self.children.first().map(|child| child.target)
    }

    pub fn has_multiple_parents(&self) -> bool {
        self.parents.len() > 1
    }

    /// Whether some declared branch of a choice or condition node has no
    /// edge. For conditions the else branch counts as declared.
    pub fn has_open_branch(&self) -> bool {
        match &self.kind {
            NodeKind::Choice(_) => self
                .kind
                .declared_ports()
                .into_iter()
                .any(|port| self.child_for_port(port).is_none()),
            NodeKind::Condition(_) => {
                self.child_for_port(PortId::Else).is_none()
                    || self
                        .kind
                        .declared_ports()
                        .into_iter()
                        .any(|port| self.child_for_port(port).is_none())
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DialogGraph {
    dialog_id: String,
    nodes: Vec<GraphNode>,
    root: NodeIdx,
}

impl DialogGraph {
    /// Build the graph of a dialog record.
    ///
    /// Fails when the record does not have exactly one node that no link
    /// targets. Nodes not reachable from the root are not part of the graph.
    pub fn parse(record: &DialogRecord) -> Result<DialogGraph, GraphError> {
        let mut kinds: Vec<NodeKind> = Vec::with_capacity(record.node_count());
        kinds.extend(record.text_lines.iter().cloned().map(NodeKind::TextLine));
        kinds.extend(record.choices.iter().cloned().map(NodeKind::Choice));
        kinds.extend(record.actions.iter().cloned().map(NodeKind::Action));
        kinds.extend(record.conditions.iter().cloned().map(NodeKind::Condition));
        kinds.extend(record.references.iter().cloned().map(NodeKind::Reference));

        let mut by_id: FxHashMap<&str, &NodeKind> = FxHashMap::default();
        for kind in &kinds {
            if by_id.insert(kind.id(), kind).is_some() {
                tracing::warn!(dialog = %record.id, node = kind.id(), "duplicate node id");
            }
        }

        let targets: FxHashSet<&str> = record
            .links
            .iter()
            .map(|link| link.target_node_id.as_str())
            .collect();
        let mut roots: Vec<&NodeKind> = Vec::new();
        let mut root_ids: FxHashSet<&str> = FxHashSet::default();
        for kind in &kinds {
            if !targets.contains(kind.id()) && root_ids.insert(kind.id()) {
                roots.push(kind);
            }
        }
        if roots.len() != 1 {
            return Err(GraphError::RootNodeCountNotOne(roots.len()));
        }

        let mut links_by_source: FxHashMap<&str, Vec<&NodeLink>> = FxHashMap::default();
        for link in &record.links {
            links_by_source
                .entry(link.source_node_id.as_str())
                .or_default()
                .push(link);
        }

        let mut graph = DialogGraph {
            dialog_id: record.id.clone(),
            nodes: vec![GraphNode::new(0, roots[0].clone())],
            root: NodeIdx(0),
        };
        let mut seen: FxHashMap<String, NodeIdx> = FxHashMap::default();
        seen.insert(graph.nodes[0].id.clone(), NodeIdx(0));

        let mut queue = VecDeque::from([NodeIdx(0)]);
        while let Some(source) = queue.pop_front() {
            let source_id = graph.nodes[source.0].id.clone();
            let links = links_by_source
                .get(source_id.as_str())
                .map(Vec::as_slice)
                .unwrap_or_default();

            for link in links {
                let port = PortId::parse(link.source_node_port.as_deref());
                let source_node = &graph.nodes[source.0];
                if source_node.kind.is_branching() && source_node.child_for_port(port).is_some() {
                    tracing::warn!(
                        dialog = %record.id,
                        node = %source_id,
                        ?port,
                        "second link on the same port ignored"
                    );
                    continue;
                }

                let target = match seen.get(link.target_node_id.as_str()) {
                    Some(existing) => *existing,
                    None => {
                        let Some(kind) = by_id.get(link.target_node_id.as_str()) else {
                            tracing::warn!(
                                dialog = %record.id,
                                target = %link.target_node_id,
                                "link to unknown node ignored"
                            );
                            continue;
                        };
                        let idx = NodeIdx(graph.nodes.len());
                        graph.nodes.push(GraphNode::new(idx.0, (*kind).clone()));
                        seen.insert(link.target_node_id.clone(), idx);
                        queue.push_back(idx);
                        idx
                    }
                };

                graph.nodes[source.0].children.push(GraphChild { port, target });
                let parents = &mut graph.nodes[target.0].parents;
                if !parents.contains(&source) {
                    parents.push(source);
                }
            }

            graph.order_children(source);
        }

        tracing::debug!(
            dialog = %record.id,
            nodes = graph.nodes.len(),
            unreachable = kinds.len().saturating_sub(graph.nodes.len()),
            "parsed dialog graph"
        );
        Ok(graph)
    }

    /// Stable re-order of a branching node's children into declared order.
    /// Children whose port matches no declared branch keep their discovery
    /// order at the end.
    fn order_children(&mut self, idx: NodeIdx) {
        let node = &mut self.nodes[idx.0];
        if !node.kind.is_branching() {
            return;
        }
        let declared = node.kind.declared_ports();
        node.children.sort_by_key(|child| {
            declared
                .iter()
                .position(|port| *port == child.port)
                .unwrap_or(declared.len())
        });
    }

    pub fn dialog_id(&self) -> &str {
        &self.dialog_id
    }

    pub fn root(&self) -> NodeIdx {
        self.root
    }

    pub fn node(&self, idx: NodeIdx) -> &GraphNode {
        &self.nodes[idx.0]
    }

    pub fn node_mut(&mut self, idx: NodeIdx) -> &mut GraphNode {
        &mut self.nodes[idx.0]
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn find(&self, id: &str) -> Option<NodeIdx> {
        self.nodes
            .iter()
            .position(|node| node.id == id)
            .map(NodeIdx)
    }

    /// Every node once, breadth-first from the root.
    pub fn bfs_order(&self) -> Vec<NodeIdx> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut seen = FxHashSet::default();
        let mut queue = VecDeque::from([self.root]);
        seen.insert(self.root);
        while let Some(idx) = queue.pop_front() {
            order.push(idx);
            for child in &self.nodes[idx.0].children {
                if seen.insert(child.target) {
                    queue.push_back(child.target);
                }
            }
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> DialogRecord {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn port_parsing() {
        assert_eq!(PortId::parse(Some("choice3")), PortId::Index(3));
        assert_eq!(PortId::parse(Some("Condition12")), PortId::Index(12));
        assert_eq!(PortId::parse(Some("ELSE")), PortId::Else);
        assert_eq!(PortId::parse(Some("7")), PortId::Index(7));
        assert_eq!(PortId::parse(Some("output")), PortId::Index(0));
        assert_eq!(PortId::parse(Some("choice")), PortId::Index(0));
        assert_eq!(PortId::parse(None), PortId::Index(0));
    }

    #[test]
    fn diamond_is_not_duplicated() {
        let dialog = record(json!({
            "id": "d",
            "textLines": [
                { "id": "a", "speaker": "npc", "text": "A" },
                { "id": "b", "speaker": "player", "text": "B" },
                { "id": "c", "speaker": "player", "text": "C" },
                { "id": "d", "speaker": "npc", "text": "D" }
            ],
            "links": [
                { "sourceNodeId": "a", "targetNodeId": "b" },
                { "sourceNodeId": "a", "targetNodeId": "c" },
                { "sourceNodeId": "b", "targetNodeId": "d" },
                { "sourceNodeId": "c", "targetNodeId": "d" }
            ]
        }));
        let graph = DialogGraph::parse(&dialog).unwrap();
        assert_eq!(graph.len(), 4);
        let d = graph.find("d").unwrap();
        assert_eq!(graph.node(d).parents.len(), 2);
        assert!(graph.node(d).has_multiple_parents());
        assert_eq!(graph.node(graph.root()).id, "a");
        assert_eq!(graph.node(d).node_index, 3);
    }

    #[test]
    fn root_count_must_be_one() {
        let none = record(json!({
            "id": "loop",
            "textLines": [
                { "id": "a", "speaker": "npc" },
                { "id": "b", "speaker": "npc" }
            ],
            "links": [
                { "sourceNodeId": "a", "targetNodeId": "b" },
                { "sourceNodeId": "b", "targetNodeId": "a" }
            ]
        }));
        assert_eq!(
            DialogGraph::parse(&none).unwrap_err(),
            GraphError::RootNodeCountNotOne(0)
        );

        let two = record(json!({
            "id": "two",
            "textLines": [
                { "id": "a", "speaker": "npc" },
                { "id": "b", "speaker": "npc" }
            ]
        }));
        assert_eq!(
            DialogGraph::parse(&two).unwrap_err(),
            GraphError::RootNodeCountNotOne(2)
        );

        let empty = record(json!({ "id": "empty" }));
        assert!(DialogGraph::parse(&empty).is_err());
    }

    #[test]
    fn choice_children_follow_declared_order() {
        let dialog = record(json!({
            "id": "d",
            "choices": [{ "id": "c", "choices": [
                { "id": 2, "text": "Second" },
                { "id": 1, "text": "First" }
            ]}],
            "textLines": [
                { "id": "one", "speaker": "player" },
                { "id": "two", "speaker": "player" },
                { "id": "stray", "speaker": "player" }
            ],
            "links": [
                { "sourceNodeId": "c", "sourceNodePort": "garbage", "targetNodeId": "stray" },
                { "sourceNodeId": "c", "sourceNodePort": "choice1", "targetNodeId": "one" },
                { "sourceNodeId": "c", "sourceNodePort": "choice2", "targetNodeId": "two" }
            ]
        }));
        let graph = DialogGraph::parse(&dialog).unwrap();
        let root = graph.node(graph.root());
        let order: Vec<&str> = root
            .children
            .iter()
            .map(|child| graph.node(child.target).id.as_str())
            .collect();
        assert_eq!(order, vec!["two", "one", "stray"]);
        assert_eq!(root.children[2].port, PortId::Index(0));
    }

    #[test]
    fn condition_else_goes_last() {
        let dialog = record(json!({
            "id": "d",
            "conditions": [{ "id": "k", "conditions": [{ "id": 1 }, { "id": 2 }] }],
            "textLines": [
                { "id": "yes", "speaker": "npc" },
                { "id": "no", "speaker": "npc" },
                { "id": "other", "speaker": "npc" }
            ],
            "links": [
                { "sourceNodeId": "k", "sourceNodePort": "else", "targetNodeId": "no" },
                { "sourceNodeId": "k", "sourceNodePort": "condition2", "targetNodeId": "other" },
                { "sourceNodeId": "k", "sourceNodePort": "condition1", "targetNodeId": "yes" }
            ]
        }));
        let graph = DialogGraph::parse(&dialog).unwrap();
        let root = graph.node(graph.root());
        let ports: Vec<PortId> = root.children.iter().map(|c| c.port).collect();
        assert_eq!(ports, vec![PortId::Index(1), PortId::Index(2), PortId::Else]);
        assert!(!root.has_open_branch());
    }

    #[test]
    fn duplicate_port_and_unknown_target_are_dropped() {
        let dialog = record(json!({
            "id": "d",
            "choices": [{ "id": "c", "choices": [{ "id": 1, "text": "Only" }] }],
            "textLines": [
                { "id": "first", "speaker": "npc" },
                { "id": "second", "speaker": "npc" }
            ],
            "links": [
                { "sourceNodeId": "c", "sourceNodePort": "choice1", "targetNodeId": "first" },
                { "sourceNodeId": "c", "sourceNodePort": "choice1", "targetNodeId": "second" },
                { "sourceNodeId": "first", "targetNodeId": "ghost" }
            ]
        }));
        // "second" and "ghost" are link targets, so "c" stays the only root
        let graph = DialogGraph::parse(&dialog).unwrap();
        assert_eq!(graph.len(), 2);
        assert!(graph.find("second").is_none());
        assert!(graph.node(graph.find("first").unwrap()).children.is_empty());
    }

    #[test]
    fn open_branches() {
        let dialog = record(json!({
            "id": "d",
            "choices": [{ "id": "c", "choices": [
                { "id": 1, "text": "Hello" },
                { "id": 2, "text": "Bye" }
            ]}],
            "textLines": [{ "id": "t", "speaker": "npc" }],
            "links": [
                { "sourceNodeId": "c", "sourceNodePort": "choice1", "targetNodeId": "t" }
            ]
        }));
        let graph = DialogGraph::parse(&dialog).unwrap();
        assert!(graph.node(graph.root()).has_open_branch());
        assert!(!graph.node(graph.find("t").unwrap()).has_open_branch());
    }

    #[test]
    fn bfs_visits_cycles_once() {
        let dialog = record(json!({
            "id": "d",
            "textLines": [
                { "id": "a", "speaker": "npc" },
                { "id": "b", "speaker": "npc" },
                { "id": "c", "speaker": "npc" }
            ],
            "links": [
                { "sourceNodeId": "a", "targetNodeId": "b" },
                { "sourceNodeId": "b", "targetNodeId": "c" },
                { "sourceNodeId": "c", "targetNodeId": "b" }
            ]
        }));
        let graph = DialogGraph::parse(&dialog).unwrap();
        assert_eq!(graph.bfs_order(), vec![NodeIdx(0), NodeIdx(1), NodeIdx(2)]);
        assert_eq!(graph.node(NodeIdx(1)).parents, vec![NodeIdx(0), NodeIdx(2)]);
    }
}
