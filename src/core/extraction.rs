/// Function extraction: decides which nodes start their own generated
/// function and collects the node set of every function.
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::core::graph::{DialogGraph, GraphNode, NodeIdx, StepKind};
use crate::schema::action::ActionType;

/// Which nodes a rule condition looks at, relative to the evaluated node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeTarget {
    #[default]
    Current,
    AnyParent,
    AnyChild,
}

/// A predicate over a node and its neighbourhood.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RuleCondition {
    And(Vec<RuleCondition>),
    Or(Vec<RuleCondition>),
    Not(Box<RuleCondition>),
    MultipleParents,
    NodeType {
        #[serde(default)]
        target: NodeTarget,
        node_type: StepKind,
    },
    ActionType {
        #[serde(default)]
        target: NodeTarget,
        action_type: ActionType,
    },
}

impl RuleCondition {
    pub fn matches(&self, graph: &DialogGraph, idx: NodeIdx) -> bool {
        match self {
            Self::And(conditions) => conditions.iter().all(|c| c.matches(graph, idx)),
            Self::Or(conditions) => conditions.iter().any(|c| c.matches(graph, idx)),
            Self::Not(condition) => !condition.matches(graph, idx),
            Self::MultipleParents => graph.node(idx).has_multiple_parents(),
            Self::NodeType { target, node_type } => targets(graph, idx, *target)
                .iter()
                .any(|node| node.kind.step_kind() == *node_type),
            Self::ActionType {
                target,
                action_type,
            } => targets(graph, idx, *target)
                .iter()
                .any(|node| node.kind.action_type() == Some(*action_type)),
        }
    }
}

fn targets(graph: &DialogGraph, idx: NodeIdx, target: NodeTarget) -> Vec<&GraphNode> {
    let node = graph.node(idx);
    match target {
        NodeTarget::Current => vec![node],
        NodeTarget::AnyParent => node.parents.iter().map(|p| graph.node(*p)).collect(),
        NodeTarget::AnyChild => node
            .children
            .iter()
            .map(|child| graph.node(child.target))
            .collect(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRule {
    pub name: String,
    pub condition: RuleCondition,
}

impl GenerationRule {
    pub fn new(name: impl Into<String>, condition: RuleCondition) -> Self {
        Self {
            name: name.into(),
            condition,
        }
    }
}

/// Prevention rules win over generation rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionGenerationRules {
    #[serde(default)]
    pub prevent_generation_rules: Vec<GenerationRule>,
    #[serde(default)]
    pub generate_rules: Vec<GenerationRule>,
}

impl Default for FunctionGenerationRules {
    fn default() -> Self {
        Self {
            prevent_generation_rules: Vec::new(),
            generate_rules: vec![
                GenerationRule::new("multiple parents", RuleCondition::MultipleParents),
                GenerationRule::new(
                    "choice parent",
                    RuleCondition::NodeType {
                        target: NodeTarget::AnyParent,
                        node_type: StepKind::Choice,
                    },
                ),
                GenerationRule::new(
                    "wait parent",
                    RuleCondition::ActionType {
                        target: NodeTarget::AnyParent,
                        action_type: ActionType::Wait,
                    },
                ),
            ],
        }
    }
}

impl FunctionGenerationRules {
    /// The rule that decides the node's fate, if any. `Err` carries a
    /// prevention rule, `Ok` a generation rule.
    fn decide(
        &self,
        graph: &DialogGraph,
        idx: NodeIdx,
    ) -> Option<Result<&GenerationRule, &GenerationRule>> {
        if let Some(rule) = self
            .prevent_generation_rules
            .iter()
            .find(|rule| rule.condition.matches(graph, idx))
        {
            return Some(Err(rule));
        }
        self.generate_rules
            .iter()
            .find(|rule| rule.condition.matches(graph, idx))
            .map(Ok)
    }
}

/// Hands out stable function ids. Asking twice for the same key returns the
/// same id.
pub trait FunctionIdAllocator {
    fn get_or_create(&mut self, project_id: &str, object_id: &str, function_key: &str) -> u64;
}

/// Counter per (project, object), starting at 1.
#[derive(Debug, Default)]
pub struct InMemoryFunctionIdAllocator {
    counters: FxHashMap<(String, String), u64>,
    ids: FxHashMap<(String, String, String), u64>,
}

impl InMemoryFunctionIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl FunctionIdAllocator for InMemoryFunctionIdAllocator {
    fn get_or_create(&mut self, project_id: &str, object_id: &str, function_key: &str) -> u64 {
        let key = (
            project_id.to_string(),
            object_id.to_string(),
            function_key.to_string(),
        );
        if let Some(id) = self.ids.get(&key) {
            return *id;
        }
        let counter = self
            .counters
            .entry((project_id.to_string(), object_id.to_string()))
            .or_insert(0);
        *counter += 1;
        self.ids.insert(key, *counter);
        *counter
    }
}

/// Evaluate the rules on every node and store the resulting function names.
///
/// The root never gets a name. Re-running with the same allocator gives the
/// same names.
pub fn assign_function_names(
    graph: &mut DialogGraph,
    rules: &FunctionGenerationRules,
    allocator: &mut dyn FunctionIdAllocator,
    project_id: &str,
    object_id: &str,
) {
    let root = graph.root();
    graph.node_mut(root).function_name = None;

    for idx in graph.bfs_order() {
        if idx == root {
            continue;
        }
        let name = match rules.decide(graph, idx) {
            Some(Ok(rule)) => {
                let node = graph.node(idx);
                let id = allocator.get_or_create(project_id, object_id, &node.id);
                let name = format!("{}_{}", node.kind.step_kind().name(), id);
                tracing::debug!(node = %node.id, rule = %rule.name, %name, "node starts a function");
                Some(name)
            }
            Some(Err(rule)) => {
                tracing::debug!(node = %graph.node(idx).id, rule = %rule.name, "function prevented");
                None
            }
            None => None,
        };
        graph.node_mut(idx).function_name = name;
    }
}

/// A generated function: its root and the nodes rendered inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogFunction {
    pub root: NodeIdx,
    /// `None` for the start function.
    pub name: Option<String>,
    pub nodes: Vec<NodeIdx>,
}

impl DialogFunction {
    pub fn contains(&self, idx: NodeIdx) -> bool {
        self.nodes.contains(&idx)
    }
}

/// The start function followed by one function per named node, in node
/// creation order.
pub fn collect_functions(graph: &DialogGraph) -> Vec<DialogFunction> {
    let mut functions = vec![DialogFunction {
        root: graph.root(),
        name: None,
        nodes: function_body(graph, graph.root()),
    }];

    let mut named: Vec<&GraphNode> = graph
        .nodes()
        .iter()
        .filter(|node| node.function_name.is_some() && node.node_index != graph.root().0)
        .collect();
    named.sort_by_key(|node| node.node_index);

    for node in named {
        let root = NodeIdx(node.node_index);
        functions.push(DialogFunction {
            root,
            name: node.function_name.clone(),
            nodes: function_body(graph, root),
        });
    }
    functions
}

fn function_body(graph: &DialogGraph, root: NodeIdx) -> Vec<NodeIdx> {
    let mut nodes = vec![root];
    let mut seen = FxHashSet::default();
    seen.insert(root);
    let mut queue = VecDeque::from([root]);
    while let Some(idx) = queue.pop_front() {
        for child in &graph.node(idx).children {
            let target = child.target;
            if graph.node(target).function_name.is_some() || !seen.insert(target) {
                continue;
            }
            nodes.push(target);
            queue.push_back(target);
        }
    }
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::dialog::DialogRecord;
    use serde_json::json;

    fn branching_dialog() -> DialogGraph {
        let record: DialogRecord = serde_json::from_value(json!({
            "id": "dlg",
            "textLines": [
                { "id": "greet", "speaker": "npc", "text": "Hi" },
                { "id": "yes", "speaker": "player", "text": "Yes" },
                { "id": "no", "speaker": "player", "text": "No" },
                { "id": "bye", "speaker": "npc", "text": "Bye" }
            ],
            "choices": [{ "id": "ask", "choices": [
                { "id": 1, "text": "Yes" },
                { "id": 2, "text": "No" }
            ]}],
            "links": [
                { "sourceNodeId": "greet", "targetNodeId": "ask" },
                { "sourceNodeId": "ask", "sourceNodePort": "choice1", "targetNodeId": "yes" },
                { "sourceNodeId": "ask", "sourceNodePort": "choice2", "targetNodeId": "no" },
                { "sourceNodeId": "yes", "targetNodeId": "bye" },
                { "sourceNodeId": "no", "targetNodeId": "bye" }
            ]
        }))
        .unwrap();
        DialogGraph::parse(&record).unwrap()
    }

    fn names(graph: &DialogGraph) -> Vec<(String, Option<String>)> {
        graph
            .nodes()
            .iter()
            .map(|node| (node.id.clone(), node.function_name.clone()))
            .collect()
    }

    #[test]
    fn default_rules_split_choice_children_and_merges() {
        let mut graph = branching_dialog();
        let mut ids = InMemoryFunctionIdAllocator::new();
        assign_function_names(
            &mut graph,
            &FunctionGenerationRules::default(),
            &mut ids,
            "p",
            "npc1",
        );

        let yes = graph.find("yes").unwrap();
        let no = graph.find("no").unwrap();
        let bye = graph.find("bye").unwrap();
        let ask = graph.find("ask").unwrap();
        assert_eq!(graph.node(yes).function_name.as_deref(), Some("PlayerText_1"));
        assert_eq!(graph.node(no).function_name.as_deref(), Some("PlayerText_2"));
        assert_eq!(graph.node(bye).function_name.as_deref(), Some("NpcText_3"));
        assert!(graph.node(ask).function_name.is_none());
        assert!(graph.node(graph.root()).function_name.is_none());
    }

    #[test]
    fn extraction_is_idempotent() {
        let mut graph = branching_dialog();
        let mut ids = InMemoryFunctionIdAllocator::new();
        let rules = FunctionGenerationRules::default();
        assign_function_names(&mut graph, &rules, &mut ids, "p", "npc1");
        let first = names(&graph);
        let first_functions = collect_functions(&graph);

        assign_function_names(&mut graph, &rules, &mut ids, "p", "npc1");
        assert_eq!(names(&graph), first);
        assert_eq!(collect_functions(&graph), first_functions);
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn prevention_wins() {
        let mut graph = branching_dialog();
        let mut ids = InMemoryFunctionIdAllocator::new();
        let rules = FunctionGenerationRules {
            prevent_generation_rules: vec![GenerationRule::new(
                "keep player lines inline",
                RuleCondition::NodeType {
                    target: NodeTarget::Current,
                    node_type: StepKind::PlayerText,
                },
            )],
            ..FunctionGenerationRules::default()
        };
        assign_function_names(&mut graph, &rules, &mut ids, "p", "npc1");
        let named: Vec<&str> = graph
            .nodes()
            .iter()
            .filter_map(|node| node.function_name.as_deref())
            .collect();
        assert_eq!(named, vec!["NpcText_1"]);
    }

    #[test]
    fn unmatched_nodes_lose_stale_names() {
        let mut graph = branching_dialog();
        let bye = graph.find("bye").unwrap();
        let greet = graph.root();
        graph.node_mut(greet).function_name = Some("stale".to_string());
        let rules = FunctionGenerationRules {
            prevent_generation_rules: Vec::new(),
            generate_rules: Vec::new(),
        };
        assign_function_names(&mut graph, &rules, &mut InMemoryFunctionIdAllocator::new(), "p", "o");
        assert!(graph.nodes().iter().all(|node| node.function_name.is_none()));
        assert_eq!(collect_functions(&graph).len(), 1);
        assert!(collect_functions(&graph)[0].contains(bye));
    }

    #[test]
    fn function_bodies_stop_at_named_nodes() {
        let mut graph = branching_dialog();
        let mut ids = InMemoryFunctionIdAllocator::new();
        assign_function_names(
            &mut graph,
            &FunctionGenerationRules::default(),
            &mut ids,
            "p",
            "npc1",
        );
        let functions = collect_functions(&graph);
        assert_eq!(functions.len(), 4);

        let start = &functions[0];
        assert!(start.name.is_none());
        let start_ids: Vec<&str> = start.nodes.iter().map(|i| graph.node(*i).id.as_str()).collect();
        assert_eq!(start_ids, vec!["greet", "ask"]);

        let order: Vec<&str> = functions[1..]
            .iter()
            .map(|f| f.name.as_deref().unwrap())
            .collect();
        assert_eq!(order, vec!["PlayerText_1", "PlayerText_2", "NpcText_3"]);
        assert_eq!(functions[1].nodes.len(), 1);
    }

    #[test]
    fn composite_conditions() {
        let graph = branching_dialog();
        let bye = graph.find("bye").unwrap();
        let yes = graph.find("yes").unwrap();

        let not_merge = RuleCondition::Not(Box::new(RuleCondition::MultipleParents));
        assert!(!not_merge.matches(&graph, bye));
        assert!(not_merge.matches(&graph, yes));

        let child_is_npc = RuleCondition::NodeType {
            target: NodeTarget::AnyChild,
            node_type: StepKind::NpcText,
        };
        let both = RuleCondition::And(vec![child_is_npc.clone(), not_merge]);
        assert!(both.matches(&graph, yes));
        assert!(RuleCondition::Or(vec![child_is_npc, RuleCondition::MultipleParents]).matches(&graph, bye));
    }

    #[test]
    fn rules_from_ron() {
        let rules: FunctionGenerationRules = ron::from_str(
            r#"(
                prevent_generation_rules: [
                    (name: "no actions", condition: NodeType(node_type: Action)),
                ],
                generate_rules: [
                    (name: "after wait", condition: ActionType(target: AnyParent, action_type: Wait)),
                    (name: "not merge", condition: Not(MultipleParents)),
                ],
            )"#,
        )
        .unwrap();
        assert_eq!(
            rules.prevent_generation_rules[0].condition,
            RuleCondition::NodeType {
                target: NodeTarget::Current,
                node_type: StepKind::Action,
            }
        );
        assert_eq!(rules.generate_rules.len(), 2);
    }

    #[test]
    fn allocator_counts_per_object() {
        let mut ids = InMemoryFunctionIdAllocator::new();
        assert_eq!(ids.get_or_create("p", "a", "n1"), 1);
        assert_eq!(ids.get_or_create("p", "a", "n2"), 2);
        assert_eq!(ids.get_or_create("p", "b", "n1"), 1);
        assert_eq!(ids.get_or_create("p", "a", "n1"), 1);
    }
}
