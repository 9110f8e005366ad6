//! Arena-backed trace-point tree.
//!
//! The tree is shared by every worker thread of one invocation, so it lives
//! behind a single `parking_lot::Mutex` rather than per-node `Rc<RefCell<_>>`
//! back-references: children and parents are `NodeId` indices into one
//! `Vec<TraceNode>`, the same two-phase-insertion-with-stable-ids pattern the
//! LTS state arena uses for `State`/`StateInfo`.

/// Stable index into a [`TraceArena`]. Never reused within one arena's
/// lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    fn new(idx: usize) -> Self {
        Self(idx as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// How a container node finished, set exactly once when it is closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Value(String),
    Exception(String),
    Unfinished,
}

#[derive(Debug, Clone)]
pub struct MethodCallNode {
    pub class: String,
    pub method: String,
    pub obj: u64,
    pub params: Vec<String>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub completion: Option<Completion>,
}

#[derive(Debug, Clone)]
pub struct LoopNode {
    pub loop_id: u64,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub completion: Option<Completion>,
}

#[derive(Debug, Clone)]
pub struct LoopIterationNode {
    pub parent: NodeId,
    pub children: Vec<NodeId>,
    pub completion: Option<Completion>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafKind {
    Read,
    Write,
    ArrayRead,
    ArrayWrite,
    LocalRead,
    LocalWrite,
}

#[derive(Debug, Clone)]
pub struct LeafNode {
    pub kind: LeafKind,
    pub field: Option<String>,
    pub value: String,
    pub parent: NodeId,
}

#[derive(Debug, Clone)]
pub enum TraceNode {
    MethodCall(MethodCallNode),
    Loop(LoopNode),
    LoopIteration(LoopIterationNode),
    Leaf(LeafNode),
}

impl TraceNode {
    pub fn parent(&self) -> Option<NodeId> {
        match self {
            TraceNode::MethodCall(n) => n.parent,
            TraceNode::Loop(n) => n.parent,
            TraceNode::LoopIteration(n) => Some(n.parent),
            TraceNode::Leaf(n) => Some(n.parent),
        }
    }

    pub fn is_container(&self) -> bool {
        !matches!(self, TraceNode::Leaf(_))
    }

    /// `None` means still open; every container must eventually have `Some`.
    pub fn completion(&self) -> Option<&Completion> {
        match self {
            TraceNode::MethodCall(n) => n.completion.as_ref(),
            TraceNode::Loop(n) => n.completion.as_ref(),
            TraceNode::LoopIteration(n) => n.completion.as_ref(),
            TraceNode::Leaf(_) => None,
        }
    }
}

/// A single invocation's trace-point tree. Discarded after reporting —
/// never retained across invocations.
#[derive(Debug, Default)]
pub struct TraceArena {
    nodes: Vec<TraceNode>,
}

impl TraceArena {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    pub fn push(&mut self, node: TraceNode) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        if let Some(parent) = node.parent() {
            self.add_child(parent, id);
        }
        self.nodes.push(node);
        id
    }

    fn add_child(&mut self, parent: NodeId, child: NodeId) {
        match &mut self.nodes[parent.index()] {
            TraceNode::MethodCall(n) => n.children.push(child),
            TraceNode::Loop(n) => n.children.push(child),
            TraceNode::LoopIteration(n) => n.children.push(child),
            TraceNode::Leaf(_) => unreachable!("leaf nodes cannot be a parent"),
        }
    }

    pub fn get(&self, id: NodeId) -> &TraceNode {
        &self.nodes[id.index()]
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut TraceNode {
        &mut self.nodes[id.index()]
    }

    pub fn close(&mut self, id: NodeId, completion: Completion) {
        match &mut self.nodes[id.index()] {
            TraceNode::MethodCall(n) => n.completion = Some(completion),
            TraceNode::Loop(n) => n.completion = Some(completion),
            TraceNode::LoopIteration(n) => n.completion = Some(completion),
            TraceNode::Leaf(_) => {}
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Testable property 6: every container has a completion set.
    pub fn all_containers_closed(&self) -> bool {
        self.nodes.iter().filter(|n| n.is_container()).all(|n| n.completion().is_some())
    }

    pub fn open_container_ids(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_container() && n.completion().is_none())
            .map(|(i, _)| NodeId::new(i))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_method_call_has_no_parent() {
        let mut arena = TraceArena::new();
        let id = arena.push(TraceNode::MethodCall(MethodCallNode {
            class: "Thread".into(),
            method: "run".into(),
            obj: 0,
            params: vec![],
            parent: None,
            children: vec![],
            completion: None,
        }));
        assert!(arena.get(id).parent().is_none());
        assert!(!arena.all_containers_closed());
    }

    #[test]
    fn closing_marks_container_closed_and_parent_tracks_child() {
        let mut arena = TraceArena::new();
        let root = arena.push(TraceNode::MethodCall(MethodCallNode {
            class: "Thread".into(),
            method: "run".into(),
            obj: 0,
            params: vec![],
            parent: None,
            children: vec![],
            completion: None,
        }));
        let call = arena.push(TraceNode::MethodCall(MethodCallNode {
            class: "Queue".into(),
            method: "poll".into(),
            obj: 1,
            params: vec![],
            parent: Some(root),
            children: vec![],
            completion: None,
        }));
        arena.close(call, Completion::Value("1".into()));
        arena.close(root, Completion::Value("()".into()));

        assert!(arena.all_containers_closed());
        match arena.get(root) {
            TraceNode::MethodCall(n) => assert_eq!(n.children, vec![call]),
            _ => panic!("expected method call"),
        }
    }

    #[test]
    fn open_container_ids_reports_unclosed_nodes() {
        let mut arena = TraceArena::new();
        let root = arena.push(TraceNode::MethodCall(MethodCallNode {
            class: "Thread".into(),
            method: "run".into(),
            obj: 0,
            params: vec![],
            parent: None,
            children: vec![],
            completion: None,
        }));
        assert_eq!(arena.open_container_ids(), vec![root]);
    }

    use proptest::prelude::*;
    use std::collections::HashSet;

    proptest! {
        // Container balance: whichever subset of containers
        // gets closed, `open_container_ids` must report exactly the
        // complement, and `all_containers_closed` must agree with whether
        // that complement is empty.
        #[test]
        fn open_container_ids_matches_exactly_the_unclosed_subset(closed in prop::collection::vec(any::<bool>(), 1..32)) {
            let mut arena = TraceArena::new();
            let root = arena.push(TraceNode::MethodCall(MethodCallNode {
                class: "Thread".into(),
                method: "run".into(),
                obj: 0,
                params: vec![],
                parent: None,
                children: vec![],
                completion: None,
            }));

            let mut expected_open: HashSet<NodeId> = HashSet::new();
            expected_open.insert(root);

            for should_close in &closed {
                let child = arena.push(TraceNode::MethodCall(MethodCallNode {
                    class: "Queue".into(),
                    method: "poll".into(),
                    obj: 1,
                    params: vec![],
                    parent: Some(root),
                    children: vec![],
                    completion: None,
                }));
                expected_open.insert(child);
                if *should_close {
                    arena.close(child, Completion::Value("1".into()));
                    expected_open.remove(&child);
                }
            }

            let actual_open: HashSet<NodeId> = arena.open_container_ids().into_iter().collect();
            prop_assert_eq!(actual_open.clone(), expected_open);
            prop_assert_eq!(arena.all_containers_closed(), actual_open.is_empty());
        }
    }
}
