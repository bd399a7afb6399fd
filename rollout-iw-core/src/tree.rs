/*
 *  SPDX-License-Identifier: Apache-2.0 OR MIT
 *  © 2020-2022 ETH Zurich and other contributors, see AUTHORS.txt for details
 */

use std::{
    collections::VecDeque,
    mem,
    sync::atomic::{AtomicU64, Ordering},
};

use crate::{Action, NodeId, Transition, TreeNode};

/// The root is always the first node of the arena.
const ROOT: NodeId = NodeId(0);

/// Source of tree lineages, a lineage starts whenever a tree is built from scratch.
static NEXT_LINEAGE: AtomicU64 = AtomicU64::new(0);

fn next_lineage() -> u64 {
    NEXT_LINEAGE.fetch_add(1, Ordering::Relaxed)
}

/// An explicit search tree: an arena of nodes, the root and the branching factor of the simulator.
///
/// Every node except the root is reachable from the root by exactly one path of actions,
/// each node has at most one child per action.
///
/// A clone is an independent search: it starts its own lineage.
#[derive(Debug)]
pub struct SearchTree<S> {
    nodes: Vec<TreeNode<S>>,
    branching_factor: usize,
    // identifies trees whose nodes descend from the same fresh root
    lineage: u64,
    // depth of the current root since the start of the lineage
    root_depth: u32,
}

impl<S> SearchTree<S> {
    /// Creates a new tree with a single root node.
    pub fn new(root: Transition<S>, branching_factor: usize) -> Self {
        SearchTree {
            nodes: vec![TreeNode::new(root, None, None, 0, branching_factor)],
            branching_factor,
            lineage: next_lineage(),
            root_depth: 0,
        }
    }

    /// Returns the root node identifier.
    pub fn root(&self) -> NodeId {
        ROOT
    }

    /// Returns the root node.
    pub fn root_node(&self) -> &TreeNode<S> {
        &self.nodes[ROOT.index()]
    }

    /// Returns the number of actions of the simulator.
    pub fn branching_factor(&self) -> usize {
        self.branching_factor
    }

    /// Returns the number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// A tree always has a root, so this is always false.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the lineage of this tree.
    ///
    /// Re-rooting with a cached subtree keeps the lineage, building a tree from scratch starts a new one.
    pub fn lineage(&self) -> u64 {
        self.lineage
    }

    /// Returns the depth of the current root since the start of the lineage.
    pub fn root_depth(&self) -> u32 {
        self.root_depth
    }

    /// Returns the depth of a node since the start of the lineage.
    pub fn absolute_depth(&self, id: NodeId) -> u32 {
        self.root_depth + self.node(id).depth
    }

    /// Returns a node, panics if the identifier does not belong to this tree.
    pub fn node(&self, id: NodeId) -> &TreeNode<S> {
        &self.nodes[id.index()]
    }

    /// Returns a node, None if the identifier does not belong to this tree.
    pub fn get(&self, id: NodeId) -> Option<&TreeNode<S>> {
        self.nodes.get(id.index())
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut TreeNode<S> {
        &mut self.nodes[id.index()]
    }

    /// Returns the child of `id` reached through `action`, if already generated.
    pub fn child(&self, id: NodeId, action: Action) -> Option<NodeId> {
        self.node(id).child(action)
    }

    /// Follows a sequence of actions from the root, None if some edge was not generated.
    pub fn follow(&self, actions: &[Action]) -> Option<NodeId> {
        actions
            .iter()
            .try_fold(ROOT, |node, &action| self.child(node, action))
    }

    /// Returns an iterator over all nodes with their identifiers, in arena order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &TreeNode<S>)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(index, node)| (NodeId(index as u32), node))
    }

    /// Adds a new child to `parent` for `action`, created from a successor's transition.
    ///
    /// Returns the identifier of the new node.
    /// The returns of `parent` and its ancestors are invalidated.
    ///
    /// # Panics
    /// Panics if `action` is out of range or if `parent` already has a child for `action`.
    pub fn add_child(&mut self, parent: NodeId, action: Action, transition: Transition<S>) -> NodeId {
        assert!(
            action < self.branching_factor,
            "Action {action} out of range for branching factor {}",
            self.branching_factor
        );
        assert!(
            self.child(parent, action).is_none(),
            "{parent} already has a child for action {action}"
        );
        let id = NodeId(self.nodes.len() as u32);
        let depth = self.node(parent).depth + 1;
        self.nodes.push(TreeNode::new(
            transition,
            Some(action),
            Some(parent),
            depth,
            self.branching_factor,
        ));
        self.node_mut(parent).children[action] = Some(id);
        self.invalidate_returns(parent);
        id
    }

    fn invalidate_returns(&mut self, mut id: NodeId) {
        loop {
            let node = self.node_mut(id);
            node.value = None;
            match node.parent {
                Some(parent) => id = parent,
                None => break,
            }
        }
    }

    /// Returns an iterator over all nodes in breadth-first order, root first.
    pub fn iter_breadth_first(&self) -> BreadthFirst<'_, S> {
        self.iter_breadth_first_from(ROOT)
    }

    /// Returns an iterator over the subtree of `id` in breadth-first order, `id` first.
    pub fn iter_breadth_first_from(&self, id: NodeId) -> BreadthFirst<'_, S> {
        BreadthFirst {
            tree: self,
            queue: VecDeque::from([id]),
        }
    }

    /// Returns all nodes in reverse breadth-first order, deepest first and root last.
    pub fn iter_breadth_first_reverse(&self) -> impl Iterator<Item = NodeId> {
        self.iter_breadth_first()
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
    }

    /// Replaces the root with its child for `action`.
    ///
    /// If `cache_subtree` is true, the whole subtree of that child is retained,
    /// otherwise only the child itself is kept and the tree starts a new lineage.
    /// All other nodes are dropped, together with their snapshots.
    /// Returns the former root, or None if the root has no child for `action`,
    /// in which case the tree is unchanged.
    ///
    /// Node identifiers are renumbered, identifiers obtained before re-rooting must not be reused.
    pub fn reroot(&mut self, action: Action, cache_subtree: bool) -> Option<TreeNode<S>> {
        let new_root = self.child(ROOT, action)?;
        let kept: Vec<NodeId> = if cache_subtree {
            self.iter_breadth_first_from(new_root).collect()
        } else {
            vec![new_root]
        };

        // Old index to new index, None for dropped nodes
        let mut remap = vec![None; self.nodes.len()];
        for (index, id) in kept.iter().enumerate() {
            remap[id.index()] = Some(NodeId(index as u32));
        }

        let mut slots: Vec<Option<TreeNode<S>>> = mem::take(&mut self.nodes)
            .into_iter()
            .map(Some)
            .collect();
        let old_root = slots[ROOT.index()].take();
        self.nodes = Vec::with_capacity(kept.len());
        for id in kept {
            if let Some(mut node) = slots[id.index()].take() {
                node.parent = node.parent.and_then(|parent| remap[parent.index()]);
                for child in node.children.iter_mut() {
                    *child = child.and_then(|child| remap[child.index()]);
                }
                node.depth = node.depth.saturating_sub(1);
                self.nodes.push(node);
            }
        }

        if cache_subtree {
            self.root_depth += 1;
        } else {
            self.lineage = next_lineage();
            self.root_depth = 0;
            self.node_mut(ROOT).value = None;
        }
        log::debug!(
            "Re-rooted through action {action}, {} node(s) kept (cache_subtree: {cache_subtree})",
            self.nodes.len()
        );

        old_root
    }

    /// Returns an estimation of the memory footprint of the tree, excluding the snapshots' heap data.
    pub fn size(&self) -> usize {
        mem::size_of::<Self>() + self.nodes.iter().map(TreeNode::size).sum::<usize>()
    }
}

impl<S: Clone> Clone for SearchTree<S> {
    fn clone(&self) -> Self {
        SearchTree {
            nodes: self.nodes.clone(),
            branching_factor: self.branching_factor,
            lineage: next_lineage(),
            root_depth: self.root_depth,
        }
    }
}

/// Breadth-first iterator over the nodes of a [SearchTree].
pub struct BreadthFirst<'a, S> {
    tree: &'a SearchTree<S>,
    queue: VecDeque<NodeId>,
}

impl<'a, S> Iterator for BreadthFirst<'a, S> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.queue.pop_front()?;
        self.queue
            .extend(self.tree.node(id).children().map(|(_, child)| child));
        Some(id)
    }
}

/// When `graphviz` feature is enabled, provides plotting of the search tree.
#[cfg(feature = "graphviz")]
pub mod graphviz {
    use super::*;
    use std::{
        borrow::Cow,
        io::{self, Write},
        sync::atomic::AtomicUsize,
    };

    use dot::{Arrow, Edges, GraphWalk, Id, Kind, LabelText, Labeller, Nodes, Style};

    use crate::best_action;

    /// Renders the search tree as graphviz's dot format.
    pub fn plot_search_tree<S, W: Write>(tree: &SearchTree<S>, w: &mut W) -> io::Result<()> {
        dot::render(tree, w)
    }

    /// An edge of the plotted tree.
    #[derive(Clone, Debug)]
    pub struct PlotEdge {
        parent: NodeId,
        child: NodeId,
        action: Action,
        best: bool,
    }

    /// The depth of the graph to plot, in number of nodes.
    static GRAPH_OUTPUT_DEPTH: AtomicUsize = AtomicUsize::new(4);

    /// Sets the depth of the graph to plot, in number of nodes.
    pub fn set_graph_output_depth(depth: usize) {
        GRAPH_OUTPUT_DEPTH.store(depth, Ordering::Relaxed);
    }
    /// Gets the depth of the graph to plot, in number of nodes.
    pub fn get_graph_output_depth() -> usize {
        GRAPH_OUTPUT_DEPTH.load(Ordering::Relaxed)
    }

    impl<S> SearchTree<S> {
        fn relevant_nodes(&self) -> Vec<NodeId> {
            let depth = get_graph_output_depth();
            self.iter_breadth_first()
                .take_while(|id| (self.node(*id).depth as usize) < depth)
                .collect()
        }

        fn value_range(&self) -> (f32, f32) {
            self.nodes
                .iter()
                .filter_map(TreeNode::return_value)
                .fold((f32::INFINITY, f32::NEG_INFINITY), |(min, max), value| {
                    (min.min(value), max.max(value))
                })
        }
    }

    impl<'a, S> GraphWalk<'a, NodeId, PlotEdge> for SearchTree<S> {
        fn nodes(&'a self) -> Nodes<'a, NodeId> {
            Nodes::Owned(self.relevant_nodes())
        }

        fn edges(&'a self) -> Edges<'a, PlotEdge> {
            let nodes = self.relevant_nodes();
            let best = best_action(self);
            let max_depth = get_graph_output_depth();
            let edge_vec = nodes
                .iter()
                .flat_map(|&parent| {
                    self.node(parent)
                        .children()
                        .filter(move |(_, child)| (self.node(*child).depth as usize) < max_depth)
                        .map(move |(action, child)| PlotEdge {
                            parent,
                            child,
                            action,
                            best: parent == ROOT && best == Some(action),
                        })
                })
                .collect::<Vec<_>>();
            Edges::Owned(edge_vec)
        }

        fn source(&'a self, edge: &PlotEdge) -> NodeId {
            edge.parent
        }

        fn target(&'a self, edge: &PlotEdge) -> NodeId {
            edge.child
        }
    }

    impl<'a, S> Labeller<'a, NodeId, PlotEdge> for SearchTree<S> {
        fn graph_id(&'a self) -> Id<'a> {
            Id::new(format!("tree_{}", self.lineage)).unwrap()
        }

        fn node_id(&'a self, n: &NodeId) -> Id<'a> {
            Id::new(format!("n{}", n.0)).unwrap()
        }

        fn node_label(&'a self, n: &NodeId) -> LabelText<'a> {
            let node = self.node(*n);
            let flags = match (node.done, node.solved) {
                (true, _) => "<br/>terminal",
                (false, true) => "<br/>solved",
                (false, false) => "",
            };
            LabelText::HtmlStr(Cow::Owned(format!(
                "{n}<br/>D: {}, r: {:.2}, R: {}{flags}",
                node.depth,
                node.reward,
                node.value
                    .map(|value| format!("{:.2}", value))
                    .unwrap_or_else(|| "None".to_owned()),
            )))
        }

        fn node_style(&'a self, node: &NodeId) -> Style {
            if *node == ROOT {
                Style::Bold
            } else {
                Style::Filled
            }
        }

        fn node_color(&'a self, node: &NodeId) -> Option<LabelText<'a>> {
            if *node == ROOT {
                return Some(LabelText::LabelStr(Cow::Borrowed("red")));
            }
            let node = self.node(*node);
            if node.solved {
                return Some(LabelText::LabelStr(Cow::Borrowed("grey80")));
            }
            let (min, max) = self.value_range();
            let saturation = match node.value {
                Some(value) if max > min => (value - min) / (max - min),
                _ => 0.,
            };
            Some(LabelText::LabelStr(Cow::Owned(format!(
                "0.333 {:.3} 1.000",
                0.1 + 0.9 * saturation
            ))))
        }

        fn edge_style(&'a self, edge: &PlotEdge) -> Style {
            if edge.best {
                Style::Bold
            } else {
                Style::Solid
            }
        }

        fn edge_color(&'a self, edge: &PlotEdge) -> Option<LabelText<'a>> {
            if edge.best {
                Some(LabelText::LabelStr(Cow::Borrowed("red")))
            } else {
                None
            }
        }

        fn edge_label(&'a self, edge: &PlotEdge) -> LabelText<'a> {
            LabelText::LabelStr(Cow::Owned(format!("a{}", edge.action)))
        }

        fn edge_start_arrow(&'a self, _e: &PlotEdge) -> Arrow {
            Arrow::none()
        }

        fn edge_end_arrow(&'a self, _e: &PlotEdge) -> Arrow {
            Arrow::normal()
        }

        fn kind(&self) -> Kind {
            Kind::Digraph
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain_tree() -> SearchTree<u32> {
        // root -0-> a -1-> b, root -1-> c
        let mut tree = SearchTree::new(Transition::new(0, vec![0]), 2);
        let a = tree.add_child(tree.root(), 0, Transition::new(1, vec![1]));
        tree.add_child(a, 1, Transition::new(2, vec![2]).with_reward(1.));
        tree.add_child(tree.root(), 1, Transition::new(3, vec![3]));
        tree
    }

    #[test]
    fn breadth_first_order() {
        let tree = chain_tree();
        let states = tree
            .iter_breadth_first()
            .map(|id| *tree.node(id).state())
            .collect::<Vec<_>>();
        assert_eq!(states, vec![0, 1, 3, 2]);
        let reversed = tree
            .iter_breadth_first_reverse()
            .map(|id| *tree.node(id).state())
            .collect::<Vec<_>>();
        assert_eq!(reversed, vec![2, 3, 1, 0]);
    }

    #[test]
    fn depths_and_parents() {
        let tree = chain_tree();
        let b = tree.follow(&[0, 1]).unwrap();
        assert_eq!(tree.node(b).depth(), 2);
        assert_eq!(tree.node(b).action(), Some(1));
        let a = tree.node(b).parent().unwrap();
        assert_eq!(tree.node(a).parent(), Some(tree.root()));
        assert_eq!(tree.root_node().parent(), None);
        assert!(tree.follow(&[1, 0]).is_none());
    }

    #[test]
    #[should_panic]
    fn at_most_one_child_per_action() {
        let mut tree = chain_tree();
        tree.add_child(tree.root(), 0, Transition::new(4, vec![4]));
    }

    #[test]
    fn reroot_with_cache_keeps_subtree() {
        let mut tree = chain_tree();
        let lineage = tree.lineage();
        let old_root = tree.reroot(0, true).unwrap();
        assert_eq!(*old_root.state(), 0);
        assert_eq!(tree.len(), 2);
        assert_eq!(*tree.root_node().state(), 1);
        assert_eq!(tree.root_node().parent(), None);
        assert_eq!(tree.root_node().depth(), 0);
        let b = tree.child(tree.root(), 1).unwrap();
        assert_eq!(tree.node(b).features(), &[2]);
        assert_eq!(tree.node(b).depth(), 1);
        assert_eq!(tree.node(b).parent(), Some(tree.root()));
        assert_eq!(tree.lineage(), lineage);
        assert_eq!(tree.root_depth(), 1);
        assert_eq!(tree.absolute_depth(b), 2);
    }

    #[test]
    fn reroot_without_cache_keeps_single_node() {
        let mut tree = chain_tree();
        let lineage = tree.lineage();
        tree.reroot(0, false).unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(*tree.root_node().state(), 1);
        assert!(tree.root_node().is_leaf());
        assert_ne!(tree.lineage(), lineage);
        assert_eq!(tree.root_depth(), 0);
    }

    #[test]
    fn clone_starts_new_lineage() {
        let mut tree = chain_tree();
        tree.reroot(0, true).unwrap();
        let copy = tree.clone();
        assert_ne!(copy.lineage(), tree.lineage());
        assert_eq!(copy.root_depth(), tree.root_depth());
        assert_eq!(copy.len(), tree.len());
        assert_eq!(copy.root_node().features(), tree.root_node().features());
    }

    #[test]
    fn reroot_missing_child_leaves_tree_unchanged() {
        let mut tree = SearchTree::new(Transition::new(0, vec![0]), 3);
        tree.add_child(tree.root(), 0, Transition::new(1, vec![1]));
        assert!(tree.reroot(2, true).is_none());
        assert_eq!(tree.len(), 2);
        assert_eq!(*tree.root_node().state(), 0);
    }
}
