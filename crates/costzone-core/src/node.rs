use glam::DVec3;

use crate::multipole::Multipoles;

/// Arena index of a node. Nodes never move; freed slots are recycled with
/// a bumped generation so stale handles are detectable.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Opaque reference to a particle proxy, handed to the caller at insert
/// time. This is the "back-pointer" of the particle contract with the
/// ownership flipped: the caller stores the handle and presents it when
/// signalling a position change.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ParticleHandle {
    pub(crate) node: NodeId,
    pub(crate) gen: u32,
}

/// Particle proxy payload: a snapshot of the external particle taken at
/// insert/move time. The tree never reads caller storage during walks.
#[derive(Clone, Debug)]
pub(crate) struct PartNode {
    pub pos: DVec3,
    pub mass: f64,
    pub cost: f64,
    pub h: f64,
    /// False while the particle sits on a costzone orphan list.
    pub settled: bool,
}

/// Interior cell payload. Costzone cells embed one of these.
#[derive(Clone, Debug)]
pub(crate) struct CellNode {
    pub center: DVec3,
    pub size: f64,
    pub child: [Option<NodeId>; 8],
    /// Next preorder node at depth <= this cell's depth: where a walker
    /// continues after accepting this cell's multipole.
    pub skip: Option<NodeId>,
    pub mp: Multipoles,
}

impl CellNode {
    pub(crate) fn new(center: DVec3, size: f64) -> Self {
        Self {
            center,
            size,
            child: [None; 8],
            skip: None,
            mp: Multipoles::default(),
        }
    }

    pub(crate) fn child_count(&self) -> usize {
        self.child.iter().filter(|c| c.is_some()).count()
    }
}

/// Costzone cell payload: a generic cell plus the cost bookkeeping the
/// rebalancer and the per-thread work decomposition run on.
#[derive(Clone, Debug)]
pub(crate) struct CzNode {
    pub cell: CellNode,
    /// True for the (globally disjoint) bottom set that partitions the
    /// domain into per-worker subtrees.
    pub at_bottom: bool,
    /// Summed particle cost of the whole subtree, orphans included.
    pub abs_cost: f64,
    /// `abs_cost` as a fraction of the root's total, set by rebalance.
    pub rel_cost: f64,
    /// Measured walk time of the last round, for driver-side balancing.
    pub comp_time: f64,
    pub no_parts: u64,
    /// Particles adopted by this cell but not yet settled into a leaf
    /// octant; drained by the orphan push-down phase of `update()`.
    pub orphans: Vec<NodeId>,
    /// First and last node of this cell's preorder linearisation.
    pub chld_frst: Option<NodeId>,
    pub chld_last: Option<NodeId>,
}

impl CzNode {
    pub(crate) fn new(center: DVec3, size: f64, at_bottom: bool) -> Self {
        Self {
            cell: CellNode::new(center, size),
            at_bottom,
            abs_cost: 0.0,
            rel_cost: 0.0,
            comp_time: 0.0,
            no_parts: 0,
            orphans: Vec::new(),
            chld_frst: None,
            chld_last: None,
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) enum NodeKind {
    Part(PartNode),
    Cell(Box<CellNode>),
    Cz(Box<CzNode>),
    /// Slot on the free list.
    Free,
}

/// Shared node header plus the tagged payload.
#[derive(Clone, Debug)]
pub(crate) struct Node {
    pub parent: Option<NodeId>,
    /// Preorder linkage threaded through the whole tree after update().
    pub next: Option<NodeId>,
    pub depth: u32,
    /// External particle id for proxies (>= 0), negative serial for cells.
    pub ident: i64,
    /// Bumped when the slot is freed; detects stale particle handles.
    pub gen: u32,
    pub kind: NodeKind,
}

impl Node {
    #[inline]
    pub(crate) fn is_particle(&self) -> bool {
        matches!(self.kind, NodeKind::Part(_))
    }

    #[inline]
    pub(crate) fn is_cz(&self) -> bool {
        matches!(self.kind, NodeKind::Cz(_))
    }

    #[inline]
    pub(crate) fn at_bottom(&self) -> bool {
        matches!(&self.kind, NodeKind::Cz(cz) if cz.at_bottom)
    }

    /// Cell view of this node; costzone cells are cells too.
    #[inline]
    pub(crate) fn as_cell(&self) -> Option<&CellNode> {
        match &self.kind {
            NodeKind::Cell(c) => Some(c),
            NodeKind::Cz(cz) => Some(&cz.cell),
            _ => None,
        }
    }

    #[inline]
    pub(crate) fn as_part(&self) -> Option<&PartNode> {
        match &self.kind {
            NodeKind::Part(p) => Some(p),
            _ => None,
        }
    }
}

/// Node storage: a flat vector plus a free list. The arena exclusively
/// owns all nodes; everything else refers to them through `NodeId`.
pub(crate) struct NodeArena {
    nodes: Vec<Node>,
    free: Vec<NodeId>,
}

impl NodeArena {
    pub(crate) fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
        }
    }

    pub(crate) fn alloc(
        &mut self,
        parent: Option<NodeId>,
        depth: u32,
        ident: i64,
        kind: NodeKind,
    ) -> NodeId {
        match self.free.pop() {
            Some(id) => {
                let gen = self.nodes[id.index()].gen;
                self.nodes[id.index()] = Node {
                    parent,
                    next: None,
                    depth,
                    ident,
                    gen,
                    kind,
                };
                id
            }
            None => {
                let id = NodeId(self.nodes.len() as u32);
                self.nodes.push(Node {
                    parent,
                    next: None,
                    depth,
                    ident,
                    gen: 0,
                    kind,
                });
                id
            }
        }
    }

    pub(crate) fn release(&mut self, id: NodeId) {
        let node = &mut self.nodes[id.index()];
        debug_assert!(!matches!(node.kind, NodeKind::Free), "double free");
        node.kind = NodeKind::Free;
        node.parent = None;
        node.next = None;
        node.gen = node.gen.wrapping_add(1);
        self.free.push(id);
    }

    /// Live nodes, in arena order. Freed slots are skipped.
    pub(crate) fn iter_live(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| !matches!(n.kind, NodeKind::Free))
            .map(|(i, n)| (NodeId(i as u32), n))
    }

    // Typed accessors. Reaching for the wrong variant is a programmer
    // error, on par with an out-of-bounds index.

    pub(crate) fn cell(&self, id: NodeId) -> &CellNode {
        match &self[id].kind {
            NodeKind::Cell(c) => c,
            NodeKind::Cz(cz) => &cz.cell,
            _ => unreachable!("node {id:?} is not a cell"),
        }
    }

    pub(crate) fn cell_mut(&mut self, id: NodeId) -> &mut CellNode {
        match &mut self.nodes[id.index()].kind {
            NodeKind::Cell(c) => c,
            NodeKind::Cz(cz) => &mut cz.cell,
            _ => unreachable!("node {id:?} is not a cell"),
        }
    }

    pub(crate) fn cz(&self, id: NodeId) -> &CzNode {
        match &self[id].kind {
            NodeKind::Cz(cz) => cz,
            _ => unreachable!("node {id:?} is not a costzone cell"),
        }
    }

    pub(crate) fn cz_mut(&mut self, id: NodeId) -> &mut CzNode {
        match &mut self.nodes[id.index()].kind {
            NodeKind::Cz(cz) => cz,
            _ => unreachable!("node {id:?} is not a costzone cell"),
        }
    }

    pub(crate) fn part(&self, id: NodeId) -> &PartNode {
        match &self[id].kind {
            NodeKind::Part(p) => p,
            _ => unreachable!("node {id:?} is not a particle"),
        }
    }

    pub(crate) fn part_mut(&mut self, id: NodeId) -> &mut PartNode {
        match &mut self.nodes[id.index()].kind {
            NodeKind::Part(p) => p,
            _ => unreachable!("node {id:?} is not a particle"),
        }
    }
}

impl std::ops::Index<NodeId> for NodeArena {
    type Output = Node;

    #[inline]
    fn index(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }
}

impl std::ops::IndexMut<NodeId> for NodeArena {
    #[inline]
    fn index_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }
}
