use crate::mir::{BlockId, Function};

/// Dominator tree: `a` dominates `b` if every path from the entry to `b`
/// passes through `a`.
#[derive(Debug)]
pub struct DomTree {
    tree: IdomTree,
    children: Vec<Vec<BlockId>>,
}

impl DomTree {
    pub fn compute(func: &Function) -> DomTree {
        let n = func.num_blocks();
        let mut succs = vec![Vec::new(); n];
        for id in func.block_ids() {
            succs[id.index()] = func.block(id).succs.iter().map(|s| s.index()).collect();
        }

        let tree = IdomTree::compute(n, func.entry().index(), &succs);

        let mut children = vec![Vec::new(); n];
        for node in 0..n {
            if !tree.reachable[node] || node == func.entry().index() {
                continue;
            }
            children[tree.idom[node]].push(BlockId(node as u32));
        }

        DomTree { tree, children }
    }

    pub fn is_reachable(&self, block: BlockId) -> bool {
        self.tree.reachable[block.index()]
    }

    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        self.tree.dominates(a.index(), b.index())
    }

    /// Blocks whose immediate dominator is `block`.
    pub fn children_of(&self, block: BlockId) -> &[BlockId] {
        &self.children[block.index()]
    }

    pub fn nearest_common_dominator(&self, a: BlockId, b: BlockId) -> Option<BlockId> {
        self.tree
            .nearest_common_ancestor(a.index(), b.index())
            .map(|node| BlockId(node as u32))
    }
}

/// Post-dominator tree: `a` post-dominates `b` if every path from `b` to the
/// function exit passes through `a`. Built over the reverse graph with a
/// virtual exit joining every block without successors.
#[derive(Debug)]
pub struct PostDomTree {
    tree: IdomTree,
}

impl PostDomTree {
    pub fn compute(func: &Function) -> PostDomTree {
        let n = func.num_blocks();
        let root = n;
        let mut succs = vec![Vec::new(); n + 1];
        for id in func.block_ids() {
            let block = func.block(id);
            if block.succs.is_empty() {
                succs[root].push(id.index());
            }
            for &succ in block.succs.iter() {
                succs[succ.index()].push(id.index());
            }
        }

        PostDomTree {
            tree: IdomTree::compute(n + 1, root, &succs),
        }
    }

    /// Whether `a` post-dominates `b`. Blocks that cannot reach an exit are
    /// never considered post-dominated.
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        self.tree.dominates(a.index(), b.index())
    }
}

/// Immediate-dominator forest over plain node indices, shared by both tree
/// directions. The standard iterative intersection over a reverse postorder.
#[derive(Debug)]
struct IdomTree {
    idom: Vec<usize>,
    depth: Vec<u32>,
    reachable: Vec<bool>,
    root: usize,
}

impl IdomTree {
    fn compute(n: usize, root: usize, succs: &[Vec<usize>]) -> IdomTree {
        let mut preds = vec![Vec::new(); n];
        for node in 0..n {
            for &succ in succs[node].iter() {
                preds[succ].push(node);
            }
        }

        // Postorder numbering from the root.
        let mut order = vec![usize::MAX; n];
        let mut postorder = Vec::with_capacity(n);
        let mut visited = vec![false; n];
        let mut stack = vec![(root, 0)];
        visited[root] = true;
        while let Some((node, child)) = stack.pop() {
            if child < succs[node].len() {
                stack.push((node, child + 1));
                let next = succs[node][child];
                if !visited[next] {
                    visited[next] = true;
                    stack.push((next, 0));
                }
            } else {
                order[node] = postorder.len();
                postorder.push(node);
            }
        }

        let mut idom = vec![usize::MAX; n];
        idom[root] = root;

        let mut changed = true;
        while changed {
            changed = false;
            for &node in postorder.iter().rev() {
                if node == root {
                    continue;
                }
                let mut new_idom = usize::MAX;
                for &pred in preds[node].iter() {
                    if idom[pred] == usize::MAX {
                        continue;
                    }
                    new_idom = if new_idom == usize::MAX {
                        pred
                    } else {
                        intersect(&idom, &order, new_idom, pred)
                    };
                }
                if new_idom != usize::MAX && idom[node] != new_idom {
                    idom[node] = new_idom;
                    changed = true;
                }
            }
        }

        let mut depth = vec![0; n];
        for &node in postorder.iter().rev() {
            if node != root && idom[node] != usize::MAX {
                depth[node] = depth[idom[node]] + 1;
            }
        }

        IdomTree {
            idom,
            depth,
            reachable: visited,
            root,
        }
    }

    fn dominates(&self, a: usize, b: usize) -> bool {
        if !self.reachable[a] || !self.reachable[b] {
            return false;
        }
        if self.depth[a] > self.depth[b] {
            return false;
        }
        let mut node = b;
        while self.depth[node] > self.depth[a] {
            node = self.idom[node];
        }
        node == a
    }

    fn nearest_common_ancestor(&self, a: usize, b: usize) -> Option<usize> {
        if !self.reachable[a] || !self.reachable[b] {
            return None;
        }
        let (mut a, mut b) = (a, b);
        while self.depth[a] > self.depth[b] {
            a = self.idom[a];
        }
        while self.depth[b] > self.depth[a] {
            b = self.idom[b];
        }
        while a != b {
            if a == self.root || b == self.root {
                return Some(self.root);
            }
            a = self.idom[a];
            b = self.idom[b];
        }
        Some(a)
    }
}

fn intersect(idom: &[usize], order: &[usize], a: usize, b: usize) -> usize {
    let (mut a, mut b) = (a, b);
    while a != b {
        while order[a] < order[b] {
            a = idom[a];
        }
        while order[b] < order[a] {
            b = idom[b];
        }
    }
    a
}
