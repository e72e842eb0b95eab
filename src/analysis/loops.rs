use std::collections::HashSet;

use super::DomTree;
use crate::mir::{BlockId, Function};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct LoopId(pub usize);

#[derive(Debug)]
pub struct Loop {
    pub header: BlockId,
    pub blocks: HashSet<BlockId>,
    pub parent: Option<LoopId>,
    pub depth: u32,
}

/// The natural-loop nest: back edges (whose target dominates their source)
/// identify headers, bodies are collected by walking predecessors, and loops
/// sharing a header are merged.
#[derive(Debug)]
pub struct LoopInfo {
    loops: Vec<Loop>,
    /// Innermost loop containing each block.
    innermost: Vec<Option<LoopId>>,
}

impl LoopInfo {
    pub fn compute(func: &Function, dom: &DomTree) -> LoopInfo {
        let mut loops: Vec<Loop> = Vec::new();

        for id in func.block_ids() {
            if !dom.is_reachable(id) {
                continue;
            }
            for &succ in func.block(id).succs.iter() {
                if !dom.dominates(succ, id) {
                    continue;
                }

                // Back edge id -> succ; collect the body.
                let header = succ;
                let mut blocks = HashSet::from([header]);
                let mut stack = vec![id];
                while let Some(node) = stack.pop() {
                    if !blocks.insert(node) {
                        continue;
                    }
                    stack.extend(func.block(node).preds.iter().copied());
                }

                match loops.iter_mut().find(|l| l.header == header) {
                    Some(merged) => merged.blocks.extend(blocks),
                    None => loops.push(Loop {
                        header,
                        blocks,
                        parent: None,
                        depth: 1,
                    }),
                }
            }
        }

        // Innermost assignment: larger loops first so smaller ones win.
        let mut by_size: Vec<usize> = (0..loops.len()).collect();
        by_size.sort_by_key(|&l| std::cmp::Reverse(loops[l].blocks.len()));
        let mut innermost = vec![None; func.num_blocks()];
        for &l in by_size.iter() {
            for &block in loops[l].blocks.iter() {
                innermost[block.index()] = Some(LoopId(l));
            }
        }

        // A loop's parent is the smallest strictly larger loop holding its
        // header.
        for l in 0..loops.len() {
            let parent = by_size
                .iter()
                .rev()
                .copied()
                .find(|&p| {
                    p != l
                        && loops[p].blocks.len() > loops[l].blocks.len()
                        && loops[p].blocks.contains(&loops[l].header)
                })
                .map(LoopId);
            loops[l].parent = parent;
        }
        for &l in by_size.iter() {
            if let Some(LoopId(p)) = loops[l].parent {
                loops[l].depth = loops[p].depth + 1;
            }
        }

        LoopInfo { loops, innermost }
    }

    pub fn get(&self, id: LoopId) -> &Loop {
        &self.loops[id.0]
    }

    pub fn loop_for(&self, block: BlockId) -> Option<LoopId> {
        self.innermost[block.index()]
    }

    /// Nesting depth of the innermost loop containing `block`; 0 outside any
    /// loop.
    pub fn depth(&self, block: BlockId) -> u32 {
        self.loop_for(block).map_or(0, |l| self.get(l).depth)
    }

    pub fn is_header(&self, block: BlockId) -> bool {
        self.loops.iter().any(|l| l.header == block)
    }

    pub fn contains(&self, id: LoopId, block: BlockId) -> bool {
        self.get(id).blocks.contains(&block)
    }

    /// Loops not nested inside any other loop.
    pub fn top_level_loops(&self) -> impl Iterator<Item = LoopId> + '_ {
        (0..self.loops.len())
            .map(LoopId)
            .filter(|&l| self.get(l).parent.is_none())
    }

    /// The unique out-of-loop predecessor of the header whose only successor
    /// is the header, if the loop has one.
    pub fn preheader(&self, id: LoopId, func: &Function) -> Option<BlockId> {
        let header = self.get(id).header;
        let mut outside = func
            .block(header)
            .preds
            .iter()
            .copied()
            .filter(|pred| !self.contains(id, *pred));
        let candidate = outside.next()?;
        if outside.next().is_some() {
            return None;
        }
        if func.block(candidate).succs != [header] {
            return None;
        }
        Some(candidate)
    }
}
