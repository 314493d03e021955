use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;

use crate::attribute_info::ExceptionEntry;
use crate::code_attribute::AddressedInstruction;

pub use super::expr::CompareOp;

/// Block ID is the bytecode offset of the first instruction in the block.
pub type BlockId = u32;

/// How a basic block ends.
///
/// Targets that do not start an instruction are kept as written; they never
/// show up in [`ControlFlowGraph::successors`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Terminator {
    FallThrough { target: BlockId },
    Goto { target: BlockId },
    ConditionalBranch {
        condition: BranchCondition,
        if_true: BlockId,
        if_false: BlockId,
    },
    TableSwitch {
        default: BlockId,
        low: i32,
        targets: Vec<BlockId>,
    },
    LookupSwitch {
        default: BlockId,
        pairs: Vec<(i32, BlockId)>,
    },
    Return,
    Throw,
    Jsr { target: BlockId, return_addr: BlockId },
    /// `ret`: the successor is only known at run time.
    Ret,
    /// The code array ends without a terminating instruction.
    FallsOffEnd,
}

/// The condition for a conditional branch.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BranchCondition {
    IntZero(CompareOp),
    IntCompare(CompareOp),
    RefCompare(CompareOp),
    RefNull(bool),
}

/// A basic block in the CFG.
#[derive(Clone, Debug)]
pub struct BasicBlock {
    pub id: BlockId,
    pub instructions: Vec<AddressedInstruction>,
    pub terminator: Terminator,
    /// Normal successors, in the order described on [`ControlFlowGraph::successors`].
    pub successors: Vec<BlockId>,
    /// Handler blocks of the exception ranges covering this block.
    pub handlers: Vec<BlockId>,
}

impl BasicBlock {
    /// Offset one past the block's last byte.
    pub fn end(&self) -> u32 {
        self.instructions
            .last()
            .map(|i| i.next_address())
            .unwrap_or(self.id)
    }

    pub fn contains(&self, offset: u32) -> bool {
        self.id <= offset && offset < self.end()
    }
}

/// The control flow graph for a single method.
#[derive(Clone, Debug)]
pub struct ControlFlowGraph {
    pub blocks: BTreeMap<BlockId, BasicBlock>,
    pub entry: BlockId,
    pub exception_table: Vec<ExceptionEntry>,
    pub(crate) predecessors: BTreeMap<BlockId, Vec<BlockId>>,
}

impl ControlFlowGraph {
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(&id)
    }

    /// The block holding the instruction at `offset`.
    pub fn block_at(&self, offset: u32) -> Option<&BasicBlock> {
        self.blocks
            .range(..=offset)
            .next_back()
            .map(|(_, b)| b)
            .filter(|b| b.contains(offset))
    }

    /// Successors of a block: the fall-through edge before the taken edge,
    /// switch targets in table order with the default last, then exception
    /// handlers. Duplicates keep their first position.
    pub fn successors(&self, id: BlockId) -> Vec<BlockId> {
        let Some(block) = self.blocks.get(&id) else {
            return Vec::new();
        };
        let mut out = block.successors.clone();
        for handler in &block.handlers {
            if !out.contains(handler) {
                out.push(*handler);
            }
        }
        out
    }

    /// Successors without the exception edges.
    pub fn normal_successors(&self, id: BlockId) -> &[BlockId] {
        self.blocks
            .get(&id)
            .map(|b| b.successors.as_slice())
            .unwrap_or(&[])
    }

    /// Blocks with an edge (normal or exceptional) into `id`, ascending.
    pub fn predecessors(&self, id: BlockId) -> &[BlockId] {
        self.predecessors
            .get(&id)
            .map(|p| p.as_slice())
            .unwrap_or(&[])
    }

    /// Blocks with a normal edge into `id`.
    pub fn normal_predecessors(&self, id: BlockId) -> Vec<BlockId> {
        self.predecessors(id)
            .iter()
            .copied()
            .filter(|&p| self.normal_successors(p).contains(&id))
            .collect()
    }

    /// Blocks reachable from the entry, in reverse postorder.
    pub fn reverse_postorder(&self) -> Vec<BlockId> {
        if !self.blocks.contains_key(&self.entry) {
            return Vec::new();
        }
        let mut visited = BTreeSet::new();
        let mut postorder = Vec::new();
        // explicit stack of (block, next successor index)
        let mut stack = vec![(self.entry, 0usize)];
        visited.insert(self.entry);
        while let Some((block, next)) = stack.pop() {
            let succs = self.successors(block);
            if let Some(&succ) = succs.get(next) {
                stack.push((block, next + 1));
                if visited.insert(succ) {
                    stack.push((succ, 0));
                }
            } else {
                postorder.push(block);
            }
        }
        postorder.reverse();
        postorder
    }

    /// Generate a DOT graph for visualization.
    pub fn to_dot(&self) -> String {
        let mut dot = String::from("digraph CFG {\n");
        for (id, block) in &self.blocks {
            let _ = writeln!(
                dot,
                "  B{} [label=\"B{} [{}..{})\"];",
                id,
                id,
                id,
                block.end()
            );
        }
        for (id, block) in &self.blocks {
            for succ in &block.successors {
                if self.blocks.contains_key(succ) {
                    let _ = writeln!(dot, "  B{} -> B{};", id, succ);
                }
            }
            for handler in &block.handlers {
                let _ = writeln!(dot, "  B{} -> B{} [style=dashed];", id, handler);
            }
        }
        dot.push_str("}\n");
        dot
    }
}
