use std::collections::{BTreeMap, BTreeSet};

use log::{debug, warn};

use crate::attribute_info::ExceptionEntry;
use crate::code_attribute::{branch_target, disassemble, AddressedInstruction, DisassemblyPolicy, Instruction, WideInstruction};
use crate::error::DisassemblyError;
use crate::method_info::MethodCode;

use super::cfg_types::*;

/// Disassemble a method body and build its control flow graph.
pub fn cfg_for_code(code: &MethodCode, policy: DisassemblyPolicy) -> Result<ControlFlowGraph, DisassemblyError> {
    let instructions = disassemble(&code.code, policy)?;
    Ok(build_cfg(&instructions, &code.exception_table))
}

/// Build a control flow graph from a disassembled method body.
///
/// Every instruction lands in exactly one block. Branch targets that do not
/// start an instruction are dropped from the successor lists with a warning.
pub fn build_cfg(instructions: &[AddressedInstruction], exception_table: &[ExceptionEntry]) -> ControlFlowGraph {
    if instructions.is_empty() {
        return ControlFlowGraph {
            blocks: BTreeMap::new(),
            entry: 0,
            exception_table: exception_table.to_vec(),
            predecessors: BTreeMap::new(),
        };
    }

    let addresses: BTreeSet<u32> = instructions.iter().map(|i| i.address).collect();
    let code_end = instructions.last().map(|i| i.next_address()).unwrap_or(0);

    // Step 1: Identify block leaders
    let mut leaders = BTreeSet::new();
    leaders.insert(0u32);
    for entry in exception_table {
        leaders.insert(entry.handler_pc as u32);
        leaders.insert(entry.start_pc as u32);
        leaders.insert(entry.end_pc as u32);
    }
    for instr in instructions {
        let targets = branch_targets(instr);
        let ends_block = !targets.is_empty() || !instr.instruction.falls_through();
        for target in targets {
            match u32::try_from(target) {
                Ok(t) if addresses.contains(&t) => {
                    leaders.insert(t);
                }
                _ => warn!(
                    "branch at offset {} targets {}, which is not an instruction",
                    instr.address, target
                ),
            }
        }
        if ends_block {
            leaders.insert(instr.next_address());
        }
    }
    leaders.retain(|l| addresses.contains(l));

    // Step 2: Build basic blocks
    let mut blocks = BTreeMap::new();
    let mut current: Vec<AddressedInstruction> = Vec::new();
    for instr in instructions {
        if leaders.contains(&instr.address) && !current.is_empty() {
            let block = finish_block(std::mem::take(&mut current), code_end);
            blocks.insert(block.id, block);
        }
        current.push(instr.clone());
    }
    if !current.is_empty() {
        let block = finish_block(current, code_end);
        blocks.insert(block.id, block);
    }

    // Step 3: Resolve edges against the blocks that exist
    let ids: BTreeSet<BlockId> = blocks.keys().copied().collect();
    for block in blocks.values_mut() {
        block.successors.retain(|s| ids.contains(s));
        for entry in exception_table {
            let handler = entry.handler_pc as u32;
            if entry.covers(block.id) && ids.contains(&handler) && !block.handlers.contains(&handler) {
                block.handlers.push(handler);
            }
        }
    }

    let mut predecessors: BTreeMap<BlockId, Vec<BlockId>> = BTreeMap::new();
    for block in blocks.values() {
        for succ in block.successors.iter().chain(&block.handlers) {
            let preds = predecessors.entry(*succ).or_default();
            if !preds.contains(&block.id) {
                preds.push(block.id);
            }
        }
    }
    for preds in predecessors.values_mut() {
        preds.sort_unstable();
    }

    debug!("built CFG with {} blocks", blocks.len());
    ControlFlowGraph {
        blocks,
        entry: 0,
        exception_table: exception_table.to_vec(),
        predecessors,
    }
}

fn block_id(target: i64) -> BlockId {
    u32::try_from(target).unwrap_or(u32::MAX)
}

fn branch_targets(instr: &AddressedInstruction) -> Vec<i64> {
    let addr = instr.address;
    match &instr.instruction {
        Instruction::Goto(off) | Instruction::Jsr(off) => vec![branch_target(addr, *off as i32)],
        Instruction::GotoW(off) | Instruction::JsrW(off) => vec![branch_target(addr, *off)],
        Instruction::Tableswitch { default, offsets, .. } => offsets
            .iter()
            .chain(std::iter::once(default))
            .map(|off| branch_target(addr, *off))
            .collect(),
        Instruction::Lookupswitch { default, pairs } => pairs
            .iter()
            .map(|(_, off)| off)
            .chain(std::iter::once(default))
            .map(|off| branch_target(addr, *off))
            .collect(),
        other => other
            .conditional_offset()
            .map(|off| vec![branch_target(addr, off)])
            .unwrap_or_default(),
    }
}

fn finish_block(instructions: Vec<AddressedInstruction>, code_end: u32) -> BasicBlock {
    let id = instructions[0].address;
    let last = &instructions[instructions.len() - 1];
    let next = last.next_address();
    let mut terminator = build_terminator(&last.instruction, last.address, next);
    if terminator == (Terminator::FallThrough { target: next }) && next >= code_end {
        terminator = Terminator::FallsOffEnd;
    }
    let successors = ordered_successors(&terminator);
    BasicBlock {
        id,
        instructions,
        terminator,
        successors,
        handlers: Vec::new(),
    }
}

fn ordered_successors(terminator: &Terminator) -> Vec<BlockId> {
    let mut out: Vec<BlockId> = Vec::new();
    let mut push = |id: BlockId| {
        if !out.contains(&id) {
            out.push(id);
        }
    };
    match terminator {
        Terminator::FallThrough { target } | Terminator::Goto { target } => push(*target),
        Terminator::ConditionalBranch { if_true, if_false, .. } => {
            push(*if_false);
            push(*if_true);
        }
        Terminator::TableSwitch { default, targets, .. } => {
            targets.iter().for_each(|t| push(*t));
            push(*default);
        }
        Terminator::LookupSwitch { default, pairs } => {
            pairs.iter().for_each(|(_, t)| push(*t));
            push(*default);
        }
        Terminator::Jsr { target, return_addr } => {
            push(*target);
            push(*return_addr);
        }
        Terminator::Return | Terminator::Throw | Terminator::Ret | Terminator::FallsOffEnd => {}
    }
    out
}

fn build_terminator(instr: &Instruction, addr: u32, next: u32) -> Terminator {
    let target = |off: i32| block_id(branch_target(addr, off));
    let branch = |condition: BranchCondition, off: i16| Terminator::ConditionalBranch {
        condition,
        if_true: target(off as i32),
        if_false: next,
    };
    match instr {
        Instruction::Goto(off) => Terminator::Goto { target: target(*off as i32) },
        Instruction::GotoW(off) => Terminator::Goto { target: target(*off) },
        Instruction::Ifeq(off) => branch(BranchCondition::IntZero(CompareOp::Eq), *off),
        Instruction::Ifne(off) => branch(BranchCondition::IntZero(CompareOp::Ne), *off),
        Instruction::Iflt(off) => branch(BranchCondition::IntZero(CompareOp::Lt), *off),
        Instruction::Ifge(off) => branch(BranchCondition::IntZero(CompareOp::Ge), *off),
        Instruction::Ifgt(off) => branch(BranchCondition::IntZero(CompareOp::Gt), *off),
        Instruction::Ifle(off) => branch(BranchCondition::IntZero(CompareOp::Le), *off),
        Instruction::IfIcmpeq(off) => branch(BranchCondition::IntCompare(CompareOp::Eq), *off),
        Instruction::IfIcmpne(off) => branch(BranchCondition::IntCompare(CompareOp::Ne), *off),
        Instruction::IfIcmplt(off) => branch(BranchCondition::IntCompare(CompareOp::Lt), *off),
        Instruction::IfIcmpge(off) => branch(BranchCondition::IntCompare(CompareOp::Ge), *off),
        Instruction::IfIcmpgt(off) => branch(BranchCondition::IntCompare(CompareOp::Gt), *off),
        Instruction::IfIcmple(off) => branch(BranchCondition::IntCompare(CompareOp::Le), *off),
        Instruction::IfAcmpeq(off) => branch(BranchCondition::RefCompare(CompareOp::Eq), *off),
        Instruction::IfAcmpne(off) => branch(BranchCondition::RefCompare(CompareOp::Ne), *off),
        Instruction::Ifnull(off) => branch(BranchCondition::RefNull(true), *off),
        Instruction::Ifnonnull(off) => branch(BranchCondition::RefNull(false), *off),
        Instruction::Tableswitch { default, low, offsets, .. } => Terminator::TableSwitch {
            default: target(*default),
            low: *low,
            targets: offsets.iter().map(|off| target(*off)).collect(),
        },
        Instruction::Lookupswitch { default, pairs } => Terminator::LookupSwitch {
            default: target(*default),
            pairs: pairs.iter().map(|(key, off)| (*key, target(*off))).collect(),
        },
        Instruction::Athrow => Terminator::Throw,
        Instruction::Jsr(off) => Terminator::Jsr {
            target: target(*off as i32),
            return_addr: next,
        },
        Instruction::JsrW(off) => Terminator::Jsr {
            target: target(*off),
            return_addr: next,
        },
        Instruction::Ret(_) | Instruction::Wide(WideInstruction::Ret(_)) => Terminator::Ret,
        other if other.is_return() => Terminator::Return,
        _ => Terminator::FallThrough { target: next },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(code: &[u8], table: &[ExceptionEntry]) -> ControlFlowGraph {
        let instrs = disassemble(code, DisassemblyPolicy::Strict).unwrap();
        build_cfg(&instrs, table)
    }

    #[test]
    fn straight_line_code_is_one_block() {
        let g = cfg(&[0x1a, 0x1b, 0x60, 0xac], &[]);
        assert_eq!(g.blocks.len(), 1);
        assert_eq!(g.blocks[&0].terminator, Terminator::Return);
        assert!(g.successors(0).is_empty());
    }

    #[test]
    fn conditional_lists_fallthrough_first() {
        // 0: iload_0; 1: ifeq +5 -> 6; 4: iconst_1; 5: ireturn; 6: iconst_0; 7: ireturn
        let g = cfg(&[0x1a, 0x99, 0x00, 0x05, 0x04, 0xac, 0x03, 0xac], &[]);
        assert_eq!(g.blocks.keys().copied().collect::<Vec<_>>(), vec![0, 4, 6]);
        assert_eq!(g.successors(0), vec![4, 6]);
        assert_eq!(g.predecessors(6), &[0]);
        assert_eq!(g.reverse_postorder()[0], 0);
    }

    #[test]
    fn tableswitch_orders_targets_then_default() {
        // 0: iload_0; 1: tableswitch pad 2, default 27, low 0, high 1, [25, 26]
        let mut code = vec![0x1a, 0xaa, 0x00, 0x00];
        for v in [27i32, 0, 1, 25, 26] {
            code.extend_from_slice(&v.to_be_bytes());
        }
        // 24: nop; 25: nop (unused padding); 26: return; 27: return; 28: return
        code.extend_from_slice(&[0x00, 0x00, 0xb1, 0xb1, 0xb1]);
        let g = cfg(&code, &[]);
        assert_eq!(g.successors(0), vec![26, 27, 28]);
    }

    #[test]
    fn exception_handlers_start_blocks_and_follow_normal_edges() {
        // 0: iconst_0; 1: istore_0; 2: goto +5 -> 7; 5: astore_1; 6: return(handler); 7: return
        let table = [ExceptionEntry {
            start_pc: 0,
            end_pc: 2,
            handler_pc: 5,
            catch_type: 0,
        }];
        let g = cfg(&[0x03, 0x3b, 0xa7, 0x00, 0x05, 0x4c, 0xb1, 0xb1], &table);
        assert!(g.blocks.contains_key(&5));
        assert_eq!(g.successors(0), vec![2, 5]);
        assert_eq!(g.blocks[&0].handlers, vec![5]);
        assert!(g.normal_predecessors(5).is_empty());
        let rpo = g.reverse_postorder();
        assert!(rpo.contains(&5));
    }

    #[test]
    fn every_instruction_belongs_to_exactly_one_block() {
        let code = [
            0x03, 0x3c, 0x03, 0x3d, 0xa7, 0x00, 0x0a, 0x1b, 0x1c, 0x60, 0x3c, 0x84, 0x02, 0x01,
            0x1c, 0x1a, 0xa1, 0xff, 0xf7, 0x1b, 0xac,
        ];
        let instrs = disassemble(&code, DisassemblyPolicy::Strict).unwrap();
        let g = build_cfg(&instrs, &[]);
        for instr in &instrs {
            let owners = g.blocks.values().filter(|b| b.contains(instr.address)).count();
            assert_eq!(owners, 1, "offset {}", instr.address);
        }
        assert_eq!(g.blocks.keys().copied().collect::<Vec<_>>(), vec![0, 7, 14, 19]);
        assert_eq!(g.successors(14), vec![19, 7]);
        assert!(g.to_dot().contains("B7 -> B14;"));
    }

    #[test]
    fn bad_branch_target_is_dropped() {
        // goto -> 100
        let g = cfg(&[0xa7, 0x00, 0x64], &[]);
        assert!(g.successors(0).is_empty());
    }
}
