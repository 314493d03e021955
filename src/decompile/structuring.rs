use std::collections::{BTreeMap, BTreeSet, HashMap};

use log::{debug, warn};

use crate::attribute_info::ExceptionEntry;
use crate::constant_info::ConstantPool;

use super::cfg_types::*;
use super::expr::*;
use super::structured_types::*;

/// Stand-in node that every returning or throwing block flows into when
/// computing post-dominators.
const VIRTUAL_EXIT: BlockId = u32::MAX;

/// Convert a CFG with simulated blocks into a structured body.
///
/// Blocks that no construct can place are emitted afterwards under their own
/// labels, reached through `Goto`s.
pub fn structure_method(
    cfg: &ControlFlowGraph,
    simulated: &BTreeMap<BlockId, SimulatedBlock>,
    pool: &ConstantPool,
) -> StructuredBody {
    if cfg.is_empty() {
        return StructuredBody::default();
    }

    let rpo = cfg.reverse_postorder();
    let dominators = compute_dominators(cfg, &rpo);
    let post_dominators = compute_post_dominators(cfg);
    let loops = find_loops(cfg, &dominators);

    let mut ctx = StructuringContext {
        cfg,
        simulated,
        pool,
        post_dominators,
        loops,
        emitted: BTreeSet::new(),
        contexts: Vec::new(),
        handled_ranges: BTreeSet::new(),
        goto_targets: BTreeSet::new(),
    };

    let mut statements = ctx.sequence(cfg.entry, None);
    for id in rpo {
        if !ctx.emitted.contains(&id) && simulated.contains_key(&id) {
            ctx.goto_targets.insert(id);
            statements.extend(ctx.sequence(id, None));
        }
    }
    if matches!(
        statements.iter().rev().find(|s| !matches!(s, StructuredStmt::Label(_))),
        Some(StructuredStmt::Simple(Stmt::Return(None)))
    ) && ctx.goto_targets.is_empty()
    {
        if let Some(pos) = statements.iter().rposition(|s| matches!(s, StructuredStmt::Simple(_))) {
            statements.remove(pos);
        }
    }
    if !ctx.goto_targets.is_empty() {
        warn!(
            "control flow not fully structured; {} block(s) reached through goto",
            ctx.goto_targets.len()
        );
    }

    StructuredBody {
        statements,
        goto_targets: ctx.goto_targets,
    }
}

#[derive(Clone, Debug)]
struct LoopInfo {
    body: BTreeSet<BlockId>,
    latches: Vec<BlockId>,
}

/// A construct the walker is currently inside of.
enum Context {
    Loop {
        header: BlockId,
        continue_target: BlockId,
        exit: Option<BlockId>,
        body: BTreeSet<BlockId>,
    },
    Switch {
        exit: Option<BlockId>,
    },
    /// A protected range; `exit` is where control goes when the body completes.
    Try {
        start: u32,
        end: u32,
        exit: Option<BlockId>,
    },
}

enum Flow {
    Walk(BlockId),
    End,
}

struct StructuringContext<'a> {
    cfg: &'a ControlFlowGraph,
    simulated: &'a BTreeMap<BlockId, SimulatedBlock>,
    pool: &'a ConstantPool,
    post_dominators: HashMap<BlockId, BlockId>,
    loops: BTreeMap<BlockId, LoopInfo>,
    emitted: BTreeSet<BlockId>,
    contexts: Vec<Context>,
    handled_ranges: BTreeSet<(u16, u16)>,
    goto_targets: BTreeSet<BlockId>,
}

impl<'a> StructuringContext<'a> {
    /// Walk straight-line flow from `start` until it reaches `follow` or ends.
    fn sequence(&mut self, start: BlockId, follow: Option<BlockId>) -> Vec<StructuredStmt> {
        let mut out = Vec::new();
        let mut cur = start;
        loop {
            if Some(cur) == follow {
                break;
            }
            if self.emitted.contains(&cur) {
                self.goto(cur, &mut out);
                break;
            }
            let flow = if let Some(flow) = self.try_region(cur, follow, &mut out) {
                flow
            } else if self.loops.contains_key(&cur) && !self.is_active_header(cur) {
                self.loop_region(cur, follow, &mut out)
            } else {
                self.block(cur, follow, &mut out)
            };
            match flow {
                Flow::Walk(next) => cur = next,
                Flow::End => break,
            }
        }
        out
    }

    /// A branch arm: like [`sequence`](Self::sequence) but its entry may
    /// itself be a `break`, `continue` or the join point.
    fn branch(&mut self, entry: BlockId, follow: Option<BlockId>) -> Vec<StructuredStmt> {
        let mut out = Vec::new();
        if let Flow::Walk(next) = self.jump(entry, follow, &mut out) {
            out.extend(self.sequence(next, follow));
        }
        out
    }

    /// Emit one block and structure its terminator.
    fn block(&mut self, id: BlockId, follow: Option<BlockId>, out: &mut Vec<StructuredStmt>) -> Flow {
        self.emitted.insert(id);
        out.push(StructuredStmt::Label(id));
        let Some(block) = self.cfg.block(id) else {
            return Flow::End;
        };
        let Some(sim) = self.simulated.get(&id) else {
            out.push(StructuredStmt::Comment(format!("unreachable block {}", id)));
            return Flow::End;
        };
        out.extend(sim.statements.iter().cloned().map(StructuredStmt::Simple));

        match &block.terminator {
            Terminator::FallThrough { target } | Terminator::Goto { target } => {
                self.jump(*target, follow, out)
            }
            Terminator::Jsr { target, return_addr } => {
                self.goto_targets.insert(*target);
                out.push(StructuredStmt::Comment(format!("jsr L{}", target)));
                self.jump(*return_addr, follow, out)
            }
            Terminator::Return | Terminator::Throw | Terminator::Ret | Terminator::FallsOffEnd => {
                Flow::End
            }
            Terminator::ConditionalBranch { if_true, if_false, .. } => {
                let condition = sim
                    .branch_condition
                    .clone()
                    .unwrap_or_else(|| Expr::Unresolved("condition".into()));
                self.conditional(id, condition, *if_true, *if_false, follow, out)
            }
            Terminator::TableSwitch { default, low, targets } => {
                let mut arms: Vec<(SwitchLabel, BlockId)> = targets
                    .iter()
                    .enumerate()
                    .map(|(i, t)| (SwitchLabel::Value(low.wrapping_add(i as i32)), *t))
                    .collect();
                arms.push((SwitchLabel::Default, *default));
                self.switch(id, sim.switch_value.clone(), arms, follow, out)
            }
            Terminator::LookupSwitch { default, pairs } => {
                let mut arms: Vec<(SwitchLabel, BlockId)> = pairs
                    .iter()
                    .map(|(key, t)| (SwitchLabel::Value(*key), *t))
                    .collect();
                arms.push((SwitchLabel::Default, *default));
                self.switch(id, sim.switch_value.clone(), arms, follow, out)
            }
        }
    }

    fn conditional(
        &mut self,
        id: BlockId,
        condition: Expr,
        if_true: BlockId,
        if_false: BlockId,
        follow: Option<BlockId>,
        out: &mut Vec<StructuredStmt>,
    ) -> Flow {
        if if_true == if_false {
            return self.jump(if_true, follow, out);
        }
        let join = self.join_point(id);
        // javac branches around the `then` arm, so the fall-through edge is
        // the `then` arm with the condition inverted.
        let (mut condition, then_entry, else_entry) = match join {
            Some(j) if j == if_true => (condition.negate(), if_false, None),
            Some(j) if j == if_false => (condition, if_true, None),
            _ => (condition.negate(), if_false, Some(if_true)),
        };
        let inner_follow = join.or(follow);
        let mut then_body = self.branch(then_entry, inner_follow);
        let mut else_body = match else_entry {
            Some(entry) => self.branch(entry, inner_follow),
            None => Vec::new(),
        };
        if is_empty_body(&then_body) && !is_empty_body(&else_body) {
            std::mem::swap(&mut then_body, &mut else_body);
            condition = condition.negate();
        }
        out.push(StructuredStmt::If {
            condition,
            then_body,
            else_body,
        });
        match join {
            Some(j) => self.jump(j, follow, out),
            None => Flow::End,
        }
    }

    fn switch(
        &mut self,
        id: BlockId,
        value: Option<Expr>,
        arms: Vec<(SwitchLabel, BlockId)>,
        follow: Option<BlockId>,
        out: &mut Vec<StructuredStmt>,
    ) -> Flow {
        let join = self.join_point(id);
        let mut groups: BTreeMap<BlockId, Vec<SwitchLabel>> = BTreeMap::new();
        for (label, target) in arms {
            if label == SwitchLabel::Default && Some(target) == join {
                continue;
            }
            let labels = groups.entry(target).or_default();
            if !labels.contains(&label) {
                labels.push(label);
            }
        }

        self.contexts.push(Context::Switch { exit: join });
        let targets: Vec<BlockId> = groups.keys().copied().collect();
        let mut cases = Vec::new();
        for (i, target) in targets.iter().enumerate() {
            let next = targets.get(i + 1).copied().or(join).or(follow);
            let body = self.branch(*target, next);
            let mut labels = groups.remove(target).unwrap_or_default();
            labels.sort();
            cases.push(SwitchCase { labels, body });
        }
        self.contexts.pop();

        out.push(StructuredStmt::Switch {
            expr: value.unwrap_or_else(|| Expr::Unresolved("switch_value".into())),
            cases,
        });
        match join {
            Some(j) => self.jump(j, follow, out),
            None => Flow::End,
        }
    }

    fn loop_region(&mut self, header: BlockId, follow: Option<BlockId>, out: &mut Vec<StructuredStmt>) -> Flow {
        let Some(info) = self.loops.get(&header).cloned() else {
            return self.block(header, follow, out);
        };
        let header_is_bare = self
            .simulated
            .get(&header)
            .is_some_and(|s| s.statements.is_empty());
        let terminator = self.cfg.block(header).map(|b| b.terminator.clone());

        // while (cond) { ... } with the test in the header
        if let (true, Some(Terminator::ConditionalBranch { if_true, if_false, .. })) =
            (header_is_bare, &terminator)
        {
            let (if_true, if_false) = (*if_true, *if_false);
            let condition = self.condition_of(header);
            let oriented = if info.body.contains(&if_true) && !info.body.contains(&if_false) {
                Some((condition, if_true, if_false))
            } else if info.body.contains(&if_false) && !info.body.contains(&if_true) {
                Some((condition.negate(), if_false, if_true))
            } else {
                None
            };
            if let Some((condition, body_entry, exit)) = oriented {
                self.emitted.insert(header);
                out.push(StructuredStmt::Label(header));
                self.contexts.push(Context::Loop {
                    header,
                    continue_target: header,
                    exit: Some(exit),
                    body: info.body.clone(),
                });
                let body = self.branch(body_entry, Some(header));
                self.contexts.pop();
                out.push(StructuredStmt::While {
                    condition,
                    body: strip_trailing_continue(body),
                });
                return self.jump(exit, follow, out);
            }
        }

        // do { ... } while (cond) with the test in the only latch
        if let [latch] = info.latches.as_slice() {
            let latch = *latch;
            if let Some(Terminator::ConditionalBranch { if_true, if_false, .. }) =
                self.cfg.block(latch).map(|b| &b.terminator)
            {
                let (if_true, if_false) = (*if_true, *if_false);
                let oriented = if if_true == header && !info.body.contains(&if_false) {
                    Some((self.condition_of(latch), if_false))
                } else if if_false == header && !info.body.contains(&if_true) {
                    Some((self.condition_of(latch).negate(), if_true))
                } else {
                    None
                };
                if let Some((condition, exit)) = oriented {
                    self.contexts.push(Context::Loop {
                        header,
                        continue_target: latch,
                        exit: Some(exit),
                        body: info.body.clone(),
                    });
                    let mut body = self.sequence(header, Some(latch));
                    self.contexts.pop();
                    if !self.emitted.contains(&latch) {
                        self.emitted.insert(latch);
                        body.push(StructuredStmt::Label(latch));
                        if let Some(sim) = self.simulated.get(&latch) {
                            body.extend(sim.statements.iter().cloned().map(StructuredStmt::Simple));
                        }
                    }
                    out.push(StructuredStmt::DoWhile {
                        body: strip_trailing_continue(body),
                        condition,
                    });
                    return self.jump(exit, follow, out);
                }
            }
        }

        // while (true) { ... } leaving through break
        let exit = info
            .body
            .iter()
            .flat_map(|b| self.cfg.normal_successors(*b).iter().copied())
            .filter(|s| !info.body.contains(s))
            .max();
        self.contexts.push(Context::Loop {
            header,
            continue_target: header,
            exit,
            body: info.body,
        });
        let body = self.sequence(header, None);
        self.contexts.pop();
        out.push(StructuredStmt::While {
            condition: Expr::BoolLiteral(true),
            body: strip_trailing_continue(body),
        });
        match exit {
            Some(exit) => self.jump(exit, follow, out),
            None => Flow::End,
        }
    }

    /// Structure a try/catch whose protected range starts at `id`, if any.
    fn try_region(&mut self, id: BlockId, follow: Option<BlockId>, out: &mut Vec<StructuredStmt>) -> Option<Flow> {
        let range = self
            .cfg
            .exception_table
            .iter()
            .filter(|e| {
                e.start_pc as u32 == id
                    && e.end_pc > e.start_pc
                    && !self.handled_ranges.contains(&(e.start_pc, e.end_pc))
                    && !e.covers(e.handler_pc as u32)
                    && !self.emitted.contains(&(e.handler_pc as u32))
                    && self.cfg.normal_predecessors(e.handler_pc as u32).is_empty()
            })
            .map(|e| (e.start_pc, e.end_pc))
            .max_by_key(|(_, end)| *end)?;
        self.handled_ranges.insert(range);

        let mut handlers: Vec<ExceptionEntry> = Vec::new();
        for entry in &self.cfg.exception_table {
            if (entry.start_pc, entry.end_pc) == range
                && !handlers.iter().any(|h| h.handler_pc == entry.handler_pc)
            {
                handlers.push(*entry);
            }
        }
        debug!(
            "try range [{}, {}) with {} handler(s)",
            range.0,
            range.1,
            handlers.len()
        );

        self.contexts.push(Context::Try {
            start: range.0 as u32,
            end: range.1 as u32,
            exit: None,
        });
        let try_body = self.sequence(id, None);
        let exit = match self.contexts.pop() {
            Some(Context::Try { exit, .. }) => exit,
            _ => None,
        };

        let mut catches = Vec::new();
        for handler in handlers {
            let handler_pc = handler.handler_pc as u32;
            if self.emitted.contains(&handler_pc) {
                continue;
            }
            let exception_type = match handler.catch_type {
                0 => "java/lang/Throwable".to_string(),
                index => self
                    .pool
                    .class_name(index)
                    .unwrap_or("java/lang/Throwable")
                    .to_string(),
            };
            let mut body = self.branch(handler_pc, exit.or(follow));
            let var_name = take_caught_store(&mut body).unwrap_or_else(|| "e".to_string());
            catches.push(CatchClause {
                exception_type,
                var_name,
                body,
            });
        }

        out.push(StructuredStmt::TryCatch { try_body, catches });
        Some(match exit {
            Some(exit) => self.jump(exit, follow, out),
            None => Flow::End,
        })
    }

    /// Decide what transferring control to `target` means at this point.
    fn jump(&mut self, target: BlockId, follow: Option<BlockId>, out: &mut Vec<StructuredStmt>) -> Flow {
        if Some(target) == follow {
            return Flow::End;
        }
        if let Some(stmt) = self.exit_statement(target) {
            out.extend(stmt);
            return Flow::End;
        }
        if self.emitted.contains(&target) || !self.cfg.blocks.contains_key(&target) {
            self.goto(target, out);
            return Flow::End;
        }
        Flow::Walk(target)
    }

    /// `Some(stmt)` when `target` leaves an enclosing construct: a `continue`,
    /// a `break`, or (with no statement) the normal end of a try body.
    fn exit_statement(&mut self, target: BlockId) -> Option<Option<StructuredStmt>> {
        let mut crossed_loop = false;
        let mut crossed_breakable = false;
        for ctx in self.contexts.iter_mut().rev() {
            match ctx {
                Context::Try { start, end, exit } => {
                    if (*start..*end).contains(&target) {
                        return None;
                    }
                    match exit {
                        None => {
                            *exit = Some(target);
                            return Some(None);
                        }
                        Some(e) if *e == target => return Some(None),
                        Some(_) => {}
                    }
                }
                Context::Loop {
                    continue_target,
                    exit,
                    ..
                } => {
                    if target == *continue_target && !crossed_loop {
                        return Some(Some(StructuredStmt::Continue));
                    }
                    if Some(target) == *exit && !crossed_breakable {
                        return Some(Some(StructuredStmt::Break));
                    }
                    crossed_loop = true;
                    crossed_breakable = true;
                }
                Context::Switch { exit } => {
                    if Some(target) == *exit && !crossed_breakable {
                        return Some(Some(StructuredStmt::Break));
                    }
                    crossed_breakable = true;
                }
            }
        }
        None
    }

    fn goto(&mut self, target: BlockId, out: &mut Vec<StructuredStmt>) {
        debug!("unstructured jump to block {}", target);
        self.goto_targets.insert(target);
        out.push(StructuredStmt::Goto(target));
    }

    /// Where both arms of a branch at `id` meet again, when that point lies
    /// inside the innermost loop and try range and has not been emitted yet.
    fn join_point(&self, id: BlockId) -> Option<BlockId> {
        let join = *self.post_dominators.get(&id)?;
        if join == VIRTUAL_EXIT || self.emitted.contains(&join) {
            return None;
        }
        for ctx in self.contexts.iter().rev() {
            match ctx {
                Context::Loop { body, .. } if !body.contains(&join) => return None,
                Context::Try { start, end, .. } if !(*start..*end).contains(&join) => return None,
                _ => {}
            }
        }
        Some(join)
    }

    fn is_active_header(&self, id: BlockId) -> bool {
        self.contexts
            .iter()
            .any(|c| matches!(c, Context::Loop { header, .. } if *header == id))
    }

    fn condition_of(&self, id: BlockId) -> Expr {
        self.simulated
            .get(&id)
            .and_then(|s| s.branch_condition.clone())
            .unwrap_or_else(|| Expr::Unresolved("condition".into()))
    }
}

fn is_empty_body(body: &[StructuredStmt]) -> bool {
    body.iter().all(|s| matches!(s, StructuredStmt::Label(_)))
}

fn strip_trailing_continue(mut body: Vec<StructuredStmt>) -> Vec<StructuredStmt> {
    if matches!(body.last(), Some(StructuredStmt::Continue)) {
        body.pop();
    }
    body
}

/// Remove the `astore` that saves the caught exception at the top of a
/// handler and return the variable's name.
fn take_caught_store(body: &mut Vec<StructuredStmt>) -> Option<String> {
    let pos = body.iter().position(|s| !matches!(s, StructuredStmt::Label(_)))?;
    match &body[pos] {
        StructuredStmt::Simple(Stmt::LocalStore {
            var,
            value: Expr::CaughtException(_),
        }) => {
            let name = var.name.clone();
            body.remove(pos);
            Some(name)
        }
        _ => None,
    }
}

/// Compute immediate dominators using a simple iterative algorithm.
fn compute_dominators(cfg: &ControlFlowGraph, rpo: &[BlockId]) -> HashMap<BlockId, BlockId> {
    immediate_dominators(cfg.entry, rpo, |b| cfg.predecessors(b).to_vec())
}

/// Compute post-dominators: dominators of the reverse graph rooted at a
/// virtual exit, over normal edges only. Blocks that never reach an exit
/// get no entry.
fn compute_post_dominators(cfg: &ControlFlowGraph) -> HashMap<BlockId, BlockId> {
    let exits: Vec<BlockId> = cfg
        .blocks
        .keys()
        .copied()
        .filter(|b| cfg.normal_successors(*b).is_empty())
        .collect();
    let reverse_succs = |b: BlockId| -> Vec<BlockId> {
        if b == VIRTUAL_EXIT {
            exits.clone()
        } else {
            cfg.normal_predecessors(b)
        }
    };

    // reverse postorder of the reverse graph
    let mut visited = BTreeSet::new();
    let mut postorder = Vec::new();
    let mut stack = vec![(VIRTUAL_EXIT, 0usize)];
    visited.insert(VIRTUAL_EXIT);
    while let Some((node, next)) = stack.pop() {
        let succs = reverse_succs(node);
        if let Some(&succ) = succs.get(next) {
            stack.push((node, next + 1));
            if visited.insert(succ) {
                stack.push((succ, 0));
            }
        } else {
            postorder.push(node);
        }
    }
    postorder.reverse();

    immediate_dominators(VIRTUAL_EXIT, &postorder, |b| {
        let succs = cfg.normal_successors(b);
        if succs.is_empty() {
            vec![VIRTUAL_EXIT]
        } else {
            succs.to_vec()
        }
    })
}

/// Cooper, Harvey and Kennedy's iterative dominator algorithm over `order`
/// (a reverse postorder starting at `entry`).
fn immediate_dominators(
    entry: BlockId,
    order: &[BlockId],
    preds: impl Fn(BlockId) -> Vec<BlockId>,
) -> HashMap<BlockId, BlockId> {
    let mut doms: HashMap<BlockId, BlockId> = HashMap::new();
    doms.insert(entry, entry);
    let index: HashMap<BlockId, usize> = order.iter().enumerate().map(|(i, &b)| (b, i)).collect();

    let mut changed = true;
    while changed {
        changed = false;
        for &b in order {
            if b == entry {
                continue;
            }
            let mut new_idom: Option<BlockId> = None;
            for p in preds(b) {
                if !doms.contains_key(&p) {
                    continue;
                }
                new_idom = Some(match new_idom {
                    None => p,
                    Some(current) => intersect(&doms, &index, current, p),
                });
            }
            if let Some(idom) = new_idom {
                if doms.get(&b) != Some(&idom) {
                    doms.insert(b, idom);
                    changed = true;
                }
            }
        }
    }
    doms.remove(&entry);
    doms
}

fn intersect(
    doms: &HashMap<BlockId, BlockId>,
    index: &HashMap<BlockId, usize>,
    mut b1: BlockId,
    mut b2: BlockId,
) -> BlockId {
    while b1 != b2 {
        let idx1 = index.get(&b1).copied().unwrap_or(usize::MAX);
        let idx2 = index.get(&b2).copied().unwrap_or(usize::MAX);
        if idx1 > idx2 {
            match doms.get(&b1) {
                Some(&d) if d != b1 => b1 = d,
                _ => return b2,
            }
        } else {
            match doms.get(&b2) {
                Some(&d) if d != b2 => b2 = d,
                _ => return b1,
            }
        }
    }
    b1
}

fn dominates(doms: &HashMap<BlockId, BlockId>, entry: BlockId, a: BlockId, mut b: BlockId) -> bool {
    loop {
        if a == b {
            return true;
        }
        if b == entry {
            return false;
        }
        match doms.get(&b) {
            Some(&d) => b = d,
            None => return false,
        }
    }
}

/// Natural loops keyed by header: a back edge is a normal edge whose target
/// dominates its source.
fn find_loops(cfg: &ControlFlowGraph, dominators: &HashMap<BlockId, BlockId>) -> BTreeMap<BlockId, LoopInfo> {
    let mut loops: BTreeMap<BlockId, LoopInfo> = BTreeMap::new();
    for &id in cfg.blocks.keys() {
        if id != cfg.entry && !dominators.contains_key(&id) {
            continue;
        }
        for &succ in cfg.normal_successors(id) {
            if dominates(dominators, cfg.entry, succ, id) {
                loops
                    .entry(succ)
                    .or_insert_with(|| LoopInfo {
                        body: BTreeSet::new(),
                        latches: Vec::new(),
                    })
                    .latches
                    .push(id);
            }
        }
    }
    for (header, info) in loops.iter_mut() {
        info.body.insert(*header);
        let mut worklist = info.latches.clone();
        while let Some(b) = worklist.pop() {
            if info.body.insert(b) {
                worklist.extend(cfg.normal_predecessors(b));
            }
        }
    }
    loops
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code_attribute::{disassemble, DisassemblyPolicy};
    use crate::decompile::cfg::build_cfg;
    use crate::decompile::stack_sim::StackSimulator;
    use crate::method_info::MethodCode;

    fn structure(bytes: &[u8]) -> StructuredBody {
        let pool = ConstantPool::default();
        let code = MethodCode {
            max_stack: 4,
            max_locals: 4,
            code: bytes.to_vec(),
            exception_table: vec![],
            line_numbers: vec![],
            local_variables: vec![],
        };
        let instrs = disassemble(&code.code, DisassemblyPolicy::Strict).unwrap();
        let cfg = build_cfg(&instrs, &[]);
        let sims = StackSimulator::new(&pool, &code, true).simulate(&cfg);
        structure_method(&cfg, &sims, &pool)
    }

    fn without_labels(stmts: &[StructuredStmt]) -> Vec<&StructuredStmt> {
        stmts
            .iter()
            .filter(|s| !matches!(s, StructuredStmt::Label(_)))
            .collect()
    }

    #[test]
    fn counted_loop_becomes_a_while() {
        let body = structure(&[
            0x03, 0x3c, 0x03, 0x3d, 0xa7, 0x00, 0x0a, 0x1b, 0x1c, 0x60, 0x3c, 0x84, 0x02, 0x01,
            0x1c, 0x1a, 0xa1, 0xff, 0xf7, 0x1b, 0xac,
        ]);
        let stmts = without_labels(&body.statements);
        assert_eq!(stmts.len(), 4);
        match stmts[2] {
            StructuredStmt::While { condition, body } => {
                assert!(matches!(condition, Expr::Compare { op: CompareOp::Lt, .. }));
                assert_eq!(without_labels(body).len(), 2);
            }
            other => panic!("expected while, got {:?}", other),
        }
        assert!(matches!(stmts[3], StructuredStmt::Simple(Stmt::Return(Some(_)))));
        assert!(!body.has_gotos());
    }

    #[test]
    fn diamond_becomes_if_else() {
        // iload_0; ifeq +8 -> 9; iconst_1; istore_1; goto +5 -> 11; 9: iconst_2; istore_1; 11: iload_1; ireturn
        let body = structure(&[
            0x1a, 0x99, 0x00, 0x08, 0x04, 0x3c, 0xa7, 0x00, 0x05, 0x05, 0x3c, 0x1b, 0xac,
        ]);
        let stmts = without_labels(&body.statements);
        match stmts[0] {
            StructuredStmt::If {
                condition,
                then_body,
                else_body,
            } => {
                assert!(matches!(condition, Expr::Compare { op: CompareOp::Ne, .. }));
                assert_eq!(without_labels(then_body).len(), 1);
                assert_eq!(without_labels(else_body).len(), 1);
            }
            other => panic!("expected if, got {:?}", other),
        }
        assert!(matches!(stmts[1], StructuredStmt::Simple(Stmt::Return(Some(_)))));
    }

    #[test]
    fn early_return_needs_no_else() {
        // iload_0; ifne +5 -> 6; iconst_0; ireturn; 6: iconst_1; ireturn
        let body = structure(&[0x1a, 0x9a, 0x00, 0x05, 0x03, 0xac, 0x04, 0xac]);
        assert!(!body.has_gotos());
        let stmts = without_labels(&body.statements);
        assert!(matches!(stmts[0], StructuredStmt::If { .. }));
    }

    #[test]
    fn trailing_void_return_is_dropped() {
        let body = structure(&[0x03, 0x3b, 0xb1]);
        let stmts = without_labels(&body.statements);
        assert_eq!(stmts.len(), 1);
        assert!(matches!(stmts[0], StructuredStmt::Simple(Stmt::LocalStore { .. })));
    }

    #[test]
    fn dominator_tree_of_a_loop() {
        let instrs = disassemble(
            &[
                0x03, 0x3c, 0x03, 0x3d, 0xa7, 0x00, 0x0a, 0x1b, 0x1c, 0x60, 0x3c, 0x84, 0x02,
                0x01, 0x1c, 0x1a, 0xa1, 0xff, 0xf7, 0x1b, 0xac,
            ],
            DisassemblyPolicy::Strict,
        )
        .unwrap();
        let cfg = build_cfg(&instrs, &[]);
        let doms = compute_dominators(&cfg, &cfg.reverse_postorder());
        assert_eq!(doms[&14], 0);
        assert_eq!(doms[&7], 14);
        assert_eq!(doms[&19], 14);
        let loops = find_loops(&cfg, &doms);
        assert_eq!(loops[&14].body, BTreeSet::from([7, 14]));
        let pdoms = compute_post_dominators(&cfg);
        assert_eq!(pdoms[&0], 14);
        assert_eq!(pdoms[&7], 14);
    }
}
