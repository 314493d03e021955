use std::collections::BTreeMap;

use log::trace;

use crate::code_attribute::{Instruction, WideInstruction};
use crate::constant_info::{Constant, ConstantPool};
use crate::descriptor::*;
use crate::method_info::MethodCode;

use super::cfg_types::*;
use super::expr::*;

const OBJECT: &str = "java/lang/Object";

/// Turns the instructions of each block into expression trees and statements
/// by simulating the operand stack symbolically.
pub struct StackSimulator<'a> {
    pool: &'a ConstantPool,
    code: &'a MethodCode,
    is_static: bool,
}

impl<'a> StackSimulator<'a> {
    pub fn new(pool: &'a ConstantPool, code: &'a MethodCode, is_static: bool) -> Self {
        Self { pool, code, is_static }
    }

    /// Simulate every reachable block in reverse postorder.
    ///
    /// A block starts with the exit stack of the first simulated predecessor;
    /// exception handlers start with the caught exception. Values left on the
    /// stack across an edge into a join block are stored into `stackN`
    /// locals, so every predecessor contributes its own value.
    pub fn simulate(&self, cfg: &ControlFlowGraph) -> BTreeMap<BlockId, SimulatedBlock> {
        let mut entry_stacks: BTreeMap<BlockId, Vec<Expr>> = BTreeMap::new();
        for entry in &cfg.exception_table {
            let caught = match entry.catch_type {
                0 => "java/lang/Throwable".to_string(),
                index => self
                    .pool
                    .class_name(index)
                    .unwrap_or("java/lang/Throwable")
                    .to_string(),
            };
            entry_stacks
                .entry(entry.handler_pc as u32)
                .or_insert_with(|| vec![Expr::CaughtException(caught)]);
        }

        let mut out = BTreeMap::new();
        for id in cfg.reverse_postorder() {
            let Some(block) = cfg.block(id) else {
                continue;
            };
            let stack = entry_stacks.get(&id).cloned().unwrap_or_default();
            let mut sim = self.simulate_block(block, stack);
            let joins = block
                .successors
                .iter()
                .any(|succ| cfg.normal_predecessors(*succ).len() > 1);
            if joins && !sim.exit_stack.is_empty() {
                spill(&mut sim);
            }
            for succ in &block.successors {
                entry_stacks
                    .entry(*succ)
                    .or_insert_with(|| sim.exit_stack.clone());
            }
            out.insert(id, sim);
        }
        out
    }

    /// Simulate a single basic block, converting bytecode instructions into
    /// expression trees and statement lists.
    pub fn simulate_block(&self, block: &BasicBlock, entry_stack: Vec<Expr>) -> SimulatedBlock {
        let mut stack = entry_stack;
        let mut stmts: Vec<Stmt> = Vec::new();
        let mut branch_condition = None;
        let mut switch_value = None;

        /// Pop from the stack or return an Unresolved placeholder.
        macro_rules! pop {
            () => {
                stack
                    .pop()
                    .unwrap_or_else(|| Expr::Unresolved("stack_underflow".to_string()))
            };
        }

        for addressed in &block.instructions {
            let instr = &addressed.instruction;
            let pc = addressed.address;
            let op = instr.opcode();

            if let Some((slot, ty, store)) = local_access(instr) {
                if store {
                    let value = pop!();
                    let var = self.local(slot, ty, addressed.next_address());
                    stmts.push(Stmt::LocalStore { var, value });
                } else if slot == 0 && !self.is_static && ty.is_reference() {
                    stack.push(Expr::This);
                } else {
                    stack.push(Expr::LocalLoad(self.local(slot, ty, pc)));
                }
                continue;
            }
            if let Some(op) = binary_op(op) {
                let right = pop!();
                let left = pop!();
                stack.push(Expr::BinaryOp {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                });
                continue;
            }
            if let Some(target_type) = conversion(op) {
                let operand = pop!();
                stack.push(Expr::Cast {
                    target_type,
                    operand: Box::new(operand),
                });
                continue;
            }

            match instr {
                Instruction::Nop => {}

                // ============================================================
                // Constants
                // ============================================================
                Instruction::AconstNull => stack.push(Expr::NullLiteral),
                Instruction::IconstM1 => stack.push(Expr::IntLiteral(-1)),
                Instruction::Iconst0 => stack.push(Expr::IntLiteral(0)),
                Instruction::Iconst1 => stack.push(Expr::IntLiteral(1)),
                Instruction::Iconst2 => stack.push(Expr::IntLiteral(2)),
                Instruction::Iconst3 => stack.push(Expr::IntLiteral(3)),
                Instruction::Iconst4 => stack.push(Expr::IntLiteral(4)),
                Instruction::Iconst5 => stack.push(Expr::IntLiteral(5)),
                Instruction::Lconst0 => stack.push(Expr::LongLiteral(0)),
                Instruction::Lconst1 => stack.push(Expr::LongLiteral(1)),
                Instruction::Fconst0 => stack.push(Expr::FloatLiteral(0.0)),
                Instruction::Fconst1 => stack.push(Expr::FloatLiteral(1.0)),
                Instruction::Fconst2 => stack.push(Expr::FloatLiteral(2.0)),
                Instruction::Dconst0 => stack.push(Expr::DoubleLiteral(0.0)),
                Instruction::Dconst1 => stack.push(Expr::DoubleLiteral(1.0)),
                Instruction::Bipush(v) => stack.push(Expr::IntLiteral(*v as i32)),
                Instruction::Sipush(v) => stack.push(Expr::IntLiteral(*v as i32)),
                Instruction::Ldc(index) => stack.push(self.load_constant(*index as u16)),
                Instruction::LdcW(index) | Instruction::Ldc2W(index) => {
                    stack.push(self.load_constant(*index))
                }

                // ============================================================
                // Arrays
                // ============================================================
                Instruction::Iaload
                | Instruction::Laload
                | Instruction::Faload
                | Instruction::Daload
                | Instruction::Aaload
                | Instruction::Baload
                | Instruction::Caload
                | Instruction::Saload => {
                    let index = pop!();
                    let array = pop!();
                    let element_type = array_element_type(op - 0x2e);
                    stack.push(Expr::ArrayLoad {
                        array: Box::new(array),
                        index: Box::new(index),
                        element_type,
                    });
                }
                Instruction::Iastore
                | Instruction::Lastore
                | Instruction::Fastore
                | Instruction::Dastore
                | Instruction::Aastore
                | Instruction::Bastore
                | Instruction::Castore
                | Instruction::Sastore => {
                    let value = pop!();
                    let index = pop!();
                    let array = pop!();
                    stmts.push(Stmt::ArrayStore { array, index, value });
                }
                Instruction::Arraylength => {
                    let array = pop!();
                    stack.push(Expr::ArrayLength { array: Box::new(array) });
                }
                Instruction::Newarray(atype) => {
                    let length = pop!();
                    stack.push(Expr::NewArray {
                        element_type: newarray_type(*atype).unwrap_or(JvmType::Int),
                        length: Box::new(length),
                    });
                }
                Instruction::Anewarray(index) => {
                    let length = pop!();
                    stack.push(Expr::NewArray {
                        element_type: self.class_type(*index),
                        length: Box::new(length),
                    });
                }
                Instruction::Multianewarray { index, dimensions } => {
                    let mut dims: Vec<Expr> = (0..*dimensions).map(|_| pop!()).collect();
                    dims.reverse();
                    let mut element_type = self.class_type(*index);
                    for _ in 0..*dimensions {
                        if let JvmType::Array(inner) = element_type {
                            element_type = *inner;
                        }
                    }
                    stack.push(Expr::NewMultiArray {
                        element_type,
                        dimensions: dims,
                    });
                }

                // ============================================================
                // Stack manipulation
                // ============================================================
                Instruction::Pop => {
                    let value = pop!();
                    emit_if_effectful(value, &mut stmts);
                }
                Instruction::Pop2 => {
                    let value = pop!();
                    let wide = is_wide(&value);
                    emit_if_effectful(value, &mut stmts);
                    if !wide {
                        let value = pop!();
                        emit_if_effectful(value, &mut stmts);
                    }
                }
                Instruction::Dup => {
                    let top = pop!();
                    stack.push(top.clone());
                    stack.push(top);
                }
                Instruction::DupX1 => {
                    let v1 = pop!();
                    let v2 = pop!();
                    stack.extend([v1.clone(), v2, v1]);
                }
                Instruction::DupX2 => {
                    let v1 = pop!();
                    let v2 = pop!();
                    if is_wide(&v2) {
                        stack.extend([v1.clone(), v2, v1]);
                    } else {
                        let v3 = pop!();
                        stack.extend([v1.clone(), v3, v2, v1]);
                    }
                }
                Instruction::Dup2 => {
                    let v1 = pop!();
                    if is_wide(&v1) {
                        stack.extend([v1.clone(), v1]);
                    } else {
                        let v2 = pop!();
                        stack.extend([v2.clone(), v1.clone(), v2, v1]);
                    }
                }
                Instruction::Dup2X1 => {
                    let v1 = pop!();
                    if is_wide(&v1) {
                        let v2 = pop!();
                        stack.extend([v1.clone(), v2, v1]);
                    } else {
                        let v2 = pop!();
                        let v3 = pop!();
                        stack.extend([v2.clone(), v1.clone(), v3, v2, v1]);
                    }
                }
                Instruction::Dup2X2 => {
                    let v1 = pop!();
                    let v2 = pop!();
                    match (is_wide(&v1), is_wide(&v2)) {
                        (true, true) => stack.extend([v1.clone(), v2, v1]),
                        (true, false) => {
                            let v3 = pop!();
                            stack.extend([v1.clone(), v3, v2, v1]);
                        }
                        _ => {
                            let v3 = pop!();
                            if is_wide(&v3) {
                                stack.extend([v2.clone(), v1.clone(), v3, v2, v1]);
                            } else {
                                let v4 = pop!();
                                stack.extend([v2.clone(), v1.clone(), v4, v3, v2, v1]);
                            }
                        }
                    }
                }
                Instruction::Swap => {
                    let v1 = pop!();
                    let v2 = pop!();
                    stack.extend([v1, v2]);
                }

                // ============================================================
                // Arithmetic not covered by the operator tables
                // ============================================================
                Instruction::Ineg | Instruction::Lneg | Instruction::Fneg | Instruction::Dneg => {
                    let operand = pop!();
                    stack.push(Expr::UnaryOp {
                        op: UnaryOp::Neg,
                        operand: Box::new(operand),
                    });
                }
                Instruction::Iinc { index, value } => {
                    stmts.push(Stmt::Iinc {
                        var: self.local(*index as u16, JvmType::Int, pc),
                        amount: *value as i32,
                    });
                }
                Instruction::Wide(WideInstruction::Iinc { index, value }) => {
                    stmts.push(Stmt::Iinc {
                        var: self.local(*index, JvmType::Int, pc),
                        amount: *value as i32,
                    });
                }
                Instruction::Lcmp
                | Instruction::Fcmpl
                | Instruction::Fcmpg
                | Instruction::Dcmpl
                | Instruction::Dcmpg => {
                    let right = pop!();
                    let left = pop!();
                    stack.push(Expr::CmpResult {
                        left: Box::new(left),
                        right: Box::new(right),
                    });
                }

                // ============================================================
                // Control flow
                // ============================================================
                Instruction::Goto(_) | Instruction::GotoW(_) => {}
                Instruction::Tableswitch { .. } | Instruction::Lookupswitch { .. } => {
                    switch_value = Some(pop!());
                }
                other if other.conditional_offset().is_some() => {
                    if let Terminator::ConditionalBranch { condition, .. } = &block.terminator {
                        branch_condition = Some(match condition {
                            BranchCondition::IntZero(op) => {
                                let value = pop!();
                                make_if_zero_cond(value, *op)
                            }
                            BranchCondition::IntCompare(op) | BranchCondition::RefCompare(op) => {
                                let right = pop!();
                                let left = pop!();
                                Expr::Compare {
                                    op: *op,
                                    left: Box::new(left),
                                    right: Box::new(right),
                                }
                            }
                            BranchCondition::RefNull(is_null) => {
                                let value = pop!();
                                Expr::Compare {
                                    op: if *is_null { CompareOp::Eq } else { CompareOp::Ne },
                                    left: Box::new(value),
                                    right: Box::new(Expr::NullLiteral),
                                }
                            }
                        });
                    }
                }
                Instruction::Jsr(_) | Instruction::JsrW(_) => {
                    stack.push(Expr::Unresolved("returnAddress".to_string()));
                }
                Instruction::Ret(_) | Instruction::Wide(WideInstruction::Ret(_)) => {
                    stmts.push(Stmt::Comment("ret".to_string()));
                }
                Instruction::Return => stmts.push(Stmt::Return(None)),
                Instruction::Ireturn
                | Instruction::Lreturn
                | Instruction::Freturn
                | Instruction::Dreturn
                | Instruction::Areturn => {
                    let value = pop!();
                    stmts.push(Stmt::Return(Some(value)));
                }
                Instruction::Athrow => {
                    let value = pop!();
                    stmts.push(Stmt::Throw(value));
                }

                // ============================================================
                // Fields
                // ============================================================
                Instruction::Getstatic(index) => {
                    let (class_name, field_name, field_type) = self.field_ref(*index);
                    stack.push(Expr::FieldGet {
                        object: None,
                        class_name,
                        field_name,
                        field_type,
                    });
                }
                Instruction::Getfield(index) => {
                    let (class_name, field_name, field_type) = self.field_ref(*index);
                    let object = pop!();
                    stack.push(Expr::FieldGet {
                        object: Some(Box::new(object)),
                        class_name,
                        field_name,
                        field_type,
                    });
                }
                Instruction::Putstatic(index) => {
                    let (class_name, field_name, _) = self.field_ref(*index);
                    let value = pop!();
                    stmts.push(Stmt::FieldStore {
                        object: None,
                        class_name,
                        field_name,
                        value,
                    });
                }
                Instruction::Putfield(index) => {
                    let (class_name, field_name, _) = self.field_ref(*index);
                    let value = pop!();
                    let object = pop!();
                    stmts.push(Stmt::FieldStore {
                        object: Some(object),
                        class_name,
                        field_name,
                        value,
                    });
                }

                // ============================================================
                // Method invocation
                // ============================================================
                Instruction::Invokevirtual(index)
                | Instruction::Invokeinterface { index, .. }
                | Instruction::Invokestatic(index)
                | Instruction::Invokespecial(index) => {
                    let kind = match instr {
                        Instruction::Invokevirtual(_) => InvokeKind::Virtual,
                        Instruction::Invokeinterface { .. } => InvokeKind::Interface,
                        Instruction::Invokestatic(_) => InvokeKind::Static,
                        _ => InvokeKind::Special,
                    };
                    let (class_name, method_name, descriptor, signature) = self.method_ref(*index);
                    let mut args: Vec<Expr> = signature.params.iter().map(|_| pop!()).collect();
                    args.reverse();
                    let object = match kind {
                        InvokeKind::Static => None,
                        _ => Some(pop!()),
                    };

                    if method_name == "<init>" {
                        if let Some(Expr::UninitNew { site, .. }) = &object {
                            let created = Expr::New { class_name, args };
                            if !replace_uninit_new(&mut stack, *site, &created) {
                                stmts.push(Stmt::ExprStmt(created));
                            }
                            continue;
                        }
                    }

                    let call = Expr::MethodCall {
                        kind,
                        object: object.map(Box::new),
                        class_name,
                        method_name,
                        descriptor,
                        args,
                        return_type: signature.ret.clone(),
                    };
                    if signature.ret == JvmType::Void {
                        stmts.push(Stmt::ExprStmt(call));
                    } else {
                        stack.push(call);
                    }
                }
                Instruction::Invokedynamic { index, .. } => {
                    let (method_name, signature) = match self.pool.resolve(*index) {
                        Ok(Constant::InvokeDynamic { name, descriptor, .. }) => (
                            name.clone(),
                            parse_method_descriptor(descriptor).unwrap_or_else(void_signature),
                        ),
                        _ => (format!("indy#{}", index), void_signature()),
                    };
                    let mut args: Vec<Expr> = signature.params.iter().map(|_| pop!()).collect();
                    args.reverse();
                    let expr = Expr::InvokeDynamic { method_name, args };
                    if signature.ret == JvmType::Void {
                        stmts.push(Stmt::ExprStmt(expr));
                    } else {
                        stack.push(expr);
                    }
                }

                // ============================================================
                // Objects
                // ============================================================
                Instruction::New(index) => {
                    let class_name = self.pool.class_name(*index).unwrap_or(OBJECT).to_string();
                    stack.push(Expr::UninitNew { class_name, site: pc });
                }
                Instruction::Checkcast(index) => {
                    let operand = pop!();
                    stack.push(Expr::Cast {
                        target_type: self.class_type(*index),
                        operand: Box::new(operand),
                    });
                }
                Instruction::Instanceof(index) => {
                    let operand = pop!();
                    stack.push(Expr::Instanceof {
                        operand: Box::new(operand),
                        check_type: self.pool.class_name(*index).unwrap_or(OBJECT).to_string(),
                    });
                }
                Instruction::Monitorenter => {
                    let object = pop!();
                    stmts.push(Stmt::Monitor { enter: true, object });
                }
                Instruction::Monitorexit => {
                    let object = pop!();
                    stmts.push(Stmt::Monitor { enter: false, object });
                }

                Instruction::Unknown(byte) => {
                    stmts.push(Stmt::Comment(format!("unknown opcode {:#04x} at {}", byte, pc)));
                }

                // Catch-all for any instruction without a source form
                other => {
                    trace!("no source form for {} at {}", other.mnemonic(), pc);
                    stmts.push(Stmt::Comment(other.mnemonic().to_string()));
                }
            }
        }

        SimulatedBlock {
            id: block.id,
            statements: stmts,
            exit_stack: stack,
            branch_condition,
            switch_value,
        }
    }

    /// Name a local slot: the LocalVariableTable name when there is one, else
    /// the type prefix plus the slot number.
    fn local(&self, slot: u16, hint: JvmType, pc: u32) -> LocalVar {
        let scoped = self.code.local_variables.iter().find(|v| {
            v.index == slot
                && (v.start_pc as u32) <= pc
                && pc <= v.start_pc as u32 + v.length as u32
        });
        if let Some(v) = scoped {
            return LocalVar {
                index: slot,
                name: v.name.clone(),
                ty: parse_field_descriptor(&v.descriptor).unwrap_or(hint),
            };
        }
        let name = match self.code.any_local_name(slot) {
            Some(name) => name.to_string(),
            None if slot == 0 && !self.is_static => "this".to_string(),
            None => format!("{}{}", hint.local_prefix(), slot),
        };
        LocalVar {
            index: slot,
            name,
            ty: hint,
        }
    }

    /// Load a constant from the constant pool by index (for ldc/ldc_w/ldc2_w).
    fn load_constant(&self, index: u16) -> Expr {
        match self.pool.loadable(index) {
            Ok(Constant::Integer(v)) => Expr::IntLiteral(*v),
            Ok(Constant::Float(v)) => Expr::FloatLiteral(*v),
            Ok(Constant::Long(v)) => Expr::LongLiteral(*v),
            Ok(Constant::Double(v)) => Expr::DoubleLiteral(*v),
            Ok(Constant::String(s)) => Expr::StringLiteral(s.clone()),
            Ok(Constant::Class(name)) => Expr::ClassLiteral(name.clone()),
            Ok(other) => Expr::Unresolved(other.to_string()),
            Err(_) => Expr::Unresolved(format!("#{}", index)),
        }
    }

    /// Resolve a field reference to (class_name, field_name, field_type).
    fn field_ref(&self, index: u16) -> (String, String, JvmType) {
        match self.pool.member_ref(index) {
            Ok(m) => (
                m.class_name.clone(),
                m.name.clone(),
                parse_field_descriptor(&m.descriptor)
                    .unwrap_or_else(|| JvmType::Reference(OBJECT.to_string())),
            ),
            Err(_) => (OBJECT.to_string(), format!("field#{}", index), JvmType::Int),
        }
    }

    /// Resolve a method reference to (class_name, method_name, descriptor, signature).
    fn method_ref(&self, index: u16) -> (String, String, String, MethodSignature) {
        match self.pool.member_ref(index) {
            Ok(m) => (
                m.class_name.clone(),
                m.name.clone(),
                m.descriptor.clone(),
                parse_method_descriptor(&m.descriptor).unwrap_or_else(void_signature),
            ),
            Err(_) => (
                OBJECT.to_string(),
                format!("method#{}", index),
                "()V".to_string(),
                void_signature(),
            ),
        }
    }

    /// Type named by a Class entry, which may be an array descriptor.
    fn class_type(&self, index: u16) -> JvmType {
        match self.pool.class_name(index) {
            Ok(name) if name.starts_with('[') => parse_field_descriptor(name)
                .unwrap_or_else(|| JvmType::Reference(OBJECT.to_string())),
            Ok(name) => JvmType::Reference(name.to_string()),
            Err(_) => JvmType::Reference(OBJECT.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

fn void_signature() -> MethodSignature {
    MethodSignature {
        params: Vec::new(),
        ret: JvmType::Void,
    }
}

fn kind_type(kind: u8) -> JvmType {
    match kind {
        0 => JvmType::Int,
        1 => JvmType::Long,
        2 => JvmType::Float,
        3 => JvmType::Double,
        _ => JvmType::Reference(OBJECT.to_string()),
    }
}

/// Slot, value kind and direction of a local load or store.
fn local_access(instr: &Instruction) -> Option<(u16, JvmType, bool)> {
    let op = instr.opcode();
    match instr {
        Instruction::Iload(n)
        | Instruction::Lload(n)
        | Instruction::Fload(n)
        | Instruction::Dload(n)
        | Instruction::Aload(n) => Some((*n as u16, kind_type(op - 0x15), false)),
        Instruction::Istore(n)
        | Instruction::Lstore(n)
        | Instruction::Fstore(n)
        | Instruction::Dstore(n)
        | Instruction::Astore(n) => Some((*n as u16, kind_type(op - 0x36), true)),
        Instruction::Wide(wide) => match wide {
            WideInstruction::Iload(n) => Some((*n, JvmType::Int, false)),
            WideInstruction::Lload(n) => Some((*n, JvmType::Long, false)),
            WideInstruction::Fload(n) => Some((*n, JvmType::Float, false)),
            WideInstruction::Dload(n) => Some((*n, JvmType::Double, false)),
            WideInstruction::Aload(n) => Some((*n, kind_type(4), false)),
            WideInstruction::Istore(n) => Some((*n, JvmType::Int, true)),
            WideInstruction::Lstore(n) => Some((*n, JvmType::Long, true)),
            WideInstruction::Fstore(n) => Some((*n, JvmType::Float, true)),
            WideInstruction::Dstore(n) => Some((*n, JvmType::Double, true)),
            WideInstruction::Astore(n) => Some((*n, kind_type(4), true)),
            WideInstruction::Iinc { .. } | WideInstruction::Ret(_) => None,
        },
        _ => match op {
            0x1a..=0x2d => Some((((op - 0x1a) % 4) as u16, kind_type((op - 0x1a) / 4), false)),
            0x3b..=0x4e => Some((((op - 0x3b) % 4) as u16, kind_type((op - 0x3b) / 4), true)),
            _ => None,
        },
    }
}

fn binary_op(op: u8) -> Option<BinOp> {
    Some(match op {
        0x60..=0x63 => BinOp::Add,
        0x64..=0x67 => BinOp::Sub,
        0x68..=0x6b => BinOp::Mul,
        0x6c..=0x6f => BinOp::Div,
        0x70..=0x73 => BinOp::Rem,
        0x78 | 0x79 => BinOp::Shl,
        0x7a | 0x7b => BinOp::Shr,
        0x7c | 0x7d => BinOp::Ushr,
        0x7e | 0x7f => BinOp::And,
        0x80 | 0x81 => BinOp::Or,
        0x82 | 0x83 => BinOp::Xor,
        _ => return None,
    })
}

/// Target type of the primitive conversions `i2l` through `i2s`.
fn conversion(op: u8) -> Option<JvmType> {
    Some(match op {
        0x88 | 0x8b | 0x8e => JvmType::Int,
        0x85 | 0x8c | 0x8f => JvmType::Long,
        0x86 | 0x89 | 0x90 => JvmType::Float,
        0x87 | 0x8a | 0x8d => JvmType::Double,
        0x91 => JvmType::Byte,
        0x92 => JvmType::Char,
        0x93 => JvmType::Short,
        _ => return None,
    })
}

fn array_element_type(kind: u8) -> JvmType {
    match kind {
        0 => JvmType::Int,
        1 => JvmType::Long,
        2 => JvmType::Float,
        3 => JvmType::Double,
        5 => JvmType::Byte,
        6 => JvmType::Char,
        7 => JvmType::Short,
        _ => JvmType::Reference(OBJECT.to_string()),
    }
}

/// Whether the value occupies two stack words.
fn is_wide(expr: &Expr) -> bool {
    match expr {
        Expr::LongLiteral(_) | Expr::DoubleLiteral(_) => true,
        Expr::LocalLoad(var) => var.ty.is_wide(),
        Expr::BinaryOp { left, .. } => is_wide(left),
        Expr::UnaryOp { op: UnaryOp::Neg, operand } => is_wide(operand),
        Expr::Cast { target_type, .. } => target_type.is_wide(),
        Expr::FieldGet { field_type, .. } => field_type.is_wide(),
        Expr::MethodCall { return_type, .. } => return_type.is_wide(),
        Expr::ArrayLoad { element_type, .. } => element_type.is_wide(),
        _ => false,
    }
}

fn is_boolean(expr: &Expr) -> bool {
    match expr {
        Expr::Instanceof { .. } | Expr::Compare { .. } | Expr::BoolLiteral(_) => true,
        Expr::LocalLoad(var) => var.ty == JvmType::Boolean,
        Expr::FieldGet { field_type, .. } => *field_type == JvmType::Boolean,
        Expr::MethodCall { return_type, .. } => *return_type == JvmType::Boolean,
        _ => false,
    }
}

/// Build a branch condition for `if<cond>` opcodes that compare against zero.
/// A CmpResult (from lcmp/fcmp/dcmp) folds into a direct comparison and a
/// boolean operand tested against zero becomes the operand itself.
fn make_if_zero_cond(value: Expr, op: CompareOp) -> Expr {
    match value {
        Expr::CmpResult { left, right } => Expr::Compare { op, left, right },
        v if is_boolean(&v) && op == CompareOp::Ne => v,
        v if is_boolean(&v) && op == CompareOp::Eq => v.negate(),
        v => Expr::Compare {
            op,
            left: Box::new(v),
            right: Box::new(Expr::IntLiteral(0)),
        },
    }
}

fn emit_if_effectful(value: Expr, stmts: &mut Vec<Stmt>) {
    if value.has_side_effects() {
        stmts.push(Stmt::ExprStmt(value));
    }
}

/// Replace every copy of the uninitialized object created at `site` with the
/// constructed expression. Returns whether any copy was on the stack.
fn replace_uninit_new(stack: &mut [Expr], site: u32, replacement: &Expr) -> bool {
    let mut replaced = false;
    for item in stack.iter_mut() {
        if matches!(item, Expr::UninitNew { site: s, .. } if *s == site) {
            *item = replacement.clone();
            replaced = true;
        }
    }
    replaced
}

/// Store each value of the exit stack into its `stackN` local and leave
/// loads of those locals behind. `this` and objects awaiting their
/// constructor are the same on every path and stay in place.
fn spill(sim: &mut SimulatedBlock) {
    let values = std::mem::take(&mut sim.exit_stack);
    for (depth, value) in values.into_iter().enumerate() {
        if matches!(value, Expr::This | Expr::UninitNew { .. }) {
            sim.exit_stack.push(value);
            continue;
        }
        let var = spill_var(depth, value_type(&value));
        trace!("block {} spills {} at join", sim.id, var.name);
        sim.statements.push(Stmt::LocalStore {
            var: var.clone(),
            value,
        });
        sim.exit_stack.push(Expr::LocalLoad(var));
    }
}

/// Stack slots get indices from the top of the slot space, away from real locals.
fn spill_var(depth: usize, ty: JvmType) -> LocalVar {
    LocalVar {
        index: u16::MAX - depth as u16,
        name: format!("stack{}", depth),
        ty,
    }
}

/// Best-effort static type of a symbolic value.
fn value_type(expr: &Expr) -> JvmType {
    match expr {
        Expr::IntLiteral(_) | Expr::CmpResult { .. } | Expr::ArrayLength { .. } => JvmType::Int,
        Expr::LongLiteral(_) => JvmType::Long,
        Expr::FloatLiteral(_) => JvmType::Float,
        Expr::DoubleLiteral(_) => JvmType::Double,
        Expr::BoolLiteral(_) | Expr::Compare { .. } | Expr::Instanceof { .. } => JvmType::Boolean,
        Expr::StringLiteral(_) => JvmType::Reference("java/lang/String".to_string()),
        Expr::ClassLiteral(_) => JvmType::Reference("java/lang/Class".to_string()),
        Expr::LocalLoad(var) => var.ty.clone(),
        Expr::CaughtException(name) => JvmType::Reference(name.clone()),
        Expr::BinaryOp { left, .. } => value_type(left),
        Expr::UnaryOp { operand, .. } => value_type(operand),
        Expr::Cast { target_type, .. } => target_type.clone(),
        Expr::FieldGet { field_type, .. } => field_type.clone(),
        Expr::MethodCall { return_type, .. } => return_type.clone(),
        Expr::New { class_name, .. } | Expr::UninitNew { class_name, .. } => {
            JvmType::Reference(class_name.clone())
        }
        Expr::NewArray { element_type, .. } => JvmType::Array(Box::new(element_type.clone())),
        Expr::NewMultiArray {
            element_type,
            dimensions,
        } => dimensions
            .iter()
            .fold(element_type.clone(), |ty, _| JvmType::Array(Box::new(ty))),
        Expr::ArrayLoad { element_type, .. } => element_type.clone(),
        Expr::This
        | Expr::NullLiteral
        | Expr::InvokeDynamic { .. }
        | Expr::Unresolved(_) => JvmType::Reference(OBJECT.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code_attribute::{disassemble, DisassemblyPolicy};
    use crate::constant_info::{ConstantInfo, Utf8Constant};
    use crate::decompile::cfg::build_cfg;

    fn code(bytes: &[u8]) -> MethodCode {
        MethodCode {
            max_stack: 4,
            max_locals: 4,
            code: bytes.to_vec(),
            exception_table: vec![],
            line_numbers: vec![],
            local_variables: vec![],
        }
    }

    fn simulate(bytes: &[u8], is_static: bool) -> BTreeMap<BlockId, SimulatedBlock> {
        let pool = ConstantPool::from_constants(vec![ConstantInfo::Utf8(Utf8Constant::new("x"))]);
        let code = code(bytes);
        let instrs = disassemble(&code.code, DisassemblyPolicy::Strict).unwrap();
        let cfg = build_cfg(&instrs, &[]);
        StackSimulator::new(&pool, &code, is_static).simulate(&cfg)
    }

    fn local(name: &str, index: u16) -> Expr {
        Expr::LocalLoad(LocalVar {
            index,
            name: name.to_string(),
            ty: JvmType::Int,
        })
    }

    #[test]
    fn add_builds_a_return_of_a_binary_expression() {
        let blocks = simulate(&[0x1a, 0x1b, 0x60, 0xac], true);
        let stmts = &blocks[&0].statements;
        assert_eq!(
            stmts,
            &vec![Stmt::Return(Some(Expr::BinaryOp {
                op: BinOp::Add,
                left: Box::new(local("i0", 0)),
                right: Box::new(local("i1", 1)),
            }))]
        );
    }

    #[test]
    fn instance_slot_zero_is_this() {
        let blocks = simulate(&[0x2a, 0xb0], false);
        assert_eq!(blocks[&0].statements, vec![Stmt::Return(Some(Expr::This))]);
    }

    #[test]
    fn stores_are_named_by_type_and_slot() {
        // lconst_1; lstore_2; aconst_null; astore_1; return
        let blocks = simulate(&[0x0a, 0x41, 0x01, 0x4c, 0xb1], true);
        let names: Vec<&str> = blocks[&0]
            .statements
            .iter()
            .filter_map(|s| match s {
                Stmt::LocalStore { var, .. } => Some(var.name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["l2", "obj1"]);
    }

    #[test]
    fn conditional_branch_records_its_condition() {
        // iload_0; iload_1; if_icmpge +5; iconst_1; ireturn; iconst_0; ireturn
        let blocks = simulate(&[0x1a, 0x1b, 0xa2, 0x00, 0x05, 0x04, 0xac, 0x03, 0xac], true);
        assert_eq!(
            blocks[&0].branch_condition,
            Some(Expr::Compare {
                op: CompareOp::Ge,
                left: Box::new(local("i0", 0)),
                right: Box::new(local("i1", 1)),
            })
        );
        assert!(blocks[&0].exit_stack.is_empty());
    }

    #[test]
    fn dup2_of_a_long_copies_one_value() {
        // lconst_1; dup2; ladd; lreturn
        let blocks = simulate(&[0x0a, 0x5c, 0x61, 0xad], true);
        assert_eq!(
            blocks[&0].statements,
            vec![Stmt::Return(Some(Expr::BinaryOp {
                op: BinOp::Add,
                left: Box::new(Expr::LongLiteral(1)),
                right: Box::new(Expr::LongLiteral(1)),
            }))]
        );
    }

    #[test]
    fn values_reaching_a_join_are_stored_on_each_path() {
        // iload_0; ifeq 8; iconst_1; goto 9; iconst_0; ireturn
        let blocks = simulate(&[0x1a, 0x99, 0x00, 0x07, 0x04, 0xa7, 0x00, 0x04, 0x03, 0xac], true);
        let stack0 = LocalVar {
            index: u16::MAX,
            name: "stack0".to_string(),
            ty: JvmType::Int,
        };
        assert_eq!(
            blocks[&4].statements,
            vec![Stmt::LocalStore {
                var: stack0.clone(),
                value: Expr::IntLiteral(1),
            }]
        );
        assert_eq!(
            blocks[&8].statements,
            vec![Stmt::LocalStore {
                var: stack0.clone(),
                value: Expr::IntLiteral(0),
            }]
        );
        assert_eq!(
            blocks[&9].statements,
            vec![Stmt::Return(Some(Expr::LocalLoad(stack0)))]
        );
    }

    #[test]
    fn straight_line_successor_keeps_the_stack() {
        // iconst_1; goto 4; ireturn
        let blocks = simulate(&[0x04, 0xa7, 0x00, 0x03, 0xac], true);
        assert!(blocks[&0].statements.is_empty());
        assert_eq!(blocks[&4].statements, vec![Stmt::Return(Some(Expr::IntLiteral(1)))]);
    }

    #[test]
    fn underflow_yields_a_placeholder() {
        let blocks = simulate(&[0x57, 0xac], true);
        assert_eq!(
            blocks[&0].statements,
            vec![Stmt::Return(Some(Expr::Unresolved("stack_underflow".to_string())))]
        );
    }
}
