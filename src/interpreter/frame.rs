//! Methods prepared for execution and their activation frames.

use std::collections::HashMap;
use std::sync::Arc;

use crate::code_attribute::{disassemble, AddressedInstruction, DisassemblyPolicy};
use crate::error::{DisassemblyError, SessionError};
use crate::method_info::{MethodCode, MethodDescriptor};

use super::value::Value;

/// A method with code, disassembled and indexed by offset.
#[derive(Debug)]
pub struct LoadedMethod {
    pub descriptor: MethodDescriptor,
    pub code: MethodCode,
    pub instructions: Vec<AddressedInstruction>,
    by_offset: HashMap<u32, usize>,
}

impl LoadedMethod {
    /// Prepare a method for execution.
    ///
    /// Unknown opcodes are kept as raw entries and fault only when executed.
    pub fn load(descriptor: MethodDescriptor) -> Result<Self, SessionError> {
        let code = descriptor
            .code
            .clone()
            .ok_or_else(|| SessionError::NoCode(descriptor.key()))?;
        let instructions = disassemble(&code.code, DisassemblyPolicy::RawFallback).map_err(|err| {
            let pc = match err {
                DisassemblyError::UnknownOpcode { offset, .. } | DisassemblyError::TruncatedInput { offset } => offset,
            };
            SessionError::Fault {
                pc,
                reason: err.to_string(),
            }
        })?;
        let by_offset = instructions
            .iter()
            .enumerate()
            .map(|(i, instr)| (instr.address, i))
            .collect();
        Ok(Self {
            descriptor,
            code,
            instructions,
            by_offset,
        })
    }

    /// `name:descriptor`
    pub fn key(&self) -> String {
        self.descriptor.key()
    }

    pub fn instruction_at(&self, pc: u32) -> Option<&AddressedInstruction> {
        self.by_offset.get(&pc).map(|&i| &self.instructions[i])
    }

    pub fn line_for_pc(&self, pc: u32) -> Option<u32> {
        self.code.line_for_pc(pc)
    }
}

/// One activation: operand stack, local slots and program counter.
#[derive(Clone, Debug)]
pub struct Frame {
    pub method: Arc<LoadedMethod>,
    /// Offset of the next instruction to execute. For a frame waiting on a
    /// callee this is still the invoke instruction.
    pub pc: u32,
    pub locals: Vec<Value>,
    pub stack: Vec<Value>,
}

impl Frame {
    /// A fresh frame at offset 0 with `args` (receiver first for instance
    /// methods) in consecutive slots; `long` and `double` take two.
    pub fn new(method: Arc<LoadedMethod>, args: Vec<Value>) -> Self {
        let needed: usize = args.iter().map(|a| if a.is_wide() { 2 } else { 1 }).sum();
        let mut locals = vec![Value::Top; needed.max(method.code.max_locals as usize)];
        let mut slot = 0;
        for arg in args {
            let width = if arg.is_wide() { 2 } else { 1 };
            locals[slot] = arg;
            slot += width;
        }
        Self {
            method,
            pc: 0,
            locals,
            stack: Vec::with_capacity(8),
        }
    }

    pub fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    pub fn pop(&mut self) -> Result<Value, String> {
        self.stack
            .pop()
            .ok_or_else(|| "operand stack underflow".to_string())
    }

    /// Pop `n` values, returning them in push order.
    pub fn pop_n(&mut self, n: usize) -> Result<Vec<Value>, String> {
        if self.stack.len() < n {
            return Err("operand stack underflow".to_string());
        }
        Ok(self.stack.split_off(self.stack.len() - n))
    }

    pub fn load(&self, slot: u16) -> Result<Value, String> {
        match self.locals.get(slot as usize) {
            None => Err(format!("invalid local slot {}", slot)),
            Some(Value::Top) => Err(format!("read of unset local slot {}", slot)),
            Some(v) => Ok(v.clone()),
        }
    }

    pub fn store(&mut self, slot: u16, value: Value) -> Result<(), String> {
        let slot = slot as usize;
        let width = if value.is_wide() { 2 } else { 1 };
        if slot + width > self.locals.len() {
            return Err(format!("invalid local slot {}", slot));
        }
        // Overwriting either half of a wide value invalidates it.
        if slot > 0 && self.locals[slot - 1].is_wide() {
            self.locals[slot - 1] = Value::Top;
        }
        self.locals[slot] = value;
        if width == 2 {
            self.locals[slot + 1] = Value::Top;
        }
        Ok(())
    }

    pub fn line(&self) -> Option<u32> {
        self.method.line_for_pc(self.pc)
    }

    pub fn snapshot(&self) -> FrameSnapshot {
        FrameSnapshot {
            method: self.method.key(),
            pc: self.pc,
            line: self.line(),
            locals: self
                .locals
                .iter()
                .enumerate()
                .map(|(slot, value)| LocalSnapshot {
                    slot: slot as u16,
                    name: self
                        .method
                        .code
                        .local_name(slot as u16, self.pc)
                        .map(str::to_string),
                    value: value.clone(),
                })
                .collect(),
            stack: self.stack.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FrameSnapshot {
    /// `name:descriptor` of the executing method.
    pub method: String,
    pub pc: u32,
    pub line: Option<u32>,
    pub locals: Vec<LocalSnapshot>,
    /// Bottom of the stack first.
    pub stack: Vec<Value>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LocalSnapshot {
    pub slot: u16,
    /// LocalVariableTable name in scope at the frame's pc.
    pub name: Option<String>,
    pub value: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::parse_method_descriptor;
    use crate::method_info::MethodAccessFlags;

    fn method(descriptor: &str, max_locals: u16) -> Arc<LoadedMethod> {
        let code = MethodCode {
            max_stack: 2,
            max_locals,
            code: vec![0xb1],
            exception_table: vec![],
            line_numbers: vec![],
            local_variables: vec![],
        };
        Arc::new(
            LoadedMethod::load(MethodDescriptor {
                name: "m".into(),
                descriptor: descriptor.into(),
                signature: parse_method_descriptor(descriptor).unwrap(),
                access_flags: MethodAccessFlags::STATIC,
                throws: vec![],
                code: Some(code),
            })
            .unwrap(),
        )
    }

    #[test]
    fn wide_arguments_take_two_slots() {
        let frame = Frame::new(method("(JI)V", 3), vec![Value::Long(5), Value::Int(2)]);
        assert_eq!(frame.locals, vec![Value::Long(5), Value::Top, Value::Int(2)]);
        assert_eq!(frame.load(2), Ok(Value::Int(2)));
        assert!(frame.load(1).is_err());
        assert!(frame.load(9).is_err());
    }

    #[test]
    fn storing_into_half_of_a_wide_value_clears_it() {
        let mut frame = Frame::new(method("(J)V", 3), vec![Value::Long(5)]);
        frame.store(1, Value::Int(7)).unwrap();
        assert_eq!(frame.locals[0], Value::Top);
        assert!(frame.store(2, Value::Double(1.0)).is_err());
    }

    #[test]
    fn pop_n_keeps_push_order() {
        let mut frame = Frame::new(method("()V", 0), vec![]);
        frame.push(Value::Int(1));
        frame.push(Value::Int(2));
        assert_eq!(frame.pop_n(2), Ok(vec![Value::Int(1), Value::Int(2)]));
        assert!(frame.pop().is_err());
    }
}
