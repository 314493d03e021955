use binrw::binrw;

use crate::attribute_info::{
    AttributeInfo, AttributeInfoVariant, CodeAttribute, ExceptionEntry, LineNumberEntry,
};
use crate::constant_info::ConstantPool;
use crate::descriptor::{parse_method_descriptor, MethodSignature};
use crate::error::ParseError;

#[binrw]
#[brw(big)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodInfo {
    pub access_flags: MethodAccessFlags,
    pub name_index: u16,
    pub descriptor_index: u16,
    #[br(temp)]
    #[bw(calc = attributes.len() as u16)]
    attributes_count: u16,
    #[br(count = attributes_count)]
    pub attributes: Vec<AttributeInfo>,
}

#[binrw]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct MethodAccessFlags(u16);

bitflags! {
    impl MethodAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const SYNCHRONIZED = 0x0020;
        const BRIDGE = 0x0040;
        const VARARGS = 0x0080;
        const NATIVE = 0x0100;
        const ABSTRACT = 0x0400;
        const STRICT = 0x0800;
        const SYNTHETIC = 0x1000;
    }
}

impl MethodAccessFlags {
    /// Source modifiers in declaration order.
    pub fn modifiers(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        for (flag, word) in [
            (Self::PUBLIC, "public"),
            (Self::PRIVATE, "private"),
            (Self::PROTECTED, "protected"),
            (Self::ABSTRACT, "abstract"),
            (Self::STATIC, "static"),
            (Self::FINAL, "final"),
            (Self::SYNCHRONIZED, "synchronized"),
            (Self::NATIVE, "native"),
            (Self::STRICT, "strictfp"),
        ] {
            if self.contains(flag) {
                out.push(word);
            }
        }
        out
    }
}

impl MethodInfo {
    pub fn name<'a>(&self, pool: &'a ConstantPool) -> Result<&'a str, ParseError> {
        Ok(pool.utf8(self.name_index)?)
    }

    pub fn descriptor<'a>(&self, pool: &'a ConstantPool) -> Result<&'a str, ParseError> {
        Ok(pool.utf8(self.descriptor_index)?)
    }

    /// Decode this method's `Code` attribute, if it has one.
    pub fn code_attribute(&self, pool: &ConstantPool) -> Result<Option<CodeAttribute>, ParseError> {
        for attr in &self.attributes {
            if attr.name(pool)? == "Code" {
                if let AttributeInfoVariant::Code(code) = attr.interpret(pool)? {
                    return Ok(Some(code));
                }
            }
        }
        Ok(None)
    }

    /// Build the resolved view of this method.
    pub fn describe(&self, pool: &ConstantPool) -> Result<MethodDescriptor, ParseError> {
        let name = self.name(pool)?.to_string();
        let descriptor = self.descriptor(pool)?.to_string();
        let signature = parse_method_descriptor(&descriptor)
            .ok_or_else(|| ParseError::InvalidDescriptor(descriptor.clone()))?;

        let mut throws = Vec::new();
        for attr in &self.attributes {
            if let AttributeInfoVariant::Exceptions(ex) = attr.interpret(pool)? {
                for &index in &ex.exception_index_table {
                    throws.push(pool.class_name(index)?.to_string());
                }
            }
        }

        let code = match self.code_attribute(pool)? {
            Some(attr) => Some(MethodCode::from_attribute(attr, pool)?),
            None => None,
        };

        Ok(MethodDescriptor {
            name,
            descriptor,
            signature,
            access_flags: self.access_flags,
            throws,
            code,
        })
    }
}

/// A method with its names and tables resolved against the constant pool.
#[derive(Clone, Debug, PartialEq)]
pub struct MethodDescriptor {
    pub name: String,
    pub descriptor: String,
    pub signature: MethodSignature,
    pub access_flags: MethodAccessFlags,
    /// Internal names from the `Exceptions` attribute.
    pub throws: Vec<String>,
    /// `None` for abstract and native methods.
    pub code: Option<MethodCode>,
}

impl MethodDescriptor {
    pub fn is_static(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::STATIC)
    }

    /// Local slots taken by the receiver and the declared parameters.
    pub fn arg_slots(&self) -> u16 {
        self.signature.param_slots() + if self.is_static() { 0 } else { 1 }
    }

    /// `name:descriptor`, unique within a class.
    pub fn key(&self) -> String {
        format!("{}:{}", self.name, self.descriptor)
    }
}

/// Body of a method: bytecode plus the tables that describe it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodCode {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    pub exception_table: Vec<ExceptionEntry>,
    /// Sorted by `start_pc`.
    pub line_numbers: Vec<LineNumberEntry>,
    pub local_variables: Vec<LocalVariable>,
}

/// A resolved `LocalVariableTable` row. The name is valid for
/// `start_pc..start_pc + length`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalVariable {
    pub start_pc: u16,
    pub length: u16,
    pub name: String,
    pub descriptor: String,
    pub index: u16,
}

impl MethodCode {
    fn from_attribute(attr: CodeAttribute, pool: &ConstantPool) -> Result<Self, ParseError> {
        let mut line_numbers = Vec::new();
        let mut local_variables = Vec::new();
        for nested in &attr.attributes {
            match nested.interpret(pool)? {
                AttributeInfoVariant::LineNumberTable(table) => {
                    line_numbers.extend(table.line_number_table)
                }
                AttributeInfoVariant::LocalVariableTable(table) => {
                    for item in table.items {
                        local_variables.push(LocalVariable {
                            start_pc: item.start_pc,
                            length: item.length,
                            name: pool.utf8(item.name_index)?.to_string(),
                            descriptor: pool.utf8(item.descriptor_index)?.to_string(),
                            index: item.index,
                        });
                    }
                }
                _ => {}
            }
        }
        line_numbers.sort_by_key(|e| (e.start_pc, e.line_number));
        Ok(Self {
            max_stack: attr.max_stack,
            max_locals: attr.max_locals,
            code: attr.code,
            exception_table: attr.exception_table,
            line_numbers,
            local_variables,
        })
    }

    /// Source line of `pc`: the entry with the greatest `start_pc <= pc`.
    pub fn line_for_pc(&self, pc: u32) -> Option<u32> {
        self.line_numbers
            .iter()
            .take_while(|e| e.start_pc as u32 <= pc)
            .last()
            .map(|e| e.line_number as u32)
    }

    /// Start offsets of every range mapped to `line`, ascending.
    pub fn pcs_for_line(&self, line: u32) -> Vec<u32> {
        self.line_numbers
            .iter()
            .filter(|e| e.line_number as u32 == line)
            .map(|e| e.start_pc as u32)
            .collect()
    }

    /// Whether `pc` is the first instruction of a line-table range.
    pub fn is_line_start(&self, pc: u32) -> bool {
        self.line_numbers.iter().any(|e| e.start_pc as u32 == pc)
    }

    /// Name recorded in the LocalVariableTable for `slot` at `pc`.
    pub fn local_name(&self, slot: u16, pc: u32) -> Option<&str> {
        self.local_variables
            .iter()
            .find(|v| {
                v.index == slot
                    && (v.start_pc as u32) <= pc
                    && pc <= v.start_pc as u32 + v.length as u32
            })
            .map(|v| v.name.as_str())
    }

    /// Any LocalVariableTable name for `slot`, regardless of scope.
    pub fn any_local_name(&self, slot: u16) -> Option<&str> {
        self.local_variables
            .iter()
            .find(|v| v.index == slot)
            .map(|v| v.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code_with_lines(lines: &[(u16, u16)]) -> MethodCode {
        MethodCode {
            max_stack: 2,
            max_locals: 2,
            code: vec![0; 16],
            exception_table: vec![],
            line_numbers: lines
                .iter()
                .map(|&(start_pc, line_number)| LineNumberEntry { start_pc, line_number })
                .collect(),
            local_variables: vec![],
        }
    }

    #[test]
    fn line_lookup_uses_greatest_start() {
        let code = code_with_lines(&[(0, 10), (4, 11), (9, 10)]);
        assert_eq!(code.line_for_pc(0), Some(10));
        assert_eq!(code.line_for_pc(5), Some(11));
        assert_eq!(code.line_for_pc(12), Some(10));
        assert_eq!(code.pcs_for_line(10), vec![0, 9]);
        assert!(code.is_line_start(4));
        assert!(!code.is_line_start(5));
    }

    #[test]
    fn no_line_before_first_entry() {
        let code = code_with_lines(&[(3, 1)]);
        assert_eq!(code.line_for_pc(0), None);
        assert!(code.pcs_for_line(2).is_empty());
    }

    #[test]
    fn modifiers_follow_source_order() {
        let flags = MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC | MethodAccessFlags::FINAL;
        assert_eq!(flags.modifiers(), vec!["public", "static", "final"]);
    }
}
