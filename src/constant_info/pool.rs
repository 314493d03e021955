use std::collections::BTreeSet;
use std::fmt;
use std::sync::OnceLock;

use crate::error::ResolveError;

use super::types::*;

/// A fully dereferenced constant pool value.
#[derive(Clone, Debug, PartialEq)]
pub enum Constant {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(String),
    String(String),
    FieldRef(MemberRef),
    MethodRef(MemberRef),
    InterfaceMethodRef(MemberRef),
    NameAndType { name: String, descriptor: String },
    MethodHandle { reference_kind: u8, reference: MemberRef },
    MethodType(String),
    Dynamic { bootstrap_index: u16, name: String, descriptor: String },
    InvokeDynamic { bootstrap_index: u16, name: String, descriptor: String },
    Module(String),
    Package(String),
}

/// Owning class, member name and descriptor of a field or method reference.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MemberRef {
    pub class_name: String,
    pub name: String,
    pub descriptor: String,
}

impl fmt::Display for MemberRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}:{}", self.class_name, self.name, self.descriptor)
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Utf8(s) => write!(f, "{}", s),
            Constant::Integer(v) => write!(f, "int {}", v),
            Constant::Float(v) => write!(f, "float {}f", v),
            Constant::Long(v) => write!(f, "long {}l", v),
            Constant::Double(v) => write!(f, "double {}d", v),
            Constant::Class(name) => write!(f, "class {}", name),
            Constant::String(s) => write!(f, "String {}", s),
            Constant::FieldRef(r) => write!(f, "Field {}", r),
            Constant::MethodRef(r) => write!(f, "Method {}", r),
            Constant::InterfaceMethodRef(r) => write!(f, "InterfaceMethod {}", r),
            Constant::NameAndType { name, descriptor } => write!(f, "NameAndType {}:{}", name, descriptor),
            Constant::MethodHandle { reference_kind, reference } => {
                write!(f, "MethodHandle {}:{}", reference_kind, reference)
            }
            Constant::MethodType(desc) => write!(f, "MethodType {}", desc),
            Constant::Dynamic { bootstrap_index, name, descriptor } => {
                write!(f, "Dynamic #{}:{}:{}", bootstrap_index, name, descriptor)
            }
            Constant::InvokeDynamic { bootstrap_index, name, descriptor } => {
                write!(f, "InvokeDynamic #{}:{}:{}", bootstrap_index, name, descriptor)
            }
            Constant::Module(name) => write!(f, "Module {}", name),
            Constant::Package(name) => write!(f, "Package {}", name),
        }
    }
}

/// The constant pool of one class file: an arena of raw entries addressed by
/// 1-based index, with a lazily filled cache of resolved values.
///
/// Slot 0 is never stored. The slot after a Long or Double is stored as `None`.
#[derive(Clone, Debug, Default)]
pub struct ConstantPool {
    entries: Vec<Option<ConstantInfo>>,
    resolved: Vec<OnceLock<Constant>>,
}

impl PartialEq for ConstantPool {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl ConstantPool {
    pub fn new(entries: Vec<Option<ConstantInfo>>) -> Self {
        let resolved = entries.iter().map(|_| OnceLock::new()).collect();
        Self { entries, resolved }
    }

    /// Build a pool from a list of entries, inserting the unusable slot after
    /// every Long and Double.
    pub fn from_constants(constants: Vec<ConstantInfo>) -> Self {
        let mut entries = Vec::with_capacity(constants.len());
        for constant in constants {
            let wide = constant.is_double_slot();
            entries.push(Some(constant));
            if wide {
                entries.push(None);
            }
        }
        Self::new(entries)
    }

    /// The `constant_pool_count` value as written in the class file.
    pub fn count(&self) -> u16 {
        (self.entries.len() + 1) as u16
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Raw slots in index order, starting at index 1.
    pub fn slots(&self) -> &[Option<ConstantInfo>] {
        &self.entries
    }

    /// Iterate `(index, entry)` over every usable slot.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &ConstantInfo)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.as_ref().map(|e| ((i + 1) as u16, e)))
    }

    /// Raw entry at `index`, or `None` for index 0, out-of-range indices and
    /// unusable slots.
    pub fn get(&self, index: u16) -> Option<&ConstantInfo> {
        self.entries.get((index as usize).checked_sub(1)?)?.as_ref()
    }

    fn entry(&self, index: u16, expected: &'static str) -> Result<&ConstantInfo, ResolveError> {
        self.get(index)
            .ok_or(ResolveError::DanglingReference { index, expected })
    }

    /// Resolve the entry at `index` into a fully dereferenced value. Results are
    /// cached per entry.
    pub fn resolve(&self, index: u16) -> Result<&Constant, ResolveError> {
        let slot = (index as usize)
            .checked_sub(1)
            .and_then(|i| self.resolved.get(i))
            .ok_or(ResolveError::DanglingReference {
                index,
                expected: "a constant",
            })?;
        if let Some(constant) = slot.get() {
            return Ok(constant);
        }
        let constant = self.resolve_uncached(index)?;
        Ok(slot.get_or_init(|| constant))
    }

    fn resolve_uncached(&self, index: u16) -> Result<Constant, ResolveError> {
        Ok(match self.entry(index, "a constant")? {
            ConstantInfo::Utf8(c) => Constant::Utf8(c.text()),
            ConstantInfo::Integer(c) => Constant::Integer(c.value),
            ConstantInfo::Float(c) => Constant::Float(c.value()),
            ConstantInfo::Long(c) => Constant::Long(c.value),
            ConstantInfo::Double(c) => Constant::Double(c.value()),
            ConstantInfo::Class(c) => Constant::Class(self.utf8(c.name_index)?.to_string()),
            ConstantInfo::String(c) => Constant::String(self.utf8(c.string_index)?.to_string()),
            ConstantInfo::FieldRef(r) => Constant::FieldRef(self.member(r)?),
            ConstantInfo::MethodRef(r) => Constant::MethodRef(self.member(r)?),
            ConstantInfo::InterfaceMethodRef(r) => Constant::InterfaceMethodRef(self.member(r)?),
            ConstantInfo::NameAndType(nat) => Constant::NameAndType {
                name: self.utf8(nat.name_index)?.to_string(),
                descriptor: self.utf8(nat.descriptor_index)?.to_string(),
            },
            ConstantInfo::MethodHandle(h) => Constant::MethodHandle {
                reference_kind: h.reference_kind,
                reference: self.member_ref(h.reference_index)?.clone(),
            },
            ConstantInfo::MethodType(t) => Constant::MethodType(self.utf8(t.descriptor_index)?.to_string()),
            ConstantInfo::Dynamic(d) => {
                let (name, descriptor) = self.name_and_type(d.name_and_type_index)?;
                Constant::Dynamic {
                    bootstrap_index: d.bootstrap_method_attr_index,
                    name: name.to_string(),
                    descriptor: descriptor.to_string(),
                }
            }
            ConstantInfo::InvokeDynamic(d) => {
                let (name, descriptor) = self.name_and_type(d.name_and_type_index)?;
                Constant::InvokeDynamic {
                    bootstrap_index: d.bootstrap_method_attr_index,
                    name: name.to_string(),
                    descriptor: descriptor.to_string(),
                }
            }
            ConstantInfo::Module(m) => Constant::Module(self.utf8(m.name_index)?.to_string()),
            ConstantInfo::Package(p) => Constant::Package(self.utf8(p.name_index)?.to_string()),
        })
    }

    fn member(&self, r: &MemberRefConstant) -> Result<MemberRef, ResolveError> {
        let class_name = self.class_name(r.class_index)?.to_string();
        let (name, descriptor) = self.name_and_type(r.name_and_type_index)?;
        Ok(MemberRef {
            class_name,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        })
    }

    /// Text of a Utf8 entry.
    pub fn utf8(&self, index: u16) -> Result<&str, ResolveError> {
        match self.entry(index, "a Utf8 entry")? {
            ConstantInfo::Utf8(_) => match self.resolve(index)? {
                Constant::Utf8(s) => Ok(s),
                _ => Err(ResolveError::DanglingReference { index, expected: "a Utf8 entry" }),
            },
            _ => Err(ResolveError::DanglingReference { index, expected: "a Utf8 entry" }),
        }
    }

    /// Internal name of a Class entry, e.g. `java/lang/String`.
    pub fn class_name(&self, index: u16) -> Result<&str, ResolveError> {
        match self.entry(index, "a Class entry")? {
            ConstantInfo::Class(c) => self.utf8(c.name_index),
            _ => Err(ResolveError::DanglingReference { index, expected: "a Class entry" }),
        }
    }

    /// `(name, descriptor)` of a NameAndType entry.
    pub fn name_and_type(&self, index: u16) -> Result<(&str, &str), ResolveError> {
        match self.entry(index, "a NameAndType entry")? {
            ConstantInfo::NameAndType(nat) => {
                Ok((self.utf8(nat.name_index)?, self.utf8(nat.descriptor_index)?))
            }
            _ => Err(ResolveError::DanglingReference { index, expected: "a NameAndType entry" }),
        }
    }

    /// A Fieldref, Methodref or InterfaceMethodref.
    pub fn member_ref(&self, index: u16) -> Result<&MemberRef, ResolveError> {
        match self.resolve(index)? {
            Constant::FieldRef(r) | Constant::MethodRef(r) | Constant::InterfaceMethodRef(r) => Ok(r),
            _ => Err(ResolveError::DanglingReference { index, expected: "a member reference" }),
        }
    }

    /// A constant usable by `ldc`, `ldc_w` or `ldc2_w`.
    pub fn loadable(&self, index: u16) -> Result<&Constant, ResolveError> {
        match self.resolve(index)? {
            c @ (Constant::Integer(_)
            | Constant::Float(_)
            | Constant::Long(_)
            | Constant::Double(_)
            | Constant::Class(_)
            | Constant::String(_)
            | Constant::MethodHandle { .. }
            | Constant::MethodType(_)
            | Constant::Dynamic { .. }) => Ok(c),
            _ => Err(ResolveError::DanglingReference { index, expected: "a loadable constant" }),
        }
    }

    /// Human readable text for an entry, falling back to `#index` when it does
    /// not resolve.
    pub fn display(&self, index: u16) -> String {
        match self.resolve(index) {
            Ok(c) => c.to_string(),
            Err(_) => format!("#{}", index),
        }
    }

    /// Check every cross reference inside the pool: each index must be in range
    /// and point at an entry of the tag it implies.
    pub fn validate(&self) -> Result<(), ResolveError> {
        for (_, entry) in self.iter() {
            match entry {
                ConstantInfo::Utf8(_)
                | ConstantInfo::Integer(_)
                | ConstantInfo::Float(_)
                | ConstantInfo::Long(_)
                | ConstantInfo::Double(_) => {}
                ConstantInfo::Class(c) => self.expect_utf8(c.name_index)?,
                ConstantInfo::String(s) => self.expect_utf8(s.string_index)?,
                ConstantInfo::FieldRef(r)
                | ConstantInfo::MethodRef(r)
                | ConstantInfo::InterfaceMethodRef(r) => {
                    self.expect_class(r.class_index)?;
                    self.expect_name_and_type(r.name_and_type_index)?;
                }
                ConstantInfo::NameAndType(nat) => {
                    self.expect_utf8(nat.name_index)?;
                    self.expect_utf8(nat.descriptor_index)?;
                }
                ConstantInfo::MethodHandle(h) => match self.get(h.reference_index) {
                    Some(
                        ConstantInfo::FieldRef(_)
                        | ConstantInfo::MethodRef(_)
                        | ConstantInfo::InterfaceMethodRef(_),
                    ) => {}
                    _ => {
                        return Err(ResolveError::DanglingReference {
                            index: h.reference_index,
                            expected: "a member reference",
                        })
                    }
                },
                ConstantInfo::MethodType(t) => self.expect_utf8(t.descriptor_index)?,
                ConstantInfo::Dynamic(d) | ConstantInfo::InvokeDynamic(d) => {
                    self.expect_name_and_type(d.name_and_type_index)?
                }
                ConstantInfo::Module(n) | ConstantInfo::Package(n) => self.expect_utf8(n.name_index)?,
            }
        }
        Ok(())
    }

    pub fn expect_utf8(&self, index: u16) -> Result<(), ResolveError> {
        match self.get(index) {
            Some(ConstantInfo::Utf8(_)) => Ok(()),
            _ => Err(ResolveError::DanglingReference { index, expected: "a Utf8 entry" }),
        }
    }

    pub fn expect_class(&self, index: u16) -> Result<(), ResolveError> {
        match self.get(index) {
            Some(ConstantInfo::Class(_)) => Ok(()),
            _ => Err(ResolveError::DanglingReference { index, expected: "a Class entry" }),
        }
    }

    fn expect_name_and_type(&self, index: u16) -> Result<(), ResolveError> {
        match self.get(index) {
            Some(ConstantInfo::NameAndType(_)) => Ok(()),
            _ => Err(ResolveError::DanglingReference { index, expected: "a NameAndType entry" }),
        }
    }

    /// Names of the classes this pool refers to, ignoring `java/lang` and the
    /// array pseudo-classes.
    pub fn class_references(&self) -> BTreeSet<String> {
        self.iter()
            .filter_map(|(index, entry)| match entry {
                ConstantInfo::Class(_) => self.class_name(index).ok(),
                _ => None,
            })
            .filter(|name| !name.starts_with("java/lang/") && !name.starts_with('['))
            .map(str::to_string)
            .collect()
    }
}
