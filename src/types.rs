use std::io::Cursor;

use binrw::{binrw, BinResult, BinWrite, Endian};

use crate::attribute_info::{AttributeInfo, AttributeInfoVariant};
use crate::constant_info::ConstantPool;
use crate::error::ParseError;
use crate::field_info::FieldInfo;
use crate::method_info::{MethodDescriptor, MethodInfo};

/// A parsed class file. Immutable once produced by [`class_parser`](crate::class_parser).
#[derive(Clone, Debug, PartialEq)]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub const_pool: ConstantPool,
    pub access_flags: ClassAccessFlags,
    pub this_class: u16,
    /// 0 only for `java/lang/Object`.
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    pub fields: Vec<FieldInfo>,
    pub methods: Vec<MethodInfo>,
    pub attributes: Vec<AttributeInfo>,
}

/// Fixed-size prefix of every class file.
#[binrw]
#[brw(big, magic = b"\xca\xfe\xba\xbe")]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ClassHeader {
    pub minor_version: u16,
    pub major_version: u16,
}

#[binrw]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ClassAccessFlags(u16);

bitflags! {
    impl ClassAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const FINAL = 0x0010;
        const SUPER = 0x0020;
        const INTERFACE = 0x0200;
        const ABSTRACT = 0x0400;
        const SYNTHETIC = 0x1000;
        const ANNOTATION = 0x2000;
        const ENUM = 0x4000;
        const MODULE = 0x8000;
    }
}

impl ClassFile {
    /// Internal name of this class, e.g. `com/example/Foo`.
    pub fn this_class_name(&self) -> Result<&str, ParseError> {
        Ok(self.const_pool.class_name(self.this_class)?)
    }

    pub fn super_class_name(&self) -> Result<Option<&str>, ParseError> {
        if self.super_class == 0 {
            return Ok(None);
        }
        Ok(Some(self.const_pool.class_name(self.super_class)?))
    }

    pub fn interface_names(&self) -> Result<Vec<&str>, ParseError> {
        self.interfaces
            .iter()
            .map(|&i| Ok(self.const_pool.class_name(i)?))
            .collect()
    }

    /// Value of the `SourceFile` attribute, if present.
    pub fn source_file(&self) -> Result<Option<&str>, ParseError> {
        for attr in &self.attributes {
            if let AttributeInfoVariant::SourceFile(sf) = attr.interpret(&self.const_pool)? {
                return Ok(Some(self.const_pool.utf8(sf.sourcefile_index)?));
            }
        }
        Ok(None)
    }

    /// Index of the method called `name`. A `name:descriptor` key selects one
    /// overload exactly; a bare name picks the first declared.
    pub fn find_method(&self, name: &str) -> Result<Option<usize>, ParseError> {
        let (name, descriptor) = match name.split_once(':') {
            Some((n, d)) => (n, Some(d)),
            None => (name, None),
        };
        for (index, method) in self.methods.iter().enumerate() {
            if method.name(&self.const_pool)? != name {
                continue;
            }
            if let Some(d) = descriptor {
                if method.descriptor(&self.const_pool)? != d {
                    continue;
                }
            }
            return Ok(Some(index));
        }
        Ok(None)
    }

    /// Index of the method with this exact name and descriptor.
    pub fn method_index(&self, name: &str, descriptor: &str) -> Option<usize> {
        self.methods.iter().position(|m| {
            m.name(&self.const_pool).map_or(false, |n| n == name)
                && m.descriptor(&self.const_pool).map_or(false, |d| d == descriptor)
        })
    }

    /// Resolved view of the method at `index`.
    pub fn method_descriptor(&self, index: usize) -> Option<Result<MethodDescriptor, ParseError>> {
        self.methods.get(index).map(|m| m.describe(&self.const_pool))
    }

    /// Serialize back to the class file layout.
    ///
    /// Raw attribute bytes and constant pool entries are written as they were
    /// read, so parsing the output yields an equal `ClassFile`.
    pub fn to_bytes(&self) -> BinResult<Vec<u8>> {
        let mut out = Cursor::new(Vec::new());
        let endian = Endian::Big;
        ClassHeader {
            minor_version: self.minor_version,
            major_version: self.major_version,
        }
        .write_options(&mut out, endian, ())?;
        self.const_pool.count().write_options(&mut out, endian, ())?;
        for (_, entry) in self.const_pool.iter() {
            entry.write_options(&mut out, endian, ())?;
        }
        self.access_flags.write_options(&mut out, endian, ())?;
        self.this_class.write_options(&mut out, endian, ())?;
        self.super_class.write_options(&mut out, endian, ())?;
        (self.interfaces.len() as u16).write_options(&mut out, endian, ())?;
        self.interfaces.write_options(&mut out, endian, ())?;
        (self.fields.len() as u16).write_options(&mut out, endian, ())?;
        self.fields.write_options(&mut out, endian, ())?;
        (self.methods.len() as u16).write_options(&mut out, endian, ())?;
        self.methods.write_options(&mut out, endian, ())?;
        (self.attributes.len() as u16).write_options(&mut out, endian, ())?;
        self.attributes.write_options(&mut out, endian, ())?;
        Ok(out.into_inner())
    }
}
