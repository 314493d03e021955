use binrw::binrw;

use crate::attribute_info::{AttributeInfo, AttributeInfoVariant};
use crate::constant_info::ConstantPool;
use crate::error::ParseError;

#[binrw]
#[brw(big)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldInfo {
    pub access_flags: FieldAccessFlags,
    pub name_index: u16,
    pub descriptor_index: u16,
    #[br(temp)]
    #[bw(calc = attributes.len() as u16)]
    attributes_count: u16,
    #[br(count = attributes_count)]
    pub attributes: Vec<AttributeInfo>,
}

impl FieldInfo {
    pub fn name<'a>(&self, pool: &'a ConstantPool) -> Result<&'a str, ParseError> {
        Ok(pool.utf8(self.name_index)?)
    }

    pub fn descriptor<'a>(&self, pool: &'a ConstantPool) -> Result<&'a str, ParseError> {
        Ok(pool.utf8(self.descriptor_index)?)
    }

    /// Pool index of the field's `ConstantValue` attribute, if it has one.
    pub fn constant_value(&self, pool: &ConstantPool) -> Result<Option<u16>, ParseError> {
        for attr in &self.attributes {
            if let AttributeInfoVariant::ConstantValue(cv) = attr.interpret(pool)? {
                return Ok(Some(cv.constant_value_index));
            }
        }
        Ok(None)
    }
}

#[binrw]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct FieldAccessFlags(u16);

bitflags! {
    impl FieldAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const VOLATILE = 0x0040;
        const TRANSIENT = 0x0080;
        const SYNTHETIC = 0x1000;
        const ENUM = 0x4000;
    }
}

impl FieldAccessFlags {
    /// Source modifiers in declaration order, e.g. `public static final`.
    pub fn modifiers(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        for (flag, word) in [
            (Self::PUBLIC, "public"),
            (Self::PRIVATE, "private"),
            (Self::PROTECTED, "protected"),
            (Self::STATIC, "static"),
            (Self::FINAL, "final"),
            (Self::TRANSIENT, "transient"),
            (Self::VOLATILE, "volatile"),
        ] {
            if self.contains(flag) {
                out.push(word);
            }
        }
        out
    }
}
