use binrw::binrw;

use super::mutf8::decode_mutf8;

/// One raw constant pool entry, exactly as laid out in the class file.
///
/// Entries refer to each other by 1-based index; see
/// [`ConstantPool`](super::ConstantPool) for resolution.
#[binrw]
#[brw(big)]
#[br(return_unexpected_error)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConstantInfo {
    #[brw(magic = 1u8)]
    Utf8(Utf8Constant),
    #[brw(magic = 3u8)]
    Integer(IntegerConstant),
    #[brw(magic = 4u8)]
    Float(FloatConstant),
    #[brw(magic = 5u8)]
    Long(LongConstant),
    #[brw(magic = 6u8)]
    Double(DoubleConstant),
    #[brw(magic = 7u8)]
    Class(ClassConstant),
    #[brw(magic = 8u8)]
    String(StringConstant),
    #[brw(magic = 9u8)]
    FieldRef(MemberRefConstant),
    #[brw(magic = 10u8)]
    MethodRef(MemberRefConstant),
    #[brw(magic = 11u8)]
    InterfaceMethodRef(MemberRefConstant),
    #[brw(magic = 12u8)]
    NameAndType(NameAndTypeConstant),
    #[brw(magic = 15u8)]
    MethodHandle(MethodHandleConstant),
    #[brw(magic = 16u8)]
    MethodType(MethodTypeConstant),
    #[brw(magic = 17u8)]
    Dynamic(DynamicConstant),
    #[brw(magic = 18u8)]
    InvokeDynamic(DynamicConstant),
    #[brw(magic = 19u8)]
    Module(NamedConstant),
    #[brw(magic = 20u8)]
    Package(NamedConstant),
}

impl ConstantInfo {
    /// Tag bytes that start a valid entry.
    pub const TAGS: [u8; 17] = [1, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 15, 16, 17, 18, 19, 20];

    pub fn is_known_tag(tag: u8) -> bool {
        Self::TAGS.contains(&tag)
    }

    /// Long and Double entries occupy two pool slots.
    pub fn is_double_slot(&self) -> bool {
        matches!(self, ConstantInfo::Long(_) | ConstantInfo::Double(_))
    }

    pub fn tag_name(&self) -> &'static str {
        match self {
            ConstantInfo::Utf8(_) => "Utf8",
            ConstantInfo::Integer(_) => "Integer",
            ConstantInfo::Float(_) => "Float",
            ConstantInfo::Long(_) => "Long",
            ConstantInfo::Double(_) => "Double",
            ConstantInfo::Class(_) => "Class",
            ConstantInfo::String(_) => "String",
            ConstantInfo::FieldRef(_) => "Fieldref",
            ConstantInfo::MethodRef(_) => "Methodref",
            ConstantInfo::InterfaceMethodRef(_) => "InterfaceMethodref",
            ConstantInfo::NameAndType(_) => "NameAndType",
            ConstantInfo::MethodHandle(_) => "MethodHandle",
            ConstantInfo::MethodType(_) => "MethodType",
            ConstantInfo::Dynamic(_) => "Dynamic",
            ConstantInfo::InvokeDynamic(_) => "InvokeDynamic",
            ConstantInfo::Module(_) => "Module",
            ConstantInfo::Package(_) => "Package",
        }
    }
}

/// Modified UTF-8 text. The raw bytes are kept so the entry writes back unchanged.
#[binrw]
#[brw(big)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Utf8Constant {
    #[br(temp)]
    #[bw(calc = bytes.len() as u16)]
    length: u16,
    #[br(count = length)]
    pub bytes: Vec<u8>,
}

impl Utf8Constant {
    pub fn new(text: &str) -> Self {
        Self {
            bytes: super::mutf8::encode_mutf8(text),
        }
    }

    pub fn text(&self) -> String {
        decode_mutf8(&self.bytes)
    }
}

#[binrw]
#[brw(big)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntegerConstant {
    pub value: i32,
}

/// Stored as raw IEEE bits so that every NaN payload survives a round trip.
#[binrw]
#[brw(big)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FloatConstant {
    pub bits: u32,
}

impl FloatConstant {
    pub fn value(&self) -> f32 {
        f32::from_bits(self.bits)
    }
}

#[binrw]
#[brw(big)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LongConstant {
    pub value: i64,
}

#[binrw]
#[brw(big)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DoubleConstant {
    pub bits: u64,
}

impl DoubleConstant {
    pub fn value(&self) -> f64 {
        f64::from_bits(self.bits)
    }
}

#[binrw]
#[brw(big)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassConstant {
    pub name_index: u16,
}

#[binrw]
#[brw(big)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StringConstant {
    pub string_index: u16,
}

/// Shared layout of Fieldref, Methodref and InterfaceMethodref.
#[binrw]
#[brw(big)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemberRefConstant {
    pub class_index: u16,
    pub name_and_type_index: u16,
}

#[binrw]
#[brw(big)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NameAndTypeConstant {
    pub name_index: u16,
    pub descriptor_index: u16,
}

#[binrw]
#[brw(big)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodHandleConstant {
    pub reference_kind: u8,
    pub reference_index: u16,
}

#[binrw]
#[brw(big)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodTypeConstant {
    pub descriptor_index: u16,
}

/// Shared layout of Dynamic and InvokeDynamic.
#[binrw]
#[brw(big)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DynamicConstant {
    pub bootstrap_method_attr_index: u16,
    pub name_and_type_index: u16,
}

/// Shared layout of Module and Package.
#[binrw]
#[brw(big)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NamedConstant {
    pub name_index: u16,
}
