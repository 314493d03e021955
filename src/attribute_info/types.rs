use binrw::binrw;

/// An attribute as it appears in the class file: a name index and opaque bytes.
///
/// The bytes are kept untouched so every attribute writes back exactly; the
/// ones this crate understands are decoded on demand through
/// [`AttributeInfo::interpret`].
#[binrw]
#[brw(big)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttributeInfo {
    pub attribute_name_index: u16,
    #[br(temp)]
    #[bw(calc = info.len() as u32)]
    attribute_length: u32,
    #[br(count = attribute_length)]
    pub info: Vec<u8>,
}

/// Decoded form of an attribute.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttributeInfoVariant {
    Code(CodeAttribute),
    LineNumberTable(LineNumberTableAttribute),
    LocalVariableTable(LocalVariableTableAttribute),
    SourceFile(SourceFileAttribute),
    ConstantValue(ConstantValueAttribute),
    Exceptions(ExceptionsAttribute),
    BootstrapMethods(BootstrapMethodsAttribute),
    /// Any attribute this crate does not interpret; the raw bytes stay on the
    /// [`AttributeInfo`].
    Other(String),
}

#[binrw]
#[brw(big)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    #[br(temp)]
    #[bw(calc = code.len() as u32)]
    code_length: u32,
    #[br(count = code_length)]
    pub code: Vec<u8>,
    #[br(temp)]
    #[bw(calc = exception_table.len() as u16)]
    exception_table_length: u16,
    #[br(count = exception_table_length)]
    pub exception_table: Vec<ExceptionEntry>,
    #[br(temp)]
    #[bw(calc = attributes.len() as u16)]
    attributes_count: u16,
    #[br(count = attributes_count)]
    pub attributes: Vec<AttributeInfo>,
}

/// One protected range of a `Code` attribute. `end_pc` is exclusive and a
/// `catch_type` of 0 catches everything.
#[binrw]
#[brw(big)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ExceptionEntry {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    pub catch_type: u16,
}

impl ExceptionEntry {
    pub fn covers(&self, pc: u32) -> bool {
        (self.start_pc as u32) <= pc && pc < self.end_pc as u32
    }
}

#[binrw]
#[brw(big)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineNumberTableAttribute {
    #[br(temp)]
    #[bw(calc = line_number_table.len() as u16)]
    line_number_table_length: u16,
    #[br(count = line_number_table_length)]
    pub line_number_table: Vec<LineNumberEntry>,
}

#[binrw]
#[brw(big)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct LineNumberEntry {
    pub start_pc: u16,
    pub line_number: u16,
}

#[binrw]
#[brw(big)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalVariableTableAttribute {
    #[br(temp)]
    #[bw(calc = items.len() as u16)]
    local_variable_table_length: u16,
    #[br(count = local_variable_table_length)]
    pub items: Vec<LocalVariableTableItem>,
}

#[binrw]
#[brw(big)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct LocalVariableTableItem {
    pub start_pc: u16,
    pub length: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub index: u16,
}

/// The SourceFile attribute names the source file the class was compiled from.
///
/// There may be at most one SourceFile attribute in the attributes table of a ClassFile structure.
/// [see more](https://docs.oracle.com/javase/specs/jvms/se8/html/jvms-4.html#jvms-4.7.10)
#[binrw]
#[brw(big)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SourceFileAttribute {
    pub sourcefile_index: u16,
}

#[binrw]
#[brw(big)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ConstantValueAttribute {
    pub constant_value_index: u16,
}

/// Checked exceptions a method declares in its `throws` clause.
#[binrw]
#[brw(big)]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExceptionsAttribute {
    #[br(temp)]
    #[bw(calc = exception_index_table.len() as u16)]
    number_of_exceptions: u16,
    #[br(count = number_of_exceptions)]
    pub exception_index_table: Vec<u16>,
}

/// Bootstrap method specifiers referenced by `invokedynamic` and
/// `CONSTANT_Dynamic` entries.
#[binrw]
#[brw(big)]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BootstrapMethodsAttribute {
    #[br(temp)]
    #[bw(calc = bootstrap_methods.len() as u16)]
    num_bootstrap_methods: u16,
    #[br(count = num_bootstrap_methods)]
    pub bootstrap_methods: Vec<BootstrapMethod>,
}

#[binrw]
#[brw(big)]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BootstrapMethod {
    pub bootstrap_method_ref: u16,
    #[br(temp)]
    #[bw(calc = bootstrap_arguments.len() as u16)]
    num_bootstrap_arguments: u16,
    #[br(count = num_bootstrap_arguments)]
    pub bootstrap_arguments: Vec<u16>,
}
