//! Bytes to [`ClassFile`].

use log::{debug, warn};

use crate::attribute_info::AttributeInfo;
use crate::constant_info::{ConstantInfo, ConstantPool};
use crate::error::ParseError;
use crate::field_info::FieldInfo;
use crate::method_info::MethodInfo;
use crate::reader::ClassReader;
use crate::types::{ClassAccessFlags, ClassFile, ClassHeader};

/// Oldest class file major version accepted (JDK 1.0.2).
pub const MIN_MAJOR_VERSION: u16 = 45;

/// Parse a complete class file.
///
/// Fails with a structural [`ParseError`] on a bad header, truncation, an
/// unknown constant tag or a dangling constant pool reference. Bytes after
/// the class attributes are ignored with a warning.
pub fn class_parser(bytes: &[u8]) -> Result<ClassFile, ParseError> {
    let mut reader = ClassReader::new(bytes);
    if reader.len() < 4 {
        return Err(ParseError::MalformedHeader {
            reason: format!("expected 4 magic bytes, found {}", reader.len()),
        });
    }
    let header: ClassHeader = reader.read()?;
    if header.major_version < MIN_MAJOR_VERSION {
        return Err(ParseError::MalformedHeader {
            reason: format!("unsupported major version {}", header.major_version),
        });
    }

    let const_pool = read_constant_pool(&mut reader)?;
    debug!(
        "class v{}.{}: {} constant pool slots",
        header.major_version,
        header.minor_version,
        const_pool.slots().len()
    );

    let access_flags: ClassAccessFlags = reader.read()?;
    let this_class: u16 = reader.read()?;
    let super_class: u16 = reader.read()?;
    let interfaces = read_counted::<u16>(&mut reader)?;
    let fields = read_counted::<FieldInfo>(&mut reader)?;
    let methods = read_counted::<MethodInfo>(&mut reader)?;
    let attributes = read_counted::<AttributeInfo>(&mut reader)?;

    if reader.remaining() > 0 {
        warn!(
            "ignoring {} trailing bytes after class attributes at offset {:#x}",
            reader.remaining(),
            reader.position()
        );
    }

    let class = ClassFile {
        minor_version: header.minor_version,
        major_version: header.major_version,
        const_pool,
        access_flags,
        this_class,
        super_class,
        interfaces,
        fields,
        methods,
        attributes,
    };
    validate_references(&class)?;
    debug!(
        "parsed {}: {} fields, {} methods",
        class.this_class_name()?,
        class.fields.len(),
        class.methods.len()
    );
    Ok(class)
}

fn read_constant_pool(reader: &mut ClassReader<'_>) -> Result<ConstantPool, ParseError> {
    let count: u16 = reader.read()?;
    let mut entries: Vec<Option<ConstantInfo>> = Vec::with_capacity(count as usize);
    // slot 0 is implicit
    let mut index = 1u16;
    while index < count {
        let start = reader.position();
        let Some(tag) = reader.peek_u8() else {
            return Err(ParseError::TruncatedInput { offset: start });
        };
        let entry: ConstantInfo = match reader.read() {
            Ok(entry) => entry,
            // a known tag that fails to read can only be short on bytes
            Err(ParseError::MalformedHeader { .. }) if ConstantInfo::is_known_tag(tag) => {
                return Err(ParseError::TruncatedInput { offset: start })
            }
            Err(ParseError::MalformedHeader { .. }) => {
                return Err(ParseError::UnknownConstantTag { tag, offset: start })
            }
            Err(err) => return Err(err),
        };
        let wide = entry.is_double_slot();
        entries.push(Some(entry));
        index += 1;
        if wide {
            if index >= count {
                return Err(ParseError::MalformedHeader {
                    reason: format!("8-byte constant at #{} overruns the pool", index - 1),
                });
            }
            entries.push(None);
            index += 1;
        }
    }
    Ok(ConstantPool::new(entries))
}

fn read_counted<T>(reader: &mut ClassReader<'_>) -> Result<Vec<T>, ParseError>
where
    T: for<'b> binrw::BinRead<Args<'b> = ()>,
{
    let count: u16 = reader.read()?;
    let mut items = Vec::with_capacity(count as usize);
    for _ in 0..count {
        items.push(reader.read::<T>()?);
    }
    Ok(items)
}

fn validate_references(class: &ClassFile) -> Result<(), ParseError> {
    let pool = &class.const_pool;
    pool.validate()?;
    pool.expect_class(class.this_class)?;
    if class.super_class != 0 {
        pool.expect_class(class.super_class)?;
    }
    for &interface in &class.interfaces {
        pool.expect_class(interface)?;
    }
    for field in &class.fields {
        pool.expect_utf8(field.name_index)?;
        pool.expect_utf8(field.descriptor_index)?;
        check_attribute_names(pool, &field.attributes)?;
    }
    for method in &class.methods {
        pool.expect_utf8(method.name_index)?;
        pool.expect_utf8(method.descriptor_index)?;
        check_attribute_names(pool, &method.attributes)?;
    }
    check_attribute_names(pool, &class.attributes)
}

fn check_attribute_names(pool: &ConstantPool, attributes: &[AttributeInfo]) -> Result<(), ParseError> {
    for attr in attributes {
        pool.expect_utf8(attr.attribute_name_index)?;
    }
    Ok(())
}
