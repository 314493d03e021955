mod types;

pub use types::*;

use std::io::Cursor;

use binrw::{BinRead, Endian};
use log::trace;

use crate::constant_info::ConstantPool;
use crate::error::ParseError;

impl AttributeInfo {
    pub fn name<'a>(&self, pool: &'a ConstantPool) -> Result<&'a str, ParseError> {
        Ok(pool.utf8(self.attribute_name_index)?)
    }

    /// Decode the attribute body according to its name.
    ///
    /// The whole body must be consumed; leftover or missing bytes are reported
    /// as [`ParseError::InvalidAttribute`].
    pub fn interpret(&self, pool: &ConstantPool) -> Result<AttributeInfoVariant, ParseError> {
        let name = self.name(pool)?;
        trace!("interpreting {} attribute ({} bytes)", name, self.info.len());
        Ok(match name {
            "Code" => AttributeInfoVariant::Code(decode(name, &self.info)?),
            "LineNumberTable" => AttributeInfoVariant::LineNumberTable(decode(name, &self.info)?),
            "LocalVariableTable" => {
                AttributeInfoVariant::LocalVariableTable(decode(name, &self.info)?)
            }
            "SourceFile" => AttributeInfoVariant::SourceFile(decode(name, &self.info)?),
            "ConstantValue" => AttributeInfoVariant::ConstantValue(decode(name, &self.info)?),
            "Exceptions" => AttributeInfoVariant::Exceptions(decode(name, &self.info)?),
            "BootstrapMethods" => AttributeInfoVariant::BootstrapMethods(decode(name, &self.info)?),
            other => AttributeInfoVariant::Other(other.to_string()),
        })
    }
}

fn decode<T>(name: &str, info: &[u8]) -> Result<T, ParseError>
where
    T: for<'b> BinRead<Args<'b> = ()>,
{
    let mut cursor = Cursor::new(info);
    let value = T::read_options(&mut cursor, Endian::Big, ()).map_err(|err| {
        ParseError::InvalidAttribute {
            name: name.to_string(),
            reason: if err.is_eof() {
                "body is truncated".to_string()
            } else {
                err.to_string()
            },
        }
    })?;
    let consumed = cursor.position() as usize;
    if consumed != info.len() {
        return Err(ParseError::InvalidAttribute {
            name: name.to_string(),
            reason: format!("{} trailing bytes", info.len() - consumed),
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constant_info::{ConstantInfo, Utf8Constant};

    fn pool(names: &[&str]) -> ConstantPool {
        ConstantPool::from_constants(
            names
                .iter()
                .map(|n| ConstantInfo::Utf8(Utf8Constant::new(n)))
                .collect(),
        )
    }

    #[test]
    fn decodes_line_number_table() {
        let pool = pool(&["LineNumberTable"]);
        let attr = AttributeInfo {
            attribute_name_index: 1,
            info: vec![0, 2, 0, 0, 0, 7, 0, 4, 0, 8],
        };
        match attr.interpret(&pool).unwrap() {
            AttributeInfoVariant::LineNumberTable(t) => {
                assert_eq!(
                    t.line_number_table,
                    vec![
                        LineNumberEntry { start_pc: 0, line_number: 7 },
                        LineNumberEntry { start_pc: 4, line_number: 8 },
                    ]
                );
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn rejects_short_and_long_bodies() {
        let pool = pool(&["SourceFile"]);
        let short = AttributeInfo { attribute_name_index: 1, info: vec![0] };
        assert!(matches!(
            short.interpret(&pool),
            Err(ParseError::InvalidAttribute { ref name, .. }) if name == "SourceFile"
        ));
        let long = AttributeInfo { attribute_name_index: 1, info: vec![0, 1, 2] };
        assert!(long.interpret(&pool).is_err());
    }

    #[test]
    fn decodes_bootstrap_methods() {
        let pool = pool(&["BootstrapMethods"]);
        let attr = AttributeInfo {
            attribute_name_index: 1,
            info: vec![0, 1, 0, 9, 0, 2, 0, 3, 0, 4],
        };
        match attr.interpret(&pool).unwrap() {
            AttributeInfoVariant::BootstrapMethods(b) => {
                assert_eq!(
                    b.bootstrap_methods,
                    vec![BootstrapMethod {
                        bootstrap_method_ref: 9,
                        bootstrap_arguments: vec![3, 4],
                    }]
                );
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn unknown_attributes_stay_raw() {
        let pool = pool(&["Deprecated"]);
        let attr = AttributeInfo { attribute_name_index: 1, info: vec![] };
        assert_eq!(
            attr.interpret(&pool).unwrap(),
            AttributeInfoVariant::Other("Deprecated".into())
        );
    }
}
