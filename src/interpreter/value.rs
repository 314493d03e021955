//! Values held in local slots and on the operand stack.

use std::fmt;

use crate::descriptor::JvmType;

use super::heap::ObjectRef;

/// A value in the interpreter.
///
/// `boolean`, `byte`, `char` and `short` are carried as `Int`, as on a real
/// JVM operand stack.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Null,
    /// An immutable `java/lang/String`.
    Str(String),
    /// An object or array on the session heap.
    Ref(ObjectRef),
    /// Pushed by `jsr`, consumed by `ret`.
    ReturnAddress(u32),
    /// A result the engine does not model, such as the return value of a
    /// call outside the class. Carries a description of where it came from.
    Symbolic(String),
    /// An unset local slot, or the upper half of a `long`/`double` local.
    Top,
}

impl Value {
    /// The zero value of a field or array element of type `ty`.
    pub fn default_for(ty: &JvmType) -> Value {
        match ty {
            JvmType::Long => Value::Long(0),
            JvmType::Float => Value::Float(0.0),
            JvmType::Double => Value::Double(0.0),
            JvmType::Reference(_) | JvmType::Array(_) => Value::Null,
            _ => Value::Int(0),
        }
    }

    /// Parse a command-line argument for a parameter of type `ty`.
    ///
    /// `null` gives `Null` for reference types; strings are taken verbatim.
    /// Returns `None` when the text is not a literal of that type.
    pub fn parse(text: &str, ty: &JvmType) -> Option<Value> {
        let text = text.trim();
        Some(match ty {
            JvmType::Boolean => match text {
                "true" => Value::Int(1),
                "false" => Value::Int(0),
                _ => return None,
            },
            JvmType::Char => {
                let mut chars = text.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) if (c as u32) <= 0xffff => Value::Int(c as i32),
                    _ => Value::Int(text.parse::<u16>().ok()? as i32),
                }
            }
            JvmType::Byte => Value::Int(text.parse::<i8>().ok()? as i32),
            JvmType::Short => Value::Int(text.parse::<i16>().ok()? as i32),
            JvmType::Int => Value::Int(text.parse().ok()?),
            JvmType::Long => Value::Long(text.trim_end_matches(['L', 'l']).parse().ok()?),
            JvmType::Float => Value::Float(text.trim_end_matches(['F', 'f']).parse().ok()?),
            JvmType::Double => Value::Double(text.trim_end_matches(['D', 'd']).parse().ok()?),
            JvmType::Void => return None,
            JvmType::Reference(_) | JvmType::Array(_) if text == "null" => Value::Null,
            JvmType::Reference(name) if name == "java/lang/String" => Value::Str(text.to_string()),
            JvmType::Reference(_) | JvmType::Array(_) => return None,
        })
    }

    /// Long and Double take two local slots and two stack words.
    pub fn is_wide(&self) -> bool {
        matches!(self, Value::Long(_) | Value::Double(_))
    }

    pub fn is_symbolic(&self) -> bool {
        matches!(self, Value::Symbolic(_))
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, Value::Null | Value::Str(_) | Value::Ref(_))
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Short kind name used in type-mismatch faults.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Long(_) => "long",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::Null => "null",
            Value::Str(_) => "string",
            Value::Ref(_) => "reference",
            Value::ReturnAddress(_) => "returnAddress",
            Value::Symbolic(_) => "symbolic",
            Value::Top => "unset",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Long(v) => write!(f, "{}L", v),
            Value::Float(v) => write!(f, "{:?}f", v),
            Value::Double(v) => write!(f, "{:?}", v),
            Value::Null => f.write_str("null"),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Ref(r) => write!(f, "{}", r),
            Value::ReturnAddress(pc) => write!(f, "ret@{}", pc),
            Value::Symbolic(what) => write!(f, "<{}>", what),
            Value::Top => f.write_str("-"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_arguments_by_parameter_type() {
        assert_eq!(Value::parse("42", &JvmType::Int), Some(Value::Int(42)));
        assert_eq!(Value::parse("7L", &JvmType::Long), Some(Value::Long(7)));
        assert_eq!(Value::parse("true", &JvmType::Boolean), Some(Value::Int(1)));
        assert_eq!(Value::parse("A", &JvmType::Char), Some(Value::Int(65)));
        assert_eq!(Value::parse("300", &JvmType::Byte), None);
        assert_eq!(
            Value::parse("hi", &JvmType::Reference("java/lang/String".into())),
            Some(Value::Str("hi".into()))
        );
        assert_eq!(
            Value::parse("null", &JvmType::Array(Box::new(JvmType::Int))),
            Some(Value::Null)
        );
        assert_eq!(Value::parse("x", &JvmType::Int), None);
    }

    #[test]
    fn defaults_follow_the_field_type() {
        assert_eq!(Value::default_for(&JvmType::Boolean), Value::Int(0));
        assert_eq!(Value::default_for(&JvmType::Double), Value::Double(0.0));
        assert_eq!(
            Value::default_for(&JvmType::Reference("java/lang/Object".into())),
            Value::Null
        );
    }
}
