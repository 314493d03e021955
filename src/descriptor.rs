//! Field and method descriptor grammar (JVMS 4.3).

use std::fmt;

/// A JVM type as written in a field or method descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum JvmType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
    Void,
    Reference(String),
    Array(Box<JvmType>),
}

impl JvmType {
    /// Long and Double take two local slots and two stack words.
    pub fn is_wide(&self) -> bool {
        matches!(self, JvmType::Long | JvmType::Double)
    }

    pub fn slot_size(&self) -> u16 {
        match self {
            JvmType::Void => 0,
            t if t.is_wide() => 2,
            _ => 1,
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, JvmType::Reference(_) | JvmType::Array(_))
    }

    pub fn to_descriptor(&self) -> String {
        match self {
            JvmType::Byte => "B".into(),
            JvmType::Char => "C".into(),
            JvmType::Double => "D".into(),
            JvmType::Float => "F".into(),
            JvmType::Int => "I".into(),
            JvmType::Long => "J".into(),
            JvmType::Short => "S".into(),
            JvmType::Boolean => "Z".into(),
            JvmType::Void => "V".into(),
            JvmType::Reference(name) => format!("L{};", name),
            JvmType::Array(inner) => format!("[{}", inner.to_descriptor()),
        }
    }

    /// Java source spelling, e.g. `java.lang.String[]`.
    pub fn source_name(&self) -> String {
        match self {
            JvmType::Byte => "byte".into(),
            JvmType::Char => "char".into(),
            JvmType::Double => "double".into(),
            JvmType::Float => "float".into(),
            JvmType::Int => "int".into(),
            JvmType::Long => "long".into(),
            JvmType::Short => "short".into(),
            JvmType::Boolean => "boolean".into(),
            JvmType::Void => "void".into(),
            JvmType::Reference(name) => internal_to_source_name(name),
            JvmType::Array(inner) => format!("{}[]", inner.source_name()),
        }
    }

    /// Prefix used for synthesized local names: `i0`, `l2`, `obj1`.
    pub fn local_prefix(&self) -> &'static str {
        match self {
            JvmType::Byte | JvmType::Char | JvmType::Short | JvmType::Boolean | JvmType::Int => "i",
            JvmType::Long => "l",
            JvmType::Float => "f",
            JvmType::Double => "d",
            JvmType::Array(_) => "arr",
            JvmType::Reference(_) | JvmType::Void => "obj",
        }
    }
}

impl fmt::Display for JvmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source_name())
    }
}

/// Parameter and return types of a method descriptor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodSignature {
    pub params: Vec<JvmType>,
    pub ret: JvmType,
}

impl MethodSignature {
    /// Local slots taken by the parameters, not counting `this`.
    pub fn param_slots(&self) -> u16 {
        self.params.iter().map(JvmType::slot_size).sum()
    }
}

/// Parse one type starting at byte `pos`, returning it and the next position.
pub fn parse_type_at(desc: &str, pos: usize) -> Option<(JvmType, usize)> {
    let ty = match *desc.as_bytes().get(pos)? {
        b'B' => JvmType::Byte,
        b'C' => JvmType::Char,
        b'D' => JvmType::Double,
        b'F' => JvmType::Float,
        b'I' => JvmType::Int,
        b'J' => JvmType::Long,
        b'S' => JvmType::Short,
        b'Z' => JvmType::Boolean,
        b'V' => JvmType::Void,
        b'L' => {
            let semi = desc.get(pos + 1..)?.find(';')?;
            let name = &desc[pos + 1..pos + 1 + semi];
            if name.is_empty() {
                return None;
            }
            return Some((JvmType::Reference(name.to_string()), pos + semi + 2));
        }
        b'[' => {
            let (inner, next) = parse_type_at(desc, pos + 1)?;
            if inner == JvmType::Void {
                return None;
            }
            return Some((JvmType::Array(Box::new(inner)), next));
        }
        _ => return None,
    };
    Some((ty, pos + 1))
}

/// Parse a complete field descriptor.
pub fn parse_field_descriptor(desc: &str) -> Option<JvmType> {
    match parse_type_at(desc, 0)? {
        (JvmType::Void, _) => None,
        (ty, end) if end == desc.len() => Some(ty),
        _ => None,
    }
}

/// Parse a method descriptor, e.g. `(IJ)V`.
pub fn parse_method_descriptor(desc: &str) -> Option<MethodSignature> {
    let rest = desc.strip_prefix('(')?;
    let close = rest.find(')')? + 1;
    let mut params = Vec::new();
    let mut pos = 1;
    while pos < close {
        let (ty, next) = parse_type_at(desc, pos)?;
        if ty == JvmType::Void {
            return None;
        }
        params.push(ty);
        pos = next;
    }
    if pos != close {
        return None;
    }
    let (ret, end) = parse_type_at(desc, close + 1)?;
    if end != desc.len() {
        return None;
    }
    Some(MethodSignature { params, ret })
}

/// `java/lang/String` -> `java.lang.String`
pub fn internal_to_source_name(name: &str) -> String {
    name.replace('/', ".")
}

/// `java/lang/String` -> `String`
pub fn simple_class_name(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

/// Element type of a `newarray` type code.
pub fn newarray_type(atype: u8) -> Option<JvmType> {
    Some(match atype {
        4 => JvmType::Boolean,
        5 => JvmType::Char,
        6 => JvmType::Float,
        7 => JvmType::Double,
        8 => JvmType::Byte,
        9 => JvmType::Short,
        10 => JvmType::Int,
        11 => JvmType::Long,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_field_descriptors() {
        assert_eq!(parse_field_descriptor("I"), Some(JvmType::Int));
        assert_eq!(
            parse_field_descriptor("[[Ljava/lang/Object;"),
            Some(JvmType::Array(Box::new(JvmType::Array(Box::new(
                JvmType::Reference("java/lang/Object".into())
            )))))
        );
        assert_eq!(parse_field_descriptor("V"), None);
        assert_eq!(parse_field_descriptor("II"), None);
        assert_eq!(parse_field_descriptor("L;"), None);
    }

    #[test]
    fn parses_method_descriptors() {
        let sig = parse_method_descriptor("(IJLjava/lang/String;)[B").unwrap();
        assert_eq!(
            sig.params,
            vec![JvmType::Int, JvmType::Long, JvmType::Reference("java/lang/String".into())]
        );
        assert_eq!(sig.ret, JvmType::Array(Box::new(JvmType::Byte)));
        assert_eq!(sig.param_slots(), 4);

        let sig = parse_method_descriptor("()V").unwrap();
        assert!(sig.params.is_empty());
        assert_eq!(sig.ret, JvmType::Void);

        assert!(parse_method_descriptor("(V)V").is_none());
        assert!(parse_method_descriptor("(I").is_none());
        assert!(parse_method_descriptor("(I)VX").is_none());
    }

    #[test]
    fn names() {
        assert_eq!(internal_to_source_name("java/lang/String"), "java.lang.String");
        assert_eq!(simple_class_name("java/lang/String"), "String");
        assert_eq!(simple_class_name("Plain"), "Plain");
        assert_eq!(JvmType::Array(Box::new(JvmType::Int)).source_name(), "int[]");
    }
}
