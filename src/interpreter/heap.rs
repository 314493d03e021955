//! Simulated object heap of a debug session.

use std::collections::BTreeMap;
use std::fmt;

use crate::descriptor::JvmType;

use super::value::Value;

/// Handle of an object on the [`Heap`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectRef(pub u32);

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum HeapObject {
    Instance {
        class_name: String,
        fields: BTreeMap<String, Value>,
    },
    Array {
        element_type: JvmType,
        elements: Vec<Value>,
    },
    /// A `java/lang/StringBuilder`, simulated as its current contents.
    StringBuilder(String),
}

impl HeapObject {
    /// Internal name of the object's class; arrays use descriptor syntax.
    pub fn class_name(&self) -> String {
        match self {
            HeapObject::Instance { class_name, .. } => class_name.clone(),
            HeapObject::Array { element_type, .. } => format!("[{}", element_type.to_descriptor()),
            HeapObject::StringBuilder(_) => "java/lang/StringBuilder".to_string(),
        }
    }
}

/// Objects are never collected; a session's heap lives until `reset`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Heap {
    objects: Vec<HeapObject>,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, object: HeapObject) -> ObjectRef {
        self.objects.push(object);
        ObjectRef(self.objects.len() as u32 - 1)
    }

    /// Allocate an array with every element set to the type's zero value.
    pub fn alloc_array(&mut self, element_type: JvmType, length: usize) -> ObjectRef {
        let elements = vec![Value::default_for(&element_type); length];
        self.alloc(HeapObject::Array {
            element_type,
            elements,
        })
    }

    /// Allocate an exception object carrying `message` in its
    /// `detailMessage` field.
    pub fn alloc_exception(&mut self, class_name: &str, message: &str) -> ObjectRef {
        let mut fields = BTreeMap::new();
        fields.insert("detailMessage".to_string(), Value::Str(message.to_string()));
        self.alloc(HeapObject::Instance {
            class_name: class_name.to_string(),
            fields,
        })
    }

    pub fn get(&self, r: ObjectRef) -> Option<&HeapObject> {
        self.objects.get(r.0 as usize)
    }

    pub fn get_mut(&mut self, r: ObjectRef) -> Option<&mut HeapObject> {
        self.objects.get_mut(r.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn clear(&mut self) {
        self.objects.clear();
    }

    /// Text a `print` of `value` would produce, following Java's
    /// `String.valueOf` for the value's static type `ty`.
    pub fn to_java_string(&self, value: &Value, ty: &JvmType) -> String {
        match (value, ty) {
            (Value::Int(v), JvmType::Boolean) => (*v != 0).to_string(),
            (Value::Int(v), JvmType::Char) => char::from_u32(*v as u16 as u32)
                .unwrap_or(char::REPLACEMENT_CHARACTER)
                .to_string(),
            (Value::Int(v), _) => v.to_string(),
            (Value::Long(v), _) => v.to_string(),
            (Value::Float(v), _) => java_float(*v as f64, format!("{:?}", v)),
            (Value::Double(v), _) => java_float(*v, format!("{:?}", v)),
            (Value::Null, _) => "null".to_string(),
            (Value::Str(s), _) => s.clone(),
            (Value::Ref(r), _) => match self.get(*r) {
                Some(HeapObject::StringBuilder(s)) => s.clone(),
                Some(HeapObject::Instance { class_name, fields }) => {
                    match fields.get("detailMessage") {
                        Some(Value::Str(msg)) => format!("{}: {}", class_name.replace('/', "."), msg),
                        _ => format!("{}{}", class_name.replace('/', "."), r),
                    }
                }
                Some(obj) => format!("{}{}", obj.class_name(), r),
                None => format!("{}", r),
            },
            (other, _) => other.to_string(),
        }
    }

    /// Short human-readable rendering of a value for snapshots.
    pub fn describe(&self, value: &Value) -> String {
        match value {
            Value::Ref(r) => match self.get(*r) {
                Some(HeapObject::StringBuilder(s)) => format!("StringBuilder({:?})", s),
                Some(HeapObject::Array { elements, .. }) => {
                    let items: Vec<String> = elements.iter().map(|e| self.describe(e)).collect();
                    format!("[{}]", items.join(", "))
                }
                Some(HeapObject::Instance { class_name, .. }) => format!("{}{}", class_name, r),
                None => r.to_string(),
            },
            other => other.to_string(),
        }
    }
}

/// `finite` is the value already formatted at its own precision.
fn java_float(v: f64, finite: String) -> String {
    if v.is_nan() {
        "NaN".into()
    } else if v.is_infinite() {
        if v > 0.0 { "Infinity".into() } else { "-Infinity".into() }
    } else {
        finite
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arrays_start_zeroed() {
        let mut heap = Heap::new();
        let r = heap.alloc_array(JvmType::Int, 3);
        assert_eq!(heap.describe(&Value::Ref(r)), "[0, 0, 0]");
        assert_eq!(heap.get(r).map(HeapObject::class_name).as_deref(), Some("[I"));
    }

    #[test]
    fn java_string_conversion_uses_the_static_type() {
        let heap = Heap::new();
        assert_eq!(heap.to_java_string(&Value::Int(1), &JvmType::Boolean), "true");
        assert_eq!(heap.to_java_string(&Value::Int(72), &JvmType::Char), "H");
        assert_eq!(heap.to_java_string(&Value::Double(2.0), &JvmType::Double), "2.0");
        assert_eq!(heap.to_java_string(&Value::Null, &JvmType::Int), "null");
    }
}
