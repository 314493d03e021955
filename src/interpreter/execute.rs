//! Semantics of single instructions over a frame and the shared machine state.

use std::collections::{BTreeMap, HashSet};

use log::{debug, warn};

use crate::attribute_info::{AttributeInfoVariant, BootstrapMethod};
use crate::code_attribute::{branch_target, AddressedInstruction, Instruction, WideInstruction};
use crate::constant_info::{Constant, ConstantPool, MemberRef};
use crate::descriptor::{
    newarray_type, parse_field_descriptor, parse_method_descriptor, simple_class_name, JvmType, MethodSignature,
};
use crate::error::{ParseError, ResolveError};
use crate::field_info::FieldAccessFlags;
use crate::types::ClassFile;

use super::frame::Frame;
use super::heap::{Heap, HeapObject, ObjectRef};
use super::value::Value;

const OBJECT: &str = "java/lang/Object";
const STRING: &str = "java/lang/String";
const STRING_BUILDER: &str = "java/lang/StringBuilder";
const STRING_BUFFER: &str = "java/lang/StringBuffer";

/// Arrays longer than this are refused rather than allocated.
const MAX_ARRAY_LENGTH: i64 = 1 << 20;

/// State shared by every frame of a session.
#[derive(Debug)]
pub(crate) struct Machine<'c> {
    pub class: &'c ClassFile,
    pub class_name: String,
    pub heap: Heap,
    /// Static fields keyed `owner/Class.name`.
    pub statics: BTreeMap<String, Value>,
    /// Text written through `System.out`.
    pub output: String,
    initial_statics: BTreeMap<String, Value>,
    instance_fields: BTreeMap<String, Value>,
    /// `name:descriptor` of methods of this class that have code.
    local_methods: HashSet<String>,
    bootstrap_methods: Vec<BootstrapMethod>,
}

/// What the session does after an instruction.
#[derive(Debug, PartialEq)]
pub(crate) enum Flow {
    Next,
    /// Absolute target offset, not yet checked against the code array.
    Jump(i64),
    /// Call a method of this class; `args` include the receiver.
    Invoke { key: String, args: Vec<Value> },
    Return(Option<Value>),
    Throw(Value),
}

/// Abnormal outcome of an instruction.
#[derive(Debug)]
enum Trap {
    /// A simulated Java exception, dispatched through exception tables.
    Exception { class_name: &'static str, message: String },
    /// The engine cannot continue.
    Fault(String),
}

impl From<String> for Trap {
    fn from(reason: String) -> Self {
        Trap::Fault(reason)
    }
}

impl From<ResolveError> for Trap {
    fn from(err: ResolveError) -> Self {
        Trap::Fault(err.to_string())
    }
}

impl<'c> Machine<'c> {
    pub fn new(class: &'c ClassFile) -> Result<Self, ParseError> {
        let pool = &class.const_pool;
        let class_name = class.this_class_name()?.to_string();

        let mut initial_statics = BTreeMap::new();
        let mut instance_fields = BTreeMap::new();
        for field in &class.fields {
            let name = field.name(pool)?;
            let descriptor = field.descriptor(pool)?;
            let ty = parse_field_descriptor(descriptor)
                .ok_or_else(|| ParseError::InvalidDescriptor(descriptor.to_string()))?;
            if field.access_flags.contains(FieldAccessFlags::STATIC) {
                let value = match field.constant_value(pool)? {
                    Some(index) => constant_value(pool, index)?,
                    None => Value::default_for(&ty),
                };
                initial_statics.insert(format!("{}.{}", class_name, name), value);
            } else {
                instance_fields.insert(name.to_string(), Value::default_for(&ty));
            }
        }

        let local_methods = class
            .methods
            .iter()
            .filter_map(|m| m.describe(pool).ok())
            .filter(|m| m.code.is_some())
            .map(|m| m.key())
            .collect();
        let bootstrap_methods = class
            .attributes
            .iter()
            .find_map(|attr| match attr.interpret(pool) {
                Ok(AttributeInfoVariant::BootstrapMethods(b)) => Some(b.bootstrap_methods),
                _ => None,
            })
            .unwrap_or_default();

        Ok(Self {
            class,
            class_name,
            heap: Heap::new(),
            statics: initial_statics.clone(),
            output: String::new(),
            initial_statics,
            instance_fields,
            local_methods,
            bootstrap_methods,
        })
    }

    pub fn pool(&self) -> &'c ConstantPool {
        &self.class.const_pool
    }

    /// Discard the heap, program output and static field updates.
    pub fn reset(&mut self) {
        self.heap.clear();
        self.output.clear();
        self.statics = self.initial_statics.clone();
    }

    /// Allocate an instance of this class with zeroed fields.
    pub fn new_instance(&mut self) -> ObjectRef {
        self.heap.alloc(HeapObject::Instance {
            class_name: self.class_name.clone(),
            fields: self.instance_fields.clone(),
        })
    }

    /// Internal class name of a thrown value, as used for handler matching.
    pub fn exception_class(&self, value: &Value) -> String {
        match value {
            Value::Ref(r) => self
                .heap
                .get(*r)
                .map(HeapObject::class_name)
                .unwrap_or_else(|| "java/lang/Throwable".to_string()),
            _ => "java/lang/Throwable".to_string(),
        }
    }

    fn elements(&mut self, r: ObjectRef) -> Result<(&JvmType, &mut Vec<Value>), Trap> {
        match self.heap.get_mut(r) {
            Some(HeapObject::Array {
                element_type,
                elements,
            }) => Ok((&*element_type, elements)),
            Some(other) => Err(Trap::Fault(format!("{} is a {}, not an array", r, other.class_name()))),
            None => Err(Trap::Fault(format!("dangling reference {}", r))),
        }
    }

    /// Evaluate a `makeConcatWithConstants` call site. `None` when the recipe
    /// is unavailable or an argument is symbolic.
    fn concat(&self, bootstrap_index: u16, signature: &MethodSignature, args: &[Value]) -> Result<Option<Value>, Trap> {
        let Some(method) = self.bootstrap_methods.get(bootstrap_index as usize) else {
            return Ok(None);
        };
        let Some((&recipe_index, constants)) = method.bootstrap_arguments.split_first() else {
            return Ok(None);
        };
        let Constant::String(recipe) = self.pool().resolve(recipe_index)? else {
            return Ok(None);
        };

        let mut args = args.iter().zip(&signature.params);
        let mut constants = constants.iter();
        let mut out = String::new();
        for c in recipe.chars() {
            match c {
                '\u{1}' => {
                    let (value, ty) = args
                        .next()
                        .ok_or_else(|| "concat recipe wants more arguments than the call site has".to_string())?;
                    if value.is_symbolic() {
                        return Ok(None);
                    }
                    out.push_str(&self.heap.to_java_string(value, ty));
                }
                '\u{2}' => {
                    let index = constants
                        .next()
                        .ok_or_else(|| "concat recipe wants more constants than the bootstrap has".to_string())?;
                    match self.pool().resolve(*index)? {
                        Constant::String(s) => out.push_str(s),
                        Constant::Integer(v) => out.push_str(&v.to_string()),
                        Constant::Long(v) => out.push_str(&v.to_string()),
                        other => out.push_str(&other.to_string()),
                    }
                }
                c => out.push(c),
            }
        }
        Ok(Some(Value::Str(out)))
    }
}

fn constant_value(pool: &ConstantPool, index: u16) -> Result<Value, ResolveError> {
    Ok(match pool.loadable(index)? {
        Constant::Integer(v) => Value::Int(*v),
        Constant::Float(v) => Value::Float(*v),
        Constant::Long(v) => Value::Long(*v),
        Constant::Double(v) => Value::Double(*v),
        Constant::String(s) => Value::Str(s.clone()),
        Constant::Class(name) => Value::Symbolic(format!("{}.class", simple_class_name(name))),
        other => Value::Symbolic(other.to_string()),
    })
}

/// Execute one instruction of `frame`.
///
/// Simulated exceptions are allocated on the heap and come back as
/// [`Flow::Throw`]; `Err` is an engine fault.
pub(crate) fn execute(m: &mut Machine<'_>, frame: &mut Frame, entry: &AddressedInstruction) -> Result<Flow, String> {
    match dispatch(m, frame, entry) {
        Ok(flow) => Ok(flow),
        Err(Trap::Exception { class_name, message }) => {
            debug!("{} at offset {}: {}", class_name, entry.address, message);
            Ok(Flow::Throw(Value::Ref(m.heap.alloc_exception(class_name, &message))))
        }
        Err(Trap::Fault(reason)) => Err(reason),
    }
}

fn dispatch(m: &mut Machine<'_>, frame: &mut Frame, entry: &AddressedInstruction) -> Result<Flow, Trap> {
    use Instruction::*;

    let address = entry.address;
    let flow = match &entry.instruction {
        Nop => Flow::Next,
        AconstNull => push(frame, Value::Null),
        IconstM1 => push(frame, Value::Int(-1)),
        Iconst0 => push(frame, Value::Int(0)),
        Iconst1 => push(frame, Value::Int(1)),
        Iconst2 => push(frame, Value::Int(2)),
        Iconst3 => push(frame, Value::Int(3)),
        Iconst4 => push(frame, Value::Int(4)),
        Iconst5 => push(frame, Value::Int(5)),
        Lconst0 => push(frame, Value::Long(0)),
        Lconst1 => push(frame, Value::Long(1)),
        Fconst0 => push(frame, Value::Float(0.0)),
        Fconst1 => push(frame, Value::Float(1.0)),
        Fconst2 => push(frame, Value::Float(2.0)),
        Dconst0 => push(frame, Value::Double(0.0)),
        Dconst1 => push(frame, Value::Double(1.0)),
        Bipush(v) => push(frame, Value::Int(*v as i32)),
        Sipush(v) => push(frame, Value::Int(*v as i32)),
        Ldc(index) => push(frame, constant_value(m.pool(), *index as u16)?),
        LdcW(index) | Ldc2W(index) => push(frame, constant_value(m.pool(), *index)?),

        Iload(n) | Lload(n) | Fload(n) | Dload(n) | Aload(n) => load(frame, *n as u16)?,
        Iload0 | Lload0 | Fload0 | Dload0 | Aload0 => load(frame, 0)?,
        Iload1 | Lload1 | Fload1 | Dload1 | Aload1 => load(frame, 1)?,
        Iload2 | Lload2 | Fload2 | Dload2 | Aload2 => load(frame, 2)?,
        Iload3 | Lload3 | Fload3 | Dload3 | Aload3 => load(frame, 3)?,
        Istore(n) | Lstore(n) | Fstore(n) | Dstore(n) | Astore(n) => store(frame, *n as u16)?,
        Istore0 | Lstore0 | Fstore0 | Dstore0 | Astore0 => store(frame, 0)?,
        Istore1 | Lstore1 | Fstore1 | Dstore1 | Astore1 => store(frame, 1)?,
        Istore2 | Lstore2 | Fstore2 | Dstore2 | Astore2 => store(frame, 2)?,
        Istore3 | Lstore3 | Fstore3 | Dstore3 | Astore3 => store(frame, 3)?,

        Iaload | Laload | Faload | Daload | Aaload | Baload | Caload | Saload => array_load(m, frame)?,
        Iastore | Lastore | Fastore | Dastore | Aastore => array_store(m, frame, None)?,
        Bastore => array_store(m, frame, Some(|v| v as i8 as i32))?,
        Castore => array_store(m, frame, Some(|v| v as u16 as i32))?,
        Sastore => array_store(m, frame, Some(|v| v as i16 as i32))?,

        Pop => {
            frame.pop()?;
            Flow::Next
        }
        Pop2 => {
            if !frame.pop()?.is_wide() {
                frame.pop()?;
            }
            Flow::Next
        }
        Dup => {
            let v = frame.pop()?;
            frame.push(v.clone());
            frame.push(v);
            Flow::Next
        }
        DupX1 => {
            let v1 = frame.pop()?;
            let v2 = frame.pop()?;
            push_all(frame, [v1.clone(), v2, v1])
        }
        DupX2 => {
            let v1 = frame.pop()?;
            let v2 = frame.pop()?;
            if v2.is_wide() {
                push_all(frame, [v1.clone(), v2, v1])
            } else {
                let v3 = frame.pop()?;
                push_all(frame, [v1.clone(), v3, v2, v1])
            }
        }
        Dup2 => {
            let v1 = frame.pop()?;
            if v1.is_wide() {
                push_all(frame, [v1.clone(), v1])
            } else {
                let v2 = frame.pop()?;
                push_all(frame, [v2.clone(), v1.clone(), v2, v1])
            }
        }
        Dup2X1 => {
            let v1 = frame.pop()?;
            let v2 = frame.pop()?;
            if v1.is_wide() {
                push_all(frame, [v1.clone(), v2, v1])
            } else {
                let v3 = frame.pop()?;
                push_all(frame, [v2.clone(), v1.clone(), v3, v2, v1])
            }
        }
        Dup2X2 => {
            let v1 = frame.pop()?;
            let v2 = frame.pop()?;
            match (v1.is_wide(), v2.is_wide()) {
                (true, true) => push_all(frame, [v1.clone(), v2, v1]),
                (true, false) => {
                    let v3 = frame.pop()?;
                    push_all(frame, [v1.clone(), v3, v2, v1])
                }
                (false, _) => {
                    let v3 = frame.pop()?;
                    if v3.is_wide() {
                        push_all(frame, [v2.clone(), v1.clone(), v3, v2, v1])
                    } else {
                        let v4 = frame.pop()?;
                        push_all(frame, [v2.clone(), v1.clone(), v4, v3, v2, v1])
                    }
                }
            }
        }
        Swap => {
            let v1 = frame.pop()?;
            let v2 = frame.pop()?;
            push_all(frame, [v1, v2])
        }

        Iadd => binary(frame, "+", int_of, int_of, |a, b| Ok(Value::Int(a.wrapping_add(b))))?,
        Ladd => binary(frame, "+", long_of, long_of, |a, b| Ok(Value::Long(a.wrapping_add(b))))?,
        Fadd => binary(frame, "+", float_of, float_of, |a, b| Ok(Value::Float(a + b)))?,
        Dadd => binary(frame, "+", double_of, double_of, |a, b| Ok(Value::Double(a + b)))?,
        Isub => binary(frame, "-", int_of, int_of, |a, b| Ok(Value::Int(a.wrapping_sub(b))))?,
        Lsub => binary(frame, "-", long_of, long_of, |a, b| Ok(Value::Long(a.wrapping_sub(b))))?,
        Fsub => binary(frame, "-", float_of, float_of, |a, b| Ok(Value::Float(a - b)))?,
        Dsub => binary(frame, "-", double_of, double_of, |a, b| Ok(Value::Double(a - b)))?,
        Imul => binary(frame, "*", int_of, int_of, |a, b| Ok(Value::Int(a.wrapping_mul(b))))?,
        Lmul => binary(frame, "*", long_of, long_of, |a, b| Ok(Value::Long(a.wrapping_mul(b))))?,
        Fmul => binary(frame, "*", float_of, float_of, |a, b| Ok(Value::Float(a * b)))?,
        Dmul => binary(frame, "*", double_of, double_of, |a, b| Ok(Value::Double(a * b)))?,
        Idiv => binary(frame, "/", int_of, int_of, |a, b| match b {
            0 => Err(divide_by_zero()),
            _ => Ok(Value::Int(a.wrapping_div(b))),
        })?,
        Ldiv => binary(frame, "/", long_of, long_of, |a, b| match b {
            0 => Err(divide_by_zero()),
            _ => Ok(Value::Long(a.wrapping_div(b))),
        })?,
        Fdiv => binary(frame, "/", float_of, float_of, |a, b| Ok(Value::Float(a / b)))?,
        Ddiv => binary(frame, "/", double_of, double_of, |a, b| Ok(Value::Double(a / b)))?,
        Irem => binary(frame, "%", int_of, int_of, |a, b| match b {
            0 => Err(divide_by_zero()),
            _ => Ok(Value::Int(a.wrapping_rem(b))),
        })?,
        Lrem => binary(frame, "%", long_of, long_of, |a, b| match b {
            0 => Err(divide_by_zero()),
            _ => Ok(Value::Long(a.wrapping_rem(b))),
        })?,
        Frem => binary(frame, "%", float_of, float_of, |a, b| Ok(Value::Float(a % b)))?,
        Drem => binary(frame, "%", double_of, double_of, |a, b| Ok(Value::Double(a % b)))?,
        Ineg => unary(frame, "-", int_of, |a| Value::Int(a.wrapping_neg()))?,
        Lneg => unary(frame, "-", long_of, |a| Value::Long(a.wrapping_neg()))?,
        Fneg => unary(frame, "-", float_of, |a| Value::Float(-a))?,
        Dneg => unary(frame, "-", double_of, |a| Value::Double(-a))?,
        Ishl => binary(frame, "<<", int_of, int_of, |a, b| Ok(Value::Int(a << (b & 0x1f))))?,
        Lshl => binary(frame, "<<", long_of, int_of, |a, b| Ok(Value::Long(a << (b & 0x3f))))?,
        Ishr => binary(frame, ">>", int_of, int_of, |a, b| Ok(Value::Int(a >> (b & 0x1f))))?,
        Lshr => binary(frame, ">>", long_of, int_of, |a, b| Ok(Value::Long(a >> (b & 0x3f))))?,
        Iushr => binary(frame, ">>>", int_of, int_of, |a, b| {
            Ok(Value::Int(((a as u32) >> (b & 0x1f)) as i32))
        })?,
        Lushr => binary(frame, ">>>", long_of, int_of, |a, b| {
            Ok(Value::Long(((a as u64) >> (b & 0x3f)) as i64))
        })?,
        Iand => binary(frame, "&", int_of, int_of, |a, b| Ok(Value::Int(a & b)))?,
        Land => binary(frame, "&", long_of, long_of, |a, b| Ok(Value::Long(a & b)))?,
        Ior => binary(frame, "|", int_of, int_of, |a, b| Ok(Value::Int(a | b)))?,
        Lor => binary(frame, "|", long_of, long_of, |a, b| Ok(Value::Long(a | b)))?,
        Ixor => binary(frame, "^", int_of, int_of, |a, b| Ok(Value::Int(a ^ b)))?,
        Lxor => binary(frame, "^", long_of, long_of, |a, b| Ok(Value::Long(a ^ b)))?,
        Iinc { index, value } => increment(frame, *index as u16, *value as i32)?,

        I2l => unary(frame, "(long)", int_of, |a| Value::Long(a as i64))?,
        I2f => unary(frame, "(float)", int_of, |a| Value::Float(a as f32))?,
        I2d => unary(frame, "(double)", int_of, |a| Value::Double(a as f64))?,
        L2i => unary(frame, "(int)", long_of, |a| Value::Int(a as i32))?,
        L2f => unary(frame, "(float)", long_of, |a| Value::Float(a as f32))?,
        L2d => unary(frame, "(double)", long_of, |a| Value::Double(a as f64))?,
        F2i => unary(frame, "(int)", float_of, |a| Value::Int(a as i32))?,
        F2l => unary(frame, "(long)", float_of, |a| Value::Long(a as i64))?,
        F2d => unary(frame, "(double)", float_of, |a| Value::Double(a as f64))?,
        D2i => unary(frame, "(int)", double_of, |a| Value::Int(a as i32))?,
        D2l => unary(frame, "(long)", double_of, |a| Value::Long(a as i64))?,
        D2f => unary(frame, "(float)", double_of, |a| Value::Float(a as f32))?,
        I2b => unary(frame, "(byte)", int_of, |a| Value::Int(a as i8 as i32))?,
        I2c => unary(frame, "(char)", int_of, |a| Value::Int(a as u16 as i32))?,
        I2s => unary(frame, "(short)", int_of, |a| Value::Int(a as i16 as i32))?,
        Lcmp => binary(frame, "cmp", long_of, long_of, |a, b| Ok(Value::Int(a.cmp(&b) as i32)))?,
        Fcmpl => binary(frame, "cmpl", float_of, float_of, |a, b| Ok(compare_floats(a, b, -1)))?,
        Fcmpg => binary(frame, "cmpg", float_of, float_of, |a, b| Ok(compare_floats(a, b, 1)))?,
        Dcmpl => binary(frame, "cmpl", double_of, double_of, |a, b| Ok(compare_floats(a, b, -1)))?,
        Dcmpg => binary(frame, "cmpg", double_of, double_of, |a, b| Ok(compare_floats(a, b, 1)))?,

        Ifeq(o) => branch(address, *o as i32, if_zero(frame, |v| v == 0)?),
        Ifne(o) => branch(address, *o as i32, if_zero(frame, |v| v != 0)?),
        Iflt(o) => branch(address, *o as i32, if_zero(frame, |v| v < 0)?),
        Ifge(o) => branch(address, *o as i32, if_zero(frame, |v| v >= 0)?),
        Ifgt(o) => branch(address, *o as i32, if_zero(frame, |v| v > 0)?),
        Ifle(o) => branch(address, *o as i32, if_zero(frame, |v| v <= 0)?),
        IfIcmpeq(o) => branch(address, *o as i32, if_icmp(frame, |a, b| a == b)?),
        IfIcmpne(o) => branch(address, *o as i32, if_icmp(frame, |a, b| a != b)?),
        IfIcmplt(o) => branch(address, *o as i32, if_icmp(frame, |a, b| a < b)?),
        IfIcmpge(o) => branch(address, *o as i32, if_icmp(frame, |a, b| a >= b)?),
        IfIcmpgt(o) => branch(address, *o as i32, if_icmp(frame, |a, b| a > b)?),
        IfIcmple(o) => branch(address, *o as i32, if_icmp(frame, |a, b| a <= b)?),
        IfAcmpeq(o) => branch(address, *o as i32, if_acmp(frame)?),
        IfAcmpne(o) => branch(address, *o as i32, if_acmp(frame)?.map(|same| !same)),
        Ifnull(o) => branch(address, *o as i32, if_null(frame)?),
        Ifnonnull(o) => branch(address, *o as i32, if_null(frame)?.map(|null| !null)),
        Goto(o) => Flow::Jump(branch_target(address, *o as i32)),
        GotoW(o) => Flow::Jump(branch_target(address, *o)),
        Jsr(o) => {
            frame.push(Value::ReturnAddress(entry.next_address()));
            Flow::Jump(branch_target(address, *o as i32))
        }
        JsrW(o) => {
            frame.push(Value::ReturnAddress(entry.next_address()));
            Flow::Jump(branch_target(address, *o))
        }
        Ret(slot) => ret(frame, *slot as u16)?,
        Tableswitch {
            default,
            low,
            high,
            offsets,
        } => {
            let offset = match switch_key(frame, address)? {
                Some(key) if key >= *low && key <= *high => offsets
                    .get((key as i64 - *low as i64) as usize)
                    .copied()
                    .unwrap_or(*default),
                _ => *default,
            };
            Flow::Jump(branch_target(address, offset))
        }
        Lookupswitch { default, pairs } => {
            let offset = switch_key(frame, address)?
                .and_then(|key| pairs.iter().find(|(k, _)| *k == key).map(|(_, o)| *o))
                .unwrap_or(*default);
            Flow::Jump(branch_target(address, offset))
        }

        Ireturn | Lreturn | Freturn | Dreturn | Areturn => Flow::Return(Some(frame.pop()?)),
        Return => Flow::Return(None),

        Getstatic(index) => {
            let field = m.pool().member_ref(*index)?;
            let key = format!("{}.{}", field.class_name, field.name);
            let value = match m.statics.get(&key) {
                Some(v) => v.clone(),
                None => Value::Symbolic(format!("{}.{}", simple_class_name(&field.class_name), field.name)),
            };
            push(frame, value)
        }
        Putstatic(index) => {
            let field = m.pool().member_ref(*index)?;
            let value = frame.pop()?;
            m.statics.insert(format!("{}.{}", field.class_name, field.name), value);
            Flow::Next
        }
        Getfield(index) => get_field(m, frame, *index)?,
        Putfield(index) => put_field(m, frame, *index)?,
        Invokevirtual(index) | Invokespecial(index) => invoke(m, frame, *index, false)?,
        Invokeinterface { index, .. } => invoke(m, frame, *index, false)?,
        Invokestatic(index) => invoke(m, frame, *index, true)?,
        Invokedynamic { index, .. } => invoke_dynamic(m, frame, *index)?,

        New(index) => {
            let class_name = m.pool().class_name(*index)?;
            let r = match class_name {
                STRING_BUILDER | STRING_BUFFER => m.heap.alloc(HeapObject::StringBuilder(String::new())),
                name if name == m.class_name => m.new_instance(),
                name => m.heap.alloc(HeapObject::Instance {
                    class_name: name.to_string(),
                    fields: BTreeMap::new(),
                }),
            };
            push(frame, Value::Ref(r))
        }
        Newarray(atype) => {
            let element_type =
                newarray_type(*atype).ok_or_else(|| format!("invalid newarray type {}", atype))?;
            new_array(m, frame, element_type)?
        }
        Anewarray(index) => {
            let name = m.pool().class_name(*index)?;
            let element_type = if name.starts_with('[') {
                parse_field_descriptor(name).ok_or_else(|| format!("invalid array class {}", name))?
            } else {
                JvmType::Reference(name.to_string())
            };
            new_array(m, frame, element_type)?
        }
        Multianewarray { index, dimensions } => multi_new_array(m, frame, *index, *dimensions)?,
        Arraylength => {
            let array = frame.pop()?;
            let length = match &array {
                Value::Null => return Err(null_pointer("arraylength on null")),
                Value::Ref(r) => Value::Int(m.elements(*r)?.1.len() as i32),
                Value::Symbolic(_) => Value::Symbolic(format!("{}.length", array)),
                other => return Err(Trap::Fault(format!("arraylength on {}", other.kind()))),
            };
            push(frame, length)
        }
        Athrow => match frame.pop()? {
            Value::Null => return Err(null_pointer("throw of null")),
            thrown => Flow::Throw(thrown),
        },
        Checkcast(_) => Flow::Next,
        Instanceof(index) => {
            let target = m.pool().class_name(*index)?;
            let value = frame.pop()?;
            let result = match &value {
                Value::Null => Value::Int(0),
                Value::Str(_) => Value::Int(matches!(target, STRING | OBJECT | "java/lang/CharSequence") as i32),
                Value::Ref(r) => {
                    let actual = m.heap.get(*r).map(HeapObject::class_name);
                    Value::Int((target == OBJECT || actual.as_deref() == Some(target)) as i32)
                }
                Value::Symbolic(_) => {
                    Value::Symbolic(format!("{} instanceof {}", value, simple_class_name(target)))
                }
                other => return Err(Trap::Fault(format!("instanceof on {}", other.kind()))),
            };
            push(frame, result)
        }
        Monitorenter | Monitorexit => match frame.pop()? {
            Value::Null => return Err(null_pointer("monitor on null")),
            _ => Flow::Next,
        },
        Wide(wide) => match wide {
            WideInstruction::Iload(n)
            | WideInstruction::Lload(n)
            | WideInstruction::Fload(n)
            | WideInstruction::Dload(n)
            | WideInstruction::Aload(n) => load(frame, *n)?,
            WideInstruction::Istore(n)
            | WideInstruction::Lstore(n)
            | WideInstruction::Fstore(n)
            | WideInstruction::Dstore(n)
            | WideInstruction::Astore(n) => store(frame, *n)?,
            WideInstruction::Iinc { index, value } => increment(frame, *index, *value as i32)?,
            WideInstruction::Ret(n) => ret(frame, *n)?,
        },
        Unknown(byte) => return Err(Trap::Fault(format!("unknown opcode {:#04x}", byte))),
    };
    Ok(flow)
}

fn push(frame: &mut Frame, value: Value) -> Flow {
    frame.push(value);
    Flow::Next
}

fn push_all<const N: usize>(frame: &mut Frame, values: [Value; N]) -> Flow {
    for value in values {
        frame.push(value);
    }
    Flow::Next
}

fn load(frame: &mut Frame, slot: u16) -> Result<Flow, Trap> {
    let value = frame.load(slot)?;
    Ok(push(frame, value))
}

fn store(frame: &mut Frame, slot: u16) -> Result<Flow, Trap> {
    let value = frame.pop()?;
    frame.store(slot, value)?;
    Ok(Flow::Next)
}

fn increment(frame: &mut Frame, slot: u16, delta: i32) -> Result<Flow, Trap> {
    let value = match frame.load(slot)? {
        Value::Int(v) => Value::Int(v.wrapping_add(delta)),
        symbolic @ Value::Symbolic(_) => Value::Symbolic(format!("{} + {}", symbolic, delta)),
        other => return Err(Trap::Fault(format!("iinc on {} local {}", other.kind(), slot))),
    };
    frame.store(slot, value)?;
    Ok(Flow::Next)
}

fn ret(frame: &mut Frame, slot: u16) -> Result<Flow, Trap> {
    match frame.load(slot)? {
        Value::ReturnAddress(pc) => Ok(Flow::Jump(pc as i64)),
        other => Err(Trap::Fault(format!("ret through {} local {}", other.kind(), slot))),
    }
}

fn int_of(v: &Value) -> Option<i32> {
    v.as_int()
}

fn long_of(v: &Value) -> Option<i64> {
    match v {
        Value::Long(x) => Some(*x),
        _ => None,
    }
}

fn float_of(v: &Value) -> Option<f32> {
    match v {
        Value::Float(x) => Some(*x),
        _ => None,
    }
}

fn double_of(v: &Value) -> Option<f64> {
    match v {
        Value::Double(x) => Some(*x),
        _ => None,
    }
}

/// Pop two operands and push `f(left, right)`. A symbolic operand makes the
/// result symbolic.
fn binary<A, B>(
    frame: &mut Frame,
    op: &str,
    left: fn(&Value) -> Option<A>,
    right: fn(&Value) -> Option<B>,
    f: impl FnOnce(A, B) -> Result<Value, Trap>,
) -> Result<Flow, Trap> {
    let b = frame.pop()?;
    let a = frame.pop()?;
    let result = match (left(&a), right(&b)) {
        (Some(x), Some(y)) => f(x, y)?,
        _ if a.is_symbolic() || b.is_symbolic() => Value::Symbolic(format!("{} {} {}", a, op, b)),
        _ => {
            return Err(Trap::Fault(format!(
                "type mismatch for {}: {} and {}",
                op,
                a.kind(),
                b.kind()
            )))
        }
    };
    Ok(push(frame, result))
}

fn unary<T>(frame: &mut Frame, op: &str, of: fn(&Value) -> Option<T>, f: impl FnOnce(T) -> Value) -> Result<Flow, Trap> {
    let a = frame.pop()?;
    let result = match of(&a) {
        Some(x) => f(x),
        None if a.is_symbolic() => Value::Symbolic(format!("{}{}", op, a)),
        None => return Err(Trap::Fault(format!("type mismatch for {}: {}", op, a.kind()))),
    };
    Ok(push(frame, result))
}

fn compare_floats<T: PartialOrd>(a: T, b: T, nan: i32) -> Value {
    Value::Int(a.partial_cmp(&b).map_or(nan, |o| o as i32))
}

/// `None` means the outcome depends on a symbolic value: the branch is not
/// taken.
fn branch(address: u32, offset: i32, taken: Option<bool>) -> Flow {
    match taken {
        Some(true) => Flow::Jump(branch_target(address, offset)),
        Some(false) => Flow::Next,
        None => {
            warn!("branch at offset {} depends on a symbolic value; assuming not taken", address);
            Flow::Next
        }
    }
}

fn if_zero(frame: &mut Frame, test: fn(i32) -> bool) -> Result<Option<bool>, Trap> {
    match frame.pop()? {
        Value::Int(v) => Ok(Some(test(v))),
        Value::Symbolic(_) => Ok(None),
        other => Err(Trap::Fault(format!("conditional branch on {}", other.kind()))),
    }
}

fn if_icmp(frame: &mut Frame, test: fn(i32, i32) -> bool) -> Result<Option<bool>, Trap> {
    let b = frame.pop()?;
    let a = frame.pop()?;
    match (&a, &b) {
        (Value::Int(x), Value::Int(y)) => Ok(Some(test(*x, *y))),
        _ if a.is_symbolic() || b.is_symbolic() => Ok(None),
        _ => Err(Trap::Fault(format!("int comparison of {} and {}", a.kind(), b.kind()))),
    }
}

/// Reference identity; equal strings count as the same object.
fn if_acmp(frame: &mut Frame) -> Result<Option<bool>, Trap> {
    let b = frame.pop()?;
    let a = frame.pop()?;
    Ok(match (&a, &b) {
        (Value::Null, Value::Null) => Some(true),
        (Value::Ref(x), Value::Ref(y)) => Some(x == y),
        (Value::Str(x), Value::Str(y)) => Some(x == y),
        _ if a.is_symbolic() || b.is_symbolic() => None,
        _ => Some(false),
    })
}

fn if_null(frame: &mut Frame) -> Result<Option<bool>, Trap> {
    Ok(match frame.pop()? {
        Value::Null => Some(true),
        Value::Symbolic(_) => None,
        _ => Some(false),
    })
}

/// The key of a switch, or `None` when it is symbolic and the default is taken.
fn switch_key(frame: &mut Frame, address: u32) -> Result<Option<i32>, Trap> {
    match frame.pop()? {
        Value::Int(v) => Ok(Some(v)),
        Value::Symbolic(_) => {
            warn!("switch at offset {} on a symbolic value; taking the default", address);
            Ok(None)
        }
        other => Err(Trap::Fault(format!("switch on {}", other.kind()))),
    }
}

fn divide_by_zero() -> Trap {
    Trap::Exception {
        class_name: "java/lang/ArithmeticException",
        message: "/ by zero".to_string(),
    }
}

fn null_pointer(what: &str) -> Trap {
    Trap::Exception {
        class_name: "java/lang/NullPointerException",
        message: what.to_string(),
    }
}

fn out_of_bounds(index: i32, length: usize) -> Trap {
    Trap::Exception {
        class_name: "java/lang/ArrayIndexOutOfBoundsException",
        message: format!("Index {} out of bounds for length {}", index, length),
    }
}

fn array_load(m: &mut Machine<'_>, frame: &mut Frame) -> Result<Flow, Trap> {
    let index = frame.pop()?;
    let array = frame.pop()?;
    let value = match (&array, &index) {
        (Value::Null, _) => return Err(null_pointer("load from null array")),
        (Value::Ref(r), Value::Int(i)) => {
            let (_, elements) = m.elements(*r)?;
            usize::try_from(*i)
                .ok()
                .and_then(|i| elements.get(i))
                .cloned()
                .ok_or_else(|| out_of_bounds(*i, elements.len()))?
        }
        _ if array.is_symbolic() || index.is_symbolic() => Value::Symbolic(format!("{}[{}]", array, index)),
        _ => {
            return Err(Trap::Fault(format!(
                "array load from {} with {} index",
                array.kind(),
                index.kind()
            )))
        }
    };
    Ok(push(frame, value))
}

/// `narrow` truncates int values stored into byte, char and short arrays.
fn array_store(m: &mut Machine<'_>, frame: &mut Frame, narrow: Option<fn(i32) -> i32>) -> Result<Flow, Trap> {
    let value = frame.pop()?;
    let index = frame.pop()?;
    let array = frame.pop()?;
    match (&array, &index) {
        (Value::Null, _) => return Err(null_pointer("store into null array")),
        (Value::Ref(r), Value::Int(i)) => {
            let (element_type, elements) = m.elements(*r)?;
            let value = match (value, narrow) {
                (Value::Int(v), Some(_)) if *element_type == JvmType::Boolean => Value::Int(v & 1),
                (Value::Int(v), Some(narrow)) => Value::Int(narrow(v)),
                (v, _) => v,
            };
            let length = elements.len();
            let slot = usize::try_from(*i)
                .ok()
                .and_then(|i| elements.get_mut(i))
                .ok_or_else(|| out_of_bounds(*i, length))?;
            *slot = value;
        }
        _ if array.is_symbolic() || index.is_symbolic() => {}
        _ => {
            return Err(Trap::Fault(format!(
                "array store into {} with {} index",
                array.kind(),
                index.kind()
            )))
        }
    }
    Ok(Flow::Next)
}

fn checked_length(count: i32) -> Result<usize, Trap> {
    if count < 0 {
        return Err(Trap::Exception {
            class_name: "java/lang/NegativeArraySizeException",
            message: count.to_string(),
        });
    }
    if count as i64 > MAX_ARRAY_LENGTH {
        return Err(Trap::Fault(format!("array of length {} is too large to simulate", count)));
    }
    Ok(count as usize)
}

fn new_array(m: &mut Machine<'_>, frame: &mut Frame, element_type: JvmType) -> Result<Flow, Trap> {
    let value = match frame.pop()? {
        Value::Int(count) => Value::Ref(m.heap.alloc_array(element_type, checked_length(count)?)),
        count @ Value::Symbolic(_) => Value::Symbolic(format!("new {}[{}]", element_type, count)),
        other => return Err(Trap::Fault(format!("array length of type {}", other.kind()))),
    };
    Ok(push(frame, value))
}

fn multi_new_array(m: &mut Machine<'_>, frame: &mut Frame, index: u16, dimensions: u8) -> Result<Flow, Trap> {
    let name = m.pool().class_name(index)?;
    let array_type = parse_field_descriptor(name).ok_or_else(|| format!("invalid array class {}", name))?;
    let counts = frame.pop_n(dimensions as usize)?;
    if counts.iter().any(Value::is_symbolic) {
        return Ok(push(frame, Value::Symbolic(format!("new {}", array_type))));
    }
    let mut lengths = Vec::with_capacity(counts.len());
    let mut total: i64 = 1;
    for count in &counts {
        let length = match count {
            Value::Int(v) => checked_length(*v)?,
            other => return Err(Trap::Fault(format!("array length of type {}", other.kind()))),
        };
        total = total.saturating_mul(length.max(1) as i64);
        lengths.push(length);
    }
    if total > MAX_ARRAY_LENGTH {
        return Err(Trap::Fault(format!("{} array elements are too many to simulate", total)));
    }
    let array = alloc_nested(&mut m.heap, &array_type, &lengths);
    Ok(push(frame, array))
}

fn alloc_nested(heap: &mut Heap, ty: &JvmType, lengths: &[usize]) -> Value {
    match (lengths.split_first(), ty) {
        (Some((&length, rest)), JvmType::Array(element)) => {
            let elements = (0..length)
                .map(|_| {
                    if rest.is_empty() {
                        Value::default_for(element)
                    } else {
                        alloc_nested(heap, element, rest)
                    }
                })
                .collect();
            Value::Ref(heap.alloc(HeapObject::Array {
                element_type: (**element).clone(),
                elements,
            }))
        }
        _ => Value::Null,
    }
}

fn get_field(m: &mut Machine<'_>, frame: &mut Frame, index: u16) -> Result<Flow, Trap> {
    let field = m.pool().member_ref(index)?;
    let object = frame.pop()?;
    let value = match &object {
        Value::Null => return Err(null_pointer(&format!("read of field {}", field.name))),
        Value::Ref(r) => match m.heap.get(*r) {
            Some(HeapObject::Instance { fields, .. }) => match fields.get(&field.name) {
                Some(v) => v.clone(),
                None => parse_field_descriptor(&field.descriptor)
                    .map(|ty| Value::default_for(&ty))
                    .ok_or_else(|| format!("invalid field descriptor {}", field.descriptor))?,
            },
            _ => return Err(Trap::Fault(format!("getfield {} on a non-instance", field.name))),
        },
        Value::Symbolic(_) => Value::Symbolic(format!("{}.{}", object, field.name)),
        other => return Err(Trap::Fault(format!("getfield {} on {}", field.name, other.kind()))),
    };
    Ok(push(frame, value))
}

fn put_field(m: &mut Machine<'_>, frame: &mut Frame, index: u16) -> Result<Flow, Trap> {
    let field = m.pool().member_ref(index)?;
    let value = frame.pop()?;
    match frame.pop()? {
        Value::Null => return Err(null_pointer(&format!("write of field {}", field.name))),
        Value::Ref(r) => match m.heap.get_mut(r) {
            Some(HeapObject::Instance { fields, .. }) => {
                fields.insert(field.name.clone(), value);
            }
            _ => return Err(Trap::Fault(format!("putfield {} on a non-instance", field.name))),
        },
        Value::Symbolic(_) => {}
        other => return Err(Trap::Fault(format!("putfield {} on {}", field.name, other.kind()))),
    }
    Ok(Flow::Next)
}

fn invoke(m: &mut Machine<'_>, frame: &mut Frame, index: u16, is_static: bool) -> Result<Flow, Trap> {
    let member = m.pool().member_ref(index)?;
    let signature = parse_method_descriptor(&member.descriptor)
        .ok_or_else(|| format!("invalid method descriptor {}", member.descriptor))?;
    let args = frame.pop_n(signature.params.len() + usize::from(!is_static))?;
    if !is_static && args[0] == Value::Null {
        return Err(null_pointer(&format!("call of {} on null", member.name)));
    }

    let key = format!("{}:{}", member.name, member.descriptor);
    if member.class_name == m.class_name && m.local_methods.contains(&key) {
        return Ok(Flow::Invoke { key, args });
    }
    if let Some(result) = builtin(m, member, &signature, &args)? {
        frame.push(result);
    }
    Ok(Flow::Next)
}

/// Library methods simulated on strings and builders. Everything else
/// returns a symbolic value.
fn builtin(
    m: &mut Machine<'_>,
    member: &MemberRef,
    signature: &MethodSignature,
    args: &[Value],
) -> Result<Option<Value>, Trap> {
    let receiver = args.first();
    let first_param = signature.params.first();
    match (member.class_name.as_str(), member.name.as_str()) {
        ("java/io/PrintStream", name @ ("print" | "println")) => {
            if let (Some(value), Some(ty)) = (args.get(1), first_param) {
                let text = m.heap.to_java_string(value, ty);
                m.output.push_str(&text);
            }
            if name == "println" {
                m.output.push('\n');
            }
            return Ok(None);
        }
        (STRING_BUILDER | STRING_BUFFER, "<init>") => {
            let initial = match (args.get(1), first_param) {
                (Some(value), Some(ty @ JvmType::Reference(_))) => m.heap.to_java_string(value, ty),
                _ => String::new(),
            };
            if let Some(contents) = builder(&mut m.heap, receiver) {
                *contents = initial;
            }
            return Ok(None);
        }
        (STRING_BUILDER | STRING_BUFFER, "append") => {
            if let (Some(value), Some(ty)) = (args.get(1), first_param) {
                let text = m.heap.to_java_string(value, ty);
                if let Some(contents) = builder(&mut m.heap, receiver) {
                    contents.push_str(&text);
                    return Ok(receiver.cloned());
                }
            }
        }
        (STRING_BUILDER | STRING_BUFFER, "toString") => {
            if let Some(contents) = builder(&mut m.heap, receiver) {
                return Ok(Some(Value::Str(contents.clone())));
            }
        }
        (STRING_BUILDER | STRING_BUFFER, "length") => {
            if let Some(contents) = builder(&mut m.heap, receiver) {
                return Ok(Some(Value::Int(contents.encode_utf16().count() as i32)));
            }
        }
        (STRING, "valueOf") => {
            if let (Some(value), Some(ty)) = (args.first(), first_param) {
                if !value.is_symbolic() {
                    return Ok(Some(Value::Str(m.heap.to_java_string(value, ty))));
                }
            }
        }
        (STRING, name) => {
            if let Some(result) = string_method(name, args)? {
                return Ok(Some(result));
            }
        }
        ("java/lang/Math", name) => {
            let result = match (name, args) {
                ("max", [Value::Int(a), Value::Int(b)]) => Some(Value::Int(*a.max(b))),
                ("min", [Value::Int(a), Value::Int(b)]) => Some(Value::Int(*a.min(b))),
                ("abs", [Value::Int(a)]) => Some(Value::Int(a.wrapping_abs())),
                _ => None,
            };
            if result.is_some() {
                return Ok(result);
            }
        }
        (_, "<init>") => {
            // Throwable(String) and friends keep the message for printing.
            if let (Some(Value::Ref(r)), Some(Value::Str(message))) = (receiver, args.get(1)) {
                if let Some(HeapObject::Instance { fields, .. }) = m.heap.get_mut(*r) {
                    fields.insert("detailMessage".to_string(), Value::Str(message.clone()));
                }
            }
            return Ok(None);
        }
        _ => {}
    }

    debug!("call to {} not simulated", member);
    Ok(match signature.ret {
        JvmType::Void => None,
        _ => Some(Value::Symbolic(format!(
            "{}.{}()",
            simple_class_name(&member.class_name),
            member.name
        ))),
    })
}

fn builder<'h>(heap: &'h mut Heap, receiver: Option<&Value>) -> Option<&'h mut String> {
    match receiver {
        Some(Value::Ref(r)) => match heap.get_mut(*r) {
            Some(HeapObject::StringBuilder(contents)) => Some(contents),
            _ => None,
        },
        _ => None,
    }
}

fn string_method(name: &str, args: &[Value]) -> Result<Option<Value>, Trap> {
    let Some(Value::Str(s)) = args.first() else {
        return Ok(None);
    };
    Ok(Some(match (name, args.get(1)) {
        ("length", None) => Value::Int(s.encode_utf16().count() as i32),
        ("isEmpty", None) => Value::Int(s.is_empty() as i32),
        ("hashCode", None) => Value::Int(
            s.encode_utf16()
                .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(unit as i32)),
        ),
        ("equals", Some(other)) if !other.is_symbolic() => {
            Value::Int(matches!(other, Value::Str(o) if o == s) as i32)
        }
        ("concat", Some(Value::Str(other))) => Value::Str(format!("{}{}", s, other)),
        ("charAt", Some(Value::Int(i))) => {
            let units: Vec<u16> = s.encode_utf16().collect();
            let unit = usize::try_from(*i)
                .ok()
                .and_then(|i| units.get(i))
                .ok_or_else(|| Trap::Exception {
                    class_name: "java/lang/StringIndexOutOfBoundsException",
                    message: format!("index {}, length {}", i, units.len()),
                })?;
            Value::Int(*unit as i32)
        }
        _ => return Ok(None),
    }))
}

fn invoke_dynamic(m: &mut Machine<'_>, frame: &mut Frame, index: u16) -> Result<Flow, Trap> {
    let (bootstrap_index, name, descriptor) = match m.pool().resolve(index)? {
        Constant::InvokeDynamic {
            bootstrap_index,
            name,
            descriptor,
        } => (*bootstrap_index, name, descriptor),
        other => return Err(Trap::Fault(format!("invokedynamic #{} refers to {}", index, other))),
    };
    let signature =
        parse_method_descriptor(descriptor).ok_or_else(|| format!("invalid call site descriptor {}", descriptor))?;
    let args = frame.pop_n(signature.params.len())?;
    let result = match name.as_str() {
        "makeConcatWithConstants" => m.concat(bootstrap_index, &signature, &args)?,
        _ => None,
    };
    match (result, &signature.ret) {
        (Some(value), _) => frame.push(value),
        (None, JvmType::Void) => {}
        (None, _) => frame.push(Value::Symbolic(format!("indy {}", name))),
    }
    Ok(Flow::Next)
}
