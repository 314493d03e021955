//! Class file assembler shared by the integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;

use binrw::BinWrite;
use classfile_inspector::attribute_info::{
    AttributeInfo, CodeAttribute, ExceptionEntry, LineNumberEntry, LineNumberTableAttribute,
    LocalVariableTableAttribute, LocalVariableTableItem, SourceFileAttribute,
};
use classfile_inspector::constant_info::{
    ClassConstant, ConstantInfo, ConstantPool, DoubleConstant, IntegerConstant, LongConstant, MemberRefConstant,
    NameAndTypeConstant, StringConstant, Utf8Constant,
};
use classfile_inspector::field_info::{FieldAccessFlags, FieldInfo};
use classfile_inspector::method_info::{MethodAccessFlags, MethodInfo};
use classfile_inspector::{ClassAccessFlags, ClassFile};

fn encode<T>(value: &T) -> Vec<u8>
where
    T: for<'a> BinWrite<Args<'a> = ()>,
{
    let mut out = Cursor::new(Vec::new());
    value.write_be(&mut out).unwrap();
    out.into_inner()
}

/// One method body for [`ClassBuilder::method`].
#[derive(Default)]
pub struct Body {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    /// `(start_pc, line)`
    pub lines: Vec<(u16, u16)>,
    /// `(start_pc, end_pc, handler_pc, catch class or None for any)`
    pub handlers: Vec<(u16, u16, u16, Option<&'static str>)>,
    /// `(start_pc, length, name, descriptor, slot)`
    pub locals: Vec<(u16, u16, &'static str, &'static str, u16)>,
}

/// Builds a class file with an interned constant pool.
pub struct ClassBuilder {
    constants: Vec<ConstantInfo>,
    interned: HashMap<String, u16>,
    /// Index of the next entry; Long and Double take two.
    next_index: u16,
    this_class: u16,
    super_class: u16,
    fields: Vec<FieldInfo>,
    methods: Vec<MethodInfo>,
    attributes: Vec<AttributeInfo>,
}

impl ClassBuilder {
    pub fn new(name: &str) -> Self {
        let mut builder = Self {
            constants: Vec::new(),
            interned: HashMap::new(),
            next_index: 1,
            this_class: 0,
            super_class: 0,
            fields: Vec::new(),
            methods: Vec::new(),
            attributes: Vec::new(),
        };
        builder.this_class = builder.class(name);
        builder.super_class = builder.class("java/lang/Object");
        builder
    }

    fn intern(&mut self, key: String, constant: ConstantInfo) -> u16 {
        if let Some(index) = self.interned.get(&key) {
            return *index;
        }
        let index = self.next_index;
        self.next_index += if constant.is_double_slot() { 2 } else { 1 };
        self.constants.push(constant);
        self.interned.insert(key, index);
        index
    }

    pub fn utf8(&mut self, text: &str) -> u16 {
        self.intern(format!("utf8:{}", text), ConstantInfo::Utf8(Utf8Constant::new(text)))
    }

    pub fn class(&mut self, name: &str) -> u16 {
        let name_index = self.utf8(name);
        self.intern(format!("class:{}", name), ConstantInfo::Class(ClassConstant { name_index }))
    }

    pub fn string(&mut self, text: &str) -> u16 {
        let string_index = self.utf8(text);
        self.intern(format!("string:{}", text), ConstantInfo::String(StringConstant { string_index }))
    }

    pub fn integer(&mut self, value: i32) -> u16 {
        self.intern(format!("int:{}", value), ConstantInfo::Integer(IntegerConstant { value }))
    }

    pub fn long(&mut self, value: i64) -> u16 {
        self.intern(format!("long:{}", value), ConstantInfo::Long(LongConstant { value }))
    }

    /// Keyed by bit pattern so distinct NaN payloads stay distinct.
    pub fn double_bits(&mut self, bits: u64) -> u16 {
        self.intern(format!("double:{:016x}", bits), ConstantInfo::Double(DoubleConstant { bits }))
    }

    pub fn name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let name_index = self.utf8(name);
        let descriptor_index = self.utf8(descriptor);
        self.intern(
            format!("nat:{}:{}", name, descriptor),
            ConstantInfo::NameAndType(NameAndTypeConstant {
                name_index,
                descriptor_index,
            }),
        )
    }

    pub fn method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        let class_index = self.class(class);
        let name_and_type_index = self.name_and_type(name, descriptor);
        self.intern(
            format!("method:{}.{}:{}", class, name, descriptor),
            ConstantInfo::MethodRef(MemberRefConstant {
                class_index,
                name_and_type_index,
            }),
        )
    }

    pub fn field_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        let class_index = self.class(class);
        let name_and_type_index = self.name_and_type(name, descriptor);
        self.intern(
            format!("field:{}.{}:{}", class, name, descriptor),
            ConstantInfo::FieldRef(MemberRefConstant {
                class_index,
                name_and_type_index,
            }),
        )
    }

    pub fn field(&mut self, access_flags: FieldAccessFlags, name: &str, descriptor: &str) -> &mut Self {
        let name_index = self.utf8(name);
        let descriptor_index = self.utf8(descriptor);
        self.fields.push(FieldInfo {
            access_flags,
            name_index,
            descriptor_index,
            attributes: vec![],
        });
        self
    }

    pub fn method(&mut self, access_flags: MethodAccessFlags, name: &str, descriptor: &str, body: Body) -> &mut Self {
        let name_index = self.utf8(name);
        let descriptor_index = self.utf8(descriptor);

        let mut code_attributes = Vec::new();
        if !body.lines.is_empty() {
            let table = LineNumberTableAttribute {
                line_number_table: body
                    .lines
                    .iter()
                    .map(|&(start_pc, line_number)| LineNumberEntry { start_pc, line_number })
                    .collect(),
            };
            code_attributes.push(AttributeInfo {
                attribute_name_index: self.utf8("LineNumberTable"),
                info: encode(&table),
            });
        }
        if !body.locals.is_empty() {
            let mut items = Vec::new();
            for &(start_pc, length, name, descriptor, index) in &body.locals {
                items.push(LocalVariableTableItem {
                    start_pc,
                    length,
                    name_index: self.utf8(name),
                    descriptor_index: self.utf8(descriptor),
                    index,
                });
            }
            code_attributes.push(AttributeInfo {
                attribute_name_index: self.utf8("LocalVariableTable"),
                info: encode(&LocalVariableTableAttribute { items }),
            });
        }
        let mut exception_table = Vec::new();
        for &(start_pc, end_pc, handler_pc, catch) in &body.handlers {
            exception_table.push(ExceptionEntry {
                start_pc,
                end_pc,
                handler_pc,
                catch_type: catch.map_or(0, |name| self.class(name)),
            });
        }
        let code = CodeAttribute {
            max_stack: body.max_stack,
            max_locals: body.max_locals,
            code: body.code,
            exception_table,
            attributes: code_attributes,
        };
        let attributes = vec![AttributeInfo {
            attribute_name_index: self.utf8("Code"),
            info: encode(&code),
        }];
        self.methods.push(MethodInfo {
            access_flags,
            name_index,
            descriptor_index,
            attributes,
        });
        self
    }

    /// A method without a Code attribute.
    pub fn abstract_method(&mut self, name: &str, descriptor: &str) -> &mut Self {
        let name_index = self.utf8(name);
        let descriptor_index = self.utf8(descriptor);
        self.methods.push(MethodInfo {
            access_flags: MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT,
            name_index,
            descriptor_index,
            attributes: vec![],
        });
        self
    }

    pub fn source_file(&mut self, name: &str) -> &mut Self {
        let sourcefile_index = self.utf8(name);
        let attribute_name_index = self.utf8("SourceFile");
        self.attributes.push(AttributeInfo {
            attribute_name_index,
            info: encode(&SourceFileAttribute { sourcefile_index }),
        });
        self
    }

    pub fn build(&self) -> ClassFile {
        ClassFile {
            minor_version: 0,
            major_version: 52,
            const_pool: ConstantPool::from_constants(self.constants.clone()),
            access_flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            this_class: self.this_class,
            super_class: self.super_class,
            interfaces: vec![],
            fields: self.fields.clone(),
            methods: self.methods.clone(),
            attributes: self.attributes.clone(),
        }
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.build().to_bytes().unwrap()
    }
}

fn hi(index: u16) -> u8 {
    (index >> 8) as u8
}

fn lo(index: u16) -> u8 {
    index as u8
}

/// A small class exercising arithmetic, a loop, a handler, calls, library
/// simulation and instance fields.
///
/// Source lines: `add` 10-11, `sumTo` 20-24, `divide` 30-32, `hello` 40,
/// `twice` 50, `spin` 60, `escape` 70.
pub fn calc_class() -> ClassBuilder {
    let mut b = ClassBuilder::new("demo/Calc");
    let statik = MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC;

    b.field(FieldAccessFlags::PRIVATE, "value", "I");

    // static int add(int a, int b) { return a + b; }
    b.method(
        statik,
        "add",
        "(II)I",
        Body {
            max_stack: 2,
            max_locals: 2,
            code: vec![0x1a, 0x1b, 0x60, 0xac],
            lines: vec![(0, 10), (2, 11)],
            ..Body::default()
        },
    );

    // static int sumTo(int n) { int sum = 0; for (int i = 1; i <= n; i++) sum += i; return sum; }
    b.method(
        statik,
        "sumTo",
        "(I)I",
        Body {
            max_stack: 2,
            max_locals: 3,
            code: vec![
                0x03, // 0: iconst_0
                0x3c, // 1: istore_1
                0x04, // 2: iconst_1
                0x3d, // 3: istore_2
                0x1c, // 4: iload_2
                0x1a, // 5: iload_0
                0xa3, 0x00, 0x0d, // 6: if_icmpgt 19
                0x1b, // 9: iload_1
                0x1c, // 10: iload_2
                0x60, // 11: iadd
                0x3c, // 12: istore_1
                0x84, 0x02, 0x01, // 13: iinc 2, 1
                0xa7, 0xff, 0xf4, // 16: goto 4
                0x1b, // 19: iload_1
                0xac, // 20: ireturn
            ],
            lines: vec![(0, 20), (4, 21), (9, 22), (13, 21), (19, 24)],
            locals: vec![(0, 21, "n", "I", 0), (2, 19, "sum", "I", 1), (4, 15, "i", "I", 2)],
            ..Body::default()
        },
    );

    // static int divide(int a, int b) { try { return a / b; } catch (ArithmeticException e) { return -1; } }
    b.method(
        statik,
        "divide",
        "(II)I",
        Body {
            max_stack: 2,
            max_locals: 3,
            code: vec![0x1a, 0x1b, 0x6c, 0xac, 0x4d, 0x02, 0xac],
            lines: vec![(0, 30), (4, 31), (5, 32)],
            handlers: vec![(0, 4, 4, Some("java/lang/ArithmeticException"))],
            ..Body::default()
        },
    );

    // static void hello(String name) { System.out.println("Hello, " + name); }
    let out = b.field_ref("java/lang/System", "out", "Ljava/io/PrintStream;");
    let builder = b.class("java/lang/StringBuilder");
    let init = b.method_ref("java/lang/StringBuilder", "<init>", "()V");
    let greeting = b.string("Hello, ");
    let append = b.method_ref(
        "java/lang/StringBuilder",
        "append",
        "(Ljava/lang/String;)Ljava/lang/StringBuilder;",
    );
    let to_string = b.method_ref("java/lang/StringBuilder", "toString", "()Ljava/lang/String;");
    let println = b.method_ref("java/io/PrintStream", "println", "(Ljava/lang/String;)V");
    b.method(
        statik,
        "hello",
        "(Ljava/lang/String;)V",
        Body {
            max_stack: 3,
            max_locals: 1,
            code: vec![
                0xb2, hi(out), lo(out), // 0: getstatic System.out
                0xbb, hi(builder), lo(builder), // 3: new StringBuilder
                0x59, // 6: dup
                0xb7, hi(init), lo(init), // 7: invokespecial <init>
                0x13, hi(greeting), lo(greeting), // 10: ldc_w "Hello, "
                0xb6, hi(append), lo(append), // 13: invokevirtual append
                0x2a, // 16: aload_0
                0xb6, hi(append), lo(append), // 17: invokevirtual append
                0xb6, hi(to_string), lo(to_string), // 20: invokevirtual toString
                0xb6, hi(println), lo(println), // 23: invokevirtual println
                0xb1, // 26: return
            ],
            lines: vec![(0, 40)],
            ..Body::default()
        },
    );

    // static int twice(int x) { return add(x, x); }
    let add = b.method_ref("demo/Calc", "add", "(II)I");
    b.method(
        statik,
        "twice",
        "(I)I",
        Body {
            max_stack: 2,
            max_locals: 1,
            code: vec![0x1a, 0x1a, 0xb8, hi(add), lo(add), 0xac],
            lines: vec![(0, 50)],
            ..Body::default()
        },
    );

    // static void spin() { while (true) {} }
    b.method(
        statik,
        "spin",
        "()V",
        Body {
            max_stack: 0,
            max_locals: 0,
            code: vec![0xa7, 0x00, 0x00],
            lines: vec![(0, 60)],
            ..Body::default()
        },
    );

    // static void escape() { goto 100 }
    b.method(
        statik,
        "escape",
        "()V",
        Body {
            max_stack: 0,
            max_locals: 0,
            code: vec![0xa7, 0x00, 0x64, 0xb1],
            lines: vec![(0, 70)],
            ..Body::default()
        },
    );

    // int getValue() { return this.value; }
    let value = b.field_ref("demo/Calc", "value", "I");
    b.method(
        MethodAccessFlags::PUBLIC,
        "getValue",
        "()I",
        Body {
            max_stack: 1,
            max_locals: 1,
            code: vec![0x2a, 0xb4, hi(value), lo(value), 0xac],
            ..Body::default()
        },
    );

    b.abstract_method("area", "()D");
    b.source_file("Calc.java");
    b
}
