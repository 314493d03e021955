mod common;

use classfile_inspector::attribute_info::AttributeInfoVariant;
use classfile_inspector::constant_info::{Constant, ConstantInfo};
use classfile_inspector::method_info::MethodAccessFlags;
use classfile_inspector::{open, ParseError};

use common::calc_class;

#[test]
fn parses_assembled_class() {
    let bytes = calc_class().bytes();
    let class = open(&bytes).unwrap();

    assert_eq!(class.major_version, 52);
    assert_eq!(class.this_class_name().unwrap(), "demo/Calc");
    assert_eq!(class.super_class_name().unwrap(), Some("java/lang/Object"));
    assert!(class.interface_names().unwrap().is_empty());
    assert_eq!(class.source_file().unwrap(), Some("Calc.java"));

    let names: Vec<_> = class
        .methods
        .iter()
        .map(|m| m.name(&class.const_pool).unwrap())
        .collect();
    assert_eq!(
        names,
        ["add", "sumTo", "divide", "hello", "twice", "spin", "escape", "getValue", "area"]
    );
    assert_eq!(class.fields.len(), 1);
    assert_eq!(class.fields[0].name(&class.const_pool).unwrap(), "value");
}

#[test]
fn serialization_round_trips() {
    let built = calc_class().build();
    let bytes = built.to_bytes().unwrap();
    let parsed = open(&bytes).unwrap();
    assert_eq!(parsed, built);
    assert_eq!(parsed.to_bytes().unwrap(), bytes);
}

#[test]
fn wide_constants_and_supplementary_text_round_trip() {
    let mut builder = calc_class();
    let long = builder.long(i64::MIN + 7);
    let nan = builder.double_bits(0x7ff8_0000_dead_beef);
    let clef = builder.utf8("clef \u{1d11e}");
    let after = builder.integer(-42);
    let built = builder.build();
    let bytes = built.to_bytes().unwrap();

    let parsed = open(&bytes).unwrap();
    assert_eq!(parsed, built);
    assert_eq!(parsed.to_bytes().unwrap(), bytes);

    let pool = &parsed.const_pool;
    assert_eq!(nan, long + 2);
    assert!(pool.get(long + 1).is_none());
    assert!(pool.get(nan + 1).is_none());
    assert_eq!(pool.resolve(long).unwrap(), &Constant::Long(i64::MIN + 7));
    assert!(matches!(
        pool.get(nan),
        Some(ConstantInfo::Double(d)) if d.bits == 0x7ff8_0000_dead_beef
    ));
    assert!(matches!(pool.resolve(nan).unwrap(), Constant::Double(v) if v.is_nan()));
    assert_eq!(pool.utf8(clef).unwrap(), "clef \u{1d11e}");
    assert!(matches!(
        pool.get(clef),
        Some(ConstantInfo::Utf8(u)) if u.bytes.ends_with(&[0xed, 0xa0, 0xb4, 0xed, 0xb4, 0x9e])
    ));
    assert_eq!(pool.resolve(after).unwrap(), &Constant::Integer(-42));
}

#[test]
fn methods_resolve_with_code_and_debug_tables() {
    let class = open(&calc_class().bytes()).unwrap();
    let index = class.find_method("sumTo").unwrap().unwrap();
    let method = class.method_descriptor(index).unwrap().unwrap();

    assert_eq!(method.key(), "sumTo:(I)I");
    assert!(method.is_static());
    assert!(method.access_flags.contains(MethodAccessFlags::PUBLIC));
    let code = method.code.as_ref().unwrap();
    assert_eq!(code.max_locals, 3);
    assert_eq!(code.line_for_pc(0), Some(20));
    assert_eq!(code.line_for_pc(11), Some(22));
    assert_eq!(code.line_for_pc(14), Some(21));
    assert_eq!(code.pcs_for_line(21), vec![4, 13]);
    assert!(code.is_line_start(19));
    assert!(!code.is_line_start(20));
    assert_eq!(code.local_name(2, 10), Some("i"));
    assert_eq!(code.local_name(2, 0), None);
    assert_eq!(code.any_local_name(1), Some("sum"));
}

#[test]
fn abstract_method_has_no_code() {
    let class = open(&calc_class().bytes()).unwrap();
    let index = class.find_method("area").unwrap().unwrap();
    let method = class.method_descriptor(index).unwrap().unwrap();
    assert!(method.code.is_none());
    assert!(!method.is_static());
}

#[test]
fn code_attribute_interprets_with_handlers() {
    let class = open(&calc_class().bytes()).unwrap();
    let index = class.find_method("divide:(II)I").unwrap().unwrap();
    let code = class.methods[index]
        .code_attribute(&class.const_pool)
        .unwrap()
        .unwrap();
    assert_eq!(code.code, vec![0x1a, 0x1b, 0x6c, 0xac, 0x4d, 0x02, 0xac]);
    assert_eq!(code.exception_table.len(), 1);
    let entry = code.exception_table[0];
    assert_eq!((entry.start_pc, entry.end_pc, entry.handler_pc), (0, 4, 4));
    assert_eq!(
        class.const_pool.class_name(entry.catch_type).unwrap(),
        "java/lang/ArithmeticException"
    );

    let source = class.attributes[0].interpret(&class.const_pool).unwrap();
    assert!(matches!(source, AttributeInfoVariant::SourceFile(_)));
}

#[test]
fn constant_pool_resolves_member_refs() {
    let class = open(&calc_class().bytes()).unwrap();
    let pool = &class.const_pool;
    let (index, _) = pool
        .iter()
        .find(|(i, _)| {
            pool.member_ref(*i)
                .map(|m| m.name == "println")
                .unwrap_or(false)
        })
        .unwrap();
    let member = pool.member_ref(index).unwrap();
    assert_eq!(member.class_name, "java/io/PrintStream");
    assert_eq!(member.descriptor, "(Ljava/lang/String;)V");

    let greeting = pool
        .iter()
        .find_map(|(i, _)| match pool.resolve(i) {
            Ok(Constant::String(s)) if s == "Hello, " => Some(i),
            _ => None,
        })
        .unwrap();
    assert!(matches!(pool.loadable(greeting), Ok(Constant::String(_))));
}

#[test]
fn every_truncation_is_an_error() {
    let bytes = calc_class().bytes();
    for len in 0..bytes.len() {
        assert!(open(&bytes[..len]).is_err(), "prefix of {} bytes parsed", len);
    }
    assert!(matches!(
        open(&bytes[..10]),
        Err(ParseError::TruncatedInput { offset: 10 })
    ));
}

#[test]
fn failed_parse_does_not_affect_the_next() {
    let bytes = calc_class().bytes();
    assert!(open(&bytes[..bytes.len() / 2]).is_err());
    assert!(open(&bytes).is_ok());
}

#[test]
fn bad_magic_is_a_malformed_header() {
    let mut bytes = calc_class().bytes();
    bytes[0] = 0xca;
    bytes[3] = 0xbf;
    assert!(matches!(open(&bytes), Err(ParseError::MalformedHeader { .. })));
    assert!(matches!(open(&[0xca, 0xfe]), Err(ParseError::MalformedHeader { .. })));
}

#[test]
fn dangling_this_class_is_rejected() {
    let mut class = calc_class().build();
    class.this_class = 0x7fff;
    let bytes = class.to_bytes().unwrap();
    assert!(matches!(
        open(&bytes),
        Err(ParseError::DanglingReference { index: 0x7fff, .. })
    ));
}
