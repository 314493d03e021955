mod common;

use classfile_inspector::code_attribute::{DisassemblyPolicy, Instruction};
use classfile_inspector::method_info::MethodAccessFlags;
use classfile_inspector::{Engine, EngineConfig, EngineError, ParseError};

use common::{calc_class, Body, ClassBuilder};

fn engine() -> Engine {
    Engine::open(&calc_class().bytes(), EngineConfig::default()).unwrap()
}

#[test]
fn open_reports_parse_errors() {
    let bytes = calc_class().bytes();
    let err = Engine::open(&bytes[..20], EngineConfig::default()).unwrap_err();
    assert!(matches!(err, EngineError::Parse(ParseError::TruncatedInput { .. })));
    assert!(err.to_string().starts_with("input truncated at byte offset"));
}

#[test]
fn methods_are_listed_in_declaration_order() {
    let keys: Vec<String> = engine().methods().unwrap().iter().map(|m| m.key()).collect();
    assert_eq!(keys[0], "add:(II)I");
    assert_eq!(keys[3], "hello:(Ljava/lang/String;)V");
    assert_eq!(keys.last().unwrap(), "area:()D");
}

#[test]
fn overloads_select_by_descriptor() {
    let mut builder = ClassBuilder::new("demo/Over");
    let statik = MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC;
    builder.method(
        statik,
        "f",
        "(I)I",
        Body {
            max_stack: 1,
            max_locals: 1,
            code: vec![0x1a, 0xac],
            ..Body::default()
        },
    );
    builder.method(
        statik,
        "f",
        "(J)J",
        Body {
            max_stack: 2,
            max_locals: 2,
            code: vec![0x1e, 0xad],
            ..Body::default()
        },
    );
    let engine = Engine::open(&builder.bytes(), EngineConfig::default()).unwrap();

    assert_eq!(engine.method("f").unwrap().descriptor, "(I)I");
    assert_eq!(engine.method("f:(J)J").unwrap().descriptor, "(J)J");
    assert!(matches!(
        engine.method("f:(D)D"),
        Err(EngineError::MethodNotFound(name)) if name == "f:(D)D"
    ));
}

#[test]
fn disassemble_and_listing_through_the_engine() {
    let engine = engine();
    let instructions = engine.disassemble("twice").unwrap();
    let ops: Vec<&str> = instructions.iter().map(|i| i.instruction.mnemonic()).collect();
    assert_eq!(ops, ["iload_0", "iload_0", "invokestatic", "ireturn"]);

    let listing = engine.listing("twice").unwrap();
    assert!(listing.contains("// Method demo/Calc.add:(II)I"), "{}", listing);

    assert!(engine.disassemble("area").unwrap().is_empty());
    assert_eq!(engine.listing("area").unwrap(), "");
}

#[test]
fn disassembly_policy_comes_from_config() {
    let mut builder = ClassBuilder::new("demo/Raw");
    builder.method(
        MethodAccessFlags::STATIC,
        "odd",
        "()V",
        Body {
            code: vec![0x00, 0xcb, 0xb1],
            ..Body::default()
        },
    );
    let bytes = builder.bytes();

    let strict = Engine::open(&bytes, EngineConfig::default()).unwrap();
    assert!(matches!(strict.disassemble("odd"), Err(EngineError::Disassembly(_))));

    let config = EngineConfig {
        disassembly: DisassemblyPolicy::RawFallback,
        ..EngineConfig::default()
    };
    let lenient = Engine::open(&bytes, config).unwrap();
    let instructions = lenient.disassemble("odd").unwrap();
    assert_eq!(instructions[1].instruction, Instruction::Unknown(0xcb));
}

#[test]
fn unknown_opcode_faults_only_when_executed() {
    let mut builder = ClassBuilder::new("demo/Raw");
    builder.method(
        MethodAccessFlags::STATIC,
        "odd",
        "()V",
        Body {
            code: vec![0x00, 0xcb, 0xb1],
            ..Body::default()
        },
    );
    let engine = Engine::open(&builder.bytes(), EngineConfig::default()).unwrap();
    let mut session = engine.start_session("odd", vec![]).unwrap();
    assert!(session.step().is_ok());
    assert!(session.step().is_err());
}

#[test]
fn dependencies_skip_java_lang() {
    assert_eq!(engine().dependencies(), ["demo/Calc", "java/io/PrintStream"]);
}
