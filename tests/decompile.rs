#![cfg(feature = "decompile")]

mod common;

use classfile_inspector::decompile::{DecompileOptions, Decompiler};
use classfile_inspector::interpreter::Value;
use classfile_inspector::method_info::MethodAccessFlags;
use classfile_inspector::{Engine, EngineConfig};

use common::{calc_class, Body, ClassBuilder};

fn engine() -> Engine {
    Engine::open(&calc_class().bytes(), EngineConfig::default()).unwrap()
}

#[test]
fn straight_line_method() {
    let text = engine().decompile("add").unwrap();
    assert!(text.starts_with("public static int add(int i0, int i1) {\n"), "{}", text);
    assert!(text.contains("return i0 + i1;"), "{}", text);
    assert!(text.trim_end().ends_with('}'));
}

#[test]
fn loop_becomes_while_with_local_names() {
    let text = engine().decompile("sumTo").unwrap();
    assert!(text.contains("int sumTo(int n)"), "{}", text);
    assert!(text.contains("while ("), "{}", text);
    assert!(text.contains("return sum;"), "{}", text);
}

#[test]
fn handler_becomes_try_catch() {
    let text = engine().decompile("divide").unwrap();
    assert!(text.contains("try {"), "{}", text);
    assert!(text.contains("} catch (ArithmeticException "), "{}", text);
    assert!(text.contains("return i0 / i1;"), "{}", text);
}

#[test]
fn library_calls_render_as_calls() {
    let text = engine().decompile("hello").unwrap();
    assert!(text.contains("println("), "{}", text);
    assert!(text.contains("\"Hello, \""), "{}", text);
}

#[test]
fn abstract_method_is_a_declaration() {
    let text = engine().decompile("area").unwrap();
    assert_eq!(text.trim(), "public abstract double area();");
}

#[test]
fn whole_class_has_package_fields_and_methods() {
    let text = engine().decompile_class().unwrap();
    assert!(text.starts_with("package demo;\n"), "{}", text);
    assert!(text.contains("public class Calc {"), "{}", text);
    assert!(text.contains("private int value;"), "{}", text);
    for name in ["add(", "sumTo(", "divide(", "hello(", "twice(", "getValue("] {
        assert!(text.contains(name), "missing {} in {}", name, text);
    }
}

#[test]
fn parallel_output_matches_sequential() {
    let class = calc_class().build();
    let sequential = Decompiler::new(DecompileOptions::default())
        .decompile_class(&class)
        .unwrap();
    let parallel = Decompiler::new(DecompileOptions {
        parallel: true,
        ..DecompileOptions::default()
    })
    .decompile_class(&class)
    .unwrap();
    assert_eq!(sequential, parallel);
}

#[test]
fn cfg_partitions_the_loop() {
    let cfg = engine().cfg("sumTo").unwrap().unwrap();
    let starts: Vec<u32> = cfg.blocks.keys().copied().collect();
    assert_eq!(starts, [0, 4, 9, 19]);

    let mut covered = 0;
    for block in cfg.blocks.values() {
        assert_eq!(block.id, covered);
        covered = block.end();
    }
    assert_eq!(covered, 21);

    assert_eq!(cfg.successors(0), [4]);
    assert_eq!(cfg.successors(4), [9, 19]);
    assert_eq!(cfg.successors(9), [4]);
    assert!(cfg.successors(19).is_empty());
    assert_eq!(cfg.block_at(11).map(|b| b.id), Some(9));
}

#[test]
fn cfg_links_handlers() {
    let cfg = engine().cfg("divide").unwrap().unwrap();
    assert_eq!(cfg.block(0).unwrap().handlers, [4]);
    assert!(cfg.block(4).unwrap().handlers.is_empty());
    assert!(engine().cfg("area").unwrap().is_none());
}

fn single_method(name: &str, descriptor: &str, code: Vec<u8>) -> Engine {
    let mut builder = ClassBuilder::new("demo/Branch");
    builder.method(
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        name,
        descriptor,
        Body {
            max_stack: 1,
            max_locals: 2,
            code,
            ..Body::default()
        },
    );
    Engine::open(&builder.bytes(), EngineConfig::default()).unwrap()
}

#[test]
fn values_pushed_in_both_arms_reach_the_join() {
    // static int choose(int x) { return x != 0 ? 1 : 0; }
    let engine = single_method(
        "choose",
        "(I)I",
        vec![
            0x1a, // 0: iload_0
            0x99, 0x00, 0x07, // 1: ifeq 8
            0x04, // 4: iconst_1
            0xa7, 0x00, 0x04, // 5: goto 9
            0x03, // 8: iconst_0
            0xac, // 9: ireturn
        ],
    );
    let text = engine.decompile("choose").unwrap();
    assert!(text.contains("stack0 = 1;"), "{}", text);
    assert!(text.contains("stack0 = 0;"), "{}", text);
    assert!(text.contains("return stack0;"), "{}", text);
    assert!(!text.contains("return 0;"), "{}", text);

    for (arg, expected) in [(5, 1), (0, 0)] {
        let mut session = engine.start_session("choose", vec![Value::Int(arg)]).unwrap();
        assert_eq!(session.run().unwrap().return_value, Some(Value::Int(expected)));
    }
}

#[test]
fn local_assigned_in_both_arms_is_declared_before_the_if() {
    // static int pick(int a) { int r; if (a > 0) r = 1; else r = 2; return r; }
    let engine = single_method(
        "pick",
        "(I)I",
        vec![
            0x1a, // 0: iload_0
            0x9e, 0x00, 0x08, // 1: ifle 9
            0x04, // 4: iconst_1
            0x3c, // 5: istore_1
            0xa7, 0x00, 0x05, // 6: goto 11
            0x05, // 9: iconst_2
            0x3c, // 10: istore_1
            0x1b, // 11: iload_1
            0xac, // 12: ireturn
        ],
    );
    let text = engine.decompile("pick").unwrap();
    let declaration = text.find("int i1;").unwrap_or_else(|| panic!("{}", text));
    let branch = text.find("if (").unwrap_or_else(|| panic!("{}", text));
    assert!(declaration < branch, "{}", text);
    assert!(!text.contains("int i1 ="), "{}", text);
    assert!(text.contains("i1 = 1;"), "{}", text);
    assert!(text.contains("i1 = 2;"), "{}", text);
    assert!(text.contains("return i1;"), "{}", text);
}
