mod common;

use classfile_inspector::code_attribute::{disassemble, render_listing, DisassemblyPolicy, Instruction};
use classfile_inspector::{open, DisassemblyError};

use common::calc_class;

#[test]
fn every_method_disassembles_contiguously() {
    let class = open(&calc_class().bytes()).unwrap();
    for method in &class.methods {
        let described = method.describe(&class.const_pool).unwrap();
        let Some(code) = described.code else { continue };
        let instructions = disassemble(&code.code, DisassemblyPolicy::Strict).unwrap();
        let mut expected = 0;
        for entry in &instructions {
            assert_eq!(entry.address, expected, "{}", described.name);
            expected = entry.next_address();
        }
        assert_eq!(expected as usize, code.code.len());
    }
}

#[test]
fn loop_decodes_branch_targets() {
    let class = open(&calc_class().bytes()).unwrap();
    let index = class.find_method("sumTo").unwrap().unwrap();
    let code = class.methods[index]
        .describe(&class.const_pool)
        .unwrap()
        .code
        .unwrap();
    let instructions = disassemble(&code.code, DisassemblyPolicy::Strict).unwrap();

    let addresses: Vec<u32> = instructions.iter().map(|i| i.address).collect();
    assert_eq!(addresses, [0, 1, 2, 3, 4, 5, 6, 9, 10, 11, 12, 13, 16, 19, 20]);
    assert_eq!(instructions[6].instruction, Instruction::IfIcmpgt(13));
    assert_eq!(instructions[11].instruction, Instruction::Iinc { index: 2, value: 1 });
    assert_eq!(instructions[12].instruction, Instruction::Goto(-12));
}

#[test]
fn listing_marks_lines_and_resolves_constants() {
    let class = open(&calc_class().bytes()).unwrap();
    let index = class.find_method("hello").unwrap().unwrap();
    let code = class.methods[index]
        .describe(&class.const_pool)
        .unwrap()
        .code
        .unwrap();
    let instructions = disassemble(&code.code, DisassemblyPolicy::Strict).unwrap();
    let listing = render_listing(&instructions, &class.const_pool, Some(&code));
    let lines: Vec<&str> = listing.lines().collect();

    assert_eq!(lines[0].trim(), "// line 40");
    assert!(lines[1].starts_with("     0: getstatic #"));
    assert!(lines[1].ends_with("// Field java/lang/System.out:Ljava/io/PrintStream;"));
    assert!(listing.contains("// String Hello, "));
    assert!(listing.contains("// Method java/lang/StringBuilder.toString:()Ljava/lang/String;"));
    assert!(lines.last().unwrap().ends_with("26: return"));
}

#[test]
fn listing_shows_absolute_branch_targets() {
    let class = open(&calc_class().bytes()).unwrap();
    let index = class.find_method("sumTo").unwrap().unwrap();
    let code = class.methods[index]
        .describe(&class.const_pool)
        .unwrap()
        .code
        .unwrap();
    let instructions = disassemble(&code.code, DisassemblyPolicy::Strict).unwrap();
    let listing = render_listing(&instructions, &class.const_pool, Some(&code));

    assert!(listing.contains("     6: if_icmpgt 19\n"));
    assert!(listing.contains("    13: iinc 2, 1\n"));
    assert!(listing.contains("    16: goto 4\n"));
    assert_eq!(listing.matches("// line 21").count(), 2);
}

#[test]
fn raw_fallback_keeps_going_past_unknown_bytes() {
    let code = [0x04, 0xfe, 0xfe, 0x3b, 0xb1];
    assert_eq!(
        disassemble(&code, DisassemblyPolicy::Strict),
        Err(DisassemblyError::UnknownOpcode { offset: 1, byte: 0xfe })
    );

    let instructions = disassemble(&code, DisassemblyPolicy::RawFallback).unwrap();
    assert_eq!(instructions.len(), 5);
    assert_eq!(instructions[2].instruction, Instruction::Unknown(0xfe));

    let listing = render_listing(&instructions, &Default::default(), None);
    assert!(listing.contains("     1: .byte 0xfe\n"));
    assert!(listing.contains("     3: istore_0\n"));
}

#[test]
fn lookupswitch_pads_to_four_bytes() {
    // iload_0; lookupswitch at 1 with two pairs; then three returns
    let mut code = vec![0x1a, 0xab, 0, 0];
    code.extend_from_slice(&27i32.to_be_bytes());
    code.extend_from_slice(&2i32.to_be_bytes());
    code.extend_from_slice(&(-1i32).to_be_bytes());
    code.extend_from_slice(&28i32.to_be_bytes());
    code.extend_from_slice(&7i32.to_be_bytes());
    code.extend_from_slice(&29i32.to_be_bytes());
    code.extend_from_slice(&[0xb1, 0xb1, 0xb1]);

    let instructions = disassemble(&code, DisassemblyPolicy::Strict).unwrap();
    assert_eq!(instructions.len(), 5);
    assert_eq!(instructions[1].length, 1 + 2 + 8 + 16);
    assert_eq!(instructions[2].address, 28);
    match &instructions[1].instruction {
        Instruction::Lookupswitch { default, pairs } => {
            assert_eq!(*default, 27);
            assert_eq!(pairs, &vec![(-1, 28), (7, 29)]);
        }
        other => panic!("unexpected {:?}", other),
    }
}
