mod common;

use classfile_inspector::code_attribute::{disassemble, DisassemblyPolicy};
use classfile_inspector::interpreter::SessionConfig;
use classfile_inspector::method_info::MethodAccessFlags;
use classfile_inspector::{open, DisassemblyError, Engine, EngineConfig};
use proptest::prelude::*;

use common::{calc_class, Body, ClassBuilder};

proptest! {
    #[test]
    fn arbitrary_bytes_never_panic(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
        let _ = open(&bytes);
    }

    #[test]
    fn corrupted_class_never_panics(position in 0usize..4096, byte in any::<u8>()) {
        let mut bytes = calc_class().bytes();
        let position = position % bytes.len();
        bytes[position] = byte;
        let _ = open(&bytes);
    }

    #[test]
    fn raw_disassembly_covers_the_code(code in proptest::collection::vec(any::<u8>(), 0..256)) {
        match disassemble(&code, DisassemblyPolicy::RawFallback) {
            Ok(instructions) => {
                let total: u32 = instructions.iter().map(|i| i.length).sum();
                prop_assert_eq!(total as usize, code.len());
                for pair in instructions.windows(2) {
                    prop_assert_eq!(pair[0].next_address(), pair[1].address);
                }
            }
            Err(DisassemblyError::TruncatedInput { .. }) => {}
            Err(other) => prop_assert!(false, "unexpected {:?}", other),
        }
    }

    #[test]
    fn executing_arbitrary_code_never_panics(code in proptest::collection::vec(any::<u8>(), 1..64)) {
        let mut builder = ClassBuilder::new("demo/Fuzz");
        builder.method(
            MethodAccessFlags::STATIC,
            "run",
            "(I)I",
            Body { max_stack: 8, max_locals: 4, code, ..Body::default() },
        );
        let config = EngineConfig {
            session: SessionConfig { max_iterations: 64, max_call_depth: 8 },
            ..EngineConfig::default()
        };
        let engine = Engine::open(&builder.bytes(), config).unwrap();
        if let Ok(mut session) = engine.start_session("run", vec![]) {
            let _ = session.run();
        }
    }
}
