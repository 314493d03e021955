use std::fmt;

use crate::constant_info::{Constant, ConstantPool};
use crate::descriptor::newarray_type;

use super::types::{Instruction, WideInstruction};

/// Absolute target of a branch encoded relative to `address`.
pub fn branch_target(address: u32, offset: i32) -> i64 {
    address as i64 + offset as i64
}

/// Bytes of alignment padding after a switch opcode at `address`.
pub fn switch_padding(address: u32) -> u32 {
    (4 - (address + 1) % 4) % 4
}

impl Instruction {
    pub fn opcode(&self) -> u8 {
        match self {
            Instruction::Nop => 0x00,
            Instruction::AconstNull => 0x01,
            Instruction::IconstM1 => 0x02,
            Instruction::Iconst0 => 0x03,
            Instruction::Iconst1 => 0x04,
            Instruction::Iconst2 => 0x05,
            Instruction::Iconst3 => 0x06,
            Instruction::Iconst4 => 0x07,
            Instruction::Iconst5 => 0x08,
            Instruction::Lconst0 => 0x09,
            Instruction::Lconst1 => 0x0a,
            Instruction::Fconst0 => 0x0b,
            Instruction::Fconst1 => 0x0c,
            Instruction::Fconst2 => 0x0d,
            Instruction::Dconst0 => 0x0e,
            Instruction::Dconst1 => 0x0f,
            Instruction::Bipush(_) => 0x10,
            Instruction::Sipush(_) => 0x11,
            Instruction::Ldc(_) => 0x12,
            Instruction::LdcW(_) => 0x13,
            Instruction::Ldc2W(_) => 0x14,
            Instruction::Iload(_) => 0x15,
            Instruction::Lload(_) => 0x16,
            Instruction::Fload(_) => 0x17,
            Instruction::Dload(_) => 0x18,
            Instruction::Aload(_) => 0x19,
            Instruction::Iload0 => 0x1a,
            Instruction::Iload1 => 0x1b,
            Instruction::Iload2 => 0x1c,
            Instruction::Iload3 => 0x1d,
            Instruction::Lload0 => 0x1e,
            Instruction::Lload1 => 0x1f,
            Instruction::Lload2 => 0x20,
            Instruction::Lload3 => 0x21,
            Instruction::Fload0 => 0x22,
            Instruction::Fload1 => 0x23,
            Instruction::Fload2 => 0x24,
            Instruction::Fload3 => 0x25,
            Instruction::Dload0 => 0x26,
            Instruction::Dload1 => 0x27,
            Instruction::Dload2 => 0x28,
            Instruction::Dload3 => 0x29,
            Instruction::Aload0 => 0x2a,
            Instruction::Aload1 => 0x2b,
            Instruction::Aload2 => 0x2c,
            Instruction::Aload3 => 0x2d,
            Instruction::Iaload => 0x2e,
            Instruction::Laload => 0x2f,
            Instruction::Faload => 0x30,
            Instruction::Daload => 0x31,
            Instruction::Aaload => 0x32,
            Instruction::Baload => 0x33,
            Instruction::Caload => 0x34,
            Instruction::Saload => 0x35,
            Instruction::Istore(_) => 0x36,
            Instruction::Lstore(_) => 0x37,
            Instruction::Fstore(_) => 0x38,
            Instruction::Dstore(_) => 0x39,
            Instruction::Astore(_) => 0x3a,
            Instruction::Istore0 => 0x3b,
            Instruction::Istore1 => 0x3c,
            Instruction::Istore2 => 0x3d,
            Instruction::Istore3 => 0x3e,
            Instruction::Lstore0 => 0x3f,
            Instruction::Lstore1 => 0x40,
            Instruction::Lstore2 => 0x41,
            Instruction::Lstore3 => 0x42,
            Instruction::Fstore0 => 0x43,
            Instruction::Fstore1 => 0x44,
            Instruction::Fstore2 => 0x45,
            Instruction::Fstore3 => 0x46,
            Instruction::Dstore0 => 0x47,
            Instruction::Dstore1 => 0x48,
            Instruction::Dstore2 => 0x49,
            Instruction::Dstore3 => 0x4a,
            Instruction::Astore0 => 0x4b,
            Instruction::Astore1 => 0x4c,
            Instruction::Astore2 => 0x4d,
            Instruction::Astore3 => 0x4e,
            Instruction::Iastore => 0x4f,
            Instruction::Lastore => 0x50,
            Instruction::Fastore => 0x51,
            Instruction::Dastore => 0x52,
            Instruction::Aastore => 0x53,
            Instruction::Bastore => 0x54,
            Instruction::Castore => 0x55,
            Instruction::Sastore => 0x56,
            Instruction::Pop => 0x57,
            Instruction::Pop2 => 0x58,
            Instruction::Dup => 0x59,
            Instruction::DupX1 => 0x5a,
            Instruction::DupX2 => 0x5b,
            Instruction::Dup2 => 0x5c,
            Instruction::Dup2X1 => 0x5d,
            Instruction::Dup2X2 => 0x5e,
            Instruction::Swap => 0x5f,
            Instruction::Iadd => 0x60,
            Instruction::Ladd => 0x61,
            Instruction::Fadd => 0x62,
            Instruction::Dadd => 0x63,
            Instruction::Isub => 0x64,
            Instruction::Lsub => 0x65,
            Instruction::Fsub => 0x66,
            Instruction::Dsub => 0x67,
            Instruction::Imul => 0x68,
            Instruction::Lmul => 0x69,
            Instruction::Fmul => 0x6a,
            Instruction::Dmul => 0x6b,
            Instruction::Idiv => 0x6c,
            Instruction::Ldiv => 0x6d,
            Instruction::Fdiv => 0x6e,
            Instruction::Ddiv => 0x6f,
            Instruction::Irem => 0x70,
            Instruction::Lrem => 0x71,
            Instruction::Frem => 0x72,
            Instruction::Drem => 0x73,
            Instruction::Ineg => 0x74,
            Instruction::Lneg => 0x75,
            Instruction::Fneg => 0x76,
            Instruction::Dneg => 0x77,
            Instruction::Ishl => 0x78,
            Instruction::Lshl => 0x79,
            Instruction::Ishr => 0x7a,
            Instruction::Lshr => 0x7b,
            Instruction::Iushr => 0x7c,
            Instruction::Lushr => 0x7d,
            Instruction::Iand => 0x7e,
            Instruction::Land => 0x7f,
            Instruction::Ior => 0x80,
            Instruction::Lor => 0x81,
            Instruction::Ixor => 0x82,
            Instruction::Lxor => 0x83,
            Instruction::Iinc { .. } => 0x84,
            Instruction::I2l => 0x85,
            Instruction::I2f => 0x86,
            Instruction::I2d => 0x87,
            Instruction::L2i => 0x88,
            Instruction::L2f => 0x89,
            Instruction::L2d => 0x8a,
            Instruction::F2i => 0x8b,
            Instruction::F2l => 0x8c,
            Instruction::F2d => 0x8d,
            Instruction::D2i => 0x8e,
            Instruction::D2l => 0x8f,
            Instruction::D2f => 0x90,
            Instruction::I2b => 0x91,
            Instruction::I2c => 0x92,
            Instruction::I2s => 0x93,
            Instruction::Lcmp => 0x94,
            Instruction::Fcmpl => 0x95,
            Instruction::Fcmpg => 0x96,
            Instruction::Dcmpl => 0x97,
            Instruction::Dcmpg => 0x98,
            Instruction::Ifeq(_) => 0x99,
            Instruction::Ifne(_) => 0x9a,
            Instruction::Iflt(_) => 0x9b,
            Instruction::Ifge(_) => 0x9c,
            Instruction::Ifgt(_) => 0x9d,
            Instruction::Ifle(_) => 0x9e,
            Instruction::IfIcmpeq(_) => 0x9f,
            Instruction::IfIcmpne(_) => 0xa0,
            Instruction::IfIcmplt(_) => 0xa1,
            Instruction::IfIcmpge(_) => 0xa2,
            Instruction::IfIcmpgt(_) => 0xa3,
            Instruction::IfIcmple(_) => 0xa4,
            Instruction::IfAcmpeq(_) => 0xa5,
            Instruction::IfAcmpne(_) => 0xa6,
            Instruction::Goto(_) => 0xa7,
            Instruction::Jsr(_) => 0xa8,
            Instruction::Ret(_) => 0xa9,
            Instruction::Tableswitch { .. } => 0xaa,
            Instruction::Lookupswitch { .. } => 0xab,
            Instruction::Ireturn => 0xac,
            Instruction::Lreturn => 0xad,
            Instruction::Freturn => 0xae,
            Instruction::Dreturn => 0xaf,
            Instruction::Areturn => 0xb0,
            Instruction::Return => 0xb1,
            Instruction::Getstatic(_) => 0xb2,
            Instruction::Putstatic(_) => 0xb3,
            Instruction::Getfield(_) => 0xb4,
            Instruction::Putfield(_) => 0xb5,
            Instruction::Invokevirtual(_) => 0xb6,
            Instruction::Invokespecial(_) => 0xb7,
            Instruction::Invokestatic(_) => 0xb8,
            Instruction::Invokeinterface { .. } => 0xb9,
            Instruction::Invokedynamic { .. } => 0xba,
            Instruction::New(_) => 0xbb,
            Instruction::Newarray(_) => 0xbc,
            Instruction::Anewarray(_) => 0xbd,
            Instruction::Arraylength => 0xbe,
            Instruction::Athrow => 0xbf,
            Instruction::Checkcast(_) => 0xc0,
            Instruction::Instanceof(_) => 0xc1,
            Instruction::Monitorenter => 0xc2,
            Instruction::Monitorexit => 0xc3,
            Instruction::Wide(_) => 0xc4,
            Instruction::Multianewarray { .. } => 0xc5,
            Instruction::Ifnull(_) => 0xc6,
            Instruction::Ifnonnull(_) => 0xc7,
            Instruction::GotoW(_) => 0xc8,
            Instruction::JsrW(_) => 0xc9,
            Instruction::Unknown(byte) => *byte,
        }
    }

    /// The mnemonic `javap` prints for this instruction.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Instruction::Nop => "nop",
            Instruction::AconstNull => "aconst_null",
            Instruction::IconstM1 => "iconst_m1",
            Instruction::Iconst0 => "iconst_0",
            Instruction::Iconst1 => "iconst_1",
            Instruction::Iconst2 => "iconst_2",
            Instruction::Iconst3 => "iconst_3",
            Instruction::Iconst4 => "iconst_4",
            Instruction::Iconst5 => "iconst_5",
            Instruction::Lconst0 => "lconst_0",
            Instruction::Lconst1 => "lconst_1",
            Instruction::Fconst0 => "fconst_0",
            Instruction::Fconst1 => "fconst_1",
            Instruction::Fconst2 => "fconst_2",
            Instruction::Dconst0 => "dconst_0",
            Instruction::Dconst1 => "dconst_1",
            Instruction::Bipush(_) => "bipush",
            Instruction::Sipush(_) => "sipush",
            Instruction::Ldc(_) => "ldc",
            Instruction::LdcW(_) => "ldc_w",
            Instruction::Ldc2W(_) => "ldc2_w",
            Instruction::Iload(_) => "iload",
            Instruction::Lload(_) => "lload",
            Instruction::Fload(_) => "fload",
            Instruction::Dload(_) => "dload",
            Instruction::Aload(_) => "aload",
            Instruction::Iload0 => "iload_0",
            Instruction::Iload1 => "iload_1",
            Instruction::Iload2 => "iload_2",
            Instruction::Iload3 => "iload_3",
            Instruction::Lload0 => "lload_0",
            Instruction::Lload1 => "lload_1",
            Instruction::Lload2 => "lload_2",
            Instruction::Lload3 => "lload_3",
            Instruction::Fload0 => "fload_0",
            Instruction::Fload1 => "fload_1",
            Instruction::Fload2 => "fload_2",
            Instruction::Fload3 => "fload_3",
            Instruction::Dload0 => "dload_0",
            Instruction::Dload1 => "dload_1",
            Instruction::Dload2 => "dload_2",
            Instruction::Dload3 => "dload_3",
            Instruction::Aload0 => "aload_0",
            Instruction::Aload1 => "aload_1",
            Instruction::Aload2 => "aload_2",
            Instruction::Aload3 => "aload_3",
            Instruction::Iaload => "iaload",
            Instruction::Laload => "laload",
            Instruction::Faload => "faload",
            Instruction::Daload => "daload",
            Instruction::Aaload => "aaload",
            Instruction::Baload => "baload",
            Instruction::Caload => "caload",
            Instruction::Saload => "saload",
            Instruction::Istore(_) => "istore",
            Instruction::Lstore(_) => "lstore",
            Instruction::Fstore(_) => "fstore",
            Instruction::Dstore(_) => "dstore",
            Instruction::Astore(_) => "astore",
            Instruction::Istore0 => "istore_0",
            Instruction::Istore1 => "istore_1",
            Instruction::Istore2 => "istore_2",
            Instruction::Istore3 => "istore_3",
            Instruction::Lstore0 => "lstore_0",
            Instruction::Lstore1 => "lstore_1",
            Instruction::Lstore2 => "lstore_2",
            Instruction::Lstore3 => "lstore_3",
            Instruction::Fstore0 => "fstore_0",
            Instruction::Fstore1 => "fstore_1",
            Instruction::Fstore2 => "fstore_2",
            Instruction::Fstore3 => "fstore_3",
            Instruction::Dstore0 => "dstore_0",
            Instruction::Dstore1 => "dstore_1",
            Instruction::Dstore2 => "dstore_2",
            Instruction::Dstore3 => "dstore_3",
            Instruction::Astore0 => "astore_0",
            Instruction::Astore1 => "astore_1",
            Instruction::Astore2 => "astore_2",
            Instruction::Astore3 => "astore_3",
            Instruction::Iastore => "iastore",
            Instruction::Lastore => "lastore",
            Instruction::Fastore => "fastore",
            Instruction::Dastore => "dastore",
            Instruction::Aastore => "aastore",
            Instruction::Bastore => "bastore",
            Instruction::Castore => "castore",
            Instruction::Sastore => "sastore",
            Instruction::Pop => "pop",
            Instruction::Pop2 => "pop2",
            Instruction::Dup => "dup",
            Instruction::DupX1 => "dup_x1",
            Instruction::DupX2 => "dup_x2",
            Instruction::Dup2 => "dup2",
            Instruction::Dup2X1 => "dup2_x1",
            Instruction::Dup2X2 => "dup2_x2",
            Instruction::Swap => "swap",
            Instruction::Iadd => "iadd",
            Instruction::Ladd => "ladd",
            Instruction::Fadd => "fadd",
            Instruction::Dadd => "dadd",
            Instruction::Isub => "isub",
            Instruction::Lsub => "lsub",
            Instruction::Fsub => "fsub",
            Instruction::Dsub => "dsub",
            Instruction::Imul => "imul",
            Instruction::Lmul => "lmul",
            Instruction::Fmul => "fmul",
            Instruction::Dmul => "dmul",
            Instruction::Idiv => "idiv",
            Instruction::Ldiv => "ldiv",
            Instruction::Fdiv => "fdiv",
            Instruction::Ddiv => "ddiv",
            Instruction::Irem => "irem",
            Instruction::Lrem => "lrem",
            Instruction::Frem => "frem",
            Instruction::Drem => "drem",
            Instruction::Ineg => "ineg",
            Instruction::Lneg => "lneg",
            Instruction::Fneg => "fneg",
            Instruction::Dneg => "dneg",
            Instruction::Ishl => "ishl",
            Instruction::Lshl => "lshl",
            Instruction::Ishr => "ishr",
            Instruction::Lshr => "lshr",
            Instruction::Iushr => "iushr",
            Instruction::Lushr => "lushr",
            Instruction::Iand => "iand",
            Instruction::Land => "land",
            Instruction::Ior => "ior",
            Instruction::Lor => "lor",
            Instruction::Ixor => "ixor",
            Instruction::Lxor => "lxor",
            Instruction::Iinc { .. } => "iinc",
            Instruction::I2l => "i2l",
            Instruction::I2f => "i2f",
            Instruction::I2d => "i2d",
            Instruction::L2i => "l2i",
            Instruction::L2f => "l2f",
            Instruction::L2d => "l2d",
            Instruction::F2i => "f2i",
            Instruction::F2l => "f2l",
            Instruction::F2d => "f2d",
            Instruction::D2i => "d2i",
            Instruction::D2l => "d2l",
            Instruction::D2f => "d2f",
            Instruction::I2b => "i2b",
            Instruction::I2c => "i2c",
            Instruction::I2s => "i2s",
            Instruction::Lcmp => "lcmp",
            Instruction::Fcmpl => "fcmpl",
            Instruction::Fcmpg => "fcmpg",
            Instruction::Dcmpl => "dcmpl",
            Instruction::Dcmpg => "dcmpg",
            Instruction::Ifeq(_) => "ifeq",
            Instruction::Ifne(_) => "ifne",
            Instruction::Iflt(_) => "iflt",
            Instruction::Ifge(_) => "ifge",
            Instruction::Ifgt(_) => "ifgt",
            Instruction::Ifle(_) => "ifle",
            Instruction::IfIcmpeq(_) => "if_icmpeq",
            Instruction::IfIcmpne(_) => "if_icmpne",
            Instruction::IfIcmplt(_) => "if_icmplt",
            Instruction::IfIcmpge(_) => "if_icmpge",
            Instruction::IfIcmpgt(_) => "if_icmpgt",
            Instruction::IfIcmple(_) => "if_icmple",
            Instruction::IfAcmpeq(_) => "if_acmpeq",
            Instruction::IfAcmpne(_) => "if_acmpne",
            Instruction::Goto(_) => "goto",
            Instruction::Jsr(_) => "jsr",
            Instruction::Ret(_) => "ret",
            Instruction::Tableswitch { .. } => "tableswitch",
            Instruction::Lookupswitch { .. } => "lookupswitch",
            Instruction::Ireturn => "ireturn",
            Instruction::Lreturn => "lreturn",
            Instruction::Freturn => "freturn",
            Instruction::Dreturn => "dreturn",
            Instruction::Areturn => "areturn",
            Instruction::Return => "return",
            Instruction::Getstatic(_) => "getstatic",
            Instruction::Putstatic(_) => "putstatic",
            Instruction::Getfield(_) => "getfield",
            Instruction::Putfield(_) => "putfield",
            Instruction::Invokevirtual(_) => "invokevirtual",
            Instruction::Invokespecial(_) => "invokespecial",
            Instruction::Invokestatic(_) => "invokestatic",
            Instruction::Invokeinterface { .. } => "invokeinterface",
            Instruction::Invokedynamic { .. } => "invokedynamic",
            Instruction::New(_) => "new",
            Instruction::Newarray(_) => "newarray",
            Instruction::Anewarray(_) => "anewarray",
            Instruction::Arraylength => "arraylength",
            Instruction::Athrow => "athrow",
            Instruction::Checkcast(_) => "checkcast",
            Instruction::Instanceof(_) => "instanceof",
            Instruction::Monitorenter => "monitorenter",
            Instruction::Monitorexit => "monitorexit",
            Instruction::Wide(_) => "wide",
            Instruction::Multianewarray { .. } => "multianewarray",
            Instruction::Ifnull(_) => "ifnull",
            Instruction::Ifnonnull(_) => "ifnonnull",
            Instruction::GotoW(_) => "goto_w",
            Instruction::JsrW(_) => "jsr_w",
            Instruction::Unknown(_) => "unknown",
        }
    }

    /// Encoded length in bytes when the instruction starts at `address`.
    pub fn byte_size(&self, address: u32) -> u32 {
        match self {
            Instruction::Bipush(_)
            | Instruction::Ldc(_)
            | Instruction::Iload(_)
            | Instruction::Lload(_)
            | Instruction::Fload(_)
            | Instruction::Dload(_)
            | Instruction::Aload(_)
            | Instruction::Istore(_)
            | Instruction::Lstore(_)
            | Instruction::Fstore(_)
            | Instruction::Dstore(_)
            | Instruction::Astore(_)
            | Instruction::Ret(_)
            | Instruction::Newarray(_) => 2,
            Instruction::Sipush(_)
            | Instruction::LdcW(_)
            | Instruction::Ldc2W(_)
            | Instruction::Iinc { .. }
            | Instruction::Ifeq(_)
            | Instruction::Ifne(_)
            | Instruction::Iflt(_)
            | Instruction::Ifge(_)
            | Instruction::Ifgt(_)
            | Instruction::Ifle(_)
            | Instruction::IfIcmpeq(_)
            | Instruction::IfIcmpne(_)
            | Instruction::IfIcmplt(_)
            | Instruction::IfIcmpge(_)
            | Instruction::IfIcmpgt(_)
            | Instruction::IfIcmple(_)
            | Instruction::IfAcmpeq(_)
            | Instruction::IfAcmpne(_)
            | Instruction::Goto(_)
            | Instruction::Jsr(_)
            | Instruction::Getstatic(_)
            | Instruction::Putstatic(_)
            | Instruction::Getfield(_)
            | Instruction::Putfield(_)
            | Instruction::Invokevirtual(_)
            | Instruction::Invokespecial(_)
            | Instruction::Invokestatic(_)
            | Instruction::New(_)
            | Instruction::Anewarray(_)
            | Instruction::Checkcast(_)
            | Instruction::Instanceof(_)
            | Instruction::Ifnull(_)
            | Instruction::Ifnonnull(_) => 3,
            Instruction::Multianewarray { .. } => 4,
            Instruction::Invokeinterface { .. }
            | Instruction::Invokedynamic { .. }
            | Instruction::GotoW(_)
            | Instruction::JsrW(_) => 5,
            Instruction::Wide(WideInstruction::Iinc { .. }) => 6,
            Instruction::Wide(_) => 4,
            Instruction::Tableswitch { offsets, .. } => {
                1 + switch_padding(address) + 12 + 4 * offsets.len() as u32
            }
            Instruction::Lookupswitch { pairs, .. } => {
                1 + switch_padding(address) + 8 + 8 * pairs.len() as u32
            }
            _ => 1,
        }
    }

    /// Conditional branch offset, if this is an `if*` instruction.
    pub fn conditional_offset(&self) -> Option<i32> {
        match self {
            Instruction::Ifeq(off)
            | Instruction::Ifne(off)
            | Instruction::Iflt(off)
            | Instruction::Ifge(off)
            | Instruction::Ifgt(off)
            | Instruction::Ifle(off)
            | Instruction::IfIcmpeq(off)
            | Instruction::IfIcmpne(off)
            | Instruction::IfIcmplt(off)
            | Instruction::IfIcmpge(off)
            | Instruction::IfIcmpgt(off)
            | Instruction::IfIcmple(off)
            | Instruction::IfAcmpeq(off)
            | Instruction::IfAcmpne(off)
            | Instruction::Ifnull(off)
            | Instruction::Ifnonnull(off) => Some(*off as i32),
            _ => None,
        }
    }

    pub fn is_return(&self) -> bool {
        matches!(
            self,
            Instruction::Ireturn
                | Instruction::Lreturn
                | Instruction::Freturn
                | Instruction::Dreturn
                | Instruction::Areturn
                | Instruction::Return
        )
    }

    /// Whether control can reach the next instruction in the code array.
    pub fn falls_through(&self) -> bool {
        !(self.is_return()
            || matches!(
                self,
                Instruction::Goto(_)
                    | Instruction::GotoW(_)
                    | Instruction::Athrow
                    | Instruction::Tableswitch { .. }
                    | Instruction::Lookupswitch { .. }
                    | Instruction::Ret(_)
                    | Instruction::Wide(WideInstruction::Ret(_))
                    | Instruction::Jsr(_)
                    | Instruction::JsrW(_)
            ))
    }

    /// Operands with branch targets made absolute and pool references resolved.
    pub fn operands(&self, address: u32, pool: &ConstantPool) -> Vec<Operand> {
        let constant = |index: u16| Operand::Constant {
            index,
            value: pool.resolve(index).ok().cloned(),
        };
        match self {
            Instruction::Bipush(v) => vec![Operand::Immediate(*v as i64)],
            Instruction::Sipush(v) => vec![Operand::Immediate(*v as i64)],
            Instruction::Ldc(index) => vec![constant(*index as u16)],
            Instruction::LdcW(index)
            | Instruction::Ldc2W(index)
            | Instruction::Getstatic(index)
            | Instruction::Putstatic(index)
            | Instruction::Getfield(index)
            | Instruction::Putfield(index)
            | Instruction::Invokevirtual(index)
            | Instruction::Invokespecial(index)
            | Instruction::Invokestatic(index)
            | Instruction::Invokedynamic { index, .. }
            | Instruction::New(index)
            | Instruction::Anewarray(index)
            | Instruction::Checkcast(index)
            | Instruction::Instanceof(index) => vec![constant(*index)],
            Instruction::Invokeinterface { index, count, .. } => {
                vec![constant(*index), Operand::Immediate(*count as i64)]
            }
            Instruction::Multianewarray { index, dimensions } => {
                vec![constant(*index), Operand::Immediate(*dimensions as i64)]
            }
            Instruction::Iload(slot)
            | Instruction::Lload(slot)
            | Instruction::Fload(slot)
            | Instruction::Dload(slot)
            | Instruction::Aload(slot)
            | Instruction::Istore(slot)
            | Instruction::Lstore(slot)
            | Instruction::Fstore(slot)
            | Instruction::Dstore(slot)
            | Instruction::Astore(slot)
            | Instruction::Ret(slot) => vec![Operand::Local(*slot as u16)],
            Instruction::Iinc { index, value } => {
                vec![Operand::Local(*index as u16), Operand::Immediate(*value as i64)]
            }
            Instruction::Wide(wide) => match wide {
                WideInstruction::Iinc { index, value } => {
                    vec![Operand::Local(*index), Operand::Immediate(*value as i64)]
                }
                WideInstruction::Iload(slot)
                | WideInstruction::Lload(slot)
                | WideInstruction::Fload(slot)
                | WideInstruction::Dload(slot)
                | WideInstruction::Aload(slot)
                | WideInstruction::Istore(slot)
                | WideInstruction::Lstore(slot)
                | WideInstruction::Fstore(slot)
                | WideInstruction::Dstore(slot)
                | WideInstruction::Astore(slot)
                | WideInstruction::Ret(slot) => vec![Operand::Local(*slot)],
            },
            Instruction::Newarray(atype) => vec![Operand::ArrayType(*atype)],
            Instruction::Goto(off) | Instruction::Jsr(off) => {
                vec![Operand::Branch(branch_target(address, *off as i32))]
            }
            Instruction::GotoW(off) | Instruction::JsrW(off) => {
                vec![Operand::Branch(branch_target(address, *off))]
            }
            Instruction::Tableswitch { default, low, offsets, .. } => vec![Operand::TableSwitch {
                low: *low,
                default: branch_target(address, *default),
                targets: offsets.iter().map(|o| branch_target(address, *o)).collect(),
            }],
            Instruction::Lookupswitch { default, pairs } => vec![Operand::LookupSwitch {
                default: branch_target(address, *default),
                pairs: pairs
                    .iter()
                    .map(|(key, o)| (*key, branch_target(address, *o)))
                    .collect(),
            }],
            other => match other.conditional_offset() {
                Some(off) => vec![Operand::Branch(branch_target(address, off))],
                None => Vec::new(),
            },
        }
    }
}

impl WideInstruction {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            WideInstruction::Iload(_) => "iload",
            WideInstruction::Lload(_) => "lload",
            WideInstruction::Fload(_) => "fload",
            WideInstruction::Dload(_) => "dload",
            WideInstruction::Aload(_) => "aload",
            WideInstruction::Istore(_) => "istore",
            WideInstruction::Lstore(_) => "lstore",
            WideInstruction::Fstore(_) => "fstore",
            WideInstruction::Dstore(_) => "dstore",
            WideInstruction::Astore(_) => "astore",
            WideInstruction::Iinc { .. } => "iinc",
            WideInstruction::Ret(_) => "ret",
        }
    }
}

/// A decoded operand.
#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    Local(u16),
    Immediate(i64),
    /// A constant pool reference; `value` is `None` when it does not resolve.
    Constant { index: u16, value: Option<Constant> },
    /// Absolute branch target.
    Branch(i64),
    /// `newarray` element type code.
    ArrayType(u8),
    TableSwitch { low: i32, default: i64, targets: Vec<i64> },
    LookupSwitch { default: i64, pairs: Vec<(i32, i64)> },
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Local(slot) => write!(f, "{}", slot),
            Operand::Immediate(v) => write!(f, "{}", v),
            Operand::Constant { index, .. } => write!(f, "#{}", index),
            Operand::Branch(target) => write!(f, "{}", target),
            Operand::ArrayType(atype) => match newarray_type(*atype) {
                Some(ty) => write!(f, "{}", ty),
                None => write!(f, "{}", atype),
            },
            Operand::TableSwitch { low, default, targets } => {
                write!(f, "{{ // {} to {}", low, *low as i64 + targets.len() as i64 - 1)?;
                for (i, target) in targets.iter().enumerate() {
                    write!(f, "\n{:>12}: {}", *low as i64 + i as i64, target)?;
                }
                write!(f, "\n{:>12}: {}\n}}", "default", default)
            }
            Operand::LookupSwitch { default, pairs } => {
                write!(f, "{{ // {}", pairs.len())?;
                for (key, target) in pairs {
                    write!(f, "\n{:>12}: {}", key, target)?;
                }
                write!(f, "\n{:>12}: {}\n}}", "default", default)
            }
        }
    }
}
