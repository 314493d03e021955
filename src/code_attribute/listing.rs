use std::fmt::Write;

use crate::constant_info::ConstantPool;
use crate::method_info::MethodCode;

use super::disassembler::AddressedInstruction;
use super::instruction::Operand;
use super::types::Instruction;

/// Render a `javap -c` style listing.
///
/// Each instruction prints as `offset: mnemonic operands`, followed by a
/// `// ...` comment with the resolved constant when it has one. When line
/// numbers are known a `// line N` marker precedes the first instruction of
/// every line.
pub fn render_listing(
    instructions: &[AddressedInstruction],
    pool: &ConstantPool,
    code: Option<&MethodCode>,
) -> String {
    let mut out = String::new();
    for entry in instructions {
        if let Some(code) = code {
            for line in code
                .line_numbers
                .iter()
                .filter(|l| l.start_pc as u32 == entry.address)
            {
                let _ = writeln!(out, "      // line {}", line.line_number);
            }
        }
        let _ = writeln!(out, "{}", render_instruction(entry, pool));
    }
    out
}

/// One listing line, without a trailing newline.
pub fn render_instruction(entry: &AddressedInstruction, pool: &ConstantPool) -> String {
    let mut line = format!("{:>6}: ", entry.address);
    match &entry.instruction {
        Instruction::Wide(wide) => {
            line.push_str("wide ");
            line.push_str(wide.mnemonic());
        }
        Instruction::Unknown(byte) => {
            let _ = write!(line, ".byte {:#04x}", byte);
            return line;
        }
        other => line.push_str(other.mnemonic()),
    }

    let operands = entry.instruction.operands(entry.address, pool);
    let rendered: Vec<String> = operands.iter().map(Operand::to_string).collect();
    if !rendered.is_empty() {
        let joined = rendered.join(", ");
        line.push(' ');
        line.push_str(&joined);
    }

    let comment = operands.iter().find_map(|op| match op {
        Operand::Constant { value: Some(value), .. } => Some(value.to_string()),
        Operand::Constant { index, value: None } => Some(format!("<invalid #{}>", index)),
        _ => None,
    });
    if let Some(comment) = comment {
        let pad = 40usize.saturating_sub(line.len()).max(1);
        let _ = write!(line, "{:pad$}// {}", "", comment, pad = pad);
    }
    line
}
