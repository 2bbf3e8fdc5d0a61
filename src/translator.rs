//! The disassembler/assembler collaborator boundary.
//!
//! Decoding and re-encoding individual Hermes instructions is explicitly
//! out of scope: this crate edits a function's bytecode as a
//! byte blob. [`BytecodeTranslator`] is the seam a caller plugs a real
//! instruction codec into when it wants [`crate::Container::get_function`]
//! / [`crate::Container::set_function`] to work with instructions rather
//! than raw bytes — the same collaborator-trait shape `wuff::parse::Parse`
//! gives the header codec, but pointed outward at a dependency this crate
//! doesn't implement instead of inward at its own types.

use crate::error::HbcError;

/// One opaque instruction. A real translator would parse this into an
/// opcode and operands; here it is only ever round-tripped as bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction(pub Vec<u8>);

/// Converts between a function's raw bytecode and a structured instruction
/// stream. No implementation ships with this crate — callers that need
/// `disasm: true` behavior supply their own.
pub trait BytecodeTranslator {
    fn disassemble(&self, bytes: &[u8]) -> Result<Vec<Instruction>, HbcError>;
    fn assemble(&self, insts: &[Instruction]) -> Result<Vec<u8>, HbcError>;
}

/// A translator that treats one [`Instruction`] as exactly one raw byte.
/// Exists only to exercise [`crate::Container::get_function`]/
/// `set_function`'s `disasm` path in tests without a real instruction set.
#[cfg(test)]
pub(crate) struct NullTranslator;

#[cfg(test)]
impl BytecodeTranslator for NullTranslator {
    fn disassemble(&self, bytes: &[u8]) -> Result<Vec<Instruction>, HbcError> {
        Ok(bytes.iter().map(|&b| Instruction(vec![b])).collect())
    }

    fn assemble(&self, insts: &[Instruction]) -> Result<Vec<u8>, HbcError> {
        Ok(insts.iter().flat_map(|i| i.0.iter().copied()).collect())
    }
}
