//! Read, edit, and re-serialize Hermes Bytecode (HBC) container files at
//! format versions 86 and 96.
//!
//! The core of this crate is the container model ([`Container`]) and its
//! parser/exporter: the in-memory representation of a parsed HBC file, the
//! per-function header's compact/overflow dual encoding, the shared SLP
//! buffer tables, and the edit operations that mutate the model while
//! keeping every cross-table offset invariant intact. Disassembling or
//! assembling individual bytecode instructions is out of scope — callers
//! that need `getFunction`/`setFunction` to work with structured
//! instructions rather than raw bytes supply their own [`BytecodeTranslator`].
//!
//! ```no_run
//! use hbcedit::{parser, translator::BytecodeTranslator};
//!
//! struct NoTranslator;
//! impl BytecodeTranslator for NoTranslator {
//!     fn disassemble(&self, bytes: &[u8]) -> Result<Vec<hbcedit::translator::Instruction>, hbcedit::HbcError> {
//!         Ok(vec![hbcedit::translator::Instruction(bytes.to_vec())])
//!     }
//!     fn assemble(&self, insts: &[hbcedit::translator::Instruction]) -> Result<Vec<u8>, hbcedit::HbcError> {
//!         Ok(insts.iter().flat_map(|i| i.0.clone()).collect())
//!     }
//! }
//!
//! # fn run(bytes: &[u8]) -> Result<(), hbcedit::HbcError> {
//! let container = parser::parse(bytes)?;
//! let view = container.get_function(0, false, &NoTranslator)?;
//! println!("{} params={}", view.name, view.param_count);
//! # Ok(())
//! # }
//! ```

mod buffer;
pub mod container;
pub mod error;
pub mod exporter;
pub mod header;
pub mod parser;
pub mod slp;
pub mod translator;

pub use container::{Container, FunctionBody, FunctionPatch, FunctionView, StringTableEntry, StringTableOverflowEntry};
pub use error::HbcError;
pub use exporter::{export, export_into};
pub use header::{FileHeader, FunctionHeader, HbcVersion, SmallFuncHeader};
pub use parser::{parse, parse_with_options, ParseOptions};
pub use slp::SlpValue;
pub use translator::{BytecodeTranslator, Instruction};
