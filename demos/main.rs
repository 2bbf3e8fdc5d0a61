use hbcedit::container::{FunctionBody, FunctionPatch};
use hbcedit::translator::{BytecodeTranslator, Instruction};
use hbcedit::{exporter, parser, HbcError};

/// No real instruction set ships with this crate (see `translator`); the
/// demo only ever passes raw bytecode bytes, so `disassemble`/`assemble`
/// are never actually called.
struct RawOnly;

impl BytecodeTranslator for RawOnly {
    fn disassemble(&self, _bytes: &[u8]) -> Result<Vec<Instruction>, HbcError> {
        Err(no_translator())
    }

    fn assemble(&self, _insts: &[Instruction]) -> Result<Vec<u8>, HbcError> {
        Err(no_translator())
    }
}

fn no_translator() -> HbcError {
    HbcError::MalformedFile { offset: 0, reason: "demos/main.rs has no instruction translator".to_string() }
}

fn main() {
    let mut args = std::env::args();
    let infile = args.nth(1).expect("usage: hbcedit <in.hbc> <out.hbc>");
    let outfile = args.next().expect("usage: hbcedit <in.hbc> <out.hbc>");

    println!("Reading from {infile}");
    let bytes = std::fs::read(&infile).unwrap();

    let mut container = parser::parse(&bytes).unwrap();
    println!("version: {:?}", container.version());
    println!("functions: {}", container.function_count());

    for fid in 0..container.function_count() {
        let view = container.get_function(fid, false, &RawOnly).unwrap();
        let FunctionBody::Raw(bc) = &view.insts else { unreachable!() };
        println!(
            "  [{fid}] {} params={} registers={} bytecode_len={}",
            view.name,
            view.param_count,
            view.register_count,
            bc.len()
        );
    }

    if let Ok(view) = container.get_function(0, false, &RawOnly) {
        let FunctionBody::Raw(mut bc) = view.insts else { unreachable!() };
        bc.push(0x00);
        println!("patching function 0: appending one trailing byte");
        container
            .set_function(
                0,
                FunctionPatch {
                    param_count: view.param_count,
                    register_count: view.register_count,
                    symbol_count: view.symbol_count,
                    insts: FunctionBody::Raw(bc),
                },
                &RawOnly,
            )
            .unwrap();
    }

    println!("Writing to {outfile}");
    std::fs::write(outfile, exporter::export(&container)).unwrap();
}
