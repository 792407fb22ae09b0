//! Stubs for the two subcommands this core deliberately does not implement.
//! Source compilation and target upload are the job of a separate
//! toolchain component; this binary only runs and inspects the result.

use std::path::Path;

use anyhow::Result;

const EXIT_COMPILE_NOT_IMPLEMENTED: i32 = 2;
const EXIT_UPLOAD_NOT_IMPLEMENTED: i32 = 3;

pub fn compile(source: &Path, _output: Option<&Path>) -> Result<()> {
    eprintln!(
        "error: compiling {} is not this binary's job; invoke the IEC compiler toolchain",
        source.display()
    );
    std::process::exit(EXIT_COMPILE_NOT_IMPLEMENTED);
}

pub fn upload(program: &Path, _target: Option<&str>) -> Result<()> {
    eprintln!(
        "error: uploading {} is not this binary's job; invoke the device programmer",
        program.display()
    );
    std::process::exit(EXIT_UPLOAD_NOT_IMPLEMENTED);
}
