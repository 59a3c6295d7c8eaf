use std::{env, error::Error, path::PathBuf};

const RPCL: &str = "rpcl/test.x";

fn main() -> Result<(), Box<dyn Error>> {
    println!("cargo:rerun-if-changed={RPCL}");
    let out = PathBuf::from(env::var("OUT_DIR")?).join("test_x.rs");
    onc_rpcgen::compile_file(RPCL, out)?;
    Ok(())
}
