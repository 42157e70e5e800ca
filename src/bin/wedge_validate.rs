use std::path::{Path, PathBuf};

use clap::Parser;
use wedge::{decode, Validator};

mod utils;
use utils::{init_logging, read_module, ConfigArgs};

#[derive(Parser, Debug)]
#[command(name = "wedge-validate")]
#[command(about = "Validate WebAssembly modules for correctness")]
#[command(long_about = "
wedge-validate - decode and validate WebAssembly modules without running them

Examples:
  # Validate multiple modules
  wedge-validate module1.wasm module2.wasm

  # Validate against the MVP feature set only
  wedge-validate module.wasm --disable reference-types --disable bulk-memory

  # Quiet mode (only show errors)
  wedge-validate module.wasm --quiet
")]
struct Args {
    /// Path(s) to WebAssembly module file(s)
    #[arg(required = true)]
    wasm_files: Vec<PathBuf>,

    /// Show verbose validation details
    #[arg(short, long)]
    verbose: bool,

    /// Quiet mode - only show errors
    #[arg(short, long)]
    quiet: bool,

    /// Enable debug output
    #[arg(short, long)]
    debug: bool,

    #[command(flatten)]
    engine: ConfigArgs,
}

fn validate_file(path: &Path, validator: &Validator, verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = read_module(path)?;
    let module = decode(&bytes)?;
    if verbose {
        println!("Validating: {} ({} bytes)", path.display(), bytes.len());
        println!("  Types: {}", module.types.len());
        println!("  Imports: {}", module.imports.len());
        println!("  Functions: {}", module.funcs.len());
        println!("  Exports: {}", module.exports.len());
    }
    validator.validate(module)?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging(args.debug);

    let config = args.engine.to_config()?;
    let validator = Validator::new(&config.features);

    let mut errors = Vec::new();
    for path in &args.wasm_files {
        match validate_file(path, &validator, args.verbose) {
            Ok(()) => {
                if !args.quiet {
                    println!("VALID: {}", path.display());
                }
            }
            Err(e) => errors.push(format!("INVALID: {} - {e}", path.display())),
        }
    }

    if !errors.is_empty() {
        eprintln!("\nValidation errors:");
        for error in &errors {
            eprintln!("{error}");
        }
    }

    if args.wasm_files.len() > 1 && !args.quiet {
        println!("\nSummary:");
        println!("  Valid: {}/{}", args.wasm_files.len() - errors.len(), args.wasm_files.len());
        if !errors.is_empty() {
            println!("  Invalid: {}/{}", errors.len(), args.wasm_files.len());
        }
    }

    if !errors.is_empty() {
        std::process::exit(1);
    }
    Ok(())
}
