use std::path::PathBuf;

use clap::Parser;
use wedge::module::ImportDesc;
use wedge::types::ExternKind;
use wedge::{decode, GlobalType, Limits, Module};

mod utils;
use utils::{init_logging, read_module};

#[derive(Parser, Debug)]
#[command(name = "wedge-inspect")]
#[command(about = "Inspect WebAssembly modules to understand their structure")]
#[command(long_about = "
wedge-inspect - print the structure of a WebAssembly module

Examples:
  # Basic inspection
  wedge-inspect module.wasm

  # Show only exports
  wedge-inspect module.wasm --exports-only

  # Verbose output with function bodies sizes and custom sections
  wedge-inspect module.wasm --verbose
")]
struct Args {
    /// Path to the WebAssembly module file (.wasm or .wat)
    wasm_file: PathBuf,

    /// Show only exports
    #[arg(long)]
    exports_only: bool,

    /// Show only imports
    #[arg(long)]
    imports_only: bool,

    /// Show verbose output with internal details
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug output
    #[arg(short, long)]
    debug: bool,
}

fn format_limits(limits: &Limits) -> String {
    match limits.max {
        Some(max) => format!("min {}, max {max}", limits.min),
        None => format!("min {}", limits.min),
    }
}

fn format_global(ty: &GlobalType) -> String {
    if ty.mutable { format!("mut {}", ty.ty) } else { ty.ty.to_string() }
}

fn print_imports(module: &Module) {
    if module.imports.is_empty() {
        println!("Imports: none");
        return;
    }
    println!("Imports:");
    for import in &module.imports {
        let desc = match &import.desc {
            ImportDesc::Func(t) => match module.types.get(*t as usize) {
                Some(ty) => format!("func {ty}"),
                None => format!("func type {t}"),
            },
            ImportDesc::Table(t) => format!("table {} ({})", t.elem, format_limits(&t.limits)),
            ImportDesc::Memory(m) => format!("memory ({})", format_limits(&m.limits)),
            ImportDesc::Global(g) => format!("global {}", format_global(g)),
        };
        println!("  {}.{}: {desc}", import.module, import.field);
    }
}

fn print_exports(module: &Module) {
    if module.exports.is_empty() {
        println!("Exports: none");
        return;
    }
    println!("Exports:");
    for export in &module.exports {
        match (export.kind, module.func_type(export.index)) {
            (ExternKind::Func, Some(ty)) => println!("  {} (func {}) {ty}", export.name, export.index),
            (kind, _) => println!("  {} ({kind} {})", export.name, export.index),
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging(args.debug);

    let bytes = read_module(&args.wasm_file)?;
    println!("Module: {}", args.wasm_file.display());
    println!("Size: {} bytes", bytes.len());
    println!();

    let module = decode(&bytes).map_err(|e| format!("Failed to decode module: {e}"))?;

    if args.imports_only {
        print_imports(&module);
        return Ok(());
    }
    if args.exports_only {
        print_exports(&module);
        return Ok(());
    }

    println!("Types:");
    for (i, ty) in module.types.iter().enumerate() {
        println!("  [{i}] {ty}");
    }
    println!();
    print_imports(&module);
    println!();
    print_exports(&module);
    println!();

    let imported = module.num_imported_funcs();
    println!("Functions: {} imported, {} defined", imported, module.funcs.len());
    if args.verbose {
        for (i, body) in module.code.iter().enumerate() {
            let idx = imported + i as u32;
            let ty = module.func_type(idx).map(|t| t.to_string()).unwrap_or_default();
            println!("  [{idx}] {ty} locals: {}, instructions: {}", body.locals.len(), body.body.len());
        }
    }
    if let Some(start) = module.start {
        println!("Start function: {start}");
    }

    for (i, mem) in module.memories.iter().enumerate() {
        println!("Memory [{i}]: {}", format_limits(&mem.limits));
    }
    for (i, table) in module.tables.iter().enumerate() {
        println!("Table [{i}]: {} ({})", table.elem, format_limits(&table.limits));
    }
    for (i, global) in module.globals.iter().enumerate() {
        println!("Global [{i}]: {}", format_global(&global.ty));
    }
    println!("Element segments: {}", module.elements.len());
    println!("Data segments: {}", module.data.len());

    if !module.customs.is_empty() {
        println!("Custom sections:");
        for custom in &module.customs {
            println!("  {} ({} bytes)", custom.name, custom.data.len());
        }
    }
    Ok(())
}
