use std::path::PathBuf;

use clap::Parser;
use tracing::debug;
use wedge::{Error, Value, Vm};

mod utils;
use utils::{init_logging, read_module, ConfigArgs};

#[derive(Parser, Debug)]
#[command(name = "wedge-run")]
#[command(about = "Execute WebAssembly modules")]
#[command(long_about = "
wedge-run - run an exported function of a WebAssembly module

Examples:
  # Run the default _start function (if exists)
  wedge-run module.wasm

  # Invoke a specific function with arguments (i32, i64, f32, f64 supported)
  wedge-run module.wasm --invoke add --args 10:i32 20:i32

  # Text format modules are accepted too
  wedge-run fib.wat --invoke fib --args 20:i32

  # Print results as JSON, with MVP features only
  wedge-run module.wasm --invoke main --json --disable multi-value --disable bulk-memory
")]
struct Args {
    /// Path to the WebAssembly module file (.wasm or .wat)
    wasm_file: PathBuf,

    /// Function to invoke (defaults to _start)
    #[arg(short, long)]
    invoke: Option<String>,

    /// Arguments to pass to the function (format: value:type, e.g., 42:i32, 3.14:f32)
    #[arg(short, long, value_delimiter = ' ', num_args = 0..)]
    args: Vec<String>,

    /// Enable debug output
    #[arg(short, long)]
    debug: bool,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    /// List all exported functions instead of running
    #[arg(short, long)]
    list_exports: bool,

    #[command(flatten)]
    engine: ConfigArgs,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging(args.debug);

    let bytes = read_module(&args.wasm_file)?;
    debug!(path = %args.wasm_file.display(), size = bytes.len(), "loaded module");

    let mut vm = Vm::new(args.engine.to_config()?);
    vm.load_wasm_from_bytes(&bytes)?;
    vm.validate()?;
    vm.instantiate()?;

    if args.list_exports {
        println!("Exported functions:");
        for (name, ty) in vm.exported_functions()? {
            println!("  {name} {ty}");
        }
        return Ok(());
    }

    let func_name = args.invoke.as_deref().unwrap_or("_start");
    let params = vm.get_function_type(func_name)?.params.clone();
    let values = args
        .args
        .iter()
        .map(|a| Value::parse(a).ok_or_else(|| format!("Invalid argument '{a}'. Expected format: value:type (e.g., 42:i32)")))
        .collect::<Result<Vec<_>, _>>()?;
    if values.len() != params.len() {
        return Err(format!(
            "Function '{func_name}' expects {} arguments, but {} provided",
            params.len(),
            values.len()
        )
        .into());
    }

    let results = match vm.execute(func_name, &values) {
        Ok(results) => results,
        Err(Error::Trap(trap)) => return Err(format!("Execution trapped: {trap}").into()),
        Err(e) => return Err(e.into()),
    };

    if args.json {
        println!("{}", serde_json::to_string(&results)?);
    } else if !results.is_empty() {
        println!("Result:");
        for (i, result) in results.iter().enumerate() {
            println!("  [{i}] {result}");
        }
    }
    Ok(())
}
