//! Driver binary: parse an IR file, run a registered pass, print the result.

use clap::Parser;
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use hotpath::ir::parse_module;
use hotpath::pass::{self, Pass};

#[derive(Parser)]
#[command(name = "hotpath")]
#[command(about = "Run trace-formation and FP-LICM passes over hotpath IR", long_about = None)]
struct Cli {
    /// Input IR file (reads from stdin if not provided)
    input: Option<PathBuf>,

    /// Pass to run (base, static, profile, hazardprofile,
    /// fplicm-correctness, fplicm-performance)
    #[arg(long, short)]
    pass: String,

    /// Print the (possibly rewritten) IR after the pass
    #[arg(long)]
    print_ir: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    let ir_text = if let Some(input_file) = cli.input {
        fs::read_to_string(&input_file)?
    } else {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    };

    let Some(pass) = Pass::lookup(&cli.pass) else {
        eprintln!(
            "Error: unknown pass '{}' (registered: {})",
            cli.pass,
            pass::REGISTERED.join(", ")
        );
        std::process::exit(1);
    };

    let mut module = match parse_module(&ir_text) {
        Ok(module) => module,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let result = hotpath::run_pass(pass, &mut module);
    for report in &result.reports {
        println!("{report}");
    }
    if result.reports.is_empty() {
        println!(
            "{}: {}",
            pass.name(),
            if result.changed { "modified" } else { "no change" }
        );
    }
    if cli.print_ir {
        print!("{module}");
    }
    Ok(())
}
