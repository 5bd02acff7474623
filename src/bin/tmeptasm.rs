use std::path::PathBuf;
use std::process;

use clap::Parser;

use tmeptasm::assembler::{self, expr, image, listing, SymbolTable};
use tmeptasm::logging;

#[derive(Parser)]
#[clap(author, version, about = "Assembler for the TMEPT 8-bit CPU")]
struct Cli {
    /// Assembly source file
    input: PathBuf,

    /// Output binary file (default: <input>.bin)
    #[clap(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Annotated listing file
    #[clap(short = 'l', long = "listing")]
    listing: Option<PathBuf>,

    /// Pre-define a constant (may be repeated)
    #[clap(short = 'D', long = "define", value_name = "NAME[=VALUE]")]
    define: Vec<String>,

    /// Do not warn if no reset vector is defined
    #[clap(long = "no-reset-vec")]
    no_reset_vec: bool,
}

/// Parse `-D NAME[=VALUE]` pairs. Values must be integers (with the
/// usual radix prefixes); a bare name binds 1.
fn parse_defines(definitions: &[String]) -> Result<SymbolTable, String> {
    let mut predefines = SymbolTable::new();
    for definition in definitions {
        match definition.split_once('=') {
            Some((name, value)) => {
                let value = value.trim();
                let (negative, digits) = match value.strip_prefix('-') {
                    Some(rest) => (true, rest.trim()),
                    None => (false, value),
                };
                let parsed = expr::parse_int_literal(digits).map_err(|_| {
                    format!("-D {}: value \"{}\" is not an integer", name.trim(), value)
                })?;
                let parsed = if negative { -parsed } else { parsed };
                predefines.insert(name.trim().to_string(), parsed);
            }
            None => {
                predefines.insert(definition.trim().to_string(), 1);
            }
        }
    }
    Ok(predefines)
}

fn main() {
    let args = Cli::parse();

    let predefines = parse_defines(&args.define).unwrap_or_else(|message| {
        logging::error(message);
        process::exit(1);
    });

    let output_path = args
        .output
        .clone()
        .unwrap_or_else(|| args.input.with_extension("bin"));

    let output = assembler::assemble_file(&args.input, &predefines).unwrap_or_else(|e| {
        logging::error(e.to_string());
        process::exit(1);
    });

    let mut warning_count = output.warnings.len();
    for warning in &output.warnings {
        logging::warning_at(&warning.message, &warning.file, warning.line);
    }

    if !args.no_reset_vec && !output.has_reset_vector() {
        logging::warning(
            "no reset vector defined at 0xFFFC/0xFFFD; use .resetvec <addr> \
             or write to 0xFFFC/0xFFFD explicitly"
                .to_string(),
        );
        warning_count += 1;
    }

    if let Err(e) = image::write_image(&output.memory, &output_path) {
        logging::error(format!("failed to write {}: {}", output_path.display(), e));
        process::exit(1);
    }
    println!("Wrote {} bytes to {}", output.memory.len(), output_path.display());

    if let Some(listing_path) = &args.listing {
        if let Err(e) =
            listing::write_listing(&output.listing, &output.symbols, listing_path, &args.input)
        {
            logging::error(format!("failed to write {}: {}", listing_path.display(), e));
            process::exit(1);
        }
        println!("Wrote listing to {}", listing_path.display());
    }

    if warning_count > 0 {
        eprintln!("{} warning(s).", warning_count);
    }
}
