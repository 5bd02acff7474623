//! Annotated listing output
//!
//! Renders the per-line records collected in pass 2 as a human-readable
//! listing: a symbol dump followed by one `addr  bytes  source` row per
//! line.

use std::fs;
use std::io;
use std::path::Path;

use crate::assembler::{ListingRecord, SymbolTable};

/// Render the listing as a string
pub fn render(records: &[ListingRecord], symbols: &SymbolTable, source_path: &Path) -> String {
    let mut lines = Vec::new();
    lines.push("; TMEPT assembler listing".to_string());
    lines.push(format!("; Source: {}", source_path.display()));
    lines.push(String::new());

    if !symbols.is_empty() {
        lines.push("; Symbols:".to_string());
        let mut names: Vec<_> = symbols.keys().collect();
        names.sort();
        for name in names {
            let value = symbols[name];
            let rendered = if (0..=0xFFFF).contains(&value) {
                format!("0x{:04X}", value)
            } else {
                format!("{}", value)
            };
            lines.push(format!(";   {:<24} = {}  ({})", name, rendered, value));
        }
        lines.push(String::new());
    }

    lines.push(format!("{:>6}  {:<12}  Source", "Addr", "Bytes"));
    lines.push("-".repeat(72));

    for record in records {
        let hex: Vec<String> = record.bytes.iter().map(|b| format!("{:02X}", b)).collect();
        lines.push(format!(
            "  {:04X}  {:<12}  {}",
            record.address,
            hex.join(" "),
            record.line.raw()
        ));
    }

    lines.join("\n") + "\n"
}

/// Write the listing to disk
pub fn write_listing(
    records: &[ListingRecord],
    symbols: &SymbolTable,
    out_path: &Path,
    source_path: &Path,
) -> io::Result<()> {
    fs::write(out_path, render(records, symbols, source_path))
}
