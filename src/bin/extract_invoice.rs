use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};

use invoice_ml_server::{
    extraction::{FieldExtractor, SupplierNameHeuristic},
    ocr::{text_extractor_for, OcrBackend},
};

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Backend {
    Placeholder,
    Document,
}

impl From<Backend> for OcrBackend {
    fn from(backend: Backend) -> Self {
        match backend {
            Backend::Placeholder => OcrBackend::Placeholder,
            Backend::Document => OcrBackend::Document,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Heuristic {
    Header,
    Positional,
}

impl From<Heuristic> for SupplierNameHeuristic {
    fn from(heuristic: Heuristic) -> Self {
        match heuristic {
            Heuristic::Header => SupplierNameHeuristic::FirstHeaderLine,
            Heuristic::Positional => SupplierNameHeuristic::ThirdLine,
        }
    }
}

/// Runs text and field extraction on a local file and prints the result as JSON.
#[derive(Parser, Debug)]
#[command(name = "extract-invoice", version)]
struct Cli {
    /// Invoice document (PDF or plain text)
    file: PathBuf,

    #[arg(long, value_enum, default_value = "document")]
    backend: Backend,

    #[arg(long, value_enum, default_value = "header")]
    supplier_heuristic: Heuristic,

    /// Also print the extracted text
    #[arg(long)]
    show_text: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let text = text_extractor_for(cli.backend.into())
        .extract_text(&cli.file)
        .with_context(|| format!("failed to extract text from {}", cli.file.display()))?;
    let extracted = FieldExtractor::new(cli.supplier_heuristic.into()).extract(&text);

    if cli.show_text {
        println!("{text}");
        println!("---");
    }
    println!("{}", serde_json::to_string_pretty(&extracted)?);
    Ok(())
}
