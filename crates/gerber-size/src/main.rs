use clap::Parser;
use gerber_size::error::SizeError;
use gerber_size::{identify_from_filename, measure_board, measure_file, LayerSize};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "gerber-size", about = "Measure the extent of Gerber files as JSON")]
struct Cli {
    /// Gerber files, or a directory holding them
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Combine all inputs into one board size (outline first, else union of layers)
    #[arg(long)]
    board: bool,

    /// Report inch files in millimeters
    #[arg(long)]
    mm: bool,

    /// Output JSON file (stdout if not specified)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,
}

/// Expand directories into their regular files, sorted by name.
fn collect_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>, SizeError> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut entries = std::fs::read_dir(input)?
                .map(|entry| entry.map(|e| e.path()))
                .collect::<Result<Vec<_>, _>>()?;
            entries.retain(|p| p.is_file());
            entries.sort();
            files.extend(entries);
        } else {
            files.push(input.clone());
        }
    }
    Ok(files)
}

fn measure_one(path: &Path, mm: bool) -> Result<LayerSize, SizeError> {
    let size = measure_file(path)?;
    Ok(LayerSize {
        path: path.to_path_buf(),
        kind: identify_from_filename(path),
        size: Some(if mm { size.to_millimeters() } else { size }),
    })
}

fn to_json<T: Serialize>(value: &T, pretty: bool) -> serde_json::Result<String> {
    if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
}

fn run(cli: &Cli) -> Result<String, Box<dyn std::error::Error>> {
    let files = collect_inputs(&cli.inputs)?;

    let json = if cli.board {
        to_json(&measure_board(&files)?, cli.pretty)?
    } else if let [single] = files.as_slice() {
        let size = measure_file(single)?;
        let size = if cli.mm { size.to_millimeters() } else { size };
        to_json(&size, cli.pretty)?
    } else {
        let sizes = files
            .iter()
            .map(|f| measure_one(f, cli.mm))
            .collect::<Result<Vec<_>, _>>()?;
        to_json(&sizes, cli.pretty)?
    };
    Ok(json)
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let json = match run(&cli) {
        Ok(json) => json,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    if let Some(output_path) = &cli.output {
        if let Err(e) = std::fs::write(output_path, &json) {
            eprintln!("Error writing {}: {e}", output_path.display());
            std::process::exit(1);
        }
        eprintln!("Written to {}", output_path.display());
    } else {
        println!("{json}");
    }
}
