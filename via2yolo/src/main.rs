mod convert;
mod via;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use convert::ClassMap;

#[derive(Parser)]
#[command(name = "via2yolo")]
#[command(about = "Convert VIA polygon annotations into YOLO segmentation labels")]
struct Cli {
    /// VIA project export (JSON)
    #[arg(long, value_name = "FILE")]
    annotations: PathBuf,

    /// Directory searched recursively for the annotated images
    #[arg(long, value_name = "DIR")]
    images: PathBuf,

    /// Directory receiving one .txt label file per image
    #[arg(long, value_name = "DIR")]
    output: PathBuf,

    /// Extra label mapping, e.g. --class fin_rot=1 (repeatable)
    #[arg(long = "class", value_name = "NAME=ID", value_parser = parse_class)]
    classes: Vec<(String, u32)>,
}

fn parse_class(s: &str) -> Result<(String, u32), String> {
    let (name, id) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=ID, got {s:?}"))?;
    let id = id
        .trim()
        .parse()
        .map_err(|_| format!("class id must be a non-negative integer, got {id:?}"))?;
    Ok((name.trim().to_string(), id))
}

fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    let args = Cli::parse();

    let classes = ClassMap::with_overrides(args.classes);
    let summary = convert::convert(&args.annotations, &args.images, &args.output, &classes)
        .with_context(|| format!("converting {}", args.annotations.display()))?;

    log::info!(
        "{} label files written ({} regions), {} images skipped",
        summary.images_written,
        summary.regions_written,
        summary.images_skipped
    );
    let output = std::fs::canonicalize(&args.output).unwrap_or(args.output);
    println!("Annotations saved to {}", output.display());
    Ok(())
}
