use anyhow::{Context, Result};
use bowden_wack::{render_lines, Diagnostic, Processor, Settings};
use clap::Parser;
use fancy_regex::Regex;
use std::{
    fs,
    path::{Path, PathBuf},
};

const PROGRESS_INTERVAL: usize = 100_000;

#[derive(Parser)]
#[command(author, version)]
#[command(about = "Bowden extrusion compensation post-processor")]
#[command(after_help = "Output is written next to the input as <name>_wack2.gcode")]
#[command(arg_required_else_help = true)]
struct Args {
    #[arg(value_name = "GCODE_FILE", help = "sliced gcode file")]
    input: PathBuf,

    #[arg(short = 'c', long, value_name = "TOML_FILE", help = "settings file")]
    config: Option<PathBuf>,

    #[arg(
        long,
        value_name = "FILE",
        env = "SLIC3R_PP_OUTPUT_NAME",
        help = "base name for the output file (defaults to the input path)"
    )]
    output_name: Option<PathBuf>,

    #[arg(
        long,
        value_name = "MM",
        env = "SLIC3R_layer_height",
        help = "layer height before the first extruding move"
    )]
    layer_height: Option<f64>,

    #[arg(short, long, help = "annotate every compensated move")]
    verbose: bool,
}

fn load_settings(args: &Args) -> Result<Settings> {
    let mut settings = match &args.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    if let Some(layer_height) = args.layer_height {
        settings.default_layer_height = layer_height;
    }
    if args.verbose {
        settings.output.verbose = true;
    }
    settings.validate()?;
    Ok(settings)
}

/// `foo.gcode` -> `foo_wack2.gcode`
fn output_path(base: &Path) -> Result<PathBuf> {
    let gcode_ext = Regex::new(r"\.gcode$")?;
    let base = base.to_string_lossy();
    let stem = gcode_ext.replace(&base, "");
    Ok(PathBuf::from(format!("{stem}_wack2.gcode")))
}

fn report(diagnostic: &Diagnostic) {
    match diagnostic {
        Diagnostic::FullFlowForced { .. } => println!("{diagnostic}"),
        Diagnostic::SettlingOutOfBounds { .. } => eprintln!("Warning: {diagnostic}"),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let settings = load_settings(&args)?;

    println!("===== Wack2 compensation =====");

    let source = fs::read_to_string(&args.input)
        .with_context(|| format!("cannot read {}", args.input.display()))?;
    println!("Gcode file loaded to memory");

    let line_sep = if source.contains("\r\n") {
        "\r\n"
    } else {
        "\n"
    };

    let total = source.lines().count();
    let mut processor = Processor::new(&settings)?;
    let mut lines = Vec::with_capacity(total);

    for (i, line) in source.lines().enumerate() {
        processor.process_line(line, &mut lines);
        for diagnostic in processor.drain_diagnostics() {
            report(&diagnostic);
        }

        let done = i + 1;
        if done % PROGRESS_INTERVAL == 0 {
            println!("Processed {done} lines, {}%", done * 100 / total);
        }
    }
    println!("Completed {total} lines, 100%");

    let dest = output_path(args.output_name.as_deref().unwrap_or(&args.input))?;
    println!("Writing to {}", dest.display());

    fs::write(&dest, render_lines(&lines, line_sep))
        .with_context(|| format!("cannot write {}", dest.display()))?;

    println!("Done!");
    Ok(())
}
