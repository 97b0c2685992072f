use anyhow::Context;
use clap::{ArgAction, Parser};
use isobmff_tree::IsoFile;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use tracing::info;

#[derive(Parser, Debug)]
#[command(version, about = "Parse an ISOBMFF file and write it back out")]
struct Args {
    /// Input file
    input: String,

    /// Output file
    output: String,

    /// Materialize every media data box before writing
    #[arg(long, action = ArgAction::SetTrue)]
    materialize: bool,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, action = ArgAction::SetTrue)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        let level = if args.verbose { "isobmff_tree=debug,isocopy=debug" } else { "isobmff_tree=warn,isocopy=info" };
        level.to_string()
    });
    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    let input = File::open(&args.input).with_context(|| format!("opening {}", args.input))?;
    let input_len = input.metadata()?.len();
    let mut file = IsoFile::parse(BufReader::new(input)).with_context(|| format!("parsing {}", args.input))?;

    if args.materialize {
        file.materialize_all().context("materializing media data")?;
    }

    let mut out = BufWriter::new(File::create(&args.output).with_context(|| format!("creating {}", args.output))?);
    file.write_to(&mut out)?;
    out.flush()?;

    let written = file.size();
    info!(input = input_len, output = written, "copied {} -> {}", args.input, args.output);
    if written != input_len {
        println!("sizes differ: {input_len} bytes in, {written} bytes out");
    } else {
        println!("{written} bytes written");
    }
    Ok(())
}
