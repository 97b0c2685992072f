use clap::{ArgAction, Parser};
use isobmff_tree::{
    FourCC, IsoBox, IsoFile, MediaDataBox, RawBox,
    known_boxes::KnownBox,
    summary::summarize,
    util::{hex_dump, read_slice},
};
use std::fs::File;
use std::io::BufReader;

#[derive(Parser, Debug)]
#[command(version, about = "ISO base media file box tree explorer")]
struct Args {
    /// MP4/ISOBMFF file path
    path: String,

    /// Resolve media data into tracks and samples
    #[arg(long, action = ArgAction::SetTrue)]
    materialize: bool,

    /// Limit recursion depth
    #[arg(long, default_value_t = 64)]
    max_depth: usize,

    /// Hex-dump the content of every box of this 4CC (e.g. --raw stsz)
    #[arg(long)]
    raw: Option<String>,

    /// Show at most this many bytes per raw dump (0 means all)
    #[arg(long, default_value_t = 256)]
    bytes: u64,

    /// Emit JSON instead of a human-readable tree
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, action = ArgAction::SetTrue)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        let level = if args.verbose { "isobmff_tree=debug" } else { "isobmff_tree=warn" };
        level.to_string()
    });
    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    let f = BufReader::new(File::open(&args.path)?);
    let mut file = IsoFile::parse(f)?;

    if args.materialize {
        for index in file.media_data_indices() {
            // A box that fails to materialize stays queryable in its raw form.
            if let Err(e) = file.materialize(index) {
                eprintln!("media data box {index}: {e}");
            }
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summarize(&file, args.max_depth))?);
        return Ok(());
    }

    for b in file.boxes() {
        print_box(b.as_ref(), 0, args.max_depth);
    }
    let dead = file.root().dead_bytes().len();
    if dead > 0 {
        println!("({dead} trailing bytes)");
    }
    println!("total {} bytes", file.size());

    if let Some(sel) = &args.raw {
        dump_raw(&args.path, file.boxes(), FourCC::encode(sel), args.bytes)?;
    }
    Ok(())
}

// ---------- Human-readable tree ----------

fn print_box(b: &dyn IsoBox, depth: usize, max_depth: usize) {
    let indent = "  ".repeat(depth);
    let label = format!(
        "{indent}{:>8} {:>10} {} {}",
        format!("{:#x}", b.offset()),
        b.size(),
        b.key(),
        KnownBox::from(b.fourcc()).full_name()
    );

    if let Some(mdat) = b.as_any().downcast_ref::<MediaDataBox>() {
        print_media_data(&label, mdat, &indent);
    } else if let Some(c) = b.as_container() {
        println!("{label} (container)");
        if depth < max_depth {
            for child in c.children() {
                print_box(child.as_ref(), depth + 1, max_depth);
            }
        }
    } else {
        println!("{label}");
    }
}

fn print_media_data(label: &str, mdat: &MediaDataBox, indent: &str) {
    if !mdat.is_materialized() {
        println!("{label} (media data, {} bytes unparsed)", mdat.content_size());
        return;
    }
    println!(
        "{label} (media data, {} samples{})",
        mdat.sample_count(),
        if mdat.is_fragment() { ", fragment" } else { "" }
    );
    if !mdat.dead_bytes_before().is_empty() {
        println!("{indent}  lead-in: {} bytes", mdat.dead_bytes_before().len());
    }
    for t in mdat.tracks() {
        println!(
            "{indent}  track {}: {} chunks, {} samples, {} bytes",
            t.id(),
            t.chunks().len(),
            t.sample_count(),
            t.size(mdat.samples())
        );
    }
    if mdat.dead_bytes_after() > 0 {
        println!("{indent}  trailing: {} bytes", mdat.dead_bytes_after());
    }
}

// ---------- Raw dump ----------

fn dump_raw(path: &str, boxes: &[Box<dyn IsoBox>], typ: FourCC, limit: u64) -> anyhow::Result<()> {
    let mut matches = Vec::new();
    collect_matches(boxes, typ, &mut matches);

    let mut f = File::open(path)?; // fresh handle, the parsed file keeps its own
    for (i, (offset, len)) in matches.into_iter().enumerate() {
        let to_read = if limit == 0 { len } else { len.min(limit) };
        let data = read_slice(&mut f, offset, to_read)?;
        println!("\n== Dump {i} ({typ}) content: offset={offset:#x}, len={to_read} ==");
        print!("{}", hex_dump(&data, offset));
    }
    Ok(())
}

/// Content ranges, in the source file, of every box of type `typ`.
fn collect_matches(boxes: &[Box<dyn IsoBox>], typ: FourCC, out: &mut Vec<(u64, u64)>) {
    for b in boxes {
        if b.fourcc() == typ {
            let len = match b.as_any().downcast_ref::<RawBox>() {
                Some(raw) => raw.content().len() as u64,
                None => b.payload_size(),
            };
            out.push((b.header().content_start(), len));
        }
        if let Some(c) = b.as_container() {
            collect_matches(c.children(), typ, out);
        }
    }
}
