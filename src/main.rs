use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process::exit;

use anyhow::{Context, Result};
use clap::Parser;

use wilddevine::{FlowError, WildDevine, BLOCKSIZE, RATE, UNIT_SIZE};

#[derive(Parser, Debug)]
#[command(
    name = "wilddevine-demo",
    about = "Stream scl/ppg samples from a WildDevine sensor"
)]
struct Args {
    /// Seconds of data to capture
    #[arg(long, default_value_t = 10)]
    seconds: u64,
    /// Write the raw interleaved f32le stream to this file
    #[arg(long)]
    raw: Option<PathBuf>,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e}");
        exit(1);
    }
}

fn run() -> Result<()> {
    wilddevine::logging::init_rust_logging();
    let args = Args::parse();

    let mut sink: Option<BufWriter<File>> = match &args.raw {
        Some(path) => Some(BufWriter::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        )),
        None => None,
    };

    let mut element = WildDevine::new();
    element.start().context("starting acquisition")?;
    println!("Device opened, waiting for data...");

    // BLOCKSIZE frames are 100 ms of output each.
    let mut frame = vec![0u8; BLOCKSIZE];
    let mut result = Ok(());
    for n in 0..args.seconds * 10 {
        match element.fill(&mut frame) {
            Ok(meta) => {
                if let Some(sink) = sink.as_mut() {
                    sink.write_all(&frame)?;
                }
                if n % 10 == 0 {
                    let (scl, ppg) = first_sample(&frame);
                    println!(
                        "[{:>4}.{}s] offset {:>5} | locked: {:5} | version: {:?} serial: {:?} | scl {scl:.4} ppg {ppg:.4}",
                        meta.pts / 1_000_000_000,
                        (meta.pts / 100_000_000) % 10,
                        meta.offset,
                        element.pll_locked(),
                        element.version(),
                        element.serial(),
                    );
                }
            }
            Err(FlowError::Eos) => {
                println!("End of stream.");
                break;
            }
            Err(FlowError::Error) => {
                result = Err(anyhow::anyhow!("stream error, see log"));
                break;
            }
        }
    }

    let stats = element.stats();
    println!(
        "Read {} packets, {} samples ({} dropped).",
        stats.packets(),
        stats.samples(),
        stats.dropped()
    );
    println!(
        "Output: {} samples at {RATE} Hz ({} bytes/sample).",
        args.seconds * RATE,
        UNIT_SIZE
    );

    element.stop().context("stopping acquisition")?;
    if let Some(mut sink) = sink {
        sink.flush()?;
    }
    result
}

fn first_sample(frame: &[u8]) -> (f32, f32) {
    (
        f32::from_le_bytes(frame[..4].try_into().unwrap()),
        f32::from_le_bytes(frame[4..8].try_into().unwrap()),
    )
}
