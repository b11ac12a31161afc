use camino::Utf8PathBuf;
use clap::Parser;

use daylink::constants::DEFAULT_OUTPUT_BUFFER_BYTES;
use daylink::{
    find_tracklets, DaylinkError, DetectionCatalog, FindTrackletsConfig, IdSetStore, OutputMethod,
};

/// Pair catalog detections into tracklets under a velocity bound.
#[derive(Parser, Debug)]
#[command(name = "find_tracklets")]
struct Args {
    /// Input detection catalog (8 whitespace-separated fields per line)
    #[arg(short = 'i', long = "inFile")]
    in_file: Option<Utf8PathBuf>,

    /// Output tracklet id-set file
    #[arg(short = 'o', long = "outFile")]
    out_file: Option<Utf8PathBuf>,

    /// Maximum sky-plane velocity in degrees/day
    #[arg(short = 'v', long = "maxVelocity", default_value_t = 2.0)]
    max_velocity: f64,

    /// Minimum sky-plane velocity in degrees/day
    #[arg(short = 'm', long = "minVelocity", default_value_t = 0.0)]
    min_velocity: f64,

    /// Maximum epoch separation of a pair, in days
    #[arg(short = 'e', long = "maxDt", default_value_t = 0.0625)]
    max_dt: f64,

    /// Minimum epoch separation of a pair, in days
    #[arg(short = 'b', long = "minDt", default_value_t = 0.01)]
    min_dt: f64,
}

fn run(args: &Args, in_file: &Utf8PathBuf) -> Result<(), DaylinkError> {
    let catalog = DetectionCatalog::read_from_file(in_file)?;

    let config = FindTrackletsConfig {
        max_velocity: args.max_velocity,
        min_velocity: args.min_velocity,
        max_dt: args.max_dt,
        min_dt: args.min_dt,
        ..FindTrackletsConfig::default()
    };

    let mut store = IdSetStore::from_method(
        OutputMethod::IdsFileWithCache,
        args.out_file.as_deref(),
        DEFAULT_OUTPUT_BUFFER_BYTES,
    )?;
    find_tracklets(&catalog, &config, &mut store)
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let Some(in_file) = args.in_file.clone() else {
        eprintln!(
            "Usage: find_tracklets -i <input file> -o <output file> \
             [-v <max velocity>] [-m <min velocity>] [-e <max dt>] [-b <min dt>]"
        );
        std::process::exit(1);
    };

    if let Err(e) = run(&args, &in_file) {
        eprintln!("find_tracklets: {e}");
        std::process::exit(1);
    }
}
