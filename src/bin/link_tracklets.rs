use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use clap::Parser;

use daylink::constants::DEFAULT_OUTPUT_BUFFER_BYTES;
use daylink::output::read_id_sets;
use daylink::{
    link_tracklets, DaylinkError, DetectionCatalog, IdSetStore, LinkTrackletsConfig, OutputMethod,
    Tracklet,
};

/// Link tracklets into bounded-acceleration candidate tracks.
#[derive(Parser, Debug)]
#[command(name = "link_tracklets")]
struct Args {
    /// Detection catalog the tracklet ids refer to
    #[arg(short = 'd', long = "detsFile")]
    dets_file: Option<Utf8PathBuf>,

    /// Tracklet id-set file produced by find_tracklets
    #[arg(short = 't', long = "trackletsFile")]
    tracklets_file: Option<Utf8PathBuf>,

    /// Output track id-set file
    #[arg(short = 'o', long = "outFile")]
    out_file: Option<Utf8PathBuf>,

    /// Maximum |acceleration| along RA, in degrees/day^2
    #[arg(long = "maxRAAccel", default_value_t = 0.02)]
    max_ra_accel: f64,

    /// Maximum |acceleration| along Dec, in degrees/day^2
    #[arg(long = "maxDecAccel", default_value_t = 0.02)]
    max_dec_accel: f64,

    /// Minimum time between endpoint tracklets, in days
    #[arg(long = "minEndpointSep", default_value_t = 2.0)]
    min_endpoint_time_separation: f64,

    /// Minimum number of support tracklets per track
    #[arg(long = "minSupport", default_value_t = 1)]
    min_support_tracklets: usize,

    /// Minimum number of unique detections per track
    #[arg(long = "minDetections", default_value_t = 6)]
    min_detections_per_track: usize,

    /// Worker count (0 = available parallelism)
    #[arg(short = 'n', long = "numWorkers", default_value_t = 0)]
    num_workers: usize,

    /// Seconds to wait for each worker's completion report (0 = forever)
    #[arg(long = "workerTimeout", default_value_t = 3600)]
    worker_timeout_secs: u64,
}

fn run(args: &Args, dets_file: &Utf8PathBuf, tracklets_file: &Utf8PathBuf) -> Result<(), DaylinkError> {
    let catalog = Arc::new(DetectionCatalog::read_from_file(dets_file)?);
    let tracklets: Arc<Vec<Tracklet>> = Arc::new(
        read_id_sets(tracklets_file)?
            .into_iter()
            .map(Tracklet::from_ids)
            .collect(),
    );

    let config = LinkTrackletsConfig {
        max_ra_accel: args.max_ra_accel,
        max_dec_accel: args.max_dec_accel,
        min_endpoint_time_separation: args.min_endpoint_time_separation,
        min_support_tracklets: args.min_support_tracklets,
        min_detections_per_track: args.min_detections_per_track,
        num_workers: args.num_workers,
        worker_timeout: match args.worker_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        },
        ..LinkTrackletsConfig::default()
    };

    let mut store = IdSetStore::from_method(
        OutputMethod::IdsFileWithCache,
        args.out_file.as_deref(),
        DEFAULT_OUTPUT_BUFFER_BYTES,
    )?;
    link_tracklets(&catalog, &tracklets, &config, &mut store)
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let (Some(dets_file), Some(tracklets_file)) =
        (args.dets_file.clone(), args.tracklets_file.clone())
    else {
        eprintln!(
            "Usage: link_tracklets -d <dets file> -t <tracklets file> -o <output file> \
             [--maxRAAccel <a>] [--maxDecAccel <a>] [--minSupport <n>] [--minDetections <n>]"
        );
        std::process::exit(1);
    };

    if let Err(e) = run(&args, &dets_file, &tracklets_file) {
        eprintln!("link_tracklets: {e}");
        std::process::exit(1);
    }
}
