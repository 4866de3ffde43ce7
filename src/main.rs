use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;

use signmatch::files::expand_patterns;
use signmatch::pipeline::default_workers;
use signmatch::report::write_matches;
use signmatch::{ObjectDetector, Pipeline, ScanContext};

/// Pixels per cell when rendering the learned filter
const FILTER_CELL_PX: u32 = 16;

#[derive(Parser)]
#[command(name = "signmatch")]
#[command(about = "List the images in which a trained HOG detector finds an object")]
struct Cli {
    /// Image files or glob patterns to scan
    #[arg(value_name = "FILE")]
    files: Vec<String>,

    /// Render the detector's learned filter and exit
    #[arg(short = 's', long, env = "SIGNMATCH_SHOW_FILTER")]
    show_filter: bool,

    /// Where --show-filter writes its rendering
    #[arg(long, value_name = "PATH", default_value = "filter.png", env = "SIGNMATCH_FILTER_IMAGE")]
    filter_image: PathBuf,

    /// Log every file as it is scanned
    #[arg(short, long, env = "SIGNMATCH_VERBOSE")]
    verbose: bool,

    /// Link matching files into this directory
    #[arg(short, long, value_name = "DIR", env = "SIGNMATCH_LINK")]
    link: Option<PathBuf>,

    /// Number of parallel workers (default: half the CPUs)
    #[arg(short = 'j', long, value_name = "N", env = "SIGNMATCH_PARALLEL")]
    parallel: Option<usize>,

    /// Trained detector file
    #[arg(short, long, value_name = "PATH", default_value = "speedlimits.svm", env = "SIGNMATCH_MODEL")]
    model: PathBuf,

    /// Times to double the image size before scanning
    #[arg(short, long, value_name = "N", default_value_t = 1, env = "SIGNMATCH_UPSAMPLE")]
    upsample: u32,

    /// Added to the detection threshold; negative values find more
    #[arg(long, value_name = "F", default_value_t = 0.0, allow_hyphen_values = true, env = "SIGNMATCH_THRESHOLD")]
    threshold: f32,

    /// Save copies of matching images with detections outlined to this directory
    #[arg(long, value_name = "DIR", env = "SIGNMATCH_ANNOTATE")]
    annotate: Option<PathBuf>,

    /// Print detection count and regions after each matching file
    #[arg(long, env = "SIGNMATCH_DETAILS")]
    details: bool,

    /// Skip images that fail to decode instead of aborting
    #[arg(long, env = "SIGNMATCH_KEEP_GOING")]
    keep_going: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    signmatch::logging::init(args.verbose);

    let detector = ObjectDetector::load(&args.model)
        .with_context(|| format!("Failed to load detector {}", args.model.display()))?;

    if args.show_filter {
        detector
            .render_filter(FILTER_CELL_PX)
            .save(&args.filter_image)
            .with_context(|| format!("Failed to save filter image {}", args.filter_image.display()))?;
        println!(
            "Detection window: {}x{} px ({}x{} cells of {} px), filter written to {}",
            detector.window_width(),
            detector.window_height(),
            detector.window_cells_wide,
            detector.window_cells_high,
            detector.cell_size,
            args.filter_image.display()
        );
        return Ok(());
    }

    let files = expand_patterns(args.files.as_slice());

    let context = ScanContext {
        verbose: args.verbose,
        link_dir: args.link,
        annotate_dir: args.annotate,
        upsample: args.upsample,
        threshold: args.threshold,
        keep_going: args.keep_going,
    };

    let pipeline = Pipeline::new(&detector)
        .with_context(context)
        .with_workers(args.parallel.unwrap_or_else(default_workers));

    let outcomes = pipeline.run(&files)?;

    let stdout = std::io::stdout();
    write_matches(&mut stdout.lock(), &outcomes, args.details)?;

    Ok(())
}
