use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;

use signmatch::training::dataset::Dataset;
use signmatch::training::test_detector;
use signmatch::{Trainer, TrainingOptions};

#[derive(Parser)]
#[command(name = "train_signmatch")]
#[command(about = "Train a sliding-window HOG detector from an imglab XML dataset")]
struct Cli {
    /// Training dataset (imglab XML listing images and boxes)
    #[arg(long, value_name = "XML", default_value = "signs.xml")]
    xml: PathBuf,

    /// Where to save the trained detector
    #[arg(short, long, value_name = "PATH", default_value = "speedlimits.svm")]
    output: PathBuf,

    /// SVM C: larger fits the training data harder and may overfit
    #[arg(short = 'C', value_name = "C", default_value_t = 1.0)]
    c: f32,

    /// Detection window area in pixels
    #[arg(long, value_name = "PIXELS", default_value_t = 80 * 80)]
    window_size: u32,

    /// Also train on mirrored copies (only for left/right symmetric objects)
    #[arg(long)]
    flip: bool,

    /// Training threads
    #[arg(long, value_name = "N", default_value_t = 8)]
    threads: usize,

    /// Solver stopping tolerance
    #[arg(long, value_name = "EPS", default_value_t = 0.01)]
    epsilon: f32,

    /// Held-out dataset to report testing accuracy on
    #[arg(long, value_name = "XML")]
    test_xml: Option<PathBuf>,

    /// Report training progress
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    signmatch::logging::init(args.verbose);

    let options = TrainingOptions {
        c: args.c,
        detection_window_size: args.window_size,
        add_left_right_image_flips: args.flip,
        num_threads: args.threads,
        be_verbose: args.verbose,
        epsilon: args.epsilon,
        ..Default::default()
    };

    let training = Dataset::load(&args.xml)
        .with_context(|| format!("Failed to load training set {}", args.xml.display()))?;

    let detector = Trainer::new(options)
        .train(&training)
        .context("Training failed")?;
    detector
        .save(&args.output)
        .with_context(|| format!("Failed to save detector {}", args.output.display()))?;

    println!();
    println!("Training accuracy: {}", test_detector(&detector, &training)?);

    if let Some(test_xml) = &args.test_xml {
        let testing = Dataset::load(test_xml)
            .with_context(|| format!("Failed to load testing set {}", test_xml.display()))?;
        println!("Testing accuracy: {}", test_detector(&detector, &testing)?);
    }

    Ok(())
}
