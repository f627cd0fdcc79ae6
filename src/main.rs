//! CLI entry point for the v3bw plotting tools.
//!
//! Provides subcommands for dumping the (fingerprint, bandwidth) pairs of
//! v3bw files, comparing two files across a multi-page plot, and plotting
//! any number of files sorted by the first one's values.

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{ArgAction, CommandFactory, Parser, Subcommand};
use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::PathBuf;
use tracing::{debug, info};
use v3bw_plot::dataset::{Dataset, LabeledInput};
use v3bw_plot::logging;
use v3bw_plot::output::{OutputFormat, PairWriter, is_broken_pipe};
use v3bw_plot::parser::read_pairs;
use v3bw_plot::plot::{PlotOptions, ScatterOptions, render_comparison, render_sorted_scatter};

#[derive(Parser)]
#[command(name = "v3bw_plot")]
#[command(about = "Extract and compare relay bandwidths from v3bw files", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the (fingerprint, bandwidth) pairs of one or more v3bw files.
    ///
    /// Output from several files is concatenated with no marker between them.
    Parse {
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Plain)]
        format: OutputFormat,
    },
    /// Plot two v3bw files against each other
    Compare {
        /// A file to read values from and the label for its points. Must be
        /// given exactly twice.
        #[arg(
            short,
            long,
            num_args = 2,
            value_names = ["FNAME", "LABEL"],
            action = ArgAction::Append
        )]
        input: Vec<String>,

        /// Maximum X value on the graph with the 45 degree line
        #[arg(long)]
        xmax_45deg: Option<f64>,

        /// Maximum Y value on the graph with the 45 degree line
        #[arg(long)]
        ymax_45deg: Option<f64>,

        /// Maximum Y value on the graphs sorted by one input's values
        #[arg(long)]
        ymax_sorted_curve: Option<f64>,

        /// Radius of scatter plot points
        #[arg(short, long, default_value_t = 2)]
        size: u32,

        /// SVG file to write
        #[arg(short, long, default_value = "temp.svg")]
        output: PathBuf,
    },
    /// Scatter any number of v3bw files, sorted by the first file's values
    Scatter {
        /// A file to read values from and the label for its points. Can be
        /// given more than once.
        #[arg(
            short,
            long,
            num_args = 2,
            value_names = ["FNAME", "LABEL"],
            action = ArgAction::Append
        )]
        input: Vec<String>,

        /// SVG file to write
        #[arg(short, long, default_value = "temp.svg")]
        output: PathBuf,

        /// X axis label
        #[arg(short = 'x', long, default_value = "Relay #")]
        xlabel: String,

        /// Y axis label
        #[arg(short = 'y', long, default_value = "\"Bandwidth\" units (thousands)")]
        ylabel: String,

        /// Plot title
        #[arg(short, long, default_value = "Correlation of various bwscanning systems")]
        title: String,

        #[arg(long, default_value_t = 0.0)]
        xmin: f64,

        #[arg(long, default_value_t = 0.0)]
        ymin: f64,

        #[arg(long)]
        xmax: Option<f64>,

        #[arg(long)]
        ymax: Option<f64>,

        /// Radius of scatter plot points
        #[arg(short, long, default_value_t = 2)]
        size: u32,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let _log_guard = logging::init()?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Parse { files, format } => match print_pairs(&files, format) {
            Err(e) if is_broken_pipe(&e) => {
                debug!("Output closed early");
            }
            result => {
                result?;
            }
        },
        Commands::Compare {
            input,
            xmax_45deg,
            ymax_45deg,
            ymax_sorted_curve,
            size,
            output,
        } => {
            let inputs = labeled_inputs(&input, Some(2));
            let datasets = Dataset::load_all(&inputs)?;
            let opts = PlotOptions {
                point_size: size,
                xmax_45deg,
                ymax_45deg,
                ymax_sorted_curve,
                ..Default::default()
            };
            render_comparison(&output, &datasets[0], &datasets[1], &opts)?;
            info!(output = %output.display(), "Plots written");
        }
        Commands::Scatter {
            input,
            output,
            xlabel,
            ylabel,
            title,
            xmin,
            ymin,
            xmax,
            ymax,
            size,
        } => {
            let inputs = labeled_inputs(&input, None);
            let datasets = Dataset::load_all(&inputs)?;
            let opts = ScatterOptions {
                title,
                x_desc: xlabel,
                y_desc: ylabel,
                xmin,
                ymin,
                xmax,
                ymax,
                point_size: size,
                ..Default::default()
            };
            render_sorted_scatter(&output, &datasets, &opts)?;
            info!(output = %output.display(), "Plot written");
        }
    }

    Ok(())
}

/// Validates `--input` values, exiting with a usage error before any file is
/// touched.
fn labeled_inputs(values: &[String], expected: Option<usize>) -> Vec<LabeledInput> {
    match LabeledInput::from_args(values, expected) {
        Ok(inputs) => inputs,
        Err(e) => Cli::command()
            .error(ErrorKind::WrongNumberOfValues, format!("{e}. Try --help"))
            .exit(),
    }
}

/// Streams every file's pairs to stdout, one file at a time.
fn print_pairs(files: &[PathBuf], format: OutputFormat) -> Result<()> {
    let stdout = io::stdout();
    let mut out = PairWriter::new(BufWriter::new(stdout.lock()), format);

    for path in files {
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        out.write_all(read_pairs(BufReader::new(file)))
            .with_context(|| format!("reading {}", path.display()))?;
    }

    let count = out.finish()?;
    debug!(count, files = files.len(), "Pairs printed");
    Ok(())
}
