//! jpegtrans CLI - lossless JPEG rotation with EXIF orientation sync.

use clap::{Parser, Subcommand, ValueEnum};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};

use jpegtrans_rs::{
    TransformFlags, TransformOptions, TransformOutcome, TransformRequest, inspect,
    transform_file_in_place_with_options, transform_file_to_file_with_options,
};

/// Lossless JPEG rotation, flipping and transposition
#[derive(Parser)]
#[command(name = "jpegtrans")]
#[command(version)]
#[command(about = "Lossless JPEG transforms that keep EXIF orientation and thumbnails in sync", long_about = None)]
#[command(after_help = "EXAMPLES:
    jpegtrans transform --auto *.jpg
    jpegtrans transform --rotate 90 -o rotated.jpg photo.jpg
    jpegtrans transform --flip h --backup --keep-time photo.jpg
    jpegtrans info photo.jpg")]
struct Cli {
    /// Log every pipeline step
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rotate, flip or transpose JPEG files without recompression loss
    ///
    /// Files are rewritten in place unless an output path is given.
    #[command(visible_alias = "t")]
    Transform {
        /// Input JPEG files
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output file (only with a single input)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Rotate according to the EXIF orientation tag
        #[arg(short, long, conflicts_with_all = ["rotate", "flip", "transpose", "transverse"])]
        auto: bool,

        /// Rotate clockwise by the given angle
        #[arg(short, long, value_enum, conflicts_with_all = ["flip", "transpose", "transverse"])]
        rotate: Option<Angle>,

        /// Mirror horizontally or vertically
        #[arg(short, long, value_enum, conflicts_with_all = ["transpose", "transverse"])]
        flip: Option<Axis>,

        /// Mirror across the top-left to bottom-right diagonal
        #[arg(long, conflicts_with = "transverse")]
        transpose: bool,

        /// Mirror across the top-right to bottom-left diagonal
        #[arg(long)]
        transverse: bool,

        /// Drop partial edge blocks that cannot be moved
        #[arg(long)]
        trim: bool,

        /// Fail instead of leaving partial edge blocks in place
        #[arg(long)]
        perfect: bool,

        /// Replace the JPEG comment
        #[arg(short, long)]
        comment: Option<String>,

        /// Replace the EXIF thumbnail with this JPEG file
        #[arg(long, conflicts_with = "no_thumbnail")]
        thumbnail: Option<PathBuf>,

        /// Leave the EXIF thumbnail untouched
        #[arg(long)]
        no_thumbnail: bool,

        /// Keep the EXIF orientation tag as it is
        #[arg(long)]
        keep_orientation: bool,

        /// Keep the original as <name>~ (in place only)
        #[arg(short, long)]
        backup: bool,

        /// Keep the original modification time (in place only)
        #[arg(short, long)]
        keep_time: bool,
    },

    /// Display geometry and orientation of JPEG files
    #[command(visible_alias = "i")]
    Info {
        /// Input JPEG files
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Angle {
    #[value(name = "90")]
    Deg90,
    #[value(name = "180")]
    Deg180,
    #[value(name = "270")]
    Deg270,
}

#[derive(Clone, Copy, ValueEnum)]
enum Axis {
    /// Left to right
    H,
    /// Top to bottom
    V,
}

fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    let result = match cli.command {
        Commands::Transform {
            inputs,
            output,
            auto,
            rotate,
            flip,
            transpose,
            transverse,
            trim,
            perfect,
            comment,
            thumbnail,
            no_thumbnail,
            keep_orientation,
            backup,
            keep_time,
        } => {
            let request = match (rotate, flip) {
                (Some(Angle::Deg90), _) => TransformRequest::Rotate90,
                (Some(Angle::Deg180), _) => TransformRequest::Rotate180,
                (Some(Angle::Deg270), _) => TransformRequest::Rotate270,
                (None, Some(Axis::H)) => TransformRequest::FlipHorizontal,
                (None, Some(Axis::V)) => TransformRequest::FlipVertical,
                (None, None) if transpose => TransformRequest::Transpose,
                (None, None) if transverse => TransformRequest::Transverse,
                (None, None) if auto => TransformRequest::Automatic,
                (None, None) => TransformRequest::None,
            };

            let mut flags = TransformFlags::DEFAULT;
            for (set, flag) in [
                (trim, TransformFlags::TRANSFORM_TRIM),
                (perfect, TransformFlags::TRANSFORM_PERFECT),
                (backup, TransformFlags::FILE_BACKUP),
                (keep_time, TransformFlags::FILE_KEEP_TIME),
            ] {
                if set {
                    flags.insert(flag);
                }
            }
            if no_thumbnail {
                flags.remove(TransformFlags::TRANSFORM_THUMBNAIL);
            }
            if keep_orientation {
                flags.remove(TransformFlags::UPDATE_ORIENTATION);
            }

            transform_files(&inputs, output.as_deref(), request, flags, comment, thumbnail)
        }
        Commands::Info { inputs } => show_info(&inputs),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn transform_files(
    inputs: &[PathBuf],
    output: Option<&Path>,
    request: TransformRequest,
    flags: TransformFlags,
    comment: Option<String>,
    thumbnail: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    if output.is_some() && inputs.len() != 1 {
        return Err("--output takes exactly one input file".into());
    }
    let thumbnail = thumbnail.map(fs::read).transpose()?;

    let mut options = TransformOptions::new(request, flags);
    if let Some(comment) = comment.as_deref() {
        options = options.with_comment(comment.as_bytes());
    }
    if let Some(thumbnail) = thumbnail.as_deref() {
        options = options.with_thumbnail(thumbnail);
    }

    if let Some(output) = output {
        let outcome = transform_file_to_file_with_options(&inputs[0], output, &options)?;
        report(&inputs[0], outcome);
        return Ok(());
    }

    // Every file runs its own pipeline; nothing is shared between them.
    let failures: Vec<String> = inputs
        .par_iter()
        .filter_map(|input| match transform_file_in_place_with_options(input, &options) {
            Ok(outcome) => {
                report(input, outcome);
                None
            }
            Err(e) => Some(format!("{}: {}", input.display(), e)),
        })
        .collect();

    if failures.is_empty() {
        Ok(())
    } else {
        for failure in &failures {
            eprintln!("✗ {}", failure);
        }
        Err(format!("{} of {} files failed", failures.len(), inputs.len()).into())
    }
}

fn report(input: &Path, outcome: TransformOutcome) {
    match outcome {
        TransformOutcome::Transformed => println!("✓ {}", input.display()),
        TransformOutcome::Unchanged => println!("- {} (unchanged)", input.display()),
    }
}

fn show_info(inputs: &[PathBuf]) -> Result<(), Box<dyn std::error::Error>> {
    for input in inputs {
        let data = fs::read(input)?;
        let info = inspect(&data)?;

        println!("File: {:?}", input);
        println!("  Size:        {} bytes", data.len());
        println!("  Dimensions:  {}x{}", info.width, info.height);
        println!(
            "  Mode:        {}",
            if info.progressive { "Progressive" } else { "Sequential" }
        );
        let sampling: Vec<String> = info
            .components
            .iter()
            .map(|c| format!("{}x{}", c.h_samp_factor, c.v_samp_factor))
            .collect();
        println!("  Sampling:    {}", sampling.join(" "));
        println!(
            "  Orientation: {} ({:?})",
            u16::from(info.orientation),
            info.orientation
        );
        match (info.thumbnail_len, info.thumbnail_size) {
            (Some(len), Some((w, h))) => println!("  Thumbnail:   {}x{} ({} bytes)", w, h, len),
            (Some(len), None) => println!("  Thumbnail:   {} bytes", len),
            _ => {}
        }
        if let Some(comment) = &info.comment {
            println!("  Comment:     {}", String::from_utf8_lossy(comment));
        }
    }
    Ok(())
}
