use anyhow::{Context, Result, bail};
use burst_merge_rs::image_pipeline::merge::parse_option;
use burst_merge_rs::image_pipeline::{BurstToTiffPipeline, MergeConfig, TiffConfig};
use burst_merge_rs::logger;

use tracing::info;

const USAGE: &str = "usage: burst_merge_rs [--option=value ...] <output.tiff> <frame> <frame>...

options:
  --algorithm=Fast|HigherQuality
  --tile-size=Small|Medium|Large
  --search-distance=Small|Medium|Large
  --noise-reduction=1..23
  --exposure-control=Off|LinearFullRange|Linear1EV|Curve0EV|Curve1EV
  --bit-depth=Native|16bit
  --reference=<frame index>
  --compression=None|Lzw|DeflateFast|DeflateBalanced|DeflateBest
  --threads=<count>";

struct Args {
    merge: MergeConfig,
    tiff: TiffConfig,
    output: String,
    frames: Vec<String>,
}

fn parse_args(args: impl Iterator<Item = String>) -> Result<Args> {
    let mut merge = MergeConfig::builder();
    let mut tiff = TiffConfig::builder();
    let mut positional = Vec::new();

    for arg in args {
        let Some(option) = arg.strip_prefix("--") else {
            positional.push(arg);
            continue;
        };
        let (name, value) = option
            .split_once('=')
            .with_context(|| format!("option --{option} needs a value\n\n{USAGE}"))?;
        merge = match name {
            "algorithm" => merge.algorithm(parse_option("algorithm", value)?),
            "tile-size" => merge.tile_size(parse_option("tile-size", value)?),
            "search-distance" => merge.search_distance(parse_option("search-distance", value)?),
            "noise-reduction" => merge.noise_reduction(parse_option("noise-reduction", value)?),
            "exposure-control" => merge.exposure_control(parse_option("exposure-control", value)?),
            "bit-depth" => merge.output_bit_depth(parse_option("bit-depth", value)?),
            "reference" => merge.reference_index(parse_option("reference", value)?),
            "threads" => merge.threads(Some(parse_option("threads", value)?)),
            "compression" => {
                tiff = tiff.compression(parse_option("compression", value)?);
                merge
            }
            _ => bail!("unknown option --{name}\n\n{USAGE}"),
        };
    }

    if positional.len() < 3 {
        bail!("{USAGE}");
    }
    let output = positional.remove(0);
    Ok(Args {
        merge: merge.build(),
        tiff: tiff.build(),
        output,
        frames: positional,
    })
}

fn main() -> Result<()> {
    logger::init();

    let args = parse_args(std::env::args().skip(1))?;
    info!(
        frames = args.frames.len(),
        algorithm = %args.merge.algorithm,
        tile_size = %args.merge.tile_size,
        search_distance = %args.merge.search_distance,
        noise_reduction = args.merge.noise_reduction,
        "Starting burst merge"
    );

    let pipeline = BurstToTiffPipeline::new(args.merge, args.tiff)?;
    let scale = pipeline
        .convert_files(&args.frames, &args.output)
        .with_context(|| format!("merging into {}", args.output))?;

    match scale {
        Some(scale) => info!(output = %args.output, scale, "Merge written with 16-bit scaling"),
        None => info!(output = %args.output, "Merge written"),
    }
    Ok(())
}
