mod config;

use anyhow::{bail, Context, Result};
use clap::Parser;
use config::{Command, CommonArgs, Config, Img2TilesArgs};
use log::info;
use lunamap::{
    convert_tree, discover_tiles, first_tile_per_region, AtlasCanvas, AtlasStitcher,
    ConvertOptions, ConvertSummary, StitchConfig, StitchSummary,
};
use serde::Serialize;
use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::Path,
};

#[derive(Serialize)]
struct RunReport<'a> {
    mode: &'static str,
    input_dir: &'a Path,
    output: &'a Path,
    config: &'a StitchConfig,
    summary: &'a StitchSummary,
}

fn run_stitch(args: &config::StitchArgs) -> Result<()> {
    let stitcher = AtlasStitcher::new(args.stitch_config()?)?;
    let common = &args.common;

    let tiles = discover_tiles(&common.input_dir)
        .with_context(|| format!("Failed to list tiles in {}", common.input_dir.display()))?;
    info!("Found {} tiles under {}", tiles.len(), common.input_dir.display());

    let mut canvas = stitcher.new_canvas();
    let summary = stitcher.stitch(&tiles, &mut canvas)?;

    finish("stitch", canvas, stitcher.config(), &summary, common)
}

fn run_grid(common: &CommonArgs) -> Result<()> {
    let stitcher = AtlasStitcher::new(common.stitch_config(lunamap::geo::moon::CIRCUMFERENCE_KM)?)?;

    let tiles = discover_tiles(&common.input_dir)
        .with_context(|| format!("Failed to list tiles in {}", common.input_dir.display()))?;
    let firsts = first_tile_per_region(&tiles);
    info!(
        "Found {} tiles in {} sub-regions under {}",
        tiles.len(),
        firsts.len(),
        common.input_dir.display()
    );

    let mut canvas = stitcher.new_canvas();
    let summary = stitcher.stitch_grid(&firsts, &mut canvas)?;

    finish("grid", canvas, stitcher.config(), &summary, common)
}

#[derive(Serialize)]
struct ConvertReport<'a> {
    mode: &'static str,
    input_dir: &'a Path,
    output_dir: &'a Path,
    options: &'a ConvertOptions,
    summary: &'a ConvertSummary,
}

fn run_img2tiles(args: &Img2TilesArgs) -> Result<()> {
    let options = args.convert_options();
    let summary = convert_tree(&args.input_dir, &args.output_dir, &options)
        .with_context(|| format!("Failed to convert frames in {}", args.input_dir.display()))?;
    summary.log();

    if let Some(report_path) = &args.report {
        write_report(
            report_path,
            &ConvertReport {
                mode: "img2tiles",
                input_dir: &args.input_dir,
                output_dir: &args.output_dir,
                options: &options,
                summary: &summary,
            },
        )?;
    }

    if summary.discovered == 0 {
        bail!("No .img frames found under {}", args.input_dir.display());
    }
    if summary.failed.len() == summary.discovered {
        bail!("All {} frames failed", summary.discovered);
    }
    Ok(())
}

fn finish(
    mode: &'static str,
    canvas: AtlasCanvas,
    config: &StitchConfig,
    summary: &StitchSummary,
    common: &CommonArgs,
) -> Result<()> {
    summary.log();

    if let Some(parent) = common.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    canvas
        .write_png(&common.output)
        .with_context(|| format!("Failed to write atlas {}", common.output.display()))?;
    info!("Saved atlas to {}", common.output.display());

    if let Some(report_path) = &common.report {
        write_report(
            report_path,
            &RunReport {
                mode,
                input_dir: &common.input_dir,
                output: &common.output,
                config,
                summary,
            },
        )?;
    }

    Ok(())
}

fn write_report<T: Serialize>(path: &Path, report: &T) -> Result<()> {
    let mut writer = BufWriter::new(
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
    );
    serde_json::to_writer_pretty(&mut writer, report)?;
    writer.flush()?;
    info!("Wrote run report to {}", path.display());
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::parse();
    match &config.command {
        Command::Stitch(args) => run_stitch(args),
        Command::Grid(args) => run_grid(args),
        Command::Img2Tiles(args) => run_img2tiles(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;

    #[test]
    fn img2tiles_writes_a_report() {
        let dir = tempfile::tempdir().unwrap();
        let frames = dir.path().join("frames");
        fs::create_dir_all(frames.join("rev1/a")).unwrap();
        fs::write(frames.join("rev1/a/broken.img"), b"not a label").unwrap();
        let report = dir.path().join("report.json");

        let tiles = dir.path().join("tiles");
        let config = Config::try_parse_from([
            OsStr::new("atlas_stitch"),
            OsStr::new("img2tiles"),
            OsStr::new("--input-dir"),
            frames.as_os_str(),
            OsStr::new("--output-dir"),
            tiles.as_os_str(),
            OsStr::new("--report"),
            report.as_os_str(),
        ])
        .unwrap();
        let Command::Img2Tiles(args) = config.command else {
            panic!("expected img2tiles");
        };

        let err = run_img2tiles(&args).unwrap_err();
        assert!(err.to_string().contains("All 1 frames failed"));

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&report).unwrap()).unwrap();
        assert_eq!(json["mode"], "img2tiles");
        assert_eq!(json["summary"]["discovered"], 1);
        assert_eq!(json["options"]["tile_size"], 128);
        assert!(json["summary"]["failed"][0]["image_path"]
            .as_str()
            .unwrap()
            .ends_with("broken.img"));
    }
}
