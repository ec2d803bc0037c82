use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{debug, info, warn};
use lunamap::geo::moon;
use lunamap::mesh::{write_mtl, write_obj_file};
use lunamap::{
    read_table_file, write_ply_file, ElevationGrid, LidarShot, PlyFormat, PointTransform,
    SphereMesh,
};
use rayon::prelude::*;
use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    time::Instant,
};
use walkdir::WalkDir;

#[derive(Parser, Debug, Clone)]
#[command(name = "lidar2ply", version)]
struct Args {
    /// LIDAR `.tab` tables, or directories searched for them.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    #[arg(long, env = "LIDAR_OUTPUT_DIR", default_value = "ply")]
    output_dir: PathBuf,

    /// `binary` (little-endian) or `ascii`.
    #[arg(long, default_value_t = PlyFormat::BinaryLittleEndian)]
    format: PlyFormat,

    /// Multiplies every position (km) before writing.
    #[arg(long, default_value_t = 1.0)]
    scale: f64,

    /// Write `(x, -z, -y)` for Y-up viewers.
    #[arg(long, default_value_t = false)]
    viewer_axes: bool,

    #[arg(long, default_value_t = false)]
    overwrite: bool,

    /// Also write a textured sphere displaced by the gridded elevations (OBJ).
    #[arg(long)]
    sphere_mesh: Option<PathBuf>,

    #[arg(long, default_value_t = 100.0)]
    sphere_radius: f64,

    /// Segments around and from pole to pole.
    #[arg(long, default_value_t = 50)]
    segments: u32,

    /// Relief exaggeration; 1.0 is true scale relative to the mean lunar radius.
    #[arg(long, default_value_t = 1.0)]
    relief: f64,

    /// Atlas image referenced from the mesh material (`<mesh>.mtl`).
    #[arg(long)]
    atlas: Option<PathBuf>,
}

fn is_table(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map_or(false, |ext| ext.eq_ignore_ascii_case("tab"))
}

/// Expands directories into the `.tab` files below them, in name order.
fn collect_inputs(inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for input in inputs {
        if !input.is_dir() {
            files.push(input.clone());
            continue;
        }

        for entry in WalkDir::new(input).follow_links(true).sort_by_file_name() {
            match entry {
                Ok(entry) if entry.file_type().is_file() && is_table(entry.path()) => {
                    files.push(entry.into_path());
                }
                Ok(_) => {}
                Err(err) => warn!("Skipping unreadable entry: {err}"),
            }
        }
    }
    files
}

fn output_path(input: &Path, output_dir: &Path) -> Result<PathBuf> {
    let stem = input
        .file_stem()
        .with_context(|| format!("{} has no file name", input.display()))?;
    Ok(output_dir.join(format!("{}.ply", stem.to_string_lossy())))
}

/// Converts one table. Returns its shots when a sphere mesh is requested.
fn process_one(path: &Path, args: &Args) -> Result<Vec<LidarShot>> {
    let out_path = output_path(path, &args.output_dir)?;
    let write_points = args.overwrite || !out_path.exists();

    if !write_points && args.sphere_mesh.is_none() {
        debug!("Skipping existing file: {}", out_path.display());
        return Ok(Vec::new());
    }

    let started = Instant::now();
    let table = read_table_file(path).with_context(|| format!("Failed to read {}", path.display()))?;
    if table.skipped_rows > 0 {
        debug!("{}: {} unusable rows", path.display(), table.skipped_rows);
    }

    if write_points {
        let transform = PointTransform {
            scale: args.scale,
            viewer_axes: args.viewer_axes,
        };
        let points = table.colored_points(&transform);
        write_ply_file(&out_path, &points, args.format)
            .with_context(|| format!("Failed to write {}", out_path.display()))?;

        let (lo, hi) = table.elevation_range().unwrap_or_default();
        info!(
            "OK {} -> {} ({} pts, elevation {:.3}..{:.3} km, {} ms)",
            path.display(),
            out_path.display(),
            points.len(),
            lo,
            hi,
            started.elapsed().as_millis()
        );
    } else {
        debug!("Skipping existing file: {}", out_path.display());
    }

    Ok(if args.sphere_mesh.is_some() {
        table.shots
    } else {
        Vec::new()
    })
}

fn write_sphere_mesh(path: &Path, shots: &[LidarShot], args: &Args) -> Result<()> {
    let mut mesh = SphereMesh::uv_sphere(args.sphere_radius, args.segments, args.segments);

    if !shots.is_empty() && args.relief != 0.0 {
        let grid = ElevationGrid::from_shots(shots, 180.0 / args.segments.max(2) as f64);
        let elevations = grid.elevations_for(&mesh);
        mesh.displace_by_elevation(&elevations, args.relief / moon::MEAN_RADIUS_KM);
        debug!(
            "Displaced {} vertices from {} shots ({:.2} deg cells)",
            mesh.vertex_count(),
            shots.len(),
            grid.cell_deg()
        );
    }

    let mtllib = match &args.atlas {
        Some(atlas) => {
            let mtl_path = path.with_extension("mtl");
            let mut writer = BufWriter::new(
                File::create(&mtl_path)
                    .with_context(|| format!("Failed to create {}", mtl_path.display()))?,
            );
            write_mtl(&mut writer, &atlas.to_string_lossy())?;
            writer.flush()?;
            mtl_path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
        }
        None => None,
    };

    write_obj_file(path, &mesh, mtllib.as_deref())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!(
        "Wrote sphere mesh {} ({} vertices, {} triangles)",
        path.display(),
        mesh.vertex_count(),
        mesh.triangles.len()
    );

    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    fs::create_dir_all(&args.output_dir)?;

    let files = collect_inputs(&args.inputs);
    if files.is_empty() {
        bail!("No LIDAR tables found in the given inputs");
    }
    info!("Processing {} tables...", files.len());

    let results: Vec<Result<Vec<LidarShot>>> = files
        .par_iter()
        .map(|path| process_one(path, &args))
        .collect();

    let mut failed = 0;
    let mut shots = Vec::new();
    for (path, result) in files.iter().zip(results) {
        match result {
            Ok(mut table_shots) => shots.append(&mut table_shots),
            Err(err) => {
                warn!("Error processing {}: {:#}", path.display(), err);
                failed += 1;
            }
        }
    }

    if failed == files.len() {
        bail!("All {} tables failed", failed);
    }

    if let Some(mesh_path) = &args.sphere_mesh {
        write_sphere_mesh(mesh_path, &shots, &args)?;
    }

    Ok(())
}
