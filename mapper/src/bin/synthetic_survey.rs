//! Synthetic survey mapping demo.
//!
//! Generates a uniform galaxy catalog and a denser randoms catalog inside a
//! rectangular sky patch, runs the full occupancy/density pipeline on them
//! and reports summary statistics of the resulting maps. A uniform input
//! should come back with occupancy near one inside the footprint and a
//! density contrast scattered around zero.
//!
//! Usage:
//! ```
//! RUST_LOG=info cargo run --release --bin synthetic_survey -- --galaxies 20000 --randoms 100000
//! cargo run --release --bin synthetic_survey -- --config run.json --dump-config
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use cosmology::Cosmology;
use log::info;
use mapper::{MapperConfig, SurveyMapper, SurveyMaps};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use std::sync::Arc;
use survey::{SkyPatch, SpatialCatalog, SyntheticSurvey};

#[derive(Parser, Debug)]
#[command(name = "synthetic_survey")]
#[command(about = "Map a synthetic uniform survey and report map statistics")]
#[command(version)]
struct Args {
    /// JSON mapper configuration; command-line values override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of synthetic galaxies
    #[arg(long, default_value_t = 20_000)]
    galaxies: usize,

    /// Number of synthetic random points
    #[arg(long, default_value_t = 100_000)]
    randoms: usize,

    /// Right ascension range in degrees (format: "min,max")
    #[arg(long, default_value = "150.0,200.0", value_parser = parse_range)]
    ra: (f64, f64),

    /// Declination range in degrees (format: "min,max")
    #[arg(long, default_value = "0.0,40.0", value_parser = parse_range)]
    dec: (f64, f64),

    /// Redshift range (format: "min,max")
    #[arg(long, default_value = "0.2,0.4", value_parser = parse_range)]
    redshift: (f64, f64),

    /// Photometric redshift error of every synthetic record
    #[arg(long, default_value_t = 0.005)]
    z_err: f64,

    /// Voxel edge length in Mpc
    #[arg(long)]
    voxel_length: Option<f64>,

    /// Monte-Carlo draws per averaging pass
    #[arg(long)]
    samples: Option<usize>,

    /// Worker threads per averaging pass
    #[arg(long)]
    workers: Option<usize>,

    /// Master seed for catalog generation and sampling
    #[arg(long, default_value_t = 7)]
    seed: u64,

    /// Print the effective configuration as JSON before running
    #[arg(long, default_value_t = false)]
    dump_config: bool,
}

/// Parse a range string in format "min,max"
fn parse_range(s: &str) -> Result<(f64, f64), String> {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() != 2 {
        return Err("Range must be in format 'min,max'".to_string());
    }
    let lo = parts[0]
        .trim()
        .parse::<f64>()
        .map_err(|_| "Invalid range minimum".to_string())?;
    let hi = parts[1]
        .trim()
        .parse::<f64>()
        .map_err(|_| "Invalid range maximum".to_string())?;
    Ok((lo, hi))
}

fn build_config(args: &Args, patch: &SkyPatch) -> Result<MapperConfig> {
    let mut config = match &args.config {
        Some(path) => MapperConfig::from_json_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => MapperConfig::default(),
    };
    config.solid_angle = patch.solid_angle();
    config.seed = args.seed;
    if let Some(voxel_length) = args.voxel_length {
        config.voxel_length = voxel_length;
    }
    if let Some(samples) = args.samples {
        config.occupancy_samples = samples;
        config.density_samples = samples;
    }
    if args.workers.is_some() {
        config.workers = args.workers;
    }
    config.validate()?;
    Ok(config)
}

fn summarize(maps: &SurveyMaps) {
    let occupancy = maps.occupancy.values();
    let (nx, ny, nz) = maps.grid.shape();
    let observed = occupancy.iter().filter(|&&f| f > 0.0).count();
    let complete = occupancy.iter().filter(|&&f| f > 0.9).count();
    let mean_observed =
        occupancy.iter().filter(|&&f| f > 0.0).sum::<f64>() / observed.max(1) as f64;

    println!("Grid: {nx}x{ny}x{nz} voxels of {} Mpc", maps.grid.voxel_length());
    println!(
        "Origin: ({:.1}, {:.1}, {:.1}) Mpc",
        maps.grid.origin().x,
        maps.grid.origin().y,
        maps.grid.origin().z
    );
    println!("Expected randoms density: {:.4e} Mpc^-3", maps.expected_density);
    println!(
        "Observed voxels: {observed} of {} ({complete} complete), mean occupancy {mean_observed:.3}",
        maps.grid.len()
    );
    println!(
        "Raw density contrast mean: {:.4}",
        maps.raw_density.finite_mean().unwrap_or(f64::NAN)
    );
    println!(
        "Regularized density contrast mean: {:.4}, reference contrast {:.4} (bin {})",
        maps.density.map.finite_mean().unwrap_or(f64::NAN),
        maps.density.reference_contrast(),
        maps.density.reference_bin
    );

    println!();
    println!("{:>14} {:>10} {:>12}", "occupancy", "voxels", "weight");
    for bin in maps.density.bins.iter().filter(|b| b.members > 0) {
        println!(
            "{:>6.2}-{:<7.2} {:>10} {:>12.4}{}",
            bin.lower,
            bin.upper,
            bin.members,
            bin.weight,
            if bin.default_weight { " *" } else { "" }
        );
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let patch = SkyPatch::new(args.ra.0, args.ra.1, args.dec.0, args.dec.1)?;
    let survey = SyntheticSurvey::new(patch, args.redshift.0, args.redshift.1, args.z_err)?;
    let config = build_config(&args, &patch)?;
    if args.dump_config {
        println!("{}", config.to_json()?);
    }

    let mapper = SurveyMapper::from_config(config)?;
    let cosmology = Arc::clone(mapper.cosmology());

    let mut rng = StdRng::seed_from_u64(args.seed);
    let galaxies = survey.galaxies(cosmology.as_ref(), args.galaxies, &mut rng)?;
    let randoms = survey.randoms(cosmology.as_ref(), args.randoms, &mut rng)?;
    info!(
        "Generated {} galaxies and {} randoms in {:.3} sr, D = {:.1}..{:.1} Mpc",
        galaxies.len(),
        randoms.len(),
        patch.solid_angle(),
        cosmology.comoving_distance(survey.z_min)?,
        cosmology.comoving_distance(survey.z_max)?
    );

    let galaxies = SpatialCatalog::new(galaxies, Arc::clone(&cosmology))?;
    let randoms = SpatialCatalog::new(randoms, cosmology)?;
    let maps = mapper.run_catalogs(&galaxies, &randoms)?;

    summarize(&maps);
    Ok(())
}
