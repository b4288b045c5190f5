use anyhow::{bail, Context};
use ifu_optex::{boxcar, cube, extract, CubeLoader, ExtractConfig, ModelPsf};
use std::path::PathBuf;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "ifu-optex",
    about = "Optimal (Horne 1986) spectral extraction from IFU data cubes"
)]
struct Opt {
    /// Path to the science cube NPZ archive (data, variance and wavelength arrays)
    cube: PathBuf,
    /// Path to a reference-star cube NPZ archive (data array)
    #[structopt(long, conflicts_with = "psf")]
    star: Option<PathBuf>,
    /// Path to a simulated PSF cube NPZ archive (psf array)
    #[structopt(long)]
    psf: Option<PathBuf>,
    /// Detector pixel scale [arcsec/px] (model-PSF path)
    #[structopt(long, default_value = "1")]
    pixel_scale: f64,
    /// PSF smoothing sigma [arcsec], instrument/grating-specific (model-PSF path)
    #[structopt(long, default_value = "0")]
    smooth_sigma: f64,
    /// PSF sub-pixel shift along x [px], empirical offset (model-PSF path)
    #[structopt(long, default_value = "0")]
    shift_x: f64,
    /// PSF sub-pixel shift along y [px], empirical offset (model-PSF path)
    #[structopt(long, default_value = "0")]
    shift_y: f64,
    /// Sigma-clipping threshold
    #[structopt(long, default_value = "3")]
    clip_sigma: f64,
    /// Maximum sigma-clipping iterations per slice
    #[structopt(long, default_value = "5")]
    clip_iters: usize,
    /// Save the extracted spectrum to a CSV file
    #[structopt(long)]
    csv: Option<PathBuf>,
    /// Also print the plain aperture-sum spectrum summary
    #[structopt(long)]
    boxcar: bool,
    /// Plot the extracted spectrum to an SVG file
    #[cfg(feature = "plot")]
    #[structopt(long)]
    plot: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let opt = Opt::from_args();

    let mut cube = CubeLoader::default()
        .data_path(&opt.cube)
        .load()
        .with_context(|| format!("failed to load the science cube {:?}", opt.cube))?;
    let replaced = cube.sanitize();
    if replaced > 0 {
        log::info!("Replaced {} non-finite voxels with zero", replaced);
    }

    let profile = match (&opt.star, &opt.psf) {
        (Some(star_path), None) => {
            let star = cube::load_cube(star_path, "data")
                .with_context(|| format!("failed to load the reference-star cube {:?}", star_path))?;
            ifu_optex::from_star(&star)
        }
        (None, Some(psf_path)) => {
            let psf = cube::load_cube(psf_path, "psf")
                .with_context(|| format!("failed to load the PSF cube {:?}", psf_path))?;
            ModelPsf::new(psf)
                .pixel_scale(opt.pixel_scale)
                .smooth_sigma(opt.smooth_sigma)
                .shift(opt.shift_x, opt.shift_y)
                .build(cube.n_slices())?
        }
        _ => bail!("a profile source is required: either --star or --psf"),
    };

    let config = ExtractConfig {
        sigma_clip_threshold: opt.clip_sigma,
        sigma_clip_max_iters: opt.clip_iters,
    };
    let extraction = extract(
        &cube.data,
        &cube.variance,
        &profile,
        &cube.wavelength,
        &config,
    )?;
    log::info!(
        "Masked {} voxels",
        extraction.mask.iter().filter(|&&m| m).count()
    );
    extraction.spectrum.summary();

    if opt.boxcar {
        println!("Plain aperture sum:");
        boxcar(&cube.data, &cube.wavelength)?.summary();
    }
    if let Some(path) = opt.csv {
        extraction.spectrum.to_csv(path)?;
    }
    #[cfg(feature = "plot")]
    if let Some(path) = opt.plot {
        extraction.spectrum.plot(path);
    }

    Ok(())
}
