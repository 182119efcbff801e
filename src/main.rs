use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use confique::Config;
use detector_pv::*;
use log::{info, LevelFilter};
use simplelog::{ColorChoice, CombinedLogger, SharedLogger, TermLogger, TerminalMode, WriteLogger};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Drive a multi-element XMAP spectrometer against the simulated IOC.
#[derive(Parser)]
#[command(name = "detector_pv")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a commented default configuration file
    Template {
        path: PathBuf,
    },
    /// Print the ROI, calibration and DXP settings of every element
    Info,
    /// Save the current settings to a ROI file
    SaveConfig {
        path: PathBuf,
    },
    /// Load ROIs from a ROI file onto every element
    RestoreRois {
        path: PathBuf,

        /// Save the resulting settings here
        #[arg(long)]
        save: Option<PathBuf>,
    },
    /// Add or replace a ROI on the first element
    AddRoi {
        name: String,
        lo: i32,
        hi: i32,

        /// Copy the first element's ROIs to the others
        #[arg(long)]
        propagate: bool,
    },
    /// Switch to MCA spectra mode and acquire one spectrum
    Spectra,
    /// Switch to SCA mapping mode
    Sca,
    /// Configure MCA mapping and the file plugin
    Mapping {
        #[arg(long, default_value = "2")]
        npulses: i64,

        #[arg(long)]
        filename: Option<String>,

        #[arg(long)]
        filenumber: Option<i64>,
    },
    /// Wait for a mapping row to finish, forcing the remaining pixels
    FinishPixels {
        #[arg(long, default_value = "2000")]
        timeout_ms: u64,
    },
}

fn make_template_config(path: &Path) -> Result<()> {
    let toml = confique::toml::template::<Conf>(confique::toml::FormatOptions::default());
    let mut file = File::create(path)
        .with_context(|| format!("Could not create {}", path.to_string_lossy()))?;
    file.write_all(toml.as_bytes())?;
    Ok(())
}

fn init_logging(settings: &LogSettings) -> Result<()> {
    let level = LevelFilter::from(settings.level);

    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        level,
        simplelog::Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )];
    if let Some(path) = &settings.log_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Could not open log file {}", path.to_string_lossy()))?;
        loggers.push(WriteLogger::new(level, simplelog::Config::default(), file));
    }
    CombinedLogger::init(loggers)?;
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Conf> {
    let mut builder = Conf::builder();
    if let Some(path) = path {
        builder = builder.file(path);
    }
    Ok(builder.load()?)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Template { path } = &cli.command {
        make_template_config(path)?;
        println!("Wrote template config to {}", path.to_string_lossy());
        return Ok(());
    }

    let config = load_config(cli.config.as_deref())?;
    init_logging(&config.log_settings)?;

    let settings = &config.xmap;
    info!(
        "Simulated XMAP {} with {} elements, file saver {}",
        settings.prefix, settings.nmca, settings.filesaver
    );
    let client: Arc<dyn PvClient> = Arc::new(SimulatedXmap::new(
        &settings.prefix,
        &settings.filesaver,
        settings.nmca,
    ));
    let mut xmap = MultiXmap::new(&settings.prefix, &settings.filesaver, settings.nmca, client)
        .with_roi_slots(settings.roi_slots)
        .with_timings(XmapTimings::from(&config.timings));

    match cli.command {
        Commands::Template { .. } => {}
        Commands::Info => {
            for line in xmap.roi_calib_info()? {
                println!("{line}");
            }
            for dxp in xmap.dxps() {
                dxp.log_settings();
            }
        }
        Commands::SaveConfig { path } => {
            xmap.write_current_config(Some(&path))?;
        }
        Commands::RestoreRois { path, save } => {
            let rois = xmap.restore_rois(&path)?;
            for roi in &rois {
                println!("{:>12}  {:5} {:5}", roi.name, roi.lo, roi.hi);
            }
            if let Some(save) = save {
                xmap.write_current_config(Some(&save))?;
            }
        }
        Commands::AddRoi {
            name,
            lo,
            hi,
            propagate,
        } => {
            if propagate {
                xmap.add_roi(&name, lo, hi)?;
            } else {
                let first = xmap.mcas().first().context("No MCA elements configured")?;
                first.add_roi(&name, lo, hi, None)?;
            }
            for (i, rois) in xmap.get_rois()?.iter().enumerate() {
                if let Some((lo, hi)) = rois.get(name.trim()) {
                    println!("mca{}: {} [{}, {}]", i + 1, name.trim(), lo, hi);
                }
            }
        }
        Commands::Spectra => {
            xmap.spectra_mode()?;
            xmap.start()?;
            for (i, mca) in xmap.mcas().iter().enumerate() {
                let spectrum = mca.spectrum()?;
                let energy = mca.get_energy()?;
                let total: f64 = spectrum.iter().sum();
                let peak = spectrum
                    .iter()
                    .enumerate()
                    .max_by(|a, b| a.1.total_cmp(b.1))
                    .map(|(ch, _)| ch)
                    .unwrap_or_default();
                println!(
                    "mca{}: {} counts, peak at channel {} ({:.1} eV)",
                    i + 1,
                    total,
                    peak,
                    energy.get(peak).copied().unwrap_or_default()
                );
            }
            xmap.stop()?;
        }
        Commands::Sca => {
            xmap.sca_mode()?;
        }
        Commands::Mapping {
            npulses,
            filename,
            filenumber,
        } => {
            let report = xmap.mca_mapping(filename.as_deref(), filenumber, npulses)?;
            println!(
                "{} pixels, {} pixels per buffer, {} buffers, ready: {}",
                report.npulses,
                report.pixels_per_buffer,
                report.num_capture,
                report.is_ready()
            );
            let plugin = xmap.file_plugin();
            println!("next file: {}", plugin.file_name_by_index(plugin.number()?)?);
        }
        Commands::FinishPixels { timeout_ms } => {
            let (finished, remaining) = xmap.finish_pixels(Duration::from_millis(timeout_ms))?;
            println!("finished: {finished}, forced pixels: {remaining}");
        }
    }

    info!("XMAP left in {} mode", xmap.mode());
    Ok(())
}
