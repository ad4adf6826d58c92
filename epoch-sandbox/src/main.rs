mod adapters;
mod features;
mod matching;
mod tiling;

use adapters::{AkazeMatcher, AkazeTracker};
use epoch_pipeline::{
    save_reports, save_store, stereo_core::RegionOfInterest, CalibrationStore, EpochPipeline,
    PipelineSettings, RunContext,
};
use log::*;
use std::{error::Error, path::PathBuf};
use structopt::StructOpt;

#[derive(StructOpt, Clone)]
#[structopt(
    name = "epoch-sandbox",
    about = "Matches and tracks stereo correspondences over a sequence of epochs"
)]
struct Opt {
    /// The folder that contains one image folder per camera.
    #[structopt(short, long, default_value = "data/img")]
    images: PathBuf,
    /// The extension of the image files.
    #[structopt(short, long, default_value = "tif")]
    extension: String,
    /// The folder that contains one `<camera>.txt` calibration file per camera.
    #[structopt(short, long, default_value = "data/calib")]
    calibration: PathBuf,
    /// The identifier of the first camera.
    #[structopt(long, default_value = "p2")]
    camera0: String,
    /// The identifier of the second camera.
    #[structopt(long, default_value = "p3")]
    camera1: String,
    /// The region of interest of the first camera as `left,top,right,bottom`.
    #[structopt(long, default_value = "600,1900,5300,3600", parse(try_from_str = parse_roi))]
    roi0: RegionOfInterest,
    /// The region of interest of the second camera as `left,top,right,bottom`.
    #[structopt(long, default_value = "800,1800,5500,3500", parse(try_from_str = parse_roi))]
    roi1: RegionOfInterest,
    /// The file where settings are specified.
    ///
    /// This is in the format of `epoch_pipeline::PipelineSettings`.
    #[structopt(short, long, default_value = "epoch-settings.json")]
    settings: PathBuf,
    /// Process only this many epochs.
    #[structopt(short = "n", long)]
    epochs: Option<usize>,
    /// The folder where per-epoch results are written.
    #[structopt(short, long, default_value = "res")]
    output: PathBuf,
    /// The file the feature store is saved to.
    ///
    /// Defaults to `features.bin` in the output folder.
    #[structopt(short, long)]
    data: Option<PathBuf>,
    /// The file the epoch reports are saved to.
    ///
    /// Defaults to `reports.json` in the output folder.
    #[structopt(short, long)]
    reports: Option<PathBuf>,
}

fn parse_roi(s: &str) -> Result<RegionOfInterest, String> {
    let values = s
        .split(',')
        .map(|v| v.trim().parse::<u32>())
        .collect::<Result<Vec<u32>, _>>()
        .map_err(|e| format!("{:?} is not a list of pixel coordinates: {}", s, e))?;
    let corners: [u32; 4] = values
        .try_into()
        .map_err(|v: Vec<u32>| format!("expected 4 coordinates but found {}", v.len()))?;
    RegionOfInterest::try_from(corners).map_err(|e| e.to_string())
}

fn main() {
    pretty_env_logger::init_timed();
    let opt = Opt::from_args();
    if let Err(e) = run(opt) {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn run(opt: Opt) -> Result<(), Box<dyn Error>> {
    let settings = std::fs::File::open(&opt.settings)
        .ok()
        .and_then(|file| serde_json::from_reader(file).ok());
    if settings.is_some() {
        info!("loaded existing settings");
    } else {
        info!("used default settings");
    }
    let mut settings: PipelineSettings = settings.unwrap_or_default();
    if opt.epochs.is_some() {
        settings.epoch_count = opt.epochs;
    }

    let context = RunContext::load(
        &CalibrationStore::new(&opt.calibration),
        [opt.camera0.as_str(), opt.camera1.as_str()],
        &opt.images,
        &opt.extension,
        [opt.roi0, opt.roi1],
        &opt.output,
    )?;
    let mut pipeline =
        EpochPipeline::new(context, settings, AkazeMatcher::new(), AkazeTracker::new())?;
    info!("processing {} epochs", pipeline.epoch_count());
    let result = pipeline.run();

    // Whatever was recorded before a failure is still saved.
    std::fs::create_dir_all(&opt.output)?;
    let data = opt.data.unwrap_or_else(|| opt.output.join("features.bin"));
    let reports = opt.reports.unwrap_or_else(|| opt.output.join("reports.json"));
    info!(
        "saving {} records to {}",
        pipeline.store().len(),
        data.display()
    );
    if let Err(e) = save_store(pipeline.store(), &data) {
        error!("unable to save the feature store: {}", e);
    }
    if let Err(e) = save_reports(pipeline.reports(), &reports) {
        error!("unable to save the epoch reports: {}", e);
    }

    let summary = result?;
    for report in &summary.reports {
        info!(
            "epoch {}: {} fresh, {} tracked, {} recorded",
            report.epoch, report.fresh, report.tracked, report.recorded
        );
    }
    Ok(())
}
