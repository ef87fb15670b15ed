use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};
use detection_waypoints::config::PipelineConfig;
use detection_waypoints::io::write_report;
use detection_waypoints::pipeline::{PlanPaths, run_kmz, run_plan, run_track};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Pipeline configuration JSON, defaults are used when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Match detections across images and write per-object label files
    Track {
        /// Image folder
        #[arg(short, long)]
        images: PathBuf,

        /// Detector label folder, one `<image stem>.txt` per image
        #[arg(short, long)]
        detections: PathBuf,

        /// Output folder for track labels and tracks.json
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Locate tracked objects and write a waypoint mission
    Plan {
        /// Geotagged image folder
        #[arg(short, long)]
        images: PathBuf,

        /// Track label folder written by `track`
        #[arg(short, long)]
        labels: PathBuf,

        /// COLMAP text model folder (cameras.txt, images.txt)
        #[arg(short, long)]
        reconstruction: PathBuf,

        /// Mission template, folder or .kmz
        #[arg(short, long)]
        template: PathBuf,

        /// Output .kmz
        #[arg(short, long)]
        output: PathBuf,

        /// Optional JSON run report
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Write a waypoint mission from a JSON waypoint list
    Kmz {
        /// Waypoint list JSON
        #[arg(short, long)]
        waypoints: PathBuf,

        /// Mission template, folder or .kmz
        #[arg(short, long)]
        template: PathBuf,

        /// Output .kmz
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let config = PipelineConfig::load(args.config.as_deref())?;
    let now = Instant::now();

    match args.command {
        Commands::Track {
            images,
            detections,
            output,
        } => {
            let table = run_track(&images, &detections, &output, &config)?;
            log::info!("{} tracks written to {:?}", table.len(), output);
        }
        Commands::Plan {
            images,
            labels,
            reconstruction,
            template,
            output,
            report,
        } => {
            let paths = PlanPaths {
                images,
                labels,
                reconstruction,
                template,
                output,
            };
            let plan_report = run_plan(&paths, &config)?;
            log::info!(
                "{} waypoints written to {:?}, {} objects failed",
                plan_report.waypoints.len(),
                paths.output,
                plan_report.failures.len()
            );
            if let Some(report) = report {
                write_report(&report, &plan_report)?;
            }
        }
        Commands::Kmz {
            waypoints,
            template,
            output,
        } => {
            let count = run_kmz(&waypoints, &template, &output, &config)?;
            log::info!("{} waypoints written to {:?}", count, output);
        }
    }

    log::info!("done in {:.3} sec", now.elapsed().as_secs_f64());
    Ok(())
}
