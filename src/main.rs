//! OcuSight: Glaucoma risk scoring
//!
//! Main entry point: scores one patient given on the command line.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ocusight::adapters::sanitize::SanitizingMakeWriter;
use ocusight::application::EvaluationService;
use ocusight::config::{LogMode, Settings};
use ocusight::domain::{top_k, Gender, PatientInput, PredictionResult};

#[derive(Parser, Debug)]
#[command(
    name = "ocusight",
    version,
    about = "Score glaucoma risk for one patient and explain the score"
)]
struct Cli {
    /// Age in years (18-90)
    #[arg(long, default_value_t = 50)]
    age: u32,

    /// Gender code: 0 = male, 1 = female
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=1))]
    gender: u8,

    /// Intraocular pressure in mmHg (8-40)
    #[arg(long, default_value_t = 16.0)]
    iop: f64,

    /// Central corneal thickness in µm (420-650)
    #[arg(long, default_value_t = 540.0)]
    cct: f64,

    /// Heart rate in bpm (45-120)
    #[arg(long, default_value_t = 72)]
    heart_rate: u32,

    /// Systolic blood pressure in mmHg (90-180)
    #[arg(long, default_value_t = 120)]
    bp_sys: u32,

    /// Screen time in hours per day (0-14)
    #[arg(long = "screen-time", default_value_t = 5.0)]
    screen_time_h: f64,

    /// Sleep in hours per day (3-10)
    #[arg(long = "sleep", default_value_t = 7.0)]
    sleep_h: f64,

    /// Blinks per minute (5-40)
    #[arg(long = "blink-rate", default_value_t = 18)]
    blink_per_min: u32,

    /// Pupil diameter in mm (2-6)
    #[arg(long = "pupil", default_value_t = 3.2)]
    pupil_mm: f64,

    /// Model directory (overrides OCUSIGHT_MODEL_DIR)
    #[arg(long, value_name = "DIR")]
    model_dir: Option<PathBuf>,

    /// Metadata document (overrides OCUSIGHT_METADATA_PATH)
    #[arg(long, value_name = "PATH")]
    metadata: Option<PathBuf>,

    /// Number of contributions to report (overrides OCUSIGHT_TOP_K)
    #[arg(long, value_name = "K", allow_negative_numbers = true)]
    top_k: Option<i64>,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn patient(&self) -> Result<PatientInput> {
        let gender = Gender::try_from(self.gender).map_err(anyhow::Error::msg)?;
        Ok(PatientInput {
            age: self.age,
            gender,
            iop: self.iop,
            cct: self.cct,
            heart_rate: self.heart_rate,
            bp_sys: self.bp_sys,
            screen_time_h: self.screen_time_h,
            sleep_h: self.sleep_h,
            blink_per_min: self.blink_per_min,
            pupil_mm: self.pupil_mm,
        })
    }

    fn apply(&self, settings: &mut Settings) -> Result<()> {
        if let Some(dir) = &self.model_dir {
            settings.model_dir.clone_from(dir);
        }
        if let Some(path) = &self.metadata {
            settings.metadata_path = Some(path.clone());
        }
        if let Some(k) = self.top_k {
            settings.top_k = top_k(k)?;
        }
        Ok(())
    }
}

fn init_logging(settings: &Settings) -> Result<WorkerGuard> {
    // Logs never go to stdout; it carries the report.
    let (writer, guard) = match settings.log_mode {
        LogMode::File => {
            if let Some(parent) = settings.log_file.parent() {
                // Best-effort: don't fail startup just because the directory is missing.
                let _ = std::fs::create_dir_all(parent);
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&settings.log_file)
                .with_context(|| format!("Failed to open log file {:?}", settings.log_file))?;
            tracing_appender::non_blocking(file)
        }
        LogMode::Stderr => tracing_appender::non_blocking(std::io::stderr()),
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(SanitizingMakeWriter::new(writer)),
        )
        .init();

    Ok(guard)
}

fn render(result: &PredictionResult) -> String {
    let mut out = format!(
        "Risk: {} (probability {:.2}, threshold {:.2})\n{}\n",
        result.label,
        result.probability,
        result.threshold,
        result.label.description()
    );

    if !result.attributions.is_empty() {
        out.push_str(&format!("\n{:<20} {:>10} {:>10}\n", "Feature", "Value", "Impact"));
        for a in &result.attributions {
            out.push_str(&format!("{:<20} {:>10.4} {:>+10.4}\n", a.feature, a.value, a.impact));
        }
    }
    out
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::from_env();
    cli.apply(&mut settings)?;
    let _guard = init_logging(&settings)?;

    tracing::info!("Starting OcuSight...");

    let patient = cli.patient()?;
    let service = EvaluationService::bootstrap(&settings)?;
    let result = service.evaluate(&patient)?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{}", render(&result));
    }

    tracing::info!("OcuSight shutdown complete.");
    Ok(())
}
