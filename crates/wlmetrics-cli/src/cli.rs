//! wlmetrics CLI - run the position and orientation filters over recorded
//! or simulated IMU sessions.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use nalgebra::Vector3;
use tracing::{debug, info};
use wlmetrics_core::intervals::active_ranges;
use wlmetrics_core::kalman::layout;
use wlmetrics_core::{Quaternion, StaticDetectingPositionFilter};
use wlmetrics_sim::{
    generate_sensor_data, params, run_orientation_filter, run_position_filter, simulate, AhrsKind,
    FilterConfig, OrientationRun, PositionRun, ScenarioParams, SensorConfig, SimResult,
};

use crate::io;

/// Parses `args` (program name first) and runs the selected command.
pub fn run_cli_main(args: &[&str]) -> Result<()> {
    let args = Args::try_parse_from(args)?;
    run(args)
}

#[derive(Parser, Debug)]
#[command(name = "wlmetrics")]
#[command(about = "IMU orientation and position estimation")]
#[command(version)]
pub struct Args {
    /// Filter configuration (JSON). Command-line flags take precedence.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Track position with zero-velocity updates during static intervals
    Position(PositionArgs),
    /// Estimate orientation with Madgwick or Mahony
    Orientation(OrientationArgs),
    /// Simulate a scenario, generate sensor data and score both filters
    Simulate(SimulateArgs),
    /// Print the effective filter configuration as JSON
    DumpConfig,
}

#[derive(clap::Args, Debug)]
pub struct InputArgs {
    /// Input CSV with a header row
    pub input: PathBuf,

    /// Output CSV (stdout if omitted)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Sampling frequency (Hz); estimated from the timestamps if omitted
    #[arg(short, long)]
    pub frequency: Option<f64>,
}

#[derive(clap::Args, Debug)]
pub struct PositionArgs {
    #[command(flatten)]
    pub io: InputArgs,

    #[arg(long)]
    pub threshold: Option<f64>,

    #[arg(long)]
    pub static_time: Option<f64>,

    /// Treat the recording as starting at rest
    #[arg(long)]
    pub start_static: bool,
}

#[derive(clap::Args, Debug)]
pub struct OrientationArgs {
    #[command(flatten)]
    pub io: InputArgs,

    #[arg(long, value_enum)]
    pub ahrs: Option<AhrsArg>,

    #[arg(long)]
    pub beta: Option<f64>,

    #[arg(long)]
    pub kp: Option<f64>,

    #[arg(long)]
    pub ki: Option<f64>,

    /// Ignore magnetometer columns
    #[arg(long)]
    pub imu_only: bool,
}

#[derive(clap::Args, Debug)]
pub struct SimulateArgs {
    /// Output directory
    #[arg(short, long, default_value = "output")]
    pub output_dir: PathBuf,

    /// Output file format
    #[arg(long, value_enum, default_value = "csv")]
    pub format: OutputFormat,

    /// Scenario file (JSON); the built-in walk-and-turn if omitted
    #[arg(long)]
    pub scenario: Option<PathBuf>,

    /// Overrides the scenario sampling frequency (Hz)
    #[arg(long)]
    pub frequency: Option<f64>,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    #[arg(long, default_value_t = 1.0)]
    pub noise_scale: f64,

    /// Simulate without a magnetometer
    #[arg(long)]
    pub no_mag: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AhrsArg {
    Madgwick,
    Mahony,
}

impl From<AhrsArg> for AhrsKind {
    fn from(arg: AhrsArg) -> Self {
        match arg {
            AhrsArg::Madgwick => AhrsKind::Madgwick,
            AhrsArg::Mahony => AhrsKind::Mahony,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Csv,
    Json,
}

pub fn run(args: Args) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    match args.command {
        Command::Position(cmd) => run_position(config, &cmd),
        Command::Orientation(cmd) => run_orientation(config, &cmd),
        Command::Simulate(cmd) => run_simulate(&config, &cmd),
        Command::DumpConfig => {
            println!("{}", serde_json::to_string_pretty(&config.to_json())?);
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Recorded sessions
// ---------------------------------------------------------------------------

fn run_position(mut config: FilterConfig, args: &PositionArgs) -> Result<()> {
    if let Some(threshold) = args.threshold {
        config.threshold = threshold;
    }
    if let Some(static_time) = args.static_time {
        config.static_time = static_time;
    }
    config.start_static |= args.start_static;
    config.validate()?;

    let rec = io::read_recording_path(&args.io.input)?;
    let frequency = resolve_frequency(args.io.frequency, &rec.time)?;

    let mut filter = StaticDetectingPositionFilter::with_config(config.position_config(frequency));
    let trajectory = filter.filter(&rec.accel)?;

    let static_ranges = active_ranges(&trajectory.static_mask);
    for range in &static_ranges {
        debug!(
            start = rec.time[*range.start()],
            end = rec.time[*range.end()],
            "static interval"
        );
    }
    info!(
        samples = trajectory.len(),
        frequency,
        static_intervals = static_ranges.len(),
        "position filter complete"
    );

    write_to(args.io.output.as_deref(), |w| {
        io::write_position(w, &rec.time, &trajectory)
    })
}

fn run_orientation(mut config: FilterConfig, args: &OrientationArgs) -> Result<()> {
    if let Some(ahrs) = args.ahrs {
        config.ahrs = ahrs.into();
    }
    if let Some(beta) = args.beta {
        config.beta = beta;
    }
    if let Some(kp) = args.kp {
        config.kp = kp;
    }
    if let Some(ki) = args.ki {
        config.ki = ki;
    }
    config.imu_only |= args.imu_only;
    config.validate()?;

    let rec = io::read_recording_path(&args.io.input)?;
    let frequency = resolve_frequency(args.io.frequency, &rec.time)?;

    let mut samples = rec.imu_samples()?;
    if config.imu_only {
        samples.iter_mut().for_each(|s| s.mag = None);
    }
    let mut ahrs = config.build_ahrs(frequency, Quaternion::identity());
    let orientation = ahrs.filter(&samples)?;

    info!(
        samples = orientation.len(),
        frequency,
        ahrs = ?config.ahrs,
        "orientation filter complete"
    );

    write_to(args.io.output.as_deref(), |w| {
        io::write_orientation(w, &rec.time, &orientation)
    })
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

fn run_simulate(config: &FilterConfig, args: &SimulateArgs) -> Result<()> {
    println!("wlmetrics simulation");
    println!("====================\n");

    let mut scenario = match &args.scenario {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str::<ScenarioParams>(&text)
                .with_context(|| format!("invalid scenario in {}", path.display()))?
        }
        None => ScenarioParams::default(),
    };
    if let Some(frequency) = args.frequency {
        scenario.frequency = frequency;
    }
    params::sampling::FREQUENCY.check(scenario.frequency)?;

    let defaults = SensorConfig::default();
    let sensor_config = SensorConfig {
        noise_scale: args.noise_scale,
        seed: args.seed,
        magnetic_field: if args.no_mag {
            None
        } else {
            defaults.magnetic_field
        },
        ..defaults
    };

    let sim = simulate(&scenario);
    print_sim_stats(&sim);

    let data = generate_sensor_data(&sim, &sensor_config)?;
    let position = run_position_filter(&sim, &data, config)?;
    let orientation = run_orientation_filter(&sim, &data, config)?;
    print_filter_stats(&position, &orientation);

    std::fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("failed to create {}", args.output_dir.display()))?;
    let path = match args.format {
        OutputFormat::Csv => {
            let path = args.output_dir.join("simulation.csv");
            write_simulation_csv(&path, &sim, &position, &orientation)?;
            path
        }
        OutputFormat::Json => {
            let path = args.output_dir.join("summary.json");
            let summary = serde_json::json!({
                "scenario": scenario,
                "sensor": sensor_config,
                "filter": config.to_json(),
                "position": {
                    "rmse": position.position_error.rmse,
                    "max": position.position_error.max,
                    "velocity_rmse": position.velocity_error.rmse,
                    "static_intervals": position
                        .static_ranges
                        .iter()
                        .map(|r| [sim.time[*r.start()], sim.time[*r.end()]])
                        .collect::<Vec<_>>(),
                },
                "orientation": {
                    "tilt": orientation.tilt_error,
                    "attitude": orientation.attitude_error,
                },
            });
            std::fs::write(&path, serde_json::to_string_pretty(&summary)?)?;
            path
        }
    };

    println!("Data written to {:?}", path);
    Ok(())
}

fn print_sim_stats(sim: &SimResult) {
    let travelled = sim
        .pos
        .iter()
        .map(|p| p.norm())
        .fold(0.0_f64, f64::max);
    let duration = sim.time.last().copied().unwrap_or(0.0);

    println!("Simulation Stats:");
    println!("  Steps:        {}", sim.len());
    println!("  Duration:     {:.2} s", duration);
    println!("  Max Distance: {:.3} m", travelled);
    println!("-----------------------------");
}

fn print_filter_stats(position: &PositionRun, orientation: &OrientationRun) {
    println!("Filter Stats:");
    println!(
        "  Position RMSE: {:.4} m (max {:.4})",
        position.position_error.rmse, position.position_error.max
    );
    println!(
        "  Velocity RMSE: {:.4} m/s",
        position.velocity_error.rmse
    );
    println!("  Static Intervals: {}", position.static_ranges.len());
    println!(
        "  Tilt RMSE:     {:.2} deg",
        orientation.tilt_error.rmse.to_degrees()
    );
    println!(
        "  Attitude RMSE: {:.2} deg",
        orientation.attitude_error.rmse.to_degrees()
    );
    println!("-----------------------------");
}

fn write_simulation_csv(
    path: &Path,
    sim: &SimResult,
    position: &PositionRun,
    orientation: &OrientationRun,
) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;

    wtr.write_record([
        "time",
        // Truth
        "true_pos_x",
        "true_pos_y",
        "true_pos_z",
        "true_vel_x",
        "true_vel_y",
        "true_vel_z",
        "true_qw",
        "true_qx",
        "true_qy",
        "true_qz",
        // Estimates
        "est_pos_x",
        "est_pos_y",
        "est_pos_z",
        "est_vel_x",
        "est_vel_y",
        "est_vel_z",
        "static",
        "est_qw",
        "est_qx",
        "est_qy",
        "est_qz",
    ])?;

    let trajectory = &position.trajectory;
    for i in 0..sim.len() {
        let state = &trajectory.states[i];
        let truth = Quaternion::from(sim.orientation[i]);

        let mut record = vec![format!("{:.4}", sim.time[i])];
        record.extend(vec3(&sim.pos[i]));
        record.extend(vec3(&sim.vel[i]));
        record.extend(truth.to_array().map(|v| format!("{v:.6}")));
        record.extend(vec3(&state.fixed_rows::<3>(layout::POSITION).into_owned()));
        record.extend(vec3(&state.fixed_rows::<3>(layout::VELOCITY).into_owned()));
        record.push(trajectory.static_mask[i].to_string());
        record.extend(orientation.orientation[i].to_array().map(|v| format!("{v:.6}")));
        wtr.write_record(&record)?;
    }

    wtr.flush()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn vec3(v: &Vector3<f64>) -> [String; 3] {
    [v.x, v.y, v.z].map(|c| format!("{c:.4}"))
}

/// Reads the JSON configuration, or the defaults when no file is given.
pub fn load_config(path: Option<&Path>) -> Result<FilterConfig> {
    let Some(path) = path else {
        return Ok(FilterConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let config = FilterConfig::from_json_str(&text)
        .with_context(|| format!("invalid configuration in {}", path.display()))?;
    Ok(config)
}

fn resolve_frequency(explicit: Option<f64>, time: &[f64]) -> Result<f64> {
    let frequency = match explicit {
        Some(frequency) => frequency,
        None => io::estimate_frequency(time)?,
    };
    Ok(params::sampling::FREQUENCY.check(frequency)?)
}

fn write_to(path: Option<&Path>, write: impl FnOnce(&mut dyn Write) -> Result<()>) -> Result<()> {
    match path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            let mut out = BufWriter::new(file);
            write(&mut out)?;
            out.flush()?;
            info!(path = %path.display(), "output written");
            Ok(())
        }
        None => {
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            write(&mut out)
        }
    }
}
