use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate, Timelike};
use clap::{Parser, Subcommand};
use rollcall_engine::{
    register_student, AttendanceSession, Config, OnnxAnalyzer, SessionEvent, SessionOptions,
    SessionSummary, StopHandle,
};
use rollcall_hw::{Camera, FrameSource, ImageSource};
use rollcall_store::{AttendanceRecord, AttendanceStatus, NewStudent, Store};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

mod output;

#[derive(Parser)]
#[command(name = "rollcall", about = "Face recognition attendance")]
struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/rollcall/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and check the model files
    Init,
    /// Register a student's face from the camera or a photo
    Register {
        /// Student id (e.g. roll number)
        id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        department: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        /// Image file or directory to register from instead of the camera
        #[arg(long)]
        image: Option<PathBuf>,
    },
    /// Take attendance until Ctrl-C, end of replay, or a limit
    Run {
        /// Stop after reading this many frames
        #[arg(long)]
        frames: Option<u64>,
        /// Stop after this many seconds
        #[arg(long)]
        duration: Option<u64>,
        /// Replay images from a file or directory instead of the camera
        #[arg(long)]
        replay: Option<PathBuf>,
    },
    /// List registered students
    Students {
        /// Include deactivated students
        #[arg(long)]
        all: bool,
    },
    /// Re-enable a deactivated student
    Activate { id: String },
    /// Exclude a student from recognition without deleting records
    Deactivate { id: String },
    /// Delete a student with their face encoding and attendance
    Remove { id: String },
    /// Record attendance by hand
    Mark {
        id: String,
        #[arg(long, default_value = "present")]
        status: AttendanceStatus,
        /// Date to mark (default: today)
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Show today's attendance
    Today,
    /// Attendance rows and per-department summary for a date range
    Report {
        #[arg(long)]
        from: NaiveDate,
        #[arg(long)]
        to: NaiveDate,
        #[arg(long)]
        json: bool,
    },
    /// List V4L2 capture devices
    Devices,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Commands::Init => init(&config)?,
        Commands::Register {
            id,
            name,
            department,
            email,
            phone,
            image,
        } => {
            let student = NewStudent {
                student_id: id,
                name,
                department,
                email,
                phone,
            };
            register(config, student, image).await?;
        }
        Commands::Run {
            frames,
            duration,
            replay,
        } => run(config, frames, duration, replay).await?,
        Commands::Students { all } => {
            let store = open_store(&config)?;
            output::print_students(&store.students(all)?);
        }
        Commands::Activate { id } => set_active(&config, &id, true)?,
        Commands::Deactivate { id } => set_active(&config, &id, false)?,
        Commands::Remove { id } => {
            let store = open_store(&config)?;
            if !store.remove_student(&id)? {
                bail!("no student with id {id}");
            }
            println!("Removed {id}");
        }
        Commands::Mark {
            id,
            status,
            date,
            notes,
        } => {
            let store = open_store(&config)?;
            let now = Local::now().naive_local();
            let now = now.with_nanosecond(0).unwrap_or(now);
            let record = AttendanceRecord {
                student_id: id.clone(),
                date: date.unwrap_or(now.date()),
                time: now.time(),
                status,
                recorded_by: Some("manual".to_string()),
                notes,
            };
            if store
                .mark_attendance(&record)
                .with_context(|| format!("marking {id}"))?
            {
                println!("Marked {id} {status} on {}", record.date);
            } else {
                println!("{id} is already marked on {}", record.date);
            }
        }
        Commands::Today => {
            let store = open_store(&config)?;
            let today = Local::now().date_naive();
            let rows = store.attendance_between(today, today)?;
            let active = store.students(false)?.len();
            output::print_attendance(&rows);
            println!("\n{} of {active} active students marked on {today}", rows.len());
        }
        Commands::Report { from, to, json } => {
            let store = open_store(&config)?;
            let rows = store.attendance_between(from, to)?;
            let summary = store.department_summary(from, to)?;
            if json {
                println!("{}", output::report_json(from, to, &rows, &summary)?);
            } else {
                output::print_attendance(&rows);
                println!();
                output::print_summary(&summary);
            }
        }
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No V4L2 capture devices found");
            }
            for d in devices {
                println!("{}  {} ({}, {})", d.path, d.name, d.driver, d.bus);
            }
        }
    }

    Ok(())
}

fn open_store(config: &Config) -> Result<Store> {
    Store::open(&config.db_path)
        .with_context(|| format!("opening database {}", config.db_path.display()))
}

fn init(config: &Config) -> Result<()> {
    open_store(config)?;
    println!("Database ready at {}", config.db_path.display());

    for path in [config.detector_model_path(), config.recognizer_model_path()] {
        if path.exists() {
            println!("Model found: {}", path.display());
        } else {
            println!("Model missing: {}", path.display());
        }
    }
    Ok(())
}

fn set_active(config: &Config, id: &str, active: bool) -> Result<()> {
    let store = open_store(config)?;
    if !store.set_active(id, active)? {
        bail!("no student with id {id}");
    }
    println!("{id} {}", if active { "activated" } else { "deactivated" });
    Ok(())
}

/// Camera (after warmup) or image replay.
fn open_source(config: &Config, images: Option<&PathBuf>) -> Result<Box<dyn FrameSource + Send>> {
    match images {
        Some(path) => {
            let source = ImageSource::open(path)
                .with_context(|| format!("opening images at {}", path.display()))?;
            Ok(Box::new(source))
        }
        None => {
            let mut camera = Camera::open(
                &config.camera_device,
                config.capture_width,
                config.capture_height,
            )
            .with_context(|| format!("opening camera {}", config.camera_device))?;
            camera.warmup(config.warmup_frames)?;
            Ok(Box::new(camera))
        }
    }
}

async fn register(config: Config, student: NewStudent, image: Option<PathBuf>) -> Result<()> {
    let capture = tokio::task::spawn_blocking(move || -> Result<_> {
        let mut store = open_store(&config)?;
        let mut analyzer = OnnxAnalyzer::load(&config).context("loading face models")?;
        let mut source = open_source(&config, image.as_ref())?;
        if image.is_none() {
            println!("Look at the camera...");
        }
        let capture = register_student(
            &mut store,
            &mut source,
            &mut analyzer,
            &student,
            config.frames_per_enroll,
        )?;
        Ok((student, capture))
    })
    .await??;

    let (student, capture) = capture;
    println!(
        "Registered {} ({}) from {} frame(s), detector confidence {:.2}",
        student.name, student.student_id, capture.candidates, capture.confidence
    );
    Ok(())
}

/// Exit status after a second Ctrl-C (128 + SIGINT).
const EXIT_INTERRUPTED: i32 = 130;

/// The first interrupt asks the session to finish; a second one means the
/// user is done waiting. Returns true when the process should exit now.
fn interrupt(stop: &StopHandle) -> bool {
    if stop.is_stopped() {
        return true;
    }
    tracing::info!("stopping session, press Ctrl-C again to exit immediately");
    stop.stop();
    false
}

async fn run(
    config: Config,
    frames: Option<u64>,
    duration: Option<u64>,
    replay: Option<PathBuf>,
) -> Result<()> {
    let mut options = SessionOptions::from_config(&config);
    options.max_frames = frames;
    options.duration = duration.map(Duration::from_secs);
    options.drop_when_full = replay.is_none();

    let stop = StopHandle::default();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();

    let session_stop = stop.clone();
    let mut task = tokio::task::spawn_blocking(move || -> Result<SessionSummary> {
        let store = open_store(&config)?;
        let analyzer = OnnxAnalyzer::load(&config).context("loading face models")?;
        let source = open_source(&config, replay.as_ref())?;
        let summary = AttendanceSession::new(source, analyzer, &store, options)
            .with_events(event_tx)
            .with_stop(session_stop)
            .run()?;
        Ok(summary)
    });

    println!("Taking attendance, press Ctrl-C to stop");
    let summary = loop {
        tokio::select! {
            Some(event) = event_rx.recv() => print_event(&event),
            result = &mut task => break result??,
            _ = tokio::signal::ctrl_c() => {
                if interrupt(&stop) {
                    eprintln!("interrupted again, exiting");
                    std::process::exit(EXIT_INTERRUPTED);
                }
            }
        }
    };
    while let Ok(event) = event_rx.try_recv() {
        print_event(&event);
    }

    output::print_session_summary(&summary);
    Ok(())
}

fn print_event(event: &SessionEvent) {
    match event {
        SessionEvent::Marked {
            student_id,
            name,
            status,
            time,
            score,
        } => println!("{time}  {status:<7}  {student_id}  {name}  (score {score:.3})"),
        SessionEvent::WriteFailed { student_id, error } => {
            eprintln!("could not record {student_id}: {error}")
        }
        SessionEvent::Suppressed { .. } | SessionEvent::Unknown { .. } => {}
    }
}
