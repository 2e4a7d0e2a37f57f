use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use image::ImageReader;

use crackcam::Config;
use crackcam::capture::{AcquisitionEvent, AcquisitionHandle, ImageFolderSource};
use crackcam::classify::{CrackClassifier, LazyModel};
use crackcam::core::db::{
    CrackStatus, Database, NewUser, SampleLabel, SampleRepository, SessionRepository, User,
    UserRepository,
};
use crackcam::core::storage::ImageStore;
use crackcam::detection::{self, OverlayCanvas};
use crackcam::scan::{ClassificationWorker, ScanController};

#[derive(Parser)]
#[command(name = "crackcam")]
#[command(about = "Capture surface images, flag cracks and browse past scans")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to ./crackcam.toml when present)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Database file, overrides the configuration
    #[arg(long, global = true, value_name = "FILE")]
    db: Option<PathBuf>,

    /// Image root directory, overrides the configuration
    #[arg(long, global = true, value_name = "DIR")]
    images: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch the desktop application (default)
    Gui,
    /// Manage users
    #[command(subcommand)]
    User(UserCommand),
    /// Inspect capture sessions
    #[command(subcommand)]
    Session(SessionCommand),
    /// Run the crack pipeline on an image file
    Analyze(AnalyzeArgs),
    /// Capture one frame, classify it and print the outcome
    Capture(CaptureArgs),
    /// Manage stored training samples
    #[command(subcommand)]
    Sample(SampleCommand),
}

#[derive(Subcommand)]
enum UserCommand {
    Add {
        #[arg(long)]
        email: String,
        #[arg(long)]
        first: String,
        #[arg(long)]
        last: String,
    },
    List,
    Delete {
        #[arg(long)]
        email: String,
    },
}

#[derive(Subcommand)]
enum SessionCommand {
    List {
        #[arg(long)]
        email: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OverlayArg {
    Mask,
    Original,
}

impl From<OverlayArg> for OverlayCanvas {
    fn from(arg: OverlayArg) -> Self {
        match arg {
            OverlayArg::Mask => OverlayCanvas::Mask,
            OverlayArg::Original => OverlayCanvas::Original,
        }
    }
}

#[derive(Args)]
struct AnalyzeArgs {
    /// Path to input image file
    #[arg(value_name = "IMAGE")]
    image_path: PathBuf,

    /// Write the overlay image here
    #[arg(long, value_name = "FILE")]
    out: Option<PathBuf>,

    /// Save debug outputs to directory (must be empty)
    #[arg(long, value_name = "DIR")]
    debug_out: Option<PathBuf>,

    /// Cut the configured region of interest out first
    #[arg(long)]
    crop: bool,

    /// What the keypoints are drawn on
    #[arg(long, value_enum, default_value_t = OverlayArg::Mask)]
    overlay: OverlayArg,
}

#[derive(Args)]
struct CaptureArgs {
    #[arg(long)]
    email: String,

    /// Human-readable name stored with the session
    #[arg(long)]
    name: Option<String>,

    /// Image file or directory used as the camera, overrides the configuration
    #[arg(long, value_name = "PATH")]
    source: Option<PathBuf>,

    /// Seconds to wait for the camera
    #[arg(long, default_value_t = 10)]
    timeout: u64,
}

#[derive(Subcommand)]
enum SampleCommand {
    /// Store the region of interest of a capture as a training sample
    Add {
        #[arg(long)]
        email: String,
        #[arg(long)]
        session: i64,
        /// CRACK or NO_CRACK; defaults to the session's classification
        #[arg(long)]
        label: Option<SampleLabel>,
    },
    List {
        #[arg(long)]
        label: Option<SampleLabel>,
    },
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    init_logging(args.verbose);

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(db) = args.db {
        config.storage.database = db;
    }
    if let Some(images) = args.images {
        config.storage.image_root = images;
    }

    match args.command.unwrap_or(Commands::Gui) {
        Commands::Gui => run_gui(config),
        command => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("Failed to start async runtime")?;
            runtime.block_on(run_command(command, config))
        }
    }
}

#[cfg(feature = "gui")]
fn run_gui(config: Config) -> anyhow::Result<()> {
    crackcam::gui::run(config).map_err(|e| anyhow::anyhow!("GUI failed: {}", e))
}

#[cfg(not(feature = "gui"))]
fn run_gui(_config: Config) -> anyhow::Result<()> {
    anyhow::bail!("crackcam was built without the `gui` feature")
}

async fn run_command(command: Commands, config: Config) -> anyhow::Result<()> {
    match command {
        Commands::Gui => anyhow::bail!("the GUI must be started from the main thread"),
        Commands::Analyze(args) => analyze(args, &config),
        Commands::User(cmd) => {
            let db = Database::open(&config.storage.database).await?;
            user_command(cmd, &db).await
        }
        Commands::Session(SessionCommand::List { email }) => {
            let db = Database::open(&config.storage.database).await?;
            let user = find_user(&db, &email).await?;
            let sessions = db.get_sessions_for_user(&user.uuid).await?;
            if sessions.is_empty() {
                println!("No sessions for {}", email);
            }
            for session in sessions {
                println!("{}  {}", session.date.date(), session.label());
            }
            Ok(())
        }
        Commands::Capture(args) => {
            let db = Database::open(&config.storage.database).await?;
            capture(args, &config, db).await
        }
        Commands::Sample(cmd) => {
            let db = Database::open(&config.storage.database).await?;
            sample_command(cmd, &config, &db).await
        }
    }
}

async fn find_user(db: &Database, email: &str) -> anyhow::Result<User> {
    db.get_user_by_email(email)
        .await?
        .with_context(|| format!("No user with email {}", email))
}

async fn user_command(cmd: UserCommand, db: &Database) -> anyhow::Result<()> {
    match cmd {
        UserCommand::Add { email, first, last } => {
            let new_user = NewUser {
                email,
                first_name: first,
                last_name: last,
            };
            let missing = new_user.missing_fields();
            if !missing.is_empty() {
                anyhow::bail!("Missing Field(s): {}", missing.join(" | "));
            }
            let user = db.add_user(new_user).await?;
            println!("{}  {}", user.uuid, user.email);
        }
        UserCommand::List => {
            for user in db.get_users().await? {
                println!("{}  {}  {}", user.uuid, user.email, user.full_name());
            }
        }
        UserCommand::Delete { email } => {
            let user = find_user(db, &email).await?;
            db.delete_user(&user.uuid).await?;
            println!("Deleted {}", email);
        }
    }
    Ok(())
}

fn analyze(args: AnalyzeArgs, config: &Config) -> anyhow::Result<()> {
    log::info!("loading image: {:?}", args.image_path);
    let img = ImageReader::open(&args.image_path)?
        .decode()
        .map_err(|e| anyhow::anyhow!("Failed to decode image: {}", e))?;
    log::debug!("image loaded: {}x{}", img.width(), img.height());

    let img = if args.crop { config.roi.crop(&img)? } else { img };
    let (overlay, analysis) =
        detection::analyze(&img, &config.pipeline, args.overlay.into(), args.debug_out)?;

    println!("\n=== Crack Analysis ===");
    println!("Image size: {}x{}", img.width(), img.height());
    println!(
        "Edge pixels: {} ({:.2}%)",
        analysis.edge_pixels,
        analysis.edge_density() * 100.0
    );
    println!("Keypoints: {}", analysis.keypoints.len());
    for (i, kp) in analysis.keypoints.iter().enumerate() {
        println!("  {} at ({}, {}) - score: {:.1}", i + 1, kp.x, kp.y, kp.score);
    }

    if let Some(out) = args.out {
        overlay
            .to_rgb8()
            .save(&out)
            .with_context(|| format!("Failed to write {:?}", out))?;
        println!("Overlay written to {}", out.display());
    }
    Ok(())
}

fn classifier_from(config: &Config) -> CrackClassifier {
    let model = LazyModel::new(
        config.classifier.model_path.clone(),
        config.classifier.input_layout,
        config.roi.width,
        config.roi.height,
    );
    CrackClassifier::new(Arc::new(model), config.classifier.threshold)
}

async fn capture(args: CaptureArgs, config: &Config, db: Database) -> anyhow::Result<()> {
    let user = find_user(&db, &args.email).await?;
    let source = args
        .source
        .or_else(|| config.camera.source.clone())
        .context("No camera source: pass --source or set camera.source")?;

    let store = ImageStore::new(config.storage.image_root.clone());
    let (mut handle, events) = AcquisitionHandle::spawn(
        ImageFolderSource::new(source),
        config.camera.correction.clone(),
        Duration::from_millis(config.camera.frame_interval_ms),
    )?;
    let worker = ClassificationWorker::new(
        db.clone(),
        store,
        config.roi,
        config.pipeline.clone(),
        classifier_from(config),
    );
    let controller = ScanController::new(db, user, handle.requester(), worker);

    let deadline = Instant::now() + Duration::from_secs(args.timeout);
    let mut session_id = None;
    let captured = loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break None;
        }
        let Ok(event) = tokio::task::block_in_place(|| events.recv_timeout(remaining)) else {
            break None;
        };
        if let AcquisitionEvent::Error(e) = &event {
            log::error!("{}", e);
        }
        if let Some(id) = controller.on_event(&event) {
            break Some(id);
        }
        match &event {
            AcquisitionEvent::CaptureFailed { reason, .. } => {
                anyhow::bail!("Capture failed: {}", reason)
            }
            AcquisitionEvent::CameraAvailable(false) => break None,
            _ => {}
        }
        if session_id.is_none() && controller.can_capture() {
            let session = controller.begin_capture(args.name.as_deref()).await?;
            println!("Capturing session {}", session.session_id);
            session_id = Some(session.session_id);
        }
    };

    let Some(session_id) = captured else {
        handle.stop()?;
        anyhow::bail!("Camera did not deliver a frame in time");
    };
    let outcome = controller.classify(session_id).await;
    handle.stop()?;
    let outcome = outcome?;

    println!(
        "{}  p={:.3}",
        outcome.session.label(),
        outcome.verdict.probability
    );
    println!("Highlighted: {}", outcome.highlighted_path.display());
    println!("Cropped:     {}", outcome.cropped_path.display());
    Ok(())
}

fn load_roi_pixels(path: &Path, config: &Config) -> anyhow::Result<Vec<u8>> {
    let raw = image::open(path).with_context(|| format!("Failed to open capture {:?}", path))?;
    Ok(config.roi.crop(&raw)?.to_luma8().into_raw())
}

async fn sample_command(cmd: SampleCommand, config: &Config, db: &Database) -> anyhow::Result<()> {
    match cmd {
        SampleCommand::Add {
            email,
            session,
            label,
        } => {
            let user = find_user(db, &email).await?;
            let found = db
                .get_session_for_user(&user.uuid, session)
                .await?
                .with_context(|| format!("{} has no session {}", email, session))?;
            let label = match (label, found.crack_status) {
                (Some(label), _) => label,
                (None, CrackStatus::Crack) => SampleLabel::Crack,
                (None, CrackStatus::NoCrack) => SampleLabel::NoCrack,
                (None, CrackStatus::Pending) => {
                    anyhow::bail!("Session {} is not classified yet; pass --label", session)
                }
            };
            let store = ImageStore::new(config.storage.image_root.clone());
            let pixels = load_roi_pixels(&store.raw_image_path(&user.uuid, session), config)?;
            let id = db.add_sample(&pixels, label).await?;
            println!("Stored sample {} ({:?})", id, label);
        }
        SampleCommand::List { label } => {
            let samples = db.get_samples(label).await?;
            for sample in &samples {
                println!("{}  {:?}  {} bytes", sample.id, sample.label, sample.pixels.len());
            }
            println!("{} of {} samples", samples.len(), db.sample_count().await?);
        }
    }
    Ok(())
}
