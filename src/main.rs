use clap::{Args, Parser, Subcommand};
use snapbooth::cache::FilterCache;
use snapbooth::capture::{self, CAPTURES_DIR, CaptureTiming, DirectoryCamera, ShotKind};
use snapbooth::compose::Compositor;
use snapbooth::config::{self, BoothConfig};
use snapbooth::export::{self, ExportSettings, Exporter};
use snapbooth::imaging::Fonts;
use snapbooth::output;
use snapbooth::preview::{PreviewScheduler, PreviewSlot};
use snapbooth::session::{self, PlacementTarget, SESSION_FILENAME, Session};
use snapbooth::types::{CanvasSize, FilterKind, FrameStyle, PlacementPatch, TextField};
use std::error::Error;
use std::fs;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, warn};

type CliResult<T> = Result<T, Box<dyn Error>>;

const PREVIEW_FILENAME: &str = "preview.png";

#[derive(Parser)]
#[command(name = "snapbooth")]
#[command(about = "Photobooth print compositor")]
#[command(long_about = "\
Photobooth print compositor

Takes a burst of photos, lets guests pick a filter, frame and captions, and
exports a 4x6 print: a 4x2 grid with every photo in both columns, captions,
watermarks and a QR code linking to the shared copy.

Typical session:

  snapbooth capture --camera feed/     # countdown, 4 shots
  snapbooth filter sepia -i 60
  snapbooth frame ocean
  snapbooth text bottom See you soon
  snapbooth preview                    # writes .snapbooth/preview.png
  snapbooth export                     # writes prints/<prefix>-YYYY-MM-DD.png

One retake is allowed per session; after it, pick the final four with
'snapbooth select'. Placement editing needs 'snapbooth developer unlock'.

Run 'snapbooth gen-config' to generate a documented booth.toml.")]
#[command(version)]
struct Cli {
    /// Directory containing booth.toml
    #[arg(long, default_value = ".", global = true)]
    config_dir: PathBuf,

    /// Directory for the session file, captured frames and previews
    #[arg(long, default_value = ".snapbooth", global = true)]
    state_dir: PathBuf,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct CameraArgs {
    /// Directory of frames to use as the camera (remembered for later runs)
    #[arg(long)]
    camera: Option<PathBuf>,
}

#[derive(Args)]
struct FilterArgs {
    /// Filter id; omit to list them. Unknown ids mean no filter
    name: Option<String>,
    /// Blend strength, 0-100
    #[arg(short, long, default_value_t = 100)]
    intensity: u32,
}

#[derive(Args)]
struct FrameArgs {
    /// Frame id; omit to list them. Unknown ids mean no frame
    name: Option<String>,
}

#[derive(Args)]
struct TextArgs {
    field: TextField,
    /// New text (words are joined with spaces)
    #[arg(num_args = 0.., trailing_var_arg = true, allow_hyphen_values = true)]
    value: Vec<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Take a fresh set of photos
    Capture {
        #[command(flatten)]
        camera: CameraArgs,
        /// Photos per run (1-4)
        #[arg(long)]
        shots: Option<u8>,
        /// Countdown before each shot, in ticks (1-10)
        #[arg(long)]
        timer: Option<u8>,
    },
    /// Retake the photos (once per session)
    Retake(CameraArgs),
    /// Choose the four photos to print after a retake
    Select {
        /// Photo numbers as listed; omit to list the candidates
        photos: Vec<usize>,
        /// Accept the suggested selection
        #[arg(long, conflicts_with = "photos")]
        suggested: bool,
    },
    /// Set the color filter
    Filter(FilterArgs),
    /// Set the frame style
    Frame(FrameArgs),
    /// Change a caption
    Text(TextArgs),
    /// Adjust photo placement inside the grid cells (developer mode)
    #[command(subcommand)]
    Placement(PlacementCommand),
    /// Unlock or lock developer mode
    #[command(subcommand)]
    Developer(DeveloperCommand),
    /// Show the current session
    Status,
    /// Render the 600x900 preview once
    Preview {
        /// Where to write the preview (default: <state-dir>/preview.png)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Render, upload and save the final print
    Export,
    /// Interactive editing with a live, debounced preview
    Edit,
    /// Print a stock booth.toml with all options documented
    GenConfig,
}

#[derive(Subcommand)]
enum PlacementCommand {
    /// Patch slots: TARGET is a slot number, `left`, `right` or `all`
    Set {
        target: PlacementTarget,
        #[arg(long)]
        width: Option<f32>,
        #[arg(long)]
        height: Option<f32>,
        #[arg(long)]
        top: Option<f32>,
        #[arg(long)]
        left: Option<f32>,
        #[arg(long)]
        right: Option<f32>,
    },
    /// Copy a slot's placement to every slot in its column
    Column { slot: usize },
    /// Copy a slot's placement to every slot
    All { slot: usize },
    /// List all placements
    Show,
}

#[derive(Subcommand)]
enum DeveloperCommand {
    Unlock { passphrase: String },
    Lock,
}

/// One line of the `edit` loop.
#[derive(Parser)]
#[command(no_binary_name = true, disable_version_flag = true)]
struct EditLine {
    #[command(subcommand)]
    command: EditCommand,
}

#[derive(Subcommand)]
enum EditCommand {
    Filter(FilterArgs),
    Frame(FrameArgs),
    Text(TextArgs),
    Status,
    /// Leave the editor
    Done,
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    let config = config::load_config(&cli.config_dir)?;
    init_thread_pool(&config.processing);
    let booth = Booth {
        config,
        config_dir: cli.config_dir,
        state_dir: cli.state_dir,
    };
    let mut session = booth.load_session()?;

    match cli.command {
        Command::Capture {
            camera,
            shots,
            timer,
        } => {
            if let Some(n) = shots {
                session.set_shot_count(n)?;
            }
            if let Some(t) = timer {
                session.set_timer_delay(t)?;
            }
            let mut cam = booth.open_camera(&mut session, camera.camera, 0)?;
            let timing = CaptureTiming::new(&booth.config.capture, session.config().timer_delay);
            let paths = capture::run_capture(
                &mut cam,
                usize::from(session.config().shot_count),
                &timing,
                &booth.state_dir.join(CAPTURES_DIR),
                ShotKind::Original,
                output::print_capture_event,
            )?;
            session.record_capture(paths)?;
            booth.save_session(&session)?;
            output::print_status(&session);
        }
        Command::Retake(camera) => {
            session.check_retake()?;
            let offset = session.config().original_images.len();
            let mut cam = booth.open_camera(&mut session, camera.camera, offset)?;
            let timing = CaptureTiming::new(&booth.config.capture, session.config().timer_delay);
            let paths = capture::run_capture(
                &mut cam,
                usize::from(session.config().shot_count),
                &timing,
                &booth.state_dir.join(CAPTURES_DIR),
                ShotKind::Retake,
                output::print_capture_event,
            )?;
            session.record_retake(paths)?;
            booth.save_session(&session)?;
            output::print_candidates(&session);
        }
        Command::Select { photos, suggested } => {
            let indices = if suggested {
                session.default_final_selection()
            } else if photos.is_empty() {
                output::print_candidates(&session);
                return Ok(());
            } else {
                photos
                    .iter()
                    .map(|n| n.checked_sub(1).ok_or("photos are numbered from 1"))
                    .collect::<Result<Vec<_>, _>>()?
            };
            session.select_final(&indices)?;
            booth.save_session(&session)?;
            output::print_status(&session);
        }
        Command::Filter(args) => {
            if apply_filter(&mut session, args) {
                booth.save_session(&session)?;
            }
        }
        Command::Frame(args) => {
            if apply_frame(&mut session, args) {
                booth.save_session(&session)?;
            }
        }
        Command::Text(args) => {
            apply_text(&mut session, args)?;
            booth.save_session(&session)?;
            for line in output::format_text(&session.config().text) {
                println!("{}", line);
            }
        }
        Command::Placement(cmd) => {
            run_placement(&mut session, cmd)?;
            booth.save_session(&session)?;
        }
        Command::Developer(DeveloperCommand::Unlock { passphrase }) => {
            session.unlock_developer_mode(&passphrase, &booth.config.developer.passphrase)?;
            booth.save_session(&session)?;
            println!("Developer mode on");
        }
        Command::Developer(DeveloperCommand::Lock) => {
            session.lock_developer_mode();
            booth.save_session(&session)?;
            println!("Developer mode off");
        }
        Command::Status => output::print_status(&session),
        Command::Preview { out } => {
            let images = export::load_images(
                &session.config().current_images,
                booth.config.render_timeouts().slot,
            );
            let compositor = booth.compositor();
            let image = compositor.render(&session.render_request(&images, CanvasSize::PREVIEW));
            let path = out.unwrap_or_else(|| booth.state_dir.join(PREVIEW_FILENAME));
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            image.save(&path)?;
            let stats = compositor.cache().map(|c| c.stats());
            output::print_preview_output(&path, 1, stats.as_ref());
        }
        Command::Export => {
            let compositor = Arc::new(booth.compositor());
            let exporter = Exporter::new(
                Arc::clone(&compositor),
                export::uploader_from_config(&booth.config, &booth.config_dir),
                ExportSettings::from_config(&booth.config, &booth.config_dir),
            );
            let outcome = exporter.export(&mut session)?;
            booth.save_session(&session)?;
            let stats = compositor.cache().map(|c| c.stats());
            output::print_export_output(&outcome, stats.as_ref());
        }
        Command::Edit => run_edit(&booth, &mut session)?,
        // Printed before config loading
        Command::GenConfig => {}
    }

    Ok(())
}

/// Resolved config plus the directories the CLI works in.
struct Booth {
    config: BoothConfig,
    config_dir: PathBuf,
    state_dir: PathBuf,
}

impl Booth {
    fn session_path(&self) -> PathBuf {
        self.state_dir.join(SESSION_FILENAME)
    }

    fn load_session(&self) -> CliResult<Session> {
        Ok(Session::new(session::load_session(&self.session_path())?))
    }

    fn save_session(&self, session: &Session) -> CliResult<()> {
        session::save_session(&self.session_path(), session.config())?;
        Ok(())
    }

    fn compositor(&self) -> Compositor {
        let font = |p: &Option<String>| p.as_ref().map(|p| self.config_dir.join(p));
        let regular = font(&self.config.render.font_path);
        let bold = font(&self.config.render.bold_font_path);
        let fonts = Fonts::discover(regular.as_deref(), bold.as_deref());
        Compositor::new(Arc::new(fonts))
            .with_cache(Arc::new(FilterCache::default()))
            .with_timeouts(self.config.render_timeouts())
    }

    /// Open the camera directory, remembering `--camera` in the session.
    fn open_camera(
        &self,
        session: &mut Session,
        camera: Option<PathBuf>,
        offset: usize,
    ) -> CliResult<DirectoryCamera> {
        if let Some(dir) = camera {
            session.set_camera(Some(dir.display().to_string()));
        }
        let dir = session
            .config()
            .camera_id
            .clone()
            .ok_or("no camera configured: pass --camera <DIR>")?;
        Ok(DirectoryCamera::open(Path::new(&dir))?.starting_at(offset))
    }
}

/// Returns whether the session changed.
fn apply_filter(session: &mut Session, args: FilterArgs) -> bool {
    match args.name {
        Some(id) => {
            let kind = FilterKind::from_id(&id);
            if !kind.id().eq_ignore_ascii_case(&id) {
                warn!("unknown filter '{id}', using '{kind}'; run `snapbooth filter` to list them");
            }
            session.set_filter(kind, args.intensity);
            true
        }
        None => {
            let current = session.config().filter;
            output::print_choices("Filters", FilterKind::ALL.iter().map(|k| k.id()), current.id());
            false
        }
    }
}

/// Returns whether the session changed.
fn apply_frame(session: &mut Session, args: FrameArgs) -> bool {
    match args.name {
        Some(id) => {
            let frame = FrameStyle::from_id(&id);
            if !frame.id().eq_ignore_ascii_case(&id) {
                warn!("unknown frame '{id}', using '{frame}'; run `snapbooth frame` to list them");
            }
            session.set_frame(frame);
            true
        }
        None => {
            let current = session.config().frame;
            output::print_choices("Frames", FrameStyle::ALL.iter().map(|f| f.id()), current.id());
            false
        }
    }
}

fn apply_text(session: &mut Session, args: TextArgs) -> Result<(), session::SessionError> {
    session.set_text(args.field, &args.value.join(" "))
}

fn run_placement(session: &mut Session, cmd: PlacementCommand) -> CliResult<()> {
    let slot_index = |slot: usize| slot.checked_sub(1).ok_or("slots are numbered from 1");
    match cmd {
        PlacementCommand::Set {
            target,
            width,
            height,
            top,
            left,
            right,
        } => {
            let patch = PlacementPatch {
                width,
                height,
                top,
                left,
                right,
            };
            if patch.is_empty() {
                return Err("nothing to change: pass --width, --height, --top, --left or --right".into());
            }
            let changed = session.set_placement(target, patch)?;
            println!("Updated {target} ({changed} slots)");
        }
        PlacementCommand::Column { slot } => {
            session.apply_to_column(slot_index(slot)?)?;
            println!("Copied slot {slot} to its column");
        }
        PlacementCommand::All { slot } => {
            session.apply_to_all(slot_index(slot)?)?;
            println!("Copied slot {slot} to all slots");
        }
        PlacementCommand::Show => {}
    }
    for line in output::format_placements(&session.config().placements) {
        println!("{}", line);
    }
    Ok(())
}

/// Read edit commands from stdin, re-rendering the preview after each change.
fn run_edit(booth: &Booth, session: &mut Session) -> CliResult<()> {
    let images = export::load_images(
        &session.config().current_images,
        booth.config.render_timeouts().slot,
    );
    let compositor = Arc::new(booth.compositor());
    let debounce = Duration::from_millis(booth.config.preview.debounce_ms);
    let preview_path = booth.state_dir.join(PREVIEW_FILENAME);
    fs::create_dir_all(&booth.state_dir)?;

    let slot = Arc::new(PreviewSlot::new());
    let mut scheduler = {
        let render = Arc::clone(&compositor);
        let listener = Arc::clone(&compositor);
        let path = preview_path.clone();
        PreviewScheduler::spawn_with_listener(
            debounce,
            Arc::clone(&slot),
            move |request| render.render(request),
            move |frame| {
                if let Err(e) = frame.image.save(&path) {
                    warn!(error = %e, "could not write preview");
                    return;
                }
                let stats = listener.cache().map(|c| c.stats());
                output::print_preview_output(&path, frame.generation, stats.as_ref());
            },
        )
    };

    scheduler.request(session.render_request(&images, CanvasSize::PREVIEW));
    println!("Editing. Commands: filter, frame, text, status, done");

    for line in io::stdin().lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let parsed = match EditLine::try_parse_from(line.split_whitespace()) {
            Ok(parsed) => parsed,
            Err(e) => {
                e.print()?;
                continue;
            }
        };
        let changed = match parsed.command {
            EditCommand::Done => break,
            EditCommand::Status => {
                output::print_status(session);
                false
            }
            EditCommand::Filter(args) => apply_filter(session, args),
            EditCommand::Frame(args) => apply_frame(session, args),
            EditCommand::Text(args) => match apply_text(session, args) {
                Ok(()) => true,
                Err(e) => {
                    eprintln!("{e}");
                    false
                }
            },
        };
        if changed {
            booth.save_session(session)?;
            scheduler.request(session.render_request(&images, CanvasSize::PREVIEW));
        }
    }

    // Let the last edit's preview land before exiting.
    let last = scheduler.generation();
    let grace = debounce + booth.config.render_timeouts().slot * 2;
    if slot.wait_for(last, grace).is_none() {
        warn!("last preview did not finish in time");
    }
    scheduler.shutdown();
    Ok(())
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores — user can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
