use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use sparcup_core::config::UploadConfig;
use sparcup_core::expand::preflight;
use sparcup_core::manifest::Manifest;
use sparcup_core::memory::MemoryRemote;
use sparcup_core::mirror::DirRemote;
use sparcup_core::orchestrate::{CancelToken, RunContext, RunSummary, StopReason, Uploader};
use sparcup_core::progress::Progress;
use sparcup_core::remote::{Channel, Remote};

mod logging;
use logging::{init_logging, LogConfig, LogFormat};

#[derive(Parser)]
#[command(name = "sparcup", version, about = "Upload files into a dataset hierarchy described by a CSV manifest")]
struct Cli {
    /// More output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, global = true)]
    log_format: LogFormat,
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(clap::Args)]
struct Common {
    /// Manifest CSV
    manifest: PathBuf,
    /// Directory relative source paths are resolved against (default: cwd)
    #[arg(long)]
    base_dir: Option<PathBuf>,
    /// JSON file with prefixes, protected names and wait settings
    #[arg(long)]
    config: Option<PathBuf>,
    /// Do not append original file extensions to package names
    #[arg(long, default_value_t = false)]
    no_ext: bool,
    /// Also write the run summary as JSON to this file
    #[arg(long)]
    summary_json: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Cmd {
    /// Check that every file named in the manifest exists
    Check {
        manifest: PathBuf,
        #[arg(long)]
        base_dir: Option<PathBuf>,
    },
    /// Dry run against an in-memory remote and print the resulting tree
    Plan {
        #[command(flatten)]
        common: Common,
    },
    /// Upload into a dataset held in a directory mirror
    Upload {
        #[command(flatten)]
        common: Common,
        /// Mirror root; must contain a directory named after the dataset
        #[arg(long)]
        mirror: PathBuf,
        /// Upload through the out-of-band agent channel
        #[arg(long, default_value_t = false)]
        agent: bool,
        /// Upload even if some manifest files are missing
        #[arg(long, default_value_t = false)]
        allow_missing: bool,
        /// Log a progress line every 30 seconds
        #[arg(long, default_value_t = false)]
        progress: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut log = LogConfig::from_verbosity(cli.verbose);
    log.format = cli.log_format;
    log.log_file = cli.log_file.clone();
    init_logging(&log).context("init logging")?;

    match cli.cmd {
        Cmd::Check { manifest, base_dir } => check(&manifest, &base_dir_or_cwd(base_dir)?),
        Cmd::Plan { common } => plan(&common),
        Cmd::Upload { common, mirror, agent, allow_missing, progress } => {
            upload(&common, &mirror, agent, allow_missing, progress)
        }
    }
}

fn base_dir_or_cwd(base_dir: Option<PathBuf>) -> Result<PathBuf> {
    match base_dir {
        Some(d) => Ok(d),
        None => std::env::current_dir().context("current directory"),
    }
}

fn load_config(common: &Common, agent: bool) -> Result<UploadConfig> {
    let mut cfg = match &common.config {
        Some(path) => UploadConfig::from_json_file(path)?,
        None => UploadConfig::default(),
    };
    if common.no_ext {
        cfg.add_extension = false;
    }
    if agent {
        cfg.channel = Channel::Agent;
    }
    Ok(cfg)
}

fn check(manifest_path: &Path, base: &Path) -> Result<()> {
    let manifest = Manifest::read(manifest_path)?;
    println!("Dataset: {}", manifest.dataset);
    let issues = preflight(&manifest, base);
    if issues.is_empty() {
        println!("OK");
        return Ok(());
    }
    for (line, issue) in &issues {
        println!("line {}: {}", line, issue);
    }
    bail!("{} file expression(s) in {} cannot be uploaded", issues.len(), manifest_path.display())
}

fn plan(common: &Common) -> Result<()> {
    let manifest = Manifest::read(&common.manifest)?;
    let base = base_dir_or_cwd(common.base_dir.clone())?;
    let cfg = load_config(common, false)?.without_delays();
    let mut remote = MemoryRemote::new();
    let root_id = remote.add_dataset(&manifest.dataset);
    let root = remote.dataset(&manifest.dataset)?;

    let mut ctx = RunContext::new(CancelToken::new());
    let summary = Uploader::new(&mut remote, &cfg, root, &base).run(&manifest.rows, &mut ctx);
    print!("{}", remote.render_tree(&root_id));
    print_summary(&summary);
    write_summary_json(common, &summary)
}

fn upload(common: &Common, mirror: &Path, agent: bool, allow_missing: bool, show_progress: bool) -> Result<()> {
    let manifest = Manifest::read(&common.manifest)?;
    let base = base_dir_or_cwd(common.base_dir.clone())?;
    let cfg = load_config(common, agent)?;

    let issues = preflight(&manifest, &base);
    for (line, issue) in &issues {
        eprintln!("line {}: {}", line, issue);
    }
    if !issues.is_empty() && !allow_missing {
        bail!("some files are missing, upload aborted (use --allow-missing to continue anyway)");
    }

    let mut remote = DirRemote::open(mirror).with_context(|| format!("open mirror {}", mirror.display()))?;
    let root = remote
        .dataset(&manifest.dataset)
        .with_context(|| format!("unable to connect to dataset {:?}", manifest.dataset))?;
    eprintln!(
        "Dataset: {}  Manifest: {}  Add extension: {}  Channel: {:?}",
        manifest.dataset,
        common.manifest.display(),
        if cfg.add_extension { "yes" } else { "no" },
        cfg.channel
    );

    let cancel = CancelToken::new();
    let on_signal = cancel.clone();
    ctrlc::set_handler(move || on_signal.cancel()).context("set Ctrl+C handler")?;

    let prog = Progress::new(show_progress);
    prog.start(Duration::from_secs(30));
    let mut ctx = RunContext::new(cancel).with_progress(prog.clone());
    let summary = Uploader::new(&mut remote, &cfg, root, &base).run(&manifest.rows, &mut ctx);
    prog.stop();

    print_summary(&summary);
    write_summary_json(common, &summary)?;
    match &summary.stopped {
        None => Ok(()),
        Some(StopReason::Cancelled) => bail!("upload cancelled after {} file(s)", summary.uploaded),
        Some(StopReason::ChannelFailure(e)) => bail!("upload agent failed, remaining rows not processed: {}", e),
    }
}

fn write_summary_json(common: &Common, s: &RunSummary) -> Result<()> {
    let Some(path) = &common.summary_json else { return Ok(()) };
    let f = File::create(path).with_context(|| format!("create {}", path.display()))?;
    serde_json::to_writer_pretty(f, s).context("write summary")?;
    Ok(())
}

fn print_summary(s: &RunSummary) {
    println!("Uploaded {} files", s.uploaded);
    println!(
        "Renamed {}, unchanged {}, protected {}, rename failures {}",
        s.conform.renamed, s.conform.unchanged, s.conform.protected, s.conform.failed
    );
    if s.duplicates > 0 || s.failed_units > 0 || s.file_issues > 0 {
        println!(
            "Skipped {} already uploaded, {} failed, {} missing",
            s.duplicates, s.failed_units, s.file_issues
        );
    }
}
