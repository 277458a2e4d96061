use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};
use stave_core::{EngineConfig, PageDecoder, RenderingService, ViewMode};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "stave")]
#[command(about = "Sheet-music page engine diagnostics")]
pub struct Cli {
    /// Log more (-v info, -vv debug, -vvv trace); logs go to stderr.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print machine-readable PDF metadata.
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Render one page to a PNG through the page engine.
    Render {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 1.0)]
        scale: f32,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Page through the whole document with preloading and print engine metrics.
    Bench {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, value_enum, default_value_t = ModeArg::Single)]
        mode: ModeArg,
        #[arg(long, default_value_t = 1.0)]
        scale: f32,
        /// Cache budget in MiB (overrides config and environment).
        #[arg(long)]
        budget_mb: Option<usize>,
        /// TOML engine configuration.
        #[arg(long, value_name = "CONFIG")]
        config: Option<PathBuf>,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Single,
    Double,
}

impl From<ModeArg> for ViewMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Single => ViewMode::Single,
            ModeArg::Double => ViewMode::Double,
        }
    }
}

#[derive(Debug, Serialize)]
struct InfoOutput {
    path: String,
    page_count: u32,
    first_page_size_pt: Option<PageSizeOutput>,
}

#[derive(Debug, Serialize)]
struct PageSizeOutput {
    width: f32,
    height: f32,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    init_logging(cli.verbose);

    match cli.command {
        Commands::Info { file } => run_info(&file),
        Commands::Render { file, page, scale, output } => {
            run_render(&file, page, scale, output.as_deref())
        }
        Commands::Bench { file, mode, scale, budget_mb, config } => {
            run_bench(&file, mode.into(), scale, budget_mb, config.as_deref())
        }
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    // A second init in the same process keeps the first logger
    if TermLogger::init(level, Config::default(), TerminalMode::Stderr, ColorChoice::Auto).is_err() {
        log::debug!("logger already installed");
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}

#[cfg(feature = "pdfium")]
fn decoder() -> Arc<dyn PageDecoder> {
    match stave_core::PdfiumDecoder::new() {
        Ok(decoder) => Arc::new(decoder),
        Err(error) => {
            log::warn!("{error}; falling back to the built-in decoder");
            Arc::new(stave_core::LopdfDecoder::new())
        }
    }
}

#[cfg(not(feature = "pdfium"))]
fn decoder() -> Arc<dyn PageDecoder> {
    Arc::new(stave_core::LopdfDecoder::new())
}

fn read_pdf(path: &Path) -> Result<Vec<u8>> {
    ensure_pdf_exists(path)?;
    fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

fn run_info(file: &Path) -> Result<()> {
    let bytes = read_pdf(file)?;
    let runtime = runtime()?;

    let service = RenderingService::with_runtime(decoder(), EngineConfig::default(), runtime.handle().clone());
    let document = service.open_document(bytes).context("failed to open PDF")?;

    let first_page_size_pt = document
        .page_size(1)
        .ok()
        .map(|size| PageSizeOutput { width: size.width_pt, height: size.height_pt });
    let payload = InfoOutput {
        path: file.display().to_string(),
        page_count: document.page_count(),
        first_page_size_pt,
    };

    let json = serde_json::to_string_pretty(&payload)?;
    println!("{json}");

    service.close_document(document.id());

    Ok(())
}

fn run_render(file: &Path, page: u32, scale: f32, output: Option<&Path>) -> Result<()> {
    if page == 0 {
        anyhow::bail!("--page is 1-based and must be >= 1");
    }

    let bytes = read_pdf(file)?;
    let runtime = runtime()?;

    runtime.block_on(async {
        let service = RenderingService::new(decoder(), EngineConfig::default());
        let document = service.open_document(bytes).context("failed to open PDF")?;

        let rendered = service
            .get_rendered_page(document.id(), page, scale)
            .await
            .with_context(|| format!("failed to render page {page}"))?;

        let image = image::RgbaImage::from_raw(rendered.width, rendered.height, rendered.pixels.clone())
            .context("rendered buffer does not match its dimensions")?;

        let output = output.map(ToOwned::to_owned).unwrap_or_else(|| default_render_output(file, page));
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)?;
        }

        image
            .save(&output)
            .with_context(|| format!("failed to write image to {}", output.display()))?;

        println!("{}", output.display());

        service.close_document(document.id());

        Ok::<(), anyhow::Error>(())
    })
}

fn run_bench(
    file: &Path,
    mode: ViewMode,
    scale: f32,
    budget_mb: Option<usize>,
    config_path: Option<&Path>,
) -> Result<()> {
    let mut config = match config_path {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    }
    .apply_env()
    .context("invalid STAVE_* environment override")?;

    if let Some(megabytes) = budget_mb {
        anyhow::ensure!(
            megabytes.checked_mul(1024 * 1024).is_some(),
            "--budget-mb {megabytes} does not fit in memory"
        );
        config = config.with_memory_budget_mb(megabytes);
        config.validate()?;
    }

    let bytes = read_pdf(file)?;
    let runtime = runtime()?;

    runtime.block_on(async {
        let service = RenderingService::new(decoder(), config);
        let document = service.open_document(bytes).context("failed to open PDF")?;
        let id = document.id();

        let step = match mode {
            ViewMode::Single => 1,
            ViewMode::Double => 2,
        };

        let mut page = 1;
        while page <= document.page_count() {
            for visible in page..(page + step).min(document.page_count() + 1) {
                service
                    .get_rendered_page(id, visible, scale)
                    .await
                    .with_context(|| format!("failed to render page {visible}"))?;
            }
            service.preload_around(id, page, scale, mode)?;
            page += step;
        }

        let json = serde_json::to_string_pretty(&service.metrics())?;
        println!("{json}");

        service.close_document(id);

        Ok::<(), anyhow::Error>(())
    })
}

fn ensure_pdf_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }

    Ok(())
}

fn default_render_output(file: &Path, page: u32) -> PathBuf {
    let stem = file.file_stem().and_then(|name| name.to_str()).unwrap_or("page");

    file.with_file_name(format!("{stem}-page-{page}.png"))
}
