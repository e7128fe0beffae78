use anyhow::{Context, bail};
use render_manager::{
    backend::{SharedRenderer, SoftwareRenderer},
    config::{self, RenderConfig},
    host::{HeadlessCompositor, demo_scene},
};
use smithay::{
    reexports::calloop::EventLoop,
    utils::{Physical, Size},
};
use std::{backtrace::Backtrace, cell::RefCell, fs, path::PathBuf, rc::Rc, time::Duration};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FRAMES: u64 = 600;
const OUTPUT_SIZE: (i32, i32) = (1280, 720);
const REFRESH: Duration = Duration::from_micros(16_667);

struct Args {
    frames: u64,
    outputs: u32,
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    init_backtrace_defaults();
    init_logging()?;
    std::panic::set_hook(Box::new(|panic_info| {
        let backtrace = Backtrace::force_capture();
        tracing::error!("panic: {panic_info}\n{backtrace}");
        eprintln!("panic: {panic_info}\n{backtrace}");
    }));

    let args = parse_args(std::env::args().skip(1))?;

    let mut config = match &args.config {
        Some(path) => config::load_from_path(path)?,
        None => RenderConfig::default(),
    };
    config.apply_environment()?;
    tracing::debug!(?config, "render configuration");

    let mut event_loop: EventLoop<'static, HeadlessCompositor> =
        EventLoop::try_new().context("failed to create event loop")?;

    let renderer: SharedRenderer = Rc::new(RefCell::new(SoftwareRenderer::new()));
    let mut host = HeadlessCompositor::new(
        event_loop.handle(),
        event_loop.get_signal(),
        renderer,
        config,
    );
    host.set_frame_limit(Some(args.frames));

    let size: Size<i32, Physical> = Size::from(OUTPUT_SIZE);
    for index in 0..args.outputs {
        let (scene, animated) = demo_scene(size.to_logical(1));
        let id = host.add_output(&format!("HEADLESS-{}", index + 1), size, REFRESH, scene);
        host.animate(id, animated, 4);
    }

    tracing::info!(frames = args.frames, outputs = args.outputs, "starting headless run");
    event_loop
        .run(None, &mut host, |_| {})
        .context("event loop failed")?;

    for output in host.outputs() {
        let manager = output.manager();
        let stats = manager.frame_stats();
        tracing::info!(
            output = manager.name(),
            composited = stats.composited,
            scanout = stats.scanout,
            skipped = stats.skipped,
            failed = stats.failed,
            delayed = stats.delayed,
            delay_ms = manager.repaint_delay().delay_ms(),
            "frame statistics"
        );
    }

    Ok(())
}

fn parse_args(mut args: impl Iterator<Item = String>) -> anyhow::Result<Args> {
    let mut parsed = Args {
        frames: DEFAULT_FRAMES,
        outputs: 1,
        config: None,
    };

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--frames" => {
                let value = args.next().context("--frames needs a value")?;
                parsed.frames = value
                    .parse()
                    .with_context(|| format!("invalid frame count `{value}`"))?;
            }
            "--outputs" => {
                let value = args.next().context("--outputs needs a value")?;
                parsed.outputs = value
                    .parse()
                    .with_context(|| format!("invalid output count `{value}`"))?;
            }
            "--config" => {
                let value = args.next().context("--config needs a path")?;
                parsed.config = Some(PathBuf::from(value));
            }
            other => bail!("unknown argument `{other}`"),
        }
    }

    if parsed.outputs == 0 {
        bail!("at least one output is required");
    }
    Ok(parsed)
}

fn init_backtrace_defaults() {
    if std::env::var_os("RUST_BACKTRACE").is_none() {
        // Safety: called at startup before creating any threads.
        unsafe { std::env::set_var("RUST_BACKTRACE", "1") };
    }
    if std::env::var_os("RUST_LIB_BACKTRACE").is_none() {
        // Safety: called at startup before creating any threads.
        unsafe { std::env::set_var("RUST_LIB_BACKTRACE", "0") };
    }
}

const DEFAULT_LOG_FILTER: &str = concat!(
    "render_manager=debug,",
    "render_manager::render_manager=trace,",
    "render_manager::backend=debug"
);

fn init_logging() -> anyhow::Result<()> {
    let log_dir: PathBuf = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("log");
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create log directory {}", log_dir.display()))?;

    let file_appender = tracing_appender::rolling::never(&log_dir, "render-manager.log");
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(true)
                .with_writer(std::io::stderr),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_appender),
        )
        .init();

    let log_file = log_dir.join("render-manager.log");
    tracing::info!(path = %log_file.display(), "logging initialized");

    Ok(())
}
