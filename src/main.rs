//! Stream Renderer - Headless Replay
//!
//! Replays an Annex B H.264 elementary stream through the decode/present
//! pipeline using the software decoder, then prints pipeline statistics.
//!
//! Usage: stream-renderer <stream.h264> [--fps N] [--vsync | --no-vsync] [--log-file]
//!                         [--export-logs PATH] [--save-settings]

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use log::{debug, info, warn};

use stream_renderer::app::Settings;
use stream_renderer::media::{
    split_annex_b, DecoderRenderer, RendererEvent, RendererOptions, SoftwareDecoder, StatsSink, VideoFormat,
    VsyncTicker,
};
use stream_renderer::utils::{self, RelativeTimer};

const USAGE: &str =
    "Usage: stream-renderer <stream.h264> [--fps N] [--vsync | --no-vsync] [--log-file] [--export-logs PATH] [--save-settings]";

struct Args {
    input: PathBuf,
    fps: Option<u32>,
    vsync: Option<bool>,
    log_file: bool,
    export_logs: Option<PathBuf>,
    save_settings: bool,
}

fn parse_args() -> Result<Args> {
    let mut input = None;
    let mut fps = None;
    let mut vsync = None;
    let mut log_file = false;
    let mut export_logs = None;
    let mut save_settings = false;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--fps" => {
                let value = args.next().context("--fps needs a value")?;
                fps = Some(value.parse().with_context(|| format!("Invalid frame rate '{}'", value))?);
            }
            "--vsync" => vsync = Some(true),
            "--no-vsync" => vsync = Some(false),
            "--log-file" => log_file = true,
            "--export-logs" => export_logs = Some(PathBuf::from(args.next().context("--export-logs needs a path")?)),
            "--save-settings" => save_settings = true,
            other if other.starts_with("--") => bail!("Unknown option {}", other),
            other => input = Some(PathBuf::from(other)),
        }
    }

    Ok(Args {
        input: input.context(USAGE)?,
        fps,
        vsync,
        log_file,
        export_logs,
        save_settings,
    })
}

fn main() -> Result<()> {
    let args = parse_args()?;

    // Initialize logging
    if args.log_file {
        // One log per replay
        utils::clear_logs().context("Failed to clear previous log")?;
        utils::init_logging_with_console().map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    info!("Stream Renderer v{}", env!("CARGO_PKG_VERSION"));
    info!("Platform: {}", std::env::consts::OS);

    let mut settings = Settings::load().unwrap_or_else(|e| {
        warn!("Failed to load settings, using defaults: {:#}", e);
        Settings::default()
    });
    if let Some(fps) = args.fps {
        settings.framerate = fps;
    }
    if let Some(vsync) = args.vsync {
        settings.use_vsync = vsync;
    }
    if args.save_settings {
        settings.save().context("Failed to save settings")?;
        info!("Settings saved");
    }

    let (width, height) = settings.resolution();
    info!(
        "Stream settings: {}x{} @ {} fps, {} kbps, {}",
        width,
        height,
        settings.framerate,
        settings.bitrate_kbps,
        settings.video_format()
    );

    let data = std::fs::read(&args.input).with_context(|| format!("Failed to read {}", args.input.display()))?;
    let units = split_annex_b(&data, VideoFormat::H264);
    if units.is_empty() {
        bail!("No NAL units found in {}", args.input.display());
    }
    info!("Loaded {} buffers from {}", units.len(), args.input.display());

    let refresh_rate = settings.refresh_rate();
    let renderer = DecoderRenderer::new(
        Box::new(SoftwareDecoder::new()),
        Box::new(StatsSink::new(refresh_rate as u64)),
        RendererOptions::from_settings(&settings),
    );
    let mut events = renderer.take_events();

    // The software decoder only handles H.264, whatever the settings ask for
    if settings.video_format() != VideoFormat::H264 {
        warn!("Settings request {}, replaying as H.264", settings.video_format());
    }
    renderer.setup(VideoFormat::H264, refresh_rate)?;

    let mut ticker = if settings.use_vsync {
        Some(VsyncTicker::start(renderer.vsync_signal(), refresh_rate)?)
    } else {
        None
    };

    let frame_interval = Duration::from_secs_f64(1.0 / refresh_rate as f64);
    let clock = RelativeTimer::new();
    let mut rejected = 0u64;

    for unit in &units {
        let status = renderer.submit_decode_buffer(
            &unit.data,
            0,
            unit.data.len() as i32,
            unit.buffer_type,
            unit.frame_type,
            clock.elapsed_ms_u32(),
        );
        if let Some(error) = status.error() {
            rejected += 1;
            debug!("{:?} buffer rejected ({}): {}", unit.buffer_type, status.code(), error);
        }
        if !unit.buffer_type.is_parameter_set() {
            thread::sleep(frame_interval);
        }
    }

    // Let the last frames drain before tearing down
    thread::sleep(frame_interval * 4);

    if let Some(events) = events.as_mut() {
        while let Ok(event) = events.try_recv() {
            match event {
                RendererEvent::DecodeFailed { frame_number, error, .. } => {
                    warn!("Frame {} failed to decode: {}", frame_number, error)
                }
                RendererEvent::BacklogOverflow { frame_number } => {
                    warn!("Presentation backlog overflowed at frame {}", frame_number)
                }
            }
        }
    }

    let stats = renderer.stats();
    renderer.cleanup();
    if let Some(ticker) = ticker.as_mut() {
        ticker.stop();
    }

    if settings.stats_overlay {
        println!("{}", stats.format_overlay());
    }
    println!(
        "Presented {} of {} frames ({:.1}% lost), {} submissions rejected",
        stats.frames_presented,
        stats.frames_received,
        stats.loss_percent(),
        rejected
    );

    if let Some(dest) = args.export_logs {
        utils::export_logs(&dest).with_context(|| format!("Failed to export logs to {}", dest.display()))?;
        info!("Logs exported to {}", dest.display());
    }

    Ok(())
}
