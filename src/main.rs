//! Camrelay demo: stream frames from the first camera and report timing.
//!
//! Usage: `camrelay [show]` where `show` is 1 (default) to open a preview
//! window, 0 to only print statistics. Config file via `CAMRELAY_CONFIG`.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use camrelay::{Config, Health, Relay};
use color_eyre::Result;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Frames between fps reports
const REPORT_EVERY: u64 = 30;
/// Inter-frame gap worth a warning
const LONG_GAP: Duration = Duration::from_millis(200);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("camrelay=info")),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    let show = match std::env::args().nth(1) {
        None => true,
        Some(arg) => match arg.parse::<u32>() {
            Ok(n) => n > 0,
            Err(_) => {
                eprintln!("argument = show images (1) or not (0)");
                return Ok(());
            }
        },
    };

    // Load configuration
    let config_path = std::env::var_os("CAMRELAY_CONFIG").map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;

    let mut relay = Relay::v4l2(config);
    if let Err(e) = relay.start() {
        error!("Could not connect to color camera: {}", e);
        return Ok(());
    }

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = Arc::clone(&interrupted);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                interrupted.store(true, Ordering::Release);
            }
        });
    }

    info!("Streaming video ...");
    let report = tokio::task::spawn_blocking(move || stream(relay, show, &interrupted)).await??;

    info!(
        "Camera stopped - {} frames at {:.2} fps ({} dropped)",
        report.frames,
        report.frames as f64 / report.elapsed.as_secs_f64().max(f64::EPSILON),
        report.dropped
    );
    Ok(())
}

struct Report {
    frames: u64,
    dropped: u64,
    elapsed: Duration,
}

fn stream(mut relay: Relay, show: bool, interrupted: &AtomicBool) -> Result<Report> {
    #[cfg(feature = "display")]
    let sdl_context = if show {
        Some(sdl2::init().map_err(|e| color_eyre::eyre::eyre!(e))?)
    } else {
        None
    };
    #[cfg(feature = "display")]
    let mut window = match (&sdl_context, relay.frame_format()) {
        (Some(sdl), Some(format)) => Some(camrelay::display::Sdl2Display::new(sdl, format)?),
        _ => None,
    };
    #[cfg(not(feature = "display"))]
    if show {
        warn!("Built without the display feature, not showing images");
    }

    let start = Instant::now();
    let mut window_start = start;
    let mut last_frame = start;
    let mut frames = 0u64;

    while !interrupted.load(Ordering::Acquire) {
        if relay.health() == Health::Ended {
            warn!("Camera stream ended");
            break;
        }
        let Some(frame) = relay.fetch(false) else {
            std::thread::sleep(Duration::from_millis(1));
            continue;
        };
        frames += 1;

        let now = Instant::now();
        let gap = now - last_frame;
        last_frame = now;
        if gap > LONG_GAP {
            warn!("-- frame {:5.1} ms", gap.as_secs_f64() * 1000.0);
        }
        if frames % REPORT_EVERY == 0 {
            info!(
                "{:3.1} fps",
                REPORT_EVERY as f64 / (now - window_start).as_secs_f64()
            );
            window_start = now;
        }

        #[cfg(feature = "display")]
        if let Some(display) = window.as_mut() {
            display.render_frame(&frame)?;
            if !display.pump() {
                break;
            }
        }
        #[cfg(not(feature = "display"))]
        let _ = frame;
    }

    let elapsed = start.elapsed();
    relay.stop();
    Ok(Report {
        frames,
        dropped: relay.stats().frames_dropped,
        elapsed,
    })
}
