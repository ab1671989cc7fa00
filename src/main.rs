use feedplay::cli::Args;
use feedplay::config::CoordinatorConfig;
use feedplay::core::coordinator::PlaybackCoordinator;
use feedplay::core::focus::{FeedHost, FocusPolicy, VideoContainer};
use feedplay::core::segment::PlaybackSegment;
use feedplay::sim::{SimBackend, SimFeed};

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;

/// Virtual time step for the simulated clock
const TICK_STEP: Duration = Duration::from_millis(100);

fn init_logging(args: &Args) -> Result<()> {
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path_opt) = &args.log_file {
        let log_path = log_path_opt
            .clone()
            .unwrap_or_else(|| "feedplay.log".into());
        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("Create log file {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();

        info!("Logging to file: {} (level: {:?})", log_path.display(), log_level);
    } else {
        // Console logging (respects RUST_LOG if set)
        let default_level = match args.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .format_timestamp_millis()
            .init();
    }
    Ok(())
}

/// Config file first, then CLI overrides
fn build_config(args: &Args) -> Result<CoordinatorConfig> {
    let mut config = match &args.config {
        Some(path) => CoordinatorConfig::load(path)?,
        None => CoordinatorConfig::default(),
    };
    if let Some(capacity) = args.cache_capacity {
        config.cache_capacity = capacity;
    }
    if args.mute {
        config.playback.muted = true;
    }
    if args.no_loop {
        config.playback.loop_on_end = false;
    }
    if args.segment_start.is_some() || args.segment_end.is_some() {
        config.playback.segment = Some(PlaybackSegment::new(args.segment_start, args.segment_end));
    }
    Ok(config)
}

/// Prefetch every visible clip so focus changes hit the cache
fn prefetch_visible(feed: &SimFeed, coord: &mut PlaybackCoordinator) {
    for (_, container) in feed.visible_containers() {
        if let Some(url) = container.video_url() {
            coord.ensure_loaded(&url);
        }
    }
}

/// Advance the virtual clock by `total`, handling events between steps
fn run_clock(backend: &SimBackend, coord: &mut PlaybackCoordinator, total: Duration) {
    let mut elapsed = Duration::ZERO;
    while elapsed < total {
        coord.wait_events(Duration::from_millis(5));
        backend.tick(TICK_STEP);
        elapsed += TICK_STEP;
    }
    coord.process_events();
}

fn report(step: usize, feed: &SimFeed, coord: &PlaybackCoordinator) {
    let active = coord.active_url().unwrap_or("-");
    let position = coord
        .active_url()
        .and_then(|url| coord.lookup(url))
        .map(|res| format!("{:.1}s", res.current_time().as_secs_f64()))
        .unwrap_or_else(|| "-".to_string());
    println!("step {:>3}  offset {:>7.1}  active {}  at {}", step, feed.offset(), active, position);
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args)?;

    info!("Feedplay simulator starting...");
    debug!("Command-line args: {:?}", args);

    let config = build_config(&args)?;
    debug!("Config: {}", config.to_json()?);

    let backend = Arc::new(
        SimBackend::new().with_probe_delay(Duration::from_millis(args.probe_delay_ms)),
    );
    let mut coord = PlaybackCoordinator::new(backend.clone(), config);

    let urls: Vec<String> = (0..args.items)
        .map(|i| format!("https://cdn.example.com/feed/{:03}.mp4", i))
        .collect();
    let (width, height) = args.viewport_size();
    let mut feed = SimFeed::new(&urls, args.row_height, width, height);
    let mut policy = FocusPolicy::new();
    let tick = Duration::from_millis(args.tick_ms);

    prefetch_visible(&feed, &mut coord);
    policy.on_appear(&feed, &mut coord);

    let mut step = 0;
    loop {
        run_clock(&backend, &mut coord, tick);
        report(step, &feed, &coord);

        if feed.offset() >= feed.max_offset() {
            break;
        }
        feed.scroll_by(args.scroll_step);
        prefetch_visible(&feed, &mut coord);
        let before = policy.focused().copied();
        let after = policy.on_scroll(&feed, &mut coord);
        if before != after {
            info!("Focus: {:?} -> {:?}", before, after);
        }
        step += 1;
    }

    // Background round trip: everything pauses, the binding resumes
    policy.on_background(&feed, &mut coord);
    run_clock(&backend, &mut coord, tick);
    policy.on_foreground(&feed, &mut coord);
    run_clock(&backend, &mut coord, tick);
    report(step + 1, &feed, &coord);

    let stats = coord.cache_stats();
    println!(
        "cache: {} cached, {} probes, {} hits, {} misses ({:.0}% hit rate), {} evictions",
        stats.len,
        stats.probes_started,
        stats.hits,
        stats.misses,
        stats.hit_rate() * 100.0,
        stats.evictions
    );
    Ok(())
}
