//! Groovy Pattern - streams a moving test pattern to a MiSTer
//!
//! Useful for checking the link, the mode tables and frame pacing without
//! an emulator.

use clap::Parser;
use groovy::{CompressionLevel, Device, OutputFamily};
use groovy_cli::{compact_stats, display_session_stats, format_nanos, Config, SquareWave, TestPattern};
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "groovy-pattern")]
#[command(about = "Stream a test pattern to a MiSTer running the Groovy core", long_about = None)]
struct Args {
    /// TOML configuration file; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Device host name or address
    #[arg(long)]
    host: Option<String>,

    /// Control port
    #[arg(long)]
    port: Option<u16>,

    /// Compression level (0 raw, 1-2 fast, 3-4 high, 5-6 adaptive; even levels use delta)
    #[arg(short = 'z', long)]
    compression: Option<u8>,

    /// Link MTU in bytes
    #[arg(long)]
    mtu: Option<u16>,

    /// Output family (auto, ntsc240p, ntsc480i, vga)
    #[arg(long)]
    family: Option<String>,

    /// Pattern width
    #[arg(long)]
    width: Option<u16>,

    /// Pattern height
    #[arg(long)]
    height: Option<u16>,

    /// Refresh rate in Hz
    #[arg(long)]
    refresh: Option<f64>,

    /// Frames to send, 0 for unlimited
    #[arg(short = 'n', long)]
    frames: Option<u64>,

    /// Send a test tone
    #[arg(long)]
    tone: bool,

    /// Submit bulk datagrams in batches
    #[arg(long)]
    batched: bool,

    /// Write the effective configuration to this file and exit
    #[arg(long)]
    write_config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn parse_family(family: &str) -> anyhow::Result<OutputFamily> {
    match family {
        "auto" => Ok(OutputFamily::Auto),
        "ntsc240p" | "240p" => Ok(OutputFamily::Ntsc240p),
        "ntsc480i" | "480i" => Ok(OutputFamily::Ntsc480i),
        "vga" => Ok(OutputFamily::Vga),
        other => anyhow::bail!("unknown output family: {}", other),
    }
}

fn effective_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    if let Some(host) = &args.host {
        config.device.host = host.clone();
    }
    if let Some(port) = args.port {
        config.device.port = port;
        config.device.input_port = port.wrapping_add(1);
    }
    if let Some(level) = args.compression {
        config.device.compression =
            CompressionLevel::try_from(level).map_err(anyhow::Error::msg)?;
    }
    if let Some(mtu) = args.mtu {
        config.device.mtu = mtu;
    }
    if let Some(family) = &args.family {
        config.device.family = parse_family(family)?;
    }
    if let Some(width) = args.width {
        config.pattern.width = width;
    }
    if let Some(height) = args.height {
        config.pattern.height = height;
    }
    if let Some(refresh) = args.refresh {
        config.pattern.refresh_hz = refresh;
    }
    if let Some(frames) = args.frames {
        config.pattern.frames = frames;
    }
    config.pattern.tone |= args.tone;
    config.device.batched_send |= args.batched;

    config.validate()?;
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = effective_config(&args)?;
    if let Some(path) = &args.write_config {
        config.to_file(path)?;
        tracing::info!("Configuration written to {}", path.display());
        return Ok(());
    }

    let mut device = Device::connect(config.device.clone())?;
    tracing::info!("Connected, ping {}", format_nanos(device.ping_ns()));
    if let Some(version) = device.query_version() {
        tracing::info!("Groovy core version {}", version);
    }

    let pattern_config = &config.pattern;
    let timing = device.set_resolution(
        pattern_config.width,
        pattern_config.height,
        pattern_config.refresh_hz,
    );
    let field_ns = timing.mode.field_time_ns();
    tracing::info!(
        "Field time {}, line time {}",
        format_nanos(field_ns),
        format_nanos(timing.mode.line_time_ns())
    );

    // the device scans the negotiated mode, not the requested size
    let mut pattern = TestPattern::for_mode(&timing.mode);
    if (pattern.width(), pattern.height())
        != (pattern_config.width as usize, pattern_config.height as usize)
    {
        tracing::info!(
            "{}x{} requested, streaming {}x{}",
            pattern_config.width,
            pattern_config.height,
            pattern.width(),
            pattern.height()
        );
    }
    let mut tone = pattern_config
        .tone
        .then(|| SquareWave::new(config.device.sound_rate, config.device.sound_channels, 440));

    let start = Instant::now();
    let mut last_stats = start;
    let mut n = 0u64;
    while pattern_config.frames == 0 || n < pattern_config.frames {
        let field = device.next_field();
        device.blit(pattern.render(n, pattern_config.scroll), field, 0);

        if let Some(tone) = tone.as_mut() {
            device.push_audio(&tone.next_block(field_ns));
            device.flush_audio();
        }

        device.wait_sync();
        if device.poll_inputs() {
            let pad = device.inputs().pad(0);
            tracing::debug!("input: pad 0 {:?}", pad);
        }

        n += 1;
        if last_stats.elapsed() >= pattern_config.stats_interval() {
            tracing::info!("{}", compact_stats(device.stats(), start.elapsed()));
            last_stats = Instant::now();
        }
    }

    device.close();
    display_session_stats(device.stats(), start.elapsed());
    Ok(())
}
