/**
 * NDI Tracker Runner
 *
 * Standalone host for the driver:
 * 1. Loads the TOML configuration and names the configured ports
 * 2. Configures the tracker and starts tracking
 * 3. Publishes one frame of relative transforms per tick
 * 4. Stops and closes the port after --cycles ticks (or runs forever)
 *
 * Usage: ndi_tracker [--config ndi.toml] [--device /dev/ttyUSB0] [--reference ref]
 */

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::thread;
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use ndi_track::{load_config, FnSink, NdiDriver, SerialTransport, SystemClock, TransformStamped};

#[derive(Parser, Debug)]
#[command(name = "ndi_tracker")]
#[command(about = "Publishes NDI tool poses relative to a reference tool")]
#[command(version)]
struct Args{
    /// Path to configuration file
    #[arg(short, long, default_value = "ndi.toml")]
    config: PathBuf,

    /// Serial device, overrides the configuration file
    #[arg(short, long)]
    device: Option<String>,

    /// Reference tool name, overrides the configuration file
    #[arg(short, long)]
    reference: Option<String>,

    /// Number of tracking cycles to run before shutting down
    #[arg(long)]
    cycles: Option<u64>,

    /// Log filter: a level (trace, debug, info, warn, error) or directives such as "ndi_track=debug"
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn log_transform(t: TransformStamped){
    let q = t.rotation.quaternion();
    info!(
        parent = %t.parent_frame,
        child = %t.child_frame,
        x = t.translation.x,
        y = t.translation.y,
        z = t.translation.z,
        qx = q.i,
        qy = q.j,
        qz = q.k,
        qw = q.w,
        "transform"
    );
}

fn log_filter(directives: &str) -> EnvFilter{
    EnvFilter::try_new(directives.to_lowercase()).unwrap_or_else(|_| EnvFilter::new("info"))
}

fn main() -> Result<()>{
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(log_filter(&args.log_level))
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("ndi_tracker v{}", env!("CARGO_PKG_VERSION"));

    let mut config = load_config(&args.config)?;
    if let Some(device) = args.device{
        config.device_path = device;
    }
    if let Some(reference) = args.reference{
        config.reference_frame = reference;
    }

    info!(
        device = %config.device_path,
        reference = %config.reference_frame,
        tip = %config.tip_frame,
        "configuration loaded"
    );

    let transport = SerialTransport::new().with_read_timeout(config.read_timeout());
    let mut driver = NdiDriver::new(
        transport,
        config.settings(),
        Box::new(SystemClock),
        Box::new(FnSink(log_transform)),
    );
    for port in &config.ports{
        driver.assign_port_name(&port.handle, &port.name);
    }

    driver.configure()?;
    for port in driver.registry().iter(){
        info!(handle = %port.handle, name = %port.name, tool_type = %port.tool_type, serial = %port.serial_number, "port");
    }
    driver.start()?;

    let period = config.update_period();
    let mut cycle = 0u64;
    while args.cycles.map_or(true, |limit| cycle < limit){
        let tick = Instant::now();
        if let Err(e) = driver.update(){
            warn!(cycle, error = %e, "tracking cycle failed");
        }
        cycle += 1;
        if let Some(rest) = period.checked_sub(tick.elapsed()){
            thread::sleep(rest);
        }
    }

    if let Err(e) = driver.stop(){
        warn!(error = %e, "tracker did not confirm stop");
    }
    driver.cleanup();
    info!(cycles = cycle, "shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests{
    use super::*;

    #[test]
    fn test_log_filter_accepts_levels_and_directives(){
        assert_eq!(log_filter("DEBUG").to_string(), "debug");
        assert_eq!(log_filter("ndi_track=trace").to_string(), "ndi_track=trace");
    }

    #[test]
    fn test_cli_defaults(){
        let args = Args::parse_from(["ndi_tracker"]);
        assert_eq!(args.config, PathBuf::from("ndi.toml"));
        assert_eq!(args.log_level, "info");
        assert!(args.cycles.is_none());
    }
}
