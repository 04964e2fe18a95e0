//! Tranzport command-line tool
//!
//! Attaches the driver to a connected Tranzport and exposes the
//! session surface from a terminal: dump incoming reports, send one
//! outgoing report, or just list what is on the bus.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tranzport::usb::{PRODUCT_ID, UsbTransport, VENDOR_ID, enumerate};
use tranzport::{Driver, DriverConfig, Error, Report, Wait, setup_logging};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "tranzport")]
#[command(author, version, about = "Frontier Tranzport control surface tool")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<std::path::PathBuf>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List connected Tranzport devices and exit
    List,
    /// Print incoming reports until the device goes away
    Monitor {
        /// Coalesce back-to-back wheel-turn reports
        #[arg(long)]
        compress_wheel: bool,
        /// Drop redundant "still offline" reports
        #[arg(long)]
        suppress_offline: bool,
    },
    /// Send one 8-byte report, given as hex bytes (e.g. 00 00 01 00 00 00 00 00)
    Send {
        #[arg(num_args = 8, value_name = "BYTE")]
        bytes: Vec<String>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.save_config {
        let config = DriverConfig::default();
        let path = DriverConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let config = match args.config {
        Some(ref path) => {
            DriverConfig::load(Some(path.clone())).context("Failed to load configuration")?
        }
        None => DriverConfig::load_or_default(),
    };

    let log_level = args.log_level.as_deref().unwrap_or(&config.log_level);
    setup_logging(log_level).map_err(|e| anyhow::anyhow!(e))?;

    info!("tranzport v{}", env!("CARGO_PKG_VERSION"));

    match args.command.unwrap_or(Command::Monitor {
        compress_wheel: false,
        suppress_offline: false,
    }) {
        Command::List => list_devices(),
        Command::Monitor {
            compress_wheel,
            suppress_offline,
        } => monitor(config, compress_wheel, suppress_offline),
        Command::Send { bytes } => send(config, &bytes),
    }
}

fn list_devices() -> Result<()> {
    let devices = enumerate(VENDOR_ID, PRODUCT_ID).context("USB enumeration failed")?;
    if devices.is_empty() {
        println!("No Tranzport found.");
        return Ok(());
    }
    println!("Found {} device(s):", devices.len());
    for device in devices {
        println!(
            "  {:04x}:{:04x} on bus {:03}, address {:03}",
            device.vendor_id, device.product_id, device.bus_number, device.address
        );
    }
    Ok(())
}

fn attach_first(config: &DriverConfig) -> Result<(Driver, tranzport::Device)> {
    let transport = UsbTransport::open_first(VENDOR_ID, PRODUCT_ID, config)
        .context("Failed to open Tranzport")?;
    let driver = Driver::new(config.clone());
    let device = driver.attach(Arc::new(transport));
    Ok((driver, device))
}

fn monitor(config: DriverConfig, compress_wheel: bool, suppress_offline: bool) -> Result<()> {
    let (driver, device) = attach_first(&config)?;
    if compress_wheel {
        device.set_compress_wheel_events(true);
    }
    if suppress_offline {
        device.set_suppress_offline_events(true);
    }

    let session = device.open().context("Failed to open session")?;
    info!(device = %device.id(), "monitoring, press Ctrl-C to stop");

    loop {
        match session.read(Wait::Blocking) {
            Ok(report) => {
                let offline = if device.is_offline() { "  [offline]" } else { "" };
                println!("{report}{offline}");
            }
            Err(Error::Disconnected) => {
                warn!("device disconnected");
                break;
            }
            Err(e) => bail!("read failed: {e}"),
        }
    }

    session.close();
    driver.detach(device.id());
    Ok(())
}

fn send(config: DriverConfig, bytes: &[String]) -> Result<()> {
    let report = parse_report(bytes)?;
    let (driver, device) = attach_first(&config)?;
    let session = device.open().context("Failed to open session")?;

    session
        .write(report, Wait::Timeout(Duration::from_secs(5)))
        .context("Write failed")?;
    println!("sent {report}");

    session.close();
    driver.detach(device.id());
    Ok(())
}

fn parse_report(bytes: &[String]) -> Result<Report> {
    if bytes.len() != tranzport::REPORT_LEN {
        bail!("expected exactly {} bytes", tranzport::REPORT_LEN);
    }
    let mut out = [0u8; tranzport::REPORT_LEN];
    for (slot, text) in out.iter_mut().zip(bytes) {
        let digits = text.strip_prefix("0x").unwrap_or(text);
        *slot = u8::from_str_radix(digits, 16)
            .with_context(|| format!("invalid hex byte '{text}'"))?;
    }
    Ok(Report::from(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_report() {
        let bytes: Vec<String> = ["00", "0xff", "01", "02", "03", "04", "05", "06"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let report = parse_report(&bytes).unwrap();
        assert_eq!(report.as_bytes(), &[0x00, 0xff, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
    }

    #[test]
    fn test_parse_report_rejects_bad_input() {
        let short: Vec<String> = vec!["00".to_string()];
        assert!(parse_report(&short).is_err());

        let bad: Vec<String> = ["zz"; 8].iter().map(|s| s.to_string()).collect();
        assert!(parse_report(&bad).is_err());
    }
}
