//! Camera commands - read, set and move through the daemon

use anyhow::{Result, bail};
use ptzcast_core::ControlResult;

use super::{connect, print_json, with_hint};

/// Print a control result, failing the command if the operation failed
fn report(result: ControlResult) -> Result<()> {
    if !result.success {
        bail!(
            "{}: {}",
            result.control,
            result.error.as_deref().unwrap_or("failed")
        );
    }
    match (result.value, result.message) {
        (Some(value), _) => println!("{} = {}", result.control, value),
        (None, Some(message)) => println!("{}", message),
        (None, None) => println!("{}: ok", result.control),
    }
    Ok(())
}

/// Read one control from the device
pub async fn get(control: &str) -> Result<()> {
    let mut client = connect().await?;
    let result = client.get_control(control).await.map_err(with_hint)?;
    if result.success && result.value.is_none() {
        println!("{}: no value reported", result.control);
        return Ok(());
    }
    report(result)
}

/// Set one control
pub async fn set(control: &str, value: i64) -> Result<()> {
    let mut client = connect().await?;
    report(client.set_control(control, value).await.map_err(with_hint)?)
}

/// Print the device's own control listing
pub async fn controls() -> Result<()> {
    let mut client = connect().await?;
    let listing = client.all_controls().await.map_err(with_hint)?;
    match (listing.success, listing.output, listing.error) {
        (true, Some(output), _) => print!("{}", output),
        (true, None, _) => println!("(no controls reported)"),
        (false, _, error) => bail!(
            "Failed to list controls: {}",
            error.as_deref().unwrap_or("unknown error")
        ),
    }
    Ok(())
}

/// Print the persisted camera config
pub async fn camera_config() -> Result<()> {
    let mut client = connect().await?;
    print_json(&client.camera_config().await.map_err(with_hint)?)
}

/// Restore all defaults
pub async fn reset() -> Result<()> {
    let mut client = connect().await?;
    println!("Resetting camera to defaults...");
    let report = client.reset_camera().await.map_err(with_hint)?;

    for result in report.results.iter().filter(|r| !r.success) {
        eprintln!(
            "  {}: {}",
            result.control,
            result.error.as_deref().unwrap_or("failed")
        );
    }
    println!(
        "Applied {} control(s), {} failed",
        report.results.len() - report.failures(),
        report.failures()
    );
    if report.failures() > 0 {
        bail!("Some controls could not be reset");
    }
    Ok(())
}

pub async fn pan(degrees: f64) -> Result<()> {
    let mut client = connect().await?;
    report(client.pan(degrees).await.map_err(with_hint)?)
}

pub async fn tilt(degrees: f64) -> Result<()> {
    let mut client = connect().await?;
    report(client.tilt(degrees).await.map_err(with_hint)?)
}

pub async fn zoom(level: i64) -> Result<()> {
    let mut client = connect().await?;
    report(client.zoom(level).await.map_err(with_hint)?)
}

/// Return to the home position
pub async fn home() -> Result<()> {
    let mut client = connect().await?;
    report(client.reset_position().await.map_err(with_hint)?)
}
