use anyhow::Result;
use colored::*;
use serde::Serialize;

use droidmemd::gateway::{self, AdbGateway, Gateway};
use droidmemd::{AttachedDevice, DeviceInfo};

#[derive(Serialize, Debug)]
struct DoctorReport {
    adb_path: String,
    adb: Result<String, String>,
    devices: Vec<AttachedDevice>,
    device: Option<DeviceInfo>,
}

async fn collect(adb_gateway: &AdbGateway) -> DoctorReport {
    let adb_path = adb_gateway.adb_path().display().to_string();
    let gateway: &dyn Gateway = adb_gateway;
    let adb = match gateway.run_host(&["version"]).await {
        Ok(out) => Ok(out.lines().next().unwrap_or_default().trim().to_string()),
        Err(err) => Err(err.to_string()),
    };
    if adb.is_err() {
        return DoctorReport {
            adb_path,
            adb,
            devices: Vec::new(),
            device: None,
        };
    }

    let devices = gateway::list_devices(gateway).await.unwrap_or_default();
    let device = if devices.iter().any(AttachedDevice::is_authorized) {
        Some(gateway::device_info(gateway).await)
    } else {
        None
    };
    DoctorReport {
        adb_path,
        adb,
        devices,
        device,
    }
}

/// Always succeeds; problems are reported inline.
pub async fn run_doctor(gateway: &AdbGateway, json: bool) -> Result<()> {
    let report = collect(gateway).await;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", "🩺 droidmem doctor".bold().cyan());
    println!("{}", "Checking adb and device...".dimmed());
    println!();

    println!("• adb path:           {}", report.adb_path);
    print!("• adb executable:     ");
    match &report.adb {
        Ok(version) => println!("{}", format!("OK ({version})").green()),
        Err(err) => {
            println!("{}", format!("FAIL ({err})").red());
            return Ok(());
        }
    }

    print!("• Attached devices:   ");
    if report.devices.is_empty() {
        println!("{}", "none".red());
        println!("  → Connect a device with USB debugging enabled.");
    } else {
        println!("{}", report.devices.len().to_string().green());
        for device in &report.devices {
            let state = if device.is_authorized() {
                device.state.green()
            } else {
                device.state.yellow()
            };
            println!("    {:<24} {}", device.serial, state);
        }
    }

    print!("• Device:             ");
    match &report.device {
        Some(info) => println!(
            "{}",
            format!("{} (Android {})", info.model, info.android_version).green()
        ),
        None => {
            println!("{}", "not available".yellow());
            println!("  → Accept the debugging prompt on the device and retry.");
        }
    }

    println!();
    if report.device.is_some() {
        println!("{}", "✅ Ready to monitor.".bold().green());
    } else {
        println!("{}", "⚠️  No usable device. See above.".bold().yellow());
    }
    Ok(())
}
