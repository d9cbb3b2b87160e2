use std::time::Duration;

use color_eyre::eyre::{bail, eyre, Result};
use voltlink_protocol::{ReadingPayload, StatsSnapshot};

use crate::daemon::{is_daemon_running, DaemonClient};

fn connect() -> Result<DaemonClient> {
    if !is_daemon_running() {
        bail!("Daemon is not running. Start it with: voltlink daemon start");
    }
    DaemonClient::connect_with_version_check().map_err(|e| eyre!("{}", e))
}

pub fn run(watch: bool, json: bool) -> Result<()> {
    let mut client = connect()?;
    let stats = client.get_stats().map_err(|e| eyre!("{}", e))?;
    print_stats(&stats, json)?;

    if !watch {
        return Ok(());
    }

    client.subscribe().map_err(|e| eyre!("{}", e))?;
    client.set_read_timeout(None).map_err(|e| eyre!("{}", e))?;
    loop {
        let stats = client.next_update().map_err(|e| eyre!("{}", e))?;
        if !json {
            println!();
        }
        print_stats(&stats, json)?;
    }
}

pub fn reload() -> Result<()> {
    let mut client = connect()?;
    let result = client.reconfigure().map_err(|e| eyre!("{}", e))?;

    match (result.provider, result.error) {
        (_, Some(error)) => bail!("Battery provider not started: {}", error),
        (Some(provider), None) => println!("Battery provider active: {}", provider),
        (None, None) => println!("Battery support disabled."),
    }
    Ok(())
}

pub fn push(reading: ReadingPayload) -> Result<()> {
    let mut client = connect()?;
    client.push_reading(reading).map_err(|e| eyre!("{}", e))?;
    println!("Reading accepted.");
    Ok(())
}

fn print_stats(stats: &StatsSnapshot, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(stats)?);
    } else {
        print!("{}", format_stats(stats));
    }
    Ok(())
}

fn format_stats(stats: &StatsSnapshot) -> String {
    let Some(provider) = stats.provider.as_deref() else {
        return "Battery support disabled.\n".to_string();
    };

    let mut out = format!("Provider:     {}\n", provider);
    if !stats.has_data {
        out.push_str("Waiting for the first reading...\n");
        return out;
    }

    out.push_str(&format!("Charge:       {:.1}%\n", stats.soc_percent));
    out.push_str(&format!("Voltage:      {:.2} V\n", stats.voltage_v));
    out.push_str(&format!("Current:      {:.2} A\n", stats.current_a));
    out.push_str(&format!("Power:        {:.1} W\n", stats.power_w));
    out.push_str(&format!("State:        {}\n", stats.charge_state.label()));
    if let Some(temperature) = stats.temperature_c {
        out.push_str(&format!("Temperature:  {:.1} °C\n", temperature));
    }
    if let Some(manufacturer) = &stats.manufacturer {
        out.push_str(&format!("Manufacturer: {}\n", manufacturer));
    }
    if let Some(age_ms) = stats.age_ms {
        let age = humantime::format_duration(Duration::from_secs(age_ms / 1000));
        out.push_str(&format!("Age:          {}\n", age));
    }

    out
}
