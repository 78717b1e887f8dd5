use std::env;

use watts_vision::{DEFAULT_SCAN_INTERVAL, HvacAction, SmartHome, WattsClient};

fn print_home(home: &SmartHome) {
    println!("== {} ({})", home.label, home.smarthome_id);
    for zone in &home.zones {
        for device in &zone.devices {
            let temp = device
                .air_temperature()
                .map(|t| t.to_string())
                .unwrap_or_else(|| "?".to_string());
            let target = device
                .target_temperature()
                .map(|t| t.to_string())
                .unwrap_or_else(|| "-".to_string());
            let mode = device.mode().map(|m| m.label()).unwrap_or("unknown");
            println!(
                "[{}] {temp} -> {target} | {mode}{}",
                zone.zone_label,
                if device.hvac_action() == HvacAction::Heating { " | HEATING" } else { "" },
            );
        }
    }
}

#[tokio::main]
async fn main() -> watts_vision::Result<()> {
    tracing_subscriber::fmt::init();

    let username = env::var("WATTS_USERNAME").expect("usage: WATTS_USERNAME=... WATTS_PASSWORD=... poll");
    let password = env::var("WATTS_PASSWORD").expect("usage: WATTS_USERNAME=... WATTS_PASSWORD=... poll");

    let mut client = WattsClient::builder(username, password)
        .on_event(|event| println!("{event:?}"))
        .on_snapshot(print_home)
        .build()?;

    println!("Logging in...");
    client.load_all().await?;
    println!("Loaded. Reloading every {}s...", DEFAULT_SCAN_INTERVAL.as_secs());

    for id in client.smart_homes().iter().map(|h| h.smarthome_id.clone()).collect::<Vec<_>>() {
        match client.last_communication(&id).await {
            Ok(last) => println!("{id}: last communication {last}"),
            Err(e) => eprintln!("{id}: {e}"),
        }
    }

    loop {
        tokio::time::sleep(DEFAULT_SCAN_INTERVAL).await;
        if let Err(e) = client.reload().await {
            eprintln!("Reload error: {e}");
        }
    }
}
