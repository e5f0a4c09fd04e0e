//! Remote-control firmware: main entry point.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  WifiAdapter      CredentialStore<NvsAdapter>   TlsBinder      │
//! │  (Connectivity)   (Credentials)                 (Listeners)    │
//! │  UdpBroadcaster   OverrideButton                               │
//! │  (Discovery)      (manual override)                            │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │           RemoteControl (mode machine + servers)       │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! On the device the settings document is compiled in from
//! `settings.json`.  The host build runs the same stack in simulation and
//! takes the settings path as its first argument.

use anyhow::Result;
use log::{info, warn};

use remote_control::adapters::credentials::CredentialStore;
use remote_control::adapters::nvs::NvsAdapter;
use remote_control::adapters::tls_transport::{TlsBinder, TlsConnection};
use remote_control::adapters::udp::UdpBroadcaster;
use remote_control::adapters::wifi::WifiAdapter;
use remote_control::config::RemoteControlSettings;
use remote_control::rpc::codec::ActionMap;
use remote_control::rpc::response;
use remote_control::RemoteControl;

/// Command-server action slots.
const ACTION_SLOTS: usize = 4;

type Stack = RemoteControl<WifiAdapter, CredentialStore<NvsAdapter>, TlsBinder, UdpBroadcaster, ACTION_SLOTS>;

/// `"1"`/`"high"`/`"on"` or `"0"`/`"low"`/`"off"`.
fn parse_level(request: &ActionMap) -> Option<bool> {
    match request.get_str("level")? {
        "1" | "high" | "on" => Some(true),
        "0" | "low" | "off" => Some(false),
        _ => None,
    }
}

/// `forget`: acknowledge and stop the command server, dropping the device
/// back to its access point.
fn forget(_request: &ActionMap, conn: &mut TlsConnection) -> bool {
    info!("Action: forget, leaving operational mode");
    response::reply(conn, true);
    true
}

fn register_observers(rc: &mut Stack) {
    rc.set_on_client_connection(|peer| match peer {
        Some(addr) => info!("Client connected from {}", addr),
        None => info!("Client connected"),
    });
    rc.set_on_server_termination(|| info!("Command server terminated by action"));
}

// ── Device ────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
fn main() -> Result<()> {
    use esp_idf_hal::gpio::{PinDriver, Pull};
    use esp_idf_hal::peripherals::Peripherals;
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;
    use esp_idf_svc::wifi::EspWifi;
    use remote_control::adapters::button::OverrideButton;

    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  RemoteControl v{}                ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Settings ───────────────────────────────────────────
    let settings = RemoteControlSettings::from_json(include_str!("../settings.json"))
        .map_err(|e| anyhow::anyhow!("embedded settings rejected: {e}"))?;

    // ── 3. Peripherals and adapters ───────────────────────────
    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;

    let wifi = EspWifi::new(peripherals.modem, sysloop, Some(nvs_partition.clone()))?;
    let network = WifiAdapter::new(wifi);
    let credentials = CredentialStore::new(NvsAdapter::new(nvs_partition));

    let mut output = PinDriver::output(peripherals.pins.gpio2)?;
    let mut override_pin = PinDriver::input(peripherals.pins.gpio0)?;
    override_pin.set_pull(Pull::Up)?;
    let mut button = OverrideButton::new(override_pin);

    // ── 4. Stack ──────────────────────────────────────────────
    let mut rc: Stack = RemoteControl::new(settings, network, credentials, TlsBinder, UdpBroadcaster::new())
        .map_err(|e| anyhow::anyhow!("remote control init failed: {e}"))?;

    rc.add_action("setpin", move |request: &ActionMap, conn: &mut TlsConnection| {
        let ok = match parse_level(request) {
            Some(true) => output.set_high().is_ok(),
            Some(false) => output.set_low().is_ok(),
            None => {
                warn!("Action: setpin without a valid level");
                false
            }
        };
        response::reply(conn, ok);
        false
    });
    rc.add_action("forget", forget);
    rc.set_manual_override(move || button.poll());
    register_observers(&mut rc);

    // ── 5. Run ────────────────────────────────────────────────
    loop {
        rc.tick();
    }
}

// ── Host simulator ────────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
fn init_logging() -> Result<()> {
    use fern::colors::{Color, ColoredLevelConfig};

    let colors = ColoredLevelConfig::new()
        .debug(Color::Blue)
        .info(Color::Green)
        .warn(Color::Yellow)
        .error(Color::Red);

    fern::Dispatch::new()
        .level(log::LevelFilter::Debug)
        .format(move |out, message, record| {
            out.finish(format_args!(
                "[{} {}] {}",
                colors.color(record.level()),
                record.target(),
                message
            ));
        })
        .chain(std::io::stdout())
        .apply()?;
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
fn main() -> Result<()> {
    init_logging()?;
    info!("RemoteControl v{} (host simulation)", env!("CARGO_PKG_VERSION"));

    let path = std::env::args().nth(1).unwrap_or_else(|| "settings.json".into());
    let text = std::fs::read_to_string(&path)
        .map_err(|e| anyhow::anyhow!("cannot read settings '{path}': {e}"))?;
    let settings = RemoteControlSettings::from_json(&text)
        .map_err(|e| anyhow::anyhow!("settings '{path}' rejected: {e}"))?;

    let credentials = CredentialStore::new(NvsAdapter::new());
    let mut rc: Stack = RemoteControl::new(
        settings,
        WifiAdapter::new(),
        credentials,
        TlsBinder,
        UdpBroadcaster::new(),
    )
    .map_err(|e| anyhow::anyhow!("remote control init failed: {e}"))?;

    let mut level = false;
    rc.add_action("setpin", move |request: &ActionMap, conn: &mut TlsConnection| {
        let parsed = parse_level(request);
        if let Some(new_level) = parsed {
            level = new_level;
            info!("Action: setpin -> {}", if level { "high" } else { "low" });
        } else {
            warn!("Action: setpin without a valid level");
        }
        response::reply(conn, parsed.is_some());
        false
    });
    rc.add_action("forget", forget);
    register_observers(&mut rc);

    loop {
        rc.tick();
    }
}
