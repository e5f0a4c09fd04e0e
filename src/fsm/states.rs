//! Mode handler implementations.
//!
//! ```text
//!                 creds valid                 join ok
//!  Connecting ───────────────▶ ConnectedOperational ──▶ CommandServer::serve
//!      ▲    └─ creds invalid ─┐        │ join failed /       │ terminated /
//!      │                      ▼        ▼ bind failed         ▼ listener lost
//!      └──────────────── AccessPointFallback ◀───────────────┘
//!        stored / AP failed        │
//!                                  └──▶ AccessPointServer::serve
//! ```

use std::time::Duration;

use log::{debug, error, info, warn};

use crate::app::ports::{Broadcaster, ConnectivityError, ConnectivityPort, CredentialPort, ListenerFactory};

use super::context::ModeContext;
use super::{ModeMachine, OperatingMode};

/// One join second is split into this many override checks.
pub const JOIN_SLICES_PER_SEC: u32 = 10;
pub const JOIN_SLICE: Duration = Duration::from_millis(100);

/// Pause after leaving the access point before re-evaluating credentials.
pub const FALLBACK_SETTLE: Duration = Duration::from_millis(150);

// ---------------------------------------------------------------------------
// Connecting
// ---------------------------------------------------------------------------

pub fn connecting_update<W, S, F, B, const N: usize>(ctx: &mut ModeContext<W, S, F, B, N>) -> Option<OperatingMode>
where
    S: CredentialPort,
    F: ListenerFactory,
{
    ctx.credentials.reload();
    if ctx.credentials.is_valid() {
        info!("Mode: stored credentials for '{}' found", ctx.credentials.id());
        Some(OperatingMode::ConnectedOperational)
    } else {
        info!("Mode: no valid stored credentials");
        Some(OperatingMode::AccessPointFallback)
    }
}

// ---------------------------------------------------------------------------
// ConnectedOperational
// ---------------------------------------------------------------------------

/// Join the stored network, counting down `join_timeout_secs` one second
/// at a time.  Each second is sliced so the manual override is noticed
/// within [`JOIN_SLICE`].
pub fn join_network<W, S, F, B, const N: usize>(ctx: &mut ModeContext<W, S, F, B, N>) -> Result<(), ConnectivityError>
where
    W: ConnectivityPort,
    S: CredentialPort,
    F: ListenerFactory,
{
    let hostname = &ctx.settings.command_server.hostname;
    ctx.network
        .begin_station(hostname, ctx.credentials.id(), ctx.credentials.pass())?;
    info!("WiFi: connecting to '{}'", ctx.credentials.id());

    let mut remaining = ctx.settings.command_server.join_timeout_secs;
    while !ctx.network.is_connected() {
        if remaining == 0 {
            warn!("WiFi: connection timeout");
            ctx.network.disconnect();
            return Err(ConnectivityError::JoinTimeout);
        }
        for _ in 0..JOIN_SLICES_PER_SEC {
            if ctx.override_asserted() {
                warn!("WiFi: join aborted by manual override");
                ctx.network.disconnect();
                return Err(ConnectivityError::JoinAborted);
            }
            std::thread::sleep(JOIN_SLICE);
        }
        remaining -= 1;
        debug!("WiFi: joining, {remaining}s left");
    }

    match ctx.network.local_ip() {
        Some(ip) => info!("WiFi: connected to '{}' with IP {ip}", ctx.credentials.id()),
        None => info!("WiFi: connected to '{}'", ctx.credentials.id()),
    }
    Ok(())
}

pub fn operational_update<W, S, F, B, const N: usize>(ctx: &mut ModeContext<W, S, F, B, N>) -> Option<OperatingMode>
where
    W: ConnectivityPort,
    S: CredentialPort,
    F: ListenerFactory,
    B: Broadcaster,
{
    if let Err(e) = join_network(ctx) {
        warn!("Mode: station join failed: {e}");
        return Some(OperatingMode::AccessPointFallback);
    }

    let settings = &ctx.settings.command_server;
    let mut listener = match ctx.binder.bind(settings.port, &settings.tls) {
        Ok(listener) => listener,
        Err(e) => {
            error!("Mode: command server bind failed: {e}");
            ctx.network.disconnect();
            return Some(OperatingMode::AccessPointFallback);
        }
    };

    let local_ip = ctx.network.local_ip();
    let outcome = ctx.command_server.serve(&mut listener, &mut ctx.broadcaster, local_ip);
    info!("Mode: command server stopped ({outcome:?})");
    drop(listener);
    ctx.network.disconnect();
    Some(OperatingMode::AccessPointFallback)
}

// ---------------------------------------------------------------------------
// AccessPointFallback
// ---------------------------------------------------------------------------

pub fn fallback_update<W, S, F, B, const N: usize>(ctx: &mut ModeContext<W, S, F, B, N>) -> Option<OperatingMode>
where
    W: ConnectivityPort,
    S: CredentialPort,
    F: ListenerFactory,
{
    let settings = &ctx.settings.access_point;
    if let Err(e) = ctx.network.start_access_point(settings) {
        error!("Mode: {e}");
        std::thread::sleep(FALLBACK_SETTLE);
        return Some(OperatingMode::Connecting);
    }
    info!("WiFi: soft AP '{}' up at {}", settings.ssid, settings.ip_address);

    let mut listener = match ctx.binder.bind(settings.port, &settings.tls) {
        Ok(listener) => listener,
        Err(e) => {
            error!("Mode: AP server bind failed: {e}");
            std::thread::sleep(FALLBACK_SETTLE);
            return Some(OperatingMode::Connecting);
        }
    };

    let outcome = ctx.access_point_server.serve(&mut listener, &mut ctx.credentials);
    info!("Mode: AP server stopped ({outcome:?})");
    drop(listener);
    std::thread::sleep(FALLBACK_SETTLE);
    Some(OperatingMode::Connecting)
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

/// Mode machine with all three handlers installed.
pub fn build_mode_table<W, S, F, B, const N: usize>() -> ModeMachine<ModeContext<W, S, F, B, N>>
where
    W: ConnectivityPort,
    S: CredentialPort,
    F: ListenerFactory,
    B: Broadcaster,
{
    let mut machine = ModeMachine::new();
    machine.register(OperatingMode::Connecting, connecting_update::<W, S, F, B, N>);
    machine.register(OperatingMode::ConnectedOperational, operational_update::<W, S, F, B, N>);
    machine.register(OperatingMode::AccessPointFallback, fallback_update::<W, S, F, B, N>);
    machine
}
