//! Remote-control service, the hexagonal core.
//!
//! [`RemoteControl`] owns the mode machine and the context it drives.  The
//! embedding application registers actions and observers once, then calls
//! [`tick`](RemoteControl::tick) from its main loop.
//!
//! ```text
//!  ConnectivityPort ──▶ ┌───────────────────────────┐ ◀── ListenerFactory
//!                       │       RemoteControl        │
//!  CredentialPort  ◀──▶ │ ModeMachine · 2 servers    │ ──▶ Broadcaster
//!                       └───────────────────────────┘
//! ```

use std::net::SocketAddr;

use log::info;

use crate::config::RemoteControlSettings;
use crate::error::Result;
use crate::fsm::context::{ConnectionOf, ModeContext};
use crate::fsm::states::build_mode_table;
use crate::fsm::{ModeMachine, OperatingMode};
use crate::rpc::dispatch::ActionHandler;

use super::ports::{Broadcaster, ConnectivityPort, CredentialPort, ListenerFactory};

/// Remote-control stack with room for `N` command-server actions.
pub struct RemoteControl<W, S, F, B, const N: usize>
where
    W: ConnectivityPort,
    S: CredentialPort,
    F: ListenerFactory,
    B: Broadcaster,
{
    machine: ModeMachine<ModeContext<W, S, F, B, N>>,
    ctx: ModeContext<W, S, F, B, N>,
}

impl<W, S, F, B, const N: usize> RemoteControl<W, S, F, B, N>
where
    W: ConnectivityPort,
    S: CredentialPort,
    F: ListenerFactory,
    B: Broadcaster,
{
    /// Validate `settings` and assemble the stack.  Nothing touches the
    /// network until the first [`tick`](Self::tick).
    pub fn new(settings: RemoteControlSettings, network: W, credentials: S, binder: F, broadcaster: B) -> Result<Self> {
        settings.validate()?;
        let ctx = ModeContext::new(settings, network, credentials, binder, broadcaster)?;
        info!("RemoteControl: ready, starting in {}", OperatingMode::Connecting);
        Ok(Self {
            machine: build_mode_table(),
            ctx,
        })
    }

    // ── Registration ───────────────────────────────────────────

    /// Serve `handler` on the command server under `name`.  Returns `false`
    /// when all `N` slots are taken or the name is longer than a field.
    pub fn add_action<H>(&mut self, name: &str, handler: H) -> bool
    where
        H: ActionHandler<ConnectionOf<F>> + 'static,
    {
        self.ctx.command_server.register_action(name, handler)
    }

    pub fn set_on_client_connection(&mut self, observer: impl FnMut(Option<SocketAddr>) + 'static) {
        self.ctx.command_server.observers_mut().on_new_connection = Some(Box::new(observer));
    }

    pub fn set_on_connection_close(&mut self, observer: impl FnMut() + 'static) {
        self.ctx.command_server.observers_mut().on_connection_close = Some(Box::new(observer));
    }

    pub fn set_on_server_loop(&mut self, observer: impl FnMut() + 'static) {
        self.ctx.command_server.observers_mut().on_server_loop = Some(Box::new(observer));
    }

    pub fn set_on_server_termination(&mut self, observer: impl FnMut() + 'static) {
        self.ctx.command_server.observers_mut().on_server_termination = Some(Box::new(observer));
    }

    pub fn set_on_access_point_loop(&mut self, observer: impl FnMut() + 'static) {
        self.ctx.access_point_server.set_on_loop(Box::new(observer));
    }

    /// Signal polled while joining a network; `true` abandons the join and
    /// drops to the access point.
    pub fn set_manual_override(&mut self, signal: impl FnMut() -> bool + 'static) {
        self.ctx.manual_override = Some(Box::new(signal));
    }

    // ── Driving ────────────────────────────────────────────────

    /// Run the current mode once.  May block for as long as a server runs.
    pub fn tick(&mut self) {
        self.machine.tick(&mut self.ctx);
    }

    pub fn mode(&self) -> OperatingMode {
        self.machine.current_mode()
    }

    pub fn force_mode(&mut self, mode: OperatingMode) {
        self.machine.force_mode(mode);
    }

    pub fn settings(&self) -> &RemoteControlSettings {
        &self.ctx.settings
    }

    pub fn credentials(&self) -> &S {
        &self.ctx.credentials
    }

    pub fn network(&self) -> &W {
        &self.ctx.network
    }

    pub fn network_mut(&mut self) -> &mut W {
        &mut self.ctx.network
    }
}
