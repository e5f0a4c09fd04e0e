//! Everything the mode handlers act on.
//!
//! `ModeContext` owns the settings, every port adapter and both servers.
//! The mode machine threads `&mut ModeContext` through each handler call,
//! so handlers borrow exactly the fields they need.

use crate::app::access_point_server::AccessPointServer;
use crate::app::command_server::CommandServer;
use crate::app::ports::ListenerFactory;
use crate::config::RemoteControlSettings;
use crate::error::Result;
use crate::rpc::transport::Listener;

/// Connection type produced by a factory's listener.
pub type ConnectionOf<F> = <<F as ListenerFactory>::Listener as Listener>::Connection;

/// Polled during a station join; `true` aborts the join.
pub type OverrideSignal = Box<dyn FnMut() -> bool>;

pub struct ModeContext<W, S, F: ListenerFactory, B, const N: usize> {
    pub settings: RemoteControlSettings,

    // -- Ports --
    pub network: W,
    pub credentials: S,
    pub binder: F,
    pub broadcaster: B,

    // -- Servers --
    pub command_server: CommandServer<ConnectionOf<F>, N>,
    pub access_point_server: AccessPointServer,

    /// Manual override (e.g. a held button).  Absent means never asserted.
    pub manual_override: Option<OverrideSignal>,
}

impl<W, S, F: ListenerFactory, B, const N: usize> ModeContext<W, S, F, B, N> {
    /// Build both servers from `settings`.
    pub fn new(
        settings: RemoteControlSettings,
        network: W,
        credentials: S,
        binder: F,
        broadcaster: B,
    ) -> Result<Self> {
        let command_server = CommandServer::new(&settings.command_server)?;
        let access_point_server = AccessPointServer::new(&settings.access_point)?;
        Ok(Self {
            settings,
            network,
            credentials,
            binder,
            broadcaster,
            command_server,
            access_point_server,
            manual_override: None,
        })
    }

    /// Poll the manual override once.
    pub fn override_asserted(&mut self) -> bool {
        self.manual_override.as_mut().is_some_and(|signal| signal())
    }
}
