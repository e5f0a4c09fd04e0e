//! Operational command server.
//!
//! Runs while the device is joined to the configured network.  One client
//! at a time, one request per connection:
//!
//! ```text
//!  accept ─▶ observe(peer) ─▶ authenticate ─┬─▶ read request ─▶ dispatch ─┐
//!                                           └─ rejected ──────────────────┤
//!                                                                        ▼
//!                              observe(close) ◀── [terminated? observe] ◀┘
//!                                     │
//!                                   close
//! ```
//!
//! Every pass of the loop, the terminating one included, fires the per-loop
//! observer and ticks the discovery beacon.  Passes that keep serving then
//! sleep [`LOOP_DELAY`].

use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use log::{info, warn};

use crate::config::CommandServerSettings;
use crate::error::Result;
use crate::rpc::auth::AuthenticationGate;
use crate::rpc::codec::ActionMap;
use crate::rpc::dispatch::{ActionDispatcher, ActionHandler};
use crate::rpc::transport::{Listener, Transport};

use super::discovery::DiscoveryBeacon;
use super::events::ServerObservers;
use super::ports::Broadcaster;

/// Pause between loop passes.
pub const LOOP_DELAY: Duration = Duration::from_millis(20);

/// Why a serve loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeOutcome {
    /// An action handler asked the server to stop.
    Terminated,
    /// The listening socket failed.
    ListenerClosed,
}

/// Authenticated action server with up to `N` registered actions.
pub struct CommandServer<C: Transport, const N: usize> {
    auth: AuthenticationGate,
    dispatcher: ActionDispatcher<C, N>,
    observers: ServerObservers,
    beacon: DiscoveryBeacon,
    timeout: Duration,
}

impl<C: Transport, const N: usize> CommandServer<C, N> {
    pub fn new(settings: &CommandServerSettings) -> Result<Self> {
        let timeout = Duration::from_millis(u64::from(settings.timeout_ms));
        Ok(Self {
            auth: AuthenticationGate::new(&settings.auth_username, &settings.auth_password, timeout)?,
            dispatcher: ActionDispatcher::new(),
            observers: ServerObservers::default(),
            beacon: DiscoveryBeacon::new(settings),
            timeout,
        })
    }

    /// Register `handler` under `name`.  A handler returning `true` ends
    /// the serve loop after its connection is closed.
    pub fn register_action<H>(&mut self, name: &str, handler: H) -> bool
    where
        H: ActionHandler<C> + 'static,
    {
        let added = self.dispatcher.register(name, handler);
        if !added {
            warn!("Command server: cannot register action '{name}'");
        }
        added
    }

    pub fn observers_mut(&mut self) -> &mut ServerObservers {
        &mut self.observers
    }

    /// Serve `listener` until an action terminates the loop or the listener
    /// fails.  `local_ip` aims the discovery beacon.
    pub fn serve<L, B>(&mut self, listener: &mut L, broadcaster: &mut B, local_ip: Option<Ipv4Addr>) -> ServeOutcome
    where
        L: Listener<Connection = C> + ?Sized,
        B: Broadcaster + ?Sized,
    {
        self.beacon.start(local_ip);
        info!("Command server: serving");

        loop {
            if !listener.is_open() {
                warn!("Command server: listener closed");
                return ServeOutcome::ListenerClosed;
            }

            let terminated = listener
                .accept()
                .is_some_and(|mut conn| self.handle_connection(&mut conn));

            self.observers.server_loop();
            self.beacon.tick(Instant::now(), broadcaster);
            if terminated {
                info!("Command server: terminated by action");
                return ServeOutcome::Terminated;
            }
            std::thread::sleep(LOOP_DELAY);
        }
    }

    /// One connection, start to close.  Returns `true` if the dispatched
    /// action asked to terminate.
    fn handle_connection(&mut self, conn: &mut C) -> bool {
        let peer = conn.peer_addr();
        match peer {
            Some(addr) => info!("Command server: connection from {addr}"),
            None => info!("Command server: connection accepted"),
        }
        self.observers.new_connection(peer);

        let mut terminate = false;
        if self.auth.authenticate(conn) {
            let request = ActionMap::read_from(conn, self.timeout);
            terminate = self.dispatcher.dispatch(&request, conn);
            if terminate {
                self.observers.server_termination();
            }
        } else {
            warn!("Command server: authentication failed");
        }

        self.observers.connection_close();
        conn.close();
        terminate
    }
}
