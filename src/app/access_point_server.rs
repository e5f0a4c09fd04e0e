//! Provisioning server on the fallback access point.
//!
//! Same one-request-per-connection lifecycle as the command server, but
//! the only action is the built-in `setwifi`:
//!
//! ```text
//! {"action":"setwifi", "bssid":"<network id>", "password":"<passphrase>"}
//! ```
//!
//! A stored update answers `ok` and ends the loop so the mode machine can
//! retry the station join.  Anything else answers `error` and the server
//! keeps waiting for the next client.

use std::time::Duration;

use log::{info, warn};

use crate::config::AccessPointSettings;
use crate::error::{Error, Result};
use crate::rpc::auth::AuthenticationGate;
use crate::rpc::codec::{ActionMap, Field, field};
use crate::rpc::dispatch::ActionDispatcher;
use crate::rpc::response;
use crate::rpc::transport::{Listener, Transport};

use super::command_server::{LOOP_DELAY, ServeOutcome};
use super::events::LoopObserver;
use super::ports::CredentialPort;

pub const SET_WIFI_ACTION: &str = "setwifi";
pub const BSSID_KEY: &str = "bssid";
pub const PASSWORD_KEY: &str = "password";

/// Network credentials a provisioning action asks to store.  Filled by
/// the action handler, persisted by the server once dispatch succeeds.
#[derive(Debug, Default)]
pub struct PendingCredentials {
    network: Option<(Field, Field)>,
}

impl PendingCredentials {
    pub fn set(&mut self, bssid: &str, password: &str) -> bool {
        let (Some(bssid), Some(password)) = (field(bssid), field(password)) else {
            return false;
        };
        self.network = Some((bssid, password));
        true
    }

    fn persist<P: CredentialPort + ?Sized>(self, credentials: &mut P) -> bool {
        let Some((bssid, password)) = self.network else {
            return false;
        };
        if !credentials.update(&bssid, &password) {
            warn!("AP server: could not persist credentials");
            return false;
        }
        info!("AP server: stored credentials for '{bssid}'");
        true
    }
}

pub struct AccessPointServer {
    auth: AuthenticationGate,
    timeout: Duration,
    actions: ActionDispatcher<PendingCredentials, 1>,
    on_loop: Option<LoopObserver>,
}

impl AccessPointServer {
    pub fn new(settings: &AccessPointSettings) -> Result<Self> {
        let timeout = Duration::from_millis(u64::from(settings.timeout_ms));
        let mut actions = ActionDispatcher::new();
        if !actions.register(SET_WIFI_ACTION, set_wifi) {
            return Err(Error::Init("setwifi action not registered"));
        }
        Ok(Self {
            auth: AuthenticationGate::new(&settings.auth_username, &settings.auth_password, timeout)?,
            timeout,
            actions,
            on_loop: None,
        })
    }

    /// Called once per loop pass while the access point is serving.
    pub fn set_on_loop(&mut self, observer: LoopObserver) {
        self.on_loop = Some(observer);
    }

    /// Serve until credentials are stored or the listener fails.
    pub fn serve<L, P>(&mut self, listener: &mut L, credentials: &mut P) -> ServeOutcome
    where
        L: Listener + ?Sized,
        P: CredentialPort + ?Sized,
    {
        info!("AP server: serving");
        loop {
            if !listener.is_open() {
                warn!("AP server: listener closed");
                return ServeOutcome::ListenerClosed;
            }

            if let Some(mut conn) = listener.accept() {
                let stored = self.handle_connection(&mut conn, credentials);
                info!("AP server: closing connection");
                conn.close();
                if stored {
                    info!("AP server: credentials updated, leaving access point");
                    return ServeOutcome::Terminated;
                }
            }

            if let Some(cb) = self.on_loop.as_mut() {
                cb();
            }
            std::thread::sleep(LOOP_DELAY);
        }
    }

    fn handle_connection<T, P>(&mut self, conn: &mut T, credentials: &mut P) -> bool
    where
        T: Transport + ?Sized,
        P: CredentialPort + ?Sized,
    {
        if let Some(addr) = conn.peer_addr() {
            info!("AP server: connection from {addr}");
        }
        if !self.auth.authenticate(conn) {
            warn!("AP server: bad authentication");
            return false;
        }
        let request = ActionMap::read_from(conn, self.timeout);
        let mut pending = PendingCredentials::default();
        let stored = self.actions.dispatch(&request, &mut pending) && pending.persist(credentials);
        response::reply(conn, stored);
        stored
    }
}

/// `setwifi`: stage the requested network.  `false` when a field is missing.
fn set_wifi(request: &ActionMap, pending: &mut PendingCredentials) -> bool {
    let (Some(bssid), Some(password)) = (request.get_str(BSSID_KEY), request.get_str(PASSWORD_KEY)) else {
        warn!("AP server: setwifi missing bssid or password");
        return false;
    };
    pending.set(bssid, password)
}
