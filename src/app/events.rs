//! Server observers.
//!
//! Optional callbacks the embedding application hangs off a server loop.
//! Every slot starts empty; an empty slot is simply skipped.

use std::net::SocketAddr;

/// Called with the peer address of each accepted connection.
pub type ConnectionObserver = Box<dyn FnMut(Option<SocketAddr>)>;

/// Called with no arguments at a fixed point in the serve loop.
pub type LoopObserver = Box<dyn FnMut()>;

/// Callback slots for one server.
#[derive(Default)]
pub struct ServerObservers {
    pub on_new_connection: Option<ConnectionObserver>,
    pub on_connection_close: Option<LoopObserver>,
    pub on_server_loop: Option<LoopObserver>,
    pub on_server_termination: Option<LoopObserver>,
}

impl ServerObservers {
    pub fn new_connection(&mut self, peer: Option<SocketAddr>) {
        if let Some(cb) = self.on_new_connection.as_mut() {
            cb(peer);
        }
    }

    pub fn connection_close(&mut self) {
        if let Some(cb) = self.on_connection_close.as_mut() {
            cb();
        }
    }

    pub fn server_loop(&mut self) {
        if let Some(cb) = self.on_server_loop.as_mut() {
            cb();
        }
    }

    pub fn server_termination(&mut self) {
        if let Some(cb) = self.on_server_termination.as_mut() {
            cb();
        }
    }
}

impl core::fmt::Debug for ServerObservers {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ServerObservers")
            .field("on_new_connection", &self.on_new_connection.is_some())
            .field("on_connection_close", &self.on_connection_close.is_some())
            .field("on_server_loop", &self.on_server_loop.is_some())
            .field("on_server_termination", &self.on_server_termination.is_some())
            .finish()
    }
}
