//! Application core: mode logic and the two servers, no direct I/O.
//!
//! Radio, storage, TLS sockets and UDP all sit behind the **port traits**
//! in [`ports`], so everything here runs against mocks on the host.

pub mod access_point_server;
pub mod command_server;
pub mod discovery;
pub mod events;
pub mod ports;
pub mod service;
