//! Integration test driver for the `tests/integration/` submodules.
//!
//! Each `mod` below exercises one subsystem against the scripted network
//! mocks in `mock_net`.  Everything runs on the host with no radio or
//! sockets involved.

#![cfg(not(target_os = "espidf"))]

mod access_point_tests;
mod command_server_tests;
mod mock_net;
mod mode_flow_tests;
