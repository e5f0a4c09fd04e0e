//! Request/response layer shared by both servers.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        RPC stack                             │
//! │                                                              │
//! │  ┌───────────┐   ┌──────────┐   ┌──────────┐   ┌──────────┐  │
//! │  │ Transport │──▶│  Codec   │──▶│   Auth   │──▶│ Dispatch │  │
//! │  │ (trait)   │   │ (frames) │   │  (gate)  │   │ (table)  │  │
//! │  └───────────┘   └──────────┘   └──────────┘   └──────────┘  │
//! │       ▲                                             │        │
//! │       └──────────── Response (ok / error) ◀─────────┘        │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod auth;
pub mod codec;
pub mod dispatch;
pub mod response;
pub mod transport;
