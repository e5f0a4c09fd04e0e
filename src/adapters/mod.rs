//! Adapters: concrete implementations of the port traits.
//!
//! | Adapter         | Implements        | Connects to                     |
//! |-----------------|-------------------|---------------------------------|
//! | `button`        | override signal   | active-low GPIO (`InputPin`)    |
//! | `credentials`   | CredentialPort    | checksummed record in storage   |
//! | `nvs`           | StoragePort       | ESP-IDF NVS / in-memory map     |
//! | `tls_transport` | ListenerFactory   | TCP + TLS (mbedTLS / rustls)    |
//! |                 | Listener          |                                 |
//! |                 | Transport         |                                 |
//! | `udp`           | Broadcaster       | `std::net::UdpSocket`           |
//! | `wifi`          | ConnectivityPort  | ESP-IDF WiFi STA + soft AP      |

pub mod button;
pub mod credentials;
pub mod nvs;
pub mod tls_transport;
pub mod udp;
pub(super) mod utils;
pub mod wifi;
