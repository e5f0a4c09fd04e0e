//! Wi-Fi radio adapter.
//!
//! Implements [`ConnectivityPort`]: station join (non-blocking, polled by
//! the mode handler) and the fallback access point with a fixed address.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `esp_idf_svc::wifi::EspWifi`; the AP
//!   address plan is applied by swapping in a router netif.
//! - **all other targets**: simulation with a controllable link, used by
//!   the host simulator and the integration tests.

use std::net::Ipv4Addr;

use log::{info, warn};

use crate::app::ports::{ConnectivityError, ConnectivityPort};
use crate::config::AccessPointSettings;

use super::utils::is_printable_ascii;

#[cfg(target_os = "espidf")]
use esp_idf_svc::{
    ipv4::{Configuration as IpConfiguration, Mask, RouterConfiguration, Subnet},
    netif::{EspNetif, NetifConfiguration},
    wifi::{AccessPointConfiguration, AuthMethod, ClientConfiguration, Configuration, EspWifi},
};

// ───────────────────────────────────────────────────────────────
// Validation
// ───────────────────────────────────────────────────────────────

fn validate_ssid(ssid: &str) -> Result<(), ConnectivityError> {
    if ssid.is_empty() || ssid.len() > 32 || !is_printable_ascii(ssid) {
        return Err(ConnectivityError::InvalidSsid);
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), ConnectivityError> {
    if password.is_empty() {
        return Ok(());
    }
    if password.len() < 8 || password.len() > 64 {
        return Err(ConnectivityError::InvalidPassword);
    }
    Ok(())
}

// ───────────────────────────────────────────────────────────────
// Access point addressing
// ───────────────────────────────────────────────────────────────

/// Address plan applied to the soft AP interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessPointAddressing {
    /// The AP's own address.
    pub address: Ipv4Addr,
    /// Router handed to DHCP clients.
    pub gateway: Ipv4Addr,
    pub prefix_len: u8,
}

impl AccessPointAddressing {
    pub fn from_settings(settings: &AccessPointSettings) -> Self {
        Self {
            address: settings.ip_address,
            gateway: settings.gateway,
            prefix_len: settings.prefix_len(),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Radio mode
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioMode {
    Off,
    Station,
    AccessPoint,
}

// ───────────────────────────────────────────────────────────────
// WiFi adapter
// ───────────────────────────────────────────────────────────────

pub struct WifiAdapter {
    mode: RadioMode,
    ssid: heapless::String<32>,
    ap_addressing: Option<AccessPointAddressing>,

    #[cfg(target_os = "espidf")]
    wifi: EspWifi<'static>,

    /// Simulation: whether a station join will succeed.
    #[cfg(not(target_os = "espidf"))]
    sim_link_up: bool,
    /// Simulation: whether the access point will start.
    #[cfg(not(target_os = "espidf"))]
    sim_ap_ok: bool,
    #[cfg(not(target_os = "espidf"))]
    sim_station_ip: Ipv4Addr,
    #[cfg(not(target_os = "espidf"))]
    sim_joins: u32,
}

impl WifiAdapter {
    #[cfg(target_os = "espidf")]
    pub fn new(wifi: EspWifi<'static>) -> Self {
        Self {
            mode: RadioMode::Off,
            ssid: heapless::String::new(),
            ap_addressing: None,
            wifi,
        }
    }

    /// Simulated radio whose station joins succeed and which can host an
    /// access point.
    #[cfg(not(target_os = "espidf"))]
    pub fn new() -> Self {
        Self {
            mode: RadioMode::Off,
            ssid: heapless::String::new(),
            ap_addressing: None,
            sim_link_up: true,
            sim_ap_ok: true,
            sim_station_ip: Ipv4Addr::new(192, 168, 1, 50),
            sim_joins: 0,
        }
    }

    pub fn mode(&self) -> RadioMode {
        self.mode
    }

    /// SSID of the last station join or access point.
    pub fn ssid(&self) -> &str {
        &self.ssid
    }

    /// Address plan of the running access point.
    pub fn access_point_addressing(&self) -> Option<AccessPointAddressing> {
        self.ap_addressing
    }

    // ── Simulation controls ───────────────────────────────────

    /// Make future (and the current) station joins succeed or hang.
    #[cfg(not(target_os = "espidf"))]
    pub fn set_sim_link(&mut self, up: bool) {
        self.sim_link_up = up;
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn set_sim_access_point(&mut self, ok: bool) {
        self.sim_ap_ok = ok;
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn set_sim_station_ip(&mut self, ip: Ipv4Addr) {
        self.sim_station_ip = ip;
    }

    /// Number of station joins started so far.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_joins(&self) -> u32 {
        self.sim_joins
    }

    // ── Platform helpers: station ─────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_begin_station(&mut self, hostname: &str, password: &str) -> Result<(), ConnectivityError> {
        let _ = self.wifi.disconnect();
        let _ = self.wifi.stop();

        if let Err(e) = self.wifi.sta_netif_mut().set_hostname(hostname) {
            warn!("WiFi: could not set hostname '{}': {}", hostname, e);
        }

        let auth_method = if password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };
        let conf = Configuration::Client(ClientConfiguration {
            ssid: self.ssid.as_str().try_into().map_err(|_| ConnectivityError::InvalidSsid)?,
            password: password
                .try_into()
                .map_err(|_| ConnectivityError::InvalidPassword)?,
            auth_method,
            ..Default::default()
        });

        self.wifi
            .set_configuration(&conf)
            .and_then(|_| self.wifi.start())
            .and_then(|_| self.wifi.connect())
            .map_err(|e| {
                warn!("WiFi: station start failed: {}", e);
                ConnectivityError::ConnectionFailed
            })
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_begin_station(&mut self, hostname: &str, _password: &str) -> Result<(), ConnectivityError> {
        self.sim_joins += 1;
        info!("WiFi(sim): '{}' joining '{}'", hostname, self.ssid);
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_station_up(&self) -> bool {
        self.wifi.is_connected().unwrap_or(false) && self.wifi.sta_netif().is_up().unwrap_or(false)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_station_up(&self) -> bool {
        self.sim_link_up
    }

    #[cfg(target_os = "espidf")]
    fn platform_station_ip(&self) -> Option<Ipv4Addr> {
        self.wifi.sta_netif().get_ip_info().ok().map(|info| info.ip)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_station_ip(&self) -> Option<Ipv4Addr> {
        Some(self.sim_station_ip)
    }

    #[cfg(target_os = "espidf")]
    fn platform_disconnect(&mut self) {
        let _ = self.wifi.disconnect();
        let _ = self.wifi.stop();
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_disconnect(&mut self) {
        info!("WiFi(sim): radio stopped");
    }

    // ── Platform helpers: access point ────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_start_access_point(&mut self, settings: &AccessPointSettings) -> Result<(), ConnectivityError> {
        let _ = self.wifi.disconnect();
        let _ = self.wifi.stop();

        let addressing = AccessPointAddressing::from_settings(settings);
        let netif_conf = NetifConfiguration {
            ip_configuration: Some(IpConfiguration::Router(RouterConfiguration {
                subnet: Subnet {
                    gateway: addressing.address,
                    mask: Mask(addressing.prefix_len),
                },
                dhcp_enabled: true,
                dns: None,
                secondary_dns: None,
            })),
            ..NetifConfiguration::wifi_default_router()
        };
        let netif = EspNetif::new_with_conf(&netif_conf).map_err(|e| {
            warn!("WiFi: AP netif setup failed: {}", e);
            ConnectivityError::AccessPointFailed
        })?;
        self.wifi.swap_netif_ap(netif).map_err(|e| {
            warn!("WiFi: AP netif swap failed: {}", e);
            ConnectivityError::AccessPointFailed
        })?;

        let auth_method = if settings.password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };
        let conf = Configuration::AccessPoint(AccessPointConfiguration {
            ssid: settings
                .ssid
                .as_str()
                .try_into()
                .map_err(|_| ConnectivityError::InvalidSsid)?,
            password: settings
                .password
                .as_str()
                .try_into()
                .map_err(|_| ConnectivityError::InvalidPassword)?,
            ssid_hidden: settings.hidden,
            channel: settings.channel,
            max_connections: u16::from(settings.max_connections),
            auth_method,
            ..Default::default()
        });

        self.wifi
            .set_configuration(&conf)
            .and_then(|_| self.wifi.start())
            .map_err(|e| {
                warn!("WiFi: soft AP start failed: {}", e);
                ConnectivityError::AccessPointFailed
            })?;

        if addressing.gateway != addressing.address {
            self.apply_ap_gateway(&addressing)?;
        }
        Ok(())
    }

    /// The router netif advertises its own address as gateway; rewrite the
    /// interface info so DHCP offers carry the configured one.
    #[cfg(target_os = "espidf")]
    fn apply_ap_gateway(&mut self, addressing: &AccessPointAddressing) -> Result<(), ConnectivityError> {
        use esp_idf_svc::sys::{
            ESP_OK, esp_ip4_addr_t, esp_netif_dhcps_start, esp_netif_dhcps_stop, esp_netif_ip_info_t,
            esp_netif_set_ip_info,
        };

        // lwIP keeps addresses in network order.
        let raw = |ip: Ipv4Addr| esp_ip4_addr_t {
            addr: u32::from_le_bytes(ip.octets()),
        };
        let mask = u32::MAX.checked_shl(32 - u32::from(addressing.prefix_len)).unwrap_or(0);
        let info = esp_netif_ip_info_t {
            ip: raw(addressing.address),
            netmask: raw(Ipv4Addr::from(mask)),
            gw: raw(addressing.gateway),
        };

        let handle = self.wifi.ap_netif().handle();
        // SAFETY: `handle` belongs to the AP netif owned by `self.wifi`,
        // which outlives these calls; `info` is a plain value.
        let ret = unsafe {
            esp_netif_dhcps_stop(handle);
            let ret = esp_netif_set_ip_info(handle, &info);
            esp_netif_dhcps_start(handle);
            ret
        };
        if ret != ESP_OK as i32 {
            warn!("WiFi: AP gateway {} not applied (err {})", addressing.gateway, ret);
            return Err(ConnectivityError::AccessPointFailed);
        }
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_start_access_point(&mut self, settings: &AccessPointSettings) -> Result<(), ConnectivityError> {
        if !self.sim_ap_ok {
            warn!("WiFi(sim): simulated soft AP failure");
            return Err(ConnectivityError::AccessPointFailed);
        }
        info!(
            "WiFi(sim): soft AP '{}' ch{} max {} client(s), gateway {}",
            settings.ssid, settings.channel, settings.max_connections, settings.gateway
        );
        Ok(())
    }
}

#[cfg(not(target_os = "espidf"))]
impl Default for WifiAdapter {
    fn default() -> Self {
        Self::new()
    }
}

// ───────────────────────────────────────────────────────────────
// ConnectivityPort
// ───────────────────────────────────────────────────────────────

impl ConnectivityPort for WifiAdapter {
    fn begin_station(&mut self, hostname: &str, ssid: &str, password: &str) -> Result<(), ConnectivityError> {
        validate_ssid(ssid)?;
        validate_password(password)?;

        self.ssid.clear();
        self.ssid
            .push_str(ssid)
            .map_err(|_| ConnectivityError::InvalidSsid)?;
        self.ap_addressing = None;
        self.mode = RadioMode::Station;

        if let Err(e) = self.platform_begin_station(hostname, password) {
            self.mode = RadioMode::Off;
            return Err(e);
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.mode == RadioMode::Station && self.platform_station_up()
    }

    fn disconnect(&mut self) {
        if self.mode == RadioMode::Off {
            return;
        }
        self.platform_disconnect();
        self.mode = RadioMode::Off;
        self.ap_addressing = None;
        info!("WiFi: disconnected");
    }

    fn start_access_point(&mut self, settings: &AccessPointSettings) -> Result<(), ConnectivityError> {
        validate_ssid(&settings.ssid)?;
        validate_password(&settings.password)?;

        self.mode = RadioMode::Off;
        self.platform_start_access_point(settings)?;

        self.ssid.clear();
        self.ssid
            .push_str(&settings.ssid)
            .map_err(|_| ConnectivityError::InvalidSsid)?;
        let addressing = AccessPointAddressing::from_settings(settings);
        self.ap_addressing = Some(addressing);
        self.mode = RadioMode::AccessPoint;
        info!(
            "WiFi: soft AP '{}' started at {}/{} via {}",
            settings.ssid, addressing.address, addressing.prefix_len, addressing.gateway
        );
        Ok(())
    }

    fn local_ip(&self) -> Option<Ipv4Addr> {
        match self.mode {
            RadioMode::Station if self.platform_station_up() => self.platform_station_ip(),
            RadioMode::AccessPoint => self.ap_addressing.map(|a| a.address),
            _ => None,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Tests (simulation)
// ───────────────────────────────────────────────────────────────

#[cfg(all(test, not(target_os = "espidf")))]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_ssid() {
        let mut a = WifiAdapter::new();
        assert_eq!(
            a.begin_station("host", "", "password123"),
            Err(ConnectivityError::InvalidSsid)
        );
        assert_eq!(a.mode(), RadioMode::Off);
    }

    #[test]
    fn rejects_short_password() {
        let mut a = WifiAdapter::new();
        assert_eq!(
            a.begin_station("host", "MyNet", "short"),
            Err(ConnectivityError::InvalidPassword)
        );
    }

    #[test]
    fn accepts_open_network() {
        let mut a = WifiAdapter::new();
        assert!(a.begin_station("host", "OpenCafe", "").is_ok());
        assert!(a.is_connected());
    }

    #[test]
    fn station_follows_simulated_link() {
        let mut a = WifiAdapter::new();
        a.set_sim_link(false);
        a.begin_station("host", "HomeWiFi", "mysecret8").unwrap();
        assert!(!a.is_connected());
        assert_eq!(a.local_ip(), None);

        a.set_sim_link(true);
        assert!(a.is_connected());
        assert_eq!(a.local_ip(), Some(Ipv4Addr::new(192, 168, 1, 50)));
        assert_eq!(a.sim_joins(), 1);
    }

    #[test]
    fn access_point_reports_configured_address() {
        let mut a = WifiAdapter::new();
        let settings = AccessPointSettings::default();
        a.start_access_point(&settings).unwrap();
        assert_eq!(a.mode(), RadioMode::AccessPoint);
        assert!(!a.is_connected());
        assert_eq!(a.local_ip(), Some(settings.ip_address));
        assert_eq!(a.ssid(), settings.ssid);
    }

    #[test]
    fn access_point_carries_gateway_and_prefix() {
        let mut a = WifiAdapter::new();
        let settings = AccessPointSettings {
            ip_address: Ipv4Addr::new(10, 0, 0, 2),
            gateway: Ipv4Addr::new(10, 0, 0, 1),
            subnet: Ipv4Addr::new(255, 255, 0, 0),
            ..Default::default()
        };
        a.start_access_point(&settings).unwrap();
        assert_eq!(
            a.access_point_addressing(),
            Some(AccessPointAddressing {
                address: Ipv4Addr::new(10, 0, 0, 2),
                gateway: Ipv4Addr::new(10, 0, 0, 1),
                prefix_len: 16,
            })
        );
        assert_eq!(a.local_ip(), Some(Ipv4Addr::new(10, 0, 0, 2)));

        a.disconnect();
        assert_eq!(a.access_point_addressing(), None);
    }

    #[test]
    fn access_point_failure_leaves_radio_off() {
        let mut a = WifiAdapter::new();
        a.set_sim_access_point(false);
        assert_eq!(
            a.start_access_point(&AccessPointSettings::default()),
            Err(ConnectivityError::AccessPointFailed)
        );
        assert_eq!(a.mode(), RadioMode::Off);
    }

    #[test]
    fn disconnect_clears_state() {
        let mut a = WifiAdapter::new();
        a.begin_station("host", "Net", "password1").unwrap();
        a.disconnect();
        assert!(!a.is_connected());
        assert_eq!(a.local_ip(), None);
    }
}
