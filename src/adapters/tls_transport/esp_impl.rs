//! ESP-IDF platform helpers for `TlsListener` / `TlsConnection`.
//!
//! Compiled only for `target_os = "espidf"`: lwIP TCP sockets wrapped in
//! mbedTLS sessions that present the device's own X.509 certificate.
//!
//! Every session references the listener's `mbedtls_ssl_config`, so a
//! client holds an `Rc` of the server and the config cannot be freed while
//! any session is alive.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::rc::Rc;

use log::{info, warn};

use esp_idf_svc::sys::{
    AF_INET, EAGAIN, F_SETFL, MBEDTLS_ERR_SSL_PEER_CLOSE_NOTIFY, MBEDTLS_ERR_SSL_WANT_READ,
    MBEDTLS_ERR_SSL_WANT_WRITE, MBEDTLS_SSL_IS_SERVER, MBEDTLS_SSL_PRESET_DEFAULT,
    MBEDTLS_SSL_TRANSPORT_STREAM, MBEDTLS_SSL_VERIFY_NONE, O_NONBLOCK, SOCK_STREAM, in_addr,
    lwip_accept, lwip_bind, lwip_close, lwip_fcntl, lwip_htons, lwip_listen, lwip_recv, lwip_send,
    lwip_socket, mbedtls_ctr_drbg_context, mbedtls_ctr_drbg_free, mbedtls_ctr_drbg_init,
    mbedtls_ctr_drbg_random, mbedtls_ctr_drbg_seed, mbedtls_entropy_context, mbedtls_entropy_free,
    mbedtls_entropy_func, mbedtls_entropy_init, mbedtls_pk_context, mbedtls_pk_free,
    mbedtls_pk_init, mbedtls_pk_parse_key, mbedtls_ssl_close_notify, mbedtls_ssl_conf_authmode,
    mbedtls_ssl_conf_own_cert, mbedtls_ssl_conf_rng, mbedtls_ssl_config,
    mbedtls_ssl_config_defaults, mbedtls_ssl_config_free, mbedtls_ssl_config_init,
    mbedtls_ssl_context, mbedtls_ssl_free, mbedtls_ssl_handshake, mbedtls_ssl_init,
    mbedtls_ssl_read, mbedtls_ssl_set_bio, mbedtls_ssl_setup, mbedtls_ssl_write,
    mbedtls_x509_crt, mbedtls_x509_crt_free, mbedtls_x509_crt_init, mbedtls_x509_crt_parse,
    sockaddr_in, socklen_t, vTaskDelay,
};

use super::TlsTransportError;

/// Would-block rounds (one FreeRTOS tick each) before a handshake is
/// abandoned.
const HANDSHAKE_MAX_RETRIES: u32 = 300;

/// Personalisation string for the DRBG seed.
const DRBG_LABEL: &[u8] = b"remote-control";

// ── BIO callbacks ─────────────────────────────────────────────────────────────
//
// mbedTLS moves ciphertext through these.  The socket fd travels in the
// `p_bio` context pointer.

/// # Safety
///
/// `ctx` must be a socket fd cast to `*mut c_void`, valid for the whole
/// session (owned by `EspTlsClient::fd`).
unsafe extern "C" fn bio_send(
    ctx: *mut core::ffi::c_void,
    buf: *const u8,
    len: usize,
) -> core::ffi::c_int {
    let fd = ctx as core::ffi::c_int;
    let ret = unsafe { lwip_send(fd, buf.cast(), len, 0) } as core::ffi::c_int;
    if ret < 0 && last_errno() == EAGAIN as i32 {
        return MBEDTLS_ERR_SSL_WANT_WRITE;
    }
    ret
}

/// # Safety
///
/// Same invariants as `bio_send`.
unsafe extern "C" fn bio_recv(
    ctx: *mut core::ffi::c_void,
    buf: *mut u8,
    len: usize,
) -> core::ffi::c_int {
    let fd = ctx as core::ffi::c_int;
    let ret = unsafe { lwip_recv(fd, buf.cast(), len, 0) } as core::ffi::c_int;
    if ret < 0 && last_errno() == EAGAIN as i32 {
        return MBEDTLS_ERR_SSL_WANT_READ;
    }
    ret
}

fn last_errno() -> i32 {
    // SAFETY: __errno() points at the calling task's errno slot.
    unsafe { *esp_idf_svc::sys::__errno() }
}

/// mbedTLS `_parse` functions want PEM text including the trailing NUL.
fn nul_terminated(pem: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(pem.len() + 1);
    out.extend_from_slice(pem);
    if out.last() != Some(&0) {
        out.push(0);
    }
    out
}

// ── Server (listener + TLS config) ───────────────────────────────────────────

/// Listener socket, mbedTLS config, RNG and the certificate material the
/// config points into.
pub(super) struct EspTlsServer {
    listener_fd: core::ffi::c_int,
    conf: Box<mbedtls_ssl_config>,
    entropy: Box<mbedtls_entropy_context>,
    drbg: Box<mbedtls_ctr_drbg_context>,
    cert: Box<mbedtls_x509_crt>,
    key: Box<mbedtls_pk_context>,
}

impl Drop for EspTlsServer {
    fn drop(&mut self) {
        // SAFETY: every context was `_init`-ed in `esp_new` before this
        // struct existed; `_free` on an initialised context is always valid.
        unsafe {
            mbedtls_ssl_config_free(self.conf.as_mut());
            mbedtls_x509_crt_free(self.cert.as_mut());
            mbedtls_pk_free(self.key.as_mut());
            mbedtls_ctr_drbg_free(self.drbg.as_mut());
            mbedtls_entropy_free(self.entropy.as_mut());
            if self.listener_fd >= 0 {
                lwip_close(self.listener_fd);
            }
        }
    }
}

/// Open a non-blocking listener on `0.0.0.0:port`.
fn open_listener(port: u16) -> Result<core::ffi::c_int, TlsTransportError> {
    // SAFETY: lwIP socket call with valid domain/type/protocol.
    let fd = unsafe { lwip_socket(AF_INET as _, SOCK_STREAM as _, 0) };
    if fd < 0 {
        warn!("TLS(espidf): lwip_socket failed ({})", fd);
        return Err(TlsTransportError::Io);
    }

    let addr = sockaddr_in {
        sin_len: 0,
        sin_family: AF_INET as _,
        // SAFETY: lwip_htons is a pure byte swap.
        sin_port: unsafe { lwip_htons(port) },
        sin_addr: in_addr { s_addr: 0 },
        sin_zero: [0u8; 8],
    };

    // SAFETY: `addr` outlives the call; fd is a fresh socket.
    let step = unsafe {
        if lwip_bind(
            fd,
            core::ptr::addr_of!(addr).cast(),
            core::mem::size_of::<sockaddr_in>() as _,
        ) < 0
        {
            Err("lwip_bind")
        } else if lwip_listen(fd, 1) < 0 {
            Err("lwip_listen")
        } else if lwip_fcntl(fd, F_SETFL as _, O_NONBLOCK as _) < 0 {
            Err("O_NONBLOCK")
        } else {
            Ok(())
        }
    };
    if let Err(what) = step {
        warn!("TLS(espidf): {} failed on port {}", what, port);
        // SAFETY: fd is open and closed exactly once here.
        unsafe {
            lwip_close(fd);
        }
        return Err(TlsTransportError::Io);
    }
    Ok(fd)
}

/// Bind a listener and build a server config around `cert_pem` / `key_pem`.
pub(super) fn esp_new(
    port: u16,
    cert_pem: &[u8],
    key_pem: &[u8],
) -> Result<EspTlsServer, TlsTransportError> {
    let mut server = EspTlsServer {
        listener_fd: -1,
        conf: Box::new(mbedtls_ssl_config::default()),
        entropy: Box::new(mbedtls_entropy_context::default()),
        drbg: Box::new(mbedtls_ctr_drbg_context::default()),
        cert: Box::new(mbedtls_x509_crt::default()),
        key: Box::new(mbedtls_pk_context::default()),
    };

    // SAFETY: all pointers come from Box::as_mut() and are exclusively owned.
    // From here on `server`'s Drop releases everything on every exit path.
    unsafe {
        mbedtls_ssl_config_init(server.conf.as_mut());
        mbedtls_entropy_init(server.entropy.as_mut());
        mbedtls_ctr_drbg_init(server.drbg.as_mut());
        mbedtls_x509_crt_init(server.cert.as_mut());
        mbedtls_pk_init(server.key.as_mut());
    }

    let cert_pem = nul_terminated(cert_pem);
    let key_pem = nul_terminated(key_pem);

    // SAFETY: contexts initialised above; PEM buffers are NUL-terminated and
    // outlive the parse calls.
    unsafe {
        let rc = mbedtls_ctr_drbg_seed(
            server.drbg.as_mut(),
            Some(mbedtls_entropy_func),
            (server.entropy.as_mut() as *mut mbedtls_entropy_context).cast(),
            DRBG_LABEL.as_ptr(),
            DRBG_LABEL.len(),
        );
        if rc != 0 {
            warn!("TLS(espidf): ctr_drbg_seed failed (rc={})", rc);
            return Err(TlsTransportError::Tls);
        }

        let rc = mbedtls_x509_crt_parse(server.cert.as_mut(), cert_pem.as_ptr(), cert_pem.len());
        if rc != 0 {
            warn!("TLS(espidf): x509_crt_parse failed (rc={})", rc);
            return Err(TlsTransportError::InvalidIdentity);
        }

        let rc = mbedtls_pk_parse_key(
            server.key.as_mut(),
            key_pem.as_ptr(),
            key_pem.len(),
            core::ptr::null(),
            0,
            Some(mbedtls_ctr_drbg_random),
            (server.drbg.as_mut() as *mut mbedtls_ctr_drbg_context).cast(),
        );
        if rc != 0 {
            warn!("TLS(espidf): pk_parse_key failed (rc={})", rc);
            return Err(TlsTransportError::InvalidIdentity);
        }

        let rc = mbedtls_ssl_config_defaults(
            server.conf.as_mut(),
            MBEDTLS_SSL_IS_SERVER as _,
            MBEDTLS_SSL_TRANSPORT_STREAM as _,
            MBEDTLS_SSL_PRESET_DEFAULT as _,
        );
        if rc != 0 {
            warn!("TLS(espidf): ssl_config_defaults failed (rc={})", rc);
            return Err(TlsTransportError::Tls);
        }

        // Clients authenticate in-band with the credential frame.
        mbedtls_ssl_conf_authmode(server.conf.as_mut(), MBEDTLS_SSL_VERIFY_NONE as _);
        mbedtls_ssl_conf_rng(
            server.conf.as_mut(),
            Some(mbedtls_ctr_drbg_random),
            (server.drbg.as_mut() as *mut mbedtls_ctr_drbg_context).cast(),
        );

        let rc = mbedtls_ssl_conf_own_cert(server.conf.as_mut(), server.cert.as_mut(), server.key.as_mut());
        if rc != 0 {
            warn!("TLS(espidf): ssl_conf_own_cert failed (rc={})", rc);
            return Err(TlsTransportError::InvalidIdentity);
        }
    }

    server.listener_fd = open_listener(port)?;
    info!("TLS(espidf): listening on port {}", port);
    Ok(server)
}

// ── Session state ─────────────────────────────────────────────────────────────

/// Per-connection TLS state (heap-allocated to limit stack pressure).
pub(super) struct EspTlsClient {
    fd: core::ffi::c_int,
    ssl: Box<mbedtls_ssl_context>,
    // Keeps the config `ssl` points at alive; dropped after `ssl` is freed.
    _server: Rc<EspTlsServer>,
}

impl Drop for EspTlsClient {
    fn drop(&mut self) {
        // SAFETY: `ssl` was `_init`-ed before this struct existed and `fd` is
        // an open socket; both are released exactly once here.
        unsafe {
            mbedtls_ssl_close_notify(self.ssl.as_mut());
            mbedtls_ssl_free(self.ssl.as_mut());
            lwip_close(self.fd);
        }
    }
}

/// Non-blocking accept followed by the TLS handshake.
///
/// `None` if nobody is waiting or the handshake fails.
pub(super) fn esp_accept(server: &Rc<EspTlsServer>) -> Option<(EspTlsClient, Option<SocketAddr>)> {
    let mut peer = sockaddr_in::default();
    let mut peer_len = core::mem::size_of::<sockaddr_in>() as socklen_t;

    // SAFETY: listener_fd is a valid non-blocking socket; `peer` outlives
    // the call and `peer_len` holds its size.
    let fd = unsafe {
        lwip_accept(
            server.listener_fd,
            core::ptr::addr_of_mut!(peer).cast(),
            &mut peer_len,
        )
    };
    if fd < 0 {
        return None; // EAGAIN
    }

    let peer = SocketAddr::V4(SocketAddrV4::new(
        Ipv4Addr::from(u32::from_be(peer.sin_addr.s_addr)),
        u16::from_be(peer.sin_port),
    ));

    // SAFETY: F_SETFL on a freshly accepted socket.
    if unsafe { lwip_fcntl(fd, F_SETFL as _, O_NONBLOCK as _) } < 0 {
        warn!("TLS(espidf): O_NONBLOCK on client failed");
        // SAFETY: fd is open and closed exactly once here.
        unsafe {
            lwip_close(fd);
        }
        return None;
    }

    let mut client = EspTlsClient {
        fd,
        ssl: Box::new(mbedtls_ssl_context::default()),
        _server: Rc::clone(server),
    };

    // SAFETY: `ssl` is exclusively owned; the config is kept alive by the
    // Rc held in `client`.
    unsafe {
        mbedtls_ssl_init(client.ssl.as_mut());
        let rc = mbedtls_ssl_setup(client.ssl.as_mut(), server.conf.as_ref());
        if rc != 0 {
            warn!("TLS(espidf): ssl_setup failed (rc={})", rc);
            return None;
        }
        mbedtls_ssl_set_bio(
            client.ssl.as_mut(),
            fd as usize as *mut core::ffi::c_void,
            Some(bio_send),
            Some(bio_recv),
            None,
        );
    }

    let mut retries = 0u32;
    loop {
        // SAFETY: session set up above.
        let rc = unsafe { mbedtls_ssl_handshake(client.ssl.as_mut()) };
        if rc == 0 {
            break;
        }
        if rc == MBEDTLS_ERR_SSL_WANT_READ || rc == MBEDTLS_ERR_SSL_WANT_WRITE {
            retries += 1;
            if retries >= HANDSHAKE_MAX_RETRIES {
                warn!("TLS(espidf): handshake with {} timed out", peer);
                return None;
            }
            // SAFETY: vTaskDelay is callable from any task.
            unsafe { vTaskDelay(1) };
            continue;
        }
        warn!("TLS(espidf): handshake with {} failed (rc={})", peer, rc);
        return None;
    }

    info!("TLS(espidf): handshake complete with {}", peer);
    Some((client, Some(peer)))
}

/// `Ok(0)` when nothing is waiting.
pub(super) fn esp_read(client: &mut EspTlsClient, buf: &mut [u8]) -> Result<usize, TlsTransportError> {
    // SAFETY: session is established; buf is a valid mutable slice.
    let rc = unsafe { mbedtls_ssl_read(client.ssl.as_mut(), buf.as_mut_ptr(), buf.len()) };

    if rc > 0 {
        return Ok(rc as usize);
    }
    if rc == MBEDTLS_ERR_SSL_WANT_READ || rc == MBEDTLS_ERR_SSL_WANT_WRITE {
        return Ok(0);
    }
    if rc == MBEDTLS_ERR_SSL_PEER_CLOSE_NOTIFY || rc == 0 {
        info!("TLS(espidf): peer closed the connection");
        return Err(TlsTransportError::NotConnected);
    }
    warn!("TLS(espidf): ssl_read error (rc={})", rc);
    Err(TlsTransportError::Tls)
}

/// `Ok(0)` when the socket is full and the caller should retry.
pub(super) fn esp_write(client: &mut EspTlsClient, data: &[u8]) -> Result<usize, TlsTransportError> {
    // SAFETY: session is established; data is a valid slice.
    let rc = unsafe { mbedtls_ssl_write(client.ssl.as_mut(), data.as_ptr(), data.len()) };

    if rc > 0 {
        return Ok(rc as usize);
    }
    if rc == MBEDTLS_ERR_SSL_WANT_WRITE || rc == MBEDTLS_ERR_SSL_WANT_READ {
        return Ok(0);
    }
    warn!("TLS(espidf): ssl_write error (rc={})", rc);
    Err(TlsTransportError::Tls)
}
