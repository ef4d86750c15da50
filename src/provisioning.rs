//! Provisioning listener: request handling for the setup access point.
//!
//! ```text
//!  GET  /          ──▶ setup form
//!  GET  /networks  ──▶ [{"ssid":..,"signal_strength":..}, ..]
//!  POST /save      ──▶ validate ──▶ persist ssid/pass/owner_id ──▶ 200 + restart
//!  *               ──▶ 404
//! ```
//!
//! The handler is transport-free: the ESP-IDF HTTP server (see
//! `adapters::http_server`) forwards method, path and body here and writes
//! back whatever [`ProvisioningResponse`] says.

use core::fmt;

use log::{error, info, warn};

use crate::adapters::wifi::{dedup_by_ssid, validate_password, validate_ssid};
use crate::app::ports::{ConnectivityPort, StoragePort};
use crate::persist::{self, ProvisioningRecord, WifiCredentials};

/// Largest form body accepted.
pub const MAX_FORM_LEN: usize = 512;

const SETUP_PAGE: &str = r#"<!DOCTYPE html>
<html><head><meta name="viewport" content="width=device-width,initial-scale=1">
<title>PawFeeds Setup</title></head>
<body><h1>PawFeeds Setup</h1>
<form method="POST" action="/save">
<label>Network <select id="ssid" name="ssid"></select></label><br>
<label>Password <input type="password" name="pass"></label><br>
<label>Account ID <input name="uid"></label><br>
<button type="submit">Save</button>
</form>
<script>
fetch('/networks').then(r=>r.json()).then(list=>{
  const s=document.getElementById('ssid');
  list.forEach(n=>{const o=document.createElement('option');o.value=n.ssid;
    o.textContent=n.ssid+' ('+n.signal_strength+' dBm)';s.appendChild(o);});
});
</script></body></html>"#;

const SAVED_PAGE: &str = "<h1>Saved! Restarting...</h1>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Other,
}

/// What the transport should send back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
    /// Reboot once the response has been flushed.
    pub restart: bool,
}

impl ProvisioningResponse {
    fn html(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: "text/html",
            body: body.into(),
            restart: false,
        }
    }

    fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: "text/plain",
            body: body.into(),
            restart: false,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Form decoding
// ───────────────────────────────────────────────────────────────

/// Why a `/save` body was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormError {
    TooLarge,
    BadEncoding,
    MissingField(&'static str),
    InvalidSsid,
    InvalidPassword,
    InvalidOwner,
}

impl fmt::Display for FormError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooLarge => write!(f, "form too large"),
            Self::BadEncoding => write!(f, "form is not valid UTF-8 / percent-encoding"),
            Self::MissingField(name) => write!(f, "missing field '{}'", name),
            Self::InvalidSsid => write!(f, "SSID must be 1-32 printable ASCII characters"),
            Self::InvalidPassword => write!(f, "password must be empty or 8-64 characters"),
            Self::InvalidOwner => write!(f, "account id must be 1-64 characters"),
        }
    }
}

/// `application/x-www-form-urlencoded` value: `+` is a space, then
/// percent-decoding.
pub fn decode_component(raw: &str) -> Result<String, FormError> {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(std::borrow::Cow::into_owned)
        .map_err(|_| FormError::BadEncoding)
}

/// Decode and validate a `/save` body.
pub fn parse_save_form(body: &[u8]) -> Result<ProvisioningRecord, FormError> {
    if body.len() > MAX_FORM_LEN {
        return Err(FormError::TooLarge);
    }
    let body = core::str::from_utf8(body).map_err(|_| FormError::BadEncoding)?;

    let mut ssid = None;
    let mut pass = None;
    let mut uid = None;
    for pair in body.trim_end_matches(['\r', '\n']).split('&') {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let slot = match key {
            "ssid" => &mut ssid,
            "pass" => &mut pass,
            "uid" => &mut uid,
            _ => continue,
        };
        *slot = Some(decode_component(value)?);
    }

    let ssid = ssid.ok_or(FormError::MissingField("ssid"))?;
    let pass = pass.unwrap_or_default();
    let uid = uid.ok_or(FormError::MissingField("uid"))?;

    validate_ssid(&ssid).map_err(|_| FormError::InvalidSsid)?;
    validate_password(&pass).map_err(|_| FormError::InvalidPassword)?;
    let uid = uid.trim();
    if uid.is_empty() {
        return Err(FormError::InvalidOwner);
    }

    Ok(ProvisioningRecord {
        wifi: WifiCredentials {
            ssid: ssid.as_str().try_into().map_err(|()| FormError::InvalidSsid)?,
            password: pass.as_str().try_into().map_err(|()| FormError::InvalidPassword)?,
        },
        owner_id: uid.try_into().map_err(|()| FormError::InvalidOwner)?,
    })
}

// ───────────────────────────────────────────────────────────────
// Listener
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct ProvisioningListener {
    saved: bool,
}

impl ProvisioningListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a `/save` has succeeded.
    pub fn saved(&self) -> bool {
        self.saved
    }

    /// Route one request.
    pub fn handle(
        &mut self,
        method: Method,
        path: &str,
        body: &[u8],
        wifi: &mut impl ConnectivityPort,
        storage: &mut impl StoragePort,
    ) -> ProvisioningResponse {
        let route = path.split('?').next().unwrap_or(path);
        match (method, route) {
            (Method::Get, "/") => ProvisioningResponse::html(200, SETUP_PAGE),
            (Method::Get, "/networks") => Self::networks(wifi),
            (Method::Post, "/save") => self.save(body, storage),
            _ => {
                info!("Provisioning: {:?} {} not found", method, route);
                ProvisioningResponse::text(404, "not found")
            }
        }
    }

    fn networks(wifi: &mut impl ConnectivityPort) -> ProvisioningResponse {
        let found = match wifi.scan() {
            Ok(found) => dedup_by_ssid(found),
            Err(e) => {
                warn!("Provisioning: scan failed: {}", e);
                Vec::new()
            }
        };
        match serde_json::to_string(&found) {
            Ok(json) => ProvisioningResponse {
                status: 200,
                content_type: "application/json",
                body: json,
                restart: false,
            },
            Err(e) => {
                error!("Provisioning: could not encode scan: {}", e);
                ProvisioningResponse::text(500, "scan encoding failed")
            }
        }
    }

    fn save(&mut self, body: &[u8], storage: &mut impl StoragePort) -> ProvisioningResponse {
        let record = match parse_save_form(body) {
            Ok(record) => record,
            Err(e) => {
                warn!("Provisioning: rejected form: {}", e);
                return ProvisioningResponse::text(400, e.to_string());
            }
        };
        if let Err(e) = persist::save_provisioning(storage, &record) {
            error!("Provisioning: could not persist credentials: {}", e);
            return ProvisioningResponse::text(500, "could not save settings");
        }

        info!(
            "Provisioning: saved '{}' for owner {}, restarting",
            record.wifi.ssid, record.owner_id
        );
        self.saved = true;
        ProvisioningResponse {
            restart: true,
            ..ProvisioningResponse::html(200, SAVED_PAGE)
        }
    }
}
