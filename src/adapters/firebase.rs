//! Firebase adapter (ESP-IDF only).
//!
//! One [`FirebaseClient`] backs all three cloud ports:
//!
//! | Port            | Endpoint                                            |
//! |-----------------|-----------------------------------------------------|
//! | `AuthPort`      | identitytoolkit `accounts:signUp`, securetoken      |
//! | `DocumentStore` | Firestore REST `.../documents/...`                  |
//! | `RealtimePort`  | RTDB `{db}{path}.json` (SSE stream, DELETE, PUT)    |
//!
//! Every request opens its own TLS connection with the certificate bundle.
//! The command stream runs on a dedicated thread that owns its connection
//! and forwards parsed events over a channel; [`RealtimePort::read_stream`]
//! drains that channel without blocking.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use embedded_svc::http::Method;
use embedded_svc::http::client::Client as HttpClient;
use embedded_svc::io::{Read, Write};
use esp_idf_svc::http::client::{Configuration as HttpClientConfiguration, EspHttpConnection};
use log::{debug, error, info, warn};
use serde::Deserialize;

use crate::app::ports::{AuthPort, CloudError, DocumentStore, RealtimePort};
use crate::cloud::rtdb::{SseParser, StreamEvent};
use crate::config::CloudSettings;

const SIGN_UP_URL: &str = "https://identitytoolkit.googleapis.com/v1/accounts:signUp";
const REFRESH_URL: &str = "https://securetoken.googleapis.com/v1/token";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
/// RTDB sends a keep-alive every ~30 s; two missed ones end the stream.
const STREAM_READ_TIMEOUT: Duration = Duration::from_secs(65);
/// Refresh this long before the token actually expires.
const REFRESH_MARGIN: Duration = Duration::from_secs(300);
const MAX_RESPONSE: usize = 16 * 1024;
const STREAM_STACK: usize = 8 * 1024;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignUpResponse {
    id_token: String,
    refresh_token: String,
    expires_in: String,
}

#[derive(Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    expires_in: String,
}

struct Session {
    id_token: String,
    refresh_token: String,
    expires_at: Instant,
}

impl Session {
    fn new(id_token: String, refresh_token: String, expires_in: &str) -> Self {
        let secs = expires_in.parse::<u64>().unwrap_or(3600);
        Self {
            id_token,
            refresh_token,
            expires_at: Instant::now() + Duration::from_secs(secs),
        }
    }

    fn is_fresh(&self) -> bool {
        Instant::now() + REFRESH_MARGIN < self.expires_at
    }
}

struct StreamHandle {
    events: Receiver<StreamEvent>,
    stop: Arc<AtomicBool>,
    _thread: JoinHandle<()>,
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

pub struct FirebaseClient {
    settings: CloudSettings,
    session: Option<Session>,
    stream: Option<StreamHandle>,
}

impl FirebaseClient {
    pub fn new(settings: CloudSettings) -> Self {
        if settings.api_key.is_empty() {
            warn!("Firebase: no API key configured, sign-in will fail");
        }
        Self {
            settings,
            session: None,
            stream: None,
        }
    }

    fn token(&self) -> Result<&str, CloudError> {
        self.session
            .as_ref()
            .map(|s| s.id_token.as_str())
            .ok_or(CloudError::NotReady)
    }

    fn rtdb_url(&self, path: &str) -> Result<String, CloudError> {
        Ok(format!(
            "{}{}.json?auth={}",
            self.settings.database_url,
            path,
            self.token()?
        ))
    }

    fn refresh(&mut self) -> Result<(), CloudError> {
        let Some(session) = self.session.as_ref() else {
            return Err(CloudError::NotReady);
        };
        let url = format!("{}?key={}", REFRESH_URL, self.settings.api_key);
        let body = format!(
            "grant_type=refresh_token&refresh_token={}",
            urlencoding::encode(&session.refresh_token)
        );
        let text = send(
            Method::Post,
            &url,
            &[("Content-Type", "application/x-www-form-urlencoded")],
            Some(body.as_bytes()),
        )?;
        let resp: RefreshResponse =
            serde_json::from_str(&text).map_err(|_| CloudError::InvalidResponse)?;
        self.session = Some(Session::new(resp.id_token, resp.refresh_token, &resp.expires_in));
        info!("Firebase: session token refreshed");
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// HTTP plumbing
// ───────────────────────────────────────────────────────────────

fn connection(timeout: Duration) -> Result<HttpClient<EspHttpConnection>, CloudError> {
    let conf = HttpClientConfiguration {
        timeout: Some(timeout),
        crt_bundle_attach: Some(esp_idf_svc::sys::esp_crt_bundle_attach),
        ..Default::default()
    };
    EspHttpConnection::new(&conf)
        .map(HttpClient::wrap)
        .map_err(|e| {
            error!("Firebase: could not open connection: {:?}", e);
            CloudError::Transport
        })
}

/// One request/response round trip.  Non-2xx answers become
/// [`CloudError::Http`].
fn send(
    method: Method,
    url: &str,
    headers: &[(&str, &str)],
    body: Option<&[u8]>,
) -> Result<String, CloudError> {
    let mut client = connection(REQUEST_TIMEOUT)?;

    let len = body.map(<[u8]>::len).unwrap_or(0).to_string();
    let mut all_headers: Vec<(&str, &str)> = headers.to_vec();
    if body.is_some() {
        all_headers.push(("Content-Length", &len));
    }

    let mut request = client
        .request(method, url, &all_headers)
        .map_err(|_| CloudError::Transport)?;
    if let Some(body) = body {
        request.write_all(body).map_err(|_| CloudError::Transport)?;
        request.flush().map_err(|_| CloudError::Transport)?;
    }
    let mut response = request.submit().map_err(|_| CloudError::Transport)?;
    let status = response.status();

    let mut text = Vec::new();
    let mut chunk = [0_u8; 512];
    loop {
        let n = response.read(&mut chunk).map_err(|_| CloudError::Timeout)?;
        if n == 0 {
            break;
        }
        if text.len() + n > MAX_RESPONSE {
            warn!("Firebase: response over {} bytes truncated", MAX_RESPONSE);
            return Err(CloudError::InvalidResponse);
        }
        text.extend_from_slice(&chunk[..n]);
    }

    if !(200..300).contains(&status) {
        debug!("Firebase: {:?} {} -> {}", method, redact(url), status);
        return Err(CloudError::Http(status));
    }
    String::from_utf8(text).map_err(|_| CloudError::InvalidResponse)
}

/// Strip query strings (they carry the token or API key) before logging.
fn redact(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

fn stream_worker(
    url: String,
    events: mpsc::Sender<StreamEvent>,
    stop: Arc<AtomicBool>,
) {
    let run = || -> Result<(), CloudError> {
        let mut client = connection(STREAM_READ_TIMEOUT)?;
        let request = client
            .request(Method::Get, &url, &[("Accept", "text/event-stream")])
            .map_err(|_| CloudError::Transport)?;
        let mut response = request.submit().map_err(|_| CloudError::Transport)?;
        let status = response.status();
        if !(200..300).contains(&status) {
            return Err(CloudError::Http(status));
        }
        info!("Firebase: command stream open");

        let mut parser = SseParser::new();
        let mut parsed = Vec::new();
        let mut chunk = [0_u8; 512];
        while !stop.load(Ordering::Relaxed) {
            let n = response.read(&mut chunk).map_err(|_| CloudError::Timeout)?;
            if n == 0 {
                return Err(CloudError::Transport);
            }
            parser.push(&chunk[..n], &mut parsed);
            for ev in parsed.drain(..) {
                if events.send(ev).is_err() {
                    return Ok(());
                }
            }
        }
        Ok(())
    };

    match run() {
        Ok(()) => debug!("Firebase: stream worker stopped"),
        Err(CloudError::Timeout) => {
            warn!("Firebase: command stream went silent");
            let _ = events.send(StreamEvent::Timeout);
        }
        Err(e) => warn!("Firebase: command stream ended: {}", e),
    }
}

// ───────────────────────────────────────────────────────────────
// Ports
// ───────────────────────────────────────────────────────────────

impl AuthPort for FirebaseClient {
    fn begin(&mut self) -> Result<(), CloudError> {
        let url = format!("{}?key={}", SIGN_UP_URL, self.settings.api_key);
        let body = br#"{"returnSecureToken":true}"#;
        let text = send(
            Method::Post,
            &url,
            &[("Content-Type", "application/json")],
            Some(body),
        )?;
        let resp: SignUpResponse =
            serde_json::from_str(&text).map_err(|_| CloudError::InvalidResponse)?;
        self.session = Some(Session::new(resp.id_token, resp.refresh_token, &resp.expires_in));
        info!("Firebase: signed in anonymously");
        Ok(())
    }

    fn is_ready(&mut self) -> bool {
        match self.session.as_ref() {
            None => false,
            Some(s) if s.is_fresh() => true,
            Some(_) => match self.refresh() {
                Ok(()) => true,
                Err(e) => {
                    warn!("Firebase: token refresh failed: {}", e);
                    false
                }
            },
        }
    }
}

impl DocumentStore for FirebaseClient {
    fn create_document(&mut self, collection: &str, body: &str) -> Result<String, CloudError> {
        let url = format!("{}/{}", self.settings.documents_url(), collection);
        let auth = format!("Bearer {}", self.token()?);
        send(
            Method::Post,
            &url,
            &[("Authorization", &auth), ("Content-Type", "application/json")],
            Some(body.as_bytes()),
        )
    }

    fn patch_document(
        &mut self,
        path: &str,
        body: &str,
        update_mask: &str,
    ) -> Result<(), CloudError> {
        let url = format!(
            "{}/{}?updateMask.fieldPaths={}",
            self.settings.documents_url(),
            path,
            urlencoding::encode(update_mask)
        );
        let auth = format!("Bearer {}", self.token()?);
        send(
            Method::Patch,
            &url,
            &[("Authorization", &auth), ("Content-Type", "application/json")],
            Some(body.as_bytes()),
        )
        .map(drop)
    }

    fn list_documents(
        &mut self,
        collection_path: &str,
        page_size: u16,
        page_token: Option<&str>,
    ) -> Result<String, CloudError> {
        let mut url = format!(
            "{}/{}?pageSize={}",
            self.settings.documents_url(),
            collection_path,
            page_size
        );
        if let Some(token) = page_token {
            url.push_str("&pageToken=");
            url.push_str(&urlencoding::encode(token));
        }
        let auth = format!("Bearer {}", self.token()?);
        send(Method::Get, &url, &[("Authorization", &auth)], None)
    }
}

impl RealtimePort for FirebaseClient {
    fn begin_stream(&mut self, path: &str) -> Result<(), CloudError> {
        self.stream = None;
        let url = self.rtdb_url(path)?;
        let (tx, rx) = mpsc::channel();
        let stop = Arc::new(AtomicBool::new(false));
        let worker_stop = Arc::clone(&stop);
        let thread = thread::Builder::new()
            .name("rtdb-stream".into())
            .stack_size(STREAM_STACK)
            .spawn(move || stream_worker(url, tx, worker_stop))
            .map_err(|e| {
                error!("Firebase: could not spawn stream thread: {}", e);
                CloudError::Transport
            })?;
        self.stream = Some(StreamHandle {
            events: rx,
            stop,
            _thread: thread,
        });
        Ok(())
    }

    fn read_stream(&mut self) -> Result<Vec<StreamEvent>, CloudError> {
        let Some(handle) = self.stream.as_ref() else {
            return Err(CloudError::NotReady);
        };
        let mut out = Vec::new();
        loop {
            match handle.events.try_recv() {
                Ok(ev) => out.push(ev),
                Err(TryRecvError::Empty) => return Ok(out),
                Err(TryRecvError::Disconnected) => {
                    // Deliver what arrived before the worker exited first.
                    if out.is_empty() {
                        self.stream = None;
                        return Err(CloudError::Transport);
                    }
                    return Ok(out);
                }
            }
        }
    }

    fn delete_node(&mut self, path: &str) -> Result<(), CloudError> {
        let url = self.rtdb_url(path)?;
        send(Method::Delete, &url, &[], None).map(drop)
    }

    fn set_null(&mut self, path: &str) -> Result<(), CloudError> {
        let url = self.rtdb_url(path)?;
        send(
            Method::Put,
            &url,
            &[("Content-Type", "application/json")],
            Some(b"null"),
        )
        .map(drop)
    }
}
