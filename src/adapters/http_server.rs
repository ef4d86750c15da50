//! Setup web server (ESP-IDF only).
//!
//! Serves the provisioning routes on the soft AP and forwards every request
//! to the transport-free [`ProvisioningListener`].  A successful `/save`
//! reboots the device shortly after the response is flushed.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::anyhow;
use embedded_svc::http::{Headers, Method as HttpMethod};
use embedded_svc::io::{Read, Write};
use esp_idf_svc::http::server::{
    Configuration as HttpConfiguration, EspHttpConnection, EspHttpServer, Request,
};
use log::{error, info};

use crate::adapters::nvs::NvsAdapter;
use crate::adapters::wifi::WifiAdapter;
use crate::provisioning::{MAX_FORM_LEN, Method, ProvisioningListener};

/// Grace period between the "Saved" page and the reboot.
const RESTART_DELAY: Duration = Duration::from_millis(1500);

/// Everything a request handler touches.
pub struct ProvisioningSession {
    pub listener: ProvisioningListener,
    pub wifi: WifiAdapter,
    pub storage: NvsAdapter,
}

pub type SharedSession = Arc<Mutex<ProvisioningSession>>;

pub fn start(session: SharedSession) -> anyhow::Result<EspHttpServer<'static>> {
    let conf = HttpConfiguration {
        stack_size: 16 * 1024,
        ..Default::default()
    };
    let mut server = EspHttpServer::new(&conf)?;

    for (path, method) in [
        ("/", HttpMethod::Get),
        ("/networks", HttpMethod::Get),
        ("/save", HttpMethod::Post),
    ] {
        let session = Arc::clone(&session);
        server.fn_handler::<anyhow::Error, _>(path, method, move |req| {
            serve(req, method, &session)
        })?;
    }

    info!("Provisioning: HTTP server listening");
    Ok(server)
}

fn serve(
    mut req: Request<&mut EspHttpConnection<'_>>,
    method: HttpMethod,
    session: &SharedSession,
) -> anyhow::Result<()> {
    let body = if method == HttpMethod::Post {
        read_request_body(&mut req)?
    } else {
        Vec::new()
    };
    let uri = req.uri().to_owned();
    let method = match method {
        HttpMethod::Get => Method::Get,
        HttpMethod::Post => Method::Post,
        _ => Method::Other,
    };

    let resp = {
        let mut guard = session
            .lock()
            .map_err(|_| anyhow!("provisioning session poisoned"))?;
        let s = &mut *guard;
        s.listener
            .handle(method, &uri, &body, &mut s.wifi, &mut s.storage)
    };

    req.into_response(resp.status, None, &[("Content-Type", resp.content_type)])?
        .write_all(resp.body.as_bytes())?;

    if resp.restart {
        schedule_restart();
    }
    Ok(())
}

fn read_request_body(req: &mut Request<&mut EspHttpConnection<'_>>) -> anyhow::Result<Vec<u8>> {
    let len = req.content_len().unwrap_or(0) as usize;
    if len > MAX_FORM_LEN {
        // Let the listener reject it with a proper 400.
        return Ok(vec![0; MAX_FORM_LEN + 1]);
    }
    let mut body = vec![0_u8; len];
    if len > 0 {
        req.read_exact(&mut body)?;
    }
    Ok(body)
}

fn schedule_restart() {
    let spawned = thread::Builder::new()
        .name("prov-restart".into())
        .spawn(|| {
            thread::sleep(RESTART_DELAY);
            info!("Provisioning: restarting");
            // SAFETY: never returns; the chip resets.
            unsafe { esp_idf_svc::sys::esp_restart() };
        });
    if let Err(e) = spawned {
        error!("Provisioning: could not spawn restart thread: {}", e);
    }
}
