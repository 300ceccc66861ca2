// HTTP API and management page.

use crate::arp;
use crate::store::{self, Device, DeviceStore};
use crate::wol::{self, WakeService, DEFAULT_REPEAT};
use lazy_static::lazy_static;
use log::{info, warn};
use prometheus::{register_int_counter_vec, IntCounterVec};
use rouille::{router, Request, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::Read;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;

const INDEX_HTML: &str = include_str!("index.html");
const MAX_BODY_BYTES: u64 = 1024 * 1024;
const API_PATHS: [&str; 8] = [
    "/",
    "/api/list",
    "/api/groups",
    "/api/add",
    "/api/delete",
    "/api/wake",
    "/api/import",
    "/varz",
];

lazy_static! {
    static ref WAKE_TOTAL: IntCounterVec = register_int_counter_vec!(
        "wolgate_wake_total",
        "Wake requests handled, by result",
        &["result"]
    )
    .unwrap();
}

/// The JSON envelope every API route answers with.
#[derive(Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Deserialize)]
struct MacRequest {
    #[serde(default)]
    mac: String,
}

#[derive(Deserialize)]
struct ImportRequest {
    #[serde(default)]
    devices: Vec<ImportDevice>,
}

#[derive(Deserialize)]
struct ImportDevice {
    #[serde(default)]
    name: String,
    #[serde(default)]
    mac: String,
    #[serde(default)]
    ip: String,
}

#[derive(Serialize)]
struct ImportCandidate {
    #[serde(flatten)]
    entry: arp::Entry,
    exists: bool,
}

pub struct Handler {
    store: Arc<DeviceStore>,
    wol: WakeService,
    arp_path: PathBuf,
}

impl Handler {
    pub fn new(store: Arc<DeviceStore>, wol: WakeService) -> Self {
        Self {
            store,
            wol,
            arp_path: PathBuf::from(arp::DEFAULT_ARP_PATH),
        }
    }

    pub fn with_arp_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.arp_path = path.into();
        self
    }

    /// Routes one request, logging its path, status and latency.
    pub fn handle(&self, request: &Request) -> Response {
        rouille::log_custom(
            request,
            |req, resp, elapsed| {
                info!(
                    "{method} {path} {status} {elapsed:?}",
                    method = req.method(),
                    path = req.raw_url(),
                    status = resp.status_code,
                    elapsed = elapsed,
                )
            },
            |req, elapsed| {
                warn!(
                    "{method} {path} panicked after {elapsed:?}",
                    method = req.method(),
                    path = req.raw_url(),
                    elapsed = elapsed,
                )
            },
            || self.route(request),
        )
    }

    fn route(&self, request: &Request) -> Response {
        router!(request,
            (GET) (/) => { Response::html(INDEX_HTML) },
            (GET) (/api/list) => { success(self.store.list()) },
            (GET) (/api/groups) => { success(self.store.groups()) },
            (POST) (/api/add) => { self.add(request) },
            (POST) (/api/delete) => { self.delete(request) },
            (POST) (/api/wake) => { self.wake(request) },
            (GET) (/api/import) => { self.import_candidates() },
            (POST) (/api/import) => { self.import(request) },
            (GET) (/varz) => { varz() },
            _ => {
                if API_PATHS.contains(&request.url().as_str()) {
                    failure(405, "Method not allowed")
                } else {
                    Response::empty_404()
                }
            }
        )
    }

    fn add(&self, request: &Request) -> Response {
        let mut device: Device = match json_body(request) {
            Ok(d) => d,
            Err(_) => return failure(400, "Invalid request body"),
        };
        if let Err(msg) = validate_device(&device) {
            return failure(400, &msg);
        }
        device.mac = match wol::normalize(&device.mac) {
            Ok(mac) => mac,
            Err(e) => return failure(400, &e.to_string()),
        };
        let result = if self.store.get_by_mac(&device.mac).is_some() {
            let mac = device.mac.clone();
            self.store.update(&mac, device)
        } else {
            self.store.add(device)
        };
        match result {
            Ok(()) => success(Value::Null),
            Err(e) => failure(500, &e.to_string()),
        }
    }

    fn delete(&self, request: &Request) -> Response {
        let req: MacRequest = match json_body(request) {
            Ok(r) => r,
            Err(_) => return failure(400, "Invalid request body"),
        };
        if req.mac.trim().is_empty() {
            return failure(400, "MAC address is required");
        }
        let mac = wol::normalize(&req.mac).unwrap_or(req.mac);
        match self.store.delete(&mac) {
            Ok(()) => success(Value::Null),
            Err(e @ store::Error::NotFound(_)) => failure(404, &e.to_string()),
            Err(e) => failure(500, &e.to_string()),
        }
    }

    fn wake(&self, request: &Request) -> Response {
        let req: MacRequest = match json_body(request) {
            Ok(r) => r,
            Err(_) => return failure(400, "Invalid request body"),
        };
        if let Err(e) = wol::validate(&req.mac) {
            WAKE_TOTAL.with_label_values(&["invalid"]).inc();
            return failure(400, &e.to_string());
        }
        match self.wol.send_repeated(&req.mac, DEFAULT_REPEAT) {
            Ok(()) => {
                WAKE_TOTAL.with_label_values(&["sent"]).inc();
                info!("sent WOL packet to {}", req.mac);
                message(format!("WOL packet sent to {}", req.mac))
            }
            Err(e) => {
                WAKE_TOTAL.with_label_values(&["failed"]).inc();
                warn!("failed to wake {}: {}", req.mac, e);
                let status = match e {
                    wol::Error::InvalidFormat(_) => 400,
                    _ => 500,
                };
                failure(status, &format!("Failed to send WOL packet: {}", e))
            }
        }
    }

    fn import_candidates(&self) -> Response {
        let entries = match arp::local_entries(&self.arp_path) {
            Ok(entries) => entries,
            Err(e) => return failure(500, &format!("Failed to read ARP table: {}", e)),
        };
        let candidates: Vec<ImportCandidate> = entries
            .into_iter()
            .map(|entry| {
                let exists = wol::normalize(&entry.mac)
                    .map(|mac| self.store.get_by_mac(&mac).is_some())
                    .unwrap_or(false);
                ImportCandidate { entry, exists }
            })
            .collect();
        success(candidates)
    }

    fn import(&self, request: &Request) -> Response {
        let req: ImportRequest = match json_body(request) {
            Ok(r) => r,
            Err(_) => return failure(400, "Invalid request body"),
        };
        let mut imported = 0;
        for d in req.devices {
            let mac = match wol::normalize(&d.mac) {
                Ok(mac) => mac,
                Err(_) => continue,
            };
            if self.store.get_by_mac(&mac).is_some() {
                continue;
            }
            let name = if d.name.trim().is_empty() {
                format!("Device-{}", &mac[..8])
            } else {
                d.name
            };
            let device = Device {
                name,
                mac,
                ip: d.ip,
                ..Default::default()
            };
            match self.store.add(device) {
                Ok(()) => imported += 1,
                Err(e) => warn!("skipping import: {}", e),
            }
        }
        message(format!("Imported {} devices", imported))
    }
}

/// Decodes the request body as JSON whatever its Content-Type says.
fn json_body<T: DeserializeOwned>(request: &Request) -> Result<T, String> {
    let body = request.data().ok_or("request body already read")?;
    serde_json::from_reader(body.take(MAX_BODY_BYTES)).map_err(|e| e.to_string())
}

/// Checks a device before it is stored.
pub fn validate_device(device: &Device) -> Result<(), String> {
    if device.name.trim().is_empty() {
        return Err("device name is required".to_string());
    }
    if device.mac.trim().is_empty() {
        return Err("MAC address is required".to_string());
    }
    if let Err(e) = wol::validate(&device.mac) {
        return Err(format!("invalid MAC address: {}", e));
    }
    if !device.ip.is_empty() && device.ip.parse::<Ipv4Addr>().is_err() {
        return Err("invalid IP address format".to_string());
    }
    Ok(())
}

fn varz() -> Response {
    let metrics = prometheus::gather();
    let encoder = prometheus::TextEncoder::new();
    match encoder.encode_to_string(&metrics) {
        Ok(text) => Response::text(text),
        Err(e) => Response::text(e.to_string()).with_status_code(500),
    }
}

fn success(data: impl Serialize) -> Response {
    match serde_json::to_value(data) {
        Ok(data) => Response::json(&ApiResponse {
            success: true,
            data: Some(data).filter(|d| !d.is_null()),
            ..Default::default()
        }),
        Err(e) => failure(500, &e.to_string()),
    }
}

fn message(msg: String) -> Response {
    Response::json(&ApiResponse {
        success: true,
        message: Some(msg),
        ..Default::default()
    })
}

fn failure(status: u16, error: &str) -> Response {
    Response::json(&ApiResponse {
        success: false,
        error: Some(error.to_string()),
        ..Default::default()
    })
    .with_status_code(status)
}
