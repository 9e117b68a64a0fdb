//! Method routing for the wake service.
//!
//! Every call carries a method name and a JSON object of parameters. The
//! [`Dispatcher`] maps names to plain handler functions; the table is filled
//! once at startup and only read afterwards, so it can be shared freely
//! between request threads.

use log::{debug, warn};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

use crate::metrics;
use crate::version;
use crate::wol;

pub const VERSION_METHOD: &str = "version";
pub const SEND_WOL_METHOD: &str = "sendWOL";
pub const VALIDATE_MAC_METHOD: &str = "validateMACFormat";

const BROADCAST_IP_FIELD: &str = "broadcastIP";
const MAC_ADDRESS_FIELD: &str = "macAddress";

pub type Handler = fn(&Value) -> Result<Value, DispatchError>;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Unknown method: {0}")]
    UnknownMethod(String),
    #[error("Could not encode reply")]
    Encoding(#[from] serde_json::Error),
}

#[derive(Serialize, Debug, PartialEq, Eq)]
pub struct SendReply {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize, Debug, PartialEq, Eq)]
pub struct ValidateReply {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize, Debug, PartialEq, Eq)]
pub struct VersionReply {
    pub success: bool,
    #[serde(flatten)]
    pub info: version::BuildInfo,
}

// Parameters that are present but not strings count as missing.
fn required<'a>(params: &'a Value, field: &str) -> Result<&'a str, String> {
    params
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("{} is required.", field))
}

fn version(_: &Value) -> Result<Value, DispatchError> {
    Ok(serde_json::to_value(VersionReply {
        success: true,
        info: version::build_info(),
    })?)
}

fn send_wol(params: &Value) -> Result<Value, DispatchError> {
    let result = required(params, BROADCAST_IP_FIELD)
        .and_then(|broadcast| Ok((broadcast, required(params, MAC_ADDRESS_FIELD)?)))
        .and_then(|(broadcast, mac)| {
            wol::send_wol(broadcast, mac).map_err(|e| {
                warn!("wake request for {} via {} failed: {}", mac, broadcast, e);
                e.to_string()
            })
        });
    Ok(serde_json::to_value(SendReply {
        success: result.is_ok(),
        error: result.err(),
    })?)
}

fn validate_mac_format(params: &Value) -> Result<Value, DispatchError> {
    let result = required(params, MAC_ADDRESS_FIELD)
        .and_then(|mac| wol::parse_mac(mac).map_err(|e| e.to_string()));
    Ok(serde_json::to_value(ValidateReply {
        valid: result.is_ok(),
        error: result.err(),
    })?)
}

#[derive(Default)]
pub struct Dispatcher {
    routes: HashMap<&'static str, Handler>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// The routing table served by the wake service.
    pub fn standard() -> Self {
        let mut dispatcher = Self::new();
        dispatcher
            .register(VERSION_METHOD, version)
            .register(SEND_WOL_METHOD, send_wol)
            .register(VALIDATE_MAC_METHOD, validate_mac_format);
        dispatcher
    }

    pub fn register(&mut self, method: &'static str, handler: Handler) -> &mut Self {
        self.routes.insert(method, handler);
        self
    }

    pub fn methods(&self) -> Vec<&'static str> {
        let mut methods: Vec<_> = self.routes.keys().copied().collect();
        methods.sort_unstable();
        methods
    }

    pub fn dispatch(&self, method: &str, params: &Value) -> Result<Value, DispatchError> {
        let Some((name, handler)) = self.routes.get_key_value(method) else {
            metrics::DISPATCH_REQUESTS.with_label_values(&["unknown"]).inc();
            return Err(DispatchError::UnknownMethod(method.to_string()));
        };
        metrics::DISPATCH_REQUESTS.with_label_values(&[*name]).inc();
        debug!("dispatching {} {}", name, params);
        handler(params)
    }
}
