//! Mapping from HTTP-style resource paths to characteristic triples.

use crate::constants::{NOTIFY_UUID, SERVICE_UUID, WRITE_UUID};
use crate::error::{LedError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Service carrying the paginated JSON resources.
///
/// Placeholder: the vendor app does not publish this UUID or the per-resource
/// characteristics derived from it. Deployments supply the real triples through
/// `EngineConfig.endpoints`.
pub const DATA_SERVICE_UUID: &str = "01fa0001-46c9-4507-84bb-f2be3f24c47a";

/// Placeholder characteristic `id` under [`DATA_SERVICE_UUID`]
fn data_characteristic(id: u16) -> String {
    format!("01fa{:04x}-46c9-4507-84bb-f2be3f24c47a", id)
}

/// A single GATT characteristic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Characteristic {
    pub service: String,
    pub characteristic: String,
}

impl Characteristic {
    pub fn new(service: impl Into<String>, characteristic: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            characteristic: characteristic.into(),
        }
    }
}

/// How a completed response is reshaped before it reaches the caller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseTransform {
    #[default]
    Raw,
    /// Replace `{"array": [...], ...}` with the array itself
    UnwrapArray,
}

impl ResponseTransform {
    pub fn apply(&self, response: String) -> Result<String> {
        match self {
            ResponseTransform::Raw => Ok(response),
            ResponseTransform::UnwrapArray => {
                let mut value: serde_json::Value = serde_json::from_str(&response)?;
                let array = value
                    .get_mut("array")
                    .map(serde_json::Value::take)
                    .ok_or_else(|| LedError::Protocol("response has no array member".to_string()))?;
                Ok(serde_json::to_string(&array)?)
            }
        }
    }
}

/// A paginated resource: read commands go to `control`, chunks come back on `data`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub service: String,
    pub data: String,
    pub control: String,
    /// Parameter sent in read commands unless the request names one
    pub parameter: String,
    #[serde(default)]
    pub transform: ResponseTransform,
}

impl Endpoint {
    fn json(id: u16, parameter: &str, transform: ResponseTransform) -> Self {
        Self {
            service: DATA_SERVICE_UUID.to_string(),
            data: data_characteristic(id),
            control: data_characteristic(id + 1),
            parameter: parameter.to_string(),
            transform,
        }
    }

    pub fn data_characteristic(&self) -> Characteristic {
        Characteristic::new(&self.service, &self.data)
    }

    pub fn control_characteristic(&self) -> Characteristic {
        Characteristic::new(&self.service, &self.control)
    }
}

/// Endpoint table plus the fixed write and telemetry characteristics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointMap {
    pub paths: BTreeMap<String, Endpoint>,
    /// Target of chunked body writes
    pub write_target: Characteristic,
    /// Target of command frames
    pub command: Characteristic,
    /// Telemetry notifications
    pub telemetry: Characteristic,
}

impl Default for EndpointMap {
    fn default() -> Self {
        use ResponseTransform::*;
        let paths = [
            ("/json/si", Endpoint::json(0x0101, "si", Raw)),
            ("/json/state", Endpoint::json(0x0111, "state", Raw)),
            ("/json/info", Endpoint::json(0x0121, "info", Raw)),
            ("/presets.json", Endpoint::json(0x0131, "presets", Raw)),
            ("/json/eff", Endpoint::json(0x0141, "eff", UnwrapArray)),
            ("/json/fxdata", Endpoint::json(0x0151, "fxdata", UnwrapArray)),
            ("/json/pal", Endpoint::json(0x0161, "pal", UnwrapArray)),
        ]
        .into_iter()
        .map(|(path, endpoint)| (path.to_string(), endpoint))
        .collect();

        Self {
            paths,
            write_target: Characteristic::new(SERVICE_UUID, WRITE_UUID),
            command: Characteristic::new(SERVICE_UUID, WRITE_UUID),
            telemetry: Characteristic::new(SERVICE_UUID, NOTIFY_UUID),
        }
    }
}

/// A request URL split into path and `page` query parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRequest {
    pub path: String,
    pub page: Option<String>,
}

impl ResourceRequest {
    /// Parse `http://host/path?page=x`, `/path?page=x` or `path`
    pub fn parse(url: &str) -> Self {
        let without_scheme = match url.find("://") {
            Some(pos) => {
                let rest = &url[pos + 3..];
                rest.find('/').map_or("/", |slash| &rest[slash..])
            }
            None => url,
        };
        let (path, query) = match without_scheme.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (without_scheme, None),
        };
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };
        let page = query.and_then(|q| {
            q.split('&')
                .filter_map(|pair| pair.split_once('='))
                .find(|(key, _)| *key == "page")
                .map(|(_, value)| value.to_string())
        });
        Self { path, page }
    }
}

impl EndpointMap {
    pub fn lookup(&self, path: &str) -> Result<&Endpoint> {
        self.paths
            .get(path)
            .ok_or_else(|| LedError::UnknownEndpoint(path.to_string()))
    }

    /// Endpoint owning a data characteristic, if any
    pub fn by_data(&self, characteristic: &str) -> Option<&Endpoint> {
        self.paths.values().find(|e| e.data.eq_ignore_ascii_case(characteristic))
    }
}
