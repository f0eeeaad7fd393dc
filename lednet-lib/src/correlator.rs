//! Paginated-read correlation.
//!
//! [`Correlator`] owns the table of in-flight reads for one device, keyed by
//! data characteristic. It performs no I/O: every [`Event`] produces a list of
//! [`Effect`]s for the caller to carry out. The sink type `S` is whatever the
//! driver uses to hand a result back to a suspended caller.
//!
//! Reads are pull-based. Page 1 is requested with `r<parameter>:1`; each full
//! chunk that arrives triggers a request for the next page, and the first short
//! chunk completes the response.

use crate::chunk::{ChunkReassembler, to_text};
use crate::endpoint::{Characteristic, Endpoint};
use crate::error::LedError;
use bytes::Bytes;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Caller-assigned identity of a read
pub type RequestId = u64;

/// An in-flight paginated read
#[derive(Debug)]
pub struct PendingRequest<S> {
    pub id: RequestId,
    pub characteristic: String,
    pub parameter: String,
    pub page: u32,
    pub endpoint: Endpoint,
    buffer: ChunkReassembler,
    sink: S,
}

impl<S> PendingRequest<S> {
    pub fn buffered(&self) -> &[u8] {
        self.buffer.pending()
    }
}

#[derive(Debug)]
pub enum Event<S> {
    StartRead {
        id: RequestId,
        endpoint: Endpoint,
        parameter: String,
        sink: S,
    },
    Chunk {
        characteristic: String,
        data: Bytes,
    },
    Timeout {
        id: RequestId,
    },
    Disconnected,
}

#[derive(Debug)]
pub enum Effect<S> {
    Write { target: Characteristic, data: Bytes },
    Resolve { sink: S, result: Result<String, LedError> },
    /// A complete unsolicited message on a watched characteristic
    Notification { characteristic: String, message: Bytes },
}

/// Read command for one page
pub fn read_command(parameter: &str, page: u32) -> Bytes {
    Bytes::from(format!("r{}:{}", parameter, page))
}

fn key(characteristic: &str) -> String {
    characteristic.to_ascii_lowercase()
}

#[derive(Debug)]
pub struct Correlator<S> {
    device: String,
    max_chunk: usize,
    read_timeout: Duration,
    pending: HashMap<String, PendingRequest<S>>,
    streams: HashMap<String, ChunkReassembler>,
}

impl<S> Correlator<S> {
    pub fn new(device: impl Into<String>, max_chunk: usize, read_timeout: Duration) -> Self {
        Self {
            device: device.into(),
            max_chunk,
            read_timeout,
            pending: HashMap::new(),
            streams: HashMap::new(),
        }
    }

    /// Reassemble unsolicited chunks on `characteristic` into notifications
    pub fn watch(&mut self, characteristic: &str) {
        self.streams
            .entry(key(characteristic))
            .or_insert_with(|| ChunkReassembler::new(self.max_chunk));
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn pending(&self, characteristic: &str) -> Option<&PendingRequest<S>> {
        self.pending.get(&key(characteristic))
    }

    pub fn handle(&mut self, event: Event<S>) -> Vec<Effect<S>> {
        match event {
            Event::StartRead {
                id,
                endpoint,
                parameter,
                sink,
            } => self.start_read(id, endpoint, parameter, sink),
            Event::Chunk { characteristic, data } => self.on_chunk(&characteristic, data),
            Event::Timeout { id } => self.on_timeout(id),
            Event::Disconnected => self.on_disconnect(),
        }
    }

    fn start_read(&mut self, id: RequestId, endpoint: Endpoint, parameter: String, sink: S) -> Vec<Effect<S>> {
        let characteristic = key(&endpoint.data);
        if self.pending.contains_key(&characteristic) {
            warn!(%characteristic, "Rejecting read, another is pending");
            return vec![Effect::Resolve {
                sink,
                result: Err(LedError::Busy(characteristic)),
            }];
        }

        debug!(id, %characteristic, %parameter, "Starting read");
        let command = Effect::Write {
            target: endpoint.control_characteristic(),
            data: read_command(&parameter, 1),
        };
        self.pending.insert(
            characteristic.clone(),
            PendingRequest {
                id,
                characteristic,
                parameter,
                page: 1,
                endpoint,
                buffer: ChunkReassembler::new(self.max_chunk),
                sink,
            },
        );
        vec![command]
    }

    fn on_chunk(&mut self, characteristic: &str, data: Bytes) -> Vec<Effect<S>> {
        let characteristic = key(characteristic);

        let Some(request) = self.pending.get_mut(&characteristic) else {
            return match self.streams.get_mut(&characteristic) {
                Some(stream) => stream
                    .push(&data)
                    .map(|message| Effect::Notification {
                        characteristic,
                        message,
                    })
                    .into_iter()
                    .collect(),
                None => {
                    trace!(%characteristic, len = data.len(), "Dropping chunk for idle characteristic");
                    Vec::new()
                }
            };
        };

        debug!(%characteristic, page = request.page, len = data.len(), "Received chunk");
        let Some(message) = request.buffer.push(&data) else {
            request.page += 1;
            return vec![Effect::Write {
                target: request.endpoint.control_characteristic(),
                data: read_command(&request.parameter, request.page),
            }];
        };

        match self.pending.remove(&characteristic) {
            Some(request) => {
                info!(id = request.id, %characteristic, pages = request.page, len = message.len(), "Read complete");
                let result = request.endpoint.transform.apply(to_text(&message));
                vec![Effect::Resolve {
                    sink: request.sink,
                    result,
                }]
            }
            None => Vec::new(),
        }
    }

    /// Drop a read without resolving it. Returns whether it was pending.
    pub fn cancel(&mut self, id: RequestId) -> bool {
        match self.find(id) {
            Some(characteristic) => self.pending.remove(&characteristic).is_some(),
            None => false,
        }
    }

    fn find(&self, id: RequestId) -> Option<String> {
        self.pending
            .iter()
            .find(|(_, request)| request.id == id)
            .map(|(characteristic, _)| characteristic.clone())
    }

    fn on_timeout(&mut self, id: RequestId) -> Vec<Effect<S>> {
        let Some(characteristic) = self.find(id) else {
            // Already resolved.
            return Vec::new();
        };

        match self.pending.remove(&characteristic) {
            Some(request) => {
                warn!(id, %characteristic, page = request.page, "Read timed out");
                vec![Effect::Resolve {
                    sink: request.sink,
                    result: Err(LedError::ReadTimeout {
                        characteristic,
                        timeout: self.read_timeout,
                    }),
                }]
            }
            None => Vec::new(),
        }
    }

    fn on_disconnect(&mut self) -> Vec<Effect<S>> {
        if !self.pending.is_empty() {
            warn!(device = %self.device, count = self.pending.len(), "Aborting pending reads on disconnect");
        }
        for stream in self.streams.values_mut() {
            stream.reset();
        }
        self.pending
            .drain()
            .map(|(_, request)| Effect::Resolve {
                sink: request.sink,
                result: Err(LedError::Disconnected(self.device.clone())),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{EndpointMap, ResponseTransform};

    const MAX: usize = 20;

    fn correlator() -> Correlator<u32> {
        Correlator::new("AA:BB", MAX, Duration::from_secs(5))
    }

    fn endpoint(path: &str) -> Endpoint {
        EndpointMap::default().paths[path].clone()
    }

    fn start(correlator: &mut Correlator<u32>, id: u64, path: &str, sink: u32) -> Vec<Effect<u32>> {
        let endpoint = endpoint(path);
        let parameter = endpoint.parameter.clone();
        correlator.handle(Event::StartRead {
            id,
            endpoint,
            parameter,
            sink,
        })
    }

    fn chunk(characteristic: &str, data: &[u8]) -> Event<u32> {
        Event::Chunk {
            characteristic: characteristic.to_string(),
            data: Bytes::copy_from_slice(data),
        }
    }

    fn written(effects: &[Effect<u32>]) -> Vec<String> {
        effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::Write { data, .. } => Some(String::from_utf8_lossy(data).to_string()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_start_read_sends_first_page() {
        let mut correlator = correlator();
        let effects = start(&mut correlator, 1, "/json/si", 7);
        assert_eq!(written(&effects), vec!["rsi:1"]);
        match &effects[0] {
            Effect::Write { target, .. } => assert_eq!(target.characteristic, endpoint("/json/si").control),
            other => panic!("Expected Write, got {:?}", other),
        }
        assert_eq!(correlator.pending_count(), 1);
    }

    #[test]
    fn test_single_chunk_response() {
        let mut correlator = correlator();
        start(&mut correlator, 1, "/json/si", 7);
        let data = endpoint("/json/si").data;
        let effects = correlator.handle(chunk(&data, b"{\"on\":true}"));
        match effects.as_slice() {
            [Effect::Resolve { sink, result: Ok(text) }] => {
                assert_eq!(*sink, 7);
                assert_eq!(text, "{\"on\":true}");
            }
            other => panic!("Expected one Resolve, got {:?}", other),
        }
        assert_eq!(correlator.pending_count(), 0);
    }

    #[test]
    fn test_three_page_presets_read() {
        let mut correlator = correlator();
        let data = endpoint("/presets.json").data;
        let mut writes = written(&start(&mut correlator, 1, "/presets.json", 5));

        let effects = correlator.handle(chunk(&data, &[b'a'; MAX]));
        writes.extend(written(&effects));
        let effects = correlator.handle(chunk(&data, &[b'b'; MAX]));
        writes.extend(written(&effects));
        assert_eq!(correlator.pending(&data).unwrap().buffered().len(), 2 * MAX);

        let effects = correlator.handle(chunk(&data, b"c"));
        assert_eq!(writes, vec!["rpresets:1", "rpresets:2", "rpresets:3"]);
        match effects.as_slice() {
            [Effect::Resolve { sink: 5, result: Ok(text) }] => {
                assert_eq!(text.len(), 2 * MAX + 1);
                assert!(text.starts_with("aaaa"));
                assert!(text.ends_with("bc"));
            }
            other => panic!("Expected one Resolve, got {:?}", other),
        }
        assert_eq!(correlator.pending_count(), 0);
    }

    #[test]
    fn test_explicit_parameter_overrides_endpoint_default() {
        let mut correlator = correlator();
        let effects = correlator.handle(Event::StartRead {
            id: 1,
            endpoint: endpoint("/presets.json"),
            parameter: "7".to_string(),
            sink: 1,
        });
        assert_eq!(written(&effects), vec!["r7:1"]);
    }

    #[test]
    fn test_disconnect_rejects_every_pending_read() {
        let mut correlator = correlator();
        start(&mut correlator, 1, "/presets.json", 1);
        start(&mut correlator, 2, "/json/state", 2);
        correlator.handle(chunk(&endpoint("/presets.json").data, &[b'a'; MAX]));

        let effects = correlator.handle(Event::Disconnected);
        let mut sinks: Vec<u32> = effects
            .iter()
            .map(|effect| match effect {
                Effect::Resolve { sink, result: Err(LedError::Disconnected(device)) } => {
                    assert_eq!(device, "AA:BB");
                    *sink
                }
                other => panic!("Expected Disconnected rejection, got {:?}", other),
            })
            .collect();
        sinks.sort();
        assert_eq!(sinks, vec![1, 2]);
        assert_eq!(correlator.pending_count(), 0);

        // Late chunks after the disconnect go nowhere.
        assert!(correlator.handle(chunk(&endpoint("/presets.json").data, b"x")).is_empty());
    }

    #[test]
    fn test_second_read_on_busy_characteristic_rejected() {
        let mut correlator = correlator();
        start(&mut correlator, 1, "/presets.json", 1);
        let effects = start(&mut correlator, 2, "/presets.json", 2);
        match effects.as_slice() {
            [Effect::Resolve { sink: 2, result: Err(LedError::Busy(_)) }] => {}
            other => panic!("Expected Busy rejection, got {:?}", other),
        }
        // The first request is untouched.
        assert_eq!(correlator.pending(&endpoint("/presets.json").data).unwrap().id, 1);
    }

    #[test]
    fn test_reads_on_different_characteristics_coexist() {
        let mut correlator = correlator();
        start(&mut correlator, 1, "/presets.json", 1);
        start(&mut correlator, 2, "/json/info", 2);
        assert_eq!(correlator.pending_count(), 2);

        let effects = correlator.handle(chunk(&endpoint("/json/info").data, b"{}"));
        assert!(matches!(effects.as_slice(), [Effect::Resolve { sink: 2, .. }]));
        assert_eq!(correlator.pending_count(), 1);
    }

    #[test]
    fn test_characteristic_match_ignores_case() {
        let mut correlator = correlator();
        start(&mut correlator, 1, "/json/si", 1);
        let upper = endpoint("/json/si").data.to_uppercase();
        let effects = correlator.handle(chunk(&upper, b"x"));
        assert!(matches!(effects.as_slice(), [Effect::Resolve { sink: 1, .. }]));
    }

    #[test]
    fn test_unwrap_array_transform_applied() {
        let mut correlator = correlator();
        start(&mut correlator, 1, "/json/eff", 3);
        assert_eq!(endpoint("/json/eff").transform, ResponseTransform::UnwrapArray);
        let effects = correlator.handle(chunk(&endpoint("/json/eff").data, br#"{"array":[1,2]}"#));
        match effects.as_slice() {
            [Effect::Resolve { result: Ok(text), .. }] => assert_eq!(text, "[1,2]"),
            other => panic!("Expected transformed result, got {:?}", other),
        }
    }

    #[test]
    fn test_timeout_rejects_only_matching_request() {
        let mut correlator = correlator();
        start(&mut correlator, 1, "/json/si", 1);
        assert!(correlator.handle(Event::Timeout { id: 99 }).is_empty());

        let effects = correlator.handle(Event::Timeout { id: 1 });
        assert!(matches!(
            effects.as_slice(),
            [Effect::Resolve { sink: 1, result: Err(LedError::ReadTimeout { .. }) }]
        ));
        assert_eq!(correlator.pending_count(), 0);
    }

    #[test]
    fn test_cancel_frees_characteristic() {
        let mut correlator = correlator();
        start(&mut correlator, 4, "/json/si", 1);
        assert!(correlator.cancel(4));
        assert!(!correlator.cancel(4));
        assert_eq!(written(&start(&mut correlator, 5, "/json/si", 2)), vec!["rsi:1"]);
    }

    #[test]
    fn test_idle_chunks_dropped_and_watched_chunks_reassembled() {
        let mut correlator = correlator();
        assert!(correlator.handle(chunk("unknown", b"abc")).is_empty());

        correlator.watch("NOTIFY");
        assert!(correlator.handle(chunk("notify", &[b'a'; MAX])).is_empty());
        let effects = correlator.handle(chunk("notify", b"z"));
        match effects.as_slice() {
            [Effect::Notification { characteristic, message }] => {
                assert_eq!(characteristic, "notify");
                assert_eq!(message.len(), MAX + 1);
            }
            other => panic!("Expected Notification, got {:?}", other),
        }
    }

    #[test]
    fn test_disconnect_clears_partial_notifications() {
        let mut correlator = correlator();
        correlator.watch("notify");
        correlator.handle(chunk("notify", &[b'a'; MAX]));
        correlator.handle(Event::Disconnected);
        let effects = correlator.handle(chunk("notify", b"z"));
        match effects.as_slice() {
            [Effect::Notification { message, .. }] => assert_eq!(message.as_ref(), b"z"),
            other => panic!("Expected fresh Notification, got {:?}", other),
        }
    }
}
