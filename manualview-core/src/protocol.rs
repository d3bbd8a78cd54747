//! Host ⇄ engine message protocol.
//!
//! Every message is a JSON object tagged by `type`. The two directions travel
//! over separate ordered channels; neither side ever waits for a reply.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::debug;

use crate::{Color, DocumentSource, ViewerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavDirection {
    Next,
    Prev,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointerPhase {
    Down,
    Move,
    Up,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostCommand {
    /// `data` is a `data:application/pdf;base64,` URL or a locator. The engine
    /// decodes it, so a corrupt payload still reaches it and fails the load.
    InitPdf {
        data: String,
    },
    #[serde(alias = "search_start")]
    Search {
        query: String,
    },
    SearchNext,
    SearchPrev,
    ToggleDraw {
        enabled: bool,
        color: Color,
    },
    Nav {
        dir: NavDirection,
        /// Pages to move; the engine stops at the first and last page.
        #[serde(default = "single_step", skip_serializing_if = "is_single_step")]
        count: u32,
    },
    Scroll {
        offset: f32,
    },
    Pointer {
        phase: PointerPhase,
        page: u32,
        x: f32,
        y: f32,
    },
    Close,
}

fn single_step() -> u32 {
    1
}

fn is_single_step(count: &u32) -> bool {
    *count == 1
}

impl HostCommand {
    pub fn init_pdf(source: DocumentSource) -> Self {
        HostCommand::InitPdf {
            data: source.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    Ready,
    Loaded {
        total: u32,
    },
    #[serde(alias = "meta")]
    PageChanged {
        page: u32,
        total: u32,
    },
    PageFailed {
        page: u32,
        reason: String,
    },
    LoadFailed {
        reason: String,
    },
    SearchStart {
        query: String,
    },
    SearchResult {
        count: usize,
        index: usize,
    },
    VisiblePageChanged {
        page: u32,
    },
}

pub fn encode<T: Serialize>(message: &T) -> Result<String, ViewerError> {
    Ok(serde_json::to_string(message)?)
}

pub fn decode<T: DeserializeOwned>(raw: &str) -> Option<T> {
    match serde_json::from_str(raw) {
        Ok(message) => Some(message),
        Err(err) => {
            debug!(%err, raw, "ignoring malformed message");
            None
        }
    }
}

pub fn bridge() -> (HostPort, EnginePort) {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    (
        HostPort {
            commands: command_tx,
            events: event_rx,
        },
        EnginePort {
            commands: command_rx,
            events: event_tx,
        },
    )
}

pub struct HostPort {
    commands: mpsc::UnboundedSender<String>,
    events: mpsc::UnboundedReceiver<String>,
}

impl HostPort {
    pub fn send(&self, command: &HostCommand) -> Result<(), ViewerError> {
        self.send_raw(encode(command)?)
    }

    pub fn send_raw(&self, raw: String) -> Result<(), ViewerError> {
        self.commands
            .send(raw)
            .map_err(|_| ViewerError::Disconnected)
    }

    pub async fn recv(&mut self) -> Option<EngineEvent> {
        while let Some(raw) = self.events.recv().await {
            if let Some(event) = decode(&raw) {
                return Some(event);
            }
        }
        None
    }

    pub fn try_recv(&mut self) -> Result<Option<EngineEvent>, ViewerError> {
        loop {
            match self.events.try_recv() {
                Ok(raw) => {
                    if let Some(event) = decode(&raw) {
                        return Ok(Some(event));
                    }
                }
                Err(TryRecvError::Empty) => return Ok(None),
                Err(TryRecvError::Disconnected) => return Err(ViewerError::Disconnected),
            }
        }
    }
}

pub struct EnginePort {
    commands: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<String>,
}

impl EnginePort {
    pub fn emit(&self, event: &EngineEvent) -> Result<(), ViewerError> {
        self.emit_raw(encode(event)?)
    }

    pub fn emit_raw(&self, raw: String) -> Result<(), ViewerError> {
        self.events.send(raw).map_err(|_| ViewerError::Disconnected)
    }

    pub async fn next_command(&mut self) -> Option<HostCommand> {
        while let Some(raw) = self.commands.recv().await {
            if let Some(command) = decode(&raw) {
                return Some(command);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_use_snake_case_type_tags() {
        insta::assert_snapshot!(
            encode(&HostCommand::ToggleDraw { enabled: true, color: Color::rgb(255, 0, 0) }).unwrap(),
            @r###"{"type":"toggle_draw","enabled":true,"color":"#FF0000"}"###
        );
        insta::assert_snapshot!(
            encode(&HostCommand::SearchNext).unwrap(),
            @r###"{"type":"search_next"}"###
        );
        insta::assert_snapshot!(
            encode(&HostCommand::Nav { dir: NavDirection::Prev, count: 1 }).unwrap(),
            @r###"{"type":"nav","dir":"prev"}"###
        );
        insta::assert_snapshot!(
            encode(&HostCommand::Nav { dir: NavDirection::Next, count: 4 }).unwrap(),
            @r###"{"type":"nav","dir":"next","count":4}"###
        );
    }

    #[test]
    fn events_use_snake_case_type_tags() {
        insta::assert_snapshot!(
            encode(&EngineEvent::SearchResult { count: 3, index: 1 }).unwrap(),
            @r###"{"type":"search_result","count":3,"index":1}"###
        );
        insta::assert_snapshot!(encode(&EngineEvent::Ready).unwrap(), @r###"{"type":"ready"}"###);
    }

    #[test]
    fn legacy_type_names_are_accepted() {
        let search: HostCommand = decode(r#"{"type":"search_start","query":"torque"}"#).unwrap();
        assert_eq!(
            search,
            HostCommand::Search {
                query: "torque".into()
            }
        );

        let meta: EngineEvent = decode(r#"{"type":"meta","page":2,"total":5}"#).unwrap();
        assert_eq!(meta, EngineEvent::PageChanged { page: 2, total: 5 });
    }

    #[test]
    fn init_pdf_carries_bytes_as_data_url() {
        let command = HostCommand::init_pdf(DocumentSource::Bytes(b"%PDF".to_vec()));
        let wire = encode(&command).unwrap();
        assert!(wire.contains("data:application/pdf;base64,JVBERg=="));
        assert_eq!(decode::<HostCommand>(&wire), Some(command));
    }

    #[test]
    fn init_pdf_with_corrupt_payload_still_decodes() {
        let raw = r#"{"type":"init_pdf","data":"data:application/pdf;base64,@@not-base64@@"}"#;
        let Some(HostCommand::InitPdf { data }) = decode::<HostCommand>(raw) else {
            panic!("init_pdf was dropped");
        };
        assert!(DocumentSource::try_from(data).is_err());
    }

    #[test]
    fn malformed_messages_are_dropped() {
        assert_eq!(decode::<EngineEvent>("not json"), None);
        assert_eq!(decode::<EngineEvent>(r#"{"type":"unknown"}"#), None);
        assert_eq!(decode::<HostCommand>(r#"{"type":"search"}"#), None);
    }

    #[tokio::test]
    async fn bridge_skips_garbage_and_preserves_order() {
        let (mut host, mut engine) = bridge();

        host.send_raw("{oops".into()).unwrap();
        host.send(&HostCommand::SearchNext).unwrap();
        host.send(&HostCommand::SearchPrev).unwrap();
        assert_eq!(engine.next_command().await, Some(HostCommand::SearchNext));
        assert_eq!(engine.next_command().await, Some(HostCommand::SearchPrev));

        engine.emit(&EngineEvent::Ready).unwrap();
        engine.emit_raw("[]".into()).unwrap();
        engine.emit(&EngineEvent::Loaded { total: 3 }).unwrap();
        assert_eq!(host.try_recv().unwrap(), Some(EngineEvent::Ready));
        assert_eq!(host.try_recv().unwrap(), Some(EngineEvent::Loaded { total: 3 }));
        assert_eq!(host.try_recv().unwrap(), None);

        drop(engine);
        assert!(host.try_recv().is_err());
        assert!(host.send(&HostCommand::Close).is_err());
    }
}
