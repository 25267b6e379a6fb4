//! Demo target application
//!
//! Serves the "envelope" fixables over websockets so a controller can be
//! tried without a real target. Values survive reconnects.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::fixable::{
    initial_value, flatten_configs, Color, FixableConfig, FixableDisplay, FixableId,
    FixableValue, NamedValues,
};
use crate::transport::{websocket, Connection};
use crate::wire::{self, WireMessage};

/// Fixables of the envelope demo
pub fn envelope_configs() -> Vec<(FixableId, FixableConfig)> {
    vec![
        (
            FixableId::new("tweaks"),
            FixableConfig::Divider {
                display: FixableDisplay::new("Tweaks", 0),
            },
        ),
        (
            FixableId::new("group"),
            FixableConfig::Group {
                contents: vec![
                    (
                        FixableId::new("size"),
                        FixableConfig::Float {
                            min: 10.0,
                            max: 150.0,
                            display: FixableDisplay::new("Envelope size", 0),
                        },
                    ),
                    (
                        FixableId::new("angle"),
                        FixableConfig::Float {
                            min: -180.0,
                            max: 180.0,
                            display: FixableDisplay::new("Envelope angle", 1),
                        },
                    ),
                ],
                display: FixableDisplay::new("Geometry", 1),
            },
        ),
        (
            FixableId::new("color"),
            FixableConfig::Color {
                display: FixableDisplay::new("Letter color", 2),
            },
        ),
        (
            FixableId::new("controls"),
            FixableConfig::Divider {
                display: FixableDisplay::new("Controls", 3),
            },
        ),
        (
            FixableId::new("open"),
            FixableConfig::Bool {
                display: FixableDisplay::new("Letter read", 4),
            },
        ),
    ]
}

/// A target application exposing a fixed set of fixables
pub struct DemoTarget {
    stream_name: String,
    configs: Vec<(FixableId, FixableConfig)>,
    values: Mutex<NamedValues>,
}

impl DemoTarget {
    pub fn new(stream_name: impl Into<String>, configs: Vec<(FixableId, FixableConfig)>) -> Self {
        let values = flatten_configs(configs.iter().map(|(id, c)| (id, c)))
            .iter()
            .filter_map(|(id, config)| initial_value(config).map(|v| (id.clone(), v)))
            .collect();
        Self {
            stream_name: stream_name.into(),
            configs,
            values: Mutex::new(values),
        }
    }

    /// The envelope demo with its pre-connection values
    pub fn envelope() -> Self {
        let target = Self::new("envelope", envelope_configs());
        {
            let mut values = target.values.lock();
            values.insert(FixableId::new("size"), FixableValue::Float(50.0));
            values.insert(FixableId::new("angle"), FixableValue::Float(-30.0));
            values.insert(FixableId::new("color"), FixableValue::Color(Color::BLACK));
            values.insert(FixableId::new("open"), FixableValue::Bool(false));
        }
        target
    }

    pub fn value(&self, id: &FixableId) -> Option<FixableValue> {
        self.values.lock().get(id).copied()
    }

    fn session_start(&self) -> WireMessage {
        let mut values: Vec<_> = self
            .values
            .lock()
            .iter()
            .map(|(id, v)| (id.clone(), *v))
            .collect();
        values.sort_by(|a, b| a.0.cmp(&b.0));
        WireMessage::SessionStart {
            stream_name: self.stream_name.clone(),
            configs: self.configs.clone(),
            values,
        }
    }

    /// Run one controller session to completion
    pub async fn serve_connection(&self, connection: Connection) -> Result<()> {
        let (mut sink, mut source) = connection;

        sink.send_frame(wire::encode(&self.session_start())?)
            .await
            .context("Failed to announce fixables")?;
        info!("Session '{}' started", self.stream_name);

        while let Some(frame) = source.next_frame().await {
            let frame = frame.context("Connection lost")?;
            match wire::decode(&frame) {
                Ok(WireMessage::ValueBatch { values }) => {
                    let mut current = self.values.lock();
                    for (id, value) in values {
                        if current.contains_key(&id) {
                            info!("{} = {}", id, value);
                            current.insert(id, value);
                        } else {
                            debug!("Ignoring value for unknown fixable {}", id);
                        }
                    }
                }
                Ok(WireMessage::SessionEnd) => {
                    info!("Controller hung up");
                    sink.send_frame(wire::encode(&WireMessage::SessionEnd)?)
                        .await
                        .ok();
                    break;
                }
                Ok(other) => warn!("Unexpected {} from controller", other.name()),
                Err(e) => warn!("Dropping frame: {}", e),
            }
        }

        sink.close().await;
        info!("Session '{}' ended", self.stream_name);
        Ok(())
    }

    /// Accept controllers on `listener` until the task is dropped
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        info!(
            "Demo target '{}' listening on {}",
            self.stream_name,
            listener.local_addr()?
        );

        loop {
            let (stream, addr) = listener.accept().await?;
            debug!("Controller connecting from {}", addr);
            let target = Arc::clone(&self);
            tokio::spawn(async move {
                match websocket::accept(stream).await {
                    Ok(connection) => {
                        if let Err(e) = target.serve_connection(connection).await {
                            warn!("Session with {} failed: {:#}", addr, e);
                        }
                    }
                    Err(e) => warn!("Handshake with {} failed: {}", addr, e),
                }
            });
        }
    }
}
