//! Inkwire Core Library
//!
//! Stroke synchronization and layer state for a shared freehand canvas.
//! Platform-agnostic: rendering and the network sit behind the
//! [`Renderer`] and [`Transport`] traits.

pub mod builder;
pub mod canvas;
pub mod config;
pub mod engine;
pub mod geometry;
pub mod layers;
pub mod protocol;
pub mod remote;
pub mod render;
pub mod session;
pub mod store;
pub mod stroke;
pub mod transport;

pub use builder::LocalStrokeBuilder;
pub use canvas::{CanvasState, LayerView};
pub use config::{ClientConfig, ConfigError};
pub use engine::Engine;
pub use geometry::CanvasGeometry;
pub use layers::{Layer, LayerError, LayerId, LayerManager};
pub use protocol::{ClientMessage, ProtocolError, ServerMessage, SnapshotResponse, WireStroke};
pub use remote::RemoteStrokeTable;
pub use render::{NullRenderer, Renderer};
pub use session::SyncSession;
pub use store::StrokeStore;
pub use stroke::{ParticipantId, Stroke, StrokeError, StrokeStyle};
pub use transport::{ConnectionState, MemoryTransport, SyncEvent, Transport, TransportError};
#[cfg(not(target_arch = "wasm32"))]
pub use transport::NativeWebSocket;
