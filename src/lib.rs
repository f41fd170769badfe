//! İş Takip: voice-driven job tracking bridge.
//!
//! A headless client for a five-stage gas installation workflow board,
//! layered with a realtime voice assistant: the operator speaks, a remote
//! conversational model calls back with structured tool calls, and the
//! bridge executes them against the task repository while streaming the
//! model's synthesized speech to the speakers.
//!
//! # Architecture
//!
//! Independent stages connected by async channels, torn down together by a
//! shared cancellation token:
//! - **Audio capture**: microphone → 16kHz mono PCM frames via `cpal`
//! - **Realtime session**: WebSocket to the conversational model; outbound
//!   frames and tool responses, inbound tool calls and synthesized audio
//! - **Tool-call executor**: `addTask` / `moveTask` / `getBoardStatus`
//!   against the live task snapshot
//! - **Playback scheduler**: gapless, in-order chunk playback via `cpal`

pub mod audio;
pub mod auth;
pub mod board;
pub mod config;
pub mod error;
pub mod live;
pub mod notify;
pub mod store;
pub mod tools;

pub use auth::{AuthSession, Identity};
pub use board::{Task, TaskStatus};
pub use config::AppConfig;
pub use error::{BridgeError, Result};
pub use live::{BridgeEvent, SessionManager, SessionState};
pub use store::{SnapshotCache, TaskRepository};
pub use tools::ToolCallExecutor;
