//! HTTP front-end of the DeePTB agent: login, chat (batch and SSE), clear.

pub mod chat;
pub mod router;
pub mod server;
pub mod ui;

pub use chat::{ChatOrchestrator, Fragment, FragmentKind, StreamUpdate};
pub use router::{LoginOutcome, SessionRouter};
pub use server::{AppState, GatewayConfig, GatewayServer};
