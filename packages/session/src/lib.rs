//! # Plaid Session
//!
//! Async side of the annotation client: one [`DocumentSession`] per open
//! document, talking to the service through [`RemoteClient`] and listening
//! to it through [`EventSource`].
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  plan   ┌─────────────────────────────┐
//! │ editor       │ ──────▶ │ DocumentSession             │
//! │  Planner     │         │  model + journal + state    │
//! └──────────────┘         └─────────────────────────────┘
//!                             │ execute / fetch    ▲ events
//!                             ▼                    │
//!                   ┌──────────────┐   ┌────────────────────┐
//!                   │ RemoteClient │   │ EventDispatcher    │
//!                   └──────────────┘   │  one task per doc  │
//!                                      └────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! let (session, mut notices) = DocumentSession::open(remote, "doc-1", SessionConfig::default()).await?;
//! let mut dispatcher = EventDispatcher::new(events, session.config().event_buffer);
//! session.follow(&mut dispatcher).await?;
//!
//! session.upsert_single_valued(&[token_id], "upos", json!("NOUN")).await?;
//! while let Ok(notice) = notices.try_recv() {
//!     println!("{}", notice.message());
//! }
//! ```

mod config;
mod errors;
mod events;
mod remote;
mod session;

pub use config::SessionConfig;
pub use errors::{SessionError, SessionResult};
pub use events::{EventDispatcher, PushEvent};
pub use remote::{EventSource, EventStream, RawEvent, RemoteClient};
pub use session::{DocumentSession, Notice};
