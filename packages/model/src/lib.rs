//! # Plaid Model
//!
//! In-memory representation of one annotated document.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ payload: nested wire shape from the server  │
//! └─────────────────────────────────────────────┘
//!                     ↓ load
//! ┌─────────────────────────────────────────────┐
//! │ graph: flat id-keyed arena                  │
//! │  - text layers → tokens → spans → relations │
//! │  - children stored as ordered id lists      │
//! │  - edits only through apply / apply_patch   │
//! └─────────────────────────────────────────────┘
//!                     ↓ to_payload
//! ┌─────────────────────────────────────────────┐
//! │ payload: same nested shape, for snapshots   │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Every structural edit is a [`ModelPatch`]. Applying one returns its
//! inverse, which is how optimistic edits are rolled back.

mod audit;
mod entities;
mod errors;
mod graph;
mod patch;
mod payload;
mod project;
mod roles;

pub use audit::{AuditEntry, AuditOp, AuditUser};
pub use entities::{
    DocumentRecord, Relation, RelationLayer, Span, SpanLayer, Text, TextLayer, Token, TokenLayer,
    FORM_KEY,
};
pub use errors::ModelError;
pub use graph::{EntityModel, EntityMut, EntityPath};
pub use patch::{LayerRef, ModelPatch};
pub use payload::{
    DocumentPayload, RelationLayerPayload, RelationPayload, SpanLayerPayload, SpanPayload,
    TextLayerPayload, TextPayload, TokenLayerPayload, TokenPayload,
};
pub use project::{DocumentSummary, LayerSummary, Project, Role};
pub use roles::LayerRoles;

pub use plaid_common::{Config, Id, Metadata, VersionToken};
