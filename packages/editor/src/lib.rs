//! # Plaid Editor
//!
//! Synchronous editing core for one annotated document.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ model: EntityModel (arena, patches)         │
//! └─────────────────────────────────────────────┘
//!          ↓ read                  ↑ patches
//! ┌────────────────────┐  ┌─────────────────────┐
//! │ views: sentences,  │  │ mutations: Planner  │
//! │ tokens, relations  │  │  → MutationPlan     │
//! └────────────────────┘  └─────────────────────┘
//!                                   ↓
//! ┌─────────────────────────────────────────────┐
//! │ session (async crate): run plan remotely    │
//! │  - journal: inverses of optimistic patches  │
//! │  - reconciler: Clean / Mutating / Conflicted│
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **Server authority**: a conflict discards local state and reloads
//! 2. **One discipline per kind**: updates and deletes are optimistic,
//!    creates wait for the server-assigned id
//! 3. **Views are derived**: rebuilt in full from the model, never edited
//!
//! ## Usage
//!
//! ```rust,ignore
//! use plaid_editor::{build_sentences, Planner};
//!
//! let sentences = build_sentences(&model);
//!
//! let plan = Planner::new(&model).upsert_single_valued(&[token_id], "lemma", json!("cat"))?;
//! for step in &plan.steps {
//!     // hand step.op to the remote, apply step.effect to the model
//! }
//! ```

mod errors;
mod history;
mod journal;
mod mutations;
mod ops;
mod pipeline;
mod reconciler;
mod views;

pub use errors::EditorError;
pub use history::HistoryWindow;
pub use journal::{PendingMutation, RollbackJournal};
pub use mutations::{
    orthographies, Confirmation, MutationPlan, Orthography, PlannedStep, Planner, StepEffect,
    IGT_NAMESPACE, ORTHOGRAPHIES_KEY,
};
pub use ops::{RemoteOp, RemoteReply};
pub use pipeline::ViewPipeline;
pub use reconciler::{classify, ConflictMarkers, Outcome, Reconciler, SyncState};
pub use views::{build_sentences, partition, RelationView, SentenceView, SpanView, TokenView};
