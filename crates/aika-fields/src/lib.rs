// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! aika-fields: incremental reactive field substrate.
//!
//! Types declare fields; fields are wired by field links that navigate
//! relations between objects. After the type hierarchy is flattened, a
//! [`Document`] holds objects and propagates value deltas synchronously
//! along those links. Fields can defer their updates into a multi-round
//! [`Queue`], and max fields keep exactly one selected input at a time.
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::missing_const_for_fn,
    clippy::suboptimal_flops,
    clippy::redundant_pub_crate,
    clippy::module_name_repetitions,
    clippy::use_self
)]

/// Document configuration.
pub mod config;
/// Field value persistence.
pub mod codec;
mod document;
mod field;
mod function;
mod ident;
mod interceptor;
mod propagate;
/// Multi-round step queue.
pub mod queue;
mod relation;
/// Type/relation declarations and the flattening compiler.
pub mod schema;
mod selection;
mod softmax;
/// Queue and selection event hooks.
pub mod telemetry;

pub use codec::{decode_fields, encode_fields, CodecError};
pub use config::{ConfigError, DocumentConfig};
/// Objects, edges and the propagation entry points.
pub use document::{Document, DocumentError};
pub use field::{Field, FieldState};
pub use function::{ActivationFn, Combinator, Comparison};
pub use ident::{FieldDefId, FieldIndex, FieldLinkId, FieldRef, Hash, ObjId, RelationId, TypeId};
pub use interceptor::{FieldUpdate, QueueInterceptor};
pub use queue::{
    DrainReport, Phase, Queue, QueueError, QueueHost, QueueKey, Round, Step, Timestamp,
};
pub use relation::{Relation, RelationKind};
pub use schema::{
    FieldDef, FieldDefBuilder, FieldLinkDef, FlattenedType, LinkKind, QueueSpec, Schema,
    SchemaError, Slot, TypeDecl, TypeRegistry,
};
pub use selection::MaxInput;
pub use softmax::{SoftmaxFields, SoftmaxLayout};
pub use telemetry::{
    NullObserver, NullSink, QueueEventSink, SelectionEvent, SelectionObserver, TracingSink,
};
