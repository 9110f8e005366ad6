//! Per-thread, stack-structured trace recorder.
//!
//! Builds a tree of method-call / read / write / loop-iteration trace
//! points while a managed worker runs, with guaranteed containment and
//! completion on normal return, exception, thread crash, or forced
//! shutdown of live threads by the main thread.

mod arena;
mod binary;
mod guarantee;
mod recorder;

pub use arena::{Completion, LeafKind, LeafNode, LoopIterationNode, LoopNode, MethodCallNode, NodeId, TraceArena, TraceNode};
pub use binary::{BinaryTraceWriter, InternTable, ObjectInterner, RecordTag};
pub use guarantee::{Guarantee, GuaranteeKind, GuaranteePolicy};
pub use recorder::{OutputMode, TraceError, TraceRecorder, TraceResult};
