//! Per-thread trace recording: the container-open algorithm, loop
//! protocol, thread lifecycle, and live-thread shutdown.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::warn;

use crate::arena::{Completion, LeafKind, LeafNode, LoopIterationNode, LoopNode, MethodCallNode, NodeId, TraceArena, TraceNode};
use crate::binary::BinaryTraceWriter;
use crate::guarantee::{GuaranteeKind, GuaranteePolicy};

/// Walks parent links from `node` up to the nearest enclosing method call,
/// which is the receiver the binary encoder attributes a field/array access
/// to. The thread root is itself a `Thread.run` method call, so this always
/// terminates.
fn container_identity(arena: &TraceArena, mut node: NodeId) -> (u64, String) {
    loop {
        if let TraceNode::MethodCall(m) = arena.get(node) {
            return (m.obj, m.class.clone());
        }
        match arena.get(node).parent() {
            Some(p) => node = p,
            None => return (0, String::new()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("thread {0} has no active trace recording")]
    UnknownThread(usize),
    #[error("thread {0} has no open method call to close")]
    NoOpenCall(usize),
}

pub type TraceResult<T> = Result<T, TraceError>;

struct LoopFrame {
    loop_id: u64,
    loop_node: NodeId,
    current_iteration: Option<NodeId>,
}

/// One open method call on a thread's stack. `is_inline` marks a frame the
/// recorder opened on the thread's behalf (e.g. a guarantee-driven
/// synthetic scope) rather than one an instrumented `enter_method` call
/// will itself close; such frames are force-closed, with a warning, when
/// an enclosing frame closes instead.
struct StackFrame {
    node: Option<NodeId>,
    loop_stack: Vec<LoopFrame>,
    ignored_here: bool,
    is_inline: bool,
}

struct ThreadTraceState {
    root: Option<NodeId>,
    stack: Vec<StackFrame>,
}

impl ThreadTraceState {
    fn new() -> Self {
        Self { root: None, stack: Vec::new() }
    }

    fn top_container(&self) -> Option<NodeId> {
        self.stack.iter().rev().find_map(|f| f.node).or(self.root)
    }
}

/// RAII "inside injected code" marker. Every public recorder entry point
/// holds one for its full body so the shutdown sweep's spin-wait has an
/// accurate signal.
struct InjectedCodeGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InjectedCodeGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self { flag }
    }
}

impl Drop for InjectedCodeGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    BinaryStream,
    BinaryDump,
    Text,
    TextVerbose,
    Null,
}

pub struct TraceRecorder {
    arena: Mutex<TraceArena>,
    threads: Vec<Mutex<ThreadTraceState>>,
    inside_injected_code: Vec<AtomicBool>,
    finished: Vec<AtomicBool>,
    ignored_depth: Vec<std::sync::atomic::AtomicU32>,
    guarantees: GuaranteePolicy,
    output_mode: OutputMode,
    /// Present only for the two modes that actually encode a binary trace.
    /// `Text`/`TextVerbose`/`Null` carry no byte format of their own, so
    /// there is nothing for this recorder to feed besides the arena tree.
    binary: Option<Mutex<BinaryTraceWriter>>,
}

impl TraceRecorder {
    pub fn new(thread_count: usize, guarantees: GuaranteePolicy, output_mode: OutputMode) -> Self {
        let binary = matches!(output_mode, OutputMode::BinaryStream | OutputMode::BinaryDump)
            .then(|| Mutex::new(BinaryTraceWriter::new()));
        Self {
            arena: Mutex::new(TraceArena::new()),
            threads: (0..thread_count).map(|_| Mutex::new(ThreadTraceState::new())).collect(),
            inside_injected_code: (0..thread_count).map(|_| AtomicBool::new(false)).collect(),
            finished: (0..thread_count).map(|_| AtomicBool::new(false)).collect(),
            ignored_depth: (0..thread_count).map(|_| std::sync::atomic::AtomicU32::new(0)).collect(),
            guarantees,
            output_mode,
            binary,
        }
    }

    pub fn output_mode(&self) -> OutputMode {
        self.output_mode
    }

    /// The binary trace recorded so far, for `BinaryStream`/`BinaryDump`
    /// runs. `None` under the other three output modes. `BinaryStream`
    /// callers may read this incrementally; `BinaryDump` callers read it
    /// once after the root thread has finished.
    pub fn binary_bytes(&self) -> Option<Vec<u8>> {
        self.binary.as_ref().map(|w| w.lock().bytes_so_far().to_vec())
    }

    fn binary_close(&self, w: &mut BinaryTraceWriter, completion: &Completion) {
        match completion {
            Completion::Value(v) => w.method_call_close(v),
            Completion::Exception(e) => w.method_call_throw(e),
            Completion::Unfinished => w.method_call_close(""),
        }
    }

    fn guard(&self, tid: usize) -> InjectedCodeGuard<'_> {
        InjectedCodeGuard::enter(&self.inside_injected_code[tid])
    }

    pub fn on_thread_start(&self, tid: usize) -> TraceResult<()> {
        let _guard = self.guard(tid);
        let mut arena = self.arena.lock();
        let root = arena.push(TraceNode::MethodCall(MethodCallNode {
            class: "Thread".into(),
            method: "run".into(),
            obj: tid as u64,
            params: vec![],
            parent: None,
            children: vec![],
            completion: None,
        }));
        if let Some(binary) = &self.binary {
            binary.lock().method_call_open("Thread", "run", tid as u64, &[]);
        }
        drop(arena);
        let mut state = self.threads.get(tid).ok_or(TraceError::UnknownThread(tid))?.lock();
        state.root = Some(root);
        state.stack.push(StackFrame { node: Some(root), loop_stack: vec![], ignored_here: false, is_inline: false });
        Ok(())
    }

    pub fn on_thread_finish(&self, tid: usize, completion: Completion) -> TraceResult<()> {
        let _guard = self.guard(tid);
        let mut state = self.threads.get(tid).ok_or(TraceError::UnknownThread(tid))?.lock();
        while state.stack.len() > 1 {
            self.force_close_top(&mut state, Completion::Unfinished);
        }
        if let Some(frame) = state.stack.pop() {
            if let Some(node) = frame.node {
                if let Some(binary) = &self.binary {
                    self.binary_close(&mut binary.lock(), &completion);
                }
                self.arena.lock().close(node, completion);
            }
        }
        self.finished[tid].store(true, Ordering::Release);
        Ok(())
    }

    pub fn enter_method(&self, tid: usize, class: &str, method: &str, obj: u64, params: Vec<String>) -> TraceResult<()> {
        let _guard = self.guard(tid);
        let mut state = self.threads.get(tid).ok_or(TraceError::UnknownThread(tid))?.lock();
        let already_ignored = self.ignored_depth[tid].load(Ordering::Acquire) > 0;
        let kind = self.guarantees.classify(class, method);

        if already_ignored {
            state.stack.push(StackFrame { node: None, loop_stack: vec![], ignored_here: false, is_inline: false });
            return Ok(());
        }

        let parent = state.top_container();
        if let Some(binary) = &self.binary {
            binary.lock().method_call_open(class, method, obj, &params);
        }
        let node = self.arena.lock().push(TraceNode::MethodCall(MethodCallNode {
            class: class.to_string(),
            method: method.to_string(),
            obj,
            params,
            parent,
            children: vec![],
            completion: None,
        }));

        let ignored_here = matches!(kind, Some(GuaranteeKind::Ignore) | Some(GuaranteeKind::Atomic));
        if ignored_here {
            self.ignored_depth[tid].fetch_add(1, Ordering::AcqRel);
        }
        state.stack.push(StackFrame { node: Some(node), loop_stack: vec![], ignored_here, is_inline: false });
        Ok(())
    }

    fn force_close_top(&self, state: &mut ThreadTraceState, completion: Completion) {
        if let Some(frame) = state.stack.pop() {
            let unfinished_loops = frame.loop_stack.len();
            let mut arena = self.arena.lock();
            for loop_frame in frame.loop_stack.into_iter().rev() {
                if let Some(iter) = loop_frame.current_iteration {
                    arena.close(iter, Completion::Unfinished);
                }
                arena.close(loop_frame.loop_node, Completion::Unfinished);
            }
            if let Some(binary) = &self.binary {
                let mut w = binary.lock();
                for _ in 0..unfinished_loops {
                    w.loop_close();
                }
                if frame.node.is_some() {
                    self.binary_close(&mut w, &completion);
                }
            }
            if let Some(node) = frame.node {
                arena.close(node, completion);
            }
        }
    }

    fn exit_method(&self, tid: usize, completion: Completion) -> TraceResult<()> {
        let _guard = self.guard(tid);
        let mut state = self.threads.get(tid).ok_or(TraceError::UnknownThread(tid))?.lock();

        loop {
            let top_inline = state.stack.last().map(|f| f.is_inline).unwrap_or(false);
            if !top_inline {
                break;
            }
            warn!(tid, "closing unbalanced inline trace frame on method exit");
            self.force_close_top(&mut state, Completion::Unfinished);
        }

        let frame = state.stack.pop().ok_or(TraceError::NoOpenCall(tid))?;
        let unfinished_loops = frame.loop_stack.len();
        let mut arena = self.arena.lock();
        for loop_frame in frame.loop_stack.into_iter().rev() {
            if let Some(iter) = loop_frame.current_iteration {
                arena.close(iter, Completion::Unfinished);
            }
            arena.close(loop_frame.loop_node, Completion::Unfinished);
        }
        if let Some(binary) = &self.binary {
            let mut w = binary.lock();
            for _ in 0..unfinished_loops {
                w.loop_close();
            }
            if frame.node.is_some() {
                self.binary_close(&mut w, &completion);
            }
        }
        if let Some(node) = frame.node {
            arena.close(node, completion);
        }
        drop(arena);

        if frame.ignored_here {
            self.ignored_depth[tid].fetch_sub(1, Ordering::AcqRel);
        }
        Ok(())
    }

    pub fn exit_method_value(&self, tid: usize, value: impl Into<String>) -> TraceResult<()> {
        self.exit_method(tid, Completion::Value(value.into()))
    }

    pub fn exit_method_exception(&self, tid: usize, exception_class: impl Into<String>) -> TraceResult<()> {
        self.exit_method(tid, Completion::Exception(exception_class.into()))
    }

    fn emit_binary_leaf(&self, w: &mut BinaryTraceWriter, kind: LeafKind, obj: u64, class: &str, field: Option<&str>, index: Option<u32>, value: &str) {
        match kind {
            LeafKind::Read => w.read(field.unwrap_or(""), obj, class, value),
            LeafKind::Write => w.write(field.unwrap_or(""), obj, class, value),
            LeafKind::ArrayRead => w.array_read(obj, class, index.unwrap_or(0), value),
            LeafKind::ArrayWrite => w.array_write(obj, class, index.unwrap_or(0), value),
            LeafKind::LocalRead => w.local_read(field.unwrap_or(""), value),
            LeafKind::LocalWrite => w.local_write(field.unwrap_or(""), value),
        }
    }

    fn record_leaf(&self, tid: usize, kind: LeafKind, field: Option<String>, array_index: Option<u32>, value: String) -> TraceResult<()> {
        let _guard = self.guard(tid);
        if self.ignored_depth[tid].load(Ordering::Acquire) > 0 {
            return Ok(());
        }
        let state = self.threads.get(tid).ok_or(TraceError::UnknownThread(tid))?.lock();
        let Some(parent) = state.top_container() else {
            return Ok(());
        };
        drop(state);
        let mut arena = self.arena.lock();
        if let Some(binary) = &self.binary {
            let (obj, class) = container_identity(&arena, parent);
            let mut w = binary.lock();
            self.emit_binary_leaf(&mut w, kind, obj, &class, field.as_deref(), array_index, &value);
        }
        arena.push(TraceNode::Leaf(LeafNode { kind, field, value, parent }));
        Ok(())
    }

    pub fn record_read(&self, tid: usize, field: &str, value: impl Into<String>) -> TraceResult<()> {
        self.record_leaf(tid, LeafKind::Read, Some(field.to_string()), None, value.into())
    }

    pub fn record_write(&self, tid: usize, field: &str, value: impl Into<String>) -> TraceResult<()> {
        self.record_leaf(tid, LeafKind::Write, Some(field.to_string()), None, value.into())
    }

    pub fn record_array_read(&self, tid: usize, index: usize, value: impl Into<String>) -> TraceResult<()> {
        self.record_leaf(tid, LeafKind::ArrayRead, Some(index.to_string()), Some(index as u32), value.into())
    }

    pub fn record_array_write(&self, tid: usize, index: usize, value: impl Into<String>) -> TraceResult<()> {
        self.record_leaf(tid, LeafKind::ArrayWrite, Some(index.to_string()), Some(index as u32), value.into())
    }

    pub fn record_local_read(&self, tid: usize, local: &str, value: impl Into<String>) -> TraceResult<()> {
        self.record_leaf(tid, LeafKind::LocalRead, Some(local.to_string()), None, value.into())
    }

    pub fn record_local_write(&self, tid: usize, local: &str, value: impl Into<String>) -> TraceResult<()> {
        self.record_leaf(tid, LeafKind::LocalWrite, Some(local.to_string()), None, value.into())
    }

    /// Instrumented back-edge. Opens a new `Loop` container if `loop_id`
    /// differs from the currently open loop, otherwise closes the previous
    /// iteration and starts a new one under the same loop node.
    pub fn loop_iteration(&self, tid: usize, loop_id: u64) -> TraceResult<()> {
        let _guard = self.guard(tid);
        if self.ignored_depth[tid].load(Ordering::Acquire) > 0 {
            return Ok(());
        }
        let mut state = self.threads.get(tid).ok_or(TraceError::UnknownThread(tid))?.lock();
        let parent = state.top_container();
        let frame = state.stack.last_mut().ok_or(TraceError::NoOpenCall(tid))?;

        let needs_new_loop = frame.loop_stack.last().map(|l| l.loop_id != loop_id).unwrap_or(true);
        let mut arena = self.arena.lock();

        if needs_new_loop {
            let loop_node = arena.push(TraceNode::Loop(LoopNode { loop_id, parent, children: vec![], completion: None }));
            let iter = arena.push(TraceNode::LoopIteration(LoopIterationNode { parent: loop_node, children: vec![], completion: None }));
            frame.loop_stack.push(LoopFrame { loop_id, loop_node, current_iteration: Some(iter) });
            if let Some(binary) = &self.binary {
                let mut w = binary.lock();
                w.loop_open(loop_id);
                w.loop_iteration();
            }
        } else {
            let loop_frame = frame.loop_stack.last_mut().unwrap();
            if let Some(prev) = loop_frame.current_iteration.take() {
                arena.close(prev, Completion::Value(String::new()));
            }
            let iter = arena.push(TraceNode::LoopIteration(LoopIterationNode {
                parent: loop_frame.loop_node,
                children: vec![],
                completion: None,
            }));
            loop_frame.current_iteration = Some(iter);
            if let Some(binary) = &self.binary {
                binary.lock().loop_iteration();
            }
        }
        Ok(())
    }

    /// Loop exit. Tolerates irregular control flow (e.g. `break` out of
    /// nested loops): iterates closing loops from the top of the stack
    /// until `loop_id` matches the one just closed, or none remain open.
    pub fn loop_exit(&self, tid: usize, loop_id: u64) -> TraceResult<()> {
        let _guard = self.guard(tid);
        let mut state = self.threads.get(tid).ok_or(TraceError::UnknownThread(tid))?.lock();
        let frame = state.stack.last_mut().ok_or(TraceError::NoOpenCall(tid))?;
        let mut arena = self.arena.lock();

        loop {
            let Some(loop_frame) = frame.loop_stack.pop() else { break };
            if let Some(iter) = loop_frame.current_iteration {
                arena.close(iter, Completion::Value(String::new()));
            }
            arena.close(loop_frame.loop_node, Completion::Value(String::new()));
            if let Some(binary) = &self.binary {
                binary.lock().loop_close();
            }
            if loop_frame.loop_id == loop_id {
                break;
            }
            warn!(tid, expected = loop_id, closed = loop_frame.loop_id, "loop exit closed a mismatched loop frame");
        }
        Ok(())
    }

    /// Live-thread shutdown. Disables further analysis on every thread
    /// that hasn't finished, spin-waits until each is outside any
    /// instrumented prologue, then force-closes every still open
    /// container with `Unfinished`.
    pub fn shutdown_live_threads(&self) {
        for tid in 0..self.threads.len() {
            if self.finished[tid].load(Ordering::Acquire) {
                continue;
            }
            self.ignored_depth[tid].store(u32::MAX, Ordering::Release);
            while self.inside_injected_code[tid].load(Ordering::Acquire) {
                std::hint::spin_loop();
            }
            let mut state = self.threads[tid].lock();
            while !state.stack.is_empty() {
                self.force_close_top(&mut state, Completion::Unfinished);
            }
            self.finished[tid].store(true, Ordering::Release);
        }
    }

    pub fn arena_len(&self) -> usize {
        self.arena.lock().len()
    }

    pub fn all_containers_closed(&self) -> bool {
        self.arena.lock().all_containers_closed()
    }
}
