//! Node state representation.
//!
//! Each node is one grid cell:
//! - Processor tiles hold two clamped registers (ACC, BAK), a compiled
//!   program, and the execution state machine fields
//! - Stack memory tiles hold a bounded FILO stack instead of a program
//! - Damaged tiles hold nothing and are always trivially complete
//! - Stream provider/consumer tiles sit just outside the visible grid and
//!   run the internal stream opcodes
//!
//! The outgoing port is modeled as two single-slot latches: a *queued*
//! (destination, value) pair written during execution, and the *live*
//! latch neighbors read from. The grid's commit phase merges queue into
//! latch; see `machine::grid` for the visibility rules.
//!
//! Nodes never hold references to their neighbors or the grid; all
//! cross-node access resolves through grid coordinates per call.

use smallvec::SmallVec;

use super::location::DataLocation;
use super::opcode::ExecError;
use crate::parser::CompiledProgram;

/// Smallest value a register can hold.
pub const REG_MIN: i32 = -999;

/// Largest value a register can hold.
pub const REG_MAX: i32 = 999;

/// Maximum number of values stored by a stack memory node.
pub const STACK_CAPACITY: usize = 15;

/// Tile kind. Fixed at grid construction; determines available behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A cell running a compiled program.
    Processor,
    /// A cell exposing a bounded FILO stack instead of a program.
    StackMemory,
    /// A programless cell, always trivially complete.
    Damaged,
    /// Internal: feeds one input stream into the column below it.
    StreamProvider,
    /// Internal: drains the column above it into one output stream.
    StreamConsumer,
}

impl NodeKind {
    /// Whether user programs can be installed on this kind of tile.
    #[inline]
    pub fn is_programmable(self) -> bool {
        self == NodeKind::Processor
    }
}

/// A single-slot directional output: one destination, at most one value.
#[derive(Debug, Clone, Default)]
pub struct PortLatch {
    /// Side the value is allowed to leave through (a direction, or
    /// `None` when nothing is committed).
    pub dest: DataLocation,
    /// The pending value, if any.
    pub value: Option<i32>,
}

impl PortLatch {
    /// Clear both destination and value.
    #[inline]
    pub fn clear(&mut self) {
        self.dest = DataLocation::None;
        self.value = None;
    }
}

/// A recorded execution-time fault on one node.
///
/// Faults abort the opcode attempt that raised them and are retried (and
/// re-recorded) on later ticks; the rest of the grid is unaffected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeFault {
    /// Index of the opcode whose attempt faulted.
    pub op_index: usize,
    /// 1-based source line of that opcode, if the program has a line map.
    pub line: Option<usize>,
    /// The addressing error raised.
    pub error: ExecError,
}

/// One grid cell.
#[derive(Debug, Clone)]
pub struct Node {
    x: i32,
    y: i32,
    kind: NodeKind,

    /// Compiled program. Empty for non-processor tiles.
    pub(crate) program: CompiledProgram,

    /// Index of the opcode currently executing. -1 until the grid's
    /// power-on tick arms the node.
    pub(crate) currentop: i32,

    /// Attempts spent on the current opcode so far. The first attempt of
    /// an opcode sees 0, the next 1, and so on.
    pub(crate) stalled: u32,

    /// Set once the node has completed (or faulted) this tick; cleared in
    /// the commit phase. A done node is skipped by later sub-passes.
    pub(crate) done_tick: bool,

    /// Opcode index and final attempt count of the opcode completed this
    /// tick, consumed by the commit phase for the commit hook.
    pub(crate) last_completed: Option<(usize, u32)>,

    /// Live outgoing latch, readable by neighbors.
    pub(crate) latch: PortLatch,

    /// Queued outgoing pair, merged into the latch at commit.
    pub(crate) queued: PortLatch,

    /// Sub-pass stamp of the queued value. A queued value is visible to
    /// neighbors only from a strictly later sub-pass.
    pub(crate) queued_pass: u64,

    /// Sub-pass in which a neighbor drained this node's outgoing value.
    /// Cleared when the current opcode completes.
    pub(crate) consumed_pass: Option<u64>,

    /// Value staged by the internal consume opcode, delivered to the
    /// stream host during commit.
    pub(crate) pending_output: Option<i32>,

    acc: i32,
    bak: i32,

    /// Concrete direction most recently resolved by an `ANY` read.
    pub(crate) last: DataLocation,

    /// Number of successful opcode completions; used for idle accounting.
    pub(crate) active_cycles: u64,

    stack: SmallVec<[i32; STACK_CAPACITY]>,

    /// Most recent execution fault, if any.
    pub(crate) fault: Option<NodeFault>,
}

impl Node {
    /// Create a node at the given position. Position and kind are fixed
    /// for the node's lifetime.
    pub fn new(x: i32, y: i32, kind: NodeKind) -> Self {
        Self {
            x,
            y,
            kind,
            program: CompiledProgram::default(),
            currentop: -1,
            stalled: 0,
            done_tick: false,
            last_completed: None,
            latch: PortLatch::default(),
            queued: PortLatch::default(),
            queued_pass: 0,
            consumed_pass: None,
            pending_output: None,
            acc: 0,
            bak: 0,
            last: DataLocation::None,
            active_cycles: 0,
            stack: SmallVec::new(),
            fault: None,
        }
    }

    /// X coordinate, 0-based. Stream nodes sit at -1 / height.
    #[inline]
    pub fn x(&self) -> i32 {
        self.x
    }

    /// Y coordinate, 0-based.
    #[inline]
    pub fn y(&self) -> i32 {
        self.y
    }

    /// Tile kind.
    #[inline]
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// The accumulator register.
    #[inline]
    pub fn acc(&self) -> i32 {
        self.acc
    }

    /// The backup register.
    #[inline]
    pub fn bak(&self) -> i32 {
        self.bak
    }

    /// Set ACC, clamped to the register range.
    #[inline]
    pub fn set_acc(&mut self, value: i32) {
        self.acc = value.clamp(REG_MIN, REG_MAX);
    }

    /// Set BAK, clamped to the register range.
    #[inline]
    pub fn set_bak(&mut self, value: i32) {
        self.bak = value.clamp(REG_MIN, REG_MAX);
    }

    /// Set both registers at once (SWP).
    #[inline]
    pub fn set_acc_and_bak(&mut self, acc: i32, bak: i32) {
        self.set_acc(acc);
        self.set_bak(bak);
    }

    /// The compiled program.
    #[inline]
    pub fn program(&self) -> &CompiledProgram {
        &self.program
    }

    /// Index of the opcode currently executing, or -1 before power-on.
    #[inline]
    pub fn current_op(&self) -> i32 {
        self.currentop
    }

    /// Attempts spent on the current opcode so far. Grows without bound
    /// on a permanently stalled node; stalling is a valid state, not an
    /// error.
    #[inline]
    pub fn stalled(&self) -> u32 {
        self.stalled
    }

    /// Number of successful opcode completions.
    #[inline]
    pub fn active_cycles(&self) -> u64 {
        self.active_cycles
    }

    /// Most recent execution fault, if any.
    #[inline]
    pub fn fault(&self) -> Option<&NodeFault> {
        self.fault.as_ref()
    }

    /// Concrete direction most recently resolved by an `ANY` read, or
    /// `NONE` if no `ANY` read has resolved yet.
    #[inline]
    pub fn last(&self) -> DataLocation {
        self.last
    }

    /// Stack contents, bottom first (stack memory nodes).
    #[inline]
    pub fn stack(&self) -> &[i32] {
        &self.stack
    }

    /// Install a compiled program, replacing any previous one.
    ///
    /// Never touches registers, stack, or port state. The node re-arms at
    /// the next power-on tick (`currentop` returns to -1).
    pub fn install_program(&mut self, program: CompiledProgram) {
        self.program = program;
        self.currentop = -1;
    }

    /// Push a value onto a stack memory node's stack.
    ///
    /// Returns false (without mutating) once the stack holds
    /// [`STACK_CAPACITY`] values.
    pub fn push_stack(&mut self, value: i32) -> bool {
        if self.stack.len() < STACK_CAPACITY {
            self.stack.push(value);
            true
        } else {
            false
        }
    }

    /// Pop the most recently pushed value, or `None` if the stack is
    /// empty. An empty pop does not mutate the stack.
    pub fn pop_stack(&mut self) -> Option<i32> {
        self.stack.pop()
    }

    /// Consume this node's outgoing latch: clears destination and value,
    /// returning the previous value. Exactly one reader can ever drain a
    /// given latched value.
    pub fn consume(&mut self) -> Option<i32> {
        self.latch.dest = DataLocation::None;
        self.latch.value.take()
    }

    /// Jump to the opcode bound to `label`.
    ///
    /// Sets `currentop` one before the target so the normal
    /// post-completion increment lands exactly on it. A jump is a purely
    /// local control-state change: it takes effect immediately, not at
    /// commit.
    pub fn jump_to(&mut self, label: &str) -> Result<(), ExecError> {
        let target = self
            .program
            .label(label)
            .ok_or_else(|| ExecError::UndefinedLabel(label.to_string()))?;

        self.done_tick = true;
        self.currentop = target as i32 - 1;
        self.stalled = 0;
        Ok(())
    }

    /// Reset to power-on state: registers, stack, latches, pointer, and
    /// counters. Does not touch the compiled program.
    pub fn reset(&mut self) {
        self.currentop = -1;
        self.stalled = 0;
        self.done_tick = false;
        self.last_completed = None;
        self.latch.clear();
        self.queued.clear();
        self.queued_pass = 0;
        self.consumed_pass = None;
        self.pending_output = None;
        self.acc = 0;
        self.bak = 0;
        self.last = DataLocation::None;
        self.active_cycles = 0;
        self.stack.clear();
        self.fault = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acc_clamps() {
        let mut node = Node::new(0, 0, NodeKind::Processor);
        node.set_acc(1500);
        assert_eq!(node.acc(), 999);
        node.set_acc(-1500);
        assert_eq!(node.acc(), -999);
        node.set_acc(42);
        assert_eq!(node.acc(), 42);
    }

    #[test]
    fn test_bak_clamps() {
        let mut node = Node::new(0, 0, NodeKind::Processor);
        node.set_bak(100_000);
        assert_eq!(node.bak(), 999);
        node.set_bak(-100_000);
        assert_eq!(node.bak(), -999);
    }

    #[test]
    fn test_stack_capacity() {
        let mut node = Node::new(0, 0, NodeKind::StackMemory);
        for i in 0..15 {
            assert!(node.push_stack(i), "push {} should succeed", i);
        }
        // The 16th push is rejected and the stack is unchanged.
        assert!(!node.push_stack(99));
        assert_eq!(node.stack().len(), 15);
        assert_eq!(node.stack()[14], 14);
    }

    #[test]
    fn test_stack_is_filo() {
        let mut node = Node::new(0, 0, NodeKind::StackMemory);
        node.push_stack(1);
        node.push_stack(2);
        node.push_stack(3);
        assert_eq!(node.pop_stack(), Some(3));
        assert_eq!(node.pop_stack(), Some(2));
        assert_eq!(node.pop_stack(), Some(1));
    }

    #[test]
    fn test_empty_pop_does_not_mutate() {
        let mut node = Node::new(0, 0, NodeKind::StackMemory);
        assert_eq!(node.pop_stack(), None);
        assert!(node.stack().is_empty());
        node.push_stack(5);
        assert_eq!(node.pop_stack(), Some(5));
        assert_eq!(node.pop_stack(), None);
    }

    #[test]
    fn test_consume_drains_latch() {
        let mut node = Node::new(0, 0, NodeKind::Processor);
        node.latch.dest = DataLocation::Right;
        node.latch.value = Some(7);

        assert_eq!(node.consume(), Some(7));
        assert_eq!(node.latch.dest, DataLocation::None);
        assert_eq!(node.latch.value, None);
        // A second consume finds nothing.
        assert_eq!(node.consume(), None);
    }

    #[test]
    fn test_reset_restores_power_on_state() {
        let mut node = Node::new(1, 2, NodeKind::Processor);
        node.set_acc(50);
        node.set_bak(-3);
        node.currentop = 4;
        node.stalled = 9;
        node.latch.dest = DataLocation::Down;
        node.latch.value = Some(1);
        node.last = DataLocation::Left;
        node.active_cycles = 77;

        node.reset();

        assert_eq!(node.acc(), 0);
        assert_eq!(node.bak(), 0);
        assert_eq!(node.current_op(), -1);
        assert_eq!(node.stalled(), 0);
        assert_eq!(node.latch.value, None);
        assert_eq!(node.latch.dest, DataLocation::None);
        assert_eq!(node.last, DataLocation::None);
        assert_eq!(node.active_cycles(), 0);
    }
}
