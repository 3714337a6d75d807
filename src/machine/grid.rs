//! The grid: sole owner of all node storage and driver of the tick
//! protocol.
//!
//! # Tick protocol
//!
//! The very first `tick()` is the power-on transition: every node with a
//! non-empty program gets armed at opcode 0 and nothing executes. Every
//! later tick runs:
//!
//! ```text
//!   sub-pass 1   every node not yet done attempts its current opcode
//!   sub-pass 2   nodes still pending retry (producers may have written)
//!   commit       queued port writes merge into the live latches,
//!                done flags clear, commit hooks run
//! ```
//!
//! The two sub-passes are the entire concurrency model. A value queued in
//! sub-pass 1 becomes readable by a neighbor in sub-pass 2 of the same
//! tick, but never within the sub-pass that queued it, and never two
//! hops in one tick. Each queued value and each drain carries the global
//! sub-pass number it happened in, and is observable only from a strictly
//! later sub-pass; this makes every outcome independent of the order
//! nodes are visited in.
//!
//! Blocking is purely logical: a node waiting on data re-attempts the
//! same opcode with a growing stall counter. A node stalled on data that
//! never arrives is a valid, permanent, inspectable state.
//!
//! # Stream nodes
//!
//! Input and output streams are wired as hidden provider/consumer nodes
//! one row above and below the visible grid at the stream's column. They
//! take part in the tick like any other node, running the internal
//! stream opcodes against the bound [`StreamHost`].

use thiserror::Error;

use super::location::{DataLocation, ANY_READ_ORDER};
use super::node::{Node, NodeFault, NodeKind};
use super::opcode::{ExecError, ExecuteResult, Opcode};
use crate::parser::{self, CompileError, CompiledProgram};
use crate::puzzle::{Stream, StreamKind};
use crate::stream::StreamHost;

/// Default number of nodes across.
pub const DEFAULT_WIDTH: usize = 4;

/// Default number of nodes down.
pub const DEFAULT_HEIGHT: usize = 3;

/// Error constructing a grid from a puzzle definition.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GridError {
    /// The layout does not cover exactly width x height tiles.
    #[error("layout has {found} tiles, expected {expected} (width x height)")]
    LayoutSize { expected: usize, found: usize },

    /// A stream references a column outside the grid.
    #[error("stream '{name}' is bound to column {column}, outside a grid {width} wide")]
    StreamColumn {
        name: String,
        column: usize,
        width: usize,
    },
}

/// Error installing a program on a node.
#[derive(Debug, Error)]
pub enum InstallError {
    /// No node at the given coordinates.
    #[error("no node at ({x}, {y})")]
    OutOfBounds { x: i32, y: i32 },

    /// The node at the given coordinates does not run programs.
    #[error("node at ({x}, {y}) is not programmable")]
    NotProgrammable { x: i32, y: i32 },

    /// Compilation failed; the node's previous program is untouched.
    #[error(transparent)]
    Compile(#[from] CompileError),
}

/// The computer: a fixed 2D array of nodes plus the hidden stream nodes.
pub struct Grid {
    name: String,
    description: Vec<String>,
    streams: Vec<Stream>,
    width: usize,
    height: usize,

    /// Completed ticks. 0 means power-on has not happened yet.
    cycle: u64,

    /// Global sub-pass counter, used to stamp queued values and drains.
    pub(crate) pass: u64,

    /// Visible nodes in row-major order, then stream nodes.
    pub(crate) nodes: Vec<Node>,

    host: Option<Box<dyn StreamHost>>,
}

impl std::fmt::Debug for Grid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Grid")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("streams", &self.streams)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("cycle", &self.cycle)
            .field("pass", &self.pass)
            .field("nodes", &self.nodes)
            .field("host", &self.host.as_ref().map(|_| "<host>"))
            .finish()
    }
}

impl Grid {
    /// Create a grid from a puzzle definition.
    ///
    /// `layout` lists the tile kind of every visible cell in row-major
    /// order and must cover exactly `width x height` entries. Width and
    /// height default to 4 x 3. All nodes are created here, once; they
    /// live as long as the grid.
    pub fn new(
        name: impl Into<String>,
        description: Vec<String>,
        streams: Vec<Stream>,
        layout: Vec<NodeKind>,
        width: Option<usize>,
        height: Option<usize>,
    ) -> Result<Self, GridError> {
        let width = width.unwrap_or(DEFAULT_WIDTH);
        let height = height.unwrap_or(DEFAULT_HEIGHT);

        if layout.len() != width * height {
            return Err(GridError::LayoutSize {
                expected: width * height,
                found: layout.len(),
            });
        }

        let mut nodes = Vec::with_capacity(layout.len() + streams.len());
        for y in 0..height {
            for x in 0..width {
                nodes.push(Node::new(x as i32, y as i32, layout[y * width + x]));
            }
        }

        // Stream nodes sit just outside the visible grid: providers one
        // row above, consumers one row below their column.
        for stream in &streams {
            if stream.column >= width {
                return Err(GridError::StreamColumn {
                    name: stream.name.clone(),
                    column: stream.column,
                    width,
                });
            }
            let col = stream.column as i32;
            match stream.kind {
                StreamKind::Input => {
                    let mut node = Node::new(col, -1, NodeKind::StreamProvider);
                    node.install_program(CompiledProgram::internal(vec![Opcode::Provide]));
                    nodes.push(node);
                }
                StreamKind::Output | StreamKind::Image => {
                    let mut node = Node::new(col, height as i32, NodeKind::StreamConsumer);
                    node.install_program(CompiledProgram::internal(vec![Opcode::Consume]));
                    nodes.push(node);
                }
            }
        }

        Ok(Self {
            name: name.into(),
            description,
            streams,
            width,
            height,
            cycle: 0,
            pass: 0,
            nodes,
            host: None,
        })
    }

    /// Puzzle name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Puzzle description lines.
    #[inline]
    pub fn description(&self) -> &[String] {
        &self.description
    }

    /// Stream definitions this grid was built with.
    #[inline]
    pub fn streams(&self) -> &[Stream] {
        &self.streams
    }

    /// Number of nodes across.
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of nodes down.
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Completed ticks since power-on.
    #[inline]
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Bind the stream host collaborator the stream nodes talk to.
    pub fn bind_streams(&mut self, host: Box<dyn StreamHost>) {
        self.host = Some(host);
    }

    /// Look up a node by coordinates. Stream nodes are addressable at
    /// their off-grid positions (column, -1) and (column, height).
    pub fn node(&self, x: i32, y: i32) -> Option<&Node> {
        self.node_index(x, y).map(|id| &self.nodes[id])
    }

    /// Mutable node lookup.
    pub fn node_mut(&mut self, x: i32, y: i32) -> Option<&mut Node> {
        self.node_index(x, y).map(|id| &mut self.nodes[id])
    }

    /// Compile `source` and install it on the node at (x, y).
    ///
    /// All-or-nothing: if compilation fails the node's previously
    /// installed program is left untouched.
    pub fn compile_and_install(&mut self, x: i32, y: i32, source: &str) -> Result<(), InstallError> {
        let id = self
            .node_index(x, y)
            .ok_or(InstallError::OutOfBounds { x, y })?;
        if !self.nodes[id].kind().is_programmable() {
            return Err(InstallError::NotProgrammable { x, y });
        }

        let program = parser::compile_str(source)?;
        log::debug!(
            "installed {} opcode(s) on node ({}, {})",
            program.len(),
            x,
            y
        );
        self.nodes[id].install_program(program);
        Ok(())
    }

    /// Advance the machine one tick.
    ///
    /// The first call is the power-on transition (arms programs, executes
    /// nothing). Every later call runs two execution sub-passes over all
    /// nodes, then one commit pass, then increments the cycle counter.
    pub fn tick(&mut self) {
        if self.cycle == 0 {
            for node in &mut self.nodes {
                if !node.program.is_empty() {
                    node.currentop = 0;
                }
            }
            self.cycle = 1;
            return;
        }

        for _ in 0..2 {
            self.pass += 1;
            for id in 0..self.nodes.len() {
                self.step_node(id);
            }
        }

        for id in 0..self.nodes.len() {
            self.post_node(id);
        }

        self.cycle += 1;
    }

    /// Reset every node to power-on state and the cycle counter to 0.
    /// Compiled programs survive; the next `tick()` re-arms them.
    pub fn stop(&mut self) {
        for node in &mut self.nodes {
            node.reset();
        }
        self.cycle = 0;
        self.pass = 0;
    }

    /// One node's entry in one sub-pass. Skipped entirely when the node
    /// already completed this tick.
    fn step_node(&mut self, id: usize) {
        if self.nodes[id].done_tick {
            return;
        }

        // Programless tiles, and tiles not yet armed, are trivially
        // complete.
        if self.nodes[id].program.is_empty() || self.nodes[id].currentop < 0 {
            self.nodes[id].done_tick = true;
            return;
        }

        let cur = self.nodes[id].currentop as usize;
        let t = self.nodes[id].stalled;
        let op = match self.nodes[id].program.op(cur).cloned() {
            Some(op) => op,
            None => {
                self.nodes[id].done_tick = true;
                return;
            }
        };

        match op.attempt(self, id, t) {
            Ok(ExecuteResult::Complete) => {
                let node = &mut self.nodes[id];
                node.active_cycles += 1;
                node.done_tick = true;
                node.last_completed = Some((cur, t));
                node.currentop += 1;
                if node.currentop as usize >= node.program.len() {
                    node.currentop = 0;
                }
                node.stalled = 0;
                node.consumed_pass = None;
            }
            Ok(ExecuteResult::Pending) => {
                self.nodes[id].stalled += 1;
            }
            Err(error) => {
                let line = self.nodes[id].program.line_of(cur);
                let node = &mut self.nodes[id];
                // The attempt aborts for this tick; the opcode is retried
                // (and the fault re-recorded) on later ticks. The rest of
                // the grid keeps ticking.
                node.stalled += 1;
                node.done_tick = true;
                if node.fault.is_none() {
                    log::warn!(
                        "node ({}, {}) faulted at opcode {}: {}",
                        node.x(),
                        node.y(),
                        cur,
                        error
                    );
                }
                node.fault = Some(NodeFault {
                    op_index: cur,
                    line,
                    error,
                });
            }
        }
    }

    /// Commit phase for one node: clear the done flag, merge the queued
    /// port write into the live latch (the point at which it becomes
    /// visible to neighbors from the next tick on), and run the commit
    /// hook of the opcode that completed this tick, if any.
    fn post_node(&mut self, id: usize) {
        let completed = {
            let node = &mut self.nodes[id];
            node.done_tick = false;

            if node.queued.value.is_some() {
                node.latch.value = node.queued.value.take();
            }
            if node.queued.dest != DataLocation::None {
                node.latch.dest = node.queued.dest;
                node.queued.dest = DataLocation::None;
            }

            node.last_completed.take()
        };

        if let Some((index, stalls)) = completed {
            if let Some(op) = self.nodes[id].program.op(index).cloned() {
                op.commit(self, id, stalls);
            }
        }
    }

    /// Bounds-checked neighbor lookup relative to a node. Directional
    /// reads against a missing neighbor always report "not available".
    pub(crate) fn neighbor(&self, id: usize, dx: i32, dy: i32) -> Option<usize> {
        let node = &self.nodes[id];
        self.node_index(node.x() + dx, node.y() + dy)
    }

    fn node_index(&self, x: i32, y: i32) -> Option<usize> {
        let visible = self.width * self.height;
        if x >= 0 && (x as usize) < self.width && y >= 0 && (y as usize) < self.height {
            return Some(y as usize * self.width + x as usize);
        }
        self.nodes[visible..]
            .iter()
            .position(|n| n.x() == x && n.y() == y)
            .map(|i| i + visible)
    }

    /// Non-mutating probe: can `read` from this location succeed right
    /// now?
    ///
    /// Directional probes check the neighbor's live latch, and its queued
    /// value when that was queued in a strictly earlier sub-pass. `ANY`
    /// probes in the fixed priority order. `NIL` and `ACC` are always
    /// ready. Probing `BAK` or `NONE` is an addressing error.
    pub(crate) fn has_data(&self, id: usize, loc: DataLocation) -> Result<bool, ExecError> {
        match loc {
            DataLocation::Constant(_) => Ok(true),

            DataLocation::Up | DataLocation::Right | DataLocation::Down | DataLocation::Left => {
                let (dx, dy) = loc.origin();
                let facing = loc.opposite();
                Ok(match self.neighbor(id, dx, dy) {
                    Some(nid) => {
                        let n = &self.nodes[nid];
                        (n.latch.dest == facing && n.latch.value.is_some())
                            || (n.queued.dest == facing
                                && n.queued.value.is_some()
                                && n.queued_pass < self.pass)
                    }
                    None => false,
                })
            }

            DataLocation::Any => {
                for dir in ANY_READ_ORDER {
                    if self.has_data(id, dir)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }

            DataLocation::Last => {
                let last = self.nodes[id].last;
                // Guard against LAST referencing itself.
                if last == DataLocation::Last {
                    Ok(false)
                } else {
                    self.has_data(id, last)
                }
            }

            DataLocation::Nil | DataLocation::Acc => Ok(true),

            DataLocation::Bak | DataLocation::None => Err(ExecError::IllegalLocation(loc)),
        }
    }

    /// Consuming read.
    ///
    /// Directional reads drain the neighbor's latch (or visible queued
    /// value) and record the drain's sub-pass on the producer. An `ANY`
    /// read resolves through the priority order and records the concrete
    /// direction used into `last`. `LAST` replays that direction.
    pub(crate) fn read(&mut self, id: usize, loc: DataLocation) -> Result<i32, ExecError> {
        match loc {
            DataLocation::Constant(n) => Ok(n),

            DataLocation::Up | DataLocation::Right | DataLocation::Down | DataLocation::Left => {
                let (dx, dy) = loc.origin();
                let nid = self.neighbor(id, dx, dy).ok_or(ExecError::NoData)?;
                let pass = self.pass;
                let facing = loc.opposite();
                let n = &mut self.nodes[nid];

                if n.latch.dest == facing && n.latch.value.is_some() {
                    if let Some(value) = n.consume() {
                        n.consumed_pass = Some(pass);
                        return Ok(value);
                    }
                }
                if n.queued.dest == facing && n.queued.value.is_some() && n.queued_pass < pass {
                    n.queued.dest = DataLocation::None;
                    if let Some(value) = n.queued.value.take() {
                        n.consumed_pass = Some(pass);
                        return Ok(value);
                    }
                }
                Err(ExecError::NoData)
            }

            DataLocation::Any => {
                for dir in ANY_READ_ORDER {
                    if self.has_data(id, dir)? {
                        let value = self.read(id, dir)?;
                        self.nodes[id].last = dir;
                        return Ok(value);
                    }
                }
                Err(ExecError::NoData)
            }

            DataLocation::Last => {
                let last = self.nodes[id].last;
                self.read(id, last)
            }

            DataLocation::Nil => Ok(0),
            DataLocation::Acc => Ok(self.nodes[id].acc()),

            DataLocation::Bak | DataLocation::None => Err(ExecError::IllegalLocation(loc)),
        }
    }

    /// Fetch one value from the bound stream host for a provider node.
    pub(crate) fn fetch_input(&mut self, id: usize) -> Option<i32> {
        let host = self.host.as_mut()?;
        let node = &self.nodes[id];
        if host.has_input(node) {
            host.read_input(node)
        } else {
            None
        }
    }

    /// Deliver a consumer node's staged value to the bound stream host.
    pub(crate) fn deliver_output(&mut self, id: usize) {
        let value = match self.nodes[id].pending_output.take() {
            Some(value) => value,
            None => return,
        };
        if let Some(host) = self.host.as_mut() {
            host.add_output(&self.nodes[id], value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::node::PortLatch;

    fn grid() -> Grid {
        Grid::new(
            "TEST",
            Vec::new(),
            Vec::new(),
            vec![NodeKind::Processor; 12],
            None,
            None,
        )
        .unwrap()
    }

    /// Setup tick plus `n` execution ticks.
    fn run(grid: &mut Grid, n: usize) {
        for _ in 0..=n {
            grid.tick();
        }
    }

    #[test]
    fn test_default_dimensions() {
        let g = grid();
        assert_eq!(g.width(), 4);
        assert_eq!(g.height(), 3);
        assert!(g.node(3, 2).is_some());
        assert!(g.node(4, 0).is_none());
    }

    #[test]
    fn test_layout_size_mismatch() {
        let err = Grid::new(
            "BAD",
            Vec::new(),
            Vec::new(),
            vec![NodeKind::Processor; 5],
            None,
            None,
        )
        .unwrap_err();
        assert_eq!(
            err,
            GridError::LayoutSize {
                expected: 12,
                found: 5
            }
        );
    }

    #[test]
    fn test_first_tick_arms_programs() {
        let mut g = grid();
        g.compile_and_install(0, 0, "NOP").unwrap();

        assert_eq!(g.node(0, 0).unwrap().current_op(), -1);
        g.tick();
        assert_eq!(g.cycle(), 1);
        assert_eq!(g.node(0, 0).unwrap().current_op(), 0);
        // Nothing executed yet.
        assert_eq!(g.node(0, 0).unwrap().active_cycles(), 0);
        // Unprogrammed nodes stay unarmed.
        assert_eq!(g.node(1, 0).unwrap().current_op(), -1);
    }

    #[test]
    fn test_one_hop_same_tick_delivery() {
        let mut g = grid();
        g.compile_and_install(0, 0, "MOV ACC DOWN").unwrap();
        g.compile_and_install(0, 1, "MOV UP ACC").unwrap();
        g.node_mut(0, 0).unwrap().set_acc(42);

        // After the tick in which both first attempt, the reader already
        // holds the writer's value.
        run(&mut g, 1);
        assert_eq!(g.node(0, 1).unwrap().acc(), 42);
        // The writer itself completes one tick later, once it observes
        // the drain.
        assert_eq!(g.node(0, 0).unwrap().active_cycles(), 0);
        g.tick();
        assert_eq!(g.node(0, 0).unwrap().active_cycles(), 1);
    }

    #[test]
    fn test_three_node_relay_takes_two_ticks() {
        let mut g = grid();
        g.compile_and_install(0, 0, "MOV ACC DOWN").unwrap();
        g.compile_and_install(0, 1, "MOV UP DOWN").unwrap();
        g.compile_and_install(0, 2, "MOV UP ACC").unwrap();
        g.node_mut(0, 0).unwrap().set_acc(7);

        run(&mut g, 1);
        // One tick moves the value exactly one hop.
        assert_eq!(g.node(0, 2).unwrap().acc(), 0);
        g.tick();
        assert_eq!(g.node(0, 2).unwrap().acc(), 7);
    }

    #[test]
    fn test_end_to_end_diagnostic() {
        let mut g = grid();
        g.compile_and_install(0, 0, "ADD 112\nADD -11\nMOV ACC DOWN")
            .unwrap();
        g.compile_and_install(0, 1, "MOV UP ACC").unwrap();

        // 1 setup tick + 3 execution ticks.
        run(&mut g, 3);
        assert_eq!(g.node(0, 1).unwrap().acc(), 101);
    }

    #[test]
    fn test_any_reads_left_first_and_records_last() {
        let mut g = grid();
        g.compile_and_install(1, 1, "MOV ANY ACC").unwrap();
        g.compile_and_install(0, 1, "MOV ACC RIGHT").unwrap();
        g.compile_and_install(1, 0, "MOV ACC DOWN").unwrap();
        g.node_mut(0, 1).unwrap().set_acc(1);
        g.node_mut(1, 0).unwrap().set_acc(2);

        // Both neighbors offer a value in the same tick; LEFT wins.
        run(&mut g, 1);
        let center = g.node(1, 1).unwrap();
        assert_eq!(center.acc(), 1);
        assert_eq!(center.last(), DataLocation::Left);

        // Next tick the remaining UP value is taken.
        g.tick();
        let center = g.node(1, 1).unwrap();
        assert_eq!(center.acc(), 2);
        assert_eq!(center.last(), DataLocation::Up);
    }

    #[test]
    fn test_latched_value_consumed_exactly_once() {
        let mut g = grid();
        g.node_mut(0, 0).unwrap().latch = PortLatch {
            dest: DataLocation::Right,
            value: Some(5),
        };
        let reader = g.node_index(1, 0).unwrap();

        assert_eq!(g.has_data(reader, DataLocation::Left), Ok(true));
        assert_eq!(g.read(reader, DataLocation::Left), Ok(5));
        // Drained: a second read fails until a new value is latched.
        assert_eq!(g.has_data(reader, DataLocation::Left), Ok(false));
        assert_eq!(g.read(reader, DataLocation::Left), Err(ExecError::NoData));
    }

    #[test]
    fn test_missing_neighbor_reports_not_available() {
        let g = grid();
        let corner = g.node_index(0, 0).unwrap();
        // No node above the top row (no stream bound there).
        assert_eq!(g.has_data(corner, DataLocation::Up), Ok(false));
    }

    #[test]
    fn test_probing_bak_and_none_is_illegal() {
        let g = grid();
        let id = g.node_index(0, 0).unwrap();
        assert_eq!(
            g.has_data(id, DataLocation::Bak),
            Err(ExecError::IllegalLocation(DataLocation::Bak))
        );
        assert_eq!(
            g.has_data(id, DataLocation::None),
            Err(ExecError::IllegalLocation(DataLocation::None))
        );
    }

    #[test]
    fn test_last_self_reference_guard() {
        let mut g = grid();
        let id = g.node_index(0, 0).unwrap();
        // Unresolved LAST points at NONE, which is an addressing error.
        assert_eq!(
            g.has_data(id, DataLocation::Last),
            Err(ExecError::IllegalLocation(DataLocation::None))
        );
        // A (theoretically impossible) self-referencing LAST probes false
        // instead of recursing forever.
        g.nodes[id].last = DataLocation::Last;
        assert_eq!(g.has_data(id, DataLocation::Last), Ok(false));
    }

    #[test]
    fn test_fault_does_not_halt_the_grid() {
        let mut g = grid();
        g.compile_and_install(0, 0, "ADD BAK").unwrap();
        g.compile_and_install(1, 0, "ADD 1").unwrap();

        run(&mut g, 2);

        let faulty = g.node(0, 0).unwrap();
        let fault = faulty.fault().expect("fault recorded");
        assert_eq!(fault.error, ExecError::IllegalLocation(DataLocation::Bak));
        assert_eq!(fault.op_index, 0);
        assert_eq!(fault.line, Some(1));
        // The healthy neighbor kept executing.
        assert_eq!(g.node(1, 0).unwrap().acc(), 2);
    }

    #[test]
    fn test_permanent_stall_is_queryable() {
        let mut g = grid();
        g.compile_and_install(0, 0, "ADD UP").unwrap();

        run(&mut g, 3);
        let node = g.node(0, 0).unwrap();
        // Two attempts per tick, never an error, never progress.
        assert_eq!(node.stalled(), 6);
        assert!(node.fault().is_none());
        assert_eq!(node.active_cycles(), 0);
        assert_eq!(node.current_op(), 0);
    }

    #[test]
    fn test_infinite_loop_is_valid() {
        let mut g = grid();
        g.compile_and_install(0, 0, "LOOP: ADD 1\nJMP LOOP").unwrap();

        let program = g.node(0, 0).unwrap().program();
        assert_eq!(program.len(), 2);
        assert_eq!(program.label("LOOP"), Some(0));

        // ACC climbs by 1 every 2 completed-opcode cycles, forever.
        run(&mut g, 6);
        let node = g.node(0, 0).unwrap();
        assert_eq!(node.acc(), 3);
        assert_eq!(node.active_cycles(), 6);
    }

    #[test]
    fn test_damaged_node_is_trivially_complete() {
        let mut layout = vec![NodeKind::Processor; 12];
        layout[0] = NodeKind::Damaged;
        let mut g = Grid::new("TEST", Vec::new(), Vec::new(), layout, None, None).unwrap();

        run(&mut g, 3);
        let node = g.node(0, 0).unwrap();
        assert_eq!(node.active_cycles(), 0);
        assert_eq!(node.stalled(), 0);
        assert_eq!(node.current_op(), -1);
    }

    #[test]
    fn test_stop_restores_power_on_state() {
        let mut g = grid();
        g.compile_and_install(0, 0, "ADD 112\nADD -11\nMOV ACC DOWN")
            .unwrap();
        g.compile_and_install(0, 1, "MOV UP ACC").unwrap();
        run(&mut g, 3);
        assert_eq!(g.node(0, 1).unwrap().acc(), 101);

        g.stop();

        assert_eq!(g.cycle(), 0);
        for y in 0..3 {
            for x in 0..4 {
                let node = g.node(x, y).unwrap();
                assert_eq!(node.acc(), 0);
                assert_eq!(node.bak(), 0);
                assert_eq!(node.current_op(), -1);
                assert_eq!(node.stalled(), 0);
                assert!(node.latch.value.is_none());
            }
        }
        // Programs survive a stop; the run is repeatable.
        assert_eq!(g.node(0, 0).unwrap().program().len(), 3);
        run(&mut g, 3);
        assert_eq!(g.node(0, 1).unwrap().acc(), 101);
    }

    #[test]
    fn test_failed_compile_keeps_previous_program() {
        let mut g = grid();
        g.compile_and_install(0, 0, "ADD 1").unwrap();

        let err = g.compile_and_install(0, 0, "FROB 1").unwrap_err();
        assert!(matches!(err, InstallError::Compile(_)));

        // The old program is intact and still runs.
        assert_eq!(g.node(0, 0).unwrap().program().len(), 1);
        run(&mut g, 1);
        assert_eq!(g.node(0, 0).unwrap().acc(), 1);
    }

    #[test]
    fn test_install_on_unprogrammable_node() {
        let mut layout = vec![NodeKind::Processor; 12];
        layout[1] = NodeKind::StackMemory;
        let mut g = Grid::new("TEST", Vec::new(), Vec::new(), layout, None, None).unwrap();

        assert!(matches!(
            g.compile_and_install(1, 0, "NOP"),
            Err(InstallError::NotProgrammable { x: 1, y: 0 })
        ));
        assert!(matches!(
            g.compile_and_install(9, 9, "NOP"),
            Err(InstallError::OutOfBounds { x: 9, y: 9 })
        ));
    }

    #[test]
    fn test_install_does_not_touch_registers() {
        let mut g = grid();
        g.compile_and_install(0, 0, "ADD 1").unwrap();
        g.node_mut(0, 0).unwrap().set_acc(55);

        g.compile_and_install(0, 0, "SUB 1").unwrap();
        assert_eq!(g.node(0, 0).unwrap().acc(), 55);
    }
}
