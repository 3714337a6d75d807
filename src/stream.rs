//! Stream host collaborator.
//!
//! The core never owns stream data flow: the internal provider/consumer
//! opcodes call into a host-supplied [`StreamHost`], and the core
//! sequences exactly one value per successful completion. Cursor
//! position, exhaustion, and collection policy are all the host's
//! business.
//!
//! [`BufferedStreams`] is the reference host: it feeds each input
//! stream's values in order and collects outputs per column. Hosts that
//! want to keep a handle for inspection while the grid owns the binding
//! wrap it in `Rc<RefCell<..>>`, which also implements the trait.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use crate::machine::node::Node;
use crate::puzzle::{Stream, StreamKind};

/// Host-side collaborator the stream nodes talk to.
///
/// `node` is always the provider/consumer node making the request; hosts
/// key their streams off its column (`node.x()`).
pub trait StreamHost {
    /// Whether the input stream feeding this node has a value ready.
    fn has_input(&self, node: &Node) -> bool;

    /// Take the next input value for this node, if any.
    fn read_input(&mut self, node: &Node) -> Option<i32>;

    /// Record one value this node drained from the grid.
    fn add_output(&mut self, node: &Node, value: i32);
}

/// Reference host: in-memory input queues and output collections, one
/// per stream column.
#[derive(Debug, Default)]
pub struct BufferedStreams {
    inputs: HashMap<i32, VecDeque<i32>>,
    outputs: HashMap<i32, Vec<i32>>,
}

impl BufferedStreams {
    /// Build a host from stream definitions: input streams become
    /// queues, output and image streams become collection slots.
    pub fn from_streams(streams: &[Stream]) -> Self {
        let mut host = Self::default();
        for stream in streams {
            let column = stream.column as i32;
            match stream.kind {
                StreamKind::Input => {
                    host.inputs
                        .insert(column, stream.values.iter().copied().collect());
                }
                StreamKind::Output | StreamKind::Image => {
                    host.outputs.insert(column, Vec::new());
                }
            }
        }
        host
    }

    /// Append a value to an input column's queue.
    pub fn push_input(&mut self, column: i32, value: i32) {
        self.inputs.entry(column).or_default().push_back(value);
    }

    /// Values collected for an output column so far.
    pub fn outputs(&self, column: i32) -> &[i32] {
        self.outputs.get(&column).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Input values still pending for a column.
    pub fn remaining_inputs(&self, column: i32) -> usize {
        self.inputs.get(&column).map_or(0, VecDeque::len)
    }
}

impl StreamHost for BufferedStreams {
    fn has_input(&self, node: &Node) -> bool {
        self.inputs
            .get(&node.x())
            .is_some_and(|queue| !queue.is_empty())
    }

    fn read_input(&mut self, node: &Node) -> Option<i32> {
        self.inputs.get_mut(&node.x())?.pop_front()
    }

    fn add_output(&mut self, node: &Node, value: i32) {
        self.outputs.entry(node.x()).or_default().push(value);
    }
}

impl StreamHost for Rc<RefCell<BufferedStreams>> {
    fn has_input(&self, node: &Node) -> bool {
        self.borrow().has_input(node)
    }

    fn read_input(&mut self, node: &Node) -> Option<i32> {
        self.borrow_mut().read_input(node)
    }

    fn add_output(&mut self, node: &Node, value: i32) {
        self.borrow_mut().add_output(node, value);
    }
}
