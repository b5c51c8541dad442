mod linked_graph;

use std::collections::VecDeque;

use thiserror::Error;

pub use linked_graph::LinkedGraph;


#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Committing a sequence on machine {machine} would create a cycle")]
    Cyclic { machine: u32 },

    #[error("Sequence for machine {machine} does not match its operations")]
    SequenceMismatch { machine: u32 },

    #[error("Machine {0} has no operations in the graph")]
    UnknownMachine(u32),
}

pub trait NodeId {
    fn id(&self) -> usize;
}

impl NodeId for usize {
    fn id(&self) -> usize {
        *self
    }
}

pub trait GraphNode: NodeId {
    fn create(id: usize, weight: u32, machine_id: Option<u32>, job_id: Option<usize>) -> Self;
    fn weight(&self) -> u32;
    fn job_id(&self) -> Option<usize>;
    fn machine_id(&self) -> Option<u32>;
}

/// Fixed arcs handed to [`Graph::create`], listed per node.
#[derive(Clone, Debug, PartialEq)]
pub enum Relation {
    Successor(usize), Predecessor(usize)
}

const TOPOLOGY_PROCESSED: u8 = 1;
const TOPOLOGY_IN_STACK: u8 = 2;
enum Status { Visited(usize), Unvisited(usize) }

/// Depth first walk from the sink over predecessors, yielding every node after all of its predecessors.
pub struct TopologyIterator<'a, G: Graph> {
    graph: &'a G,
    node_state: Vec<u8>, // processed, in_stack as bitflags
    stack: VecDeque<Status>
}

impl<'a, G: Graph> Iterator for TopologyIterator<'a, G> {
    type Item = &'a G::Node;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let current_node = self.stack.pop_back()?;

            match current_node {
                // Expand the node: it comes back once all its predecessors are processed
                Status::Unvisited(current_node) => {
                    if self.node_state[current_node] == 0 {
                        let predecessors = self.graph.predecessors(&current_node)
                            .filter(|x| self.node_state[x.id()] == 0)
                            .map(|x| x.id())
                            .collect::<Vec<_>>();

                        self.stack.reserve(predecessors.len() + 1);
                        self.stack.push_back(Status::Visited(current_node));
                        self.stack.extend(predecessors.into_iter().map(Status::Unvisited));
                        self.node_state[current_node] |= TOPOLOGY_IN_STACK;
                    }
                },
                Status::Visited(current_node) => {
                    if (self.node_state[current_node] & TOPOLOGY_PROCESSED) == 0 {
                        self.node_state[current_node] = TOPOLOGY_PROCESSED;
                        return Some(&self.graph[current_node]);
                    }
                }
            }
        }
    }
}

pub struct NodeIterator<'a, G: Graph>(Box<dyn Iterator<Item = &'a G::Node> + 'a>);

impl<'a, G: Graph> Iterator for NodeIterator<'a, G> {
    type Item = &'a G::Node;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next()
    }
}

/// A disjunctive graph: node 0 is the source, the last node is the sink.
///
/// Conjunctive arcs are fixed at creation. Disjunctive arcs only exist as committed machine
/// sequences, each one a chain over all operations of that machine. The weight of every arc is
/// the weight of its tail node, so longest paths equal operation start times.
pub trait Graph where Self: Sized + std::ops::Index<usize, Output = <Self as Graph>::Node> {
    type Node: NodeId + GraphNode;
    fn create(nodes: Vec<Self::Node>, edges: Vec<Vec<Relation>>) -> Self;
    fn nodes(&self) -> &[Self::Node];
    fn source(&self) -> &Self::Node;
    fn sink(&self) -> &Self::Node;
    /// Conjunctive successors followed by the committed machine successor, if any.
    fn successors(&self, id: &impl NodeId) -> NodeIterator<'_, Self>;
    fn predecessors(&self, id: &impl NodeId) -> NodeIterator<'_, Self>;

    /// Replaces the committed order of `machine` with `order`.
    ///
    /// `order` has to contain every node of the machine exactly once. On error the previous
    /// order of the machine is left in place.
    fn commit_sequence(&mut self, machine: u32, order: &[usize]) -> Result<(), GraphError>;

    /// Removes the committed order of `machine`, returning it.
    fn clear_sequence(&mut self, machine: u32) -> Option<Vec<usize>>;

    fn sequence(&self, machine: u32) -> Option<&[usize]>;

    /// Graph contains relation: node_1 -> node_2
    fn has_precedence(&self, node_1: &impl NodeId, node_2: &impl NodeId) -> bool {
        self.successors(node_1).any(|x| x.id() == node_2.id())
    }

    fn machine_nodes(&self, machine: u32) -> Vec<&Self::Node> {
        self.nodes().iter()
            .filter(|node| node.machine_id() == Some(machine))
            .collect()
    }

    /// Retrieves topology ordering in the graph, starting at the source, ending at the sink.
    fn topology(&self) -> TopologyIterator<'_, Self> {

        let mut stack = VecDeque::with_capacity(self.nodes().len());
        stack.push_back(Status::Unvisited(self.sink().id()));

        TopologyIterator {
            graph: self,
            node_state: vec!(0u8; self.nodes().len()),
            stack
        }
    }

    /// Longest path from the source to every node, the earliest start time of the node.
    fn heads(&self) -> Vec<u32> {
        let mut heads = vec!(0u32; self.nodes().len());

        for node in self.topology() {
            heads[node.id()] = self.predecessors(node)
                .map(|x| heads[x.id()] + x.weight())
                .max().unwrap_or(0);
        }

        heads
    }

    /// Longest path from every node to the sink, the weight of the node included.
    fn tails(&self) -> Vec<u32> {
        let mut tails = vec!(0u32; self.nodes().len());
        let topology = self.topology().map(|x| x.id()).collect::<Vec<_>>();

        for node in topology.into_iter().rev() {
            let weight = self[node].weight();
            tails[node] = self.successors(&node)
                .map(|x| weight + tails[x.id()])
                .max().unwrap_or(0);
        }

        tails
    }

    /// Length of the longest path from the source to the sink, the makespan.
    fn critical_length(&self) -> u32 {
        self.heads()[self.sink().id()]
    }

    /// Length of the longest path from `from` to `to`, `None` if `to` can't be reached.
    fn longest_path(&self, from: &impl NodeId, to: &impl NodeId) -> Option<u32> {
        let mut distance: Vec<Option<u32>> = vec!(None; self.nodes().len());
        distance[from.id()] = Some(0);

        for node in self.topology() {
            if let Some(current) = distance[node.id()] {
                let reach = current + node.weight();
                for successor in self.successors(node) {
                    let entry = &mut distance[successor.id()];
                    *entry = Some(entry.map_or(reach, |x| x.max(reach)));
                }
            }
        }

        distance[to.id()]
    }

    /// Only nodes that reach the sink are considered, which is all of them for a job shop.
    fn is_cyclic(&self) -> bool {
        let mut processed = vec!(0usize; self.nodes().len());

        for (counter, node) in self.topology().enumerate() {
            processed[node.id()] = counter + 1;
        }

        // In a topologic order every successor is processed after its predecessor.
        self.nodes().iter()
            .filter(|node| processed[node.id()] != 0)
            .any(|node| {
                let position = processed[node.id()];
                self.successors(node)
                    .any(|x| processed[x.id()] != 0 && processed[x.id()] <= position)
            })
    }
}
