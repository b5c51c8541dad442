use hashbrown::{ HashMap, HashSet };
use itertools::Itertools;
use log::trace;

use crate::{ NodeId, GraphNode, NodeIterator, Graph, Relation, GraphError };

/// Adjacency sets for the conjunctive arcs, an arena of committed machine sequences for the disjunctive ones.
///
/// An operation belongs to a single machine, so it has at most one disjunctive successor and
/// predecessor. Replacing a machine order only touches the entries of that machine.
#[derive(Clone, Debug)]
pub struct LinkedGraph<T: NodeId + Clone> {
    nodes: Vec<T>,
    successors: Vec<HashSet<usize>>,
    predecessors: Vec<HashSet<usize>>,
    sequences: HashMap<u32, Vec<usize>>,
    machine_successor: Vec<Option<usize>>,
    machine_predecessor: Vec<Option<usize>>
}

impl<T: NodeId + GraphNode + Clone> LinkedGraph<T> {

    fn link(&mut self, order: &[usize]) {
        for pair in order.windows(2) {
            self.machine_successor[pair[0]] = Some(pair[1]);
            self.machine_predecessor[pair[1]] = Some(pair[0]);
        }
    }

    fn unlink(&mut self, order: &[usize]) {
        for node in order {
            self.machine_successor[*node] = None;
            self.machine_predecessor[*node] = None;
        }
    }

    /// Machines that currently have a committed order.
    pub fn sequenced_machines(&self) -> Vec<u32> {
        self.sequences.keys().cloned().sorted().collect()
    }
}

impl<T: NodeId + GraphNode + Clone> Graph for LinkedGraph<T> {
    type Node = T;

    fn create(nodes: Vec<T>, edges: Vec<Vec<Relation>>) -> Self {

        let successors = edges.iter()
            .map(|x| x.iter().filter_map(|x| {
                    match x {
                        Relation::Successor(e) => Some(*e),
                        _ => None
                    }
            }).collect::<HashSet<_>>());

        let predecessors = edges.iter()
            .map(|x| x.iter().filter_map(|x| {
                    match x {
                        Relation::Predecessor(e) => Some(*e),
                        _ => None
                    }
            }).collect::<HashSet<_>>());

        let n = nodes.len();
        LinkedGraph {
            nodes,
            successors: successors.collect(),
            predecessors: predecessors.collect(),
            sequences: HashMap::new(),
            machine_successor: vec!(None; n),
            machine_predecessor: vec!(None; n)
        }
    }

    fn nodes(&self) -> &[T] {
        &self.nodes
    }

    fn source(&self) -> &T {
        &self.nodes[0]
    }

    fn sink(&self) -> &T {
        &self.nodes[self.nodes.len() - 1]
    }

    fn successors(&self, id: &impl NodeId) -> NodeIterator<'_, Self> {
        let id = id.id();
        NodeIterator(Box::new(self.successors[id].iter()
            .chain(self.machine_successor[id].iter())
            .map(move |x| &self.nodes[*x])))
    }

    fn predecessors(&self, id: &impl NodeId) -> NodeIterator<'_, Self> {
        let id = id.id();
        NodeIterator(Box::new(self.predecessors[id].iter()
            .chain(self.machine_predecessor[id].iter())
            .map(move |x| &self.nodes[*x])))
    }

    fn commit_sequence(&mut self, machine: u32, order: &[usize]) -> Result<(), GraphError> {
        let expected = self.nodes.iter()
            .filter(|x| x.machine_id() == Some(machine))
            .map(|x| x.id())
            .collect::<HashSet<_>>();

        if expected.is_empty() {
            return Err(GraphError::UnknownMachine(machine));
        }

        let matches = order.len() == expected.len()
            && order.iter().all_unique()
            && order.iter().all(|x| expected.contains(x));
        if !matches {
            return Err(GraphError::SequenceMismatch { machine });
        }

        let previous = self.clear_sequence(machine);
        self.link(order);
        self.sequences.insert(machine, order.to_vec());

        if self.is_cyclic() {
            self.clear_sequence(machine);
            if let Some(previous) = previous {
                self.link(&previous);
                self.sequences.insert(machine, previous);
            }
            return Err(GraphError::Cyclic { machine });
        }

        trace!("machine {} sequenced as {:?}", machine, order);
        Ok(())
    }

    fn clear_sequence(&mut self, machine: u32) -> Option<Vec<usize>> {
        let order = self.sequences.remove(&machine)?;
        self.unlink(&order);
        trace!("machine {} cleared", machine);
        Some(order)
    }

    fn sequence(&self, machine: u32) -> Option<&[usize]> {
        self.sequences.get(&machine).map(|x| x.as_slice())
    }
}

impl<T: NodeId + Clone> std::ops::Index<usize> for LinkedGraph<T> {
    type Output = T;

   fn index(&self, node: usize) -> &Self::Output {
       &self.nodes[node]
   }
}
