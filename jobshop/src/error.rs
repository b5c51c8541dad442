use disjunctgraph::GraphError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum JobShopError {
    #[error("Could not read problem: {0}")]
    Io(#[from] std::io::Error),

    #[error("Line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("Malformed instance: {0}")]
    MalformedInstance(String),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Search on machine {machine} ended without a complete sequence")]
    SearchExhausted { machine: u32 },

    #[error("Search on machine {machine} expanded more than {budget} nodes")]
    NodeBudgetExceeded { machine: u32, budget: usize },
}

pub type Result<T> = std::result::Result<T, JobShopError>;
