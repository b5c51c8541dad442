/// Settings of the shifting bottleneck procedure.
#[derive(Debug, Clone)]
pub struct SolverConfig {
    /// Maximum number of search nodes one single machine subproblem may expand.
    /// `None` searches until the subproblem is solved exactly. Running out of
    /// budget is reported as an error, a partial sequence is never returned.
    pub node_budget: Option<usize>,
    /// Solve the subproblems of the unsequenced machines on the rayon thread pool.
    pub parallel: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            node_budget: None,
            parallel: true,
        }
    }
}
