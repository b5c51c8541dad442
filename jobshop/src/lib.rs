pub mod config;
pub mod error;
pub mod problem;
pub mod schedule;
pub mod shifting_bottleneck;
pub mod single_machine;

#[cfg(test)]
mod tests;
