pub mod config;
pub mod git;
pub mod locks;
pub mod pointer;
pub mod progress;
pub mod push;
pub mod report;
pub mod scan;
pub mod session;
pub mod store;

#[cfg(test)]
mod tests;
#[cfg(test)]
mod testutil;
