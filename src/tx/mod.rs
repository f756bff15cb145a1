pub mod commit_strategy;
pub mod synchronization;

pub use commit_strategy::{BatchCommitStrategy, CommitStrategy, DefaultCommitStrategy};
pub use synchronization::SessionTransactionSynchronization;
