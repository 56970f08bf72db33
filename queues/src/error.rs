use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("transaction {tx} is not at the head of its {queue} queue")]
    NotAtHead { tx: String, queue: &'static str },

    #[error("transaction {0} is not queued for this recipient")]
    NotQueued(String),

    #[error("transaction {0} was already enqueued")]
    AlreadyQueued(String),
}
