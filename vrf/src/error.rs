use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VrfError {
    #[error("signer address cannot carry a verification key: {0}")]
    UnknownSigner(String),

    #[error("malformed proof: expected {expected} bytes, got {actual}")]
    MalformedProof { expected: usize, actual: usize },

    #[error("invalid proof")]
    InvalidProof,
}
