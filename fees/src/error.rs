use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FeeError {
    #[error("insufficient fees: needed {required}, provided {provided}")]
    InsufficientFees { required: u128, provided: u128 },

    #[error("insufficient appeal bond: needed {required}, provided {provided}")]
    InsufficientBond { required: u128, provided: u128 },

    #[error("no fee book for transaction {0}")]
    UnknownTransaction(String),

    #[error("no fee record for round {0}")]
    UnknownRound(u32),

    #[error("round {0} has the wrong parity for this operation")]
    WrongRoundParity(u32),

    #[error("fee book already settled")]
    AlreadySettled,
}
