use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("no unbanned validators in the snapshot")]
    NoValidatorsAvailable,

    #[error("only {available} eligible validators left, {requested} requested")]
    AllValidatorsConsumed { requested: usize, available: usize },

    #[error("validator {0} has no stake")]
    UnknownValidator(String),

    #[error("cannot unstake {requested} from {validator}: only {staked} staked")]
    InsufficientStake {
        validator: String,
        requested: u128,
        staked: u128,
    },
}
