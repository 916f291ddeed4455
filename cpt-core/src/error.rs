use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("alphabet needs at least 2 symbols, got {0}")]
    AlphabetTooSmall(usize),

    #[error("symbol '{0}' appears more than once in the alphabet")]
    DuplicateSymbol(String),

    #[error("symbol '{symbol}' is not a member of the alphabet")]
    UnknownSymbol { symbol: String },
}
