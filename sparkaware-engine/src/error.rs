use thiserror::Error;

/// Errors surfaced by the session store.
#[derive(Error, Debug, PartialEq)]
pub enum StoreError {
    #[error("timed out waiting for the session lock")]
    Contended,
}

/// Errors surfaced while building a [SparkplugAware](crate::SparkplugAware) instance.
#[derive(Error, Debug, PartialEq)]
pub enum BuildError {
    #[error("a staleness timeout is required configuration")]
    MissingStalenessTimeout,
    #[error("the staleness timeout must be greater than zero")]
    ZeroStalenessTimeout,
}
