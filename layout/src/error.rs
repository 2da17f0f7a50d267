use snafu::Snafu;
use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Failed to read layout config {}: {source}", path.display()))]
    ReadConfig {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Invalid layout config: {source}"))]
    InvalidConfig { source: toml::de::Error },

    #[snafu(display("A document change is in progress; layout state is not readable"))]
    ChangeInProgress,

    #[snafu(display("Unbalanced document change: {detail}"))]
    UnbalancedChange { detail: String },

    #[snafu(display("Batch {kind:?} finished without a matching start"))]
    UnbalancedBatch { kind: crate::events::BatchKind },
}

/// Report a broken cache invariant. Under `strict` this panics, aborting the
/// operation in debug and test builds; otherwise it logs and the caller resets
/// the affected cache.
pub(crate) fn invariant_violation(strict: bool, message: std::fmt::Arguments<'_>) {
    if strict {
        panic!("layout invariant violated: {message}");
    }
    tracing::warn!("layout invariant violated, resetting cache: {message}");
}
