use thiserror::Error;

/// Outcomes of a query that are not a successful location.
///
/// `InputParse` and `OutOfCoverage` are expected and map to client-facing
/// responses; everything else means the dataset or the numeric procedure is
/// broken and must be logged.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid input: {0}")]
    InputParse(String),

    #[error("point ({lon}, {lat}) is outside the covered territory")]
    OutOfCoverage { lon: f64, lat: f64 },

    #[error("data integrity violation: {0}")]
    DataIntegrity(String),

    #[error("radius fine-tuning did not converge after {iterations} iterations (radius {radius}, population {population})")]
    Convergence { iterations: usize, radius: f64, population: u64 },

    #[error("target population {target} is unreachable (reached {reached})")]
    UnreachableTarget { target: u64, reached: u64 },

    #[error("storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl Error {
    pub(crate) fn out_of_coverage(point: geo::Point<f64>) -> Self {
        Self::OutOfCoverage { lon: point.x(), lat: point.y() }
    }

    /// True for outcomes the caller is expected to handle (bad input, point
    /// outside the territory). False for broken data or numeric failure.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::InputParse(_) | Self::OutOfCoverage { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_kinds() {
        assert!(Error::InputParse("x".into()).is_recoverable());
        assert!(Error::out_of_coverage(geo::Point::new(1.0, 2.0)).is_recoverable());
        assert!(!Error::DataIntegrity("dup".into()).is_recoverable());
        assert!(!Error::Convergence { iterations: 1, radius: 0.1, population: 3 }.is_recoverable());
        assert!(!Error::UnreachableTarget { target: 10, reached: 2 }.is_recoverable());
        assert!(!Error::Storage(anyhow::anyhow!("gone")).is_recoverable());
    }

    #[test]
    fn storage_errors_keep_context_chain() {
        let err: Error = anyhow::anyhow!("inner").context("outer").into();
        assert_eq!(err.to_string(), "storage error: outer: inner");
    }
}
