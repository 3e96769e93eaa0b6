//! Status codes for navigation queries

/// Status enum for navigation mesh and crowd operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Operation was successful
    Success,
    /// Operation failed due to an unknown reason
    Failure,
    /// Provided parameter was invalid
    InvalidParam,
    /// The search node pool was exhausted
    OutOfNodes,
    /// Pathfinding failed; no valid path found
    PathInvalid,
    /// Output buffer could not hold the whole result
    BufferTooSmall,
    /// Sliced query still has work to do
    InProgress,
    /// Value does not exist or is not found
    NotFound,
    /// Operation partially succeeded
    PartialResult,
}

impl Status {
    /// Checks if the status is a failure
    pub fn is_failure(&self) -> bool {
        !self.is_success() && *self != Status::InProgress
    }

    /// Checks if the status is a success
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            Status::Success | Status::PartialResult | Status::BufferTooSmall | Status::OutOfNodes
        )
    }

    /// Checks if a sliced query is still running
    pub fn is_in_progress(&self) -> bool {
        *self == Status::InProgress
    }

    /// Converts status to a result
    pub fn to_result<T>(self, value: T) -> std::result::Result<T, Status> {
        if self.is_success() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Success => write!(f, "Success"),
            Status::Failure => write!(f, "Failure"),
            Status::InvalidParam => write!(f, "Invalid parameter"),
            Status::OutOfNodes => write!(f, "Out of search nodes"),
            Status::PathInvalid => write!(f, "Invalid path"),
            Status::BufferTooSmall => write!(f, "Buffer too small"),
            Status::InProgress => write!(f, "Operation in progress"),
            Status::NotFound => write!(f, "Value not found"),
            Status::PartialResult => write!(f, "Partial result"),
        }
    }
}

impl std::error::Error for Status {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(Status::Success.is_success());
        assert!(Status::PartialResult.is_success());
        assert!(!Status::InProgress.is_success());
        assert!(!Status::InProgress.is_failure());
        assert!(Status::NotFound.is_failure());
        assert_eq!(Status::Failure.to_result(1), Err(Status::Failure));
        assert_eq!(Status::Success.to_result(1), Ok(1));
    }
}
