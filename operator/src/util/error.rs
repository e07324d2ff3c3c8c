#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Kubernetes reported error: {source}")]
    KubeError {
        #[from]
        source: kube::Error,
    },

    #[error("Invalid user input: {0}")]
    UserInputError(String),

    #[error("Failed to parse DateTime: {source}")]
    ChronoError {
        #[from]
        source: chrono::ParseError,
    },

    #[error("Out of range: {source}")]
    OutOfRangeError {
        #[from]
        source: chrono::OutOfRangeError,
    },

    #[error("Json error: {source}")]
    JsonError {
        #[from]
        source: serde_json::Error,
    },

    #[error("Parse duration: {source}")]
    ParseDurationError {
        #[from]
        source: parse_duration::parse::Error,
    },

    #[error("Invalid resource quantity: {source}")]
    QuantityError {
        #[from]
        source: ome_types::QuantityParseError,
    },

    /// Resources requested by a `ClusterCapacityReservation` exceed what the
    /// cluster can presently offer. Terminal for the spec revision that
    /// produced it; never retried (spec.md §7, "ResourcesInsufficient").
    #[error("Insufficient cluster capacity: {0}")]
    AdmissionError(String),

    /// A required subtree is missing from the operator's configuration
    /// document. Fatal at startup (spec.md §6, "Configuration").
    #[error("Invalid configuration: {0}")]
    ConfigError(String),
}
