//! Error types for the alignment pipeline.
//!
//! Errors fall into two groups. Configuration and I/O errors are fatal: the
//! run cannot produce trustworthy output and must stop. Everything else is
//! scoped to a single event or track and the pipeline logs it and moves on.
//! [`Error::is_fatal`] encodes that split.

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Problems with the run configuration or its consistency with the geometry.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// Alignment mode string / code not recognised.
    #[error("unknown alignment mode '{0}' (expected 'shift-only' or 'shift+rotation')")]
    UnknownAlignMode(String),

    /// Run header and geometry disagree on the number of planes.
    #[error("plane count mismatch: run header reports {header} detectors, geometry has {geometry} planes")]
    PlaneCountMismatch {
        /// Detector count from the run header
        header: usize,
        /// Plane count from the geometry description
        geometry: usize,
    },

    /// Fewer than two planes cannot define a straight line.
    #[error("invalid plane count {0}: at least 2 planes are required")]
    InvalidPlaneCount(usize),

    /// A resolution used as a fit weight or record sigma is not positive.
    #[error("resolution must be positive and finite, got {0}")]
    InvalidResolution(f64),

    /// A per-plane array holds fewer entries than there are planes.
    #[error("'{name}' has {found} entries but {expected} planes are configured")]
    PerPlaneLength {
        /// Configuration key
        name: &'static str,
        /// Required number of entries
        expected: usize,
        /// Number of entries present
        found: usize,
    },

    /// Excluded plane index (1-based) points past the last plane.
    #[error("exclude_plane {index} is out of range for {n_planes} planes")]
    ExcludePlaneOutOfRange {
        /// Configured 1-based index
        index: usize,
        /// Number of planes
        n_planes: usize,
    },

    /// A distribution width of the simulation is negative or not finite.
    #[error("'{name}' must be a finite non-negative width, got {value}")]
    InvalidWidth {
        /// Configuration key
        name: &'static str,
        /// Offending value
        value: f64,
    },

    /// Correlation histograms need bins and a non-empty range.
    #[error("correlation histograms need at least one bin and a positive range, got {n_bins} bins over +-{half_range}")]
    InvalidCorrelationBinning {
        /// Bins per axis
        n_bins: usize,
        /// Half range in micrometres
        half_range: f64,
    },

    /// The candidate cap must admit at least one candidate.
    #[error("max_track_candidates must be at least 1")]
    ZeroCandidateCap,

    /// A sensor ID appears twice in the layout table.
    #[error("sensor id {0} is listed more than once in the layout")]
    DuplicateSensor(i32),
}

/// Pipeline error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid or inconsistent run configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An expected input collection is absent from an event
    #[error("no '{collection}' collection in event {event} of run {run}")]
    MissingCollection {
        /// Name of the collection that was requested
        collection: &'static str,
        /// Event number
        event: u64,
        /// Run number
        run: u32,
    },

    /// A pre-fit track does not carry one fitted hit per plane
    #[error("track {track} dropped: {reason}")]
    MalformedTrack {
        /// Index of the track within its event
        track: usize,
        /// What was wrong with it
        reason: String,
    },

    /// All fitted planes share one z position (or carry no weight)
    #[error("degenerate {axis} fit: planes used in the fit are collinear in z")]
    DegenerateFit {
        /// Axis being fitted
        axis: &'static str,
    },

    /// I/O error on the record sink or an input file
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Malformed CSV input
    #[error(transparent)]
    Csv(#[from] csv::Error),

    /// Malformed TOML configuration
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Whether this error must terminate the run.
    ///
    /// Recoverable errors only ever affect the event or track that raised them.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::Config(_) | Error::Io(_) | Error::Csv(_) | Error::Toml(_) => true,
            Error::MissingCollection { .. }
            | Error::MalformedTrack { .. }
            | Error::DegenerateFit { .. } => false,
        }
    }
}
