//! Error taxonomy for tile QC processing
//!
//! Only [`CoordinateParseError`] is recoverable: a read whose identifier
//! cannot be located is simply left out of the spatial analysis. Every
//! other variant ends the processing of the file it occurred in.

use std::path::PathBuf;

/// Custom Result type for tile QC operations, wrapping the crate [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type, one per failed file pipeline
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Invalid option, raised before any file is touched
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// A selection references a tile or subtile the aggregation never saw
    #[error(transparent)]
    UnknownTile(#[from] UnknownTileError),

    /// A selection manifest could not be understood
    #[error(transparent)]
    ManifestFormat(#[from] ManifestFormatError),

    /// Reading or writing a file failed
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Opening a (possibly compressed) stream failed
    #[error("cannot open {}: {source}", .path.display())]
    Compression {
        path: PathBuf,
        #[source]
        source: niffler::Error,
    },

    /// The FASTQ parser rejected a record
    #[error("malformed FASTQ record in {}: {source}", .path.display())]
    Fastq {
        path: PathBuf,
        #[source]
        source: seq_io::fastq::Error,
    },

    /// htslib could not open, read or write an alignment file
    #[error("alignment file error on {}: {source}", .path.display())]
    Htslib {
        path: PathBuf,
        #[source]
        source: rust_htslib::errors::Error,
    },

    /// The file name does not identify a supported sequence format
    #[error("unsupported sequence file format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    /// The worker pool for a multi-file run could not be started
    #[error("cannot start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// The pipeline was stopped through its cancellation token
    #[error("processing of {} was cancelled", .0.display())]
    Cancelled(PathBuf),
}

impl Error {
    /// Attach a path to a raw I/O error
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Identifier string matches no known dialect
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinateParseError {
    /// Splitting on `:` gave a field count neither dialect uses
    #[error("identifier has {0} ':'-separated fields, expected 5 or at least 7")]
    FieldCount(usize),

    /// A positional field is not a non-negative integer
    #[error("field `{field}` is not a non-negative integer: {value:?}")]
    InvalidNumber { field: &'static str, value: String },
}

/// A selected coordinate has no counterpart in the aggregated data
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum UnknownTileError {
    /// No reads were aggregated for this tile
    #[error("tile {tile} of lane {lane} on flow cell {flow_cell:?} has no aggregated reads")]
    Tile {
        flow_cell: String,
        lane: u32,
        tile: u32,
    },

    /// The cell index lies outside the tile matrix
    #[error("subtile ({x}, {y}) of tile {tile} is outside the {matrix_size}x{matrix_size} matrix")]
    Cell {
        tile: u32,
        x: u32,
        y: u32,
        matrix_size: usize,
    },
}

/// Problems with a low-quality cluster manifest
#[derive(thiserror::Error, Debug)]
pub enum ManifestFormatError {
    /// The file is not valid JSON
    #[error("{}: invalid JSON: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The top-level value is not an array of objects
    #[error("{}: expected an array of coordinate objects", .path.display())]
    NotAnArray { path: PathBuf },

    /// An entry is not a JSON object
    #[error("{}: entry {index} is not an object", .path.display())]
    NotAnObject { path: PathBuf, index: usize },

    /// A required key is missing from an entry
    #[error("{}: entry {index} is missing key `{key}`", .path.display())]
    MissingKey {
        path: PathBuf,
        index: usize,
        key: &'static str,
    },

    /// A key holds a value of the wrong shape
    #[error("{}: entry {index} has an invalid value for key `{key}`", .path.display())]
    InvalidValue {
        path: PathBuf,
        index: usize,
        key: &'static str,
    },

    /// The entry describes a coordinate level other than the one required
    #[error("{}: entry {index} is a {found} coordinate, expected {expected}", .path.display())]
    WrongLevel {
        path: PathBuf,
        index: usize,
        expected: &'static str,
        found: &'static str,
    },
}

/// Invalid options, surfaced before processing starts
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// A numeric option must be strictly positive
    #[error("{option} must be a positive integer, got {value}")]
    NonPositive { option: &'static str, value: i64 },

    /// A quality threshold list could not be parsed
    #[error("invalid quality threshold specification {0:?}")]
    ThresholdSpec(String),

    /// A threshold range has its bounds reversed
    #[error("invalid quality threshold range {min}-{max}")]
    ThresholdRange { min: u32, max: u32 },

    /// FILE selection requires a manifest path
    #[error("selection method FILE requires a manifest path")]
    MissingManifest,

    /// The AUTO threshold has to be one of the aggregated thresholds
    #[error("selection threshold {0} is not one of the configured quality thresholds")]
    SelectionThreshold(u32),

    /// A user-picked subtile is not `FLOWCELL:LANE:TILE:X:Y`
    #[error("invalid subtile {0:?}, expected FLOWCELL:LANE:TILE:X:Y")]
    SubtileSpec(String),

    /// Unrecognised method name
    #[error("unknown {kind} method {value:?}")]
    UnknownMethod { kind: &'static str, value: String },
}
