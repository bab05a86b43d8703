use thiserror::Error;

/// Network failure or non-2xx response for a single GET.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
}

/// A structural element the page layout promises is missing, or a field
/// could not be converted.
#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("missing element `{0}`")]
    MissingElement(&'static str),
    #[error("missing attribute `{attr}` on `{element}`")]
    MissingAttribute {
        element: &'static str,
        attr: &'static str,
    },
    #[error("invalid price {0:?}")]
    InvalidPrice(String),
    #[error("cannot resolve link {href:?}: {reason}")]
    InvalidUrl { href: String, reason: String },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("book {title:?} references unknown category id {category_id}")]
    Integrity { title: String, category_id: i64 },
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

/// Which half of the run an error surfaced in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Categories,
    Books,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Categories => f.write_str("categories"),
            Phase::Books => f.write_str("books"),
        }
    }
}

/// Terminal failure of an ingestion run, tagged with the phase and the
/// page being processed.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{phase} phase: cannot fetch {url}")]
    Fetch {
        phase: Phase,
        url: String,
        #[source]
        source: FetchError,
    },
    #[error("{phase} phase: cannot parse {url}")]
    Parse {
        phase: Phase,
        url: String,
        #[source]
        source: ParseError,
    },
    #[error("{phase} phase: store error while processing {url}")]
    Store {
        phase: Phase,
        url: String,
        #[source]
        source: StoreError,
    },
}

impl PipelineError {
    pub fn phase(&self) -> Phase {
        match self {
            PipelineError::Fetch { phase, .. }
            | PipelineError::Parse { phase, .. }
            | PipelineError::Store { phase, .. } => *phase,
        }
    }

    /// Short name of the underlying error kind, for the terminal report.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Fetch { .. } => "FetchError",
            PipelineError::Parse { .. } => "ParseError",
            PipelineError::Store {
                source: StoreError::Integrity { .. },
                ..
            } => "IntegrityError",
            PipelineError::Store { .. } => "StoreError",
        }
    }
}
