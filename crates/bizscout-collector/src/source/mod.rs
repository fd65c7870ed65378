//! Candidate sources.
//!
//! A [`SourceProvider`] exposes a growing, ordered list of candidates. The
//! orchestrator asks for everything at or after its cursor, consumes a batch,
//! moves the cursor, and asks the source to `advance` when nothing is left.

pub mod listing;
pub mod places;
pub mod search;

use async_trait::async_trait;
use bizscout_core::{CollectedRecord, SourceKind};

use crate::error::{DriverError, SourceError};

pub use listing::{
    ActivationMethod, DetailView, DirectoryConfig, HttpDirectoryDriver, ListingDriver, ListingSource,
    LocateOutcome,
};
pub use places::{PlacesApiSource, PlacesConfig};
pub use search::{build_search_query, SearchConfig, WebSearchSource};

/// One structural result entry captured from a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle {
    /// Position in the source's result list.
    pub index: usize,
    /// Outer HTML of the entry.
    pub html: String,
    /// Rendered text of the entry, one visual line per `\n`.
    pub text: String,
}

/// What a candidate carries.
#[derive(Debug, Clone)]
pub enum CandidatePayload {
    /// A listing entry whose detail view must be opened.
    Element(ElementHandle),
    /// A site discovered on a search-results page.
    Url(String),
    /// A record already assembled by a structured API.
    Prepared {
        record: Box<CollectedRecord>,
        image_url: Option<String>,
    },
}

/// One unprocessed unit of work.
#[derive(Debug, Clone)]
pub struct RawCandidate {
    /// Position in the unfiltered candidate ordering. Diagnostic only.
    pub sequence_index: usize,
    pub payload: CandidatePayload,
}

impl RawCandidate {
    /// Short label for logs.
    #[must_use]
    pub fn describe(&self) -> String {
        match &self.payload {
            CandidatePayload::Element(el) => {
                format!("entry {} ({})", el.index, listing::element_label(el))
            }
            CandidatePayload::Url(url) => url.clone(),
            CandidatePayload::Prepared { record, .. } => record.name.clone(),
        }
    }
}

/// Position of a run within a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PageState {
    /// Number of times the source has been advanced.
    pub page: u32,
    /// Sequence index of the first unconsumed candidate.
    pub cursor: usize,
}

/// A paged supply of candidates.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Loads the first page of results.
    ///
    /// # Errors
    ///
    /// [`SourceError::NoResults`] when the source answered but has nothing for
    /// the query, [`SourceError::Unreachable`] when results could not be
    /// located at all.
    async fn initialize(&self) -> Result<PageState, SourceError>;

    /// Every loaded candidate at or after `state.cursor`, in source order.
    ///
    /// # Errors
    ///
    /// Propagates transport or driver failures.
    async fn list_window(&self, state: &PageState) -> Result<Vec<RawCandidate>, SourceError>;

    /// Loads more results. `Ok(None)` means the source is exhausted.
    ///
    /// # Errors
    ///
    /// Propagates transport or driver failures.
    async fn advance(&self, state: &PageState) -> Result<Option<PageState>, SourceError>;

    /// Loads the detail view behind a listing entry.
    ///
    /// # Errors
    ///
    /// Sources without detail views always fail with [`DriverError::Automation`].
    async fn open_detail(
        &self,
        element: &ElementHandle,
        method: ActivationMethod,
    ) -> Result<DetailView, DriverError> {
        let _ = method;
        Err(DriverError::Automation(format!(
            "{} source has no detail view for entry {}",
            self.kind(),
            element.index
        )))
    }

    /// Markup of the page currently shown, for troubleshooting snapshots.
    async fn page_source(&self) -> Option<String> {
        None
    }
}
