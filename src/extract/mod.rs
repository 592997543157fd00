pub mod deterministic;
pub mod excerpt;
pub mod registry;
pub mod text;
pub mod validator;

use thiserror::Error;

use crate::crawler::task::PageKind;

pub use excerpt::relevant_html;
pub use registry::{PageStrategy, Registry};

/// Why a deterministic parse could not produce a payload.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The page lacks something the parser depends on before selectors
    /// even run, such as an entity ID in the URL.
    #[error("page marker missing: {0}")]
    MissingMarker(String),

    /// A selector that anchors the parse matched nothing. Usually means
    /// the site layout changed.
    #[error("selector matched nothing: {0}")]
    SelectorMiss(String),

    /// No deterministic parser exists for this page kind.
    #[error("no deterministic parser for {0}")]
    Unsupported(PageKind),
}
