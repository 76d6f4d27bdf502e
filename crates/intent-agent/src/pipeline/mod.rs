//! Resolution stages that consult the oracle

pub mod extraction;
pub mod selection;

pub use extraction::{extract_arguments, EXTRACTION_SYSTEM_PROMPT};
pub use selection::{normalize_answer, select_operation, selection_prompt};
