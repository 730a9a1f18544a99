//! File formats: the JSON interchange document and CSV/JSON exports.

pub mod export;
pub mod interchange;
