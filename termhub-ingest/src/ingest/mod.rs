//! Source intake: format routing, streaming, taxonomy, and mapping

pub mod fingerprint;
pub mod mapper;
pub mod router;
pub mod stream;
pub mod taxonomy;
