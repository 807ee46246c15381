// folio-common: shared types and wire protocol for the Folio workspace

pub mod protocol;
pub mod types;
