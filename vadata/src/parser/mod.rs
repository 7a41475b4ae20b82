//! Parsers des trois formats d'échange

pub mod gmi;
pub mod kof;
pub mod sosi;
