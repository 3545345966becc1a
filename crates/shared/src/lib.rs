pub mod domain;
pub mod error;
pub mod ordering;
pub mod protocol;
