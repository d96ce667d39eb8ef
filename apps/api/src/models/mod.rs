pub mod candidate;
pub mod document;
pub mod upload;
