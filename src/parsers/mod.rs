pub mod document;
pub mod number;
pub mod scorecard;
pub mod scorecard_index;
pub mod session;
