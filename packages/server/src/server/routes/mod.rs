pub mod documents;
pub mod jobs;
pub mod ops;
pub mod stream;
