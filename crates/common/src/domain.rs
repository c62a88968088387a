mod in_memory_reading_repository;
mod ingestion_service;
mod normalizer;
mod reading;
mod reading_writer;
mod result;

pub use in_memory_reading_repository::*;
pub use ingestion_service::*;
pub use normalizer::*;
pub use reading::*;
pub use reading_writer::*;
pub use result::*;
