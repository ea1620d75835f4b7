//! Domain models for IDMaker.
//!
//! This module contains the core domain types: generation modes, segment
//! ranges and API contracts.

pub mod dto;
pub mod mode;
pub mod segment;

pub use dto::{ApiResponse, IdResponse, MakeIdRequest};
pub use mode::IdMode;
pub use segment::{SegmentRange, SegmentState};
