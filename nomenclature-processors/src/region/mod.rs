//! Region processing: selection and renaming of model native regions, aggregation to
//! common regions and reconciliation with data reported at the common-region level.

pub mod compare;
pub mod mapping;
pub mod policy;
pub mod processor;
pub mod repository;

pub use compare::{compare, DifferenceReport, DifferenceRow, Tolerance};
pub use mapping::{CommonRegion, NativeRegion, RegionMapping};
pub use policy::{AggregationTask, VariableAggregationPolicy};
pub use processor::RegionProcessor;
pub use repository::MappingRepository;
