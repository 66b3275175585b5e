pub mod data_validator;
pub mod meta_validator;
pub mod region;
pub mod required_data;

pub use data_validator::DataValidator;
pub use meta_validator::MetaValidator;
pub use region::RegionProcessor;
pub use required_data::RequiredDataValidator;
