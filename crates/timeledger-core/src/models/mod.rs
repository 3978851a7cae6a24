pub mod config;
pub mod configuration;
pub mod custom_field;
pub mod filter;
pub mod ids;
pub mod segment;
pub mod task;
pub mod timestamp;

pub use config::{Config, DaemonConfig, StoreConfig, TimingConfig};
pub use configuration::ConfigurationElement;
pub use custom_field::CustomField;
pub use filter::{DateType, Filter, FilterKind};
pub use ids::{CustomFieldId, FilterId, SegmentId, TaskId};
pub use segment::TimeSegment;
pub use task::Task;
