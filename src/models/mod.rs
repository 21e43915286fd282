pub mod identity;
pub mod job;
pub mod region;

pub use identity::{CookieMap, Identity, IdentitySource};
pub use job::{Job, JobMetadata, JobMode, JobOutcome, JobResult, JobStatus, PipelineEvent};
pub use region::{Bounds, BoundingPoly, RawGeometry, TextRegion, Vertex};
