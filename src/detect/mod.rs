mod backend;
mod backends;
mod result;

pub use backend::{normalize_class, DetectRequest, Detector};
pub use backends::ScriptedDetector;
pub use result::{BoundingBox, Detection};
