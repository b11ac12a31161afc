pub mod constants;
pub mod daylink_errors;
pub mod detections;
pub mod output;
pub mod sky;
pub mod spatial_index;
pub mod tracklets;
pub mod tracks;

pub use constants::{DegPerDay, Degree, DetectionId, MJD};
pub use daylink_errors::DaylinkError;
pub use detections::{Detection, DetectionCatalog, Observatory};
pub use output::{IdSetStore, OutputMethod};
pub use tracklets::formation::{find_tracklets, FindTrackletsConfig};
pub use tracklets::Tracklet;
pub use tracks::linking::{link_tracklets, LinkTrackletsConfig};
pub use tracks::Track;
