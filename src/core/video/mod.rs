pub mod config;
pub mod error;
pub mod event;
pub mod frame;
pub mod interaction_detector;
pub mod persist;
pub mod sampler;
pub mod scene_detector;
pub mod session;
pub mod similarity;
pub mod source;
pub mod state_machine;
pub mod timestamp;

pub use config::DetectionConfig;
pub use error::DetectionError;
pub use event::{DetectionReport, InteractionEvent, Region, SceneChangeEvent};
pub use frame::{Frame, PixelFormat};
pub use interaction_detector::{InteractionDetector, InteractionSettings};
pub use persist::{FramePersister, JpegDirectoryPersister};
pub use sampler::FrameSampler;
pub use scene_detector::SceneChangeDetector;
pub use session::DetectionSession;
pub use similarity::{SimilarityScorer, SsimScorer};
pub use source::{FrameSource, ImageSequenceSource, InMemorySource};
pub use state_machine::{DetectorState, StateAction};
pub use timestamp::{format_hms, TimestampConverter};
