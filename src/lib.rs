pub mod api;
pub mod core;

pub use crate::api::video::VideoEventDetector;
pub use crate::core::video::{
    DetectionConfig, DetectionError, DetectionReport, DetectionSession, Frame, FrameSource,
    InteractionEvent, PixelFormat, SceneChangeEvent,
};

pub fn init_logging() {
    #[cfg(target_os = "android")]
    {
        android_logger::init_once(
            android_logger::Config::default()
                .with_max_level(log::LevelFilter::Debug)
                .with_tag("scene_events_rust"),
        );
    }

    #[cfg(not(target_os = "android"))]
    {
        // RUST_LOG overrides the default filter; repeated calls are no-ops
        let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .try_init();
    }
}
