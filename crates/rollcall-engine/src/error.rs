use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("frame source: {0}")]
    Source(#[from] rollcall_hw::SourceError),
    #[error("camera: {0}")]
    Camera(#[from] rollcall_hw::CameraError),
    #[error("detector: {0}")]
    Detector(#[from] rollcall_core::DetectorError),
    #[error("recognizer: {0}")]
    Recognizer(#[from] rollcall_core::RecognizerError),
    #[error("store: {0}")]
    Store(#[from] rollcall_store::StoreError),
    #[error("no face detected in any captured frame")]
    NoFaceDetected,
    #[error("more than one face in view ({frames} frames rejected); make sure only one person faces the camera")]
    MultipleFaces { frames: usize },
    #[error("no registered faces; register students before taking attendance")]
    EmptyGallery,
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{0} thread panicked")]
    ThreadPanicked(&'static str),
}
