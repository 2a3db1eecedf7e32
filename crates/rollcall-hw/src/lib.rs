//! rollcall-hw — camera capture and frame sources.
//!
//! Provides V4L2 capture for live sessions and an image-file source for
//! registering from photos or replaying recorded frames.

pub mod camera;
pub mod frame;
pub mod source;

pub use camera::{Camera, CameraError, DeviceInfo, PixelFormat};
pub use frame::Frame;
pub use source::{FrameSource, ImageSource, SourceError};
