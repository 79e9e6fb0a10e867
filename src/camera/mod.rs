#[cfg(feature = "desktop")]
pub mod capture;

#[cfg(feature = "desktop")]
pub use capture::OpenCvCamera;

/// Anything the pipeline can take a pixel size from
pub trait FrameImage {
    /// (width, height) in pixels
    fn dimensions(&self) -> (u32, u32);
}

/// Pull-style frame source owned by the frame producer.
///
/// Opening the device happens in the implementor's constructor and is fatal
/// there; `read_frame` errors are treated as transient and retried.
pub trait Sensor: Send {
    type Image: FrameImage + Send;

    fn read_frame(&mut self) -> anyhow::Result<Self::Image>;

    /// Give the device back. The producer calls this exactly once, after its
    /// last buffer access.
    fn release(&mut self);
}
