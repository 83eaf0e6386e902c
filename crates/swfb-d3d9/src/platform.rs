use std::time::Duration;

/// Window-system services the presenter relies on but does not own.
pub trait Platform {
    /// Current client-area size of the output window, `None` when it cannot be queried.
    fn client_size(&self) -> Option<(u32, u32)>;

    /// Blocks until the frame-rate limiter allows the next present.
    fn limit_frame_rate(&mut self);

    /// Called instead of drawing while the device is lost and cannot be reset yet.
    fn yield_now(&mut self) {
        std::thread::sleep(Duration::from_millis(1));
    }

    /// The logical output size changed after the window was resized.
    fn output_resized(&mut self, width: u32, height: u32);
}
