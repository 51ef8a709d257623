pub mod capture;
pub mod pcm;
pub mod playback;

use thiserror::Error;

/// Mid-run stream conditions. Everything except `Disconnected` is
/// recoverable: the loop logs it and picks up again on the next cycle.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("capture overrun")]
    Overrun,
    #[error("playback underrun")]
    Underrun,
    #[error("short transfer, moved {got} of {want} frames")]
    Short { got: usize, want: usize },
    #[error("stream disconnected")]
    Disconnected,
}
