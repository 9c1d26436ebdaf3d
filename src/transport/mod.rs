//! 流式传输：帧编码与事件流 → 帧流

pub mod frame;
pub mod sse;

pub use frame::{now_rfc3339, Frame};
pub use sse::{into_frames, sse_lines, FrameStream};
