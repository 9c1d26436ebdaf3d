//! 事件流 → 帧流
//!
//! 每个原始事件先增强为（可选）status + chunk；流结束补一个 done，故障转为一个 error。
//! 终止帧恰好一个，之后不再产出任何帧。

use std::collections::VecDeque;
use std::pin::Pin;

use futures_util::stream::{self, Stream, StreamExt};

use crate::react::{augment, EventStream};
use crate::transport::Frame;

pub type FrameStream = Pin<Box<dyn Stream<Item = Frame> + Send>>;

struct FrameState {
    events: EventStream,
    pending: VecDeque<Frame>,
    finished: bool,
}

pub fn into_frames(events: EventStream) -> FrameStream {
    let state = FrameState {
        events,
        pending: VecDeque::new(),
        finished: false,
    };
    Box::pin(stream::unfold(state, |mut st| async move {
        loop {
            if let Some(frame) = st.pending.pop_front() {
                return Some((frame, st));
            }
            if st.finished {
                return None;
            }
            match st.events.next().await {
                Some(Ok(event)) => st
                    .pending
                    .extend(augment(&event).into_iter().map(Frame::from_update)),
                Some(Err(e)) => {
                    st.finished = true;
                    st.pending.push_back(Frame::error(&e));
                }
                None => {
                    st.finished = true;
                    st.pending.push_back(Frame::Done);
                }
            }
        }
    }))
}

/// 帧流 → SSE 文本块
pub fn sse_lines(frames: FrameStream) -> impl Stream<Item = String> + Send {
    frames.map(|f| f.to_sse())
}
