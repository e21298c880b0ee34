//! Asynchronous heartbeat timer for the connection engine.

use std::{
    task::{Context, Poll},
    time::Duration,
};

use futures_util::Stream;
use pin_project_lite::pin_project;
use tokio_stream::wrappers::IntervalStream;

pin_project! {
    /// A timer that ticks on the negotiated heartbeat interval, or never ticks
    /// at all if the connection negotiated heartbeat = 0.
    #[derive(Debug)]
    pub struct HeartBeat {
        #[pin]
        interval: Option<IntervalStream>,
    }
}

impl HeartBeat {
    /// A heartbeat that never fires; used when the negotiated interval is zero.
    pub fn never() -> Self {
        Self { interval: None }
    }

    /// A heartbeat firing every `period`.
    pub fn new(period: Duration) -> Self {
        Self {
            interval: Some(IntervalStream::new(tokio::time::interval(period))),
        }
    }

    /// Builds the heartbeat appropriate for a negotiated interval, per §4.2's
    /// tuning rule (`heartbeat = min(client, server-max)`); zero disables it.
    pub fn from_negotiated(seconds: u16) -> Self {
        if seconds == 0 {
            Self::never()
        } else {
            Self::new(Duration::from_secs(seconds as u64))
        }
    }
}

impl Stream for HeartBeat {
    type Item = ();

    fn poll_next(self: std::pin::Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        match this.interval.as_pin_mut() {
            Some(interval) => match interval.poll_next(cx) {
                Poll::Ready(Some(_instant)) => Poll::Ready(Some(())),
                Poll::Ready(None) => Poll::Ready(None),
                Poll::Pending => Poll::Pending,
            },
            None => Poll::Pending,
        }
    }
}
