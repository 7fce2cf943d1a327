//! In-memory live feed transport.
//!
//! Each `connect` consumes the next scripted outcome; an empty script refuses.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use btc_m2_sync::error::WsError;
use btc_m2_sync::ws::{FeedConnection, FeedConnector};
use tokio::sync::mpsc;
use tokio::time::Instant;

pub type FrameTx = mpsc::UnboundedSender<Result<String, WsError>>;
pub type FrameRx = mpsc::UnboundedReceiver<Result<String, WsError>>;

enum Script {
    Refuse,
    Accept(FrameRx),
}

#[derive(Default)]
pub struct FakeConnector {
    script: Mutex<VecDeque<Script>>,
    connects: Mutex<Vec<Instant>>,
    closes: Arc<AtomicUsize>,
}

impl FakeConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn refuse(&self) {
        self.script.lock().unwrap().push_back(Script::Refuse);
    }

    /// Queue an accepted connection and return its frame sender.
    pub fn accept(&self) -> FrameTx {
        let (tx, rx) = mpsc::unbounded_channel();
        self.script.lock().unwrap().push_back(Script::Accept(rx));
        tx
    }

    pub fn connect_count(&self) -> usize {
        self.connects.lock().unwrap().len()
    }

    pub fn connect_gaps_ms(&self) -> Vec<u128> {
        let times = self.connects.lock().unwrap();
        times
            .windows(2)
            .map(|w| (w[1] - w[0]).as_millis())
            .collect()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedConnector for FakeConnector {
    async fn connect(&self, _url: &str) -> Result<Box<dyn FeedConnection>, WsError> {
        self.connects.lock().unwrap().push(Instant::now());
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Script::Accept(rx)) => Ok(Box::new(FakeConnection {
                rx,
                closes: Arc::clone(&self.closes),
            })),
            Some(Script::Refuse) | None => Err(WsError::ConnectionFailed("refused".into())),
        }
    }
}

struct FakeConnection {
    rx: FrameRx,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl FeedConnection for FakeConnection {
    async fn next_frame(&mut self) -> Option<Result<String, WsError>> {
        self.rx.recv().await
    }

    async fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// A 24h ticker frame as the exchange sends it.
pub fn ticker(price: f64) -> String {
    format!(
        r#"{{"e":"24hrTicker","E":1700000000000,"s":"BTCUSDT","c":"{price}","P":"2.50","v":"1234.5"}}"#
    )
}
