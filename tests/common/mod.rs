//! Shared fixtures for the integration tests.
//!
//! `FakeBackend` replays a script of replies and records each call, so a
//! test can assert which stages ran and what they were sent.

#![allow(dead_code)]

use async_trait::async_trait;
use essay_corrector::{
    ChatBackend, Corrector, CorrectorConfig, InvocationOptions, ModelMessage, ModelReply,
    ProviderErrorKind, StageError,
};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::collections::{HashMap, VecDeque};
use std::io::Cursor;
use std::sync::{Arc, Mutex};

pub struct FakeBackend {
    script: Mutex<VecDeque<Result<ModelReply, StageError>>>,
    last: Mutex<Option<Result<ModelReply, StageError>>>,
    pub calls: Mutex<Vec<(Vec<ModelMessage>, InvocationOptions)>>,
}

impl FakeBackend {
    /// Replays `script` in order, then keeps repeating its last entry.
    pub fn new(script: Vec<Result<ModelReply, StageError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn replying(text: &str) -> Arc<Self> {
        Self::new(vec![Ok(ModelReply::text(text))])
    }

    pub fn failing(err: StageError) -> Arc<Self> {
        Self::new(vec![Err(err)])
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn call(&self, i: usize) -> (Vec<ModelMessage>, InvocationOptions) {
        self.calls.lock().unwrap()[i].clone()
    }
}

#[async_trait]
impl ChatBackend for FakeBackend {
    fn name(&self) -> &str {
        "fake"
    }

    async fn chat(
        &self,
        messages: &[ModelMessage],
        options: &InvocationOptions,
    ) -> Result<ModelReply, StageError> {
        self.calls
            .lock()
            .unwrap()
            .push((messages.to_vec(), *options));
        let next = self.script.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        match next {
            Some(reply) => {
                *last = Some(reply.clone());
                reply
            }
            None => last
                .clone()
                .unwrap_or_else(|| Ok(ModelReply::text("default reply"))),
        }
    }
}

pub fn transport_error() -> StageError {
    StageError::Provider {
        kind: ProviderErrorKind::Transport,
        detail: "connection reset by peer".into(),
    }
}

/// Config with fast retries so failure paths finish quickly.
pub fn fast_config() -> CorrectorConfig {
    CorrectorConfig::builder()
        .max_retries(1)
        .retry_backoff_ms(1)
        .build()
        .unwrap()
}

/// A corrector whose only transcription profile is `openai`.
pub fn corrector_with(
    config: CorrectorConfig,
    transcriber: Arc<FakeBackend>,
    correction: Arc<FakeBackend>,
) -> Corrector {
    let mut map: HashMap<String, Arc<dyn ChatBackend>> = HashMap::new();
    map.insert("openai".into(), transcriber);
    Corrector::with_backends(config, map, correction).unwrap()
}

pub fn png(w: u32, h: u32) -> Vec<u8> {
    encode(w, h, ImageFormat::Png)
}

pub fn jpeg(w: u32, h: u32) -> Vec<u8> {
    encode(w, h, ImageFormat::Jpeg)
}

fn encode(w: u32, h: u32, format: ImageFormat) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_fn(w, h, |x, y| {
        if (x / 8 + y / 8) % 2 == 0 {
            Rgb([245, 245, 240])
        } else {
            Rgb([30, 30, 40])
        }
    }));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), format).unwrap();
    buf
}
