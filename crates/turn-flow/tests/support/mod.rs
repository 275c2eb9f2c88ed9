#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chatturn_core_types::{
    FocusAck, KeyAck, PageProbe, PageSnapshot, ProbeError, SendReadiness, StopAck, SubmitAck,
    TranscriptMessage,
};

pub const CHAT_URL: &str = "https://chatgpt.com/c/0123456789abcdef0123";
pub const OTHER_URL: &str = "https://chatgpt.com/c/fedcba9876543210fedc";

/// Snapshot builder. Signatures are `u{n}|{len}` / `a{n}|{len}` so a re-rendered turn
/// with different text always gets a different signature.
#[derive(Clone, Debug)]
pub struct Snap(PageSnapshot);

impl Snap {
    pub fn empty() -> Self {
        Snap(PageSnapshot {
            url: CHAT_URL.to_string(),
            ..PageSnapshot::default()
        })
    }

    pub fn answered(prompt: &str, reply: &str) -> Self {
        Self::empty().user(1, prompt).assistant(1, reply)
    }

    pub fn user(mut self, n: u32, text: &str) -> Self {
        self.0.user_turn_count = n;
        self.0.last_user_text = text.to_string();
        self.0.last_user_signature = format!("u{n}|{}", text.len());
        self.0.assistant_after_last_user = false;
        self
    }

    pub fn assistant(mut self, n: u32, text: &str) -> Self {
        self.0.assistant_turn_count = n;
        self.0.last_assistant_text = text.to_string();
        self.0.last_assistant_signature = format!("a{n}|{}", text.len());
        self.0.assistant_after_last_user = true;
        self
    }

    pub fn before_anchor(mut self) -> Self {
        self.0.assistant_after_last_user = false;
        self
    }

    pub fn generating(mut self) -> Self {
        self.0.generation_indicator_visible = true;
        self
    }

    pub fn at(mut self, url: &str) -> Self {
        self.0.url = url.to_string();
        self
    }

    pub fn build(self) -> PageSnapshot {
        self.0
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Counters {
    pub reads: u32,
    pub submits: u32,
    pub key_presses: u32,
    pub focus: u32,
    pub stop_clicks: u32,
    pub navigations: u32,
    pub reloads: u32,
    pub bring_to_front: u32,
}

struct Inner {
    current: PageSnapshot,
    /// Frames served by successive `read_state` calls; the last one served persists.
    timeline: VecDeque<PageSnapshot>,
    on_submit: VecDeque<Vec<PageSnapshot>>,
    on_key: VecDeque<Vec<PageSnapshot>>,
    on_reload: Option<PageSnapshot>,
    composer_present: bool,
    submit_accepted: bool,
    stop_clears_indicator: bool,
    navigation_sticks: bool,
    loaded: bool,
    /// `reads` at the moment the last scripted frame was served.
    drained_at: Option<u32>,
    transcript: Vec<TranscriptMessage>,
    counters: Counters,
}

/// Scripted conversation page.
pub struct FakePage {
    inner: Mutex<Inner>,
}

impl FakePage {
    pub fn new(current: Snap) -> Self {
        Self {
            inner: Mutex::new(Inner {
                current: current.build(),
                timeline: VecDeque::new(),
                on_submit: VecDeque::new(),
                on_key: VecDeque::new(),
                on_reload: None,
                composer_present: true,
                submit_accepted: true,
                stop_clears_indicator: false,
                navigation_sticks: true,
                loaded: true,
                drained_at: None,
                transcript: Vec::new(),
                counters: Counters::default(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    /// Frames served by the next reads, independent of any submit.
    pub fn with_frames(self, frames: Vec<Snap>) -> Self {
        self.lock().timeline = frames.into_iter().map(Snap::build).collect();
        self
    }

    /// Frames the page shows after the next submit.
    pub fn on_submit(self, frames: Vec<Snap>) -> Self {
        self.lock()
            .on_submit
            .push_back(frames.into_iter().map(Snap::build).collect());
        self
    }

    pub fn on_key(self, frames: Vec<Snap>) -> Self {
        self.lock()
            .on_key
            .push_back(frames.into_iter().map(Snap::build).collect());
        self
    }

    /// What the page shows once reloaded. Without this a reload changes nothing.
    pub fn on_reload(self, snapshot: Snap) -> Self {
        self.lock().on_reload = Some(snapshot.build());
        self
    }

    pub fn without_composer(self) -> Self {
        self.lock().composer_present = false;
        self
    }

    pub fn rejecting_submits(self) -> Self {
        self.lock().submit_accepted = false;
        self
    }

    pub fn stop_clears_indicator(self) -> Self {
        self.lock().stop_clears_indicator = true;
        self
    }

    pub fn ignoring_navigation(self) -> Self {
        self.lock().navigation_sticks = false;
        self
    }

    /// `document.readyState` never reaches "complete".
    pub fn never_loading(self) -> Self {
        self.lock().loaded = false;
        self
    }

    pub fn with_transcript(self, messages: Vec<TranscriptMessage>) -> Self {
        self.lock().transcript = messages;
        self
    }

    pub fn counters(&self) -> Counters {
        self.lock().counters.clone()
    }

    /// Reads served after the last scripted frame, that frame's own read excluded.
    pub fn reads_after_last_frame(&self) -> Option<u32> {
        let inner = self.lock();
        inner.drained_at.map(|at| inner.counters.reads - at)
    }

    pub fn current(&self) -> PageSnapshot {
        self.lock().current.clone()
    }
}

#[async_trait]
impl PageProbe for FakePage {
    async fn read_state(&self) -> Result<PageSnapshot, ProbeError> {
        let mut inner = self.lock();
        inner.counters.reads += 1;
        if let Some(next) = inner.timeline.pop_front() {
            inner.current = next;
            if inner.timeline.is_empty() {
                inner.drained_at = Some(inner.counters.reads);
            }
        }
        Ok(inner.current.clone())
    }

    async fn send_readiness(&self) -> Result<SendReadiness, ProbeError> {
        let inner = self.lock();
        let generating = inner.current.generation_indicator_visible;
        Ok(SendReadiness {
            has_composer: inner.composer_present,
            has_submit_control: !generating,
            indicator_visible: generating,
        })
    }

    async fn submit_prompt(&self, _text: &str) -> Result<SubmitAck, ProbeError> {
        let mut inner = self.lock();
        inner.counters.submits += 1;
        if !inner.submit_accepted {
            return Ok(SubmitAck {
                accepted: false,
                method: None,
                error: Some("send button disabled".into()),
            });
        }
        if let Some(frames) = inner.on_submit.pop_front() {
            inner.timeline = frames.into();
            inner.drained_at = None;
        }
        Ok(SubmitAck {
            accepted: true,
            method: Some("click".into()),
            error: None,
        })
    }

    async fn press_submit_key(&self) -> Result<KeyAck, ProbeError> {
        let mut inner = self.lock();
        inner.counters.key_presses += 1;
        if let Some(frames) = inner.on_key.pop_front() {
            inner.timeline = frames.into();
            inner.drained_at = None;
        }
        Ok(KeyAck {
            accepted: true,
            error: None,
        })
    }

    async fn focus_composer(&self) -> Result<FocusAck, ProbeError> {
        let mut inner = self.lock();
        inner.counters.focus += 1;
        Ok(FocusAck {
            ok: inner.composer_present,
        })
    }

    async fn click_stop_control(&self) -> Result<StopAck, ProbeError> {
        let mut inner = self.lock();
        inner.counters.stop_clicks += 1;
        let visible = inner.current.generation_indicator_visible;
        if visible && inner.stop_clears_indicator {
            inner.current.generation_indicator_visible = false;
        }
        Ok(StopAck {
            had_control: visible,
            clicked: visible,
            ok: true,
        })
    }

    async fn is_composer_present(&self) -> Result<bool, ProbeError> {
        Ok(self.lock().composer_present)
    }

    async fn ready_state(&self) -> Result<String, ProbeError> {
        let state = if self.lock().loaded { "complete" } else { "loading" };
        Ok(state.into())
    }

    async fn navigate(&self, url: &str) -> Result<(), ProbeError> {
        let mut inner = self.lock();
        inner.counters.navigations += 1;
        if inner.navigation_sticks {
            inner.current.url = url.to_string();
            for frame in inner.timeline.iter_mut() {
                frame.url = url.to_string();
            }
        }
        Ok(())
    }

    async fn bring_to_front(&self) -> Result<(), ProbeError> {
        self.lock().counters.bring_to_front += 1;
        Ok(())
    }

    async fn reload(&self) -> Result<(), ProbeError> {
        let mut inner = self.lock();
        inner.counters.reloads += 1;
        if let Some(snapshot) = inner.on_reload.take() {
            inner.current = snapshot;
            inner.timeline.clear();
        }
        Ok(())
    }

    async fn read_transcript(&self, limit: usize) -> Result<Vec<TranscriptMessage>, ProbeError> {
        let inner = self.lock();
        let skip = inner.transcript.len().saturating_sub(limit);
        Ok(inner.transcript[skip..].to_vec())
    }
}
