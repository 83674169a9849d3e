//! Per-channel bounded line history with fading and stacking.
//!
//! Each channel owns a [`HudBuffer`]: a FIFO of at most `capacity` lines.
//! A line whose text repeats one of the newest `stack_depth` entries stacks
//! onto that entry, which moves to the newest position with its repeat
//! counter bumped.
//! Lines fade by age but are only ever removed by capacity eviction or an
//! explicit reset.
//!
//! The [`HudHandle`] wraps the whole [`Hud`] in a read-write lock so the
//! message path can insert while a render path reads windows at its own pace.

pub mod fade;

use crate::core::router::ChannelId;
use crate::ui::span::StyledText;
use std::collections::{vec_deque, HashMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;
use tracing::debug;

pub use fade::{fade_opacity, Easing, FadeSettings};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HudLine {
    pub text: StyledText,
    pub inserted_at: Instant,
    /// At least 1; bumped each time the same text arrives again.
    pub stack_count: u32,
    /// Text compared when stacking, taken before formatting so decorations
    /// such as timestamps do not split repeats.
    pub stack_key: String,
    pub channel: ChannelId,
}

impl HudLine {
    pub fn opacity(&self, now: Instant, fade: &FadeSettings) -> f32 {
        fade_opacity(self.inserted_at, now, fade)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HudSettings {
    pub capacity: usize,
    pub viewport_lines: usize,
    /// How many of the newest entries a repeat may stack onto; 0 disables.
    pub stack_depth: usize,
    pub fade: FadeSettings,
}

impl Default for HudSettings {
    fn default() -> Self {
        Self {
            capacity: 200,
            viewport_lines: 13,
            stack_depth: 1,
            fade: FadeSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Appended { evicted: bool },
    Stacked { count: u32 },
}

/// One channel's history. The scroll offset counts lines up from the newest
/// entry; 0 keeps the newest line at the bottom of the window.
#[derive(Debug, Clone)]
pub struct HudBuffer {
    channel: ChannelId,
    lines: VecDeque<HudLine>,
    scroll_offset: usize,
    capacity: usize,
    viewport_lines: usize,
    stack_depth: usize,
}

impl HudBuffer {
    pub fn new(channel: ChannelId, settings: &HudSettings) -> Self {
        let capacity = settings.capacity.max(1);
        Self {
            channel,
            lines: VecDeque::with_capacity(capacity),
            scroll_offset: 0,
            capacity,
            viewport_lines: settings.viewport_lines.max(1),
            stack_depth: settings.stack_depth,
        }
    }

    pub fn channel(&self) -> &ChannelId {
        &self.channel
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn lines(&self) -> vec_deque::Iter<'_, HudLine> {
        self.lines.iter()
    }

    pub fn newest(&self) -> Option<&HudLine> {
        self.lines.back()
    }

    pub fn scroll_offset(&self) -> usize {
        self.scroll_offset
    }

    /// Add a line, keyed by its own plain text.
    pub fn insert(&mut self, text: StyledText, now: Instant) -> InsertOutcome {
        let key = text.plain().to_string();
        self.insert_keyed(text, &key, now)
    }

    /// Add a line, stacking it onto one of the newest `stack_depth` entries
    /// with the same `key`. A stacked entry moves to the newest position.
    ///
    /// `now` is raised to the newest entry's timestamp if the clock went
    /// backwards, so timestamps never decrease along the buffer.
    pub fn insert_keyed(&mut self, text: StyledText, key: &str, now: Instant) -> InsertOutcome {
        let now = match self.lines.back() {
            Some(last) if last.inserted_at > now => last.inserted_at,
            _ => now,
        };

        let repeat = self
            .lines
            .iter()
            .rev()
            .take(self.stack_depth)
            .position(|line| line.stack_key == key);
        if let Some(from_newest) = repeat {
            let index = self.lines.len() - 1 - from_newest;
            if let Some(mut line) = self.lines.remove(index) {
                line.stack_count = line.stack_count.saturating_add(1);
                line.inserted_at = now;
                line.text = text;
                let count = line.stack_count;
                self.lines.push_back(line);
                return InsertOutcome::Stacked { count };
            }
        }

        self.lines.push_back(HudLine {
            text,
            inserted_at: now,
            stack_count: 1,
            stack_key: key.to_string(),
            channel: self.channel.clone(),
        });
        let evicted = self.lines.len() > self.capacity;
        if evicted {
            self.lines.pop_front();
        }
        if self.scroll_offset > 0 {
            self.scroll_offset = (self.scroll_offset + 1).min(self.max_offset(self.viewport_lines));
        }
        InsertOutcome::Appended { evicted }
    }

    /// The lines shown at `scroll_offset`, oldest first.
    ///
    /// The offset is clamped to `[0, len - viewport_lines]`.
    pub fn visible_window(
        &self,
        scroll_offset: usize,
        viewport_lines: usize,
    ) -> vec_deque::Iter<'_, HudLine> {
        let offset = scroll_offset.min(self.max_offset(viewport_lines));
        let end = self.lines.len() - offset;
        let start = end.saturating_sub(viewport_lines);
        self.lines.range(start..end)
    }

    /// The window at the buffer's own scroll position and viewport size.
    pub fn visible(&self) -> vec_deque::Iter<'_, HudLine> {
        self.visible_window(self.scroll_offset, self.viewport_lines)
    }

    /// Move the view; positive `delta` scrolls towards older lines.
    pub fn scroll(&mut self, delta: isize) -> usize {
        let max = self.max_offset(self.viewport_lines);
        self.scroll_offset = self.scroll_offset.saturating_add_signed(delta).min(max);
        self.scroll_offset
    }

    pub fn scroll_to_newest(&mut self) {
        self.scroll_offset = 0;
    }

    /// Drop every line and the scroll position.
    pub fn reset(&mut self) {
        self.lines.clear();
        self.scroll_offset = 0;
    }

    /// Apply new settings, evicting the oldest lines if capacity shrank.
    pub fn set_settings(&mut self, settings: &HudSettings) {
        self.capacity = settings.capacity.max(1);
        self.viewport_lines = settings.viewport_lines.max(1);
        self.stack_depth = settings.stack_depth;
        while self.lines.len() > self.capacity {
            self.lines.pop_front();
        }
        self.scroll_offset = self.scroll_offset.min(self.max_offset(self.viewport_lines));
    }

    fn max_offset(&self, viewport_lines: usize) -> usize {
        self.lines.len().saturating_sub(viewport_lines)
    }
}

/// A visible line prepared for drawing.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedLine {
    pub text: StyledText,
    pub opacity: f32,
    pub stack_count: u32,
}

/// Buffers for every channel that has received a line.
#[derive(Debug, Clone, Default)]
pub struct Hud {
    buffers: HashMap<ChannelId, HudBuffer>,
    settings: HudSettings,
}

impl Hud {
    pub fn new(settings: HudSettings) -> Self {
        Self {
            buffers: HashMap::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &HudSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: HudSettings) {
        self.settings = settings;
        for buffer in self.buffers.values_mut() {
            buffer.set_settings(&settings);
        }
    }

    pub fn insert(
        &mut self,
        channel: &ChannelId,
        text: StyledText,
        now: Instant,
    ) -> InsertOutcome {
        let key = text.plain().to_string();
        self.insert_keyed(channel, text, &key, now)
    }

    /// Insert with an explicit stacking key, e.g. the text before formatting.
    pub fn insert_keyed(
        &mut self,
        channel: &ChannelId,
        text: StyledText,
        key: &str,
        now: Instant,
    ) -> InsertOutcome {
        let settings = self.settings;
        self.buffers
            .entry(channel.clone())
            .or_insert_with(|| HudBuffer::new(channel.clone(), &settings))
            .insert_keyed(text, key, now)
    }

    pub fn buffer(&self, channel: &ChannelId) -> Option<&HudBuffer> {
        self.buffers.get(channel)
    }

    pub fn fade_opacity(&self, line: &HudLine, now: Instant) -> f32 {
        line.opacity(now, &self.settings.fade)
    }

    /// The visible window of `channel` with each line's opacity at `now`.
    pub fn render(&self, channel: &ChannelId, now: Instant) -> Vec<RenderedLine> {
        let Some(buffer) = self.buffers.get(channel) else {
            return Vec::new();
        };
        buffer
            .visible()
            .map(|line| RenderedLine {
                text: line.text.clone(),
                opacity: self.fade_opacity(line, now),
                stack_count: line.stack_count,
            })
            .collect()
    }

    pub fn scroll(&mut self, channel: &ChannelId, delta: isize) -> usize {
        self.buffers
            .get_mut(channel)
            .map_or(0, |buffer| buffer.scroll(delta))
    }

    pub fn reset(&mut self, channel: &ChannelId) {
        if let Some(buffer) = self.buffers.get_mut(channel) {
            buffer.reset();
        }
    }

    pub fn reset_all(&mut self) {
        for buffer in self.buffers.values_mut() {
            buffer.reset();
        }
    }

    /// Forget buffers of channels that no longer exist.
    pub fn retain_channels(&mut self, live: &[ChannelId]) {
        let before = self.buffers.len();
        self.buffers.retain(|id, _| live.contains(id));
        let dropped = before - self.buffers.len();
        if dropped > 0 {
            debug!(dropped, "dropped buffers of removed tabs");
        }
    }
}

/// Shared, cloneable access to the [`Hud`].
///
/// Writers hold the lock only for one insert; readers never observe a
/// partially inserted line.
#[derive(Debug, Clone, Default)]
pub struct HudHandle {
    inner: Arc<RwLock<Hud>>,
}

impl HudHandle {
    pub fn new(hud: Hud) -> Self {
        Self {
            inner: Arc::new(RwLock::new(hud)),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Hud> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Hud> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn render(&self, channel: &ChannelId, now: Instant) -> Vec<RenderedLine> {
        self.read().render(channel, now)
    }

    pub fn scroll(&self, channel: &ChannelId, delta: isize) -> usize {
        self.write().scroll(channel, delta)
    }
}
