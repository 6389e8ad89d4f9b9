//! The live view of one run, kept in sync with a channel message.
//!
//! Producers append segments without blocking; a single loop task renders
//! and edits the message at most once per throttle interval. Edits are
//! at-least-once and the view converges on the latest state.

use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::watch;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;
use tracing::warn;
use vibes_channel::ChannelError;
use vibes_channel::MessageChannel;
use vibes_channel::ReplyActions;
use vibes_channel::RichText;
use vibes_channel::Surface;
use vibes_channel::MAX_MESSAGE_CHARS;
use vibes_common::mutex_lock_or_recover;
use vibes_core::Segment;
use vibes_core::SegmentKind;

use crate::render;
use crate::render::View;

pub type FooterProvider = Arc<dyn Fn() -> RichText + Send + Sync>;

const DEFAULT_THROTTLE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy)]
struct RetryBudget {
    attempts: u32,
    total_wait: Duration,
}

const NORMAL_RETRY: RetryBudget = RetryBudget {
    attempts: 5,
    total_wait: Duration::from_secs(15),
};

/// Used for the final render after `stop`, which must not be lost.
const DRAIN_RETRY: RetryBudget = RetryBudget {
    attempts: 12,
    total_wait: Duration::from_secs(60),
};

/// Initial state of a [`RenderStream`].
#[derive(Clone)]
pub struct StreamOptions {
    header: RichText,
    auto_clear_header_on_first_log: bool,
    footer: Option<FooterProvider>,
    wrap_log_in_pre: bool,
    actions: Option<ReplyActions>,
    throttle: Duration,
    limit: usize,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            header: RichText::new(),
            auto_clear_header_on_first_log: false,
            footer: None,
            wrap_log_in_pre: false,
            actions: None,
            throttle: DEFAULT_THROTTLE,
            limit: MAX_MESSAGE_CHARS,
        }
    }
}

impl StreamOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(mut self, header: RichText) -> Self {
        self.header = header;
        self
    }

    /// The header is dropped as soon as the first log output arrives.
    pub fn with_transient_header(mut self, header: RichText) -> Self {
        self.header = header;
        self.auto_clear_header_on_first_log = true;
        self
    }

    pub fn with_footer(mut self, footer: FooterProvider) -> Self {
        self.footer = Some(footer);
        self
    }

    pub fn with_log_in_pre(mut self, wrap: bool) -> Self {
        self.wrap_log_in_pre = wrap;
        self
    }

    pub fn with_actions(mut self, actions: ReplyActions) -> Self {
        self.actions = Some(actions);
        self
    }

    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

struct ViewState {
    surface: Surface,
    header: RichText,
    auto_clear_header_on_first_log: bool,
    footer: Option<FooterProvider>,
    wrap_log_in_pre: bool,
    actions: Option<ReplyActions>,
    segments: Vec<Segment>,
    /// Bumped on retarget so the loop forgets what it sent to the old surface.
    generation: u64,
}

impl ViewState {
    fn clear_transient_header(&mut self) {
        if self.auto_clear_header_on_first_log {
            self.auto_clear_header_on_first_log = false;
            self.header = RichText::new();
        }
    }
}

struct Shared {
    view: Mutex<ViewState>,
    dirty: AtomicBool,
    wake: Notify,
    paused: watch::Sender<bool>,
    stopping: watch::Sender<bool>,
}

impl Shared {
    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
        self.wake.notify_one();
    }

    fn is_stopping(&self) -> bool {
        *self.stopping.borrow()
    }
}

/// Throttled, pausable live view bound to one channel message.
///
/// States: active and paused (toggled by [`pause`](Self::pause) and
/// [`resume`](Self::resume)), then stopped. Everything but
/// [`stop`](Self::stop) returns immediately.
pub struct RenderStream {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for RenderStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderStream")
            .field("surface", &self.surface())
            .field("paused", &self.is_paused())
            .field("stopping", &self.shared.is_stopping())
            .finish()
    }
}

impl RenderStream {
    /// Starts the edit loop. Must be called within a tokio runtime.
    ///
    /// The initial header is rendered right away.
    pub fn start(channel: Arc<dyn MessageChannel>, surface: Surface, options: StreamOptions) -> Self {
        let (paused, _) = watch::channel(false);
        let (stopping, _) = watch::channel(false);
        let shared = Arc::new(Shared {
            view: Mutex::new(ViewState {
                surface,
                header: options.header,
                auto_clear_header_on_first_log: options.auto_clear_header_on_first_log,
                footer: options.footer,
                wrap_log_in_pre: options.wrap_log_in_pre,
                actions: options.actions,
                segments: Vec::new(),
                generation: 0,
            }),
            dirty: AtomicBool::new(true),
            wake: Notify::new(),
            paused,
            stopping,
        });
        let edit_loop = EditLoop {
            channel,
            shared: Arc::clone(&shared),
            throttle: options.throttle,
            limit: options.limit,
            last_edit: None,
            last_sent: None,
            generation: 0,
            surface_gone: false,
        };
        let task = tokio::spawn(edit_loop.run());
        Self {
            shared,
            task: Mutex::new(Some(task)),
        }
    }

    pub fn surface(&self) -> Surface {
        mutex_lock_or_recover(&self.shared.view).surface
    }

    pub fn is_paused(&self) -> bool {
        *self.shared.paused.borrow()
    }

    pub fn set_header(&self, header: RichText) {
        {
            let mut view = mutex_lock_or_recover(&self.shared.view);
            view.header = header;
            view.auto_clear_header_on_first_log = false;
        }
        self.shared.mark_dirty();
    }

    pub fn set_footer(&self, footer: Option<FooterProvider>, wrap_log_in_pre: bool) {
        {
            let mut view = mutex_lock_or_recover(&self.shared.view);
            view.footer = footer;
            view.wrap_log_in_pre = wrap_log_in_pre;
        }
        self.shared.mark_dirty();
    }

    pub fn set_reply_actions(&self, actions: Option<ReplyActions>) {
        mutex_lock_or_recover(&self.shared.view).actions = actions;
        self.shared.mark_dirty();
    }

    /// Appends text, merging into the last text segment.
    pub fn add_text(&self, text: &str) {
        if text.is_empty() {
            return;
        }
        {
            let mut view = mutex_lock_or_recover(&self.shared.view);
            view.clear_transient_header();
            let merged = match view.segments.last_mut() {
                Some(last) if last.kind == SegmentKind::Text => {
                    last.content.push_str(text);
                    true
                }
                _ => false,
            };
            if !merged {
                view.segments.push(Segment::text(text));
            }
        }
        self.shared.mark_dirty();
    }

    /// Appends a code block on its own lines.
    pub fn add_code(&self, code: &str) {
        if code.is_empty() {
            return;
        }
        {
            let mut view = mutex_lock_or_recover(&self.shared.view);
            view.clear_transient_header();
            if !view.segments.last().is_some_and(|s| s.content.ends_with('\n')) {
                view.segments.push(Segment::text("\n"));
            }
            view.segments.push(Segment::code(code));
            view.segments.push(Segment::text("\n"));
        }
        self.shared.mark_dirty();
    }

    pub fn add_segment(&self, segment: Segment) {
        match segment.kind {
            SegmentKind::Text => self.add_text(&segment.content),
            SegmentKind::Code => self.add_code(&segment.content),
        }
    }

    /// Stops editing until [`resume`](Self::resume). Takes effect before
    /// the next render.
    pub fn pause(&self) {
        self.shared.paused.send_replace(true);
    }

    pub fn resume(&self) {
        self.shared.paused.send_replace(false);
        self.shared.mark_dirty();
    }

    /// Points the stream at another message; the next render redraws it fully.
    pub fn retarget(&self, surface: Surface) {
        {
            let mut view = mutex_lock_or_recover(&self.shared.view);
            if view.surface == surface {
                return;
            }
            view.surface = surface;
            view.generation += 1;
        }
        self.shared.mark_dirty();
    }

    /// Requests a final render and waits for the loop to finish.
    ///
    /// A paused stream exits without rendering. Calling `stop` again is a
    /// no-op.
    pub async fn stop(&self) {
        self.shared.stopping.send_replace(true);
        self.shared.mark_dirty();
        let task = mutex_lock_or_recover(&self.task).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "render loop ended abnormally");
            }
        }
    }

    pub fn is_stopped(&self) -> bool {
        mutex_lock_or_recover(&self.task).is_none()
    }
}

struct Snapshot {
    surface: Surface,
    generation: u64,
    text: String,
    actions: Option<ReplyActions>,
}

struct EditLoop {
    channel: Arc<dyn MessageChannel>,
    shared: Arc<Shared>,
    throttle: Duration,
    limit: usize,
    last_edit: Option<Instant>,
    last_sent: Option<(String, Option<ReplyActions>)>,
    generation: u64,
    surface_gone: bool,
}

impl EditLoop {
    async fn run(mut self) {
        let mut stopping = self.shared.stopping.subscribe();
        let mut paused = self.shared.paused.subscribe();
        loop {
            self.wait_dirty().await;

            if !self.shared.is_stopping() {
                if let Some(last) = self.last_edit {
                    let ready_at = last + self.throttle;
                    tokio::select! {
                        _ = tokio::time::sleep_until(ready_at) => {}
                        _ = stopping.wait_for(|s| *s) => {}
                    }
                }
            }

            if *self.shared.paused.borrow() {
                let stopped = tokio::select! {
                    r = stopping.wait_for(|s| *s) => r.is_ok(),
                    _ = paused.wait_for(|p| !*p) => false,
                };
                if stopped {
                    debug!("render loop stopped while paused");
                    return;
                }
            }

            let snapshot = self.snapshot();
            self.edit(snapshot).await;
            self.last_edit = Some(Instant::now());

            if self.shared.is_stopping() && !self.shared.dirty.load(Ordering::Acquire) {
                return;
            }
        }
    }

    async fn wait_dirty(&self) {
        loop {
            let notified = self.shared.wake.notified();
            if self.shared.dirty.swap(false, Ordering::AcqRel) {
                return;
            }
            notified.await;
        }
    }

    fn snapshot(&self) -> Snapshot {
        let (surface, generation, header, footer, wrap_log_in_pre, actions, segments) = {
            let view = mutex_lock_or_recover(&self.shared.view);
            (
                view.surface,
                view.generation,
                view.header.clone(),
                view.footer.clone(),
                view.wrap_log_in_pre,
                view.actions.clone(),
                view.segments.clone(),
            )
        };
        let footer = footer.map(|provider| provider()).unwrap_or_default();
        let text = render::render(
            &View {
                header: &header,
                footer: &footer,
                segments: &segments,
                wrap_log_in_pre,
            },
            self.limit,
        );
        Snapshot {
            surface,
            generation,
            text,
            actions,
        }
    }

    async fn edit(&mut self, snapshot: Snapshot) {
        if snapshot.generation != self.generation {
            self.generation = snapshot.generation;
            self.last_sent = None;
            self.surface_gone = false;
        }
        if self.surface_gone {
            return;
        }
        let sent = (snapshot.text, snapshot.actions);
        if self.last_sent.as_ref() == Some(&sent) {
            return;
        }

        let draining = self.shared.is_stopping();
        let budget = if draining { DRAIN_RETRY } else { NORMAL_RETRY };
        let mut stopping = self.shared.stopping.subscribe();
        let started = Instant::now();
        let mut attempts = 0;
        let mut delay = Duration::ZERO;
        loop {
            attempts += 1;
            let result = self
                .channel
                .edit_message_text(snapshot.surface, &sent.0, sent.1.as_ref())
                .await;
            match result {
                Ok(()) | Err(ChannelError::NotModified) => {
                    self.last_sent = Some(sent);
                    return;
                }
                Err(ChannelError::RateLimited { retry_after }) => {
                    delay = if delay.is_zero() {
                        retry_after
                    } else {
                        retry_after.max(delay * 2)
                    };
                    let remaining = budget.total_wait.saturating_sub(started.elapsed());
                    if attempts >= budget.attempts || remaining.is_zero() {
                        debug!(surface = %snapshot.surface, attempts, "edit retry budget exhausted");
                        if !self.shared.is_stopping() {
                            self.shared.mark_dirty();
                        }
                        return;
                    }
                    let backoff = tokio::time::sleep(delay.min(remaining));
                    if draining {
                        backoff.await;
                    } else {
                        // stop() has marked the stream dirty; the loop retries under the drain budget.
                        tokio::select! {
                            _ = backoff => {}
                            _ = stopping.wait_for(|s| *s) => {
                                debug!(surface = %snapshot.surface, "edit backoff interrupted by stop");
                                return;
                            }
                        }
                    }
                }
                Err(e) if e.is_permanent() => {
                    warn!(surface = %snapshot.surface, error = %e, "surface is gone; no further edits");
                    self.surface_gone = true;
                    self.last_sent = Some(sent);
                    return;
                }
                Err(e) => {
                    warn!(surface = %snapshot.surface, error = %e, "edit failed");
                    return;
                }
            }
        }
    }
}
