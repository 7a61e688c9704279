//! Renderables whose content is prepared on a background thread.
//!
//! The render thread calls `draw` every frame. A dedicated worker queries
//! content for the newest view it was handed, then swaps the result into the
//! render list under the monitor, so `draw` only ever waits for short
//! critical sections.
//!
//! The worker keeps running while its thread id matches the owner recorded
//! by `draw`; `release` clears the owner, wakes the worker and joins it.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use runtime::metrics::Metrics;
use scene::view_state::ViewState;
use tracing::{debug, trace, warn};

use crate::config::EngineConfig;
use crate::drawable::{DrawContext, Drawable, ResolutionState, Resolvable, fold_child_states};
use crate::frame::RenderFrame;
use crate::refresh::RefreshRequester;

static NEXT_WORKER: AtomicU64 = AtomicU64::new(1);

/// Content provider driven by an [`AsyncRenderable`].
///
/// `query` runs on the worker without any lock held and writes into a
/// `Pending` payload owned by the worker. `update_render_lists` runs under
/// the monitor and moves that payload into the list the render thread draws.
pub trait AsyncSource: Send + Sync + 'static {
    type Pending: Send + 'static;
    type Renderable: Drawable + 'static;

    fn create_pending(&self) -> Self::Pending;

    /// Clears `pending` after each update attempt.
    fn reset_pending(&self, pending: &mut Self::Pending);

    fn release_pending(&self, _pending: Self::Pending) {}

    /// Prepares content for `view`. Long queries should poll
    /// `abort.should_abort()` and return early once it reports true.
    fn query(&self, view: &ViewState, pending: &mut Self::Pending, abort: &QueryAbort);

    /// Moves the query result into `render_list`, pushing displaced items
    /// onto `release_list` for the render thread to release. Returning false
    /// keeps the previously prepared state.
    fn update_render_lists(
        &self,
        pending: &mut Self::Pending,
        render_list: &mut Vec<Self::Renderable>,
        release_list: &mut Vec<Self::Renderable>,
    ) -> bool;

    /// Extra staleness beyond a draw version change.
    fn is_dirty(&self, _prepared: &ViewState, _target: &ViewState) -> bool {
        false
    }
}

#[derive(Debug, Clone, Default)]
struct Owner(Arc<Mutex<Option<ThreadId>>>);

impl Owner {
    fn set(&self, id: Option<ThreadId>) {
        *self.0.lock() = id;
    }

    fn is(&self, id: ThreadId) -> bool {
        *self.0.lock() == Some(id)
    }
}

/// Cooperative cancellation for a running query.
#[derive(Debug, Clone)]
pub struct QueryAbort {
    owner: Owner,
    me: ThreadId,
}

impl QueryAbort {
    /// A token for queries run outside any worker; it never aborts.
    pub fn detached() -> Self {
        let me = thread::current().id();
        Self {
            owner: Owner(Arc::new(Mutex::new(Some(me)))),
            me,
        }
    }

    /// True once the renderable that started this query has been released.
    pub fn should_abort(&self) -> bool {
        !self.owner.is(self.me)
    }
}

struct Monitor<R> {
    initialized: bool,
    prepared: ViewState,
    target: ViewState,
    servicing: bool,
    invalid: bool,
    suspended: bool,
    worker: Option<JoinHandle<()>>,
    render_list: Vec<R>,
    release_list: Vec<R>,
    metrics: Metrics,
}

struct Shared<S: AsyncSource> {
    source: S,
    config: EngineConfig,
    refresh: Option<Arc<dyn RefreshRequester>>,
    owner: Owner,
    monitor: Mutex<Monitor<S::Renderable>>,
    wake: Condvar,
}

impl<S: AsyncSource> Shared<S> {
    fn check_state(&self, m: &Monitor<S::Renderable>) -> bool {
        m.invalid
            || m.prepared.draw_version != m.target.draw_version
            || self.source.is_dirty(&m.prepared, &m.target)
    }

    fn is_dirty(&self, m: &Monitor<S::Renderable>) -> bool {
        !m.suspended && self.check_state(m)
    }

    fn request_refresh(&self) {
        if let Some(refresh) = &self.refresh {
            refresh.request_refresh();
        }
    }
}

trait Invalidate: Send + Sync {
    fn invalidate(&self);
}

impl<S: AsyncSource> Invalidate for Shared<S> {
    fn invalidate(&self) {
        self.monitor.lock().invalid = true;
        self.request_refresh();
    }
}

/// Marks an async renderable's content stale from any thread.
#[derive(Clone)]
pub struct Invalidator(Weak<dyn Invalidate>);

impl Invalidator {
    /// Returns false once the renderable is gone.
    pub fn invalidate(&self) -> bool {
        match self.0.upgrade() {
            Some(target) => {
                target.invalidate();
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for Invalidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invalidator")
            .field("live", &(self.0.strong_count() > 0))
            .finish()
    }
}

pub struct AsyncRenderable<S: AsyncSource> {
    shared: Arc<Shared<S>>,
}

impl<S: AsyncSource> AsyncRenderable<S> {
    pub fn new(
        source: S,
        config: &EngineConfig,
        refresh: Option<Arc<dyn RefreshRequester>>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                source,
                config: config.clone(),
                refresh,
                owner: Owner::default(),
                monitor: Mutex::new(Monitor {
                    initialized: false,
                    prepared: ViewState::default(),
                    target: ViewState::default(),
                    servicing: false,
                    invalid: false,
                    suspended: false,
                    worker: None,
                    render_list: Vec::new(),
                    release_list: Vec::new(),
                    metrics: Metrics::new(),
                }),
                wake: Condvar::new(),
            }),
        }
    }

    pub fn source(&self) -> &S {
        &self.shared.source
    }

    /// Forces a new query even if the view has not changed.
    pub fn invalidate(&self) {
        self.shared.invalidate();
    }

    pub fn invalidator(&self) -> Invalidator {
        let weak = Arc::downgrade(&self.shared);
        let weak: Weak<dyn Invalidate> = weak;
        Invalidator(weak)
    }

    /// Counters: `queries`, `updates_applied`, `updates_rejected`,
    /// `queries_aborted`, `query_panics`.
    pub fn metrics(&self) -> Metrics {
        self.shared.monitor.lock().metrics.clone()
    }

    /// Draw version of the content currently in the render list.
    pub fn prepared_version(&self) -> u64 {
        self.shared.monitor.lock().prepared.draw_version
    }

    /// Stops the worker and releases every owned renderable. The next
    /// `draw` starts over.
    pub fn release(&self) {
        let worker = {
            let mut m = self.shared.monitor.lock();
            self.shared.owner.set(None);
            self.shared.wake.notify_all();
            m.worker.take()
        };
        if let Some(handle) = worker
            && handle.join().is_err()
        {
            warn!("async renderable worker panicked");
        }

        let mut m = self.shared.monitor.lock();
        let Monitor {
            render_list,
            release_list,
            ..
        } = &mut *m;
        for mut r in render_list.drain(..).chain(release_list.drain(..)) {
            r.release();
        }
        m.prepared = ViewState::default();
        m.target = ViewState::default();
        m.servicing = false;
        m.invalid = false;
        m.initialized = false;
    }

    fn start_worker(&self, m: &mut Monitor<S::Renderable>) {
        let n = NEXT_WORKER.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}-{n}", self.shared.config.worker_name_prefix);
        let shared = self.shared.clone();
        match thread::Builder::new().name(name.clone()).spawn(move || worker_loop(shared)) {
            Ok(handle) => {
                m.prepared = ViewState::default();
                m.target = ViewState::default();
                self.shared.owner.set(Some(handle.thread().id()));
                m.worker = Some(handle);
                m.initialized = true;
                debug!(worker = %name, "async renderable worker started");
            }
            Err(err) => warn!(worker = %name, %err, "failed to start async renderable worker"),
        }
    }
}

impl<S: AsyncSource> Drawable for AsyncRenderable<S> {
    fn draw(&self, ctx: &DrawContext<'_>, frame: &mut RenderFrame) {
        let mut m = self.shared.monitor.lock();
        if !m.initialized {
            self.start_worker(&mut m);
        }
        if m.invalid || m.target.draw_version != ctx.view.draw_version {
            m.target = ctx.view.clone();
        }
        if !m.servicing && self.shared.is_dirty(&m) {
            self.shared.wake.notify_one();
        }
        for mut r in m.release_list.drain(..) {
            r.release();
        }
        for r in &m.render_list {
            r.draw(ctx, frame);
        }
    }

    fn release(&mut self) {
        AsyncRenderable::release(self);
    }

    fn as_resolvable(&self) -> Option<&dyn Resolvable> {
        Some(self)
    }
}

impl<S: AsyncSource> Resolvable for AsyncRenderable<S> {
    fn state(&self) -> ResolutionState {
        let m = self.shared.monitor.lock();
        if m.suspended {
            ResolutionState::Suspended
        } else if !m.initialized {
            ResolutionState::Unresolved
        } else if m.servicing {
            ResolutionState::Resolving
        } else if self.shared.check_state(&m) {
            ResolutionState::Unresolved
        } else {
            fold_child_states(m.render_list.iter().filter_map(|r| r.as_resolvable()))
        }
    }

    fn suspend(&self) {
        let mut m = self.shared.monitor.lock();
        for child in m.render_list.iter().filter_map(|r| r.as_resolvable()) {
            child.suspend();
        }
        m.suspended = true;
    }

    fn resume(&self) {
        let mut m = self.shared.monitor.lock();
        m.suspended = false;
        for child in m.render_list.iter().filter_map(|r| r.as_resolvable()) {
            child.resume();
        }
        self.shared.wake.notify_one();
    }
}

impl<S: AsyncSource> Drop for AsyncRenderable<S> {
    fn drop(&mut self) {
        AsyncRenderable::release(self);
    }
}

fn worker_loop<S: AsyncSource>(shared: Arc<Shared<S>>) {
    let me = thread::current().id();
    let abort = QueryAbort {
        owner: shared.owner.clone(),
        me,
    };
    let mut pending = shared.source.create_pending();
    let mut query_state: Option<ViewState> = None;
    let mut query_ok = false;
    let mut reentry_sleep = Duration::ZERO;

    loop {
        if !reentry_sleep.is_zero() {
            thread::sleep(reentry_sleep);
        }

        let view = {
            let mut m = shared.monitor.lock();
            if !shared.owner.is(me) {
                if m.servicing {
                    m.metrics.inc("queries_aborted");
                }
                break;
            }

            if m.servicing
                && let Some(state) = query_state.take()
            {
                if !query_ok {
                    // render list untouched; advancing prepared stops a
                    // failing query from spinning on the same view
                    m.prepared = state;
                } else {
                    let Monitor {
                        render_list,
                        release_list,
                        ..
                    } = &mut *m;
                    if shared.source.update_render_lists(&mut pending, render_list, release_list) {
                        trace!(version = state.draw_version, "async content updated");
                        m.prepared = state;
                        m.metrics.inc("updates_applied");
                        shared.request_refresh();
                    } else {
                        m.metrics.inc("updates_rejected");
                    }
                }
            }
            shared.source.reset_pending(&mut pending);
            m.servicing = false;

            if !shared.is_dirty(&m) {
                shared.wake.wait(&mut m);
                if shared.owner.is(me) {
                    reentry_sleep = shared.config.query_state_capture_delay();
                }
                continue;
            }

            reentry_sleep = Duration::ZERO;
            m.invalid = false;
            m.servicing = true;
            m.metrics.inc("queries");
            m.target.clone()
        };

        trace!(version = view.draw_version, "async query");
        let result = catch_unwind(AssertUnwindSafe(|| {
            shared.source.query(&view, &mut pending, &abort)
        }));
        query_ok = result.is_ok();
        if !query_ok {
            warn!(version = view.draw_version, "async query panicked; keeping previous content");
            shared.monitor.lock().metrics.inc("query_panics");
        }
        query_state = Some(view);
    }

    shared.source.release_pending(pending);
    shared.monitor.lock().servicing = false;
    debug!("async renderable worker exiting");
}

#[cfg(test)]
mod tests {
    use super::{AsyncRenderable, AsyncSource, QueryAbort};
    use crate::config::EngineConfig;
    use crate::drawable::{DrawContext, Drawable, ResolutionState, Resolvable};
    use crate::frame::{RenderCommand, RenderFrame};
    use crate::refresh::RefreshCounter;
    use foundation::math::Vec2;
    use scene::antimeridian::AntimeridianHelper;
    use scene::view_state::ViewState;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;
    use std::time::{Duration, Instant};

    #[derive(Default)]
    struct Hooks {
        block: AtomicBool,
        entered: AtomicUsize,
        updates: AtomicUsize,
        released_items: AtomicUsize,
        pending_released: AtomicBool,
        panic_on: AtomicUsize,
        reject_on: AtomicUsize,
    }

    struct Marker {
        version: u64,
        hooks: Arc<Hooks>,
    }

    impl Drawable for Marker {
        fn draw(&self, _ctx: &DrawContext<'_>, frame: &mut RenderFrame) {
            frame.push(RenderCommand::Polyline {
                points: vec![Vec2::new(self.version as f64, 0.0)],
                color: 0,
            });
        }

        fn release(&mut self) {
            self.hooks.released_items.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct EchoSource(Arc<Hooks>);

    impl AsyncSource for EchoSource {
        type Pending = Option<u64>;
        type Renderable = Marker;

        fn create_pending(&self) -> Option<u64> {
            None
        }

        fn reset_pending(&self, pending: &mut Option<u64>) {
            *pending = None;
        }

        fn release_pending(&self, _pending: Option<u64>) {
            self.0.pending_released.store(true, Ordering::SeqCst);
        }

        fn query(&self, view: &ViewState, pending: &mut Option<u64>, abort: &QueryAbort) {
            self.0.entered.fetch_add(1, Ordering::SeqCst);
            let deadline = Instant::now() + Duration::from_secs(5);
            while self.0.block.load(Ordering::SeqCst)
                && !abort.should_abort()
                && Instant::now() < deadline
            {
                thread::sleep(Duration::from_millis(1));
            }
            if abort.should_abort() {
                return;
            }
            if self.0.panic_on.load(Ordering::SeqCst) as u64 == view.draw_version {
                panic!("query failed for version {}", view.draw_version);
            }
            *pending = Some(view.draw_version);
        }

        fn update_render_lists(
            &self,
            pending: &mut Option<u64>,
            render_list: &mut Vec<Marker>,
            release_list: &mut Vec<Marker>,
        ) -> bool {
            self.0.updates.fetch_add(1, Ordering::SeqCst);
            let Some(version) = pending.take() else {
                return false;
            };
            if self.0.reject_on.load(Ordering::SeqCst) as u64 == version {
                return false;
            }
            release_list.extend(render_list.drain(..));
            render_list.push(Marker {
                version,
                hooks: self.0.clone(),
            });
            true
        }
    }

    fn renderable(hooks: &Arc<Hooks>) -> AsyncRenderable<EchoSource> {
        AsyncRenderable::new(EchoSource(hooks.clone()), &EngineConfig::default(), None)
    }

    fn view(version: u64) -> ViewState {
        ViewState {
            draw_version: version,
            ..ViewState::default()
        }
    }

    fn draw(r: &AsyncRenderable<EchoSource>, view: &ViewState) -> Vec<u64> {
        let idl = AntimeridianHelper::new();
        let ctx = DrawContext {
            view,
            antimeridian: &idl,
        };
        let mut frame = RenderFrame::new(view.draw_version);
        r.draw(&ctx, &mut frame);
        frame.polylines().map(|p| p[0].x as u64).collect()
    }

    fn wait_for(mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "timed out waiting for worker");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn resolves_to_latest_view() {
        let hooks = Arc::new(Hooks::default());
        let r = renderable(&hooks);
        assert_eq!(r.state(), ResolutionState::Unresolved);

        let v1 = view(1);
        assert!(draw(&r, &v1).is_empty());
        wait_for(|| r.state() == ResolutionState::Resolved);
        assert_eq!(draw(&r, &v1), vec![1]);
        assert_eq!(r.prepared_version(), 1);

        let v2 = view(2);
        draw(&r, &v2);
        wait_for(|| r.prepared_version() == 2);
        assert_eq!(draw(&r, &v2), vec![2]);
        // the displaced marker was released by the draw above
        assert_eq!(hooks.released_items.load(Ordering::SeqCst), 1);
        assert_eq!(r.metrics().counter("updates_applied"), 2);
    }

    #[test]
    fn release_during_query_stops_worker() {
        let hooks = Arc::new(Hooks::default());
        hooks.block.store(true, Ordering::SeqCst);
        let r = renderable(&hooks);

        draw(&r, &view(1));
        wait_for(|| hooks.entered.load(Ordering::SeqCst) == 1);
        assert_eq!(r.state(), ResolutionState::Resolving);

        let updates_before = hooks.updates.load(Ordering::SeqCst);
        r.release();
        assert!(hooks.pending_released.load(Ordering::SeqCst));
        assert_eq!(hooks.updates.load(Ordering::SeqCst), updates_before);
        assert_eq!(r.metrics().counter("queries_aborted"), 1);
        assert_eq!(r.state(), ResolutionState::Unresolved);

        // releasing twice is harmless and a later draw starts a new worker
        r.release();
        hooks.block.store(false, Ordering::SeqCst);
        hooks.pending_released.store(false, Ordering::SeqCst);
        let v2 = view(2);
        draw(&r, &v2);
        wait_for(|| r.state() == ResolutionState::Resolved);
        assert_eq!(draw(&r, &v2), vec![2]);
    }

    #[test]
    fn invalidate_requeries_same_version() {
        let hooks = Arc::new(Hooks::default());
        let refresh = Arc::new(RefreshCounter::new());
        let r = AsyncRenderable::new(
            EchoSource(hooks.clone()),
            &EngineConfig::default(),
            Some(refresh.clone()),
        );
        let v1 = view(1);
        draw(&r, &v1);
        wait_for(|| r.state() == ResolutionState::Resolved);
        assert_eq!(refresh.take(), 1);

        let invalidator = r.invalidator();
        assert!(invalidator.invalidate());
        assert_eq!(r.state(), ResolutionState::Unresolved);
        draw(&r, &v1);
        wait_for(|| r.metrics().counter("updates_applied") == 2);
        wait_for(|| r.state() == ResolutionState::Resolved);
        assert_eq!(r.metrics().counter("queries"), 2);
        // one for the invalidation, one for the update
        assert_eq!(refresh.take(), 2);

        drop(r);
        assert!(!invalidator.invalidate());
    }

    #[test]
    fn suspended_worker_does_not_requery() {
        let hooks = Arc::new(Hooks::default());
        let r = renderable(&hooks);
        draw(&r, &view(1));
        wait_for(|| r.state() == ResolutionState::Resolved);

        r.suspend();
        assert_eq!(r.state(), ResolutionState::Suspended);
        let v2 = view(2);
        assert_eq!(draw(&r, &v2), vec![1]);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(hooks.entered.load(Ordering::SeqCst), 1);

        r.resume();
        wait_for(|| r.prepared_version() == 2);
        assert_eq!(draw(&r, &v2), vec![2]);
    }

    #[test]
    fn panicking_query_keeps_previous_content() {
        let hooks = Arc::new(Hooks::default());
        hooks.panic_on.store(2, Ordering::SeqCst);
        let r = renderable(&hooks);
        draw(&r, &view(1));
        wait_for(|| r.state() == ResolutionState::Resolved);

        let v2 = view(2);
        draw(&r, &v2);
        wait_for(|| r.metrics().counter("query_panics") == 1);
        wait_for(|| r.state() == ResolutionState::Resolved);
        assert_eq!(draw(&r, &v2), vec![1]);
        assert_eq!(r.metrics().counter("updates_applied"), 1);

        // the worker survived and serves the next view
        let v3 = view(3);
        draw(&r, &v3);
        wait_for(|| r.prepared_version() == 3);
        assert_eq!(draw(&r, &v3), vec![3]);
    }

    #[test]
    fn rejected_update_keeps_previous_content() {
        let hooks = Arc::new(Hooks::default());
        hooks.reject_on.store(2, Ordering::SeqCst);
        let r = renderable(&hooks);
        draw(&r, &view(1));
        wait_for(|| r.state() == ResolutionState::Resolved);

        let v2 = view(2);
        draw(&r, &v2);
        wait_for(|| r.metrics().counter("updates_rejected") >= 1);
        assert_eq!(r.prepared_version(), 1);
        assert_eq!(draw(&r, &v2), vec![1]);
        assert_eq!(r.metrics().counter("updates_applied"), 1);
        assert_eq!(hooks.released_items.load(Ordering::SeqCst), 0);

        // a later view the source accepts replaces the stale content
        let v3 = view(3);
        draw(&r, &v3);
        wait_for(|| r.prepared_version() == 3);
        assert_eq!(draw(&r, &v3), vec![3]);
    }

    #[test]
    fn detached_abort_never_fires() {
        assert!(!QueryAbort::detached().should_abort());
    }
}
