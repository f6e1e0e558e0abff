use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::anyhow;
use flume::Receiver;
use parking_lot::{Condvar, Mutex};
use render_core::pipeline::PrefetchStrategy;
use render_core::{
    Document, ImageDimensions, NoPrefetch, PageId, PageSlot, PixelFormat, Pixmap, RedrawCause,
    RenderConfig, RenderKey, RenderSystem, Request, SourceId, TransitionLookahead, ViewRole,
};

const WAIT: Duration = Duration::from_secs(10);
const BOX: ImageDimensions = ImageDimensions { width: 40, height: 40 };

#[derive(Debug)]
struct Gate {
    open: Mutex<bool>,
    changed: Condvar,
}

impl Gate {
    fn new(open: bool) -> Self {
        Self { open: Mutex::new(open), changed: Condvar::new() }
    }

    fn open(&self) {
        *self.open.lock() = true;
        self.changed.notify_all();
    }

    fn wait(&self) {
        let mut open = self.open.lock();
        while !*open {
            self.changed.wait(&mut open);
        }
    }
}

/// Slide deck whose renders can be held back and that counts backend calls per page.
#[derive(Debug)]
struct TestDeck {
    pages: u32,
    failing: Option<u32>,
    bad_stride: Option<u32>,
    gate: Gate,
    renders: Mutex<HashMap<u32, usize>>,
    started: flume::Sender<u32>,
}

impl TestDeck {
    fn new(pages: u32, gate_open: bool) -> (Self, Receiver<u32>) {
        let (started, started_rx) = flume::unbounded();
        let deck = Self {
            pages,
            failing: None,
            bad_stride: None,
            gate: Gate::new(gate_open),
            renders: Mutex::new(HashMap::new()),
            started,
        };
        (deck, started_rx)
    }

    fn renders_of(&self, index: u32) -> usize {
        self.renders.lock().get(&index).copied().unwrap_or(0)
    }

    fn request(&self, index: u32) -> Request {
        Request::new(self, self.page(index), BOX, ViewRole::CurrentPublic, RedrawCause::ForwardMove)
    }

    fn key(&self, index: u32) -> RenderKey {
        self.request(index).key().clone()
    }
}

impl Document for TestDeck {
    fn page_count(&self) -> u32 {
        self.pages
    }

    fn page(&self, index: u32) -> Option<PageId> {
        (index < self.pages).then(|| PageId::new(SourceId::new("talk"), index))
    }

    fn aspect_ratio(&self, _page: &PageId) -> f64 {
        0.75
    }

    fn render_page(&self, page: &PageId, size: ImageDimensions) -> anyhow::Result<Pixmap> {
        let _ = self.started.send(page.index);
        self.gate.wait();
        *self.renders.lock().entry(page.index).or_default() += 1;

        if self.failing == Some(page.index) {
            return Err(anyhow!("page {} is corrupt", page.index));
        }
        if self.bad_stride == Some(page.index) {
            return Ok(Pixmap {
                dimensions: size,
                bytes_per_row: usize::MAX / 2,
                format: PixelFormat::Rgba8,
                pixels: Vec::new(),
            });
        }
        Ok(Pixmap::filled(size, PixelFormat::Rgba8, page.index as u8))
    }
}

struct Harness {
    system: RenderSystem,
    deck: Arc<TestDeck>,
    started: Receiver<u32>,
    broadcasts: Receiver<RenderKey>,
}

impl Harness {
    fn new(
        deck: TestDeck,
        started: Receiver<u32>,
        config: RenderConfig,
        strategy: Box<dyn PrefetchStrategy>,
    ) -> Self {
        let deck = Arc::new(deck);
        let system = RenderSystem::with_strategy(deck.clone(), &config, strategy)
            .expect("start render system");
        let (tx, broadcasts) = flume::unbounded();
        system.subscribe(move |key, _| {
            let _ = tx.send(key.clone());
        });
        Self { system, deck, started, broadcasts }
    }

    fn drain_broadcasts(&self) -> Vec<RenderKey> {
        self.broadcasts.try_iter().collect()
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        // A failed assertion must not leave workers blocked on the gate.
        self.deck.gate.open();
    }
}

fn config(workers: usize) -> RenderConfig {
    RenderConfig::default().with_workers(workers)
}

#[test]
fn concurrent_identical_requests_share_one_job() {
    let (deck, started) = TestDeck::new(3, false);
    let harness = Harness::new(deck, started, config(2), Box::new(NoPrefetch));

    let (second_tx, second_rx) = flume::unbounded();
    harness.system.subscribe(move |key, _| {
        let _ = second_tx.send(key.clone());
    });

    let key = harness.deck.key(0);
    thread::scope(|scope| {
        for _ in 0..2 {
            scope.spawn(|| harness.system.submit(harness.deck.request(0)));
        }
    });

    assert_eq!(harness.started.recv_timeout(WAIT).expect("render started"), 0);
    assert_eq!(harness.system.in_flight_len(), 1);
    harness.deck.gate.open();

    assert_eq!(harness.broadcasts.recv_timeout(WAIT).expect("first subscriber"), key);
    assert_eq!(second_rx.recv_timeout(WAIT).expect("second subscriber"), key);
    assert!(harness.system.wait_idle(WAIT));

    assert!(harness.drain_broadcasts().is_empty());
    assert!(second_rx.try_recv().is_err());
    assert_eq!(harness.deck.renders_of(0), 1);

    let stats = harness.system.stats();
    assert_eq!(stats.jobs_dispatched, 1);
    assert_eq!(stats.dedup_hits, 1);
    assert_eq!(stats.upgrades, 0);
}

#[test]
fn prefetched_renders_are_cached_without_broadcast() {
    let (deck, started) = TestDeck::new(4, true);
    let harness = Harness::new(deck, started, config(2), Box::new(TransitionLookahead::new(1)));

    harness.system.submit(harness.deck.request(0));
    assert!(harness.system.wait_idle(WAIT));

    assert_eq!(harness.drain_broadcasts(), vec![harness.deck.key(0)]);
    assert!(harness.system.is_cached(&harness.deck.key(1)));
    assert!(!harness.system.is_cached(&harness.deck.key(2)));
    assert_eq!(harness.system.stats().prefetch_launched, 1);
}

#[test]
fn requesting_a_prefetched_key_upgrades_it() {
    let (deck, started) = TestDeck::new(4, false);
    let harness = Harness::new(deck, started, config(2), Box::new(TransitionLookahead::new(1)));

    // page 0 is requested, page 1 prefetched
    harness.system.submit(harness.deck.request(0));
    assert_eq!(harness.system.in_flight_len(), 2);

    // the view moves on before the prefetch finished
    harness.system.submit(harness.deck.request(1));
    harness.deck.gate.open();
    assert!(harness.system.wait_idle(WAIT));

    let delivered: HashSet<RenderKey> = harness.drain_broadcasts().into_iter().collect();
    let expected: HashSet<RenderKey> =
        [harness.deck.key(0), harness.deck.key(1)].into_iter().collect();
    assert_eq!(delivered, expected);

    assert_eq!(harness.deck.renders_of(1), 1);
    assert!(harness.system.is_cached(&harness.deck.key(2)));

    let stats = harness.system.stats();
    assert_eq!(stats.upgrades, 1);
    assert_eq!(stats.jobs_dispatched, 3);
}

#[test]
fn prefetch_skips_cached_and_running_keys() {
    let (deck, started) = TestDeck::new(5, true);
    let harness = Harness::new(deck, started, config(3), Box::new(TransitionLookahead::new(2)));

    harness.system.submit(harness.deck.request(0));
    assert!(harness.system.wait_idle(WAIT));
    assert_eq!(harness.system.stats().jobs_dispatched, 3);

    harness.system.submit(harness.deck.request(0));
    assert!(harness.system.wait_idle(WAIT));

    let stats = harness.system.stats();
    assert_eq!(stats.jobs_dispatched, 3);
    assert_eq!(stats.broadcasts, 2);
    for index in 0..3 {
        assert_eq!(harness.deck.renders_of(index), 1, "page {index} rendered more than once");
    }
}

#[test]
fn failed_renders_are_neither_cached_nor_broadcast() {
    let (mut deck, started) = TestDeck::new(3, true);
    deck.failing = Some(1);
    let harness = Harness::new(deck, started, config(1), Box::new(NoPrefetch));

    harness.system.submit(harness.deck.request(1));
    assert!(harness.system.wait_idle(WAIT));

    assert!(harness.drain_broadcasts().is_empty());
    assert!(!harness.system.is_cached(&harness.deck.key(1)));
    assert_eq!(harness.system.in_flight_len(), 0);
    assert_eq!(harness.system.stats().render_failures, 1);

    // nothing was cached, so asking again renders again
    harness.system.submit(harness.deck.request(1));
    assert!(harness.system.wait_idle(WAIT));
    assert_eq!(harness.deck.renders_of(1), 2);
}

#[test]
fn impossible_pixel_layouts_do_not_wedge_the_key() {
    let (mut deck, started) = TestDeck::new(2, true);
    deck.bad_stride = Some(0);
    let harness = Harness::new(deck, started, config(1), Box::new(NoPrefetch));

    harness.system.submit(harness.deck.request(0));
    assert!(harness.system.wait_idle(WAIT));
    assert_eq!(harness.system.in_flight_len(), 0);
    assert_eq!(harness.system.stats().render_failures, 1);

    // the key renders again instead of joining a job that never reports
    harness.system.submit(harness.deck.request(0));
    assert!(harness.system.wait_idle(WAIT));
    let stats = harness.system.stats();
    assert_eq!(stats.jobs_dispatched, 2);
    assert_eq!(stats.dedup_hits, 0);
    assert_eq!(stats.render_failures, 2);

    // the lone worker is still alive for other pages
    harness.system.submit(harness.deck.request(1));
    assert!(harness.system.wait_idle(WAIT));
    assert!(harness.system.is_cached(&harness.deck.key(1)));
    assert!(harness.drain_broadcasts().contains(&harness.deck.key(1)));
}

#[test]
fn empty_boxes_produce_no_work() {
    let (deck, started) = TestDeck::new(2, true);
    let harness = Harness::new(deck, started, config(1), Box::new(TransitionLookahead::new(2)));

    let empty = ImageDimensions::new(0, 0);
    let request = Request::new(
        &*harness.deck,
        harness.deck.page(0),
        empty,
        ViewRole::CurrentPublic,
        RedrawCause::ForwardMove,
    );
    assert!(request.key().is_null());

    harness.system.submit(request);
    assert!(harness.system.wait_idle(WAIT));

    let stats = harness.system.stats();
    assert_eq!(stats.dropped_requests, 1);
    assert_eq!(stats.jobs_dispatched, 0);
    assert!(harness.started.try_recv().is_err());
}

#[test]
fn cache_stays_within_budget() {
    let (deck, started) = TestDeck::new(6, true);
    let config = config(2).with_cache_capacity("250").expect("valid capacity");
    let harness = Harness::new(deck, started, config, Box::new(NoPrefetch));

    for index in 0..6 {
        harness.system.submit(harness.deck.request(index));
        assert!(harness.system.wait_idle(WAIT));
        assert!(harness.system.cached_bytes() <= harness.system.capacity());
    }

    assert!(harness.system.cached_len() < 6);
    assert!(harness.system.is_cached(&harness.deck.key(5)));
    assert!(harness.system.stats().cache_evictions > 0);
}

#[test]
fn subscribers_may_submit_from_their_handler() {
    let (deck, _started) = TestDeck::new(3, true);
    let deck = Arc::new(deck);
    let system = Arc::new(
        RenderSystem::with_strategy(deck.clone(), &config(1), Box::new(NoPrefetch))
            .expect("start render system"),
    );

    let (tx, rx) = flume::unbounded();
    let weak = Arc::downgrade(&system);
    let chained = deck.clone();
    system.subscribe(move |key, _| {
        let _ = tx.send(key.clone());
        if key.page().map(|page| page.index) == Some(0) {
            if let Some(system) = weak.upgrade() {
                system.submit(chained.request(1));
            }
        }
    });

    system.submit(deck.request(0));
    assert_eq!(rx.recv_timeout(WAIT).expect("first render"), deck.key(0));
    assert_eq!(rx.recv_timeout(WAIT).expect("chained render"), deck.key(1));
    assert!(system.wait_idle(WAIT));
}

#[test]
fn views_sharing_a_key_share_one_render() {
    let (deck, started) = TestDeck::new(2, true);
    let harness = Harness::new(deck, started, config(2), Box::new(NoPrefetch));

    let public = Arc::new(Mutex::new(PageSlot::new(ViewRole::CurrentPublic)));
    let presenter = Arc::new(Mutex::new(PageSlot::new(ViewRole::CurrentPresenter)));
    for slot in [&public, &presenter] {
        let slot = Arc::clone(slot);
        harness.system.subscribe(move |key, pixmap| {
            slot.lock().receive(key, pixmap);
        });
    }

    let deck: &TestDeck = &harness.deck;
    let mut requests = Vec::new();
    for (slot, bounds) in [(&public, BOX), (&presenter, ImageDimensions::new(40, 100))] {
        let mut slot = slot.lock();
        slot.update(deck, bounds, RedrawCause::Resize);
        requests.extend(slot.change_page(deck, deck.page(1), RedrawCause::RandomMove));
    }
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].key(), requests[1].key());

    for request in requests {
        harness.system.submit(request);
    }
    assert!(harness.system.wait_idle(WAIT));

    assert!(presenter.lock().shown().is_some());
    assert_eq!(harness.deck.renders_of(1), 1);

    let shown = public.lock().shown().cloned().expect("public view shows page 1");
    let image = shown.to_image().expect("rgba converts").into_rgba8();
    assert_eq!(image.dimensions(), (shown.width(), shown.height()));
    assert!(image.into_raw().iter().all(|&byte| byte == 1));
}
