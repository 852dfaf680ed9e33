//! Single-flight page rendering for one open document.
//!
//! # Responsibility
//! - Own current page and zoom for one document.
//! - Keep at most one render outstanding and collapse requests made while it
//!   runs into "render the latest request only".
//! - Persist reading progress and raise comprehension checkpoints after each
//!   successful render.
//!
//! # Invariants
//! - `start_render` is never called while another render is in flight.
//! - Requested pages are clamped to `1..=total_pages`; out-of-range requests
//!   never error.
//! - A failed render leaves `current_page` and stored progress untouched and
//!   keeps any pending request for the next `request_page` call.
//! - There is no timeout; a render that never completes keeps the sequencer
//!   in `Rendering`.

use crate::clock::now_epoch_ms;
use crate::model::book::BookId;
use crate::model::profile::ReadingProgress;
use crate::reader::engine::{PdfDocument, RenderError};
use crate::repo::profile_repo::ProfileRepository;
use crate::repo::{RepoError, RepoResult};
use log::{debug, warn};

pub const MIN_ZOOM: f32 = 0.5;
pub const MAX_ZOOM: f32 = 3.0;
pub const ZOOM_STEP: f32 = 0.1;

/// Clamps `scale` to the zoom bounds and rounds it to two decimals.
///
/// NaN yields `None`.
pub fn clamp_zoom(scale: f32) -> Option<f32> {
    if scale.is_nan() {
        return None;
    }
    Some((scale.clamp(MIN_ZOOM, MAX_ZOOM) * 100.0).round() / 100.0)
}

/// Sink for per-render reading progress.
pub trait ProgressRecorder {
    fn record_progress(&self, book_id: BookId, page: u32, total_pages: u32) -> RepoResult<()>;
}

impl<R: ProfileRepository> ProgressRecorder for R {
    fn record_progress(&self, book_id: BookId, page: u32, total_pages: u32) -> RepoResult<()> {
        self.modify(|profile| {
            profile.record_progress(
                book_id,
                ReadingProgress {
                    current_page: page,
                    total_pages,
                    last_read_ms: now_epoch_ms(),
                },
            );
            Ok::<_, RepoError>(())
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerState {
    Idle,
    Rendering(u32),
}

/// What a page request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageRequest {
    /// A render for this page was started.
    Started(u32),
    /// A render is in flight; this page replaced any earlier pending page.
    Queued(u32),
    /// The page is already on screen at the current zoom.
    Unchanged,
}

/// Outcome of one finished render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderEvent {
    Rendered {
        page: u32,
        /// This render landed on a checkpoint page.
        checkpoint: bool,
        /// `false` when the progress write failed; the page is still shown.
        progress_saved: bool,
    },
    Failed {
        page: u32,
        reason: RenderError,
    },
}

/// Page/zoom state machine for one document.
pub struct PaginationSequencer<D: PdfDocument> {
    book_id: BookId,
    document: D,
    total_pages: u32,
    current_page: u32,
    zoom: f32,
    state: SequencerState,
    in_flight_zoom: f32,
    pending_page: Option<u32>,
    on_screen: Option<(u32, f32)>,
    checkpoint_interval: u32,
    checkpoint_available: bool,
}

impl<D: PdfDocument> PaginationSequencer<D> {
    /// Creates an idle sequencer positioned before page 1.
    ///
    /// Nothing is rendered until the first `request_page`.
    pub fn new(book_id: BookId, document: D, checkpoint_interval: u32, zoom: f32) -> Self {
        let total_pages = document.page_count().max(1);
        let zoom = clamp_zoom(zoom).unwrap_or(MIN_ZOOM);
        Self {
            book_id,
            document,
            total_pages,
            current_page: 1,
            zoom,
            state: SequencerState::Idle,
            in_flight_zoom: zoom,
            pending_page: None,
            on_screen: None,
            checkpoint_interval: checkpoint_interval.max(1),
            checkpoint_available: false,
        }
    }

    pub fn book_id(&self) -> BookId {
        self.book_id
    }

    /// Last successfully rendered page (1 before the first render).
    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn total_pages(&self) -> u32 {
        self.total_pages
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    /// Zoom as a whole percentage for display.
    pub fn zoom_percent(&self) -> u32 {
        (self.zoom * 100.0).round() as u32
    }

    pub fn state(&self) -> SequencerState {
        self.state
    }

    pub fn is_rendering(&self) -> bool {
        matches!(self.state, SequencerState::Rendering(_))
    }

    pub fn pending_page(&self) -> Option<u32> {
        self.pending_page
    }

    pub fn checkpoint_interval(&self) -> u32 {
        self.checkpoint_interval
    }

    pub fn checkpoint_available(&self) -> bool {
        self.checkpoint_available
    }

    /// Dismisses the available checkpoint and returns the next checkpoint
    /// page.
    pub fn acknowledge_checkpoint(&mut self) -> u32 {
        self.checkpoint_available = false;
        self.current_page.saturating_add(self.checkpoint_interval)
    }

    /// The page the reader is heading to: the pending request, else the one
    /// in flight, else the one on screen.
    pub fn target_page(&self) -> u32 {
        match (self.pending_page, self.state) {
            (Some(page), _) => page,
            (None, SequencerState::Rendering(page)) => page,
            (None, SequencerState::Idle) => self.current_page,
        }
    }

    pub fn request_page(&mut self, page: u32) -> PageRequest {
        let page = page.clamp(1, self.total_pages);
        if self.is_rendering() {
            self.pending_page = Some(page);
            debug!(
                "event=page_request module=reader status=queued book_id={} page={page}",
                self.book_id
            );
            return PageRequest::Queued(page);
        }

        // Retained from a failed render.
        if let Some(retained) = self.pending_page.take() {
            if !self.is_on_screen(retained) {
                if retained != page {
                    self.pending_page = Some(page);
                }
                self.begin(retained);
                return PageRequest::Started(retained);
            }
        }

        if self.is_on_screen(page) {
            return PageRequest::Unchanged;
        }
        self.begin(page);
        PageRequest::Started(page)
    }

    pub fn next_page(&mut self) -> PageRequest {
        self.request_page(self.target_page().saturating_add(1))
    }

    pub fn previous_page(&mut self) -> PageRequest {
        self.request_page(self.target_page().saturating_sub(1))
    }

    pub fn first_page(&mut self) -> PageRequest {
        self.request_page(1)
    }

    pub fn last_page(&mut self) -> PageRequest {
        self.request_page(self.total_pages)
    }

    /// Sets the zoom and re-requests the target page through the
    /// single-flight path.
    pub fn set_zoom(&mut self, scale: f32) -> PageRequest {
        let Some(zoom) = clamp_zoom(scale) else {
            return PageRequest::Unchanged;
        };
        self.zoom = zoom;
        self.request_page(self.target_page())
    }

    pub fn zoom_in(&mut self) -> PageRequest {
        self.set_zoom(self.zoom + ZOOM_STEP)
    }

    pub fn zoom_out(&mut self) -> PageRequest {
        self.set_zoom(self.zoom - ZOOM_STEP)
    }

    /// Applies the result of the in-flight render.
    ///
    /// Returns `None` when no render was in flight.
    pub fn complete_render(
        &mut self,
        outcome: Result<(), RenderError>,
        progress: &impl ProgressRecorder,
    ) -> Option<RenderEvent> {
        let SequencerState::Rendering(page) = self.state else {
            warn!(
                "event=render_complete module=reader status=ignored book_id={} reason=not_rendering",
                self.book_id
            );
            return None;
        };
        self.state = SequencerState::Idle;

        if let Err(reason) = outcome {
            warn!(
                "event=render_complete module=reader status=error book_id={} page={page} error={reason}",
                self.book_id
            );
            return Some(RenderEvent::Failed { page, reason });
        }

        self.current_page = page;
        self.on_screen = Some((page, self.in_flight_zoom));
        let progress_saved = match progress.record_progress(self.book_id, page, self.total_pages) {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    "event=progress_save module=reader status=error book_id={} page={page} error={err}",
                    self.book_id
                );
                false
            }
        };
        let checkpoint = page % self.checkpoint_interval == 0;
        if checkpoint {
            self.checkpoint_available = true;
        }
        debug!(
            "event=render_complete module=reader status=ok book_id={} page={page} checkpoint={checkpoint}",
            self.book_id
        );

        if let Some(next) = self.pending_page.take() {
            if !self.is_on_screen(next) {
                self.begin(next);
            }
        }

        Some(RenderEvent::Rendered {
            page,
            checkpoint,
            progress_saved,
        })
    }

    fn is_on_screen(&self, page: u32) -> bool {
        self.on_screen == Some((page, self.zoom))
    }

    fn begin(&mut self, page: u32) {
        self.state = SequencerState::Rendering(page);
        self.in_flight_zoom = self.zoom;
        debug!(
            "event=render_start module=reader status=start book_id={} page={page} zoom={}",
            self.book_id, self.zoom
        );
        self.document.start_render(page, self.zoom);
    }
}

#[cfg(test)]
mod tests {
    use super::{clamp_zoom, PageRequest, PaginationSequencer, RenderEvent, SequencerState};
    use crate::model::profile::{UserIdentity, UserProfile};
    use crate::reader::engine::{PdfDocument, RenderError};
    use crate::repo::profile_repo::{KvProfileRepository, ProfileRepository};
    use crate::store::MemoryKeyValueStore;
    use std::cell::RefCell;
    use std::rc::Rc;
    use uuid::Uuid;

    type RenderLog = Rc<RefCell<Vec<(u32, f32)>>>;

    struct FakeDocument {
        pages: u32,
        renders: RenderLog,
    }

    impl PdfDocument for FakeDocument {
        fn page_count(&self) -> u32 {
            self.pages
        }

        fn start_render(&mut self, page: u32, scale: f32) {
            self.renders.borrow_mut().push((page, scale));
        }
    }

    fn sequencer(pages: u32) -> (PaginationSequencer<FakeDocument>, RenderLog) {
        let renders = RenderLog::default();
        let document = FakeDocument {
            pages,
            renders: Rc::clone(&renders),
        };
        (PaginationSequencer::new(11, document, 5, 1.2), renders)
    }

    fn logged_in(store: &MemoryKeyValueStore) -> KvProfileRepository<&MemoryKeyValueStore> {
        let repo = KvProfileRepository::new(store);
        let identity = UserIdentity {
            id: Uuid::new_v4(),
            username: "reader".to_string(),
            email: "reader@example.com".to_string(),
        };
        repo.save(&UserProfile::new_account(identity, 0, []))
            .expect("seed profile");
        repo
    }

    #[test]
    fn requests_during_render_collapse_to_the_last_one() {
        let store = MemoryKeyValueStore::new();
        let repo = logged_in(&store);
        let (mut seq, renders) = sequencer(20);

        assert_eq!(seq.request_page(1), PageRequest::Started(1));
        assert_eq!(seq.request_page(3), PageRequest::Queued(3));
        assert_eq!(seq.request_page(7), PageRequest::Queued(7));
        assert_eq!(seq.request_page(2), PageRequest::Queued(2));

        seq.complete_render(Ok(()), &repo).expect("event");
        assert_eq!(seq.state(), SequencerState::Rendering(2));
        seq.complete_render(Ok(()), &repo).expect("event");
        assert_eq!(seq.state(), SequencerState::Idle);

        let pages = renders.borrow().iter().map(|(page, _)| *page).collect::<Vec<_>>();
        assert_eq!(pages, vec![1, 2]);
    }

    #[test]
    fn out_of_range_pages_are_clamped_and_repeats_are_no_ops() {
        let store = MemoryKeyValueStore::new();
        let repo = logged_in(&store);
        let (mut seq, _) = sequencer(4);

        assert_eq!(seq.request_page(0), PageRequest::Started(1));
        seq.complete_render(Ok(()), &repo).expect("event");
        assert_eq!(seq.request_page(1), PageRequest::Unchanged);
        assert_eq!(seq.previous_page(), PageRequest::Unchanged);
        assert_eq!(seq.request_page(99), PageRequest::Started(4));
    }

    #[test]
    fn pending_page_equal_to_rendered_page_is_dropped() {
        let store = MemoryKeyValueStore::new();
        let repo = logged_in(&store);
        let (mut seq, renders) = sequencer(10);

        seq.request_page(3);
        seq.request_page(3);
        seq.complete_render(Ok(()), &repo).expect("event");
        assert_eq!(seq.state(), SequencerState::Idle);
        assert_eq!(renders.borrow().len(), 1);
    }

    #[test]
    fn zoom_changes_during_render_collapse_to_one_rerender() {
        let store = MemoryKeyValueStore::new();
        let repo = logged_in(&store);
        let (mut seq, renders) = sequencer(10);

        seq.request_page(1);
        seq.zoom_in();
        seq.zoom_in();
        seq.set_zoom(9.0);
        assert_eq!(seq.zoom(), 3.0);

        seq.complete_render(Ok(()), &repo).expect("event");
        seq.complete_render(Ok(()), &repo).expect("event");
        assert_eq!(*renders.borrow(), vec![(1, 1.2), (1, 3.0)]);
        assert_eq!(seq.set_zoom(3.0), PageRequest::Unchanged);
    }

    #[test]
    fn failed_render_keeps_state_and_pending_request() {
        let store = MemoryKeyValueStore::new();
        let repo = logged_in(&store);
        let (mut seq, renders) = sequencer(10);

        seq.request_page(1);
        seq.complete_render(Ok(()), &repo).expect("event");
        seq.request_page(4);
        seq.request_page(6);

        let event = seq
            .complete_render(Err(RenderError::Backend("decode".to_string())), &repo)
            .expect("event");
        assert!(matches!(event, RenderEvent::Failed { page: 4, .. }));
        assert_eq!(seq.state(), SequencerState::Idle);
        assert_eq!(seq.current_page(), 1);
        assert_eq!(seq.pending_page(), Some(6));
        assert_eq!(renders.borrow().len(), 2);

        assert_eq!(seq.request_page(8), PageRequest::Started(6));
        assert_eq!(seq.pending_page(), Some(8));
        seq.complete_render(Ok(()), &repo).expect("event");
        assert_eq!(seq.state(), SequencerState::Rendering(8));
    }

    #[test]
    fn progress_write_failure_is_reported_not_fatal() {
        let store = MemoryKeyValueStore::new();
        let (mut seq, _) = sequencer(10);
        let guest_repo = KvProfileRepository::new(&store);

        seq.request_page(2);
        let event = seq.complete_render(Ok(()), &guest_repo).expect("event");
        assert_eq!(
            event,
            RenderEvent::Rendered {
                page: 2,
                checkpoint: false,
                progress_saved: false
            }
        );
        assert_eq!(seq.current_page(), 2);
    }

    #[test]
    fn stray_completion_is_ignored() {
        let store = MemoryKeyValueStore::new();
        let repo = logged_in(&store);
        let (mut seq, _) = sequencer(10);
        assert_eq!(seq.complete_render(Ok(()), &repo), None);
    }

    #[test]
    fn checkpoint_acknowledgement_reports_next_checkpoint() {
        let store = MemoryKeyValueStore::new();
        let repo = logged_in(&store);
        let (mut seq, _) = sequencer(20);
        seq.request_page(5);
        seq.complete_render(Ok(()), &repo).expect("event");
        assert!(seq.checkpoint_available());
        assert_eq!(seq.acknowledge_checkpoint(), 10);
        assert!(!seq.checkpoint_available());
    }

    #[test]
    fn clamp_zoom_rounds_to_hundredths() {
        assert_eq!(clamp_zoom(1.234), Some(1.23));
        assert_eq!(clamp_zoom(0.1), Some(0.5));
        assert_eq!(clamp_zoom(f32::INFINITY), Some(3.0));
        assert_eq!(clamp_zoom(f32::NAN), None);
    }
}
