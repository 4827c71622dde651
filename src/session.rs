//! Annotation edit session.
//!
//! Holds the working rectangles of one image, the selection, the draw color
//! and the view transform, and reconciles local edits with the persistence
//! gateway on save.
//!
//! Saving is optimistic: payloads are dispatched and the baselines are reset
//! immediately, without waiting for the gateway. Completions are collected in
//! [`EditSession::sync`], which reports completions to the caller and refetches
//! the collection once the gateway is idle so that [`EditSession::hydrate`]
//! can replace local ids and correct any optimistic state the store rejected.

use std::collections::HashSet;

use egui::{Pos2, Vec2};

use crate::error::GatewayError;
use crate::gateway::{AnnotationGateway, GatewayRequest, GatewayResponse};
use crate::model::{
    Annotation, AnnotationId, CreateAnnotationPayload, DEFAULT_COLOR, DEFAULT_RECT_SIZE,
    RectanglePatch, UpdateAnnotationPayload, WorkingRectangle, timestamp_now,
};
use crate::transform::{DEFAULT_FIT_MARGIN, ViewTransform};

/// Viewport size used until the shell reports the real one.
pub const DEFAULT_VIEWPORT: Vec2 = Vec2::new(1200.0, 700.0);

/// What a call to [`EditSession::save`] dispatched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveReport {
    pub created: usize,
    pub updated: usize,
}

impl SaveReport {
    pub fn is_empty(&self) -> bool {
        self.created == 0 && self.updated == 0
    }
}

/// Gateway calls that completed during one [`EditSession::sync`].
#[derive(Debug, Default)]
pub struct SyncReport {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub errors: Vec<GatewayError>,
}

impl SyncReport {
    pub fn is_empty(&self) -> bool {
        self.created == 0 && self.updated == 0 && self.deleted == 0 && self.errors.is_empty()
    }
}

pub struct EditSession<G: AnnotationGateway> {
    image_id: u64,
    gateway: G,

    rectangles: Vec<WorkingRectangle>,
    selected_id: Option<AnnotationId>,
    selected_color: String,

    transform: ViewTransform,
    viewport: Vec2,
    fit_margin: f32,

    /// Ids of persisted rectangles touched since the last save. Membership is
    /// never re-derived from field values: reverting an edit by hand keeps
    /// the id here until the next save.
    modified_ids: HashSet<AnnotationId>,
    last_hydrated: Vec<Annotation>,

    in_flight: usize,
    refetch_pending: bool,
}

impl<G: AnnotationGateway> EditSession<G> {
    /// Create a session for one image and hydrate it with what is already stored.
    pub fn new(image_id: u64, gateway: G, initial: &[Annotation]) -> Self {
        let mut session = Self {
            image_id,
            gateway,
            rectangles: Vec::new(),
            selected_id: None,
            selected_color: DEFAULT_COLOR.to_string(),
            transform: ViewTransform::identity(),
            viewport: DEFAULT_VIEWPORT,
            fit_margin: DEFAULT_FIT_MARGIN,
            modified_ids: HashSet::new(),
            last_hydrated: Vec::new(),
            in_flight: 0,
            refetch_pending: false,
        };
        session.hydrate(initial);
        session
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.selected_color = color.into();
        self
    }

    pub fn with_fit_margin(mut self, margin: f32) -> Self {
        self.fit_margin = margin;
        self
    }

    // ── Read access ─────────────────────────────────────────────────────────

    pub fn image_id(&self) -> u64 {
        self.image_id
    }

    pub fn rectangles(&self) -> &[WorkingRectangle] {
        &self.rectangles
    }

    pub fn rectangle(&self, id: &str) -> Option<&WorkingRectangle> {
        self.rectangles.iter().find(|r| r.id == id)
    }

    pub fn selected_id(&self) -> Option<&str> {
        self.selected_id.as_deref()
    }

    pub fn selected(&self) -> Option<&WorkingRectangle> {
        self.selected_id.as_deref().and_then(|id| self.rectangle(id))
    }

    pub fn selected_color(&self) -> &str {
        &self.selected_color
    }

    pub fn transform(&self) -> ViewTransform {
        self.transform
    }

    pub fn scale(&self) -> f32 {
        self.transform.scale
    }

    pub fn position(&self) -> Vec2 {
        self.transform.position
    }

    pub fn viewport(&self) -> Vec2 {
        self.viewport
    }

    pub fn modified_ids(&self) -> &HashSet<AnnotationId> {
        &self.modified_ids
    }

    pub fn is_tracked_modified(&self, id: &str) -> bool {
        self.modified_ids.contains(id)
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn gateway_mut(&mut self) -> &mut G {
        &mut self.gateway
    }

    /// Gateway calls dispatched and not yet completed.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn new_count(&self) -> usize {
        self.rectangles.iter().filter(|r| r.is_new).count()
    }

    /// Rectangles whose fields differ from their baseline.
    pub fn modified_count(&self) -> usize {
        self.rectangles.iter().filter(|r| r.is_modified()).count()
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.rectangles.iter().any(|r| r.is_new) || !self.modified_ids.is_empty()
    }

    /// Save is allowed only with something to save and no call outstanding.
    pub fn can_save(&self) -> bool {
        self.in_flight == 0 && self.has_unsaved_changes()
    }

    // ── Hydration and view ──────────────────────────────────────────────────

    /// Replace the working set with freshly fetched annotations.
    ///
    /// Empty input and input identical to the last hydration are ignored so
    /// that in-progress edits survive. Returns whether the working set was
    /// replaced.
    pub fn hydrate(&mut self, annotations: &[Annotation]) -> bool {
        if annotations.is_empty() {
            log::debug!("Hydrate skipped: empty annotation list");
            return false;
        }
        if annotations == self.last_hydrated.as_slice() {
            log::debug!("Hydrate skipped: annotations unchanged");
            return false;
        }

        self.rectangles = annotations
            .iter()
            .map(WorkingRectangle::from_annotation)
            .collect();
        self.modified_ids.clear();
        self.last_hydrated = annotations.to_vec();

        let selection_gone = self
            .selected_id
            .as_ref()
            .is_some_and(|id| !self.rectangles.iter().any(|r| &r.id == id));
        if selection_gone {
            self.selected_id = None;
        }

        log::debug!(
            "Hydrated {} rectangles for image {}",
            self.rectangles.len(),
            self.image_id
        );
        true
    }

    /// Fit and center an image of the given size in the viewport.
    pub fn compute_fit_transform(
        &mut self,
        image_width: f32,
        image_height: f32,
        viewport_width: f32,
        viewport_height: f32,
    ) {
        self.viewport = Vec2::new(viewport_width, viewport_height);
        self.transform = ViewTransform::fit(
            Vec2::new(image_width, image_height),
            self.viewport,
            self.fit_margin,
        );
        log::debug!(
            "Fit {}x{} into {}x{}: scale {:.3}",
            image_width,
            image_height,
            viewport_width,
            viewport_height,
            self.transform.scale
        );
    }

    pub fn set_transform(&mut self, transform: ViewTransform) {
        self.transform = transform;
    }

    pub fn set_scale(&mut self, scale: f32) {
        self.transform.scale = scale;
    }

    pub fn set_position(&mut self, position: Vec2) {
        self.transform.position = position;
    }

    // ── Edit commands ───────────────────────────────────────────────────────

    /// Select a rectangle, or clear the selection with `None`. Unknown ids
    /// are ignored.
    pub fn select(&mut self, id: Option<&str>) {
        match id {
            Some(id) if self.rectangle(id).is_none() => {
                log::debug!("Ignoring selection of unknown rectangle {}", id);
            }
            _ => self.selected_id = id.map(str::to_string),
        }
    }

    /// Change the draw color, recoloring the selected rectangle if there is one.
    pub fn set_color(&mut self, color: impl Into<String>) {
        self.selected_color = color.into();
        if let Some(id) = self.selected_id.clone() {
            let patch = RectanglePatch::recolored(self.selected_color.clone());
            self.update_rectangle(&id, &patch);
        }
    }

    /// Add a default-size rectangle near the pointer (viewport coordinates),
    /// or near the viewport center, and select it.
    pub fn add_rectangle(&mut self, pointer: Option<Pos2>) -> AnnotationId {
        let anchor = pointer.unwrap_or_else(|| (self.viewport / 2.0).to_pos2());
        let half = DEFAULT_RECT_SIZE / 2.0;
        let top_left = self
            .transform
            .viewport_to_image(Pos2::new(anchor.x - half, anchor.y - half));

        let rect = WorkingRectangle::new_local(
            top_left.x.max(0.0),
            top_left.y.max(0.0),
            self.selected_color.clone(),
        );
        let id = rect.id.clone();
        log::debug!("Added rectangle {} at ({:.1}, {:.1})", id, rect.x, rect.y);
        self.rectangles.push(rect);
        self.selected_id = Some(id.clone());
        id
    }

    /// Merge a patch into a rectangle. Unknown ids are ignored.
    pub fn update_rectangle(&mut self, id: &str, patch: &RectanglePatch) {
        let Some(rect) = self.rectangles.iter_mut().find(|r| r.id == id) else {
            return;
        };
        rect.apply(patch);
        if !rect.is_new {
            self.modified_ids.insert(rect.id.clone());
        }
    }

    /// Remove the selected rectangle. Persisted rectangles are also deleted
    /// from the store, without waiting for confirmation.
    pub fn delete_selected(&mut self) {
        let Some(id) = self.selected_id.take() else {
            return;
        };
        let Some(index) = self.rectangles.iter().position(|r| r.id == id) else {
            return;
        };

        let rect = self.rectangles.remove(index);
        if !rect.is_new {
            self.dispatch(GatewayRequest::Delete { id: rect.id.clone() });
        }
        self.modified_ids.remove(&rect.id);
    }

    /// Persist new and modified rectangles and commit their baselines locally.
    pub fn save(&mut self) -> SaveReport {
        if self.in_flight > 0 {
            log::warn!(
                "Save ignored: {} gateway call(s) still outstanding",
                self.in_flight
            );
            return SaveReport::default();
        }

        let now = timestamp_now();
        let mut requests = Vec::new();
        let mut report = SaveReport::default();

        for rect in self.rectangles.iter().filter(|r| r.is_new) {
            requests.push(GatewayRequest::Create(CreateAnnotationPayload::from_rect(
                self.image_id,
                rect,
                &now,
            )));
            report.created += 1;
        }
        for rect in self
            .rectangles
            .iter()
            .filter(|r| !r.is_new && self.modified_ids.contains(&r.id))
        {
            requests.push(GatewayRequest::Update {
                id: rect.id.clone(),
                payload: UpdateAnnotationPayload::from_rect(self.image_id, rect, &now),
            });
            report.updated += 1;
        }

        for request in requests {
            self.dispatch(request);
        }

        for rect in &mut self.rectangles {
            if rect.is_new || self.modified_ids.contains(&rect.id) {
                rect.commit_baseline();
            }
        }
        self.modified_ids.clear();

        if !report.is_empty() {
            log::info!(
                "Saved image {}: {} created, {} updated",
                self.image_id,
                report.created,
                report.updated
            );
        }
        report
    }

    // ── Gateway ─────────────────────────────────────────────────────────────

    /// Ask the gateway for the stored annotations of this image.
    pub fn refresh(&mut self) {
        self.dispatch(GatewayRequest::List {
            image_id: self.image_id,
        });
    }

    /// Collect completed gateway calls.
    ///
    /// Non-empty list results are hydrated even when equal to the last
    /// hydration, which discards optimistic state the store rejected.
    /// Completed mutations and failures are counted in the returned report
    /// for the shell to show; local state is not rolled back. Once every
    /// outstanding call has completed after a mutation, the collection is
    /// refetched.
    pub fn sync(&mut self) -> SyncReport {
        let mut report = SyncReport::default();

        for response in self.gateway.poll() {
            self.in_flight = self.in_flight.saturating_sub(1);
            if response.is_mutation() {
                self.refetch_pending = true;
            }

            match response {
                GatewayResponse::Listed { result: Ok(list), .. } => {
                    // a fresh fetch always wins over the memo
                    self.last_hydrated.clear();
                    self.hydrate(&list);
                }
                GatewayResponse::Created(Ok(annotation)) => {
                    log::debug!("Created annotation {}", annotation.id);
                    report.created += 1;
                }
                GatewayResponse::Updated { id, result: Ok(_) } => {
                    log::debug!("Updated annotation {}", id);
                    report.updated += 1;
                }
                GatewayResponse::Deleted { id, result: Ok(()) } => {
                    log::debug!("Deleted annotation {}", id);
                    report.deleted += 1;
                }
                GatewayResponse::Created(Err(e))
                | GatewayResponse::Updated { result: Err(e), .. }
                | GatewayResponse::Deleted { result: Err(e), .. }
                | GatewayResponse::Listed { result: Err(e), .. } => {
                    log::warn!("Gateway call failed: {}", e);
                    report.errors.push(e);
                }
            }
        }

        if self.refetch_pending && self.in_flight == 0 {
            self.refetch_pending = false;
            self.refresh();
        }
        report
    }

    fn dispatch(&mut self, request: GatewayRequest) {
        log::debug!("Dispatching {}", request.describe());
        self.in_flight += 1;
        self.gateway.dispatch(request);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MemoryGateway;
    use crate::model::Coordinates;

    fn stored(id: &str, x: f64, y: f64) -> Annotation {
        Annotation {
            id: id.to_string(),
            image_id: 1,
            kind: Default::default(),
            coordinates: Coordinates {
                x: Some(x),
                y: Some(y),
                width: Some(100.0),
                height: Some(100.0),
            },
            color: Some("#000".to_string()),
            created_at: None,
            updated_at: None,
        }
    }

    fn session_with(annotations: &[Annotation]) -> EditSession<MemoryGateway> {
        let gateway = MemoryGateway::with_annotations(annotations.to_vec());
        EditSession::new(1, gateway, annotations)
    }

    #[test]
    fn test_hydrate_ignores_empty_input() {
        let mut session = session_with(&[stored("a", 0.0, 0.0)]);
        session.update_rectangle("a", &RectanglePatch::moved_to(5.0, 5.0));

        assert!(!session.hydrate(&[]));
        assert_eq!(session.rectangles().len(), 1);
        assert!(session.is_tracked_modified("a"));
    }

    #[test]
    fn test_hydrate_ignores_unchanged_input() {
        let initial = [stored("a", 0.0, 0.0)];
        let mut session = session_with(&initial);
        session.update_rectangle("a", &RectanglePatch::moved_to(5.0, 5.0));

        assert!(!session.hydrate(&initial));
        assert_eq!(session.rectangle("a").map(|r| r.x), Some(5.0));
    }

    #[test]
    fn test_hydrate_replaces_and_clears_modified() {
        let mut session = session_with(&[stored("a", 0.0, 0.0)]);
        session.update_rectangle("a", &RectanglePatch::moved_to(5.0, 5.0));
        session.add_rectangle(None);

        assert!(session.hydrate(&[stored("b", 1.0, 2.0)]));
        assert_eq!(session.rectangles().len(), 1);
        assert!(session.modified_ids().is_empty());
        assert!(!session.has_unsaved_changes());
        assert_eq!(session.selected_id(), None);
    }

    #[test]
    fn test_hydrate_keeps_surviving_selection() {
        let mut session = session_with(&[stored("a", 0.0, 0.0)]);
        session.select(Some("a"));
        session.hydrate(&[stored("a", 3.0, 0.0), stored("b", 0.0, 0.0)]);
        assert_eq!(session.selected_id(), Some("a"));
    }

    #[test]
    fn test_select_unknown_id_is_ignored() {
        let mut session = session_with(&[stored("a", 0.0, 0.0)]);
        session.select(Some("a"));
        session.select(Some("missing"));
        assert_eq!(session.selected_id(), Some("a"));
        session.select(None);
        assert_eq!(session.selected_id(), None);
    }

    #[test]
    fn test_set_color_recolors_selection() {
        let mut session = session_with(&[stored("a", 0.0, 0.0)]);
        session.set_color("#00FF00");
        assert!(session.modified_ids().is_empty());

        session.select(Some("a"));
        session.set_color("#0000FF");
        assert_eq!(session.selected_color(), "#0000FF");
        assert_eq!(session.rectangle("a").map(|r| r.color.as_str()), Some("#0000FF"));
        assert!(session.is_tracked_modified("a"));
    }

    #[test]
    fn test_set_color_on_new_rect_is_not_tracked() {
        let mut session = session_with(&[]);
        let id = session.add_rectangle(None);
        session.set_color("#123456");
        assert_eq!(session.rectangle(&id).map(|r| r.color.as_str()), Some("#123456"));
        assert!(session.modified_ids().is_empty());
    }

    #[test]
    fn test_add_rectangle_uses_inverse_transform() {
        let mut session = session_with(&[]).with_color("#ABCDEF");
        session.set_transform(ViewTransform::new(2.0, Vec2::new(10.0, 20.0)));

        let id = session.add_rectangle(Some(Pos2::new(250.0, 150.0)));
        let rect = session.rectangle(&id).unwrap();
        assert_eq!(rect.x, (250.0 - 50.0) / 2.0 - 10.0);
        assert_eq!(rect.y, (150.0 - 50.0) / 2.0 - 20.0);
        assert_eq!(rect.color, "#ABCDEF");
        assert_eq!(session.selected_id(), Some(id.as_str()));
    }

    #[test]
    fn test_add_rectangle_clamps_to_image_origin() {
        let mut session = session_with(&[]);
        let id = session.add_rectangle(Some(Pos2::new(10.0, 10.0)));
        let rect = session.rectangle(&id).unwrap();
        assert_eq!((rect.x, rect.y), (0.0, 0.0));
    }

    #[test]
    fn test_update_unknown_id_is_noop() {
        let mut session = session_with(&[stored("a", 0.0, 0.0)]);
        session.update_rectangle("zzz", &RectanglePatch::moved_to(1.0, 1.0));
        assert!(!session.has_unsaved_changes());
    }

    #[test]
    fn test_delete_without_selection_is_noop() {
        let mut session = session_with(&[stored("a", 0.0, 0.0)]);
        session.delete_selected();
        assert_eq!(session.rectangles().len(), 1);
        assert!(session.gateway().requests().is_empty());
    }

    #[test]
    fn test_delete_drops_modified_tracking() {
        let mut session = session_with(&[stored("a", 0.0, 0.0)]);
        session.select(Some("a"));
        session.update_rectangle("a", &RectanglePatch::moved_to(9.0, 9.0));
        session.delete_selected();

        assert!(session.modified_ids().is_empty());
        assert_eq!(session.selected_id(), None);
        assert_eq!(session.in_flight(), 1);
    }

    #[test]
    fn test_save_is_gated_while_calls_are_outstanding() {
        let mut session = session_with(&[stored("a", 0.0, 0.0)]);
        session.select(Some("a"));
        session.delete_selected();
        session.add_rectangle(None);

        assert!(!session.can_save());
        assert!(session.save().is_empty());
        assert!(session.has_unsaved_changes());

        session.sync();
        // the refetch after the delete is still outstanding
        assert!(!session.can_save());
        session.sync();
        assert!(session.can_save());
    }

    #[test]
    fn test_sync_refetches_and_adopts_store_ids() {
        let mut session = session_with(&[]);
        let local_id = session.add_rectangle(None);
        session.save();

        let report = session.sync();
        assert_eq!(report.created, 1);
        assert!(report.errors.is_empty());
        assert!(matches!(
            session.gateway().requests().last(),
            Some(GatewayRequest::List { image_id: 1 })
        ));

        session.sync();
        assert_eq!(session.in_flight(), 0);
        assert_eq!(session.rectangles().len(), 1);
        let stored_id = &session.gateway().annotations()[0].id;
        assert_eq!(&session.rectangles()[0].id, stored_id);
        assert_ne!(&local_id, stored_id);
    }

    #[test]
    fn test_sync_counts_completed_mutations() {
        let mut session = session_with(&[stored("a", 0.0, 0.0), stored("b", 0.0, 0.0)]);
        assert_eq!(session.image_id(), 1);
        session.update_rectangle("a", &RectanglePatch::moved_to(7.0, 7.0));
        session.add_rectangle(None);
        session.save();
        session.select(Some("b"));
        session.delete_selected();

        let report = session.sync();
        assert_eq!((report.created, report.updated, report.deleted), (1, 1, 1));
        assert!(report.errors.is_empty());
        assert!(!report.is_empty());

        // the refetch completes without counting as a mutation
        assert!(session.sync().is_empty());
    }

    #[test]
    fn test_sync_reports_failures_without_rollback() {
        let mut session = session_with(&[]);
        session.gateway_mut().set_fail_mutations(true);
        session.add_rectangle(None);
        session.save();

        let report = session.sync();
        assert_eq!(report.created, 0);
        assert_eq!(report.errors.len(), 1);
        assert!(matches!(report.errors[0], GatewayError::Disconnected));
        assert_eq!(session.rectangles().len(), 1);
        assert!(!session.rectangles()[0].is_new);
        assert!(!session.has_unsaved_changes());
    }

    #[test]
    fn test_counts_follow_field_diff() {
        let mut session = session_with(&[stored("a", 0.0, 0.0), stored("b", 0.0, 0.0)]);
        session.add_rectangle(None);
        session.update_rectangle("a", &RectanglePatch::moved_to(1.0, 0.0));
        session.update_rectangle("b", &RectanglePatch::moved_to(0.0, 0.0));

        assert_eq!(session.new_count(), 1);
        assert_eq!(session.modified_count(), 1);
        assert_eq!(session.modified_ids().len(), 2);
    }

    #[test]
    fn test_set_scale_and_position() {
        let mut session = session_with(&[]);
        session.set_scale(2.0);
        session.set_position(Vec2::new(-10.0, 5.0));
        assert_eq!(session.transform(), ViewTransform::new(2.0, Vec2::new(-10.0, 5.0)));

        // new rectangles land under the viewport center in image space
        let id = session.add_rectangle(None);
        let rect = session.rectangle(&id).unwrap();
        assert_eq!((rect.x, rect.y), ((600.0 - 50.0) / 2.0 + 10.0, (350.0 - 50.0) / 2.0 - 5.0));
    }

    #[test]
    fn test_fit_transform_records_viewport() {
        let mut session = session_with(&[]);
        session.compute_fit_transform(2000.0, 1000.0, 1000.0, 600.0);
        assert_eq!(session.viewport(), Vec2::new(1000.0, 600.0));
        assert!((session.scale() - 0.45).abs() < 1e-4);
    }
}
