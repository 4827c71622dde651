//! Scene adapter between the edit session and the canvas.
//!
//! Maps working rectangles to drawable shapes and turns pointer gestures into
//! session commands. The only state kept here is the transient node state of
//! an ongoing drag or resize (offset and scale factors), which is collapsed
//! into a single `update_rectangle` call when the gesture ends.

use egui::{Color32, Pos2, Rect, Vec2};

use crate::color::{display_color, fill_color, parse_color};
use crate::gateway::AnnotationGateway;
use crate::model::{AnnotationId, MIN_RECT_SIZE, RectanglePatch, WorkingRectangle};
use crate::session::EditSession;

/// Side of a resize handle in viewport pixels.
pub const HANDLE_SIZE: f32 = 9.0;

/// Pointer distance (viewport pixels) within which a handle is grabbed.
pub const HANDLE_HIT_RADIUS: f32 = 8.0;

/// Dash pattern of a modified rectangle's outline, in viewport pixels.
pub const DASH_PATTERN: (f32, f32) = (5.0, 2.0);

/// How one rectangle is drawn.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeStyle {
    pub stroke: Color32,
    pub stroke_width: f32,
    pub dashed: bool,
    pub fill: Color32,
}

impl ShapeStyle {
    pub fn for_rect(rect: &WorkingRectangle, selected: bool) -> Self {
        let modified = rect.is_modified();
        let fill = parse_color(&fill_color(&rect.color))
            .unwrap_or_else(|| Color32::from_rgba_unmultiplied(0, 0, 0, 128));
        Self {
            stroke: if selected {
                Color32::BLACK
            } else {
                display_color(&rect.color)
            },
            stroke_width: if modified || rect.is_new { 3.0 } else { 2.0 },
            dashed: modified,
            fill,
        }
    }
}

/// A rectangle ready to paint, in image coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneShape {
    pub id: AnnotationId,
    pub rect: Rect,
    pub style: ShapeStyle,
    pub selected: bool,
}

/// Corner handles of the resize overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handle {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl Handle {
    pub fn all() -> &'static [Handle] {
        &[
            Handle::TopLeft,
            Handle::TopRight,
            Handle::BottomLeft,
            Handle::BottomRight,
        ]
    }

    pub fn position(&self, rect: Rect) -> Pos2 {
        match self {
            Handle::TopLeft => rect.left_top(),
            Handle::TopRight => rect.right_top(),
            Handle::BottomLeft => rect.left_bottom(),
            Handle::BottomRight => rect.right_bottom(),
        }
    }

    /// The corner that stays put while this handle is dragged.
    fn opposite(&self, rect: Rect) -> Pos2 {
        match self {
            Handle::TopLeft => rect.right_bottom(),
            Handle::TopRight => rect.left_bottom(),
            Handle::BottomLeft => rect.right_top(),
            Handle::BottomRight => rect.left_top(),
        }
    }
}

/// Live node attributes of the shape being manipulated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeState {
    pub x: f32,
    pub y: f32,
    pub scale_x: f32,
    pub scale_y: f32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Gesture {
    #[default]
    Idle,
    Moving {
        id: AnnotationId,
        offset: Vec2,
    },
    Resizing {
        id: AnnotationId,
        handle: Handle,
        /// Box of the rectangle when the resize started.
        base: Rect,
        node: NodeState,
    },
}

fn rect_bounds(rect: &WorkingRectangle) -> Rect {
    Rect::from_min_size(Pos2::new(rect.x, rect.y), Vec2::new(rect.width, rect.height))
}

/// Routes pointer input to an [`EditSession`].
#[derive(Debug, Default)]
pub struct SceneAdapter {
    gesture: Gesture,
    /// Shape carrying the resize overlay.
    attached: Option<AnnotationId>,
}

impl SceneAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gesture(&self) -> &Gesture {
        &self.gesture
    }

    pub fn attached(&self) -> Option<&str> {
        self.attached.as_deref()
    }

    /// Move the resize overlay to the currently selected shape. Returns
    /// whether the attachment changed.
    pub fn sync_selection(&mut self, selected: Option<&str>) -> bool {
        if self.attached.as_deref() == selected {
            return false;
        }
        log::trace!("Resize overlay {:?} -> {:?}", self.attached, selected);
        self.attached = selected.map(str::to_string);
        true
    }

    /// Topmost rectangle under an image-space point.
    pub fn hit_test<G: AnnotationGateway>(
        &self,
        session: &EditSession<G>,
        pos: Pos2,
    ) -> Option<AnnotationId> {
        session
            .rectangles()
            .iter()
            .rev()
            .find(|r| r.contains_point(pos.x, pos.y))
            .map(|r| r.id.clone())
    }

    /// Handle of the attached overlay under an image-space point.
    pub fn hit_handle<G: AnnotationGateway>(
        &self,
        session: &EditSession<G>,
        pos: Pos2,
    ) -> Option<Handle> {
        let rect = session.rectangle(self.attached.as_deref()?)?;
        let bounds = rect_bounds(rect);
        let tolerance = HANDLE_HIT_RADIUS / session.scale().max(0.01);
        Handle::all()
            .iter()
            .copied()
            .find(|h| h.position(bounds).distance(pos) <= tolerance)
    }

    /// Click or tap without movement.
    pub fn click<G: AnnotationGateway>(&mut self, session: &mut EditSession<G>, pos: Pos2) {
        let hit = self.hit_test(session, pos);
        session.select(hit.as_deref());
        self.sync_selection(session.selected_id());
    }

    /// Start a drag at an image-space point: a handle of the overlay starts a
    /// resize, a shape starts a move, empty space does nothing.
    pub fn drag_started<G: AnnotationGateway>(&mut self, session: &EditSession<G>, pos: Pos2) {
        if let Some(handle) = self.hit_handle(session, pos) {
            if let Some(rect) = self.attached.as_deref().and_then(|id| session.rectangle(id)) {
                self.gesture = Gesture::Resizing {
                    id: rect.id.clone(),
                    handle,
                    base: rect_bounds(rect),
                    node: NodeState {
                        x: rect.x,
                        y: rect.y,
                        scale_x: 1.0,
                        scale_y: 1.0,
                    },
                };
                return;
            }
        }

        if let Some(id) = self.hit_test(session, pos) {
            self.gesture = Gesture::Moving {
                id,
                offset: Vec2::ZERO,
            };
        }
    }

    /// Pointer moved while dragging. `pos` is the current image-space
    /// pointer, `delta` the image-space movement since the last frame.
    pub fn dragged(&mut self, pos: Pos2, delta: Vec2) {
        match &mut self.gesture {
            Gesture::Idle => {}
            Gesture::Moving { offset, .. } => *offset += delta,
            Gesture::Resizing {
                handle, base, node, ..
            } => {
                let proposed = Rect::from_two_pos(handle.opposite(*base), pos);
                // reject boxes below the minimum and keep the previous one
                if proposed.width() < MIN_RECT_SIZE || proposed.height() < MIN_RECT_SIZE {
                    return;
                }
                *node = NodeState {
                    x: proposed.min.x,
                    y: proposed.min.y,
                    scale_x: proposed.width() / base.width(),
                    scale_y: proposed.height() / base.height(),
                };
            }
        }
    }

    /// Finish the gesture and commit it to the session.
    pub fn drag_stopped<G: AnnotationGateway>(&mut self, session: &mut EditSession<G>) {
        match std::mem::take(&mut self.gesture) {
            Gesture::Idle => {}
            Gesture::Moving { id, offset } => {
                if offset == Vec2::ZERO {
                    return;
                }
                if let Some(rect) = session.rectangle(&id) {
                    let patch = RectanglePatch::moved_to(rect.x + offset.x, rect.y + offset.y);
                    session.update_rectangle(&id, &patch);
                }
            }
            Gesture::Resizing { id, base, node, .. } => {
                // collapse the scale into absolute extents; the node scale
                // goes back to 1 with the gesture
                let patch = RectanglePatch::resized(
                    node.x,
                    node.y,
                    (base.width() * node.scale_x).max(MIN_RECT_SIZE),
                    (base.height() * node.scale_y).max(MIN_RECT_SIZE),
                );
                session.update_rectangle(&id, &patch);
            }
        }
    }

    /// Abort a gesture without touching the session.
    pub fn cancel(&mut self) {
        self.gesture = Gesture::Idle;
    }

    /// Drawable shapes in list order, with any live gesture applied.
    pub fn shapes<G: AnnotationGateway>(&self, session: &EditSession<G>) -> Vec<SceneShape> {
        session
            .rectangles()
            .iter()
            .map(|r| {
                let selected = session.selected_id() == Some(r.id.as_str());
                SceneShape {
                    id: r.id.clone(),
                    rect: self.live_bounds(r),
                    style: ShapeStyle::for_rect(r, selected),
                    selected,
                }
            })
            .collect()
    }

    /// Overlay handle positions (image space) for the attached shape.
    pub fn handles<G: AnnotationGateway>(&self, session: &EditSession<G>) -> Vec<Pos2> {
        let Some(rect) = self.attached.as_deref().and_then(|id| session.rectangle(id)) else {
            return Vec::new();
        };
        let bounds = self.live_bounds(rect);
        Handle::all().iter().map(|h| h.position(bounds)).collect()
    }

    fn live_bounds(&self, rect: &WorkingRectangle) -> Rect {
        match &self.gesture {
            Gesture::Moving { id, offset } if *id == rect.id => rect_bounds(rect).translate(*offset),
            Gesture::Resizing { id, base, node, .. } if *id == rect.id => Rect::from_min_size(
                Pos2::new(node.x, node.y),
                Vec2::new(base.width() * node.scale_x, base.height() * node.scale_y),
            ),
            _ => rect_bounds(rect),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MemoryGateway;
    use crate::model::{Annotation, Coordinates};

    fn session() -> EditSession<MemoryGateway> {
        let stored = Annotation {
            id: "a".to_string(),
            image_id: 1,
            kind: Default::default(),
            coordinates: Coordinates {
                x: Some(10.0),
                y: Some(10.0),
                width: Some(100.0),
                height: Some(50.0),
            },
            color: Some("#00FF00".to_string()),
            created_at: None,
            updated_at: None,
        };
        EditSession::new(1, MemoryGateway::new(), &[stored])
    }

    #[test]
    fn test_style_encodes_state() {
        let mut s = session();
        let plain = ShapeStyle::for_rect(&s.rectangles()[0], false);
        assert_eq!(plain.stroke, Color32::from_rgb(0, 255, 0));
        assert_eq!(plain.stroke_width, 2.0);
        assert!(!plain.dashed);
        assert_eq!(plain.fill.a(), 128);

        s.update_rectangle("a", &RectanglePatch::moved_to(20.0, 10.0));
        let modified = ShapeStyle::for_rect(&s.rectangles()[0], true);
        assert_eq!(modified.stroke, Color32::BLACK);
        assert_eq!(modified.stroke_width, 3.0);
        assert!(modified.dashed);

        let id = s.add_rectangle(None);
        let fresh = ShapeStyle::for_rect(s.rectangle(&id).unwrap(), false);
        assert_eq!(fresh.stroke_width, 3.0);
        assert!(!fresh.dashed);
    }

    #[test]
    fn test_click_selects_and_background_clears() {
        let mut s = session();
        let mut scene = SceneAdapter::new();

        scene.click(&mut s, Pos2::new(50.0, 30.0));
        assert_eq!(s.selected_id(), Some("a"));
        assert_eq!(scene.attached(), Some("a"));

        scene.click(&mut s, Pos2::new(500.0, 500.0));
        assert_eq!(s.selected_id(), None);
        assert_eq!(scene.attached(), None);
    }

    #[test]
    fn test_drag_commits_once_at_end() {
        let mut s = session();
        let mut scene = SceneAdapter::new();

        scene.drag_started(&s, Pos2::new(20.0, 20.0));
        scene.dragged(Pos2::new(25.0, 20.0), Vec2::new(5.0, 0.0));
        scene.dragged(Pos2::new(30.0, 27.0), Vec2::new(5.0, 7.0));
        assert_eq!(s.rectangles()[0].x, 10.0);
        assert_eq!(scene.shapes(&s)[0].rect.min, Pos2::new(20.0, 17.0));

        scene.drag_stopped(&mut s);
        let rect = &s.rectangles()[0];
        assert_eq!((rect.x, rect.y), (20.0, 17.0));
        assert!(s.is_tracked_modified("a"));
        assert_eq!(scene.gesture(), &Gesture::Idle);
    }

    #[test]
    fn test_drag_on_background_does_nothing() {
        let mut s = session();
        let mut scene = SceneAdapter::new();
        scene.drag_started(&s, Pos2::new(400.0, 400.0));
        scene.dragged(Pos2::new(410.0, 400.0), Vec2::new(10.0, 0.0));
        scene.drag_stopped(&mut s);
        assert!(!s.has_unsaved_changes());
    }

    #[test]
    fn test_resize_collapses_scale() {
        let mut s = session();
        let mut scene = SceneAdapter::new();
        scene.click(&mut s, Pos2::new(50.0, 30.0));

        // grab the bottom-right corner at (110, 60) and pull it out
        scene.drag_started(&s, Pos2::new(110.0, 60.0));
        assert!(matches!(
            scene.gesture(),
            Gesture::Resizing {
                handle: Handle::BottomRight,
                ..
            }
        ));
        scene.dragged(Pos2::new(210.0, 110.0), Vec2::new(100.0, 50.0));
        match scene.gesture() {
            Gesture::Resizing { node, .. } => {
                assert_eq!((node.scale_x, node.scale_y), (2.0, 2.0));
            }
            other => panic!("unexpected gesture {:?}", other),
        }

        scene.drag_stopped(&mut s);
        let rect = &s.rectangles()[0];
        assert_eq!((rect.x, rect.y, rect.width, rect.height), (10.0, 10.0, 200.0, 100.0));
    }

    #[test]
    fn test_resize_rejects_tiny_box() {
        let mut s = session();
        let mut scene = SceneAdapter::new();
        scene.click(&mut s, Pos2::new(50.0, 30.0));

        scene.drag_started(&s, Pos2::new(110.0, 60.0));
        scene.dragged(Pos2::new(60.0, 35.0), Vec2::new(-50.0, -25.0));
        scene.dragged(Pos2::new(12.0, 11.0), Vec2::new(-48.0, -24.0));
        scene.drag_stopped(&mut s);

        let rect = &s.rectangles()[0];
        assert_eq!((rect.width, rect.height), (50.0, 25.0));
    }

    #[test]
    fn test_handles_follow_attachment() {
        let mut s = session();
        let mut scene = SceneAdapter::new();
        assert!(scene.handles(&s).is_empty());

        s.select(Some("a"));
        assert!(scene.sync_selection(s.selected_id()));
        assert!(!scene.sync_selection(s.selected_id()));
        let handles = scene.handles(&s);
        assert_eq!(handles.len(), 4);
        assert!(handles.contains(&Pos2::new(110.0, 60.0)));
    }

    #[test]
    fn test_topmost_shape_wins() {
        let mut s = session();
        let id = s.add_rectangle(Some(Pos2::new(60.0, 60.0)));
        let scene = SceneAdapter::new();
        assert_eq!(scene.hit_test(&s, Pos2::new(20.0, 20.0)), Some(id));
    }
}
