//! eframe shell around the edit session.

use std::path::PathBuf;
use std::time::Duration;

use eframe::egui;

use crate::color::{to_hex, to_rgb};
use crate::config::EditorConfig;
use crate::error::GatewayError;
use crate::gateway::JsonFileGateway;
use crate::preload::{GateState, LoadedImage, PreloadGate};
use crate::scene::{DASH_PATTERN, HANDLE_SIZE, SceneAdapter, SceneShape};
use crate::session::{EditSession, SyncReport};

/// Zoom change per scrolled point.
const SCROLL_ZOOM_RATE: f32 = 0.002;

/// Older notices are dropped beyond this many.
const MAX_NOTICES: usize = 5;

#[derive(Debug, Clone, PartialEq)]
struct Notice {
    text: String,
    is_error: bool,
}

impl Notice {
    fn info(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }

    fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: true,
        }
    }
}

fn completion_notice(count: usize, one: &str, many: &str) -> Option<Notice> {
    match count {
        0 => None,
        1 => Some(Notice::info(one)),
        n => Some(Notice::info(format!("{} {}", n, many))),
    }
}

/// User-facing notices for the gateway calls finished in one sync.
fn notices_for(report: SyncReport) -> Vec<Notice> {
    let mut notices: Vec<Notice> = [
        completion_notice(
            report.created,
            "New annotation created successfully!",
            "annotations created successfully!",
        ),
        completion_notice(
            report.updated,
            "Annotation updated successfully!",
            "annotations updated successfully!",
        ),
        completion_notice(
            report.deleted,
            "Annotation deleted successfully!",
            "annotations deleted successfully!",
        ),
    ]
    .into_iter()
    .flatten()
    .collect();

    notices.extend(
        report
            .errors
            .iter()
            .map(|e| Notice::error(format!("Annotation store error: {}", e))),
    );
    notices
}

pub struct AnnotateApp {
    image_path: PathBuf,
    config: EditorConfig,

    session: EditSession<JsonFileGateway>,
    scene: SceneAdapter,
    gate: PreloadGate,
    texture: Option<egui::TextureHandle>,

    picker: [u8; 3],
    notices: Vec<Notice>,
    /// Last pointer position inside the canvas, in viewport coordinates.
    last_pointer: Option<egui::Pos2>,
}

impl AnnotateApp {
    pub fn new(image_path: PathBuf, image_id: u64, config: EditorConfig) -> Result<Self, GatewayError> {
        let gateway = JsonFileGateway::for_image(&image_path)?;
        log::info!("Annotations stored in {:?}", gateway.path());

        let mut session = EditSession::new(image_id, gateway, &[])
            .with_color(config.default_color.clone())
            .with_fit_margin(config.fit_margin);
        session.refresh();

        let gate = PreloadGate::start(&image_path);
        let picker = to_rgb(session.selected_color());

        Ok(Self {
            image_path,
            config,
            session,
            scene: SceneAdapter::new(),
            gate,
            texture: None,
            picker,
            notices: Vec::new(),
            last_pointer: None,
        })
    }

    fn load_texture(ctx: &egui::Context, image: &LoadedImage) -> egui::TextureHandle {
        let size = [image.pixels.width() as usize, image.pixels.height() as usize];
        let pixels = image.pixels.as_flat_samples();
        let color_image = egui::ColorImage::from_rgba_unmultiplied(size, pixels.as_slice());
        ctx.load_texture("image", color_image, egui::TextureOptions::LINEAR)
    }

    fn report(&mut self, report: SyncReport) {
        self.notices.extend(notices_for(report));
        let overflow = self.notices.len().saturating_sub(MAX_NOTICES);
        self.notices.drain(..overflow);
    }

    fn handle_shortcuts(&mut self, ctx: &egui::Context) {
        if !self.gate.is_ready() || ctx.wants_keyboard_input() {
            return;
        }
        let (delete, save, add) = ctx.input(|i| {
            (
                i.key_pressed(egui::Key::Delete) || i.key_pressed(egui::Key::Backspace),
                i.modifiers.ctrl && i.key_pressed(egui::Key::S),
                i.modifiers.ctrl && i.key_pressed(egui::Key::N),
            )
        });

        if delete {
            self.scene.cancel();
            self.session.delete_selected();
        }
        if save && self.session.can_save() {
            self.session.save();
        }
        if add {
            self.session.add_rectangle(self.last_pointer);
        }
    }

    fn toolbar(&mut self, ui: &mut egui::Ui) {
        let ready = self.gate.is_ready();
        ui.horizontal(|ui| {
            if ui
                .add_enabled(ready, egui::Button::new("Add Rectangle"))
                .clicked()
            {
                self.session.add_rectangle(None);
            }
            if ui
                .add_enabled(
                    ready && self.session.selected_id().is_some(),
                    egui::Button::new("Delete Selected"),
                )
                .clicked()
            {
                self.scene.cancel();
                self.session.delete_selected();
            }

            ui.separator();
            ui.label("Color:");
            self.picker = to_rgb(self.session.selected_color());
            let picked = ui
                .add_enabled_ui(ready, |ui| ui.color_edit_button_srgb(&mut self.picker))
                .inner;
            if picked.changed() {
                self.session.set_color(to_hex(self.picker));
            }

            ui.separator();
            let label = if self.session.in_flight() > 0 {
                "Saving..."
            } else {
                "Save Changes"
            };
            if ui
                .add_enabled(ready && self.session.can_save(), egui::Button::new(label))
                .clicked()
            {
                self.session.save();
            }

            ui.separator();
            if ui.add_enabled(ready, egui::Button::new("Fit")).clicked() {
                if let GateState::Ready { width, height } = *self.gate.state() {
                    let viewport = self.config.viewport();
                    self.session.compute_fit_transform(
                        width as f32,
                        height as f32,
                        viewport.x,
                        viewport.y,
                    );
                }
            }
            ui.label(format!("Zoom: {:.0}%", self.session.scale() * 100.0));
        });

        ui.horizontal(|ui| {
            ui.label(format!("Image #{}", self.session.image_id()));
            ui.separator();
            ui.label(format!("Total annotations: {}", self.session.rectangles().len()));
            let new_count = self.session.new_count();
            if new_count > 0 {
                ui.colored_label(egui::Color32::from_rgb(46, 125, 50), format!("New: {}", new_count));
            }
            let modified_count = self.session.modified_count();
            if modified_count > 0 {
                ui.colored_label(
                    egui::Color32::from_rgb(237, 108, 2),
                    format!("Modified: {}", modified_count),
                );
            }
        });
    }

    fn side_panel(&mut self, ui: &mut egui::Ui) {
        ui.heading("Annotations");
        ui.separator();

        let rows: Vec<(String, String, bool)> = self
            .session
            .rectangles()
            .iter()
            .map(|r| {
                let state = if r.is_new {
                    " (new)"
                } else if r.is_modified() {
                    " (modified)"
                } else {
                    ""
                };
                let short: String = r.id.chars().take(8).collect();
                let text = format!(
                    "#{} ({}, {}) {} x {}{}",
                    short,
                    r.x.round(),
                    r.y.round(),
                    r.width.round(),
                    r.height.round(),
                    state
                );
                (r.id.clone(), text, self.session.selected_id() == Some(r.id.as_str()))
            })
            .collect();

        if rows.is_empty() {
            ui.label("No annotations found. Add one to get started.");
        }
        egui::ScrollArea::vertical()
            .max_height(ui.available_height() * 0.6)
            .show(ui, |ui| {
                for (id, text, selected) in rows {
                    if ui.selectable_label(selected, text).clicked() {
                        self.session.select(Some(&id));
                    }
                }
            });

        if let Some(rect) = self.session.selected() {
            ui.separator();
            ui.strong("Selected Annotation");
            ui.label(format!(
                "Position: ({}, {}) | Size: {} x {}",
                rect.x.round(),
                rect.y.round(),
                rect.width.round(),
                rect.height.round()
            ));
            if rect.is_new {
                ui.colored_label(egui::Color32::from_rgb(46, 125, 50), "New annotation");
            } else if rect.is_modified() {
                ui.colored_label(
                    egui::Color32::from_rgb(237, 108, 2),
                    "Modified (unsaved changes)",
                );
            } else {
                ui.weak("No changes");
            }
        }
    }

    fn notice_bar(&mut self, ui: &mut egui::Ui) {
        let mut dismissed = None;
        for (i, notice) in self.notices.iter().enumerate() {
            ui.horizontal(|ui| {
                let color = if notice.is_error {
                    egui::Color32::from_rgb(211, 47, 47)
                } else {
                    egui::Color32::from_rgb(46, 125, 50)
                };
                ui.colored_label(color, &notice.text);
                if ui.small_button("Dismiss").clicked() {
                    dismissed = Some(i);
                }
            });
        }
        if let Some(i) = dismissed {
            self.notices.remove(i);
        }
    }

    fn canvas(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        let (response, painter) =
            ui.allocate_painter(self.config.viewport(), egui::Sense::click_and_drag());
        let canvas_rect = response.rect;
        let origin = canvas_rect.min.to_vec2();

        painter.rect_filled(canvas_rect, 0.0, egui::Color32::from_gray(245));

        match self.gate.state() {
            GateState::Loading => {
                painter.rect_filled(
                    canvas_rect.shrink2(canvas_rect.size() * 0.1),
                    4.0,
                    egui::Color32::from_gray(225),
                );
                painter.text(
                    canvas_rect.center(),
                    egui::Align2::CENTER_CENTER,
                    "Loading image...",
                    egui::FontId::proportional(16.0),
                    egui::Color32::from_gray(120),
                );
                return;
            }
            GateState::Failed(message) => {
                painter.text(
                    canvas_rect.center(),
                    egui::Align2::CENTER_CENTER,
                    format!("Could not load {}: {}", self.image_path.display(), message),
                    egui::FontId::proportional(14.0),
                    egui::Color32::from_rgb(211, 47, 47),
                );
                return;
            }
            GateState::Ready { .. } => {}
        }

        let transform = self.session.transform();
        let to_screen = |p: egui::Pos2| transform.image_to_viewport(p) + origin;
        let to_image = |p: egui::Pos2| transform.viewport_to_image(p - origin);

        // Draw image
        if let (Some(tex), GateState::Ready { width, height }) = (&self.texture, self.gate.state()) {
            let img_rect = egui::Rect::from_min_max(
                to_screen(egui::Pos2::ZERO),
                to_screen(egui::pos2(*width as f32, *height as f32)),
            );
            painter.image(
                tex.id(),
                img_rect,
                egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                egui::Color32::WHITE,
            );
        }

        // Draw rectangles
        for shape in self.scene.shapes(&self.session) {
            draw_shape(&painter, &shape, transform.scale, to_screen);
        }
        for handle in self.scene.handles(&self.session) {
            let r = egui::Rect::from_center_size(to_screen(handle), egui::vec2(HANDLE_SIZE, HANDLE_SIZE));
            painter.rect_filled(r, 1.0, egui::Color32::WHITE);
            painter.rect_stroke(
                r,
                1.0,
                egui::Stroke::new(1.0, egui::Color32::from_rgb(0, 120, 255)),
                egui::StrokeKind::Middle,
            );
        }

        self.last_pointer = response.hover_pos().map(|p| p - origin);

        // Handle pan (middle mouse button)
        let (middle_down, pointer_delta, scroll_delta) = ctx.input(|i| {
            (
                i.pointer.middle_down(),
                i.pointer.delta(),
                i.smooth_scroll_delta.y,
            )
        });
        if middle_down && response.hovered() {
            self.session.set_transform(transform.pan_by(pointer_delta));
        }

        // Handle zoom (scroll wheel)
        if scroll_delta != 0.0 && response.hovered() {
            if let Some(cursor) = response.hover_pos() {
                let factor = 1.0 + scroll_delta * SCROLL_ZOOM_RATE;
                let new_scale =
                    (transform.scale * factor).clamp(self.config.min_zoom, self.config.max_zoom);
                self.session
                    .set_transform(transform.zoom_to_cursor(new_scale, cursor - origin));
            }
        }

        // Select / move / resize (primary button only)
        if response.clicked() {
            if let Some(pos) = response.interact_pointer_pos() {
                self.scene.click(&mut self.session, to_image(pos));
            }
        }
        if response.drag_started_by(egui::PointerButton::Primary) {
            let start = ctx
                .input(|i| i.pointer.press_origin())
                .or(response.interact_pointer_pos());
            if let Some(pos) = start {
                self.scene.drag_started(&self.session, to_image(pos));
            }
        }
        if response.dragged_by(egui::PointerButton::Primary) {
            if let Some(pos) = response.interact_pointer_pos() {
                self.scene
                    .dragged(to_image(pos), response.drag_delta() / transform.scale);
            }
        }
        if response.drag_stopped_by(egui::PointerButton::Primary) {
            self.scene.drag_stopped(&mut self.session);
        }
    }
}

fn draw_shape(
    painter: &egui::Painter,
    shape: &SceneShape,
    scale: f32,
    to_screen: impl Fn(egui::Pos2) -> egui::Pos2,
) {
    let rect = egui::Rect::from_min_max(to_screen(shape.rect.min), to_screen(shape.rect.max));
    let stroke = egui::Stroke::new(shape.style.stroke_width * scale, shape.style.stroke);

    painter.rect_filled(rect, 0.0, shape.style.fill);
    if shape.style.dashed {
        let outline = [
            rect.left_top(),
            rect.right_top(),
            rect.right_bottom(),
            rect.left_bottom(),
            rect.left_top(),
        ];
        let (dash, gap) = DASH_PATTERN;
        painter.extend(egui::Shape::dashed_line(&outline, stroke, dash, gap));
    } else {
        painter.rect_stroke(rect, 0.0, stroke, egui::StrokeKind::Middle);
    }
}

// ── eframe App impl ────────────────────────────────────────────────────────

impl eframe::App for AnnotateApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let report = self.session.sync();
        self.report(report);

        if let Some(image) = self.gate.poll(&mut self.session, self.config.viewport()) {
            self.texture = Some(Self::load_texture(ctx, &image));
        }
        if self.session.in_flight() > 0 || matches!(self.gate.state(), GateState::Loading) {
            ctx.request_repaint_after(Duration::from_millis(50));
        }

        self.handle_shortcuts(ctx);

        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| {
            self.toolbar(ui);
        });

        if !self.notices.is_empty() {
            egui::TopBottomPanel::bottom("notices").show(ctx, |ui| {
                self.notice_bar(ui);
            });
        }

        egui::SidePanel::right("annotation_list")
            .default_width(280.0)
            .show(ctx, |ui| {
                self.side_panel(ui);
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            self.canvas(ui, ctx);
        });

        // selection may have changed from the list, the keyboard or the canvas
        self.scene.sync_selection(self.session.selected_id());
    }
}
