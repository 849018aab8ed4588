use eframe::egui::{
    Align2, Color32, FontId, Pos2, Rect, Response, Sense, Shape, Stroke, Ui, Vec2, Widget,
};
use iqpan_engine::axis::{FrequencyAxis, db_gridlines};
use iqpan_messages::{Decibels, Hertz};

const GRID_COLOR: Color32 = Color32::from_gray(60);
const TRACE_COLOR: Color32 = Color32::from_rgb(80, 220, 80);
const LABEL_COLOR: Color32 = Color32::from_gray(160);

/// Level range adjustments move by this much.
const RANGE_STEP_DB: f32 = 10.0;
/// The top of the range never goes above full scale.
const MAX_CEILING_DB: f32 = 0.0;
const MAX_FLOOR_DB: f32 = -130.0;
const MIN_FLOOR_DB: f32 = -140.0;

/// Live spectrum trace with frequency and level graticule.
pub struct SpectrumView {
    axis: FrequencyAxis,
    sp_min: Decibels,
    sp_max: Decibels,
    /// Range from the engine state, restored by reset
    default_range: (Decibels, Decibels),
    trace: Vec<f32>,
}

impl SpectrumView {
    pub fn new() -> Self {
        Self {
            axis: FrequencyAxis::new(2, Hertz(1), false),
            sp_min: Decibels(-120.0),
            sp_max: Decibels(-20.0),
            default_range: (Decibels(-120.0), Decibels(-20.0)),
            trace: Vec::new(),
        }
    }

    pub fn configure(&mut self, axis: FrequencyAxis, sp_min: Decibels, sp_max: Decibels) {
        self.axis = axis;
        self.sp_min = sp_min;
        self.sp_max = sp_max;
        self.default_range = (sp_min, sp_max);
        self.trace.clear();
    }

    pub fn range(&self) -> (Decibels, Decibels) {
        (self.sp_min, self.sp_max)
    }

    pub fn raise_max(&mut self) {
        if self.sp_max.0 < MAX_CEILING_DB {
            self.sp_max.0 += RANGE_STEP_DB;
        }
    }

    pub fn lower_max(&mut self) {
        if self.sp_max.0 > MAX_FLOOR_DB && self.sp_max.0 > self.sp_min.0 + RANGE_STEP_DB {
            self.sp_max.0 -= RANGE_STEP_DB;
        }
    }

    pub fn raise_min(&mut self) {
        if self.sp_min.0 < self.sp_max.0 - RANGE_STEP_DB {
            self.sp_min.0 += RANGE_STEP_DB;
        }
    }

    pub fn lower_min(&mut self) {
        if self.sp_min.0 > MIN_FLOOR_DB {
            self.sp_min.0 -= RANGE_STEP_DB;
        }
    }

    pub fn reset_range(&mut self) {
        (self.sp_min, self.sp_max) = self.default_range;
    }

    /// Buttons for the level range, shown with the other controls.
    pub fn range_controls(&mut self, ui: &mut Ui) {
        ui.heading("Spectrum");
        ui.separator();
        ui.horizontal(|ui| {
            ui.label(format!("Max {:.0} dB", self.sp_max.0));
            if ui.small_button("+10").clicked() {
                self.raise_max();
            }
            if ui.small_button("-10").clicked() {
                self.lower_max();
            }
        });
        ui.horizontal(|ui| {
            ui.label(format!("Min {:.0} dB", self.sp_min.0));
            if ui.small_button("+10").clicked() {
                self.raise_min();
            }
            if ui.small_button("-10").clicked() {
                self.lower_min();
            }
        });
    }

    pub fn set_trace(&mut self, spectrum: Vec<f32>) {
        self.trace = spectrum;
    }

    /// Vertical position of a level, 0.0 at the top and 1.0 at the bottom.
    fn level_fraction(&self, db: f32) -> f32 {
        let span = self.sp_max.0 - self.sp_min.0;
        ((self.sp_max.0 - db) / span).clamp(0.0, 1.0)
    }

    /// Screen points of the trace inside `rect`, one per bin.
    fn trace_points(&self, rect: Rect) -> Vec<Pos2> {
        let bins = self.trace.len();
        if bins < 2 {
            return Vec::new();
        }
        let step = rect.width() / (bins - 1) as f32;
        self.trace
            .iter()
            .enumerate()
            .map(|(bin, &db)| {
                Pos2::new(
                    rect.left() + bin as f32 * step,
                    rect.top() + self.level_fraction(db) * rect.height(),
                )
            })
            .collect()
    }
}

impl Widget for &mut SpectrumView {
    fn ui(self, ui: &mut Ui) -> Response {
        let size = Vec2::new(ui.available_width(), ui.available_height().max(80.0));
        let (response, painter) = ui.allocate_painter(size, Sense::hover());
        let rect = response.rect;
        let grid = Stroke::new(1.0, GRID_COLOR);
        let font = FontId::monospace(10.0);

        for level in db_gridlines(self.sp_min, self.sp_max) {
            let y = rect.top() + self.level_fraction(level.0) * rect.height();
            painter.line_segment([Pos2::new(rect.left(), y), Pos2::new(rect.right(), y)], grid);
            painter.text(
                Pos2::new(rect.left() + 2.0, y - 1.0),
                Align2::LEFT_BOTTOM,
                format!("{:.0}", level.0),
                font.clone(),
                LABEL_COLOR,
            );
        }

        for offset in self.axis.ticks_khz() {
            let x = rect.left() + self.axis.offset_fraction(offset) as f32 * rect.width();
            painter.line_segment([Pos2::new(x, rect.top()), Pos2::new(x, rect.bottom())], grid);
            painter.text(
                Pos2::new(x, rect.bottom() - 1.0),
                Align2::CENTER_BOTTOM,
                format!("{offset:+.0}"),
                font.clone(),
                LABEL_COLOR,
            );
        }

        let points = self.trace_points(rect);
        if !points.is_empty() {
            painter.add(Shape::line(points, Stroke::new(1.5, TRACE_COLOR)));
        }

        response
    }
}
