use eframe::egui::{ComboBox, DragValue, Response, Ui, Widget};
use flume::Sender;

use iqpan_messages::{Command, Decibels, EngineState, PaletteId};

/// Narrowest waterfall range the controls allow, in dB.
const MIN_SPAN_DB: f32 = 20.0;

/// Control panel widget for the waterfall palette and intensity range.
pub struct ControlPanel {
    cmd_tx: Sender<Command>,
    palette: PaletteId,
    v_min: f32,
    v_max: f32,
    /// Range from the engine state, restored by Reset
    default_range: (f32, f32),
}

impl ControlPanel {
    pub fn new(cmd_tx: Sender<Command>) -> Self {
        Self {
            cmd_tx,
            palette: PaletteId::default(),
            v_min: -120.0,
            v_max: -20.0,
            default_range: (-120.0, -20.0),
        }
    }

    /// Update from engine state snapshot.
    pub fn update_from_engine_state(&mut self, state: &EngineState) {
        self.palette = state.palette;
        self.v_min = state.v_min.0;
        self.v_max = state.v_max.0;
        self.default_range = (state.v_min.0, state.v_max.0);
    }

    fn send(&self, command: Command) {
        // A closed channel means the engine is already gone
        let _ = self.cmd_tx.send(command);
    }

    fn select_palette(&mut self, palette: PaletteId) {
        if palette != self.palette {
            self.palette = palette;
            self.send(Command::SetPalette(palette));
        }
    }

    /// Push the range to the engine, keeping the minimum span.
    fn range_changed(&mut self, moved_min: bool) {
        if self.v_max - self.v_min < MIN_SPAN_DB {
            if moved_min {
                self.v_min = self.v_max - MIN_SPAN_DB;
            } else {
                self.v_max = self.v_min + MIN_SPAN_DB;
            }
        }
        self.send(Command::SetWaterfallRange {
            v_min: Decibels(self.v_min),
            v_max: Decibels(self.v_max),
        });
    }

    pub fn reset_range(&mut self) {
        (self.v_min, self.v_max) = self.default_range;
        self.send(Command::ResetWaterfallRange);
    }
}

impl Widget for &mut ControlPanel {
    fn ui(self, ui: &mut Ui) -> Response {
        ui.heading("Waterfall");
        ui.separator();

        let current = self.palette;
        ComboBox::from_label("Palette")
            .selected_text(current.label())
            .show_ui(ui, |ui| {
                for palette in [PaletteId::Stepped, PaletteId::Rainbow] {
                    if ui.selectable_label(current == palette, palette.label()).clicked() {
                        self.select_palette(palette);
                    }
                }
            });

        ui.add_space(10.0);

        ui.horizontal(|ui| {
            ui.label("Max:");
            if ui
                .add(DragValue::new(&mut self.v_max).speed(1.0).suffix(" dB"))
                .changed()
            {
                self.range_changed(false);
            }
        });
        ui.horizontal(|ui| {
            ui.label("Min:");
            if ui
                .add(DragValue::new(&mut self.v_min).speed(1.0).suffix(" dB"))
                .changed()
            {
                self.range_changed(true);
            }
        });

        ui.add_space(10.0);
        ui.separator();

        if ui.button("Reset range").clicked() {
            self.reset_range();
        }

        ui.response()
    }
}
