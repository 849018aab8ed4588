mod control_panel;
mod spectrum;
mod state;
mod waterfall;

use eframe::egui::{self, Color32, Key, RichText, ViewportCommand};
use iqpan_messages::{Command, Event};
use state::{SourceStatus, UiState};

/// Keys with a shortcut in [`UiState::handle_key`].
const SHORTCUT_KEYS: [Key; 5] = [Key::U, Key::L, Key::R, Key::ArrowLeft, Key::ArrowRight];

/// Main application struct implementing the egui App trait.
pub struct IqPanApp {
    /// Receiver for events from engine
    event_rx: flume::Receiver<Event>,

    /// Local application state
    state: UiState,
}

impl IqPanApp {
    fn new(event_rx: flume::Receiver<Event>, cmd_tx: flume::Sender<Command>) -> Self {
        Self {
            event_rx,
            state: UiState::new(cmd_tx),
        }
    }

    fn handle_keys(&mut self, ctx: &egui::Context) {
        // Keys typed into a control are not shortcuts
        if ctx.memory(|memory| memory.focused().is_some()) {
            return;
        }
        let (pressed, shift) = ctx.input(|input| {
            let pressed: Vec<Key> = SHORTCUT_KEYS
                .into_iter()
                .filter(|key| input.key_pressed(*key))
                .collect();
            (pressed, input.modifiers.shift)
        });
        for key in pressed {
            self.state.handle_key(key, shift);
        }
    }

    fn status_bar(&self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            let frequency = self.state.frequency_text();
            if self.state.rig.display_frequency().is_some() {
                ui.label(RichText::new(frequency).monospace().strong());
            } else {
                ui.label(RichText::new(frequency).monospace().color(Color32::GRAY));
            }

            ui.separator();
            match &self.state.source_status {
                SourceStatus::Running => {}
                SourceStatus::NoSignal(reason) => {
                    ui.colored_label(Color32::RED, format!("no signal: {reason}"));
                }
                SourceStatus::EndOfStream => {
                    ui.colored_label(Color32::YELLOW, "end of stream");
                }
            }
            if self.state.clipping {
                ui.colored_label(Color32::RED, "CLIP");
            }
        });
    }
}

impl eframe::App for IqPanApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // Pull every pending event; only the newest frame is drawn
        while let Ok(event) = self.event_rx.try_recv() {
            if let Event::StateSnapshot(state) = &event {
                ctx.send_viewport_cmd(ViewportCommand::Title(state.ident.clone()));
            }
            self.state.handle_event(event);
        }

        self.handle_keys(ctx);
        ctx.request_repaint();

        egui::TopBottomPanel::top("status_bar").show(ctx, |ui| {
            self.status_bar(ui);
        });

        egui::TopBottomPanel::bottom("diagnostics").show(ctx, |ui| {
            ui.label(RichText::new(self.state.diagnostics_text()).monospace().small());
        });

        // Right side panel for controls
        egui::SidePanel::right("control_panel")
            .default_width(200.0)
            .show(ctx, |ui| {
                ui.add(&mut self.state.control_panel);
                ui.add_space(10.0);
                self.state.spectrum.range_controls(ui);
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            if self.state.engine_state.is_none() {
                ui.centered_and_justified(|ui| {
                    ui.label("Waiting for engine connection...");
                });
                return;
            }

            let spectrum_height = ui.available_height() * 0.35;
            ui.allocate_ui(egui::vec2(ui.available_width(), spectrum_height), |ui| {
                ui.add(&mut self.state.spectrum);
            });
            ui.separator();
            ui.add(&mut self.state.waterfall);
        });
    }
}

/// Entry point for the UI module.
///
/// Runs the eframe application on the main thread (blocking).
pub fn run(event_rx: flume::Receiver<Event>, cmd_tx: flume::Sender<Command>) -> anyhow::Result<()> {
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1024.0, 768.0])
            .with_title("iqpan"),
        ..Default::default()
    };

    eframe::run_native(
        "iqpan",
        options,
        Box::new(|_cc| Ok(Box::new(IqPanApp::new(event_rx, cmd_tx)))),
    )
    .map_err(|e| anyhow::anyhow!("{}", e))?;

    Ok(())
}
