use std::collections::VecDeque;

use eframe::egui::{ColorImage, Image, Response, TextureHandle, TextureOptions, Ui, Widget};
use iqpan_messages::WaterfallLine;

/// Waterfall display widget that renders the scrolling history.
///
/// Rows arrive already palette-mapped from the engine; the newest row is drawn
/// on top. The `needs_gpu_upload` flag tracks whether the texture needs to be
/// re-uploaded, so frames without new rows reuse the cached texture.
pub struct Waterfall {
    /// Newest row first
    rows: VecDeque<Vec<[u8; 3]>>,
    width: usize,
    capacity: usize,
    needs_gpu_upload: bool,
    /// Cached texture handle to avoid re-uploading on every frame
    texture: Option<TextureHandle>,
}

impl Waterfall {
    pub fn new() -> Self {
        Self {
            rows: VecDeque::new(),
            width: 0,
            capacity: 0,
            needs_gpu_upload: false,
            texture: None,
        }
    }

    /// Set the row width and depth from the engine state, dropping old rows.
    pub fn configure(&mut self, width: usize, capacity: usize) {
        self.width = width;
        self.capacity = capacity;
        self.rows.clear();
        self.needs_gpu_upload = true;
    }

    pub fn rows(&self) -> usize {
        self.rows.len()
    }

    /// Insert a new row at the top of the waterfall.
    pub fn insert_line(&mut self, line: &WaterfallLine) {
        if line.pixels.is_empty() {
            return;
        }
        if line.pixels.len() != self.width {
            // First line before a snapshot, or a resized engine
            self.width = line.pixels.len();
            self.rows.clear();
        }
        self.rows.push_front(line.pixels.clone());
        if self.capacity > 0 {
            self.rows.truncate(self.capacity);
        }
        self.needs_gpu_upload = true;
    }

    /// Replace every row, after the engine re-rendered its history.
    pub fn replace_history(&mut self, lines: &[WaterfallLine]) {
        self.rows.clear();
        for line in lines.iter().rev() {
            self.insert_line(line);
        }
        self.needs_gpu_upload = true;
    }

    fn image(&self) -> ColorImage {
        let rgb: Vec<u8> = self.rows.iter().flatten().flatten().copied().collect();
        ColorImage::from_rgb([self.width, self.rows.len()], &rgb)
    }
}

impl Widget for &mut Waterfall {
    fn ui(self, ui: &mut Ui) -> Response {
        if self.rows.is_empty() {
            ui.label("Waiting for waterfall data...");
            return ui.response();
        }

        if self.needs_gpu_upload {
            let image = self.image();
            match &mut self.texture {
                Some(texture) => texture.set(image, TextureOptions::NEAREST),
                None => {
                    self.texture =
                        Some(ui.ctx().load_texture("waterfall", image, TextureOptions::NEAREST));
                }
            }
            self.needs_gpu_upload = false;
        }

        if let Some(texture) = &self.texture {
            let available_size = ui.available_size();
            ui.add(Image::new(texture).fit_to_exact_size(available_size));
        }

        ui.response()
    }
}
