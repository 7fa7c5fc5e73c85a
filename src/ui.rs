// ui.rs: egui overlay (menu bar, status bar, error banner)

use panorama_renderer::i18n::{tr, tr_with, LANGUAGES};
use panorama_renderer::panorama::ViewMode;
use panorama_renderer::renderer::{GpuContext, RenderStats};
use std::path::{Path, PathBuf};
use winit::window::Window;

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "webp"];

/// Requests from the overlay, applied by the event loop.
#[derive(Debug, Clone, PartialEq)]
pub enum UiAction {
    OpenImage(PathBuf),
    OpenCube(Vec<PathBuf>),
    SetMode(ViewMode),
    GoToScene(String),
    SetLanguage(String),
    ResetView,
    ToggleFullscreen,
    Exit,
}

/// What the overlay shows; owned by the event loop.
#[derive(Debug, Default)]
pub struct UiState {
    pub mode: ViewMode,
    pub lang: String,
    pub fullscreen: bool,
    pub loading: bool,
    pub has_image: bool,
    pub show_fps: bool,
    pub show_stats: bool,
    pub fps: f32,
    pub yaw: f64,
    pub pitch: f64,
    pub hfov: f64,
    pub stats: Option<RenderStats>,
    pub title: Option<String>,
    pub author: Option<String>,
    /// Scene ids of the loaded tour, with the current one.
    pub scenes: Vec<String>,
    pub current_scene: Option<String>,
    pub error: Option<String>,
}

/// egui context, winit glue and the wgpu painter.
pub struct Overlay {
    pub ctx: egui::Context,
    state: egui_winit::State,
    renderer: egui_wgpu::Renderer,
}

impl Overlay {
    pub fn new(window: &Window, gpu: &GpuContext) -> Self {
        let ctx = egui::Context::default();
        setup_fonts(&ctx);

        let mut state = egui_winit::State::new(window);
        state.set_pixels_per_point(window.scale_factor() as f32);

        let renderer = egui_wgpu::Renderer::new(&gpu.device, gpu.format(), None, 1);
        Self { ctx, state, renderer }
    }

    /// Whether egui used the event (pointer over a menu, text input ...).
    pub fn on_event(&mut self, event: &winit::event::WindowEvent<'_>) -> bool {
        self.state.on_event(&self.ctx, event).consumed
    }

    /// Runs the UI and paints it on top of `view`.
    pub fn encode(
        &mut self,
        window: &Window,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        view: &wgpu::TextureView,
        ui: &mut UiState,
    ) -> Vec<UiAction> {
        let mut actions = Vec::new();
        let raw_input = self.state.take_egui_input(window);
        let full_output = self.ctx.run(raw_input, |ctx| draw(ctx, ui, &mut actions));

        self.state
            .handle_platform_output(window, &self.ctx, full_output.platform_output);
        let clipped_primitives = self.ctx.tessellate(full_output.shapes);

        let screen_descriptor = egui_wgpu::renderer::ScreenDescriptor {
            size_in_pixels: [gpu.config.width, gpu.config.height],
            pixels_per_point: window.scale_factor() as f32,
        };

        for (id, delta) in &full_output.textures_delta.set {
            self.renderer
                .update_texture(&gpu.device, &gpu.queue, *id, delta);
        }
        self.renderer.update_buffers(
            &gpu.device,
            &gpu.queue,
            encoder,
            &clipped_primitives,
            &screen_descriptor,
        );

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Egui Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: true,
                    },
                })],
                depth_stencil_attachment: None,
            });
            self.renderer
                .render(&mut render_pass, &clipped_primitives, &screen_descriptor);
        }

        for id in &full_output.textures_delta.free {
            self.renderer.free_texture(id);
        }
        actions
    }
}

fn pick_images(multiple: bool) -> Option<Vec<PathBuf>> {
    let dialog = rfd::FileDialog::new().add_filter(&tr("file.filter.images"), &IMAGE_EXTENSIONS);
    if multiple {
        dialog.pick_files()
    } else {
        dialog.pick_file().map(|p| vec![p])
    }
}

/// File dialog for a single equirectangular image.
pub fn pick_image() -> Option<PathBuf> {
    pick_images(false).and_then(|v| v.into_iter().next())
}

fn draw(ctx: &egui::Context, ui_state: &mut UiState, actions: &mut Vec<UiAction>) {
    egui::TopBottomPanel::top("menu_bar").show(ctx, |ui| {
        egui::menu::bar(ui, |ui| {
            ui.menu_button(tr("menu.file"), |ui| {
                if ui.button(tr("menu.open_image")).clicked() {
                    ui.close_menu();
                    if let Some(path) = pick_image() {
                        actions.push(UiAction::OpenImage(path));
                    }
                }
                if ui.button(tr("menu.open_cube")).clicked() {
                    ui.close_menu();
                    if let Some(paths) = pick_images(true) {
                        actions.push(UiAction::OpenCube(paths));
                    }
                }
                ui.separator();
                if ui.button(tr("menu.exit")).clicked() {
                    actions.push(UiAction::Exit);
                }
            });

            ui.menu_button(tr("menu.view"), |ui| {
                if ui.button(tr("view.reset")).clicked() {
                    actions.push(UiAction::ResetView);
                    ui.close_menu();
                }
                let fullscreen = if ui_state.fullscreen {
                    tr("view.fullscreen.exit")
                } else {
                    tr("view.fullscreen.enter")
                };
                if ui.button(fullscreen).clicked() {
                    actions.push(UiAction::ToggleFullscreen);
                    ui.close_menu();
                }

                ui.separator();
                ui.menu_button(tr("view.render_mode"), |ui| {
                    let mut mode = ui_state.mode;
                    let raycast = ui.radio_value(&mut mode, ViewMode::RayCast, tr("mode.raycast"));
                    let sphere = ui.radio_value(&mut mode, ViewMode::Sphere, tr("mode.sphere"));
                    if raycast.clicked() || sphere.clicked() {
                        if mode != ui_state.mode {
                            actions.push(UiAction::SetMode(mode));
                        }
                        ui.close_menu();
                    }
                });

                ui.separator();
                if ui.checkbox(&mut ui_state.show_fps, tr("view.show_fps")).clicked() {
                    ui.close_menu();
                }
                if ui.checkbox(&mut ui_state.show_stats, tr("view.show_stats")).clicked() {
                    ui.close_menu();
                }
            });

            if !ui_state.scenes.is_empty() {
                ui.menu_button(tr("menu.scenes"), |ui| {
                    for id in &ui_state.scenes {
                        let current = ui_state.current_scene.as_deref() == Some(id.as_str());
                        if ui.radio(current, id).clicked() && !current {
                            actions.push(UiAction::GoToScene(id.clone()));
                            ui.close_menu();
                        }
                    }
                });
            }

            ui.menu_button(tr("menu.language"), |ui| {
                for (code, name) in LANGUAGES {
                    if ui.radio(ui_state.lang == code, name).clicked() {
                        actions.push(UiAction::SetLanguage(code.to_string()));
                        ui.close_menu();
                    }
                }
            });
        });
    });

    if !ui_state.has_image && !ui_state.loading {
        egui::Area::new("click_to_load")
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                if ui.button(tr("TEXT_CLICK_TO_LOAD")).clicked() {
                    if let Some(path) = pick_image() {
                        actions.push(UiAction::OpenImage(path));
                    }
                }
            });
    }

    if let Some(err) = &ui_state.error {
        egui::TopBottomPanel::top("error_banner").show(ctx, |ui| {
            ui.label(egui::RichText::new(err).color(egui::Color32::LIGHT_RED));
        });
    }

    egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
        ui.horizontal(|ui| {
            if ui_state.loading {
                ui.label(egui::RichText::new(tr("status.loading_image")).color(egui::Color32::YELLOW));
                ui.label("|");
            }
            if let Some(title) = &ui_state.title {
                match &ui_state.author {
                    Some(author) => ui.label(format!("{title} {} {author}", tr("TEXT_BY"))),
                    None => ui.label(title),
                };
                ui.label("|");
            }

            let mode = match ui_state.mode {
                ViewMode::RayCast => tr("mode.raycast"),
                ViewMode::Sphere => tr("mode.sphere"),
            };
            ui.label(format!("{} {mode}", tr("status.mode_prefix")));
            ui.label("|");
            ui.label(format!("HFOV: {:.1}°", ui_state.hfov));
            ui.label("|");
            ui.label(format!("Yaw: {:.1}°", ui_state.yaw));
            ui.label("|");
            ui.label(format!("Pitch: {:.1}°", ui_state.pitch));

            if ui_state.show_stats {
                if let Some(stats) = ui_state.stats {
                    ui.label("|");
                    ui.label(tr_with(
                        "status.stats",
                        &[
                            ("calls", stats.draw_calls.to_string()),
                            ("faces", stats.faces.to_string()),
                            ("vertices", stats.vertices.to_string()),
                        ],
                    ));
                }
            }
            if ui_state.show_fps {
                ui.label("|");
                ui.label(egui::RichText::new(format!("FPS: {:.1}", ui_state.fps)).color(egui::Color32::GREEN));
            }
        });
    });
}

/// Font with wide glyph coverage (CJK, Cyrillic) for the UI, if one is
/// installed; egui's built-in font otherwise.
fn setup_fonts(ctx: &egui::Context) {
    let Some((path, bytes)) = font_candidates()
        .into_iter()
        .find_map(|p| load_font(&p).map(|b| (p, b)))
    else {
        log::info!("{}", tr("font.not_found"));
        return;
    };
    log::info!("{}", tr_with("font.using", &[("path", path.display().to_string())]));

    let mut fonts = egui::FontDefinitions::default();
    fonts
        .font_data
        .insert("ui".to_owned(), egui::FontData::from_owned(bytes));
    for family in [egui::FontFamily::Proportional, egui::FontFamily::Monospace] {
        if let Some(list) = fonts.families.get_mut(&family) {
            list.insert(0, "ui".to_owned());
        }
    }
    ctx.set_fonts(fonts);
}

fn load_font(path: &Path) -> Option<Vec<u8>> {
    let bytes = std::fs::read(path).ok()?;
    // ab_glyph rejects some .ttc collections; skip those.
    ab_glyph::FontArc::try_from_vec(bytes.clone()).ok()?;
    Some(bytes)
}

fn font_candidates() -> Vec<PathBuf> {
    let mut candidates: Vec<PathBuf> = Vec::new();

    if cfg!(windows) {
        let dir = PathBuf::from(r"C:\Windows\Fonts");
        for f in ["segoeui.ttf", "arial.ttf", "msyh.ttf", "malgun.ttf", "arialuni.ttf"] {
            candidates.push(dir.join(f));
        }
    } else if cfg!(target_os = "macos") {
        for f in [
            "/System/Library/Fonts/Helvetica.ttc",
            "/System/Library/Fonts/Supplemental/Arial Unicode.ttf",
            "/System/Library/Fonts/Supplemental/Arial.ttf",
            "/Library/Fonts/NotoSans-Regular.ttf",
        ] {
            candidates.push(PathBuf::from(f));
        }
    } else if cfg!(unix) {
        for f in [
            "/usr/share/fonts/truetype/noto/NotoSans-Regular.ttf",
            "/usr/share/fonts/opentype/noto/NotoSans-Regular.otf",
            "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
            "/usr/share/fonts/TTF/DejaVuSans.ttf",
            "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
        ] {
            candidates.push(PathBuf::from(f));
        }
        if let Ok(home) = std::env::var("HOME") {
            let home = PathBuf::from(home);
            candidates.push(home.join(".local/share/fonts/NotoSans-Regular.ttf"));
            candidates.push(home.join(".fonts/NotoSans-Regular.ttf"));
        }
    }

    // Fonts shipped next to the binary or in the working directory.
    let bundled = ["NotoSans-Regular.ttf", "NotoSans-Regular.otf"];
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            candidates.extend(bundled.iter().map(|f| dir.join("assets").join(f)));
        }
    }
    candidates.extend(bundled.iter().map(|f| PathBuf::from("assets").join(f)));
    candidates
}
