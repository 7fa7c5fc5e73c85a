// main.rs: desktop panorama viewer (winit event loop, background image loading, egui overlay)

#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")] // 在 Release 模式下隐藏控制台窗口

mod ui;

use panorama_renderer::config::{PanoramaSource, SceneConfig, SceneOptions, ViewerConfig};
use panorama_renderer::error::{RenderError, UserFacing};
use panorama_renderer::geometry::build_sphere;
use panorama_renderer::i18n::{self, tr, tr_with};
use panorama_renderer::material::{MeshBasicMaterial, Texture};
use panorama_renderer::panorama::{infer_extents, RenderScheduler, ViewMode, ViewState, SPHERE_RADIUS};
use panorama_renderer::projection::ImageType;
use panorama_renderer::renderer::{GpuContext, PanoramaImage, PanoramaRenderer, SceneRenderer, WgpuBackend};
use panorama_renderer::scene::{Camera, Mesh, NodeId, Scene, Transformable3D};
use ui::{Overlay, UiAction, UiState};

use winit::{
    dpi::{LogicalSize, PhysicalPosition, PhysicalSize},
    event::*,
    event_loop::{ControlFlow, EventLoop},
    window::{Fullscreen, Window, WindowBuilder},
};

use image::io::Reader as ImageReader;
use image::{GenericImageView, RgbaImage};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

/// Command line, minus `--lang` (read by [`i18n::resolve_lang`]).
#[derive(Debug, Default, PartialEq)]
struct Args {
    config: Option<PathBuf>,
    mode: ViewMode,
    image_type: ImageType,
    paths: Vec<PathBuf>,
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Args {
    let mut out = Args::default();
    let mut it = args.into_iter().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--lang" => {
                it.next();
            }
            "--config" => out.config = it.next().map(PathBuf::from),
            "--mode" => match it.next().as_deref() {
                Some("raycast") => out.mode = ViewMode::RayCast,
                Some("sphere") => out.mode = ViewMode::Sphere,
                other => log::warn!("unknown render mode {other:?}"),
            },
            "--type" => match it.next().map(|t| t.parse::<ImageType>()) {
                Some(Ok(t)) => out.image_type = t,
                Some(Err(e)) => log::warn!("{e}"),
                None => log::warn!("--type needs a value"),
            },
            flag if flag.starts_with("--") => log::warn!("ignoring unknown option {flag}"),
            path => out.paths.push(PathBuf::from(path)),
        }
    }
    out
}

struct Loaded {
    generation: u64,
    image: PanoramaImage,
}

type LoadResult = Result<Loaded, String>;

fn decode_image(path: &Path) -> Result<RgbaImage, String> {
    log::info!(
        "{}",
        tr_with("log.loading_image_bg", &[("path", path.display().to_string())])
    );

    let file = File::open(path).map_err(|e| tr_with("error.open_file", &[("err", e.to_string())]))?;
    let img = ImageReader::new(BufReader::new(file))
        .with_guessed_format()
        .map_err(image::ImageError::IoError)
        .and_then(|mut r| {
            r.no_limits();
            r.decode()
        })
        .map_err(|e| tr_with("error.decode_image", &[("err", e.to_string())]))?;

    let (w, h) = img.dimensions();
    log::info!(
        "{}",
        tr_with("log.image_loaded_size", &[("w", w.to_string()), ("h", h.to_string())])
    );
    Ok(img.to_rgba8())
}

fn start_load_image(source: PanoramaSource, generation: u64, tx: Sender<LoadResult>) {
    thread::spawn(move || {
        let image = match source {
            PanoramaSource::Equirectangular(path) => {
                decode_image(&path).map(|img| PanoramaImage::Equirectangular(Arc::new(img)))
            }
            PanoramaSource::CubeMap(paths) => paths
                .iter()
                .map(|p| decode_image(p).map(Arc::new))
                .collect::<Result<Vec<_>, _>>()
                .and_then(|faces| {
                    <[Arc<RgbaImage>; 6]>::try_from(faces)
                        .map(PanoramaImage::CubeMap)
                        .map_err(|_| tr("ERROR_NO_PANORAMA"))
                }),
        };
        if let Err(msg) = &image {
            log::error!("{msg}");
        }
        if tx.send(image.map(|image| Loaded { generation, image })).is_err() {
            log::warn!("{}", tr("error.send_to_main_failed"));
        }
    });
}

/// Textured inverted sphere drawn through the scene-graph renderer.
struct SpherePath {
    renderer: SceneRenderer<WgpuBackend>,
    scene: Scene,
    camera: Camera,
    mesh: NodeId,
}

impl SpherePath {
    fn new(gpu: &GpuContext) -> Result<Self, RenderError> {
        let backend = WgpuBackend::new(gpu.device.clone(), gpu.queue.clone(), gpu.format());
        let mut renderer = SceneRenderer::new(backend);
        renderer.set_size(gpu.size.width, gpu.size.height);

        let mut mesh = Mesh::new(build_sphere(SPHERE_RADIUS, 60, 40), MeshBasicMaterial::default());
        mesh.object3d_mut().scale_mut().x = -1.0;
        // Hidden until a texture arrives.
        mesh.object3d_mut().visible = false;

        let mut scene = Scene::new();
        let mesh = scene.add_object(mesh);
        let camera = Camera::new(70.0, gpu.aspect(), 1.0, 1100.0)?;
        Ok(Self {
            renderer,
            scene,
            camera,
            mesh,
        })
    }

    fn set_image(&mut self, image: Arc<RgbaImage>) {
        let Some(mesh) = self.scene.mesh_mut(self.mesh) else {
            return;
        };
        let old = mesh
            .materials
            .first()
            .and_then(|m| m.map.as_ref())
            .map(|t| t.id());
        if let Some(material) = mesh.materials.first_mut() {
            material.map = Some(Texture::new(image));
        }
        mesh.object3d_mut().visible = true;
        if let Some(old) = old {
            self.renderer.dispose_texture(old);
        }
    }

    fn set_size(&mut self, width: u32, height: u32) {
        self.renderer.set_size(width, height);
    }

    /// Records the frame; the scene renderer's own errors (texture too big,
    /// program failures) are returned separately from the frame result.
    fn render(
        &mut self,
        view: &ViewState,
        aspect: f64,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
    ) -> Result<Vec<RenderError>, RenderError> {
        self.camera.fov = view.hfov;
        self.camera.aspect = aspect;
        self.camera.update_projection_matrix()?;
        self.camera.target = view.sphere_target();

        let result = self.renderer.render(&mut self.scene, &mut self.camera, false);
        // Flush even on failure so the next frame starts from an empty queue.
        self.renderer.backend_mut().encode(encoder, target);
        result?;
        Ok(self.renderer.take_errors())
    }
}

struct FpsCounter {
    last: Instant,
    frames: u32,
    fps: f32,
}

impl FpsCounter {
    fn tick(&mut self) -> f32 {
        self.frames += 1;
        let now = Instant::now();
        let elapsed = now.duration_since(self.last).as_secs_f32();
        if elapsed >= 1.0 {
            self.fps = self.frames as f32 / elapsed;
            self.frames = 0;
            self.last = now;
        }
        self.fps
    }
}

struct Viewer {
    window: Arc<Window>,
    gpu: GpuContext,
    overlay: Overlay,
    ui: UiState,
    panorama: PanoramaRenderer,
    sphere: Option<SpherePath>,
    config: ViewerConfig,
    scene: Option<SceneConfig>,
    image: Option<PanoramaImage>,
    view: ViewState,
    scheduler: RenderScheduler,
    cursor: PhysicalPosition<f64>,
    tx: Sender<LoadResult>,
    rx: Receiver<LoadResult>,
    generation: u64,
    fps: FpsCounter,
}

impl Viewer {
    fn new(window: Arc<Window>, gpu: GpuContext, lang: String) -> Self {
        let overlay = Overlay::new(&window, &gpu);
        let mut panorama = PanoramaRenderer::new(gpu.device.clone(), gpu.queue.clone(), gpu.format());
        panorama.set_canvas(gpu.size.width, gpu.size.height);
        let (tx, rx) = channel();

        Self {
            window,
            gpu,
            overlay,
            ui: UiState {
                lang,
                ..Default::default()
            },
            panorama,
            sphere: None,
            config: ViewerConfig::default(),
            scene: None,
            image: None,
            view: ViewState::new(0.0, 0.0, 100.0, default_bounds()),
            scheduler: RenderScheduler::new(Instant::now()),
            cursor: PhysicalPosition::new(0.0, 0.0),
            tx,
            rx,
            generation: 0,
            fps: FpsCounter {
                last: Instant::now(),
                frames: 0,
                fps: 0.0,
            },
        }
    }

    fn show_error(&mut self, err: &dyn UserFacing) {
        log::error!("{err}");
        self.ui.error = Some(err.localized());
        self.scheduler.request();
    }

    fn load_config(&mut self, config: ViewerConfig) {
        self.ui.scenes = config.scene_ids().map(str::to_owned).collect();
        self.config = config;
        self.open_scene(None);
    }

    fn open_source(&mut self, image_type: ImageType, paths: Vec<PathBuf>) {
        self.load_config(ViewerConfig::single(SceneOptions::for_images(image_type, &paths)));
    }

    fn open_scene(&mut self, id: Option<&str>) {
        let scene = match self.config.resolve(id) {
            Ok(scene) => scene,
            Err(e) => return self.show_error(&e),
        };
        log::info!("opening scene {}", scene.id.as_deref().unwrap_or("<single>"));

        self.view = match self.ui.mode {
            ViewMode::RayCast => ViewState::for_scene(&scene),
            ViewMode::Sphere => ViewState::sphere(),
        };
        self.panorama.set_background(scene.background);
        self.ui.title = scene.title.clone();
        self.ui.author = scene.author.clone();
        self.ui.current_scene = scene.id.clone();
        self.ui.error = None;
        self.ui.loading = true;

        self.generation += 1;
        start_load_image(scene.source.clone(), self.generation, self.tx.clone());
        self.scene = Some(scene);
    }

    fn poll_loader(&mut self) {
        while let Ok(result) = self.rx.try_recv() {
            match result {
                // A newer request superseded this one.
                Ok(loaded) if loaded.generation != self.generation => {}
                Ok(loaded) => {
                    self.ui.loading = false;
                    self.install_image(loaded.image);
                }
                Err(msg) => {
                    self.ui.loading = false;
                    self.ui.error = Some(msg);
                }
            }
            self.scheduler.request();
        }
    }

    fn install_image(&mut self, image: PanoramaImage) {
        let Some(scene) = &self.scene else {
            return;
        };
        let (mut haov, mut vaov, mut v_offset) = (scene.haov, scene.vaov, scene.v_offset);
        if let PanoramaImage::Equirectangular(img) = &image {
            let full = haov == 360.0 && vaov == 180.0 && v_offset == 0.0;
            if full {
                let (w, h) = img.dimensions();
                (haov, vaov, v_offset) = infer_extents(w, h);
            }
        }

        if let Err(e) = self.panorama.init(
            &image,
            haov.to_radians(),
            vaov.to_radians(),
            v_offset.to_radians(),
        ) {
            return self.show_error(&e);
        }

        if let Some(sphere) = &mut self.sphere {
            if let PanoramaImage::Equirectangular(img) = &image {
                sphere.set_image(img.clone());
            }
        }
        self.image = Some(image);
        self.ui.has_image = true;
        self.ui.error = None;
    }

    fn set_mode(&mut self, mode: ViewMode) {
        if mode == ViewMode::Sphere {
            if matches!(self.image, Some(PanoramaImage::CubeMap(_))) {
                log::warn!("cube maps are only shown in ray-cast mode");
                return;
            }
            if self.sphere.is_none() {
                match SpherePath::new(&self.gpu) {
                    Ok(mut sphere) => {
                        if let Some(PanoramaImage::Equirectangular(img)) = &self.image {
                            sphere.set_image(img.clone());
                        }
                        self.sphere = Some(sphere);
                    }
                    Err(e) => return self.show_error(&e),
                }
            }
        }
        self.ui.mode = mode;
        self.view = match (mode, &self.scene) {
            (ViewMode::RayCast, Some(scene)) => ViewState::for_scene(scene),
            (ViewMode::RayCast, None) => ViewState::new(0.0, 0.0, 100.0, default_bounds()),
            (ViewMode::Sphere, _) => ViewState::sphere(),
        };
        self.scheduler.request();
    }

    fn resize(&mut self, size: PhysicalSize<u32>) {
        if self.gpu.resize(size) {
            self.panorama.set_canvas(size.width, size.height);
            if let Some(sphere) = &mut self.sphere {
                sphere.set_size(size.width, size.height);
            }
            self.scheduler.request();
        }
    }

    fn toggle_fullscreen(&mut self) {
        self.ui.fullscreen = !self.ui.fullscreen;
        if self.ui.fullscreen {
            self.window.set_fullscreen(Some(Fullscreen::Borderless(None)));
        } else {
            self.window.set_fullscreen(None);
        }
    }

    fn set_language(&mut self, code: String) {
        i18n::init(code.clone());
        self.window.set_title(&tr("app.title"));
        self.ui.lang = code;
    }

    /// Returns `false` when the viewer should exit.
    fn apply(&mut self, action: UiAction) -> bool {
        match action {
            UiAction::OpenImage(path) => self.open_source(ImageType::Equirectangular, vec![path]),
            UiAction::OpenCube(paths) => self.open_source(ImageType::CubeMap, paths),
            UiAction::SetMode(mode) => self.set_mode(mode),
            UiAction::GoToScene(id) => self.open_scene(Some(&id)),
            UiAction::SetLanguage(code) => self.set_language(code),
            UiAction::ResetView => self.view.reset(),
            UiAction::ToggleFullscreen => self.toggle_fullscreen(),
            UiAction::Exit => return false,
        }
        self.scheduler.request();
        true
    }

    fn redraw(&mut self) -> Result<Vec<UiAction>, wgpu::SurfaceError> {
        let output = self.gpu.surface.get_current_texture()?;
        let target = output.texture.create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self.gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Render Encoder"),
        });

        let (pitch, yaw, hfov) = self.view.radians();
        match (self.ui.mode, &mut self.sphere) {
            (ViewMode::Sphere, Some(sphere)) => {
                match sphere.render(&self.view, self.gpu.aspect(), &mut encoder, &target) {
                    Ok(errors) => {
                        self.ui.stats = Some(sphere.renderer.stats());
                        if let Some(e) = errors.first() {
                            log::error!("{e}");
                            self.ui.error = Some(e.localized());
                        }
                    }
                    Err(e) => log::warn!("frame skipped: {e}"),
                }
            }
            _ => {
                self.panorama.render(pitch, yaw, hfov);
                self.panorama.encode(&mut encoder, &target);
                self.ui.stats = None;
            }
        }

        self.ui.fps = self.fps.tick();
        self.ui.yaw = self.view.yaw;
        self.ui.pitch = self.view.pitch;
        self.ui.hfov = self.view.hfov;
        let actions = self
            .overlay
            .encode(&self.window, &self.gpu, &mut encoder, &target, &mut self.ui);

        self.gpu.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(actions)
    }

    fn update_interaction(&mut self) {
        let busy = self.view.is_dragging() || self.ui.loading || self.ui.show_fps;
        self.scheduler.set_interacting(busy);
    }

    /// Returns `false` when the viewer should exit.
    fn handle_window_event(&mut self, event: &WindowEvent<'_>) -> bool {
        if self.overlay.on_event(event) {
            self.scheduler.request();
            return true;
        }

        match event {
            WindowEvent::CloseRequested => return false,
            WindowEvent::Resized(size) => self.resize(*size),
            WindowEvent::ScaleFactorChanged { new_inner_size, .. } => self.resize(**new_inner_size),

            WindowEvent::KeyboardInput { input, .. } if input.state == ElementState::Pressed => {
                match input.virtual_keycode {
                    Some(VirtualKeyCode::O) => {
                        if let Some(path) = ui::pick_image() {
                            self.open_source(ImageType::Equirectangular, vec![path]);
                        }
                    }
                    Some(VirtualKeyCode::F11) => self.toggle_fullscreen(),
                    Some(VirtualKeyCode::Plus | VirtualKeyCode::Equals | VirtualKeyCode::NumpadAdd) => {
                        self.view.zoom_in()
                    }
                    Some(VirtualKeyCode::Minus | VirtualKeyCode::NumpadSubtract) => self.view.zoom_out(),
                    _ => return true,
                }
                self.scheduler.request();
            }

            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => {
                if *state == ElementState::Pressed {
                    self.view.begin_drag(self.cursor.x, self.cursor.y);
                } else {
                    self.view.end_drag();
                }
            }

            WindowEvent::CursorMoved { position, .. } => {
                self.cursor = *position;
                if self.view.drag_to(position.x, position.y) {
                    self.scheduler.request();
                }
            }

            WindowEvent::MouseWheel { delta, .. } => {
                // Browser-style wheel delta: 120 per notch.
                let delta = match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y as f64 * 120.0,
                    MouseScrollDelta::PixelDelta(pos) => pos.y,
                };
                self.view.wheel(delta);
                self.scheduler.request();
            }

            WindowEvent::DroppedFile(path) => {
                self.open_source(ImageType::Equirectangular, vec![path.clone()]);
            }

            _ => {}
        }
        true
    }
}

fn default_bounds() -> panorama_renderer::panorama::ViewBounds {
    panorama_renderer::panorama::ViewBounds {
        min_yaw: -180.0,
        max_yaw: 180.0,
        min_pitch: -90.0,
        max_pitch: 90.0,
        min_hfov: panorama_renderer::config::DEFAULT_MIN_HFOV,
        max_hfov: panorama_renderer::config::DEFAULT_MAX_HFOV,
    }
}

fn fatal(err: &dyn UserFacing) {
    log::error!("{err}");
    rfd::MessageDialog::new()
        .set_level(rfd::MessageLevel::Error)
        .set_title(&tr("app.title"))
        .set_description(&err.localized())
        .show();
}

fn main() {
    env_logger::init();

    let lang = i18n::resolve_lang(std::env::args());
    i18n::init(lang.clone());
    let args = parse_args(std::env::args());

    let event_loop = EventLoop::new();
    let window = match WindowBuilder::new()
        .with_title(&tr("app.title"))
        .with_inner_size(LogicalSize::new(1280, 720))
        .build(&event_loop)
    {
        Ok(w) => Arc::new(w),
        Err(e) => {
            log::error!("could not create window: {e}");
            return;
        }
    };

    let gpu = match pollster::block_on(GpuContext::new(window.clone())) {
        Ok(gpu) => gpu,
        Err(e) => return fatal(&e),
    };

    let mut viewer = Viewer::new(window.clone(), gpu, lang);
    if args.mode == ViewMode::Sphere {
        viewer.set_mode(ViewMode::Sphere);
    }
    match (&args.config, args.paths.is_empty()) {
        (Some(path), _) => match ViewerConfig::load(path) {
            Ok(config) => viewer.load_config(config),
            Err(e) => viewer.show_error(&e),
        },
        (None, false) => viewer.open_source(args.image_type, args.paths),
        (None, true) => {}
    }

    event_loop.run(move |event, _, control_flow| {
        viewer.poll_loader();

        match event {
            Event::WindowEvent { event, window_id } if window_id == viewer.window.id() => {
                if !viewer.handle_window_event(&event) {
                    *control_flow = ControlFlow::Exit;
                    return;
                }
            }

            Event::RedrawRequested(_) => match viewer.redraw() {
                Ok(actions) => {
                    for action in actions {
                        if !viewer.apply(action) {
                            *control_flow = ControlFlow::Exit;
                            return;
                        }
                    }
                }
                Err(wgpu::SurfaceError::Lost) => viewer.gpu.reconfigure(),
                Err(wgpu::SurfaceError::OutOfMemory) => *control_flow = ControlFlow::Exit,
                Err(e) => log::warn!("render error: {e:?}"),
            },

            Event::MainEventsCleared => {
                viewer.update_interaction();
                if viewer.scheduler.poll(Instant::now()) {
                    viewer.window.request_redraw();
                }
                *control_flow = if viewer.scheduler.is_interacting() {
                    ControlFlow::Poll
                } else if let Some(deadline) = viewer.scheduler.wake_at() {
                    ControlFlow::WaitUntil(deadline)
                } else {
                    ControlFlow::Wait
                };
            }

            _ => {}
        }
    });
}
