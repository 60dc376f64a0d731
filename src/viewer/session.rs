use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use cgmath::{Deg, Point3};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::camera::{OrbitControls, PerspectiveCamera};
use super::geometry::{compute_stats, normalize, ModelStats, TARGET_SIZE};
use super::loader::{LoadError, ModelLoader};
use super::scene::{RenderSettings, Scene, SceneObject};

fn home_position() -> Point3<f32> {
    Point3::new(5.0, 5.0, 5.0)
}

/// Draws a scene into an output surface.
pub trait RenderBackend: Send {
    fn attach(&mut self, size: (u32, u32), settings: &RenderSettings);

    fn detach(&mut self);

    fn resize(&mut self, width: u32, height: u32);

    fn render(&mut self, scene: &Scene, camera: &PerspectiveCamera);

    /// Free GPU-side resources held for a model that left the scene.
    fn release(&mut self, _model: &SceneObject) {}

    fn dispose(&mut self);
}

#[derive(Debug, Error)]
#[error("Fullscreen request rejected: {0}")]
pub struct FullscreenError(pub String);

/// The host element the viewer draws into.
pub trait Container: Send + Sync {
    fn size(&self) -> (u32, u32);

    /// Receives the container size whenever it changes.
    fn size_changes(&self) -> watch::Receiver<(u32, u32)>;

    fn is_fullscreen(&self) -> bool;

    fn request_fullscreen(&self) -> Result<(), FullscreenError>;

    fn exit_fullscreen(&self) -> Result<(), FullscreenError>;
}

#[derive(Debug, Clone)]
pub struct ViewerConfig {
    pub frame_interval: Duration,
    pub target_size: f32,
    pub render: RenderSettings,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            frame_interval: Duration::from_millis(16),
            target_size: TARGET_SIZE,
            render: RenderSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewerState {
    Empty,
    Loading,
    Displaying,
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewerEvent {
    ModelLoaded { path: String, stats: ModelStats },
    LoadFailed { path: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Displayed(ModelStats),
    /// A later load was requested before this one finished.
    Superseded,
}

struct SceneInner {
    scene: Scene,
    camera: PerspectiveCamera,
    controls: OrbitControls,
    renderer: Box<dyn RenderBackend>,
    state: ViewerState,
    stats: Option<ModelStats>,
    wireframe: bool,
    frames: u64,
}

type Shared = Arc<Mutex<SceneInner>>;

fn lock(inner: &Shared) -> MutexGuard<'_, SceneInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

fn home_camera(size: (u32, u32)) -> PerspectiveCamera {
    let mut camera = PerspectiveCamera::new(Deg(75.0), 1.0, 0.1, 1000.0);
    camera.resize_projection(size.0, size.1);
    camera.position = home_position();
    camera
}

/// A mounted 3D viewer: one scene, one camera, one render loop.
pub struct SceneSession {
    inner: Shared,
    container: Arc<dyn Container>,
    loader: Arc<dyn ModelLoader>,
    config: ViewerConfig,
    latest_load: AtomicU64,
    events: mpsc::UnboundedSender<ViewerEvent>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl SceneSession {
    /// Build the stage, attach the renderer and start the render and resize
    /// tasks. Must be called from within a tokio runtime.
    pub fn mount(
        container: Arc<dyn Container>,
        mut renderer: Box<dyn RenderBackend>,
        loader: Arc<dyn ModelLoader>,
        config: ViewerConfig,
    ) -> (Self, mpsc::UnboundedReceiver<ViewerEvent>) {
        let size = container.size();
        renderer.attach(size, &config.render);

        let inner = Arc::new(Mutex::new(SceneInner {
            scene: Scene::stage(),
            camera: home_camera(size),
            controls: OrbitControls::default(),
            renderer,
            state: ViewerState::Empty,
            stats: None,
            wireframe: false,
            frames: 0,
        }));

        let cancel = CancellationToken::new();
        let tasks = vec![
            spawn_render_loop(inner.clone(), cancel.clone(), config.frame_interval),
            spawn_resize_watch(inner.clone(), container.size_changes(), cancel.clone()),
        ];
        tracing::debug!(width = size.0, height = size.1, "Viewer mounted");

        let (events, rx) = mpsc::unbounded_channel();
        let session = Self {
            inner,
            container,
            loader,
            config,
            latest_load: AtomicU64::new(0),
            events,
            cancel,
            tasks,
        };
        (session, rx)
    }

    /// Load, normalize and display the model at `path`, replacing the current one.
    ///
    /// Only the most recently requested load is ever attached; earlier loads
    /// that finish late resolve to [`LoadOutcome::Superseded`].
    pub async fn load_model(&self, path: &str) -> Result<LoadOutcome, LoadError> {
        let seq = self.latest_load.fetch_add(1, Ordering::SeqCst) + 1;
        lock(&self.inner).state = ViewerState::Loading;

        let result = self.loader.load(path).await;

        let mut object = match result {
            Ok(object) => object,
            Err(e) => {
                let mut inner = lock(&self.inner);
                if self.latest_load.load(Ordering::SeqCst) != seq {
                    return Ok(LoadOutcome::Superseded);
                }
                tracing::warn!(path, error = %e, "Model load failed");
                inner.state = ViewerState::Error(e.to_string());
                let _ = self.events.send(ViewerEvent::LoadFailed {
                    path: path.to_string(),
                    reason: e.to_string(),
                });
                return Err(e);
            }
        };

        object.visit_meshes_mut(&mut |mesh| {
            mesh.cast_shadow = true;
            mesh.receive_shadow = true;
        });
        let stats = compute_stats(&object);
        normalize(&mut object, self.config.target_size);

        let mut guard = lock(&self.inner);
        if self.latest_load.load(Ordering::SeqCst) != seq {
            tracing::debug!(path, "Discarding superseded model");
            return Ok(LoadOutcome::Superseded);
        }
        let inner = &mut *guard;
        if inner.wireframe {
            object.visit_meshes_mut(&mut |mesh| mesh.material.wireframe = true);
        }
        if let Some(previous) = inner.scene.attach(object) {
            inner.renderer.release(&previous);
        }
        inner.state = ViewerState::Displaying;
        inner.stats = Some(stats);
        drop(guard);

        tracing::info!(path, vertices = stats.vertices, triangles = stats.triangles, "Model displayed");
        let _ = self.events.send(ViewerEvent::ModelLoaded {
            path: path.to_string(),
            stats,
        });
        Ok(LoadOutcome::Displayed(stats))
    }

    pub fn reset_camera(&self) {
        let mut guard = lock(&self.inner);
        let inner = &mut *guard;
        inner.camera.position = home_position();
        inner.camera.target = Point3::new(0.0, 0.0, 0.0);
        inner.controls.target = Point3::new(0.0, 0.0, 0.0);
        inner.controls.clear();
    }

    /// Flip wireframe rendering on the attached model. Returns the new flag,
    /// or the unchanged one when nothing is displayed.
    pub fn toggle_wireframe(&self) -> bool {
        let mut guard = lock(&self.inner);
        let inner = &mut *guard;
        let Some(model) = inner.scene.model_mut() else {
            return inner.wireframe;
        };
        let wireframe = !inner.wireframe;
        model.visit_meshes_mut(&mut |mesh| mesh.material.wireframe = wireframe);
        inner.wireframe = wireframe;
        wireframe
    }

    pub fn toggle_fullscreen(&self) {
        let result = if self.container.is_fullscreen() {
            self.container.exit_fullscreen()
        } else {
            self.container.request_fullscreen()
        };
        if let Err(e) = result {
            tracing::debug!(error = %e, "Fullscreen toggle ignored");
        }
    }

    /// Feed pointer or wheel input to the orbit controls.
    pub fn with_controls<R>(&self, f: impl FnOnce(&mut OrbitControls) -> R) -> R {
        f(&mut lock(&self.inner).controls)
    }

    pub fn state(&self) -> ViewerState {
        lock(&self.inner).state.clone()
    }

    pub fn stats(&self) -> Option<ModelStats> {
        lock(&self.inner).stats
    }

    pub fn camera(&self) -> PerspectiveCamera {
        lock(&self.inner).camera
    }

    pub fn with_scene<R>(&self, f: impl FnOnce(&Scene) -> R) -> R {
        f(&lock(&self.inner).scene)
    }

    pub fn frame_count(&self) -> u64 {
        lock(&self.inner).frames
    }

    /// Stop rendering and release everything. No frame is drawn once this returns.
    pub async fn unmount(mut self) {
        self.cancel.cancel();
        for task in std::mem::take(&mut self.tasks) {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Viewer task ended abnormally");
            }
        }

        let mut guard = lock(&self.inner);
        let inner = &mut *guard;
        if let Some(model) = inner.scene.detach() {
            inner.renderer.release(&model);
        }
        inner.renderer.detach();
        inner.renderer.dispose();
        inner.state = ViewerState::Empty;
        inner.stats = None;
        tracing::debug!(frames = inner.frames, "Viewer unmounted");
    }
}

impl Drop for SceneSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn render_frame(inner: &Shared) {
    let mut guard = lock(inner);
    let inner = &mut *guard;
    inner.controls.update(&mut inner.camera);
    inner.renderer.render(&inner.scene, &inner.camera);
    inner.frames += 1;
}

fn apply_resize(inner: &Shared, width: u32, height: u32) {
    if width == 0 || height == 0 {
        return;
    }
    let mut inner = lock(inner);
    inner.camera.resize_projection(width, height);
    inner.renderer.resize(width, height);
}

fn spawn_render_loop(inner: Shared, cancel: CancellationToken, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => render_frame(&inner),
            }
        }
    })
}

fn spawn_resize_watch(
    inner: Shared,
    mut sizes: watch::Receiver<(u32, u32)>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                changed = sizes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let (width, height) = *sizes.borrow_and_update();
                    apply_resize(&inner, width, height);
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::AtomicBool;

    use async_trait::async_trait;
    use cgmath::{EuclideanSpace, InnerSpace};
    use tokio::sync::Notify;

    use super::*;
    use crate::viewer::scene::{Geometry, Material, Mesh};

    #[derive(Default)]
    struct RenderLog {
        frames: u64,
        sizes: Vec<(u32, u32)>,
        released: Vec<String>,
        disposed: bool,
        last_model: Option<String>,
    }

    struct FakeRenderer(Arc<Mutex<RenderLog>>);

    impl RenderBackend for FakeRenderer {
        fn attach(&mut self, size: (u32, u32), _settings: &RenderSettings) {
            self.0.lock().unwrap().sizes.push(size);
        }

        fn detach(&mut self) {}

        fn resize(&mut self, width: u32, height: u32) {
            self.0.lock().unwrap().sizes.push((width, height));
        }

        fn render(&mut self, scene: &Scene, _camera: &PerspectiveCamera) {
            let mut log = self.0.lock().unwrap();
            log.frames += 1;
            log.last_model = scene.model().map(|m| m.name.clone());
        }

        fn release(&mut self, model: &SceneObject) {
            self.0.lock().unwrap().released.push(model.name.clone());
        }

        fn dispose(&mut self) {
            self.0.lock().unwrap().disposed = true;
        }
    }

    struct FakeContainer {
        sizes: watch::Sender<(u32, u32)>,
        fullscreen: AtomicBool,
    }

    impl FakeContainer {
        fn new(size: (u32, u32)) -> Arc<Self> {
            Arc::new(Self {
                sizes: watch::channel(size).0,
                fullscreen: AtomicBool::new(false),
            })
        }
    }

    impl Container for FakeContainer {
        fn size(&self) -> (u32, u32) {
            *self.sizes.borrow()
        }

        fn size_changes(&self) -> watch::Receiver<(u32, u32)> {
            self.sizes.subscribe()
        }

        fn is_fullscreen(&self) -> bool {
            self.fullscreen.load(Ordering::SeqCst)
        }

        fn request_fullscreen(&self) -> Result<(), FullscreenError> {
            self.fullscreen.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn exit_fullscreen(&self) -> Result<(), FullscreenError> {
            Err(FullscreenError("not allowed".to_string()))
        }
    }

    /// Loads a 10x2x4 box named after the path. Gated paths wait for `open`.
    #[derive(Default)]
    struct GatedLoader {
        gates: HashMap<String, Arc<Notify>>,
    }

    impl GatedLoader {
        fn with_gates(paths: &[&str]) -> Arc<Self> {
            let gates = paths
                .iter()
                .map(|p| (p.to_string(), Arc::new(Notify::new())))
                .collect();
            Arc::new(Self { gates })
        }

        fn open(&self, path: &str) {
            self.gates[path].notify_one();
        }
    }

    #[async_trait]
    impl ModelLoader for GatedLoader {
        async fn load(&self, path: &str) -> Result<SceneObject, LoadError> {
            if let Some(gate) = self.gates.get(path) {
                gate.notified().await;
            }
            if path.contains("broken") {
                return Err(LoadError::Parse("unexpected token".to_string()));
            }
            let positions = vec![[0.0, 0.0, 0.0], [10.0, 2.0, 4.0], [10.0, 0.0, 0.0]];
            let mesh = Mesh::new(Geometry::new(positions, None), Material::default());
            Ok(SceneObject::group(path).with_child(SceneObject::with_mesh("part", mesh)))
        }
    }

    struct Harness {
        session: SceneSession,
        events: mpsc::UnboundedReceiver<ViewerEvent>,
        log: Arc<Mutex<RenderLog>>,
        container: Arc<FakeContainer>,
    }

    fn mount(loader: Arc<dyn ModelLoader>, frame_interval: Duration) -> Harness {
        let log = Arc::new(Mutex::new(RenderLog::default()));
        let container = FakeContainer::new((800, 600));
        let config = ViewerConfig {
            frame_interval,
            ..ViewerConfig::default()
        };
        let (session, events) = SceneSession::mount(
            container.clone(),
            Box::new(FakeRenderer(log.clone())),
            loader,
            config,
        );
        Harness {
            session,
            events,
            log,
            container,
        }
    }

    #[tokio::test]
    async fn mount_sets_up_camera_and_stage() {
        let h = mount(Arc::new(GatedLoader::default()), Duration::from_millis(5));
        let camera = h.session.camera();
        assert_eq!(camera.position, Point3::new(5.0, 5.0, 5.0));
        assert_eq!(camera.fovy, Deg(75.0));
        assert!((camera.aspect - 800.0 / 600.0).abs() < 1e-6);
        assert_eq!(h.session.state(), ViewerState::Empty);
        assert_eq!(h.session.with_scene(|s| s.lights.len()), 3);
        assert_eq!(h.log.lock().unwrap().sizes, vec![(800, 600)]);
        h.session.unmount().await;
    }

    #[tokio::test]
    async fn load_normalizes_and_reports_stats() {
        let mut h = mount(Arc::new(GatedLoader::default()), Duration::from_millis(5));

        let outcome = h.session.load_model("crate.obj").await.unwrap();
        let expected = ModelStats {
            vertices: 3,
            triangles: 1,
        };
        assert_eq!(outcome, LoadOutcome::Displayed(expected));
        assert_eq!(h.session.state(), ViewerState::Displaying);
        assert_eq!(h.session.stats(), Some(expected));

        let (scale, shadows) = h.session.with_scene(|scene| {
            let model = scene.model().unwrap();
            let part = model.children[0].mesh.as_ref().unwrap();
            (model.transform.scale.x, part.cast_shadow && part.receive_shadow)
        });
        assert!((scale - 0.5).abs() < 1e-6);
        assert!(shadows);

        assert_eq!(
            h.events.recv().await,
            Some(ViewerEvent::ModelLoaded {
                path: "crate.obj".to_string(),
                stats: expected
            })
        );
        h.session.unmount().await;
    }

    #[tokio::test]
    async fn latest_requested_load_wins() {
        let loader = GatedLoader::with_gates(&["slow.obj", "fast.obj"]);
        let h = mount(loader.clone(), Duration::from_millis(5));

        let (slow, fast, ()) = tokio::join!(
            h.session.load_model("slow.obj"),
            h.session.load_model("fast.obj"),
            async {
                loader.open("fast.obj");
                tokio::task::yield_now().await;
                loader.open("slow.obj");
            }
        );

        assert_eq!(slow.unwrap(), LoadOutcome::Superseded);
        assert!(matches!(fast.unwrap(), LoadOutcome::Displayed(_)));
        let shown = h.session.with_scene(|s| s.model().map(|m| m.name.clone()));
        assert_eq!(shown.as_deref(), Some("fast.obj"));
        h.session.unmount().await;
    }

    #[tokio::test]
    async fn stale_failure_does_not_override_newer_model() {
        let loader = GatedLoader::with_gates(&["broken.obj"]);
        let h = mount(loader.clone(), Duration::from_millis(5));

        let (broken, good, ()) = tokio::join!(
            h.session.load_model("broken.obj"),
            h.session.load_model("good.obj"),
            async {
                tokio::task::yield_now().await;
                loader.open("broken.obj");
            }
        );

        assert_eq!(broken.unwrap(), LoadOutcome::Superseded);
        assert!(good.is_ok());
        assert_eq!(h.session.state(), ViewerState::Displaying);
        h.session.unmount().await;
    }

    #[tokio::test]
    async fn failed_load_moves_to_error_and_retry_recovers() {
        let mut h = mount(Arc::new(GatedLoader::default()), Duration::from_millis(5));

        assert!(h.session.load_model("broken.obj").await.is_err());
        assert!(matches!(h.session.state(), ViewerState::Error(_)));
        assert!(matches!(
            h.events.recv().await,
            Some(ViewerEvent::LoadFailed { .. })
        ));

        h.session.load_model("fixed.obj").await.unwrap();
        assert_eq!(h.session.state(), ViewerState::Displaying);
        h.session.unmount().await;
    }

    #[tokio::test]
    async fn replacing_model_releases_previous() {
        let h = mount(Arc::new(GatedLoader::default()), Duration::from_millis(5));
        h.session.load_model("a.obj").await.unwrap();
        h.session.load_model("b.obj").await.unwrap();
        assert_eq!(h.log.lock().unwrap().released, vec!["a.obj".to_string()]);
        h.session.unmount().await;
        assert_eq!(
            h.log.lock().unwrap().released,
            vec!["a.obj".to_string(), "b.obj".to_string()]
        );
    }

    #[tokio::test]
    async fn wireframe_applies_to_current_and_next_model() {
        let h = mount(Arc::new(GatedLoader::default()), Duration::from_millis(5));
        assert!(!h.session.toggle_wireframe());

        h.session.load_model("a.obj").await.unwrap();
        assert!(h.session.toggle_wireframe());
        h.session.load_model("b.obj").await.unwrap();

        let all_wireframe = h.session.with_scene(|scene| {
            let mut all = true;
            scene
                .model()
                .unwrap()
                .visit_meshes(&mut |mesh, _| all &= mesh.material.wireframe);
            all
        });
        assert!(all_wireframe);
        assert!(!h.session.toggle_wireframe());
        h.session.unmount().await;
    }

    #[tokio::test]
    async fn reset_camera_returns_home() {
        let h = mount(Arc::new(GatedLoader::default()), Duration::from_millis(2));
        h.session.with_controls(|c| {
            c.rotate(1.0, 0.3);
            c.dolly(2.0);
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_ne!(h.session.camera().position, Point3::new(5.0, 5.0, 5.0));

        h.session.reset_camera();
        let camera = h.session.camera();
        assert!((camera.position - Point3::new(5.0, 5.0, 5.0)).magnitude() < 1e-4);
        assert!(camera.target.to_vec().magnitude() < 1e-4);
        h.session.unmount().await;
    }

    #[tokio::test]
    async fn resize_tracks_container_and_ignores_zero_height() {
        let h = mount(Arc::new(GatedLoader::default()), Duration::from_millis(5));

        h.container.sizes.send_replace((1000, 500));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!((h.session.camera().aspect - 2.0).abs() < 1e-6);

        h.container.sizes.send_replace((1000, 0));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!((h.session.camera().aspect - 2.0).abs() < 1e-6);
        assert_eq!(h.log.lock().unwrap().sizes, vec![(800, 600), (1000, 500)]);
        h.session.unmount().await;
    }

    #[tokio::test]
    async fn fullscreen_errors_are_swallowed() {
        let h = mount(Arc::new(GatedLoader::default()), Duration::from_millis(5));
        h.session.toggle_fullscreen();
        assert!(h.container.is_fullscreen());
        // Exit fails in the fake container
        h.session.toggle_fullscreen();
        assert!(h.container.is_fullscreen());
        h.session.unmount().await;
    }

    #[tokio::test]
    async fn no_frames_after_unmount() {
        let h = mount(Arc::new(GatedLoader::default()), Duration::from_millis(1));
        h.session.load_model("a.obj").await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(h.session.frame_count() > 0);

        h.session.unmount().await;
        let frames = h.log.lock().unwrap().frames;
        assert!(frames > 0);

        tokio::time::sleep(Duration::from_millis(30)).await;
        let log = h.log.lock().unwrap();
        assert_eq!(log.frames, frames);
        assert!(log.disposed);
    }
}
