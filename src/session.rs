use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};
use crate::export::{ExportClient, ExportRequest};
use crate::geo::{self, AreaBreakdown, LngLat};
use crate::loader::{CredentialSource, MapCredentials, ResourceLoader, SdkResource};

/// Camera the map opens with before the user moves it.
pub const DEFAULT_CENTER: LngLat = LngLat {
    lng: 78.9629,
    lat: 20.5937,
};
pub const DEFAULT_ZOOM: f64 = 4.0;

const EXPORT_FILE_NAME: &str = "map_export.png";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MapStyle {
    Road,
    Satellite,
}

impl MapStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            MapStyle::Road => "road",
            MapStyle::Satellite => "satellite",
        }
    }

    /// The style name the mapping SDK expects for this classifier.
    pub fn sdk_style_name(&self) -> &'static str {
        match self {
            MapStyle::Road => "road",
            MapStyle::Satellite => "satellite_road_labels",
        }
    }

    pub fn from_sdk_style(name: &str) -> Self {
        if name.contains("satellite") {
            MapStyle::Satellite
        } else {
            MapStyle::Road
        }
    }

    fn toggled(&self) -> Self {
        match self {
            MapStyle::Road => MapStyle::Satellite,
            MapStyle::Satellite => MapStyle::Road,
        }
    }
}

/// Opaque handle to a drawn geometry. The SDK owns the geometry; the
/// session only keeps the handle so it can evict or query it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeRef(String);

impl ShapeRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

/// The slice of the mapping SDK the session drives. All calls are
/// synchronous; the SDK executes them directly on the UI loop.
pub trait MapSurface: Send + Sync {
    fn remove_shape(&self, shape: &ShapeRef);
    /// Area of the shape's outer ring in square meters.
    fn shape_area(&self, shape: &ShapeRef) -> f64;
    fn apply_style(&self, style: MapStyle);
    /// Redraws the measurement line through the points in order.
    fn render_distance_path(&self, path: &[LngLat]);
    fn clear_distance_path(&self);
    /// Geodesic length of the path in meters.
    fn path_length(&self, path: &[LngLat]) -> f64 {
        geo::path_length(path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapPhase {
    Unbootstrapped,
    Bootstrapping,
    Ready,
}

/// A finished export, ready to hand to the browser as a download.
#[derive(Debug, Clone)]
pub struct MapExport {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Owns every piece of mutable map state: the bootstrap phase, the
/// fetched credentials, the single active shape, the measurement path,
/// and the current style. UI handlers call into it; nothing else
/// mutates this state.
pub struct MapSession {
    credential_source: Arc<dyn CredentialSource>,
    loader: Arc<dyn ResourceLoader>,
    surface: Arc<dyn MapSurface>,
    export_client: Arc<dyn ExportClient>,
    phase: Mutex<BootstrapPhase>,
    // Single-flight guard: concurrent bootstrap callers queue here and
    // re-check the phase once they hold it.
    flight: AsyncMutex<()>,
    credentials: Mutex<Option<MapCredentials>>,
    style: Mutex<MapStyle>,
    style_locked_until: Mutex<Option<Instant>>,
    style_cooldown: Duration,
    active_shape: Mutex<Option<ShapeRef>>,
    measuring: Mutex<bool>,
    distance_path: Mutex<Vec<LngLat>>,
}

impl MapSession {
    pub fn new(
        credential_source: Arc<dyn CredentialSource>,
        loader: Arc<dyn ResourceLoader>,
        surface: Arc<dyn MapSurface>,
        export_client: Arc<dyn ExportClient>,
        config: &AppConfig,
    ) -> Self {
        Self {
            credential_source,
            loader,
            surface,
            export_client,
            phase: Mutex::new(BootstrapPhase::Unbootstrapped),
            flight: AsyncMutex::new(()),
            credentials: Mutex::new(None),
            style: Mutex::new(MapStyle::Road),
            style_locked_until: Mutex::new(None),
            style_cooldown: Duration::from_millis(config.style_cooldown_ms),
            active_shape: Mutex::new(None),
            measuring: Mutex::new(false),
            distance_path: Mutex::new(Vec::new()),
        }
    }

    pub fn phase(&self) -> BootstrapPhase {
        *self.phase.lock()
    }

    pub fn is_ready(&self) -> bool {
        self.phase() == BootstrapPhase::Ready
    }

    pub fn credentials(&self) -> Option<MapCredentials> {
        self.credentials.lock().clone()
    }

    pub fn current_style(&self) -> MapStyle {
        *self.style.lock()
    }

    pub fn active_shape(&self) -> Option<ShapeRef> {
        self.active_shape.lock().clone()
    }

    pub fn is_measuring(&self) -> bool {
        *self.measuring.lock()
    }

    pub fn distance_path(&self) -> Vec<LngLat> {
        self.distance_path.lock().clone()
    }

    /// Brings the SDK up exactly once: credential fetch, then the map
    /// engine, then the drawing extension. Safe to call on every panel
    /// activation; once `Ready` it returns immediately, and concurrent
    /// callers share a single in-flight bootstrap. Any failure leaves
    /// the session `Unbootstrapped` so the next call retries.
    pub async fn ensure_loaded(&self) -> AppResult<()> {
        if self.is_ready() {
            return Ok(());
        }

        let _flight = self.flight.lock().await;
        if self.is_ready() {
            return Ok(());
        }

        *self.phase.lock() = BootstrapPhase::Bootstrapping;
        match self.bootstrap().await {
            Ok(credentials) => {
                *self.credentials.lock() = Some(credentials);
                *self.phase.lock() = BootstrapPhase::Ready;
                info!("map sdk bootstrap complete");
                Ok(())
            }
            Err(err) => {
                *self.phase.lock() = BootstrapPhase::Unbootstrapped;
                warn!(%err, "map sdk bootstrap failed");
                Err(err)
            }
        }
    }

    async fn bootstrap(&self) -> AppResult<MapCredentials> {
        let credentials = self.credential_source.fetch().await?;
        if !credentials.is_usable() {
            return Err(AppError::CredentialsUnavailable);
        }
        self.loader.acquire(SdkResource::MapControl).await?;
        self.loader.acquire(SdkResource::DrawingModule).await?;
        Ok(credentials)
    }

    /// Records a freshly drawn shape, evicting the previous one from
    /// the drawing source first. At most one shape is ever active.
    pub fn start_drawing(&self, shape: ShapeRef) {
        let mut active = self.active_shape.lock();
        if let Some(previous) = active.take() {
            debug!(shape = previous.id(), "replacing active shape");
            self.surface.remove_shape(&previous);
        }
        *active = Some(shape);
    }

    pub fn clear_shape(&self) {
        let mut active = self.active_shape.lock();
        if let Some(shape) = active.take() {
            self.surface.remove_shape(&shape);
        }
    }

    pub fn start_distance_measurement(&self) {
        *self.measuring.lock() = true;
        self.distance_path.lock().clear();
        self.surface.clear_distance_path();
        debug!("distance measurement started");
    }

    /// Appends a clicked point and redraws the measurement line.
    /// Clicks outside measurement mode are dropped.
    pub fn add_distance_point(&self, point: LngLat) {
        if !*self.measuring.lock() {
            return;
        }
        let mut path = self.distance_path.lock();
        path.push(point);
        self.surface.render_distance_path(&path);
    }

    /// Ends measurement mode and returns the path length in meters.
    /// The accumulated path is consumed either way.
    pub fn finish_distance_measurement(&self) -> AppResult<f64> {
        *self.measuring.lock() = false;
        let path = std::mem::take(&mut *self.distance_path.lock());
        if path.len() < 2 {
            return Err(AppError::InsufficientPoints);
        }
        Ok(self.surface.path_length(&path))
    }

    /// Flips between road and satellite. Returns `None` while the
    /// previous transition's cooldown is still running; ignored clicks
    /// are not queued.
    pub fn toggle_style(&self) -> Option<MapStyle> {
        let now = Instant::now();
        {
            let mut locked_until = self.style_locked_until.lock();
            if let Some(deadline) = *locked_until {
                if now < deadline {
                    debug!("style toggle ignored during cooldown");
                    return None;
                }
            }
            *locked_until = Some(now + self.style_cooldown);
        }

        let mut style = self.style.lock();
        *style = style.toggled();
        self.surface.apply_style(*style);
        info!(style = style.as_str(), "map style changed");
        Some(*style)
    }

    /// Area of the active shape in the units the info panel reports.
    pub fn shape_area(&self) -> AppResult<AreaBreakdown> {
        let shape = self.active_shape().ok_or(AppError::NoShapeToExport)?;
        let square_meters = self.surface.shape_area(&shape).abs();
        Ok(AreaBreakdown::from_square_meters(square_meters))
    }

    /// Posts the current viewport to the export endpoint and returns
    /// the rendered image. Requires a drawn shape.
    pub async fn request_export(&self, center: LngLat, zoom: f64) -> AppResult<MapExport> {
        if self.active_shape.lock().is_none() {
            return Err(AppError::NoShapeToExport);
        }

        let request = ExportRequest {
            center: center.to_array(),
            zoom: zoom.round() as i32,
            map_type: self.current_style(),
        };
        let bytes = self
            .export_client
            .export(&request)
            .await
            .map_err(|err| match err {
                AppError::ExportFailed(_) => err,
                other => AppError::ExportFailed(other.to_string()),
            })?;

        Ok(MapExport {
            file_name: EXPORT_FILE_NAME.to_string(),
            bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use secrecy::SecretString;
    use tokio::sync::Semaphore;

    use crate::geo::haversine_distance;

    use super::*;

    struct StaticCredentials {
        fetches: AtomicUsize,
        usable: bool,
    }

    impl StaticCredentials {
        fn usable() -> Self {
            Self {
                fetches: AtomicUsize::new(0),
                usable: true,
            }
        }

        fn empty() -> Self {
            Self {
                fetches: AtomicUsize::new(0),
                usable: false,
            }
        }
    }

    #[async_trait]
    impl CredentialSource for StaticCredentials {
        async fn fetch(&self) -> AppResult<MapCredentials> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(MapCredentials {
                client_id: self.usable.then(|| "client".to_string()),
                subscription_key: self
                    .usable
                    .then(|| SecretString::from("key".to_string())),
            })
        }
    }

    #[derive(Default)]
    struct CountingLoader {
        loads: Mutex<Vec<SdkResource>>,
        fail_next: AtomicBool,
    }

    #[async_trait]
    impl ResourceLoader for CountingLoader {
        async fn acquire(&self, resource: SdkResource) -> AppResult<()> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(AppError::ResourceLoadFailed("injected".into()));
            }
            self.loads.lock().push(resource);
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingSurface {
        removed: Mutex<Vec<ShapeRef>>,
        styles: Mutex<Vec<MapStyle>>,
        renders: Mutex<Vec<usize>>,
        path_clears: AtomicUsize,
        area: Mutex<f64>,
    }

    impl MapSurface for RecordingSurface {
        fn remove_shape(&self, shape: &ShapeRef) {
            self.removed.lock().push(shape.clone());
        }

        fn shape_area(&self, _shape: &ShapeRef) -> f64 {
            *self.area.lock()
        }

        fn apply_style(&self, style: MapStyle) {
            self.styles.lock().push(style);
        }

        fn render_distance_path(&self, path: &[LngLat]) {
            self.renders.lock().push(path.len());
        }

        fn clear_distance_path(&self) {
            self.path_clears.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct StubExport {
        requests: Mutex<Vec<ExportRequest>>,
        fail: bool,
    }

    #[async_trait]
    impl ExportClient for StubExport {
        async fn export(&self, request: &ExportRequest) -> AppResult<Vec<u8>> {
            self.requests.lock().push(request.clone());
            if self.fail {
                Err(AppError::ExportFailed("server returned 500".into()))
            } else {
                Ok(vec![0x89, 0x50, 0x4e, 0x47])
            }
        }
    }

    struct Fixture {
        credentials: Arc<StaticCredentials>,
        loader: Arc<CountingLoader>,
        surface: Arc<RecordingSurface>,
        export: Arc<StubExport>,
        session: Arc<MapSession>,
    }

    fn fixture_with(credentials: StaticCredentials, cooldown_ms: u64) -> Fixture {
        let credentials = Arc::new(credentials);
        let loader = Arc::new(CountingLoader::default());
        let surface = Arc::new(RecordingSurface::default());
        let export = Arc::new(StubExport::default());
        let config = AppConfig {
            style_cooldown_ms: cooldown_ms,
            ..AppConfig::default()
        };
        let session = Arc::new(MapSession::new(
            credentials.clone(),
            loader.clone(),
            surface.clone(),
            export.clone(),
            &config,
        ));
        Fixture {
            credentials,
            loader,
            surface,
            export,
            session,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(StaticCredentials::usable(), 1_000)
    }

    /// Credential source that parks inside `fetch` until the test
    /// opens the gate, so a second caller can arrive while the first
    /// bootstrap is still in flight.
    struct GatedCredentials {
        fetches: AtomicUsize,
        gate: Semaphore,
    }

    impl GatedCredentials {
        fn new() -> Self {
            Self {
                fetches: AtomicUsize::new(0),
                gate: Semaphore::new(0),
            }
        }
    }

    #[async_trait]
    impl CredentialSource for GatedCredentials {
        async fn fetch(&self) -> AppResult<MapCredentials> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let permit = self.gate.acquire().await.expect("gate stays open");
            permit.forget();
            Ok(MapCredentials {
                client_id: Some("client".to_string()),
                subscription_key: None,
            })
        }
    }

    #[tokio::test]
    async fn concurrent_bootstraps_share_one_flight() {
        let credentials = Arc::new(GatedCredentials::new());
        let loader = Arc::new(CountingLoader::default());
        let session = Arc::new(MapSession::new(
            credentials.clone(),
            loader.clone(),
            Arc::new(RecordingSurface::default()),
            Arc::new(StubExport::default()),
            &AppConfig::default(),
        ));

        let first = tokio::spawn({
            let session = session.clone();
            async move { session.ensure_loaded().await }
        });
        // Wait until the first caller is parked inside its credential
        // fetch, then send the second caller in behind it.
        while credentials.fetches.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        let second = tokio::spawn({
            let session = session.clone();
            async move { session.ensure_loaded().await }
        });
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(session.phase(), BootstrapPhase::Bootstrapping);

        // Enough permits for a duplicate fetch; a correct session
        // never claims the second one.
        credentials.gate.add_permits(2);
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        assert_eq!(credentials.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(
            *loader.loads.lock(),
            vec![SdkResource::MapControl, SdkResource::DrawingModule]
        );
        assert!(session.is_ready());
        assert!(session.credentials().is_some());
    }

    #[tokio::test]
    async fn ready_session_skips_further_loads() {
        let fx = fixture();
        fx.session.ensure_loaded().await.unwrap();
        fx.session.ensure_loaded().await.unwrap();

        assert_eq!(fx.credentials.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(fx.loader.loads.lock().len(), 2);
    }

    #[tokio::test]
    async fn failed_resource_load_leaves_session_retryable() {
        let fx = fixture();
        fx.loader.fail_next.store(true, Ordering::SeqCst);

        let err = fx.session.ensure_loaded().await.unwrap_err();
        assert!(matches!(err, AppError::ResourceLoadFailed(_)));
        assert_eq!(fx.session.phase(), BootstrapPhase::Unbootstrapped);
        assert!(fx.session.credentials().is_none());

        fx.session.ensure_loaded().await.unwrap();
        assert!(fx.session.is_ready());
        assert_eq!(fx.credentials.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn missing_credentials_fail_bootstrap() {
        let fx = fixture_with(StaticCredentials::empty(), 1_000);

        let err = fx.session.ensure_loaded().await.unwrap_err();
        assert!(matches!(err, AppError::CredentialsUnavailable));
        assert_eq!(fx.session.phase(), BootstrapPhase::Unbootstrapped);
        assert!(fx.loader.loads.lock().is_empty());
    }

    #[test]
    fn second_shape_evicts_first() {
        let fx = fixture();
        fx.session.start_drawing(ShapeRef::new("first"));
        fx.session.start_drawing(ShapeRef::new("second"));

        assert_eq!(fx.session.active_shape(), Some(ShapeRef::new("second")));
        assert_eq!(*fx.surface.removed.lock(), vec![ShapeRef::new("first")]);

        fx.session.clear_shape();
        assert_eq!(fx.session.active_shape(), None);
        assert_eq!(fx.surface.removed.lock().len(), 2);
    }

    #[test]
    fn clear_shape_without_active_shape_is_a_no_op() {
        let fx = fixture();
        fx.session.clear_shape();
        assert!(fx.surface.removed.lock().is_empty());
    }

    #[test]
    fn distance_measurement_accumulates_and_sums() {
        let fx = fixture();
        let a = LngLat::new(77.2090, 28.6139);
        let b = LngLat::new(77.2190, 28.6239);

        fx.session.start_distance_measurement();
        assert!(fx.session.is_measuring());
        assert_eq!(fx.surface.path_clears.load(Ordering::SeqCst), 1);

        fx.session.add_distance_point(a);
        fx.session.add_distance_point(b);
        assert_eq!(*fx.surface.renders.lock(), vec![1, 2]);

        let meters = fx.session.finish_distance_measurement().unwrap();
        assert!(!fx.session.is_measuring());
        let expected = haversine_distance(a, b);
        assert!((meters - expected).abs() < 1e-6);
    }

    #[test]
    fn finish_with_one_point_reports_insufficient_points() {
        let fx = fixture();
        fx.session.start_distance_measurement();
        fx.session.add_distance_point(LngLat::new(0.0, 0.0));

        let err = fx.session.finish_distance_measurement().unwrap_err();
        assert!(matches!(err, AppError::InsufficientPoints));
        assert!(!fx.session.is_measuring());
        assert!(fx.session.distance_path().is_empty());
    }

    #[test]
    fn clicks_outside_measurement_mode_are_dropped() {
        let fx = fixture();
        fx.session.add_distance_point(LngLat::new(1.0, 1.0));
        assert!(fx.session.distance_path().is_empty());
        assert!(fx.surface.renders.lock().is_empty());
    }

    #[test]
    fn restarting_measurement_clears_previous_path() {
        let fx = fixture();
        fx.session.start_distance_measurement();
        fx.session.add_distance_point(LngLat::new(1.0, 1.0));
        fx.session.start_distance_measurement();
        assert!(fx.session.distance_path().is_empty());
    }

    #[tokio::test]
    async fn style_toggle_debounces_rapid_clicks() {
        let fx = fixture_with(StaticCredentials::usable(), 30);

        assert_eq!(fx.session.toggle_style(), Some(MapStyle::Satellite));
        assert_eq!(fx.session.toggle_style(), None);
        assert_eq!(fx.session.current_style(), MapStyle::Satellite);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(fx.session.toggle_style(), Some(MapStyle::Road));
        assert_eq!(*fx.surface.styles.lock(), vec![MapStyle::Satellite, MapStyle::Road]);
    }

    #[tokio::test]
    async fn export_requires_an_active_shape() {
        let fx = fixture();
        let err = fx
            .session
            .request_export(DEFAULT_CENTER, DEFAULT_ZOOM)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NoShapeToExport));
        assert!(fx.export.requests.lock().is_empty());
    }

    #[tokio::test]
    async fn export_posts_viewport_with_rounded_zoom() {
        let fx = fixture();
        fx.session.start_drawing(ShapeRef::new("plot"));

        let export = fx
            .session
            .request_export(LngLat::new(77.2090, 28.6139), 12.6)
            .await
            .unwrap();
        assert_eq!(export.file_name, "map_export.png");
        assert!(!export.bytes.is_empty());

        let requests = fx.export.requests.lock();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].zoom, 13);
        assert_eq!(requests[0].center, [77.2090, 28.6139]);
        assert_eq!(requests[0].map_type, MapStyle::Road);
    }

    #[test]
    fn shape_area_reports_all_units() {
        let fx = fixture();
        *fx.surface.area.lock() = 10_000.0;

        let err = fx.session.shape_area().unwrap_err();
        assert!(matches!(err, AppError::NoShapeToExport));

        fx.session.start_drawing(ShapeRef::new("field"));
        let area = fx.session.shape_area().unwrap();
        assert_eq!(area.square_meters, 10_000.0);
        assert_eq!(area.hectares, 1.0);
    }

    #[test]
    fn style_names_map_to_sdk_styles() {
        assert_eq!(MapStyle::Satellite.sdk_style_name(), "satellite_road_labels");
        assert_eq!(MapStyle::from_sdk_style("satellite_road_labels"), MapStyle::Satellite);
        assert_eq!(MapStyle::from_sdk_style("road"), MapStyle::Road);
    }
}
