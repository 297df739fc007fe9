//! Core of a field-survey mapping app: slope and grade calculators,
//! plus the session state machine that coordinates lazy mapping-SDK
//! bootstrap, shape drawing, distance measurement, and viewport
//! export. The DOM and the SDK itself stay outside; they reach this
//! crate through the `MapSurface`, `CredentialSource`,
//! `ResourceLoader`, and `ExportClient` seams.

mod calculator;
mod config;
mod errors;
mod export;
mod geo;
mod loader;
mod session;

use once_cell::sync::OnceCell;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use calculator::{
    convert, solve_slope, Conversion, ConversionInput, SlopeField, SlopeInputs, SlopeOutcome,
};
pub use config::AppConfig;
pub use errors::{AppError, AppResult};
pub use export::{ExportClient, ExportRequest, HttpExportClient};
pub use geo::{
    haversine_distance, meters_to_feet, path_length, AreaBreakdown, LngLat, EARTH_RADIUS_M,
};
pub use loader::{
    AuthMethod, CredentialSource, HttpCredentialSource, HttpResourceLoader, MapCredentials,
    ResourceLoader, SdkResource,
};
pub use session::{
    BootstrapPhase, MapExport, MapSession, MapStyle, MapSurface, ShapeRef, DEFAULT_CENTER,
    DEFAULT_ZOOM,
};

pub fn init_tracing() {
    static INIT: OnceCell<()> = OnceCell::new();
    let _ = INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,slopemap=debug"));
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    });
}
