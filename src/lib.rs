//! Rectangle annotation editor.
//!
//! An [`EditSession`] owns the working rectangles of one image and
//! reconciles them with an [`AnnotationGateway`]. The [`SceneAdapter`]
//! turns pointer gestures into session commands, and the [`PreloadGate`]
//! keeps editing disabled until the image has been decoded and fitted.

pub mod app;
pub mod color;
pub mod config;
pub mod error;
pub mod gateway;
pub mod model;
pub mod preload;
pub mod scene;
pub mod session;
pub mod transform;

pub use config::EditorConfig;
pub use error::{ConfigError, GatewayError, PreloadError};
pub use gateway::{AnnotationGateway, GatewayRequest, GatewayResponse, JsonFileGateway, MemoryGateway};
pub use model::{Annotation, AnnotationId, RectanglePatch, WorkingRectangle};
pub use preload::{GateState, PreloadGate};
pub use scene::SceneAdapter;
pub use session::{EditSession, SaveReport, SyncReport};
pub use transform::ViewTransform;
