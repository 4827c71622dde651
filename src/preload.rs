//! Image preload gate.
//!
//! The image is decoded on a background thread so its pixel size is known
//! before anything is drawn. Only once decoding finished is the session's
//! fit transform computed and editing enabled. A failed load keeps the gate
//! closed.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;

use egui::Vec2;
use image::RgbaImage;

use crate::error::PreloadError;
use crate::gateway::AnnotationGateway;
use crate::session::EditSession;

/// A fully decoded image.
pub struct LoadedImage {
    pub path: PathBuf,
    pub pixels: RgbaImage,
}

impl LoadedImage {
    pub fn size(&self) -> Vec2 {
        Vec2::new(self.pixels.width() as f32, self.pixels.height() as f32)
    }
}

fn decode(path: &Path) -> Result<LoadedImage, PreloadError> {
    let decoded = image::open(path).map_err(|source| PreloadError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    let pixels = decoded.to_rgba8();
    if pixels.width() == 0 || pixels.height() == 0 {
        return Err(PreloadError::ZeroSized {
            path: path.to_path_buf(),
        });
    }
    Ok(LoadedImage {
        path: path.to_path_buf(),
        pixels,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub enum GateState {
    Loading,
    Ready { width: u32, height: u32 },
    Failed(String),
}

/// Keeps editing disabled until the image is decoded and fitted.
pub struct PreloadGate {
    result_rx: Option<Receiver<Result<LoadedImage, PreloadError>>>,
    state: GateState,
}

impl PreloadGate {
    /// Start decoding the image in the background.
    pub fn start(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let (result_tx, result_rx) = mpsc::channel();

        let spawned = thread::Builder::new()
            .name("image-preload".to_string())
            .spawn(move || {
                log::debug!("Preloading {:?}", path);
                let _ = result_tx.send(decode(&path));
            });

        match spawned {
            Ok(_) => Self {
                result_rx: Some(result_rx),
                state: GateState::Loading,
            },
            Err(e) => {
                let error = PreloadError::from(e);
                log::error!("{}", error);
                Self {
                    result_rx: None,
                    state: GateState::Failed(error.to_string()),
                }
            }
        }
    }

    pub fn state(&self) -> &GateState {
        &self.state
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, GateState::Ready { .. })
    }

    /// Check for decode completion. On success the session is fitted to
    /// `viewport` and the decoded image is handed back exactly once.
    pub fn poll<G: AnnotationGateway>(
        &mut self,
        session: &mut EditSession<G>,
        viewport: Vec2,
    ) -> Option<LoadedImage> {
        let rx = self.result_rx.as_ref()?;
        let result = match rx.try_recv() {
            Ok(result) => result,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => Err(PreloadError::Disconnected),
        };
        self.result_rx = None;

        match result {
            Ok(image) => {
                let size = image.size();
                session.compute_fit_transform(size.x, size.y, viewport.x, viewport.y);
                self.state = GateState::Ready {
                    width: image.pixels.width(),
                    height: image.pixels.height(),
                };
                log::info!("Loaded {:?} ({}x{})", image.path, size.x, size.y);
                Some(image)
            }
            Err(e) => {
                log::error!("{}", e);
                self.state = GateState::Failed(e.to_string());
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MemoryGateway;
    use std::time::{Duration, Instant};

    fn wait_for<G: AnnotationGateway>(
        gate: &mut PreloadGate,
        session: &mut EditSession<G>,
    ) -> Option<LoadedImage> {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if let Some(image) = gate.poll(session, Vec2::new(1200.0, 700.0)) {
                return Some(image);
            }
            if !matches!(gate.state(), GateState::Loading) {
                return None;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        None
    }

    #[test]
    fn test_gate_fits_session_once_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wide.png");
        RgbaImage::new(2000, 1000).save(&path).unwrap();

        let mut session = EditSession::new(1, MemoryGateway::new(), &[]);
        let mut gate = PreloadGate::start(&path);
        let image = wait_for(&mut gate, &mut session).expect("image should load");

        assert_eq!(image.size(), Vec2::new(2000.0, 1000.0));
        assert_eq!(
            gate.state(),
            &GateState::Ready {
                width: 2000,
                height: 1000
            }
        );
        assert!((session.scale() - 0.54).abs() < 1e-4);
        assert!(gate.poll(&mut session, Vec2::new(1200.0, 700.0)).is_none());
    }

    #[test]
    fn test_gate_stays_closed_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.png");

        let mut session = EditSession::new(1, MemoryGateway::new(), &[]);
        let mut gate = PreloadGate::start(&path);
        assert!(wait_for(&mut gate, &mut session).is_none());
        assert!(matches!(gate.state(), GateState::Failed(_)));
        assert!(!gate.is_ready());
        assert_eq!(session.scale(), 1.0);
    }
}
