//! Persistence gateway boundary.
//!
//! The edit session talks to the store through [`AnnotationGateway`]. Calls
//! are dispatched without waiting and their completions are collected later
//! with [`AnnotationGateway::poll`], which keeps the session single-threaded
//! and frame-driven.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};

use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::model::{
    Annotation, AnnotationId, CreateAnnotationPayload, UpdateAnnotationPayload, new_local_id,
};

/// A call to the persistence layer.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayRequest {
    Create(CreateAnnotationPayload),
    Update {
        id: AnnotationId,
        payload: UpdateAnnotationPayload,
    },
    Delete {
        id: AnnotationId,
    },
    List {
        image_id: u64,
    },
}

impl GatewayRequest {
    pub fn describe(&self) -> String {
        match self {
            GatewayRequest::Create(_) => "create".to_string(),
            GatewayRequest::Update { id, .. } => format!("update {}", id),
            GatewayRequest::Delete { id } => format!("delete {}", id),
            GatewayRequest::List { image_id } => format!("list image {}", image_id),
        }
    }
}

/// Completion of a [`GatewayRequest`].
#[derive(Debug)]
pub enum GatewayResponse {
    Created(Result<Annotation, GatewayError>),
    Updated {
        id: AnnotationId,
        result: Result<Annotation, GatewayError>,
    },
    Deleted {
        id: AnnotationId,
        result: Result<(), GatewayError>,
    },
    Listed {
        image_id: u64,
        result: Result<Vec<Annotation>, GatewayError>,
    },
}

impl GatewayResponse {
    /// Build the failed completion for a request that never reached the store.
    pub fn failed(request: GatewayRequest, error: GatewayError) -> Self {
        match request {
            GatewayRequest::Create(_) => GatewayResponse::Created(Err(error)),
            GatewayRequest::Update { id, .. } => GatewayResponse::Updated {
                id,
                result: Err(error),
            },
            GatewayRequest::Delete { id } => GatewayResponse::Deleted {
                id,
                result: Err(error),
            },
            GatewayRequest::List { image_id } => GatewayResponse::Listed {
                image_id,
                result: Err(error),
            },
        }
    }

    /// Create, update and delete change the store; list does not.
    pub fn is_mutation(&self) -> bool {
        !matches!(self, GatewayResponse::Listed { .. })
    }

    pub fn is_ok(&self) -> bool {
        match self {
            GatewayResponse::Created(r) => r.is_ok(),
            GatewayResponse::Updated { result, .. } => result.is_ok(),
            GatewayResponse::Deleted { result, .. } => result.is_ok(),
            GatewayResponse::Listed { result, .. } => result.is_ok(),
        }
    }
}

/// Create/update/delete/list against some annotation store.
pub trait AnnotationGateway {
    /// Start a call. Must return without waiting for it to complete.
    fn dispatch(&mut self, request: GatewayRequest);

    /// Drain the calls that completed since the last poll.
    fn poll(&mut self) -> Vec<GatewayResponse>;
}

/// Execute one request against a collection of stored annotations.
fn apply_request(annotations: &mut Vec<Annotation>, request: GatewayRequest) -> GatewayResponse {
    match request {
        GatewayRequest::Create(payload) => {
            let annotation = Annotation::from_create(new_local_id(), &payload);
            annotations.push(annotation.clone());
            GatewayResponse::Created(Ok(annotation))
        }
        GatewayRequest::Update { id, payload } => {
            let result = match annotations.iter_mut().find(|a| a.id == id) {
                Some(stored) => {
                    stored.apply_update(&payload);
                    Ok(stored.clone())
                }
                None => Err(GatewayError::not_found(id.clone())),
            };
            GatewayResponse::Updated { id, result }
        }
        GatewayRequest::Delete { id } => {
            let before = annotations.len();
            annotations.retain(|a| a.id != id);
            let result = if annotations.len() < before {
                Ok(())
            } else {
                Err(GatewayError::not_found(id.clone()))
            };
            GatewayResponse::Deleted { id, result }
        }
        GatewayRequest::List { image_id } => GatewayResponse::Listed {
            image_id,
            result: Ok(annotations
                .iter()
                .filter(|a| a.image_id == image_id)
                .cloned()
                .collect()),
        },
    }
}

// ── In-memory gateway ───────────────────────────────────────────────────────

/// Gateway backed by a `Vec`. Calls complete on the next [`poll`](AnnotationGateway::poll).
///
/// Every dispatched request is recorded, which makes this the gateway of
/// choice for exercising the session.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    annotations: Vec<Annotation>,
    completed: VecDeque<GatewayResponse>,
    requests: Vec<GatewayRequest>,
    fail_mutations: bool,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_annotations(annotations: Vec<Annotation>) -> Self {
        Self {
            annotations,
            ..Default::default()
        }
    }

    /// Make create/update/delete fail with [`GatewayError::Disconnected`].
    pub fn set_fail_mutations(&mut self, fail: bool) {
        self.fail_mutations = fail;
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    /// All requests dispatched so far, in order.
    pub fn requests(&self) -> &[GatewayRequest] {
        &self.requests
    }

    /// Number of dispatched calls that have not been polled yet.
    pub fn pending(&self) -> usize {
        self.completed.len()
    }
}

impl AnnotationGateway for MemoryGateway {
    fn dispatch(&mut self, request: GatewayRequest) {
        self.requests.push(request.clone());
        let is_list = matches!(request, GatewayRequest::List { .. });
        let response = if self.fail_mutations && !is_list {
            GatewayResponse::failed(request, GatewayError::Disconnected)
        } else {
            apply_request(&mut self.annotations, request)
        };
        self.completed.push_back(response);
    }

    fn poll(&mut self) -> Vec<GatewayResponse> {
        self.completed.drain(..).collect()
    }
}

// ── JSON sidecar file gateway ───────────────────────────────────────────────

/// On-disk layout of the sidecar file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct AnnotationFile {
    annotations: Vec<Annotation>,
}

/// Sidecar path for an image: `photo.png` -> `photo.png.annotations.json`.
pub fn sidecar_path(image_path: &Path) -> PathBuf {
    let mut name = image_path.as_os_str().to_os_string();
    name.push(".annotations.json");
    PathBuf::from(name)
}

fn load_file(path: &Path) -> Result<AnnotationFile, GatewayError> {
    if !path.exists() {
        return Ok(AnnotationFile::default());
    }
    let data = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

fn save_file(path: &Path, file: &AnnotationFile) -> Result<(), GatewayError> {
    let data = serde_json::to_string_pretty(file)?;
    std::fs::write(path, data)?;
    Ok(())
}

/// Run one request against the sidecar file, reading and rewriting it.
fn handle_file_request(path: &Path, request: GatewayRequest) -> GatewayResponse {
    let mut file = match load_file(path) {
        Ok(file) => file,
        Err(e) => return GatewayResponse::failed(request, e),
    };
    if matches!(request, GatewayRequest::List { .. }) {
        return apply_request(&mut file.annotations, request);
    }

    let original_request = request.clone();
    let response = apply_request(&mut file.annotations, request);
    if response.is_ok() {
        if let Err(e) = save_file(path, &file) {
            log::error!("Failed to write {:?}: {}", path, e);
            return GatewayResponse::failed(original_request, e);
        }
    }
    response
}

enum WorkerMessage {
    Request(GatewayRequest),
    Shutdown,
}

/// Gateway persisting to a JSON file on a background thread.
pub struct JsonFileGateway {
    path: PathBuf,
    request_tx: Sender<WorkerMessage>,
    response_rx: Receiver<GatewayResponse>,
    thread_handle: Option<JoinHandle<()>>,
    /// Requests sent to the worker and not answered yet, oldest first.
    outstanding: VecDeque<GatewayRequest>,
    /// Completions synthesized locally when the worker is gone.
    failed: Vec<GatewayResponse>,
}

impl JsonFileGateway {
    /// Spawn the worker thread for the given sidecar file.
    pub fn spawn(path: impl Into<PathBuf>) -> Result<Self, GatewayError> {
        let path = path.into();
        let (request_tx, request_rx) = mpsc::channel::<WorkerMessage>();
        let (response_tx, response_rx) = mpsc::channel::<GatewayResponse>();

        let worker_path = path.clone();
        let thread_handle = thread::Builder::new()
            .name("annotation-store".to_string())
            .spawn(move || {
                log::info!("Annotation store thread started for {:?}", worker_path);
                Self::thread_loop(&worker_path, request_rx, response_tx);
                log::info!("Annotation store thread exiting");
            })?;

        Ok(Self {
            path,
            request_tx,
            response_rx,
            thread_handle: Some(thread_handle),
            outstanding: VecDeque::new(),
            failed: Vec::new(),
        })
    }

    /// Gateway for the sidecar file of an image.
    pub fn for_image(image_path: &Path) -> Result<Self, GatewayError> {
        Self::spawn(sidecar_path(image_path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn thread_loop(path: &Path, request_rx: Receiver<WorkerMessage>, response_tx: Sender<GatewayResponse>) {
        loop {
            match request_rx.recv() {
                Ok(WorkerMessage::Request(request)) => {
                    log::debug!("Store handling {}", request.describe());
                    let response = handle_file_request(path, request);
                    if response_tx.send(response).is_err() {
                        log::warn!("Response channel closed, store thread exiting");
                        break;
                    }
                }
                Ok(WorkerMessage::Shutdown) => {
                    log::debug!("Received shutdown signal");
                    break;
                }
                Err(_) => {
                    log::debug!("Request channel closed, store thread exiting");
                    break;
                }
            }
        }
    }
}

impl AnnotationGateway for JsonFileGateway {
    fn dispatch(&mut self, request: GatewayRequest) {
        self.outstanding.push_back(request.clone());
        if self.request_tx.send(WorkerMessage::Request(request)).is_err() {
            log::error!("Annotation store thread is gone");
            if let Some(request) = self.outstanding.pop_back() {
                self.failed
                    .push(GatewayResponse::failed(request, GatewayError::Disconnected));
            }
        }
    }

    fn poll(&mut self) -> Vec<GatewayResponse> {
        let mut responses: Vec<GatewayResponse> = self.failed.drain(..).collect();
        loop {
            match self.response_rx.try_recv() {
                Ok(response) => {
                    // the worker answers in dispatch order
                    self.outstanding.pop_front();
                    responses.push(response);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !self.outstanding.is_empty() {
                        log::warn!(
                            "Annotation store disconnected with {} call(s) unanswered",
                            self.outstanding.len()
                        );
                    }
                    responses.extend(
                        self.outstanding
                            .drain(..)
                            .map(|r| GatewayResponse::failed(r, GatewayError::Disconnected)),
                    );
                    break;
                }
            }
        }
        responses
    }
}

impl Drop for JsonFileGateway {
    fn drop(&mut self) {
        let _ = self.request_tx.send(WorkerMessage::Shutdown);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}
