//! One-time, possibly-racing initialization of the gzip compute module.
//!
//! The [`Loader`] owns a three-state machine: `Idle → Loading → Ready`.
//! The suspending path ([`Loader::init`]) accepts bytes, a precompiled
//! module, a file path, a URL, an in-flight HTTP response, or a deferred
//! byte future; it memoizes a single in-flight load so concurrent callers
//! await the same operation instead of instantiating the module twice. The
//! non-suspending path ([`Loader::init_sync`]) instantiates immediately and
//! may overtake an in-flight load: the first completed path to reach `Ready`
//! wins, and a late asynchronous completion is discarded, never published.

use crate::error::{GzipError, Result};
use crate::gzip::GzipModule;
use crate::module::WasmExports;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use reqwest::Url;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use wasmtime::{Engine, Module};

/// File name of the module binary when no source is given.
const DEFAULT_MODULE_FILE: &str = "wasm_gzip.wasm";

/// A ready module handle, shared between everyone who initialized it.
///
/// The mutex serializes boundary calls; lock it to compress or decompress.
pub type SharedModule = Arc<Mutex<GzipModule<WasmExports>>>;

type LoadFuture = Shared<BoxFuture<'static, Result<SharedModule>>>;

/// A source the suspending init path can load the module from.
pub enum ModuleSource {
    /// Raw wasm binary bytes.
    Bytes(Vec<u8>),
    /// An already-compiled module.
    Precompiled(Module),
    /// A wasm binary on disk.
    Path(PathBuf),
    /// A URL to fetch the binary from.
    Url(Url),
    /// An in-flight HTTP response delivering the binary.
    Response(reqwest::Response),
    /// A future resolving to the binary bytes.
    Deferred(BoxFuture<'static, Result<Vec<u8>>>),
}

impl ModuleSource {
    /// Build a source from a future that resolves to the binary bytes.
    pub fn deferred<F>(fut: F) -> Self
    where
        F: Future<Output = Result<Vec<u8>>> + Send + 'static,
    {
        Self::Deferred(fut.boxed())
    }

    /// Short description of the source for diagnostics.
    fn describe(&self) -> String {
        match self {
            Self::Bytes(b) => format!("{} bytes", b.len()),
            Self::Precompiled(_) => "precompiled module".to_string(),
            Self::Path(p) => p.display().to_string(),
            Self::Url(u) => u.to_string(),
            Self::Response(r) => r.url().to_string(),
            Self::Deferred(_) => "deferred bytes".to_string(),
        }
    }
}

impl fmt::Debug for ModuleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModuleSource({})", self.describe())
    }
}

impl From<Vec<u8>> for ModuleSource {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<&[u8]> for ModuleSource {
    fn from(bytes: &[u8]) -> Self {
        Self::Bytes(bytes.to_vec())
    }
}

impl From<Module> for ModuleSource {
    fn from(module: Module) -> Self {
        Self::Precompiled(module)
    }
}

impl From<PathBuf> for ModuleSource {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&Path> for ModuleSource {
    fn from(path: &Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

impl From<Url> for ModuleSource {
    fn from(url: Url) -> Self {
        Self::Url(url)
    }
}

impl From<reqwest::Response> for ModuleSource {
    fn from(response: reqwest::Response) -> Self {
        Self::Response(response)
    }
}

/// A source the non-suspending init path can instantiate from.
///
/// Only already-available inputs qualify: raw bytes or a precompiled module.
#[derive(Debug)]
pub enum SyncModuleSource {
    /// Raw wasm binary bytes.
    Bytes(Vec<u8>),
    /// An already-compiled module.
    Precompiled(Module),
}

impl From<Vec<u8>> for SyncModuleSource {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<&[u8]> for SyncModuleSource {
    fn from(bytes: &[u8]) -> Self {
        Self::Bytes(bytes.to_vec())
    }
}

impl From<Module> for SyncModuleSource {
    fn from(module: Module) -> Self {
        Self::Precompiled(module)
    }
}

impl From<SyncModuleSource> for ModuleSource {
    fn from(source: SyncModuleSource) -> Self {
        match source {
            SyncModuleSource::Bytes(bytes) => Self::Bytes(bytes),
            SyncModuleSource::Precompiled(module) => Self::Precompiled(module),
        }
    }
}

enum LoadState {
    Idle,
    Loading { epoch: u64, pending: LoadFuture },
    Ready(SharedModule),
}

impl LoadState {
    fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Loading { .. } => "Loading",
            Self::Ready(_) => "Ready",
        }
    }
}

/// Loads and instantiates the gzip compute module exactly once.
pub struct Loader {
    engine: Engine,
    state: Mutex<LoadState>,
    /// Distinguishes in-flight loads across failure/retry cycles.
    epoch: AtomicU64,
}

impl Loader {
    /// Create a loader with a default wasmtime engine.
    #[must_use]
    pub fn new() -> Self {
        Self::with_engine(Engine::default())
    }

    /// Create a loader over a caller-configured engine.
    #[must_use]
    pub fn with_engine(engine: Engine) -> Self {
        Self {
            engine,
            state: Mutex::new(LoadState::Idle),
            epoch: AtomicU64::new(0),
        }
    }

    /// The wasmtime engine modules are compiled against.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Suspending initialization.
    ///
    /// Starts loading from `source` if nothing has been loaded yet, or joins
    /// the load already in flight (in which case `source` is ignored).
    /// Idempotent: once `Ready`, the existing handle is returned without
    /// reloading. If a [`Loader::init_sync`] call completes while the load
    /// is in flight, the synchronously-set handle wins and the asynchronous
    /// result is discarded.
    ///
    /// On failure the loader returns to `Idle`, so initialization may simply
    /// be retried.
    pub async fn init(&self, source: impl Into<ModuleSource>) -> Result<SharedModule> {
        let (pending, epoch) = {
            let mut state = self.state.lock();
            match &*state {
                LoadState::Ready(module) => return Ok(Arc::clone(module)),
                LoadState::Loading { epoch, pending } => (pending.clone(), *epoch),
                LoadState::Idle => {
                    let epoch = self.epoch.fetch_add(1, Ordering::Relaxed);
                    let pending = load(self.engine.clone(), source.into()).boxed().shared();
                    *state = LoadState::Loading {
                        epoch,
                        pending: pending.clone(),
                    };
                    (pending, epoch)
                }
            }
        };

        let loaded = pending.await;

        let mut state = self.state.lock();
        match &*state {
            // A synchronous init published a handle while the load was in
            // flight; that handle wins.
            LoadState::Ready(module) => {
                if loaded.is_ok() {
                    tracing::debug!("discarding async load result: init_sync completed first");
                }
                Ok(Arc::clone(module))
            }
            LoadState::Loading { epoch: current, .. } if *current == epoch => match loaded {
                Ok(module) => {
                    *state = LoadState::Ready(Arc::clone(&module));
                    Ok(module)
                }
                Err(err) => {
                    *state = LoadState::Idle;
                    Err(err)
                }
            },
            // Our load was superseded by a newer cycle; report our own
            // outcome without touching the current state.
            _ => loaded,
        }
    }

    /// Suspending initialization from the default location:
    /// `wasm_gzip.wasm` next to the current executable, falling back to the
    /// working directory.
    pub async fn init_default(&self) -> Result<SharedModule> {
        self.init(default_module_path()).await
    }

    /// Non-suspending initialization from already-available input.
    ///
    /// No-ops and returns the existing handle when already `Ready`.
    /// Otherwise instantiates immediately and transitions straight to
    /// `Ready`, superseding any load currently in flight. On failure the
    /// loader state is left untouched (an in-flight load keeps loading).
    pub fn init_sync(&self, source: impl Into<SyncModuleSource>) -> Result<SharedModule> {
        let mut state = self.state.lock();
        if let LoadState::Ready(module) = &*state {
            return Ok(Arc::clone(module));
        }

        let module = match source.into() {
            SyncModuleSource::Precompiled(module) => module,
            SyncModuleSource::Bytes(bytes) => compile(&self.engine, "bytes", &bytes)?,
        };
        let exports = WasmExports::instantiate(&self.engine, &module)?;
        let shared = Arc::new(Mutex::new(GzipModule::new(exports)));

        if matches!(&*state, LoadState::Loading { .. }) {
            tracing::debug!("init_sync overtaking an in-flight async load");
        }
        *state = LoadState::Ready(Arc::clone(&shared));
        Ok(shared)
    }

    /// The module handle, if initialization has completed.
    pub fn handle(&self) -> Result<SharedModule> {
        match &*self.state.lock() {
            LoadState::Ready(module) => Ok(Arc::clone(module)),
            _ => Err(GzipError::NotInitialized),
        }
    }

    /// Check whether the module is ready for boundary calls.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(&*self.state.lock(), LoadState::Ready(_))
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Loader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loader")
            .field("state", &self.state.lock().name())
            .finish()
    }
}

async fn load(engine: Engine, source: ModuleSource) -> Result<SharedModule> {
    let desc = source.describe();
    tracing::debug!(source = %desc, "loading gzip module");

    let module = fetch_module(&engine, source).await?;
    let exports = WasmExports::instantiate(&engine, &module)?;

    tracing::debug!(source = %desc, "gzip module instantiated");
    Ok(Arc::new(Mutex::new(GzipModule::new(exports))))
}

async fn fetch_module(engine: &Engine, source: ModuleSource) -> Result<Module> {
    match source {
        ModuleSource::Precompiled(module) => Ok(module),
        ModuleSource::Bytes(bytes) => compile(engine, "bytes", &bytes),
        ModuleSource::Path(path) => {
            let desc = path.display().to_string();
            let bytes = tokio::fs::read(&path).await.map_err(|e| GzipError::Load {
                module: desc.clone(),
                cause: e.to_string(),
            })?;
            compile(engine, &desc, &bytes)
        }
        ModuleSource::Url(url) => {
            let response = reqwest::get(url.clone()).await.map_err(|e| GzipError::Load {
                module: url.to_string(),
                cause: e.to_string(),
            })?;
            fetch_response(engine, response).await
        }
        ModuleSource::Response(response) => fetch_response(engine, response).await,
        ModuleSource::Deferred(fut) => {
            let bytes = fut.await?;
            compile(engine, "deferred bytes", &bytes)
        }
    }
}

async fn fetch_response(engine: &Engine, response: reqwest::Response) -> Result<Module> {
    let desc = response.url().to_string();

    let response = response.error_for_status().map_err(|e| GzipError::Load {
        module: desc.clone(),
        cause: e.to_string(),
    })?;

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if content_type != "application/wasm" {
        tracing::warn!(
            url = %desc,
            content_type = %content_type,
            "server does not serve the module with the `application/wasm` MIME type"
        );
    }

    let bytes = response.bytes().await.map_err(|e| GzipError::Load {
        module: desc.clone(),
        cause: e.to_string(),
    })?;
    compile(engine, &desc, &bytes)
}

fn compile(engine: &Engine, desc: &str, bytes: &[u8]) -> Result<Module> {
    Module::new(engine, bytes).map_err(|e| GzipError::Load {
        module: desc.to_string(),
        cause: e.to_string(),
    })
}

fn default_module_path() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(DEFAULT_MODULE_FILE)))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_MODULE_FILE))
}
