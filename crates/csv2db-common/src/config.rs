//! Configuration helpers shared by the binaries

/// Worker count used when none is configured: one per available CPU.
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Load a `.env` file from the working directory or its parents, if any.
///
/// Must run before argument parsing so `env` fallbacks can see the values.
pub fn load_dotenv() {
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "Loaded environment file");
    }
}
