/// Liveness check. Does not check the engine.
pub async fn health() -> &'static str {
    "OK"
}
