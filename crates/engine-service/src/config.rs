use std::env;

#[derive(Debug, Clone)]
pub struct EngineServiceConfig {
    /// Address to bind the HTTP server to
    pub bind_addr: String,

    /// Node ID for this engine service instance
    pub node_id: String,
}

impl EngineServiceConfig {
    pub fn from_env() -> Self {
        let bind_addr =
            env::var("ENGINE_SERVICE_ADDR").unwrap_or_else(|_| "0.0.0.0:8086".to_string());

        let node_id = env::var("NODE_ID").unwrap_or_else(|_| {
            format!(
                "engine-service-{}",
                hostname::get()
                    .ok()
                    .and_then(|h| h.into_string().ok())
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
            )
        });

        Self { bind_addr, node_id }
    }
}
