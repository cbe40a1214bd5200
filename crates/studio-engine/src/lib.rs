pub mod cancel;
pub mod client;
pub mod config;
pub mod dryrun;
pub mod gemini;
pub mod runner;
pub mod source;

pub use cancel::CancelToken;
pub use client::{EditClient, EditClientRegistry, RemoteError};
pub use config::{timeout_from_secs, StudioConfig};
pub use dryrun::DryrunEditClient;
pub use gemini::GeminiEditClient;
pub use runner::{
    classify_batch_error, Declined, ResultsHandle, RunKind, RunObserver, RunOutcome, RunReport,
    Runner, RunnerConfig, CUSTOM_DISPLAY_NAME,
};
pub use source::{load_source_image, SourceImageError};

pub const DEFAULT_CLIENT: &str = "gemini";

pub fn default_client_registry(config: &StudioConfig) -> EditClientRegistry {
    let mut clients = EditClientRegistry::new();
    clients.register(DryrunEditClient::new());
    clients.register(GeminiEditClient::new(config));
    clients
}

#[cfg(test)]
mod tests {
    use super::{default_client_registry, StudioConfig, DEFAULT_CLIENT};

    #[test]
    fn default_registry_offers_gemini_and_dryrun() {
        let registry = default_client_registry(&StudioConfig::default());
        assert_eq!(registry.names(), vec!["dryrun", "gemini"]);
        assert!(registry.get(DEFAULT_CLIENT).is_some());
    }
}
