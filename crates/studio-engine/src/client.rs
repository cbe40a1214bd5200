use std::collections::BTreeMap;
use std::sync::Arc;

use studio_contracts::image::EncodedImage;

/// Every way a single remote edit can fail. The runner never propagates
/// these; each one becomes a failed task.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("{provider} API key not configured (set {hint})")]
    MissingCredential {
        provider: &'static str,
        hint: &'static str,
    },

    #[error("{provider} request failed: {message}")]
    Transport {
        provider: &'static str,
        message: String,
    },

    #[error("{provider} request failed ({status}): {body}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("{provider} returned an invalid response: {message}")]
    InvalidResponse {
        provider: &'static str,
        message: String,
    },

    #[error("No content generated")]
    NoContent,

    #[error("Model returned text instead of image: {0}")]
    TextInsteadOfImage(String),

    #[error("No image data found in response")]
    NoImageData,

    #[error("{0}")]
    Other(String),
}

/// One outbound image edit: source photo plus prompt in, one image out.
pub trait EditClient: Send + Sync {
    fn name(&self) -> &str;
    fn edit(&self, source: &EncodedImage, prompt: &str) -> Result<EncodedImage, RemoteError>;
}

#[derive(Default)]
pub struct EditClientRegistry {
    clients: BTreeMap<String, Arc<dyn EditClient>>,
}

impl EditClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<C: EditClient + 'static>(&mut self, client: C) {
        self.clients
            .insert(client.name().to_string(), Arc::new(client));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn EditClient>> {
        self.clients.get(name.trim()).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.clients.keys().cloned().collect()
    }
}
