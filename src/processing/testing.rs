//! Scripted completion client shared by the pipeline tests.

use crate::completion::{
    CompletionClient, CompletionError, CompletionProvider, CompletionRequest, Credential,
};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

type Responder = dyn Fn(&str) -> Result<String, CompletionError> + Send + Sync;

/// Answers every prompt through a closure and records what it was asked.
#[derive(Clone)]
pub(crate) struct ScriptedClient {
    responder: Arc<Responder>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedClient {
    pub(crate) fn new(
        responder: impl Fn(&str) -> Result<String, CompletionError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Arc::new(responder),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Replies to final prompts with a well-formed two-paragraph summary and to everything
    /// else with a short condensation.
    pub(crate) fn well_behaved() -> Self {
        Self::new(|prompt| {
            if prompt.contains("Category of the Document") {
                Ok("The document sets out the terms of an agreement.\n\n\
                    It lists the obligations of both parties.\n\n\
                    | Category of the Document | Legal Agreement |"
                    .to_string())
            } else {
                Ok("condensed".to_string())
            }
        })
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompt log").clone()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.prompts.lock().expect("prompt log").len()
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
        self.prompts
            .lock()
            .expect("prompt log")
            .push(request.prompt.clone());
        (self.responder)(&request.prompt)
    }
}

impl CompletionProvider for ScriptedClient {
    fn client_for(&self, _credential: &Credential) -> Box<dyn CompletionClient> {
        Box::new(self.clone())
    }
}
