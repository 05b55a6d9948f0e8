use futures::future::BoxFuture;
use std::collections::VecDeque;
use std::sync::Mutex;

/// The provider call used to regenerate a response from a compensation prompt.
///
/// Errors are transport failures; they end the session and are never retried
/// by the reconciler.
pub trait ModelClient: Send + Sync {
    fn complete<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, anyhow::Result<String>>;
}

/// Serves scripted responses in order and remembers every prompt it was sent.
#[derive(Debug, Default)]
pub struct ReplayModel {
    responses: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ReplayModel {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        match self.prompts.lock() {
            Ok(prompts) => prompts.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts().len()
    }

    fn next_response(&self, prompt: &str) -> anyhow::Result<String> {
        match self.prompts.lock() {
            Ok(mut prompts) => prompts.push(prompt.to_string()),
            Err(poisoned) => poisoned.into_inner().push(prompt.to_string()),
        }
        let next = match self.responses.lock() {
            Ok(mut responses) => responses.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        };
        next.ok_or_else(|| anyhow::anyhow!("Replay model has no scripted response left"))
    }
}

impl ModelClient for ReplayModel {
    fn complete<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, anyhow::Result<String>> {
        let result = self.next_response(prompt);
        Box::pin(async move { result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replay_serves_in_order_then_errors() {
        let model = ReplayModel::new(["first", "second"]);
        assert_eq!(model.complete("p1").await.unwrap(), "first");
        assert_eq!(model.complete("p2").await.unwrap(), "second");
        let err = model.complete("p3").await.unwrap_err();
        assert!(err.to_string().contains("no scripted response"));
        assert_eq!(model.prompts(), vec!["p1", "p2", "p3"]);
    }
}
