//! Hook through which refreshed tokens reach the caller's storage.

use std::future::Future;

use async_trait::async_trait;

use crate::error::SynclineError;

use super::token::Tokens;

/// Invoked after every successful refresh, before the request that needed
/// the new token is sent.
#[async_trait]
pub trait TokenPersister: Send + Sync {
    async fn persist(&self, tokens: &Tokens) -> Result<(), SynclineError>;
}

/// Discards refreshed tokens. The default when no hook is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPersister;

#[async_trait]
impl TokenPersister for NoopPersister {
    async fn persist(&self, _tokens: &Tokens) -> Result<(), SynclineError> {
        Ok(())
    }
}

/// Adapts an async closure into a [`TokenPersister`].
///
/// # Example
/// ```
/// use syncline::auth::{on_token_refresh, Tokens};
///
/// let hook = on_token_refresh(|tokens: Tokens| async move {
///     // write `tokens` to the integrations table
///     let _ = tokens;
///     Ok::<(), syncline::error::SynclineError>(())
/// });
/// # let _ = hook;
/// ```
pub fn on_token_refresh<F, Fut>(callback: F) -> CallbackPersister<F>
where
    F: Fn(Tokens) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), SynclineError>> + Send,
{
    CallbackPersister { callback }
}

pub struct CallbackPersister<F> {
    callback: F,
}

#[async_trait]
impl<F, Fut> TokenPersister for CallbackPersister<F>
where
    F: Fn(Tokens) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), SynclineError>> + Send,
{
    async fn persist(&self, tokens: &Tokens) -> Result<(), SynclineError> {
        (self.callback)(tokens.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[tokio::test]
    async fn callback_receives_a_copy_of_the_tokens() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let hook = on_token_refresh(move |tokens: Tokens| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().push(tokens.access_token);
                Ok::<_, SynclineError>(())
            }
        });

        hook.persist(&Tokens::new("fresh")).await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["fresh".to_string()]);
    }
}
