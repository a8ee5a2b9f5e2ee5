//! Scripted chat clients for tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::types::{ChatClient, ChatMessage, Completion, SamplingParams};
use super::LlmError;

/// Replies from a script, one per call. When the script runs out the last
/// reply is repeated.
pub struct ScriptedChatClient {
    replies: Mutex<VecDeque<Result<Completion, LlmError>>>,
    fallback: Mutex<Option<Completion>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<(String, Vec<ChatMessage>, SamplingParams)>>,
}

impl ScriptedChatClient {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(None),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Same text on every call.
    pub fn always(text: &str, tokens: u64) -> Self {
        Self::new().then_reply(text, tokens)
    }

    /// `fail_count` replies of `fail_text`, then `success_text` forever.
    pub fn fail_then_succeed(fail_count: usize, fail_text: &str, success_text: &str) -> Self {
        (0..fail_count)
            .fold(Self::new(), |client, _| client.then_reply(fail_text, 10))
            .then_reply(success_text, 10)
    }

    pub fn then_reply(self, text: &str, tokens: u64) -> Self {
        let completion = Completion {
            text: text.to_string(),
            total_tokens: tokens,
        };
        self.replies
            .lock()
            .unwrap()
            .push_back(Ok(completion.clone()));
        *self.fallback.lock().unwrap() = Some(completion);
        self
    }

    pub fn then_fail(self, error: LlmError) -> Self {
        self.replies.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every (model, messages, sampling) received, in call order.
    pub fn requests(&self) -> Vec<(String, Vec<ChatMessage>, SamplingParams)> {
        self.requests.lock().unwrap().clone()
    }
}

impl ChatClient for ScriptedChatClient {
    fn complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
        sampling: &SamplingParams,
    ) -> Result<Completion, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap()
            .push((model.to_string(), messages.to_vec(), *sampling));

        if let Some(reply) = self.replies.lock().unwrap().pop_front() {
            return reply;
        }
        self.fallback
            .lock()
            .unwrap()
            .clone()
            .ok_or(LlmError::EmptyChoices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_plays_in_order_then_repeats_last() {
        let client = ScriptedChatClient::new()
            .then_reply("first", 1)
            .then_reply("second", 2);
        let sampling = SamplingParams::default();

        let a = client.complete("m", &[], &sampling).unwrap();
        let b = client.complete("m", &[], &sampling).unwrap();
        let c = client.complete("m", &[], &sampling).unwrap();

        assert_eq!(a.text, "first");
        assert_eq!(b.text, "second");
        assert_eq!(c.text, "second");
        assert_eq!(client.calls(), 3);
    }

    #[test]
    fn records_requests() {
        let client = ScriptedChatClient::always("ok", 1);
        let sampling = SamplingParams {
            max_tokens: Some(10),
            temperature: None,
        };
        client
            .complete("gpt-4o", &[ChatMessage::user("hi")], &sampling)
            .unwrap();

        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].0, "gpt-4o");
        assert_eq!(requests[0].1[0].content, "hi");
        assert_eq!(requests[0].2.max_tokens, Some(10));
    }
}
