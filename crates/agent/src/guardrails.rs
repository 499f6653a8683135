use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use shelfmate_core::domain::moderation::ModerationVerdict;

use crate::moderation::ModerationClient;
use crate::providers::with_timeout;

pub const GENERIC_SAFETY_MESSAGE: &str = "부적절한 내용이 감지되었습니다. 주제를 변경해 주세요.";

pub const SELF_HARM_SUPPORT_MESSAGE: &str = "혹시라도 힘든 상황에 계시다면, 혼자 고민하지 마세요. \
전문가의 도움을 받을 수 있습니다. 보건복지부 희망의 전화 1393에 연락해 보세요. \
24시간 언제든 익명으로 상담이 가능합니다.";

/// Fail-closed wrapper around the moderation backend.
#[derive(Clone)]
pub struct SafetyGate {
    client: Arc<dyn ModerationClient>,
    timeout: Duration,
}

impl SafetyGate {
    pub fn new(client: Arc<dyn ModerationClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// `None` for blank text, which never reaches the backend. Any backend failure,
    /// including a timeout, yields a flagged verdict without the self-harm category.
    pub async fn check(&self, text: &str) -> Option<ModerationVerdict> {
        if text.trim().is_empty() {
            return None;
        }

        match with_timeout(self.timeout, self.client.moderate(text)).await {
            Ok(verdict) => Some(verdict),
            Err(error) => {
                warn!(
                    event_name = "safety.moderation_failed",
                    error = %error,
                    "moderation backend failed; treating text as unsafe"
                );
                Some(ModerationVerdict::fail_closed())
            }
        }
    }

    /// Convenience for callers that only need the blocking decision.
    pub async fn flagged(&self, text: &str) -> Option<ModerationVerdict> {
        self.check(text).await.filter(|verdict| verdict.flagged)
    }

    pub fn to_safe_response(verdict: &ModerationVerdict) -> &'static str {
        if verdict.is_self_harm() {
            SELF_HARM_SUPPORT_MESSAGE
        } else {
            GENERIC_SAFETY_MESSAGE
        }
    }
}
