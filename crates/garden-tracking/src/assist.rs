//! User-initiated AI assists: translation and icebreakers.
//!
//! Unlike tracking calls these return their errors, since the user is
//! waiting on the result. Rate-limit and quota failures also leave a
//! [`Notice`] in the shared queue.

use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tracing::{debug, warn};

use garden_backend::schema::functions;
use garden_backend::Backend;
use garden_common::{Notice, NoticeQueue, TrackingError};
use garden_config::schema::Language;

use crate::lock;
use crate::policy::{classify, FailureClass};

pub struct Assist {
    backend: Arc<dyn Backend>,
    notices: Arc<Mutex<NoticeQueue>>,
    language: Language,
}

impl Assist {
    /// `language` is the default translation target.
    pub fn new(
        backend: Arc<dyn Backend>,
        notices: Arc<Mutex<NoticeQueue>>,
        language: Language,
    ) -> Self {
        Self {
            backend,
            notices,
            language,
        }
    }

    pub async fn translate(
        &self,
        text: &str,
        target: Option<Language>,
    ) -> Result<String, TrackingError> {
        let target = target.unwrap_or(self.language);
        let payload = json!({ "text": text, "targetLanguage": target.code() });
        let response = self.call("Translation", functions::TRANSLATE, payload).await?;
        string_field(&response, "translatedText")
    }

    /// Suggest an opener for meeting someone at a Lab.
    pub async fn icebreaker(
        &self,
        lab_name: Option<&str>,
        interests: &[String],
    ) -> Result<String, TrackingError> {
        let payload = json!({
            "labName": lab_name,
            "interests": interests,
            "language": self.language.code(),
        });
        let response = self
            .call("Icebreakers", functions::ICEBREAKER, payload)
            .await?;
        string_field(&response, "icebreaker")
    }

    async fn call(&self, feature: &str, name: &str, payload: Value) -> Result<Value, TrackingError> {
        debug!(function = name, "Assist request");
        match self.backend.invoke_function(name, payload).await {
            Ok(response) => Ok(response),
            Err(err) => {
                warn!(function = name, error = %err, "Assist request failed");
                if classify(&err) == FailureClass::Notice {
                    lock(&self.notices).push(Notice::rate_limited(feature));
                }
                Err(err)
            }
        }
    }
}

fn string_field(response: &Value, field: &str) -> Result<String, TrackingError> {
    response
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| TrackingError::Decode(format!("response has no `{field}`")))
}
