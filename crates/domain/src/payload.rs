use courier_core::{AppError, AppResult};
use serde::Serialize;
use serde_json::Value;

/// JSON body delivered to a webhook destination.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookPayload {
    /// Stable key shared by every retry of the same event.
    pub idempotency_key: String,
    /// Optional source bot identifier.
    pub bot_id: Option<String>,
    /// Public trigger code.
    pub trigger: String,
    /// Event data.
    pub data: Value,
}

impl WebhookPayload {
    /// Serializes the payload with sorted object keys and compact separators.
    ///
    /// These bytes are both the signed message and the request body.
    pub fn canonical_bytes(&self) -> AppResult<Vec<u8>> {
        let value = serde_json::to_value(self).map_err(|error| {
            AppError::Internal(format!("failed to serialize webhook payload: {error}"))
        })?;

        let mut output = String::new();
        write_canonical_json(&value, &mut output)?;
        Ok(output.into_bytes())
    }
}

fn write_canonical_json(value: &Value, output: &mut String) -> AppResult<()> {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|(left, _), (right, _)| left.cmp(right));

            output.push('{');
            for (index, (key, nested)) in entries.into_iter().enumerate() {
                if index > 0 {
                    output.push(',');
                }
                output.push_str(encode_scalar(&Value::String(key.clone()))?.as_str());
                output.push(':');
                write_canonical_json(nested, output)?;
            }
            output.push('}');
        }
        Value::Array(items) => {
            output.push('[');
            for (index, nested) in items.iter().enumerate() {
                if index > 0 {
                    output.push(',');
                }
                write_canonical_json(nested, output)?;
            }
            output.push(']');
        }
        scalar => output.push_str(encode_scalar(scalar)?.as_str()),
    }

    Ok(())
}

fn encode_scalar(value: &Value) -> AppResult<String> {
    serde_json::to_string(value).map_err(|error| {
        AppError::Internal(format!("failed to encode webhook payload value: {error}"))
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::WebhookPayload;

    fn payload(data: serde_json::Value) -> WebhookPayload {
        WebhookPayload {
            idempotency_key: "4b6c0a7e-0f43-4d55-9e68-8e0b7bb1c001".to_owned(),
            bot_id: None,
            trigger: "bot.state_change".to_owned(),
            data,
        }
    }

    #[test]
    fn canonical_bytes_sort_keys_recursively() {
        let bytes = payload(json!({"zeta": 1, "alpha": {"b": [true, null], "a": "x"}}))
            .canonical_bytes()
            .unwrap_or_else(|error| panic!("canonical bytes: {error}"));

        assert_eq!(
            String::from_utf8_lossy(&bytes),
            r#"{"bot_id":null,"data":{"alpha":{"a":"x","b":[true,null]},"zeta":1},"idempotency_key":"4b6c0a7e-0f43-4d55-9e68-8e0b7bb1c001","trigger":"bot.state_change"}"#
        );
    }

    #[test]
    fn canonical_bytes_keep_non_ascii_text() {
        let bytes = payload(json!({"name": "Zoë \"quoted\""}))
            .canonical_bytes()
            .unwrap_or_else(|error| panic!("canonical bytes: {error}"));

        let text = String::from_utf8_lossy(&bytes).into_owned();
        assert!(text.contains(r#""name":"Zoë \"quoted\"""#));
    }

    #[test]
    fn canonical_bytes_are_valid_json() {
        let original = payload(json!({"items": [{"b": 2, "a": 1}], "count": 2}));
        let bytes = original
            .canonical_bytes()
            .unwrap_or_else(|error| panic!("canonical bytes: {error}"));
        let parsed: serde_json::Value = serde_json::from_slice(&bytes)
            .unwrap_or_else(|error| panic!("parse canonical bytes: {error}"));

        assert_eq!(parsed["data"], original.data);
    }
}
