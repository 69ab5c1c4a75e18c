use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::future::Future;

use crate::ledger::{ExportFile, XLSX_CONTENT_TYPE};
use crate::utils::ascii_filename;
use crate::{ServiceError, ServiceResult};

pub const CORS_ALLOW_ORIGIN: &str = "*";
pub const CORS_ALLOW_HEADERS: &str = "authorization, x-client-info, apikey, content-type";
pub const CORS_ALLOW_METHODS: &str = "GET, POST, OPTIONS";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HttpDescription {
    #[serde(default)]
    pub method: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestContext {
    #[serde(default)]
    pub http: Option<HttpDescription>,
}

/// HTTP invocation event (function URL / HTTP API payload v2, with the REST
/// API `httpMethod` accepted as a fallback).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRequest {
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub is_base64_encoded: bool,
    #[serde(default)]
    pub request_context: Option<RequestContext>,
    #[serde(default)]
    pub http_method: Option<String>,
}

impl HttpRequest {
    pub fn method(&self) -> &str {
        self.request_context
            .as_ref()
            .and_then(|ctx| ctx.http.as_ref())
            .and_then(|http| http.method.as_deref())
            .or(self.http_method.as_deref())
            .unwrap_or("")
    }

    pub fn is_preflight(&self) -> bool {
        self.method().eq_ignore_ascii_case("OPTIONS")
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .as_ref()?
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn bearer_token(&self) -> Option<&str> {
        let value = self.header("authorization")?.trim();
        let token = match value.split_once(char::is_whitespace) {
            Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest,
            None if value.eq_ignore_ascii_case("bearer") => "",
            _ => value,
        };
        let token = token.trim();
        if token.is_empty() {
            None
        } else {
            Some(token)
        }
    }

    pub fn body_text(&self) -> ServiceResult<String> {
        let raw = self.body.as_deref().unwrap_or("");
        if !self.is_base64_encoded {
            return Ok(raw.to_string());
        }
        let bytes = BASE64
            .decode(raw.trim())
            .map_err(|e| ServiceError::Serialization(format!("Corpo da requisição inválido: {}", e)))?;
        String::from_utf8(bytes)
            .map_err(|e| ServiceError::Serialization(format!("Corpo da requisição inválido: {}", e)))
    }

    /// Deserialize the JSON body. An empty body reads as `{}` so field
    /// validation reports what is missing.
    pub fn json_body<T: DeserializeOwned>(&self) -> ServiceResult<T> {
        let text = self.body_text()?;
        let text = if text.trim().is_empty() { "{}" } else { text.as_str() };
        Ok(serde_json::from_str(text)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpResponse {
    pub status_code: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
    pub is_base64_encoded: bool,
}

fn cors_headers() -> HashMap<String, String> {
    HashMap::from([
        ("Access-Control-Allow-Origin".to_string(), CORS_ALLOW_ORIGIN.to_string()),
        ("Access-Control-Allow-Headers".to_string(), CORS_ALLOW_HEADERS.to_string()),
        ("Access-Control-Allow-Methods".to_string(), CORS_ALLOW_METHODS.to_string()),
    ])
}

impl HttpResponse {
    pub fn preflight() -> Self {
        Self {
            status_code: 200,
            headers: cors_headers(),
            body: "ok".to_string(),
            is_base64_encoded: false,
        }
    }

    pub fn json(status_code: u16, body: &Value) -> Self {
        let mut headers = cors_headers();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        Self {
            status_code,
            headers,
            body: body.to_string(),
            is_base64_encoded: false,
        }
    }

    /// `{ success: true, message, ...extra }`
    pub fn success(message: &str, extra: Option<Map<String, Value>>) -> Self {
        let mut payload = Map::new();
        payload.insert("success".to_string(), Value::Bool(true));
        payload.insert("message".to_string(), Value::String(message.to_string()));
        for (key, value) in extra.unwrap_or_default() {
            payload.entry(key).or_insert(value);
        }
        Self::json(200, &Value::Object(payload))
    }

    /// `{ success: false, error }`
    pub fn failure(err: &ServiceError) -> Self {
        Self::json(err.status_code(), &json!({ "success": false, "error": err.to_string() }))
    }

    pub fn spreadsheet(file: &ExportFile) -> Self {
        let mut headers = cors_headers();
        headers.insert("Content-Type".to_string(), XLSX_CONTENT_TYPE.to_string());
        headers.insert("Content-Disposition".to_string(), content_disposition(&file.filename));
        Self {
            status_code: 200,
            headers,
            body: BASE64.encode(&file.bytes),
            is_base64_encoded: true,
        }
    }
}

/// `attachment` disposition. Non-ASCII names get an ASCII `filename` plus the
/// UTF-8 `filename*` form (RFC 5987).
pub fn content_disposition(filename: &str) -> String {
    if filename.is_ascii() {
        return format!("attachment; filename=\"{}\"", filename);
    }
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        ascii_filename(filename),
        rfc5987_encode(filename)
    )
}

fn rfc5987_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len() * 3);
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' => out.push(byte as char),
            b'!' | b'#' | b'$' | b'&' | b'+' | b'-' | b'.' | b'^' | b'_' | b'`' | b'|' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

/// Answer preflights directly, otherwise run the handler and fold any error
/// into the failure envelope.
pub async fn respond<F, Fut>(request: &HttpRequest, function: &str, handler: F) -> HttpResponse
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = ServiceResult<HttpResponse>>,
{
    if request.is_preflight() {
        tracing::debug!("{} preflight", function);
        return HttpResponse::preflight();
    }

    match handler().await {
        Ok(response) => {
            tracing::info!("✅ {} succeeded", function);
            response
        }
        Err(err) => {
            tracing::error!("❌ {} failed ({}): {}", function, err.kind(), err);
            HttpResponse::failure(&err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(value: Value) -> HttpRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_method_from_either_payload_version() {
        let v2 = event(json!({ "requestContext": { "http": { "method": "OPTIONS" } } }));
        assert!(v2.is_preflight());

        let v1 = event(json!({ "httpMethod": "POST", "headers": null, "requestContext": { "stage": "prod" } }));
        assert_eq!(v1.method(), "POST");
        assert!(!v1.is_preflight());
    }

    #[test]
    fn test_bearer_token_extraction() {
        let request = event(json!({ "headers": { "Authorization": "Bearer abc.def" } }));
        assert_eq!(request.bearer_token(), Some("abc.def"));

        let request = event(json!({ "headers": { "authorization": "bearer   xyz " } }));
        assert_eq!(request.bearer_token(), Some("xyz"));

        let request = event(json!({ "headers": { "authorization": "Bearer " } }));
        assert_eq!(request.bearer_token(), None);

        let request = event(json!({ "headers": { "authorization": "BEARER" } }));
        assert_eq!(request.bearer_token(), None);

        let request = event(json!({ "headers": { "authorization": "Bearer\t tok-1" } }));
        assert_eq!(request.bearer_token(), Some("tok-1"));

        let request = event(json!({ "headers": { "authorization": "raw-token" } }));
        assert_eq!(request.bearer_token(), Some("raw-token"));

        assert_eq!(HttpRequest::default().bearer_token(), None);
    }

    #[test]
    fn test_json_body_plain_and_base64() {
        #[derive(Deserialize)]
        struct Body {
            email: Option<String>,
        }

        let plain = event(json!({ "body": "{\"email\":\"a@b.com\"}" }));
        assert_eq!(plain.json_body::<Body>().unwrap().email.as_deref(), Some("a@b.com"));

        let encoded = event(json!({
            "body": BASE64.encode("{\"email\":\"c@d.com\"}"),
            "isBase64Encoded": true
        }));
        assert_eq!(encoded.json_body::<Body>().unwrap().email.as_deref(), Some("c@d.com"));

        let empty = HttpRequest::default();
        assert!(empty.json_body::<Body>().unwrap().email.is_none());

        let broken = event(json!({ "body": "{oops" }));
        assert_eq!(broken.json_body::<Body>().err().map(|e| e.kind()), Some("serialization"));
    }

    #[test]
    fn test_envelopes() {
        let mut extra = Map::new();
        extra.insert("user_id".to_string(), json!("u-1"));
        let ok = HttpResponse::success("Feito", Some(extra));
        let body: Value = serde_json::from_str(&ok.body).unwrap();
        assert_eq!(ok.status_code, 200);
        assert_eq!(body, json!({ "success": true, "message": "Feito", "user_id": "u-1" }));
        assert_eq!(ok.headers.get("Access-Control-Allow-Origin").map(String::as_str), Some("*"));

        let err = HttpResponse::failure(&ServiceError::Validation("E-mail é obrigatório.".to_string()));
        let body: Value = serde_json::from_str(&err.body).unwrap();
        assert_eq!(err.status_code, 400);
        assert_eq!(body, json!({ "success": false, "error": "E-mail é obrigatório." }));
    }

    #[test]
    fn test_preflight_and_spreadsheet() {
        let pre = HttpResponse::preflight();
        assert_eq!(pre.body, "ok");
        assert_eq!(
            pre.headers.get("Access-Control-Allow-Headers").map(String::as_str),
            Some(CORS_ALLOW_HEADERS)
        );

        let file = ExportFile {
            filename: "estoque_tanque_TQ_01.xlsx".to_string(),
            bytes: vec![0x50, 0x4b, 0x03, 0x04],
        };
        let response = HttpResponse::spreadsheet(&file);
        assert!(response.is_base64_encoded);
        assert_eq!(BASE64.decode(&response.body).unwrap(), file.bytes);
        assert_eq!(
            response.headers.get("Content-Disposition").map(String::as_str),
            Some("attachment; filename=\"estoque_tanque_TQ_01.xlsx\"")
        );
    }

    #[test]
    fn test_non_ascii_download_name() {
        assert_eq!(
            content_disposition("estoque_Paulínia_Norte_05-2024.xlsx"),
            "attachment; filename=\"estoque_Paulinia_Norte_05-2024.xlsx\"; \
             filename*=UTF-8''estoque_Paul%C3%ADnia_Norte_05-2024.xlsx"
        );

        let file = ExportFile {
            filename: "estoque_São_José_05-2024.xlsx".to_string(),
            bytes: Vec::new(),
        };
        let header = HttpResponse::spreadsheet(&file).headers["Content-Disposition"].clone();
        assert!(header.is_ascii());
        assert!(header.contains("filename=\"estoque_Sao_Jose_05-2024.xlsx\""));
        assert!(header.contains("filename*=UTF-8''estoque_S%C3%A3o_Jos%C3%A9_05-2024.xlsx"));
    }

    #[tokio::test]
    async fn test_respond_short_circuits_preflight() {
        let request = event(json!({ "requestContext": { "http": { "method": "OPTIONS" } } }));
        let response = respond(&request, "test", || async {
            Err::<HttpResponse, _>(ServiceError::Configuration("never".to_string()))
        })
        .await;
        assert_eq!(response, HttpResponse::preflight());

        let request = event(json!({ "requestContext": { "http": { "method": "POST" } } }));
        let response = respond(&request, "test", || async {
            Err::<HttpResponse, _>(ServiceError::Configuration("Variável de ambiente ausente: PROJECT_URL".to_string()))
        })
        .await;
        assert_eq!(response.status_code, 400);
        assert!(response.body.contains("PROJECT_URL"));
    }
}
