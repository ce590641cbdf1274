//! JSON body extraction with structured 422 responses.

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Drop-in replacement for `axum::Json` whose rejection reports field errors.
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = SchemaError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(SchemaError::from(rejection)),
        }
    }
}

#[derive(Debug, Serialize, PartialEq)]
pub struct FieldError {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub loc: Vec<String>,
    pub msg: String,
}

#[derive(Debug)]
pub struct SchemaError {
    status: StatusCode,
    detail: String,
    errors: Vec<FieldError>,
}

#[derive(Serialize)]
struct SchemaErrorBody<'a> {
    error: &'static str,
    detail: &'a str,
    errors: &'a [FieldError],
}

impl From<JsonRejection> for SchemaError {
    fn from(rejection: JsonRejection) -> Self {
        let detail = rejection.body_text();
        let (status, errors) = match &rejection {
            JsonRejection::JsonDataError(_) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                vec![field_error(&detail)],
            ),
            JsonRejection::JsonSyntaxError(_) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                vec![FieldError {
                    kind: "json_invalid",
                    loc: vec!["body".to_string()],
                    msg: detail.clone(),
                }],
            ),
            _ => (rejection.status(), Vec::new()),
        };
        Self {
            status,
            detail,
            errors,
        }
    }
}

impl IntoResponse for SchemaError {
    fn into_response(self) -> Response {
        tracing::warn!(status = self.status.as_u16(), detail = %self.detail, "Request validation failed");
        let body = SchemaErrorBody {
            error: "request validation failed",
            detail: &self.detail,
            errors: &self.errors,
        };
        (self.status, Json(body)).into_response()
    }
}

/// Classify a serde deserialization message and locate the offending field.
///
/// serde names fields in backticks, e.g. "missing field `model` at line 1 column 2".
fn field_error(message: &str) -> FieldError {
    let kind = if message.contains("missing field") {
        "missing"
    } else if message.contains("invalid type") {
        "type_error"
    } else {
        "value_error"
    };

    let mut loc = vec!["body".to_string()];
    if kind == "missing" {
        if let Some(field) = backticked(message) {
            loc.push(field.to_string());
        }
    }

    FieldError {
        kind,
        loc,
        msg: message.to_string(),
    }
}

fn backticked(message: &str) -> Option<&str> {
    let start = message.find('`')? + 1;
    let len = message[start..].find('`')?;
    Some(&message[start..start + len])
}
