use crate::config::AppConfig;
use crate::types::ConversionError;
use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use std::future::{ready, Ready};

pub const API_KEY_HEADER: &str = "X-API-Key";

/// A credential that passed the allow-list check. Taking this as the first
/// handler argument rejects the request before its body is read.
#[derive(Debug, Clone)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn check(req: &HttpRequest) -> Result<Self, ConversionError> {
        let config = req
            .app_data::<web::Data<AppConfig>>()
            .ok_or_else(|| ConversionError::Internal("AppConfig is not registered".to_string()))?;

        let key = req
            .headers()
            .get(API_KEY_HEADER)
            .ok_or(ConversionError::MissingApiKey)?
            .to_str()
            .map_err(|_| ConversionError::InvalidApiKey)?;

        if config.api_keys.contains(key) {
            Ok(Self(key.to_string()))
        } else {
            log::warn!("Rejected request to {} with an unknown API key", req.path());
            Err(ConversionError::InvalidApiKey)
        }
    }
}

impl FromRequest for ApiKey {
    type Error = ConversionError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(Self::check(req))
    }
}
