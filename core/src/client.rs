//! Stateless HTTP request builder and response parser for the food API.
//!
//! # Design
//! `FoodClient` holds only a `base_url` and carries no mutable state between
//! calls. Each endpoint is split into a `build_*` method that produces an
//! `HttpRequest` and a `parse_*` method that consumes an `HttpResponse`.
//! The session token is an explicit argument; `ApiClient` supplies it from
//! its `Session`.

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::ApiError;
use crate::http::{HttpRequest, HttpResponse};
use crate::request::RequestBuilder;
use crate::types::{ImagePayload, Location, Menu, ResponseError, UpdateUser, User, UserResponse};

/// Synchronous, stateless codec for the food API.
#[derive(Debug, Clone)]
pub struct FoodClient {
    base_url: String,
}

impl FoodClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn build_create_user(&self) -> Result<HttpRequest, ApiError> {
        RequestBuilder::post(format!("{}/user", self.base_url)).build()
    }

    pub fn build_get_user(&self, uid: u32, sid: &str) -> Result<HttpRequest, ApiError> {
        RequestBuilder::get(format!("{}/user/{uid}", self.base_url))
            .query("sid", sid)
            .build()
    }

    pub fn build_get_menu(&self, location: Location, sid: &str) -> Result<HttpRequest, ApiError> {
        RequestBuilder::get(format!("{}/menu", self.base_url))
            .query("lat", location.lat)
            .query("lng", location.lng)
            .query("sid", sid)
            .build()
    }

    pub fn build_get_image(&self, mid: u32, sid: &str) -> Result<HttpRequest, ApiError> {
        RequestBuilder::get(format!("{}/menu/{mid}/image", self.base_url))
            .query("sid", sid)
            .build()
    }

    pub fn build_put_user(&self, uid: u32, user: &User, sid: &str) -> Result<HttpRequest, ApiError> {
        if !(1..=12).contains(&user.card_expire_month) {
            return Err(ApiError::InvalidInput(format!(
                "cardExpireMonth must be within 1..=12, got {}",
                user.card_expire_month
            )));
        }
        RequestBuilder::put(format!("{}/user/{uid}", self.base_url))
            .json(&UpdateUser::from_user(user, sid))
            .build()
    }

    pub fn parse_create_user(&self, response: HttpResponse) -> Result<UserResponse, ApiError> {
        decode(&response)
    }

    pub fn parse_get_user(&self, response: HttpResponse) -> Result<User, ApiError> {
        decode(&response)
    }

    /// Menus are returned in server order.
    pub fn parse_get_menu(&self, response: HttpResponse) -> Result<Vec<Menu>, ApiError> {
        let menus: Vec<Menu> = decode(&response)?;
        if let Some(menu) = menus.iter().find(|m| m.price.is_nan() || m.price < 0.0) {
            return Err(ApiError::Decode(format!(
                "menu {} has invalid price {}",
                menu.mid, menu.price
            )));
        }
        Ok(menus)
    }

    /// `Ok(None)` when the payload has no string `base64` key.
    pub fn parse_get_image(&self, response: HttpResponse) -> Result<Option<String>, ApiError> {
        let payload: ImagePayload = decode(&response)?;
        Ok(match payload.base64 {
            Some(serde_json::Value::String(image)) => Some(image),
            _ => None,
        })
    }

    pub fn parse_put_user(&self, response: HttpResponse) -> Result<UserResponse, ApiError> {
        decode(&response)
    }
}

fn decode<T: DeserializeOwned>(response: &HttpResponse) -> Result<T, ApiError> {
    debug!(status = response.status, body = %response.body, "received response");
    check_status(response)?;
    serde_json::from_str(&response.body).map_err(|e| ApiError::Decode(e.to_string()))
}

/// Map non-success status codes to `ApiError::Http`, preferring the
/// server's `{"message": ...}` payload over the raw body.
fn check_status(response: &HttpResponse) -> Result<(), ApiError> {
    if response.is_success() {
        return Ok(());
    }
    let message = serde_json::from_str::<ResponseError>(&response.body)
        .map(|e| e.message)
        .unwrap_or_else(|_| response.body.clone());
    Err(ApiError::Http {
        status: response.status,
        message,
    })
}
