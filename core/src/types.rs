//! Domain DTOs for the food-ordering API.
//!
//! # Design
//! Field names follow the server's camelCase wire format. Every response
//! type requires all of its fields and ignores unknown ones, so a server
//! that adds fields keeps working while a server that drops one fails to
//! decode. These types are defined independently from the mock-server
//! crate; integration tests catch schema drift between the two.

use serde::{Deserialize, Serialize};

/// A geographic position in degrees.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
}

/// A registered customer's profile and payment instrument.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub first_name: String,
    pub last_name: String,
    pub card_full_name: String,
    pub card_number: String,
    pub card_expire_month: u8,
    pub card_expire_year: u16,
    #[serde(rename = "cardCVV")]
    pub card_cvv: String,
    pub uid: u32,
    pub last_oid: u32,
    pub order_status: String,
}

/// Session credentials issued by the server when a user is created or
/// updated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserResponse {
    pub sid: String,
    pub uid: u32,
}

/// One orderable menu entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Menu {
    pub mid: u32,
    pub name: String,
    pub price: f64,
    pub location: Location,
    pub image_version: u32,
    pub short_description: String,
    pub delivery_time: u32,
}

/// Error payload the server sends alongside a failure status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResponseError {
    pub message: String,
}

/// Request payload for `PUT /user/{uid}`.
///
/// Carries only the fields a customer may change plus the session token.
/// Server-owned fields (`uid`, `lastOid`, `orderStatus`) never appear here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUser {
    pub first_name: String,
    pub last_name: String,
    pub card_full_name: String,
    pub card_number: String,
    pub card_expire_month: u8,
    pub card_expire_year: u16,
    #[serde(rename = "cardCVV")]
    pub card_cvv: String,
    pub sid: String,
}

impl UpdateUser {
    pub fn from_user(user: &User, sid: &str) -> Self {
        Self {
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            card_full_name: user.card_full_name.clone(),
            card_number: user.card_number.clone(),
            card_expire_month: user.card_expire_month,
            card_expire_year: user.card_expire_year,
            card_cvv: user.card_cvv.clone(),
            sid: sid.to_string(),
        }
    }
}

/// `GET /menu/{mid}/image` response. Only `base64` is read; the key may be
/// missing, in which case no image is available.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ImagePayload {
    #[serde(default)]
    pub base64: Option<serde_json::Value>,
}
